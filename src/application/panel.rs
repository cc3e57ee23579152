// Shared panel plumbing: settings, commands and load status
use crate::domain::calendar::{Clock, ReportingCalendar};
use crate::domain::catalog::MetricRegistry;
use crate::domain::pivot::ColumnGrouping;
use crate::domain::range::{
    DEFAULT_PAGE_SIZE, DEFAULT_RANGE_DAYS, FetchTicket, RangeController, RangeError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-deployment knobs every panel is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSettings {
    pub calendar: ReportingCalendar,
    pub registry: MetricRegistry,
    pub default_page_size: usize,
    pub page_size_options: Vec<usize>,
    pub default_range_days: u32,
    pub grouping: ColumnGrouping,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            calendar: ReportingCalendar::default(),
            registry: MetricRegistry::solar_defaults(),
            default_page_size: DEFAULT_PAGE_SIZE,
            page_size_options: vec![10, 20, 50],
            default_range_days: DEFAULT_RANGE_DAYS,
            grouping: ColumnGrouping::default(),
        }
    }
}

impl PanelSettings {
    pub fn controller(&self, clock: Arc<dyn Clock>) -> RangeController {
        RangeController::new(self.calendar, clock)
            .with_defaults(self.default_page_size, self.default_range_days)
            .with_page_size_options(self.page_size_options.clone())
    }
}

/// Navigation a user can trigger on a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PanelCommand {
    NextPage,
    PrevPage,
    SetPageSize { size: usize },
    ShiftRange { days: i64 },
    SetRange { from: i64, to: i64 },
    Refresh,
}

impl PanelCommand {
    /// Apply to the controller. `Ok(None)` means the command was a no-op
    /// and nothing should be fetched.
    pub fn apply(self, controller: &mut RangeController) -> Result<Option<FetchTicket>, RangeError> {
        match self {
            PanelCommand::NextPage => Ok(controller.next_page()),
            PanelCommand::PrevPage => Ok(controller.prev_page()),
            PanelCommand::SetPageSize { size } => Ok(controller.set_page_size(size)),
            PanelCommand::ShiftRange { days } => Ok(controller.shift_range(days)),
            PanelCommand::SetRange { from, to } => controller.set_range(from, to).map(Some),
            PanelCommand::Refresh => Ok(controller.refresh()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum PanelStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}
