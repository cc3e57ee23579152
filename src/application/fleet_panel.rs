// Fleet panel - Overview table and summary totals across every site
use crate::application::dashboard_source::{DashboardSource, FetchError, Fetched, perform};
use crate::application::panel::{PanelCommand, PanelSettings, PanelStatus};
use crate::domain::calendar::Clock;
use crate::domain::pivot::{Column, FlatRow, TableQuery};
use crate::domain::range::{Cursor, DateRange, FetchTicket, RangeController, RangeError, Scope};
use crate::domain::totals::{FormattedTotals, SiteOverview, Totals, calculate_totals, fleet_table};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct FleetView {
    pub cursor: Cursor,
    pub status: PanelStatus,
    pub totals: Totals,
    pub formatted: FormattedTotals,
    pub columns: Vec<Column>,
    pub rows: Vec<FlatRow>,
}

pub struct FleetPanel {
    source: Arc<dyn DashboardSource>,
    controller: RangeController,
    sites: Vec<SiteOverview>,
    totals: Totals,
    status: PanelStatus,
}

impl FleetPanel {
    pub fn new(source: Arc<dyn DashboardSource>, settings: &PanelSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            controller: settings.controller(clock),
            sites: Vec::new(),
            totals: Totals::default(),
            status: PanelStatus::Idle,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.controller.cursor()
    }

    pub fn status(&self) -> &PanelStatus {
        &self.status
    }

    /// Load yesterday's overview.
    pub async fn open(&mut self) -> Result<(), FetchError> {
        let ticket = self.controller.initialize_fleet_range();
        self.load(ticket).await
    }

    /// Restore a window without fetching.
    pub fn resume(&mut self, range: Option<DateRange>) -> Result<(), RangeError> {
        let page_size = self.controller.page_size();
        self.controller.resume(Scope::Fleet, range, 0, page_size)
    }

    pub async fn reload(&mut self) -> Result<(), FetchError> {
        match self.controller.refresh() {
            Some(ticket) => self.load(ticket).await,
            None => Ok(()),
        }
    }

    pub fn dispatch(&mut self, command: PanelCommand) -> Result<Option<FetchTicket>, RangeError> {
        let ticket = command.apply(&mut self.controller)?;
        if ticket.is_some() {
            self.status = PanelStatus::Loading;
        }
        Ok(ticket)
    }

    /// Apply an overview response unless `ticket` has been superseded.
    /// Totals always reflect exactly the stored sites.
    pub fn complete(&mut self, ticket: &FetchTicket, result: Result<Vec<SiteOverview>, FetchError>) -> bool {
        if !self.controller.is_current(ticket) {
            tracing::debug!(generation = ticket.generation, "Discarding stale fleet response");
            return false;
        }
        match result {
            Ok(sites) => {
                self.totals = calculate_totals(&sites);
                self.sites = sites;
                self.status = PanelStatus::Ready;
            }
            Err(e) => self.fail(&e),
        }
        true
    }

    pub async fn run(&mut self, command: PanelCommand) -> Result<bool, RangeError> {
        let Some(ticket) = self.dispatch(command)? else {
            return Ok(false);
        };
        let result = self.fetch(&ticket).await;
        self.complete(&ticket, result);
        Ok(true)
    }

    pub fn render(&self, query: &TableQuery) -> FleetView {
        let table = fleet_table(&self.sites).apply(query);
        FleetView {
            cursor: self.cursor(),
            status: self.status.clone(),
            totals: self.totals,
            formatted: self.totals.formatted(),
            columns: table.columns,
            rows: table.rows,
        }
    }

    pub async fn load(&mut self, ticket: FetchTicket) -> Result<(), FetchError> {
        self.status = PanelStatus::Loading;
        match self.fetch(&ticket).await {
            Ok(sites) => {
                self.complete(&ticket, Ok(sites));
                Ok(())
            }
            Err(e) => {
                if self.controller.is_current(&ticket) {
                    self.fail(&e);
                }
                Err(e)
            }
        }
    }

    fn fail(&mut self, error: &FetchError) {
        tracing::error!("Failed to load fleet overview: {}", error);
        self.sites.clear();
        self.totals = Totals::default();
        self.status = PanelStatus::Failed(error.to_string());
    }

    async fn fetch(&self, ticket: &FetchTicket) -> Result<Vec<SiteOverview>, FetchError> {
        match perform(self.source.as_ref(), &ticket.request).await? {
            Fetched::FleetOverview(sites) => Ok(sites),
            Fetched::SiteDgr(_) => {
                tracing::warn!("Fleet panel received site rows; ignoring");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dashboard_source::fake::FakeSource;
    use crate::domain::calendar::{FixedClock, SECONDS_PER_DAY};
    use crate::domain::range::FetchRequest;
    use crate::domain::totals::parse_fleet_payload;
    use serde_json::json;

    // 2025-11-04 00:00 at UTC+5:30
    const IST_MIDNIGHT: i64 = 1_762_194_600;

    fn fleet() -> Vec<SiteOverview> {
        parse_fleet_payload(&json!({
            "site_overview": [
                {"site_id": "s1", "site_name": "North", "generation": 4000, "netExport": 3900, "site_capacity": 1000},
                {"site_id": "s2", "site_name": "South", "generation": 800, "netExport": 780, "site_capacity": 250}
            ]
        }))
    }

    fn panel(source: Arc<FakeSource>) -> FleetPanel {
        FleetPanel::new(
            source,
            &PanelSettings::default(),
            Arc::new(FixedClock::at(IST_MIDNIGHT + 5 * SECONDS_PER_DAY + 60)),
        )
    }

    #[tokio::test]
    async fn test_open_loads_yesterday_and_totals() {
        let source = Arc::new(FakeSource {
            fleet: fleet(),
            ..FakeSource::default()
        });
        let mut panel = panel(source.clone());
        panel.open().await.expect("open");

        let yesterday = IST_MIDNIGHT + 4 * SECONDS_PER_DAY;
        assert_eq!(
            source.requests(),
            vec![FetchRequest::FleetOverview {
                from: yesterday,
                to: yesterday
            }]
        );
        let view = panel.render(&TableQuery::default());
        assert_eq!(view.status, PanelStatus::Ready);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.totals.generation, 4800.0);
        assert_eq!(view.formatted.cuf_gen, "8.00");
    }

    #[tokio::test]
    async fn test_pagination_is_a_noop_for_fleet() {
        let source = Arc::new(FakeSource::default());
        let mut panel = panel(source.clone());
        panel.open().await.expect("open");
        assert!(!panel.run(PanelCommand::NextPage).await.expect("next"));
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn test_stale_fleet_response_is_discarded() {
        let mut panel = panel(Arc::new(FakeSource::default()));
        panel.resume(None).expect("resume");
        let older = panel
            .dispatch(PanelCommand::ShiftRange { days: -1 })
            .expect("shift")
            .expect("ticket");
        let newer = panel
            .dispatch(PanelCommand::ShiftRange { days: -1 })
            .expect("shift")
            .expect("ticket");

        assert!(panel.complete(&newer, Ok(Vec::new())));
        assert!(!panel.complete(&older, Ok(fleet())));
        let view = panel.render(&TableQuery::default());
        assert!(view.rows.is_empty());
        assert_eq!(view.totals, Totals::default());
    }

    #[tokio::test]
    async fn test_failure_clears_sites_and_zeroes_totals() {
        let source = Arc::new(FakeSource {
            fleet: fleet(),
            fail: true,
            ..FakeSource::default()
        });
        let mut panel = panel(source);
        assert!(panel.open().await.is_err());
        assert!(matches!(panel.status(), PanelStatus::Failed(_)));
        let view = panel.render(&TableQuery::default());
        assert!(view.rows.is_empty());
        assert_eq!(view.totals, Totals::default());
    }
}
