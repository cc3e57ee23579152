// HTTP request handlers
use crate::application::fleet_panel::{FleetPanel, FleetView};
use crate::application::panel::PanelCommand;
use crate::application::site_panel::{SitePanel, SiteTableView};
use crate::domain::pivot::{ColumnGrouping, SortDirection, SortSpec, TableQuery, ViewMode};
use crate::domain::range::DateRange;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Navigation {
    Next,
    Prev,
    Shift,
}

#[derive(Debug, Default, Deserialize)]
pub struct SiteQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
    /// 0-indexed.
    pub page: Option<usize>,
    pub per: Option<usize>,
    pub nav: Option<Navigation>,
    pub days: Option<i64>,
    pub view: Option<ViewMode>,
    pub metric: Option<String>,
    pub unit: Option<String>,
    pub grouping: Option<ColumnGrouping>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<SortDirection>,
}

impl SiteQuery {
    fn command(&self) -> Result<Option<PanelCommand>, ApiError> {
        let command = match self.nav {
            None => None,
            Some(Navigation::Next) => Some(PanelCommand::NextPage),
            Some(Navigation::Prev) => Some(PanelCommand::PrevPage),
            Some(Navigation::Shift) => {
                let days = self
                    .days
                    .ok_or_else(|| ApiError::BadRequest("nav=shift requires `days`".into()))?;
                Some(PanelCommand::ShiftRange { days })
            }
        };
        Ok(command)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FleetQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub shift: Option<i64>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<SortDirection>,
}

fn requested_range(from: Option<i64>, to: Option<i64>) -> Result<Option<DateRange>, ApiError> {
    match (from, to) {
        (Some(from), Some(to)) => Ok(Some(DateRange::new(from, to))),
        (None, None) => Ok(None),
        _ => Err(ApiError::BadRequest(
            "`from` and `to` must be given together".into(),
        )),
    }
}

fn table_query(search: Option<String>, sort: Option<String>, dir: Option<SortDirection>) -> TableQuery {
    TableQuery {
        search,
        sort: sort.map(|key| SortSpec {
            key,
            direction: dir.unwrap_or_default(),
        }),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// One page of a site's DGR table, pivoted for the requested view.
pub async fn site_dgr(
    Path(site_id): Path<String>,
    Query(query): Query<SiteQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SiteTableView>, ApiError> {
    let range = requested_range(query.from, query.to)?;
    let command = query.command()?;
    let page_size = query.per.unwrap_or(state.settings.default_page_size);

    let mut panel = SitePanel::new(state.source.clone(), state.settings.clone(), state.clock.clone());
    panel.resume(&site_id, range, query.page.unwrap_or(0), page_size)?;
    let ticket = match command {
        Some(command) => panel.dispatch(command)?,
        None => None,
    };

    if let Some(mode) = query.view {
        panel.set_view_mode(mode);
    }
    if let Some(grouping) = query.grouping {
        panel.set_grouping(grouping);
    }
    if let Some(metric) = &query.metric {
        panel.select_metric(metric);
    }
    if let Some(unit) = &query.unit {
        panel.select_unit(unit);
    }

    match ticket {
        Some(ticket) => panel.load(ticket).await?,
        None => panel.reload().await?,
    }
    Ok(Json(panel.render(&table_query(query.search, query.sort, query.dir))))
}

/// Fleet overview table and summary totals.
pub async fn fleet_overview(
    Query(query): Query<FleetQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<FleetView>, ApiError> {
    let range = requested_range(query.from, query.to)?;

    let mut panel = FleetPanel::new(state.source.clone(), &state.settings, state.clock.clone());
    panel.resume(range)?;
    let ticket = match query.shift {
        Some(days) => panel.dispatch(PanelCommand::ShiftRange { days })?,
        None => None,
    };

    match ticket {
        Some(ticket) => panel.load(ticket).await?,
        None => panel.reload().await?,
    }
    Ok(Json(panel.render(&table_query(query.search, query.sort, query.dir))))
}
