// Site panel - One independent DGR table view: range, rows, units, selection
use crate::application::dashboard_source::{DashboardSource, FetchError, Fetched, perform};
use crate::application::panel::{PanelCommand, PanelSettings, PanelStatus};
use crate::domain::calendar::Clock;
use crate::domain::catalog::{Catalog, resolve_catalog};
use crate::domain::pivot::{
    Column, ColumnGrouping, FlatRow, PivotTable, Selection, TableQuery, ViewMode, ViewState, pivot,
    resolve_selection,
};
use crate::domain::range::{Cursor, DateRange, FetchRequest, FetchTicket, RangeController, RangeError, Scope};
use crate::domain::site::Unit;
use crate::domain::time_series::TimeSeriesRow;
use serde::Serialize;
use std::sync::Arc;

/// Everything a renderer needs for one site table.
#[derive(Debug, Clone, Serialize)]
pub struct SiteTableView {
    pub cursor: Cursor,
    pub status: PanelStatus,
    pub view: ViewState,
    pub metrics: Vec<String>,
    pub units: Vec<Unit>,
    pub columns: Vec<Column>,
    pub rows: Vec<FlatRow>,
}

pub struct SitePanel {
    source: Arc<dyn DashboardSource>,
    settings: Arc<PanelSettings>,
    controller: RangeController,
    units: Vec<Unit>,
    rows: Vec<TimeSeriesRow>,
    catalog: Catalog,
    view: ViewState,
    status: PanelStatus,
}

impl SitePanel {
    pub fn new(source: Arc<dyn DashboardSource>, settings: Arc<PanelSettings>, clock: Arc<dyn Clock>) -> Self {
        let controller = settings.controller(clock);
        let view = ViewState {
            grouping: settings.grouping,
            ..ViewState::default()
        };
        Self {
            source,
            settings,
            controller,
            units: Vec::new(),
            rows: Vec::new(),
            catalog: Catalog::default(),
            view,
            status: PanelStatus::Idle,
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        match self.controller.scope() {
            Some(Scope::Site(id)) => Some(id),
            _ => None,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.controller.cursor()
    }

    pub fn status(&self) -> &PanelStatus {
        &self.status
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn rows(&self) -> &[TimeSeriesRow] {
        &self.rows
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Switch to `site_id` on its default window and load units and the
    /// first page together. Anything in flight for the previous site is
    /// superseded.
    pub async fn open_site(&mut self, site_id: &str) -> Result<(), FetchError> {
        let ticket = self.controller.initialize_default_range(site_id);
        self.reset_for(site_id);
        self.load(ticket).await
    }

    /// Restore a cursor rendered earlier, without fetching. Data from a
    /// different site is dropped.
    pub fn resume(
        &mut self,
        site_id: &str,
        range: Option<DateRange>,
        page_index: usize,
        page_size: usize,
    ) -> Result<(), RangeError> {
        let same_site = self.site_id() == Some(site_id);
        self.controller
            .resume(Scope::Site(site_id.to_string()), range, page_index, page_size)?;
        if !same_site {
            self.reset_for(site_id);
        }
        Ok(())
    }

    /// Fetch units plus the rows for the current cursor.
    pub async fn reload(&mut self) -> Result<(), FetchError> {
        match self.controller.refresh() {
            Some(ticket) => self.load(ticket).await,
            None => Ok(()),
        }
    }

    /// Update state for `command` and return the fetch it requires, if any.
    /// The caller performs the fetch and hands the result to `complete`.
    pub fn dispatch(&mut self, command: PanelCommand) -> Result<Option<FetchTicket>, RangeError> {
        let ticket = command.apply(&mut self.controller)?;
        if ticket.is_some() {
            self.status = PanelStatus::Loading;
        }
        Ok(ticket)
    }

    /// Apply a fetch result. Returns false, leaving state untouched, when a
    /// later command has superseded `ticket`.
    pub fn complete(&mut self, ticket: &FetchTicket, result: Result<Vec<TimeSeriesRow>, FetchError>) -> bool {
        if !self.controller.is_current(ticket) {
            tracing::debug!(generation = ticket.generation, "Discarding stale DGR response");
            return false;
        }
        match result {
            Ok(rows) => {
                self.rows = rows;
                self.status = PanelStatus::Ready;
            }
            Err(e) => {
                tracing::error!("Failed to load DGR rows: {}", e);
                self.rows.clear();
                self.status = PanelStatus::Failed(e.to_string());
            }
        }
        self.refresh_catalog();
        true
    }

    /// Accept a unit list for `site_id` unless the panel has moved on.
    pub fn complete_units(&mut self, site_id: &str, result: Result<Vec<Unit>, FetchError>) -> bool {
        if self.site_id() != Some(site_id) {
            tracing::debug!("Discarding unit list for {}; panel moved on", site_id);
            return false;
        }
        match result {
            Ok(units) => self.units = units,
            Err(e) => {
                tracing::error!("Failed to load units for {}: {}", site_id, e);
                self.units.clear();
                self.status = PanelStatus::Failed(e.to_string());
            }
        }
        self.refresh_catalog();
        true
    }

    /// Dispatch `command` and perform its fetch. Returns whether a fetch ran.
    pub async fn run(&mut self, command: PanelCommand) -> Result<bool, RangeError> {
        let Some(ticket) = self.dispatch(command)? else {
            return Ok(false);
        };
        let result = self.fetch_rows(&ticket.request).await;
        self.complete(&ticket, result);
        Ok(true)
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view.mode = mode;
        self.revalidate_selection();
    }

    pub fn select_metric(&mut self, metric: &str) {
        self.view.selection.metric = Some(metric.to_string());
        self.revalidate_selection();
    }

    pub fn select_unit(&mut self, unit_id: &str) {
        self.view.selection.unit_id = Some(unit_id.to_string());
        self.revalidate_selection();
    }

    pub fn set_grouping(&mut self, grouping: ColumnGrouping) {
        self.view.grouping = grouping;
    }

    pub fn table(&self, query: &TableQuery) -> PivotTable {
        pivot(
            &self.rows,
            &self.units,
            &self.catalog,
            &self.view,
            self.controller.calendar(),
        )
        .apply(query)
    }

    pub fn render(&self, query: &TableQuery) -> SiteTableView {
        let table = self.table(query);
        SiteTableView {
            cursor: self.cursor(),
            status: self.status.clone(),
            view: self.view.clone(),
            metrics: self.catalog.filtered_metrics.clone(),
            units: self.units.clone(),
            columns: table.columns,
            rows: table.rows,
        }
    }

    fn reset_for(&mut self, site_id: &str) {
        tracing::debug!("Panel switching to site {}", site_id);
        self.units.clear();
        self.rows.clear();
        self.catalog = Catalog::default();
        self.view.selection = Selection::default();
        self.status = PanelStatus::Idle;
    }

    /// Perform `ticket` together with a fresh unit list for the site.
    pub async fn load(&mut self, ticket: FetchTicket) -> Result<(), FetchError> {
        let Some(site_id) = self.site_id().map(str::to_string) else {
            return Ok(());
        };
        self.status = PanelStatus::Loading;

        let source = self.source.clone();
        let (units, rows) = futures::join!(source.site_units(&site_id), self.fetch_rows(&ticket.request));

        match units.and_then(|units| rows.map(|rows| (units, rows))) {
            Ok((units, rows)) => {
                self.complete_units(&site_id, Ok(units));
                self.complete(&ticket, Ok(rows));
                Ok(())
            }
            Err(e) => {
                if self.controller.is_current(&ticket) {
                    tracing::error!("Failed to open site {}: {}", site_id, e);
                    self.units.clear();
                    self.rows.clear();
                    self.catalog = Catalog::default();
                    self.status = PanelStatus::Failed(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<TimeSeriesRow>, FetchError> {
        match perform(self.source.as_ref(), request).await? {
            Fetched::SiteDgr(rows) => Ok(rows),
            Fetched::FleetOverview(_) => {
                tracing::warn!("Site panel received a fleet overview; ignoring");
                Ok(Vec::new())
            }
        }
    }

    fn refresh_catalog(&mut self) {
        self.catalog = resolve_catalog(&self.rows, &self.units, &self.settings.registry);
        self.revalidate_selection();
    }

    /// Defaults and fallbacks only apply once the data to judge them exists.
    fn revalidate_selection(&mut self) {
        let resolved = resolve_selection(&self.catalog, &self.units, &self.view.selection);
        if self.catalog.is_loaded() {
            self.view.selection.metric = resolved.metric;
        }
        if !self.units.is_empty() {
            self.view.selection.unit_id = resolved.unit_id;
        }
    }
}
