// Application state for HTTP handlers
use crate::application::dashboard_source::DashboardSource;
use crate::application::panel::PanelSettings;
use crate::domain::calendar::Clock;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn DashboardSource>,
    pub settings: Arc<PanelSettings>,
    pub clock: Arc<dyn Clock>,
}
