// Presentation layer - axum JSON surface over the panels
pub mod app_state;
pub mod error;
pub mod handlers;

pub use app_state::AppState;

use axum::{Router, routing::get};
use handlers::{fleet_overview, health_check, site_dgr};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/sites/:site_id/dgr", get(site_dgr))
        .route("/fleet/overview", get(fleet_overview))
        .with_state(state)
}
