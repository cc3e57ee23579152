// Application layer - Panels driving fetches through the dashboard source
pub mod dashboard_source;
pub mod fleet_panel;
pub mod panel;
pub mod site_panel;
