// Fetch collaborator for dashboard data
use crate::domain::range::FetchRequest;
use crate::domain::site::Unit;
use crate::domain::time_series::TimeSeriesRow;
use crate::domain::totals::SiteOverview;
use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failures. Malformed-but-valid JSON is not an error: the
/// parsers degrade it to empty collections.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("request to {url} returned status {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait DashboardSource: Send + Sync {
    /// One page of a site's daily generation report. `page` is 1-indexed.
    async fn site_dgr(
        &self,
        site_id: &str,
        from: i64,
        to: i64,
        page: usize,
        per: usize,
    ) -> Result<Vec<TimeSeriesRow>, FetchError>;

    /// Units installed at a site.
    async fn site_units(&self, site_id: &str) -> Result<Vec<Unit>, FetchError>;

    /// Per-site readings across the fleet for a window.
    async fn fleet_overview(&self, from: i64, to: i64) -> Result<Vec<SiteOverview>, FetchError>;
}

/// Result of carrying out a `FetchRequest`.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    SiteDgr(Vec<TimeSeriesRow>),
    FleetOverview(Vec<SiteOverview>),
}

pub async fn perform(source: &dyn DashboardSource, request: &FetchRequest) -> Result<Fetched, FetchError> {
    match request {
        FetchRequest::SiteDgr {
            site_id,
            from,
            to,
            page,
            per,
        } => source
            .site_dgr(site_id, *from, *to, *page, *per)
            .await
            .map(Fetched::SiteDgr),
        FetchRequest::FleetOverview { from, to } => source
            .fleet_overview(*from, *to)
            .await
            .map(Fetched::FleetOverview),
    }
}
