// HTTP implementation of the dashboard source
use crate::application::dashboard_source::{DashboardSource, FetchError};
use crate::domain::site::{Unit, parse_units_payload};
use crate::domain::time_series::{TimeSeriesRow, parse_dgr_payload};
use crate::domain::totals::{SiteOverview, parse_fleet_payload};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpDashboardSource {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpDashboardSource {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn site_url(&self, site_id: &str, tail: &str) -> String {
        format!(
            "{}/api/sites/{}/{}",
            self.base_url,
            urlencoding::encode(site_id),
            tail
        )
    }

    async fn get_json(&self, url: String) -> Result<Value, FetchError> {
        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            url: url.clone(),
            source: Box::new(e),
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { url, status, body });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Transport {
            url: url.clone(),
            source: Box::new(e),
        })?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl DashboardSource for HttpDashboardSource {
    async fn site_dgr(
        &self,
        site_id: &str,
        from: i64,
        to: i64,
        page: usize,
        per: usize,
    ) -> Result<Vec<TimeSeriesRow>, FetchError> {
        let url = format!(
            "{}?from={}&to={}&page={}&per={}",
            self.site_url(site_id, "dgr"),
            from,
            to,
            page,
            per
        );
        let payload = self.get_json(url).await?;
        Ok(parse_dgr_payload(&payload))
    }

    async fn site_units(&self, site_id: &str) -> Result<Vec<Unit>, FetchError> {
        let payload = self.get_json(self.site_url(site_id, "units/list")).await?;
        Ok(parse_units_payload(&payload))
    }

    async fn fleet_overview(&self, from: i64, to: i64) -> Result<Vec<SiteOverview>, FetchError> {
        let url = format!("{}/api/fleet/overview/v1?from={}&to={}", self.base_url, from, to);
        let payload = self.get_json(url).await?;
        Ok(parse_fleet_payload(&payload))
    }
}
