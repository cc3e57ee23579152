use crate::application::panel::PanelSettings;
use crate::domain::calendar::{DEFAULT_UTC_OFFSET_MINUTES, ReportingCalendar};
use crate::domain::catalog::MetricRegistry;
use crate::domain::pivot::ColumnGrouping;
use crate::domain::range::{DEFAULT_PAGE_SIZE, DEFAULT_RANGE_DAYS};
use crate::domain::site::UnitType;
use anyhow::{Context, ensure};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "config/dashboard";
const ENV_PREFIX: &str = "DASHBOARD";

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub backend: BackendSettings,
    #[serde(default)]
    pub reporting: ReportingSettings,
    #[serde(default)]
    pub table: TableSettings,
    /// Legal metrics per unit type. Empty means the built-in solar set.
    #[serde(default)]
    pub metrics: Vec<MetricDeclaration>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportingSettings {
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableSettings {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<usize>,
    #[serde(default = "default_range_days")]
    pub default_range_days: u32,
    #[serde(default)]
    pub grouping: ColumnGrouping,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            page_size_options: default_page_size_options(),
            default_range_days: default_range_days(),
            grouping: ColumnGrouping::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricDeclaration {
    pub unit_type: String,
    pub names: Vec<String>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_utc_offset_minutes() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_page_size_options() -> Vec<usize> {
    vec![10, 20, 50]
}

fn default_range_days() -> u32 {
    DEFAULT_RANGE_DAYS
}

/// Load `config/dashboard.{toml,...}` overlaid with `DASHBOARD__*`
/// environment variables, e.g. `DASHBOARD__BACKEND__BASE_URL`.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("Failed to read dashboard configuration")?;

    let config: DashboardConfig = settings
        .try_deserialize()
        .context("Invalid dashboard configuration")?;
    config.validate()?;
    Ok(config)
}

impl DashboardConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.backend.base_url.trim().is_empty(), "backend.base_url must be set");
        ensure!(self.backend.timeout_secs > 0, "backend.timeout_secs must be positive");
        ensure!(
            ReportingCalendar::from_offset_minutes(self.reporting.utc_offset_minutes).is_some(),
            "reporting.utc_offset_minutes {} is not a valid UTC offset",
            self.reporting.utc_offset_minutes
        );
        ensure!(self.table.default_page_size > 0, "table.default_page_size must be positive");
        ensure!(
            self.table.page_size_options.iter().all(|n| *n > 0),
            "table.page_size_options must all be positive"
        );
        ensure!(self.table.default_range_days > 0, "table.default_range_days must be positive");
        for declaration in &self.metrics {
            ensure!(
                !declaration.unit_type.trim().is_empty(),
                "metrics entries need a unit_type"
            );
        }
        Ok(())
    }

    pub fn registry(&self) -> MetricRegistry {
        if self.metrics.is_empty() {
            return MetricRegistry::solar_defaults();
        }
        self.metrics
            .iter()
            .fold(MetricRegistry::new(), |registry, declaration| {
                registry.declare(
                    UnitType::from(declaration.unit_type.as_str()),
                    declaration.names.iter().cloned(),
                )
            })
    }

    pub fn panel_settings(&self) -> anyhow::Result<PanelSettings> {
        let calendar = ReportingCalendar::from_offset_minutes(self.reporting.utc_offset_minutes)
            .with_context(|| {
                format!(
                    "reporting.utc_offset_minutes {} is not a valid UTC offset",
                    self.reporting.utc_offset_minutes
                )
            })?;

        let mut page_size_options = self.table.page_size_options.clone();
        if !page_size_options.contains(&self.table.default_page_size) {
            page_size_options.push(self.table.default_page_size);
        }
        page_size_options.sort_unstable();
        page_size_options.dedup();

        Ok(PanelSettings {
            calendar,
            registry: self.registry(),
            default_page_size: self.table.default_page_size,
            page_size_options,
            default_range_days: self.table.default_range_days,
            grouping: self.table.grouping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> anyhow::Result<DashboardConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: DashboardConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [backend]
            base_url = "https://api.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
        assert!(config.backend.auth_token.is_none());

        let settings = config.panel_settings().unwrap();
        assert_eq!(settings, PanelSettings::default());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [server]
            listen = "127.0.0.1:9000"

            [backend]
            base_url = "https://api.example.com/"
            auth_token = "secret"
            timeout_secs = 5

            [reporting]
            utc_offset_minutes = 0

            [table]
            default_page_size = 25
            page_size_options = [50, 10]
            default_range_days = 14
            grouping = "by_metric"

            [[metrics]]
            unit_type = "Inverter"
            names = ["generation"]

            [[metrics]]
            unit_type = "WeatherStation"
            names = ["irradiance", "ambientTemp"]
            "#,
        )
        .unwrap();

        let settings = config.panel_settings().unwrap();
        assert_eq!(settings.calendar, ReportingCalendar::utc());
        assert_eq!(settings.default_page_size, 25);
        assert_eq!(settings.page_size_options, vec![10, 25, 50]);
        assert_eq!(settings.default_range_days, 14);
        assert_eq!(settings.grouping, ColumnGrouping::ByMetric);
        assert_eq!(
            settings.registry.declared_for(&UnitType::Inverter),
            Some(&["generation".to_string()][..])
        );
        assert!(settings.registry.declared_for(&UnitType::Meter).is_none());
        assert_eq!(
            settings
                .registry
                .declared_for(&UnitType::from("WeatherStation"))
                .map(<[String]>::len),
            Some(2)
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let missing_backend = parse("[server]\nlisten = \"0.0.0.0:1\"");
        assert!(missing_backend.is_err());

        let zero_page = parse(
            r#"
            [backend]
            base_url = "https://api.example.com"
            [table]
            default_page_size = 0
            "#,
        );
        assert!(zero_page.unwrap_err().to_string().contains("default_page_size"));

        let bad_offset = parse(
            r#"
            [backend]
            base_url = "https://api.example.com"
            [reporting]
            utc_offset_minutes = 100000
            "#,
        );
        assert!(bad_offset.is_err());
    }
}
