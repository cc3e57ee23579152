// Metric and unit catalog resolution
use super::site::{Unit, UnitType};
use super::time_series::TimeSeriesRow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Declared legal metrics per unit type. A declared type's list is
/// authoritative; types without a declaration fall back to co-occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRegistry {
    declared: BTreeMap<UnitType, Vec<String>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<I, S>(mut self, unit_type: UnitType, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared
            .insert(unit_type, metrics.into_iter().map(Into::into).collect());
        self
    }

    pub fn declared_for(&self, unit_type: &UnitType) -> Option<&[String]> {
        self.declared.get(unit_type).map(Vec::as_slice)
    }

    /// Inverter and meter metrics reported by the DGR backend.
    pub fn solar_defaults() -> Self {
        Self::new()
            .declare(
                UnitType::Inverter,
                ["generation", "dcCapacity", "generationPerKw"],
            )
            .declare(
                UnitType::Meter,
                [
                    "totalExport",
                    "totalImport",
                    "totalReactiveExport",
                    "totalReactiveImport",
                    "netExport",
                    "netImport",
                    "netReactiveExport",
                    "netReactiveImport",
                    "netGeneration",
                ],
            )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    /// Metric names in first-discovery order.
    pub metrics: Vec<String>,
    pub metric_unit_types: BTreeMap<String, BTreeSet<UnitType>>,
    pub site_unit_types: BTreeSet<UnitType>,
    /// `metrics` restricted to those reported against a unit type this site has.
    pub filtered_metrics: Vec<String>,
    /// Observed (metric, unit type) pairs rejected by the registry.
    pub undeclared: Vec<(String, UnitType)>,
}

impl Catalog {
    /// An empty catalog means the rows have not been loaded yet.
    pub fn is_loaded(&self) -> bool {
        !self.metrics.is_empty()
    }

    pub fn unit_types_for(&self, metric: &str) -> Option<&BTreeSet<UnitType>> {
        self.metric_unit_types.get(metric)
    }

    pub fn supports(&self, metric: &str, unit_type: &UnitType) -> bool {
        self.unit_types_for(metric)
            .is_some_and(|types| types.contains(unit_type))
    }

    pub fn is_filtered_metric(&self, metric: &str) -> bool {
        self.filtered_metrics.iter().any(|m| m == metric)
    }
}

/// Keys such as `"0"` or `"12"` are array indices leaked by upstream
/// serialization, not metrics.
pub fn is_numeric_key(key: &str) -> bool {
    key.trim()
        .parse::<f64>()
        .map(|v| v.is_finite())
        .unwrap_or(false)
}

/// Scan a page of rows and work out which metrics exist and which unit types
/// report them. Pure in `(rows, units, registry)`.
pub fn resolve_catalog(rows: &[TimeSeriesRow], units: &[Unit], registry: &MetricRegistry) -> Catalog {
    if rows.is_empty() {
        return Catalog::default();
    }

    let unit_types: HashMap<&str, &UnitType> = units
        .iter()
        .map(|u| (u.unit_id.as_str(), &u.unit_type))
        .collect();
    let site_unit_types: BTreeSet<UnitType> = units.iter().map(|u| u.unit_type.clone()).collect();

    let mut metrics = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut metric_unit_types: BTreeMap<String, BTreeSet<UnitType>> = BTreeMap::new();
    let mut undeclared = Vec::new();
    let mut undeclared_seen: HashSet<(String, UnitType)> = HashSet::new();

    for row in rows {
        for (key, metric_map) in row.object_entries() {
            let unit_type = unit_types.get(key.as_str()).copied();

            for metric in metric_map.keys() {
                if is_numeric_key(metric) {
                    continue;
                }
                if seen.insert(metric.clone()) {
                    metrics.push(metric.clone());
                }

                let Some(unit_type) = unit_type else {
                    continue;
                };

                match registry.declared_for(unit_type) {
                    Some(declared) if !declared.iter().any(|d| d == metric) => {
                        let pair = (metric.clone(), unit_type.clone());
                        if undeclared_seen.insert(pair.clone()) {
                            undeclared.push(pair);
                        }
                    }
                    _ => {
                        metric_unit_types
                            .entry(metric.clone())
                            .or_default()
                            .insert(unit_type.clone());
                    }
                }
            }
        }
    }

    for unit_type in &site_unit_types {
        let Some(declared) = registry.declared_for(unit_type) else {
            continue;
        };
        for metric in declared {
            if seen.insert(metric.clone()) {
                metrics.push(metric.clone());
            }
            metric_unit_types
                .entry(metric.clone())
                .or_default()
                .insert(unit_type.clone());
        }
    }

    for (metric, unit_type) in &undeclared {
        tracing::warn!(
            "Metric {} reported under {} units but not declared for that type",
            metric,
            unit_type
        );
    }

    let filtered_metrics = metrics
        .iter()
        .filter(|m| {
            metric_unit_types
                .get(m.as_str())
                .is_some_and(|types| !types.is_disjoint(&site_unit_types))
        })
        .cloned()
        .collect();

    Catalog {
        metrics,
        metric_unit_types,
        site_unit_types,
        filtered_metrics,
        undeclared,
    }
}

/// Display label for a metric or aggregate field key.
pub fn metric_label(key: &str) -> &str {
    match key {
        "generation" => "Generation",
        "dcCapacity" => "DC Capacity",
        "generationPerKw" => "Generation / kW",
        "totalExport" => "Total Export",
        "totalImport" => "Total Import",
        "totalReactiveExport" => "Total Reactive Export",
        "totalReactiveImport" => "Total Reactive Import",
        "netExport" => "Net Export",
        "netImport" => "Net Import",
        "netReactiveExport" => "Net Reactive Export",
        "netReactiveImport" => "Net Reactive Import",
        "netGeneration" => "Net Generation",
        "totalGeneration" => "Total Generation",
        "site_capacity" => "Site Capacity",
        "totalGenerationPerKw" => "Total Generation / kW",
        "cufGen" => "CUF (Gen)",
        "prGen" => "PR (Gen)",
        "cufNetExport" => "CUF (Net Export)",
        "tlLoss" => "TL Loss",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value, json};

    fn row(timestamp: i64, value: Value) -> TimeSeriesRow {
        TimeSeriesRow::new(timestamp, value.as_object().cloned().unwrap_or_default())
    }

    fn units() -> Vec<Unit> {
        vec![
            Unit::new("inv1", "Inverter 1", UnitType::Inverter),
            Unit::new("m1", "Main Meter", UnitType::Meter),
        ]
    }

    #[test]
    fn test_metrics_in_discovery_order_without_numeric_keys() {
        let rows = vec![
            row(1, json!({"inv1": {"generation": 1, "0": 5, "dcCapacity": 2}})),
            row(2, json!({"m1": {"netExport": 3, "1.5": 1}, "inv1": {"generationPerKw": 0.4}})),
        ];
        let catalog = resolve_catalog(&rows, &units(), &MetricRegistry::new());
        assert_eq!(
            catalog.metrics,
            vec!["generation", "dcCapacity", "netExport", "generationPerKw"]
        );
        assert!(catalog.supports("generation", &UnitType::Inverter));
        assert!(catalog.supports("netExport", &UnitType::Meter));
        assert!(!catalog.supports("netExport", &UnitType::Inverter));
    }

    #[test]
    fn test_foreign_unit_metrics_are_filtered() {
        let rows = vec![row(
            1,
            json!({"inv1": {"generation": 1}, "other-site-unit": {"irradiance": 900}}),
        )];
        let catalog = resolve_catalog(&rows, &units(), &MetricRegistry::new());
        assert_eq!(catalog.metrics, vec!["generation", "irradiance"]);
        assert_eq!(catalog.filtered_metrics, vec!["generation"]);
        assert!(catalog.unit_types_for("irradiance").is_none());
    }

    #[test]
    fn test_metric_of_absent_unit_type_is_filtered() {
        let rows = vec![row(1, json!({"inv1": {"generation": 1}, "m1": {"netExport": 2}}))];
        let only_inverter = vec![Unit::new("inv1", "Inverter 1", UnitType::Inverter)];
        let catalog = resolve_catalog(&rows, &only_inverter, &MetricRegistry::new());
        assert_eq!(catalog.filtered_metrics, vec!["generation"]);
        assert_eq!(
            catalog.site_unit_types,
            BTreeSet::from([UnitType::Inverter])
        );
    }

    #[test]
    fn test_empty_rows_is_not_loaded() {
        let catalog = resolve_catalog(&[], &units(), &MetricRegistry::solar_defaults());
        assert!(!catalog.is_loaded());
        assert!(catalog.metric_unit_types.is_empty());
        assert!(catalog.filtered_metrics.is_empty());
    }

    #[test]
    fn test_aggregate_fields_are_not_units() {
        let rows = vec![row(1, json!({"inv1": {"generation": 1}, "totalGeneration": 9, "cufGen": 12.1}))];
        let catalog = resolve_catalog(&rows, &units(), &MetricRegistry::new());
        assert_eq!(catalog.metrics, vec!["generation"]);
    }

    #[test]
    fn test_registry_is_authoritative_for_declared_types() {
        let registry = MetricRegistry::new().declare(UnitType::Inverter, ["generation", "dcCapacity"]);
        let rows = vec![row(
            1,
            json!({"inv1": {"generation": 1, "temperature": 40}, "m1": {"netExport": 2}}),
        )];
        let catalog = resolve_catalog(&rows, &units(), &registry);

        assert_eq!(
            catalog.metrics,
            vec!["generation", "temperature", "netExport", "dcCapacity"]
        );
        assert_eq!(catalog.filtered_metrics, vec!["generation", "netExport", "dcCapacity"]);
        assert_eq!(
            catalog.undeclared,
            vec![("temperature".to_string(), UnitType::Inverter)]
        );
        assert!(catalog.supports("netExport", &UnitType::Meter));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let rows = vec![
            row(1, json!({"m1": {"netExport": 1, "netImport": 0}})),
            row(2, json!({"inv1": {"generation": 4}})),
        ];
        let a = resolve_catalog(&rows, &units(), &MetricRegistry::solar_defaults());
        let b = resolve_catalog(&rows, &units(), &MetricRegistry::solar_defaults());
        assert_eq!(a, b);
    }

    #[test]
    fn test_metric_labels() {
        assert_eq!(metric_label("generationPerKw"), "Generation / kW");
        assert_eq!(metric_label("cufNetExport"), "CUF (Net Export)");
        assert_eq!(metric_label("customThing"), "customThing");
    }

    proptest! {
        #[test]
        fn prop_numeric_keys_never_become_metrics(
            keys in proptest::collection::vec(
                prop_oneof!["[a-zA-Z]{1,8}", any::<i32>().prop_map(|n| n.to_string()), any::<f32>().prop_map(|f| f.to_string())],
                1..12,
            )
        ) {
            let mut metrics = Map::new();
            for (i, key) in keys.iter().enumerate() {
                metrics.insert(key.clone(), json!(i));
            }
            let mut value = Map::new();
            value.insert("inv1".to_string(), Value::Object(metrics));
            let rows = vec![TimeSeriesRow::new(0, value)];

            let catalog = resolve_catalog(&rows, &units(), &MetricRegistry::new());
            for metric in &catalog.metrics {
                let parsed = metric.trim().parse::<f64>();
                prop_assert!(!matches!(parsed, Ok(v) if v.is_finite()));
            }
        }
    }
}
