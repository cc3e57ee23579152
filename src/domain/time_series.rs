// Daily generation report rows
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Site-level scalar fields that may sit beside the per-unit maps inside a
/// row's `value`. These keys are never unit identifiers.
pub const AGGREGATE_FIELDS: [&str; 7] = [
    "totalGeneration",
    "site_capacity",
    "totalGenerationPerKw",
    "cufGen",
    "prGen",
    "cufNetExport",
    "tlLoss",
];

pub fn is_aggregate_field(key: &str) -> bool {
    AGGREGATE_FIELDS.contains(&key)
}

/// One day of a site's report: `value` maps unit ids to metric maps and may
/// also carry aggregate scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRow {
    pub timestamp: i64,
    #[serde(default)]
    pub value: Map<String, Value>,
}

impl TimeSeriesRow {
    pub fn new(timestamp: i64, value: Map<String, Value>) -> Self {
        Self { timestamp, value }
    }

    /// Metric map stored under `key`, if that entry is an object.
    pub fn unit_metrics(&self, key: &str) -> Option<&Map<String, Value>> {
        self.value.get(key).and_then(Value::as_object)
    }

    /// Non-null value of `metric` for `unit_id`.
    pub fn metric_value(&self, unit_id: &str, metric: &str) -> Option<&Value> {
        self.unit_metrics(unit_id)
            .and_then(|metrics| metrics.get(metric))
            .filter(|v| !v.is_null())
    }

    /// Non-null aggregate scalar stored at the top level of `value`.
    pub fn aggregate(&self, field: &str) -> Option<&Value> {
        self.value
            .get(field)
            .filter(|v| !v.is_null() && !v.is_object())
    }

    /// Entries of `value` that look like per-unit metric maps.
    pub fn object_entries(&self) -> impl Iterator<Item = (&String, &Map<String, Value>)> {
        self.value
            .iter()
            .filter(|(key, _)| !is_aggregate_field(key))
            .filter_map(|(key, v)| v.as_object().map(|m| (key, m)))
    }
}

/// Parse a `{ dgr_data: [...] }` response. Missing fields degrade to an empty
/// row set; rows without a usable timestamp are dropped.
pub fn parse_dgr_payload(payload: &Value) -> Vec<TimeSeriesRow> {
    let Some(entries) = payload.get("dgr_data").and_then(Value::as_array) else {
        tracing::warn!("DGR payload has no `dgr_data` array; treating as empty");
        return Vec::new();
    };

    entries.iter().filter_map(parse_row).collect()
}

fn parse_row(entry: &Value) -> Option<TimeSeriesRow> {
    let timestamp = match entry.get("timestamp") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    let Some(timestamp) = timestamp else {
        tracing::warn!("Dropping DGR row without a usable timestamp");
        return None;
    };

    let value = match entry.get("value") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Some(TimeSeriesRow::new(timestamp, value))
}
