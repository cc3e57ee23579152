// Fleet-level totals and the fleet overview table
use super::pivot::{Cell, Column, FlatRow, PivotTable};
use serde::Serialize;
use serde_json::{Map, Value};

const HOURS_PER_DAY: f64 = 24.0;

/// One site's entry in the fleet overview response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteOverview {
    pub site_id: Option<String>,
    pub fields: Map<String, Value>,
}

impl SiteOverview {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// Numeric reading of `key` for summation; anything unusable counts as 0.
    pub fn number(&self, key: &str) -> f64 {
        coerce_number(self.field(key))
    }

    pub fn name(&self) -> Option<&str> {
        ["site_name", "name"]
            .iter()
            .find_map(|key| self.field(key).and_then(Value::as_str))
            .filter(|name| !name.trim().is_empty())
    }
}

/// Parse `{ site_overview: [...] }`. Entries may be flat or carry their
/// readings under `site_data`.
pub fn parse_fleet_payload(payload: &Value) -> Vec<SiteOverview> {
    let Some(entries) = payload.get("site_overview").and_then(Value::as_array) else {
        tracing::warn!("Fleet payload has no `site_overview` array; treating as empty");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(Value::as_object)
        .map(|entry| {
            let fields = match entry.get("site_data").and_then(Value::as_object) {
                Some(nested) => nested.clone(),
                None => entry.clone(),
            };
            let site_id = entry
                .get("site_id")
                .or_else(|| fields.get("site_id"))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            SiteOverview { site_id, fields }
        })
        .collect()
}

/// Numbers and numeric strings count; anything else, or a non-finite
/// result, is 0.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() { n } else { 0.0 }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub generation: f64,
    pub net_export: f64,
    pub site_capacity: f64,
    pub total_days: u32,
    pub cuf_gen: f64,
    pub cuf_export: f64,
    pub tl_loss: f64,
}

impl Totals {
    /// Derive the ratios from raw sums. Guards keep NaN and infinity out.
    pub fn from_sums(generation: f64, net_export: f64, site_capacity: f64, total_days: u32) -> Self {
        let capacity_hours = site_capacity * HOURS_PER_DAY * f64::from(total_days);
        let cuf = |energy: f64| {
            if total_days == 0 || capacity_hours == 0.0 {
                0.0
            } else {
                finite_or_zero(energy / capacity_hours * 100.0)
            }
        };
        let tl_loss = if generation == 0.0 {
            0.0
        } else {
            finite_or_zero((generation - net_export) / generation * 100.0)
        };

        Self {
            generation,
            net_export,
            site_capacity,
            total_days,
            cuf_gen: cuf(generation),
            cuf_export: cuf(net_export),
            tl_loss,
        }
    }

    pub fn formatted(&self) -> FormattedTotals {
        FormattedTotals {
            generation: format!("{:.2}", self.generation),
            net_export: format!("{:.2}", self.net_export),
            site_capacity: format!("{:.2}", self.site_capacity),
            cuf_gen: format!("{:.2}", self.cuf_gen),
            cuf_export: format!("{:.2}", self.cuf_export),
            tl_loss: format!("{:.2}", self.tl_loss),
        }
    }
}

fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() { n } else { 0.0 }
}

/// Summary-card strings, two decimals each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedTotals {
    pub generation: String,
    pub net_export: String,
    pub site_capacity: String,
    pub cuf_gen: String,
    pub cuf_export: String,
    pub tl_loss: String,
}

/// Sum the fleet rows. Each entry counts as one day of capacity.
pub fn calculate_totals(entries: &[SiteOverview]) -> Totals {
    let (generation, net_export, site_capacity) =
        entries.iter().fold((0.0, 0.0, 0.0), |(g, e, c), entry| {
            (
                g + entry.number("generation"),
                e + entry.number("netExport"),
                c + entry.number("site_capacity"),
            )
        });
    let total_days = u32::try_from(entries.len()).unwrap_or(u32::MAX);
    Totals::from_sums(generation, net_export, site_capacity, total_days)
}

const FLEET_COLUMNS: [(&str, &str); 6] = [
    ("site_capacity", "Capacity (kWp)"),
    ("generation", "Generation (kWh)"),
    ("netExport", "Net Export (kWh)"),
    ("cufGen", "CUF Gen (%)"),
    ("cufExport", "CUF Export (%)"),
    ("tlLoss", "TL Loss (%)"),
];

/// One row per site, raw values as reported; gaps render as `"-"`.
pub fn fleet_table(entries: &[SiteOverview]) -> PivotTable {
    let mut columns = vec![Column::leaf("site_name", "Project")];
    columns.extend(FLEET_COLUMNS.iter().map(|(key, header)| Column::leaf(*key, *header)));

    let rows = entries
        .iter()
        .map(|entry| {
            let mut cells = Vec::with_capacity(FLEET_COLUMNS.len() + 1);
            let name = match entry.name() {
                Some(name) => Cell::Text(name.to_string()),
                None => Cell::Missing,
            };
            cells.push(("site_name".to_string(), name));
            for (key, _) in FLEET_COLUMNS {
                cells.push((key.to_string(), Cell::from_value(entry.field(key))));
            }
            FlatRow::new(cells)
        })
        .collect();

    PivotTable { columns, rows }
}
