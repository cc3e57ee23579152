// Site unit domain model
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category of a physical unit. Decides which metrics are meaningful for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitType {
    Inverter,
    Meter,
    Other(String),
}

impl UnitType {
    pub fn as_str(&self) -> &str {
        match self {
            UnitType::Inverter => "Inverter",
            UnitType::Meter => "Meter",
            UnitType::Other(name) => name,
        }
    }
}

impl From<String> for UnitType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Inverter" => UnitType::Inverter,
            "Meter" => UnitType::Meter,
            _ => UnitType::Other(value),
        }
    }
}

impl From<&str> for UnitType {
    fn from(value: &str) -> Self {
        UnitType::from(value.to_string())
    }
}

impl From<UnitType> for String {
    fn from(value: UnitType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub unit_id: String,
    #[serde(default)]
    pub unit_name: String,
    pub unit_type: UnitType,
}

impl Unit {
    pub fn new(unit_id: impl Into<String>, unit_name: impl Into<String>, unit_type: UnitType) -> Self {
        Self {
            unit_id: unit_id.into(),
            unit_name: unit_name.into(),
            unit_type,
        }
    }

    /// Header label for the unit; falls back to the id when the name is blank.
    pub fn label(&self) -> &str {
        if self.unit_name.trim().is_empty() {
            &self.unit_id
        } else {
            &self.unit_name
        }
    }
}

/// Parse a `{ units: [...] }` response. Entries that are not valid units are
/// skipped, and a missing `units` field yields an empty list.
pub fn parse_units_payload(payload: &Value) -> Vec<Unit> {
    let Some(entries) = payload.get("units").and_then(Value::as_array) else {
        tracing::warn!("Unit list payload has no `units` array; treating as empty");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Unit>(entry.clone()) {
            Ok(unit) => Some(unit),
            Err(e) => {
                tracing::warn!("Skipping malformed unit entry: {}", e);
                None
            }
        })
        .collect()
}

pub fn find_unit<'a>(units: &'a [Unit], unit_id: &str) -> Option<&'a Unit> {
    units.iter().find(|u| u.unit_id == unit_id)
}
