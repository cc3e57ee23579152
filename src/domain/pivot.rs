// View-mode pivot: nested per-unit rows into flat table rows and columns
use super::calendar::ReportingCalendar;
use super::catalog::{Catalog, metric_label};
use super::site::{Unit, find_unit};
use super::time_series::{AGGREGATE_FIELDS, TimeSeriesRow};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

pub const DATE_KEY: &str = "date";
pub const PLACEHOLDER: &str = "-";

/// Separator between unit id and metric in all-metrics column keys. Double
/// underscore so ids and metrics containing `_` stay unambiguous.
pub const KEY_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewMode {
    #[default]
    SingleMetricAllUnits,
    SingleUnitAllMetrics,
    AllMetricsAllUnits,
}

/// Outer header axis for `ALL_METRICS_ALL_UNITS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnGrouping {
    /// Unit name on top, one metric per leaf.
    #[default]
    ByUnit,
    /// Metric label on top, one unit per leaf.
    ByMetric,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub metric: Option<String>,
    pub unit_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub mode: ViewMode,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub grouping: ColumnGrouping,
}

/// Keep the requested metric/unit when still valid, otherwise fall back to
/// the first valid option. Never fails.
pub fn resolve_selection(catalog: &Catalog, units: &[Unit], requested: &Selection) -> Selection {
    let metric = requested
        .metric
        .as_ref()
        .filter(|m| catalog.is_filtered_metric(m))
        .or_else(|| catalog.filtered_metrics.first())
        .cloned();

    let unit_id = requested
        .unit_id
        .as_ref()
        .filter(|id| find_unit(units, id).is_some())
        .or_else(|| units.first().map(|u| &u.unit_id))
        .cloned();

    Selection { metric, unit_id }
}

/// One rendered table cell. Absent values render as `"-"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(Number),
    Text(String),
    Missing,
}

impl Cell {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => Cell::Number(n.clone()),
            Some(Value::String(s)) => Cell::Text(s.clone()),
            Some(Value::Bool(b)) => Cell::Text(b.to_string()),
            _ => Cell::Missing,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Missing => PLACEHOLDER.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Number(_) => 0,
            Cell::Text(_) => 1,
            Cell::Missing => 2,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Number(n) => n.serialize(serializer),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Missing => serializer.serialize_str(PLACEHOLDER),
        }
    }
}

/// Column descriptor. Group columns carry `columns`; leaves match row keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub key: String,
    pub header: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,
}

impl Column {
    pub fn leaf(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            columns: Vec::new(),
        }
    }

    pub fn group(key: impl Into<String>, header: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            columns,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.columns.is_empty()
    }

    fn collect_leaf_keys<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.is_leaf() {
            out.push(&self.key);
        } else {
            for child in &self.columns {
                child.collect_leaf_keys(out);
            }
        }
    }
}

/// Ordered `key -> cell` map for one table row.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    cells: Vec<(String, Cell)>,
}

impl FlatRow {
    pub fn new(cells: Vec<(String, Cell)>) -> Self {
        Self { cells }
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    fn matches(&self, needle: &str) -> bool {
        self.cells
            .iter()
            .any(|(_, cell)| cell.display().to_lowercase().contains(needle))
    }
}

impl Serialize for FlatRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, cell) in &self.cells {
            map.serialize_entry(key, cell)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Client-side search and sort applied after pivoting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableQuery {
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PivotTable {
    pub columns: Vec<Column>,
    pub rows: Vec<FlatRow>,
}

impl PivotTable {
    pub fn leaf_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        for column in &self.columns {
            column.collect_leaf_keys(&mut keys);
        }
        keys
    }

    /// Keep rows where any rendered cell contains `needle`, ignoring case.
    pub fn filter(&mut self, needle: &str) {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return;
        }
        self.rows.retain(|row| row.matches(&needle));
    }

    /// Stable sort on one column. Placeholders always sort last.
    pub fn sort_by(&mut self, key: &str, direction: SortDirection) {
        self.rows.sort_by(|a, b| {
            let (Some(x), Some(y)) = (a.get(key), b.get(key)) else {
                return Ordering::Equal;
            };
            compare_cells(x, y, direction)
        });
    }

    pub fn apply(mut self, query: &TableQuery) -> Self {
        if let Some(needle) = &query.search {
            self.filter(needle);
        }
        if let Some(sort) = &query.sort {
            self.sort_by(&sort.key, sort.direction);
        }
        self
    }
}

fn compare_cells(a: &Cell, b: &Cell, direction: SortDirection) -> Ordering {
    let by_rank = a.rank().cmp(&b.rank());
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    let ordering = match (a, b) {
        (Cell::Number(_), Cell::Number(_)) => {
            let x = a.as_f64().unwrap_or_default();
            let y = b.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
        _ => Ordering::Equal,
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Where a leaf column's value comes from.
#[derive(Debug, Clone)]
enum CellSource {
    Date,
    UnitMetric { unit_id: String, metric: String },
    Aggregate(String),
}

/// Hands out unique leaf keys; `date` is always reserved.
struct KeyAllocator {
    used: HashSet<String>,
}

impl KeyAllocator {
    fn new() -> Self {
        Self {
            used: HashSet::from([DATE_KEY.to_string()]),
        }
    }

    fn allocate(&mut self, preferred: &str, fallback: &str) -> String {
        for candidate in [preferred, fallback] {
            if !candidate.is_empty() && self.used.insert(candidate.to_string()) {
                return candidate.to_string();
            }
        }
        let base = if fallback.is_empty() { preferred } else { fallback };
        let mut n = 2;
        loop {
            let candidate = format!("{}{}{}", base, KEY_SEPARATOR, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

struct Layout {
    columns: Vec<Column>,
    leaves: Vec<(String, CellSource)>,
}

impl Layout {
    fn new() -> Self {
        Self {
            columns: vec![Column::leaf(DATE_KEY, "Date")],
            leaves: vec![(DATE_KEY.to_string(), CellSource::Date)],
        }
    }
}

/// Reshape `rows` for the requested view. Rows come out in ascending
/// timestamp order and every row carries exactly the table's leaf keys.
pub fn pivot(
    rows: &[TimeSeriesRow],
    units: &[Unit],
    catalog: &Catalog,
    view: &ViewState,
    calendar: &ReportingCalendar,
) -> PivotTable {
    let selection = resolve_selection(catalog, units, &view.selection);
    let mut keys = KeyAllocator::new();

    let layout = match view.mode {
        ViewMode::SingleMetricAllUnits => {
            single_metric_layout(units, catalog, selection.metric.as_deref(), &mut keys)
        }
        ViewMode::SingleUnitAllMetrics => {
            single_unit_layout(units, catalog, selection.unit_id.as_deref(), &mut keys)
        }
        ViewMode::AllMetricsAllUnits => {
            all_metrics_layout(rows, units, catalog, view.grouping, &mut keys)
        }
    };

    let mut ordered: Vec<&TimeSeriesRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.timestamp);

    let flat_rows = ordered
        .into_iter()
        .map(|row| {
            FlatRow::new(
                layout
                    .leaves
                    .iter()
                    .map(|(key, source)| (key.clone(), read_cell(row, source, calendar)))
                    .collect(),
            )
        })
        .collect();

    PivotTable {
        columns: layout.columns,
        rows: flat_rows,
    }
}

fn read_cell(row: &TimeSeriesRow, source: &CellSource, calendar: &ReportingCalendar) -> Cell {
    match source {
        CellSource::Date => Cell::Text(calendar.format_date(row.timestamp)),
        CellSource::UnitMetric { unit_id, metric } => Cell::from_value(row.metric_value(unit_id, metric)),
        CellSource::Aggregate(field) => Cell::from_value(row.aggregate(field)),
    }
}

fn unit_metric_key(unit_id: &str, metric: &str) -> String {
    format!("{}{}{}", unit_id, KEY_SEPARATOR, metric)
}

fn single_metric_layout(
    units: &[Unit],
    catalog: &Catalog,
    metric: Option<&str>,
    keys: &mut KeyAllocator,
) -> Layout {
    let mut layout = Layout::new();
    let Some(metric) = metric else {
        return layout;
    };

    for unit in units.iter().filter(|u| catalog.supports(metric, &u.unit_type)) {
        let key = keys.allocate(&unit.unit_name, &unit.unit_id);
        layout.columns.push(Column::leaf(key.clone(), unit.label()));
        layout.leaves.push((
            key,
            CellSource::UnitMetric {
                unit_id: unit.unit_id.clone(),
                metric: metric.to_string(),
            },
        ));
    }
    layout
}

fn single_unit_layout(
    units: &[Unit],
    catalog: &Catalog,
    unit_id: Option<&str>,
    keys: &mut KeyAllocator,
) -> Layout {
    let mut layout = Layout::new();
    let Some(unit) = unit_id.and_then(|id| find_unit(units, id)) else {
        return layout;
    };

    for metric in catalog
        .filtered_metrics
        .iter()
        .filter(|m| catalog.supports(m, &unit.unit_type))
    {
        let key = keys.allocate(metric, metric);
        layout.columns.push(Column::leaf(key.clone(), metric_label(metric)));
        layout.leaves.push((
            key,
            CellSource::UnitMetric {
                unit_id: unit.unit_id.clone(),
                metric: metric.clone(),
            },
        ));
    }
    layout
}

fn all_metrics_layout(
    rows: &[TimeSeriesRow],
    units: &[Unit],
    catalog: &Catalog,
    grouping: ColumnGrouping,
    keys: &mut KeyAllocator,
) -> Layout {
    let mut layout = Layout::new();

    match grouping {
        ColumnGrouping::ByUnit => {
            for unit in units {
                let mut leaves = Vec::new();
                for metric in catalog
                    .filtered_metrics
                    .iter()
                    .filter(|m| catalog.supports(m, &unit.unit_type))
                {
                    let pair = unit_metric_key(&unit.unit_id, metric);
                    let key = keys.allocate(&pair, &pair);
                    leaves.push(Column::leaf(key.clone(), metric_label(metric)));
                    layout.leaves.push((
                        key,
                        CellSource::UnitMetric {
                            unit_id: unit.unit_id.clone(),
                            metric: metric.clone(),
                        },
                    ));
                }
                if !leaves.is_empty() {
                    layout.columns.push(Column::group(
                        format!("unit:{}", unit.unit_id),
                        unit.label(),
                        leaves,
                    ));
                }
            }
        }
        ColumnGrouping::ByMetric => {
            for metric in &catalog.filtered_metrics {
                let mut leaves = Vec::new();
                for unit in units.iter().filter(|u| catalog.supports(metric, &u.unit_type)) {
                    let pair = unit_metric_key(&unit.unit_id, metric);
                    let key = keys.allocate(&pair, &pair);
                    leaves.push(Column::leaf(key.clone(), unit.label()));
                    layout.leaves.push((
                        key,
                        CellSource::UnitMetric {
                            unit_id: unit.unit_id.clone(),
                            metric: metric.clone(),
                        },
                    ));
                }
                if !leaves.is_empty() {
                    layout.columns.push(Column::group(
                        format!("metric:{}", metric),
                        metric_label(metric),
                        leaves,
                    ));
                }
            }
        }
    }

    for field in AGGREGATE_FIELDS {
        if rows.iter().any(|row| row.aggregate(field).is_some()) {
            let key = keys.allocate(field, field);
            layout.columns.push(Column::leaf(key.clone(), metric_label(field)));
            layout.leaves.push((key, CellSource::Aggregate(field.to_string())));
        }
    }

    layout
}
