//! Grid view state and the grid-side interface the assistant drives.
//!
//! [`GridState`] mirrors the serializable state of the browser data grid.
//! Its JSON schema doubles as the parameter schema of the
//! `updateGridState` tool.

use std::collections::BTreeMap;
use std::sync::RwLock;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

// ── State ─────────────────────────────────────────────────────────────────────

/// Full display state of the grid. Absent features are reset to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GridState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_visibility: Option<ColumnVisibilityState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_sizing: Option<ColumnSizingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_group: Option<RowGroupState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<PivotState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnVisibilityState {
    /// Columns hidden from view.
    #[serde(default)]
    pub hidden_col_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSizingState {
    #[serde(default)]
    pub column_sizing_model: Vec<ColumnSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSize {
    pub col_id: String,
    /// Width in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Flex weight relative to other flex columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RowGroupState {
    /// Grouping columns, outermost group first.
    #[serde(default)]
    pub group_col_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SortState {
    /// Sort keys, highest priority first.
    #[serde(default)]
    pub sort_model: Vec<SortModelItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SortModelItem {
    pub col_id: String,
    pub sort: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregationState {
    #[serde(default)]
    pub aggregation_model: Vec<AggregationModelItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregationModelItem {
    pub col_id: String,
    pub agg_func: AggFunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggFunc {
    Sum,
    Min,
    Max,
    Count,
    Avg,
    First,
    Last,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PivotState {
    #[serde(default)]
    pub pivot_mode: bool,
    #[serde(default)]
    pub pivot_col_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// Filter definition per column id, in the grid's filter-model format.
    #[serde(default)]
    pub filter_model: BTreeMap<String, Value>,
}

impl GridState {
    /// Human-readable summary, one line per active feature.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(v) = self.column_visibility.as_ref().filter(|v| !v.hidden_col_ids.is_empty()) {
            lines.push(format!("hidden columns: {}", v.hidden_col_ids.join(", ")));
        }
        if let Some(s) = self.column_sizing.as_ref().filter(|s| !s.column_sizing_model.is_empty()) {
            let sizes: Vec<String> = s
                .column_sizing_model
                .iter()
                .map(|c| match (c.width, c.flex) {
                    (_, Some(flex)) => format!("{} flex {flex}", c.col_id),
                    (Some(width), None) => format!("{}={width}px", c.col_id),
                    (None, None) => c.col_id.clone(),
                })
                .collect();
            lines.push(format!("column sizes: {}", sizes.join(", ")));
        }
        if let Some(g) = self.row_group.as_ref().filter(|g| !g.group_col_ids.is_empty()) {
            lines.push(format!("grouped by: {}", g.group_col_ids.join(" > ")));
        }
        if let Some(s) = self.sort.as_ref().filter(|s| !s.sort_model.is_empty()) {
            let keys: Vec<String> = s
                .sort_model
                .iter()
                .map(|k| format!("{} {}", k.col_id, k.sort))
                .collect();
            lines.push(format!("sorted by: {}", keys.join(", ")));
        }
        if let Some(a) = self.aggregation.as_ref().filter(|a| !a.aggregation_model.is_empty()) {
            let aggs: Vec<String> = a
                .aggregation_model
                .iter()
                .map(|m| format!("{}({})", m.agg_func, m.col_id))
                .collect();
            lines.push(format!("aggregations: {}", aggs.join(", ")));
        }
        if let Some(p) = &self.pivot {
            if p.pivot_mode {
                if p.pivot_col_ids.is_empty() {
                    lines.push("pivot mode on".to_owned());
                } else {
                    lines.push(format!("pivot mode on, pivoting by: {}", p.pivot_col_ids.join(", ")));
                }
            }
        }
        if let Some(f) = self.filter.as_ref().filter(|f| !f.filter_model.is_empty()) {
            let cols: Vec<&str> = f.filter_model.keys().map(String::as_str).collect();
            lines.push(format!("filters: {}", cols.join(", ")));
        }

        if lines.is_empty() {
            lines.push("default view".to_owned());
        }
        lines
    }
}

/// JSON schema of [`GridState`], ready to be used as tool parameters.
pub fn grid_schema() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(GridState))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
    }
    schema
}

// ── Grid interface ────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("column `{col_id}` does not support {feature}")]
    FeatureNotAllowed {
        col_id: String,
        feature: &'static str,
    },

    #[error("invalid size for column `{col_id}`: sizes must be positive")]
    InvalidSize { col_id: String },

    #[error("grid state is unavailable")]
    Unavailable,
}

/// State-setting interface of a grid component.
pub trait GridApi: Send + Sync {
    fn state(&self) -> GridState;

    /// Replace the whole state. On error the current state is unchanged.
    fn set_state(&self, state: GridState) -> Result<(), GridError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Number,
    Date,
}

/// Column definition and the features it allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub field: String,
    pub header_name: String,
    pub kind: ColumnKind,
    pub enable_row_group: bool,
    pub enable_pivot: bool,
    pub enable_value: bool,
}

impl ColumnDef {
    pub fn new(field: &str, header_name: &str, kind: ColumnKind) -> Self {
        Self {
            field: field.to_owned(),
            header_name: header_name.to_owned(),
            kind,
            enable_row_group: false,
            enable_pivot: false,
            enable_value: kind == ColumnKind::Number,
        }
    }

    pub fn groupable(mut self) -> Self {
        self.enable_row_group = true;
        self
    }

    pub fn pivotable(mut self) -> Self {
        self.enable_pivot = true;
        self
    }
}

/// In-memory grid holding column definitions and the current state.
#[derive(Debug)]
pub struct Grid {
    columns: Vec<ColumnDef>,
    state: RwLock<GridState>,
}

impl Grid {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            state: RwLock::new(GridState::default()),
        }
    }

    /// Portfolio holdings grid used by the demo.
    pub fn finance_demo() -> Self {
        use ColumnKind::*;
        Self::new(vec![
            ColumnDef::new("ticker", "Ticker", Text).groupable(),
            ColumnDef::new("name", "Name", Text),
            ColumnDef::new("sector", "Sector", Text).groupable().pivotable(),
            ColumnDef::new("instrument", "Instrument", Text).groupable().pivotable(),
            ColumnDef::new("currency", "Currency", Text).groupable().pivotable(),
            ColumnDef::new("quantity", "Quantity", Number),
            ColumnDef::new("price", "Price", Number),
            ColumnDef::new("purchaseDate", "Purchase Date", Date).groupable().pivotable(),
            ColumnDef::new("totalValue", "Total Value", Number),
            ColumnDef::new("gainLoss", "Gain/Loss", Number),
        ])
    }

    /// Tool schema annotated with this grid's columns.
    pub fn schema(&self) -> Value {
        let mut schema = grid_schema();
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} ({}, \"{}\")", c.field, c.kind, c.header_name))
            .collect();
        if let Some(obj) = schema.as_object_mut() {
            obj.insert(
                "description".to_owned(),
                Value::String(format!("Grid state. Available columns: {}", columns.join(", "))),
            );
        }
        schema
    }

    fn column(&self, col_id: &str) -> Result<&ColumnDef, GridError> {
        self.columns
            .iter()
            .find(|c| c.field == col_id)
            .ok_or_else(|| GridError::UnknownColumn(col_id.to_owned()))
    }

    fn require(
        &self,
        col_id: &str,
        feature: &'static str,
        allowed: impl Fn(&ColumnDef) -> bool,
    ) -> Result<(), GridError> {
        if allowed(self.column(col_id)?) {
            Ok(())
        } else {
            Err(GridError::FeatureNotAllowed {
                col_id: col_id.to_owned(),
                feature,
            })
        }
    }

    /// Check `state` against the column definitions.
    pub fn validate(&self, state: &GridState) -> Result<(), GridError> {
        if let Some(v) = &state.column_visibility {
            for id in &v.hidden_col_ids {
                self.column(id)?;
            }
        }
        if let Some(s) = &state.column_sizing {
            for size in &s.column_sizing_model {
                self.column(&size.col_id)?;
                let positive = |v: Option<f64>| v.is_none_or(|v| v.is_finite() && v > 0.0);
                if !positive(size.width) || !positive(size.flex) {
                    return Err(GridError::InvalidSize {
                        col_id: size.col_id.clone(),
                    });
                }
            }
        }
        if let Some(g) = &state.row_group {
            for id in &g.group_col_ids {
                self.require(id, "row grouping", |c| c.enable_row_group)?;
            }
        }
        if let Some(s) = &state.sort {
            for item in &s.sort_model {
                self.column(&item.col_id)?;
            }
        }
        if let Some(a) = &state.aggregation {
            for item in &a.aggregation_model {
                self.require(&item.col_id, "aggregation", |c| c.enable_value)?;
            }
        }
        if let Some(p) = &state.pivot {
            for id in &p.pivot_col_ids {
                self.require(id, "pivoting", |c| c.enable_pivot)?;
            }
        }
        if let Some(f) = &state.filter {
            for id in f.filter_model.keys() {
                self.column(id)?;
            }
        }
        Ok(())
    }
}

impl GridApi for Grid {
    fn state(&self) -> GridState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn set_state(&self, state: GridState) -> Result<(), GridError> {
        self.validate(&state)?;
        let mut current = self.state.write().map_err(|_| GridError::Unavailable)?;
        *current = state;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
