//! Tool binding: callable tools exposed to the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::grid::{GridApi, GridError, GridState};
use crate::protocol::{ToolResult, ToolSpec};

/// Name under which the grid-state tool is advertised.
pub const UPDATE_GRID_STATE: &str = "updateGridState";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("unknown tool `{0}`")]
    UnknownTool(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the call arguments.
    fn parameters(&self) -> Value;

    /// Run the tool on the raw JSON argument text of a call.
    async fn call(&self, arguments: &str) -> Result<Value, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters(),
        }
    }
}

/// Applies model-produced [`GridState`] to a grid.
pub struct UpdateGridState {
    grid: Arc<dyn GridApi>,
    schema: Value,
}

impl UpdateGridState {
    pub fn new(grid: Arc<dyn GridApi>, schema: Value) -> Self {
        Self { grid, schema }
    }

    fn apply(&self, arguments: &str) -> Result<(), ToolError> {
        // No arguments at all means "reset everything".
        let state: GridState = if arguments.trim().is_empty() {
            GridState::default()
        } else {
            serde_json::from_str(arguments)?
        };
        self.grid.set_state(state)?;
        Ok(())
    }
}

#[async_trait]
impl Tool for UpdateGridState {
    fn name(&self) -> &str {
        UPDATE_GRID_STATE
    }

    fn description(&self) -> &str {
        "Update the grid state"
    }

    fn parameters(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, arguments: &str) -> Result<Value, ToolError> {
        self.apply(arguments).map_err(|e| {
            error!(error = %e, "failed to apply grid state");
            e
        })?;
        debug!(state = ?self.grid.state().describe(), "grid state applied");
        Ok(Value::Null)
    }
}

/// Registry of the tools offered to the model.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Run a tool call and settle it. Never fails; errors become `rejected`.
    pub async fn invoke(&self, name: &str, arguments: &str) -> ToolResult {
        match self.try_invoke(name, arguments).await {
            Ok(value) => ToolResult::fulfilled(value),
            Err(e) => {
                warn!(tool = name, error = %e, "tool call rejected");
                ToolResult::rejected(e.to_string())
            }
        }
    }

    async fn try_invoke(&self, name: &str, arguments: &str) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_owned()))?;
        tool.call(arguments).await
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::Grid;
    use tracing_test::traced_test;

    fn toolbox() -> (Arc<Grid>, Toolbox) {
        let grid = Arc::new(Grid::finance_demo());
        let schema = grid.schema();
        let toolbox = Toolbox::new().with(UpdateGridState::new(grid.clone(), schema));
        (grid, toolbox)
    }

    #[tokio::test]
    async fn valid_arguments_update_the_grid() {
        let (grid, toolbox) = toolbox();
        let result = toolbox
            .invoke(
                UPDATE_GRID_STATE,
                r#"{"sort":{"sortModel":[{"colId":"gainLoss","sort":"asc"}]}}"#,
            )
            .await;

        assert!(result.is_fulfilled());
        assert_eq!(grid.state().describe(), vec!["sorted by: gainLoss asc".to_owned()]);
    }

    #[tokio::test]
    #[traced_test]
    async fn invalid_state_is_rejected_and_logged() {
        let (grid, toolbox) = toolbox();
        let result = toolbox
            .invoke(UPDATE_GRID_STATE, r#"{"rowGroup":{"groupColIds":["nope"]}}"#)
            .await;

        match result {
            ToolResult::Rejected { reason } => assert!(reason.contains("nope")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(grid.state(), GridState::default());
        assert!(logs_contain("failed to apply grid state"));
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_json_is_rejected_and_logged() {
        let (grid, toolbox) = toolbox();
        let result = toolbox.invoke(UPDATE_GRID_STATE, "{\"sort\":").await;

        match result {
            ToolResult::Rejected { reason } => assert!(reason.starts_with("invalid arguments")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(grid.state(), GridState::default());
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("failed to apply grid state"));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let (_, toolbox) = toolbox();
        let result = toolbox.invoke("deleteEverything", "{}").await;
        assert_eq!(result, ToolResult::rejected("unknown tool `deleteEverything`"));
    }

    #[tokio::test]
    async fn empty_arguments_reset_the_grid() {
        let (grid, toolbox) = toolbox();
        toolbox
            .invoke(UPDATE_GRID_STATE, r#"{"rowGroup":{"groupColIds":["sector"]}}"#)
            .await;
        assert!(toolbox.invoke(UPDATE_GRID_STATE, "").await.is_fulfilled());
        assert_eq!(grid.state(), GridState::default());
    }

    #[test]
    fn specs_advertise_the_grid_tool_once() {
        let (grid, mut toolbox) = toolbox();
        toolbox.register(Arc::new(UpdateGridState::new(grid, Value::Null)));

        let specs = toolbox.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "updateGridState");
        assert_eq!(specs[0].description, "Update the grid state");
        assert_eq!(specs[0].parameters, Value::Null);
    }
}
