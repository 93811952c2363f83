//! Grid whose state is mirrored to a JSON file.

use std::path::{Path, PathBuf};

use gridchat_core::{Grid, GridApi, GridError, GridState};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} does not hold a grid state: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("saved grid state does not fit the grid: {0}")]
    Grid(#[from] GridError),
}

/// Wraps a [`Grid`]; every accepted state is written to `path`.
pub struct FileBackedGrid {
    grid: Grid,
    path: Option<PathBuf>,
}

impl FileBackedGrid {
    /// Load the saved state, if the file exists, into `grid`.
    pub fn open(grid: Grid, path: Option<PathBuf>) -> Result<Self, StoreError> {
        if let Some(path) = path.as_deref().filter(|p| p.exists()) {
            let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
                path: path.to_owned(),
                source,
            })?;
            let state: GridState =
                serde_json::from_str(&text).map_err(|source| StoreError::Json {
                    path: path.to_owned(),
                    source,
                })?;
            grid.set_state(state)?;
            debug!(path = %path.display(), "grid state loaded");
        }
        Ok(Self { grid, path })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn save(&self, path: &Path, state: &GridState) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(state).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })
    }
}

impl GridApi for FileBackedGrid {
    fn state(&self) -> GridState {
        self.grid.state()
    }

    fn set_state(&self, state: GridState) -> Result<(), GridError> {
        self.grid.set_state(state.clone())?;
        if let Some(path) = &self.path {
            // The grid already changed; a failed save only loses persistence.
            if let Err(e) = self.save(path, &state) {
                warn!(error = %e, "failed to save grid state");
            }
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
