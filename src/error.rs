//! Run-aborting error conditions.
//!
//! Per-object and per-language failures never show up here: they are
//! absorbed by the pipeline and recorded in the output row instead.

use std::path::PathBuf;

use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The input table lacks the identifier and/or image column.
    #[error("required column(s) {} not found in input table", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("no {variable} found; set it in the environment or a .env file")]
    MissingCredential { variable: String },

    #[error("failed to {action} table {}: {source}", path.display())]
    Table {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CatalogError {
    pub fn read_table(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        CatalogError::Table {
            action: "read",
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn write_table(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        CatalogError::Table {
            action: "write",
            path: path.into(),
            source: source.into(),
        }
    }

    /// Category label attached to the abort log.
    pub fn category(&self) -> &'static str {
        match self {
            CatalogError::MissingColumns { .. } => "missing_columns",
            CatalogError::MissingCredential { .. } => "missing_credential",
            CatalogError::Table { .. } => "table_io",
            CatalogError::InvalidConfig(_) => "invalid_config",
        }
    }
}
