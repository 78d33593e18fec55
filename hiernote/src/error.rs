use crate::node::DataKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HierNoteError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Orphaned nodes with no ancestor in the tree: {}", ids.join(", "))]
    Orphan { ids: Vec<String> },

    #[error("Node not found: {kind}/{logical_id}")]
    NotFound { kind: DataKind, logical_id: String },

    #[error("No {kind} with id '{id}'")]
    IdNotFound { kind: DataKind, id: String },

    #[error("Node already exists: {kind}/{logical_id}")]
    AlreadyExists { kind: DataKind, logical_id: String },

    #[error("No {kind} records in scope, tree has no root")]
    EmptyStore { kind: DataKind },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HierNoteError>;
