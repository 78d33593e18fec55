pub mod backend;
pub mod config;
pub mod error;
pub mod logical_id;
pub mod node;
pub mod parser;
pub mod store;
pub mod tree;

pub use backend::{
    FailureKind, FileBackend, MemoryBackend, NodeBackend, RawStub, RecordFailure, SqliteBackend,
};
pub use config::{StoreConfig, Workspace};
pub use error::{HierNoteError, Result};
pub use logical_id::Hierarchy;
pub use node::{
    DataKind, Node, NodeData, NodeRecord, NodeStub, NodeType, NoteData, Payload, SchemaData,
    SchemaKind, Scope, VaultRef,
};
pub use parser::{string_to_note, NoteDefaults, NoteParser, NoteProps};
pub use store::NodeStore;
pub use tree::{materialize, Materialized};
