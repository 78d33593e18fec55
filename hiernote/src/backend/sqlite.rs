use super::{NodeBackend, RawStub, RecordFailure, Snapshot};
use crate::error::{HierNoteError, Result};
use crate::node::{DataKind, Scope};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed node table. Connection work runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        initialize_tables(&conn)?;
        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| HierNoteError::Other("sqlite connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| HierNoteError::Other(format!("sqlite task failed: {e}")))?
    }
}

fn initialize_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            scope TEXT NOT NULL,
            kind TEXT NOT NULL,
            logical_id TEXT NOT NULL,
            id TEXT NOT NULL,
            data_json TEXT NOT NULL,
            body TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope, kind, logical_id)
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_id ON nodes(scope, kind, id);
        ",
    )?;
    Ok(())
}

/// A row before its JSON payload has been checked.
struct NodeRow {
    id: String,
    logical_id: String,
    data_json: String,
    body: Option<String>,
}

impl NodeRow {
    fn into_raw(self) -> std::result::Result<RawStub, (String, serde_json::Error)> {
        match serde_json::from_str(&self.data_json) {
            Ok(data) => Ok(RawStub {
                id: self.id,
                logical_id: self.logical_id,
                data,
                body: self.body,
            }),
            Err(e) => Err((self.logical_id, e)),
        }
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        id: row.get(0)?,
        logical_id: row.get(1)?,
        data_json: row.get(2)?,
        body: row.get(3)?,
    })
}

#[async_trait]
impl NodeBackend for SqliteBackend {
    async fn read_all(&self, scope: &Scope, kind: DataKind) -> Result<Snapshot> {
        let scope = scope.as_str().to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, logical_id, data_json, body FROM nodes
                 WHERE scope = ?1 AND kind = ?2 ORDER BY logical_id",
            )?;
            let rows = stmt
                .query_map(params![scope, kind.as_str()], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut snapshot = Snapshot::default();
            for row in rows {
                match row.into_raw() {
                    Ok(raw) => {
                        snapshot.stubs.insert(raw.logical_id.clone(), raw);
                    }
                    Err((logical_id, e)) => {
                        log::warn!("Unreadable payload for {kind} '{logical_id}': {e}");
                        snapshot.failures.push(RecordFailure::parse(logical_id, e));
                    }
                }
            }
            Ok(snapshot)
        })
        .await
    }

    async fn read_one(
        &self,
        scope: &Scope,
        logical_id: &str,
        kind: DataKind,
    ) -> Result<Option<RawStub>> {
        let scope = scope.as_str().to_string();
        let logical_id = logical_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, logical_id, data_json, body FROM nodes
                     WHERE scope = ?1 AND kind = ?2 AND logical_id = ?3",
                    params![scope, kind.as_str(), logical_id],
                    map_row,
                )
                .optional()?;
            match row {
                Some(row) => row
                    .into_raw()
                    .map(Some)
                    .map_err(|(id, e)| HierNoteError::Parse(format!("stored payload for '{id}': {e}"))),
                None => Ok(None),
            }
        })
        .await
    }

    async fn read_by_id(&self, scope: &Scope, id: &str, kind: DataKind) -> Result<Option<RawStub>> {
        let scope = scope.as_str().to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, logical_id, data_json, body FROM nodes
                     WHERE scope = ?1 AND kind = ?2 AND id = ?3
                     ORDER BY logical_id LIMIT 1",
                    params![scope, kind.as_str(), id],
                    map_row,
                )
                .optional()?;
            match row {
                Some(row) => row
                    .into_raw()
                    .map(Some)
                    .map_err(|(id, e)| HierNoteError::Parse(format!("stored payload for '{id}': {e}"))),
                None => Ok(None),
            }
        })
        .await
    }

    async fn upsert(&self, scope: &Scope, stub: RawStub, kind: DataKind) -> Result<()> {
        let scope = scope.as_str().to_string();
        self.with_conn(move |conn| {
            let data_json = serde_json::to_string(&stub.data)?;
            conn.execute(
                "INSERT OR REPLACE INTO nodes (scope, kind, logical_id, id, data_json, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    scope,
                    kind.as_str(),
                    stub.logical_id,
                    stub.id,
                    data_json,
                    stub.body
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<bool> {
        let scope = scope.as_str().to_string();
        let logical_id = logical_id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM nodes WHERE scope = ?1 AND kind = ?2 AND logical_id = ?3",
                params![scope, kind.as_str(), logical_id],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
