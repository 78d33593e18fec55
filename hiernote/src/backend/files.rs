use super::{FailureKind, NodeBackend, RawStub, RecordFailure, Snapshot};
use crate::error::{HierNoteError, Result};
use crate::node::{DataKind, NoteData, Scope, VaultRef};
use crate::parser::{content_hash, NoteDefaults, NoteParser, NoteProps};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const NOTE_EXT: &str = ".md";
const SCHEMA_EXT: &str = ".schema.yml";
const ID_LEN: usize = 23;

fn epoch_millis(time: std::io::Result<SystemTime>) -> Option<i64> {
    time.ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
}

/// Defaults for a note file that leaves out its id or timestamps. The id is
/// derived from the vault and logical id so every read of the same file
/// yields the same stub; timestamps come from the file itself.
fn file_defaults(vault: &VaultRef, logical_id: &str, meta: Option<&Metadata>) -> NoteDefaults {
    let mut id = content_hash(&format!("{vault}/{logical_id}"));
    id.truncate(ID_LEN);
    let modified = meta.and_then(|m| epoch_millis(m.modified()));
    let created = meta.and_then(|m| epoch_millis(m.created())).or(modified);
    NoteDefaults {
        id: Some(id),
        created,
        updated: modified.or(created),
    }
}

#[derive(Debug, Clone)]
struct Vault {
    vault: VaultRef,
    dir: PathBuf,
}

/// Vault directories on disk, one per scope. Notes are front matter
/// documents named `<logical id>.md`; schemas are YAML files named
/// `<logical id>.schema.yml`.
#[derive(Clone)]
pub struct FileBackend {
    vaults: HashMap<Scope, Vault>,
    parser: NoteParser,
    calculate_hash: bool,
}

impl FileBackend {
    pub fn new(parser: NoteParser) -> Self {
        FileBackend {
            vaults: HashMap::new(),
            parser,
            calculate_hash: false,
        }
    }

    /// Record a content hash on every note read from disk.
    pub fn with_content_hash(mut self, calculate_hash: bool) -> Self {
        self.calculate_hash = calculate_hash;
        self
    }

    pub fn with_vault(mut self, scope: Scope, vault: VaultRef, dir: impl Into<PathBuf>) -> Self {
        self.vaults.insert(
            scope,
            Vault {
                vault,
                dir: dir.into(),
            },
        );
        self
    }

    pub fn vault_dir(&self, scope: &Scope) -> Option<&Path> {
        self.vaults.get(scope).map(|v| v.dir.as_path())
    }

    fn vault_for_write(&self, scope: &Scope) -> Result<&Vault> {
        self.vaults.get(scope).ok_or_else(|| {
            HierNoteError::Config(format!("no vault registered for scope '{scope}'"))
        })
    }

    fn file_path(dir: &Path, logical_id: &str, kind: DataKind) -> Result<PathBuf> {
        if logical_id.contains(['/', '\\']) || logical_id.starts_with('.') {
            return Err(HierNoteError::Validation(format!(
                "logical id '{logical_id}' cannot be used as a file name"
            )));
        }
        let ext = match kind {
            DataKind::Note => NOTE_EXT,
            DataKind::Schema => SCHEMA_EXT,
        };
        Ok(dir.join(format!("{logical_id}{ext}")))
    }

    /// Logical id for a file name, if the file holds records of `kind`.
    fn logical_id_of(file_name: &str, kind: DataKind) -> Option<&str> {
        let stem = match kind {
            DataKind::Schema => file_name.strip_suffix(SCHEMA_EXT),
            DataKind::Note => file_name.strip_suffix(NOTE_EXT),
        };
        stem.filter(|id| !id.is_empty())
    }

    fn decode_file(
        &self,
        vault: &Vault,
        logical_id: &str,
        text: &str,
        meta: Option<&Metadata>,
        kind: DataKind,
    ) -> Result<RawStub> {
        match kind {
            DataKind::Note => {
                let defaults = file_defaults(&vault.vault, logical_id, meta);
                let mut note = self
                    .parser
                    .parse_with(text, logical_id, &vault.vault, false, &defaults)?;
                // A hash written with the note describes its source text; keep it
                if note.content_hash.is_none() && self.calculate_hash {
                    note.content_hash = Some(content_hash(text));
                }
                let body = note.body.clone();
                let id = note.id.clone();
                Ok(RawStub {
                    id,
                    logical_id: logical_id.to_string(),
                    data: serde_json::to_value(note.data())?,
                    body: Some(body),
                })
            }
            DataKind::Schema => {
                let mut raw: RawStub = serde_yaml::from_str(text)
                    .map_err(|e| HierNoteError::Parse(format!("schema file: {e}")))?;
                if raw.logical_id != logical_id {
                    log::warn!(
                        "Schema file '{logical_id}' declares logical id '{}', using the file name",
                        raw.logical_id
                    );
                    raw.logical_id = logical_id.to_string();
                }
                Ok(raw)
            }
        }
    }

    fn encode_file(&self, vault: &Vault, stub: &RawStub, kind: DataKind) -> Result<String> {
        match kind {
            DataKind::Note => {
                let data: NoteData = serde_json::from_value(stub.data.clone()).map_err(|e| {
                    HierNoteError::Validation(format!("note '{}': {e}", stub.logical_id))
                })?;
                let note = NoteProps {
                    id: stub.id.clone(),
                    title: data.title,
                    desc: data.desc,
                    fname: stub.logical_id.clone(),
                    vault: vault.vault.clone(),
                    body: stub.body.clone().unwrap_or_default(),
                    created: data.created,
                    updated: data.updated,
                    tags: data.tags,
                    custom: data.custom,
                    content_hash: data.content_hash,
                    note_type: "note".to_string(),
                };
                self.parser.to_text(&note)
            }
            DataKind::Schema => Ok(serde_yaml::to_string(stub)?),
        }
    }
}

#[async_trait]
impl NodeBackend for FileBackend {
    async fn read_all(&self, scope: &Scope, kind: DataKind) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        let Some(vault) = self.vaults.get(scope) else {
            return Ok(snapshot);
        };

        let mut entries = match tokio::fs::read_dir(&vault.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(snapshot),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    let lossy = name.to_string_lossy().into_owned();
                    if Self::logical_id_of(&lossy, kind).is_some() {
                        log::warn!("Skipping {}: file name is not valid UTF-8", entry.path().display());
                        snapshot.failures.push(RecordFailure::new(
                            lossy,
                            FailureKind::Validation,
                            "file name is not valid UTF-8",
                        ));
                    }
                    continue;
                }
            };
            // `foo.schema.yml` never ends in `.md`, but `foo.schema.md` is a note
            let Some(logical_id) = Self::logical_id_of(&file_name, kind) else {
                continue;
            };
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let text = match tokio::fs::read_to_string(entry.path()).await {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Failed to read {}: {e}", entry.path().display());
                    snapshot
                        .failures
                        .push(RecordFailure::new(logical_id, FailureKind::Io, e));
                    continue;
                }
            };
            let meta = tokio::fs::metadata(entry.path()).await.ok();
            match self.decode_file(vault, logical_id, &text, meta.as_ref(), kind) {
                Ok(raw) => {
                    snapshot.stubs.insert(raw.logical_id.clone(), raw);
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {e}", entry.path().display());
                    snapshot.failures.push(RecordFailure::from_error(logical_id, &e));
                }
            }
        }
        Ok(snapshot)
    }

    async fn read_one(
        &self,
        scope: &Scope,
        logical_id: &str,
        kind: DataKind,
    ) -> Result<Option<RawStub>> {
        let Some(vault) = self.vaults.get(scope) else {
            return Ok(None);
        };
        let path = Self::file_path(&vault.dir, logical_id, kind)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let meta = tokio::fs::metadata(&path).await.ok();
                self.decode_file(vault, logical_id, &text, meta.as_ref(), kind)
                    .map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, scope: &Scope, stub: RawStub, kind: DataKind) -> Result<()> {
        let vault = self.vault_for_write(scope)?;
        let path = Self::file_path(&vault.dir, &stub.logical_id, kind)?;
        let text = self.encode_file(vault, &stub, kind)?;
        tokio::fs::create_dir_all(&vault.dir).await?;
        tokio::fs::write(&path, text).await?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<bool> {
        let vault = self.vault_for_write(scope)?;
        let path = Self::file_path(&vault.dir, logical_id, kind)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileBackend, Scope) {
        let tmp = TempDir::new().unwrap();
        let scope = Scope::new("vault1");
        let backend = FileBackend::new(NoteParser::default()).with_vault(
            scope.clone(),
            VaultRef::new("vault1"),
            tmp.path().join("vault1"),
        );
        (tmp, backend, scope)
    }

    #[tokio::test]
    async fn test_reads_front_matter_files() {
        let (tmp, backend, scope) = setup();
        let dir = tmp.path().join("vault1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "---\nid: a1\ntitle: A\n---\nbody a").unwrap();
        std::fs::write(dir.join("a.b.md"), "---\nid: b1\nstatus: wip\n---\nbody b").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let snapshot = backend.read_all(&scope, DataKind::Note).await.unwrap();
        assert_eq!(snapshot.stubs.len(), 2);
        assert_eq!(snapshot.stubs["a"].id, "a1");
        assert_eq!(snapshot.stubs["a.b"].data["custom"]["status"], "wip");
        assert_eq!(snapshot.stubs["a.b"].body.as_deref(), Some("body b"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_record_failure() {
        let (tmp, backend, scope) = setup();
        let dir = tmp.path().join("vault1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("good.md"), "---\ntitle: Good\n---\n").unwrap();
        std::fs::write(dir.join("bad.md"), "---\ntitle: [oops\n---\n").unwrap();

        let snapshot = backend.read_all(&scope, DataKind::Note).await.unwrap();
        assert_eq!(snapshot.stubs.len(), 1);
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].logical_id, "bad");
    }

    #[tokio::test]
    async fn test_note_write_then_read() {
        let (tmp, backend, scope) = setup();
        let stub = RawStub {
            id: "n1".into(),
            logical_id: "proj.x".into(),
            data: serde_json::json!({
                "title": "X", "desc": "d", "created": 1, "updated": 2,
                "custom": { "priority": 3 }
            }),
            body: Some("content\n".into()),
        };
        backend.upsert(&scope, stub, DataKind::Note).await.unwrap();

        let text = std::fs::read_to_string(tmp.path().join("vault1/proj.x.md")).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("priority: 3"));
        assert!(text.ends_with("---\ncontent\n"));

        let back = backend.read_one(&scope, "proj.x", DataKind::Note).await.unwrap().unwrap();
        assert_eq!(back.id, "n1");
        assert_eq!(back.data["title"], "X");
        assert_eq!(back.data["custom"]["priority"], 3);
        assert_eq!(back.body.as_deref(), Some("content\n"));
    }

    #[tokio::test]
    async fn test_schema_files_are_separate_from_notes() {
        let (_tmp, backend, scope) = setup();
        let stub = RawStub {
            id: "s1".into(),
            logical_id: "journal".into(),
            data: serde_json::json!({ "title": "Journal", "desc": "daily", "kind": "namespace" }),
            body: None,
        };
        backend.upsert(&scope, stub.clone(), DataKind::Schema).await.unwrap();

        assert!(backend.read_all(&scope, DataKind::Note).await.unwrap().stubs.is_empty());
        let schemas = backend.read_all(&scope, DataKind::Schema).await.unwrap();
        assert_eq!(schemas.stubs["journal"], stub);
    }

    #[tokio::test]
    async fn test_content_hash_on_read() {
        let (tmp, backend, scope) = setup();
        let backend = backend.with_content_hash(true);
        let dir = tmp.path().join("vault1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "---\ntitle: A\n---\n").unwrap();

        let raw = backend.read_one(&scope, "a", DataKind::Note).await.unwrap().unwrap();
        assert_eq!(
            raw.data["contentHash"],
            crate::parser::content_hash("---\ntitle: A\n---\n")
        );
    }

    #[tokio::test]
    async fn test_file_without_id_reads_the_same_every_time() {
        let (tmp, backend, scope) = setup();
        let dir = tmp.path().join("vault1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "---\ntitle: A\n---\nbody").unwrap();

        let first = backend.read_one(&scope, "a", DataKind::Note).await.unwrap().unwrap();
        let second = backend.read_one(&scope, "a", DataKind::Note).await.unwrap().unwrap();
        let listed = backend.read_all(&scope, DataKind::Note).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(listed.stubs["a"], first);
        assert_eq!(first.id.len(), 23);

        let modified = std::fs::metadata(dir.join("a.md")).unwrap().modified().unwrap();
        let modified = chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis();
        assert_eq!(first.data["updated"], modified);

        // Another backend over the same vault derives the same id
        let (_, fresh, _) = setup();
        let fresh = fresh.with_vault(scope.clone(), VaultRef::new("vault1"), &dir);
        let third = fresh.read_one(&scope, "a", DataKind::Note).await.unwrap().unwrap();
        assert_eq!(third.id, first.id);
    }

    #[tokio::test]
    async fn test_written_content_hash_is_read_back() {
        let (_tmp, backend, scope) = setup();
        let backend = backend.with_content_hash(true);
        let stub = RawStub {
            id: "n1".into(),
            logical_id: "a".into(),
            data: serde_json::json!({
                "title": "A", "desc": "", "created": 1, "updated": 2, "contentHash": "abc123"
            }),
            body: Some("body".into()),
        };
        backend.upsert(&scope, stub.clone(), DataKind::Note).await.unwrap();

        let back = backend.read_one(&scope, "a", DataKind::Note).await.unwrap().unwrap();
        assert_eq!(back, stub);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_file_name_is_a_record_failure() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (tmp, backend, scope) = setup();
        let dir = tmp.path().join("vault1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ok.md"), "---\nid: ok\n---\n").unwrap();
        if std::fs::write(dir.join(OsStr::from_bytes(b"bad\xff.md")), "x").is_err() {
            // Filesystem refuses non-UTF-8 names; nothing to check
            return;
        }

        let snapshot = backend.read_all(&scope, DataKind::Note).await.unwrap();
        assert_eq!(snapshot.stubs.len(), 1);
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_scope() {
        let (_tmp, backend, _scope) = setup();
        let other = Scope::new("nope");
        assert!(backend.read_all(&other, DataKind::Note).await.unwrap().stubs.is_empty());
        let stub = RawStub {
            id: "x".into(),
            logical_id: "x".into(),
            data: serde_json::json!({}),
            body: None,
        };
        assert!(backend.upsert(&other, stub, DataKind::Note).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let (tmp, backend, scope) = setup();
        let dir = tmp.path().join("vault1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "body").unwrap();

        assert!(backend.delete(&scope, "a", DataKind::Note).await.unwrap());
        assert!(!dir.join("a.md").exists());
        assert!(!backend.delete(&scope, "a", DataKind::Note).await.unwrap());
    }
}
