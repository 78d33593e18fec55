// Front matter parsing - raw document text to note records

use crate::error::{HierNoteError, Result};
use crate::logical_id::Hierarchy;
use crate::node::{Node, NodeStub, NoteData, VaultRef};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

const DELIMITER: &str = "---";

/// Keys that become first-class note fields.
pub const FIELD_KEYS: [&str; 7] = [
    "id",
    "title",
    "desc",
    "created",
    "updated",
    "tags",
    "contentHash",
];

/// Keys this layer derives itself. They are recognized (never custom) but
/// whatever the author wrote for them is ignored.
pub const STRUCTURAL_KEYS: [&str; 8] = [
    "fname",
    "type",
    "vault",
    "body",
    "custom",
    "parent",
    "children",
    "data",
];

pub fn is_reserved_key(key: &str) -> bool {
    FIELD_KEYS.contains(&key) || STRUCTURAL_KEYS.contains(&key)
}

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

pub fn generate_id() -> String {
    nanoid::nanoid!(23, &ID_ALPHABET)
}

/// Encode/decode pair for the metadata block.
pub trait MetadataCodec: Send + Sync {
    fn decode(&self, text: &str) -> Result<Mapping>;
    fn encode(&self, metadata: &Mapping) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl MetadataCodec for YamlCodec {
    fn decode(&self, text: &str) -> Result<Mapping> {
        if text.trim().is_empty() {
            return Ok(Mapping::new());
        }
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| HierNoteError::Parse(format!("invalid front matter: {e}")))?;
        match value {
            Value::Null => Ok(Mapping::new()),
            Value::Mapping(map) => Ok(map),
            other => Err(HierNoteError::Parse(format!(
                "front matter must be a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    fn encode(&self, metadata: &Mapping) -> Result<String> {
        if metadata.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(metadata)?)
    }
}

/// Split raw text into the metadata block (if any) and the body.
///
/// The block opens with `---` on the first line and closes at the next line
/// that is `---`. Trailing whitespace (including `\r`) is allowed after
/// either delimiter. The newline after the closing delimiter belongs to
/// neither part. An unterminated block swallows the rest of the text.
pub fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let (first, mut pos) = match raw.find('\n') {
        Some(i) => (&raw[..i], i + 1),
        None => (raw, raw.len()),
    };
    if first.trim_end() != DELIMITER {
        return (None, raw);
    }

    let start = pos;
    while pos < raw.len() {
        let (line, next) = match raw[pos..].find('\n') {
            Some(i) => (&raw[pos..pos + i], pos + i + 1),
            None => (&raw[pos..], raw.len()),
        };
        if line.trim_end() == DELIMITER {
            return (Some(&raw[start..pos]), &raw[next..]);
        }
        pos = next;
    }
    (Some(&raw[start..]), "")
}

/// Hex SHA-256 of the exact input bytes.
pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parsed front matter before it is shaped into a note.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    /// Reserved keys, with `title` and `id` coerced to strings
    pub metadata: Mapping,
    /// Everything else, verbatim
    pub custom: BTreeMap<String, Value>,
    pub body: String,
    pub content_hash: Option<String>,
}

impl FrontMatter {
    pub fn parse(raw: &str, calculate_hash: bool, codec: &dyn MetadataCodec) -> Result<Self> {
        let (block, body) = split_front_matter(raw);
        let decoded = match block {
            Some(text) => codec.decode(text)?,
            None => Mapping::new(),
        };

        let mut metadata = Mapping::new();
        let mut custom = BTreeMap::new();
        for (key, value) in decoded {
            let key = key_to_string(key)?;
            if is_reserved_key(&key) {
                let value = match key.as_str() {
                    "title" | "id" => coerce_to_string(&key, value)?,
                    _ => value,
                };
                metadata.insert(Value::String(key), value);
            } else {
                custom.insert(key, value);
            }
        }

        Ok(FrontMatter {
            metadata,
            custom,
            body: body.to_string(),
            content_hash: calculate_hash.then(|| content_hash(raw)),
        })
    }

    /// Render back to front matter text. Reserved keys come first.
    pub fn to_text(&self, codec: &dyn MetadataCodec) -> Result<String> {
        let mut merged = self.metadata.clone();
        for (key, value) in &self.custom {
            merged.insert(Value::String(key.clone()), value.clone());
        }
        Ok(format!(
            "{DELIMITER}\n{}{DELIMITER}\n{}",
            codec.encode(&merged)?,
            self.body
        ))
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.metadata
            .get(key)
            .filter(|v| !matches!(v, Value::Null))
    }
}

/// A fully formed note as read from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteProps {
    pub id: String,
    pub title: String,
    pub desc: String,
    pub fname: String,
    pub vault: VaultRef,
    pub body: String,
    pub created: i64,
    pub updated: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(rename = "type")]
    pub note_type: String,
}

impl NoteProps {
    pub fn data(&self) -> NoteData {
        NoteData {
            title: self.title.clone(),
            desc: self.desc.clone(),
            created: self.created,
            updated: self.updated,
            tags: self.tags.clone(),
            custom: self.custom.clone(),
            content_hash: self.content_hash.clone(),
        }
    }

    /// The storage view of this note, keyed by `fname`.
    pub fn into_node(self) -> Node<NoteData> {
        let data = self.data();
        Node::from_stub(
            NodeStub {
                id: self.id,
                logical_id: self.fname,
                data,
            },
            Some(self.body),
        )
    }
}

/// Values for fields a document leaves out. `None` falls back to a fresh
/// id or the current time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDefaults {
    pub id: Option<String>,
    pub created: Option<i64>,
    pub updated: Option<i64>,
}

/// Turns document text into notes and back. The metadata codec is injected
/// so callers (and tests) control the notation.
#[derive(Clone)]
pub struct NoteParser {
    codec: Arc<dyn MetadataCodec>,
    hierarchy: Hierarchy,
}

impl Default for NoteParser {
    fn default() -> Self {
        NoteParser::new(Arc::new(YamlCodec), Hierarchy::default())
    }
}

impl NoteParser {
    pub fn new(codec: Arc<dyn MetadataCodec>, hierarchy: Hierarchy) -> Self {
        NoteParser { codec, hierarchy }
    }

    pub fn codec(&self) -> &dyn MetadataCodec {
        self.codec.as_ref()
    }

    /// Parse `raw` into the note stored under `fname` in `vault`.
    pub fn parse(
        &self,
        raw: &str,
        fname: &str,
        vault: &VaultRef,
        calculate_hash: bool,
    ) -> Result<NoteProps> {
        self.parse_with(raw, fname, vault, calculate_hash, &NoteDefaults::default())
    }

    /// Like [`NoteParser::parse`], with explicit values for a missing id
    /// and timestamps. With `calculate_hash` off, a `contentHash` written in
    /// the front matter is kept as is.
    pub fn parse_with(
        &self,
        raw: &str,
        fname: &str,
        vault: &VaultRef,
        calculate_hash: bool,
        defaults: &NoteDefaults,
    ) -> Result<NoteProps> {
        let fm = FrontMatter::parse(raw, calculate_hash, self.codec())?;
        for key in STRUCTURAL_KEYS {
            if fm.metadata.contains_key(key) {
                log::debug!("Ignoring structural key '{key}' in front matter of {fname}");
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let id = match (fm.get("id"), &defaults.id) {
            (Some(v), _) => scalar_string("id", v)?,
            (None, Some(id)) => id.clone(),
            (None, None) => generate_id(),
        };
        let title = match fm.get("title") {
            Some(v) => scalar_string("title", v)?,
            None => self.title_from_fname(fname),
        };
        let desc = match fm.get("desc") {
            Some(v) => scalar_string("desc", v)?,
            None => String::new(),
        };
        let created = match fm.get("created") {
            Some(v) => timestamp_millis("created", v)?,
            None => defaults.created.unwrap_or(now),
        };
        let updated = match fm.get("updated") {
            Some(v) => timestamp_millis("updated", v)?,
            None => defaults.updated.unwrap_or_else(|| created.max(now)),
        };
        let tags = match fm.get("tags") {
            Some(v) => string_list("tags", v)?,
            None => Vec::new(),
        };
        let content_hash = match (fm.content_hash.clone(), fm.get("contentHash")) {
            (Some(hash), _) => Some(hash),
            (None, Some(v)) => Some(scalar_string("contentHash", v)?),
            (None, None) => None,
        };

        Ok(NoteProps {
            id,
            title,
            desc,
            fname: fname.to_string(),
            vault: vault.clone(),
            body: fm.body,
            created,
            updated,
            tags,
            custom: fm.custom,
            content_hash,
            note_type: "note".to_string(),
        })
    }

    /// Render a note as front matter text: first-class fields, then custom keys.
    pub fn to_text(&self, note: &NoteProps) -> Result<String> {
        let mut metadata = Mapping::new();
        metadata.insert("id".into(), note.id.clone().into());
        metadata.insert("title".into(), note.title.clone().into());
        metadata.insert("desc".into(), note.desc.clone().into());
        metadata.insert("created".into(), note.created.into());
        metadata.insert("updated".into(), note.updated.into());
        if !note.tags.is_empty() {
            let tags = note.tags.iter().cloned().map(Value::String).collect();
            metadata.insert("tags".into(), Value::Sequence(tags));
        }
        if let Some(hash) = &note.content_hash {
            metadata.insert("contentHash".into(), hash.clone().into());
        }
        let fm = FrontMatter {
            metadata,
            custom: note.custom.clone(),
            body: note.body.clone(),
            content_hash: None,
        };
        fm.to_text(self.codec())
    }

    /// Default title: the last segment, capitalized when it is all lowercase.
    fn title_from_fname(&self, fname: &str) -> String {
        let base = self.hierarchy.basename(fname);
        if base.chars().any(|c| c.is_uppercase()) {
            return base.to_string();
        }
        let mut chars = base.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Parse with the default YAML codec and hierarchy rules.
pub fn string_to_note(
    raw: &str,
    fname: &str,
    vault: &VaultRef,
    calculate_hash: bool,
) -> Result<NoteProps> {
    NoteParser::default().parse(raw, fname, vault, calculate_hash)
}

fn key_to_string(key: Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(HierNoteError::Parse(format!(
            "front matter keys must be scalars, got {}",
            type_name(&other)
        ))),
    }
}

/// Authors write `title: 2024` or `id: 123`; keep those as strings.
fn coerce_to_string(key: &str, value: Value) -> Result<Value> {
    match value {
        Value::Null | Value::String(_) => Ok(value),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(HierNoteError::Parse(format!(
            "'{key}' must be a scalar, got {}",
            type_name(&other)
        ))),
    }
}

fn scalar_string(key: &str, value: &Value) -> Result<String> {
    match coerce_to_string(key, value.clone())? {
        Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

fn timestamp_millis(key: &str, value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse::<i64>().ok().or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    };
    parsed.ok_or_else(|| {
        HierNoteError::Parse(format!(
            "'{key}' must be epoch milliseconds or an RFC 3339 date"
        ))
    })
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Sequence(items) => items.iter().map(|v| scalar_string(key, v)).collect(),
        other => Ok(vec![scalar_string(key, other)?]),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
