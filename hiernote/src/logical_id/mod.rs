// Logical identifier rules - validation, ancestry, segment ordering

use crate::error::{HierNoteError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

pub const DEFAULT_SEPARATOR: char = '.';
pub const DEFAULT_ROOT_ID: &str = "root";

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^/\\\x00-\x1f]+$").expect("static regex"))
}

/// Identifier rules for one hierarchy: the segment separator and the
/// sentinel id that names the tree root when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    #[serde(default = "default_separator")]
    pub separator: char,
    #[serde(default = "default_root_id")]
    pub root_id: String,
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

fn default_root_id() -> String {
    DEFAULT_ROOT_ID.to_string()
}

impl Default for Hierarchy {
    fn default() -> Self {
        Hierarchy {
            separator: DEFAULT_SEPARATOR,
            root_id: DEFAULT_ROOT_ID.to_string(),
        }
    }
}

impl Hierarchy {
    pub fn new(separator: char, root_id: impl Into<String>) -> Self {
        Hierarchy {
            separator,
            root_id: root_id.into(),
        }
    }

    /// Reject empty ids, empty segments (leading, trailing or doubled
    /// separators) and segments with path or control characters.
    pub fn validate(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(HierNoteError::Validation(
                "logical id must not be empty".into(),
            ));
        }
        if id.starts_with(self.separator) || id.ends_with(self.separator) {
            return Err(HierNoteError::Validation(format!(
                "logical id '{id}' has a leading or trailing '{}'",
                self.separator
            )));
        }
        for segment in self.segments(id) {
            if segment.trim().is_empty() {
                return Err(HierNoteError::Validation(format!(
                    "logical id '{id}' contains an empty segment"
                )));
            }
            if !segment_pattern().is_match(segment) {
                return Err(HierNoteError::Validation(format!(
                    "logical id '{id}' has invalid segment '{segment}'"
                )));
            }
        }
        Ok(())
    }

    pub fn segments<'a>(&self, id: &'a str) -> std::str::Split<'a, char> {
        id.split(self.separator)
    }

    pub fn is_root(&self, id: &str) -> bool {
        id == self.root_id
    }

    /// True when `ancestor` is a strict ancestor of `id`. The prefix must end
    /// on a separator boundary, so `ab` is not an ancestor of `abc`.
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        if ancestor == id || self.is_root(id) {
            return false;
        }
        if self.is_root(ancestor) {
            return true;
        }
        id.len() > ancestor.len()
            && id.starts_with(ancestor)
            && id[ancestor.len()..].starts_with(self.separator)
    }

    /// Textual parent: drop the last segment. Top-level ids hang off the
    /// sentinel root; the root itself has no parent.
    pub fn parent_of<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if self.is_root(id) {
            return None;
        }
        match id.rsplit_once(self.separator) {
            Some((parent, _)) => Some(parent),
            None => Some(self.root_id.as_str()),
        }
    }

    pub fn basename<'a>(&self, id: &'a str) -> &'a str {
        id.rsplit(self.separator).next().unwrap_or(id)
    }

    pub fn depth(&self, id: &str) -> usize {
        if self.is_root(id) {
            0
        } else {
            self.segments(id).count()
        }
    }

    /// Segment-wise ordering with the sentinel root first. Comparing
    /// segment sequences keeps every subtree contiguous, which plain string
    /// order does not when a sibling contains a byte below the separator
    /// (`a-b` sorts between `a` and `a.b` as strings).
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match (self.is_root(a), self.is_root(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.segments(a).cmp(self.segments(b)),
        }
    }

    pub fn sort<S: AsRef<str>>(&self, ids: &mut [S]) {
        ids.sort_by(|a, b| self.compare(a.as_ref(), b.as_ref()));
    }
}
