// Workspace configuration - hiernote.yaml and backend selection

use crate::backend::{FileBackend, MemoryBackend, NodeBackend, SqliteBackend};
use crate::error::{HierNoteError, Result};
use crate::logical_id::Hierarchy;
use crate::node::{Scope, VaultRef};
use crate::parser::{NoteParser, YamlCodec};
use crate::store::NodeStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_FILE: &str = "hiernote.yaml";
pub const DEFAULT_SCOPE: &str = "default";

/// Top-level configuration parsed from hiernote.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub hierarchy: Hierarchy,
    /// Hash note text on ingest and on reads from the file backend
    #[serde(default)]
    pub calculate_hash: bool,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub vaults: Vec<VaultConfig>,
}

/// Where records live. Without a config file a workspace keeps them in
/// `hiernote.db` next to it; `memory` is for tests and throwaway runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    Sqlite {
        #[serde(default = "default_db_path")]
        path: String,
    },
    Files,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sqlite {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "hiernote.db".to_string()
}

/// A vault directory, relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "fsPath")]
    pub fs_path: String,
}

impl VaultConfig {
    pub fn name(&self) -> &str {
        match &self.name {
            Some(name) => name.as_str(),
            None => Path::new(&self.fs_path)
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or(self.fs_path.as_str()),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.name())
    }

    pub fn vault_ref(&self) -> VaultRef {
        VaultRef::new(self.name())
    }
}

/// Parse a hiernote.yaml file into a StoreConfig
pub fn parse_config(path: &Path) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse a config YAML string into a StoreConfig
pub fn parse_config_str(content: &str) -> Result<StoreConfig> {
    if content.trim().is_empty() {
        return Ok(StoreConfig::default());
    }
    let config: StoreConfig = serde_yaml::from_str(content)?;
    let root_id = &config.hierarchy.root_id;
    if !root_id.is_empty() && config.hierarchy.validate(root_id).is_err() {
        return Err(HierNoteError::Config(format!(
            "root_id '{root_id}' is not a valid logical id"
        )));
    }
    Ok(config)
}

/// An opened workspace: its root directory, configuration and store.
pub struct Workspace {
    root: PathBuf,
    config: StoreConfig,
    store: NodeStore<Box<dyn NodeBackend>>,
}

impl Workspace {
    /// Open the workspace at `path`. A missing hiernote.yaml means defaults.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(HierNoteError::Config(format!(
                "Workspace directory does not exist: {}",
                root.display()
            )));
        }

        let config_path = root.join(CONFIG_FILE);
        let config = if config_path.exists() {
            parse_config(&config_path)?
        } else {
            log::info!("No {CONFIG_FILE} in {}, using defaults", root.display());
            StoreConfig::default()
        };
        Self::with_config(root, config)
    }

    pub fn with_config(root: PathBuf, config: StoreConfig) -> Result<Self> {
        let parser = NoteParser::new(Arc::new(YamlCodec), config.hierarchy.clone());

        let backend: Box<dyn NodeBackend> = match &config.backend {
            BackendConfig::Memory => Box::new(MemoryBackend::new()),
            BackendConfig::Sqlite { path } => Box::new(SqliteBackend::open(&root.join(path))?),
            BackendConfig::Files => {
                if config.vaults.is_empty() {
                    return Err(HierNoteError::Config(
                        "the files backend needs at least one vault".into(),
                    ));
                }
                let mut files =
                    FileBackend::new(parser.clone()).with_content_hash(config.calculate_hash);
                for vault in &config.vaults {
                    files = files.with_vault(vault.scope(), vault.vault_ref(), root.join(&vault.fs_path));
                }
                Box::new(files)
            }
        };

        let store = NodeStore::new(backend, config.hierarchy.clone()).with_parser(parser);
        Ok(Workspace {
            root,
            config,
            store,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &NodeStore<Box<dyn NodeBackend>> {
        &self.store
    }

    /// First configured vault, or the `default` scope.
    pub fn default_scope(&self) -> Scope {
        self.config
            .vaults
            .first()
            .map(VaultConfig::scope)
            .unwrap_or_else(|| Scope::new(DEFAULT_SCOPE))
    }

    /// The vault a scope writes notes into. Scopes without a configured
    /// vault use a vault of the same name.
    pub fn vault_for(&self, scope: &Scope) -> VaultRef {
        self.config
            .vaults
            .iter()
            .find(|v| v.name() == scope.as_str())
            .map(VaultConfig::vault_ref)
            .unwrap_or_else(|| VaultRef::new(scope.as_str()))
    }
}
