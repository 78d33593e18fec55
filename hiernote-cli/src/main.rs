use clap::{Parser, Subcommand, ValueEnum};
use hiernote::{
    DataKind, Hierarchy, Materialized, NodeData, NodeType, NoteData, SchemaData, Scope, Workspace,
};
use std::path::PathBuf;
use std::process;

/// hiernote CLI: read and write a hierarchical note store from the command line
#[derive(Parser)]
#[command(name = "hiernote", version, about)]
struct Cli {
    /// Path to the workspace directory (default: current directory)
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Scope (vault name) to operate on; defaults to the first configured vault
    #[arg(long)]
    scope: Option<String>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Get a single node by logical id
    Get {
        /// Logical id (e.g. project.foo), or the storage id with --by-id
        logical_id: String,
        /// Look the node up by its storage id instead
        #[arg(long)]
        by_id: bool,
        /// Return the bare stub without parent/children
        #[arg(long)]
        stub: bool,
        /// Read from the schema tree instead of notes
        #[arg(long)]
        schema: bool,
    },

    /// Show the root of the tree
    Root {
        #[arg(long)]
        schema: bool,
    },

    /// Find nodes whose logical id matches a pattern (e.g. "project.*")
    Query {
        pattern: String,
        #[arg(long)]
        stub: bool,
        #[arg(long)]
        schema: bool,
    },

    /// Parse a markdown file and store it as a note
    Ingest {
        /// Path to the document
        file: PathBuf,
        /// Logical id to store it under (default: file name without .md)
        #[arg(long)]
        fname: Option<String>,
        /// Record a content hash of the file text
        #[arg(long)]
        hash: bool,
    },

    /// Move a node to a new logical id
    Rename {
        from: String,
        to: String,
        #[arg(long)]
        schema: bool,
    },

    /// Delete a node
    Delete {
        logical_id: String,
        #[arg(long)]
        schema: bool,
    },

    /// Print the tree as an indented outline, with orphans listed separately
    Tree {
        #[arg(long)]
        schema: bool,
    },
}

fn kind(schema: bool) -> DataKind {
    if schema {
        DataKind::Schema
    } else {
        DataKind::Note
    }
}

fn node_type(stub: bool) -> NodeType {
    if stub {
        NodeType::Stub
    } else {
        NodeType::Full
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Workspace::open(&cli.workspace)?;
    let scope = match cli.scope {
        Some(name) => Scope::new(name),
        None => workspace.default_scope(),
    };
    let store = workspace.store();
    log::debug!("Using scope '{scope}' in {}", workspace.root().display());

    match cli.command {
        Command::Get {
            logical_id,
            by_id,
            stub,
            schema,
        } => {
            let resp = if by_id {
                store
                    .find_by_id_dynamic(&scope, &logical_id, node_type(stub), kind(schema))
                    .await?
            } else {
                store
                    .get_dynamic(&scope, &logical_id, node_type(stub), kind(schema))
                    .await?
            };
            print_output(&serde_json::to_value(&resp)?, &cli.format)?;
        }

        Command::Root { schema } => {
            let resp = store.get_root_dynamic(&scope, kind(schema)).await?;
            print_output(&serde_json::to_value(&resp)?, &cli.format)?;
        }

        Command::Query {
            pattern,
            stub,
            schema,
        } => {
            let resp = store
                .query_dynamic(&scope, &pattern, node_type(stub), kind(schema))
                .await?;
            print_output(&serde_json::to_value(&resp)?, &cli.format)?;
        }

        Command::Ingest { file, fname, hash } => {
            let raw = std::fs::read_to_string(&file)
                .map_err(|e| format!("Failed to read '{}': {e}", file.display()))?;
            let fname = match fname {
                Some(fname) => fname,
                None => file
                    .file_name()
                    .and_then(|s| s.to_str())
                    .map(|s| s.strip_suffix(".md").unwrap_or(s).to_string())
                    .ok_or_else(|| format!("Cannot derive a logical id from '{}'", file.display()))?,
            };
            let vault = workspace.vault_for(&scope);
            let calculate_hash = hash || workspace.config().calculate_hash;
            let note = store
                .ingest(&scope, &vault, &fname, &raw, calculate_hash)
                .await?;
            print_output(&serde_json::to_value(&note)?, &cli.format)?;
        }

        Command::Rename { from, to, schema } => {
            store.rename(&scope, &from, &to, kind(schema)).await?;
            print_output(
                &serde_json::json!({ "ok": true, "from": from, "to": to }),
                &cli.format,
            )?;
        }

        Command::Delete { logical_id, schema } => {
            store.delete(&scope, &logical_id, kind(schema)).await?;
            print_output(
                &serde_json::json!({ "ok": true, "deleted": logical_id }),
                &cli.format,
            )?;
        }

        Command::Tree { schema } => {
            let hierarchy = store.hierarchy();
            let outline = if schema {
                render_tree(hierarchy, &store.tree::<SchemaData>(&scope).await?)
            } else {
                render_tree(hierarchy, &store.tree::<NoteData>(&scope).await?)
            };
            print!("{outline}");
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn render_tree<T: NodeData>(hierarchy: &Hierarchy, tree: &Materialized<T>) -> String {
    let mut out = String::new();
    match &tree.root {
        Some(root) => render_subtree(hierarchy, tree, root, 0, &mut out),
        None => out.push_str("(empty)\n"),
    }
    for head in tree.orphan_heads() {
        out.push_str(&format!("orphan: {head}\n"));
        render_subtree(hierarchy, tree, head, 1, &mut out);
    }
    for id in &tree.invalid {
        out.push_str(&format!("invalid: {id}\n"));
    }
    out
}

fn render_subtree<T: NodeData>(
    hierarchy: &Hierarchy,
    tree: &Materialized<T>,
    id: &str,
    depth: usize,
    out: &mut String,
) {
    let Some(node) = tree.get(id) else {
        return;
    };
    let title = node.data.title();
    let name = hierarchy.basename(&node.logical_id);
    if title.is_empty() || title == name {
        out.push_str(&format!("{}{}\n", "  ".repeat(depth), node.logical_id));
    } else {
        out.push_str(&format!("{}{} ({title})\n", "  ".repeat(depth), node.logical_id));
    }
    for child in &node.children {
        render_subtree(hierarchy, tree, &child.logical_id, depth + 1, out);
    }
}
