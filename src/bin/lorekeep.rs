//! Lorekeep CLI: load documents, run the pipeline, inspect graphs.
//!
//! Usage:
//!   lorekeep load <dir> --document <id> [--name <name>]
//!   lorekeep run [--document <id>]... [--all]
//!   lorekeep status --document <id>
//!   lorekeep graph <stats|reset|find> --document <id>

use clap::{Parser, Subcommand};
use lorekeep::scheduler::missing_setup_fields;
use lorekeep::{
    status, CommandGenerator, Config, DirectorySource, Document, DocumentId, DocumentSource, DocumentStore,
    GraphStore, OpenStore, Orchestrator, Runner, SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "lorekeep",
    version,
    about = "Narrative knowledge graph and translation pipeline"
)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add the numbered unit files of a directory to a document
    Load {
        /// Directory holding <index>.txt files
        dir: PathBuf,
        #[arg(long)]
        document: String,
        /// Display name for a new document
        #[arg(long)]
        name: Option<String>,
    },
    /// Fulfill outstanding requirements
    Run {
        /// Documents to run (repeatable)
        #[arg(long)]
        document: Vec<String>,
        /// Run every stored document
        #[arg(long, conflicts_with = "document")]
        all: bool,
    },
    /// Show outstanding requirements of a document
    Status {
        #[arg(long)]
        document: String,
    },
    /// Inspect or reset a document graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
        #[arg(long, global = true)]
        document: Option<String>,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Node and edge counts
    Stats,
    /// Delete every node and edge
    Reset,
    /// Find entities by name
    Find {
        name: String,
    },
}

/// Get the default database path (~/.local/share/lorekeep/lorekeep.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let lorekeep_dir = data_dir.join("lorekeep");
    std::fs::create_dir_all(&lorekeep_dir).ok();
    lorekeep_dir.join("lorekeep.db")
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => Config::from_path(path).map_err(|e| e.to_string()),
        None => Ok(Config::default()),
    }
}

fn open_store(db: Option<PathBuf>, config: &Config) -> Result<Arc<SqliteStore>, String> {
    let db_path = db
        .or_else(|| config.database.clone())
        .unwrap_or_else(default_db_path);
    SqliteStore::open(&db_path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

fn cmd_load(store: &SqliteStore, dir: &Path, id: &str, name: Option<String>) -> i32 {
    let units = match DirectorySource::new(dir).load_units() {
        Ok(units) => units,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let id = DocumentId::from(id);
    let mut document = match store.load_document(&id) {
        Ok(Some(document)) => document,
        Ok(None) => Document::new(id.clone(), name.unwrap_or_else(|| id.to_string())),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let found = units.len();
    let added = document.add_units(units);
    if let Err(e) = store.save_document(&document) {
        eprintln!("Error: {}", e);
        return 1;
    }
    println!(
        "Loaded {} new units into '{}' ({} already present)",
        added,
        id,
        found - added
    );
    0
}

async fn cmd_run(store: Arc<SqliteStore>, config: &Config, ids: Vec<String>, all: bool) -> i32 {
    let Some(command) = config.llm.command.clone() else {
        eprintln!("Error: llm.command is not configured");
        return 1;
    };
    let ids: Vec<DocumentId> = if all {
        match store.list_documents() {
            Ok(ids) => ids,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        ids.into_iter().map(DocumentId::from).collect()
    };
    if ids.is_empty() {
        eprintln!("Error: nothing to run; pass --document or --all");
        return 1;
    }

    let mut documents = Vec::new();
    for id in &ids {
        match store.load_document(id) {
            Ok(Some(document)) => documents.push(document),
            Ok(None) => {
                eprintln!("Error: document '{}' not found", id);
                return 1;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }

    let llm = Arc::new(CommandGenerator::new(command, config.llm.args.clone()));
    let orchestrator = Arc::new(Orchestrator::new(llm, store.clone(), config.workflow.clone()));
    let runner = Arc::new(Runner::new(orchestrator, store));

    let cancel = runner.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current task...");
            cancel.cancel();
        }
    });

    let mut code = 0;
    for report in runner.run_documents(documents).await {
        let outcome = match (&report.first_error, report.cancelled) {
            (_, true) => "cancelled".to_string(),
            (Some(e), false) => {
                code = 1;
                format!("failed: {}", e)
            }
            (None, false) => "complete".to_string(),
        };
        println!(
            "{}: {} tasks fulfilled, {} units skipped, {}",
            report.document,
            report.completed,
            report.skipped.len(),
            outcome
        );
    }
    code
}

fn cmd_status(store: &SqliteStore, id: &str) -> i32 {
    let document = match store.load_document(&DocumentId::from(id)) {
        Ok(Some(document)) => document,
        Ok(None) => {
            eprintln!("Error: document '{}' not found", id);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let missing = missing_setup_fields(&document);
    if missing.is_empty() {
        println!("Setup: complete");
    } else {
        let names: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
        println!("Setup: missing {}", names.join(", "));
    }
    println!("{:>6}  {}", "UNIT", "OUTSTANDING");
    println!("{}", "-".repeat(48));
    for unit in status(&document) {
        let outstanding = if unit.outstanding.is_empty() {
            "-".to_string()
        } else {
            unit.outstanding.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        };
        println!("{:>6}  {}", unit.index, outstanding);
    }
    0
}

fn cmd_graph(store: &SqliteStore, id: &str, action: GraphAction) -> i32 {
    let id = DocumentId::from(id);
    let result = match action {
        GraphAction::Stats => store.stats(&id).map(|stats| {
            println!("Nodes: {}", stats.nodes);
            println!("Edges: {}", stats.edges);
            for (category, count) in &stats.by_category {
                println!("  {:<16} {:>6}", category, count);
            }
            for (predicate, count) in &stats.by_predicate {
                println!("  {:<16} {:>6}", predicate, count);
            }
        }),
        GraphAction::Reset => store.reset(&id).map(|removed| {
            println!("Removed {} nodes from '{}'", removed, id);
        }),
        GraphAction::Find { name } => store.find_by_name(&id, &name).map(|nodes| {
            if nodes.is_empty() {
                println!("No entity named '{}'", name);
            }
            for node in nodes {
                let names: Vec<&str> = node.entity.all_names();
                println!("{}  {} ({})  {}", node.id, node.label(), node.entity.category, names.join(" | "));
            }
        }),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_writer(std::io::stderr)
        .init();

    let store = match open_store(cli.db, &config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Load { dir, document, name } => cmd_load(&store, &dir, &document, name),
        Commands::Run { document, all } => cmd_run(store, &config, document, all).await,
        Commands::Status { document } => cmd_status(&store, &document),
        Commands::Graph { action, document } => match document {
            Some(document) => cmd_graph(&store, &document, action),
            None => {
                eprintln!("Error: --document is required");
                1
            }
        },
    };
    std::process::exit(code);
}
