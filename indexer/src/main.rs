use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::{DocId, Environment, StoreConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Load and query the posting store", long_about = None)]
struct Cli {
    /// Database directory (overrides the path in --config)
    #[arg(long, env = "INDEX_DB", global = true)]
    db: Option<PathBuf>,
    /// JSON store configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load pre-tokenized documents from a JSON/JSONL file or a directory
    Load {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the posting list of one term
    Get {
        #[arg(long)]
        term: String,
    },
    /// Print the union of all terms starting with a prefix
    Prefix {
        #[arg(long)]
        prefix: String,
    },
    /// Print the URL stored for a document
    Doc {
        #[arg(long)]
        id: DocId,
    },
    /// Remove the URL record of a document
    DeleteDoc {
        #[arg(long)]
        id: DocId,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(db) = cli.db {
        config.path = db;
    }
    let env = Environment::open(&config)?;

    let out = match cli.command {
        Commands::Load { input } => {
            let mut docs = Vec::new();
            for file in indexer::collect_input_files(&input) {
                docs.extend(indexer::read_docs(&file)?);
            }
            let stats = indexer::load(&env, docs)?;
            serde_json::json!({ "documents": stats.documents, "skipped": stats.skipped, "terms": stats.terms })
        }
        Commands::Get { term } => indexer::term_postings(&env, &term)?,
        Commands::Prefix { prefix } => indexer::prefix_postings(&env, &prefix)?,
        Commands::Doc { id } => indexer::document_url(&env, id)?,
        Commands::DeleteDoc { id } => serde_json::json!({ "doc_id": id, "removed": indexer::delete_document(&env, id)? }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    env.flush()?;
    Ok(())
}
