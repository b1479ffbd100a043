//! atlas-inspect
//!
//! Read-only inspection of a persistence directory: list sub-databases,
//! count and list keys of one workspace, and print stored documents.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use atlas_persist::repository::keys;
use atlas_persist::serialization::{decode_document, structured};
use atlas_persist::{RepositoryError, StorageManager, StoreConfig};

/// Persistence directory inspector
#[derive(Parser, Debug)]
#[command(name = "atlas-inspect")]
#[command(about = "Inspect workspace-isolated persistence files")]
#[command(version)]
struct Args {
    /// Base directory holding the workspace roots
    #[arg(short, long, default_value = "./atlas_data")]
    base_dir: String,

    /// Logical database name (backing file stem)
    #[arg(short, long)]
    database: String,

    /// Workspace to inspect
    #[arg(short, long, default_value = "default")]
    workspace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the sub-databases of the backing file
    Collections,

    /// Count the records of a collection in the workspace
    Count {
        #[arg(short, long)]
        collection: String,
    },

    /// List the entity ids of a collection in the workspace
    Keys {
        #[arg(short, long)]
        collection: String,

        /// Stop after this many keys
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print one stored document as JSON
    Show {
        #[arg(short, long)]
        collection: String,

        #[arg(short, long)]
        id: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlas_persist=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> atlas_persist::Result<()> {
    let config = StoreConfig::builder()
        .base_dir(&args.base_dir)
        .default_workspace(&args.workspace)
        .build();
    let storage = StorageManager::new(config)?;

    // Opening a missing file would create it; an inspector must not write
    let path = storage.backing_file_path(&args.database, None)?;
    if !path.exists() {
        return Err(RepositoryError::Config(format!(
            "no backing file at {}",
            path.display()
        )));
    }

    match &args.command {
        Commands::Collections => {
            for name in storage.list_sub_databases(&args.database, None)? {
                println!("{}", name);
            }
        }
        Commands::Count { collection } => {
            let prefix = keys::workspace_prefix(&args.workspace)?;
            let count = storage.read(&args.database, None, collection, |scope| {
                scope.scan_prefix_keys(&prefix, None).map(|keys| keys.len())
            })?;
            println!("{}", count);
        }
        Commands::Keys { collection, limit } => {
            let prefix = keys::workspace_prefix(&args.workspace)?;
            let found = storage.read(&args.database, None, collection, |scope| {
                scope.scan_prefix_keys(&prefix, *limit)
            })?;
            for key in found {
                match keys::split_key(&key) {
                    Some((_, id)) => println!("{}", id),
                    None => println!("{}", key),
                }
            }
        }
        Commands::Show { collection, id } => {
            let key = keys::storage_key(&args.workspace, id)?;
            let bytes = storage.read(&args.database, None, collection, |scope| scope.get(&key))?;
            let Some(bytes) = bytes else {
                return Err(RepositoryError::EntityNotFound {
                    collection: collection.clone(),
                    id: id.clone(),
                });
            };

            let doc = decode_document(&bytes)?;
            match structured::to_json(&doc).and_then(|json| {
                serde_json::to_string_pretty(&json)
                    .map_err(|e| atlas_persist::SerializationError::Structured(e.to_string()))
            }) {
                Ok(text) => println!("{}", text),
                // Documents stored opaquely may use names JSON cannot carry
                Err(_) => println!("{:#?}", doc),
            }
        }
    }

    storage.close();
    Ok(())
}
