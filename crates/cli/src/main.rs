use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fileshelf_store::{config::storage_root_from_env_value, FileId, FileStore, StoreConfig, Upload};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fileshelf")]
#[command(about = "fileshelf file store CLI")]
struct Cli {
    /// Storage root (defaults to FILESHELF_STORAGE_DIR, then ./storagedata)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every stored file
    List,
    /// List files whose path starts with a prefix
    UnderDir {
        /// Path prefix (plain string match)
        prefix: String,
    },
    /// Show the record for an id
    Get {
        /// File id
        id: String,
    },
    /// Store a local file
    Store(UploadArgs),
    /// Move a stored file into another directory
    Move {
        /// File id
        id: String,
        /// Target directory ("" for the storage root)
        dir: String,
    },
    /// Delete a stored file
    Delete {
        /// File id
        id: String,
    },
    /// Replace a stored file, keeping its id
    Overwrite {
        /// File id
        id: String,
        #[command(flatten)]
        upload: UploadArgs,
    },
}

#[derive(Args)]
struct UploadArgs {
    /// Local file to upload
    file: PathBuf,
    /// Target directory inside the store
    #[arg(long, default_value = "")]
    dir: String,
    /// Stored name (defaults to the local file name)
    #[arg(long)]
    name: Option<String>,
    /// Type label (defaults to the file extension, then content detection)
    #[arg(long = "type")]
    type_label: Option<String>,
}

impl UploadArgs {
    fn into_upload(self) -> anyhow::Result<Upload> {
        let bytes = std::fs::read(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        let name = self.name.unwrap_or_else(|| file_name_of(&self.file));
        let type_label = self
            .type_label
            .unwrap_or_else(|| extension_of(&name).unwrap_or_default());

        Ok(Upload {
            directory: self.dir,
            name,
            type_label,
            size: Some(bytes.len() as u64),
            bytes,
        })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(store: &FileStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List => print_json(&store.list_all()?),
        Commands::UnderDir { prefix } => print_json(&store.list_under_dir(&prefix)?),
        Commands::Get { id } => print_json(&store.get_by_id(&FileId::parse(&id)?)?),
        Commands::Store(args) => {
            let (id, record) = store.store(args.into_upload()?)?;
            println!("Stored {} with id: {}", record.path, id);
            Ok(())
        }
        Commands::Move { id, dir } => {
            let record = store.move_file(&FileId::parse(&id)?, &dir)?;
            println!("Moved {} to {}", id, record.path);
            Ok(())
        }
        Commands::Delete { id } => {
            store.delete_by_id(&FileId::parse(&id)?)?;
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::Overwrite { id, upload } => {
            let record = store.overwrite_file(&FileId::parse(&id)?, upload.into_upload()?)?;
            print_json(&record)
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fileshelf_store=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'fileshelf --help' for commands");
        return Ok(());
    };

    let storage_root = cli
        .storage_dir
        .unwrap_or_else(|| storage_root_from_env_value(std::env::var("FILESHELF_STORAGE_DIR").ok()));
    let store = FileStore::open(StoreConfig::with_defaults(storage_root)?)?;

    run(&store, command)
}
