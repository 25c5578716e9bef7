mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rollgate_core::{repository, MigrationConfig, MigrationError};

#[derive(Parser)]
#[command(name = "rollgate")]
#[command(about = "Versioned SQL migrations for PostgreSQL", version)]
struct Cli {
    /// Folder where migration files are stored
    #[arg(long, global = true, default_value = rollgate_core::DEFAULT_MIGRATIONS_DIR)]
    folder: PathBuf,

    /// Database connection string
    #[arg(long, global = true, env = "DATABASE_URL")]
    conn: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty up/down migration pair
    Create {
        /// Migration name
        name: String,
    },

    /// Apply every pending migration
    Update,

    /// Undo the most recently applied migration
    Rollback,

    /// Delete the newest never-applied migration pair from disk
    Remove,

    /// Show applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), MigrationError> {
    let Cli {
        folder,
        conn,
        command,
    } = cli;
    repository::ensure_folder(&folder)?;

    match command {
        Commands::Create { name } => commands::create::run(&folder, &name),
        Commands::Update => commands::update::run(database_config(&folder, conn)?).await,
        Commands::Rollback => commands::rollback::run(database_config(&folder, conn)?).await,
        Commands::Remove => commands::remove::run(database_config(&folder, conn)?).await,
        Commands::Status => commands::status::run(database_config(&folder, conn)?).await,
    }
}

fn database_config(
    folder: &std::path::Path,
    conn: Option<String>,
) -> Result<MigrationConfig, MigrationError> {
    let url = conn.ok_or_else(|| {
        MigrationError::Connection(
            "no connection string; pass --conn or set DATABASE_URL".to_string(),
        )
    })?;
    Ok(MigrationConfig::new(folder, url))
}
