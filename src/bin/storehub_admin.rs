use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use storehub_api::database::manager::DatabaseManager;
use storehub_api::services::{capacity, SchemaSynchronizer, StoreMigrator, StoreResolver};

#[derive(Parser)]
#[command(name = "storehub-admin")]
#[command(about = "Operator tooling for store schema migration and reconciliation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Reconcile every store schema against the reference schema")]
    Sync,

    #[command(about = "Carve a store's data out of the shared schema")]
    Migrate {
        #[arg(help = "Store id to migrate")]
        store_id: i64,
    },

    #[command(about = "Report onboarding capacity given schema-count limits")]
    Capacity,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync => {
            let synchronizer = SchemaSynchronizer::from_env().await?;
            let report = synchronizer.synchronize_all().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.errors.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Migrate { store_id } => {
            let resolver = Arc::new(StoreResolver::from_env().await?);
            let migrator = StoreMigrator::new(DatabaseManager::main_pool().await?, resolver);
            let result = migrator.migrate_store(store_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Capacity => {
            let pool = DatabaseManager::main_pool().await?;
            let (current,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM stores WHERE is_active = true")
                    .fetch_one(&pool)
                    .await?;

            let limits = &storehub_api::config::config().capacity;
            let plan = capacity::plan(current, limits.max_schemas_allowed, limits.reserved_schemas);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}
