use anyhow::Result;
use catalog_migrate::logging::init_tracing;
use catalog_migrate::migrate::{self, config::MigrationConfig};
use catalog_migrate::util::env::init_env;
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog-migrate", version, about = "Legacy media catalog migration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate every legacy session into the target store
    Migrate(MigrateArgs),
}

#[derive(Debug, Default, Args)]
struct MigrateArgs {
    /// Legacy store DSN (defaults to SOURCE_DATABASE_URL)
    #[arg(long)]
    source_db_url: Option<String>,
    /// Target store DSN (defaults to TARGET_DATABASE_URL, then DATABASE_URL)
    #[arg(long)]
    target_db_url: Option<String>,
    /// Print the final report as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env();
    init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    match cli.command {
        Command::Migrate(args) => {
            let cfg = MigrationConfig::from_env(args.source_db_url, args.target_db_url)?;
            info!(
                workers = cfg.workers,
                queue_capacity = cfg.queue_capacity,
                "migrate"
            );
            let report = migrate::run(cfg).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
    }
    Ok(())
}
