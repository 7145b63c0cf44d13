//! Expensa CLI: database maintenance.
//!
//! Reads DATABASE_URL from the environment (or `.env`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use expensa_cli::{init_tracing, migration_states};
use expensa_db::MIGRATOR;
use sqlx::migrate::Migrate;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "expensa", about = "Expensa operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migrations
    Migrate {
        #[command(subcommand)]
        sub: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply pending migrations, stopping at the first failure
    Run,
    /// List embedded migrations and whether each is applied
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Migrate { sub } => match sub {
            MigrateCommands::Run => {
                MIGRATOR
                    .run(&pool)
                    .await
                    .context("Migration failed; later migrations were not applied")?;
                tracing::info!("Migrations are up to date");
            }
            MigrateCommands::Status => {
                let mut conn = pool.acquire().await?;
                conn.ensure_migrations_table().await?;
                let applied: Vec<i64> = conn
                    .list_applied_migrations()
                    .await?
                    .into_iter()
                    .map(|m| m.version)
                    .collect();

                let states = migration_states(
                    MIGRATOR
                        .iter()
                        .map(|m| (m.version, &*m.description)),
                    &applied,
                );
                for state in &states {
                    println!(
                        "{:>16}  {:<8}  {}",
                        state.version,
                        if state.applied { "applied" } else { "pending" },
                        state.description
                    );
                }
                let pending = states.iter().filter(|s| !s.applied).count();
                println!("{} migration(s) pending", pending);
            }
        },
    }

    Ok(())
}
