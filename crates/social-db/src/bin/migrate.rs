//! Schema migration entry point
//!
//! Run with:
//! ```bash
//! cargo run -p social-db --bin social-migrate
//! ```
//!
//! Reads `DATABASE_URL` (and the other settings) from the environment or `.env`.
//! The migrations directory defaults to the build checkout; set
//! `DATABASE_MIGRATIONS_DIR` when running an installed binary.

use anyhow::Context;
use social_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use social_db::{create_pool, run_migrations_from, DatabaseConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Migration failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_settings(&config.telemetry)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    let db = DatabaseConfig::from_settings(&config.database);
    info!(
        app = %config.app.name,
        env = ?config.app.env,
        dir = %db.migrations_dir.display(),
        "Applying migrations"
    );

    let pool = create_pool(&db)
        .await
        .context("failed to connect to database")?;

    run_migrations_from(&pool, &db.migrations_dir)
        .await
        .with_context(|| format!("failed to apply migrations from {}", db.migrations_dir.display()))?;

    pool.close().await;
    Ok(())
}
