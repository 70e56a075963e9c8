//! Database connection pool management and schema migrations

mod postgres;

pub use postgres::{
    create_pool, create_pool_from_env, run_migrations, run_migrations_from, DatabaseConfig,
    MIGRATIONS_DIR,
};

// Re-export PgPool for convenience
pub use sqlx::postgres::{PgConnection, PgPool};
