//! # social-db
//!
//! Database layer implementing the social-core repository traits with
//! PostgreSQL via SQLx.
//!
//! ## Overview
//!
//! - Connection pool management and schema migrations
//! - Database models with SQLx `FromRow` derives
//! - Entity ↔ Model mappers
//! - The ordered batch aggregator used for every count-per-id query
//! - Repository implementations for comment trees and relation edges
//!
//! ## Usage
//!
//! ```rust,ignore
//! use social_core::{RelationRepository, RelationEdge, RelationSpace, EntityId};
//! use social_db::{create_pool, run_migrations, DatabaseConfig, PgRelationRepository};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool(&DatabaseConfig::from_env()).await?;
//!     run_migrations(&pool).await?;
//!
//!     let follows = PgRelationRepository::new(pool, RelationSpace::Follows);
//!     let state = follows
//!         .flip(&RelationEdge::follow(EntityId::new(1), EntityId::new(2)))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use aggregate::{Condition, CountRule, OrderedBatchAggregator, Value};
pub use pool::{
    create_pool, create_pool_from_env, run_migrations, run_migrations_from, DatabaseConfig,
    PgConnection, PgPool,
};
pub use repositories::{PgCommentRepository, PgRelationRepository};
