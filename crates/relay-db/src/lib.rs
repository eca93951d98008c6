//! # relay-db
//!
//! PostgreSQL storage for the delivery engine via SQLx.
//!
//! ## Overview
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `relay-core`:
//!
//! - Per-channel sequence counters
//! - The append-only timeline and the write-fanout inbox projection
//! - The offline delivery queue and read receipts
//! - Reactions and recall audit records
//! - Channel membership (the membership collaborator)
//!
//! Schema lives in `migrations/` and is applied with [`run_migrations`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_common::AppConfig;
//! use relay_core::traits::SequenceRepository;
//! use relay_db::{create_pool, run_migrations, PgSequenceRepository};
//!
//! async fn example(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool(&config.database).await?;
//!     run_migrations(&pool).await?;
//!
//!     let sequences = PgSequenceRepository::new(pool);
//!     let seq = sequences.next_seq(channel_id).await?;
//!     Ok(())
//! }
//! ```

pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use pool::{create_pool, create_pool_with, run_migrations, PgPool, PoolTimeouts};
pub use repositories::{
    PgChannelRepository, PgInboxRepository, PgMessageRepository, PgOfflineQueueRepository,
    PgReactionRepository, PgReadReceiptRepository, PgSequenceRepository,
};
