//! Postgres persistence for the numwatch engine.
//!
//! Holds the record of truth: jobs, per-number items, the Telegram
//! account pool, and the durable half of the result cache. All writes the
//! pipeline depends on for correctness (guarded transitions, atomic error
//! counters, idempotent item upserts) live here.

pub mod client;
pub mod config;
pub mod health;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use store::*;
