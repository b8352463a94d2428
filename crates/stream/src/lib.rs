//! Redis Streams integration for the numwatch engine.
//!
//! The durable work queue: append-only streams with consumer groups,
//! per-message acknowledgment, and reclaim of messages left pending by a
//! dead consumer. Also hosts the fast layer of the result cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod consumer;
pub mod health;
pub mod producer;

pub use cache::*;
pub use client::*;
pub use config::*;
pub use consumer::*;
pub use producer::*;
