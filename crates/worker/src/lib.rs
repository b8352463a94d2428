//! Background workers for the numwatch engine.
//!
//! Handles the async pipeline stages:
//! - Platform workers (stream → checker → item write → ack → progress)
//! - WhatsApp checker (free stage-1 probe, paid stage-2 API)
//! - Telegram checker (account pool with flood-wait handling)
//! - Aggregator (progress drain + completion sweep)
//! - Export (CSV to object storage with signed download URLs)

pub mod aggregator;
pub mod config;
pub mod export;
pub mod pool;
pub mod scheduler;
pub mod telegram;
pub mod whatsapp;

pub use aggregator::*;
pub use config::*;
pub use export::*;
pub use pool::*;
pub use scheduler::*;
pub use telegram::*;
pub use whatsapp::*;
