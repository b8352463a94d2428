//! Core types, collaborator traits, and validation for the numwatch engine.

pub mod account;
pub mod backoff;
pub mod error;
pub mod job;
pub mod limits;
pub mod message;
pub mod phone;
pub mod signing;
pub mod stats;
pub mod status;
pub mod traits;

pub use account::*;
pub use backoff::*;
pub use error::{Error, Result};
pub use job::*;
pub use message::*;
pub use stats::*;
pub use status::*;
pub use traits::*;
