//! `herald-core`: configuration, the shared error type and timestamp
//! helpers used by every Herald crate.

pub mod config;
pub mod error;
pub mod time;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
