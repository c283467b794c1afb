//! Schema module - Configuration and input record types for the behavior-art engine.

mod config;
mod record;

pub use config::*;
pub use record::*;
