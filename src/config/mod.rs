//! Configuration and shared types
//!
//! Error taxonomy, exit statuses, record bounds and the runtime directory protocol.

pub mod runtime_dir;
pub mod types;
