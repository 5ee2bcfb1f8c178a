//! Utilities
//!
//! Cross-cutting helpers for descriptor closing, HOME resolution and logging.

pub mod fd_closure;
pub mod home;
pub mod logging;
