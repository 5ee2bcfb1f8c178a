//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: scoped_dir -> devices, mount

pub mod devices;
pub mod mount;
pub mod scoped_dir;
