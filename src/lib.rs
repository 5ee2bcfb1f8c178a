//! rootstrap: privileged bootstrap layer of an OCI container runtime
//!
//! Two programs run with elevated privilege against an image-controlled tree:
//! the container init (`rootstrap-init`, PID 1 inside the container) and the
//! rootfs preparation hook (`rootstrap-hook`).
//!
//! # Architecture
//!
//! ## Runtime Directory Protocol ([`config`])
//! - [`config::runtime_dir`]: well-known file names and the `RuntimeDir` handle
//! - [`config::types`]: error taxonomy, stages, exit statuses and record bounds
//!
//! ## Record Parsing ([`records`])
//! - [`records::reader`]: bounded NUL-record and line readers
//! - [`records::environ`], [`records::cmdline`]: init inputs
//! - [`records::masked`], [`records::devices`]: hook inputs
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::scoped_dir`]: descriptor-relative traversal confined to a directory
//! - [`kernel::mount`]: path masking
//! - [`kernel::devices`]: device node and `/dev/std*` link creation
//!
//! ## Execution Control ([`exec`])
//! - [`exec::preexec`]: type-state enforced init ordering and workload exec
//! - [`exec::sync`]: readiness handshake over the sync FIFO
//! - [`exec::hook`]: rootfs hook orchestration
//!
//! ## Utilities ([`utils`])
//! - [`utils::fd_closure`]: inherited descriptor closing
//! - [`utils::home`]: HOME fallback chain
//! - [`utils::logging`]: logger setup
//!
//! # Design Principles
//!
//! 1. **Descriptors, not path strings** - every rootfs lookup walks one component at a time
//! 2. **Parse fully, then apply** - a malformed record never leads to partial changes
//! 3. **Types prevent errors** - the init cannot exec before it signalled readiness
//! 4. **Minimal unsafe** - thin wrappers with explicit preconditions
//! 5. **Classifiable failures** - each failure kind owns an exit status range

// Configuration & shared types
pub mod config;

// Record parsers
pub mod records;

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Utilities
pub mod utils;

// CLI entrypoint wiring shared by the init and hook binaries.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use exec::preexec;
