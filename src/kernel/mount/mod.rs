//! Mount operations inside the container rootfs
//!
//! Provides path masking with read-only tmpfs and null-device binds.

pub mod mask;

// Re-export commonly used items
pub use mask::{mask_path, mask_paths, MaskOutcome, MaskSummary};
