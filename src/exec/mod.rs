//! Execution control
//!
//! The container init's type-state chain, the readiness handshake and the
//! rootfs hook orchestration.

pub mod hook;
pub mod preexec;
pub mod sync;
