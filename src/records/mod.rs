//! Record parsers for the runtime directory files
//!
//! Every parser consumes its whole input before returning, so a malformed
//! record anywhere rejects the file and nothing is applied from it.

pub mod cmdline;
pub mod devices;
pub mod environ;
pub mod masked;
pub mod reader;

pub use cmdline::parse_cmdline;
pub use devices::{parse_devices, DeviceKind, DeviceSpec};
pub use environ::EnvMap;
pub use masked::parse_masked;
