/// Readiness handshake with the container engine
///
/// The init writes the container id into `syncfifo`. Opening the FIFO for
/// writing blocks until the engine opens the read end; that rendezvous is the
/// signal that setup inside the container finished. No timeout is applied.
use crate::config::runtime_dir::{RuntimeDir, SYNCFIFO};
use crate::config::types::{BootError, Result};
use std::ffi::OsStr;
use std::io::Write;

/// Block until the engine attaches to `syncfifo`, then send `container_id`
pub fn signal_ready(runtime: &RuntimeDir, container_id: &str) -> Result<()> {
    let handshake_err = |source| BootError::Handshake {
        fifo: runtime.path().join(SYNCFIFO).display().to_string(),
        source,
    };

    log::debug!("waiting for the engine to open {}", SYNCFIFO);
    let mut fifo = runtime
        .dir()
        .open_with(OsStr::new(SYNCFIFO), libc::O_WRONLY)
        .map_err(handshake_err)?;
    fifo.write_all(container_id.as_bytes())
        .map_err(handshake_err)?;
    log::debug!("readiness signalled for {}", container_id);
    Ok(())
}
