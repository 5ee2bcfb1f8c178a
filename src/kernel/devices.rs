//! Device node creation inside the container rootfs.
//!
//! Nodes are created with `mknodat` relative to the parent directory's
//! descriptor. Missing parents are created one component at a time through
//! [`ScopedDir::resolve_parent`], so a symlink planted in the image can
//! never redirect creation outside the rootfs.

use crate::config::types::{BootError, Result, Stage};
use crate::kernel::scoped_dir::{EntryKind, ScopedDir, ScopedPath};
use crate::records::{DeviceKind, DeviceSpec};
use nix::sys::stat::makedev;
use std::ffi::OsStr;
use std::io;

/// Mode of intermediate directories created on the way to a device node
pub const PARENT_DIR_MODE: u32 = 0o755;

/// `/dev/std*` links ensured after the device list
pub const STDIO_LINKS: [(&str, &str); 3] = [
    ("stdin", "/proc/self/fd/0"),
    ("stdout", "/proc/self/fd/1"),
    ("stderr", "/proc/self/fd/2"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceOutcome {
    Created,
    /// Something already exists at the path; it is left untouched
    Exists,
}

fn device_err(spec: &DeviceSpec, what: &str, err: io::Error) -> BootError {
    BootError::io(Stage::Devices, format!("failed to {} {}", what, spec.path), err)
}

/// Create one device node with exact mode and ownership
pub fn create_device(rootfs: &ScopedDir, spec: &DeviceSpec) -> Result<DeviceOutcome> {
    let parent = rootfs
        .resolve_parent(&spec.path, Some(PARENT_DIR_MODE))
        .map_err(|e| device_err(spec, "create parent directories of", e))?;
    let name = spec.path.file_name();

    if parent
        .entry(name)
        .map_err(|e| device_err(spec, "stat", e))?
        .is_some()
    {
        log::debug!("{} already exists, skipping", spec.path);
        return Ok(DeviceOutcome::Exists);
    }

    let dev = match spec.kind {
        DeviceKind::Fifo => 0,
        DeviceKind::Block | DeviceKind::Char => makedev(spec.major.into(), spec.minor.into()),
    };
    parent
        .mknod(name, spec.kind.file_type(), spec.mode, dev)
        .map_err(|e| device_err(spec, "create", e))?;

    let node = parent
        .entry(name)
        .map_err(|e| device_err(spec, "open", e))?
        .ok_or_else(|| device_err(spec, "open", io::Error::from_raw_os_error(libc::ENOENT)))?;
    // mknod honours the umask; set the recorded bits exactly
    node.chmod(spec.mode)
        .map_err(|e| device_err(spec, "chmod", e))?;
    node.chown(spec.uid, spec.gid)
        .map_err(|e| device_err(spec, "chown", e))?;

    log::info!(
        "created {} device {} ({}:{}, mode {:o}, owner {}:{})",
        spec.kind,
        spec.path,
        spec.major,
        spec.minor,
        spec.mode,
        spec.uid,
        spec.gid
    );
    Ok(DeviceOutcome::Created)
}

/// Create every device in order; returns how many nodes were created
pub fn create_devices(rootfs: &ScopedDir, specs: &[DeviceSpec]) -> Result<usize> {
    let mut created = 0;
    for spec in specs {
        if create_device(rootfs, spec)? == DeviceOutcome::Created {
            created += 1;
        }
    }
    Ok(created)
}

/// Point `/dev/stdin`, `/dev/stdout` and `/dev/stderr` at the process's
/// standard descriptors. A correct existing link is kept; any other entry
/// under one of those names fails with `EEXIST`.
pub fn ensure_stdio_symlinks(rootfs: &ScopedDir) -> Result<()> {
    let probe = ScopedPath::parse_absolute(b"/dev/stdin")
        .map_err(|reason| BootError::invalid(Stage::Symlinks, reason))?;
    let dev = rootfs
        .resolve_parent(&probe, Some(PARENT_DIR_MODE))
        .map_err(|e| BootError::io(Stage::Symlinks, "failed to open /dev", e))?;

    for (name, target) in STDIO_LINKS {
        let link_err = |e| BootError::io(Stage::Symlinks, format!("failed to link /dev/{}", name), e);
        let name = OsStr::new(name);

        match dev.entry(name).map_err(link_err)? {
            None => {
                dev.symlink(OsStr::new(target), name).map_err(link_err)?;
                log::debug!("linked /dev/{} -> {}", name.to_string_lossy(), target);
            }
            Some(entry) if entry.kind() == EntryKind::Symlink => {
                if dev.read_link(name).map_err(link_err)?.as_os_str() != OsStr::new(target) {
                    return Err(link_err(io::Error::from_raw_os_error(libc::EEXIST)));
                }
            }
            Some(_) => return Err(link_err(io::Error::from_raw_os_error(libc::EEXIST))),
        }
    }
    Ok(())
}
