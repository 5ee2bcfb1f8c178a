/// Path masking inside the container rootfs
///
/// Directories are covered with an empty read-only tmpfs, everything else
/// with a bind mount of `/dev/null`. Mount targets are always the magic
/// `/proc/self/fd/N` link of an `O_PATH` descriptor obtained through the
/// scoped rootfs handle, so the kernel never re-walks an image-controlled path.
use crate::config::types::{BootError, Result, Stage};
use crate::kernel::scoped_dir::{Entry, EntryKind, ScopedDir, ScopedPath};
use nix::mount::{mount, MsFlags};
use std::io;

const NULL_DEVICE: &str = "/dev/null";
const NULL_RDEV: (u32, u32) = (1, 3);

/// What happened to one mask entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskOutcome {
    /// A tmpfs or null bind now covers the path
    Masked,
    /// The path does not exist in the rootfs
    Missing,
    /// A previous invocation already masked the path
    AlreadyMasked,
}

/// Per-run counters, logged by the hook
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaskSummary {
    pub masked: usize,
    pub missing: usize,
    pub already_masked: usize,
}

fn already_masked_dir(rootfs: &ScopedDir, path: &ScopedPath, entry: &Entry) -> io::Result<bool> {
    if !entry.is_readonly_tmpfs()? {
        return Ok(false);
    }
    let parent = rootfs.resolve_parent(path, None)?.stat()?;
    entry.is_mount_root(parent.dev())
}

fn mask_err(path: &ScopedPath, what: &str, err: io::Error) -> BootError {
    BootError::io(Stage::Mask, format!("failed to {} {}", what, path), err)
}

/// Mask a single rootfs path
pub fn mask_path(rootfs: &ScopedDir, path: &ScopedPath) -> Result<MaskOutcome> {
    let entry = match rootfs.resolve(path) {
        Ok(entry) => entry,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("mask target {} does not exist, skipping", path);
            return Ok(MaskOutcome::Missing);
        }
        Err(e) => return Err(mask_err(path, "resolve", e)),
    };
    let target = entry.proc_path();

    if entry.kind() == EntryKind::Directory {
        if already_masked_dir(rootfs, path, &entry).map_err(|e| mask_err(path, "inspect", e))? {
            log::info!("{} is already masked", path);
            return Ok(MaskOutcome::AlreadyMasked);
        }
        mount(
            Some("tmpfs"),
            target.as_path(),
            Some("tmpfs"),
            MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .map_err(|e| mask_err(path, "mount tmpfs over", e.into()))?;
        log::info!("masked directory {}", path);
    } else {
        if entry.kind() == EntryKind::CharDevice && entry.rdev() == NULL_RDEV {
            log::info!("{} is already masked", path);
            return Ok(MaskOutcome::AlreadyMasked);
        }
        mount(
            Some(NULL_DEVICE),
            target.as_path(),
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| mask_err(path, "bind /dev/null over", e.into()))?;
        log::info!("masked file {}", path);
    }
    Ok(MaskOutcome::Masked)
}

/// Mask every path in order, stopping at the first hard failure
pub fn mask_paths(rootfs: &ScopedDir, paths: &[ScopedPath]) -> Result<MaskSummary> {
    let mut summary = MaskSummary::default();
    for path in paths {
        match mask_path(rootfs, path)? {
            MaskOutcome::Masked => summary.masked += 1,
            MaskOutcome::Missing => summary.missing += 1,
            MaskOutcome::AlreadyMasked => summary.already_masked += 1,
        }
    }
    Ok(summary)
}
