//! Runtime directory protocol.
//!
//! The container engine stages one directory per container holding the
//! files below. The init and the hook only read these files (and append to
//! `error.log`); they never create or remove anything in the directory.

use crate::config::types::{BootError, RecordLimits, Result, Stage};
use crate::kernel::scoped_dir::{ScopedDir, ScopedPath};
use crate::records::{self, DeviceSpec, EnvMap};
use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{self, BufReader};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// NUL-terminated `KEY=VALUE` records
pub const ENVIRON: &str = "environ";
/// NUL-terminated workload arguments
pub const CMDLINE: &str = "cmdline";
/// Named pipe for the readiness handshake
pub const SYNCFIFO: &str = "syncfifo";
/// Directory (or symlink to one) used as the workload's working directory
pub const CWD: &str = "cwd";
/// Optional diagnostics sink
pub const ERROR_LOG: &str = "error.log";
/// Paths to hide inside the rootfs
pub const MASKED: &str = "masked.txt";
/// Device nodes to create inside the rootfs
pub const DEVICES: &str = "devices.txt";

/// Open handle on a container's runtime directory
#[derive(Debug)]
pub struct RuntimeDir {
    dir: ScopedDir,
    path: PathBuf,
    limits: RecordLimits,
}

impl RuntimeDir {
    pub fn open(path: &Path) -> Result<Self> {
        let dir = ScopedDir::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BootError::missing(Stage::Setup, format!("runtime directory {}", path.display()))
            } else {
                BootError::io(
                    Stage::Setup,
                    format!("failed to open runtime directory {}", path.display()),
                    e,
                )
            }
        })?;
        Ok(Self {
            dir,
            path: path.to_path_buf(),
            limits: RecordLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: RecordLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> &RecordLimits {
        &self.limits
    }

    pub fn dir(&self) -> &ScopedDir {
        &self.dir
    }

    fn open_optional(&self, stage: Stage, name: &str) -> Result<Option<BufReader<File>>> {
        self.dir
            .open_optional(OsStr::new(name))
            .map(|file| file.map(BufReader::new))
            .map_err(|e| BootError::io(stage, format!("failed to open {}", name), e))
    }

    /// Workload environment. A missing `environ` is an empty environment.
    pub fn load_environ(&self) -> Result<EnvMap> {
        match self.open_optional(Stage::Environ, ENVIRON)? {
            Some(reader) => EnvMap::parse(reader, self.limits.max_record_len)
                .map_err(|e| BootError::from_record(Stage::Environ, ENVIRON, e)),
            None => {
                log::debug!("no {} file, starting from an empty environment", ENVIRON);
                Ok(EnvMap::new())
            }
        }
    }

    /// Workload argument vector; `cmdline` is mandatory and must not be empty.
    pub fn load_cmdline(&self) -> Result<Vec<CString>> {
        let reader = self
            .open_optional(Stage::Cmdline, CMDLINE)?
            .ok_or_else(|| BootError::missing(Stage::Cmdline, CMDLINE))?;
        records::parse_cmdline(reader, &self.limits)
            .map_err(|e| BootError::from_record(Stage::Cmdline, CMDLINE, e))
    }

    /// Mask list, `None` if masking was not requested
    pub fn load_masked(&self) -> Result<Option<Vec<ScopedPath>>> {
        let Some(reader) = self.open_optional(Stage::Mask, MASKED)? else {
            return Ok(None);
        };
        records::parse_masked(reader, self.limits.max_line_len)
            .map(Some)
            .map_err(|e| BootError::from_record(Stage::Mask, MASKED, e))
    }

    /// Device list, `None` if no devices were requested
    pub fn load_devices(&self) -> Result<Option<Vec<DeviceSpec>>> {
        let Some(reader) = self.open_optional(Stage::Devices, DEVICES)? else {
            return Ok(None);
        };
        records::parse_devices(reader, self.limits.max_line_len)
            .map(Some)
            .map_err(|e| BootError::from_record(Stage::Devices, DEVICES, e))
    }

    /// Open `error.log` for appending if the engine staged one. Never creates it.
    pub fn open_error_log(&self) -> io::Result<Option<File>> {
        match self
            .dir
            .open_with(OsStr::new(ERROR_LOG), libc::O_WRONLY | libc::O_APPEND)
        {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl AsRawFd for RuntimeDir {
    fn as_raw_fd(&self) -> RawFd {
        self.dir.as_raw_fd()
    }
}
