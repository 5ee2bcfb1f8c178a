/// Core types shared by the container init and the rootfs hook
use std::fmt;
use std::io;
use thiserror::Error;

/// Maximum number of workload arguments accepted from `cmdline`
pub const MAX_ARGS: usize = 256;

/// Maximum length of a single NUL-terminated record, terminator included.
/// Matches the kernel's per-string argument limit headroom (1 MiB).
pub const MAX_RECORD_LEN: usize = 1024 * 1024;

/// Maximum length of a single line in `masked.txt` / `devices.txt` (PATH_MAX)
pub const MAX_LINE_LEN: usize = 4096;

/// Maximum number of symlinks followed while resolving one rootfs path
pub const MAX_SYMLINK_FOLLOWS: usize = 40;

/// Bounds applied to every record file read from the runtime directory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordLimits {
    /// Maximum number of `cmdline` records
    pub max_args: usize,
    /// Maximum bytes per NUL-terminated record, terminator included
    pub max_record_len: usize,
    /// Maximum bytes per newline-terminated line, terminator included
    pub max_line_len: usize,
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self {
            max_args: MAX_ARGS,
            max_record_len: MAX_RECORD_LEN,
            max_line_len: MAX_LINE_LEN,
        }
    }
}

/// Step of the init or hook sequence an error originated from.
/// The stage selects the exit status offset inside a failure kind's range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Environ,
    Cmdline,
    Home,
    Fds,
    Sync,
    Cwd,
    Exec,
    Mask,
    Devices,
    Symlinks,
}

impl Stage {
    // Hook stages reuse the init's upper offsets; the two programs never share a status.
    fn offset(self) -> i32 {
        match self {
            Stage::Setup => 0,
            Stage::Environ => 1,
            Stage::Cmdline => 2,
            Stage::Home => 3,
            Stage::Fds => 4,
            Stage::Sync => 5,
            Stage::Cwd => 6,
            Stage::Exec => 7,
            Stage::Mask => 7,
            Stage::Devices => 8,
            Stage::Symlinks => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Environ => "environ",
            Stage::Cmdline => "cmdline",
            Stage::Home => "home",
            Stage::Fds => "fds",
            Stage::Sync => "sync",
            Stage::Cwd => "cwd",
            Stage::Exec => "exec",
            Stage::Mask => "mask",
            Stage::Devices => "devices",
            Stage::Symlinks => "symlinks",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exit status ranges, one decade per failure kind
pub mod exit_code {
    pub const CONFIG: i32 = 200;
    pub const IO: i32 = 210;
    pub const PARSE: i32 = 220;
    pub const UNSUPPORTED_DEVICE_KIND: i32 = 230;
    pub const HANDSHAKE: i32 = 240;
    pub const EXEC: i32 = 250;
    pub const EXEC_NOT_FOUND: i32 = 251;
    pub const EXEC_NOT_EXECUTABLE: i32 = 252;
    pub const EXEC_BAD_FORMAT: i32 = 253;
}

/// Malformed content in a record file
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("record {index} exceeds {limit} bytes")]
    TooLong { index: usize, limit: usize },

    #[error("more than {limit} records")]
    TooMany { limit: usize },

    #[error("{len} trailing bytes after the last complete record")]
    TrailingBytes { len: usize },

    #[error("record {index} has no '=' separator")]
    MissingSeparator { index: usize },

    #[error("record {index} has an empty key")]
    EmptyKey { index: usize },

    #[error("file contains no records")]
    Empty,

    #[error("line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },

    #[error("line {line}: invalid path {path:?}: {reason}")]
    InvalidPath {
        line: usize,
        path: String,
        reason: &'static str,
    },

    #[error("line {line}: unsupported device kind '{kind}'")]
    UnsupportedKind { line: usize, kind: String },
}

/// Error taxonomy of the init and hook programs
#[derive(Error, Debug)]
pub enum BootError {
    #[error("[{stage}] missing configuration: {what}")]
    ConfigMissing { stage: Stage, what: String },

    #[error("[{stage}] invalid configuration: {what}")]
    ConfigInvalid { stage: Stage, what: String },

    #[error("[{stage}] {context}: {source}")]
    Io {
        stage: Stage,
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("[{stage}] failed to parse {file}: {source}")]
    Parse {
        stage: Stage,
        file: String,
        #[source]
        source: RecordError,
    },

    #[error("[{stage}] {file}:{line}: unsupported device kind '{kind}'")]
    UnsupportedDeviceKind {
        stage: Stage,
        file: String,
        line: usize,
        kind: String,
    },

    #[error("[sync] failed to signal readiness on {fifo}: {source}")]
    Handshake {
        fifo: String,
        #[source]
        source: io::Error,
    },

    #[error("[exec] failed to exec {program:?}: {source}")]
    Exec {
        program: String,
        #[source]
        source: nix::errno::Errno,
    },
}

impl BootError {
    pub fn io(stage: Stage, context: impl Into<String>, source: io::Error) -> Self {
        BootError::Io {
            stage,
            context: context.into(),
            source,
        }
    }

    pub fn missing(stage: Stage, what: impl Into<String>) -> Self {
        BootError::ConfigMissing {
            stage,
            what: what.into(),
        }
    }

    pub fn invalid(stage: Stage, what: impl Into<String>) -> Self {
        BootError::ConfigInvalid {
            stage,
            what: what.into(),
        }
    }

    /// Classify a record error for `file`. An unsupported device kind and an
    /// empty record file get their own kinds, everything else is a parse error.
    pub fn from_record(stage: Stage, file: &str, err: RecordError) -> Self {
        match err {
            RecordError::UnsupportedKind { line, kind } => BootError::UnsupportedDeviceKind {
                stage,
                file: file.to_string(),
                line,
                kind,
            },
            RecordError::Empty => BootError::missing(stage, format!("{} contains no records", file)),
            RecordError::Io(source) => BootError::io(stage, format!("failed to read {}", file), source),
            source => BootError::Parse {
                stage,
                file: file.to_string(),
                source,
            },
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            BootError::ConfigMissing { stage, .. }
            | BootError::ConfigInvalid { stage, .. }
            | BootError::Io { stage, .. }
            | BootError::Parse { stage, .. }
            | BootError::UnsupportedDeviceKind { stage, .. } => *stage,
            BootError::Handshake { .. } => Stage::Sync,
            BootError::Exec { .. } => Stage::Exec,
        }
    }

    /// Process exit status for this error. Each kind owns a decade so the
    /// container engine can classify failures without parsing messages.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootError::ConfigMissing { stage, .. } | BootError::ConfigInvalid { stage, .. } => {
                exit_code::CONFIG + stage.offset()
            }
            BootError::Io { stage, .. } => exit_code::IO + stage.offset(),
            BootError::Parse { stage, .. } => exit_code::PARSE + stage.offset(),
            BootError::UnsupportedDeviceKind { .. } => exit_code::UNSUPPORTED_DEVICE_KIND,
            BootError::Handshake { .. } => exit_code::HANDSHAKE,
            BootError::Exec { source, .. } => match source {
                nix::errno::Errno::ENOENT | nix::errno::Errno::ENOTDIR => exit_code::EXEC_NOT_FOUND,
                nix::errno::Errno::EACCES | nix::errno::Errno::EPERM => {
                    exit_code::EXEC_NOT_EXECUTABLE
                }
                nix::errno::Errno::ENOEXEC => exit_code::EXEC_BAD_FORMAT,
                _ => exit_code::EXEC,
            },
        }
    }

    /// True for `ENOENT` I/O errors, the one errno mask and device targets treat as "nothing to do".
    pub fn is_not_found(&self) -> bool {
        matches!(self, BootError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Result type alias for init and hook operations
pub type Result<T> = std::result::Result<T, BootError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_record_limits_default() {
        let limits = RecordLimits::default();
        assert!(limits.max_args >= 256);
        assert!(limits.max_record_len >= 1024 * 1024);
        assert_eq!(limits.max_line_len, 4096);
    }

    #[test]
    fn test_exit_code_ranges_are_disjoint() {
        let config = BootError::missing(Stage::Cmdline, "cmdline");
        let io = BootError::io(Stage::Cmdline, "read", io::Error::from_raw_os_error(libc::EIO));
        let parse = BootError::from_record(
            Stage::Cmdline,
            "cmdline",
            RecordError::TrailingBytes { len: 3 },
        );
        let handshake = BootError::Handshake {
            fifo: "syncfifo".into(),
            source: io::Error::from_raw_os_error(libc::EPIPE),
        };
        let exec = BootError::Exec {
            program: "/bin/true".into(),
            source: Errno::EIO,
        };

        assert_eq!(config.exit_code(), 202);
        assert_eq!(io.exit_code(), 212);
        assert_eq!(parse.exit_code(), 222);
        assert_eq!(handshake.exit_code(), 240);
        assert_eq!(exec.exit_code(), 250);

        for err in [&config, &io, &parse, &handshake, &exec] {
            let code = err.exit_code();
            assert!(code > 0 && code < 256, "exit code {} out of range", code);
        }
    }

    #[test]
    fn test_exec_failures_are_subclassified() {
        let code = |errno| {
            BootError::Exec {
                program: "x".into(),
                source: errno,
            }
            .exit_code()
        };
        assert_eq!(code(Errno::ENOENT), exit_code::EXEC_NOT_FOUND);
        assert_eq!(code(Errno::EACCES), exit_code::EXEC_NOT_EXECUTABLE);
        assert_eq!(code(Errno::ENOEXEC), exit_code::EXEC_BAD_FORMAT);
    }

    #[test]
    fn test_record_error_classification() {
        let err = BootError::from_record(
            Stage::Devices,
            "devices.txt",
            RecordError::UnsupportedKind {
                line: 3,
                kind: "x".into(),
            },
        );
        assert!(matches!(err, BootError::UnsupportedDeviceKind { line: 3, .. }));
        assert_eq!(err.exit_code(), exit_code::UNSUPPORTED_DEVICE_KIND);

        let err = BootError::from_record(Stage::Cmdline, "cmdline", RecordError::Empty);
        assert!(matches!(err, BootError::ConfigMissing { .. }));
    }

    #[test]
    fn test_not_found_detection() {
        let err = BootError::io(Stage::Mask, "stat", io::Error::from_raw_os_error(libc::ENOENT));
        assert!(err.is_not_found());
        let err = BootError::io(Stage::Mask, "stat", io::Error::from_raw_os_error(libc::EACCES));
        assert!(!err.is_not_found());
    }
}
