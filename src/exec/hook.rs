/// Rootfs preparation hook
///
/// Runs once per container, before the workload starts, against the mounted
/// rootfs. Both input files are parsed completely before the first mutation,
/// then devices are created, the `/dev/std*` links ensured and paths masked.
use crate::config::runtime_dir::RuntimeDir;
use crate::config::types::{BootError, Result, Stage};
use crate::kernel::devices::{create_devices, ensure_stdio_symlinks};
use crate::kernel::mount::mask::{mask_paths, MaskSummary};
use crate::kernel::scoped_dir::ScopedDir;
use std::io;
use std::path::{Path, PathBuf};

/// The only engine hook type this program may run as
pub const HOOK_TYPE_MOUNT: &str = "mount";

/// Hook invocation parameters, normally taken from the engine's environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookConfig {
    /// Mounted container rootfs (`LXC_ROOTFS_MOUNT`)
    pub rootfs_mount: PathBuf,
    /// Engine config file inside the runtime directory (`LXC_CONFIG_FILE`)
    pub config_file: PathBuf,
    /// Engine hook type (`LXC_HOOK_TYPE`); unchecked when absent
    pub hook_type: Option<String>,
}

impl HookConfig {
    /// The runtime directory is the directory holding the config file
    pub fn runtime_dir(&self) -> Result<&Path> {
        match self.config_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
            _ => Err(BootError::invalid(
                Stage::Setup,
                format!("config file {} has no parent directory", self.config_file.display()),
            )),
        }
    }

    fn check_hook_type(&self) -> Result<()> {
        match self.hook_type.as_deref() {
            None | Some(HOOK_TYPE_MOUNT) => Ok(()),
            Some(other) => Err(BootError::invalid(
                Stage::Setup,
                format!("hook type '{}' is not supported, expected '{}'", other, HOOK_TYPE_MOUNT),
            )),
        }
    }
}

/// What one hook run changed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookReport {
    pub devices_created: usize,
    pub masks: MaskSummary,
}

fn open_rootfs(path: &Path) -> Result<ScopedDir> {
    ScopedDir::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            BootError::missing(Stage::Setup, format!("rootfs {}", path.display()))
        } else {
            BootError::io(Stage::Setup, format!("failed to open rootfs {}", path.display()), e)
        }
    })
}

/// Open the runtime directory holding the engine's config file
pub fn open_runtime(config: &HookConfig) -> Result<RuntimeDir> {
    RuntimeDir::open(config.runtime_dir()?)
}

/// Validate the invocation, open the rootfs and prepare it from `runtime`
pub fn run_hook(config: &HookConfig, runtime: &RuntimeDir) -> Result<HookReport> {
    config.check_hook_type()?;
    let rootfs = open_rootfs(&config.rootfs_mount)?;
    log::info!(
        "preparing rootfs {} from {}",
        config.rootfs_mount.display(),
        runtime.path().display()
    );
    prepare_rootfs(&rootfs, runtime)
}

/// Create devices and mask paths below `rootfs` as staged in `runtime`
pub fn prepare_rootfs(rootfs: &ScopedDir, runtime: &RuntimeDir) -> Result<HookReport> {
    let devices = runtime.load_devices()?;
    let masked = runtime.load_masked()?;
    let mut report = HookReport::default();

    if let Some(devices) = devices {
        report.devices_created = create_devices(rootfs, &devices)?;
        ensure_stdio_symlinks(rootfs)?;
    }
    if let Some(masked) = masked {
        report.masks = mask_paths(rootfs, &masked)?;
    }

    log::info!(
        "rootfs ready: {} devices created, {} paths masked, {} missing, {} already masked",
        report.devices_created,
        report.masks.masked,
        report.masks.missing,
        report.masks.already_masked
    );
    Ok(report)
}
