use crate::config::runtime_dir::RuntimeDir;
use crate::config::types::{exit_code, BootError};
use crate::exec::hook::{self, HookConfig};
use crate::exec::preexec::Bootstrap;
use crate::utils::logging::{init_logging, LogTarget};
use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CliMode {
    Init,
    Hook,
}

impl CliMode {
    fn primary_binary(self) -> &'static str {
        match self {
            Self::Init => "rootstrap-init",
            Self::Hook => "rootstrap-hook",
        }
    }

    /// The init shares stderr with the workload, so it stays quiet by default
    fn default_level(self) -> &'static str {
        match self {
            Self::Init => "warn",
            Self::Hook => "info",
        }
    }

    fn default_target(self) -> LogTarget {
        match self {
            Self::Init => LogTarget::Stderr,
            Self::Hook => LogTarget::Stdout,
        }
    }
}

/// Container init: becomes PID 1, signals readiness and execs the workload
#[derive(Parser, Debug)]
#[command(name = "rootstrap-init", version, about, long_about = None)]
struct InitCli {
    /// Container identifier written to the sync FIFO
    container_id: String,
    /// Runtime directory holding environ, cmdline, syncfifo and cwd
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,
}

/// Rootfs hook: creates device nodes and masks paths before the workload starts
#[derive(Parser, Debug)]
#[command(name = "rootstrap-hook", version, about, long_about = None)]
struct HookCli {
    /// Mounted container rootfs
    #[arg(long, env = "LXC_ROOTFS_MOUNT", value_name = "DIR")]
    rootfs_mount: PathBuf,
    /// Engine config file; its directory is the runtime directory
    #[arg(long, env = "LXC_CONFIG_FILE", value_name = "FILE")]
    config_file: PathBuf,
    /// Engine hook type, must be "mount" when set
    #[arg(long, env = "LXC_HOOK_TYPE")]
    hook_type: Option<String>,
    /// Positional arguments appended by the engine (container name, section, type)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    engine_args: Vec<String>,
}

impl From<HookCli> for HookConfig {
    fn from(cli: HookCli) -> Self {
        HookConfig {
            rootfs_mount: cli.rootfs_mount,
            config_file: cli.config_file,
            hook_type: cli.hook_type,
        }
    }
}

/// Parse arguments; usage errors exit with the configuration status
fn parse_args<C: Parser>(mode: CliMode) -> Result<C> {
    match C::try_parse() {
        Ok(cli) => Ok(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            std::process::exit(0);
        }
        Err(e) => {
            e.print()?;
            eprintln!("{}: invalid invocation", mode.primary_binary());
            std::process::exit(exit_code::CONFIG);
        }
    }
}

fn fail(mode: CliMode, err: BootError) -> ! {
    log::error!("{}: {}", mode.primary_binary(), err);
    std::process::exit(err.exit_code());
}

/// `error.log` of the runtime directory if the engine staged one, else the mode's default
fn log_target(mode: CliMode, runtime: &RuntimeDir) -> (LogTarget, Option<i32>) {
    match runtime.open_error_log() {
        Ok(Some(file)) => {
            let fd = file.as_raw_fd();
            (LogTarget::File(file), Some(fd))
        }
        Ok(None) => (mode.default_target(), None),
        Err(e) => {
            eprintln!(
                "{}: cannot open error.log in {}: {}",
                mode.primary_binary(),
                runtime.path().display(),
                e
            );
            (mode.default_target(), None)
        }
    }
}

fn run_init(cli: InitCli) -> ! {
    let mode = CliMode::Init;
    let runtime_path = cli.runtime_dir.unwrap_or_else(|| PathBuf::from("."));

    let runtime = match RuntimeDir::open(&runtime_path) {
        Ok(runtime) => runtime,
        Err(e) => {
            init_logging(mode.default_level(), mode.default_target());
            fail(mode, e);
        }
    };
    let (target, log_fd) = log_target(mode, &runtime);
    init_logging(mode.default_level(), target);

    let mut bootstrap = Bootstrap::new(runtime, cli.container_id);
    if let Some(fd) = log_fd {
        bootstrap = bootstrap.keep_fd(fd);
    }

    let result = bootstrap
        .load_environment()
        .and_then(|b| b.load_arguments())
        .map(|b| b.resolve_home())
        .and_then(|b| b.close_inherited_fds())
        .and_then(|b| b.signal_ready())
        .and_then(|b| b.exec());

    match result {
        Ok(never) => match never {},
        Err(e) => fail(mode, e),
    }
}

fn run_hook(cli: HookCli) -> Result<()> {
    let mode = CliMode::Hook;
    let engine_args = cli.engine_args.clone();
    let config = HookConfig::from(cli);

    let runtime = hook::open_runtime(&config);
    let target = match &runtime {
        Ok(runtime) => log_target(mode, runtime).0,
        Err(_) => mode.default_target(),
    };
    init_logging(mode.default_level(), target);
    log::debug!("invoked with engine arguments {:?}", engine_args);

    match runtime.and_then(|runtime| hook::run_hook(&config, &runtime)) {
        Ok(_) => Ok(()),
        Err(e) => fail(mode, e),
    }
}

pub fn run(mode: CliMode) -> Result<()> {
    match mode {
        CliMode::Init => run_init(parse_args(mode)?),
        CliMode::Hook => run_hook(parse_args(mode)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn test_cli_definitions_are_consistent() {
        InitCli::command().debug_assert();
        HookCli::command().debug_assert();
    }

    #[test]
    fn test_init_arguments() {
        let cli = InitCli::try_parse_from(["rootstrap-init", "c1", "--runtime-dir", "/run/c1"]).unwrap();
        assert_eq!(cli.container_id, "c1");
        assert_eq!(cli.runtime_dir, Some(PathBuf::from("/run/c1")));

        assert!(InitCli::try_parse_from(["rootstrap-init"]).is_err());
    }

    #[test]
    fn test_hook_accepts_engine_positional_arguments() {
        let cli = HookCli::try_parse_from([
            "rootstrap-hook",
            "--rootfs-mount",
            "/var/lib/lxc/c1/rootfs",
            "--config-file",
            "/run/lxcri/c1/config",
            "c1",
            "lxc",
            "mount",
        ])
        .unwrap();
        let config = HookConfig::from(cli);
        assert_eq!(config.rootfs_mount, PathBuf::from("/var/lib/lxc/c1/rootfs"));
        assert_eq!(config.runtime_dir().unwrap(), Path::new("/run/lxcri/c1"));
    }

    #[test]
    fn test_mode_defaults() {
        assert_eq!(CliMode::Init.default_level(), "warn");
        assert!(matches!(CliMode::Hook.default_target(), LogTarget::Stdout));
    }
}
