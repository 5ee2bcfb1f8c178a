use crate::config::runtime_dir::{RuntimeDir, CWD};
use crate::config::types::{BootError, Result, Stage};
use crate::records::EnvMap;
/// Container init ordering enforcement
///
/// The bootstrap sequence of PID 1 is FIXED:
/// 1. load `environ` into an owned map (the process environment is never touched)
/// 2. load `cmdline` into the argument vector
/// 3. fill in HOME if `environ` did not set it
/// 4. close every inherited descriptor the workload must not see
/// 5. signal readiness through `syncfifo` (blocks until the engine reads)
/// 6. chdir into `cwd`
/// 7. exec the workload
use crate::utils::{fd_closure, home};
use nix::errno::Errno;
use nix::unistd::{execve, fchdir};
use std::convert::Infallible;
use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::marker::PhantomData;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;

/// PATH used when `environ` does not define one
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

// ============================================================================
// Workload lookup
// ============================================================================

/// Paths to try for `program`, in order. Names containing `/` are used
/// as given; bare names are searched in `path` like `execvp` does, with an
/// empty PATH entry meaning the working directory.
pub fn exec_candidates(program: &CStr, path: Option<&OsStr>) -> Vec<CString> {
    let name = program.to_bytes();
    if name.contains(&b'/') {
        return vec![program.to_owned()];
    }

    let path = path.map(OsStr::as_bytes).unwrap_or(DEFAULT_PATH.as_bytes());
    path.split(|b| *b == b':')
        .filter_map(|dir| {
            let mut candidate = Vec::with_capacity(dir.len() + name.len() + 1);
            if dir.is_empty() {
                candidate.extend_from_slice(b"./");
            } else {
                candidate.extend_from_slice(dir);
                if !dir.ends_with(b"/") {
                    candidate.push(b'/');
                }
            }
            candidate.extend_from_slice(name);
            CString::new(candidate).ok()
        })
        .collect()
}

/// Interpreter for executables the kernel does not recognise
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Argument vector running `candidate` as a shell script, keeping the
/// workload's arguments after argv[0]
fn shell_argv(candidate: &CStr, argv: &[CString]) -> Vec<CString> {
    // FALLBACK_SHELL holds no NUL byte
    let mut shell = vec![CString::new(FALLBACK_SHELL).unwrap_or_default(), candidate.to_owned()];
    shell.extend(argv.iter().skip(1).cloned());
    shell
}

fn try_execve(path: &CStr, argv: &[CString], envp: &[CString]) -> Errno {
    match execve(path, argv, envp) {
        Ok(never) => match never {},
        Err(e) => e,
    }
}

/// Try each candidate with `execve`. Returns only on failure: `EACCES` if
/// some candidate existed but could not be executed, otherwise the last error.
/// A candidate rejected with `ENOEXEC` is run through `/bin/sh` once, the
/// search stops there.
fn exec_search(candidates: &[CString], argv: &[CString], envp: &[CString]) -> Errno {
    let mut last = Errno::ENOENT;
    let mut denied = false;
    for candidate in candidates {
        match try_execve(candidate, argv, envp) {
            errno @ (Errno::ENOENT | Errno::ENOTDIR) => last = errno,
            Errno::EACCES => denied = true,
            Errno::ENOEXEC => {
                log::debug!("{:?} has no known format, running it with {}", candidate, FALLBACK_SHELL);
                let shell = shell_argv(candidate, argv);
                let errno = try_execve(&shell[0], &shell, envp);
                log::warn!("{} could not run {:?}: {}", FALLBACK_SHELL, candidate, errno);
                return Errno::ENOEXEC;
            }
            other => return other,
        }
    }
    if denied {
        Errno::EACCES
    } else {
        last
    }
}

// ============================================================================
// Type-State Bootstrap Chain
// ============================================================================
//
// Init -> EnvLoaded -> ArgsLoaded -> HomeResolved -> FdsClean -> Signaled
//
// Each step consumes the prior state and returns exactly one next state on
// success. Only Bootstrap<Signaled> exposes exec.

/// Type-state marker: runtime directory opened, nothing read yet
pub struct Init;

/// Type-state marker: `environ` parsed
pub struct EnvLoaded;

/// Type-state marker: `cmdline` parsed
pub struct ArgsLoaded;

/// Type-state marker: HOME is set in the workload environment
pub struct HomeResolved;

/// Type-state marker: inherited descriptors closed
pub struct FdsClean;

/// Type-state marker: the engine received the readiness message
pub struct Signaled;

/// Container init with type-state tracking.
///
/// The workload can only be executed after every earlier step succeeded:
///
/// ```no_run
/// use rootstrap::config::runtime_dir::RuntimeDir;
/// use rootstrap::exec::preexec::Bootstrap;
/// use std::path::Path;
///
/// # fn main() -> rootstrap::Result<()> {
/// let runtime = RuntimeDir::open(Path::new("."))?;
/// let ready = Bootstrap::new(runtime, "c1")
///     .load_environment()?
///     .load_arguments()?
///     .resolve_home()
///     .close_inherited_fds()?
///     .signal_ready()?;
/// let err = match ready.exec() {
///     Err(e) => e,
///     Ok(never) => match never {},
/// };
/// std::process::exit(err.exit_code());
/// # }
/// ```
///
/// Executing before the handshake does not compile:
///
/// ```compile_fail
/// use rootstrap::exec::preexec::{Bootstrap, FdsClean};
///
/// fn early_exec(bootstrap: Bootstrap<FdsClean>) {
///     let _ = bootstrap.exec();
/// }
/// ```
///
/// Neither does signalling readiness with inherited descriptors still open:
///
/// ```compile_fail
/// use rootstrap::exec::preexec::{Bootstrap, HomeResolved};
///
/// fn skip_fd_closing(bootstrap: Bootstrap<HomeResolved>) {
///     let _ = bootstrap.signal_ready();
/// }
/// ```
///
/// And a consumed state cannot be reused:
///
/// ```compile_fail
/// use rootstrap::exec::preexec::{Bootstrap, Init};
///
/// fn reuse(bootstrap: Bootstrap<Init>) {
///     let _ = bootstrap.load_environment();
///     let _ = bootstrap.load_environment();
/// }
/// ```
pub struct Bootstrap<S> {
    runtime: RuntimeDir,
    container_id: String,
    env: EnvMap,
    argv: Vec<CString>,
    keep_fds: Vec<RawFd>,
    _state: PhantomData<S>,
}

impl<S> Bootstrap<S> {
    fn advance<T>(self) -> Bootstrap<T> {
        Bootstrap {
            runtime: self.runtime,
            container_id: self.container_id,
            env: self.env,
            argv: self.argv,
            keep_fds: self.keep_fds,
            _state: PhantomData,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Workload environment as built so far
    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// Workload arguments (empty before `load_arguments`)
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    pub fn runtime(&self) -> &RuntimeDir {
        &self.runtime
    }
}

impl Bootstrap<Init> {
    pub fn new(runtime: RuntimeDir, container_id: impl Into<String>) -> Self {
        Self {
            runtime,
            container_id: container_id.into(),
            env: EnvMap::new(),
            argv: Vec::new(),
            keep_fds: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Keep `fd` open across the descriptor closing step (e.g. `error.log`)
    pub fn keep_fd(mut self, fd: RawFd) -> Self {
        self.keep_fds.push(fd);
        self
    }

    pub fn load_environment(mut self) -> Result<Bootstrap<EnvLoaded>> {
        self.env = self.runtime.load_environ()?;
        log::debug!("loaded {} environment variables", self.env.len());
        Ok(self.advance())
    }
}

impl Bootstrap<EnvLoaded> {
    pub fn load_arguments(mut self) -> Result<Bootstrap<ArgsLoaded>> {
        self.argv = self.runtime.load_cmdline()?;
        log::debug!("loaded {} arguments", self.argv.len());
        Ok(self.advance())
    }
}

impl Bootstrap<ArgsLoaded> {
    /// Fill in HOME from passwd, `/root` or `/`
    pub fn resolve_home(mut self) -> Bootstrap<HomeResolved> {
        home::resolve_home(&mut self.env);
        self.advance()
    }

    /// Like [`Bootstrap::resolve_home`] with an explicit passwd answer and `/root` probe
    pub fn resolve_home_with(
        mut self,
        passwd_home: Option<std::path::PathBuf>,
        root_accessible: impl FnOnce() -> bool,
    ) -> Bootstrap<HomeResolved> {
        home::resolve_home_with(&mut self.env, passwd_home, root_accessible);
        self.advance()
    }
}

impl Bootstrap<HomeResolved> {
    /// Close everything except stdio, the runtime directory and kept descriptors
    pub fn close_inherited_fds(self) -> Result<Bootstrap<FdsClean>> {
        let mut keep = self.keep_fds.clone();
        keep.push(self.runtime.as_raw_fd());
        fd_closure::close_inherited_fds(&keep)?;
        Ok(self.advance())
    }
}

impl Bootstrap<FdsClean> {
    pub fn signal_ready(self) -> Result<Bootstrap<Signaled>> {
        crate::exec::sync::signal_ready(&self.runtime, &self.container_id)?;
        Ok(self.advance())
    }
}

impl Bootstrap<Signaled> {
    /// Enter the working directory named by `cwd`
    fn enter_workdir(&self) -> Result<()> {
        let dir = self
            .runtime
            .dir()
            .open_with(OsStr::new(CWD), libc::O_PATH | libc::O_DIRECTORY)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    BootError::missing(Stage::Cwd, CWD)
                } else {
                    BootError::io(Stage::Cwd, format!("failed to open {}", CWD), e)
                }
            })?;
        fchdir(dir.as_raw_fd())
            .map_err(|e| BootError::io(Stage::Cwd, format!("failed to chdir into {}", CWD), e.into()))
    }

    /// Change into `cwd` and replace the process image with the workload.
    /// Only ever returns an error.
    pub fn exec(self) -> Result<Infallible> {
        self.enter_workdir()?;

        // argv is never empty past load_arguments
        let program = self.argv[0].as_c_str();
        let candidates = exec_candidates(program, self.env.get("PATH"));
        let envp = self.env.to_exec_env();

        log::info!("executing {:?} for {}", program, self.container_id);
        let errno = exec_search(&candidates, &self.argv, &envp);
        Err(BootError::Exec {
            program: program.to_string_lossy().into_owned(),
            source: errno,
        })
    }
}
