/// HOME fallback chain for the workload environment
use crate::records::EnvMap;
use nix::unistd::{geteuid, User};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

pub const ROOT_HOME: &str = "/root";
pub const LAST_RESORT_HOME: &str = "/";

/// Where the workload's HOME came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeSource {
    /// Already present in `environ`
    Environ,
    Passwd,
    RootDir,
    LastResort,
}

/// Set HOME if `environ` did not. Tries the passwd home, then `/root` when
/// `root_accessible` says so, then `/`.
pub fn resolve_home_with(
    env: &mut EnvMap,
    passwd_home: Option<PathBuf>,
    root_accessible: impl FnOnce() -> bool,
) -> HomeSource {
    if env.contains("HOME") {
        return HomeSource::Environ;
    }

    let (home, source) = match passwd_home {
        Some(home) if !home.as_os_str().is_empty() => (home, HomeSource::Passwd),
        _ if root_accessible() => (PathBuf::from(ROOT_HOME), HomeSource::RootDir),
        _ => (PathBuf::from(LAST_RESORT_HOME), HomeSource::LastResort),
    };
    log::debug!("HOME unset, using {} ({:?})", home.display(), source);
    env.insert("HOME", home.into_os_string());
    source
}

/// Home directory of the effective user, if the container has a passwd entry
pub fn passwd_home() -> Option<PathBuf> {
    match User::from_uid(geteuid()) {
        Ok(user) => user.map(|u| u.dir),
        Err(e) => {
            log::debug!("passwd lookup failed: {}", e);
            None
        }
    }
}

/// Whether `path` can be opened as a directory
pub fn dir_accessible(path: &Path) -> bool {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_PATH | libc::O_DIRECTORY | libc::O_CLOEXEC)
        .open(path)
        .is_ok()
}

/// Resolve HOME against the live system
pub fn resolve_home(env: &mut EnvMap) -> HomeSource {
    if env.contains("HOME") {
        return HomeSource::Environ;
    }
    resolve_home_with(env, passwd_home(), || dir_accessible(Path::new(ROOT_HOME)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn env(raw: &[u8]) -> EnvMap {
        EnvMap::parse(raw, 1024).unwrap()
    }

    #[test]
    fn test_existing_home_is_kept() {
        let mut vars = env(b"PATH=/bin\0HOME=/root\0");
        let source = resolve_home_with(&mut vars, Some("/home/app".into()), || true);
        assert_eq!(source, HomeSource::Environ);
        assert_eq!(vars.get("HOME"), Some(OsStr::new("/root")));
        assert_eq!(vars.get("PATH"), Some(OsStr::new("/bin")));
    }

    #[test]
    fn test_passwd_home_first() {
        let mut vars = env(b"PATH=/bin\0");
        let source = resolve_home_with(&mut vars, Some("/home/app".into()), || true);
        assert_eq!(source, HomeSource::Passwd);
        assert_eq!(vars.get("HOME"), Some(OsStr::new("/home/app")));
    }

    #[test]
    fn test_no_passwd_entry_falls_back_to_root_then_slash() {
        let mut vars = env(b"PATH=/bin\0");
        assert_eq!(resolve_home_with(&mut vars, None, || true), HomeSource::RootDir);
        assert_eq!(vars.get("HOME"), Some(OsStr::new("/root")));

        let mut vars = env(b"PATH=/bin\0");
        assert_eq!(resolve_home_with(&mut vars, None, || false), HomeSource::LastResort);
        assert_eq!(vars.get("HOME"), Some(OsStr::new("/")));
    }

    #[test]
    fn test_root_probe_not_called_when_passwd_answers() {
        let mut vars = EnvMap::new();
        let source = resolve_home_with(&mut vars, Some("/srv".into()), || panic!("probed /root"));
        assert_eq!(source, HomeSource::Passwd);
    }

    #[test]
    fn test_dir_accessible() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(dir_accessible(tmp.path()));
        assert!(!dir_accessible(&tmp.path().join("missing")));
    }
}
