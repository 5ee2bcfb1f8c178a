//! Descriptor-scoped access to an untrusted directory tree.
//!
//! Every lookup walks one component at a time from an `O_PATH` directory
//! descriptor with `O_NOFOLLOW`. Symlinks found in the tree are resolved
//! inside the scope: absolute targets restart at the scope root and `..`
//! never climbs above it. No operation ever goes through a host absolute
//! path assembled from strings.

use crate::config::types::MAX_SYMLINK_FOLLOWS;
use nix::sys::stat::{major, minor};
use std::collections::VecDeque;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const STATX_ATTR_MOUNT_ROOT: u64 = 0x2000;

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn to_cstring(name: &OsStr) -> io::Result<CString> {
    CString::new(name.as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

fn single_component(name: &OsStr) -> io::Result<CString> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes == b"." || bytes == b".." || bytes.contains(&b'/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{:?} is not a single path component", name),
        ));
    }
    to_cstring(name)
}

fn openat_raw(dir: BorrowedFd<'_>, name: &CStr, flags: libc::c_int) -> io::Result<OwnedFd> {
    // SAFETY: name is a valid NUL-terminated string; no O_CREAT so no mode argument.
    let fd = cvt(unsafe { libc::openat(dir.as_raw_fd(), name.as_ptr(), flags | libc::O_CLOEXEC) })?;
    // SAFETY: openat returned a fresh descriptor we exclusively own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn fstat_fd(fd: BorrowedFd<'_>) -> io::Result<libc::stat> {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: fstat fills the buffer on success; O_PATH descriptors are accepted.
    cvt(unsafe { libc::fstat(fd.as_raw_fd(), st.as_mut_ptr()) })?;
    Ok(unsafe { st.assume_init() })
}

fn readlink_at(dir: BorrowedFd<'_>, name: &CStr) -> io::Result<OsString> {
    let mut buf = vec![0u8; libc::PATH_MAX as usize];
    // SAFETY: buf is writable for buf.len() bytes; readlinkat does not NUL-terminate.
    let len = unsafe {
        libc::readlinkat(
            dir.as_raw_fd(),
            name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
        )
    };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }
    let len = len as usize;
    if len == buf.len() {
        return Err(io::Error::from_raw_os_error(libc::ENAMETOOLONG));
    }
    buf.truncate(len);
    Ok(OsString::from_vec(buf))
}

/// A validated, rootfs-relative path: no `..`, no empty or `.` components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopedPath {
    components: Vec<OsString>,
}

impl ScopedPath {
    /// Parse a slash-rooted path from a record file. The leading `/` is
    /// stripped, `//` and `.` are normalised away, `..` is rejected.
    pub fn parse_absolute(raw: &[u8]) -> std::result::Result<Self, &'static str> {
        if raw.first() != Some(&b'/') {
            return Err("path is not absolute");
        }
        Self::parse_relative(&raw[1..])
    }

    /// Parse a path relative to the scope root with the same rules as
    /// [`ScopedPath::parse_absolute`].
    pub fn parse_relative(raw: &[u8]) -> std::result::Result<Self, &'static str> {
        if raw.contains(&0) {
            return Err("path contains a NUL byte");
        }

        let mut components = Vec::new();
        for part in raw.split(|b| *b == b'/') {
            match part {
                b"" | b"." => continue,
                b".." => return Err("parent directory components are not allowed"),
                name => components.push(OsString::from_vec(name.to_vec())),
            }
        }

        if components.is_empty() {
            return Err("path names the root itself");
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[OsString] {
        &self.components
    }

    /// Components leading to the final entry
    pub fn parent_components(&self) -> &[OsString] {
        &self.components[..self.components.len() - 1]
    }

    pub fn file_name(&self) -> &OsStr {
        // components is never empty after parsing
        &self.components[self.components.len() - 1]
    }

    pub fn to_path_buf(&self) -> PathBuf {
        let mut path = PathBuf::from("/");
        for component in &self.components {
            path.push(component);
        }
        path
    }
}

impl std::fmt::Display for ScopedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path_buf().display())
    }
}

/// Type of a resolved entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl EntryKind {
    fn from_mode(mode: libc::mode_t) -> Self {
        match mode & libc::S_IFMT {
            libc::S_IFDIR => EntryKind::Directory,
            libc::S_IFLNK => EntryKind::Symlink,
            libc::S_IFCHR => EntryKind::CharDevice,
            libc::S_IFBLK => EntryKind::BlockDevice,
            libc::S_IFIFO => EntryKind::Fifo,
            libc::S_IFSOCK => EntryKind::Socket,
            _ => EntryKind::File,
        }
    }
}

/// An `O_PATH` handle on a resolved entry plus its metadata
pub struct Entry {
    fd: OwnedFd,
    stat: libc::stat,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("fd", &self.fd)
            .field("kind", &self.kind())
            .field("mode", &format_args!("{:o}", self.mode()))
            .finish()
    }
}

impl Entry {
    fn new(fd: OwnedFd) -> io::Result<Self> {
        let stat = fstat_fd(fd.as_fd())?;
        Ok(Self { fd, stat })
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.stat.st_mode)
    }

    /// Permission bits, including setuid/setgid/sticky
    pub fn mode(&self) -> u32 {
        (self.stat.st_mode & 0o7777) as u32
    }

    pub fn uid(&self) -> u32 {
        self.stat.st_uid
    }

    pub fn gid(&self) -> u32 {
        self.stat.st_gid
    }

    pub fn dev(&self) -> u64 {
        self.stat.st_dev as u64
    }

    /// (major, minor) of a device node
    pub fn rdev(&self) -> (u32, u32) {
        let rdev = self.stat.st_rdev;
        (major(rdev) as u32, minor(rdev) as u32)
    }

    /// Magic-link path that refers to exactly this entry. Mount targets use it
    /// so the kernel never re-resolves the original path.
    pub fn proc_path(&self) -> PathBuf {
        PathBuf::from(format!("/proc/self/fd/{}", self.fd.as_raw_fd()))
    }

    /// Whether the entry is the root of a mount. Uses `statx` when the kernel
    /// reports `STATX_ATTR_MOUNT_ROOT`, otherwise compares against `parent_dev`.
    pub fn is_mount_root(&self, parent_dev: u64) -> io::Result<bool> {
        let mut stx = MaybeUninit::<libc::statx>::zeroed();
        // SAFETY: empty path with AT_EMPTY_PATH targets the descriptor itself.
        let rc = unsafe {
            libc::statx(
                self.fd.as_raw_fd(),
                b"\0".as_ptr() as *const libc::c_char,
                libc::AT_EMPTY_PATH | libc::AT_SYMLINK_NOFOLLOW,
                libc::STATX_BASIC_STATS,
                stx.as_mut_ptr(),
            )
        };
        if rc == 0 {
            let stx = unsafe { stx.assume_init() };
            if stx.stx_attributes_mask & STATX_ATTR_MOUNT_ROOT != 0 {
                return Ok(stx.stx_attributes & STATX_ATTR_MOUNT_ROOT != 0);
            }
        }
        Ok(self.dev() != parent_dev)
    }

    /// Whether the entry lives on a read-only tmpfs
    pub fn is_readonly_tmpfs(&self) -> io::Result<bool> {
        let mut buf = MaybeUninit::<libc::statfs>::uninit();
        // SAFETY: fstatfs fills the buffer on success; O_PATH descriptors are accepted.
        cvt(unsafe { libc::fstatfs(self.fd.as_raw_fd(), buf.as_mut_ptr()) })?;
        let buf = unsafe { buf.assume_init() };
        if buf.f_type as i64 != libc::TMPFS_MAGIC as i64 {
            return Ok(false);
        }
        let mut vfs = MaybeUninit::<libc::statvfs>::uninit();
        // SAFETY: fstatvfs fills the buffer on success.
        cvt(unsafe { libc::fstatvfs(self.fd.as_raw_fd(), vfs.as_mut_ptr()) })?;
        let vfs = unsafe { vfs.assume_init() };
        Ok((vfs.f_flag as u64) & (libc::ST_RDONLY as u64) != 0)
    }

    /// Change ownership of the entry itself, never a symlink target
    pub fn chown(&self, uid: u32, gid: u32) -> io::Result<()> {
        // SAFETY: empty path with AT_EMPTY_PATH targets the O_PATH descriptor itself.
        cvt(unsafe {
            libc::fchownat(
                self.fd.as_raw_fd(),
                b"\0".as_ptr() as *const libc::c_char,
                uid,
                gid,
                libc::AT_EMPTY_PATH,
            )
        })?;
        Ok(())
    }

    /// Set permission bits exactly, bypassing the process umask
    pub fn chmod(&self, mode: u32) -> io::Result<()> {
        if self.kind() == EntryKind::Symlink {
            return Err(io::Error::from_raw_os_error(libc::ELOOP));
        }
        let path = to_cstring(self.proc_path().as_os_str())?;
        // SAFETY: path is the magic link of a non-symlink O_PATH descriptor we own.
        cvt(unsafe { libc::fchmodat(libc::AT_FDCWD, path.as_ptr(), mode as libc::mode_t, 0) })?;
        Ok(())
    }
}

impl AsFd for Entry {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Tracks the directory stack while walking below a scope root
struct Walker<'a> {
    root: BorrowedFd<'a>,
    stack: Vec<OwnedFd>,
    pending: VecDeque<OsString>,
    links: usize,
}

impl<'a> Walker<'a> {
    fn new(root: BorrowedFd<'a>, components: &[OsString]) -> Self {
        Self {
            root,
            stack: Vec::new(),
            pending: components.iter().cloned().collect(),
            links: 0,
        }
    }

    fn current(&self) -> BorrowedFd<'_> {
        match self.stack.last() {
            Some(fd) => fd.as_fd(),
            None => self.root,
        }
    }

    /// Queue the target of a symlink found in the current directory
    fn follow(&mut self, target: OsString) -> io::Result<()> {
        self.links += 1;
        if self.links > MAX_SYMLINK_FOLLOWS {
            return Err(io::Error::from_raw_os_error(libc::ELOOP));
        }

        let bytes = target.as_bytes();
        if bytes.first() == Some(&b'/') {
            self.stack.clear();
        }
        for part in bytes.rsplit(|b| *b == b'/') {
            match part {
                b"" | b"." => continue,
                name => self.pending.push_front(OsString::from_vec(name.to_vec())),
            }
        }
        Ok(())
    }

    /// Open `name` in the current directory without following a symlink
    fn open_component(&self, name: &CStr) -> io::Result<OwnedFd> {
        openat_raw(self.current(), name, libc::O_PATH | libc::O_NOFOLLOW)
    }

    /// Descend into one queued directory component, following symlinks in scope.
    /// Missing directories are created with `create_mode` when given.
    fn descend(&mut self, name: OsString, create_mode: Option<u32>) -> io::Result<()> {
        if name.as_bytes() == b".." {
            // clamped at the scope root
            self.stack.pop();
            return Ok(());
        }

        let cname = to_cstring(&name)?;
        let mut created = false;
        loop {
            match self.open_component(&cname) {
                Ok(fd) => {
                    let st = fstat_fd(fd.as_fd())?;
                    return match EntryKind::from_mode(st.st_mode) {
                        EntryKind::Directory => {
                            self.stack.push(fd);
                            Ok(())
                        }
                        EntryKind::Symlink => {
                            let target = readlink_at(self.current(), &cname)?;
                            self.follow(target)
                        }
                        _ => Err(io::Error::from_raw_os_error(libc::ENOTDIR)),
                    };
                }
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) && !created => {
                    let Some(mode) = create_mode else {
                        return Err(e);
                    };
                    // SAFETY: cname is a single NUL-terminated component.
                    let rc = unsafe {
                        libc::mkdirat(self.current().as_raw_fd(), cname.as_ptr(), mode as libc::mode_t)
                    };
                    if rc == -1 {
                        let err = io::Error::last_os_error();
                        if err.raw_os_error() != Some(libc::EEXIST) {
                            return Err(err);
                        }
                    } else {
                        log::debug!("created directory {:?}", name);
                    }
                    created = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn into_current(mut self) -> io::Result<OwnedFd> {
        match self.stack.pop() {
            Some(fd) => Ok(fd),
            None => self.root.try_clone_to_owned(),
        }
    }
}

/// A directory handle that confines every lookup to the tree below it
#[derive(Debug)]
pub struct ScopedDir {
    fd: OwnedFd,
}

impl ScopedDir {
    /// Open `path` as a scope root (`O_PATH | O_DIRECTORY`)
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_PATH | libc::O_DIRECTORY | libc::O_CLOEXEC)
            .open(path)?;
        Ok(Self {
            fd: OwnedFd::from(file),
        })
    }

    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Metadata of the directory itself
    pub fn stat(&self) -> io::Result<Entry> {
        Entry::new(self.fd.try_clone()?)
    }

    /// Resolve `path` below this scope, following symlinks in scope,
    /// including a symlink in final position.
    pub fn resolve(&self, path: &ScopedPath) -> io::Result<Entry> {
        let mut walker = Walker::new(self.fd.as_fd(), path.components());

        while let Some(name) = walker.pending.pop_front() {
            if !walker.pending.is_empty() || name.as_bytes() == b".." {
                walker.descend(name, None)?;
                continue;
            }

            let cname = to_cstring(&name)?;
            let fd = walker.open_component(&cname)?;
            let entry = Entry::new(fd)?;
            if entry.kind() == EntryKind::Symlink {
                let target = readlink_at(walker.current(), &cname)?;
                walker.follow(target)?;
                continue;
            }
            return Ok(entry);
        }

        // the path ended on a directory reached through `..` or a symlink
        Entry::new(walker.into_current()?)
    }

    /// Resolve the directory that contains the final component of `path`.
    /// With `create_mode`, missing intermediate directories are created one
    /// at a time and entered through the new directory's descriptor.
    pub fn resolve_parent(&self, path: &ScopedPath, create_mode: Option<u32>) -> io::Result<ScopedDir> {
        let mut walker = Walker::new(self.fd.as_fd(), path.parent_components());
        while let Some(name) = walker.pending.pop_front() {
            walker.descend(name, create_mode)?;
        }
        Ok(ScopedDir {
            fd: walker.into_current()?,
        })
    }

    /// `lstat` a single entry of this directory; `None` if it does not exist
    pub fn entry(&self, name: &OsStr) -> io::Result<Option<Entry>> {
        let cname = single_component(name)?;
        match openat_raw(self.fd.as_fd(), &cname, libc::O_PATH | libc::O_NOFOLLOW) {
            Ok(fd) => Entry::new(fd).map(Some),
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a device node or FIFO named `name` in this directory
    pub fn mknod(&self, name: &OsStr, file_type: libc::mode_t, mode: u32, dev: libc::dev_t) -> io::Result<()> {
        let cname = single_component(name)?;
        // SAFETY: cname is a single NUL-terminated component below our descriptor.
        cvt(unsafe {
            libc::mknodat(
                self.fd.as_raw_fd(),
                cname.as_ptr(),
                file_type | (mode as libc::mode_t & 0o7777),
                dev,
            )
        })?;
        Ok(())
    }

    pub fn mkdir(&self, name: &OsStr, mode: u32) -> io::Result<()> {
        let cname = single_component(name)?;
        // SAFETY: cname is a single NUL-terminated component below our descriptor.
        cvt(unsafe { libc::mkdirat(self.fd.as_raw_fd(), cname.as_ptr(), mode as libc::mode_t) })?;
        Ok(())
    }

    /// Create a symlink `name` -> `target`. The target is stored verbatim and
    /// never resolved by this call.
    pub fn symlink(&self, target: &OsStr, name: &OsStr) -> io::Result<()> {
        let cname = single_component(name)?;
        let ctarget = to_cstring(target)?;
        // SAFETY: both strings are NUL-terminated; symlinkat does not follow the target.
        cvt(unsafe { libc::symlinkat(ctarget.as_ptr(), self.fd.as_raw_fd(), cname.as_ptr()) })?;
        Ok(())
    }

    pub fn read_link(&self, name: &OsStr) -> io::Result<OsString> {
        let cname = single_component(name)?;
        readlink_at(self.fd.as_fd(), &cname)
    }

    /// Open a sub-directory of this directory as a new scope
    pub fn open_dir(&self, name: &OsStr) -> io::Result<ScopedDir> {
        let cname = single_component(name)?;
        let fd = openat_raw(
            self.fd.as_fd(),
            &cname,
            libc::O_PATH | libc::O_DIRECTORY | libc::O_NOFOLLOW,
        )?;
        Ok(ScopedDir { fd })
    }

    /// Open a regular file of this directory read-only
    pub fn open_file(&self, name: &OsStr) -> io::Result<File> {
        let cname = single_component(name)?;
        let fd = openat_raw(self.fd.as_fd(), &cname, libc::O_RDONLY)?;
        Ok(File::from(fd))
    }

    /// Like [`ScopedDir::open_file`], with a missing file mapped to `None`
    pub fn open_optional(&self, name: &OsStr) -> io::Result<Option<File>> {
        match self.open_file(name) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Open an entry of this directory with explicit flags (`O_CLOEXEC` is always added)
    pub fn open_with(&self, name: &OsStr, flags: libc::c_int) -> io::Result<File> {
        let cname = single_component(name)?;
        let fd = openat_raw(self.fd.as_fd(), &cname, flags)?;
        Ok(File::from(fd))
    }
}

impl AsFd for ScopedDir {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for ScopedDir {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;

    fn scoped(raw: &str) -> ScopedPath {
        ScopedPath::parse_absolute(raw.as_bytes()).expect("valid path")
    }

    #[test]
    fn test_scoped_path_normalises_components() {
        let path = scoped("//proc/./kcore");
        assert_eq!(path.components(), &[OsString::from("proc"), OsString::from("kcore")]);
        assert_eq!(path.file_name(), OsStr::new("kcore"));
        assert_eq!(path.to_string(), "/proc/kcore");
    }

    #[test]
    fn test_scoped_path_rejects_escapes() {
        assert!(ScopedPath::parse_absolute(b"/dev/../../etc").is_err());
        assert!(ScopedPath::parse_absolute(b"dev/null").is_err());
        assert!(ScopedPath::parse_absolute(b"/").is_err());
        assert!(ScopedPath::parse_absolute(b"/dev/\0null").is_err());
    }

    #[test]
    fn test_resolve_existing_file_and_directory() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("proc/acpi")).unwrap();
        fs::write(root.path().join("proc/kcore"), b"secret").unwrap();

        let dir = ScopedDir::open(root.path()).unwrap();
        assert_eq!(dir.resolve(&scoped("/proc/acpi")).unwrap().kind(), EntryKind::Directory);
        assert_eq!(dir.resolve(&scoped("/proc/kcore")).unwrap().kind(), EntryKind::File);

        let err = dir.resolve(&scoped("/proc/missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_absolute_symlink_stays_inside_scope() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("host-secret"), b"host").unwrap();

        fs::create_dir_all(root.path().join("data")).unwrap();
        fs::write(root.path().join("data/host-secret"), b"container").unwrap();
        // absolute link pointing at the host directory name
        symlink(outside.path(), root.path().join("escape")).unwrap();
        symlink("/data", root.path().join("link")).unwrap();

        let dir = ScopedDir::open(root.path()).unwrap();
        let entry = dir.resolve(&scoped("/link/host-secret")).unwrap();
        let expected = fs::metadata(root.path().join("data/host-secret")).unwrap();
        use std::os::unix::fs::MetadataExt;
        assert_eq!(entry.stat.st_ino, expected.ino());

        // the host path re-rooted under the scope does not exist
        assert!(dir.resolve(&scoped("/escape/host-secret")).is_err());
    }

    #[test]
    fn test_dotdot_in_link_target_is_clamped() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(root.path().join("etc/hostname"), b"inside").unwrap();
        symlink("../../../../etc", root.path().join("up")).unwrap();

        let dir = ScopedDir::open(root.path()).unwrap();
        let entry = dir.resolve(&scoped("/up/hostname")).unwrap();
        assert_eq!(entry.kind(), EntryKind::File);
    }

    #[test]
    fn test_symlink_loop_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        symlink("/b", root.path().join("a")).unwrap();
        symlink("/a", root.path().join("b")).unwrap();

        let dir = ScopedDir::open(root.path()).unwrap();
        let err = dir.resolve(&scoped("/a/x")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ELOOP));
    }

    #[test]
    fn test_resolve_parent_creates_missing_directories() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScopedDir::open(root.path()).unwrap();

        let parent = dir
            .resolve_parent(&scoped("/dev/net/tun"), Some(0o755))
            .unwrap();
        assert!(root.path().join("dev/net").is_dir());
        assert!(parent.entry(OsStr::new("tun")).unwrap().is_none());

        let missing = dir.resolve_parent(&scoped("/a/b/c"), None).unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
        assert!(!root.path().join("a").exists());
    }

    #[test]
    fn test_resolve_parent_through_file_is_not_a_directory() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("dev"), b"").unwrap();
        let dir = ScopedDir::open(root.path()).unwrap();

        let err = dir.resolve_parent(&scoped("/dev/fuse"), Some(0o755)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTDIR));
    }

    #[test]
    fn test_single_component_operations() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScopedDir::open(root.path()).unwrap();

        dir.mkdir(OsStr::new("dev"), 0o755).unwrap();
        let dev = dir.open_dir(OsStr::new("dev")).unwrap();
        dev.symlink(OsStr::new("/proc/self/fd/0"), OsStr::new("stdin")).unwrap();
        assert_eq!(
            dev.read_link(OsStr::new("stdin")).unwrap(),
            OsString::from("/proc/self/fd/0")
        );
        let entry = dev.entry(OsStr::new("stdin")).unwrap().unwrap();
        assert_eq!(entry.kind(), EntryKind::Symlink);

        assert!(dir.mkdir(OsStr::new("a/b"), 0o755).is_err());
        assert!(dir.entry(OsStr::new("..")).is_err());
    }

    #[test]
    fn test_open_optional_file() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("environ"), b"A=b\0").unwrap();
        let dir = ScopedDir::open(root.path()).unwrap();

        assert!(dir.open_optional(OsStr::new("environ")).unwrap().is_some());
        assert!(dir.open_optional(OsStr::new("masked.txt")).unwrap().is_none());
    }
}
