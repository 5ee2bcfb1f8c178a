/// Inherited file descriptor closing
///
/// Everything the engine leaked into PID 1 is closed before the workload
/// can see it, except stdio and the descriptors the init still needs.
/// - Prefer close_range over the gaps between kept descriptors
/// - Fallback to iterating /proc/self/fd on kernels without close_range
use crate::config::types::{BootError, Result, Stage};
use nix::errno::Errno;
use nix::unistd::close;
use std::fs;
use std::os::fd::RawFd;

const FD_DIR: &str = "/proc/self/fd";

/// Inclusive descriptor ranges to close so that only stdio and `keep` survive
pub fn close_plan(keep: &[RawFd]) -> Vec<(u32, u32)> {
    let mut kept: Vec<u32> = keep
        .iter()
        .filter(|fd| **fd > 2)
        .map(|fd| *fd as u32)
        .collect();
    kept.sort_unstable();
    kept.dedup();

    let mut ranges = Vec::with_capacity(kept.len() + 1);
    let mut next = 3u32;
    for fd in kept {
        if fd > next {
            ranges.push((next, fd - 1));
        }
        next = fd + 1;
    }
    ranges.push((next, u32::MAX));
    ranges
}

fn close_range(first: u32, last: u32) -> std::result::Result<(), Errno> {
    // SAFETY: close_range only closes descriptors; no memory is passed.
    let rc = unsafe { libc::syscall(libc::SYS_close_range, first, last, 0 as libc::c_uint) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Errno::last())
    }
}

/// Close every descriptor above stderr that is not listed in `keep`
pub fn close_inherited_fds(keep: &[RawFd]) -> Result<()> {
    let plan = close_plan(keep);
    for (first, last) in &plan {
        match close_range(*first, *last) {
            Ok(()) => {}
            Err(Errno::ENOSYS) | Err(Errno::EINVAL) if *first == plan[0].0 => {
                log::debug!("close_range unavailable, falling back to {}", FD_DIR);
                return close_fds_via_proc(keep);
            }
            Err(e) => {
                return Err(BootError::io(
                    Stage::Fds,
                    format!("close_range({}, {}) failed", first, last),
                    e.into(),
                ))
            }
        }
    }
    log::debug!("closed inherited descriptors, kept {:?}", keep);
    Ok(())
}

/// Close descriptors by iterating /proc/self/fd
fn close_fds_via_proc(keep: &[RawFd]) -> Result<()> {
    // collect first: the directory stream holds a descriptor of its own
    let fds = get_open_fds()?;

    let mut closed_count = 0;
    for fd in fds {
        if fd <= 2 || keep.contains(&fd) {
            continue;
        }
        match close(fd) {
            Ok(()) => closed_count += 1,
            // the read_dir descriptor is already gone
            Err(Errno::EBADF) => {}
            Err(e) => {
                return Err(BootError::io(
                    Stage::Fds,
                    format!("failed to close fd {}", fd),
                    e.into(),
                ))
            }
        }
    }

    log::debug!("closed {} inherited descriptors via {}", closed_count, FD_DIR);
    Ok(())
}

/// Sorted list of currently open descriptors
pub fn get_open_fds() -> Result<Vec<RawFd>> {
    let entries = fs::read_dir(FD_DIR)
        .map_err(|e| BootError::io(Stage::Fds, format!("failed to read {}", FD_DIR), e))?;

    let mut fds: Vec<RawFd> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    fds.sort_unstable();
    Ok(fds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::{fcntl, FcntlArg};
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use std::os::fd::{AsRawFd, IntoRawFd};

    #[test]
    fn test_get_open_fds() {
        let fds = get_open_fds().unwrap();
        assert!(fds.contains(&0));
        assert!(fds.contains(&1));
        assert!(fds.contains(&2));
    }

    #[test]
    fn test_close_plan_skips_kept_descriptors() {
        assert_eq!(close_plan(&[]), vec![(3, u32::MAX)]);
        assert_eq!(close_plan(&[1, 2]), vec![(3, u32::MAX)]);
        assert_eq!(
            close_plan(&[7, 4, 7]),
            vec![(3, 3), (5, 6), (8, u32::MAX)]
        );
        assert_eq!(close_plan(&[3, 4]), vec![(5, u32::MAX)]);
    }

    /// Run `closer` in a forked child and check that only `kept` survives
    fn assert_closes_in_child(closer: fn(&[RawFd]) -> Result<()>) {
        let leaked = tempfile::tempfile().unwrap().into_raw_fd();
        let kept = tempfile::tempfile().unwrap();
        let kept_fd = kept.as_raw_fd();

        // closing descriptors of the test harness itself is not an option
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let status = match closer(&[kept_fd]) {
                    Ok(()) => {
                        let leaked_closed = fcntl(leaked, FcntlArg::F_GETFD) == Err(Errno::EBADF);
                        let kept_open = fcntl(kept_fd, FcntlArg::F_GETFD).is_ok();
                        if leaked_closed && kept_open {
                            0
                        } else {
                            1
                        }
                    }
                    Err(_) => 2,
                };
                unsafe { libc::_exit(status) };
            }
            ForkResult::Parent { child } => {
                let status = waitpid(child, None).unwrap();
                assert_eq!(status, WaitStatus::Exited(child, 0));
                let _ = close(leaked);
            }
        }
    }

    #[test]
    fn test_close_inherited_fds_in_child() {
        assert_closes_in_child(close_inherited_fds);
    }

    #[test]
    fn test_close_via_proc_in_child() {
        assert_closes_in_child(close_fds_via_proc);
    }
}
