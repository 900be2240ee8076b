//! Spawns one supervised test driver: pipes, process group, PTY, exec.

use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::resource::{getrlimit, Resource};
use nix::unistd::{setpgid, Group, Pid, Uid};
use ptest_core::{PtestError, Test};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tracing::warn;

/// A spawned child together with the read ends of its output pipes.
pub struct LaunchedChild {
    pub child: Child,
    pub stdout_rx: pipe::Receiver,
    pub stderr_rx: pipe::Receiver,
}

/// Spawn `test`'s driver as a supervised child.
///
/// Follows the launch sequence in order: stdin closed, PTY allocated and
/// best-effort chowned, child joins `supervisor_pgid`, `setsid` + PTY
/// acquired as controlling terminal, stdout and stderr merged onto one
/// pipe, fds >= 3 closed, `chdir` into the driver's directory, then exec.
/// Only the spawn syscall itself is fatal; every earlier step degrades to
/// a diagnostic written straight into the stdout pipe.
pub fn spawn_child(test: &Test, supervisor_pgid: Pid) -> Result<LaunchedChild, PtestError> {
    let (stdout_tx, stdout_rx) = pipe::pipe()?;
    let (stderr_tx, stderr_rx) = pipe::pipe()?;

    let stdout_w = stdout_tx.as_raw_fd();
    let stderr_w = stderr_tx.as_raw_fd();

    let pty = openpty(
        Some(&Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }),
        None,
    );
    let slave_fd: Option<RawFd> = pty.as_ref().ok().map(|p| p.slave.as_raw_fd());

    let work_dir = test
        .run_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let mut cmd = Command::new(&test.run_path);
    cmd.current_dir(&work_dir);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    let pgid_raw = supervisor_pgid.as_raw();

    // SAFETY: this closure runs in the forked child, after stdio setup and
    // before exec, while the process is still single-threaded. Every call
    // is async-signal-safe: raw libc syscalls only, no allocation. A failed
    // step writes a one-line diagnostic straight into the stdout pipe with
    // `write(2)` (signal-safe) rather than through a buffered `Write`, and
    // is otherwise ignored -- per spec, only the spawn call itself is
    // allowed to fail the test.
    unsafe {
        cmd.pre_exec(move || {
            libc::close(0);

            match slave_fd {
                Some(slave) if libc::dup2(slave, 0) != -1 => {}
                _ => diag(stdout_w, b"ERROR: could not setup pty.\n"),
            }

            if libc::setpgid(0, pgid_raw) == -1 {
                diag(stdout_w, b"ERROR: setpgid() failed.\n");
            }
            if libc::setsid() == -1 {
                diag(stdout_w, b"ERROR: setsid() failed.\n");
            }
            if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                diag(stdout_w, b"ERROR: Unable to attach to controlling tty.\n");
            }

            libc::dup2(stdout_w, 1);
            libc::dup2(stdout_w, 2);
            libc::close(stderr_w);

            // tokio opens the pipe's write end with O_NONBLOCK, a flag
            // dup2() carries over onto fd 1/2. Clear it so a driver that
            // bursts past the pipe buffer blocks instead of losing output
            // to EAGAIN.
            clear_nonblock(1);

            close_fds_from(3);

            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| PtestError::ChildSpawnFailure(test.name.clone(), e.to_string()))?;

    // Defensive: close the race with the child's own setpgid(0, pgid) call.
    if let Some(pid) = child.id() {
        let _ = setpgid(Pid::from_raw(pid as i32), supervisor_pgid);
    }

    if let Ok(ref pty) = pty {
        if let Err(e) = chown_slave(pty) {
            warn!(error = %e, "failed to chown PTY slave (best-effort, ignored)");
        }
    } else if let Err(e) = &pty {
        warn!(error = %e, "openpty() failed; driver runs without a controlling terminal");
    }

    // Parent no longer needs the write ends; the child holds dup'd copies.
    drop(stdout_tx);
    drop(stderr_tx);

    Ok(LaunchedChild {
        child,
        stdout_rx,
        stderr_rx,
    })
}

unsafe fn diag(fd: RawFd, msg: &[u8]) {
    if fd >= 0 {
        libc::write(fd, msg.as_ptr() as *const libc::c_void, msg.len());
    }
}

/// Clear `O_NONBLOCK` on `fd`. `fcntl(F_GETFL/F_SETFL)` is async-signal-safe,
/// so this is safe to call from `pre_exec`. `fd` and its dup2() siblings
/// share one open file description, so clearing the flag once is enough.
unsafe fn clear_nonblock(fd: RawFd) {
    let flags = libc::fcntl(fd, libc::F_GETFL);
    if flags != -1 {
        libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK);
    }
}

fn close_fds_from(start: RawFd) {
    let limit = getrlimit(Resource::RLIMIT_NOFILE)
        .map(|(soft, _)| soft)
        .unwrap_or(1024);
    for fd in start..(limit as RawFd) {
        unsafe {
            libc::close(fd);
        }
    }
}

fn chown_slave(pty: &OpenptyResult) -> nix::Result<()> {
    use nix::sys::stat::fchmod;
    use nix::sys::stat::Mode;
    use nix::unistd::fchown;

    let uid = Uid::current();
    let gid = Group::from_name("tty").ok().flatten().map(|g| g.gid);
    let slave_fd = pty.slave.as_raw_fd();

    fchown(slave_fd, Some(uid), gid)?;
    fchmod(slave_fd, Mode::S_IRUSR | Mode::S_IWUSR)?;
    Ok(())
}
