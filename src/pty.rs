//! PTY allocation and child process plumbing for one client.
//!
//! Each client runs `/bin/sh -c <cmd>` on the user side of a fresh PTY
//! pair, in its own session with the PTY as controlling terminal. The
//! master side is kept non-blocking; the event loop drains it on
//! readiness and the dispatcher writes keystrokes into it.

use crate::log_debug;
use rustix::termios::{self, Winsize};
use rustix_openpty::openpty;
use std::io::{self, ErrorKind};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

pub struct Pty {
    master: OwnedFd,
    pid: libc::pid_t,
}

/// Toggle `O_NONBLOCK` on an arbitrary descriptor. Used on the PTY master
/// (permanently) and on stdin (briefly, for the escape drain).
pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    // SAFETY: fcntl on a live fd; flags round-trip through the kernel.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl Pty {
    /// Allocate a PTY pair and spawn `/bin/sh -c cmd` on the user side.
    ///
    /// `extra_env` is appended to the inherited environment; `cwd` sets
    /// the child's working directory when given.
    pub fn spawn(
        cmd: &str,
        cwd: Option<&Path>,
        extra_env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> io::Result<Self> {
        let pair = openpty(None, None).map_err(io::Error::from)?;
        let master = pair.controller;
        let user = pair.user;

        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let _ = termios::tcsetwinsize(master.as_fd(), winsize);

        let user_raw = user.as_raw_fd();
        let master_raw = master.as_raw_fd();

        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(cmd).env("TERM", "xterm-256color");
        for (key, value) in extra_env {
            command.env(key, value);
        }
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        // The child gets the user side of the PTY as stdio and makes it
        // its controlling terminal. pre_exec runs after fork, before
        // exec, the only place setsid + TIOCSCTTY can happen.
        let child = unsafe {
            command
                .stdin(Stdio::from_raw_fd(libc::dup(user_raw)))
                .stdout(Stdio::from_raw_fd(libc::dup(user_raw)))
                .stderr(Stdio::from_raw_fd(libc::dup(user_raw)))
                .pre_exec(move || {
                    if libc::setsid() == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if libc::ioctl(0, libc::TIOCSCTTY as libc::c_ulong, 0) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    libc::close(user_raw);
                    libc::close(master_raw);

                    libc::signal(libc::SIGCHLD, libc::SIG_DFL);
                    libc::signal(libc::SIGHUP, libc::SIG_DFL);
                    libc::signal(libc::SIGINT, libc::SIG_DFL);
                    libc::signal(libc::SIGQUIT, libc::SIG_DFL);
                    libc::signal(libc::SIGTERM, libc::SIG_DFL);
                    Ok(())
                })
                .spawn()?
        };
        let pid = child.id() as libc::pid_t;
        drop(child);
        drop(user);

        set_nonblocking(master.as_raw_fd(), true)?;
        log_debug(&format!("client with pid {pid} forked"));

        Ok(Pty { master, pid })
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Read available bytes from the master. `Ok(0)` means the peer is
    /// gone (EOF); `WouldBlock` means nothing pending.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: master is a valid fd owned by self, buf is writable.
        let n = unsafe {
            libc::read(
                self.master.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    /// Write the whole buffer to the master, retrying short writes and
    /// briefly backing off on `EAGAIN`.
    pub fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            // SAFETY: master is a valid fd owned by self, data is a live slice.
            let written = unsafe {
                libc::write(
                    self.master.as_raw_fd(),
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                )
            };
            if written < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted || err.kind() == ErrorKind::WouldBlock {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
                return Err(err);
            }
            if written == 0 {
                return Err(io::Error::new(ErrorKind::WriteZero, "PTY write returned 0"));
            }
            data = &data[written as usize..];
        }
        Ok(())
    }

    pub fn resize(&self, rows: u16, cols: u16) {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let _ = termios::tcsetwinsize(self.master.as_fd(), winsize);
    }
}

impl AsRawFd for Pty {
    fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

/// Deliver `signal` to a client's process group, with a plain-pid
/// fallback for children that died before `setsid()` took effect.
///
/// A target that already exited counts as delivered; `killclient` fires
/// and forgets, so only real delivery failures surface.
pub fn kill_process_group(pid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pid <= 0 {
        return Ok(());
    }
    // SAFETY: kill(2) takes any pid/signal pair and reports through errno.
    let delivered = unsafe { libc::kill(-pid, signal) == 0 || libc::kill(pid, signal) == 0 };
    if delivered {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_read_child_output() {
        let pty = Pty::spawn("printf ok", None, &[], 24, 80).expect("spawn pty");
        assert!(pty.pid() > 0);
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        for _ in 0..200 {
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => seen.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
            if seen.windows(2).any(|w| w == b"ok") {
                break;
            }
        }
        assert!(
            seen.windows(2).any(|w| w == b"ok"),
            "child output not observed: {seen:?}"
        );
    }

    #[test]
    fn write_reaches_child() {
        let pty = Pty::spawn("cat", None, &[], 24, 80).expect("spawn pty");
        pty.write_all(b"hello\n").expect("write to pty");
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        for _ in 0..200 {
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => seen.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
            if seen.windows(5).any(|w| w == b"hello") {
                break;
            }
        }
        assert!(seen.windows(5).any(|w| w == b"hello"));
        let _ = kill_process_group(pty.pid(), libc::SIGKILL);
    }

    #[test]
    fn kill_process_group_tolerates_missing_targets() {
        assert!(kill_process_group(0, libc::SIGKILL).is_ok());
        assert!(kill_process_group(-5, libc::SIGKILL).is_ok());
        let pty = Pty::spawn("sleep 30", None, &[], 24, 80).expect("spawn pty");
        assert!(kill_process_group(pty.pid(), libc::SIGKILL).is_ok());
        // Signaling again after the child is gone still counts as
        // delivered.
        thread::sleep(Duration::from_millis(50));
        assert!(kill_process_group(pty.pid(), libc::SIGKILL).is_ok());
    }

    #[test]
    fn extra_env_is_exported() {
        let pty = Pty::spawn(
            "printf \"%s\" \"$DVTM_WINDOW_ID\"",
            None,
            &[("DVTM_WINDOW_ID".into(), "42".into())],
            24,
            80,
        )
        .expect("spawn pty");
        let mut seen = Vec::new();
        let mut buf = [0u8; 64];
        for _ in 0..200 {
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => seen.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
            if seen.windows(2).any(|w| w == b"42") {
                break;
            }
        }
        assert!(seen.windows(2).any(|w| w == b"42"));
    }
}
