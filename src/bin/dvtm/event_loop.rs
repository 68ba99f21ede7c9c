//! The reactor: one readiness-select over stdin, the inbound FIFOs and
//! every living client PTY, with per-tick dispatch and repaint.

use crate::input;
use crate::mux::Mux;
use crate::signals;
use anyhow::{bail, Result};
use dvtm::log_debug;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;

const READABLE: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

pub fn run(mux: &mut Mux) -> Result<()> {
    while signals::is_running() {
        if signals::take_sigwinch() {
            mux.resize_screen();
        }

        // Deferred effects of SIGCHLD: mark first, destroy before the
        // descriptor set is built so no freed client is polled.
        mux.reap_and_mark();
        mux.destroy_dead();
        if !signals::is_running() {
            break;
        }

        let mut fds = vec![pollfd(libc::STDIN_FILENO)];
        let cmd_slot = mux.cmdfifo.as_ref().and_then(|f| f.raw_fd()).map(|fd| {
            fds.push(pollfd(fd));
            fds.len() - 1
        });
        let bar_slot = mux.bar.fifo.as_ref().and_then(|f| f.raw_fd()).map(|fd| {
            fds.push(pollfd(fd));
            fds.len() - 1
        });
        let client_base = fds.len();
        let client_ids = mux.clients.indices();
        for &idx in &client_ids {
            fds.push(pollfd(mux.clients.get(idx).pty_fd()));
        }

        // SAFETY: fds stays alive and correctly sized for the call.
        let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if r < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                continue;
            }
            bail!("poll failed: {err}");
        }

        let ready = |slot: usize| fds[slot].revents & READABLE != 0;

        if ready(0) {
            input::handle_stdin(mux);
            if r == 1 {
                // Nothing else woke up; skip the drain and repaint.
                continue;
            }
        }

        if cmd_slot.is_some_and(&ready) {
            mux.handle_cmdfifo();
        }
        if bar_slot.is_some_and(&ready) {
            mux.handle_statusbar();
        }

        let mut dead = Vec::new();
        for (offset, &idx) in client_ids.iter().enumerate() {
            if !ready(client_base + offset) {
                continue;
            }
            // Commands this tick may have destroyed or replaced the
            // client behind this descriptor.
            if !mux.clients.contains(idx) {
                continue;
            }
            if mux.clients.get(idx).term.is_copy_mode() {
                continue;
            }
            match mux.clients.get_mut(idx).term.process() {
                Ok(()) => mux.drain_client_events(idx),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => {
                    log_debug(&format!("client pty error, destroying: {err}"));
                    dead.push(idx);
                }
            }
        }
        for idx in dead {
            if mux.clients.contains(idx) {
                mux.destroy(idx);
            }
        }

        // Repaint: changed background clients first, the selected one
        // last so the cursor ends up correct, then a single flush.
        let fullscreen = mux.is_fullscreen();
        for idx in mux.clients.indices() {
            if mux.sel == Some(idx) {
                continue;
            }
            let client = mux.clients.get(idx);
            if client.term.is_dirty() && !client.minimized && !fullscreen {
                mux.draw_client(idx);
            }
        }
        if let Some(sel) = mux.sel {
            if mux.clients.contains(sel) && mux.clients.get(sel).term.is_dirty() {
                mux.draw_client(sel);
            }
        }
        mux.present_cursor();
    }
    Ok(())
}
