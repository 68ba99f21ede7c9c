//! The input dispatch state machine: modifier-then-key recognition,
//! escape passthrough with a bounded greedy drain, copy-mode routing,
//! mouse report interception, and event-FIFO redirection.

use crate::mouse::{self, MouseReport};
use crate::mux::Mux;
use bitflags::bitflags;
use dvtm::escape::escape_bytes;
use dvtm::log_debug;
use dvtm::pty::set_nonblocking;
use std::io::{self, ErrorKind};

bitflags! {
    /// Which input classes are diverted to the event FIFO.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct InputMode: u8 {
        const INPUT   = 0b001;
        const ESCAPE  = 0b010;
        const BINDING = 0b100;
    }
}

/// `inputmode` command spec: any mix of the chars `i`, `e`, `b`.
pub fn parse_inputmode(spec: &str) -> InputMode {
    let mut mode = InputMode::empty();
    for ch in spec.chars() {
        match ch {
            'i' => mode |= InputMode::INPUT,
            'e' => mode |= InputMode::ESCAPE,
            'b' => mode |= InputMode::BINDING,
            _ => {}
        }
    }
    mode
}

/// Bytes the greedy post-ESC drain collects before giving up; enough
/// for alt-chords and short CSI sequences without splitting them.
const ESC_DRAIN_BUDGET: usize = 7;
/// Hard cap while completing a recognized mouse report.
const MOUSE_DRAIN_CAP: usize = 32;

/// Blocking single-byte read from stdin, retrying on `EINTR`.
pub fn read_byte_blocking() -> Option<u8> {
    let mut byte = 0u8;
    loop {
        // SAFETY: reading one byte into a stack buffer from fd 0.
        let n = unsafe { libc::read(libc::STDIN_FILENO, (&mut byte as *mut u8).cast(), 1) };
        if n == 1 {
            return Some(byte);
        }
        if n == 0 {
            return None;
        }
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return None;
        }
    }
}

fn poll_stdin(timeout_ms: u64) -> bool {
    let mut fds = [libc::pollfd {
        fd: libc::STDIN_FILENO,
        events: libc::POLLIN,
        revents: 0,
    }];
    // SAFETY: fds is a live array of one descriptor.
    let r = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout_ms.min(i32::MAX as u64) as i32) };
    r > 0 && fds[0].revents & libc::POLLIN != 0
}

/// Collect the bytes following an ESC. Waits up to `escdelay` for the
/// first one (distinguishing a lone ESC press from a sequence), then
/// drains the rest with zero-wait non-blocking reads. A recognized SGR
/// mouse prefix may exceed the normal budget to finish its trailer.
fn drain_escape(escdelay: u64) -> Vec<u8> {
    let mut block = Vec::new();
    if !poll_stdin(escdelay) {
        return block;
    }
    if set_nonblocking(libc::STDIN_FILENO, true).is_err() {
        return block;
    }
    loop {
        let cap = if mouse::is_sgr_prefix(&block) {
            MOUSE_DRAIN_CAP
        } else {
            ESC_DRAIN_BUDGET
        };
        if block.len() >= cap {
            break;
        }
        let mut byte = 0u8;
        // SAFETY: non-blocking single-byte read from fd 0.
        let n = unsafe { libc::read(libc::STDIN_FILENO, (&mut byte as *mut u8).cast(), 1) };
        if n == 1 {
            block.push(byte);
            if mouse::is_sgr_complete(&block) {
                break;
            }
            continue;
        }
        if n < 0 && io::Error::last_os_error().kind() == ErrorKind::Interrupted {
            continue;
        }
        // EOF or nothing pending; for an unfinished mouse trailer give
        // the terminal one more zero-ish wait.
        if mouse::is_sgr_prefix(&block) && !mouse::is_sgr_complete(&block) && poll_stdin(1) {
            continue;
        }
        break;
    }
    let _ = set_nonblocking(libc::STDIN_FILENO, false);
    block
}

/// Forward ordinary input to the focused client (or to every visible
/// client under runinall), honoring the event-FIFO redirections.
pub fn keypress(mux: &mut Mux, block: &[u8]) {
    if block.is_empty() {
        return;
    }
    let is_escape = block[0] == 0x1b;
    let piped = if is_escape {
        mux.inputmode.contains(InputMode::ESCAPE)
    } else {
        mux.inputmode.contains(InputMode::INPUT)
    };
    if piped {
        if let Some(evtfifo) = mux.evtfifo.as_mut() {
            if evtfifo.is_open() {
                let mut line = vec![if is_escape { b'E' } else { b'K' }];
                line.extend_from_slice(&escape_bytes(block));
                line.push(b'\n');
                evtfifo.write_line(&line);
                return;
            }
        }
    }
    let fullscreen = mux.is_fullscreen();
    let targets: Vec<usize> = if mux.runinall {
        mux.clients.indices()
    } else {
        mux.sel.into_iter().collect()
    };
    for idx in targets {
        let client = mux.clients.get_mut(idx);
        if !client.minimized || fullscreen {
            if let Err(err) = client.term.write(block) {
                log_debug(&format!("client write failed: {err}"));
            }
        }
    }
}

/// One stdin wakeup: read a key and run it through the dispatch table.
pub fn handle_stdin(mux: &mut Mux) {
    let Some(code) = read_byte_blocking() else {
        return;
    };
    if code == 0x1b {
        handle_escape(mux);
        return;
    }
    dispatch_key(mux, code);
}

fn dispatch_key(mux: &mut Mux, code: u8) {
    let bindings_live = !mux.inputmode.contains(InputMode::BINDING);
    if bindings_live && mux.is_modifier(code) {
        let Some(second) = read_byte_blocking() else {
            return;
        };
        if second == code {
            // Literal modifier: pass it through once.
            keypress(mux, &[code]);
        } else if let Some(action) = mux.lookup_binding(code, second) {
            action.invoke(mux);
        }
        return;
    }
    if bindings_live {
        if let Some(action) = mux.lookup_binding(0, code) {
            action.invoke(mux);
            return;
        }
    }
    if let Some(sel) = mux.sel {
        if mux.clients.get(sel).term.is_copy_mode() {
            mux.clients.get_mut(sel).term.copy_mode_keypress(code);
            mux.drain_client_events(sel);
            mux.draw_client(sel);
            return;
        }
    }
    keypress(mux, &[code]);
}

fn handle_escape(mux: &mut Mux) {
    let block = drain_escape(mux.escdelay);
    if mouse::is_sgr_complete(&block) {
        if let Some(report) = mouse::parse_sgr(&block) {
            handle_mouse(mux, report);
            return;
        }
    }
    let bindings_live = !mux.inputmode.contains(InputMode::BINDING);
    if block.is_empty() {
        // A lone ESC behaves like any other key.
        dispatch_key(mux, 0x1b);
        return;
    }
    if block.len() == 1 && bindings_live && mux.is_modifier(0x1b) {
        let code = block[0];
        if code == 0x1b {
            keypress(mux, &[0x1b]);
        } else if let Some(action) = mux.lookup_binding(0x1b, code) {
            action.invoke(mux);
        }
        return;
    }
    let mut full = Vec::with_capacity(block.len() + 1);
    full.push(0x1b);
    full.extend_from_slice(&block);
    keypress(mux, &full);
}

/// The curses `KEY_MOUSE` path: focus-by-coordinate plus the configured
/// button bindings, with raw reports relayed to tracking clients.
pub fn handle_mouse(mux: &mut Mux, report: MouseReport) {
    if !mux.mouse_enabled {
        return;
    }
    let msel = if mux.is_fullscreen() {
        if mux.workspace.contains(report.x, report.y) {
            mux.sel
        } else {
            None
        }
    } else {
        mux.clients.by_coord(report.x, report.y)
    };
    let Some(msel) = msel else {
        return;
    };
    {
        let client = mux.clients.get_mut(msel);
        if client.term.wants_mouse() && report.y > client.rect.y {
            let rel_x = report.x - client.rect.x;
            let rel_y = report.y - client.rect.y - 1;
            let _ = client
                .term
                .mouse_report(report.code, report.pressed, rel_x, rel_y);
        }
    }
    mux.msel = Some(msel);
    let mask = mux.clicks.classify(&report);
    if !mask.is_empty() {
        for button in crate::config::BUTTONS {
            if button.mask.intersects(mask) {
                button.action.invoke(mux);
            }
        }
    }
    mux.msel = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputmode_spec_parses_any_combination() {
        assert_eq!(parse_inputmode(""), InputMode::empty());
        assert_eq!(parse_inputmode("i"), InputMode::INPUT);
        assert_eq!(
            parse_inputmode("ie"),
            InputMode::INPUT | InputMode::ESCAPE
        );
        assert_eq!(
            parse_inputmode("bei"),
            InputMode::INPUT | InputMode::ESCAPE | InputMode::BINDING
        );
        assert_eq!(parse_inputmode("xyz"), InputMode::empty());
    }
}
