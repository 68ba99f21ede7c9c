//! The terminal engine: one `Vt` per client owns the child's PTY, feeds
//! its output through a `vte` parser into an off-screen grid, and offers
//! copy mode, scrollback and a small event stream to the multiplexer.

mod copymode;
mod grid;
mod perform;

pub use grid::{Cell, Grid, Style, VtColor};

use copymode::{CopyMode, CopyModeAction};
use perform::Performer;

use crate::pty::Pty;
use std::io::{self, ErrorKind};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

/// Events surfaced to the multiplexer while processing child output or
/// copy-mode input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtEvent {
    /// The child retitled its window (OSC 0/2).
    Title(String),
    /// The child rang the bell.
    Bell,
    /// Copy mode yanked text; the receiver owns the buffer now.
    CopyText(String),
}

pub struct Vt {
    pty: Pty,
    parser: vte::Parser,
    grid: Grid,
    events: Vec<VtEvent>,
    copymode: Option<CopyMode>,
}

impl Vt {
    /// Create the engine and spawn `cmd` on a fresh PTY sized to a grid
    /// of `rows` x `cols`.
    pub fn spawn(
        cmd: &str,
        cwd: Option<&Path>,
        extra_env: &[(String, String)],
        rows: u16,
        cols: u16,
        history: usize,
    ) -> io::Result<Self> {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let pty = Pty::spawn(cmd, cwd, extra_env, rows, cols)?;
        Ok(Vt {
            pty,
            parser: vte::Parser::new(),
            grid: Grid::new(rows, cols, history),
            events: Vec::new(),
            copymode: None,
        })
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pty.pid()
    }

    pub fn pty_fd(&self) -> RawFd {
        self.pty.as_raw_fd()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Drain whatever the child has written. `Err` with `EIO`-class
    /// errors (or EOF) means the client is gone and should be destroyed.
    pub fn process(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            match self.pty.read(&mut buf) {
                Ok(0) => return Err(io::Error::from_raw_os_error(libc::EIO)),
                Ok(n) => {
                    let mut responses = Vec::new();
                    {
                        let mut performer = Performer {
                            grid: &mut self.grid,
                            events: &mut self.events,
                            responses: &mut responses,
                        };
                        self.parser.advance(&mut performer, &buf[..n]);
                    }
                    if !responses.is_empty() {
                        let _ = self.pty.write_all(&responses);
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Write raw bytes to the child (paste, escape passthrough).
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.grid.reset_view();
        self.pty.write_all(bytes)
    }

    /// Forward one ordinary key to the child.
    pub fn keypress(&mut self, byte: u8) -> io::Result<()> {
        self.write(&[byte])
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.grid.resize(rows, cols);
        self.pty.resize(rows, cols);
    }

    /// Scroll the view; positive moves back into history.
    pub fn scroll(&mut self, delta: i32) {
        self.grid.scroll_view(delta);
    }

    pub fn is_copy_mode(&self) -> bool {
        self.copymode.is_some()
    }

    pub fn copy_mode_enter(&mut self) {
        if self.copymode.is_none() {
            self.copymode = Some(CopyMode::enter(&self.grid));
            self.grid.dirty = true;
        }
    }

    /// Route one key into copy mode. Yanked text is surfaced as a
    /// [`VtEvent::CopyText`] event.
    pub fn copy_mode_keypress(&mut self, byte: u8) {
        let Some(copymode) = self.copymode.as_mut() else {
            return;
        };
        match copymode.keypress(&mut self.grid, byte) {
            CopyModeAction::None => {}
            CopyModeAction::Exit => self.leave_copy_mode(),
            CopyModeAction::Yank(text) => {
                self.events.push(VtEvent::CopyText(text));
                self.leave_copy_mode();
            }
        }
        self.grid.dirty = true;
    }

    fn leave_copy_mode(&mut self) {
        self.copymode = None;
        self.grid.reset_view();
        self.grid.dirty = true;
    }

    pub fn take_events(&mut self) -> Vec<VtEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_dirty(&self) -> bool {
        self.grid.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.grid.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.grid.dirty = true;
    }

    /// Cursor position in visible grid coordinates, or `None` when it
    /// should be hidden (scrolled back, child hid it).
    pub fn cursor(&self) -> Option<(u16, u16)> {
        if let Some(copymode) = &self.copymode {
            return copymode.cursor(&self.grid);
        }
        if self.grid.scroll_offset() != 0 || !self.grid.cursor_visible {
            return None;
        }
        Some((self.grid.cursor_y, self.grid.cursor_x))
    }

    /// Inclusive column span of the copy-mode selection on visible row
    /// `row`, if any.
    pub fn selection_span(&self, row: u16) -> Option<(u16, u16)> {
        let copymode = self.copymode.as_ref()?;
        let abs = self.grid.absolute_index_of_visible(row);
        copymode.selection_on_line(&self.grid, abs)
    }

    pub fn toggle_bell(&mut self) {
        self.grid.bell_enabled = !self.grid.bell_enabled;
    }

    pub fn set_default_style(&mut self, style: Style) {
        self.grid.set_default_style(style);
    }

    /// Whether the child application asked for mouse tracking.
    pub fn wants_mouse(&self) -> bool {
        self.grid.mouse_tracking
    }

    /// Forward a mouse report with tile-relative coordinates, in the
    /// encoding the child negotiated.
    pub fn mouse_report(&mut self, button: u8, pressed: bool, x: u16, y: u16) -> io::Result<()> {
        if self.grid.mouse_sgr {
            let suffix = if pressed { 'M' } else { 'm' };
            let report = format!("\x1b[<{};{};{}{}", button, x + 1, y + 1, suffix);
            self.write(report.as_bytes())
        } else {
            let encode = |v: u16| (32 + v.min(222) + 1) as u8;
            let byte = 32 + if pressed { button } else { 3 };
            self.write(&[0x1b, b'[', b'M', byte, encode(x), encode(y)])
        }
    }
}
