//! Screen backend: the only module that talks to the controlling
//! terminal. Owns raw mode, the alternate screen, mouse capture, and all
//! drawing (tile borders, tile contents, status bar, cursor, flush).

use crate::config;
use crate::layout::Rect;
use crate::statusbar::{BarAlign, StatusBar};
use anyhow::{Context, Result};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableMouseCapture, EnableMouseCapture},
    execute, queue,
    style::{
        Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    },
    terminal::{
        disable_raw_mode, enable_raw_mode, size as terminal_size, Clear, ClearType,
        EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use dvtm::log_debug;
use dvtm::vt::{Style, Vt, VtColor};
use std::io::{self, Stdout, Write};
use unicode_width::UnicodeWidthChar;

pub struct ScreenBackend {
    out: Stdout,
    mouse_active: bool,
    initialized: bool,
}

fn map_color(color: VtColor) -> Color {
    match color {
        VtColor::Default => Color::Reset,
        VtColor::Indexed(i) => Color::AnsiValue(i),
        VtColor::Rgb(r, g, b) => Color::Rgb { r, g, b },
    }
}

impl ScreenBackend {
    pub fn new() -> Self {
        ScreenBackend {
            out: io::stdout(),
            mouse_active: false,
            initialized: false,
        }
    }

    pub fn init(&mut self, mouse: bool) -> Result<()> {
        enable_raw_mode().context("cannot put the terminal into raw mode")?;
        execute!(self.out, EnterAlternateScreen, Hide).context("cannot enter alternate screen")?;
        self.initialized = true;
        self.set_mouse(mouse);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.set_mouse(false);
        let _ = execute!(self.out, LeaveAlternateScreen, Show, ResetColor);
        let _ = disable_raw_mode();
        self.initialized = false;
    }

    pub fn set_mouse(&mut self, enabled: bool) {
        if enabled == self.mouse_active {
            return;
        }
        let res = if enabled {
            execute!(self.out, EnableMouseCapture)
        } else {
            execute!(self.out, DisableMouseCapture)
        };
        if res.is_ok() {
            self.mouse_active = enabled;
        }
    }

    /// Terminal size via the size-query ioctl, falling back to the
    /// backend's own query.
    pub fn size(&self) -> (u16, u16) {
        // SAFETY: TIOCGWINSZ only fills the winsize out-parameter.
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if rc == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
            return (ws.ws_col, ws.ws_row);
        }
        terminal_size().unwrap_or((80, 24))
    }

    pub fn clear_all(&mut self) {
        if let Err(err) = queue!(self.out, ResetColor, Clear(ClearType::All)) {
            log_debug(&format!("clear failed: {err}"));
        }
    }

    pub fn clear_workspace(&mut self, ws: Rect) {
        let blank = " ".repeat(usize::from(ws.w));
        let mut draw = || -> io::Result<()> {
            queue!(self.out, ResetColor)?;
            for row in 0..ws.h {
                queue!(self.out, MoveTo(ws.x, ws.y + row), Print(&blank))?;
            }
            Ok(())
        };
        if let Err(err) = draw() {
            log_debug(&format!("workspace clear failed: {err}"));
        }
    }

    /// One-cell top border with the embedded `[<title><sep>#<order>]` tag.
    pub fn draw_border(&mut self, rect: Rect, title: &str, order: u32, selected: bool) {
        let tag = border_tag(title, order, rect.w);
        let mut draw = || -> io::Result<()> {
            if selected {
                queue!(self.out, SetForegroundColor(config::SELECTED_COLOR))?;
            } else {
                queue!(self.out, ResetColor)?;
            }
            let line = "─".repeat(usize::from(rect.w));
            queue!(self.out, MoveTo(rect.x, rect.y), Print(&line))?;
            if !tag.is_empty() && rect.w > 2 {
                queue!(self.out, MoveTo(rect.x + 2, rect.y), Print(&tag))?;
            }
            queue!(self.out, ResetColor)?;
            Ok(())
        };
        if let Err(err) = draw() {
            log_debug(&format!("border draw failed: {err}"));
        }
    }

    /// Mirror the engine grid into the tile below its border row.
    pub fn draw_content(&mut self, rect: Rect, term: &Vt) {
        let rows = rect.h.saturating_sub(1);
        let grid = term.grid();
        let mut draw = || -> io::Result<()> {
            for row in 0..rows.min(grid.rows) {
                queue!(self.out, MoveTo(rect.x, rect.y + 1 + row))?;
                let cells = grid.visible_row(row);
                let selection = term.selection_span(row);
                let mut run = String::new();
                let mut run_style: Option<Style> = None;
                for (col, cell) in cells.iter().take(usize::from(rect.w)).enumerate() {
                    let mut style = cell.style;
                    if let Some((from, to)) = selection {
                        if (col as u16) >= from && (col as u16) <= to {
                            style.reverse = !style.reverse;
                        }
                    }
                    if run_style != Some(style) {
                        if !run.is_empty() {
                            queue!(self.out, Print(&run))?;
                            run.clear();
                        }
                        self.apply_style(style)?;
                        run_style = Some(style);
                    }
                    run.push(cell.ch);
                }
                if !run.is_empty() {
                    queue!(self.out, Print(&run))?;
                }
                queue!(self.out, ResetColor, SetAttribute(Attribute::Reset))?;
            }
            Ok(())
        };
        if let Err(err) = draw() {
            log_debug(&format!("content draw failed: {err}"));
        }
    }

    fn apply_style(&mut self, style: Style) -> io::Result<()> {
        queue!(
            self.out,
            SetAttribute(Attribute::Reset),
            SetForegroundColor(map_color(style.fg)),
            SetBackgroundColor(map_color(style.bg)),
        )?;
        if style.bold {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        if style.underline {
            queue!(self.out, SetAttribute(Attribute::Underlined))?;
        }
        if style.reverse {
            queue!(self.out, SetAttribute(Attribute::Reverse))?;
        }
        Ok(())
    }

    pub fn draw_bar(&mut self, bar: &StatusBar, screen_w: u16) {
        if !bar.shown() || bar.text.is_empty() {
            return;
        }
        let line = bar_line(&bar.text, bar.align, screen_w);
        let mut draw = || -> io::Result<()> {
            queue!(
                self.out,
                SetForegroundColor(config::BAR_COLOR),
                MoveTo(0, bar.y),
                Print(&line),
                ResetColor,
            )
        };
        if let Err(err) = draw() {
            log_debug(&format!("bar draw failed: {err}"));
        }
    }

    /// Centered message used by the lock screen.
    pub fn print_center(&mut self, screen_w: u16, screen_h: u16, text: &str) {
        let x = (usize::from(screen_w) / 2).saturating_sub(text.len() / 2) as u16;
        let y = screen_h / 2;
        let res = queue!(self.out, ResetColor, MoveTo(x, y), Print(text), Hide)
            .and_then(|()| self.out.flush());
        if let Err(err) = res {
            log_debug(&format!("centered print failed: {err}"));
        }
    }

    /// Outer terminal title (OSC 0).
    pub fn set_term_title(&mut self, title: &str) {
        let _ = execute!(self.out, SetTitle(title));
    }

    pub fn beep(&mut self) {
        let _ = self.out.write_all(b"\x07");
    }

    /// Final flush for the tick; the cursor lands on the focused client.
    pub fn present(&mut self, cursor: Option<(u16, u16)>) {
        let res = match cursor {
            Some((x, y)) => queue!(self.out, MoveTo(x, y), Show),
            None => queue!(self.out, Hide),
        };
        if let Err(err) = res.and_then(|()| self.out.flush()) {
            log_debug(&format!("flush failed: {err}"));
        }
    }
}

/// Compose the border tag, truncating the title so the whole tag fits
/// the tile; the surrounding brackets are always present.
fn border_tag(title: &str, order: u32, tile_w: u16) -> String {
    if tile_w <= 4 {
        return String::new();
    }
    let max_inner = usize::from(tile_w) - 4;
    let suffix = format!("#{order}");
    let sep = if title.is_empty() {
        ""
    } else {
        config::SEPARATOR
    };
    let fixed = sep.len() + suffix.len();
    let mut kept = String::new();
    let mut width = 0usize;
    if fixed <= max_inner {
        let budget = max_inner - fixed;
        for ch in title.chars() {
            let w = ch.width().unwrap_or(0);
            if width + w > budget {
                break;
            }
            width += w;
            kept.push(ch);
        }
        let sep = if kept.is_empty() { "" } else { sep };
        format!("[{kept}{sep}{suffix}]")
    } else {
        format!("[{}]", &suffix[..suffix.len().min(max_inner)])
    }
}

/// The status line: `[` text `]` padded to the full width per alignment.
fn bar_line(text: &str, align: BarAlign, screen_w: u16) -> String {
    if screen_w < 2 {
        return String::new();
    }
    let budget = usize::from(screen_w) - 2;
    let mut kept = String::new();
    let mut width = 0usize;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        kept.push(ch);
    }
    let pad = " ".repeat(budget - width);
    match align {
        BarAlign::Left => format!("[{kept}{pad}]"),
        BarAlign::Right => format!("[{pad}{kept}]"),
    }
}
