//! Copy mode: keyboard-driven navigation and selection over the grid
//! plus its scrollback, with vi-like movement and search.

use super::grid::Grid;

pub(super) enum CopyModeAction {
    None,
    Exit,
    Yank(String),
}

struct SearchPrompt {
    forward: bool,
    buf: String,
}

pub(super) struct CopyMode {
    cur_line: usize,
    cur_col: u16,
    anchor: Option<(usize, u16)>,
    prompt: Option<SearchPrompt>,
    last_search: Option<(bool, String)>,
}

impl CopyMode {
    pub(super) fn enter(grid: &Grid) -> Self {
        CopyMode {
            cur_line: grid.absolute_index_of_visible(grid.cursor_y),
            cur_col: grid.cursor_x.min(grid.cols - 1),
            anchor: None,
            prompt: None,
            last_search: None,
        }
    }

    pub(super) fn cursor(&self, grid: &Grid) -> Option<(u16, u16)> {
        let base = grid.total_lines() - grid.rows as usize - grid.scroll_offset();
        let row = self.cur_line.checked_sub(base)?;
        if row >= grid.rows as usize {
            return None;
        }
        Some((row as u16, self.cur_col))
    }

    /// Inclusive column span of the selection on an absolute line, for
    /// the reverse-video overlay.
    pub(super) fn selection_on_line(&self, grid: &Grid, abs: usize) -> Option<(u16, u16)> {
        let (a_line, a_col) = self.anchor?;
        let (start, end) = order((a_line, a_col), (self.cur_line, self.cur_col));
        if abs < start.0 || abs > end.0 {
            return None;
        }
        let from = if abs == start.0 { start.1 } else { 0 };
        let to = if abs == end.0 { end.1 } else { grid.cols - 1 };
        Some((from, to))
    }

    pub(super) fn keypress(&mut self, grid: &mut Grid, byte: u8) -> CopyModeAction {
        if self.prompt.is_some() {
            match byte {
                b'\r' | b'\n' => {
                    if let Some(prompt) = self.prompt.take() {
                        if !prompt.buf.is_empty() {
                            self.last_search = Some((prompt.forward, prompt.buf.clone()));
                            self.search(grid, prompt.forward, &prompt.buf);
                        }
                    }
                }
                0x1b => self.prompt = None,
                0x7f | 0x08 => {
                    if let Some(prompt) = self.prompt.as_mut() {
                        prompt.buf.pop();
                    }
                }
                b if b >= b' ' => {
                    if let Some(prompt) = self.prompt.as_mut() {
                        prompt.buf.push(b as char);
                    }
                }
                _ => {}
            }
            return CopyModeAction::None;
        }

        let half_page = (grid.rows / 2).max(1) as i64;
        match byte {
            b'q' | 0x1b => return CopyModeAction::Exit,
            b'h' => self.cur_col = self.cur_col.saturating_sub(1),
            b'l' => self.cur_col = (self.cur_col + 1).min(grid.cols - 1),
            b'j' => self.move_line(grid, 1),
            b'k' => self.move_line(grid, -1),
            b'0' => self.cur_col = 0,
            b'$' => self.cur_col = line_end(grid, self.cur_line),
            b'g' => {
                self.cur_line = 0;
                self.cur_col = 0;
            }
            b'G' => {
                self.cur_line = grid.total_lines() - 1;
                self.cur_col = 0;
            }
            0x15 => self.move_line(grid, -half_page), // ^U
            0x04 => self.move_line(grid, half_page),  // ^D
            b'v' => {
                self.anchor = match self.anchor {
                    Some(_) => None,
                    None => Some((self.cur_line, self.cur_col)),
                };
            }
            b'y' => {
                if let Some(text) = self.yank(grid) {
                    return CopyModeAction::Yank(text);
                }
            }
            b'/' => {
                self.prompt = Some(SearchPrompt {
                    forward: true,
                    buf: String::new(),
                });
            }
            b'?' => {
                self.prompt = Some(SearchPrompt {
                    forward: false,
                    buf: String::new(),
                });
            }
            b'n' => {
                if let Some((forward, query)) = self.last_search.clone() {
                    self.search(grid, forward, &query);
                }
            }
            b'N' => {
                if let Some((forward, query)) = self.last_search.clone() {
                    self.search(grid, !forward, &query);
                }
            }
            _ => {}
        }
        self.scroll_into_view(grid);
        CopyModeAction::None
    }

    fn move_line(&mut self, grid: &Grid, delta: i64) {
        let max = grid.total_lines() as i64 - 1;
        self.cur_line = (self.cur_line as i64 + delta).clamp(0, max) as usize;
    }

    fn scroll_into_view(&self, grid: &mut Grid) {
        let total = grid.total_lines();
        let rows = grid.rows as usize;
        let base = total - rows - grid.scroll_offset();
        if self.cur_line < base {
            grid.set_view_offset(total - rows - self.cur_line);
        } else if self.cur_line >= base + rows {
            grid.set_view_offset(total - self.cur_line - 1);
        }
    }

    fn yank(&self, grid: &Grid) -> Option<String> {
        let (a_line, a_col) = self.anchor?;
        let (start, end) = order((a_line, a_col), (self.cur_line, self.cur_col));
        let mut out = String::new();
        for line in start.0..=end.0 {
            let mut chars: Vec<char> = grid.absolute_line(line).iter().map(|c| c.ch).collect();
            while chars.last() == Some(&' ') {
                chars.pop();
            }
            let from = if line == start.0 { start.1 as usize } else { 0 };
            let to = if line == end.0 {
                (end.1 as usize + 1).min(chars.len())
            } else {
                chars.len()
            };
            if from < to {
                out.extend(&chars[from..to]);
            }
            if line != end.0 {
                out.push('\n');
            }
        }
        Some(out)
    }

    fn search(&mut self, grid: &mut Grid, forward: bool, query: &str) {
        let total = grid.total_lines();
        let range: Box<dyn Iterator<Item = usize>> = if forward {
            Box::new((self.cur_line + 1..total).chain(0..=self.cur_line))
        } else {
            Box::new((0..self.cur_line).rev().chain((self.cur_line..total).rev()))
        };
        for line in range {
            let text = grid.line_text(line);
            if let Some(pos) = text.find(query) {
                self.cur_line = line;
                self.cur_col = text[..pos].chars().count() as u16;
                break;
            }
        }
        self.scroll_into_view(grid);
    }
}

fn line_end(grid: &Grid, line: usize) -> u16 {
    let len = grid.line_text(line).chars().count();
    len.saturating_sub(1) as u16
}

fn order(a: (usize, u16), b: (usize, u16)) -> ((usize, u16), (usize, u16)) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
