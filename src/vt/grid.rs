//! Off-screen cell grid with scrollback; the model the parser mutates
//! and the screen backend mirrors into a tile.

use std::collections::VecDeque;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum VtColor {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Style {
    pub fg: VtColor,
    pub bg: VtColor,
    pub bold: bool,
    pub underline: bool,
    pub reverse: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Cell {
    pub ch: char,
    pub style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            ch: ' ',
            style: Style::default(),
        }
    }
}

pub struct Grid {
    pub cols: u16,
    pub rows: u16,
    cells: Vec<Vec<Cell>>,
    scrollback: VecDeque<Vec<Cell>>,
    scrollback_limit: usize,
    pub cursor_x: u16,
    pub cursor_y: u16,
    saved_cursor: Option<(u16, u16)>,
    scroll_top: u16,
    scroll_bottom: u16,
    scroll_offset: usize,
    style: Style,
    default_style: Style,
    blank: Cell,
    pub cursor_visible: bool,
    pub dirty: bool,
    alt_cells: Option<Vec<Vec<Cell>>>,
    alt_cursor: Option<(u16, u16)>,
    in_alt_screen: bool,
    pub mouse_tracking: bool,
    pub mouse_sgr: bool,
    pub bell_enabled: bool,
}

impl Grid {
    pub fn new(rows: u16, cols: u16, scrollback_limit: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let blank = Cell::default();
        Grid {
            cols,
            rows,
            cells: vec![vec![blank; cols as usize]; rows as usize],
            scrollback: VecDeque::new(),
            scrollback_limit,
            cursor_x: 0,
            cursor_y: 0,
            saved_cursor: None,
            scroll_top: 0,
            scroll_bottom: rows - 1,
            scroll_offset: 0,
            style: Style::default(),
            default_style: Style::default(),
            blank,
            cursor_visible: true,
            dirty: true,
            alt_cells: None,
            alt_cursor: None,
            in_alt_screen: false,
            mouse_tracking: false,
            mouse_sgr: false,
            bell_enabled: true,
        }
    }

    pub fn set_default_style(&mut self, style: Style) {
        self.default_style = style;
        self.blank = Cell { ch: ' ', style };
        self.style = style;
        self.dirty = true;
    }

    pub fn in_alt_screen(&self) -> bool {
        self.in_alt_screen
    }

    /// Total addressable lines: scrollback above the live screen.
    pub fn total_lines(&self) -> usize {
        self.scrollback.len() + self.rows as usize
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Adjust the view offset into scrollback; positive scrolls back in
    /// history, negative toward the live screen.
    pub fn scroll_view(&mut self, delta: i32) {
        if self.in_alt_screen {
            return;
        }
        let max = self.scrollback.len() as i64;
        let next = (self.scroll_offset as i64 + i64::from(delta)).clamp(0, max);
        self.scroll_offset = next as usize;
        self.dirty = true;
    }

    /// Pin the view offset directly; clamped to the available history.
    pub fn set_view_offset(&mut self, offset: usize) {
        let next = offset.min(self.scrollback.len());
        if next != self.scroll_offset {
            self.scroll_offset = next;
            self.dirty = true;
        }
    }

    pub fn reset_view(&mut self) {
        if self.scroll_offset != 0 {
            self.scroll_offset = 0;
            self.dirty = true;
        }
    }

    /// Line by absolute index: `0..scrollback.len()` is history, the rest
    /// the live screen.
    pub fn absolute_line(&self, idx: usize) -> &[Cell] {
        if idx < self.scrollback.len() {
            &self.scrollback[idx]
        } else {
            let row = (idx - self.scrollback.len()).min(self.rows as usize - 1);
            &self.cells[row]
        }
    }

    pub fn line_text(&self, idx: usize) -> String {
        let line = self.absolute_line(idx);
        let mut text: String = line.iter().map(|c| c.ch).collect();
        while text.ends_with(' ') {
            text.pop();
        }
        text
    }

    /// Visible row `r` honoring the current view offset.
    pub fn visible_row(&self, r: u16) -> &[Cell] {
        let base = self.total_lines() - self.rows as usize - self.scroll_offset;
        self.absolute_line(base + r as usize)
    }

    /// Absolute index of visible row `r`, for selection overlays.
    pub fn absolute_index_of_visible(&self, r: u16) -> usize {
        self.total_lines() - self.rows as usize - self.scroll_offset + r as usize
    }

    pub fn put_char(&mut self, ch: char) {
        self.dirty = true;
        self.scroll_offset = 0;
        if self.cursor_x >= self.cols {
            self.cursor_x = 0;
            self.advance_line();
        }
        let row = self.cursor_y as usize;
        let col = self.cursor_x as usize;
        if row < self.cells.len() && col < self.cells[row].len() {
            self.cells[row][col] = Cell {
                ch,
                style: self.style,
            };
        }
        self.cursor_x += 1;
    }

    pub fn newline(&mut self) {
        self.dirty = true;
        self.advance_line();
    }

    pub fn carriage_return(&mut self) {
        self.cursor_x = 0;
        self.dirty = true;
    }

    pub fn backspace(&mut self) {
        self.cursor_x = self.cursor_x.saturating_sub(1);
    }

    pub fn tab(&mut self) {
        let next_tab = ((self.cursor_x / 8) + 1) * 8;
        self.cursor_x = next_tab.min(self.cols - 1);
    }

    fn advance_line(&mut self) {
        if self.cursor_y == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor_y < self.rows - 1 {
            self.cursor_y += 1;
        }
    }

    fn blank_line(&self) -> Vec<Cell> {
        vec![self.blank; self.cols as usize]
    }

    fn scroll_up(&mut self, n: u16) {
        let top = self.scroll_top as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n {
            if top < self.cells.len() {
                let line = self.cells.remove(top);
                if top == 0 && !self.in_alt_screen {
                    self.scrollback.push_back(line);
                    if self.scrollback.len() > self.scrollback_limit {
                        self.scrollback.pop_front();
                    }
                }
            }
            let pos = bottom.min(self.cells.len());
            self.cells.insert(pos, self.blank_line());
        }
        let fill = self.blank_line();
        self.cells.resize(self.rows as usize, fill);
        self.dirty = true;
    }

    fn scroll_down(&mut self, n: u16) {
        let top = self.scroll_top as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n {
            if bottom < self.cells.len() {
                self.cells.remove(bottom);
            }
            self.cells.insert(top, self.blank_line());
        }
        let fill = self.blank_line();
        self.cells.resize(self.rows as usize, fill);
        self.dirty = true;
    }

    pub fn reverse_index(&mut self) {
        if self.cursor_y == self.scroll_top {
            self.scroll_down(1);
        } else {
            self.cursor_y = self.cursor_y.saturating_sub(1);
        }
        self.dirty = true;
    }

    pub fn set_sgr(&mut self, params: &[u16]) {
        let mut i = 0;
        if params.is_empty() {
            self.style = self.default_style;
            return;
        }
        while i < params.len() {
            match params[i] {
                0 => self.style = self.default_style,
                1 => self.style.bold = true,
                4 => self.style.underline = true,
                7 => self.style.reverse = true,
                22 => self.style.bold = false,
                24 => self.style.underline = false,
                27 => self.style.reverse = false,
                30..=37 => self.style.fg = VtColor::Indexed((params[i] - 30) as u8),
                38 => {
                    if let Some((color, used)) = extended_color(&params[i + 1..]) {
                        self.style.fg = color;
                        i += used;
                    }
                }
                39 => self.style.fg = self.default_style.fg,
                40..=47 => self.style.bg = VtColor::Indexed((params[i] - 40) as u8),
                48 => {
                    if let Some((color, used)) = extended_color(&params[i + 1..]) {
                        self.style.bg = color;
                        i += used;
                    }
                }
                49 => self.style.bg = self.default_style.bg,
                90..=97 => self.style.fg = VtColor::Indexed((params[i] - 90 + 8) as u8),
                100..=107 => self.style.bg = VtColor::Indexed((params[i] - 100 + 8) as u8),
                _ => {}
            }
            i += 1;
        }
    }

    pub fn erase_in_display(&mut self, mode: u16) {
        self.dirty = true;
        let row = self.cursor_y as usize;
        let col = self.cursor_x as usize;
        match mode {
            0 => {
                self.erase_line_span(row, col, self.cols as usize);
                for r in (row + 1)..self.cells.len() {
                    self.erase_line_span(r, 0, self.cols as usize);
                }
            }
            1 => {
                for r in 0..row {
                    self.erase_line_span(r, 0, self.cols as usize);
                }
                self.erase_line_span(row, 0, col + 1);
            }
            2 | 3 => {
                for r in 0..self.cells.len() {
                    self.erase_line_span(r, 0, self.cols as usize);
                }
            }
            _ => {}
        }
    }

    pub fn erase_in_line(&mut self, mode: u16) {
        self.dirty = true;
        let row = self.cursor_y as usize;
        let col = self.cursor_x as usize;
        match mode {
            0 => self.erase_line_span(row, col, self.cols as usize),
            1 => self.erase_line_span(row, 0, col + 1),
            2 => self.erase_line_span(row, 0, self.cols as usize),
            _ => {}
        }
    }

    fn erase_line_span(&mut self, row: usize, from: usize, to: usize) {
        if let Some(line) = self.cells.get_mut(row) {
            for cell in line.iter_mut().take(to).skip(from) {
                *cell = self.blank;
            }
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor_y = self.cursor_y.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor_y = (self.cursor_y + n).min(self.rows - 1);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor_x = (self.cursor_x + n).min(self.cols - 1);
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor_x = self.cursor_x.saturating_sub(n);
    }

    pub fn set_cursor_pos(&mut self, row: u16, col: u16) {
        self.cursor_y = row.min(self.rows - 1);
        self.cursor_x = col.min(self.cols - 1);
        self.dirty = true;
    }

    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some((self.cursor_x, self.cursor_y));
    }

    pub fn restore_cursor(&mut self) {
        if let Some((x, y)) = self.saved_cursor {
            self.cursor_x = x.min(self.cols - 1);
            self.cursor_y = y.min(self.rows - 1);
        }
    }

    pub fn insert_lines(&mut self, n: u16) {
        let row = self.cursor_y as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n {
            if bottom < self.cells.len() {
                self.cells.remove(bottom);
            }
            self.cells.insert(row, self.blank_line());
        }
        let fill = self.blank_line();
        self.cells.resize(self.rows as usize, fill);
        self.dirty = true;
    }

    pub fn delete_lines(&mut self, n: u16) {
        let row = self.cursor_y as usize;
        let bottom = self.scroll_bottom as usize;
        for _ in 0..n {
            if row < self.cells.len() {
                self.cells.remove(row);
            }
            let pos = bottom.min(self.cells.len());
            self.cells.insert(pos, self.blank_line());
        }
        let fill = self.blank_line();
        self.cells.resize(self.rows as usize, fill);
        self.dirty = true;
    }

    pub fn insert_chars(&mut self, n: u16) {
        let row = self.cursor_y as usize;
        let col = self.cursor_x as usize;
        let blank = self.blank;
        if let Some(line) = self.cells.get_mut(row) {
            for _ in 0..n {
                if col < line.len() {
                    line.insert(col, blank);
                    line.pop();
                }
            }
        }
        self.dirty = true;
    }

    pub fn delete_chars(&mut self, n: u16) {
        let row = self.cursor_y as usize;
        let col = self.cursor_x as usize;
        let blank = self.blank;
        if let Some(line) = self.cells.get_mut(row) {
            for _ in 0..n {
                if col < line.len() {
                    line.remove(col);
                    line.push(blank);
                }
            }
        }
        self.dirty = true;
    }

    pub fn erase_chars(&mut self, n: u16) {
        let row = self.cursor_y as usize;
        let col = self.cursor_x as usize;
        let blank = self.blank;
        if let Some(line) = self.cells.get_mut(row) {
            for i in 0..n as usize {
                if let Some(cell) = line.get_mut(col + i) {
                    *cell = blank;
                }
            }
        }
        self.dirty = true;
    }

    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        if top >= bottom {
            return;
        }
        self.scroll_top = top.min(self.rows - 1);
        self.scroll_bottom = bottom.min(self.rows - 1);
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    pub fn scroll_up_region(&mut self, n: u16) {
        self.scroll_up(n);
    }

    pub fn scroll_down_region(&mut self, n: u16) {
        self.scroll_down(n);
    }

    pub fn enter_alt_screen(&mut self) {
        if self.in_alt_screen {
            return;
        }
        self.in_alt_screen = true;
        self.alt_cursor = Some((self.cursor_x, self.cursor_y));
        let live = std::mem::replace(
            &mut self.cells,
            vec![vec![self.blank; self.cols as usize]; self.rows as usize],
        );
        self.alt_cells = Some(live);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.scroll_offset = 0;
        self.dirty = true;
    }

    pub fn leave_alt_screen(&mut self) {
        if !self.in_alt_screen {
            return;
        }
        self.in_alt_screen = false;
        if let Some(cells) = self.alt_cells.take() {
            self.cells = cells;
        }
        if let Some((x, y)) = self.alt_cursor.take() {
            self.cursor_x = x.min(self.cols - 1);
            self.cursor_y = y.min(self.rows - 1);
        }
        self.scroll_offset = 0;
        self.dirty = true;
    }

    pub fn reset(&mut self) {
        *self = Grid::new(self.rows, self.cols, self.scrollback_limit);
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        if rows == self.rows && cols == self.cols {
            return;
        }
        let old_rows = self.rows as usize;
        self.rows = rows;
        self.cols = cols;

        for line in &mut self.cells {
            line.resize(cols as usize, self.blank);
        }
        let new_rows = rows as usize;
        if new_rows > old_rows {
            let fill = self.blank_line();
            self.cells.resize(new_rows, fill);
        } else {
            // Drop blank tail rows first, then push the top into history.
            while self.cells.len() > new_rows {
                let tail_blank = self
                    .cells
                    .last()
                    .map(|l| l.iter().all(|c| c.ch == ' '))
                    .unwrap_or(true);
                if tail_blank && self.cells.len() > self.cursor_y as usize + 1 {
                    self.cells.pop();
                } else {
                    break;
                }
            }
            while self.cells.len() > new_rows {
                let line = self.cells.remove(0);
                if !self.in_alt_screen {
                    self.scrollback.push_back(line);
                    if self.scrollback.len() > self.scrollback_limit {
                        self.scrollback.pop_front();
                    }
                }
                self.cursor_y = self.cursor_y.saturating_sub(1);
            }
        }

        self.cursor_x = self.cursor_x.min(cols - 1);
        self.cursor_y = self.cursor_y.min(rows - 1);
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.scroll_offset = 0;

        if let Some(alt) = &mut self.alt_cells {
            for line in alt.iter_mut() {
                line.resize(cols as usize, self.blank);
            }
            alt.resize(new_rows, vec![self.blank; cols as usize]);
        }
        self.dirty = true;
    }
}

fn extended_color(params: &[u16]) -> Option<(VtColor, usize)> {
    match params.first()? {
        5 => Some((VtColor::Indexed(*params.get(1)? as u8), 2)),
        2 => Some((
            VtColor::Rgb(
                *params.get(1)? as u8,
                *params.get(2)? as u8,
                *params.get(3)? as u8,
            ),
            4,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(cells: &[Cell]) -> String {
        let mut s: String = cells.iter().map(|c| c.ch).collect();
        while s.ends_with(' ') {
            s.pop();
        }
        s
    }

    #[test]
    fn put_char_advances_and_wraps() {
        let mut g = Grid::new(3, 4, 10);
        for ch in "abcdef".chars() {
            g.put_char(ch);
        }
        assert_eq!(text_of(g.visible_row(0)), "abcd");
        assert_eq!(text_of(g.visible_row(1)), "ef");
        assert_eq!((g.cursor_x, g.cursor_y), (2, 1));
    }

    #[test]
    fn scrolling_feeds_scrollback() {
        let mut g = Grid::new(2, 4, 10);
        for line in ["one", "two", "three"] {
            for ch in line.chars() {
                g.put_char(ch);
            }
            g.carriage_return();
            g.newline();
        }
        assert!(g.total_lines() > 2);
        assert_eq!(g.line_text(0), "one");
        g.scroll_view(10);
        assert_eq!(text_of(g.visible_row(0)), "one");
        g.reset_view();
        assert_eq!(g.scroll_offset(), 0);
    }

    #[test]
    fn scrollback_is_bounded() {
        let mut g = Grid::new(2, 4, 3);
        for _ in 0..20 {
            g.newline();
        }
        assert!(g.total_lines() <= 3 + 2);
    }

    #[test]
    fn sgr_tracks_colors_and_reset() {
        let mut g = Grid::new(2, 8, 0);
        g.set_sgr(&[1, 31]);
        g.put_char('x');
        let cell = g.visible_row(0)[0];
        assert!(cell.style.bold);
        assert_eq!(cell.style.fg, VtColor::Indexed(1));
        g.set_sgr(&[0]);
        g.put_char('y');
        let cell = g.visible_row(0)[1];
        assert_eq!(cell.style, Style::default());
    }

    #[test]
    fn extended_color_parses_256_and_rgb() {
        assert_eq!(
            extended_color(&[5, 68]),
            Some((VtColor::Indexed(68), 2))
        );
        assert_eq!(
            extended_color(&[2, 10, 20, 30]),
            Some((VtColor::Rgb(10, 20, 30), 4))
        );
        assert_eq!(extended_color(&[9]), None);
    }

    #[test]
    fn alt_screen_preserves_primary_contents() {
        let mut g = Grid::new(2, 8, 10);
        for ch in "main".chars() {
            g.put_char(ch);
        }
        g.enter_alt_screen();
        assert_eq!(text_of(g.visible_row(0)), "");
        for ch in "alt".chars() {
            g.put_char(ch);
        }
        g.leave_alt_screen();
        assert_eq!(text_of(g.visible_row(0)), "main");
    }

    #[test]
    fn resize_pushes_overflow_into_history() {
        let mut g = Grid::new(4, 8, 10);
        for line in ["a", "b", "c", "d"] {
            for ch in line.chars() {
                g.put_char(ch);
            }
            if line != "d" {
                g.carriage_return();
                g.newline();
            }
        }
        g.resize(2, 8);
        assert_eq!(g.rows, 2);
        assert_eq!(text_of(g.visible_row(1)), "d");
        assert_eq!(g.line_text(0), "a");
    }

    #[test]
    fn erase_in_line_spans() {
        let mut g = Grid::new(1, 6, 0);
        for ch in "abcdef".chars() {
            g.put_char(ch);
        }
        g.set_cursor_pos(0, 2);
        g.erase_in_line(0);
        assert_eq!(text_of(g.visible_row(0)), "ab");
    }
}
