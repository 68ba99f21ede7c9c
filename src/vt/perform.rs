//! `vte::Perform` implementation translating the child's byte stream
//! into grid mutations, engine events, and query responses.

use vte::{Params, Perform};

use super::grid::Grid;
use super::VtEvent;
use crate::log_debug;

pub(super) struct Performer<'a> {
    pub grid: &'a mut Grid,
    pub events: &'a mut Vec<VtEvent>,
    /// Bytes to write back to the child (query answers).
    pub responses: &'a mut Vec<u8>,
}

fn collect_params(params: &Params) -> Vec<u16> {
    params.iter().flat_map(|p| p.iter().copied()).collect()
}

impl Perform for Performer<'_> {
    fn print(&mut self, c: char) {
        self.grid.put_char(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => {
                if self.grid.bell_enabled {
                    self.events.push(VtEvent::Bell);
                }
            }
            0x08 => self.grid.backspace(),
            0x09 => self.grid.tab(),
            0x0a | 0x0b | 0x0c => self.grid.newline(),
            0x0d => self.grid.carriage_return(),
            _ => log_debug(&format!("unhandled execute byte 0x{byte:02x}")),
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if params.len() >= 2 {
            if let b"0" | b"2" = params[0] {
                let title = String::from_utf8_lossy(params[1]).into_owned();
                self.events.push(VtEvent::Title(title));
            }
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        let params = collect_params(params);
        let grid = &mut *self.grid;
        let arg = |i: usize, default: u16| params.get(i).copied().unwrap_or(default);
        let count = arg(0, 1).max(1);

        match (action, intermediates) {
            ('A', []) => grid.cursor_up(count),
            ('B', []) => grid.cursor_down(count),
            ('C', []) => grid.cursor_forward(count),
            ('D', []) => grid.cursor_backward(count),
            ('E', []) => {
                grid.cursor_down(count);
                grid.carriage_return();
            }
            ('F', []) => {
                grid.cursor_up(count);
                grid.carriage_return();
            }
            ('G', []) => {
                let row = grid.cursor_y;
                grid.set_cursor_pos(row, count - 1);
            }
            ('H' | 'f', []) => {
                let row = arg(0, 1).max(1) - 1;
                let col = arg(1, 1).max(1) - 1;
                grid.set_cursor_pos(row, col);
            }
            ('J', []) => grid.erase_in_display(arg(0, 0)),
            ('K', []) => grid.erase_in_line(arg(0, 0)),
            ('L', []) => grid.insert_lines(count),
            ('M', []) => grid.delete_lines(count),
            ('P', []) => grid.delete_chars(count),
            ('S', []) => grid.scroll_up_region(count),
            ('T', []) => grid.scroll_down_region(count),
            ('X', []) => grid.erase_chars(count),
            ('@', []) => grid.insert_chars(count),
            ('d', []) => {
                let col = grid.cursor_x;
                grid.set_cursor_pos(count - 1, col);
            }
            ('m', []) => grid.set_sgr(&params),
            ('r', []) => {
                let top = arg(0, 1).max(1) - 1;
                let bottom = arg(1, grid.rows).max(1) - 1;
                grid.set_scroll_region(top, bottom);
            }
            ('s', []) => grid.save_cursor(),
            ('u', []) => grid.restore_cursor(),
            ('h', [b'?']) | ('l', [b'?']) => {
                let set = action == 'h';
                for &mode in &params {
                    match mode {
                        25 => {
                            grid.cursor_visible = set;
                            grid.dirty = true;
                        }
                        1000 | 1002 => grid.mouse_tracking = set,
                        1006 => grid.mouse_sgr = set,
                        47 | 1047 | 1049 => {
                            if set {
                                grid.enter_alt_screen();
                            } else {
                                grid.leave_alt_screen();
                            }
                        }
                        1 | 7 | 12 | 1004 | 2004 => {}
                        _ => log_debug(&format!("unhandled DEC mode {mode}")),
                    }
                }
            }
            ('n', []) => {
                // DSR 6: cursor position report, 1-based.
                if params.first() == Some(&6) {
                    let row = grid.cursor_y + 1;
                    let col = grid.cursor_x + 1;
                    self.responses
                        .extend_from_slice(format!("\x1b[{row};{col}R").as_bytes());
                }
            }
            ('c', []) | ('c', [b'?']) => {
                // DA1: identify as a VT220-class terminal.
                self.responses.extend_from_slice(b"\x1b[?62;22c");
            }
            _ => log_debug(&format!(
                "unhandled CSI action={action} params={params:?} intermediates={intermediates:?}"
            )),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        match (byte, intermediates) {
            (b'M', []) => self.grid.reverse_index(),
            (b'7', []) => self.grid.save_cursor(),
            (b'8', []) => self.grid.restore_cursor(),
            (b'c', []) => self.grid.reset(),
            _ => log_debug(&format!(
                "unhandled ESC byte=0x{byte:02x} intermediates={intermediates:?}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(grid: &mut Grid, bytes: &[u8]) -> (Vec<VtEvent>, Vec<u8>) {
        let mut events = Vec::new();
        let mut responses = Vec::new();
        let mut parser = vte::Parser::new();
        let mut performer = Performer {
            grid,
            events: &mut events,
            responses: &mut responses,
        };
        parser.advance(&mut performer, bytes);
        (events, responses)
    }

    fn row_text(grid: &Grid, r: u16) -> String {
        let mut s: String = grid.visible_row(r).iter().map(|c| c.ch).collect();
        while s.ends_with(' ') {
            s.pop();
        }
        s
    }

    #[test]
    fn plain_text_lands_in_grid() {
        let mut grid = Grid::new(4, 20, 10);
        feed(&mut grid, b"hello\r\nworld");
        assert_eq!(row_text(&grid, 0), "hello");
        assert_eq!(row_text(&grid, 1), "world");
    }

    #[test]
    fn osc_title_becomes_event() {
        let mut grid = Grid::new(2, 20, 0);
        let (events, _) = feed(&mut grid, b"\x1b]0;my title\x07");
        assert_eq!(events, vec![VtEvent::Title("my title".into())]);
    }

    #[test]
    fn bell_event_respects_toggle() {
        let mut grid = Grid::new(2, 20, 0);
        let (events, _) = feed(&mut grid, b"\x07");
        assert_eq!(events, vec![VtEvent::Bell]);
        grid.bell_enabled = false;
        let (events, _) = feed(&mut grid, b"\x07");
        assert!(events.is_empty());
    }

    #[test]
    fn cursor_position_report_is_answered() {
        let mut grid = Grid::new(5, 20, 0);
        let (_, responses) = feed(&mut grid, b"\x1b[3;4H\x1b[6n");
        assert_eq!(responses, b"\x1b[3;4R");
    }

    #[test]
    fn dec_modes_toggle_mouse_and_cursor() {
        let mut grid = Grid::new(2, 20, 0);
        feed(&mut grid, b"\x1b[?1000h\x1b[?1006h\x1b[?25l");
        assert!(grid.mouse_tracking);
        assert!(grid.mouse_sgr);
        assert!(!grid.cursor_visible);
        feed(&mut grid, b"\x1b[?1000l");
        assert!(!grid.mouse_tracking);
    }

    #[test]
    fn cursor_movement_csi() {
        let mut grid = Grid::new(5, 20, 0);
        feed(&mut grid, b"\x1b[2;3Habc\x1b[2D\x1b[Kx");
        assert_eq!(row_text(&grid, 1), "  ax");
    }
}
