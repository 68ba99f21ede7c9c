//! Status bar state fed by the status FIFO; the visible text is always
//! the last complete line received.

use crate::fifo::Fifo;
use std::io::ErrorKind;

/// Bar text is capped at 511 bytes.
const BAR_TEXT_MAX: usize = 511;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BarPos {
    Top,
    Bottom,
    Off,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BarAlign {
    Left,
    Right,
}

pub struct StatusBar {
    pub fifo: Option<Fifo>,
    pub text: String,
    pub pos: BarPos,
    pub align: BarAlign,
    pub h: u16,
    pub y: u16,
}

impl StatusBar {
    pub fn new(pos: BarPos, align: BarAlign) -> Self {
        StatusBar {
            fifo: None,
            text: String::new(),
            pos,
            align,
            h: 1,
            y: 0,
        }
    }

    /// Whether the bar occupies a workspace row.
    pub fn shown(&self) -> bool {
        self.fifo.is_some() && self.pos != BarPos::Off
    }

    /// Drain the status FIFO. Returns true when the visible text changed
    /// and the bar needs a repaint.
    pub fn handle_read(&mut self) -> bool {
        let Some(fifo) = self.fifo.as_mut() else {
            return false;
        };
        let mut buf = [0u8; BAR_TEXT_MAX + 1];
        match fifo.read_chunk(&mut buf) {
            Ok(0) => {
                self.fifo = None;
                false
            }
            Ok(n) => {
                self.text = extract_last_line(&buf[..n]);
                true
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => false,
            Err(err) => {
                self.text = err.to_string();
                truncate_to_boundary(&mut self.text, BAR_TEXT_MAX);
                self.fifo = None;
                true
            }
        }
    }
}

/// The most recent LF-terminated run in the chunk, trailing newlines
/// trimmed.
fn extract_last_line(chunk: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(chunk).into_owned();
    while text.ends_with('\n') {
        text.pop();
    }
    if let Some(pos) = text.rfind('\n') {
        text = text[pos + 1..].to_string();
    }
    truncate_to_boundary(&mut text, BAR_TEXT_MAX);
    text
}

fn truncate_to_boundary(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}
