//! SGR mouse report parsing and click classification for the mouse
//! bindings; raw reports are also relayed to clients that asked for
//! mouse tracking.

use bitflags::bitflags;
use std::time::{Duration, Instant};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ButtonMask: u8 {
        const B1_CLICKED        = 0b0001;
        const B1_DOUBLE_CLICKED = 0b0010;
        const B2_CLICKED        = 0b0100;
        const B3_CLICKED        = 0b1000;
    }
}

/// One decoded SGR (1006) report; coordinates are 0-based screen cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseReport {
    pub code: u8,
    pub pressed: bool,
    pub x: u16,
    pub y: u16,
}

impl MouseReport {
    /// Plain button number (0..=2) unless this is motion or wheel noise.
    pub fn button(&self) -> Option<u8> {
        if self.code & 0b0110_0000 != 0 {
            return None;
        }
        let b = self.code & 0b11;
        (b < 3).then_some(b)
    }
}

/// Decode the post-ESC bytes of an SGR mouse report: `[<code;x;y(M|m)`.
pub fn parse_sgr(block: &[u8]) -> Option<MouseReport> {
    let rest = block.strip_prefix(b"[<")?;
    let (&last, body) = rest.split_last()?;
    let pressed = match last {
        b'M' => true,
        b'm' => false,
        _ => return None,
    };
    let mut fields = body.split(|&b| b == b';').map(|f| {
        std::str::from_utf8(f)
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
    });
    let code = fields.next()??;
    let x = fields.next()??;
    let y = fields.next()??;
    if fields.next().is_some() || x == 0 || y == 0 {
        return None;
    }
    Some(MouseReport {
        code: code.min(255) as u8,
        pressed,
        x: x - 1,
        y: y - 1,
    })
}

/// Looks like the start of an SGR report; used by the escape drain to
/// keep reading past its normal byte budget.
pub fn is_sgr_prefix(block: &[u8]) -> bool {
    b"[<".starts_with(block) || block.starts_with(b"[<")
}

/// Completed report: ends in the SGR trailer.
pub fn is_sgr_complete(block: &[u8]) -> bool {
    block.starts_with(b"[<") && matches!(block.last(), Some(b'M') | Some(b'm'))
}

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(300);

/// Raw SGR reports carry no click count, so a second button-1 press on
/// the same cell inside the window counts as a double click.
#[derive(Default)]
pub struct ClickTracker {
    last: Option<(Instant, u16, u16, u8)>,
}

impl ClickTracker {
    pub fn classify(&mut self, report: &MouseReport) -> ButtonMask {
        if !report.pressed {
            return ButtonMask::empty();
        }
        let Some(button) = report.button() else {
            return ButtonMask::empty();
        };
        let now = Instant::now();
        let double = button == 0
            && matches!(
                self.last,
                Some((at, x, y, b))
                    if b == button
                        && x == report.x
                        && y == report.y
                        && now.duration_since(at) <= DOUBLE_CLICK_WINDOW
            );
        self.last = if double {
            None
        } else {
            Some((now, report.x, report.y, button))
        };
        match (button, double) {
            (0, true) => ButtonMask::B1_DOUBLE_CLICKED,
            (0, false) => ButtonMask::B1_CLICKED,
            (1, _) => ButtonMask::B2_CLICKED,
            (2, _) => ButtonMask::B3_CLICKED,
            _ => ButtonMask::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_press_and_release() {
        let press = parse_sgr(b"[<0;12;4M").expect("press report");
        assert_eq!(
            press,
            MouseReport {
                code: 0,
                pressed: true,
                x: 11,
                y: 3
            }
        );
        let release = parse_sgr(b"[<0;12;4m").expect("release report");
        assert!(!release.pressed);
    }

    #[test]
    fn rejects_malformed_reports() {
        assert!(parse_sgr(b"[<0;12M").is_none());
        assert!(parse_sgr(b"[<0;12;4X").is_none());
        assert!(parse_sgr(b"[0;12;4M").is_none());
        assert!(parse_sgr(b"[<0;0;4M").is_none());
    }

    #[test]
    fn wheel_and_motion_have_no_button() {
        let wheel = parse_sgr(b"[<64;5;5M").expect("wheel report");
        assert_eq!(wheel.button(), None);
        let motion = parse_sgr(b"[<35;5;5M").expect("motion report");
        assert_eq!(motion.button(), None);
    }

    #[test]
    fn sgr_prefix_detection_grows_with_input() {
        assert!(is_sgr_prefix(b"["));
        assert!(is_sgr_prefix(b"[<"));
        assert!(is_sgr_prefix(b"[<0;1"));
        assert!(!is_sgr_prefix(b"[A"));
        assert!(is_sgr_complete(b"[<0;1;1M"));
        assert!(!is_sgr_complete(b"[<0;1;1"));
    }

    #[test]
    fn double_click_requires_same_cell() {
        let mut tracker = ClickTracker::default();
        let press = MouseReport {
            code: 0,
            pressed: true,
            x: 4,
            y: 2,
        };
        assert_eq!(tracker.classify(&press), ButtonMask::B1_CLICKED);
        assert_eq!(tracker.classify(&press), ButtonMask::B1_DOUBLE_CLICKED);
        // The double click consumed the state; a third press is single.
        assert_eq!(tracker.classify(&press), ButtonMask::B1_CLICKED);
        let elsewhere = MouseReport { x: 9, ..press };
        assert_eq!(tracker.classify(&elsewhere), ButtonMask::B1_CLICKED);
    }

    #[test]
    fn middle_and_right_buttons_classify() {
        let mut tracker = ClickTracker::default();
        let middle = MouseReport {
            code: 1,
            pressed: true,
            x: 0,
            y: 0,
        };
        let right = MouseReport { code: 2, ..middle };
        assert_eq!(tracker.classify(&middle), ButtonMask::B2_CLICKED);
        assert_eq!(tracker.classify(&right), ButtonMask::B3_CLICKED);
    }
}
