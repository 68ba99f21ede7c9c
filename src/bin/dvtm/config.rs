//! Compile-time defaults: keybindings, mouse buttons, the command table,
//! the layout registry, colors, and the CLI surface.

use crate::commands::{self, Action, ButtonBinding, CommandDef, KeyBinding};
use crate::layout::{self, Layout};
use crate::mouse::ButtonMask;
use crate::statusbar::{BarAlign, BarPos};
use clap::{ArgAction, Parser};
use crossterm::style::Color;
use dvtm::vt::{Style, VtColor};
use std::path::PathBuf;

pub const fn ctrl(c: u8) -> u8 {
    c & 0x1f
}

/// Attributes for the focused window and the status bar.
pub const SELECTED_COLOR: Color = Color::AnsiValue(68);
pub const BAR_COLOR: Color = Color::AnsiValue(68);
/// Status bar position and alignment defaults.
pub const BAR_POS: BarPos = BarPos::Top;
pub const BAR_ALIGN: BarAlign = BarAlign::Right;
/// Separator between window title and window number.
pub const SEPARATOR: &str = " | ";
/// Master width factor [0.1 .. 0.9].
pub const MFACT: f32 = 0.5;
/// Scroll back buffer size in lines.
pub const SCROLL_HISTORY: usize = 500;
/// Whether mouse events are enabled by default.
pub const ENABLE_MOUSE: bool = true;

pub const MOD: u8 = ctrl(b'a');

const fn action(run: commands::CommandFn, args: &'static [&'static str]) -> Action {
    Action { run, args }
}

const fn key(code: u8, run: commands::CommandFn, args: &'static [&'static str]) -> KeyBinding {
    KeyBinding {
        modifier: MOD,
        code,
        action: action(run, args),
    }
}

pub static KEYS: &[KeyBinding] = &[
    key(b'w', commands::create, &[]),
    key(b'q', commands::create, &["", "", "$CWD"]),
    key(b'`', commands::killclient, &[]),
    key(b'j', commands::focusnext, &[]),
    key(b'u', commands::focusnextnm, &[]),
    key(b'i', commands::focusprevnm, &[]),
    key(b'k', commands::focusprev, &[]),
    key(b't', commands::setlayout, &["[]="]),
    key(b'g', commands::setlayout, &["+++"]),
    key(b'b', commands::setlayout, &["TTT"]),
    key(b'm', commands::setlayout, &["[ ]"]),
    key(b' ', commands::setlayout, &[]),
    key(b'h', commands::setmfact, &["-0.05"]),
    key(b'l', commands::setmfact, &["+0.05"]),
    key(b'.', commands::toggleminimize, &[]),
    key(b's', commands::togglebar, &[]),
    key(b'M', commands::togglemouse, &[]),
    key(b'\r', commands::zoom, &[]),
    key(b'1', commands::focusn, &["1"]),
    key(b'2', commands::focusn, &["2"]),
    key(b'3', commands::focusn, &["3"]),
    key(b'4', commands::focusn, &["4"]),
    key(b'5', commands::focusn, &["5"]),
    key(b'6', commands::focusn, &["6"]),
    key(b'7', commands::focusn, &["7"]),
    key(b'8', commands::focusn, &["8"]),
    key(b'9', commands::focusn, &["9"]),
    key(b'Q', commands::quit, &[]),
    key(b'G', commands::escapekey, &[]),
    key(b'a', commands::togglerunall, &[]),
    key(b'r', commands::redraw, &[]),
    key(b'X', commands::lock, &[]),
    key(b'B', commands::togglebell, &[]),
    key(b'c', commands::copymode, &[]),
    key(b'/', commands::copymode, &["/"]),
    key(b'?', commands::copymode, &["?"]),
    key(b'v', commands::paste, &[]),
    key(b'p', commands::scrollback, &["-1"]),
    key(b'n', commands::scrollback, &["1"]),
];

pub static BUTTONS: &[ButtonBinding] = &[
    ButtonBinding {
        mask: ButtonMask::B1_CLICKED,
        action: action(commands::mouse_focus, &[]),
    },
    ButtonBinding {
        mask: ButtonMask::B1_DOUBLE_CLICKED,
        action: action(commands::mouse_fullscreen, &["[ ]"]),
    },
    ButtonBinding {
        mask: ButtonMask::B2_CLICKED,
        action: action(commands::mouse_zoom, &[]),
    },
    ButtonBinding {
        mask: ButtonMask::B3_CLICKED,
        action: action(commands::mouse_minimize, &[]),
    },
];

/// Commands reachable over the command FIFO. Non-empty preset arguments
/// would override whatever the line carries; none of the defaults do.
pub static COMMANDS: &[CommandDef] = &[
    CommandDef { name: "create", action: action(commands::create, &[]) },
    CommandDef { name: "copymode", action: action(commands::copymode, &[]) },
    CommandDef { name: "focus", action: action(commands::focusn, &[]) },
    CommandDef { name: "focusn", action: action(commands::focusn, &[]) },
    CommandDef { name: "focusid", action: action(commands::focusid, &[]) },
    CommandDef { name: "focusnext", action: action(commands::focusnext, &[]) },
    CommandDef { name: "focusnextnm", action: action(commands::focusnextnm, &[]) },
    CommandDef { name: "focusprev", action: action(commands::focusprev, &[]) },
    CommandDef { name: "focusprevnm", action: action(commands::focusprevnm, &[]) },
    CommandDef { name: "killclient", action: action(commands::killclient, &[]) },
    CommandDef { name: "lock", action: action(commands::lock, &[]) },
    CommandDef { name: "paste", action: action(commands::paste, &[]) },
    CommandDef { name: "quit", action: action(commands::quit, &[]) },
    CommandDef { name: "redraw", action: action(commands::redraw, &[]) },
    CommandDef { name: "scrollback", action: action(commands::scrollback, &[]) },
    CommandDef { name: "setlayout", action: action(commands::setlayout, &[]) },
    CommandDef { name: "setmfact", action: action(commands::setmfact, &[]) },
    CommandDef { name: "togglebar", action: action(commands::togglebar, &[]) },
    CommandDef { name: "togglebell", action: action(commands::togglebell, &[]) },
    CommandDef { name: "toggleminimize", action: action(commands::toggleminimize, &[]) },
    CommandDef { name: "togglemouse", action: action(commands::togglemouse, &[]) },
    CommandDef { name: "togglerunall", action: action(commands::togglerunall, &[]) },
    CommandDef { name: "zoom", action: action(commands::zoom, &[]) },
    CommandDef { name: "inputmode", action: action(commands::inputmode, &[]) },
    CommandDef { name: "titleid", action: action(commands::titleid, &[]) },
];

/// Executed at startup when no commands were given on the command line;
/// also the auto-respawn action on last-client exit.
pub static ACTIONS: &[Action] = &[action(commands::create, &[])];

/// The first layout entry is the default; `setlayout` cycles in order.
pub static LAYOUTS: &[Layout] = &[
    Layout { symbol: "[]=", arrange: layout::tile },
    Layout { symbol: "+++", arrange: layout::grid },
    Layout { symbol: "TTT", arrange: layout::bstack },
    Layout { symbol: "[ ]", arrange: layout::fullscreen },
];

pub struct ColorRule {
    pub title: &'static str,
    pub style: Style,
}

const DEFAULT_STYLE: Style = Style {
    fg: VtColor::Default,
    bg: VtColor::Default,
    bold: false,
    underline: false,
    reverse: false,
};

/// Engine default colors by title substring; the first entry is the
/// catch-all.
pub static COLOR_RULES: &[ColorRule] = &[ColorRule {
    title: "",
    style: DEFAULT_STYLE,
}];

#[derive(Debug, Parser)]
#[command(
    name = "dvtm",
    about = "dynamic virtual terminal manager",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// Print version information and exit
    #[arg(short = 'v')]
    pub version: bool,

    /// Toggle the default mouse enablement
    #[arg(short = 'M')]
    pub toggle_mouse: bool,

    /// Override the global modifier (a `^X` prefix yields control-X)
    #[arg(short = 'm', value_name = "MOD")]
    pub modifier: Option<String>,

    /// Escape-sequence recognition delay in milliseconds
    #[arg(short = 'd', value_name = "MS")]
    pub escdelay: Option<u64>,

    /// Scrollback history in lines
    #[arg(short = 'h', value_name = "LINES")]
    pub history: Option<usize>,

    /// Outer terminal title
    #[arg(short = 't', value_name = "TITLE")]
    pub title: Option<String>,

    /// Status FIFO path (created when missing)
    #[arg(short = 's', value_name = "PATH")]
    pub status_fifo: Option<PathBuf>,

    /// Command FIFO path (created when missing)
    #[arg(short = 'c', value_name = "PATH")]
    pub cmd_fifo: Option<PathBuf>,

    /// Event FIFO path (created when missing)
    #[arg(short = 'e', value_name = "PATH")]
    pub event_fifo: Option<PathBuf>,

    /// Show this help
    #[arg(long = "help", action = ArgAction::HelpLong)]
    pub help: Option<bool>,

    /// Shell commands to run, one client per argument
    #[arg(value_name = "CMD")]
    pub commands: Vec<String>,
}

/// `-m` argument: `^X` yields control-X, anything else its first byte.
pub fn parse_modifier(spec: &str) -> Option<u8> {
    let bytes = spec.as_bytes();
    match bytes {
        [] => None,
        [b'^', c, ..] => Some(ctrl(*c)),
        [c, ..] => Some(*c),
    }
}

/// Escape delay resolution: `-d` (clamped to [50, 1000]), else the
/// `ESCDELAY` environment, else 100 ms.
pub fn resolve_escdelay(flag: Option<u64>) -> u64 {
    if let Some(ms) = flag {
        return ms.clamp(50, 1000);
    }
    std::env::var("ESCDELAY")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_masks_to_control_range() {
        assert_eq!(ctrl(b'a'), 0x01);
        assert_eq!(ctrl(b'G'), 0x07);
    }

    #[test]
    fn modifier_spec_understands_caret_prefix() {
        assert_eq!(parse_modifier("^b"), Some(0x02));
        assert_eq!(parse_modifier("g"), Some(b'g'));
        assert_eq!(parse_modifier(""), None);
    }

    #[test]
    fn escdelay_clamps_flag_only() {
        assert_eq!(resolve_escdelay(Some(10)), 50);
        assert_eq!(resolve_escdelay(Some(5000)), 1000);
        assert_eq!(resolve_escdelay(Some(200)), 200);
    }

    #[test]
    fn layout_registry_order_matches_cycle() {
        let symbols: Vec<&str> = LAYOUTS.iter().map(|l| l.symbol).collect();
        assert_eq!(symbols, vec!["[]=", "+++", "TTT", "[ ]"]);
    }

    #[test]
    fn every_spec_command_is_registered() {
        for name in [
            "create",
            "killclient",
            "focusnext",
            "focusprev",
            "focusnextnm",
            "focusprevnm",
            "focusn",
            "focusid",
            "setlayout",
            "setmfact",
            "zoom",
            "toggleminimize",
            "togglebar",
            "togglemouse",
            "togglebell",
            "togglerunall",
            "copymode",
            "paste",
            "scrollback",
            "lock",
            "redraw",
            "quit",
            "inputmode",
            "titleid",
            "focus",
        ] {
            assert!(
                COMMANDS.iter().any(|c| c.name == name),
                "command {name} missing from the table"
            );
        }
    }

    #[test]
    fn all_default_bindings_are_chorded() {
        assert!(KEYS.iter().all(|k| k.modifier == MOD));
    }
}
