//! Named operations reachable from keybindings, mouse buttons, and the
//! command FIFO.

use crate::input;
use crate::mouse::ButtonMask;
use crate::mux::Mux;
use crate::statusbar::BarPos;
use dvtm::log_debug;
use dvtm::pty::kill_process_group;

pub type CommandFn = fn(&mut Mux, &[&str]);

/// A command plus preset arguments, bindable to keys, buttons, or names.
#[derive(Clone, Copy)]
pub struct Action {
    pub run: CommandFn,
    pub args: &'static [&'static str],
}

impl Action {
    pub fn invoke(&self, mux: &mut Mux) {
        (self.run)(mux, self.args);
    }
}

pub struct KeyBinding {
    pub modifier: u8,
    pub code: u8,
    pub action: Action,
}

pub struct ButtonBinding {
    pub mask: ButtonMask,
    pub action: Action,
}

pub struct CommandDef {
    pub name: &'static str,
    pub action: Action,
}

pub fn command_by_name(name: &str) -> Option<&'static CommandDef> {
    crate::config::COMMANDS.iter().find(|c| c.name == name)
}

fn arg<'a>(args: &'a [&str], i: usize) -> Option<&'a str> {
    args.get(i).copied().filter(|a| !a.is_empty())
}

pub fn create(mux: &mut Mux, args: &[&str]) {
    mux.create(args);
}

pub fn copymode(mux: &mut Mux, args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    mux.clients.get_mut(sel).term.copy_mode_enter();
    if let Some(seed) = arg(args, 0).and_then(|a| a.bytes().next()) {
        mux.clients.get_mut(sel).term.copy_mode_keypress(seed);
        mux.draw_client(sel);
    }
}

/// Read one more key and feed its control form through the normal
/// dispatch, letting the user send a literal control byte.
pub fn escapekey(mux: &mut Mux, _args: &[&str]) {
    if let Some(key) = input::read_byte_blocking() {
        input::keypress(mux, &[key & 0x1f]);
    }
}

pub fn focusn(mux: &mut Mux, args: &[&str]) {
    let Some(order) = arg(args, 0).and_then(|a| a.parse::<u32>().ok()) else {
        return;
    };
    if let Some(idx) = mux.clients.by_order(order) {
        mux.focus(idx);
        if mux.clients.get(idx).minimized {
            toggleminimize(mux, &[]);
        }
    }
}

pub fn focusid(mux: &mut Mux, args: &[&str]) {
    let Some(id) = arg(args, 0).and_then(|a| a.parse::<u16>().ok()) else {
        return;
    };
    if let Some(idx) = mux.clients.by_id(id) {
        mux.focus(idx);
        if mux.clients.get(idx).minimized {
            toggleminimize(mux, &[]);
        }
    }
}

pub fn focusnext(mux: &mut Mux, _args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    if let Some(next) = mux.clients.next_of(sel).or_else(|| mux.clients.head()) {
        mux.focus(next);
    }
}

pub fn focusnextnm(mux: &mut Mux, _args: &[&str]) {
    mux.focus_next_nm();
}

pub fn focusprev(mux: &mut Mux, _args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    if let Some(prev) = mux.clients.prev_of(sel).or_else(|| mux.clients.tail()) {
        mux.focus(prev);
    }
}

pub fn focusprevnm(mux: &mut Mux, _args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    let mut c = sel;
    loop {
        c = match mux.clients.prev_of(c) {
            Some(p) => p,
            None => match mux.clients.tail() {
                Some(t) => t,
                None => return,
            },
        };
        if !mux.clients.get(c).minimized || c == sel {
            break;
        }
    }
    mux.focus(c);
}

pub fn killclient(mux: &mut Mux, _args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    let pid = mux.clients.get(sel).pid();
    log_debug(&format!("killing client with pid {pid}"));
    if let Err(err) = kill_process_group(pid, libc::SIGKILL) {
        log_debug(&format!("kill failed: {err}"));
    }
}

/// Freeze the UI until the password is typed back. Deliberately consumes
/// all stdin and is non-cancellable.
pub fn lock(mux: &mut Mux, args: &[&str]) {
    mux.backend.clear_all();
    let (w, h) = (mux.screen.w, mux.screen.h);
    let pass: Vec<u8> = match arg(args, 0) {
        Some(given) => given.as_bytes().to_vec(),
        None => {
            mux.backend
                .print_center(w, h, "Enter password");
            let mut buf = Vec::new();
            while buf.len() < 16 {
                match input::read_byte_blocking() {
                    Some(b'\r') | Some(b'\n') | None => break,
                    Some(b) => buf.push(b),
                }
            }
            buf
        }
    };
    mux.backend.print_center(w, h, "Screen locked!");
    if !pass.is_empty() {
        'outer: loop {
            for &expected in &pass {
                match input::read_byte_blocking() {
                    Some(b) if b == expected => {}
                    None => break 'outer,
                    _ => continue 'outer,
                }
            }
            break;
        }
    }
    mux.arrange();
}

pub fn paste(mux: &mut Mux, _args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    let Some(buf) = mux.copybuf.clone() else {
        return;
    };
    if let Err(err) = mux.clients.get_mut(sel).term.write(buf.as_bytes()) {
        log_debug(&format!("paste failed: {err}"));
    }
}

pub fn quit(_mux: &mut Mux, _args: &[&str]) {
    crate::signals::stop();
}

pub fn redraw(mux: &mut Mux, _args: &[&str]) {
    for idx in mux.clients.indices() {
        mux.clients.get_mut(idx).term.mark_dirty();
    }
    mux.resize_screen();
}

pub fn scrollback(mux: &mut Mux, args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    let half = i32::from(mux.clients.get(sel).rect.h) / 2;
    let back = match arg(args, 0).and_then(|a| a.parse::<i32>().ok()) {
        Some(v) => v < 0,
        None => true,
    };
    let delta = if back { half } else { -half };
    mux.clients.get_mut(sel).term.scroll(delta);
    mux.draw_client(sel);
}

pub fn setlayout(mux: &mut Mux, args: &[&str]) {
    match arg(args, 0) {
        None => {
            mux.layout_idx = (mux.layout_idx + 1) % crate::config::LAYOUTS.len();
        }
        Some(symbol) => {
            let Some(i) = crate::config::LAYOUTS
                .iter()
                .position(|l| l.symbol == symbol)
            else {
                return;
            };
            mux.layout_idx = i;
        }
    }
    mux.arrange();
}

pub fn setmfact(mux: &mut Mux, args: &[&str]) {
    if mux.layout_is("[ ]") || mux.layout_is("+++") {
        return;
    }
    let next = adjusted_mfact(mux.screen.mfact, arg(args, 0));
    if next == mux.screen.mfact {
        return;
    }
    mux.screen.mfact = next;
    mux.arrange();
}

/// Absolute value or `+`/`-` delta, clamped to [0.1, 0.9]. A missing or
/// unparsable argument leaves the factor untouched.
fn adjusted_mfact(current: f32, arg: Option<&str>) -> f32 {
    let Some(a) = arg else {
        return current;
    };
    match a.parse::<f32>() {
        Ok(v) => {
            let next = if a.starts_with('+') || a.starts_with('-') {
                current + v
            } else {
                v
            };
            next.clamp(0.1, 0.9)
        }
        Err(_) => current,
    }
}

pub fn togglebar(mux: &mut Mux, _args: &[&str]) {
    mux.bar.pos = if mux.bar.pos == BarPos::Off {
        match crate::config::BAR_POS {
            BarPos::Off => BarPos::Top,
            pos => pos,
        }
    } else {
        BarPos::Off
    };
    mux.update_bar_position();
    mux.arrange();
    mux.drawbar();
}

pub fn togglebell(mux: &mut Mux, _args: &[&str]) {
    if let Some(sel) = mux.sel {
        mux.clients.get_mut(sel).term.toggle_bell();
    }
}

pub fn toggleminimize(mux: &mut Mux, _args: &[&str]) {
    mux.toggle_minimize();
}

pub fn togglemouse(mux: &mut Mux, _args: &[&str]) {
    mux.mouse_enabled = !mux.mouse_enabled;
    mux.backend.set_mouse(mux.mouse_enabled);
}

pub fn togglerunall(mux: &mut Mux, _args: &[&str]) {
    mux.runinall = !mux.runinall;
    mux.draw_all(true);
}

pub fn zoom(mux: &mut Mux, _args: &[&str]) {
    let Some(sel) = mux.sel else {
        return;
    };
    let target = if mux.clients.head() == Some(sel) {
        match mux.clients.next_of(sel) {
            Some(next) => next,
            None => return,
        }
    } else {
        sel
    };
    mux.clients.detach(target);
    mux.clients.attach(target);
    mux.focus(target);
    if mux.clients.get(target).minimized {
        mux.toggle_minimize();
    }
    mux.arrange();
}

pub fn titleid(mux: &mut Mux, args: &[&str]) {
    let Some(id) = arg(args, 0).and_then(|a| a.parse::<u16>().ok()) else {
        return;
    };
    let title = args.get(1).copied().unwrap_or("");
    if let Some(idx) = mux.clients.by_id(id) {
        mux.clients.get_mut(idx).set_title(title);
        if mux.sel == Some(idx) {
            mux.settitle();
        }
        mux.draw_border_of(idx);
        mux.present_cursor();
    }
}

pub fn inputmode(mux: &mut Mux, args: &[&str]) {
    mux.inputmode = input::parse_inputmode(args.first().copied().unwrap_or(""));
}

/// Startup actions, also fired as the auto-respawn on last-client exit.
pub fn startup(mux: &mut Mux, _args: &[&str]) {
    for action in crate::config::ACTIONS {
        action.invoke(mux);
    }
}

// Mouse button commands; `msel` is the tile under the pointer.

pub fn mouse_focus(mux: &mut Mux, _args: &[&str]) {
    let Some(msel) = mux.msel else {
        return;
    };
    mux.focus(msel);
    if mux.clients.get(msel).minimized {
        mux.toggle_minimize();
    }
}

pub fn mouse_fullscreen(mux: &mut Mux, args: &[&str]) {
    mouse_focus(mux, &[]);
    if mux.layout_is("[ ]") {
        setlayout(mux, &[]);
    } else {
        setlayout(mux, args);
    }
}

pub fn mouse_minimize(mux: &mut Mux, _args: &[&str]) {
    let Some(msel) = mux.msel else {
        return;
    };
    mux.focus(msel);
    mux.toggle_minimize();
}

pub fn mouse_zoom(mux: &mut Mux, _args: &[&str]) {
    let Some(msel) = mux.msel else {
        return;
    };
    mux.focus(msel);
    zoom(mux, &[]);
}
