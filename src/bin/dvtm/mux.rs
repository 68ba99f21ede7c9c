//! The multiplexer state: everything the original kept in module-level
//! globals lives in one `Mux` value the event loop mutates in place.

use crate::clients::{Client, ClientList, IdAlloc};
use crate::commands::KeyBinding;
use crate::config;
use crate::fifo::{arrange_line, parse_command_stream, Fifo};
use crate::input::InputMode;
use crate::layout::{Layout, LayoutSlot, Rect};
use crate::mouse::ClickTracker;
use crate::screen::ScreenBackend;
use crate::signals;
use crate::statusbar::{BarPos, StatusBar};
use dvtm::vt::{Vt, VtEvent};
use dvtm::{log_debug, VERSION};
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct ScreenDims {
    pub w: u16,
    pub h: u16,
    pub mfact: f32,
    pub history: usize,
}

pub struct Mux {
    pub screen: ScreenDims,
    pub workspace: Rect,
    pub clients: ClientList,
    pub ids: IdAlloc,
    pub sel: Option<usize>,
    pub msel: Option<usize>,
    pub layout_idx: usize,
    pub bar: StatusBar,
    pub cmdfifo: Option<Fifo>,
    pub evtfifo: Option<Fifo>,
    pub copybuf: Option<String>,
    pub runinall: bool,
    pub inputmode: InputMode,
    pub bindings: Vec<KeyBinding>,
    pub mouse_enabled: bool,
    pub title_override: Option<String>,
    pub shell: String,
    pub escdelay: u64,
    pub backend: ScreenBackend,
    pub clicks: ClickTracker,
    shutting_down: bool,
}

impl Mux {
    pub fn new() -> Self {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Mux {
            screen: ScreenDims {
                w: 0,
                h: 0,
                mfact: config::MFACT,
                history: config::SCROLL_HISTORY,
            },
            workspace: Rect::default(),
            clients: ClientList::new(),
            ids: IdAlloc::default(),
            sel: None,
            msel: None,
            layout_idx: 0,
            bar: StatusBar::new(config::BAR_POS, config::BAR_ALIGN),
            cmdfifo: None,
            evtfifo: None,
            copybuf: None,
            runinall: false,
            inputmode: InputMode::empty(),
            bindings: config::KEYS
                .iter()
                .map(|k| KeyBinding {
                    modifier: k.modifier,
                    code: k.code,
                    action: k.action,
                })
                .collect(),
            mouse_enabled: config::ENABLE_MOUSE,
            title_override: None,
            shell,
            escdelay: 100,
            backend: ScreenBackend::new(),
            clicks: ClickTracker::default(),
            shutting_down: false,
        }
    }

    pub fn layout(&self) -> &'static Layout {
        &config::LAYOUTS[self.layout_idx]
    }

    pub fn layout_is(&self, symbol: &str) -> bool {
        self.layout().symbol == symbol
    }

    pub fn is_fullscreen(&self) -> bool {
        self.layout_is("[ ]")
    }

    pub fn is_modifier(&self, code: u8) -> bool {
        self.bindings.iter().any(|b| b.modifier == code)
    }

    pub fn lookup_binding(&self, modifier: u8, code: u8) -> Option<crate::commands::Action> {
        self.bindings
            .iter()
            .find(|b| b.modifier == modifier && b.code == code)
            .map(|b| b.action)
    }

    /// Rewrite the modifier of every chorded binding (`-m` flag);
    /// direct (mod = 0) bindings stay direct.
    pub fn override_modifier(&mut self, modifier: u8) {
        for binding in &mut self.bindings {
            if binding.modifier != 0 {
                binding.modifier = modifier;
            }
        }
    }

    // ------------------------------------------------------------------
    // Geometry

    pub fn update_bar_position(&mut self) {
        self.bar.y = 0;
        self.workspace = Rect {
            x: 0,
            y: 0,
            w: self.screen.w,
            h: self.screen.h,
        };
        if !self.bar.shown() {
            return;
        }
        match self.bar.pos {
            BarPos::Top => {
                self.workspace.y += self.bar.h;
                self.workspace.h = self.workspace.h.saturating_sub(self.bar.h);
            }
            BarPos::Bottom => {
                self.workspace.h = self.workspace.h.saturating_sub(self.bar.h);
                self.bar.y = self.workspace.h;
            }
            BarPos::Off => {}
        }
    }

    /// Re-read the terminal size, then rebuild everything.
    pub fn resize_screen(&mut self) {
        let (w, h) = self.backend.size();
        self.screen.w = w;
        self.screen.h = h;
        log_debug(&format!("resize_screen(), w: {w} h: {h}"));
        self.backend.clear_all();
        self.update_bar_position();
        self.drawbar();
        self.arrange();
    }

    fn resize_client(&mut self, idx: usize, rect: Rect) {
        let client = self.clients.get_mut(idx);
        if client.rect != rect {
            client.rect = rect;
        }
        client
            .term
            .resize(rect.h.saturating_sub(1).max(1), rect.w.max(1));
    }

    pub fn arrange(&mut self) {
        self.backend.clear_workspace(self.workspace);
        let indices = self.clients.indices();
        let slots: Vec<LayoutSlot> = indices
            .iter()
            .map(|&i| LayoutSlot {
                minimized: self.clients.get(i).minimized,
            })
            .collect();
        let rects = (self.layout().arrange)(&slots, self.workspace, self.screen.mfact);
        for (slot, &idx) in rects.iter().zip(indices.iter()) {
            if let Some(rect) = slot {
                self.resize_client(idx, *rect);
            }
        }
        self.emit_arrange_event();
        self.draw_all(true);
    }

    // ------------------------------------------------------------------
    // Focus and titles

    pub fn focus(&mut self, idx: usize) {
        if self.sel == Some(idx) {
            return;
        }
        let prev = self.sel.replace(idx);
        self.settitle();
        if let Some(p) = prev {
            if self.clients.contains(p) {
                self.draw_border_of(p);
            }
        }
        if self.is_fullscreen() {
            self.clients.get_mut(idx).term.mark_dirty();
            self.draw_client(idx);
        }
        self.draw_border_of(idx);
        self.present_cursor();
        self.emit_arrange_event();
    }

    pub fn focus_next_nm(&mut self) {
        let Some(sel) = self.sel else {
            return;
        };
        let mut c = sel;
        loop {
            c = match self.clients.next_of(c) {
                Some(n) => n,
                None => match self.clients.head() {
                    Some(h) => h,
                    None => return,
                },
            };
            if !self.clients.get(c).minimized || c == sel {
                break;
            }
        }
        self.focus(c);
    }

    /// Outer terminal title: the `-t` override, else the focused
    /// client's title.
    pub fn settitle(&mut self) {
        let title = match (&self.title_override, self.sel) {
            (Some(t), _) => Some(t.clone()),
            (None, Some(sel)) => {
                let t = &self.clients.get(sel).title;
                (!t.is_empty()).then(|| t.clone())
            }
            _ => None,
        };
        if let Some(title) = title {
            self.backend.set_term_title(&title);
        }
    }

    // ------------------------------------------------------------------
    // Client lifecycle

    pub fn create(&mut self, args: &[&str]) {
        let cmd = args
            .first()
            .copied()
            .filter(|a| !a.is_empty())
            .unwrap_or(self.shell.as_str())
            .to_string();
        let cwd: Option<PathBuf> = args
            .get(2)
            .copied()
            .filter(|a| !a.is_empty())
            .and_then(|a| {
                if a == "$CWD" {
                    self.sel.and_then(|sel| self.cwd_of(sel))
                } else {
                    Some(PathBuf::from(a))
                }
            });
        let id = self.ids.next();
        let env = [
            ("DVTM".to_string(), VERSION.to_string()),
            ("DVTM_WINDOW_ID".to_string(), id.to_string()),
        ];
        let rows = self.workspace.h.saturating_sub(1).max(1);
        let cols = self.workspace.w.max(1);
        let term = match Vt::spawn(&cmd, cwd.as_deref(), &env, rows, cols, self.screen.history) {
            Ok(term) => term,
            Err(err) => {
                log_debug(&format!("cannot spawn client `{cmd}`: {err}"));
                return;
            }
        };
        let mut client = Client {
            id,
            cmd,
            title: String::new(),
            rect: self.workspace,
            minimized: false,
            died: false,
            term,
        };
        if let Some(title) = args.get(1).copied().filter(|a| !a.is_empty()) {
            client.set_title(title);
        }
        let idx = self.clients.insert(client);
        self.clients.attach(idx);
        self.focus(idx);
        self.arrange();
    }

    /// Focused client's working directory via `/proc/<pid>/cwd`.
    fn cwd_of(&self, idx: usize) -> Option<PathBuf> {
        let pid = self.clients.get(idx).pid();
        std::fs::read_link(format!("/proc/{pid}/cwd")).ok()
    }

    pub fn destroy(&mut self, idx: usize) {
        if self.sel == Some(idx) {
            self.focus_next_nm();
        }
        self.clients.detach(idx);
        if self.sel == Some(idx) {
            if let Some(head) = self.clients.head() {
                self.focus(head);
                self.toggle_minimize();
            } else {
                self.sel = None;
            }
        }
        let rect = self.clients.get(idx).rect;
        self.backend.clear_workspace(rect);
        let client = self.clients.remove(idx);
        let cmd = client.cmd.clone();
        drop(client);
        if self.clients.is_empty() && !config::ACTIONS.is_empty() && !self.shutting_down {
            if cmd == self.shell {
                signals::stop();
                return;
            }
            self.create(&[]);
        }
        self.arrange();
    }

    /// Mark clients whose children were reaped; destruction happens at
    /// the top of the tick via `destroy_dead`.
    pub fn reap_and_mark(&mut self) {
        let (pids, overflow) = signals::take_reaped();
        for pid in pids {
            if let Some(idx) = self.clients.by_pid(pid) {
                log_debug(&format!("child with pid {pid} died"));
                self.clients.get_mut(idx).died = true;
            }
        }
        if overflow {
            for idx in self.clients.indices() {
                let pid = self.clients.get(idx).pid();
                // SAFETY: kill with signal 0 only probes for existence.
                let gone = unsafe { libc::kill(pid, 0) } == -1
                    && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH);
                if gone {
                    self.clients.get_mut(idx).died = true;
                }
            }
        }
    }

    pub fn destroy_dead(&mut self) {
        loop {
            let Some(idx) = self
                .clients
                .indices()
                .into_iter()
                .find(|&i| self.clients.get(i).died)
            else {
                break;
            };
            self.destroy(idx);
            if !signals::is_running() {
                break;
            }
        }
    }

    pub fn toggle_minimize(&mut self) {
        let Some(sel) = self.sel else {
            return;
        };
        // The last visible window cannot be minimized.
        if !self.clients.get(sel).minimized && self.clients.count_visible() == 1 {
            return;
        }
        {
            let client = self.clients.get_mut(sel);
            client.minimized = !client.minimized;
        }
        let m = sel;
        if self.clients.head() == Some(m) && self.clients.get(m).minimized {
            // The master was minimized: the next client takes its place
            // and m moves above the other minimized windows.
            if let Some(next) = self.clients.next_of(m) {
                self.clients.detach(next);
                self.clients.attach(next);
                self.focus(next);
                self.clients.detach(m);
                let anchor = self.last_unminimized();
                self.clients.attach_after(m, anchor);
            }
        } else if self.clients.get(m).minimized {
            self.focus_next_nm();
            self.clients.detach(m);
            let anchor = self.last_unminimized();
            self.clients.attach_after(m, anchor);
        } else {
            // No longer minimized: move to the master area.
            self.clients.get_mut(m).term.mark_dirty();
            self.clients.detach(m);
            self.clients.attach(m);
        }
        self.arrange();
    }

    fn last_unminimized(&self) -> Option<usize> {
        let mut cur = self.clients.head()?;
        while let Some(next) = self.clients.next_of(cur) {
            if self.clients.get(next).minimized {
                break;
            }
            cur = next;
        }
        Some(cur)
    }

    // ------------------------------------------------------------------
    // Drawing

    pub fn draw_border_of(&mut self, idx: usize) {
        if self.is_fullscreen() && self.sel != Some(idx) {
            return;
        }
        let client = self.clients.get(idx);
        let selected = self.sel == Some(idx) || (self.runinall && !client.minimized);
        let rect = client.rect;
        let title = client.title.clone();
        let order = self.clients.order_of(idx);
        self.backend.draw_border(rect, &title, order, selected);
    }

    pub fn draw_client(&mut self, idx: usize) {
        let minimized = self.clients.get(idx).minimized;
        let skip = if self.is_fullscreen() {
            self.sel != Some(idx)
        } else {
            minimized
        };
        if !skip {
            let rect = self.clients.get(idx).rect;
            let client = self.clients.get(idx);
            self.backend.draw_content(rect, &client.term);
            self.clients.get_mut(idx).term.clear_dirty();
        }
        self.draw_border_of(idx);
        self.present_cursor();
    }

    /// Repaint everything; the selected client last so the cursor ends
    /// up where its engine says.
    pub fn draw_all(&mut self, borders: bool) {
        for idx in self.clients.indices() {
            if self.sel == Some(idx) {
                continue;
            }
            self.draw_one(idx, borders);
        }
        if let Some(sel) = self.sel {
            self.draw_one(sel, borders);
        }
        self.present_cursor();
    }

    fn draw_one(&mut self, idx: usize, border: bool) {
        let minimized = self.clients.get(idx).minimized;
        let skip_content = if self.is_fullscreen() {
            self.sel != Some(idx)
        } else {
            minimized
        };
        if !skip_content {
            let rect = self.clients.get(idx).rect;
            let client = self.clients.get(idx);
            self.backend.draw_content(rect, &client.term);
            self.clients.get_mut(idx).term.clear_dirty();
        }
        if border {
            self.draw_border_of(idx);
        }
    }

    pub fn drawbar(&mut self) {
        self.backend.draw_bar(&self.bar, self.screen.w);
        self.present_cursor();
    }

    /// Park the terminal cursor on the focused client and flush.
    pub fn present_cursor(&mut self) {
        let cursor = self.sel.and_then(|sel| {
            if !self.clients.contains(sel) {
                return None;
            }
            let client = self.clients.get(sel);
            if client.minimized && !self.is_fullscreen() {
                return None;
            }
            let (row, col) = client.term.cursor()?;
            let rect = client.rect;
            if row + 1 >= rect.h && rect.h > 1 {
                return None;
            }
            Some((rect.x + col.min(rect.w.saturating_sub(1)), rect.y + 1 + row))
        });
        self.backend.present(cursor);
    }

    // ------------------------------------------------------------------
    // FIFOs and engine events

    /// Emit the `A|id,x,y,w,h,sel,min,died` line on the event FIFO.
    pub fn emit_arrange_event(&mut self) {
        let Some(evtfifo) = self.evtfifo.as_mut() else {
            return;
        };
        if !evtfifo.is_open() {
            return;
        }
        let indices = self.clients.indices();
        let sel = self.sel;
        let line = {
            let clients = &self.clients;
            arrange_line(indices.iter().map(|&i| {
                let c = clients.get(i);
                (c.id, &c.rect, sel == Some(i), c.minimized, c.died)
            }))
        };
        evtfifo.write_line(&line);
    }

    pub fn handle_cmdfifo(&mut self) {
        let mut buf = [0u8; 512];
        let chunk = {
            let Some(fifo) = self.cmdfifo.as_mut() else {
                return;
            };
            match fifo.read_chunk(&mut buf) {
                Ok(0) => {
                    self.cmdfifo = None;
                    return;
                }
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    self.cmdfifo = None;
                    return;
                }
            }
        };
        for parsed in parse_command_stream(&buf[..chunk]) {
            let Some(def) = crate::commands::command_by_name(&parsed.name) else {
                continue;
            };
            if !def.action.args.is_empty() {
                def.action.invoke(self);
            } else {
                let args: Vec<&str> = parsed.args.iter().map(String::as_str).collect();
                (def.action.run)(self, &args);
            }
        }
    }

    pub fn handle_statusbar(&mut self) {
        if self.bar.handle_read() {
            self.drawbar();
        }
    }

    /// Apply events the engine queued while processing child output.
    pub fn drain_client_events(&mut self, idx: usize) {
        let events = self.clients.get_mut(idx).term.take_events();
        for event in events {
            match event {
                VtEvent::Title(title) => {
                    self.clients.get_mut(idx).set_title(&title);
                    if self.sel == Some(idx) {
                        self.settitle();
                    }
                    self.apply_color_rules(idx);
                    self.draw_border_of(idx);
                }
                VtEvent::Bell => self.backend.beep(),
                VtEvent::CopyText(text) => self.copybuf = Some(text),
            }
        }
    }

    fn apply_color_rules(&mut self, idx: usize) {
        let title = self.clients.get(idx).title.clone();
        let rule = config::COLOR_RULES
            .iter()
            .skip(1)
            .find(|r| title.contains(r.title))
            .or_else(|| config::COLOR_RULES.first());
        if let Some(rule) = rule {
            self.clients.get_mut(idx).term.set_default_style(rule.style);
        }
    }

    // ------------------------------------------------------------------
    // Shutdown

    pub fn cleanup(&mut self) {
        self.shutting_down = true;
        while let Some(head) = self.clients.head() {
            let client = self.clients.remove(head);
            drop(client);
        }
        self.sel = None;
        self.backend.shutdown();
        self.cmdfifo = None;
        self.evtfifo = None;
        self.bar.fifo = None;
        self.copybuf = None;
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}
