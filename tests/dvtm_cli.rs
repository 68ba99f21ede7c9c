//! Integration tests that lock dvtm's CLI contract and drive the full
//! multiplexer through its FIFOs under a scratch PTY.

use dvtm::pty::{kill_process_group, Pty};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn dvtm_bin() -> &'static str {
    env!("CARGO_BIN_EXE_dvtm")
}

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

#[test]
fn version_flag_prints_banner() {
    let output = Command::new(dvtm_bin())
        .arg("-v")
        .output()
        .expect("run dvtm -v");
    assert!(output.status.success());
    assert!(combined_output(&output).contains("dvtm-0.15"));
}

#[test]
fn unknown_flag_exits_nonzero() {
    let output = Command::new(dvtm_bin())
        .arg("-Z")
        .output()
        .expect("run dvtm -Z");
    assert!(!output.status.success());
}

#[test]
fn help_describes_the_program() {
    let output = Command::new(dvtm_bin())
        .arg("--help")
        .output()
        .expect("run dvtm --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("dynamic virtual terminal manager"));
    assert!(combined.contains("-c"));
    assert!(combined.contains("-e"));
}

/// A dvtm instance running on its own PTY, reachable over its FIFOs.
struct Session {
    pty: Arc<Pty>,
    cmds: File,
    events: File,
    buffer: Vec<u8>,
    consumed: usize,
}

impl Session {
    fn start(tag: &str, extra_args: &str) -> Session {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        let cpath = std::env::temp_dir().join(format!("dvtm-{tag}-{nanos}-c.fifo"));
        let epath = std::env::temp_dir().join(format!("dvtm-{tag}-{nanos}-e.fifo"));
        let cmd = format!(
            "{} -c {} -e {} {extra_args}",
            dvtm_bin(),
            cpath.display(),
            epath.display()
        );
        let pty = Arc::new(Pty::spawn(&cmd, None, &[], 24, 80).expect("spawn dvtm"));

        // Keep the master drained so dvtm never blocks on its own
        // output.
        let drain = Arc::clone(&pty);
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match drain.read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        let cmds = open_when_ready(&cpath, true);
        let events = open_when_ready(&epath, false);
        Session {
            pty,
            cmds,
            events,
            buffer: Vec::new(),
            consumed: 0,
        }
    }

    fn send(&mut self, line: &str) {
        self.cmds
            .write_all(line.as_bytes())
            .expect("write to command fifo");
    }

    fn type_keys(&self, bytes: &[u8]) {
        self.pty.write_all(bytes).expect("write to dvtm stdin");
    }

    /// Wait for an event-FIFO line matching `pred`.
    fn wait_event<F: Fn(&str) -> bool>(&mut self, what: &str, pred: F) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let mut chunk = [0u8; 4096];
            match self.events.read(&mut chunk) {
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => panic!("event fifo read failed: {err}"),
            }
            while let Some(pos) = self.buffer[self.consumed..].iter().position(|&b| b == b'\n')
            {
                let line =
                    String::from_utf8_lossy(&self.buffer[self.consumed..self.consumed + pos])
                        .into_owned();
                self.consumed += pos + 1;
                if pred(&line) {
                    return line;
                }
            }
            if Instant::now() > deadline {
                panic!("timed out waiting for {what}");
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// True when no matching line shows up within the window.
    fn no_event_within<F: Fn(&str) -> bool>(&mut self, window: Duration, pred: F) -> bool {
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let mut chunk = [0u8; 4096];
            match self.events.read(&mut chunk) {
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(_) => break,
            }
            while let Some(pos) = self.buffer[self.consumed..].iter().position(|&b| b == b'\n')
            {
                let line =
                    String::from_utf8_lossy(&self.buffer[self.consumed..self.consumed + pos])
                        .into_owned();
                self.consumed += pos + 1;
                if pred(&line) {
                    return false;
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    fn shutdown(mut self) {
        let _ = self.cmds.write_all(b"quit\n");
        thread::sleep(Duration::from_millis(200));
        let _ = kill_process_group(self.pty.pid(), libc::SIGKILL);
    }
}

fn open_when_ready(path: &PathBuf, write: bool) -> File {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let attempt = if write {
            OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
        } else {
            OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
        };
        match attempt {
            Ok(file) => return file,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Err(err) => panic!("cannot open fifo {}: {err}", path.display()),
        }
    }
}

/// Parse an `A|id,x,y,w,h,sel,min,died|...` line into tuples.
fn tuples(line: &str) -> Vec<Vec<i64>> {
    line.strip_prefix('A')
        .map(|rest| {
            rest.split('|')
                .skip(1)
                .map(|t| t.split(',').filter_map(|f| f.parse().ok()).collect())
                .collect()
        })
        .unwrap_or_default()
}

fn selected_id(line: &str) -> Option<i64> {
    tuples(line)
        .into_iter()
        .find(|t| t.len() == 8 && t[5] == 1)
        .map(|t| t[0])
}

#[test]
fn create_and_focus_by_number() {
    let mut s = Session::start("e1", "");
    // dvtm starts one shell client on its own.
    s.send("create sh\n");
    s.wait_event("two clients with the new one selected", |l| {
        tuples(l).len() == 2 && selected_id(l) == Some(2)
    });
    s.send("create sh\n");
    s.wait_event("three clients with the newest selected", |l| {
        tuples(l).len() == 3 && selected_id(l) == Some(3)
    });
    // Order 2 is the second client in list order; focusing it must move
    // the selection off the head.
    s.send("focus 2\n");
    s.wait_event("client order 2 focused", |l| {
        tuples(l).len() == 3 && selected_id(l) == Some(2)
    });
    s.shutdown();
}

#[test]
fn setmfact_clamps_to_range() {
    let mut s = Session::start("e2", "");
    s.send("create sh\n");
    s.wait_event("second client", |l| tuples(l).len() == 2);
    // Master is the first tuple (list order); workspace is 80 wide.
    s.send("setmfact -9\n");
    s.wait_event("mfact clamped low", |l| {
        let t = tuples(l);
        t.len() == 2 && t[0][3] == 8
    });
    s.send("setmfact 0.5\n");
    s.wait_event("mfact back to half", |l| {
        let t = tuples(l);
        t.len() == 2 && t[0][3] == 40
    });
    s.send("setmfact +10\n");
    s.wait_event("mfact clamped high", |l| {
        let t = tuples(l);
        t.len() == 2 && t[0][3] == 72
    });
    s.shutdown();
}

#[test]
fn minimize_is_refused_for_last_visible_window() {
    let mut s = Session::start("e3", "");
    s.send("toggleminimize\n");
    assert!(
        s.no_event_within(Duration::from_millis(500), |l| {
            tuples(l).iter().any(|t| t.len() == 8 && t[6] == 1)
        }),
        "single client must not minimize"
    );
    s.send("create sh\n");
    s.wait_event("second client", |l| tuples(l).len() == 2);
    s.send("toggleminimize\n");
    s.wait_event("one minimized, focus on the visible one", |l| {
        let t = tuples(l);
        t.len() == 2
            && t.iter().any(|c| c[6] == 1)
            && t.iter().any(|c| c[5] == 1 && c[6] == 0)
    });
    s.shutdown();
}

#[test]
fn inputmode_redirects_keys_to_event_fifo() {
    let mut s = Session::start("e4", "");
    s.send("inputmode ie\n");
    thread::sleep(Duration::from_millis(300));
    s.type_keys(b"A");
    s.wait_event("redirected keypress", |l| l == "KA");
    s.send("inputmode \n");
    thread::sleep(Duration::from_millis(300));
    s.type_keys(b"B");
    assert!(
        s.no_event_within(Duration::from_millis(500), |l| l == "KB"),
        "disabled inputmode must not redirect keys"
    );
    s.shutdown();
}

#[test]
fn dead_client_triggers_respawn() {
    // The sole startup client runs /bin/true, exits immediately, and is
    // not the user shell, so a replacement client must appear.
    let mut s = Session::start("e5", "/bin/true");
    s.wait_event("respawned client", |l| {
        let t = tuples(l);
        t.len() == 1 && t[0][0] >= 2
    });
    s.shutdown();
}

#[test]
fn quit_ends_the_process_cleanly() {
    let s = Session::start("quit", "");
    let pid = s.pty.pid();
    s.send_quit_and_forget();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: polling our own child with WNOHANG.
        let r = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if r == pid {
            assert!(libc::WIFEXITED(status), "dvtm should exit, not crash");
            assert_eq!(libc::WEXITSTATUS(status), 0);
            return;
        }
        if Instant::now() > deadline {
            let _ = kill_process_group(pid, libc::SIGKILL);
            panic!("dvtm did not exit after quit");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

impl Session {
    fn send_quit_and_forget(mut self) {
        let _ = self.cmds.write_all(b"quit\n");
    }
}
