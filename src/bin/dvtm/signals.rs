//! Async-signal handling: handlers only flip atomics and reap children;
//! every observable effect is applied at the top of the next loop tick.

use anyhow::{anyhow, Result};
use dvtm::log_debug;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static SIGWINCH_RECEIVED: AtomicBool = AtomicBool::new(false);
static RUNNING: AtomicBool = AtomicBool::new(true);

/// Fixed-size ring the SIGCHLD handler parks reaped pids in; when it is
/// full the overflow flag forces a liveness sweep on the main thread.
const REAPED_SLOTS: usize = 64;
const EMPTY_SLOT: AtomicI32 = AtomicI32::new(0);
static REAPED_PIDS: [AtomicI32; REAPED_SLOTS] = [EMPTY_SLOT; REAPED_SLOTS];
static REAPED_OVERFLOW: AtomicBool = AtomicBool::new(false);

#[cfg(target_os = "linux")]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(target_os = "macos")]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

extern "C" fn handle_sigwinch(_: libc::c_int) {
    SIGWINCH_RECEIVED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_sigterm(_: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

extern "C" fn handle_sigchld(_: libc::c_int) {
    // SAFETY: waitpid and atomic stores are async-signal-safe; errno is
    // saved and restored around the reap loop.
    unsafe {
        let saved_errno = *errno_location();
        loop {
            let mut status: libc::c_int = 0;
            let pid = libc::waitpid(-1, &mut status, libc::WNOHANG);
            if pid <= 0 {
                break;
            }
            record_reaped(pid);
        }
        *errno_location() = saved_errno;
    }
}

fn record_reaped(pid: libc::pid_t) {
    for slot in &REAPED_PIDS {
        if slot
            .compare_exchange(0, pid, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return;
        }
    }
    REAPED_OVERFLOW.store(true, Ordering::SeqCst);
}

pub fn install_handlers() -> Result<()> {
    let entries: [(libc::c_int, extern "C" fn(libc::c_int)); 3] = [
        (libc::SIGWINCH, handle_sigwinch),
        (libc::SIGCHLD, handle_sigchld),
        (libc::SIGTERM, handle_sigterm),
    ];
    for (signo, handler) in entries {
        // SAFETY: the handlers above restrict themselves to
        // async-signal-safe operations.
        unsafe {
            let handler = handler as *const () as libc::sighandler_t;
            if libc::signal(signo, handler) == libc::SIG_ERR {
                log_debug(&format!("failed to install handler for signal {signo}"));
                return Err(anyhow!("failed to install handler for signal {signo}"));
            }
        }
    }
    Ok(())
}

pub fn take_sigwinch() -> bool {
    SIGWINCH_RECEIVED.swap(false, Ordering::SeqCst)
}

pub fn is_running() -> bool {
    RUNNING.load(Ordering::SeqCst)
}

pub fn stop() {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Drain the reaped-pid ring. The second value reports whether the ring
/// overflowed since the last drain, in which case the caller must probe
/// every client pid for liveness itself.
pub fn take_reaped() -> (Vec<libc::pid_t>, bool) {
    let mut pids = Vec::new();
    for slot in &REAPED_PIDS {
        let pid = slot.swap(0, Ordering::SeqCst);
        if pid > 0 {
            pids.push(pid);
        }
    }
    (pids, REAPED_OVERFLOW.swap(false, Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use std::thread;
    use std::time::Duration;

    fn ring_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn sigwinch_flag_is_taken_once() {
        SIGWINCH_RECEIVED.store(false, Ordering::SeqCst);
        handle_sigwinch(0);
        assert!(take_sigwinch());
        assert!(!take_sigwinch());
    }

    #[test]
    fn sigterm_clears_running() {
        RUNNING.store(true, Ordering::SeqCst);
        handle_sigterm(0);
        assert!(!is_running());
        RUNNING.store(true, Ordering::SeqCst);
    }

    #[test]
    fn reaped_ring_round_trips_and_overflows() {
        let _guard = ring_lock().lock().expect("ring lock");
        let (_, _) = take_reaped();
        for pid in 1..=REAPED_SLOTS as i32 {
            record_reaped(pid);
        }
        record_reaped(9999);
        let (pids, overflow) = take_reaped();
        // A concurrent test's dying child may steal one slot.
        let fakes = pids
            .iter()
            .filter(|p| (1..=REAPED_SLOTS as i32).contains(*p))
            .count();
        assert!(fakes >= REAPED_SLOTS - 1);
        assert!(overflow, "full ring must raise the overflow flag");
    }

    #[test]
    fn sigchld_handler_reaps_dead_child() {
        let _guard = ring_lock().lock().expect("ring lock");
        install_handlers().expect("install handlers");
        let (_, _) = take_reaped();
        let child = std::process::Command::new("true")
            .spawn()
            .expect("spawn child");
        let pid = child.id() as libc::pid_t;
        for _ in 0..200 {
            let (pids, _) = take_reaped();
            if pids.contains(&pid) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("child {pid} was not reaped via SIGCHLD");
    }
}
