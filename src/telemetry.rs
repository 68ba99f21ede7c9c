//! Optional local trace logging; stdout belongs to the UI so diagnostics
//! go to a file selected via the environment.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn trace_log_path() -> Option<PathBuf> {
    env::var_os("DVTM_TRACE_LOG").map(PathBuf::from)
}

fn init_tracing_once(once: &OnceLock<()>) {
    let Some(path) = trace_log_path() else {
        return;
    };
    let _ = once.get_or_init(|| {
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_max_level(tracing::Level::DEBUG)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Install the trace subscriber if `DVTM_TRACE_LOG` names a writable file.
pub fn init_tracing() {
    init_tracing_once(&TRACING_INIT);
}

/// Debug-channel helper used throughout the crate; a no-op unless tracing
/// was initialized.
pub fn log_debug(msg: &str) {
    tracing::debug!(target: "dvtm", "{msg}");
}
