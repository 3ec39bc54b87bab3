//! Graceful shutdown: stop admitting records, let in-flight ones finish

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status used when a run stops on SIGINT/SIGTERM
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Process-wide shutdown flag, set by the signal handlers
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal sets the shutdown flag; a second one exits immediately.
pub fn install_signal_handlers() -> io::Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: AtomicBool::swap and low_level::exit (_exit) are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(INTERRUPTED_EXIT_CODE);
                }
            })?;
        }
    }
    Ok(())
}
