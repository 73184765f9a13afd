//! Registration of handlers to run on process shutdown.
//!
//! Handlers run in last-registered-first order; the process forcibly
//! exits once a grace period elapses, whether or not they finished.

use std::sync::Once;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

/// Maximum time shutdown handlers get before the process is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(60);

static SEQUENCE: Mutex<Vec<Box<dyn FnOnce() + Send>>> = Mutex::new(Vec::new());
static ONCE: Once = Once::new();

/// Registers a handler to be run when the process shuts down.
pub fn handle(on_shutdown: impl FnOnce() + Send + 'static) {
    SEQUENCE.lock().push(Box::new(on_shutdown));
}

/// Runs all registered handlers in LIFO order and terminates the process
/// with the given status code. Only the first call has any effect, and
/// termination within [`GRACE_PERIOD`] is guaranteed.
pub fn now(code: i32) -> ! {
    ONCE.call_once(|| {
        debug!("shutdown: status code {code}");

        std::thread::spawn(|| {
            std::thread::sleep(GRACE_PERIOD);
            eprintln!(
                "shutdown: {}s elapsed since shutdown requested; exiting forcefully",
                GRACE_PERIOD.as_secs()
            );
            std::process::exit(1);
        });

        let mut sequence = SEQUENCE.lock();
        while let Some(handler) = sequence.pop() {
            handler();
        }

        std::process::exit(code);
    });

    // Another thread is already shutting down; wait for it to exit.
    error!("shutdown: already in progress");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
