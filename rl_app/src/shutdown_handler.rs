use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Sets up a Ctrl+C handler that clears the running flag, ending the steady demo early
pub fn setup(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping load");
        running.store(false, Ordering::Relaxed);
    })
}
