use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop flag shared between the Ctrl+C handler and the engine.
///
/// The engine observes it at defined checkpoints (before each directory,
/// before each file, between deletion groups); nothing is interrupted
/// mid-operation.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Wire Ctrl+C to the token. Installation failure is logged and ignored;
/// the run just loses graceful interruption.
pub fn install_ctrlc(token: &StopToken) {
    let token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nStop requested, finishing up safely...");
        token.request_stop();
    }) {
        tracing::warn!("could not install Ctrl+C handler: {e}");
    }
}
