use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::session::VoiceSession;

/// Shared application state for HTTP handlers
///
/// One consultation surface means at most one session at a time. The slot
/// keeps the most recent session (even after it ends) so the UI can still
/// read the final transcript; starting a new consultation replaces it.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Option<Arc<VoiceSession>>>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
        }
    }
}
