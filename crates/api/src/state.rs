//! Application state shared across handlers.

use std::sync::Arc;

use numwatch_core::{ItemPublisher, JobStore, ResultCache};
use numwatch_worker::{TelegramChecker, WhatsAppChecker};

/// Collaborators the handlers need. Everything is behind an Arc so the
/// state clones cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub cache: Arc<dyn ResultCache>,
    pub publisher: Arc<dyn ItemPublisher>,
    pub wa_checker: Arc<WhatsAppChecker>,
    pub tg_checker: Arc<TelegramChecker>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        cache: Arc<dyn ResultCache>,
        publisher: Arc<dyn ItemPublisher>,
        wa_checker: Arc<WhatsAppChecker>,
        tg_checker: Arc<TelegramChecker>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            wa_checker,
            tg_checker,
        }
    }
}
