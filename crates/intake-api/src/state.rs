//! Application state shared across handlers.

use std::sync::Arc;

use database::Database;
use triage_core::GuardedTriage;

use crate::config::Config;
use crate::notify::{deliver, Notification, Notifier};
use crate::storage::FileStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Database,
    /// Triage classifier with timeout and fallback.
    pub triage: GuardedTriage,
    /// Upload storage.
    pub files: Arc<dyn FileStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        db: Database,
        triage: GuardedTriage,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        Self {
            db,
            triage,
            files,
            notifier,
            config: Arc::new(config),
        }
    }

    /// Send a notification; failures are logged only.
    pub async fn notify(&self, notification: Notification) {
        deliver(self.notifier.as_ref(), notification).await;
    }
}
