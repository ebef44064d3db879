//! Collaborators shared by every turn.

use std::sync::Arc;

use crate::completion::CompletionSource;
use crate::orchestrator::Notifier;
use crate::storage::TurnStore;

/// Completion source, store and notifier a turn runs against.
///
/// Cheap to clone; every field is shared.
///
/// # Example
///
/// ```ignore
/// let core = TurnCore::new(
///     Arc::new(CompletionClient::new(&config.completion, config.request.clone())?),
///     Arc::new(SqliteStorage::new(&config.database).await?),
///     Arc::new(NullNotifier),
/// );
/// let controller = TurnController::new(core, config.models.clone(), idle_timeout);
/// ```
#[derive(Clone)]
pub struct TurnCore {
    source: Arc<dyn CompletionSource>,
    store: Arc<dyn TurnStore>,
    notifier: Arc<dyn Notifier>,
}

impl TurnCore {
    /// Create a new turn core.
    pub fn new(
        source: Arc<dyn CompletionSource>,
        store: Arc<dyn TurnStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
        }
    }

    /// Completion source for stage runs.
    #[inline]
    pub fn source(&self) -> &Arc<dyn CompletionSource> {
        &self.source
    }

    /// Turn persistence.
    #[inline]
    pub fn store(&self) -> &Arc<dyn TurnStore> {
        &self.store
    }

    /// Progress sink.
    #[inline]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }
}
