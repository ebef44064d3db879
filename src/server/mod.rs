//! Server module for the stdio JSON-RPC surface.
//!
//! This module provides:
//! - JSON-RPC 2.0 request/response handling over stdio
//! - Method routing to the turn controller and store
//! - Turn events written as JSON-RPC notifications
//! - Shared application state

mod handlers;
mod notifier;
mod rpc;

pub use handlers::{handle_call, Dispatch, ThreadView, TurnStarted};
pub use notifier::{
    JsonRpcNotification, Outbound, OutboundMessage, StdioNotifier, DONE_METHOD, PROGRESS_METHOD,
};
pub use rpc::{error_code, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcServer, METHODS};

use std::sync::Arc;

use crate::config::Config;
use crate::storage::TurnStore;
use crate::turns::TurnController;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Turn persistence.
    pub storage: Arc<dyn TurnStore>,
    /// Runs turn pipelines.
    pub controller: TurnController,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, controller: TurnController) -> Self {
        tracing::info!(
            answer_model = %config.models.answer.model,
            pseudocode_model = %config.models.pseudocode.model,
            suggestions_model = %config.models.suggestions.model,
            "AppState initializing with model configuration"
        );

        Self {
            config,
            storage: controller.core().store().clone(),
            controller,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
