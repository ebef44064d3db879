use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or unusable configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Completion source failure outside a stage run.
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    /// Protocol failure on the RPC surface.
    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),

    /// Rejected turn input.
    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened.
    #[error("Database connection failed: {message}")]
    Connection {
        /// Underlying driver or filesystem error.
        message: String,
    },

    /// A query failed or returned unreadable data.
    #[error("Query failed: {message}")]
    Query {
        /// Description of the failure.
        message: String,
    },

    /// No turn is stored under the id.
    #[error("Turn not found: {turn_id}")]
    TurnNotFound {
        /// The requested turn id.
        turn_id: String,
    },

    /// Schema migration failed at startup.
    #[error("Migration failed: {message}")]
    Migration {
        /// Migrator error text.
        message: String,
    },

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Raw driver error.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Completion source errors
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Every retry failed.
    #[error("Completion source unavailable: {message} (retries: {retries})")]
    Unavailable {
        /// The last attempt's error.
        message: String,
        /// Attempts made after the first.
        retries: u32,
    },

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// A stream event that is not a completion chunk.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Parse error text.
        message: String,
    },

    /// No response, or no chunk, within the allowed time.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// The limit that elapsed.
        timeout_ms: u64,
    },

    /// The stream broke or reported an error after it opened.
    #[error("Stream interrupted: {message}")]
    Stream {
        /// Transport or server error text.
        message: String,
    },

    /// Transport error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// JSON-RPC protocol errors
#[derive(Debug, Error)]
pub enum RpcError {
    /// The message is not a valid JSON-RPC 2.0 request.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What is malformed.
        message: String,
    },

    /// The method is not served.
    #[error("Unknown method: {method}")]
    UnknownMethod {
        /// The requested method name.
        method: String,
    },

    /// Params are missing, malformed or refer to unknown records.
    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters {
        /// The called method.
        method: String,
        /// What is wrong with the params.
        message: String,
    },

    /// The call was valid but failed while running.
    #[error("Execution failed: {message}")]
    ExecutionFailed {
        /// The underlying error.
        message: String,
    },

    /// A result could not be serialized.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turn pipeline errors
#[derive(Debug, Error)]
pub enum TurnError {
    /// Turn input failed validation.
    #[error("Validation failed: {field} - {reason}")]
    Validation {
        /// The offending input field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A follow-up named a thread with no stored turns.
    #[error("Thread not found: {thread_id}")]
    ThreadNotFound {
        /// The requested thread id.
        thread_id: String,
    },
}

impl CompletionError {
    /// Whether a fresh submission may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Timeout { .. } | CompletionError::Http(_) => true,
            CompletionError::Unavailable { .. }
            | CompletionError::InvalidResponse { .. }
            | CompletionError::Stream { .. } => false,
        }
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        RpcError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for completion source operations
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Result type alias for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;
