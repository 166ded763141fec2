//! Error types for colloquy.

use thiserror::Error;

/// Primary error type for all colloquy operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// A required call parameter or configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage connect error: {0}")]
    StorageConnect(String),

    #[error("Storage write error: {0}")]
    StorageWrite(String),

    #[error("Storage read error: {0}")]
    StorageRead(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Agent resolution error: {0}")]
    AgentResolution(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Resolution,
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Serialization,
    ToolExecution,
    Unknown,
}

impl ColloquyError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::StorageConnect(_) | Self::StorageWrite(_) | Self::StorageRead(_) => {
                ErrorCategory::Storage
            }
            Self::Database(_) => ErrorCategory::Storage,
            #[cfg(feature = "redis")]
            Self::Redis(_) => ErrorCategory::Storage,
            Self::ProviderNotFound(_) | Self::AgentResolution(_) => ErrorCategory::Resolution,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Stream(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        )
    }

    /// Whether this error must stop process startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::StorageConnect(_)
                | Self::ProviderNotFound(_)
                | Self::AgentResolution(_)
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;
