use thiserror::Error;

/// Result type for executor and pool operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by executors, pools and runtime configuration
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("Executor '{0}' has been shut down")]
    Shutdown(String),

    #[error("Failed to spawn thread '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("Lightweight tasks are not supported: {0}")]
    Unsupported(String),

    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidConfig { key: String, value: String },

    #[error("Task was dropped before producing a result")]
    TaskDropped,
}

impl RuntimeError {
    /// Create a shutdown error for the named executor
    pub fn shutdown(name: impl Into<String>) -> Self {
        Self::Shutdown(name.into())
    }

    pub fn invalid_config(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check if this error means the executor no longer accepts work
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::Unsupported(err.to_string())
    }
}
