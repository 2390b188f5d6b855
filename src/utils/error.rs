use thiserror::Error;

pub const WAMP_INVALID_ARGUMENT: &str = "wamp.error.invalid_argument";
pub const WAMP_RUNTIME_ERROR: &str = "wamp.error.runtime_error";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("Cannot serialize; serializer is not bound to a model instance")]
    NotInstantiated,

    #[error("'{field}' is not a column of {model}")]
    UnknownField { model: String, field: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid row: {message}")]
    InvalidRow { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Router protocol error: {message}")]
    Protocol { message: String },

    #[error("Router aborted the session: {reason}")]
    Aborted { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

impl ServiceError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Error URI relayed to the remote caller when an invocation fails.
    pub fn wamp_error_uri(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => WAMP_INVALID_ARGUMENT,
            _ => WAMP_RUNTIME_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
