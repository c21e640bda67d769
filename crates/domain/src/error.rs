/// Shared error type used across all chatkit crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// A request field is out of range or malformed. Raised before any
    /// state is created.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A referenced entity (agent, conversation, message) does not exist
    /// or is not visible to the caller.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("deployment: {0}")]
    Deployment(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
