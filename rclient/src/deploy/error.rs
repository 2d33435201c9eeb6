//! Deployment error types.

/// Error type for module submission.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum DeployError {
    /// The node could not be reached or answered with a server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The deploy was accepted but its result never appeared.
    #[error("no result after {attempts} polls")]
    Timeout {
        /// Number of polls made before giving up.
        attempts: u32,
    },

    /// The node refused to compile a source.
    #[error("compile error in {module}: {message}")]
    Compile {
        /// Name of the offending source.
        module: String,
        /// Error text reported by the node.
        message: String,
    },

    /// The node rejected the deploy for a non-syntax reason.
    #[error("deploy rejected: {0}")]
    Rejected(String),

    /// The node answered with something that does not fit the deploy API.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DeployError {
    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a compile error for a named source.
    #[must_use]
    pub fn compile(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create a rejection error.
    #[must_use]
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether retrying the whole submission might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport("request timed out".to_owned())
        } else if err.is_connect() {
            Self::Transport(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Protocol(format!("undecodable response: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
