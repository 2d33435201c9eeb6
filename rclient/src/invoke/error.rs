//! Invocation error types.

use super::Method;

/// Error type for remote method calls.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// The node could not be reached or answered with a server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call was deployed but its reply never appeared.
    #[error("no reply after {attempts} polls")]
    Timeout {
        /// Number of polls made before giving up.
        attempts: u32,
    },

    /// The node refused the deploy carrying the call.
    #[error("call rejected by node: {0}")]
    Rejected(String),

    /// The contract ran and reported a failure (`{"!": message}`).
    #[error("remote failure: {0}")]
    Remote(String),

    /// The reply does not follow the envelope convention.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An argument or address cannot be written into a deploy term.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A rewrite hook could not produce the final arguments.
    #[error("could not prepare {method} arguments: {message}")]
    Rewrite {
        /// Method whose arguments were being rewritten.
        method: Method,
        /// Why the rewrite failed.
        message: String,
    },
}

impl InvokeError {
    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a rejection error.
    #[must_use]
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a remote failure.
    #[must_use]
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a rewrite error.
    #[must_use]
    pub fn rewrite(method: Method, message: impl Into<String>) -> Self {
        Self::Rewrite {
            method,
            message: message.into(),
        }
    }

    /// Whether retrying the call might succeed.
    ///
    /// Remote failures are final: the contract already ran.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for InvokeError {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(InvokeError::transport("reset").is_retryable());
        assert!(InvokeError::Timeout { attempts: 1 }.is_retryable());
        assert!(!InvokeError::remote("no such wallet").is_retryable());
        assert!(!InvokeError::rewrite(Method::Claim, "no names").is_retryable());
        assert!(!InvokeError::invalid_argument("`").is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            InvokeError::remote("insufficient funds").to_string(),
            "remote failure: insufficient funds"
        );
        assert_eq!(
            InvokeError::rewrite(Method::PublishRegistered, "missing uri").to_string(),
            "could not prepare publishRegistered arguments: missing uri"
        );
    }
}
