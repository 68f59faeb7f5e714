use modelshop_common::order::OrderAction;

/// Failures while reading a chat event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed stream payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("not signed in")]
    NotSignedIn,
    #[error("{} is not available while the order is {status}", .action.label())]
    ActionUnavailable { action: OrderAction, status: String },
    #[error("action was not confirmed")]
    Declined,
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ApiError {
    /// Text suitable for an inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            ApiError::Status { status, .. } => format!("The server answered with status {status}."),
            ApiError::Transport(_) | ApiError::Stream(_) => {
                "Could not reach the server. Check your connection.".to_string()
            }
            ApiError::NotSignedIn => "Please sign in to continue.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. } | ApiError::NotSignedIn)
    }
}
