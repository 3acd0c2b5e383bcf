/// Failure reported by the Remote Data Service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("user not authenticated")]
    NotAuthenticated,
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("rejected by remote: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether a later attempt could plausibly succeed without changing the data.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

impl From<studysync_infra::HttpError> for RemoteError {
    fn from(err: studysync_infra::HttpError) -> Self {
        use studysync_infra::HttpError;
        match err {
            HttpError::Status { status: 401, .. } => RemoteError::NotAuthenticated,
            HttpError::Status { status: 404, body } => RemoteError::NotFound(body),
            HttpError::Status { status, body } if status < 500 => {
                RemoteError::Rejected(format!("HTTP {status}: {body}"))
            }
            HttpError::Decode(msg) => RemoteError::Decode(msg),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}
