use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewerError {
    #[error("link is empty")]
    Validation,

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Task(String),

    #[error("{0}")]
    Timeout(String),

    #[error("image unavailable: {0}")]
    ImageLoad(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The operation was superseded or torn down before it finished.
    #[error("aborted")]
    Aborted,
}

impl ViewerError {
    /// Storage failures and aborts are logged only.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ViewerError::Storage(_) | ViewerError::Aborted)
    }
}

impl From<reqwest::Error> for ViewerError {
    fn from(err: reqwest::Error) -> Self {
        ViewerError::Network(err.to_string())
    }
}

impl From<std::io::Error> for ViewerError {
    fn from(err: std::io::Error) -> Self {
        ViewerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerError::Storage(err.to_string())
    }
}
