use thiserror::Error;

/// Outcome classification for a failed board-service call.
///
/// This is a sum type that structurally distinguishes "never got an answer"
/// from "got a refusal" from "got garbage", so callers must decide what each
/// one means for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request could not be sent or no response arrived.
    #[error("network error: {0}")]
    Network(String),
    /// A response arrived with a non-success status.
    ///
    /// `detail` is the server's `{"detail": "..."}` string when present, otherwise
    /// the endpoint's generic failure text.
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },
    /// Success status, but the body is not the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }
}

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
