/// Errors produced while joining a room or exchanging signaling messages.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The server answered with a status this client does not handle.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("room is full")]
    RoomFull,

    /// A variable the room page must define was not found.
    #[error("missing '{0}' in room page")]
    MissingVariable(String),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A scraped value was present but had the wrong shape.
    #[error("malformed '{name}': {reason}")]
    MalformedParameter { name: String, reason: String },

    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),

    #[error("peer connection error: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("internal lock poisoned")]
    LockPoisoned,

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl SignalingError {
    pub(crate) fn malformed(name: &str, reason: impl ToString) -> Self {
        Self::MalformedParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type SResult<T> = Result<T, SignalingError>;
