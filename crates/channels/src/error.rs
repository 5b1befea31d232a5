use rag_studio_protocol::FrameError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures inside the channel. None of these are returned from the public
/// channel operations; they reach consumers only through `on_error`.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("handshake with {url} timed out")]
    Timeout { url: String },

    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl ChannelError {
    pub fn connect(url: &str, source: impl Into<BoxError>) -> Self {
        Self::Connect {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport(source.into())
    }

    /// A bad URL will fail the same way on every attempt; everything else is
    /// worth another dial.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. })
    }
}
