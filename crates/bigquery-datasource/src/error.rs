use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Failed to open connection: {0}")]
    HandleOpen(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<Self>,
    },
}

impl Error {
    /// Wrap the error with a message naming the step that failed.
    #[must_use]
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context layers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self.root(), Self::Config(_))
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.root(), Self::Transport(_))
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self.root(),
            Self::Remote(_) | Self::HandleOpen(_) | Self::Api { .. }
        )
    }

    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.root(), Self::InvalidArgument(_))
    }

    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }

    pub(crate) fn remote(err: &reqwest::Error) -> Self {
        Self::Remote(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach step context to the error side of a `Result`.
pub trait ResultExt<T> {
    fn context(self, message: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: &str) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}
