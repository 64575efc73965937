use std::process::ExitStatus;

/// Result alias used throughout the crate.
pub type FramecastResult<T> = Result<T, FramecastError>;

/// Error taxonomy for graph building, encoding sessions and frame extraction.
#[derive(thiserror::Error, Debug)]
pub enum FramecastError {
    /// A config value is structurally invalid.
    #[error("validation error: {0}")]
    Validation(String),

    /// A call violated an orchestration rule (for example a second concurrent session).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The encoder exited unsuccessfully.
    #[error("encoder process failed ({status}): {stderr}")]
    Process {
        /// Exit status as reported by the OS.
        status: ExitStatus,
        /// Captured standard error, untrimmed.
        stderr: String,
    },

    /// A frame extraction failed. Shared by every coalesced waiter of the same key.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The session was cancelled before the encoder finished.
    #[error("encoding session cancelled")]
    Cancelled,

    /// Spawning, piping or filesystem failure.
    #[error("io error: {0}")]
    Io(String),

    /// Config (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Anything else, with context attached.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecastError {
    /// Build a [`FramecastError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FramecastError::Configuration`].
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`FramecastError::Extraction`].
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Build a [`FramecastError::Io`].
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Build a [`FramecastError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Captured encoder stderr, when this is a process failure.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Process { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// `true` for [`FramecastError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
