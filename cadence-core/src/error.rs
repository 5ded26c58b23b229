use std::fmt;

/// Result type alias for cadence core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cadence core operations
#[derive(Debug)]
pub enum Error {
    /// I/O errors
    Io(std::io::Error),

    /// Errors reported by the session transport
    Transport(cadence_transport::Error),

    /// Configuration errors
    Config(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Transport(e) => write!(f, "Transport error: {e}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Config(format!("{err:#}"))
    }
}

impl From<cadence_transport::Error> for Error {
    fn from(err: cadence_transport::Error) -> Self {
        match err {
            cadence_transport::Error::Io(e) => Error::Io(e),
            other => Error::Transport(other),
        }
    }
}
