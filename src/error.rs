//! Error types for page extraction, retrieval and document assembly

use thiserror::Error;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting, downloading or binding pages
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start a rendering backend
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// The rendered document became unreachable or a DOM step failed
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration (bad selector, bad base URL, ...)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Extraction of a single target page failed
    #[error("Extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: Box<Error>,
    },

    /// Document assembly was asked to bind zero images
    #[error("No images provided")]
    EmptyDocument,

    /// Failed to decode or embed an image
    #[error("Image error: {0}")]
    ImageError(String),

    /// Failed to write the output document
    #[error("PDF error: {0}")]
    PdfError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chrome failed to evaluate a script in the page
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap `self` as the cause of a failed extraction of `url`.
    ///
    /// An error that is already an extraction failure is returned unchanged.
    pub fn for_page(self, url: &str) -> Error {
        match self {
            Error::Extraction { .. } => self,
            other => Error::Extraction {
                url: url.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Whether this error (or the cause it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Extraction { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::ConfigError(format!("invalid URL: {}", err))
    }
}
