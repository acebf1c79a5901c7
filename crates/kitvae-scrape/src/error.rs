//! Error types for the catalog scraper.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while scraping.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The request could not be sent or the body not read.
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// An item page has no title.
    #[error("No title found on {url}")]
    MissingTitle { url: String },

    /// An item page has no product image.
    #[error("No product image found on {url}")]
    MissingImage { url: String },

    /// Writing a downloaded file failed.
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A specialized `Result` type for scraping.
pub type ScrapeResult<T> = Result<T, ScrapeError>;
