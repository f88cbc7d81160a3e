//! Crawl attempt failures.

use thiserror::Error;

use crate::handlers::HandlerError;
use crate::models::ErrorKind;

/// A classified failure of one crawl attempt.
///
/// Every variant maps to a stored [`ErrorKind`] tag; the engine converts
/// these into outcome records rather than surfacing them to callers.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("robots.txt disallows {url}")]
    RobotsNotAllowed { url: String },

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("handler failed: {0}")]
    Handlers(#[from] HandlerError),

    #[error("{0}")]
    Other(String),
}

impl CrawlError {
    /// The taxonomy tag stored with the outcome record.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::RobotsNotAllowed { .. } => ErrorKind::RobotsNotAllowed,
            CrawlError::Http { .. } => ErrorKind::HttpError,
            CrawlError::Request(_) => ErrorKind::RequestError,
            CrawlError::Handlers(_) => ErrorKind::HandlersError,
            CrawlError::Other(_) => ErrorKind::OtherError,
        }
    }

    /// The response status, for failures where one arrived.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            CrawlError::Http { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        CrawlError::Request(err.to_string())
    }
}

impl From<url::ParseError> for CrawlError {
    fn from(err: url::ParseError) -> Self {
        CrawlError::Other(format!("invalid url: {err}"))
    }
}
