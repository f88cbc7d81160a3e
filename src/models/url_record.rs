//! URL records: one URL plus the outcome of its last crawl attempt.

use sha1::{Digest, Sha1};

use super::ErrorKind;

/// Stable dedup key for a URL: the SHA-1 hex digest of the URL string.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// A URL known to the crawler, together with its last recorded outcome.
///
/// Identity is the URL string. Queue backends key records by [`url_hash`]
/// and own the `crawled` dispatch flag; the record itself only carries the
/// outcome fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Absolute URL string.
    pub url: String,
    /// HTTP status of the last fetch, when a response arrived.
    pub status_code: Option<u16>,
    /// Failure classification of the last attempt; `None` means success.
    pub error_kind: Option<ErrorKind>,
    /// Free-text message accompanying a failure.
    pub error_message: Option<String>,
    /// Cumulative failure count across attempts.
    pub num_errors: u32,
}

impl UrlRecord {
    /// A fresh, never-attempted record for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: None,
            error_kind: None,
            error_message: None,
            num_errors: 0,
        }
    }

    /// A successful outcome carrying the response status.
    pub fn success(url: impl Into<String>, status_code: u16) -> Self {
        Self {
            url: url.into(),
            status_code: Some(status_code),
            error_kind: None,
            error_message: None,
            num_errors: 0,
        }
    }

    /// A failed outcome. `status_code` is set when a response arrived
    /// (HTTP errors record their status).
    pub fn failure(
        url: impl Into<String>,
        kind: ErrorKind,
        status_code: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            status_code,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            num_errors: 1,
        }
    }

    /// Dedup key for this record's URL.
    pub fn hash(&self) -> String {
        url_hash(&self.url)
    }

    /// True when the last attempt completed without a classified failure.
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}
