//! Outcome classification for crawl attempts.

/// Classification of a failed crawl attempt, stored with the URL record.
///
/// A record with no kind means the last attempt succeeded: the response
/// arrived with a status below 400 and every matched handler completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// robots.txt policy disallows the URL, or the robots fetch returned
    /// a 500 while server errors are treated as blocking.
    RobotsNotAllowed,
    /// The response arrived with a status of 400 or above.
    HttpError,
    /// Transport-level failure: DNS, connect, TLS, read, oversized body.
    RequestError,
    /// A matched handler failed while processing the response.
    HandlersError,
    /// Any failure not classified above.
    OtherError,
}

impl ErrorKind {
    /// Stable tag stored in durable queues.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RobotsNotAllowed => "ROBOTS_NOT_ALLOWED",
            ErrorKind::HttpError => "HTTP_ERROR",
            ErrorKind::RequestError => "REQUEST_ERROR",
            ErrorKind::HandlersError => "HANDLERS_ERROR",
            ErrorKind::OtherError => "OTHER_ERROR",
        }
    }

    /// Parse a stored tag back into a kind. Unknown tags collapse into
    /// [`ErrorKind::OtherError`] so old databases keep loading.
    pub fn from_str(s: &str) -> Self {
        match s {
            "ROBOTS_NOT_ALLOWED" => ErrorKind::RobotsNotAllowed,
            "HTTP_ERROR" => ErrorKind::HttpError,
            "REQUEST_ERROR" => ErrorKind::RequestError,
            "HANDLERS_ERROR" => ErrorKind::HandlersError,
            _ => ErrorKind::OtherError,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
