//! Typed events emitted while crawling.

/// Observability surface of the engine.
///
/// Events for different in-flight URLs interleave arbitrarily; for one
/// URL the order is `CrawlUrl` → (`Redirect` | `HttpError` |
/// `HandlersError`)* → `Links` → `CrawledUrl`.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// Processing of a URL has begun.
    CrawlUrl { url: String },
    /// A URL's outcome has been determined.
    CrawledUrl {
        url: String,
        error_code: Option<&'static str>,
        status_code: Option<u16>,
        error_message: Option<String>,
    },
    /// The response was a redirect; `location` is the raw header value.
    Redirect { url: String, location: String },
    /// Links discovered for a URL, before enqueueing. Emitted for every
    /// URL; empty when the attempt failed or found none.
    Links { url: String, links: Vec<String> },
    /// The response arrived with a status of 400 or above.
    HttpError { url: String, status: u16 },
    /// A matched handler failed.
    HandlersError { url: String, message: String },
    /// A dequeue found the queue empty.
    UrlListEmpty,
    /// The queue is empty and no requests are in flight.
    UrlListComplete,
}
