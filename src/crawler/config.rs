//! Engine configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use url::Url;

use crate::robots;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_CONCURRENT_REQUESTS_LIMIT: usize = 5;
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; sitegrazer/1.0; +https://github.com/sitegrazer)";

/// A per-URL option: a fixed value or a producer consulted per request.
pub enum Setting<T> {
    Fixed(T),
    Computed(Arc<dyn Fn(&Url) -> T + Send + Sync>),
}

impl<T: Clone> Setting<T> {
    pub fn resolve(&self, url: &Url) -> T {
        match self {
            Setting::Fixed(value) => value.clone(),
            Setting::Computed(f) => f(url),
        }
    }
}

impl<T> Clone for Setting<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Setting::Fixed(value) => Setting::Fixed(value.clone()),
            Setting::Computed(f) => Setting::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Setting::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// The pacing interval: fixed, or produced fresh for every tick.
pub enum IntervalSetting {
    Fixed(Duration),
    Computed(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl IntervalSetting {
    pub fn resolve(&self) -> Duration {
        match self {
            IntervalSetting::Fixed(value) => *value,
            IntervalSetting::Computed(f) => f(),
        }
    }
}

impl Clone for IntervalSetting {
    fn clone(&self) -> Self {
        match self {
            IntervalSetting::Fixed(value) => IntervalSetting::Fixed(*value),
            IntervalSetting::Computed(f) => IntervalSetting::Computed(Arc::clone(f)),
        }
    }
}

impl fmt::Debug for IntervalSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalSetting::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            IntervalSetting::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Extra transport options merged into every request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub headers: HeaderMap,
}

/// Resolved engine configuration. Built through
/// [`CrawlerBuilder`](super::CrawlerBuilder).
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Minimum gap between request starts, across all tick chains.
    pub interval: IntervalSetting,
    /// Number of tick chains, i.e. maximum in-flight requests.
    pub concurrent_requests_limit: usize,
    /// User agent sent with every request and tested against robots.txt.
    pub user_agent: Setting<String>,
    /// Extra per-request transport options.
    pub request: RequestOptions,
    /// Response body cap in bytes; zero means unlimited.
    pub max_content_length: Setting<u64>,
    /// When false, robots.txt is never consulted.
    pub robots_enabled: bool,
    /// Lifetime of cached robots.txt bodies.
    pub robots_cache_time: Duration,
    /// When false, a 500 from `/robots.txt` blocks that origin.
    pub robots_ignore_server_error: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            interval: IntervalSetting::Fixed(DEFAULT_INTERVAL),
            concurrent_requests_limit: DEFAULT_CONCURRENT_REQUESTS_LIMIT,
            user_agent: Setting::Fixed(DEFAULT_USER_AGENT.to_string()),
            request: RequestOptions::default(),
            max_content_length: Setting::Fixed(0),
            robots_enabled: true,
            robots_cache_time: robots::DEFAULT_CACHE_TIME,
            robots_ignore_server_error: true,
        }
    }
}
