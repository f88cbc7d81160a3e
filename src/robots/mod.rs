//! robots.txt caching and allow matching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use robotstxt::DefaultMatcher;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Default lifetime of a cached robots.txt body.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(60 * 60);

/// The canonical robots.txt URL for `url`'s origin, derived from scheme,
/// host and port. `None` for URLs without a host (`data:`, `mailto:`).
pub fn robots_url_for(url: &Url) -> Option<Url> {
    url.host_str()?;
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    Some(robots)
}

/// Test `url` against a robots.txt body for the given user agent.
///
/// An empty body means "no restrictions".
pub fn is_allowed(body: &str, user_agent: &str, url: &Url) -> bool {
    if body.is_empty() {
        return true;
    }
    DefaultMatcher::default().one_agent_allowed_by_robots(body, user_agent, url.as_str())
}

struct CacheEntry {
    body: String,
    expires_at: Instant,
}

/// Per-origin cache of robots.txt bodies with TTL eviction.
///
/// Keys are robots-URLs ([`robots_url_for`]). A cached empty string means
/// the origin imposes no restrictions and is distinct from a miss. Writes
/// are last-writer-wins; concurrent refetches of one origin cost at most
/// one wasted fetch per TTL.
#[derive(Clone)]
pub struct RobotsCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl RobotsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The cached body for `robots_url`, or `None` on a miss. Expired
    /// entries are evicted here rather than by a background sweeper.
    pub async fn get(&self, robots_url: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(robots_url) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    debug!(%robots_url, "robots.txt cache hit");
                    return Some(entry.body.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Stale entry: drop it so the caller refetches.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(robots_url) {
            if entry.expires_at <= Instant::now() {
                entries.remove(robots_url);
            }
        }
        None
    }

    /// Store `body` for `robots_url` for one TTL.
    pub async fn set(&self, robots_url: String, body: String) {
        let mut entries = self.entries.write().await;
        entries.insert(
            robots_url,
            CacheEntry {
                body,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TIME)
    }
}
