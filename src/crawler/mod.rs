//! The crawl engine.
//!
//! A [`Crawler`] runs a pool of tick chains. Each chain claims the next
//! allowed request-start slot, dequeues a URL, runs it through the
//! processing pipeline (robots check, fetch, redirect-or-dispatch), and
//! records the outcome back into the queue.

mod config;
mod events;
mod process;

pub use config::{CrawlerConfig, IntervalSetting, RequestOptions, Setting, DEFAULT_USER_AGENT};
pub use events::CrawlEvent;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use url::Url;

use crate::handlers::{ContentTypeMatcher, Handler, HandlerRegistry};
use crate::queue::{FifoUrlList, QueueError, UrlList};
use crate::robots::RobotsCache;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// State shared by every tick chain.
struct EngineState {
    started: AtomicBool,
    outstanding_requests: AtomicUsize,
    /// Instant of the most recent request start, across all chains.
    last_request_start: Mutex<Option<Instant>>,
}

/// Configures and creates a [`Crawler`].
pub struct CrawlerBuilder {
    config: CrawlerConfig,
    url_list: Option<Arc<dyn UrlList>>,
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
            url_list: None,
        }
    }

    /// Minimum gap between request starts.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.config.interval = IntervalSetting::Fixed(interval);
        self
    }

    /// Produce the pacing interval fresh for every tick.
    pub fn with_dynamic_interval<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        self.config.interval = IntervalSetting::Computed(Arc::new(f));
        self
    }

    /// Number of tick chains, i.e. maximum in-flight requests.
    pub fn with_concurrent_requests_limit(mut self, limit: usize) -> Self {
        self.config.concurrent_requests_limit = limit.max(1);
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = Setting::Fixed(user_agent.into());
        self
    }

    /// Choose the user agent per URL.
    pub fn with_user_agent_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url) -> String + Send + Sync + 'static,
    {
        self.config.user_agent = Setting::Computed(Arc::new(f));
        self
    }

    /// Per-request timeout merged into every fetch.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request.timeout = Some(timeout);
        self
    }

    /// Extra headers merged into every fetch.
    pub fn with_request_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.config.request.headers = headers;
        self
    }

    /// Response body cap in bytes; zero means unlimited.
    pub fn with_max_content_length(mut self, limit: u64) -> Self {
        self.config.max_content_length = Setting::Fixed(limit);
        self
    }

    /// Choose the body cap per URL.
    pub fn with_max_content_length_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url) -> u64 + Send + Sync + 'static,
    {
        self.config.max_content_length = Setting::Computed(Arc::new(f));
        self
    }

    /// Enable or disable robots.txt handling.
    pub fn with_robots_enabled(mut self, enabled: bool) -> Self {
        self.config.robots_enabled = enabled;
        self
    }

    /// Lifetime of cached robots.txt bodies.
    pub fn with_robots_cache_time(mut self, ttl: Duration) -> Self {
        self.config.robots_cache_time = ttl;
        self
    }

    /// When false, a 500 from `/robots.txt` blocks that origin.
    pub fn with_robots_ignore_server_error(mut self, ignore: bool) -> Self {
        self.config.robots_ignore_server_error = ignore;
        self
    }

    /// Queue backend. Defaults to an in-memory [`FifoUrlList`].
    pub fn with_url_list(mut self, url_list: Arc<dyn UrlList>) -> Self {
        self.url_list = Some(url_list);
        self
    }

    pub fn build(self) -> Crawler {
        let client = Client::builder()
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()
            .expect("failed to build HTTP client");

        // The only place redirects are followed is the robots.txt fetch.
        let robots_client = Client::builder()
            .gzip(true)
            .brotli(true)
            .build()
            .expect("failed to build HTTP client");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Crawler {
            robots_cache: RobotsCache::new(self.config.robots_cache_time),
            url_list: self
                .url_list
                .unwrap_or_else(|| Arc::new(FifoUrlList::new())),
            handlers: Arc::new(HandlerRegistry::new()),
            state: Arc::new(EngineState {
                started: AtomicBool::new(false),
                outstanding_requests: AtomicUsize::new(0),
                last_request_start: Mutex::new(None),
            }),
            config: self.config,
            client,
            robots_client,
            events,
        }
    }
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Polite, extensible crawl engine.
///
/// Cloning is cheap and shares all state; [`Crawler::start`] clones one
/// handle per tick chain.
#[derive(Clone)]
pub struct Crawler {
    config: CrawlerConfig,
    client: Client,
    robots_client: Client,
    url_list: Arc<dyn UrlList>,
    handlers: Arc<HandlerRegistry>,
    robots_cache: RobotsCache,
    state: Arc<EngineState>,
    events: broadcast::Sender<CrawlEvent>,
}

impl Crawler {
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::new()
    }

    /// An engine with default configuration and an in-memory queue.
    pub fn new() -> Self {
        CrawlerBuilder::new().build()
    }

    /// The queue backend; seed URLs go in through this.
    pub fn url_list(&self) -> Arc<dyn UrlList> {
        Arc::clone(&self.url_list)
    }

    /// Register a handler for content types selected by `matcher`.
    /// Registration while a crawl runs takes effect on later dispatches.
    pub fn add_handler<M, H>(&self, matcher: M, handler: H)
    where
        M: Into<ContentTypeMatcher>,
        H: Handler + 'static,
    {
        self.handlers.add(matcher, handler);
    }

    /// Subscribe to the engine's event stream. Slow subscribers lose
    /// events rather than slowing the crawl.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Spawn the tick chains. Must be called within a tokio runtime; a
    /// second call while running is a no-op.
    pub fn start(&self) {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            chains = self.config.concurrent_requests_limit,
            "starting crawl"
        );
        for chain in 0..self.config.concurrent_requests_limit {
            let worker = self.clone();
            tokio::spawn(async move { worker.run_chain(chain).await });
        }
    }

    /// Halt future dequeues. In-flight work runs to completion; callers
    /// wanting hard cancellation set a request timeout instead.
    pub fn stop(&self) {
        info!("stopping crawl");
        self.state.started.store(false, Ordering::SeqCst);
    }

    fn emit(&self, event: CrawlEvent) {
        // Fire-and-forget; having no subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Claim the next request-start slot, or report how long to wait.
    ///
    /// The write to `last_request_start` happens under the same lock
    /// acquisition as the read, so concurrent chains can never observe
    /// the same stale start time and fire simultaneously.
    fn pacing_wait(&self, interval: Duration) -> Option<Duration> {
        let mut last = self
            .state
            .last_request_start
            .lock()
            .expect("pacing lock poisoned");
        let now = Instant::now();
        match *last {
            Some(prev) if prev + interval > now => Some(prev + interval - now),
            _ => {
                *last = Some(now);
                None
            }
        }
    }

    async fn run_chain(self, chain: usize) {
        debug!(chain, "tick chain started");
        loop {
            if !self.state.started.load(Ordering::SeqCst) {
                break;
            }
            let interval = self.config.interval.resolve();

            if let Some(wait) = self.pacing_wait(interval) {
                tokio::time::sleep(wait).await;
                continue;
            }

            match self.url_list.get_next_url().await {
                Ok(record) => {
                    self.state
                        .outstanding_requests
                        .fetch_add(1, Ordering::SeqCst);
                    let recorded = match self.process_url(record).await {
                        Ok(outcome) => self.url_list.upsert(outcome).await,
                        Err(err) => Err(err),
                    };
                    self.state
                        .outstanding_requests
                        .fetch_sub(1, Ordering::SeqCst);
                    if let Err(err) = recorded {
                        error!(chain, %err, "queue failure, stopping tick chain");
                        break;
                    }
                }
                Err(QueueError::Empty) => {
                    self.emit(CrawlEvent::UrlListEmpty);
                    if self.state.outstanding_requests.load(Ordering::SeqCst) == 0 {
                        self.emit(CrawlEvent::UrlListComplete);
                    }
                    tokio::time::sleep(interval).await;
                }
                Err(err) => {
                    error!(chain, %err, "queue failure, stopping tick chain");
                    break;
                }
            }
        }
        debug!(chain, "tick chain stopped");
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pacing_slots_are_spaced_by_the_interval() {
        let crawler = Crawler::builder()
            .with_interval(Duration::from_millis(200))
            .build();
        let interval = Duration::from_millis(200);

        // First claim wins immediately.
        assert_eq!(crawler.pacing_wait(interval), None);

        // A second claim right away has to wait close to a full interval.
        let wait = crawler.pacing_wait(interval).expect("should be told to wait");
        assert!(wait <= interval);
        assert!(wait >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn start_twice_is_a_noop() {
        let crawler = Crawler::builder()
            .with_interval(Duration::from_millis(10))
            .build();
        crawler.start();
        assert!(crawler.is_started());
        crawler.start();
        crawler.stop();
        assert!(!crawler.is_started());
    }
}
