//! sitegrazer - polite, extensible web crawler.
//!
//! Seed a queue with URLs, register content handlers, and start the
//! engine: it fetches pages at a controlled rate, respects robots.txt,
//! feeds handler-discovered URLs back into the queue, and records every
//! outcome so crawls can be resumed, or shared across processes through a
//! [`DbUrlList`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sitegrazer::{Crawler, FifoUrlList, HtmlLinkExtractor, UrlList, UrlRecord};
//!
//! # async fn run() {
//! let queue = Arc::new(FifoUrlList::new());
//! queue
//!     .insert_if_not_exists(UrlRecord::new("https://example.com/"))
//!     .await
//!     .unwrap();
//!
//! let crawler = Crawler::builder()
//!     .with_interval(Duration::from_millis(500))
//!     .with_concurrent_requests_limit(2)
//!     .with_url_list(queue)
//!     .build();
//! crawler.add_handler("text/html", HtmlLinkExtractor::new());
//! crawler.start();
//! # }
//! ```

mod crawler;
mod error;
mod handlers;
mod models;
mod queue;
mod robots;

pub use crawler::{
    CrawlEvent, Crawler, CrawlerBuilder, CrawlerConfig, IntervalSetting, RequestOptions, Setting,
    DEFAULT_USER_AGENT,
};
pub use error::CrawlError;
pub use handlers::{
    ContentTypeMatcher, CrawlContext, FnHandler, Handler, HandlerError, HandlerRegistry,
    HtmlLinkExtractor, RobotsSitemapHandler, SitemapXmlHandler,
};
pub use models::{url_hash, ErrorKind, UrlRecord};
pub use queue::{DbUrlList, FifoUrlList, QueueError, UrlList};
pub use robots::{robots_url_for, RobotsCache};
