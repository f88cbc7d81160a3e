//! Content handlers and dispatch.
//!
//! Handlers inspect a fetched response and return URLs discovered in it.
//! The crawler feeds those URLs back into its queue. Handlers are matched
//! by content type in registration order.

mod html;
mod sitemap;

pub use html::HtmlLinkExtractor;
pub use sitemap::{RobotsSitemapHandler, SitemapXmlHandler};

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// A handler's view of one fetched response. The content type has already
/// been stripped of parameters (everything from the first `;` on).
pub struct CrawlContext<'a> {
    pub url: &'a Url,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Processes one response, returning discovered URL strings.
///
/// Handlers are invoked concurrently for different URLs and must be safe
/// for that; they are borrowed by the engine only for the duration of a
/// dispatch.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &CrawlContext<'_>) -> Result<Vec<String>, HandlerError>;
}

/// Adapter turning a plain closure into a [`Handler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: for<'a, 'b> Fn(&'a CrawlContext<'b>) -> Vec<String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a, 'b> Fn(&'a CrawlContext<'b>) -> Vec<String> + Send + Sync,
{
    async fn handle(&self, ctx: &CrawlContext<'_>) -> Result<Vec<String>, HandlerError> {
        Ok((self.0)(ctx))
    }
}

/// Decides which content types a handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTypeMatcher {
    /// Matches everything (`*`).
    Any,
    /// Matches `T` exactly, or any `T/subtype` when `T` is a bare type
    /// (so `text` matches `text/html`).
    Prefix(String),
    /// Matches content types contained in the list exactly.
    List(Vec<String>),
}

impl ContentTypeMatcher {
    pub fn matches(&self, content_type: &str) -> bool {
        match self {
            ContentTypeMatcher::Any => true,
            ContentTypeMatcher::Prefix(t) => {
                content_type == t
                    || content_type
                        .strip_prefix(t.as_str())
                        .map_or(false, |rest| rest.starts_with('/'))
            }
            ContentTypeMatcher::List(types) => types.iter().any(|t| t == content_type),
        }
    }
}

impl From<&str> for ContentTypeMatcher {
    fn from(s: &str) -> Self {
        if s == "*" {
            ContentTypeMatcher::Any
        } else {
            ContentTypeMatcher::Prefix(s.to_string())
        }
    }
}

impl From<Vec<String>> for ContentTypeMatcher {
    fn from(types: Vec<String>) -> Self {
        ContentTypeMatcher::List(types)
    }
}

impl From<&[&str]> for ContentTypeMatcher {
    fn from(types: &[&str]) -> Self {
        ContentTypeMatcher::List(types.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ContentTypeMatcher {
    fn from(types: [&str; N]) -> Self {
        ContentTypeMatcher::List(types.iter().map(|t| t.to_string()).collect())
    }
}

/// Ordered list of `(matcher, handler)` pairs.
///
/// Dispatch walks the pairs in registration order, concatenating the links
/// each matching handler returns. The first handler failure aborts the
/// remainder of the dispatch. Handlers may be added while a crawl is
/// running; additions take effect on subsequent dispatches.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<Vec<(ContentTypeMatcher, Arc<dyn Handler>)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for content types selected by `matcher`.
    pub fn add<M, H>(&self, matcher: M, handler: H)
    where
        M: Into<ContentTypeMatcher>,
        H: Handler + 'static,
    {
        self.add_arc(matcher.into(), Arc::new(handler));
    }

    pub fn add_arc(&self, matcher: ContentTypeMatcher, handler: Arc<dyn Handler>) {
        let mut entries = self.entries.write().expect("handler registry poisoned");
        entries.push((matcher, handler));
    }

    /// Invoke every handler matching `ctx.content_type`, in registration
    /// order, and concatenate the discovered links.
    pub async fn dispatch(&self, ctx: &CrawlContext<'_>) -> Result<Vec<String>, HandlerError> {
        let matching: Vec<Arc<dyn Handler>> = {
            let entries = self.entries.read().expect("handler registry poisoned");
            entries
                .iter()
                .filter(|(matcher, _)| matcher.matches(ctx.content_type))
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        let mut links = Vec::new();
        for handler in matching {
            links.extend(handler.handle(ctx).await?);
        }
        Ok(links)
    }
}
