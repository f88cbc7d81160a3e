//! HTML link extraction.

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use super::{CrawlContext, Handler, HandlerError};

/// Extracts followable links from HTML documents.
///
/// Collects `href` attributes from `a`, `area` and `link` elements,
/// resolves them against the page URL, drops fragments, and keeps only
/// http(s) URLs. Register it for `text/html` (or `text` to also cover
/// XHTML served as text).
#[derive(Default)]
pub struct HtmlLinkExtractor;

impl HtmlLinkExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for HtmlLinkExtractor {
    async fn handle(&self, ctx: &CrawlContext<'_>) -> Result<Vec<String>, HandlerError> {
        Ok(extract_links(ctx.url, ctx.body))
    }
}

fn extract_links(base: &Url, body: &[u8]) -> Vec<String> {
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);
    let selector = match Selector::parse("a[href], area[href], link[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}
