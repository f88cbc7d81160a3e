//! Sitemap discovery handlers.

use async_trait::async_trait;

use super::{CrawlContext, Handler, HandlerError};

/// Extracts `Sitemap:` directives from robots.txt bodies.
///
/// The engine enqueues every origin's robots-URL while populating its
/// robots cache, so registering this for `text/plain` turns those fetches
/// into sitemap discovery.
#[derive(Default)]
pub struct RobotsSitemapHandler;

impl RobotsSitemapHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for RobotsSitemapHandler {
    async fn handle(&self, ctx: &CrawlContext<'_>) -> Result<Vec<String>, HandlerError> {
        if ctx.url.path() != "/robots.txt" {
            return Ok(Vec::new());
        }
        let body = String::from_utf8_lossy(ctx.body);
        Ok(sitemap_directives(&body))
    }
}

fn sitemap_directives(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            line.get(..8)
                .filter(|prefix| prefix.eq_ignore_ascii_case("sitemap:"))
                .map(|_| line[8..].trim().to_string())
        })
        .filter(|url| !url.is_empty())
        .collect()
}

/// Extracts `<loc>` values from sitemap XML.
///
/// Handles both `urlset` documents (page URLs) and `sitemapindex`
/// documents (nested sitemap URLs; the engine crawls those like any other
/// discovered link). Register it for the sitemap content types, typically
/// `["application/xml", "text/xml"]`.
///
/// Sitemaps lean on XML namespaces, which HTML-oriented parsers mangle, so
/// extraction scans for `<loc>` elements directly and unescapes the five
/// XML entities.
#[derive(Default)]
pub struct SitemapXmlHandler;

impl SitemapXmlHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for SitemapXmlHandler {
    async fn handle(&self, ctx: &CrawlContext<'_>) -> Result<Vec<String>, HandlerError> {
        let body = String::from_utf8_lossy(ctx.body);
        Ok(extract_locs(&body))
    }
}

fn extract_locs(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<loc>") {
        rest = &rest[start + 5..];
        let Some(end) = rest.find("</loc>") else {
            break;
        };
        let loc = xml_unescape(rest[..end].trim());
        if !loc.is_empty() {
            locs.push(loc);
        }
        rest = &rest[end + 6..];
    }
    locs
}

fn xml_unescape(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
