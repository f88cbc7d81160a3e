//! Per-URL processing pipeline.
//!
//! robots check → fetch → redirect-or-dispatch → outcome. Classified
//! failures become outcome records here; queue failures propagate to the
//! tick loop, which treats them as fatal for its chain.

use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use super::{CrawlEvent, Crawler};
use crate::error::CrawlError;
use crate::handlers::CrawlContext;
use crate::models::UrlRecord;
use crate::queue::QueueError;
use crate::robots;

/// Splits pipeline failures into the two propagation channels.
enum PipelineFailure {
    /// Converted into an outcome record.
    Classified(CrawlError),
    /// Fatal for the tick chain.
    Queue(QueueError),
}

impl From<CrawlError> for PipelineFailure {
    fn from(err: CrawlError) -> Self {
        PipelineFailure::Classified(err)
    }
}

impl From<QueueError> for PipelineFailure {
    fn from(err: QueueError) -> Self {
        PipelineFailure::Queue(err)
    }
}

enum Fetched {
    Redirect {
        status: u16,
        location: Option<String>,
    },
    Content {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },
}

impl Crawler {
    /// Run one URL through the pipeline and build its outcome record.
    pub(super) async fn process_url(
        &self,
        record: UrlRecord,
    ) -> Result<UrlRecord, QueueError> {
        let url = record.url;
        self.emit(CrawlEvent::CrawlUrl { url: url.clone() });

        let (outcome, links) = match self.crawl_url(&url).await {
            Ok((status, links)) => (UrlRecord::success(url.clone(), status), links),
            Err(PipelineFailure::Queue(err)) => return Err(err),
            Err(PipelineFailure::Classified(err)) => {
                debug!(%url, error = %err, "crawl attempt failed");
                let outcome =
                    UrlRecord::failure(url.clone(), err.kind(), err.status_code(), err.to_string());
                // Failed attempts contribute no links, but still pass
                // through the links event before their outcome.
                (outcome, Vec::new())
            }
        };

        self.emit(CrawlEvent::Links {
            url: url.clone(),
            links: links.clone(),
        });
        if !links.is_empty() {
            let records = links.into_iter().map(UrlRecord::new).collect();
            self.url_list.insert_if_not_exists_bulk(records).await?;
        }

        self.emit(CrawlEvent::CrawledUrl {
            url,
            error_code: outcome.error_kind.map(|kind| kind.as_str()),
            status_code: outcome.status_code,
            error_message: outcome.error_message.clone(),
        });
        Ok(outcome)
    }

    async fn crawl_url(&self, url_str: &str) -> Result<(u16, Vec<String>), PipelineFailure> {
        let url = Url::parse(url_str).map_err(CrawlError::from)?;
        let user_agent = self.config.user_agent.resolve(&url);

        if self.config.robots_enabled {
            self.check_robots(&url, &user_agent).await?;
        }

        match self.fetch(&url, &user_agent).await? {
            Fetched::Redirect { status, location } => {
                let location = location.unwrap_or_default();
                self.emit(CrawlEvent::Redirect {
                    url: url_str.to_string(),
                    location: location.clone(),
                });
                // The destination, resolved against the request URL, is
                // the sole discovered link; redirects are never followed
                // in place.
                let links = match url.join(&location) {
                    Ok(destination) if !location.is_empty() => vec![destination.to_string()],
                    _ => Vec::new(),
                };
                Ok((status, links))
            }
            Fetched::Content {
                status,
                content_type,
                body,
            } => {
                let full_type = content_type
                    .unwrap_or_else(|| guess_content_type(&url).to_string());
                let content_type = strip_type_parameters(&full_type);
                let ctx = CrawlContext {
                    url: &url,
                    content_type,
                    body: &body,
                };
                let links = match self.handlers.dispatch(&ctx).await {
                    Ok(links) => links,
                    Err(err) => {
                        self.emit(CrawlEvent::HandlersError {
                            url: url_str.to_string(),
                            message: err.to_string(),
                        });
                        return Err(CrawlError::Handlers(err).into());
                    }
                };
                Ok((status, links))
            }
        }
    }

    async fn check_robots(&self, url: &Url, user_agent: &str) -> Result<(), PipelineFailure> {
        // URLs without a host have no robots.txt to consult.
        let Some(robots_url) = robots::robots_url_for(url) else {
            return Ok(());
        };

        let body = match self.robots_cache.get(robots_url.as_str()).await {
            Some(body) => body,
            None => self.fetch_robots_body(&robots_url, user_agent).await?,
        };

        if robots::is_allowed(&body, user_agent, url) {
            Ok(())
        } else {
            Err(CrawlError::RobotsNotAllowed {
                url: url.to_string(),
            }
            .into())
        }
    }

    /// Fetch and cache an origin's robots.txt. Failures other than the
    /// strict-500 case are swallowed: an unreachable robots.txt must not
    /// stop the crawl.
    async fn fetch_robots_body(
        &self,
        robots_url: &Url,
        user_agent: &str,
    ) -> Result<String, PipelineFailure> {
        // Queue the robots URL itself, so a text/plain handler can mine
        // it for Sitemap directives.
        self.url_list
            .insert_if_not_exists(UrlRecord::new(robots_url.as_str()))
            .await?;

        let mut request = self
            .robots_client
            .get(robots_url.clone())
            .header(USER_AGENT, user_agent);
        if let Some(timeout) = self.config.request.timeout {
            request = request.timeout(timeout);
        }
        if !self.config.request.headers.is_empty() {
            request = request.headers(self.config.request.headers.clone());
        }

        let body = match request.send().await {
            Ok(response) if response.status().as_u16() == 500 => {
                if self.config.robots_ignore_server_error {
                    debug!(%robots_url, "robots.txt returned 500, treating as permissive");
                    String::new()
                } else {
                    // Leave the cache empty so a later attempt refetches.
                    return Err(CrawlError::RobotsNotAllowed {
                        url: robots_url.to_string(),
                    }
                    .into());
                }
            }
            Ok(response) if response.status().is_success() => {
                match response.text().await {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(%robots_url, %err, "failed to read robots.txt body");
                        String::new()
                    }
                }
            }
            Ok(response) => {
                debug!(
                    %robots_url,
                    status = response.status().as_u16(),
                    "robots.txt unavailable, treating as permissive"
                );
                String::new()
            }
            Err(err) => {
                warn!(%robots_url, %err, "robots.txt fetch failed, treating as permissive");
                String::new()
            }
        };

        self.robots_cache
            .set(robots_url.to_string(), body.clone())
            .await;
        Ok(body)
    }

    /// Fetch the target URL. Redirects are not followed here; the body is
    /// streamed under the configured length cap.
    async fn fetch(&self, url: &Url, user_agent: &str) -> Result<Fetched, CrawlError> {
        let mut request = self.client.get(url.clone()).header(USER_AGENT, user_agent);
        if let Some(timeout) = self.config.request.timeout {
            request = request.timeout(timeout);
        }
        if !self.config.request.headers.is_empty() {
            request = request.headers(self.config.request.headers.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        if status >= 400 {
            self.emit(CrawlEvent::HttpError {
                url: url.to_string(),
                status,
            });
            return Err(CrawlError::Http { status });
        }

        if (300..400).contains(&status) {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Ok(Fetched::Redirect { status, location });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let max_length = self.config.max_content_length.resolve(url);
        if max_length > 0 {
            if let Some(length) = response.content_length() {
                if length > max_length {
                    return Err(CrawlError::Request(format!(
                        "content length {length} exceeds limit of {max_length} bytes"
                    )));
                }
            }
        }

        let mut response = response;
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if max_length > 0 && (body.len() + chunk.len()) as u64 > max_length {
                return Err(CrawlError::Request(format!(
                    "response body exceeds limit of {max_length} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Fetched::Content {
            status,
            content_type,
            body,
        })
    }
}

/// Fallback content type when the response does not name one: guess from
/// the URL's extension.
fn guess_content_type(url: &Url) -> &'static str {
    mime_guess::from_path(url.path())
        .first_raw()
        .unwrap_or("application/octet-stream")
}

/// Drop type parameters: everything from the first `;` onward.
fn strip_type_parameters(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parameters_from_content_types() {
        assert_eq!(
            strip_type_parameters("text/html; charset=utf-8"),
            "text/html"
        );
        assert_eq!(strip_type_parameters("text/html"), "text/html");
        assert_eq!(
            strip_type_parameters(" application/json ;v=2;q=1"),
            "application/json"
        );
    }

    #[test]
    fn guesses_content_type_from_the_extension() {
        let html = Url::parse("http://a/page.html").unwrap();
        let xml = Url::parse("http://a/sitemap.xml").unwrap();
        let bare = Url::parse("http://a/download").unwrap();
        assert_eq!(guess_content_type(&html), "text/html");
        assert_eq!(guess_content_type(&xml), "text/xml");
        assert_eq!(guess_content_type(&bare), "application/octet-stream");
    }
}
