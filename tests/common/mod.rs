//! Shared fixtures for integration tests: a local HTTP server with
//! scriptable routes and a request log, plus event-collection helpers.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use sitegrazer::{CrawlEvent, Crawler};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct StaticResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub location: Option<String>,
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<HashMap<String, StaticResponse>>,
    requests: Mutex<Vec<RequestLog>>,
}

#[derive(Clone)]
pub struct RequestLog {
    pub path: String,
    pub at: Instant,
    pub user_agent: Option<String>,
}

/// Local fixture server. Unrouted paths return 404.
#[derive(Clone)]
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "sitegrazer=debug".into()),
            )
            .try_init();

        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .fallback(serve)
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn route(&self, path: &str, response: StaticResponse) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    /// A 200 response with the given content type and body.
    pub fn page(&self, path: &str, content_type: &str, body: &str) {
        self.route(
            path,
            StaticResponse {
                status: 200,
                content_type: content_type.to_string(),
                body: body.as_bytes().to_vec(),
                location: None,
            },
        );
    }

    /// A 302 redirect to `location`.
    pub fn redirect(&self, path: &str, location: &str) {
        self.route(
            path,
            StaticResponse {
                status: 302,
                content_type: "text/plain".to_string(),
                body: Vec::new(),
                location: Some(location.to_string()),
            },
        );
    }

    /// A bodyless response with the given status.
    pub fn status(&self, path: &str, status: u16) {
        self.route(
            path,
            StaticResponse {
                status,
                content_type: "text/plain".to_string(),
                body: Vec::new(),
                location: None,
            },
        );
    }

    pub fn requests(&self) -> Vec<RequestLog> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of requests seen for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

async fn serve(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RequestLog {
        path: path.clone(),
        at: Instant::now(),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let route = state.routes.lock().unwrap().get(&path).cloned();
    match route {
        Some(r) => {
            let mut builder = Response::builder()
                .status(r.status)
                .header("content-type", r.content_type);
            if let Some(location) = r.location {
                builder = builder.header("location", location);
            }
            builder.body(Body::from(r.body)).unwrap()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// Start the crawler and collect events until `UrlListComplete`, then
/// stop it. Panics if the crawl does not finish within `timeout`.
pub async fn run_until_complete(crawler: &Crawler, timeout: Duration) -> Vec<CrawlEvent> {
    let mut rx = crawler.subscribe();
    crawler.start();
    let events = collect_until_complete(&mut rx, timeout).await;
    crawler.stop();
    events
}

/// Collect events from `rx` until `UrlListComplete` arrives.
pub async fn collect_until_complete(
    rx: &mut broadcast::Receiver<CrawlEvent>,
    timeout: Duration,
) -> Vec<CrawlEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut events = Vec::new();
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("crawl did not complete within {timeout:?}"));
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => {
                let done = matches!(event, CrawlEvent::UrlListComplete);
                events.push(event);
                if done {
                    return events;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return events,
            Err(_) => panic!("crawl did not complete within {timeout:?}"),
        }
    }
}

/// The `CrawledUrl` events among `events`, as
/// `(url, error_code, status_code, error_message)` tuples.
pub fn crawled_urls(
    events: &[CrawlEvent],
) -> Vec<(String, Option<&'static str>, Option<u16>, Option<String>)> {
    events
        .iter()
        .filter_map(|event| match event {
            CrawlEvent::CrawledUrl {
                url,
                error_code,
                status_code,
                error_message,
            } => Some((
                url.clone(),
                *error_code,
                *status_code,
                error_message.clone(),
            )),
            _ => None,
        })
        .collect()
}
