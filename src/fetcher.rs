//! Paginated Fetcher.
//!
//! Defines the [`CollectionSource`] trait the sync pass pages through, and
//! [`HttpSource`], which talks to a JSON collection API:
//!
//! | Endpoint | Returns |
//! |----------|---------|
//! | `GET {base}/collections` | array of `{slug, title, count}` |
//! | `GET {base}/collections/{slug}/items?page=N&limit=L` | array of items, newest id first |
//!
//! Either endpoint may also wrap its array in an object
//! (`{"collections": [...]}` / `{"items": [...]}`).
//!
//! # Rate limits
//!
//! HTTP 429 is retried transparently with the server-advised delay
//! (`Retry-After` header, else a `retry_after` body field, else the
//! configured default). Retries are bounded by [`RetryPolicy`]: both the
//! attempt count and the total time slept per request are capped, after
//! which [`PipelineError::RateLimitBudgetExhausted`] is returned.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{token_from_env, RemoteConfig, RetryPolicy};
use crate::error::{PipelineError, Result};
use crate::models::{CollectionInfo, Page, RemoteItem};

/// A remote, ID-ordered, paginated collection API.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// List every collection the remote exposes.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Fetch one page (1-based) of `slug`, in descending id order.
    ///
    /// [`Page::has_more`] must be set only when the page came back full.
    async fn fetch_page(&self, slug: &str, page: u32) -> Result<Page>;
}

/// Run `op`, retrying while it reports [`PipelineError::RateLimited`].
pub async fn retry_rate_limited<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    let mut waited = Duration::ZERO;

    loop {
        match op().await {
            Err(PipelineError::RateLimited { retry_after }) => {
                if attempts >= policy.max_attempts || waited + retry_after > policy.max_total_wait
                {
                    return Err(PipelineError::RateLimitBudgetExhausted { attempts, waited });
                }
                attempts += 1;
                warn!(
                    request = what,
                    attempt = attempts,
                    wait_ms = retry_after.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(retry_after).await;
                waited += retry_after;
            }
            other => return other,
        }
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn retry_after_from_body(body: &str) -> Option<Duration> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = json
        .get("retry_after")
        .or_else(|| json.get("parameters").and_then(|p| p.get("retry_after")))?
        .as_f64()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsBody {
    Bare(Vec<RemoteItem>),
    Wrapped { items: Vec<RemoteItem> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionsBody {
    Bare(Vec<CollectionInfo>),
    Wrapped { collections: Vec<CollectionInfo> },
}

/// [`CollectionSource`] backed by a JSON HTTP API.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    page_size: usize,
    policy: RetryPolicy,
}

impl HttpSource {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid remote.base_url: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("remote.base_url must be a hierarchical URL: {}", base_url);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: token_from_env(config.token_env.as_deref())?,
            page_size: config.page_size,
            policy: config.retry_policy(),
        })
    }

    /// `base_url` with `segments` appended, each percent-encoded as a
    /// single path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// One GET, mapping 429 to `RateLimited` and other failures to `Remote`.
    async fn get_once(&self, url: &Url, query: &[(&str, String)]) -> Result<String> {
        let mut req = self.client.get(url.clone()).query(query);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if status.as_u16() == 429 {
            let header_wait = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            let retry_after = header_wait
                .or_else(|| retry_after_from_body(&body))
                .unwrap_or(self.policy.default_wait);
            return Err(PipelineError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Remote {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(resp.text().await?)
    }

    async fn get(&self, url: &Url, query: &[(&str, String)]) -> Result<String> {
        retry_rate_limited(&self.policy, url.as_str(), || self.get_once(url, query)).await
    }
}

#[async_trait]
impl CollectionSource for HttpSource {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let url = self.endpoint(&["collections"]);
        let body = self.get(&url, &[]).await?;
        Ok(match serde_json::from_str(&body)? {
            CollectionsBody::Bare(v) => v,
            CollectionsBody::Wrapped { collections } => collections,
        })
    }

    async fn fetch_page(&self, slug: &str, page: u32) -> Result<Page> {
        let url = self.endpoint(&["collections", slug, "items"]);
        let query = [
            ("page", page.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        let body = self.get(&url, &query).await?;
        let items = match serde_json::from_str(&body)? {
            ItemsBody::Bare(v) => v,
            ItemsBody::Wrapped { items } => items,
        };
        debug!(collection = slug, page, items = items.len(), "fetched page");
        Ok(Page::new(items, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, max_total_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            max_total_wait: Duration::from_millis(max_total_ms),
            default_wait: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result = retry_rate_limited(&policy(5, 1000), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(PipelineError::RateLimited {
                    retry_after: Duration::from_millis(1),
                })
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempt_cap_escalates() {
        let calls = &AtomicU32::new(0);
        let err = retry_rate_limited::<(), _, _>(&policy(2, 1000), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::RateLimited {
                retry_after: Duration::from_millis(1),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RateLimitBudgetExhausted { attempts: 2, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wait_budget_escalates_before_sleeping() {
        let err = retry_rate_limited::<(), _, _>(&policy(100, 5), "test", || async {
            Err(PipelineError::RateLimited {
                retry_after: Duration::from_secs(60),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RateLimitBudgetExhausted { attempts: 0, .. }
        ));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = retry_rate_limited::<(), _, _>(&policy(5, 1000), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Remote {
                status: 500,
                body: String::new(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Remote { status: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_after_header_and_body() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);

        assert_eq!(
            retry_after_from_body(r#"{"retry_after": 3}"#),
            Some(Duration::from_secs(3))
        );
        assert_eq!(
            retry_after_from_body(r#"{"parameters": {"retry_after": 1.5}}"#),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(retry_after_from_body("not json"), None);
    }

    fn remote(base_url: &str, page_size: usize) -> RemoteConfig {
        RemoteConfig {
            base_url: base_url.to_string(),
            page_size,
            token_env: None,
            timeout_secs: 5,
            max_rate_limit_retries: 0,
            max_rate_limit_wait_secs: 0,
            default_retry_after_secs: 0,
        }
    }

    /// Accept one connection, read the request, reply with `raw`, hang up.
    async fn serve_once(raw: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            sock.write_all(raw.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        });
        format!("http://{}/api/", addr)
    }

    #[test]
    fn slugs_are_escaped_as_one_path_segment() {
        let source = HttpSource::new(&remote("https://api.example.com/v1/", 10)).unwrap();
        let url = source.endpoint(&["collections", "a/b?c#d", "items"]);
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/collections/a%2Fb%3Fc%23d/items"
        );

        let bare = HttpSource::new(&remote("https://api.example.com", 10)).unwrap();
        assert_eq!(
            bare.endpoint(&["collections"]).as_str(),
            "https://api.example.com/collections"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpSource::new(&remote("not a url", 10)).is_err());
        assert!(HttpSource::new(&remote("mailto:someone@example.com", 10)).is_err());
    }

    #[tokio::test]
    async fn fetches_wrapped_page() {
        let body = r#"{"items": [{"id": 9, "kind": "photo"}, {"id": 8, "kind": "text"}]}"#;
        let raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let source = HttpSource::new(&remote(&serve_once(raw).await, 2)).unwrap();

        let page = source.fetch_page("demo", 1).await.unwrap();
        assert_eq!(page.items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![9, 8]);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn truncated_body_is_a_transport_error() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n[{\"id\""
            .to_string();
        let source = HttpSource::new(&remote(&serve_once(raw).await, 10)).unwrap();

        let err = source.fetch_page("demo", 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn server_error_keeps_status() {
        let raw = "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy"
            .to_string();
        let source = HttpSource::new(&remote(&serve_once(raw).await, 10)).unwrap();

        let err = source.fetch_page("demo", 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Remote { status: 503, ref body } if body == "busy"));
    }

    #[test]
    fn page_has_more_only_when_full() {
        let item = |id| RemoteItem {
            id,
            kind: "photo".to_string(),
            media_url: None,
            text: None,
            posted_at: None,
        };
        assert!(Page::new(vec![item(2), item(1)], 2).has_more);
        assert!(!Page::new(vec![item(1)], 2).has_more);
        assert!(!Page::new(vec![], 2).has_more);
    }
}
