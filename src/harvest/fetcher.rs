//! HTTP fetcher implementation
//!
//! This module handles every network request of a harvest:
//! - Building the shared HTTP client from `[fetch]`
//! - GET, or POST with a JSON body when the work item carries one
//! - Retry with exponential backoff for transient failures
//! - Classifying responses into content, absent, or failed

use crate::config::{FetchConfig, ResponseFormat};
use crate::extract::Content;
use crate::record::WorkItem;
use crate::retry::{RetryError, RetryPolicy};
use crate::ConfigError;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Retrieves the content behind a work item
///
/// `None` means "no data": the resource is absent, the body is unusable, or
/// every attempt failed. Implementations never share mutable state between
/// calls.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> Option<Content>;
}

/// Why a single attempt failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Builds an HTTP client with the configured user agent, timeouts and
/// default headers
///
/// # Example
///
/// ```no_run
/// use firmharvest::config::FetchConfig;
/// use firmharvest::harvest::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> crate::Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::Validation(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("Invalid value for header '{}': {}", name, e))
        })?;
        headers.insert(name, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Fetcher backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
    format: ResponseFormat,
    politeness: Option<(Duration, Duration)>,
}

impl HttpFetcher {
    pub fn new(client: Client, policy: RetryPolicy, format: ResponseFormat) -> Self {
        Self {
            client,
            policy,
            format,
            politeness: None,
        }
    }

    /// Creates a fetcher from the `[fetch]` section, reusing `client`
    pub fn from_config(client: Client, config: &FetchConfig) -> Self {
        Self::new(client, config.retry_policy(), config.format).with_politeness(config.politeness())
    }

    /// Same client and retry policy, different body handling
    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Random pause in `[min, max]` before each request
    pub fn with_politeness(mut self, range: Option<(Duration, Duration)>) -> Self {
        self.politeness = range;
        self
    }

    async fn pause(&self) {
        if let Some((min, max)) = self.politeness {
            let pause = if max > min {
                rand::thread_rng().gen_range(min..=max)
            } else {
                min
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// One attempt
    ///
    /// `Ok(None)` is a definitive "no data" that must not be retried.
    async fn attempt(&self, item: &WorkItem) -> Result<Option<Content>, FetchError> {
        let request = match &item.body {
            Some(body) => self.client.post(&item.url).json(body),
            None => self.client.get(&item.url),
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            tracing::debug!("{}: {} (no data)", item.url, status);
            return Ok(None);
        }

        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;

        match self.format {
            ResponseFormat::Text => Ok(Some(Content::Text(body))),
            ResponseFormat::Json => match serde_json::from_str(&body) {
                Ok(doc) => Ok(Some(Content::Json(doc))),
                Err(e) => {
                    tracing::debug!("{}: body is not JSON ({})", item.url, e);
                    Ok(None)
                }
            },
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, item: &WorkItem) -> Option<Content> {
        self.pause().await;

        let result = self
            .policy
            .run(
                |attempt| {
                    if attempt > 1 {
                        tracing::debug!("{}: attempt {}", item.url, attempt);
                    }
                    self.attempt(item)
                },
                |_| true,
            )
            .await;

        match result {
            Ok(content) => content,
            Err(RetryError::Exhausted { attempts, last }) | Err(RetryError::Fatal {
                attempt: attempts,
                error: last,
            }) => {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    item.display_name(),
                    attempts,
                    last
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(format: ResponseFormat, max_attempts: u32) -> HttpFetcher {
        let config = FetchConfig::default();
        let policy = RetryPolicy::new(
            max_attempts,
            Backoff::Doubling {
                initial: Duration::from_millis(5),
                cap: Duration::from_millis(10),
            },
        );
        HttpFetcher::new(build_http_client(&config).unwrap(), policy, format)
    }

    fn item(server: &MockServer, route: &str) -> WorkItem {
        WorkItem::new(format!("{}{}", server.uri(), route))
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&FetchConfig::default()).is_ok());
    }

    #[test]
    fn test_build_http_client_rejects_bad_header() {
        let mut config = FetchConfig::default();
        config
            .headers
            .insert("Bad Header".to_string(), "x".to_string());
        assert!(build_http_client(&config).is_err());
    }

    #[tokio::test]
    async fn test_fetch_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/support/gs1900"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let content = fetcher(ResponseFormat::Text, 3)
            .fetch(&item(&server, "/support/gs1900"))
            .await;
        assert_eq!(content, Some(Content::Text("<html>ok</html>".to_string())));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        assert!(fetcher(ResponseFormat::Text, 4)
            .fetch(&item(&server, "/gone"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_no_content_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(fetcher(ResponseFormat::Json, 4)
            .fetch(&item(&server, "/empty"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        assert!(fetcher(ResponseFormat::Text, 3)
            .fetch(&item(&server, "/busy"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("third time"))
            .expect(1)
            .mount(&server)
            .await;

        let content = fetcher(ResponseFormat::Text, 4)
            .fetch(&item(&server, "/limited"))
            .await;
        assert_eq!(content, Some(Content::Text("third time".to_string())));
    }

    #[tokio::test]
    async fn test_malformed_json_is_absent_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;

        assert!(fetcher(ResponseFormat::Json, 4)
            .fetch(&item(&server, "/api/products"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_post_with_json_body() {
        let server = MockServer::start().await;
        let query = json!({"category": "unifi", "page": 2});
        Mock::given(method("POST"))
            .and(path("/api/downloads"))
            .and(header("content-type", "application/json"))
            .and(body_json(&query))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"downloads": []})))
            .expect(1)
            .mount(&server)
            .await;

        let content = fetcher(ResponseFormat::Json, 2)
            .fetch(&item(&server, "/api/downloads").with_body(query.clone()))
            .await;
        assert_eq!(content, Some(Content::Json(json!({"downloads": []}))));
    }

    #[tokio::test]
    async fn test_connection_failure_is_absent() {
        let dead = WorkItem::new("http://127.0.0.1:9/firmware");

        assert!(fetcher(ResponseFormat::Text, 2).fetch(&dead).await.is_none());
    }
}
