//! Shared HTTP plumbing for source adapters.
//!
//! Provides a configured [`reqwest::Client`], User-Agent rotation, the
//! mapping from transport and HTTP failures into [`SourceError`] kinds, and
//! [`fetch_text`], the governed request helper every adapter goes through.

use crate::config::EngineConfig;
use crate::error::SourceError;
use crate::governor::RateGovernor;
use rand::seq::SliceRandom;
use reqwest::{RequestBuilder, StatusCode};

/// Realistic browser User-Agent strings, rotated per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Longest slice of an error body carried into a failure detail.
const MAX_DETAIL_CHARS: usize = 200;

/// Build a [`reqwest::Client`] for one adapter.
///
/// The client has a cookie store (Scholar consent pages), the engine's
/// per-request timeout, a configured or rotated User-Agent, and a bounded
/// redirect policy.
///
/// # Errors
///
/// Returns [`crate::SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &EngineConfig) -> crate::Result<reqwest::Client> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(config.request_timeout())
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| crate::SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Classify a transport-level failure.
pub fn classify_reqwest_error(err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(format!("request timed out: {err}"))
    } else if err.is_decode() {
        SourceError::FormatChanged(format!("undecodable response body: {err}"))
    } else {
        SourceError::Network(format!("transport error: {err}"))
    }
}

/// Map a non-success HTTP status into a failure kind.
pub fn map_http_status(status: StatusCode, body: &str) -> SourceError {
    let detail = body_excerpt(body);
    match status.as_u16() {
        401 | 403 => SourceError::Auth(format!("HTTP {status}: {detail}")),
        429 => SourceError::RateLimited(format!("HTTP {status}: {detail}")),
        408 | 504 => SourceError::Timeout(format!("HTTP {status}: {detail}")),
        s if s >= 500 => SourceError::Network(format!("HTTP {status}: {detail}")),
        _ => SourceError::FormatChanged(format!("request rejected with HTTP {status}: {detail}")),
    }
}

fn body_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_owned()
    } else {
        trimmed.chars().take(MAX_DETAIL_CHARS).collect()
    }
}

/// Send a request through the governor and return the response body.
///
/// `build` is called once per attempt. The governor is honoured before
/// every attempt. A [`SourceError::RateLimited`] or [`SourceError::Network`]
/// failure gets exactly one retry, after an extra backoff of twice (rate
/// limit) or once (network) the governor interval.
///
/// # Errors
///
/// Returns the classified [`SourceError`] of the final attempt.
pub async fn fetch_text<F>(
    source: &str,
    governor: &RateGovernor,
    build: F,
) -> Result<String, SourceError>
where
    F: Fn() -> RequestBuilder,
{
    let mut retried = false;
    loop {
        governor.acquire().await;
        match attempt(build()).await {
            Ok(body) => {
                tracing::trace!(source, bytes = body.len(), "response received");
                return Ok(body);
            }
            Err(err) if err.is_retryable() && !retried => {
                retried = true;
                let backoff = if matches!(err, SourceError::RateLimited(_)) {
                    governor.interval() * 2
                } else {
                    governor.interval()
                };
                tracing::debug!(
                    source,
                    kind = %err.kind(),
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying once after failure"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn attempt(request: RequestBuilder) -> Result<String, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_reqwest_error(&e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_http_status(status, &body));
    }
    response.text().await.map_err(|e| classify_reqwest_error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_governor() -> RateGovernor {
        RateGovernor::new(Duration::from_millis(1))
    }

    fn test_client(timeout_secs: u64) -> reqwest::Client {
        let config = EngineConfig {
            request_timeout_seconds: timeout_secs,
            user_agent: Some("TestBot/1.0".into()),
            ..Default::default()
        };
        build_client(&config).expect("client")
    }

    #[test]
    fn random_user_agent_returns_valid_ua() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
        assert!(ua.contains("Mozilla/5.0"));
    }

    #[test]
    fn build_client_with_default_config() {
        assert!(build_client(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn status_mapping_follows_taxonomy() {
        use crate::error::FailureKind;
        let cases = [
            (401, FailureKind::AuthError),
            (403, FailureKind::AuthError),
            (429, FailureKind::RateLimited),
            (408, FailureKind::Timeout),
            (504, FailureKind::Timeout),
            (500, FailureKind::TransientNetworkError),
            (503, FailureKind::TransientNetworkError),
            (400, FailureKind::SourceFormatChanged),
            (404, FailureKind::SourceFormatChanged),
        ];
        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).expect("status");
            assert_eq!(map_http_status(status, "").kind(), kind, "HTTP {code}");
        }
    }

    #[test]
    fn status_detail_is_truncated() {
        let body = "x".repeat(1000);
        let err = map_http_status(StatusCode::TOO_MANY_REQUESTS, &body);
        assert!(err.detail().len() < 300);
        let empty = map_http_status(StatusCode::FORBIDDEN, "  ");
        assert!(empty.detail().contains("no response body"));
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(5);
        let url = format!("{}/ok", server.uri());
        let body = fetch_text("Test", &fast_governor(), || client.get(&url)).await;
        assert_eq!(body.expect("should succeed"), "hello");
    }

    #[tokio::test]
    async fn retries_rate_limit_once_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(5);
        let url = format!("{}/limited", server.uri());
        let body = fetch_text("Test", &fast_governor(), || client.get(&url)).await;
        assert_eq!(body.expect("retry should succeed"), "[]");
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_reported_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(5);
        let url = server.uri();
        let err = fetch_text("Test", &fast_governor(), || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RateLimited(_)));
        assert!(err.detail().contains("slow down"));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(5);
        let url = server.uri();
        let err = fetch_text("Test", &fast_governor(), || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)));
    }

    #[tokio::test]
    async fn server_error_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(5);
        let url = server.uri();
        let err = fetch_text("Test", &fast_governor(), || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Network(_)));
    }

    #[tokio::test]
    async fn slow_response_is_a_timeout_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(3)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(1);
        let url = server.uri();
        let err = fetch_text("Test", &fast_governor(), || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_transient_network_error() {
        let client = test_client(2);
        // Port 9 (discard) is closed on test machines.
        let err = fetch_text("Test", &fast_governor(), || client.get("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Network(_)), "got {err:?}");
    }
}
