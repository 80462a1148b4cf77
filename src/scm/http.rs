//! HTTP plumbing shared by the SCM clients.
//!
//! Every client sends exactly one request per lookup and hands the response
//! to [`classify_response`], which maps the status and rate-limit headers to
//! an [`ScmError`] kind. Bodies go through [`read_json`], which separates an
//! unreadable body (transient) from a readable one lacking fields (malformed).

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::types::{ScmError, ScmResult};

/// User agent sent with every SCM request.
pub const USER_AGENT: &str = concat!("scm-enrich/", env!("CARGO_PKG_VERSION"));

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Builds the HTTP client shared by all SCM clients of a run.
pub fn build_http_client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(request_timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Sends a request, mapping connection failures and timeouts to `Transient`.
pub async fn send(request: RequestBuilder, context: &str) -> ScmResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| ScmError::Transient(format!("{context}: {e}")))?;
    classify_response(response, context)
}

/// Maps a response status to an error, passing successful responses through.
pub fn classify_response(response: Response, context: &str) -> ScmResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let headers = response.headers();
    debug!(status = status.as_u16(), context, "SCM request failed");

    if is_rate_limited(status, headers) {
        return Err(ScmError::RateLimited {
            retry_after: parse_retry_after(headers, Utc::now()),
        });
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScmError::Auth {
            status: status.as_u16(),
            message: format!("{context}: credentials rejected"),
        }),
        StatusCode::NOT_FOUND => Err(ScmError::NotFound(context.to_string())),
        _ => Err(ScmError::Transient(format!(
            "{context}: unexpected status {status}"
        ))),
    }
}

/// 429 always; any other failure only when the server signals an exhausted
/// budget or asks for a pause.
fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let exhausted = headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    exhausted || headers.contains_key(RETRY_AFTER)
}

/// Extracts the server's wait hint.
///
/// `Retry-After` (seconds) wins; otherwise `x-ratelimit-reset` (epoch
/// seconds) is converted relative to `now`. A reset in the past yields zero.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };

    if let Some(secs) = header(RETRY_AFTER.as_str()).and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let reset = header(RATE_LIMIT_RESET).and_then(|v| v.parse::<i64>().ok())?;
    let wait = (reset - now.timestamp()).max(0);
    Some(Duration::from_secs(wait.unsigned_abs()))
}

/// Reads a JSON body into `T`.
///
/// A body that is not JSON at all is `Transient` (truncated or proxy
/// pages); valid JSON of the wrong shape is `MalformedResponse`.
pub async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> ScmResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| ScmError::Transient(format!("{context}: failed to read body: {e}")))?;
    parse_json(&body, context)
}

fn parse_json<T: DeserializeOwned>(body: &str, context: &str) -> ScmResult<T> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ScmError::Transient(format!("{context}: unparsable body: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| ScmError::MalformedResponse(format!("{context}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde::Deserialize;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Repo {
        #[allow(dead_code)]
        default_branch: String,
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()));
        assert!(is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0")])
        ));
        assert!(is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("retry-after", "5")])
        ));
        assert!(!is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "12")])
        ));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &HeaderMap::new()));
        assert!(!is_rate_limited(StatusCode::UNAUTHORIZED, &HeaderMap::new()));
        assert!(is_rate_limited(
            StatusCode::SERVICE_UNAVAILABLE,
            &headers(&[("retry-after", "30")])
        ));
        assert!(is_rate_limited(
            StatusCode::BAD_GATEWAY,
            &headers(&[("x-ratelimit-remaining", "0")])
        ));
        assert!(!is_rate_limited(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new()));
    }

    #[tokio::test]
    async fn test_unavailable_with_retry_after_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "30"))
            .mount(&server)
            .await;

        let err = send(Client::new().get(server.uri()), "test")
            .await
            .unwrap_err();
        match err {
            ScmError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_after_seconds_win() {
        let now = Utc::now();
        let map = headers(&[("retry-after", "7"), ("x-ratelimit-reset", "1")]);
        assert_eq!(parse_retry_after(&map, now), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_from_reset_epoch() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        let mut map = HeaderMap::new();
        map.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str("1700000042").expect("header"),
        );
        assert_eq!(parse_retry_after(&map, now), Some(Duration::from_secs(42)));

        let mut past = HeaderMap::new();
        past.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str("1699999000").expect("header"),
        );
        assert_eq!(parse_retry_after(&past, now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after(&HeaderMap::new(), now), None);
    }

    #[test]
    fn test_parse_json_distinguishes_broken_and_malformed() {
        assert!(parse_json::<Repo>(r#"{"default_branch":"main"}"#, "t").is_ok());
        assert!(matches!(
            parse_json::<Repo>("<html>bad gateway</html>", "t"),
            Err(ScmError::Transient(_))
        ));
        assert!(matches!(
            parse_json::<Repo>(r#"{"name":"api"}"#, "t"),
            Err(ScmError::MalformedResponse(_))
        ));
    }
}
