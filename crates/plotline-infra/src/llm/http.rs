//! Shared HTTP plumbing for every backend adapter.
//!
//! Adapters never return errors: whatever happens on the wire is mapped to
//! an [`AttemptOutcome`] here so the orchestrator sees one vocabulary for
//! all providers.
//!
//! | status                          | outcome    |
//! |---------------------------------|------------|
//! | 401, 403, 404                   | Fatal      |
//! | 408, 409, 425, 429, 5xx, 529    | Transient  |
//! | 400, 413, 422 mentioning policy | Refused    |
//! | other 400, 413, 422             | Refused ("request rejected") |
//! | anything else                   | Transient  |

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use plotline_types::error::AdapterBuildError;
use plotline_types::outcome::AttemptOutcome;

/// Longest excerpt of a response body carried into an outcome reason.
const BODY_EXCERPT_CHARS: usize = 200;

const POLICY_MARKERS: &[&str] = &[
    "policy",
    "safety",
    "content_filter",
    "content filter",
    "content_policy",
    "moderation",
    "flagged",
];

/// Build the client every adapter shares the settings of.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, AdapterBuildError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AdapterBuildError::HttpClient(e.to_string()))
}

/// Map a non-success HTTP status and its body to an outcome.
pub fn outcome_for_status(status: u16, body: &str) -> AttemptOutcome {
    let detail = excerpt(body);
    match status {
        401 | 403 => AttemptOutcome::fatal(format!("HTTP {status}: authentication failed: {detail}")),
        404 => AttemptOutcome::fatal(format!("HTTP {status}: model or endpoint not found: {detail}")),
        408 | 409 | 425 | 429 | 529 => AttemptOutcome::transient(format!("HTTP {status}: {detail}")),
        500..=599 => AttemptOutcome::transient(format!("HTTP {status}: {detail}")),
        400 | 413 | 422 => {
            let lower = body.to_lowercase();
            if POLICY_MARKERS.iter().any(|m| lower.contains(m)) {
                AttemptOutcome::refused(format!("HTTP {status}: {detail}"))
            } else {
                AttemptOutcome::refused(format!("request rejected: HTTP {status}: {detail}"))
            }
        }
        _ => AttemptOutcome::transient(format!("HTTP {status}: {detail}")),
    }
}

/// Map a transport-level failure (no usable response) to an outcome.
pub fn outcome_for_transport(err: &reqwest::Error) -> AttemptOutcome {
    if err.is_timeout() {
        AttemptOutcome::transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        AttemptOutcome::transient(format!("connection failed: {err}"))
    } else if err.is_builder() {
        AttemptOutcome::fatal(format!("invalid request: {err}"))
    } else {
        AttemptOutcome::transient(format!("HTTP request failed: {err}"))
    }
}

/// Send a JSON body and decode the provider envelope.
///
/// Every failure is already an outcome, so callers only handle the decoded
/// envelope.
pub async fn send_json<B, R>(request: reqwest::RequestBuilder, body: &B) -> Result<R, AttemptOutcome>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| outcome_for_transport(&e))?;

    let status = response.status();
    let text = response.text().await.map_err(|e| outcome_for_transport(&e))?;

    if !status.is_success() {
        return Err(outcome_for_status(status.as_u16(), &text));
    }

    decode_envelope(&text)
}

/// Decode a success body, reporting an unexpected envelope as malformed.
pub fn decode_envelope<R: DeserializeOwned>(text: &str) -> Result<R, AttemptOutcome> {
    serde_json::from_str(text).map_err(|e| {
        AttemptOutcome::malformed(text, format!("unexpected response envelope: {e}"))
    })
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty body)".to_string();
    }
    trimmed.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_and_not_found_are_fatal() {
        for status in [401, 403, 404] {
            assert_eq!(outcome_for_status(status, "nope").kind(), "fatal", "status {status}");
        }
    }

    #[test]
    fn test_throttling_and_server_errors_are_transient() {
        for status in [408, 409, 425, 429, 500, 502, 503, 529] {
            assert_eq!(outcome_for_status(status, "").kind(), "transient", "status {status}");
        }
    }

    #[test]
    fn test_policy_rejection_is_refused() {
        let body = r#"{"error": {"code": "content_policy_violation", "message": "flagged"}}"#;
        match outcome_for_status(400, body) {
            AttemptOutcome::Refused { reason } => {
                assert!(reason.starts_with("HTTP 400"));
                assert!(reason.contains("content_policy_violation"));
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn test_other_rejection_advances_without_quarantine() {
        match outcome_for_status(422, r#"{"error": "max_tokens too large"}"#) {
            AttemptOutcome::Refused { reason } => assert!(reason.starts_with("request rejected")),
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[test]
    fn test_excerpt_bounded() {
        let body = "x".repeat(5_000);
        let AttemptOutcome::Transient { reason } = outcome_for_status(503, &body) else {
            panic!("expected transient");
        };
        assert!(reason.len() < 300);
        assert!(outcome_for_status(503, "  ").to_string().contains("(empty body)"));
    }

    #[test]
    fn test_bad_envelope_is_malformed() {
        #[derive(Debug, serde::Deserialize)]
        struct Envelope {
            #[allow(dead_code)]
            response: String,
        }
        let err = decode_envelope::<Envelope>("<html>gateway</html>").unwrap_err();
        match err {
            AttemptOutcome::MalformedOutput {
                raw_text,
                validation_error,
            } => {
                assert_eq!(raw_text, "<html>gateway</html>");
                assert!(validation_error.starts_with("unexpected response envelope"));
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let client = build_client(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let result: Result<serde_json::Value, _> =
            send_json(client.post("http://127.0.0.1:9/api/generate"), &serde_json::json!({})).await;
        assert_eq!(result.unwrap_err().kind(), "transient");
    }
}
