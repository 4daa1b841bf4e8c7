//! Google Gemini `generateContent` oracle.
//!
//! Auth is the `x-goog-api-key` header, so the key never appears in a URL or
//! in a transport error. The response text is split into raw candidates with
//! [`split_candidates`](super::split_candidates).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::prompt::discovery_prompt;
use super::{ContentOracle, OracleConfig, split_candidates};
use crate::error::OracleError;
use crate::types::RawCandidate;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Wait suggested for a 429 without a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Oracle backed by the Gemini API.
pub struct GeminiOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiOracle {
    /// Create an oracle, reading the API key from `config.api_key_env`.
    ///
    /// Returns `OracleError::AuthFailed` if the variable is unset or empty.
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::AuthFailed {
                oracle: format!("gemini (env var '{}' not set)", config.api_key_env),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create an oracle with an explicitly provided API key.
    pub fn new_with_key(config: &OracleConfig, api_key: String) -> Result<Self, OracleError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| OracleError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request_body(&self, category: &str, batch_size: usize) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": discovery_prompt(category, batch_size) }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
                "responseMimeType": "application/json"
            }
        })
    }

    /// Concatenated text parts of the first response candidate.
    fn extract_text(body: &Value) -> Result<String, OracleError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| OracleError::ResponseParse {
                message: "Missing 'candidates' array in response".to_string(),
            })?;
        let Some(candidate) = candidates.first() else {
            return Ok(String::new());
        };
        let text = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();
        Ok(text)
    }

    /// Map an HTTP status code to the appropriate `OracleError`.
    fn map_http_error(
        status: reqwest::StatusCode,
        retry_after: Option<u64>,
        body_text: &str,
    ) -> OracleError {
        match status.as_u16() {
            401 | 403 => OracleError::AuthFailed {
                oracle: "gemini".to_string(),
            },
            429 => OracleError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            code => OracleError::Api {
                status: code,
                message: body_text.chars().take(500).collect(),
            },
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        let e = e.without_url();
        if e.is_timeout() {
            OracleError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            OracleError::Connection {
                message: format!("Request to Gemini API failed: {e}"),
            }
        }
    }
}

#[async_trait]
impl ContentOracle for GeminiOracle {
    async fn request_candidates(
        &self,
        category: &str,
        batch_size: usize,
    ) -> Result<Vec<RawCandidate>, OracleError> {
        let body = self.build_request_body(category, batch_size);
        debug!(
            model = self.model.as_str(),
            batch_size, "Sending Gemini discovery request"
        );

        let response = self
            .client
            .post(self.endpoint_url())
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body_text = response.text().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                OracleError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                OracleError::ResponseParse {
                    message: format!("Failed to read response body: {e}"),
                }
            }
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, retry_after, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| OracleError::ResponseParse {
                message: format!("Invalid JSON in response: {e}"),
            })?;
        let text = Self::extract_text(&response_json)?;
        let candidates = split_candidates(&text);
        debug!(count = candidates.len(), "Gemini returned candidates");
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> GeminiOracle {
        GeminiOracle::new_with_key(&OracleConfig::default(), "test-gemini-key".into()).unwrap()
    }

    #[test]
    fn test_new_missing_env_returns_auth_failed() {
        let config = OracleConfig {
            api_key_env: "PAPERFIRST_TEST_MISSING_GEMINI_KEY".into(),
            ..Default::default()
        };
        match GeminiOracle::new(&config) {
            Err(OracleError::AuthFailed { oracle }) => {
                assert!(oracle.contains("PAPERFIRST_TEST_MISSING_GEMINI_KEY"))
            }
            other => panic!("Expected AuthFailed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_endpoint_url() {
        let config = OracleConfig {
            base_url: Some("https://proxy.example.com/v1/".into()),
            model: "gemini-2.5-pro".into(),
            ..Default::default()
        };
        let oracle = GeminiOracle::new_with_key(&config, "k".into()).unwrap();
        assert_eq!(
            oracle.endpoint_url(),
            "https://proxy.example.com/v1/models/gemini-2.5-pro:generateContent"
        );
        assert!(self::oracle().endpoint_url().starts_with(DEFAULT_BASE_URL));
    }

    #[test]
    fn test_build_request_body() {
        let body = oracle().build_request_body("sleep", 7);
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("<category>sleep</category>"));
        assert!(text.contains("Propose 7 distinct topics"));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"candidates\": " }, { "text": "[]}" }] }
            }]
        });
        assert_eq!(
            GeminiOracle::extract_text(&body).unwrap(),
            "{\"candidates\": []}"
        );
    }

    #[test]
    fn test_extract_text_empty_and_missing() {
        assert_eq!(
            GeminiOracle::extract_text(&json!({ "candidates": [] })).unwrap(),
            ""
        );
        assert!(matches!(
            GeminiOracle::extract_text(&json!({ "error": "nope" })),
            Err(OracleError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_http_error_mapping() {
        let err = GeminiOracle::map_http_error(reqwest::StatusCode::UNAUTHORIZED, None, "");
        assert!(matches!(err, OracleError::AuthFailed { .. }));
        assert!(!err.is_transient());

        let err = GeminiOracle::map_http_error(reqwest::StatusCode::FORBIDDEN, None, "");
        assert!(matches!(err, OracleError::AuthFailed { .. }));

        let err = GeminiOracle::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, None, "");
        assert_eq!(err.retry_after_secs(), Some(30));
        let err =
            GeminiOracle::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, Some(4), "");
        assert_eq!(err.retry_after_secs(), Some(4));

        let err = GeminiOracle::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            None,
            r#"{"error":{"message":"Internal server error"}}"#,
        );
        match err {
            OracleError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("Internal server error"));
            }
            other => panic!("Expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient_and_hides_key() {
        let config = OracleConfig {
            base_url: Some("http://127.0.0.1:9".into()),
            timeout_secs: 2,
            connect_timeout_secs: 1,
            ..Default::default()
        };
        let oracle = GeminiOracle::new_with_key(&config, "SECRET-KEY-123".into()).unwrap();
        let err = oracle.request_candidates("sleep", 3).await.unwrap_err();
        assert!(err.is_transient());
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
        assert_eq!(oracle.name(), "gemini");
    }
}
