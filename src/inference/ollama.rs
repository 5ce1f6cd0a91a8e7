//! Ollama-backed answer generation (`POST /api/generate`).
//!
//! The prompt asks the model to finish with a `Confidence: <0..1>` line. When that line is
//! present it becomes the certainty signal and is removed from the answer text.

use super::{Inference, InferenceClient, InferenceError, Prompt};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;

static CONFIDENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*confidence\s*[:=]\s*(?P<value>[0-9]*\.?[0-9]+)\s*(?P<percent>%)?\.?\s*$",
    )
    .expect("valid confidence regex")
});

/// Inference client issuing HTTP requests to a local Ollama runtime.
pub struct OllamaInferenceClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaInferenceClient {
    /// Build a client for the given runtime URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .user_agent("docqa/answer")
            .build()
            .map_err(|error| {
                InferenceError::Unavailable(format!("failed to construct HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl InferenceClient for OllamaInferenceClient {
    async fn infer(&self, prompt: &Prompt) -> Result<Inference, InferenceError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt.text,
            "stream": false,
            "options": {
                // Lower temperature for repeatable answers.
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                InferenceError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(InferenceError::Unavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            InferenceError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(InferenceError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(split_certainty(&body.response))
    }
}

/// Separate a trailing `Confidence:` line from the answer text.
fn split_certainty(response: &str) -> Inference {
    let certainty = CONFIDENCE_LINE
        .captures_iter(response)
        .last()
        .and_then(|captures| {
            let value: f32 = captures.name("value")?.as_str().parse().ok()?;
            let value = if captures.name("percent").is_some() || value > 1.0 {
                value / 100.0
            } else {
                value
            };
            Some(value.clamp(0.0, 1.0))
        });
    let text = CONFIDENCE_LINE.replace_all(response, "").trim().to_string();
    Inference { text, certainty }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn prompt() -> Prompt {
        Prompt {
            question: "When?".into(),
            passages: vec!["At noon.".into()],
            text: "Answer the question".into(),
        }
    }

    #[tokio::test]
    async fn parses_answer_and_certainty() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "Meetings start at noon.\nConfidence: 0.8",
                    "done": true
                }));
            })
            .await;

        let client = OllamaInferenceClient::new(server.base_url(), "llama".into()).unwrap();
        let inference = client.infer(&prompt()).await.expect("inference");

        mock.assert_async().await;
        assert_eq!(inference.text, "Meetings start at noon.");
        assert_eq!(inference.certainty, Some(0.8));
    }

    #[tokio::test]
    async fn missing_certainty_line_yields_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "At noon.", "done": true }));
            })
            .await;

        let client = OllamaInferenceClient::new(server.base_url(), "llama".into()).unwrap();
        let inference = client.infer(&prompt()).await.expect("inference");
        assert_eq!(inference.text, "At noon.");
        assert_eq!(inference.certainty, None);
    }

    #[tokio::test]
    async fn not_found_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404);
            })
            .await;

        let client = OllamaInferenceClient::new(server.base_url(), "llama".into()).unwrap();
        let error = client.infer(&prompt()).await.expect_err("404");
        assert!(matches!(error, InferenceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn server_error_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let client = OllamaInferenceClient::new(server.base_url(), "llama".into()).unwrap();
        let error = client.infer(&prompt()).await.expect_err("500");
        assert!(
            matches!(error, InferenceError::GenerationFailed(message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn unreachable_runtime_is_unavailable() {
        let client =
            OllamaInferenceClient::new("http://127.0.0.1:9".into(), "llama".into()).unwrap();
        let error = client.infer(&prompt()).await.expect_err("connection refused");
        assert!(matches!(error, InferenceError::Unavailable(_)));
    }

    #[test]
    fn percent_certainty_is_scaled() {
        let inference = split_certainty("Twelve weeks.\nconfidence = 75%");
        assert_eq!(inference.text, "Twelve weeks.");
        assert_eq!(inference.certainty, Some(0.75));
    }

    #[test]
    fn confidence_line_may_end_with_a_period() {
        let inference = split_certainty("Twelve weeks.\nConfidence: 0.8.");
        assert_eq!(inference.text, "Twelve weeks.");
        assert_eq!(inference.certainty, Some(0.8));

        let percent = split_certainty("Twelve weeks.\nConfidence: 80%.");
        assert_eq!(percent.text, "Twelve weeks.");
        assert_eq!(percent.certainty, Some(0.8));
    }
}
