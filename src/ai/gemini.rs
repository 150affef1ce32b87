use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{GenerateError, TextModel};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct GenerateRequest {
    system_instruction: RequestContent,
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }

    /// Models the configured API key can use, without the `models/` prefix.
    pub async fn list_models(&self) -> Result<Vec<String>, GenerateError> {
        let url = format!("{BASE_URL}/models");

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GenerateError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let models_response: ModelsResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Provider(format!("invalid Gemini response: {e}")))?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| {
                model
                    .name
                    .strip_prefix("models/")
                    .map(str::to_string)
                    .unwrap_or(model.name)
            })
            .collect())
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, GenerateError> {
        let url = format!("{BASE_URL}/models/{model}:generateContent");

        let request = GenerateRequest {
            system_instruction: RequestContent {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
            contents: vec![RequestContent {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Provider(format!("invalid Gemini response: {e}")))?;
        extract_text(generate_response)
    }
}

/// Maps a non-success HTTP response onto the failure taxonomy. The API
/// reports throttling both as HTTP 429 and as a `RESOURCE_EXHAUSTED` status
/// in the error body; either counts as rate limiting.
fn classify_failure(status: StatusCode, body: &str) -> GenerateError {
    let detail: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let (message, api_status) = match detail {
        Some(parsed) => (parsed.error.message, parsed.error.status),
        None => (body.trim().to_string(), None),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || api_status.as_deref() == Some("RESOURCE_EXHAUSTED")
    {
        GenerateError::RateLimited(message)
    } else {
        GenerateError::Provider(format!("{status}: {message}"))
    }
}

/// Pulls the generated text out of a successful response, surfacing safety
/// refusals distinctly.
fn extract_text(response: GenerateResponse) -> Result<String, GenerateError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(GenerateError::SafetyBlocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenerateError::Provider("Gemini returned no candidates".to_string()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(reason, "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST") {
            return Err(GenerateError::SafetyBlocked(reason.to_string()));
        }
    }

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        Err(GenerateError::Provider(
            "Gemini returned an empty answer".to_string(),
        ))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_classifies_as_rate_limited() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(err, GenerateError::RateLimited(msg) if msg.contains("Quota exceeded")));
    }

    #[test]
    fn resource_exhausted_status_counts_as_rate_limited() {
        // Some deployments surface quota exhaustion with a non-429 HTTP code.
        let body = r#"{"error": {"code": 503, "message": "slow down", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, body);
        assert!(matches!(err, GenerateError::RateLimited(_)));
    }

    #[test]
    fn unparseable_error_body_is_provider_error() {
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "<html>boom</html>");
        match err {
            GenerateError::Provider(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("boom"));
            }
            other => panic!("expected Provider, got {other:?}"),
        }
    }

    #[test]
    fn extracts_candidate_text() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Buscai a sabedoria."}]}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Buscai a sabedoria.");
    }

    #[test]
    fn prompt_block_is_safety_blocked() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(matches!(err, GenerateError::SafetyBlocked(_)));
    }

    #[test]
    fn safety_finish_reason_is_safety_blocked() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]}"#,
        )
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(matches!(err, GenerateError::SafetyBlocked(_)));
    }

    #[test]
    fn empty_candidates_is_provider_error() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let err = extract_text(response).unwrap_err();
        assert!(matches!(err, GenerateError::Provider(_)));
    }
}
