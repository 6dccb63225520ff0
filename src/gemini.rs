// Google Gemini generateContent client and the commute prompt template

use reqwest::blocking;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const PROMPT_TEMPLATE: &str = "Analyze this Stuttgart trip data and give a brief route recommendation.

PREFERENCES:
1. U6 from Pragfriedhof to Feuerbach, then S-Bahn from Feuerbach to Weilimdorf
2. If Feuerbach has issues: U-Bahn to Hauptbahnhof, then train to Weilimdorf

IMPORTANT DECISION RULES:
- First look for trips matching preference 1 with NO issues or delays
- If preference 1 trips exist but have delays, recommend them and state the delay amount
- Only suggest alternatives if preference 1 trips are canceled or unavailable

TRIP DATA:
{trip_data}

Give a 2-3 sentence response that includes:
- Which route to take with departure time from the initial station
- Total time and any delays in minutes
- Any cancellations or service alerts
- Alternative if primary route unavailable

Keep it extremely concise for voice assistant output.";

pub fn build_prompt(trip_data: &str) -> String {
    PROMPT_TEMPLATE.replace("{trip_data}", trip_data)
}

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Gemini HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Gemini returned no text")]
    EmptyResponse,
}

pub trait LanguageModel: Send + Sync {
    /// Sends one prompt and returns the model's text verbatim.
    fn generate(&self, model: &str, prompt: &str) -> Result<String, GeminiError>;
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentOut>,
}

#[derive(Deserialize)]
struct GeminiContentOut {
    #[serde(default)]
    parts: Vec<GeminiPartOut>,
}

#[derive(Deserialize)]
struct GeminiPartOut {
    text: Option<String>,
}

pub struct GeminiClient {
    client: blocking::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GeminiError> {
        let client = blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeminiError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(GeminiClient {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

impl LanguageModel for GeminiClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, GeminiError> {
        let req_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let resp = self.client.post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&req_body)
            .send()
            .map_err(|e| GeminiError::NetworkError(format!("Failed to call Gemini: {}", e)))?;

        let status = resp.status();
        let body_text = resp.text()
            .map_err(|e| GeminiError::NetworkError(format!("Failed to read Gemini response: {}", e)))?;

        log::info!("Gemini status: {}", status);
        log::debug!("Gemini raw body: {}", body_text);

        if !status.is_success() {
            return Err(GeminiError::Http {
                status: status.as_u16(),
                body: body_text,
            });
        }

        parse_generate_response(&body_text)
    }
}

/// Concatenates the text parts of the first candidate.
pub fn parse_generate_response(body: &str) -> Result<String, GeminiError> {
    let body: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| GeminiError::ParseError(format!("Failed to decode Gemini response: {}", e)))?;

    let text: String = body
        .candidates
        .and_then(|cands| cands.into_iter().next())
        .and_then(|cand| cand.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GeminiError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_trip_data_once() {
        let prompt = build_prompt("Departure at 07:00 - Duration: 22 minutes\n");

        assert!(prompt.contains("TRIP DATA:\nDeparture at 07:00 - Duration: 22 minutes\n"));
        assert!(!prompt.contains("{trip_data}"));
        assert!(prompt.starts_with("Analyze this Stuttgart trip data"));
        assert!(prompt.ends_with("Keep it extremely concise for voice assistant output."));
    }

    #[test]
    fn request_body_matches_generate_content_shape() {
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: "hello".to_string(),
                }],
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]}));
    }

    #[test]
    fn endpoint_uses_model_name() {
        let client = GeminiClient::new(
            "https://generativelanguage.googleapis.com/",
            "key",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn joins_parts_of_first_candidate() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [
                    {"text": "Take the U6 at 07:05. "},
                    {"text": "No delays."}
                ]}, "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        assert_eq!(
            parse_generate_response(body).unwrap(),
            "Take the U6 at 07:05. No delays."
        );
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        let err = parse_generate_response(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
            .unwrap_err();
        assert!(matches!(err, GeminiError::EmptyResponse));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = parse_generate_response("not json").unwrap_err();
        assert!(matches!(err, GeminiError::ParseError(_)));
    }
}
