use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{AiError, Completion, CompletionClient, SYSTEM_PROMPT};
use crate::settings::{Settings, DEFAULT_MODEL};
use crate::state::{ChatMessage, ChatRole, Source};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: SystemInstruction<'a>,
    tools: Vec<Tool>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebReference>,
}

#[derive(Deserialize)]
struct WebReference {
    uri: Option<String>,
    title: Option<String>,
}

/// Gemini `generateContent` client with Google Search grounding
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AiError::HttpClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Key from `GEMINI_API_KEY`, falling back to `API_KEY`.
    ///
    /// A missing key is not an error here; requests fail with
    /// [`AiError::MissingApiKey`] instead so the UI can still start.
    pub fn from_env() -> Result<Self, AiError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .or_else(|| std::env::var("API_KEY").ok());
        Self::new(api_key)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The key travels in a header so it never shows up in a logged URL
    fn http_request(
        &self,
        api_key: &str,
        model: &str,
        history: &[ChatMessage],
    ) -> reqwest::Result<reqwest::Request> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        self.client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&build_request(history))
            .build()
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(
        &self,
        history: &[ChatMessage],
        settings: &Settings,
    ) -> Result<Completion, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::MissingApiKey)?;
        let model = model_or_default(&settings.model);
        let request = self
            .http_request(api_key, model, history)
            .map_err(|e| AiError::Request(e.to_string()))?;

        tracing::info!(model, messages = history.len(), "sending generateContent request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Gemini returned an error status");
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion = parse_response(&body)?;
        tracing::info!(
            chars = completion.text.len(),
            sources = completion.sources.len(),
            "generateContent finished"
        );
        Ok(completion)
    }
}

fn model_or_default(model: &str) -> &str {
    let model = model.trim();
    if model.is_empty() {
        DEFAULT_MODEL
    } else {
        model
    }
}

/// Assistant turns are sent as `model`; every other role is sent as `user`.
fn gemini_role(role: ChatRole) -> &'static str {
    match role {
        ChatRole::Assistant => "model",
        ChatRole::User | ChatRole::System | ChatRole::Tool => "user",
    }
}

fn build_request(history: &[ChatMessage]) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: history
            .iter()
            .map(|msg| Content {
                role: gemini_role(msg.role),
                parts: vec![Part { text: &msg.content }],
            })
            .collect(),
        system_instruction: SystemInstruction {
            parts: vec![Part { text: SYSTEM_PROMPT }],
        },
        tools: vec![Tool {
            google_search: GoogleSearch {},
        }],
    }
}

fn parse_response(body: &str) -> Result<Completion, AiError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| AiError::Parse(e.to_string()))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(Completion::default());
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let sources = candidate
        .grounding_metadata
        .map(|meta| {
            meta.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .map(|web| Source::new(web.title.as_deref(), web.uri.unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    Ok(Completion { text, sources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UNTITLED_SOURCE;

    #[test]
    fn test_api_key_goes_in_header_not_url() {
        let client = GeminiClient::new(Some("secret-key".to_string()))
            .unwrap()
            .with_base_url("http://localhost:9");
        let request = client
            .http_request("secret-key", "gemini-1.5-flash", &[ChatMessage::user("hi")])
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://localhost:9/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(!request.url().as_str().contains("secret-key"));
        assert_eq!(request.headers()["x-goog-api-key"], "secret-key");
    }

    #[test]
    fn test_request_maps_roles_and_attaches_prompt() {
        let history = vec![
            ChatMessage::user("build a hook"),
            ChatMessage::assistant("here it is", Vec::new()),
            ChatMessage::new(ChatRole::System, "note"),
            ChatMessage::user("now fix it"),
        ];
        let json = serde_json::to_value(build_request(&history)).unwrap();

        let roles: Vec<&str> = json["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user", "user"]);
        assert_eq!(json["contents"][1]["parts"][0]["text"], "here it is");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], SYSTEM_PROMPT);
        assert_eq!(json["tools"], serde_json::json!([{ "google_search": {} }]));
    }

    #[test]
    fn test_parse_text_and_web_sources() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "Use a hook.\n" }, { "text": "```ts\nx\n```" }]
                },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://react.dev", "title": "react.dev" } },
                        { "retrievedContext": { "uri": "gs://bucket" } },
                        { "web": { "uri": "https://mdn.dev" } }
                    ]
                }
            }]
        })
        .to_string();

        let completion = parse_response(&body).unwrap();
        assert_eq!(completion.text, "Use a hook.\n```ts\nx\n```");
        assert_eq!(
            completion.sources,
            vec![
                Source { title: "react.dev".to_string(), url: "https://react.dev".to_string() },
                Source { title: UNTITLED_SOURCE.to_string(), url: "https://mdn.dev".to_string() },
            ]
        );
    }

    #[test]
    fn test_parse_without_candidates_is_empty() {
        let completion = parse_response("{}").unwrap();
        assert_eq!(completion, Completion::default());

        let body = serde_json::json!({ "candidates": [{ "finishReason": "SAFETY" }] }).to_string();
        assert_eq!(parse_response(&body).unwrap(), Completion::default());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(parse_response("<html>"), Err(AiError::Parse(_))));
    }

    #[test]
    fn test_empty_model_uses_default() {
        assert_eq!(model_or_default(""), DEFAULT_MODEL);
        assert_eq!(model_or_default(" gemini-3-pro-preview "), "gemini-3-pro-preview");
    }

    #[test]
    fn test_api_error_keeps_provider_text() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#;
        let err = AiError::Api { status: 429, body: body.to_string() };
        assert!(err.to_string().contains(body));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = GeminiClient::new(None).unwrap().with_base_url("http://127.0.0.1:9");
        let err = client
            .complete(&[ChatMessage::user("hi")], &Settings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey));
        assert!(!client.has_api_key());
    }
}
