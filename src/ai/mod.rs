pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::settings::Settings;
use crate::state::{ChatMessage, Source};

/// Attached to every completion request, outside the visible history
pub const SYSTEM_PROMPT: &str = "You are a Senior Autonomous AI Coding Agent. Your mission is to provide production-ready code, architectural specifications, and debugging solutions.

PROTOCOL:
1. INSTRUCTION CONSOLE (Left Panel): Explain the logic, architectural decisions, and steps for implementation. Provide reasoning and best practices.
2. IMPLEMENTATION PREVIEW (Right Panel): You MUST wrap the primary code implementation in a single markdown code block at the end of your answer (e.g., ```typescript ... ```). The app automatically extracts the LAST code block and displays it on the right side.
3. GROUNDING: Use the search tool to verify the latest library versions, API documentation, and modern coding standards.

Always ensure the code is complete, self-contained, and optimized for performance.";

/// Text and citations returned for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Errors produced by AI provider calls
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// No key in `GEMINI_API_KEY` or `API_KEY`
    #[error("missing API key: set GEMINI_API_KEY")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Request(String),

    /// Non-success status; `body` is the provider's text, untouched
    #[error("Gemini API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response parse failed: {0}")]
    Parse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// A provider that turns a conversation into a grounded reply
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        history: &[ChatMessage],
        settings: &Settings,
    ) -> Result<Completion, AiError>;
}
