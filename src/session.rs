//! Conversation orchestration: the message log, the single in-flight send,
//! and the implementation preview fed by code extraction.

use crate::ai::{AiError, Completion, CompletionClient};
use crate::extract::extract_code_block;
use crate::settings::Settings;
use crate::state::ChatMessage;

/// Shown in the preview pane until the first extraction
pub const PREVIEW_PLACEHOLDER: &str = "// DevAgent workspace
// Describe a feature or bug in the console to the left.

/* Example:
   \"Build a custom React hook for handling local storage with encryption\"
*/";

/// Previews shorter than this can't be sent to fix & refactor
pub const MIN_REFACTOR_CHARS: usize = 20;

const REFACTOR_TEMPLATE: &str =
    "Perform a full code audit and refactor on this implementation. Fix any bugs and optimize for performance:\n\n";

/// Ordered failure rules: the first rule with a marker found in the error
/// text supplies the message shown to the user.
pub const FAILURE_RULES: &[(&[&str], &str)] = &[
    (
        &["RESOURCE_EXHAUSTED", "quota", "insufficient_quota"],
        "Quota exceeded for the current model. Try switching to a different model in settings or upgrade your Google AI plan at https://ai.google.dev.",
    ),
    (
        &["API_KEY_INVALID", "API key not valid", "missing API key"],
        "The Gemini API key is missing or was rejected. Set GEMINI_API_KEY to a valid key from https://aistudio.google.com and restart.",
    ),
];

/// Map a provider failure to the assistant message shown in the console.
pub fn describe_failure(error: &str) -> String {
    FAILURE_RULES
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| error.contains(m)))
        .map(|(_, message)| (*message).to_string())
        .unwrap_or_else(|| {
            format!("Connection Error: {error}. Ensure GEMINI_API_KEY is set to a valid Gemini API key.")
        })
}

/// The code shown in the preview pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub code: String,
    pub language: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    settings: Settings,
    messages: Vec<ChatMessage>,
    preview: Preview,
    busy: bool,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            messages: Vec::new(),
            preview: Preview {
                code: PREVIEW_PLACEHOLDER.to_string(),
                language: None,
            },
            busy: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Start a send. Returns the history to hand to the client, or `None`
    /// when the text is blank or another send is still outstanding; a
    /// rejected call changes nothing.
    pub fn begin_send(&mut self, text: &str) -> Option<Vec<ChatMessage>> {
        if text.trim().is_empty() || self.busy {
            return None;
        }

        self.messages.push(ChatMessage::user(text));
        self.busy = true;
        Some(self.messages.clone())
    }

    /// Record the outcome of the send started by [`Session::begin_send`].
    pub fn finish_send(&mut self, result: Result<Completion, AiError>) {
        match result {
            Ok(Completion { text, sources }) => {
                let block = extract_code_block(&text);
                self.messages.push(ChatMessage::assistant(text, sources));
                if let Some(block) = block {
                    self.preview = Preview {
                        code: block.code,
                        language: block.language,
                    };
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "completion failed");
                self.messages
                    .push(ChatMessage::assistant(describe_failure(&e.to_string()), Vec::new()));
            }
        }
        self.busy = false;
    }

    /// One full round trip. Returns `false` if the send was rejected.
    pub async fn send_message(&mut self, client: &dyn CompletionClient, text: &str) -> bool {
        let Some(history) = self.begin_send(text) else {
            return false;
        };
        let result = client.complete(&history, &self.settings).await;
        self.finish_send(result);
        true
    }

    pub fn refactor_available(&self) -> bool {
        !self.busy && self.preview.code.chars().count() >= MIN_REFACTOR_CHARS
    }

    /// The fix & refactor instruction for the current preview
    pub fn refactor_prompt(&self) -> Option<String> {
        self.refactor_available()
            .then(|| format!("{REFACTOR_TEMPLATE}{}", self.preview.code))
    }

    pub fn begin_refactor(&mut self) -> Option<Vec<ChatMessage>> {
        let prompt = self.refactor_prompt()?;
        self.begin_send(&prompt)
    }

    /// Drop the whole conversation. The preview stays.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
