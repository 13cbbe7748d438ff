pub mod ai;
pub mod app;
pub mod extract;
pub mod handler;
pub mod logging;
pub mod search;
pub mod session;
pub mod settings;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use ai::{AiError, Completion, CompletionClient, GeminiClient};
pub use extract::{extract_code, extract_code_block, CodeBlock};
pub use search::{SearchError, SearchResponse, TavilyClient};
pub use session::{describe_failure, Preview, Session};
pub use settings::{Settings, SettingsStore};
pub use state::{ChatMessage, ChatRole, Source};
