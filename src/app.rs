use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::ai::{AiError, Completion, CompletionClient};
use crate::session::Session;
use crate::settings::{Settings, SettingsStore, MODEL_CHOICES};
use crate::state::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Console,
    Preview,
    Input,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Console => FocusPane::Preview,
            FocusPane::Preview => FocusPane::Input,
            FocusPane::Input => FocusPane::Console,
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation and the request it is waiting on
    pub session: Session,
    pub client: Arc<dyn CompletionClient>,
    pub pending: Option<JoinHandle<Result<Completion, AiError>>>,
    pub store: Option<SettingsStore>,

    // Prompt input
    pub input: String,
    pub cursor: usize, // char index into input

    // Console pane
    pub console_scroll: u16,
    pub console_height: u16,
    pub console_width: u16,

    // Preview pane
    pub preview_scroll: u16,
    pub preview_height: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // Tavily key input state
    pub show_key_input: bool,
    pub key_input: String,
    pub key_input_cursor: usize,

    /// One-line feedback shown in the footer until the next key press
    pub status: Option<String>,

    // Panel areas for mouse hit-testing (updated during render)
    pub console_area: Option<Rect>,
    pub preview_area: Option<Rect>,
}

impl App {
    /// `store` is where model and key changes are saved; `None` keeps them
    /// for this session only.
    pub fn new(session: Session, client: Arc<dyn CompletionClient>, store: Option<SettingsStore>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            session,
            client,
            pending: None,
            store,

            input: String::new(),
            cursor: 0,

            console_scroll: 0,
            console_height: 0,
            console_width: 0,

            preview_scroll: 0,
            preview_height: 0,

            animation_frame: 0,

            show_model_picker: false,
            model_picker_state: ListState::default(),

            show_key_input: false,
            key_input: String::new(),
            key_input_cursor: 0,

            status: None,

            console_area: None,
            preview_area: None,
        }
    }

    /// Send the prompt input. The input is only cleared if the send started.
    pub fn submit_input(&mut self) {
        let text = self.input.clone();
        if self.send(&text) {
            self.input.clear();
            self.cursor = 0;
        }
    }

    pub fn send(&mut self, text: &str) -> bool {
        match self.session.begin_send(text) {
            Some(history) => {
                self.spawn_request(history);
                true
            }
            None => false,
        }
    }

    pub fn fix_and_refactor(&mut self) -> bool {
        match self.session.begin_refactor() {
            Some(history) => {
                self.spawn_request(history);
                true
            }
            None => {
                self.status = Some("Nothing to refactor yet".to_string());
                false
            }
        }
    }

    fn spawn_request(&mut self, history: Vec<ChatMessage>) {
        let client = Arc::clone(&self.client);
        let settings = self.session.settings().clone();
        self.pending = Some(tokio::spawn(async move {
            client.complete(&history, &settings).await
        }));
        self.scroll_console_to_bottom();
    }

    /// Hand a finished request back to the session. A task that panicked
    /// still clears the busy state, as a failed request.
    pub async fn poll_pending(&mut self) {
        if !self.pending.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        let Some(handle) = self.pending.take() else {
            return;
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "request task did not complete");
                Err(AiError::Request(format!("request task failed: {e}")))
            }
        };

        let preview_before = self.session.preview().clone();
        self.session.finish_send(result);
        if self.session.preview() != &preview_before {
            self.preview_scroll = 0;
        }
        self.scroll_console_to_bottom();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn clear_conversation(&mut self) {
        if self.session.is_busy() {
            self.status = Some("Wait for the current request to finish".to_string());
            return;
        }
        self.session.clear();
        self.console_scroll = 0;
    }

    /// Scroll the console so the latest message (or "Thinking...") is visible
    pub fn scroll_console_to_bottom(&mut self) {
        let wrap_width = if self.console_width > 0 {
            self.console_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.session.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add((char_count / wrap_width + 1) as u16);
            }
            if !msg.sources.is_empty() {
                total_lines = total_lines.saturating_add(msg.sources.len() as u16 + 1);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.session.is_busy() {
            total_lines = total_lines.saturating_add(2);
        }

        let visible_height = if self.console_height > 0 {
            self.console_height
        } else {
            20
        };

        self.console_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_focused_down(&mut self, lines: u16) {
        match self.focus {
            FocusPane::Console | FocusPane::Input => {
                self.console_scroll = self.console_scroll.saturating_add(lines);
            }
            FocusPane::Preview => {
                let max = (self.session.preview().code.lines().count() as u16)
                    .saturating_sub(self.preview_height);
                self.preview_scroll = self.preview_scroll.saturating_add(lines).min(max);
            }
        }
    }

    pub fn scroll_focused_up(&mut self, lines: u16) {
        match self.focus {
            FocusPane::Console | FocusPane::Input => {
                self.console_scroll = self.console_scroll.saturating_sub(lines);
            }
            FocusPane::Preview => {
                self.preview_scroll = self.preview_scroll.saturating_sub(lines);
            }
        }
    }

    // Model picker
    pub fn open_model_picker(&mut self) {
        let current = MODEL_CHOICES
            .iter()
            .position(|(id, _)| *id == self.session.settings().model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state
            .select(Some((i + 1).min(MODEL_CHOICES.len() - 1)));
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some((id, _)) = self
            .model_picker_state
            .selected()
            .and_then(|i| MODEL_CHOICES.get(i))
        {
            let settings = Settings {
                model: (*id).to_string(),
                ..self.session.settings().clone()
            };
            self.apply_settings(settings);
        }
        self.show_model_picker = false;
    }

    // Tavily key input
    pub fn open_key_input(&mut self) {
        self.key_input = self.session.settings().tavily_api_key.clone().unwrap_or_default();
        self.key_input_cursor = self.key_input.chars().count();
        self.show_key_input = true;
    }

    pub fn save_key_input(&mut self) {
        let key = self.key_input.trim();
        let settings = Settings {
            tavily_api_key: (!key.is_empty()).then(|| key.to_string()),
            ..self.session.settings().clone()
        };
        self.apply_settings(settings);
        self.show_key_input = false;
        self.key_input.clear();
        self.key_input_cursor = 0;
    }

    fn apply_settings(&mut self, settings: Settings) {
        if let Some(store) = &self.store {
            match store.save(&settings) {
                Ok(()) => self.status = Some("Settings saved".to_string()),
                Err(e) => {
                    tracing::error!(error = %e, "failed to save settings");
                    self.status = Some(format!("Could not save settings: {e}"));
                }
            }
        }
        self.session.set_settings(settings);
    }

    pub fn copy_preview(&mut self) {
        let copied = copy_to_clipboard(&self.session.preview().code);
        self.status = Some(if copied {
            "Implementation copied".to_string()
        } else {
            "No clipboard tool found (pbcopy, wl-copy, xclip)".to_string()
        });
    }
}

/// Pipe text into the first clipboard tool that starts
fn copy_to_clipboard(text: &str) -> bool {
    const TOOLS: &[(&str, &[&str])] = &[
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    TOOLS
        .iter()
        .find_map(|(program, args)| pipe_to(program, args, text))
        .unwrap_or(false)
}

/// `None` if the program could not be started. Otherwise whether the whole
/// text was written and the program exited cleanly.
fn pipe_to(program: &str, args: &[&str], text: &str) -> Option<bool> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(program).args(args).stdin(Stdio::piped()).spawn().ok()?;

    // stdin drops after the write so the tool sees EOF
    let written = match child.stdin.take() {
        Some(mut stdin) => match stdin.write_all(text.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(program, error = %e, "clipboard write failed");
                false
            }
        },
        None => false,
    };

    let exited_ok = child.wait().map(|s| s.success()).unwrap_or(false);
    Some(written && exited_ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, history: &[ChatMessage], _settings: &Settings) -> Result<Completion, AiError> {
            let last = history.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Completion {
                text: format!("Echo:\n```text\n{last}\n```"),
                sources: Vec::new(),
            })
        }
    }

    struct PanickingClient;

    #[async_trait]
    impl CompletionClient for PanickingClient {
        async fn complete(&self, _history: &[ChatMessage], _settings: &Settings) -> Result<Completion, AiError> {
            panic!("provider blew up");
        }
    }

    fn app_with(client: Arc<dyn CompletionClient>) -> App {
        App::new(Session::new(Settings::default()), client, None)
    }

    async fn settle(app: &mut App) {
        for _ in 0..200 {
            app.poll_pending().await;
            if app.pending.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request never finished");
    }

    #[tokio::test]
    async fn test_submit_round_trip() {
        let mut app = app_with(Arc::new(EchoClient));
        app.input = "make a counter".to_string();
        app.cursor = app.input.chars().count();

        app.submit_input();
        assert!(app.input.is_empty());
        assert!(app.session.is_busy());

        settle(&mut app).await;
        assert!(!app.session.is_busy());
        assert_eq!(app.session.messages().len(), 2);
        assert_eq!(app.session.preview().code, "make a counter");
        assert_eq!(app.session.preview().language.as_deref(), Some("text"));
    }

    #[tokio::test]
    async fn test_submit_while_busy_keeps_input() {
        let mut app = app_with(Arc::new(EchoClient));
        assert!(app.send("first"));

        app.input = "second".to_string();
        app.submit_input();
        assert_eq!(app.input, "second");
        assert_eq!(app.session.messages().len(), 1);

        settle(&mut app).await;
        assert_eq!(app.session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_panicked_request_clears_busy() {
        let mut app = app_with(Arc::new(PanickingClient));
        assert!(app.send("hello"));

        settle(&mut app).await;
        assert!(!app.session.is_busy());
        let last = app.session.messages().last().unwrap();
        assert!(last.content.starts_with("Connection Error"));
    }

    #[tokio::test]
    async fn test_refactor_sends_preview() {
        let mut app = app_with(Arc::new(EchoClient));
        let placeholder = app.session.preview().code.clone();

        assert!(app.fix_and_refactor());
        assert!(!app.fix_and_refactor());
        settle(&mut app).await;

        assert!(app.session.messages()[0].content.ends_with(&placeholder));
        assert_eq!(app.session.messages().len(), 2);
    }

    #[test]
    fn test_select_model_saves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut app = App::new(Session::new(Settings::default()), Arc::new(EchoClient), Some(store.clone()));

        app.open_model_picker();
        app.model_picker_state.select(Some(0));
        app.select_model();

        assert_eq!(app.session.settings().model, MODEL_CHOICES[0].0);
        assert_eq!(store.load().model, MODEL_CHOICES[0].0);
        assert!(!app.show_model_picker);
    }

    #[test]
    fn test_key_input_saves_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let mut app = App::new(Session::new(Settings::default()), Arc::new(EchoClient), Some(store.clone()));

        app.open_key_input();
        app.key_input = " tvly-xyz ".to_string();
        app.save_key_input();
        assert_eq!(store.load().tavily_api_key.as_deref(), Some("tvly-xyz"));

        app.open_key_input();
        assert_eq!(app.key_input, "tvly-xyz");
        app.key_input.clear();
        app.save_key_input();
        assert_eq!(store.load().tavily_api_key, None);
    }

    #[test]
    fn test_focus_cycles() {
        assert_eq!(FocusPane::Console.next(), FocusPane::Preview);
        assert_eq!(FocusPane::Preview.next(), FocusPane::Input);
        assert_eq!(FocusPane::Input.next(), FocusPane::Console);
    }

    #[test]
    fn test_pipe_to_missing_program_is_none() {
        assert_eq!(pipe_to("devagent-no-such-clipboard-tool", &[], "x"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_to_reports_success() {
        assert_eq!(pipe_to("sh", &["-c", "cat > /dev/null"], "fn main() {}"), Some(true));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipe_to_reports_failed_write() {
        // Larger than a pipe buffer, so the write hits the closed stdin
        let text = "x".repeat(4 * 1024 * 1024);
        assert_eq!(pipe_to("sh", &["-c", "exec 0<&-; exit 0"], &text), Some(false));
    }
}
