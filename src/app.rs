use std::collections::HashMap;
use std::sync::Arc;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use helix_outreach::api::run_exchange;
use helix_outreach::diagnostics::format_result;
use helix_outreach::{
    ApiClient, Config, Controller, DiagnosticTarget, ExchangeEvent, ExchangeRequest, Provider,
    UserId,
};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing into the chat input
    Editing,
    /// Typing into the selected workspace step
    EditingStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Workspace,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation and sequence (owned by the controller)
    pub controller: Controller,

    // Chat panel state
    pub chat_input: String,
    pub chat_cursor: usize, // cursor position in chat_input, in chars
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    seen_messages: usize,

    // Workspace panel state
    pub selected_step: usize,
    pub step_cursor: usize,
    pub workspace_scroll: u16,
    pub workspace_height: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Provider picker state
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // Diagnostics popup state
    pub show_diagnostics: bool,
    pub diagnostics: HashMap<DiagnosticTarget, String>,

    // Backend reachability from the start-up health check
    pub backend_healthy: Option<bool>,

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub workspace_area: Option<Rect>,

    // Backend access
    pub api: Arc<ApiClient>,
    pub persist_edits: bool,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: &Config, user_id: UserId, events: UnboundedSender<AppEvent>) -> Self {
        let mut controller = Controller::new(user_id, config.provider());
        controller.set_model_name(config.model_name.clone());

        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            focus: FocusPane::Chat,

            controller,

            chat_input: String::new(),
            chat_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            seen_messages: 0,

            selected_step: 0,
            step_cursor: 0,
            workspace_scroll: 0,
            workspace_height: 0,

            animation_frame: 0,

            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            show_diagnostics: false,
            diagnostics: HashMap::new(),

            backend_healthy: None,

            chat_area: None,
            workspace_area: None,

            api: Arc::new(ApiClient::new(config.api_url())),
            persist_edits: config.persist_edits,
            events,
        }
    }

    /// Whether the chat input currently accepts a submission
    pub fn can_send(&self) -> bool {
        !self.controller.is_generating() && !self.chat_input.trim().is_empty()
    }

    /// Send the chat input. The input is cleared before the backend answers.
    pub fn submit_chat(&mut self) {
        if !self.can_send() {
            return;
        }

        let content = std::mem::take(&mut self.chat_input);
        self.chat_cursor = 0;

        match self.controller.begin_exchange(&content) {
            Ok(request) => {
                self.spawn_exchange(request);
                self.after_messages_changed();
            }
            Err(rejected) => warn!(%rejected, "message not sent"),
        }
    }

    fn spawn_exchange(&self, request: ExchangeRequest) {
        let api = Arc::clone(&self.api);
        let tx = self.events.clone();

        // Run the exchange in its own task so a panic still reports back
        tokio::spawn(async move {
            let tx_events = tx.clone();
            let exchange = tokio::spawn(async move {
                run_exchange(api.as_ref(), request, |event| {
                    let _ = tx_events.send(AppEvent::Exchange(event));
                })
                .await;
            });

            if let Err(err) = exchange.await {
                let _ = tx.send(AppEvent::Exchange(ExchangeEvent::Aborted(err.to_string())));
            }
        });
    }

    pub fn apply_exchange(&mut self, event: ExchangeEvent) {
        let replaced_sequence = matches!(event, ExchangeEvent::SequenceGenerated { .. });
        self.controller.apply(event);

        if replaced_sequence {
            self.selected_step = 0;
            self.step_cursor = 0;
            self.workspace_scroll = 0;
            if self.input_mode == InputMode::EditingStep {
                self.input_mode = InputMode::Normal;
            }
        }
        self.after_messages_changed();
    }

    /// Keep the newest message in view whenever the transcript grows
    fn after_messages_changed(&mut self) {
        let count = self.controller.messages().len();
        if count != self.seen_messages {
            self.seen_messages = count;
            self.scroll_chat_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.controller.is_generating() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll chat to bottom so the newest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.controller.messages() {
            if !msg.is_status() {
                total_lines = total_lines.saturating_add(1); // Role line
            }
            total_lines = total_lines.saturating_add(wrapped_line_count(&msg.content, wrap_width));
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.controller.is_generating() {
            total_lines = total_lines.saturating_add(1);
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    // Workspace methods
    pub fn step_count(&self) -> usize {
        self.controller.sequence().map(|s| s.steps.len()).unwrap_or(0)
    }

    pub fn select_next_step(&mut self) {
        let len = self.step_count();
        if len > 0 {
            self.selected_step = (self.selected_step + 1).min(len - 1);
        }
    }

    pub fn select_prev_step(&mut self) {
        self.selected_step = self.selected_step.saturating_sub(1);
    }

    pub fn selected_step_content(&self) -> Option<&str> {
        self.controller
            .sequence()
            .and_then(|s| s.steps.get(self.selected_step))
            .map(|step| step.content.as_str())
    }

    /// Start editing the selected step, cursor at the end of its text
    pub fn begin_step_edit(&mut self) -> bool {
        let Some(content) = self.selected_step_content() else {
            return false;
        };
        self.step_cursor = content.chars().count();
        self.input_mode = InputMode::EditingStep;
        self.focus = FocusPane::Workspace;
        true
    }

    /// Apply an in-place edit to the selected step's text.
    ///
    /// Every change goes straight to the controller; there is no save step.
    pub fn modify_selected_step(&mut self, edit: impl FnOnce(&mut String, &mut usize)) {
        let Some(current) = self.selected_step_content() else {
            return;
        };
        let mut content = current.to_string();
        let mut cursor = self.step_cursor;

        edit(&mut content, &mut cursor);

        if self.controller.edit_step(self.selected_step, &content) {
            self.step_cursor = cursor;
        }
    }

    pub fn finish_step_edit(&mut self) {
        self.input_mode = InputMode::Normal;
        if self.persist_edits {
            self.persist_sequence();
        }
    }

    /// Push the current steps to the backend's update-sequence endpoint
    fn persist_sequence(&self) {
        let Some(sequence) = self.controller.sequence() else {
            return;
        };
        let Some(id) = sequence.id.clone() else {
            info!("sequence has no id; skipping persistence");
            return;
        };

        let api = Arc::clone(&self.api);
        let steps = sequence.steps.clone();
        tokio::spawn(async move {
            match api.update_sequence(&id, &steps).await {
                Ok(_) => info!(sequence_id = %id, steps = steps.len(), "sequence saved"),
                Err(err) => warn!(sequence_id = %id, error = %err, "failed to save sequence"),
            }
        });
    }

    // Provider picker methods
    pub fn open_provider_picker(&mut self) {
        let current = self.controller.provider();
        let index = Provider::all().iter().position(|p| *p == current);
        self.provider_picker_state.select(index.or(Some(0)));
        self.show_provider_picker = true;
    }

    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        if len > 0 {
            let i = self.provider_picker_state.selected().unwrap_or(0);
            self.provider_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_provider(&mut self) {
        if let Some(i) = self.provider_picker_state.selected() {
            if let Some(provider) = Provider::all().get(i) {
                self.set_provider(*provider);
            }
        }
        self.show_provider_picker = false;
    }

    pub fn set_provider(&mut self, provider: Provider) {
        self.controller.set_provider(provider);
        info!(%provider, "provider selected");
        // Save to config
        if let Err(err) = Config::save_provider(provider) {
            warn!(error = %err, "could not save provider to config");
        }
    }

    // Diagnostics
    pub fn run_diagnostic(&mut self, target: DiagnosticTarget) {
        self.diagnostics.insert(target, target.pending_text());
        self.show_diagnostics = true;

        let api = Arc::clone(&self.api);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = target.run(&api).await;
            if let Err(err) = &result {
                warn!(service = target.label(), error = %err, "connection test failed");
            }
            let _ = tx.send(AppEvent::Diagnostic(target, format_result(&result)));
        });
    }

    pub fn record_diagnostic(&mut self, target: DiagnosticTarget, text: String) {
        self.diagnostics.insert(target, text);
    }

    pub fn check_backend(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let healthy = match api.health_check().await {
                Ok(_) => {
                    info!(url = api.base_url(), "backend reachable");
                    true
                }
                Err(err) => {
                    warn!(url = api.base_url(), error = %err, "backend health check failed");
                    false
                }
            };
            let _ = tx.send(AppEvent::Health(healthy));
        });
    }
}

/// Number of terminal rows `text` takes when wrapped at `width` columns
pub fn wrapped_line_count(text: &str, width: usize) -> u16 {
    let width = width.max(1);
    let mut lines: u16 = 0;
    for line in text.lines() {
        // Use character count, not byte length, for proper UTF-8 handling
        let char_count = line.chars().count();
        let rows = if char_count == 0 { 1 } else { char_count.div_ceil(width) };
        lines = lines.saturating_add(u16::try_from(rows).unwrap_or(u16::MAX));
    }
    lines.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_outreach::api::{ChatResponse, SequenceResponse};
    use helix_outreach::model::SequenceContext;
    use helix_outreach::ApiError;

    #[test]
    fn test_wrapped_line_count() {
        assert_eq!(wrapped_line_count("", 10), 1);
        assert_eq!(wrapped_line_count("abc", 10), 1);
        assert_eq!(wrapped_line_count("abcdefghijk", 10), 2);
        assert_eq!(wrapped_line_count("a\n\nb", 10), 3);
    }

    #[test]
    fn test_wrapped_line_count_saturates() {
        let long = "x".repeat(70_000);
        assert_eq!(wrapped_line_count(&long, 1), u16::MAX);
    }

    fn test_app() -> App {
        let config = Config {
            api_url: Some("http://127.0.0.1:9/api".to_string()),
            ..Config::new()
        };
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        App::new(&config, UserId::from("user-1"), tx)
    }

    #[test]
    fn test_new_messages_scroll_chat_to_bottom() {
        let mut app = test_app();
        app.chat_height = 5;
        app.chat_width = 40;

        app.controller.begin_exchange("hello").expect("send");
        app.apply_exchange(ExchangeEvent::ChatReplied(ChatResponse {
            message: "hi there".to_string(),
            status: "success".to_string(),
        }));
        // user (3 rows) + assistant (3 rows) + generating line, 5 visible
        assert_eq!(app.chat_scroll, 2);

        app.scroll_chat_up(10);
        assert_eq!(app.chat_scroll, 0);

        app.apply_exchange(ExchangeEvent::SequenceFailed(ApiError::MalformedResponse(
            "missing `sequence`".to_string(),
        )));
        // status notice (2 rows) replaces the generating line
        assert_eq!(app.chat_scroll, 3);
    }

    #[test]
    fn test_unchanged_messages_keep_manual_scroll() {
        let mut app = test_app();
        app.chat_height = 2;
        app.controller.begin_exchange("hello").expect("send");
        app.apply_exchange(ExchangeEvent::ChatReplied(ChatResponse {
            message: "hi there".to_string(),
            status: "success".to_string(),
        }));
        app.scroll_chat_up(1);
        let scrolled = app.chat_scroll;

        app.apply_exchange(ExchangeEvent::SequenceGenerated {
            response: SequenceResponse {
                sequence: vec![],
                status: "success".to_string(),
                sequence_id: None,
            },
            context: SequenceContext {
                messages: vec![],
                user_request: "hello".to_string(),
            },
        });
        assert_eq!(app.chat_scroll, scrolled);
    }
}
