use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use helix_outreach::DiagnosticTarget;

use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Exchange(event) => app.apply_exchange(event),
        AppEvent::Diagnostic(target, text) => app.record_diagnostic(target, text),
        AppEvent::Health(healthy) => app.backend_healthy = Some(healthy),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups take the keyboard while open
    if app.show_provider_picker {
        handle_provider_picker(app, key);
        return;
    }
    if app.show_diagnostics && app.input_mode == InputMode::Normal {
        handle_diagnostics(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_chat_editing(app, key),
        InputMode::EditingStep => handle_step_editing(app, key),
    }
}

fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('P') | KeyCode::Char('q') => {
            app.show_provider_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => app.provider_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.provider_picker_nav_up(),
        KeyCode::Enter => app.select_provider(),
        _ => {}
    }
}

fn handle_diagnostics(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::F(2) | KeyCode::Char('D') | KeyCode::Char('q') => {
            app.show_diagnostics = false;
        }
        KeyCode::Char(c) => {
            if let Some(target) = diagnostic_for_key(c) {
                app.run_diagnostic(target);
            }
        }
        _ => {}
    }
}

fn diagnostic_for_key(c: char) -> Option<DiagnosticTarget> {
    match c {
        '1' => Some(DiagnosticTarget::OpenAI),
        '2' => Some(DiagnosticTarget::Gemini),
        '3' => Some(DiagnosticTarget::Supabase),
        _ => None,
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Switch panel
        KeyCode::Tab | KeyCode::BackTab => {
            app.focus = match app.focus {
                FocusPane::Chat => FocusPane::Workspace,
                FocusPane::Workspace => FocusPane::Chat,
            };
        }

        // Start typing
        KeyCode::Char('i') | KeyCode::Enter => match app.focus {
            FocusPane::Chat => {
                // Input is disabled while a response is pending
                if !app.controller.is_generating() {
                    app.input_mode = InputMode::Editing;
                }
            }
            FocusPane::Workspace => {
                app.begin_step_edit();
            }
        },

        // Navigation
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Chat => app.scroll_chat_down(1),
            FocusPane::Workspace => app.select_next_step(),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Chat => app.scroll_chat_up(1),
            FocusPane::Workspace => app.select_prev_step(),
        },
        KeyCode::PageDown => app.scroll_chat_down(app.chat_height.max(2) / 2),
        KeyCode::PageUp => app.scroll_chat_up(app.chat_height.max(2) / 2),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Provider picker
        KeyCode::Char('P') => app.open_provider_picker(),

        // Connection tests
        KeyCode::F(2) | KeyCode::Char('D') => app.show_diagnostics = true,
        KeyCode::Char(c) => {
            if let Some(target) = diagnostic_for_key(c) {
                app.run_diagnostic(target);
            }
        }
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if app.can_send() {
                app.submit_chat();
                app.input_mode = InputMode::Normal;
            }
        }
        // Input is disabled while a response is pending
        _ if app.controller.is_generating() => {}
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.chat_cursor = 0;
        }
        KeyCode::End => {
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

fn handle_step_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.finish_step_edit(),
        KeyCode::Enter => app.modify_selected_step(|text, cursor| insert_char(text, cursor, '\n')),
        KeyCode::Char(c) => app.modify_selected_step(|text, cursor| insert_char(text, cursor, c)),
        KeyCode::Backspace => app.modify_selected_step(|text, cursor| {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }),
        KeyCode::Delete => app.modify_selected_step(|text, cursor| {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }),
        KeyCode::Left => {
            app.step_cursor = app.step_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.selected_step_content().map(|t| t.chars().count()).unwrap_or(0);
            app.step_cursor = (app.step_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.step_cursor = 0;
        }
        KeyCode::End => {
            app.step_cursor = app.selected_step_content().map(|t| t.chars().count()).unwrap_or(0);
        }
        _ => {}
    }
}

fn insert_char(text: &mut String, cursor: &mut usize, c: char) {
    let byte_pos = char_to_byte_index(text, *cursor);
    text.insert(byte_pos, c);
    *cursor += 1;
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    // Determine which area the mouse is in (position-based scrolling)
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_workspace = app.workspace_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.scroll_chat_down(3);
            } else if in_workspace && app.input_mode != InputMode::EditingStep {
                app.select_next_step();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.scroll_chat_up(3);
            } else if in_workspace && app.input_mode != InputMode::EditingStep {
                app.select_prev_step();
            }
        }
        _ => {}
    }
}
