use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use helix_outreach::{DiagnosticTarget, MessageKind, Provider};

use crate::app::{wrapped_line_count, App, FocusPane, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if end == 0 {
            // "****" is not bold text; keep it literal
            spans.push(Span::raw(rest[..start + 4].to_string()));
            rest = &after[2..];
            continue;
        }
        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after[..end].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after[end + 2..];
    }

    // Push any remaining text
    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    // Chat on the left, workspace on the right
    let [chat_area, workspace_area] = Layout::horizontal([
        Constraint::Percentage(50),
        Constraint::Percentage(50),
    ])
    .areas(body_area);

    render_chat(app, frame, chat_area);
    render_workspace(app, frame, workspace_area);

    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    } else if app.show_diagnostics {
        render_diagnostics(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let backend = match app.backend_healthy {
        Some(true) => Span::styled(" backend ok ", Style::default().fg(Color::Green)),
        Some(false) => Span::styled(" backend unreachable ", Style::default().fg(Color::Red)),
        None => Span::styled(" checking backend ", Style::default().fg(Color::DarkGray)),
    };

    let model = app
        .controller
        .model_name()
        .map(|m| format!(" / {}", m))
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" Helix - Recruiting Outreach Agent ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}{}]", app.controller.provider().display_name(), model),
            Style::default().fg(Color::Yellow),
        ),
        backend,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing | InputMode::EditingStep => {
            Style::default().bg(Color::Yellow).fg(Color::Black)
        }
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " MESSAGE ",
        InputMode::EditingStep => " EDIT STEP ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let hints: Vec<Span> = match app.input_mode {
        InputMode::Normal => {
            let mut hints = Vec::new();
            match app.focus {
                FocusPane::Chat => {
                    hints.extend(hint("i", "type"));
                    hints.extend(hint("j/k", "scroll"));
                }
                FocusPane::Workspace => {
                    hints.extend(hint("j/k", "step"));
                    hints.extend(hint("Enter", "edit"));
                }
            }
            hints.extend(hint("Tab", "focus"));
            hints.extend(hint("P", "provider"));
            hints.extend(hint("1/2/3", "test APIs"));
            hints.extend(hint("F2", "results"));
            hints.extend(hint("q", "quit"));
            hints
        }
        InputMode::Editing => {
            let mut hints = Vec::new();
            hints.extend(hint("Enter", "send"));
            hints.extend(hint("Esc", "stop typing"));
            hints
        }
        InputMode::EditingStep => {
            let mut hints = Vec::new();
            hints.extend(hint("Enter", "newline"));
            hints.extend(hint("Esc", "done"));
            hints
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [messages_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store areas for mouse hit-testing
    app.chat_area = Some(messages_area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = messages_area.height.saturating_sub(2);
    app.chat_width = messages_area.width.saturating_sub(2);

    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat ");

    let status_style = Style::default().fg(Color::LightBlue).add_modifier(Modifier::ITALIC);

    let mut lines: Vec<Line> = Vec::new();

    if app.controller.messages().is_empty() {
        lines.push(Line::from(Span::styled("How can I help?", status_style)).alignment(Alignment::Center));
    }

    for msg in app.controller.messages() {
        match msg.kind {
            MessageKind::User => {
                lines.push(
                    Line::from(Span::styled(
                        "You",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ))
                    .alignment(Alignment::Right),
                );
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()).alignment(Alignment::Right));
                }
            }
            MessageKind::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Helix",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                // Split response into lines and parse markdown
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
            MessageKind::Status => {
                lines.push(
                    Line::from(Span::styled(msg.content.clone(), status_style))
                        .alignment(Alignment::Center),
                );
            }
        }
        lines.push(Line::default());
    }

    if app.controller.is_generating() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(
            Line::from(Span::styled(format!("Generating sequence{}", dots), status_style))
                .alignment(Alignment::Center),
        );
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, messages_area);

    render_chat_input(app, frame, input_area);
}

fn render_chat_input(app: &App, frame: &mut Frame, input_area: Rect) {
    let generating = app.controller.is_generating();
    let editing = app.input_mode == InputMode::Editing;

    let input_border_color = if generating {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let title = if generating {
        " Message (waiting for response) "
    } else {
        " Message (i to type, Enter to send) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let (visible_text, text_style) = if app.chat_input.is_empty() && !editing {
        ("Type your message...".to_string(), Style::default().fg(Color::DarkGray))
    } else {
        let text: String = app.chat_input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        let style = if generating {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Cyan)
        };
        (text, style)
    };

    let input = Paragraph::new(visible_text)
        .style(text_style)
        .block(input_block);

    frame.render_widget(input, input_area);

    // Show cursor when editing
    if editing && !generating {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((
            input_area.x + cursor_x + 1,
            input_area.y + 1,
        ));
    }
}

fn render_workspace(app: &mut App, frame: &mut Frame, area: Rect) {
    app.workspace_area = Some(area);
    app.workspace_height = area.height.saturating_sub(2);

    let focused = app.focus == FocusPane::Workspace;
    let border_color = if app.input_mode == InputMode::EditingStep {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Workspace ");

    let sequence = app.controller.sequence();
    if sequence.is_some() {
        block = block.title(Line::from(" Sequence ").alignment(Alignment::Right));
    }

    let steps = match sequence {
        Some(sequence) if !sequence.is_empty() => &sequence.steps,
        _ => {
            let empty = Paragraph::new(vec![
                Line::default(),
                Line::from("No sequence generated."),
                Line::from("Chat with the AI to generate a recruiting outreach sequence."),
            ])
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(block);
            frame.render_widget(empty, area);
            return;
        }
    };

    let inner_width = area.width.saturating_sub(2) as usize;
    let editing = app.input_mode == InputMode::EditingStep;
    let mut lines: Vec<Line> = Vec::new();
    let mut selected_top: u16 = 0;
    let mut selected_bottom: u16 = 0;

    for (idx, step) in steps.iter().enumerate() {
        let is_selected = idx == app.selected_step && (focused || editing);
        if idx == app.selected_step {
            selected_top = lines.len() as u16;
        }

        let header_style = if is_selected {
            Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
        };
        lines.push(Line::from(Span::styled(format!(" Step {} ", step.step), header_style)));

        if editing && idx == app.selected_step {
            lines.extend(lines_with_cursor(&step.content, app.step_cursor));
        } else if step.content.is_empty() {
            lines.push(Line::from(Span::styled("(empty)", Style::default().fg(Color::DarkGray))));
        } else {
            for line in step.content.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }

        if idx == app.selected_step {
            selected_bottom = selected_top
                .saturating_add(1)
                .saturating_add(wrapped_line_count(&step.content, inner_width));
        }
        lines.push(Line::default());
    }

    // Keep the selected step on screen
    let visible = app.workspace_height;
    if selected_top < app.workspace_scroll {
        app.workspace_scroll = selected_top;
    } else if visible > 0 && selected_bottom > app.workspace_scroll + visible {
        app.workspace_scroll = selected_bottom.saturating_sub(visible);
    }

    let workspace = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.workspace_scroll, 0));

    frame.render_widget(workspace, area);
}

/// Step text with a block cursor drawn at `cursor` (a char index)
fn lines_with_cursor(content: &str, cursor: usize) -> Vec<Line<'static>> {
    let cursor_style = Style::default().bg(Color::Yellow).fg(Color::Black);
    let mut lines = Vec::new();
    let mut offset = 0;

    // split('\n') keeps a trailing empty line so the cursor can sit on it
    for raw in content.split('\n') {
        let len = raw.chars().count();
        if cursor >= offset && cursor <= offset + len {
            let at = cursor - offset;
            let before: String = raw.chars().take(at).collect();
            let current: String = raw.chars().nth(at).map(String::from).unwrap_or_else(|| " ".to_string());
            let after: String = raw.chars().skip(at + 1).collect();
            lines.push(Line::from(vec![
                Span::raw(before),
                Span::styled(current, cursor_style),
                Span::raw(after),
            ]));
        } else {
            lines.push(Line::from(raw.to_string()));
        }
        offset += len + 1;
    }

    lines
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let providers = Provider::all();
    let popup_area = centered_popup(area, 36, providers.len() as u16 + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Model Provider ");

    let current = app.controller.provider();
    let items: Vec<ListItem> = providers
        .iter()
        .map(|provider| {
            let is_current = *provider == current;
            let prefix = if is_current { "* " } else { "  " };
            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            ListItem::new(format!("{}{}", prefix, provider.display_name())).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.provider_picker_state);
}

fn render_diagnostics(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, area.width / 4 * 3, area.height / 4 * 3);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Connection Tests (1 OpenAI, 2 Gemini, 3 Supabase, Esc close) ");

    let mut lines: Vec<Line> = Vec::new();
    for target in DiagnosticTarget::all() {
        let Some(result) = app.diagnostics.get(&target) else {
            continue;
        };
        lines.push(Line::from(Span::styled(
            format!("{} Test Result:", target.label()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        for line in result.lines() {
            lines.push(Line::from(line.to_string()));
        }
        lines.push(Line::default());
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No tests run yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let results = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false });

    frame.render_widget(results, popup_area);
}
