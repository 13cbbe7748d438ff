use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, FocusPane, InputMode};
use crate::settings::MODEL_CHOICES;
use crate::state::{ChatMessage, ChatRole};

/// Parse a line of text and convert **bold**, *italic* and `code` markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        let (marker, style) = match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                ("**", Style::default().add_modifier(Modifier::BOLD))
            }
            '*' if chars.peek().is_some_and(|n| !n.is_whitespace()) => {
                ("*", Style::default().add_modifier(Modifier::ITALIC))
            }
            '`' => ("`", Style::default().fg(Color::LightMagenta)),
            _ => {
                current_text.push(c);
                continue;
            }
        };

        // Collect until the matching closing marker
        let mut inner = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if marker == "**" && c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            if marker != "**" && marker.starts_with(c) {
                found_close = true;
                break;
            }
            inner.push(c);
        }

        if found_close && !inner.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            spans.push(Span::styled(inner, style));
        } else {
            // No closing marker, treat as literal
            current_text.push_str(marker);
            current_text.push_str(&inner);
            if found_close {
                current_text.push_str(marker);
            }
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// `## Title` -> `Title`
fn markdown_heading(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches('#');
    (rest.len() < line.len() && rest.starts_with(' ')).then(|| rest.trim())
}

/// Lines for an assistant reply: prose gets inline markdown, fenced code is
/// shown verbatim in a distinct color.
fn assistant_lines(content: &str) -> Vec<Line<'static>> {
    let code_style = Style::default().fg(Color::Green);
    let fence_style = Style::default().fg(Color::DarkGray);
    let mut in_code = false;

    content
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_code = !in_code;
                Line::from(Span::styled(line.to_string(), fence_style))
            } else if in_code {
                Line::from(Span::styled(line.to_string(), code_style))
            } else if let Some(heading) = markdown_heading(line) {
                Line::from(Span::styled(
                    heading.to_string(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
            } else {
                parse_markdown_line(line)
            }
        })
        .collect()
}

fn message_lines(msg: &ChatMessage) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    match msg.role {
        ChatRole::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            lines.extend(msg.content.lines().map(|l| Line::from(l.to_string())));
        }
        ChatRole::Assistant | ChatRole::System | ChatRole::Tool => {
            lines.push(Line::from(Span::styled(
                "Agent:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.extend(assistant_lines(&msg.content));
        }
    }

    if !msg.sources.is_empty() {
        lines.push(Line::from(Span::styled(
            "Sources:",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )));
        for source in &msg.sources {
            lines.push(Line::from(vec![
                Span::styled(format!("  • {} ", source.title), Style::default().fg(Color::Magenta)),
                Span::styled(source.url.clone(), Style::default().fg(Color::DarkGray)),
            ]));
        }
    }

    lines.push(Line::default());
    lines
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

    // Console on the left, implementation preview on the right
    let [console_column, preview_area] = Layout::horizontal([
        Constraint::Percentage(40),
        Constraint::Percentage(60),
    ])
    .areas(body_area);

    let input_height = (app.input.split('\n').count() as u16 + 2).min(8);
    let [console_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(input_height),
    ])
    .areas(console_column);

    render_console(app, frame, console_area);
    render_input(app, frame, input_area);
    render_preview(app, frame, preview_area);
    render_footer(app, frame, footer_area);

    if app.show_key_input {
        render_key_input(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let refactor_style = if app.session.refactor_available() {
        Style::default().fg(Color::Black).bg(Color::Green).bold()
    } else {
        Style::default().fg(Color::Gray).bg(Color::DarkGray)
    };

    let title = Line::from(vec![
        Span::styled(" DevAgent IDE ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}]", app.session.settings().model),
            Style::default().fg(Color::White),
        ),
        Span::raw(" "),
        Span::styled(" f: Fix & Refactor ", refactor_style),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_console(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area and inner size for mouse hit-testing and scroll calculations
    app.console_area = Some(area);
    app.console_height = area.height.saturating_sub(2);
    app.console_width = area.width.saturating_sub(2);

    let focused = app.focus == FocusPane::Console;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Instruction Console ({}) ", app.session.messages().len()));

    let text = if app.session.messages().is_empty() && !app.session.is_busy() {
        Text::from(vec![
            Line::from(Span::styled("Architectural Planning", Style::default().fg(Color::Cyan).bold())),
            Line::default(),
            Line::from(Span::styled(
                "Describe the application or code module you want to build. \
                 Step-by-step logic appears here and the full source on the right.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
    } else {
        let mut lines: Vec<Line> = app
            .session
            .messages()
            .iter()
            .flat_map(message_lines)
            .collect();

        if app.session.is_busy() {
            lines.push(Line::from(Span::styled(
                "Agent:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Architecting implementation{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let console = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.console_scroll, 0));

    frame.render_widget(console, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing || app.focus == FocusPane::Input {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if app.session.is_busy() {
        " Request (waiting for agent) "
    } else {
        " Request (Enter to send, Alt+Enter newline) "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Keep the cursor line visible, scrolling horizontally on long lines
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let before_cursor: String = app.input.chars().take(app.cursor).collect();
    let cursor_row = before_cursor.matches('\n').count();
    let cursor_col = before_cursor
        .rsplit('\n')
        .next()
        .map(|l| l.chars().count())
        .unwrap_or(0);

    let row_offset = (cursor_row + 1).saturating_sub(inner_height.max(1));
    let col_offset = if inner_width > 0 && cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };

    let visible: Vec<Line> = app
        .input
        .split('\n')
        .skip(row_offset)
        .take(inner_height.max(1))
        .map(|l| Line::from(l.chars().skip(col_offset).take(inner_width).collect::<String>()))
        .collect();

    let input = Paragraph::new(visible)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    if editing && !app.show_key_input && !app.show_model_picker {
        frame.set_cursor_position((
            area.x + 1 + (cursor_col - col_offset) as u16,
            area.y + 1 + (cursor_row - row_offset) as u16,
        ));
    }
}

fn render_preview(app: &mut App, frame: &mut Frame, area: Rect) {
    app.preview_area = Some(area);
    app.preview_height = area.height.saturating_sub(2);

    let focused = app.focus == FocusPane::Preview;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let preview = app.session.preview();
    let title = match &preview.language {
        Some(lang) => format!(" Implementation Preview ({lang}) "),
        None => " Implementation Preview ".to_string(),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let total = preview.code.lines().count();
    let gutter = total.max(1).to_string().len();
    let lines: Vec<Line> = preview
        .code
        .lines()
        .enumerate()
        .map(|(i, line)| {
            Line::from(vec![
                Span::styled(
                    format!("{:>width$} ", i + 1, width = gutter),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(line.to_string()),
            ])
        })
        .collect();

    let code = Paragraph::new(lines)
        .block(block)
        .scroll((app.preview_scroll, 0));

    frame.render_widget(code, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];

    if let Some(status) = &app.status {
        spans.push(Span::styled(format!(" {status} "), Style::default().bg(Color::Black).fg(Color::Yellow)));
    } else {
        let hints: &[(&str, &str)] = match app.input_mode {
            InputMode::Editing => &[("Enter", "send"), ("Esc", "stop typing")],
            InputMode::Normal => &[
                ("Tab", "focus"),
                ("j/k", "scroll"),
                ("i", "type"),
                ("f", "fix"),
                ("c", "copy"),
                ("x", "clear"),
                ("M", "model"),
                ("S", "search key"),
                ("q", "quit"),
            ],
        };
        for (key, label) in hints {
            spans.push(Span::styled(format!(" {key} "), key_style));
            spans.push(Span::styled(format!(" {label} "), label_style));
        }
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Centered popup rectangle
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 50, MODEL_CHOICES.len() as u16 + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Model Preference (Enter to select, Esc to cancel) ");

    let current = app.session.settings().model.clone();
    let items: Vec<ListItem> = MODEL_CHOICES
        .iter()
        .map(|(id, label)| {
            let style = if *id == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ({}) ", label, id)).style(style)
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

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

/// Mask all but the last four characters of a key
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let last_four: String = key.chars().skip(len - 4).collect();
    format!("{}...{}", "*".repeat((len - 4).min(20)), last_four)
}

fn render_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 60, 7);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Tavily API Key (optional, for web search) ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your key. Enter saves, Esc cancels, empty clears it.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let input = Paragraph::new(mask_key(&app.key_input)).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let note = Paragraph::new("The Gemini key is read from GEMINI_API_KEY, not stored here.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(note, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}
