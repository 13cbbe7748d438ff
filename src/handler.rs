use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
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
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_pending().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    app.status = None;

    // Popups take every key while open
    if app.show_key_input {
        handle_key_input(app, key);
        return;
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => app.focus = app.focus.next(),

        KeyCode::Char('i') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Enter if app.focus == FocusPane::Input => {
            app.input_mode = InputMode::Editing;
        }

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_focused_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_focused_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let half = half_page(app);
            app.scroll_focused_down(half);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let half = half_page(app);
            app.scroll_focused_up(half);
        }
        KeyCode::Char('G') => app.scroll_console_to_bottom(),

        // Actions
        KeyCode::Char('f') => {
            app.fix_and_refactor();
        }
        KeyCode::Char('x') => app.clear_conversation(),
        KeyCode::Char('c') => app.copy_preview(),
        KeyCode::Char('M') => app.open_model_picker(),
        KeyCode::Char('S') => app.open_key_input(),

        _ => {}
    }
}

fn half_page(app: &App) -> u16 {
    let height = match app.focus {
        FocusPane::Preview => app.preview_height,
        FocusPane::Console | FocusPane::Input => app.console_height,
    };
    (height / 2).max(1)
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        // Alt+Enter inserts a newline instead of sending
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            insert_char(&mut app.input, &mut app.cursor, '\n');
        }
        KeyCode::Enter => {
            app.submit_input();
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            insert_char(&mut app.input, &mut app.cursor, c);
        }
        _ => {}
    }
}

fn insert_char(input: &mut String, cursor: &mut usize, c: char) {
    let byte_pos = char_to_byte_index(input, *cursor);
    input.insert(byte_pos, c);
    *cursor += 1;
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_key_input = false;
            app.key_input.clear();
            app.key_input_cursor = 0;
        }
        KeyCode::Enter => app.save_key_input(),
        KeyCode::Backspace => {
            if app.key_input_cursor > 0 {
                app.key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.key_input, app.key_input_cursor);
                app.key_input.remove(byte_pos);
            }
        }
        KeyCode::Char(c) => {
            insert_char(&mut app.key_input, &mut app.key_input_cursor, c);
        }
        KeyCode::Left => {
            app.key_input_cursor = app.key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.key_input.chars().count();
            app.key_input_cursor = (app.key_input_cursor + 1).min(char_count);
        }
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    if app.show_key_input {
        for c in text.chars().filter(|c| !c.is_control()) {
            insert_char(&mut app.key_input, &mut app.key_input_cursor, c);
        }
    } else if app.input_mode == InputMode::Editing {
        for c in text.chars().filter(|&c| c != '\r') {
            insert_char(&mut app.input, &mut app.cursor, c);
        }
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    // Scroll whichever pane is under the pointer
    let in_console = app.console_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_preview = app.preview_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    let previous_focus = app.focus;
    if in_console {
        app.focus = FocusPane::Console;
    } else if in_preview {
        app.focus = FocusPane::Preview;
    } else {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_focused_down(3),
        MouseEventKind::ScrollUp => app.scroll_focused_up(3),
        _ => {}
    }

    if app.input_mode == InputMode::Editing {
        app.focus = previous_focus;
    }
}
