use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::layout::Axis;

use super::app::App;
use super::types::{FocusedPane, InputMode};

/// Modal key dispatch: Normal for navigation, Insert for chat/terminal
/// input, Command for `:` commands.
pub async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match app.input_mode {
        InputMode::Normal => handle_normal_key(app, key).await?,
        InputMode::Insert => handle_insert_key(app, key).await?,
        InputMode::Command => handle_command_key(app, key).await?,
    }
    Ok(())
}

async fn handle_normal_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.should_quit = true;
        }
        KeyCode::Char('i') => {
            app.input_mode = InputMode::Insert;
            app.status_message = match app.focused_pane {
                FocusedPane::Terminal => "INSERT - terminal input".to_string(),
                _ => "INSERT - type your message".to_string(),
            };
        }
        KeyCode::Char(':') => {
            app.input_mode = InputMode::Command;
            app.input.clear();
            app.status_message = "COMMAND".to_string();
        }
        KeyCode::Tab => {
            app.focused_pane = app.focused_pane.next();
        }
        KeyCode::Char('y') => {
            app.approve_next_command().await?;
        }
        KeyCode::Char('n') => {
            app.decline_next_command();
        }
        KeyCode::Char('s') => {
            app.stop_stream();
        }
        KeyCode::Char('b') => {
            app.layout.toggle_sidebar();
        }
        KeyCode::Char('t') => {
            app.layout.toggle_terminal();
        }
        KeyCode::Char('a') => {
            app.auto_scroll = !app.auto_scroll;
            app.status_message = format!(
                "Auto-scroll {}",
                if app.auto_scroll { "on" } else { "off" }
            );
        }
        KeyCode::Char('x') => {
            app.close_active_tab();
        }
        KeyCode::Char('c') => {
            app.workspace.clear_problems();
            app.status_message = "Problems cleared".to_string();
        }
        KeyCode::Char('T') => {
            app.terminals.add_session();
            app.focused_pane = FocusedPane::Terminal;
        }
        KeyCode::Char('r') => {
            app.spawn_project_load();
            app.status_message = "Reloading project...".to_string();
        }
        KeyCode::Char('?') => {
            app.status_message =
                "i=insert :=cmd Tab=focus y/n=approve s=stop b/t=panels x=close c=clear T=term r=reload"
                    .to_string();
        }
        KeyCode::Up | KeyCode::Char('k') => match app.focused_pane {
            FocusedPane::Files => app.select_prev_file(),
            FocusedPane::Chat => app.chat_scroll = app.chat_scroll.saturating_sub(1),
            _ => {}
        },
        KeyCode::Down | KeyCode::Char('j') => match app.focused_pane {
            FocusedPane::Files => app.select_next_file(),
            FocusedPane::Chat => app.chat_scroll = app.chat_scroll.saturating_add(1),
            _ => {}
        },
        KeyCode::Enter => {
            if app.focused_pane == FocusedPane::Files {
                app.open_selected_file();
            }
        }
        _ => {}
    }
    Ok(())
}

async fn handle_insert_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Terminal focus routes input into the active session instead of chat.
    if app.focused_pane == FocusedPane::Terminal {
        match key.code {
            KeyCode::Esc => {
                app.input_mode = InputMode::Normal;
                app.status_message = "NORMAL".to_string();
            }
            KeyCode::Enter => {
                app.run_terminal_input().await?;
            }
            KeyCode::Backspace => app.terminals.active_mut().backspace(),
            KeyCode::Up => app.terminals.active_mut().history_prev(),
            KeyCode::Down => app.terminals.active_mut().history_next(),
            KeyCode::Char(c) => app.terminals.active_mut().push_char(c),
            _ => {}
        }
        return Ok(());
    }

    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.status_message = "NORMAL".to_string();
        }
        KeyCode::Enter => {
            app.submit_prompt();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Char(c) => {
            app.input.push(c);
        }
        _ => {}
    }
    Ok(())
}

async fn handle_command_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.input.clear();
        }
        KeyCode::Enter => {
            let line = std::mem::take(&mut app.input);
            app.input_mode = InputMode::Normal;
            app.run_command(&line).await?;
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Char(c) => {
            app.input.push(c);
        }
        _ => {}
    }
    Ok(())
}

/// Mouse drags on panel dividers resize the layout. The renderer keeps the
/// sidebar divider at `sidebar_width` and the terminal divider just above
/// the terminal panel, so a press within one cell of either starts a drag.
pub fn handle_mouse(app: &mut App, mouse: MouseEvent, frame_height: u16) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let sidebar_edge = app.layout.sidebar_width;
            if app.layout.show_sidebar && mouse.column.abs_diff(sidebar_edge) <= 1 {
                app.layout.begin_drag((mouse.column, mouse.row), Axis::Horizontal);
            } else if app.layout.show_terminal {
                let terminal_edge = frame_height
                    .saturating_sub(app.layout.terminal_height)
                    .saturating_sub(1);
                if mouse.row.abs_diff(terminal_edge) <= 1 {
                    app.layout.begin_drag((mouse.column, mouse.row), Axis::Vertical);
                }
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            app.layout.drag_to((mouse.column, mouse.row));
        }
        MouseEventKind::Up(MouseButton::Left) => {
            app.layout.end_drag();
        }
        _ => {}
    }
}
