use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

use crate::api::BackendClient;
use crate::config::WorkspaceConfig;
use crate::workspace::{CenterPane, ChatRole, CommandState, GitStatus, Severity};
use crate::ws::spawn_ws_listener;

use super::app::App;
use super::events::{handle_key, handle_mouse};
use super::types::{AppMessage, FocusedPane, InputMode};

pub async fn run_tui(
    client: BackendClient,
    config: WorkspaceConfig,
    project_id: String,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let ws_url = config.backend.ws_url.clone();
    let reconnect_delay = Duration::from_millis(config.stream.ws_reconnect_delay_ms);
    let mut app = App::new(client, config, project_id);
    app.spawn_project_load();
    spawn_ws_listener(ws_url, reconnect_delay, app.tx.clone());

    let mut rx = app.rx.take().unwrap();
    let res = run_app(&mut terminal, &mut app, &mut rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: &mut mpsc::UnboundedReceiver<AppMessage>,
) -> Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        // Flush any editor update held back by the throttle.
        app.live_editor.tick(Instant::now());

        terminal.draw(|f| ui(f, app))?;

        // Drain background messages before blocking on input.
        while let Ok(msg) = rx.try_recv() {
            app.handle_message(msg);
        }

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => handle_key(app, key).await?,
                Event::Mouse(mouse) => {
                    let height = terminal.size()?.height;
                    handle_mouse(app, mouse, height);
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    let mut columns = Vec::new();
    if app.layout.show_sidebar {
        columns.push(Constraint::Length(app.layout.sidebar_width));
    }
    columns.push(Constraint::Min(20));
    columns.push(Constraint::Length(app.layout.chat_width));

    let row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(columns)
        .split(outer[0]);

    let mut idx = 0;
    if app.layout.show_sidebar {
        draw_sidebar(f, app, row[idx]);
        idx += 1;
    }
    draw_center(f, app, row[idx]);
    draw_chat(f, app, row[idx + 1]);
    draw_status_bar(f, app, outer[1]);
}

fn draw_sidebar(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .workspace
        .files
        .iter()
        .map(|file| {
            let marker = match file.git_status {
                Some(GitStatus::Modified) => Span::styled("M ", Style::default().fg(Color::Yellow)),
                Some(GitStatus::Untracked) => Span::styled("U ", Style::default().fg(Color::Green)),
                None => Span::raw("  "),
            };
            ListItem::new(Line::from(vec![marker, Span::raw(file.path.clone())]))
        })
        .collect();

    let border_style = pane_border(app, FocusedPane::Files);
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(" Files "),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if !app.workspace.files.is_empty() {
        state.select(Some(app.file_index.min(app.workspace.files.len() - 1)));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_center(f: &mut Frame, app: &mut App, area: Rect) {
    let (editor_area, terminal_area) = if app.layout.show_terminal {
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(app.layout.terminal_height),
            ])
            .split(area);
        (parts[0], Some(parts[1]))
    } else {
        (area, None)
    };

    draw_editor(f, app, editor_area);
    if let Some(terminal_area) = terminal_area {
        draw_terminal(f, app, terminal_area);
    }
}

fn draw_editor(f: &mut Frame, app: &mut App, area: Rect) {
    let rows = area.height.saturating_sub(2) as usize;
    app.live_editor.set_viewport_rows(rows.max(1));

    let border_style = pane_border(app, FocusedPane::Editor);

    match app.workspace.center_pane() {
        CenterPane::Empty => {
            let hint = Paragraph::new("No file open\n\nSelect a file in the sidebar, or ask the assistant to create one.")
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(border_style)
                        .title(" Editor "),
                )
                .style(Style::default().fg(Color::DarkGray));
            f.render_widget(hint, area);
        }
        CenterPane::File(path) => {
            let language = app
                .workspace
                .file(&path)
                .map(|file| file.language.clone())
                .unwrap_or_default();
            let title = format!(" {} [{}] ", path, language);
            let view = &app.live_editor.view;
            let editor = Paragraph::new(view.content.as_str())
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(border_style)
                        .title(title),
                )
                .scroll((view.scroll as u16, 0));
            f.render_widget(editor, area);
        }
        CenterPane::Browser(id) => {
            let tab = app.workspace.browser_tabs.iter().find(|t| t.id == id);
            let (url, title) = tab
                .map(|t| (t.url.clone(), t.title.clone()))
                .unwrap_or_default();
            let body = format!("{}\n\nOpen this URL in a browser to view the preview.", url);
            let browser = Paragraph::new(body)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(border_style)
                        .title(format!(" {} ", title)),
                )
                .wrap(Wrap { trim: false });
            f.render_widget(browser, area);
        }
    }
}

fn draw_terminal(f: &mut Frame, app: &mut App, area: Rect) {
    let session = app.terminals.active();
    let rows = area.height.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = Vec::new();
    let visible = rows.saturating_sub(1);
    let start = session.output.len().saturating_sub(visible);
    for line in &session.output[start..] {
        lines.push(Line::from(line.as_str()));
    }
    lines.push(Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Cyan)),
        Span::raw(session.input.as_str()),
    ]));

    let border_style = pane_border(app, FocusedPane::Terminal);
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(format!(" {} ", session.name)),
    );
    f.render_widget(widget, area);
}

fn draw_chat(f: &mut Frame, app: &mut App, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let width = parts[0].width.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = Vec::new();

    for message in &app.workspace.messages {
        let (label, color) = match message.role {
            ChatRole::User => ("you", Color::Cyan),
            ChatRole::Assistant => ("vibe", Color::Magenta),
        };
        let stamp = message.timestamp.format("%H:%M");
        lines.push(Line::from(Span::styled(
            format!("{} {}", label, stamp),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));

        let mut content = message.content.clone();
        if message.is_streaming {
            content.push('\u{258c}');
        }
        for wrapped in textwrap::wrap(&content, width.max(10)) {
            lines.push(Line::from(wrapped.into_owned()));
        }

        if let Some(state) = &message.command_state {
            let marker = match state {
                CommandState::Pending => Span::styled(
                    "[y] run  [n] dismiss",
                    Style::default().fg(Color::Yellow),
                ),
                CommandState::Running => {
                    Span::styled("running...", Style::default().fg(Color::Yellow))
                }
                CommandState::Completed => {
                    Span::styled("completed", Style::default().fg(Color::Green))
                }
                CommandState::Failed(reason) => Span::styled(
                    format!("failed: {}", reason),
                    Style::default().fg(Color::Red),
                ),
            };
            lines.push(Line::from(marker));
        }
        lines.push(Line::from(""));
    }

    let viewport = parts[0].height.saturating_sub(2) as usize;
    if app.auto_scroll {
        app.chat_scroll = lines.len().saturating_sub(viewport) as u16;
    }
    let scroll = app.chat_scroll.min(lines.len().saturating_sub(1) as u16);

    let border_style = pane_border(app, FocusedPane::Chat);
    let chat = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(" Chat "),
        )
        .scroll((scroll, 0));
    f.render_widget(chat, parts[0]);

    draw_input(f, app, parts[1]);
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let (title, style) = match app.input_mode {
        InputMode::Insert => (" Message ", Style::default().fg(Color::Green)),
        InputMode::Command => (" :command ", Style::default().fg(Color::Yellow)),
        InputMode::Normal => (" Message (press i) ", Style::default()),
    };

    let input = Paragraph::new(app.input.as_str())
        .block(Block::default().borders(Borders::ALL).border_style(style).title(title));
    f.render_widget(input, area);

    if app.input_mode != InputMode::Normal {
        let cursor_x = area.x + 1 + app.input.width() as u16;
        f.set_cursor_position((cursor_x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let mode = match app.input_mode {
        InputMode::Normal => "NORMAL",
        InputMode::Insert => "INSERT",
        InputMode::Command => "COMMAND",
    };
    let link = if app.ws_connected { "\u{25cf}" } else { "\u{25cb}" };
    let spinner = if app.is_processing { " working..." } else { "" };

    let errors = app
        .workspace
        .problems
        .iter()
        .filter(|p| p.severity == Severity::Error)
        .count();
    let warnings = app.workspace.problems.len() - errors;

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode),
            Style::default().bg(Color::Blue).fg(Color::Black),
        ),
        Span::raw(format!(" {} ", link)),
        Span::raw(format!("E:{} W:{} ", errors, warnings)),
        Span::raw(format!("ports:{} ", app.workspace.ports.len())),
        Span::styled(spinner, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::raw(app.status_message.as_str()),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn pane_border(app: &App, pane: FocusedPane) -> Style {
    if app.focused_pane == pane {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}
