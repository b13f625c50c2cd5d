use std::time::{Duration, Instant};

use anyhow::Result;
use similar::ChangeTag;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{BackendClient, ChatTurn};
use crate::block_parser::is_entry_point;
use crate::cache::{self, WorkspaceSnapshot};
use crate::cmd_parser::BackendRunner;
use crate::config::WorkspaceConfig;
use crate::diffs;
use crate::editor_sync::LiveEditor;
use crate::layout::LayoutState;
use crate::stream::spawn_chat_stream;
use crate::terminal::{ScanReport, SessionPhase, TerminalStore};
use crate::workspace::{ChatRole, GitStatus, Problem, Severity, Workspace};
use crate::ws::WsEvent;

use super::types::{AppMessage, FocusedPane, InputMode};

pub struct App {
    pub workspace: Workspace,
    pub terminals: TerminalStore,
    pub layout: LayoutState,
    pub live_editor: LiveEditor,

    pub client: BackendClient,
    pub config: WorkspaceConfig,
    pub project_id: String,

    // UI state
    pub input: String,
    pub input_mode: InputMode,
    pub focused_pane: FocusedPane,
    pub status_message: String,
    pub chat_scroll: u16,
    pub auto_scroll: bool,
    pub file_index: usize,
    pub is_processing: bool,
    pub ws_connected: bool,
    pub load_error: Option<String>,
    pub should_quit: bool,

    // Message channel
    pub tx: mpsc::UnboundedSender<AppMessage>,
    pub rx: Option<mpsc::UnboundedReceiver<AppMessage>>,
}

impl App {
    pub fn new(client: BackendClient, config: WorkspaceConfig, project_id: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut layout = LayoutState::default();
        layout.show_sidebar = config.tui.show_sidebar;
        layout.show_terminal = config.tui.show_terminal;

        Self {
            workspace: Workspace::new(),
            terminals: TerminalStore::new(),
            layout,
            live_editor: LiveEditor::new(Duration::from_millis(config.stream.editor_throttle_ms)),
            client,
            auto_scroll: config.tui.auto_scroll,
            config,
            project_id,
            input: String::new(),
            input_mode: InputMode::Normal,
            focused_pane: FocusedPane::Chat,
            status_message: "Ready - press '?' for help".to_string(),
            chat_scroll: 0,
            file_index: 0,
            is_processing: false,
            ws_connected: false,
            load_error: None,
            should_quit: false,
            tx,
            rx: Some(rx),
        }
    }

    /// Kick off the initial project load in the background. One retry, then
    /// the result (or the error) comes back over the app channel.
    pub fn spawn_project_load(&self) {
        let client = self.client.clone();
        let project_id = self.project_id.clone();
        let retry_delay = Duration::from_millis(self.config.backend.load_retry_delay_ms);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = client
                .project_files_with_retry(&project_id, retry_delay)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppMessage::FilesLoaded(result));
        });
    }

    /// Send the chat input as a user message and start the response stream.
    pub fn submit_prompt(&mut self) {
        let prompt = self.input.trim().to_string();
        if prompt.is_empty() || self.is_processing {
            return;
        }
        self.input.clear();

        self.workspace.push_user_message(&prompt);
        let history = self.chat_history();
        let id = self.workspace.begin_stream();

        self.is_processing = true;
        self.status_message = "Waiting for response...".to_string();
        spawn_chat_stream(self.client.clone(), history, id, self.tx.clone());
    }

    /// Stop only clears the loading flag; the reader task keeps draining and
    /// its late frames are ignored once the message is finalized.
    pub fn stop_stream(&mut self) {
        if let Some(id) = self.workspace.streaming_id() {
            self.workspace.finalize_stream(id, None);
        }
        self.is_processing = false;
        self.status_message = "Stopped".to_string();
    }

    fn chat_history(&self) -> Vec<ChatTurn> {
        self.workspace
            .messages
            .iter()
            .filter(|m| m.command.is_none() && !m.content.is_empty())
            .map(|m| ChatTurn {
                role: match m.role {
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    pub fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::StreamDelta { id, text } => {
                let effects = self.workspace.apply_stream_delta(id, &text);
                for path in effects.applied_files {
                    self.on_file_applied(&path);
                }
                if !effects.new_commands.is_empty() {
                    self.status_message =
                        "Command suggested - press 'y' to run, 'n' to dismiss".to_string();
                }
            }
            AppMessage::StreamDone { id } => {
                self.workspace.finalize_stream(id, None);
            }
            AppMessage::StreamError { id, error } => {
                warn!("Stream error: {}", error);
                self.workspace.finalize_stream(id, Some(&error));
                self.status_message = format!("Stream failed: {}", error);
            }
            AppMessage::StreamClosed { id: _ } => {
                self.is_processing = false;
                if self.workspace.streaming_id().is_none() && self.load_error.is_none() {
                    self.status_message = "Ready".to_string();
                }
            }
            AppMessage::Ws(event) => self.handle_ws_event(event),
            AppMessage::WsConnected(connected) => {
                self.ws_connected = connected;
                if !connected {
                    self.status_message = "Agent link lost, reconnecting...".to_string();
                }
            }
            AppMessage::FilesLoaded(Ok(files)) => {
                info!("Loaded {} project files", files.len());
                self.load_error = None;
                self.workspace.replace_files(files);
                self.file_index = 0;
                self.status_message = format!("Loaded {} files", self.workspace.files.len());
                self.save_snapshot();
            }
            AppMessage::FilesLoaded(Err(error)) => {
                // Fall back to the last snapshot so the workspace opens
                // with something instead of an empty tree.
                match self.load_cached_files() {
                    Some(count) => {
                        self.load_error = Some(error.clone());
                        self.status_message =
                            format!("Backend unreachable, showing {} cached files", count);
                    }
                    None => {
                        self.load_error = Some(error.clone());
                        self.status_message = format!("Project load failed: {}", error);
                    }
                }
                error!("Project load failed: {}", error);
            }
        }
    }

    fn handle_ws_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::GenerationStarted => {
                self.status_message = "Agent generation started".to_string();
            }
            WsEvent::GenerationStep { description } => {
                self.status_message = description;
            }
            WsEvent::GenerationProgress { percent, message } => {
                let label = message.unwrap_or_else(|| "Generating".to_string());
                self.status_message = format!("{} ({:.0}%)", label, percent * 100.0);
            }
            WsEvent::FileAnnounced { path } => {
                let created = self.workspace.file(&path).is_none();
                if created {
                    self.workspace.upsert_file(&path, String::new());
                }
                self.workspace.open_file(&path);
                self.live_editor.reset(String::new());
                self.status_message = format!("Writing {}", path);
            }
            WsEvent::CodeCharacterWritten {
                path,
                content,
                line,
                column,
            } => {
                let created = self.workspace.upsert_file(&path, content.clone());
                if created
                    && (self.workspace.active_file.is_none() || is_entry_point(&path))
                {
                    self.workspace.open_file(&path);
                    self.live_editor.reset(String::new());
                }
                if self.workspace.active_file.as_deref() == Some(path.as_str()) {
                    self.live_editor.queue(content, line, column);
                }
            }
            WsEvent::EditorContentUpdated { path, content } => {
                self.workspace.upsert_file(&path, content.clone());
                if self.workspace.active_file.as_deref() == Some(path.as_str()) {
                    self.live_editor.queue(content, usize::MAX, 0);
                }
            }
            WsEvent::FileCreated { path } => {
                if self.workspace.file(&path).is_none() {
                    self.workspace.upsert_file(&path, String::new());
                }
                if self.workspace.active_file.as_deref() == Some(path.as_str()) {
                    self.live_editor.finish(Instant::now());
                }
                self.status_message = format!("Created {}", path);
            }
            WsEvent::GenerationFinished => {
                self.live_editor.finish(Instant::now());
                self.status_message = "Agent generation finished".to_string();
                self.save_snapshot();
            }
            WsEvent::GenerationError { message } => {
                self.workspace.record_problem(Problem {
                    severity: Severity::Error,
                    message: message.clone(),
                    source: "agent".to_string(),
                });
                self.status_message = format!("Generation failed: {}", message);
            }
            WsEvent::DependencyInstalled { package } => {
                self.status_message = format!("Installed {}", package);
            }
            WsEvent::BuildUpdate { status } => {
                self.status_message = format!("Build: {}", status);
            }
            WsEvent::GitCommitted { message } => {
                self.status_message = format!("Committed: {}", message);
            }
            // Unknown kinds are dropped at the socket boundary.
            WsEvent::Unknown(_) => {}
        }
    }

    /// A complete code block landed in the workspace: sync the backend, the
    /// visible editor, and the snapshot.
    fn on_file_applied(&mut self, path: &str) {
        let content = self
            .workspace
            .file(path)
            .map(|f| f.content.clone())
            .unwrap_or_default();

        if self.workspace.active_file.as_deref() == Some(path) {
            self.live_editor.reset(content.clone());
        }

        let client = self.client.clone();
        let path = path.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.update_file(&path, &content).await {
                warn!("Failed to sync {} to backend: {}", path, e);
            }
        });

        self.save_snapshot();
    }

    /* ---------- approval-gated commands ---------- */

    /// Approve the oldest pending command and run it in the active terminal
    /// session. Nothing ever runs without passing through here.
    pub async fn approve_next_command(&mut self) -> Result<()> {
        let Some(id) = self.workspace.next_pending_command() else {
            return Ok(());
        };
        let Some(command) = self.workspace.approve_command(id) else {
            return Ok(());
        };

        self.status_message = format!("Running {}", command);
        let runner = BackendRunner::new(self.client.clone());

        match self.terminals.execute_command(&runner, &command).await {
            Ok(report) => {
                let returncode = match self.terminals.active().phase {
                    SessionPhase::ErrorShown => 1,
                    _ => 0,
                };
                self.workspace.complete_command(id, "", returncode);
                self.absorb_scan_report(report);
                self.status_message = format!("Finished {}", command);
            }
            Err(e) => {
                self.workspace.fail_command(id, &e.to_string());
                self.status_message = format!("Command failed: {}", e);
            }
        }
        Ok(())
    }

    pub fn decline_next_command(&mut self) {
        if let Some(id) = self.workspace.next_pending_command() {
            self.workspace.decline_command(id);
            self.status_message = "Command dismissed".to_string();
        }
    }

    /// Run whatever the user typed into the active terminal session.
    pub async fn run_terminal_input(&mut self) -> Result<()> {
        let command = self.terminals.active().input.trim().to_string();
        if command.is_empty() {
            return Ok(());
        }

        let runner = BackendRunner::new(self.client.clone());
        match self.terminals.execute_command(&runner, &command).await {
            Ok(report) => self.absorb_scan_report(report),
            Err(e) => {
                self.status_message = format!("Command failed: {}", e);
            }
        }
        Ok(())
    }

    fn absorb_scan_report(&mut self, report: ScanReport) {
        if report.is_empty() {
            return;
        }
        for problem in report.problems {
            self.workspace.record_problem(problem);
        }
        for port in report.ports {
            self.workspace.record_port(port);
        }
        if self.workspace.preview_url.is_none() {
            if let Some(url) = report.urls.first() {
                self.workspace.preview_url = Some(url.clone());
            }
        }
    }

    /* ---------- command mode ---------- */

    /// Execute a `:command` typed in command mode.
    pub async fn run_command(&mut self, line: &str) -> Result<()> {
        let mut parts = line.trim().splitn(2, ' ');
        let verb = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match verb {
            "q" | "quit" => self.should_quit = true,
            "stop" => self.stop_stream(),
            "preview" => match rest {
                "stop" => match self.client.preview_stop().await {
                    Ok(()) => {
                        self.workspace.preview_url = None;
                        self.status_message = "Preview stopped".to_string();
                    }
                    Err(e) => self.status_message = format!("Preview stop failed: {}", e),
                },
                "status" => match self.client.preview_status().await {
                    Ok(status) if status.running => {
                        self.status_message = format!(
                            "Preview running at {}",
                            status.url.unwrap_or_else(|| "unknown URL".to_string())
                        );
                    }
                    Ok(_) => self.status_message = "Preview not running".to_string(),
                    Err(e) => self.status_message = format!("Preview status failed: {}", e),
                },
                _ => self.start_preview().await,
            },
            "status" => self.refresh_git_status().await,
            "commit" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :commit <message>".to_string();
                } else {
                    match self.client.git_commit(rest).await {
                        Ok(()) => self.status_message = "Committed".to_string(),
                        Err(e) => self.status_message = format!("Commit failed: {}", e),
                    }
                }
            }
            "push" => match self.client.git_push().await {
                Ok(()) => self.status_message = "Pushed".to_string(),
                Err(e) => self.status_message = format!("Push failed: {}", e),
            },
            "install" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :install <package>".to_string();
                } else {
                    match self.client.package_install(rest).await {
                        Ok(()) => self.status_message = format!("Installed {}", rest),
                        Err(e) => self.status_message = format!("Install failed: {}", e),
                    }
                }
            }
            "uninstall" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :uninstall <package>".to_string();
                } else {
                    match self.client.package_uninstall(rest).await {
                        Ok(()) => self.status_message = format!("Uninstalled {}", rest),
                        Err(e) => self.status_message = format!("Uninstall failed: {}", e),
                    }
                }
            }
            "packages" => match self.client.packages_list().await {
                Ok(packages) => {
                    let names: Vec<String> =
                        packages.into_iter().map(|p| p.name).collect();
                    self.workspace.push_assistant_message(&format!(
                        "Installed packages ({}):\n{}",
                        names.len(),
                        names.join("\n")
                    ));
                }
                Err(e) => self.status_message = format!("Package list failed: {}", e),
            },
            "search" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :search <query>".to_string();
                } else {
                    match self.client.packages_search(rest).await {
                        Ok(found) => {
                            let lines: Vec<String> = found
                                .into_iter()
                                .map(|p| match p.description {
                                    Some(d) => format!("{} - {}", p.name, d),
                                    None => p.name,
                                })
                                .collect();
                            self.workspace.push_assistant_message(&format!(
                                "Packages matching {:?}:\n{}",
                                rest,
                                lines.join("\n")
                            ));
                        }
                        Err(e) => self.status_message = format!("Search failed: {}", e),
                    }
                }
            }
            "generate" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :generate <prompt>".to_string();
                } else {
                    match self
                        .client
                        .smart_agent_generate(rest, &self.project_id)
                        .await
                    {
                        Ok(id) => {
                            self.status_message = format!("Generation {} started", id);
                        }
                        Err(e) => self.status_message = format!("Generate failed: {}", e),
                    }
                }
            }
            "team" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :team <prompt>".to_string();
                } else {
                    match self.client.team_agent_generate(rest, &self.project_id).await {
                        Ok(id) => {
                            self.status_message = format!("Team generation {} started", id);
                        }
                        Err(e) => self.status_message = format!("Team generate failed: {}", e),
                    }
                }
            }
            "agent" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :agent <generation-id>".to_string();
                } else {
                    match self.client.smart_agent_status(rest).await {
                        Ok(status) => {
                            let progress = status
                                .progress
                                .map(|p| format!(" {:.0}%", p * 100.0))
                                .unwrap_or_default();
                            self.status_message =
                                format!("Generation {}: {}{}", status.id, status.status, progress);
                        }
                        Err(e) => self.status_message = format!("Agent status failed: {}", e),
                    }
                }
            }
            "diff" => {
                if rest.is_empty() {
                    self.status_message = "Usage: :diff <path>".to_string();
                } else {
                    self.show_diff(rest);
                }
            }
            "zip" => {
                let url = self.client.download_zip_url(&self.project_id);
                self.status_message = format!("Download: {}", url);
            }
            other => {
                self.status_message = format!("Unknown command :{}", other);
            }
        }
        Ok(())
    }

    /// Pull git status and mirror it onto the sidebar markers.
    async fn refresh_git_status(&mut self) {
        match self.client.git_status().await {
            Ok(entries) => {
                for file in &mut self.workspace.files {
                    file.git_status = None;
                }
                let mut modified = 0;
                let mut untracked = 0;
                for entry in entries {
                    let status = match entry.status.as_str() {
                        "M" => {
                            modified += 1;
                            Some(GitStatus::Modified)
                        }
                        "U" | "??" => {
                            untracked += 1;
                            Some(GitStatus::Untracked)
                        }
                        _ => None,
                    };
                    if let Some(file) = self.workspace.file_mut(&entry.path) {
                        file.git_status = status;
                    }
                }
                self.status_message =
                    format!("Git: {} modified, {} untracked", modified, untracked);
            }
            Err(e) => self.status_message = format!("Git status failed: {}", e),
        }
    }

    /// Show changes for a file since the last snapshot as a chat message.
    fn show_diff(&mut self, path: &str) {
        let Some(current) = self.workspace.file(path).map(|f| f.content.clone()) else {
            self.status_message = format!("No such file: {}", path);
            return;
        };

        let baseline = cache::snapshot_path()
            .ok()
            .and_then(|p| cache::load_snapshot(&p, &self.project_id))
            .and_then(|snapshot| {
                snapshot
                    .files
                    .into_iter()
                    .find(|f| f.path == path)
                    .map(|f| f.content)
            })
            .unwrap_or_default();

        if diffs::texts_equal(&baseline, &current) {
            self.status_message = format!("{} unchanged since last snapshot", path);
            return;
        }

        let changes = diffs::line_diff(&baseline, &current);
        let added = changes.iter().filter(|l| l.tag == ChangeTag::Insert).count();
        let removed = changes.iter().filter(|l| l.tag == ChangeTag::Delete).count();
        self.status_message = format!("{}: +{} -{}", path, added, removed);

        let patch = diffs::unified_diff(&baseline, &current, path, path);
        self.workspace.push_assistant_message(&patch);
    }

    async fn start_preview(&mut self) {
        match self.client.preview_start().await {
            Ok(status) => {
                if let Some(url) = status.url {
                    self.workspace.preview_url = Some(url.clone());
                    self.workspace.open_browser_tab(&url, "Preview");
                    self.status_message = format!("Preview at {}", url);
                } else {
                    self.status_message = "Preview starting...".to_string();
                }
            }
            Err(e) => {
                self.status_message = format!("Preview failed: {}", e);
            }
        }
    }

    /* ---------- files ---------- */

    pub fn open_selected_file(&mut self) {
        if let Some(file) = self.workspace.files.get(self.file_index) {
            let path = file.path.clone();
            let content = file.content.clone();
            self.workspace.open_file(&path);
            self.live_editor.reset(content);
            self.focused_pane = FocusedPane::Editor;
        }
    }

    pub fn select_next_file(&mut self) {
        if !self.workspace.files.is_empty() {
            self.file_index = (self.file_index + 1).min(self.workspace.files.len() - 1);
        }
    }

    pub fn select_prev_file(&mut self) {
        self.file_index = self.file_index.saturating_sub(1);
    }

    pub fn close_active_tab(&mut self) {
        if let Some(path) = self.workspace.active_file.clone() {
            self.workspace.close_tab(&path);
            let content = self
                .workspace
                .active_file
                .as_ref()
                .and_then(|p| self.workspace.file(p))
                .map(|f| f.content.clone())
                .unwrap_or_default();
            self.live_editor.reset(content);
        }
    }

    /* ---------- snapshot cache ---------- */

    fn load_cached_files(&mut self) -> Option<usize> {
        let path = cache::snapshot_path().ok()?;
        let snapshot = cache::load_snapshot(&path, &self.project_id)?;
        let count = snapshot.files.len();
        self.workspace.replace_files(snapshot.files);
        Some(count)
    }

    fn save_snapshot(&self) {
        let snapshot = WorkspaceSnapshot::new(&self.project_id, self.workspace.files.clone());
        match cache::snapshot_path() {
            Ok(path) => {
                if let Err(e) = cache::save_snapshot(&path, &snapshot) {
                    warn!("Failed to write snapshot: {}", e);
                }
            }
            Err(e) => warn!("No cache directory: {}", e),
        }
    }
}
