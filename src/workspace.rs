use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::block_parser::{is_entry_point, BlockTracker, FileBlock};
use crate::cmd_parser::{contains_commands, CommandTracker};
use crate::diffs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Execution state of an approval-gated command message.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandState {
    Pending,
    Running,
    Completed,
    Failed(String),
}

/// A chat message. Messages are identified by id from creation on; every
/// later mutation (stream append, finalize, approval updates) goes through
/// the id rather than through "last message" positional identity.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub is_streaming: bool,
    pub needs_approval: bool,
    pub command: Option<String>,
    pub command_state: Option<CommandState>,
    /// Set when the message represents a live code update to a file.
    pub path: Option<String>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Local::now(),
            is_streaming: false,
            needs_approval: false,
            command: None,
            command_state: None,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitStatus {
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "U")]
    Untracked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub git_status: Option<GitStatus>,
}

impl ProjectFile {
    pub fn new(path: &str, content: String) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let language = language_for_path(path);
        let size = content.len() as u64;
        Self {
            name,
            path: path.to_string(),
            content,
            language,
            size,
            last_modified: None,
            git_status: None,
        }
    }
}

fn language_for_path(path: &str) -> String {
    match path.rsplit('.').next().unwrap_or_default() {
        "rs" => "rust",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "md" => "markdown",
        "toml" => "toml",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct BrowserTab {
    pub id: Uuid,
    pub url: String,
    pub title: String,
}

/// What the center pane currently shows: the active file, or the active
/// preview browser tab. The two are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum CenterPane {
    Empty,
    File(String),
    Browser(Uuid),
}

/// Effects of one stream content delta, for the caller to act on.
#[derive(Debug, Default)]
pub struct StreamEffects {
    /// Paths whose content was replaced or created by complete code blocks.
    pub applied_files: Vec<String>,
    /// Ids of newly surfaced approval-gated command messages.
    pub new_commands: Vec<Uuid>,
}

/// The workspace state container: files, tabs, chat, problems, ports, and
/// the bookkeeping for the in-flight stream.
pub struct Workspace {
    pub files: Vec<ProjectFile>,
    pub open_tabs: Vec<String>,
    pub active_file: Option<String>,
    pub browser_tabs: Vec<BrowserTab>,
    pub active_browser_tab: Option<Uuid>,
    pub messages: Vec<ChatMessage>,
    pub problems: Vec<Problem>,
    pub ports: Vec<Port>,
    pub preview_url: Option<String>,

    blocks: BlockTracker,
    commands: CommandTracker,
    stream_content: String,
    streaming_id: Option<Uuid>,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            open_tabs: Vec::new(),
            active_file: None,
            browser_tabs: Vec::new(),
            active_browser_tab: None,
            messages: Vec::new(),
            problems: Vec::new(),
            ports: Vec::new(),
            preview_url: None,
            blocks: BlockTracker::new(),
            commands: CommandTracker::new(),
            stream_content: String::new(),
            streaming_id: None,
        }
    }

    /* ---------- files and tabs ---------- */

    pub fn file(&self, path: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn file_mut(&mut self, path: &str) -> Option<&mut ProjectFile> {
        self.files.iter_mut().find(|f| f.path == path)
    }

    pub fn replace_files(&mut self, files: Vec<ProjectFile>) {
        self.files = files;
        let files = &self.files;
        self.open_tabs.retain(|p| files.iter().any(|f| &f.path == p));
        if let Some(active) = &self.active_file {
            if !self.open_tabs.contains(active) {
                self.active_file = self.open_tabs.last().cloned();
            }
        }
    }

    /// Replace or create file content. Returns true when the file was new.
    pub fn upsert_file(&mut self, path: &str, content: String) -> bool {
        if let Some(file) = self.file_mut(path) {
            file.size = content.len() as u64;
            file.content = content;
            false
        } else {
            self.files.push(ProjectFile::new(path, content));
            true
        }
    }

    pub fn open_file(&mut self, path: &str) {
        if !self.open_tabs.iter().any(|p| p == path) {
            self.open_tabs.push(path.to_string());
        }
        self.active_file = Some(path.to_string());
        self.active_browser_tab = None;
    }

    /// Close a tab. The file stays in the collection; if it was active, the
    /// previously-last remaining tab becomes active (or none remain).
    pub fn close_tab(&mut self, path: &str) {
        self.open_tabs.retain(|p| p != path);
        if self.active_file.as_deref() == Some(path) {
            self.active_file = self.open_tabs.last().cloned();
        }
    }

    pub fn open_browser_tab(&mut self, url: &str, title: &str) -> Uuid {
        let tab = BrowserTab {
            id: Uuid::new_v4(),
            url: url.to_string(),
            title: title.to_string(),
        };
        let id = tab.id;
        self.browser_tabs.push(tab);
        self.active_browser_tab = Some(id);
        id
    }

    pub fn close_browser_tab(&mut self, id: Uuid) {
        self.browser_tabs.retain(|t| t.id != id);
        if self.active_browser_tab == Some(id) {
            self.active_browser_tab = self.browser_tabs.last().map(|t| t.id);
        }
    }

    pub fn center_pane(&self) -> CenterPane {
        if let Some(id) = self.active_browser_tab {
            return CenterPane::Browser(id);
        }
        match &self.active_file {
            Some(path) => CenterPane::File(path.clone()),
            None => CenterPane::Empty,
        }
    }

    /* ---------- chat messages ---------- */

    pub fn message(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: Uuid) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn push_user_message(&mut self, content: &str) -> Uuid {
        let message = ChatMessage::new(ChatRole::User, content.to_string());
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn push_assistant_message(&mut self, content: &str) -> Uuid {
        let message = ChatMessage::new(ChatRole::Assistant, content.to_string());
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Start a new assistant stream. Any message still marked streaming is
    /// finalized first so at most one message streams at a time.
    pub fn begin_stream(&mut self) -> Uuid {
        if let Some(previous) = self.streaming_id.take() {
            if let Some(message) = self.message_mut(previous) {
                message.is_streaming = false;
            }
        }

        let mut message = ChatMessage::new(ChatRole::Assistant, String::new());
        message.is_streaming = true;
        let id = message.id;
        self.messages.push(message);

        self.streaming_id = Some(id);
        self.stream_content.clear();
        self.blocks.reset();
        self.commands.reset();
        id
    }

    pub fn streaming_id(&self) -> Option<Uuid> {
        self.streaming_id
    }

    /// Apply one content delta from the stream: grow the live message, then
    /// scan the accumulated text for newly completed code blocks and
    /// command directives.
    pub fn apply_stream_delta(&mut self, id: Uuid, text: &str) -> StreamEffects {
        let mut effects = StreamEffects::default();

        if self.streaming_id != Some(id) {
            // Late frame from a stream already finalized (e.g. after Stop).
            return effects;
        }

        self.stream_content.push_str(text);
        if let Some(message) = self.message_mut(id) {
            message.content.push_str(text);
        }

        let accumulated = self.stream_content.clone();
        for block in self.blocks.take_new(&accumulated) {
            effects.applied_files.push(block.path.clone());
            self.apply_file_block(&block);
        }

        if contains_commands(&accumulated) {
            for command in self.commands.take_new(&accumulated) {
                effects.new_commands.push(self.push_pending_command(&command));
            }
        }

        effects
    }

    /// Finalize the stream. With an error, the error text is appended so
    /// partial output is kept rather than dropped.
    pub fn finalize_stream(&mut self, id: Uuid, error: Option<&str>) {
        if self.streaming_id == Some(id) {
            self.streaming_id = None;
        }
        if let Some(message) = self.message_mut(id) {
            message.is_streaming = false;
            if let Some(error) = error {
                if !message.content.is_empty() {
                    message.content.push('\n');
                }
                message.content.push_str(&format!("[error] {}", error));
            }
        }
    }

    /// Apply a complete code block: replace an existing file's content in
    /// place, or create the file and auto-open it when nothing is active or
    /// it looks like an entry point. A `diff`/`patch` block patches the
    /// existing file instead of replacing it.
    pub fn apply_file_block(&mut self, block: &FileBlock) {
        if matches!(block.language.as_deref(), Some("diff") | Some("patch")) {
            let Some(file) = self.file(&block.path) else {
                warn!("Patch block for unknown file {}, skipping", block.path);
                return;
            };
            match diffs::apply_patch(&file.content, &block.content) {
                Ok(patched) => {
                    self.upsert_file(&block.path, patched);
                }
                Err(e) => warn!("Could not patch {}: {}", block.path, e),
            }
            return;
        }

        let created = self.upsert_file(&block.path, block.content.clone());

        if created && (self.active_file.is_none() || is_entry_point(&block.path)) {
            self.open_file(&block.path);
        }
    }

    /* ---------- approval-gated commands ---------- */

    fn push_pending_command(&mut self, command: &str) -> Uuid {
        let mut message = ChatMessage::new(
            ChatRole::Assistant,
            format!("Run `{}`?", command),
        );
        message.needs_approval = true;
        message.command = Some(command.to_string());
        message.command_state = Some(CommandState::Pending);
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// First command still waiting for a decision, oldest first.
    pub fn next_pending_command(&self) -> Option<Uuid> {
        self.messages
            .iter()
            .find(|m| m.needs_approval && m.command_state == Some(CommandState::Pending))
            .map(|m| m.id)
    }

    /// Approve: flip the message to running and hand back the command.
    /// Returns None when the message is not awaiting approval.
    pub fn approve_command(&mut self, id: Uuid) -> Option<String> {
        let message = self.message_mut(id)?;
        if message.command_state != Some(CommandState::Pending) {
            return None;
        }
        message.command_state = Some(CommandState::Running);
        message.needs_approval = false;
        message.command.clone()
    }

    pub fn complete_command(&mut self, id: Uuid, output: &str, returncode: i32) {
        if let Some(message) = self.message_mut(id) {
            message.command_state = Some(if returncode == 0 {
                CommandState::Completed
            } else {
                CommandState::Failed(format!("exit code {}", returncode))
            });
            if !output.trim().is_empty() {
                message.content.push('\n');
                message.content.push_str(output.trim_end());
            }
        }
    }

    pub fn fail_command(&mut self, id: Uuid, error: &str) {
        if let Some(message) = self.message_mut(id) {
            message.command_state = Some(CommandState::Failed(error.to_string()));
        }
    }

    /// Decline removes the approval message entirely.
    pub fn decline_command(&mut self, id: Uuid) {
        self.messages.retain(|m| m.id != id);
    }

    /* ---------- problems and ports ---------- */

    pub fn record_problem(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    /// Ports are deduped by number; the first sighting wins.
    pub fn record_port(&mut self, port: Port) {
        if !self.ports.iter().any(|p| p.number == port.number) {
            self.ports.push(port);
        }
    }

    pub fn clear_problems(&mut self) {
        self.problems.clear();
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
