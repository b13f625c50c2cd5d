use uuid::Uuid;

use crate::workspace::ProjectFile;
use crate::ws::WsEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Insert,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Chat,
    Files,
    Editor,
    Terminal,
}

impl FocusedPane {
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Chat => FocusedPane::Files,
            FocusedPane::Files => FocusedPane::Editor,
            FocusedPane::Editor => FocusedPane::Terminal,
            FocusedPane::Terminal => FocusedPane::Chat,
        }
    }
}

/// Messages from background tasks to the UI loop. Stream messages carry
/// the id of the chat message they belong to; frames for a message that is
/// no longer streaming are ignored by the state layer.
#[derive(Debug, Clone)]
pub enum AppMessage {
    StreamDelta { id: Uuid, text: String },
    StreamDone { id: Uuid },
    StreamError { id: Uuid, error: String },
    /// Always sent once per stream, after every other frame.
    StreamClosed { id: Uuid },
    Ws(WsEvent),
    WsConnected(bool),
    FilesLoaded(Result<Vec<ProjectFile>, String>),
}
