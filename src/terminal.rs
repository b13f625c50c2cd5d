use anyhow::Result;
use regex::Regex;
use uuid::Uuid;

use crate::cmd_parser::CommandRunner;
use crate::workspace::{Port, Problem, Severity};

/// Lifecycle of a session between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingResponse,
    ErrorShown,
}

pub struct TerminalSession {
    pub id: Uuid,
    pub name: String,
    pub output: Vec<String>,
    pub input: String,
    pub history: Vec<String>,
    pub history_index: Option<usize>,
    pub active: bool,
    pub phase: SessionPhase,
}

impl TerminalSession {
    fn new(name: &str, active: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            output: Vec::new(),
            input: String::new(),
            history: Vec::new(),
            history_index: None,
            active,
            phase: SessionPhase::Idle,
        }
    }

    pub fn push_char(&mut self, c: char) {
        self.input.push(c);
        self.history_index = None;
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Up-arrow: walk back through history, clamped at the oldest entry.
    pub fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }

        let idx = match self.history_index {
            Some(i) if i > 0 => i - 1,
            Some(i) => i,
            None => self.history.len() - 1,
        };

        self.history_index = Some(idx);
        self.input = self.history[idx].clone();
    }

    /// Down-arrow: walk forward; below the last entry the input is empty.
    pub fn history_next(&mut self) {
        match self.history_index {
            Some(i) if i + 1 < self.history.len() => {
                self.history_index = Some(i + 1);
                self.input = self.history[i + 1].clone();
            }
            _ => {
                self.history_index = None;
                self.input.clear();
            }
        }
    }
}

/// Findings from scanning freshly appended output lines.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub urls: Vec<String>,
    pub problems: Vec<Problem>,
    pub ports: Vec<Port>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.problems.is_empty() && self.ports.is_empty()
    }
}

/// In-memory store of pseudo-terminal sessions. Exactly one is active.
pub struct TerminalStore {
    pub sessions: Vec<TerminalSession>,
    url_pattern: Regex,
    port_pattern: Regex,
}

impl TerminalStore {
    pub fn new() -> Self {
        Self {
            sessions: vec![TerminalSession::new("terminal 1", true)],
            url_pattern: Regex::new(r"https?://[^\s]+").unwrap(),
            port_pattern: Regex::new(r"(?i)listening on (?:port )?(\d{2,5})|:(\d{2,5})\b").unwrap(),
        }
    }

    pub fn active(&self) -> &TerminalSession {
        self.sessions
            .iter()
            .find(|s| s.active)
            .unwrap_or(&self.sessions[0])
    }

    pub fn active_mut(&mut self) -> &mut TerminalSession {
        let idx = self
            .sessions
            .iter()
            .position(|s| s.active)
            .unwrap_or(0);
        &mut self.sessions[idx]
    }

    pub fn add_session(&mut self) -> Uuid {
        let name = format!("terminal {}", self.sessions.len() + 1);
        let session = TerminalSession::new(&name, false);
        let id = session.id;
        self.sessions.push(session);
        self.set_active(id);
        id
    }

    pub fn set_active(&mut self, id: Uuid) {
        if !self.sessions.iter().any(|s| s.id == id) {
            return;
        }
        for session in &mut self.sessions {
            session.active = session.id == id;
        }
    }

    /// Execute a command on the active session: echo `$ cmd`, clear the
    /// input, call the backend, then append and scan the returned output.
    pub async fn execute_command(
        &mut self,
        runner: &dyn CommandRunner,
        command: &str,
    ) -> Result<ScanReport> {
        {
            let session = self.active_mut();
            session.output.push(format!("$ {}", command));
            session.input.clear();
            session.history_index = None;
            if !command.trim().is_empty() {
                session.history.push(command.to_string());
            }
            session.phase = SessionPhase::AwaitingResponse;
        }

        match runner.run(command).await {
            Ok(result) => {
                let mut lines = Vec::new();
                for line in result.output.split('\n') {
                    lines.push(line.to_string());
                }
                let report = self.scan_lines(&lines);

                let session = self.active_mut();
                session.output.extend(lines);
                session.phase = if result.returncode == 0 {
                    SessionPhase::Idle
                } else {
                    SessionPhase::ErrorShown
                };
                Ok(report)
            }
            Err(e) => {
                let session = self.active_mut();
                session.output.push(format!("[error] {}", e));
                session.phase = SessionPhase::ErrorShown;
                Err(e)
            }
        }
    }

    /// Scan output lines for URLs, error/warning text, and listening ports.
    pub fn scan_lines(&self, lines: &[String]) -> ScanReport {
        let mut report = ScanReport::default();

        for line in lines {
            for url in self.url_pattern.find_iter(line) {
                report.urls.push(url.as_str().trim_end_matches(['.', ',']).to_string());
            }

            let lower = line.to_lowercase();
            if lower.contains("error") {
                report.problems.push(Problem {
                    severity: Severity::Error,
                    message: line.trim().to_string(),
                    source: "terminal".to_string(),
                });
            } else if lower.contains("warning") || lower.contains("warn:") {
                report.problems.push(Problem {
                    severity: Severity::Warning,
                    message: line.trim().to_string(),
                    source: "terminal".to_string(),
                });
            }

            if let Some(caps) = self.port_pattern.captures(line) {
                let matched = caps.get(1).or_else(|| caps.get(2));
                if let Some(number) = matched.and_then(|m| m.as_str().parse::<u16>().ok()) {
                    if !report.ports.iter().any(|p| p.number == number) {
                        report.ports.push(Port {
                            number,
                            description: line.trim().to_string(),
                        });
                    }
                }
            }
        }

        report
    }
}

impl Default for TerminalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExecResult;
    use async_trait::async_trait;

    struct FixedRunner {
        output: String,
        returncode: i32,
    }

    #[async_trait]
    impl CommandRunner for FixedRunner {
        async fn run(&self, _command: &str) -> Result<ExecResult> {
            Ok(ExecResult {
                output: self.output.clone(),
                returncode: self.returncode,
            })
        }
    }

    #[tokio::test]
    async fn test_echo_output_lines_in_order() {
        let mut store = TerminalStore::new();
        let runner = FixedRunner {
            output: "hi\n".to_string(),
            returncode: 0,
        };

        let report = store.execute_command(&runner, "echo hi").await.unwrap();
        assert!(report.problems.is_empty());

        let session = store.active();
        assert_eq!(session.output, vec!["$ echo hi", "hi", ""]);
        assert_eq!(session.phase, SessionPhase::Idle);
        assert_eq!(session.input, "");
    }

    #[tokio::test]
    async fn test_error_line_becomes_problem() {
        let mut store = TerminalStore::new();
        let runner = FixedRunner {
            output: "Error: build failed\n".to_string(),
            returncode: 1,
        };

        let report = store.execute_command(&runner, "npm run build").await.unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].severity, Severity::Error);
        assert_eq!(report.problems[0].message, "Error: build failed");
        assert_eq!(store.active().phase, SessionPhase::ErrorShown);
    }

    #[tokio::test]
    async fn test_url_and_port_detection() {
        let store = TerminalStore::new();
        let report = store.scan_lines(&[
            "Server listening on port 3000".to_string(),
            "Open http://localhost:3000 to view".to_string(),
        ]);

        assert_eq!(report.urls, vec!["http://localhost:3000"]);
        assert!(report.ports.iter().any(|p| p.number == 3000));
    }

    #[test]
    fn test_history_navigation_clamped() {
        let mut session = TerminalSession::new("t", true);
        session.history = vec!["first".into(), "second".into()];

        session.history_prev();
        assert_eq!(session.input, "second");
        session.history_prev();
        assert_eq!(session.input, "first");
        // Clamped at the oldest entry.
        session.history_prev();
        assert_eq!(session.input, "first");

        session.history_next();
        assert_eq!(session.input, "second");
        // Below the last entry maps to an empty input buffer.
        session.history_next();
        assert_eq!(session.input, "");
        assert_eq!(session.history_index, None);
    }

    #[test]
    fn test_single_active_session() {
        let mut store = TerminalStore::new();
        let second = store.add_session();

        assert_eq!(store.sessions.iter().filter(|s| s.active).count(), 1);
        assert_eq!(store.active().id, second);

        let first = store.sessions[0].id;
        store.set_active(first);
        assert_eq!(store.active().id, first);
        assert_eq!(store.sessions.iter().filter(|s| s.active).count(), 1);
    }
}
