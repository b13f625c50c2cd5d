use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use crate::api::{BackendClient, ExecResult};

/// Extract shell-command candidates from accumulated stream text.
///
/// Two carriers are recognized: `TERMINAL: <cmd>` directive lines and fenced
/// ```bash / ```sh blocks (multi-line fences join with `&&`). Candidates are
/// only ever surfaced for user approval, never auto-executed.
pub fn parse_commands(text: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();

        if let Some(rest) = trimmed.strip_prefix("TERMINAL:") {
            if let Some(cmd) = sanitize_command(rest) {
                commands.push(cmd);
            }
            i += 1;
            continue;
        }

        if trimmed.starts_with("```bash") || trimmed.starts_with("```sh") {
            let mut body = Vec::new();
            let mut closed = false;
            let mut j = i + 1;

            while j < lines.len() {
                if lines[j].trim() == "```" {
                    closed = true;
                    break;
                }
                if let Some(cmd) = sanitize_command(lines[j]) {
                    body.push(cmd);
                }
                j += 1;
            }

            // An open fence is still streaming; nothing in it is actionable yet.
            if !closed {
                break;
            }

            if !body.is_empty() {
                commands.push(body.join(" && "));
            }
            i = j + 1;
            continue;
        }

        i += 1;
    }

    commands
}

/// Validate one candidate line, stripping trailing comment suffixes first.
/// Returns `None` for noise: empty lines, bare fences, lone `$` prompts.
pub fn sanitize_command(raw: &str) -> Option<String> {
    let mut cmd = raw.trim();

    for marker in [" # ", " - "] {
        if let Some(pos) = cmd.rfind(marker) {
            cmd = cmd[..pos].trim_end();
        }
    }

    if cmd.is_empty() || cmd == "$" || cmd.starts_with("```") {
        return None;
    }

    Some(cmd.to_string())
}

/// Per-stream dedup: a command already surfaced as a pending-approval
/// message is not surfaced again, by exact string match.
#[derive(Debug, Default)]
pub struct CommandTracker {
    seen: HashSet<String>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_new(&mut self, text: &str) -> Vec<String> {
        parse_commands(text)
            .into_iter()
            .filter(|cmd| self.seen.insert(cmd.clone()))
            .collect()
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

pub fn contains_commands(text: &str) -> bool {
    let pattern = Regex::new(r"(?m)^\s*(TERMINAL:|```(?:bash|sh)\b)").unwrap();
    pattern.is_match(text)
}

/// Seam for approved-command execution. The interactive terminal session is
/// the primary runner; `BackendRunner` is the fallback when no interactive
/// handle is available.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<ExecResult>;
}

pub struct BackendRunner {
    client: BackendClient,
}

impl BackendRunner {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandRunner for BackendRunner {
    async fn run(&self, command: &str) -> Result<ExecResult> {
        Ok(self.client.terminal_execute(command).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_directive() {
        let text = "Let's set up.\nTERMINAL: npm install express\nThen run it.";
        let commands = parse_commands(text);
        assert_eq!(commands, vec!["npm install express"]);
    }

    #[test]
    fn test_fenced_block_joined() {
        let text = "```bash\ncd app\nnpm run dev\n```";
        let commands = parse_commands(text);
        assert_eq!(commands, vec!["cd app && npm run dev"]);
    }

    #[test]
    fn test_open_fence_not_actionable() {
        let text = "```bash\nnpm install";
        assert!(parse_commands(text).is_empty());
    }

    #[test]
    fn test_sanitize_strips_comment_suffixes() {
        assert_eq!(
            sanitize_command("npm install # installs deps"),
            Some("npm install".to_string())
        );
        assert_eq!(
            sanitize_command("npm test - run the suite"),
            Some("npm test".to_string())
        );
    }

    #[test]
    fn test_sanitize_rejects_noise() {
        assert_eq!(sanitize_command(""), None);
        assert_eq!(sanitize_command("   "), None);
        assert_eq!(sanitize_command("$"), None);
        assert_eq!(sanitize_command("```"), None);
        assert_eq!(sanitize_command("```bash"), None);
    }

    #[test]
    fn test_tracker_dedup_by_exact_string() {
        let mut tracker = CommandTracker::new();
        let text = "TERMINAL: npm install";

        assert_eq!(tracker.take_new(text).len(), 1);

        let grown = "TERMINAL: npm install\nmore prose\nTERMINAL: npm install";
        assert!(tracker.take_new(grown).is_empty());

        let with_new = format!("{}\nTERMINAL: npm test", grown);
        assert_eq!(tracker.take_new(&with_new), vec!["npm test"]);
    }

    #[test]
    fn test_contains_commands() {
        assert!(contains_commands("TERMINAL: ls"));
        assert!(contains_commands("```bash\nls\n```"));
        assert!(!contains_commands("plain prose with ```js fences"));
    }
}
