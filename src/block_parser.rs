use std::collections::HashSet;

/// A complete fenced code block addressed to a file path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlock {
    pub path: String,
    pub language: Option<String>,
    pub content: String,
}

// Shell fences are command suggestions, not file content; cmd_parser owns them.
const SHELL_LANGS: [&str; 5] = ["bash", "sh", "shell", "console", "command"];

const ENTRY_STEMS: [&str; 3] = ["main", "index", "app"];
const ENTRY_EXTENSIONS: [&str; 15] = [
    "rs", "js", "jsx", "ts", "tsx", "py", "go", "html", "css", "vue", "svelte", "java", "rb",
    "php", "c",
];

/// Parse all **complete** file blocks out of a piece of stream text.
///
/// The target path may sit on the fence line after the language tag
/// (```js /a.js) or be the first body line; both the tag and the
/// fence-line path are optional. Blocks whose closing fence has not
/// arrived yet are ignored so partially streamed code is never applied.
pub fn parse_file_blocks(text: &str) -> Vec<FileBlock> {
    scan_blocks(text).0
}

/// Scan `text` for complete file blocks and report how many leading bytes
/// were fully consumed. Consumption stops at the first unterminated fence
/// (its body is still streaming) and never includes a trailing partial
/// line, so an incremental caller can resume from the returned offset once
/// more text has arrived.
fn scan_blocks(text: &str) -> (Vec<FileBlock>, usize) {
    let mut blocks = Vec::new();
    let mut consumed = 0;

    // (byte offset, raw line including any trailing newline)
    let mut lines: Vec<(usize, &str)> = Vec::new();
    let mut pos = 0;
    for raw in text.split_inclusive('\n') {
        lines.push((pos, raw));
        pos += raw.len();
    }

    let mut i = 0;
    while i < lines.len() {
        let (start, raw) = lines[i];
        let complete_line = raw.ends_with('\n');
        let trimmed = raw.trim_end_matches(['\n', '\r']).trim();

        if !trimmed.starts_with("```") {
            // Plain text. A line without its newline may still grow into a
            // fence opener, so only complete lines are consumed.
            if complete_line {
                consumed = start + raw.len();
            }
            i += 1;
            continue;
        }

        if !complete_line {
            break;
        }

        let header = trimmed.trim_start_matches('`').trim();
        let (language, mut path) = split_header(header);

        // Collect body until the closing fence.
        let mut body = Vec::new();
        let mut closed = false;
        let mut j = i + 1;
        let mut end = start + raw.len();
        while j < lines.len() {
            let (_, body_raw) = lines[j];
            if body_raw.trim_end_matches(['\n', '\r']).trim() == "```" && body_raw.ends_with('\n')
            {
                closed = true;
                end = lines[j].0 + body_raw.len();
                break;
            }
            if body_raw.trim_end_matches(['\n', '\r']).trim() == "```" && j == lines.len() - 1 {
                // Closing fence as the very last line, no trailing newline.
                closed = true;
                end = lines[j].0 + body_raw.len();
                break;
            }
            body.push(body_raw.trim_end_matches(['\n', '\r']));
            j += 1;
        }

        if !closed {
            // The fence is still streaming; everything from its opener on
            // stays unconsumed for the next scan.
            break;
        }

        consumed = end;
        i = j + 1;

        if language
            .as_deref()
            .map(|l| SHELL_LANGS.contains(&l))
            .unwrap_or(false)
        {
            continue;
        }

        if path.is_none() {
            if let Some(first) = body.first() {
                if looks_like_path(first.trim()) {
                    path = Some(first.trim().to_string());
                    body.remove(0);
                }
            }
        }

        if let Some(path) = path {
            blocks.push(FileBlock {
                path,
                language,
                content: body.join("\n"),
            });
        }
    }

    (blocks, consumed)
}

fn split_header(header: &str) -> (Option<String>, Option<String>) {
    let mut language = None;
    let mut path = None;

    for token in header.split_whitespace() {
        if looks_like_path(token) {
            path = Some(token.to_string());
        } else if language.is_none() {
            language = Some(token.to_string());
        }
    }

    (language, path)
}

fn looks_like_path(token: &str) -> bool {
    !token.is_empty()
        && !token.starts_with("```")
        && !token.contains(char::is_whitespace)
        && (token.contains('/') || token.contains('.'))
}

/// Whether a file name matches a conventional entry-point pattern,
/// which triggers auto-opening the new file in a tab.
pub fn is_entry_point(name: &str) -> bool {
    let name = name.rsplit('/').next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            ENTRY_STEMS.contains(&stem.to_lowercase().as_str())
                && ENTRY_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        }
        None => false,
    }
}

/// Incremental block extraction over one stream's accumulated text.
///
/// `take_new` is handed the full accumulated text on every delta but only
/// scans from the end of what previous calls fully consumed, plus the
/// trailing region held back for an unterminated fence or partial line.
/// The dedup set is the correctness backstop for that overlap: its key is
/// coarse (path + body length), so two different same-length edits to one
/// path in a single stream would collide and the second would be skipped.
#[derive(Debug, Default)]
pub struct BlockTracker {
    seen: HashSet<(String, usize)>,
    consumed: usize,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the unconsumed tail of `text` and return blocks not applied
    /// before. `text` must be the same accumulated string as previous
    /// calls, grown by appending.
    pub fn take_new(&mut self, text: &str) -> Vec<FileBlock> {
        let (blocks, consumed) = scan_blocks(&text[self.consumed.min(text.len())..]);
        self.consumed += consumed;

        blocks
            .into_iter()
            .filter(|block| self.seen.insert((block.path.clone(), block.content.len())))
            .collect()
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_on_fence_line() {
        let text = "```js /a.js\nconsole.log(1)\n```";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "/a.js");
        assert_eq!(blocks[0].language.as_deref(), Some("js"));
        assert_eq!(blocks[0].content, "console.log(1)");
    }

    #[test]
    fn test_path_as_first_body_line() {
        let text = "Here you go:\n```python\nsrc/app.py\nprint('hi')\n```\nDone.";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "src/app.py");
        assert_eq!(blocks[0].content, "print('hi')");
    }

    #[test]
    fn test_bare_fence_with_path_first_line() {
        let text = "```\n/a.js\nconsole.log(1)\n```\n";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "/a.js");
        assert_eq!(blocks[0].language, None);
        assert_eq!(blocks[0].content, "console.log(1)");
    }

    #[test]
    fn test_bare_fence_without_path_ignored() {
        let text = "```\nsome plain text\n```\nafter";
        assert!(parse_file_blocks(text).is_empty());
    }

    #[test]
    fn test_unterminated_block_not_emitted() {
        let mut text = String::from("```js /a.js\nconsole.log(");
        assert!(parse_file_blocks(&text).is_empty());

        text.push_str("1)\n");
        assert!(parse_file_blocks(&text).is_empty());

        text.push_str("```");
        let blocks = parse_file_blocks(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "console.log(1)");
    }

    #[test]
    fn test_shell_fence_is_not_a_file_block() {
        let text = "```bash\nnpm install\n```\n```js /b.js\nlet x = 1;\n```";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "/b.js");
    }

    #[test]
    fn test_plain_code_block_without_path_ignored() {
        let text = "```rust\nfn main() {}\n```";
        assert!(parse_file_blocks(text).is_empty());
    }

    #[test]
    fn test_multiple_blocks() {
        let text = "```js /a.js\n1\n```\ntext\n```ts src/b.ts\n2\n```";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].path, "/a.js");
        assert_eq!(blocks[1].path, "src/b.ts");
    }

    #[test]
    fn test_tracker_applies_exactly_once_under_growth() {
        let mut tracker = BlockTracker::new();
        let text = "```js /a.js\nconsole.log(1)\n```\n";

        assert_eq!(tracker.take_new(text).len(), 1);
        // Growth after a consumed block must not re-emit it.
        let grown = format!("{}more prose\n", text);
        assert!(tracker.take_new(&grown).is_empty());

        tracker.reset();
        assert_eq!(tracker.take_new(text).len(), 1);
    }

    #[test]
    fn test_tracker_incremental_fence_completion() {
        let mut tracker = BlockTracker::new();
        let mut text = String::from("Sure:\n```js /a.js\nconsole.log(");
        assert!(tracker.take_new(&text).is_empty());

        text.push_str("1)\n");
        assert!(tracker.take_new(&text).is_empty());

        text.push_str("```\n");
        let blocks = tracker.take_new(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "console.log(1)");
    }

    #[test]
    fn test_tracker_fence_opener_split_mid_line() {
        let mut tracker = BlockTracker::new();
        let mut text = String::from("prose\n``");
        assert!(tracker.take_new(&text).is_empty());

        text.push_str("`js /a.js\nlet x;\n```\n");
        let blocks = tracker.take_new(&text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "/a.js");
    }

    #[test]
    fn test_tracker_same_path_different_length() {
        let mut tracker = BlockTracker::new();
        let first = "```js /a.js\nshort\n```\n";
        assert_eq!(tracker.take_new(first).len(), 1);

        let second = format!("{}```js /a.js\nmuch longer body\n```\n", first);
        let new = tracker.take_new(&second);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].content, "much longer body");
    }

    #[test]
    fn test_entry_point_detection() {
        assert!(is_entry_point("main.rs"));
        assert!(is_entry_point("index.html"));
        assert!(is_entry_point("src/app.py"));
        assert!(is_entry_point("App.tsx"));
        assert!(!is_entry_point("helpers.js"));
        assert!(!is_entry_point("main"));
        assert!(!is_entry_point("main.xyz"));
    }
}
