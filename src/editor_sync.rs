use std::time::{Duration, Instant};

/// Lines-from-end window inside which the view follows the growing tail.
const TAIL_WINDOW: usize = 3;

/// What the editor widget renders: content plus cursor/scroll placement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorView {
    pub content: String,
    /// Zero-based (line, column).
    pub cursor: (usize, usize),
    /// First visible line.
    pub scroll: usize,
}

#[derive(Debug, Clone)]
struct PendingUpdate {
    content: String,
    line: usize,
    column: usize,
}

/// Throttled mirror between stream-driven file content and the visible
/// editor widget.
///
/// State is updated on every event by the caller; this type only gates the
/// widget refresh: at most one flush per interval, with the latest pending
/// update queued in between so nothing is ever dropped. When the reported
/// line is near the end of the file the view scrolls to keep the tail
/// visible, letting the user watch code grow without touching the scrollbar.
pub struct LiveEditor {
    throttle: Duration,
    viewport_rows: usize,
    last_flush: Option<Instant>,
    pending: Option<PendingUpdate>,
    pub view: EditorView,
}

impl LiveEditor {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            viewport_rows: 24,
            last_flush: None,
            pending: None,
            view: EditorView::default(),
        }
    }

    pub fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows.max(1);
    }

    /// Queue a refresh; a newer update replaces an older pending one.
    pub fn queue(&mut self, content: String, line: usize, column: usize) {
        self.pending = Some(PendingUpdate {
            content,
            line,
            column,
        });
    }

    /// Flush the pending update if the throttle interval has elapsed.
    /// Returns true when the view changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.pending.is_none() {
            return false;
        }
        if let Some(last) = self.last_flush {
            if now.duration_since(last) < self.throttle {
                return false;
            }
        }

        let update = self.pending.take().unwrap();
        self.apply(update, false);
        self.last_flush = Some(now);
        true
    }

    /// Final flush on stream completion: applies any pending update
    /// regardless of the throttle and scrolls to the end of the file.
    pub fn finish(&mut self, now: Instant) -> bool {
        let update = self.pending.take().unwrap_or_else(|| PendingUpdate {
            content: self.view.content.clone(),
            line: usize::MAX,
            column: 0,
        });
        self.apply(update, true);
        self.last_flush = Some(now);
        true
    }

    /// Replace the view outright, e.g. when the user switches files.
    pub fn reset(&mut self, content: String) {
        self.pending = None;
        self.view = EditorView {
            content,
            cursor: (0, 0),
            scroll: 0,
        };
    }

    fn apply(&mut self, update: PendingUpdate, force_tail: bool) {
        let total = update.content.lines().count();
        let last_line = total.saturating_sub(1);

        let near_tail = force_tail || update.line.saturating_add(TAIL_WINDOW) >= total;

        if near_tail {
            let last_len = update.content.lines().last().map(str::len).unwrap_or(0);
            self.view.cursor = (last_line, last_len);
            self.view.scroll = total.saturating_sub(self.viewport_rows);
        } else {
            let line = update.line.min(last_line);
            self.view.cursor = (line, update.column);
            // Keep the cursor inside the viewport.
            if line < self.view.scroll {
                self.view.scroll = line;
            } else if line >= self.view.scroll + self.viewport_rows {
                self.view.scroll = line + 1 - self.viewport_rows;
            }
        }

        self.view.content = update.content;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> LiveEditor {
        let mut editor = LiveEditor::new(Duration::from_millis(200));
        editor.set_viewport_rows(10);
        editor
    }

    #[test]
    fn test_throttle_holds_latest_pending() {
        let mut editor = editor();
        let start = Instant::now();

        editor.queue("a\n".into(), 0, 1);
        assert!(editor.tick(start));
        assert_eq!(editor.view.content, "a\n");

        // Updates inside the interval queue up; only the latest survives.
        editor.queue("a\nb\n".into(), 1, 1);
        editor.queue("a\nb\nc\n".into(), 2, 1);
        assert!(!editor.tick(start + Duration::from_millis(50)));
        assert_eq!(editor.view.content, "a\n");

        assert!(editor.tick(start + Duration::from_millis(250)));
        assert_eq!(editor.view.content, "a\nb\nc\n");
    }

    #[test]
    fn test_tail_follow_near_end_of_file() {
        let mut editor = editor();
        let content: String = (0..30).map(|i| format!("line {}\n", i)).collect();

        // Reported line within 3 of the total: follow the tail.
        editor.queue(content.clone(), 28, 2);
        editor.tick(Instant::now());

        assert_eq!(editor.view.cursor.0, 29);
        assert_eq!(editor.view.cursor.1, "line 29".len());
        assert_eq!(editor.view.scroll, 20);
    }

    #[test]
    fn test_no_tail_follow_in_middle_of_file() {
        let mut editor = editor();
        let content: String = (0..40).map(|i| format!("line {}\n", i)).collect();

        editor.queue(content, 5, 3);
        editor.tick(Instant::now());

        assert_eq!(editor.view.cursor, (5, 3));
        assert_eq!(editor.view.scroll, 0);
    }

    #[test]
    fn test_whole_document_update_follows_tail() {
        let mut editor = editor();
        let content: String = (0..30).map(|i| format!("line {}\n", i)).collect();

        // Full-document replacements carry no cursor line; the end
        // sentinel must still resolve to tail-follow.
        editor.queue(content, usize::MAX, 0);
        assert!(editor.tick(Instant::now()));

        assert_eq!(editor.view.cursor.0, 29);
        assert_eq!(editor.view.scroll, 20);
    }

    #[test]
    fn test_finish_forces_scroll_to_end() {
        let mut editor = editor();
        let content: String = (0..30).map(|i| format!("line {}\n", i)).collect();

        editor.queue(content.clone(), 4, 0);
        editor.tick(Instant::now());
        assert_eq!(editor.view.scroll, 0);

        // Completion flush ignores both throttle and cursor position.
        editor.finish(Instant::now());
        assert_eq!(editor.view.scroll, 20);
        assert_eq!(editor.view.cursor.0, 29);
    }

    #[test]
    fn test_finish_flushes_pending_content() {
        let mut editor = editor();
        editor.queue("a\n".into(), 0, 1);
        editor.tick(Instant::now());

        editor.queue("a\nfinal\n".into(), 1, 5);
        // Still throttled, but finish must not drop the queued content.
        editor.finish(Instant::now());
        assert_eq!(editor.view.content, "a\nfinal\n");
        assert_eq!(editor.view.cursor.0, 1);
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut editor = editor();
        editor.queue("old\n".into(), 0, 0);
        editor.reset("new\n".into());
        assert!(!editor.tick(Instant::now() + Duration::from_secs(1)));
        assert_eq!(editor.view.content, "new\n");
    }
}
