use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Resize gestures run a small state machine driven by pointer events:
/// idle until a divider grab, dragging while the pointer moves, idle again
/// on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        origin: (u16, u16),
        axis: Axis,
    },
}

/// Explicit, serializable panel layout for the workspace shell. Sizes are
/// terminal cells; the renderer clamps them to the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutState {
    pub sidebar_width: u16,
    pub chat_width: u16,
    pub terminal_height: u16,
    pub show_sidebar: bool,
    pub show_terminal: bool,

    #[serde(skip)]
    pub drag: DragState,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self {
            sidebar_width: 28,
            chat_width: 42,
            terminal_height: 10,
            show_sidebar: true,
            show_terminal: true,
            drag: DragState::Idle,
        }
    }
}

const MIN_PANEL: u16 = 10;
const MAX_PANEL: u16 = 120;

impl LayoutState {
    pub fn begin_drag(&mut self, origin: (u16, u16), axis: Axis) {
        self.drag = DragState::Dragging { origin, axis };
    }

    /// Pointer moved while dragging: resize the panel on the drag axis by
    /// the delta since the origin, clamped, and advance the origin.
    pub fn drag_to(&mut self, position: (u16, u16)) {
        let DragState::Dragging { origin, axis } = self.drag else {
            return;
        };

        match axis {
            Axis::Horizontal => {
                let delta = position.0 as i32 - origin.0 as i32;
                self.sidebar_width = clamp_panel(self.sidebar_width as i32 + delta);
            }
            Axis::Vertical => {
                let delta = origin.1 as i32 - position.1 as i32;
                self.terminal_height = clamp_panel(self.terminal_height as i32 + delta);
            }
        }

        self.drag = DragState::Dragging {
            origin: position,
            axis,
        };
    }

    pub fn end_drag(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn toggle_sidebar(&mut self) {
        self.show_sidebar = !self.show_sidebar;
    }

    pub fn toggle_terminal(&mut self) {
        self.show_terminal = !self.show_terminal;
    }
}

fn clamp_panel(value: i32) -> u16 {
    value.clamp(MIN_PANEL as i32, MAX_PANEL as i32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_cycle() {
        let mut layout = LayoutState::default();
        assert_eq!(layout.drag, DragState::Idle);

        layout.begin_drag((28, 5), Axis::Horizontal);
        layout.drag_to((34, 5));
        assert_eq!(layout.sidebar_width, 34);

        layout.drag_to((30, 5));
        assert_eq!(layout.sidebar_width, 30);

        layout.end_drag();
        assert_eq!(layout.drag, DragState::Idle);

        // Moves while idle do nothing.
        layout.drag_to((80, 5));
        assert_eq!(layout.sidebar_width, 30);
    }

    #[test]
    fn test_drag_clamped_at_bounds() {
        let mut layout = LayoutState::default();
        layout.begin_drag((28, 0), Axis::Horizontal);
        layout.drag_to((0, 0));
        assert_eq!(layout.sidebar_width, MIN_PANEL);
    }

    #[test]
    fn test_vertical_drag_resizes_terminal() {
        let mut layout = LayoutState::default();
        layout.begin_drag((0, 40), Axis::Vertical);
        layout.drag_to((0, 35));
        assert_eq!(layout.terminal_height, 15);
    }

    #[test]
    fn test_layout_serializes_without_drag_state() {
        let mut layout = LayoutState::default();
        layout.begin_drag((0, 0), Axis::Horizontal);

        let json = serde_json::to_string(&layout).unwrap();
        let restored: LayoutState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.drag, DragState::Idle);
        assert_eq!(restored.sidebar_width, layout.sidebar_width);
    }
}
