use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use serde::Deserialize;

use crate::board::{Point, PointerInput};
use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Pointer(PointerInput),
    /// Terminal size changed; the host should lay the board out again.
    Resize(u16, u16),
}

/// Terminal cells map to board coordinates one to one.
pub fn cell_to_point(column: u16, row: u16) -> Point {
    Point::new(f64::from(column), f64::from(row))
}

/// Translates a terminal event. `task_at` resolves the card under the cursor
/// for presses; a press on empty space is dropped.
pub fn event_to_input(
    event: Event,
    task_at: impl Fn(Point) -> Option<TaskId>,
) -> Option<InputEvent> {
    match event {
        Event::Mouse(mouse) => {
            let at = cell_to_point(mouse.column, mouse.row);
            let pointer = match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => {
                    PointerInput::Down { task_id: task_at(at)?, at }
                }
                MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => {
                    PointerInput::Move { at }
                }
                MouseEventKind::Up(MouseButton::Left) => PointerInput::Up { at },
                _ => return None,
            };
            Some(InputEvent::Pointer(pointer))
        }
        Event::Key(key) if key.kind != KeyEventKind::Release && key.code == KeyCode::Esc => {
            Some(InputEvent::Pointer(PointerInput::Cancel))
        }
        Event::FocusLost => Some(InputEvent::Pointer(PointerInput::Leave)),
        Event::Resize(width, height) => Some(InputEvent::Resize(width, height)),
        _ => None,
    }
}

/// A terminal event as stored in a recorded session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedEvent {
    /// Left press; `task` is the card the host drew under the cell, if any.
    MouseDown {
        column: u16,
        row: u16,
        #[serde(default)]
        task: Option<String>,
    },
    MouseDrag { column: u16, row: u16 },
    MouseUp { column: u16, row: u16 },
    Escape,
    FocusLost,
    Resize { width: u16, height: u16 },
}

impl RecordedEvent {
    pub fn to_event(&self) -> Event {
        match self {
            RecordedEvent::MouseDown { column, row, .. } => {
                mouse_event(MouseEventKind::Down(MouseButton::Left), *column, *row)
            }
            RecordedEvent::MouseDrag { column, row } => {
                mouse_event(MouseEventKind::Drag(MouseButton::Left), *column, *row)
            }
            RecordedEvent::MouseUp { column, row } => {
                mouse_event(MouseEventKind::Up(MouseButton::Left), *column, *row)
            }
            RecordedEvent::Escape => Event::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)),
            RecordedEvent::FocusLost => Event::FocusLost,
            RecordedEvent::Resize { width, height } => Event::Resize(*width, *height),
        }
    }

    /// Replays the event through [`event_to_input`] with the recorded card.
    pub fn to_input(&self) -> Option<InputEvent> {
        let task = match self {
            RecordedEvent::MouseDown { task, .. } => task.clone().map(TaskId::new),
            _ => None,
        };
        event_to_input(self.to_event(), |_| task.clone())
    }
}

fn mouse_event(kind: MouseEventKind, column: u16, row: u16) -> Event {
    Event::Mouse(MouseEvent {
        kind,
        column,
        row,
        modifiers: KeyModifiers::NONE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        mouse_event(kind, column, row)
    }

    fn card_at(point: Point) -> Option<TaskId> {
        (point.x < 20.0).then(|| TaskId::from("t1"))
    }

    #[test]
    fn test_left_press_on_card_arms_drag() {
        let result = event_to_input(mouse(MouseEventKind::Down(MouseButton::Left), 10, 5), card_at);
        assert_eq!(
            result,
            Some(InputEvent::Pointer(PointerInput::Down {
                task_id: "t1".into(),
                at: Point::new(10.0, 5.0),
            }))
        );
    }

    #[test]
    fn test_press_on_empty_space_is_dropped() {
        let result = event_to_input(mouse(MouseEventKind::Down(MouseButton::Left), 40, 5), card_at);
        assert_eq!(result, None);
    }

    #[test]
    fn test_drag_and_release_map_to_move_and_up() {
        assert_eq!(
            event_to_input(mouse(MouseEventKind::Drag(MouseButton::Left), 30, 6), card_at),
            Some(InputEvent::Pointer(PointerInput::Move {
                at: Point::new(30.0, 6.0)
            }))
        );
        assert_eq!(
            event_to_input(mouse(MouseEventKind::Up(MouseButton::Left), 31, 6), card_at),
            Some(InputEvent::Pointer(PointerInput::Up {
                at: Point::new(31.0, 6.0)
            }))
        );
    }

    #[test]
    fn test_other_buttons_and_scroll_are_ignored() {
        assert_eq!(
            event_to_input(mouse(MouseEventKind::Down(MouseButton::Right), 1, 1), card_at),
            None
        );
        assert_eq!(
            event_to_input(mouse(MouseEventKind::ScrollDown, 1, 1), card_at),
            None
        );
    }

    #[test]
    fn test_escape_and_focus_loss_cancel() {
        let esc = Event::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::empty()));
        assert_eq!(
            event_to_input(esc, card_at),
            Some(InputEvent::Pointer(PointerInput::Cancel))
        );
        assert_eq!(
            event_to_input(Event::FocusLost, card_at),
            Some(InputEvent::Pointer(PointerInput::Leave))
        );
        let other = Event::Key(KeyEvent::new(KeyCode::Char('a'), KeyModifiers::empty()));
        assert_eq!(event_to_input(other, card_at), None);
    }

    #[test]
    fn test_resize_is_forwarded() {
        assert_eq!(
            event_to_input(Event::Resize(80, 24), card_at),
            Some(InputEvent::Resize(80, 24))
        );
    }

    #[test]
    fn test_recorded_events_replay_through_translation() {
        let down: RecordedEvent =
            serde_json::from_str(r#"{"mouse_down": {"column": 4, "row": 2, "task": "t1"}}"#)
                .expect("parse");
        assert_eq!(
            down.to_input(),
            Some(InputEvent::Pointer(PointerInput::Down {
                task_id: "t1".into(),
                at: Point::new(4.0, 2.0),
            }))
        );

        let empty = RecordedEvent::MouseDown {
            column: 4,
            row: 2,
            task: None,
        };
        assert_eq!(empty.to_input(), None);

        let esc: RecordedEvent = serde_json::from_str(r#""escape""#).expect("parse");
        assert_eq!(esc.to_input(), Some(InputEvent::Pointer(PointerInput::Cancel)));
        assert_eq!(
            RecordedEvent::Resize {
                width: 120,
                height: 40
            }
            .to_input(),
            Some(InputEvent::Resize(120, 40))
        );
    }
}
