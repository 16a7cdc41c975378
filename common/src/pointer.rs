use serde::{Deserialize, Serialize};

/// A position in canvas-local pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The canvas element's bounding rectangle in client coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub left: f64,
    pub top: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl BoundingRect {
    /// Translate a client coordinate into canvas-local space.
    pub fn to_local(&self, client_x: f64, client_y: f64) -> Point {
        Point::new(client_x - self.left, client_y - self.top)
    }
}

/// Client coordinates carried by a mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MousePosition {
    pub client_x: f64,
    pub client_y: f64,
}

/// One entry of a touch event's touch list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Touch {
    pub client_x: f64,
    pub client_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchList {
    #[serde(default)]
    pub touches: Vec<Touch>,
}

/// A raw input event, tagged by its DOM event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PointerEvent {
    MouseDown(MousePosition),
    MouseMove(MousePosition),
    MouseUp(MousePosition),
    TouchStart(TouchList),
    TouchMove(TouchList),
    TouchEnd(TouchList),
}

/// Which family of listeners an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Mouse,
    Touch,
}

impl InputKind {
    /// Classify a DOM event type string by its prefix.
    pub fn from_event_type(event_type: &str) -> Self {
        if event_type.starts_with("touch") {
            InputKind::Touch
        } else {
            InputKind::Mouse
        }
    }
}

/// Position of an event within a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Move,
    End,
}

impl PointerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PointerEvent::MouseDown(_) => "mousedown",
            PointerEvent::MouseMove(_) => "mousemove",
            PointerEvent::MouseUp(_) => "mouseup",
            PointerEvent::TouchStart(_) => "touchstart",
            PointerEvent::TouchMove(_) => "touchmove",
            PointerEvent::TouchEnd(_) => "touchend",
        }
    }

    pub fn kind(&self) -> InputKind {
        InputKind::from_event_type(self.event_type())
    }

    pub fn phase(&self) -> Phase {
        match self {
            PointerEvent::MouseDown(_) | PointerEvent::TouchStart(_) => Phase::Start,
            PointerEvent::MouseMove(_) | PointerEvent::TouchMove(_) => Phase::Move,
            PointerEvent::MouseUp(_) | PointerEvent::TouchEnd(_) => Phase::End,
        }
    }

    /// Client coordinates of the tracked pointer. Only the primary touch is
    /// followed; a touch event with an empty list has no position.
    pub fn client_position(&self) -> Option<(f64, f64)> {
        match self {
            PointerEvent::MouseDown(m) | PointerEvent::MouseMove(m) | PointerEvent::MouseUp(m) => {
                Some((m.client_x, m.client_y))
            }
            PointerEvent::TouchStart(t) | PointerEvent::TouchMove(t) | PointerEvent::TouchEnd(t) => {
                t.touches.first().map(|touch| (touch.client_x, touch.client_y))
            }
        }
    }

    /// Resolve this event into canvas-local space.
    pub fn local_point(&self, rect: &BoundingRect) -> Option<Point> {
        self.client_position().map(|(x, y)| rect.to_local(x, y))
    }
}

/// A pointer event as sent over the wire, with the canvas rectangle the
/// client measured when the event fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    #[serde(flatten)]
    pub event: PointerEvent,
    #[serde(default)]
    pub rect: Option<BoundingRect>,
}
