use common::pointer::{InputKind, Phase};
use common::{BoundingRect, PointerInput};

use crate::engine::EngineHandle;

/// One press-to-release gesture on a canvas.
///
/// Created on press; follows only events of the input kind that started it.
/// Dropping the session releases the gesture, so a gesture can never outlive
/// the connection or router that owns it.
pub struct GestureSession {
    engine: EngineHandle,
    id: u64,
    kind: InputKind,
    rect: BoundingRect,
}

impl GestureSession {
    /// Press at the event's position. Returns `None` for an event with no
    /// position, such as a touch start with an empty touch list.
    pub fn begin(engine: &EngineHandle, input: &PointerInput) -> Option<Self> {
        let rect = input.rect.unwrap_or_default();
        let point = input.event.local_point(&rect)?;
        let id = engine.press(point);
        Some(Self {
            engine: engine.clone(),
            id,
            kind: input.event.kind(),
            rect,
        })
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn accepts(&self, input: &PointerInput) -> bool {
        input.event.kind() == self.kind
    }

    /// Extend the stroke to the event's position. Falls back to the rectangle
    /// measured at press when the event carries none.
    pub fn extend(&self, input: &PointerInput) -> bool {
        if !self.accepts(input) {
            return false;
        }
        let rect = input.rect.unwrap_or(self.rect);
        match input.event.local_point(&rect) {
            Some(point) => {
                self.engine.move_to(self.id, point);
                true
            }
            None => false,
        }
    }
}

impl Drop for GestureSession {
    fn drop(&mut self) {
        self.engine.release(self.id);
    }
}

/// What a routed event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Started,
    Drawn,
    Ended,
    Ignored,
}

/// Turns a connection's pointer stream into gestures. Holds at most one
/// session at a time.
pub struct PointerRouter {
    engine: EngineHandle,
    session: Option<GestureSession>,
}

impl PointerRouter {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn route(&mut self, input: &PointerInput) -> Routed {
        match input.event.phase() {
            Phase::Start => {
                // Release any unfinished gesture before pressing again.
                self.session = None;
                self.session = GestureSession::begin(&self.engine, input);
                if self.session.is_some() {
                    Routed::Started
                } else {
                    Routed::Ignored
                }
            }
            Phase::Move => match &self.session {
                Some(session) if session.extend(input) => Routed::Drawn,
                _ => Routed::Ignored,
            },
            Phase::End => {
                if self.session.as_ref().is_some_and(|s| s.accepts(input)) {
                    self.session = None;
                    Routed::Ended
                } else {
                    Routed::Ignored
                }
            }
        }
    }
}
