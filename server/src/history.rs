use image::{ImageFormat, RgbaImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;

/// An encoded, immutable copy of the whole raster at one instant.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot(Arc<[u8]>);

impl Snapshot {
    /// PNG-encode a raster.
    pub fn encode(surface: &RgbaImage) -> Result<Self, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        surface.write_to(&mut buf, ImageFormat::Png)?;
        Ok(Self(buf.into_inner().into()))
    }

    pub fn decode(&self) -> Result<RgbaImage, image::ImageError> {
        Ok(image::load_from_memory_with_format(&self.0, ImageFormat::Png)?.into_rgba8())
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Snapshot({} bytes)", self.0.len())
    }
}

/// Linear undo/redo history.
///
/// `undo` holds states to return to, newest at the back: pushed with
/// `push_back`, consumed with `pop_back`. `redo` holds states to restore,
/// next one at the front: filled with `push_front` by undo, consumed with
/// `pop_front` by redo.
///
/// Undo and redo are split into a peek and a commit so the caller can decode
/// and apply the snapshot in between; nothing changes if the apply fails.
#[derive(Debug, Default)]
pub struct History {
    undo: VecDeque<Snapshot>,
    redo: VecDeque<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pre-stroke state. Any pending redo states are discarded.
    pub fn record(&mut self, before: Snapshot) {
        self.undo.push_back(before);
        self.redo.clear();
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// The state an undo would restore.
    pub fn undo_target(&self) -> Option<&Snapshot> {
        self.undo.back()
    }

    /// Finish an undo once its target has been applied. `current` is the
    /// state that was on the raster before the undo.
    pub fn commit_undo(&mut self, current: Snapshot) {
        if self.undo.pop_back().is_some() {
            self.redo.push_front(current);
        }
    }

    /// The state a redo would restore.
    pub fn redo_target(&self) -> Option<&Snapshot> {
        self.redo.front()
    }

    /// Finish a redo once its target has been applied.
    pub fn commit_redo(&mut self) {
        if let Some(snapshot) = self.redo.pop_front() {
            self.undo.push_back(snapshot);
        }
    }
}
