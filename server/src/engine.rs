use common::{Color, Point};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::canvas::{Canvas, CanvasConfig, CanvasError, ExportFormat};
use crate::history::{History, Snapshot};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error("snapshot task failed: {0}")]
    Snapshot(#[from] tokio::task::JoinError),
    #[error("canvas engine has shut down")]
    Closed,
}

/// History depths and the active pen, reported after every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryState {
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub color: Color,
    pub width: f64,
    pub eraser: bool,
    pub drawing: bool,
}

/// Partial pen update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StyleUpdate {
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub eraser: Option<bool>,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

pub enum Command {
    Press { gesture: u64, point: Point },
    Move { gesture: u64, point: Point },
    Release { gesture: u64 },
    Undo { reply: Reply<HistoryState> },
    Redo { reply: Reply<HistoryState> },
    SetStyle { update: StyleUpdate, reply: Reply<HistoryState> },
    Export { format: ExportFormat, reply: Reply<Vec<u8>> },
    State { reply: Reply<HistoryState> },
}

/// Sole owner of one canvas. Commands are applied strictly in arrival order
/// and a command is not taken off the channel until the previous one,
/// including any snapshot encode or decode it waits on, has finished.
struct Engine {
    canvas: Canvas,
    history: History,
    /// Gesture currently allowed to draw.
    active: Option<u64>,
}

impl Engine {
    fn new(config: &CanvasConfig) -> Self {
        Self {
            canvas: Canvas::new(config),
            history: History::new(),
            active: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Press { gesture, point } => self.press(gesture, point).await,
                Command::Move { gesture, point } => {
                    if self.active == Some(gesture) {
                        self.canvas.drag_to(point);
                    }
                }
                Command::Release { gesture } => {
                    if self.active == Some(gesture) {
                        self.lift_pen();
                    }
                }
                Command::Undo { reply } => {
                    let _ = reply.send(self.undo().await);
                }
                Command::Redo { reply } => {
                    let _ = reply.send(self.redo().await);
                }
                Command::SetStyle { update, reply } => {
                    let _ = reply.send(self.set_style(update));
                }
                Command::Export { format, reply } => {
                    let _ = reply.send(self.canvas.export(format).map_err(Into::into));
                }
                Command::State { reply } => {
                    let _ = reply.send(Ok(self.state()));
                }
            }
        }
        tracing::debug!("Canvas engine stopped");
    }

    async fn press(&mut self, gesture: u64, point: Point) {
        self.lift_pen();
        let before = match self.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Failed to snapshot canvas, dropping gesture {}: {}", gesture, e);
                return;
            }
        };
        self.history.record(before);
        self.canvas.press(point);
        self.active = Some(gesture);
    }

    fn lift_pen(&mut self) {
        self.canvas.release();
        self.active = None;
    }

    async fn undo(&mut self) -> Result<HistoryState, EngineError> {
        self.lift_pen();
        let Some(target) = self.history.undo_target().cloned() else {
            return Ok(self.state());
        };
        let current = self.capture().await?;
        let image = decode(target).await?;
        self.canvas.restore(&image);
        self.history.commit_undo(current);
        Ok(self.state())
    }

    async fn redo(&mut self) -> Result<HistoryState, EngineError> {
        self.lift_pen();
        let Some(target) = self.history.redo_target().cloned() else {
            return Ok(self.state());
        };
        let image = decode(target).await?;
        self.canvas.restore(&image);
        self.history.commit_redo();
        Ok(self.state())
    }

    fn set_style(&mut self, update: StyleUpdate) -> Result<HistoryState, EngineError> {
        if let Some(width) = update.width {
            self.canvas.set_brush_width(width)?;
        }
        if let Some(color) = update.color {
            self.canvas.set_color(color);
        }
        if let Some(eraser) = update.eraser {
            self.canvas.set_eraser(eraser);
        }
        Ok(self.state())
    }

    /// Encode the raster on the blocking pool.
    async fn capture(&self) -> Result<Snapshot, EngineError> {
        let surface = self.canvas.surface().clone();
        let snapshot = tokio::task::spawn_blocking(move || Snapshot::encode(&surface)).await?;
        Ok(snapshot.map_err(CanvasError::from)?)
    }

    fn state(&self) -> HistoryState {
        let style = self.canvas.style();
        HistoryState {
            undo_depth: self.history.undo_depth(),
            redo_depth: self.history.redo_depth(),
            color: style.color,
            width: style.width,
            eraser: self.canvas.eraser(),
            drawing: self.canvas.is_drawing(),
        }
    }
}

async fn decode(snapshot: Snapshot) -> Result<image::RgbaImage, EngineError> {
    let image = tokio::task::spawn_blocking(move || snapshot.decode()).await?;
    Ok(image.map_err(CanvasError::from)?)
}

/// Cloneable handle to a running canvas engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
    next_gesture: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Start an engine task for a fresh canvas. The task exits once every
    /// handle has been dropped.
    pub fn spawn(config: &CanvasConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Engine::new(config).run(rx));
        Self {
            tx,
            next_gesture: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a gesture at `point`, superseding any gesture in progress.
    /// Returns the id later moves and the release must carry.
    pub fn press(&self, point: Point) -> u64 {
        let gesture = self.next_gesture.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.tx.send(Command::Press { gesture, point });
        gesture
    }

    pub fn move_to(&self, gesture: u64, point: Point) {
        let _ = self.tx.send(Command::Move { gesture, point });
    }

    pub fn release(&self, gesture: u64) {
        let _ = self.tx.send(Command::Release { gesture });
    }

    pub fn undo(&self) -> impl Future<Output = Result<HistoryState, EngineError>> {
        self.request(|reply| Command::Undo { reply })
    }

    pub fn redo(&self) -> impl Future<Output = Result<HistoryState, EngineError>> {
        self.request(|reply| Command::Redo { reply })
    }

    pub fn set_style(&self, update: StyleUpdate) -> impl Future<Output = Result<HistoryState, EngineError>> {
        self.request(|reply| Command::SetStyle { update, reply })
    }

    pub fn export(&self, format: ExportFormat) -> impl Future<Output = Result<Vec<u8>, EngineError>> {
        self.request(move |reply| Command::Export { format, reply })
    }

    pub fn state(&self) -> impl Future<Output = Result<HistoryState, EngineError>> {
        self.request(|reply| Command::State { reply })
    }

    /// Enqueue now, reply later: the command takes its place in the
    /// channel when this is called, not when the future is first polled.
    fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> impl Future<Output = Result<T, EngineError>> {
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(build(reply)).map_err(|_| EngineError::Closed);
        async move {
            sent?;
            rx.await.map_err(|_| EngineError::Closed)?
        }
    }
}
