use lru::LruCache;
use std::num::NonZeroUsize;

use crate::canvas::CanvasConfig;
use crate::engine::EngineHandle;

/// Live canvases by id. The least recently used canvas is evicted once the
/// cache is full; its engine stops when the last handle to it is dropped.
pub struct Canvases {
    engines: LruCache<u64, EngineHandle>,
    next_id: u64,
    config: CanvasConfig,
}

impl Canvases {
    pub fn new(capacity: usize, config: CanvasConfig) -> Self {
        Self {
            engines: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            next_id: 0,
            config,
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Start a new canvas and return its id.
    pub fn create(&mut self) -> (u64, EngineHandle) {
        self.next_id += 1;
        let id = self.next_id;
        let engine = EngineHandle::spawn(&self.config);
        if let Some((evicted, _)) = self.engines.push(id, engine.clone()) {
            tracing::info!("Evicted canvas {}", evicted);
        }
        (id, engine)
    }

    pub fn get(&mut self, id: u64) -> Option<EngineHandle> {
        self.engines.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_least_recently_used_canvas_is_evicted() {
        let mut canvases = Canvases::new(2, CanvasConfig::default());
        let (a, _) = canvases.create();
        let (b, _) = canvases.create();
        assert!(canvases.get(a).is_some());

        let (c, _) = canvases.create();
        assert_eq!(canvases.len(), 2);
        assert!(canvases.get(b).is_none());
        assert!(canvases.get(a).is_some());
        assert!(canvases.get(c).is_some());
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_one() {
        let mut canvases = Canvases::new(0, CanvasConfig::default());
        let (a, _) = canvases.create();
        assert!(canvases.get(a).is_some());
    }
}
