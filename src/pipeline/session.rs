use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Identifies one render request within a [`RenderSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct CommittedCanvas {
    pub generation: Generation,
    pub image: RgbaImage,
}

/// Last-request-wins holder for the displayed canvas.
///
/// Every new request takes a generation from [`RenderSession::begin`]. A
/// result is only stored when its generation is still the newest one issued,
/// so a slow earlier request can never replace the output of a later one.
#[derive(Debug, Default)]
pub struct RenderSession {
    latest: AtomicU64,
    canvas: Mutex<Option<CommittedCanvas>>,
}

impl RenderSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Generation {
        Generation(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_latest(&self, generation: Generation) -> bool {
        self.latest.load(Ordering::SeqCst) == generation.0
    }

    /// Stores `image` if `generation` is still current. Returns whether it was kept.
    pub fn commit(&self, generation: Generation, image: RgbaImage) -> bool {
        let mut canvas = self.lock();
        if !self.is_latest(generation) {
            debug!(
                "session: dropping stale render (generation {}, latest {})",
                generation.0,
                self.latest.load(Ordering::SeqCst)
            );
            return false;
        }
        *canvas = Some(CommittedCanvas { generation, image });
        true
    }

    pub fn current(&self) -> Option<CommittedCanvas> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CommittedCanvas>> {
        self.canvas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
