use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

/// Straight-alpha RGBA frame read back from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSnapshot {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Default)]
struct RenderShared {
    latest: ArcSwapOption<PixelSnapshot>,
    published: AtomicU64,
}

/// Worker-side end. Render requests coalesce: while one is pending, further
/// requests only replace the published pixels.
#[derive(Debug)]
pub struct RenderPublisher {
    shared: Arc<RenderShared>,
    notify: Sender<()>,
    width: u32,
    height: u32,
}

/// Render-side end.
#[derive(Debug)]
pub struct RenderReceiver {
    shared: Arc<RenderShared>,
    notify: Receiver<()>,
}

pub fn render_link(width: u32, height: u32) -> (RenderPublisher, RenderReceiver) {
    let shared = Arc::new(RenderShared::default());
    let (notify_sender, notify_receiver) = bounded(1);
    (
        RenderPublisher {
            shared: Arc::clone(&shared),
            notify: notify_sender,
            width,
            height,
        },
        RenderReceiver {
            shared,
            notify: notify_receiver,
        },
    )
}

impl RenderPublisher {
    /// Publishes `rgba` when present, then wakes the render side.
    pub fn request_render(&self, rgba: Option<Vec<u8>>) {
        if let Some(rgba) = rgba {
            let expected = self.width as usize * self.height as usize * 4;
            if rgba.len() == expected {
                let sequence = self.shared.published.fetch_add(1, Ordering::AcqRel) + 1;
                self.shared.latest.store(Some(Arc::new(PixelSnapshot {
                    sequence,
                    width: self.width,
                    height: self.height,
                    rgba,
                })));
            } else {
                log::warn!(
                    "engine pixel buffer has {} bytes, expected {expected}",
                    rgba.len()
                );
            }
        }
        match self.notify.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::trace!("render receiver dropped, request ignored");
            }
        }
    }
}

impl RenderReceiver {
    /// Consumes a pending request without waiting.
    pub fn take_request(&self) -> bool {
        self.notify.try_recv().is_ok()
    }

    /// Waits up to `timeout` for a request. `false` on timeout or when the
    /// worker is gone.
    pub fn wait_for_request(&self, timeout: Duration) -> bool {
        match self.notify.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn latest(&self) -> Option<Arc<PixelSnapshot>> {
        self.shared.latest.load_full()
    }

    /// Number of snapshots published so far.
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Acquire)
    }
}
