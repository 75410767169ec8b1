//! Composition root: pointer normalization on the caller's thread, the stroke
//! worker behind its queue, and the display link the render side reads from.

pub mod config;
pub mod trace;


use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use driver::{NormalizeError, NormalizerStats, PointerNormalizer, RawPointerBatch};
use engine::{
    ConfigureAction, DrawingEngine, RenderReceiver, StrokeCommand, StrokeCommandSender,
    StrokeWorkerHandle, SubmitError, WorkerSpawnError, WorkerStatsSnapshot, render_link,
};
use images::{ChannelOrder, PixelFormatError};
use view::{FitCenterTransform, SurfaceSize, ViewTransformError, ViewportMapper};

use crate::config::CanvasConfig;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error(transparent)]
    Surface(#[from] ViewTransformError),
    #[error(transparent)]
    Spawn(#[from] WorkerSpawnError),
    #[error("failed to read brush preset {}: {source}", path.display())]
    Preset {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Input-side handle of an attached canvas.
///
/// Dropping it stops the worker and discards queued commands, same as
/// [`detach`](Self::detach).
pub struct StrokeCanvas {
    mapper: Arc<ViewportMapper>,
    normalizer: PointerNormalizer,
    sender: StrokeCommandSender,
    worker: StrokeWorkerHandle,
}

impl StrokeCanvas {
    /// Spawns the worker, which builds its engine through `engine_factory`.
    pub fn attach<E, F>(
        config: &CanvasConfig,
        engine_factory: F,
    ) -> Result<(Self, DisplayLink), CanvasError>
    where
        E: DrawingEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let surface = SurfaceSize::new(config.surface.width, config.surface.height)?;
        let initial_preset = config
            .brush
            .preset
            .as_deref()
            .map(read_preset)
            .transpose()?;
        let mapper = Arc::new(ViewportMapper::new(surface));
        let (publisher, receiver) = render_link(surface.width(), surface.height());
        let worker = StrokeWorkerHandle::spawn(
            config.worker_config(initial_preset),
            publisher,
            engine_factory,
        )?;
        log::info!(
            "stroke canvas attached ({}x{}, thread '{}')",
            surface.width(),
            surface.height(),
            config.worker.thread_name
        );

        let display = DisplayLink {
            receiver,
            mapper: Arc::clone(&mapper),
            channel_order: config.display.channel_order,
        };
        let canvas = Self {
            mapper,
            normalizer: PointerNormalizer::new(config.normalizer_config()),
            sender: worker.sender(),
            worker,
        };
        Ok((canvas, display))
    }

    /// Normalizes one hardware batch against the current transform and
    /// enqueues the resulting commands. Returns how many were enqueued.
    pub fn on_pointer_batch(&mut self, batch: &RawPointerBatch) -> Result<usize, NormalizeError> {
        let transform = self.mapper.snapshot();
        self.normalizer.process_batch(batch, transform.as_ref(), &mut self.sender)
    }

    pub fn on_viewport_resized(&self, width: f32, height: f32) -> Arc<FitCenterTransform> {
        let transform = self.mapper.recompute(width, height);
        log::debug!(
            "viewport {width}x{height}: scale {} offset ({}, {})",
            transform.scale(),
            transform.offset_x(),
            transform.offset_y()
        );
        transform
    }

    pub fn transform(&self) -> Arc<FitCenterTransform> {
        self.mapper.snapshot()
    }

    pub fn submit(&self, action: ConfigureAction) -> Result<(), SubmitError> {
        self.sender.submit(StrokeCommand::Configure(action))
    }

    pub fn submit_clear(&self) -> Result<(), SubmitError> {
        self.sender.submit_clear()
    }

    pub fn submit_brush_size(&self, size_px: f32) -> Result<(), SubmitError> {
        self.sender.submit_brush_size(size_px)
    }

    pub fn submit_color(&self, r: f32, g: f32, b: f32) -> Result<(), SubmitError> {
        self.sender.submit_color(r, g, b)
    }

    pub fn submit_brush_preset(&self, definition: impl Into<String>) -> Result<(), SubmitError> {
        self.sender.submit_brush_preset(definition)
    }

    /// Producer handle for configuration from other threads.
    pub fn sender(&self) -> StrokeCommandSender {
        self.sender.clone()
    }

    pub fn normalizer_stats(&self) -> NormalizerStats {
        self.normalizer.stats()
    }

    pub fn worker_stats(&self) -> WorkerStatsSnapshot {
        self.worker.stats()
    }

    /// False once the worker has exited; pointer input then fails with
    /// [`NormalizeError::SinkClosed`].
    pub fn is_worker_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stops the worker without applying queued commands.
    pub fn detach(self) {
        self.worker.detach();
    }

    /// Applies everything already queued, then stops the worker.
    pub fn finish(self) -> WorkerStatsSnapshot {
        self.worker.finish()
    }
}

fn read_preset(path: &Path) -> Result<String, CanvasError> {
    fs::read_to_string(path).map_err(|source| CanvasError::Preset {
        path: path.to_path_buf(),
        source,
    })
}

/// Premultiplied frame ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Quad scale keeping the surface aspect inside the current viewport.
    pub ndc_scale: (f32, f32),
}

/// Render-side end of an attached canvas. Never touches the engine.
pub struct DisplayLink {
    receiver: RenderReceiver,
    mapper: Arc<ViewportMapper>,
    channel_order: ChannelOrder,
}

impl DisplayLink {
    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// Waits for the worker to request a render, then converts the newest
    /// pixels. `Ok(None)` on timeout or when no pixels were published yet.
    pub fn wait_for_frame(
        &self,
        timeout: Duration,
    ) -> Result<Option<DisplayFrame>, PixelFormatError> {
        if !self.receiver.wait_for_request(timeout) {
            return Ok(None);
        }
        self.latest_frame()
    }

    pub fn latest_frame(&self) -> Result<Option<DisplayFrame>, PixelFormatError> {
        let Some(snapshot) = self.receiver.latest() else {
            return Ok(None);
        };
        let pixels = images::premultiply(&snapshot.rgba, self.channel_order)?;
        Ok(Some(DisplayFrame {
            sequence: snapshot.sequence,
            width: snapshot.width,
            height: snapshot.height,
            pixels,
            ndc_scale: self.mapper.snapshot().ndc_scale(),
        }))
    }

    /// Newest pixels as straight-alpha `0xAARRGGBB` words.
    pub fn latest_argb(&self) -> Result<Option<Vec<u32>>, PixelFormatError> {
        self.receiver
            .latest()
            .map(|snapshot| images::rgba_to_argb(&snapshot.rgba))
            .transpose()
    }
}
