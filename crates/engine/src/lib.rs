//! Stroke worker: the single thread that owns the drawing engine.
//!
//! Input threads enqueue [`StrokeCommand`]s through a [`StrokeCommandSender`];
//! the worker applies them to a [`DrawingEngine`] in enqueue order, coalescing
//! bursts of moves into one flush, and signals the render side through a
//! [`RenderPublisher`]. The engine is built inside the worker thread and is
//! never reachable from anywhere else.

pub mod processor;
pub mod queue;
pub mod recording;
pub mod render_link;
pub mod worker;

pub use processor::{CanvasBootstrap, Redraw, StrokeProcessor, StrokeState};
pub use protocol::{ConfigureAction, PointerSample, StrokeCommand};
pub use queue::{StrokeCommandReceiver, StrokeCommandSender, SubmitError, stroke_command_queue};
pub use render_link::{PixelSnapshot, RenderPublisher, RenderReceiver, render_link};
pub use worker::{
    StrokeWorkerHandle, WorkerConfig, WorkerSpawnError, WorkerStats, WorkerStatsSnapshot,
};

use serde::Serialize;

/// One point handed to the engine, in surface coordinates.
///
/// Tilt the hardware could not report arrives here as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub delta_seconds: f32,
    pub tilt_x: f32,
    pub tilt_y: f32,
}

impl StrokePoint {
    pub fn from_sample(sample: &PointerSample) -> Self {
        Self {
            x: sample.surface_x,
            y: sample.surface_y,
            pressure: sample.pressure,
            delta_seconds: sample.delta_seconds,
            tilt_x: sample.tilt_x_radians.unwrap_or(0.0),
            tilt_y: sample.tilt_y_radians.unwrap_or(0.0),
        }
    }
}

/// External, stateful drawing engine.
///
/// Implementations need not be `Send`: the worker constructs the engine on its
/// own thread through a factory closure.
pub trait DrawingEngine {
    fn start_canvas(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    /// Channels in `0.0..=1.0`.
    fn set_color(&mut self, r: f32, g: f32, b: f32);

    fn set_brush_size(&mut self, size_px: f32);

    fn begin_stroke(&mut self);

    fn add_point(&mut self, point: StrokePoint);

    fn end_stroke(&mut self);

    /// Make in-progress strokes visible to pixel readers.
    fn flush(&mut self);

    /// Returns `false` when the definition is rejected.
    fn load_brush_preset(&mut self, definition: &str) -> bool;

    /// Straight-alpha RGBA, row major, 4 bytes per pixel.
    fn read_pixel_buffer(&self) -> Option<Vec<u8>>;
}
