pub mod normalizer;

pub use normalizer::{LiftFallback, NormalizerConfig, NormalizerStats, PointerNormalizer};
pub use protocol::{
    NOMINAL_FIRST_DELTA_SECONDS, PointerId, PointerSample, SinkClosed, StrokeCommand,
    StrokeCommandSink, TimestampNanos, ToolKind,
};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use view::FitCenterTransform;

/// Historical sub-samples kept inline before spilling to the heap.
pub const INLINE_HISTORY_CAPACITY: usize = 8;

pub type SampleHistory = SmallVec<[RawPointerSample; INLINE_HISTORY_CAPACITY]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerEventPhase {
    Hover,
    Down,
    Move,
    Up,
    Cancel,
}

/// One hardware sample in display coordinates, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPointerSample {
    pub display_x: f32,
    pub display_y: f32,
    pub timestamp_nanos: TimestampNanos,
    pub pressure: Option<f32>,
    pub tilt_x_radians: Option<f32>,
    pub tilt_y_radians: Option<f32>,
    pub orientation_radians: Option<f32>,
    pub azimuth_radians: Option<f32>,
}

impl RawPointerSample {
    pub fn at(display_x: f32, display_y: f32, timestamp_nanos: TimestampNanos) -> Self {
        Self {
            display_x,
            display_y,
            timestamp_nanos,
            pressure: None,
            tilt_x_radians: None,
            tilt_y_radians: None,
            orientation_radians: None,
            azimuth_radians: None,
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn with_tilt(mut self, tilt_x_radians: f32, tilt_y_radians: f32) -> Self {
        self.tilt_x_radians = Some(tilt_x_radians);
        self.tilt_y_radians = Some(tilt_y_radians);
        self
    }
}

/// A primary sample plus the chronologically earlier sub-samples the hardware
/// coalesced into the same event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPointerBatch {
    pub pointer_id: PointerId,
    pub tool: ToolKind,
    pub phase: PointerEventPhase,
    pub history: SampleHistory,
    pub primary: RawPointerSample,
}

impl RawPointerBatch {
    pub fn new(
        pointer_id: PointerId,
        tool: ToolKind,
        phase: PointerEventPhase,
        primary: RawPointerSample,
    ) -> Self {
        Self {
            pointer_id,
            tool,
            phase,
            history: SampleHistory::new(),
            primary,
        }
    }

    pub fn with_history(mut self, history: impl IntoIterator<Item = RawPointerSample>) -> Self {
        self.history.extend(history);
        self
    }

    /// History in reported order, then the primary sample.
    pub fn samples(&self) -> impl Iterator<Item = &RawPointerSample> {
        self.history.iter().chain(std::iter::once(&self.primary))
    }
}

/// Display to surface mapping used while normalizing.
///
/// Returning `None` marks the point as outside the drawing surface.
pub trait PositionMapper {
    fn map_to_surface(&self, display_x: f32, display_y: f32) -> Option<(f32, f32)>;
}

impl PositionMapper for FitCenterTransform {
    fn map_to_surface(&self, display_x: f32, display_y: f32) -> Option<(f32, f32)> {
        self.to_surface(display_x, display_y)
    }
}

/// Adapter turning a closure into a [`PositionMapper`].
pub struct FnMapper<F>(pub F);

impl<F> PositionMapper for FnMapper<F>
where
    F: Fn(f32, f32) -> Option<(f32, f32)>,
{
    fn map_to_surface(&self, display_x: f32, display_y: f32) -> Option<(f32, f32)> {
        (self.0)(display_x, display_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("no stroke is open for pointer {pointer_id}")]
    NoActiveStroke { pointer_id: PointerId },
    #[error("pointer {received} sent input while pointer {active} owns the stroke")]
    PointerIdMismatch { active: PointerId, received: PointerId },
    #[error(transparent)]
    SinkClosed(#[from] SinkClosed),
}
