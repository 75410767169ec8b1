use protocol::{NOMINAL_FIRST_DELTA_SECONDS, PointerSample, StrokeCommand, StrokeCommandSink};
use serde::{Deserialize, Serialize};

use crate::{
    NormalizeError, PointerEventPhase, PointerId, PositionMapper, RawPointerBatch,
    RawPointerSample,
};

/// Delta time used when the hardware reports a non-increasing timestamp.
pub const MIN_DELTA_SECONDS: f32 = 1.0e-6;

/// Pressure assumed when the device does not report one.
pub const DEFAULT_PRESSURE: f32 = 1.0;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Which axes a lift event keeps when its own position falls outside the
/// surface and the last mapped position is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftFallback {
    /// Position from the last mapped sample, pressure and tilt from the lift.
    #[default]
    KeepLiftAxes,
    /// Position, pressure and tilt all from the last mapped sample.
    ReuseLastSample,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub lift_fallback: LiftFallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerStats {
    pub emitted_samples: u64,
    pub dropped_out_of_bounds: u64,
    pub lift_fallbacks: u64,
    pub suppressed_ends: u64,
}

#[derive(Debug, Clone, Copy)]
struct OpenStroke {
    pointer_id: PointerId,
    began: bool,
    last_timestamp_nanos: Option<u64>,
    last_mapped: Option<PointerSample>,
}

impl OpenStroke {
    fn new(pointer_id: PointerId) -> Self {
        Self {
            pointer_id,
            began: false,
            last_timestamp_nanos: None,
            last_mapped: None,
        }
    }

    fn delta_seconds(&self, timestamp_nanos: u64) -> f32 {
        match self.last_timestamp_nanos {
            None => NOMINAL_FIRST_DELTA_SECONDS,
            Some(previous) if timestamp_nanos > previous => {
                ((timestamp_nanos - previous) as f64 / NANOS_PER_SECOND) as f32
            }
            Some(_) => MIN_DELTA_SECONDS,
        }
    }

    fn record(&mut self, sample: PointerSample) {
        self.last_timestamp_nanos = Some(sample.timestamp_nanos);
        self.last_mapped = Some(sample);
    }
}

/// Turns raw hardware batches into ordered `Begin`/`Move`/`End` commands in
/// surface coordinates. Single pointer only; lives on the input thread.
#[derive(Debug, Default)]
pub struct PointerNormalizer {
    config: NormalizerConfig,
    stroke: Option<OpenStroke>,
    stats: NormalizerStats,
}

impl PointerNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            config,
            stroke: None,
            stats: NormalizerStats::default(),
        }
    }

    pub fn config(&self) -> NormalizerConfig {
        self.config
    }

    pub fn stats(&self) -> NormalizerStats {
        self.stats
    }

    pub fn has_open_stroke(&self) -> bool {
        self.stroke.is_some()
    }

    /// Drop any open stroke without emitting an `End`.
    pub fn reset(&mut self) {
        self.stroke = None;
    }

    /// Normalize one batch, pushing the resulting commands into `sink`.
    /// Returns the number of commands emitted.
    pub fn process_batch<M, S>(
        &mut self,
        batch: &RawPointerBatch,
        mapper: &M,
        sink: &mut S,
    ) -> Result<usize, NormalizeError>
    where
        M: PositionMapper + ?Sized,
        S: StrokeCommandSink + ?Sized,
    {
        match batch.phase {
            PointerEventPhase::Hover => Ok(0),
            PointerEventPhase::Down => self.handle_down(batch, mapper, sink),
            PointerEventPhase::Move => self.handle_move(batch, mapper, sink),
            PointerEventPhase::Up | PointerEventPhase::Cancel => {
                self.handle_lift(batch, mapper, sink)
            }
        }
    }

    fn handle_down<M, S>(
        &mut self,
        batch: &RawPointerBatch,
        mapper: &M,
        sink: &mut S,
    ) -> Result<usize, NormalizeError>
    where
        M: PositionMapper + ?Sized,
        S: StrokeCommandSink + ?Sized,
    {
        if let Some(previous) = self.stroke {
            log::debug!(
                "pointer {} down replaces open stroke of pointer {}",
                batch.pointer_id,
                previous.pointer_id
            );
        }
        let mut stroke = OpenStroke::new(batch.pointer_id);
        self.stroke = None;
        let emitted = self.interior_sample(&mut stroke, batch, &batch.primary, mapper, sink)?;
        self.stroke = Some(stroke);
        Ok(emitted)
    }

    fn handle_move<M, S>(
        &mut self,
        batch: &RawPointerBatch,
        mapper: &M,
        sink: &mut S,
    ) -> Result<usize, NormalizeError>
    where
        M: PositionMapper + ?Sized,
        S: StrokeCommandSink + ?Sized,
    {
        let mut stroke = self.owned_stroke(batch.pointer_id)?;
        let mut emitted = 0;
        for raw in batch.samples() {
            emitted += self.interior_sample(&mut stroke, batch, raw, mapper, sink)?;
        }
        self.stroke = Some(stroke);
        Ok(emitted)
    }

    fn handle_lift<M, S>(
        &mut self,
        batch: &RawPointerBatch,
        mapper: &M,
        sink: &mut S,
    ) -> Result<usize, NormalizeError>
    where
        M: PositionMapper + ?Sized,
        S: StrokeCommandSink + ?Sized,
    {
        let mut stroke = self.owned_stroke(batch.pointer_id)?;
        self.stroke = None;

        let mut emitted = 0;
        for raw in &batch.history {
            emitted += self.interior_sample(&mut stroke, batch, raw, mapper, sink)?;
        }

        let lift = &batch.primary;
        let delta_seconds = stroke.delta_seconds(lift.timestamp_nanos);
        let end_sample = match mapper.map_to_surface(lift.display_x, lift.display_y) {
            Some((surface_x, surface_y)) => {
                Some(build_sample(batch, lift, surface_x, surface_y, delta_seconds))
            }
            None => {
                self.stats.dropped_out_of_bounds += 1;
                self.lift_fallback(batch, lift, stroke.last_mapped, delta_seconds)
            }
        };

        match end_sample {
            Some(sample) => {
                sink.push_command(StrokeCommand::End(sample))?;
                self.stats.emitted_samples += 1;
                emitted += 1;
            }
            None => {
                self.stats.suppressed_ends += 1;
                log::debug!(
                    "pointer {} lifted with no mapped geometry, end suppressed",
                    batch.pointer_id
                );
            }
        }
        Ok(emitted)
    }

    fn lift_fallback(
        &mut self,
        batch: &RawPointerBatch,
        lift: &RawPointerSample,
        last_mapped: Option<PointerSample>,
        delta_seconds: f32,
    ) -> Option<PointerSample> {
        let last = last_mapped?;
        self.stats.lift_fallbacks += 1;
        let sample = match self.config.lift_fallback {
            LiftFallback::KeepLiftAxes => {
                build_sample(batch, lift, last.surface_x, last.surface_y, delta_seconds)
            }
            LiftFallback::ReuseLastSample => PointerSample {
                timestamp_nanos: lift.timestamp_nanos,
                delta_seconds,
                ..last
            },
        };
        Some(sample)
    }

    fn owned_stroke(&self, pointer_id: PointerId) -> Result<OpenStroke, NormalizeError> {
        let stroke = self
            .stroke
            .ok_or(NormalizeError::NoActiveStroke { pointer_id })?;
        if stroke.pointer_id != pointer_id {
            log::warn!(
                "pointer {pointer_id} input ignored, pointer {} owns the stroke",
                stroke.pointer_id
            );
            return Err(NormalizeError::PointerIdMismatch {
                active: stroke.pointer_id,
                received: pointer_id,
            });
        }
        Ok(stroke)
    }

    /// Map and emit a non-terminal sample. The first accepted sample of a
    /// stroke becomes its `Begin`.
    fn interior_sample<M, S>(
        &mut self,
        stroke: &mut OpenStroke,
        batch: &RawPointerBatch,
        raw: &RawPointerSample,
        mapper: &M,
        sink: &mut S,
    ) -> Result<usize, NormalizeError>
    where
        M: PositionMapper + ?Sized,
        S: StrokeCommandSink + ?Sized,
    {
        let Some((surface_x, surface_y)) = mapper.map_to_surface(raw.display_x, raw.display_y)
        else {
            self.stats.dropped_out_of_bounds += 1;
            return Ok(0);
        };
        let sample = build_sample(
            batch,
            raw,
            surface_x,
            surface_y,
            stroke.delta_seconds(raw.timestamp_nanos),
        );
        stroke.record(sample);
        let command = if stroke.began {
            StrokeCommand::Move(sample)
        } else {
            stroke.began = true;
            StrokeCommand::Begin(sample)
        };
        sink.push_command(command)?;
        self.stats.emitted_samples += 1;
        Ok(1)
    }
}

fn build_sample(
    batch: &RawPointerBatch,
    raw: &RawPointerSample,
    surface_x: f32,
    surface_y: f32,
    delta_seconds: f32,
) -> PointerSample {
    PointerSample {
        pointer_id: batch.pointer_id,
        tool: batch.tool,
        surface_x,
        surface_y,
        pressure: normalize_pressure(raw.pressure),
        tilt_x_radians: finite(raw.tilt_x_radians),
        tilt_y_radians: finite(raw.tilt_y_radians),
        orientation_radians: finite(raw.orientation_radians),
        azimuth_radians: finite(raw.azimuth_radians),
        timestamp_nanos: raw.timestamp_nanos,
        delta_seconds,
    }
}

fn normalize_pressure(pressure: Option<f32>) -> f32 {
    pressure
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_PRESSURE)
        .clamp(0.0, 1.0)
}

// Platforms report missing axes as NaN.
fn finite(axis: Option<f32>) -> Option<f32> {
    axis.filter(|value| value.is_finite())
}
