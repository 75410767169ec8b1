//! JSONL pointer traces: one event per line, replayed through a
//! [`StrokeCanvas`] in file order.

use std::io::{BufRead, Write};

use driver::{PointerEventPhase, PointerId, RawPointerBatch, RawPointerSample, ToolKind};
use engine::ConfigureAction;
use serde::{Deserialize, Serialize};

use crate::StrokeCanvas;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid trace event at line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    pub x: f32,
    pub y: f32,
    pub t_ns: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tilt_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tilt_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f32>,
}

impl From<TraceSample> for RawPointerSample {
    fn from(sample: TraceSample) -> Self {
        Self {
            display_x: sample.x,
            display_y: sample.y,
            timestamp_nanos: sample.t_ns,
            pressure: sample.pressure,
            tilt_x_radians: sample.tilt_x,
            tilt_y_radians: sample.tilt_y,
            orientation_radians: sample.orientation,
            azimuth_radians: sample.azimuth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePointer {
    pub pointer_id: PointerId,
    pub tool: ToolKind,
    pub phase: PointerEventPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<TraceSample>,
    #[serde(flatten)]
    pub primary: TraceSample,
}

impl TracePointer {
    pub fn to_batch(&self) -> RawPointerBatch {
        RawPointerBatch::new(self.pointer_id, self.tool, self.phase, self.primary.into())
            .with_history(self.history.iter().copied().map(RawPointerSample::from))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Resize { width: f32, height: f32 },
    Pointer(TracePointer),
    Configure(ConfigureAction),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub resizes: usize,
    pub pointer_batches: usize,
    pub rejected_batches: usize,
    pub enqueued_commands: usize,
    pub configure_actions: usize,
}

pub fn read_trace(reader: &mut dyn BufRead) -> Result<Vec<TraceEvent>, TraceError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str::<TraceEvent>(&line).map_err(|source| TraceError::Parse {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

pub fn write_jsonl<T: Serialize>(
    writer: &mut dyn Write,
    values: &[T],
) -> Result<(), std::io::Error> {
    for value in values {
        serde_json::to_writer(&mut *writer, value).map_err(|error| {
            std::io::Error::other(format!("serialize JSONL line failed: {error}"))
        })?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Feeds `events` to `canvas` in order. Rejected batches are logged and
/// counted; they do not stop the replay.
pub fn play(
    canvas: &mut StrokeCanvas,
    events: impl IntoIterator<Item = TraceEvent>,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for event in events {
        match event {
            TraceEvent::Resize { width, height } => {
                canvas.on_viewport_resized(width, height);
                summary.resizes += 1;
            }
            TraceEvent::Pointer(pointer) => {
                summary.pointer_batches += 1;
                match canvas.on_pointer_batch(&pointer.to_batch()) {
                    Ok(count) => summary.enqueued_commands += count,
                    Err(error) => {
                        summary.rejected_batches += 1;
                        log::warn!("trace batch {} rejected: {error}", summary.pointer_batches);
                    }
                }
            }
            TraceEvent::Configure(action) => {
                let label = action.label();
                if let Err(error) = canvas.submit(action) {
                    log::warn!("trace {label} dropped: {error}");
                } else {
                    summary.configure_actions += 1;
                }
            }
        }
    }
    summary
}
