use serde::{Deserialize, Serialize};

pub type PointerId = u64;
pub type TimestampNanos = u64;

/// Delta time carried by the first sample of every stroke.
pub const NOMINAL_FIRST_DELTA_SECONDS: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Finger,
    Stylus,
    Eraser,
    Mouse,
    Unknown,
}

/// One normalized pointer sample in drawing-surface coordinates.
///
/// Axes the hardware could not report are `None`; they are never folded into `0.0`
/// before the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub pointer_id: PointerId,
    pub tool: ToolKind,
    pub surface_x: f32,
    pub surface_y: f32,
    pub pressure: f32,
    pub tilt_x_radians: Option<f32>,
    pub tilt_y_radians: Option<f32>,
    pub orientation_radians: Option<f32>,
    pub azimuth_radians: Option<f32>,
    pub timestamp_nanos: TimestampNanos,
    pub delta_seconds: f32,
}

impl PointerSample {
    pub fn position(&self) -> (f32, f32) {
        (self.surface_x, self.surface_y)
    }

    pub fn with_position(mut self, surface_x: f32, surface_y: f32) -> Self {
        self.surface_x = surface_x;
        self.surface_y = surface_y;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConfigureAction {
    Clear,
    SetBrushSize { size_px: f32 },
    SetColor { r: f32, g: f32, b: f32 },
    LoadBrushPreset { definition: String },
}

impl ConfigureAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::SetBrushSize { .. } => "set_brush_size",
            Self::SetColor { .. } => "set_color",
            Self::LoadBrushPreset { .. } => "load_brush_preset",
        }
    }
}

/// Unit of work handed from the input side to the stroke worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrokeCommand {
    Begin(PointerSample),
    Move(PointerSample),
    End(PointerSample),
    Configure(ConfigureAction),
}

impl StrokeCommand {
    pub fn sample(&self) -> Option<&PointerSample> {
        match self {
            Self::Begin(sample) | Self::Move(sample) | Self::End(sample) => Some(sample),
            Self::Configure(_) => None,
        }
    }

    pub fn is_move(&self) -> bool {
        matches!(self, Self::Move(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Begin(_) => "begin",
            Self::Move(_) => "move",
            Self::End(_) => "end",
            Self::Configure(action) => action.label(),
        }
    }
}

/// The consumer behind a [`StrokeCommandSink`] is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stroke command sink is closed")]
pub struct SinkClosed;

/// Destination for commands produced by the input side.
///
/// Implemented by the worker queue sender and by `Vec<StrokeCommand>` for
/// synchronous collection.
pub trait StrokeCommandSink {
    fn push_command(&mut self, command: StrokeCommand) -> Result<(), SinkClosed>;
}

impl StrokeCommandSink for Vec<StrokeCommand> {
    fn push_command(&mut self, command: StrokeCommand) -> Result<(), SinkClosed> {
        self.push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(x: f32, y: f32) -> PointerSample {
        PointerSample {
            pointer_id: 3,
            tool: ToolKind::Stylus,
            surface_x: x,
            surface_y: y,
            pressure: 0.4,
            tilt_x_radians: None,
            tilt_y_radians: Some(0.2),
            orientation_radians: None,
            azimuth_radians: None,
            timestamp_nanos: 10,
            delta_seconds: NOMINAL_FIRST_DELTA_SECONDS,
        }
    }

    #[test]
    fn configure_commands_carry_no_sample() {
        let command = StrokeCommand::Configure(ConfigureAction::Clear);
        assert!(command.sample().is_none());
        assert_eq!(command.label(), "clear");
        assert!(!command.is_move());
    }

    #[test]
    fn with_position_keeps_other_axes() {
        let moved = sample_at(1.0, 2.0).with_position(5.0, 6.0);
        assert_eq!(moved.position(), (5.0, 6.0));
        assert_eq!(moved.tilt_y_radians, Some(0.2));
        assert_eq!(moved.pressure, 0.4);
    }

    #[test]
    fn unavailable_tilt_serializes_as_null() {
        let json = serde_json::to_string(&StrokeCommand::Move(sample_at(1.0, 1.0)))
            .expect("serialize command");
        assert!(json.contains("\"kind\":\"move\""));
        assert!(json.contains("\"tilt_x_radians\":null"));
    }
}
