//! Deterministic [`DrawingEngine`] that records every call it receives.
//!
//! Used by the replay tool and by tests. It keeps a straight-alpha RGBA buffer
//! where each added point colours the single pixel under it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::{DrawingEngine, StrokePoint};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EngineCall {
    StartCanvas { width: u32, height: u32 },
    Clear,
    SetColor { r: f32, g: f32, b: f32 },
    SetBrushSize { size_px: f32 },
    BeginStroke,
    AddPoint(StrokePoint),
    EndStroke,
    Flush,
    LoadBrushPreset { definition: String, accepted: bool },
}

/// Shared view of the calls a [`RecordingEngine`] has received.
#[derive(Debug, Clone, Default)]
pub struct EngineCallLog {
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl EngineCallLog {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().clone()
    }

    pub fn add_point_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::AddPoint(_)))
    }

    pub fn flush_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Flush))
    }

    /// Definitions of every preset load, accepted or not, in call order.
    pub fn preset_loads(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::LoadBrushPreset { definition, .. } => Some(definition.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().iter().filter(|call| predicate(call)).count()
    }

    fn push(&self, call: EngineCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EngineCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct RecordingEngine {
    log: EngineCallLog,
    width: u32,
    height: u32,
    pixels: Option<Vec<u8>>,
    color: [u8; 3],
    panic_brush_size: Option<f32>,
}

impl RecordingEngine {
    pub fn new() -> (Self, EngineCallLog) {
        let log = EngineCallLog::default();
        let engine = Self {
            log: log.clone(),
            width: 0,
            height: 0,
            pixels: None,
            color: [0, 0, 0],
            panic_brush_size: None,
        };
        (engine, log)
    }

    /// Panics inside `set_brush_size` when called with exactly `size_px`.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn panicking_on_brush_size(mut self, size_px: f32) -> Self {
        self.panic_brush_size = Some(size_px);
        self
    }

    /// Current brush color as RGB bytes.
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    fn stamp(&mut self, point: &StrokePoint) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };
        if !(point.x >= 0.0 && point.y >= 0.0) {
            return;
        }
        let (x, y) = (point.x as u32, point.y as u32);
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let [r, g, b] = self.color;
        pixels[offset..offset + 4].copy_from_slice(&[r, g, b, u8::MAX]);
    }
}

fn unit_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl DrawingEngine for RecordingEngine {
    fn start_canvas(&mut self, width: u32, height: u32) {
        self.log.push(EngineCall::StartCanvas { width, height });
        self.width = width;
        self.height = height;
        self.pixels = Some(vec![0; width as usize * height as usize * 4]);
    }

    fn clear(&mut self) {
        self.log.push(EngineCall::Clear);
        if let Some(pixels) = self.pixels.as_mut() {
            pixels.fill(0);
        }
    }

    fn set_color(&mut self, r: f32, g: f32, b: f32) {
        self.log.push(EngineCall::SetColor { r, g, b });
        self.color = [unit_to_byte(r), unit_to_byte(g), unit_to_byte(b)];
    }

    fn set_brush_size(&mut self, size_px: f32) {
        if self.panic_brush_size == Some(size_px) {
            panic!("recording engine refused brush size {size_px}");
        }
        self.log.push(EngineCall::SetBrushSize { size_px });
    }

    fn begin_stroke(&mut self) {
        self.log.push(EngineCall::BeginStroke);
    }

    fn add_point(&mut self, point: StrokePoint) {
        self.log.push(EngineCall::AddPoint(point));
        self.stamp(&point);
    }

    fn end_stroke(&mut self) {
        self.log.push(EngineCall::EndStroke);
    }

    fn flush(&mut self) {
        self.log.push(EngineCall::Flush);
    }

    fn load_brush_preset(&mut self, definition: &str) -> bool {
        let accepted = serde_json::from_str::<serde_json::Value>(definition)
            .map(|value| value.is_object())
            .unwrap_or(false);
        self.log.push(EngineCall::LoadBrushPreset {
            definition: definition.to_string(),
            accepted,
        });
        accepted
    }

    fn read_pixel_buffer(&self) -> Option<Vec<u8>> {
        self.pixels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32) -> StrokePoint {
        StrokePoint {
            x,
            y,
            pressure: 1.0,
            delta_seconds: 0.01,
            tilt_x: 0.0,
            tilt_y: 0.0,
        }
    }

    #[test]
    fn pixels_are_unavailable_before_canvas_starts() {
        let (engine, _log) = RecordingEngine::new();
        assert_eq!(engine.read_pixel_buffer(), None);
    }

    #[test]
    fn added_point_colours_the_pixel_under_it() {
        let (mut engine, _log) = RecordingEngine::new();
        engine.start_canvas(4, 2);
        engine.set_color(1.0, 0.0, 0.2);
        engine.add_point(point(2.5, 1.2));
        engine.add_point(point(-1.0, 0.0));
        engine.add_point(point(4.0, 0.0));

        let pixels = engine.read_pixel_buffer().expect("pixels");
        let offset = (4 + 2) * 4;
        assert_eq!(&pixels[offset..offset + 4], &[255, 0, 51, 255]);
        assert_eq!(pixels.iter().filter(|byte| **byte != 0).count(), 3);

        engine.clear();
        let cleared = engine.read_pixel_buffer().expect("pixels");
        assert!(cleared.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn only_json_objects_are_accepted_as_presets() {
        let (mut engine, log) = RecordingEngine::new();
        assert!(engine.load_brush_preset(r#"{"settings":{}}"#));
        assert!(!engine.load_brush_preset("[1, 2]"));
        assert!(!engine.load_brush_preset("{broken"));
        assert_eq!(log.preset_loads().len(), 3);
    }

    #[test]
    fn calls_serialize_with_snake_case_tags() {
        let encoded = serde_json::to_string(&EngineCall::SetBrushSize { size_px: 8.0 })
            .expect("serialize call");
        assert_eq!(encoded, r#"{"call":"set_brush_size","size_px":8.0}"#);

        let encoded = serde_json::to_string(&EngineCall::AddPoint(point(1.0, 2.0)))
            .expect("serialize point");
        assert!(encoded.starts_with(r#"{"call":"add_point","x":1.0,"y":2.0"#));
    }
}
