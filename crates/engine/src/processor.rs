use std::sync::Arc;

use protocol::{ConfigureAction, PointerSample, StrokeCommand};

use crate::worker::WorkerStats;
use crate::{DrawingEngine, StrokePoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrokeState {
    #[default]
    Idle,
    Active,
}

/// What the caller owes the render side after applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    None,
    /// Flush the engine, then request a render.
    AfterFlush,
    /// Request a render; the engine already committed its pixels.
    Immediate,
}

/// Engine setup applied once, before the first command.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasBootstrap {
    pub width: u32,
    pub height: u32,
    pub initial_color: [f32; 3],
    pub initial_brush_size: Option<f32>,
    pub initial_preset: Option<String>,
}

impl CanvasBootstrap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            initial_color: [0.0, 0.7, 1.0],
            initial_brush_size: None,
            initial_preset: None,
        }
    }
}

/// Stroke state machine in front of a [`DrawingEngine`].
///
/// Holds at most one deferred preset: a load requested mid-stroke is applied
/// when the stroke closes, and a later request overwrites an earlier one.
pub struct StrokeProcessor<E> {
    engine: E,
    state: StrokeState,
    pending_preset: Option<String>,
    stats: Arc<WorkerStats>,
}

impl<E: DrawingEngine> StrokeProcessor<E> {
    pub fn new(engine: E) -> Self {
        Self::with_stats(engine, Arc::new(WorkerStats::default()))
    }

    pub fn with_stats(engine: E, stats: Arc<WorkerStats>) -> Self {
        Self {
            engine,
            state: StrokeState::Idle,
            pending_preset: None,
            stats,
        }
    }

    pub fn state(&self) -> StrokeState {
        self.state
    }

    pub fn pending_preset(&self) -> Option<&str> {
        self.pending_preset.as_deref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn stats(&self) -> &Arc<WorkerStats> {
        &self.stats
    }

    pub fn bootstrap(&mut self, bootstrap: &CanvasBootstrap) {
        self.engine.start_canvas(bootstrap.width, bootstrap.height);
        let [r, g, b] = bootstrap.initial_color;
        self.engine.set_color(r, g, b);
        if let Some(size_px) = bootstrap.initial_brush_size {
            self.engine.set_brush_size(size_px);
        }
        if let Some(definition) = &bootstrap.initial_preset {
            self.load_preset(definition);
        }
        log::info!("canvas started at {}x{}", bootstrap.width, bootstrap.height);
    }

    pub fn apply(&mut self, command: StrokeCommand) -> Redraw {
        let redraw = match command {
            StrokeCommand::Begin(sample) => {
                if self.state == StrokeState::Active {
                    log::debug!("begin while a stroke is open, continuing it");
                } else {
                    self.open_stroke();
                }
                self.add_point(&sample);
                Redraw::AfterFlush
            }
            StrokeCommand::Move(sample) => {
                if self.state == StrokeState::Idle {
                    log::warn!("move without an open stroke, opening one");
                    self.open_stroke();
                }
                self.add_point(&sample);
                Redraw::AfterFlush
            }
            StrokeCommand::End(sample) => {
                self.end(&sample);
                Redraw::Immediate
            }
            StrokeCommand::Configure(action) => self.configure(action),
        };
        self.stats.record_command();
        redraw
    }

    pub fn flush(&mut self) {
        self.stats.record_flush();
        self.engine.flush();
    }

    pub fn read_pixels(&self) -> Option<Vec<u8>> {
        self.engine.read_pixel_buffer()
    }

    fn configure(&mut self, action: ConfigureAction) -> Redraw {
        match action {
            ConfigureAction::Clear => {
                if self.state == StrokeState::Active {
                    self.state = StrokeState::Idle;
                    self.engine.end_stroke();
                    self.apply_pending_preset();
                }
                self.engine.clear();
                Redraw::Immediate
            }
            ConfigureAction::SetBrushSize { size_px } => {
                self.engine.set_brush_size(size_px);
                Redraw::None
            }
            ConfigureAction::SetColor { r, g, b } => {
                self.engine.set_color(r, g, b);
                Redraw::None
            }
            ConfigureAction::LoadBrushPreset { definition } => match self.state {
                StrokeState::Active => {
                    if self.pending_preset.replace(definition).is_some() {
                        log::debug!("replacing deferred brush preset");
                    }
                    self.stats.record_deferred_preset();
                    Redraw::None
                }
                StrokeState::Idle => {
                    self.load_preset(&definition);
                    Redraw::Immediate
                }
            },
        }
    }

    fn open_stroke(&mut self) {
        self.state = StrokeState::Active;
        self.engine.begin_stroke();
    }

    fn end(&mut self, sample: &PointerSample) {
        let previous = std::mem::replace(&mut self.state, StrokeState::Idle);
        if previous == StrokeState::Idle {
            log::warn!("end without an open stroke, drawing a single point");
            self.engine.begin_stroke();
        }
        self.add_point(sample);
        self.engine.end_stroke();
        self.apply_pending_preset();
    }

    fn add_point(&mut self, sample: &PointerSample) {
        self.engine.add_point(StrokePoint::from_sample(sample));
    }

    fn apply_pending_preset(&mut self) {
        if let Some(definition) = self.pending_preset.take() {
            self.load_preset(&definition);
        }
    }

    fn load_preset(&mut self, definition: &str) {
        if self.engine.load_brush_preset(definition) {
            log::debug!("brush preset loaded ({} bytes)", definition.len());
        } else {
            self.stats.record_preset_failure();
            log::error!("brush preset rejected ({} bytes)", definition.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{EngineCall, RecordingEngine};
    use protocol::ToolKind;

    fn sample(x: f32, y: f32) -> PointerSample {
        PointerSample {
            pointer_id: 1,
            tool: ToolKind::Stylus,
            surface_x: x,
            surface_y: y,
            pressure: 0.5,
            tilt_x_radians: None,
            tilt_y_radians: Some(0.25),
            orientation_radians: None,
            azimuth_radians: None,
            timestamp_nanos: 0,
            delta_seconds: 0.01,
        }
    }

    fn processor() -> (StrokeProcessor<RecordingEngine>, crate::recording::EngineCallLog) {
        let (engine, log) = RecordingEngine::new();
        (StrokeProcessor::new(engine), log)
    }

    fn preset(name: &str) -> String {
        format!("{{\"name\":\"{name}\"}}")
    }

    #[test]
    fn stroke_calls_begin_add_end_in_order() {
        let (mut processor, log) = processor();
        assert_eq!(processor.apply(StrokeCommand::Begin(sample(1.0, 1.0))), Redraw::AfterFlush);
        assert_eq!(processor.apply(StrokeCommand::Move(sample(2.0, 2.0))), Redraw::AfterFlush);
        assert_eq!(processor.apply(StrokeCommand::End(sample(3.0, 3.0))), Redraw::Immediate);
        assert_eq!(processor.state(), StrokeState::Idle);

        let calls = log.calls();
        assert_eq!(calls.first(), Some(&EngineCall::BeginStroke));
        assert_eq!(calls.last(), Some(&EngineCall::EndStroke));
        assert_eq!(log.add_point_count(), 3);
    }

    #[test]
    fn missing_tilt_reaches_engine_as_zero() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Begin(sample(4.0, 5.0)));
        assert_eq!(
            log.calls()[1],
            EngineCall::AddPoint(StrokePoint {
                x: 4.0,
                y: 5.0,
                pressure: 0.5,
                delta_seconds: 0.01,
                tilt_x: 0.0,
                tilt_y: 0.25,
            })
        );
    }

    #[test]
    fn begin_during_open_stroke_only_adds_a_point() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Begin(sample(1.0, 1.0)));
        processor.apply(StrokeCommand::Begin(sample(2.0, 2.0)));
        let begins = log
            .calls()
            .iter()
            .filter(|call| **call == EngineCall::BeginStroke)
            .count();
        assert_eq!(begins, 1);
        assert_eq!(log.add_point_count(), 2);
    }

    #[test]
    fn move_while_idle_opens_a_stroke() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Move(sample(1.0, 1.0)));
        assert_eq!(processor.state(), StrokeState::Active);
        assert_eq!(log.calls()[0], EngineCall::BeginStroke);
    }

    #[test]
    fn end_while_idle_draws_a_single_point_stroke() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::End(sample(1.0, 1.0)));
        let calls = log.calls();
        assert_eq!(calls[0], EngineCall::BeginStroke);
        assert!(matches!(calls[1], EngineCall::AddPoint(_)));
        assert_eq!(calls[2], EngineCall::EndStroke);
        assert_eq!(processor.state(), StrokeState::Idle);
    }

    #[test]
    fn preset_during_stroke_waits_for_end_and_last_request_wins() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Begin(sample(1.0, 1.0)));
        let first = StrokeCommand::Configure(ConfigureAction::LoadBrushPreset {
            definition: preset("first"),
        });
        let second = StrokeCommand::Configure(ConfigureAction::LoadBrushPreset {
            definition: preset("second"),
        });
        assert_eq!(processor.apply(first), Redraw::None);
        assert_eq!(processor.apply(second), Redraw::None);
        assert_eq!(processor.pending_preset(), Some(preset("second").as_str()));
        assert!(log.preset_loads().is_empty());

        processor.apply(StrokeCommand::End(sample(2.0, 2.0)));
        assert_eq!(log.preset_loads(), vec![preset("second")]);
        assert_eq!(processor.pending_preset(), None);

        let calls = log.calls();
        let end_index = calls
            .iter()
            .position(|call| *call == EngineCall::EndStroke)
            .expect("end stroke call");
        assert!(matches!(calls[end_index + 1], EngineCall::LoadBrushPreset { .. }));
    }

    #[test]
    fn preset_while_idle_loads_immediately() {
        let (mut processor, log) = processor();
        let redraw = processor.apply(StrokeCommand::Configure(ConfigureAction::LoadBrushPreset {
            definition: preset("now"),
        }));
        assert_eq!(redraw, Redraw::Immediate);
        assert_eq!(log.preset_loads(), vec![preset("now")]);
    }

    #[test]
    fn rejected_preset_is_counted_and_stroke_continues() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Configure(ConfigureAction::LoadBrushPreset {
            definition: "not a preset".to_string(),
        }));
        assert_eq!(processor.stats().snapshot().preset_failures, 1);

        processor.apply(StrokeCommand::Begin(sample(1.0, 1.0)));
        processor.apply(StrokeCommand::End(sample(2.0, 2.0)));
        assert_eq!(log.add_point_count(), 2);
    }

    #[test]
    fn clear_during_stroke_ends_it_and_applies_pending_preset_first() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Begin(sample(1.0, 1.0)));
        processor.apply(StrokeCommand::Configure(ConfigureAction::LoadBrushPreset {
            definition: preset("deferred"),
        }));
        assert_eq!(
            processor.apply(StrokeCommand::Configure(ConfigureAction::Clear)),
            Redraw::Immediate
        );
        assert_eq!(processor.state(), StrokeState::Idle);

        let tail: Vec<EngineCall> = log.calls().into_iter().skip(2).collect();
        assert_eq!(
            tail,
            vec![
                EngineCall::EndStroke,
                EngineCall::LoadBrushPreset {
                    definition: preset("deferred"),
                    accepted: true,
                },
                EngineCall::Clear,
            ]
        );
    }

    #[test]
    fn clear_while_idle_only_clears() {
        let (mut processor, log) = processor();
        processor.apply(StrokeCommand::Configure(ConfigureAction::Clear));
        assert_eq!(log.calls(), vec![EngineCall::Clear]);
    }

    #[test]
    fn repeating_a_color_leaves_the_same_engine_state() {
        let color = StrokeCommand::Configure(ConfigureAction::SetColor { r: 0.2, g: 0.4, b: 0.6 });
        let draw = |repeats: usize| {
            let (mut processor, log) = processor();
            processor.bootstrap(&CanvasBootstrap::new(4, 4));
            for _ in 0..repeats {
                assert_eq!(processor.apply(color.clone()), Redraw::None);
            }
            processor.apply(StrokeCommand::Begin(sample(1.0, 2.0)));
            processor.apply(StrokeCommand::End(sample(1.0, 2.0)));
            let set_colors = log
                .calls()
                .iter()
                .filter(|call| **call == EngineCall::SetColor { r: 0.2, g: 0.4, b: 0.6 })
                .count();
            assert_eq!(set_colors, repeats);
            (processor.engine().color(), processor.read_pixels())
        };

        let once = draw(1);
        let twice = draw(2);
        assert_eq!(once.0, [51, 102, 153]);
        assert!(once.1.is_some());
        assert_eq!(once, twice);
    }

    #[test]
    fn bootstrap_starts_canvas_then_applies_initial_settings() {
        let (mut processor, log) = processor();
        let mut bootstrap = CanvasBootstrap::new(64, 32);
        bootstrap.initial_brush_size = Some(6.0);
        bootstrap.initial_preset = Some(preset("startup"));
        processor.bootstrap(&bootstrap);

        assert_eq!(
            log.calls(),
            vec![
                EngineCall::StartCanvas { width: 64, height: 32 },
                EngineCall::SetColor { r: 0.0, g: 0.7, b: 1.0 },
                EngineCall::SetBrushSize { size_px: 6.0 },
                EngineCall::LoadBrushPreset {
                    definition: preset("startup"),
                    accepted: true,
                },
            ]
        );
    }
}
