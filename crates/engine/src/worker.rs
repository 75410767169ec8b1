use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};
use protocol::StrokeCommand;

use crate::processor::{CanvasBootstrap, Redraw, StrokeProcessor};
use crate::queue::{StrokeCommandReceiver, StrokeCommandSender, stroke_command_queue};
use crate::render_link::RenderPublisher;
use crate::DrawingEngine;

pub const DEFAULT_MAX_COALESCED_COMMANDS: usize = 100;
pub const DEFAULT_THREAD_NAME: &str = "stroke-worker";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Queued commands drained behind a move before flushing.
    pub max_coalesced_commands: usize,
    pub thread_name: String,
    pub bootstrap: CanvasBootstrap,
}

impl WorkerConfig {
    pub fn new(bootstrap: CanvasBootstrap) -> Self {
        Self {
            max_coalesced_commands: DEFAULT_MAX_COALESCED_COMMANDS,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            bootstrap,
        }
    }
}

/// How the worker treats commands still queued when it is told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopMode {
    Discard,
    Drain,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerSpawnError {
    #[error("failed to spawn stroke worker thread: {0}")]
    Thread(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    commands_processed: AtomicU64,
    coalesced_batches: AtomicU64,
    coalesced_commands: AtomicU64,
    flushes: AtomicU64,
    render_requests: AtomicU64,
    deferred_presets: AtomicU64,
    preset_failures: AtomicU64,
    command_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStatsSnapshot {
    pub commands_processed: u64,
    pub coalesced_batches: u64,
    pub coalesced_commands: u64,
    pub flushes: u64,
    pub render_requests: u64,
    pub deferred_presets: u64,
    pub preset_failures: u64,
    pub command_failures: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            coalesced_batches: self.coalesced_batches.load(Ordering::Relaxed),
            coalesced_commands: self.coalesced_commands.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            render_requests: self.render_requests.load(Ordering::Relaxed),
            deferred_presets: self.deferred_presets.load(Ordering::Relaxed),
            preset_failures: self.preset_failures.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_command(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, commands: usize) {
        self.coalesced_batches.fetch_add(1, Ordering::Relaxed);
        self.coalesced_commands.fetch_add(commands as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_render_request(&self) {
        self.render_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred_preset(&self) {
        self.deferred_presets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_preset_failure(&self) {
        self.preset_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_command_failure(&self) {
        self.command_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owner of the stroke worker thread.
///
/// Dropping the handle (or calling [`detach`](Self::detach)) stops the worker
/// and joins it. Commands still queued at that point are discarded;
/// [`finish`](Self::finish) applies them first.
pub struct StrokeWorkerHandle {
    sender: StrokeCommandSender,
    stop_sender: Option<Sender<StopMode>>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl StrokeWorkerHandle {
    /// Starts the worker. `engine_factory` runs on the worker thread, so the
    /// engine itself never crosses threads.
    pub fn spawn<E, F>(
        config: WorkerConfig,
        publisher: RenderPublisher,
        engine_factory: F,
    ) -> Result<Self, WorkerSpawnError>
    where
        E: DrawingEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let (sender, receiver) = stroke_command_queue();
        let (stop_sender, stop_receiver) = bounded::<StopMode>(1);
        let stats = Arc::new(WorkerStats::default());
        let worker_stats = Arc::clone(&stats);
        let max_coalesced = config.max_coalesced_commands.max(1);
        let bootstrap = config.bootstrap;

        let thread = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || {
                // Dropping the receiver here turns later submissions into errors.
                let Some(engine) = guarded("engine factory", &worker_stats, engine_factory) else {
                    return;
                };
                let processor = StrokeProcessor::with_stats(engine, Arc::clone(&worker_stats));
                let mut worker = WorkerLoop {
                    processor,
                    stats: worker_stats,
                    commands: receiver,
                    stop: stop_receiver,
                    publisher,
                    max_coalesced,
                };
                worker.start(&bootstrap);
                worker.run();
            })?;

        Ok(Self {
            sender,
            stop_sender: Some(stop_sender),
            thread: Some(thread),
            stats,
        })
    }

    pub fn sender(&self) -> StrokeCommandSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    pub fn detach(mut self) {
        self.stop_and_join();
    }

    /// Applies every command queued before this call, then stops and joins.
    /// Returns the final counters.
    pub fn finish(mut self) -> WorkerStatsSnapshot {
        if let Some(stop_sender) = &self.stop_sender {
            if stop_sender.send(StopMode::Drain).is_err() {
                log::debug!("stroke worker already stopped");
            }
        }
        self.stop_and_join();
        self.stats.snapshot()
    }

    fn stop_and_join(&mut self) {
        // A disconnected stop channel wakes the worker's select.
        drop(self.stop_sender.take());
        if let Some(thread) = self.thread.take() {
            if let Err(payload) = thread.join() {
                log::error!("stroke worker panicked: {}", panic_message(payload.as_ref()));
            } else {
                log::debug!("stroke worker joined");
            }
        }
    }
}

impl Drop for StrokeWorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

struct WorkerLoop<E> {
    processor: StrokeProcessor<E>,
    stats: Arc<WorkerStats>,
    commands: StrokeCommandReceiver,
    stop: Receiver<StopMode>,
    publisher: RenderPublisher,
    max_coalesced: usize,
}

impl<E: DrawingEngine> WorkerLoop<E> {
    fn start(&mut self, bootstrap: &CanvasBootstrap) {
        let processor = &mut self.processor;
        let started = guarded("bootstrap", &self.stats, || processor.bootstrap(bootstrap));
        if started.is_some() {
            self.request_render();
        }
    }

    fn run(&mut self) {
        let mode = loop {
            let next = select! {
                recv(self.stop) -> signal => Err(signal.unwrap_or(StopMode::Discard)),
                recv(self.commands.channel()) -> message => message.map_err(|_| StopMode::Discard),
            };
            let command = match next {
                Ok(command) => command,
                Err(mode) => break mode,
            };
            match self.stop.try_recv() {
                Ok(mode) => {
                    if mode == StopMode::Drain {
                        self.dispatch(command);
                    }
                    break mode;
                }
                Err(TryRecvError::Disconnected) => break StopMode::Discard,
                Err(TryRecvError::Empty) => self.dispatch(command),
            }
        };

        if mode == StopMode::Drain {
            while let Ok(command) = self.commands.channel().try_recv() {
                self.dispatch(command);
            }
        }
        log::debug!("stroke worker stopping ({mode:?})");
    }

    fn dispatch(&mut self, command: StrokeCommand) {
        if command.is_move() {
            self.run_batch(command);
        } else {
            self.run_single(command);
        }
    }

    fn run_single(&mut self, command: StrokeCommand) {
        match self.apply(command) {
            Redraw::None => {}
            Redraw::AfterFlush => {
                self.flush();
                self.request_render();
            }
            Redraw::Immediate => self.request_render(),
        }
    }

    /// Applies `first` plus whatever is already queued behind it, in order,
    /// then flushes and requests a render once.
    fn run_batch(&mut self, first: StrokeCommand) {
        let mut batch = Vec::with_capacity(self.max_coalesced + 1);
        batch.push(first);
        batch.extend(self.commands.drain_ready().take(self.max_coalesced));
        self.stats.record_batch(batch.len());
        log::trace!("coalesced {} stroke commands", batch.len());

        for command in batch {
            self.apply(command);
        }
        self.flush();
        self.request_render();
    }

    fn apply(&mut self, command: StrokeCommand) -> Redraw {
        let label = command.label();
        let processor = &mut self.processor;
        guarded(label, &self.stats, || processor.apply(command)).unwrap_or(Redraw::None)
    }

    fn flush(&mut self) {
        let processor = &mut self.processor;
        guarded("flush", &self.stats, || processor.flush());
    }

    fn request_render(&mut self) {
        let processor = &self.processor;
        let pixels = guarded("read pixels", &self.stats, || processor.read_pixels()).flatten();
        self.stats.record_render_request();
        self.publisher.request_render(pixels);
    }
}

/// Runs `work`, turning a panic into a logged, counted failure.
fn guarded<T>(label: &str, stats: &WorkerStats, work: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(value) => Some(value),
        Err(payload) => {
            stats.record_command_failure();
            log::error!("stroke worker {label} failed: {}", panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
