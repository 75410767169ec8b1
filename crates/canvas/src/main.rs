use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use canvas::StrokeCanvas;
use canvas::config::CanvasConfig;
use canvas::trace;
use clap::Parser;
use engine::recording::RecordingEngine;

#[derive(Parser, Debug)]
#[command(name = "stroke-replay")]
#[command(version, about = "Replay a JSONL pointer trace through the stroke pipeline")]
struct Cli {
    /// Pointer trace to replay, one JSON event per line
    #[arg(value_name = "TRACE")]
    trace: PathBuf,

    /// Canvas configuration (TOML); defaults apply when omitted or missing
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where to write the engine call log as JSONL (stdout when omitted)
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };

    let file = File::open(&cli.trace)
        .with_context(|| format!("Failed to open trace {}", cli.trace.display()))?;
    let events = trace::read_trace(&mut BufReader::new(file))
        .with_context(|| format!("Failed to read trace {}", cli.trace.display()))?;
    log::info!("replaying {} trace events", events.len());

    let (engine, calls) = RecordingEngine::new();
    let (mut canvas, _display) =
        StrokeCanvas::attach(&config, move || engine).context("Failed to attach stroke canvas")?;
    let summary = trace::play(&mut canvas, events);
    let normalizer = canvas.normalizer_stats();
    let worker = canvas.finish();

    log::info!(
        "replay done: batches={} rejected={} commands={} resizes={} configure={}",
        summary.pointer_batches,
        summary.rejected_batches,
        summary.enqueued_commands,
        summary.resizes,
        summary.configure_actions
    );
    log::info!(
        "normalizer: emitted={} out_of_bounds={} lift_fallbacks={} suppressed_ends={}",
        normalizer.emitted_samples,
        normalizer.dropped_out_of_bounds,
        normalizer.lift_fallbacks,
        normalizer.suppressed_ends
    );
    log::info!(
        "worker: commands={} batches={} flushes={} renders={} preset_failures={} failures={}",
        worker.commands_processed,
        worker.coalesced_batches,
        worker.flushes,
        worker.render_requests,
        worker.preset_failures,
        worker.command_failures
    );

    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    trace::write_jsonl(&mut *writer, &calls.calls()).context("Failed to write engine call log")?;
    writer.flush().context("Failed to flush engine call log")?;
    Ok(())
}
