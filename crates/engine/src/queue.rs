use crossbeam_channel::{Receiver, Sender, TryIter, unbounded};
use protocol::{ConfigureAction, SinkClosed, StrokeCommand, StrokeCommandSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("stroke worker has stopped")]
    WorkerStopped,
}

/// Producer end of the stroke queue. Cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub struct StrokeCommandSender {
    sender: Sender<StrokeCommand>,
}

/// Consumer end, held by the worker thread only.
#[derive(Debug)]
pub struct StrokeCommandReceiver {
    receiver: Receiver<StrokeCommand>,
}

/// Unbounded, ordered, multi-producer single-consumer queue.
pub fn stroke_command_queue() -> (StrokeCommandSender, StrokeCommandReceiver) {
    let (sender, receiver) = unbounded();
    (StrokeCommandSender { sender }, StrokeCommandReceiver { receiver })
}

impl StrokeCommandSender {
    pub fn submit(&self, command: StrokeCommand) -> Result<(), SubmitError> {
        self.sender
            .send(command)
            .map_err(|_| SubmitError::WorkerStopped)
    }

    pub fn submit_clear(&self) -> Result<(), SubmitError> {
        self.configure(ConfigureAction::Clear)
    }

    pub fn submit_brush_size(&self, size_px: f32) -> Result<(), SubmitError> {
        self.configure(ConfigureAction::SetBrushSize { size_px })
    }

    pub fn submit_color(&self, r: f32, g: f32, b: f32) -> Result<(), SubmitError> {
        self.configure(ConfigureAction::SetColor { r, g, b })
    }

    pub fn submit_brush_preset(&self, definition: impl Into<String>) -> Result<(), SubmitError> {
        self.configure(ConfigureAction::LoadBrushPreset {
            definition: definition.into(),
        })
    }

    /// Commands queued and not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    fn configure(&self, action: ConfigureAction) -> Result<(), SubmitError> {
        self.submit(StrokeCommand::Configure(action))
    }
}

impl StrokeCommandSink for StrokeCommandSender {
    fn push_command(&mut self, command: StrokeCommand) -> Result<(), SinkClosed> {
        let label = command.label();
        self.submit(command).map_err(|error| {
            log::error!("stroke {label} dropped: {error}");
            SinkClosed
        })
    }
}

impl StrokeCommandReceiver {
    pub(crate) fn channel(&self) -> &Receiver<StrokeCommand> {
        &self.receiver
    }

    /// Commands already queued, without waiting.
    pub fn drain_ready(&self) -> TryIter<'_, StrokeCommand> {
        self.receiver.try_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_helpers_enqueue_configure_commands_in_order() {
        let (sender, receiver) = stroke_command_queue();
        sender.submit_color(0.1, 0.2, 0.3).expect("color");
        sender.submit_brush_size(12.0).expect("size");
        sender.submit_brush_preset("{}").expect("preset");
        sender.submit_clear().expect("clear");
        assert_eq!(sender.pending(), 4);

        let drained: Vec<StrokeCommand> = receiver.drain_ready().collect();
        assert_eq!(
            drained,
            vec![
                StrokeCommand::Configure(ConfigureAction::SetColor { r: 0.1, g: 0.2, b: 0.3 }),
                StrokeCommand::Configure(ConfigureAction::SetBrushSize { size_px: 12.0 }),
                StrokeCommand::Configure(ConfigureAction::LoadBrushPreset {
                    definition: "{}".to_string()
                }),
                StrokeCommand::Configure(ConfigureAction::Clear),
            ]
        );
    }

    #[test]
    fn submit_after_receiver_dropped_reports_stopped_worker() {
        let (sender, receiver) = stroke_command_queue();
        drop(receiver);
        assert_eq!(sender.submit_clear(), Err(SubmitError::WorkerStopped));
    }

    #[test]
    fn sink_push_fails_once_the_worker_is_gone() {
        let (mut sender, receiver) = stroke_command_queue();
        sender
            .push_command(StrokeCommand::Configure(ConfigureAction::Clear))
            .expect("open queue");
        drop(receiver);
        assert_eq!(
            sender.push_command(StrokeCommand::Configure(ConfigureAction::Clear)),
            Err(SinkClosed)
        );
    }

    #[test]
    fn senders_from_several_threads_share_one_queue() {
        let (sender, receiver) = stroke_command_queue();
        let handles: Vec<_> = (0..4)
            .map(|index| {
                let sender = sender.clone();
                std::thread::spawn(move || {
                    sender
                        .submit_brush_size(index as f32)
                        .expect("submit from producer thread");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread");
        }
        assert_eq!(receiver.drain_ready().count(), 4);
    }
}
