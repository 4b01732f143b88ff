use crate::channel::Channel;
use crate::media::{Cmd, Payload};
use crate::orchestrator::Signal;
use crate::stage::{drain_until_eof, raise_fatal, Stage, StageError, StageReport};
use crate::storage::{Destination, Storage};

#[derive(Debug)]
pub enum OutputState {
    /// First generation of the run: no file has been opened yet.
    AwaitingFirstDestination,
    Writing(Destination),
    /// A replacement destination has been handed to the orchestrator; the rest
    /// of this generation is discarded.
    Draining,
}

/// Writes encoded packets to the current recording and starts a rotation when
/// the recording's budget runs out.
pub struct OutputWorker<'a> {
    storage: &'a Storage,
    control: &'a Channel<Signal>,
    state: OutputState,
}

impl<'a> OutputWorker<'a> {
    /// Picks up the destination a previous generation left in the rotation
    /// slot, if any.
    ///
    /// Called on the orchestrator's thread before any worker of the new
    /// generation starts, so nothing else can be in the slot yet.
    pub fn new(storage: &'a Storage, control: &'a Channel<Signal>) -> Self {
        let state = match control.try_pop() {
            Some(Signal::Rotate(destination)) => {
                log::info!(
                    "output stage: continuing in {} ({} bytes left)",
                    destination.path().display(),
                    destination.remaining()
                );
                OutputState::Writing(destination)
            }
            Some(other) => {
                log::warn!("output stage: unexpected {:?} in rotation slot", other);
                if let Err(other) = control.try_push(other) {
                    log::warn!("output stage: dropping {:?}", other);
                }
                OutputState::AwaitingFirstDestination
            }
            None => OutputState::AwaitingFirstDestination,
        };
        Self {
            storage,
            control,
            state,
        }
    }

    pub fn state(&self) -> &OutputState {
        &self.state
    }

    pub fn run<P: Payload>(mut self, input: &Channel<Cmd<P>>) -> Result<StageReport, StageError> {
        let mut report = StageReport::default();

        while let Cmd::Data(packet) = input.pop() {
            report.received += 1;
            match self.write(&packet) {
                Ok(true) => report.forwarded += 1,
                Ok(false) => report.dropped += 1,
                Err(error) => {
                    raise_fatal(Stage::Output, &error, self.control);
                    report.dropped += 1 + drain_until_eof(input);
                    log::info!("output stage: stopped after failure, {}", report);
                    return Err(StageError {
                        stage: Stage::Output,
                        error,
                    });
                }
            }
        }

        log::info!("output stage: end of stream, {}", report);
        Ok(report)
    }

    /// Returns whether the packet reached the disk.
    fn write<P: Payload>(&mut self, packet: &P) -> anyhow::Result<bool> {
        let size = packet.size();
        let needs_destination = match &self.state {
            OutputState::Draining => return Ok(false),
            OutputState::Writing(destination) if destination.fits(size) => None,
            OutputState::Writing(_) => Some(false),
            OutputState::AwaitingFirstDestination => Some(true),
        };

        if let Some(first) = needs_destination {
            // Close the full recording before making room for the next.
            self.state = OutputState::Draining;
            let destination = self.storage.acquire()?;
            if !first {
                self.rotate(destination);
                return Ok(false);
            }
            self.state = OutputState::Writing(destination);
        }

        let OutputState::Writing(destination) = &mut self.state else {
            return Ok(false);
        };
        if !destination.fits(size) {
            log::warn!(
                "output stage: {} byte packet exceeds the whole file budget, dropping",
                size
            );
            return Ok(false);
        }
        destination.write(packet.data())?;
        Ok(true)
    }

    fn rotate(&mut self, destination: Destination) {
        log::info!(
            "output stage: recording full, rotating to {}",
            destination.path().display()
        );
        self.state = OutputState::Draining;
        // Only fails when the orchestrator already has a shutdown signal
        // pending, in which case the new file will not be used.
        if let Err(signal) = self.control.try_push(Signal::Rotate(destination)) {
            log::warn!("output stage: rotation slot busy, discarding {:?}", signal);
            if let Signal::Rotate(destination) = signal {
                destination.discard();
            }
        }
    }
}
