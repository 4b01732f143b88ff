//! Runs the pipeline one generation at a time.
//!
//! A generation is the five stage workers plus the four channels between them.
//! It lives until something lands in the single-slot rotation channel:
//!
//! * `Rotate(destination)`: the output stage filled its recording and already
//!   opened the next one. The generation is shut down and joined, the
//!   destination goes back into the slot for the next output stage, and the
//!   encoder is rebuilt.
//! * `Fatal(stage)`: a stage cannot continue. The generation is shut down and
//!   joined, `Error` is reported and the error returned.
//! * `Stop`: an outside request to end recording.
//!
//! Shutting a generation down only ever means cancelling the input stage's
//! token; the sentinel it pushes then walks through every stage.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};

use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::codec::{CaptureSource, Decode, Encode, EncoderFactory, Filter};
use crate::media::{Cmd, Payload};
use crate::stage::output::{OutputState, OutputWorker};
use crate::stage::{self, Stage, StageError, StageReport};
use crate::status::{DashcamState, Report};
use crate::storage::{Destination, Storage};

pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Item of the rotation channel.
#[derive(Debug)]
pub enum Signal {
    Rotate(Destination),
    Fatal(Stage),
    Stop,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to set up encoder: {0:#}")]
    EncoderSetup(anyhow::Error),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("{0} worker panicked")]
    Panicked(Stage),
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::EncoderSetup(_) => Some(Stage::Encode),
            PipelineError::Stage(e) => Some(e.stage),
            PipelineError::Panicked(stage) => Some(*stage),
        }
    }
}

/// The media contexts the pipeline runs on. Everything but the encoder lives
/// across generations.
pub struct Pipeline<P, F> {
    pub source: Box<dyn CaptureSource<P>>,
    pub decoder: Box<dyn Decode<P, F>>,
    pub filter: Option<Box<dyn Filter<F>>>,
    pub encoders: Box<dyn EncoderFactory<F, P>>,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub frame_rate: u32,
    /// Capacity of each channel between stages.
    pub queue_depth: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Asks a running [`Orchestrator`] to wind down. Cheap to clone and safe to
/// call from any thread, any number of times.
#[derive(Clone)]
pub struct StopHandle {
    control: Arc<Channel<Signal>>,
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
        // A full slot either wakes the orchestrator already or holds a
        // destination for the next generation, which re-checks the token
        // once it has taken it out.
        if self.control.try_push(Signal::Stop).is_err() {
            log::debug!("rotation slot busy, stop request left to the token");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// What one generation did, kept for logging and inspection.
#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub generation: u64,
    /// Id of the destination the output stage continued in, if any.
    pub inherited: Option<u64>,
    /// Id of the destination that ended this generation by rotation.
    pub rotated_to: Option<u64>,
    pub stages: Vec<(Stage, StageReport)>,
    /// Whether every stage channel was empty after the join.
    pub drained: bool,
}

pub struct Orchestrator<P, F> {
    pipeline: Pipeline<P, F>,
    storage: Storage,
    status: Arc<dyn Report>,
    settings: PipelineSettings,
    control: Arc<Channel<Signal>>,
    stop: CancellationToken,
    history: Vec<GenerationReport>,
}

type Joined = Result<Result<StageReport, StageError>, Box<dyn Any + Send + 'static>>;

impl<P, F> Orchestrator<P, F>
where
    P: Payload + Send,
    F: Send,
{
    pub fn new(
        pipeline: Pipeline<P, F>,
        storage: Storage,
        status: Arc<dyn Report>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            pipeline,
            storage,
            status,
            settings,
            control: Arc::new(Channel::new(1)),
            stop: CancellationToken::new(),
            history: Vec::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control: self.control.clone(),
            token: self.stop.clone(),
        }
    }

    pub fn history(&self) -> &[GenerationReport] {
        &self.history
    }

    /// Records until stopped or until a stage fails. Generations are restarted
    /// around every rotation.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        self.status.report(DashcamState::Starting);
        let result = self.run_generations();
        match &result {
            Ok(()) => self.status.report(DashcamState::Dead),
            Err(e) => {
                log::error!("recording stopped: {}", e);
                self.status.report(DashcamState::Error);
            }
        }
        // Whatever is still parked in the slot belongs to no one now.
        if let Some(leftover) = self.control.try_pop() {
            log::debug!("discarding {:?} left in rotation slot", leftover);
            if let Signal::Rotate(destination) = leftover {
                destination.discard();
            }
        }
        result
    }

    fn run_generations(&mut self) -> Result<(), PipelineError> {
        let mut generation = 0u64;
        loop {
            if self.stop.is_cancelled() {
                log::info!("stop requested, {} generation(s) recorded", generation);
                return Ok(());
            }
            generation += 1;

            let mut encoder = self
                .pipeline
                .encoders
                .open()
                .map_err(PipelineError::EncoderSetup)?;
            log::info!("starting generation {}", generation);
            let (signal, mut report, results) = self.run_generation(encoder.as_mut());
            report.generation = generation;

            let mut rotate_to = None;
            match signal {
                Signal::Rotate(destination) => {
                    report.rotated_to = Some(destination.id());
                    rotate_to = Some(destination);
                }
                Signal::Fatal(stage) => log::warn!("generation {} ended by {} stage", generation, stage),
                Signal::Stop => log::info!("generation {} ended by stop request", generation),
            }
            match self.control.try_pop() {
                // The output stage rotated while a stop or fatal signal was
                // already being handled.
                Some(Signal::Rotate(destination)) => rotate_to = Some(destination),
                Some(Signal::Stop) => self.stop.cancel(),
                Some(Signal::Fatal(stage)) => log::debug!("late fatal signal from {} stage", stage),
                None => {}
            }

            let failure = Self::collect(results, &mut report);
            log::info!(
                "generation {} finished: {}",
                generation,
                report
                    .stages
                    .iter()
                    .map(|(stage, r)| format!("{} [{}]", stage, r))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.history.push(report);

            if let Some(e) = failure {
                return Err(e);
            }
            if let Some(destination) = rotate_to {
                self.hand_over(destination);
            }

            match encoder.flush() {
                Ok(packets) if !packets.is_empty() => {
                    log::debug!("discarded {} packets flushed from the encoder", packets.len())
                }
                Ok(_) => {}
                Err(e) => log::warn!("failed to flush encoder: {:#}", e),
            }
            drop(encoder);
        }
    }

    /// Parks the destination in the slot for the next generation's output
    /// stage. A stop request that filled the slot in the meantime wins.
    fn hand_over(&self, destination: Destination) {
        if self.stop.is_cancelled() {
            destination.discard();
            return;
        }
        if let Err(signal) = self.control.try_push(Signal::Rotate(destination)) {
            log::debug!("rotation slot taken by a stop request, dropping {:?}", signal);
            if let Signal::Rotate(destination) = signal {
                destination.discard();
            }
        }
    }

    /// Runs one generation to completion and returns the signal that ended it.
    fn run_generation(
        &mut self,
        encoder: &mut dyn Encode<F, P>,
    ) -> (Signal, GenerationReport, Vec<(Stage, Joined)>) {
        let Self {
            pipeline,
            storage,
            status,
            settings,
            control,
            stop,
            ..
        } = self;
        let control: &Channel<Signal> = control;
        let status: &dyn Report = status.as_ref();
        let frame_rate = settings.frame_rate;

        let packets = Channel::<Cmd<P>>::new(settings.queue_depth);
        let decoded = Channel::<Cmd<F>>::new(settings.queue_depth);
        let filtered = Channel::<Cmd<F>>::new(settings.queue_depth);
        let encoded = Channel::<Cmd<P>>::new(settings.queue_depth);
        let shutdown = stop.child_token();

        let output = OutputWorker::new(storage, control);
        // A stop that arrived while the slot still held the destination could
        // not leave a signal behind, and none of the workers will.
        if shutdown.is_cancelled() && control.try_push(Signal::Stop).is_err() {
            log::debug!("rotation slot already holds a signal");
        }
        let mut report = GenerationReport {
            inherited: match output.state() {
                OutputState::Writing(destination) => Some(destination.id()),
                _ => None,
            },
            ..Default::default()
        };

        let source = pipeline.source.as_mut();
        let decoder = pipeline.decoder.as_mut();
        let filter = pipeline.filter.as_mut().map(|f| &mut **f as &mut dyn Filter<F>);
        let (packets, decoded, filtered, encoded, shutdown) =
            (&packets, &decoded, &filtered, &encoded, &shutdown);

        let (signal, results) = thread::scope(|s| {
            let handles: [(Stage, ScopedJoinHandle<'_, Result<StageReport, StageError>>); 5] = [
                (
                    Stage::Input,
                    s.spawn(move || {
                        stage::input::run(source, packets, shutdown, frame_rate, control, status)
                    }),
                ),
                (
                    Stage::Decode,
                    s.spawn(move || stage::decode::run(decoder, packets, decoded, control)),
                ),
                (
                    Stage::Filter,
                    s.spawn(move || stage::filter::run(filter, decoded, filtered, control)),
                ),
                (
                    Stage::Encode,
                    s.spawn(move || stage::encode::run(encoder, filtered, encoded, control)),
                ),
                (Stage::Output, s.spawn(move || output.run(encoded))),
            ];
            status.report(DashcamState::Recording);

            let signal = control.pop();
            shutdown.cancel();
            let results: Vec<(Stage, Joined)> = handles
                .into_iter()
                .map(|(stage, handle)| (stage, handle.join()))
                .collect();
            (signal, results)
        });

        report.drained =
            packets.is_empty() && decoded.is_empty() && filtered.is_empty() && encoded.is_empty();
        if !report.drained {
            log::warn!("stage channels not empty after join");
        }
        (signal, report, results)
    }

    /// Files stage reports and returns the first failure, if any.
    fn collect(
        results: Vec<(Stage, Joined)>,
        report: &mut GenerationReport,
    ) -> Option<PipelineError> {
        let mut failure = None;
        for (stage, joined) in results {
            let error = match joined {
                Ok(Ok(stage_report)) => {
                    report.stages.push((stage, stage_report));
                    continue;
                }
                Ok(Err(e)) => PipelineError::Stage(e),
                Err(_) => {
                    log::error!("{} worker panicked", stage);
                    PipelineError::Panicked(stage)
                }
            };
            if failure.is_none() {
                failure = Some(error);
            } else {
                log::error!("additional failure in generation: {}", error);
            }
        }
        failure
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
