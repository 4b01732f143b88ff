//! The five pipeline workers.
//!
//! ```text
//! capture ─► Input ─► Decode ─► Filter ─► Encode ─► Output ─► recording file
//!               ▲                                      │
//!          shutdown token                     rotation signal
//!               └──────────── Orchestrator ◄───────────┘
//! ```
//!
//! Each worker runs on its own thread, pops from its upstream channel and
//! pushes to its downstream one, and exits after forwarding the end-of-stream
//! sentinel exactly once. Only the input worker looks at the shutdown token;
//! every other stage stops because the sentinel reached it.
//!
//! A worker that hits an unrecoverable error raises [`Signal::Fatal`] and keeps
//! consuming its input until the sentinel shows up, so that upstream producers
//! never stall on a channel nobody reads.

use std::fmt::{Display, Formatter};

use crate::channel::Channel;
use crate::media::Cmd;
use crate::orchestrator::Signal;

pub mod decode;
pub mod encode;
pub mod filter;
pub mod input;
pub mod output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Input,
    Decode,
    Filter,
    Encode,
    Output,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Input,
        Stage::Decode,
        Stage::Filter,
        Stage::Encode,
        Stage::Output,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Decode => "decode",
            Stage::Filter => "filter",
            Stage::Encode => "encode",
            Stage::Output => "output",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error:#}")]
pub struct StageError {
    pub stage: Stage,
    pub error: anyhow::Error,
}

/// Per-generation unit counters of one worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    /// Units taken from upstream (or read from the device).
    pub received: u64,
    /// Units pushed downstream (or written to storage).
    pub forwarded: u64,
    /// Units released without being forwarded.
    pub dropped: u64,
}

impl Display for StageReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received: {}, forwarded: {}, dropped: {}",
            self.received, self.forwarded, self.dropped
        )
    }
}

/// Tells the orchestrator that `stage` cannot continue.
///
/// Non-blocking: if the rotation slot is already taken, the orchestrator is
/// about to tear this generation down anyway and will find the error when it
/// joins the worker.
pub(crate) fn raise_fatal(stage: Stage, error: &anyhow::Error, control: &Channel<Signal>) {
    log::error!("{} stage fatal error: {:#}", stage, error);
    if control.try_push(Signal::Fatal(stage)).is_err() {
        log::debug!("{} stage: rotation slot busy, fatal error left to join", stage);
    }
}

/// Releases upstream units until the sentinel arrives. Returns how many units
/// were dropped.
pub(crate) fn drain_until_eof<T>(input: &Channel<Cmd<T>>) -> u64 {
    let mut dropped = 0;
    while let Cmd::Data(unit) = input.pop() {
        drop(unit);
        dropped += 1;
    }
    dropped
}

/// Fatal path shared by the middle stages: signal, drain upstream, then hand
/// the sentinel on so downstream stages terminate too.
pub(crate) fn fail_and_drain<I, O>(
    stage: Stage,
    error: anyhow::Error,
    input: &Channel<Cmd<I>>,
    output: &Channel<Cmd<O>>,
    control: &Channel<Signal>,
    report: &mut StageReport,
) -> StageError {
    raise_fatal(stage, &error, control);
    report.dropped += drain_until_eof(input);
    output.push(Cmd::Eof);
    StageError { stage, error }
}

#[cfg(test)]
pub(crate) mod testing;
