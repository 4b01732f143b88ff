//! In-memory stand-ins for the capture device and codecs.
//!
//! Every unit is a `Vec<u8>` whose first byte is its sequence number, and each
//! fake maps a unit to an identical one, so ordering is easy to assert on.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::codec::{CaptureSource, CodecError, Decode, Encode, Filter};
use crate::media::Cmd;
use crate::status::{DashcamState, Report};
use crate::storage::SpaceProbe;

pub type Unit = Vec<u8>;

fn seq(unit: &Unit) -> u8 {
    unit.first().copied().unwrap_or_default()
}

pub fn feed(channel: &Channel<Cmd<Unit>>, range: std::ops::Range<u8>) {
    for i in range {
        channel.push(Cmd::Data(vec![i]));
    }
    channel.push(Cmd::Eof);
}

/// Empties a channel, returning the data units and the number of sentinels.
pub fn collect<T>(channel: &Channel<Cmd<T>>) -> (Vec<T>, usize) {
    let mut units = Vec::new();
    let mut eofs = 0;
    while let Some(cmd) = channel.try_pop() {
        match cmd {
            Cmd::Data(unit) => {
                assert_eq!(eofs, 0, "data after end of stream");
                units.push(unit);
            }
            Cmd::Eof => eofs += 1,
        }
    }
    (units, eofs)
}

/// A volume that never runs out.
pub struct Plenty;

impl SpaceProbe for Plenty {
    fn available(&self, _dir: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }
}

/// Keeps every reported state.
#[derive(Default)]
pub struct StatusLog(Mutex<Vec<DashcamState>>);

impl StatusLog {
    pub fn states(&self) -> Vec<DashcamState> {
        self.0.lock().unwrap().clone()
    }
}

impl Report for StatusLog {
    fn report(&self, state: DashcamState) {
        self.0.lock().unwrap().push(state);
    }
}

/// Yields `count` packets, then fails like an unplugged camera.
pub struct FakeCapture {
    next: u8,
    count: u8,
    delay: Duration,
    on_done: Option<Box<dyn FnOnce() + Send>>,
}

impl FakeCapture {
    pub fn new(count: u8) -> Self {
        Self {
            next: 0,
            count,
            delay: Duration::ZERO,
            on_done: None,
        }
    }

    /// Cancels `token` as the last packet is handed out, so the input stage
    /// stops instead of reading past the end.
    pub fn cancel_when_done(self, token: CancellationToken) -> Self {
        self.when_done(move || token.cancel())
    }

    /// Runs `f` as the last packet is handed out.
    pub fn when_done(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl CaptureSource<Unit> for FakeCapture {
    fn read_packet(&mut self) -> anyhow::Result<Unit> {
        if self.next >= self.count {
            anyhow::bail!("device disconnected");
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let packet = vec![self.next];
        self.next += 1;
        if self.next == self.count {
            if let Some(f) = self.on_done.take() {
                f();
            }
        }
        Ok(packet)
    }
}

#[derive(Default)]
pub struct FakeDecoder {
    pending: VecDeque<Unit>,
    ready: usize,
    batch: usize,
    fail_receive_on: Option<u8>,
}

impl FakeDecoder {
    /// Holds frames back until `batch` of them are buffered.
    pub fn batching(batch: usize) -> Self {
        Self {
            batch,
            ..Default::default()
        }
    }

    pub fn fail_receive_on(mut self, seq: u8) -> Self {
        self.fail_receive_on = Some(seq);
        self
    }
}

impl Decode<Unit, Unit> for FakeDecoder {
    fn send_packet(&mut self, packet: &Unit) -> Result<(), CodecError> {
        self.pending.push_back(packet.clone());
        if self.pending.len() >= self.batch.max(1) {
            self.ready = self.pending.len();
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<Unit>, CodecError> {
        if self.ready == 0 {
            return Ok(None);
        }
        let frame = self.pending.pop_front();
        self.ready -= 1;
        match frame {
            Some(frame) if Some(seq(&frame)) == self.fail_receive_on => {
                Err(anyhow::anyhow!("corrupt bitstream at {}", seq(&frame)).into())
            }
            other => Ok(other),
        }
    }
}

#[derive(Default)]
pub struct FakeFilter {
    pending: VecDeque<Unit>,
    fail_on: Option<u8>,
}

impl FakeFilter {
    pub const MARK: u8 = 0xff;

    pub fn fail_on(mut self, seq: u8) -> Self {
        self.fail_on = Some(seq);
        self
    }
}

impl Filter<Unit> for FakeFilter {
    fn send_frame(&mut self, frame: &Unit) -> Result<(), CodecError> {
        if Some(seq(frame)) == self.fail_on {
            return Err(anyhow::anyhow!("filter graph rejected frame").into());
        }
        let mut converted = frame.clone();
        converted.push(Self::MARK);
        self.pending.push_back(converted);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<Unit>, CodecError> {
        Ok(self.pending.pop_front())
    }
}

#[derive(Default)]
pub struct FakeEncoder {
    pending: VecDeque<Unit>,
    busy: HashMap<u8, usize>,
    attempts: HashMap<u8, usize>,
    reject: Option<u8>,
    fail_receive_on: Option<u8>,
    flushed: Option<Arc<AtomicUsize>>,
}

impl FakeEncoder {
    /// Answers `Again` `times` times before accepting frame `seq`.
    pub fn busy_on(mut self, seq: u8, times: usize) -> Self {
        self.busy.insert(seq, times);
        self
    }

    pub fn reject(mut self, seq: u8) -> Self {
        self.reject = Some(seq);
        self
    }

    pub fn fail_receive_on(mut self, seq: u8) -> Self {
        self.fail_receive_on = Some(seq);
        self
    }

    /// Counts calls to `flush` into `counter`.
    pub fn count_flushes(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.flushed = Some(counter);
        self
    }

    pub fn attempts_for(&self, seq: u8) -> usize {
        self.attempts.get(&seq).copied().unwrap_or_default()
    }
}

impl Encode<Unit, Unit> for FakeEncoder {
    fn send_frame(&mut self, frame: &Unit) -> Result<(), CodecError> {
        let seq = seq(frame);
        *self.attempts.entry(seq).or_default() += 1;
        if let Some(left) = self.busy.get_mut(&seq) {
            if *left > 0 {
                *left -= 1;
                return Err(CodecError::Again);
            }
        }
        if Some(seq) == self.reject {
            return Err(anyhow::anyhow!("invalid frame").into());
        }
        self.pending.push_back(frame.clone());
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<Unit>, CodecError> {
        match self.pending.pop_front() {
            Some(packet) if Some(seq(&packet)) == self.fail_receive_on => {
                Err(anyhow::anyhow!("encoder state corrupted").into())
            }
            other => Ok(other),
        }
    }

    fn flush(&mut self) -> anyhow::Result<Vec<Unit>> {
        if let Some(counter) = &self.flushed {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.pending.drain(..).collect())
    }
}
