use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::codec::CaptureSource;
use crate::media::Cmd;
use crate::orchestrator::Signal;
use crate::stage::{raise_fatal, Stage, StageError, StageReport};
use crate::status::{DashcamState, Report};

/// Reads one unit per frame interval from the capture device until `shutdown`
/// is cancelled, then pushes the sentinel.
pub fn run<P>(
    source: &mut dyn CaptureSource<P>,
    output: &Channel<Cmd<P>>,
    shutdown: &CancellationToken,
    frame_rate: u32,
    control: &Channel<Signal>,
    status: &dyn Report,
) -> Result<StageReport, StageError> {
    let target = frame_interval(frame_rate);
    let mut report = StageReport::default();
    let mut behind = false;
    let mut last = Instant::now();

    while !shutdown.is_cancelled() {
        let packet = match source.read_packet() {
            Ok(packet) => packet,
            Err(error) => {
                raise_fatal(Stage::Input, &error, control);
                output.push(Cmd::Eof);
                return Err(StageError {
                    stage: Stage::Input,
                    error,
                });
            }
        };
        report.received += 1;
        output.push(Cmd::Data(packet));
        report.forwarded += 1;

        let elapsed = last.elapsed();
        if let Some(wait) = target.checked_sub(elapsed) {
            if behind {
                behind = false;
                status.report(DashcamState::Recording);
            }
            std::thread::sleep(wait);
        } else {
            // Debug level: this fires every frame while the encoder is slow.
            log::debug!(
                "falling behind! ({:.3}ms late)",
                (elapsed - target).as_secs_f64() * 1000.0
            );
            if !behind {
                behind = true;
                status.report(DashcamState::FallingBehind);
            }
        }
        last = Instant::now();
    }

    log::info!("input stage: shutdown requested, {}", report);
    output.push(Cmd::Eof);
    Ok(report)
}

fn frame_interval(frame_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64)
}
