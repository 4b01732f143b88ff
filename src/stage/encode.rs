use crate::channel::Channel;
use crate::codec::{CodecError, Encode};
use crate::media::Cmd;
use crate::orchestrator::Signal;
use crate::stage::{fail_and_drain, Stage, StageError, StageReport};

/// Submits frames to the encoder and forwards the packets it produces.
///
/// A busy encoder gets the same frame again until it takes it: latency is
/// preferred over a dropped frame. Any other submission error only costs the
/// frame at hand. Errors while pulling packets are fatal.
pub fn run<F, P>(
    encoder: &mut dyn Encode<F, P>,
    input: &Channel<Cmd<F>>,
    output: &Channel<Cmd<P>>,
    control: &Channel<Signal>,
) -> Result<StageReport, StageError> {
    let mut report = StageReport::default();

    while let Cmd::Data(frame) = input.pop() {
        report.received += 1;
        let submitted = submit(encoder, &frame);
        drop(frame);
        if let Err(e) = submitted {
            log::warn!("failed to encode frame, skipping: {:#}", e);
            report.dropped += 1;
            continue;
        }

        if let Err(e) = drain(encoder, output, &mut report) {
            let error = anyhow::Error::from(e).context("encoding error");
            return Err(fail_and_drain(
                Stage::Encode,
                error,
                input,
                output,
                control,
                &mut report,
            ));
        }
    }

    log::info!("encode stage: end of stream, {}", report);
    output.push(Cmd::Eof);
    Ok(report)
}

fn submit<F, P>(encoder: &mut dyn Encode<F, P>, frame: &F) -> Result<(), CodecError> {
    let mut retries = 0u64;
    loop {
        match encoder.send_frame(frame) {
            Err(CodecError::Again) => {
                retries += 1;
                log::warn!("encoder busy, retrying frame (attempt {})", retries + 1);
            }
            other => return other,
        }
    }
}

fn drain<F, P>(
    encoder: &mut dyn Encode<F, P>,
    output: &Channel<Cmd<P>>,
    report: &mut StageReport,
) -> Result<(), CodecError> {
    loop {
        match encoder.receive_packet() {
            Ok(Some(packet)) => {
                output.push(Cmd::Data(packet));
                report.forwarded += 1;
            }
            Ok(None) | Err(CodecError::Again) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}
