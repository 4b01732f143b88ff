use crate::channel::Channel;
use crate::codec::{CodecError, Decode};
use crate::media::Cmd;
use crate::orchestrator::Signal;
use crate::stage::{fail_and_drain, Stage, StageError, StageReport};

/// Feeds compressed units to the decoder and forwards every frame it emits,
/// in emission order.
pub fn run<P, F>(
    decoder: &mut dyn Decode<P, F>,
    input: &Channel<Cmd<P>>,
    output: &Channel<Cmd<F>>,
    control: &Channel<Signal>,
) -> Result<StageReport, StageError> {
    let mut report = StageReport::default();

    while let Cmd::Data(packet) = input.pop() {
        report.received += 1;
        if let Err(e) = decode_one(decoder, &packet, output, &mut report) {
            drop(packet);
            let error = anyhow::Error::from(e).context("decoding error");
            return Err(fail_and_drain(
                Stage::Decode,
                error,
                input,
                output,
                control,
                &mut report,
            ));
        }
    }

    log::info!("decode stage: end of stream, {}", report);
    output.push(Cmd::Eof);
    Ok(report)
}

fn decode_one<P, F>(
    decoder: &mut dyn Decode<P, F>,
    packet: &P,
    output: &Channel<Cmd<F>>,
    report: &mut StageReport,
) -> Result<(), CodecError> {
    match decoder.send_packet(packet) {
        Ok(()) => {}
        // Output from earlier input is still pending: collect it, then give
        // the packet one more chance.
        Err(CodecError::Again) => {
            forward_frames(decoder, output, report)?;
            match decoder.send_packet(packet) {
                Ok(()) => {}
                Err(CodecError::Again) => {
                    log::warn!("decoder not ready, dropping packet");
                    report.dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Err(e) => return Err(e),
    }

    forward_frames(decoder, output, report)
}

fn forward_frames<P, F>(
    decoder: &mut dyn Decode<P, F>,
    output: &Channel<Cmd<F>>,
    report: &mut StageReport,
) -> Result<(), CodecError> {
    while let Some(frame) = decoder.receive_frame()? {
        output.push(Cmd::Data(frame));
        report.forwarded += 1;
    }
    Ok(())
}
