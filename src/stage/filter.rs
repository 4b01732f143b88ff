use crate::channel::Channel;
use crate::codec::{CodecError, Filter};
use crate::media::Cmd;
use crate::orchestrator::Signal;
use crate::stage::{fail_and_drain, Stage, StageError, StageReport};

/// Runs decoded frames through the optional format filter. Without one, frames
/// are moved through untouched.
pub fn run<F>(
    filter: Option<&mut dyn Filter<F>>,
    input: &Channel<Cmd<F>>,
    output: &Channel<Cmd<F>>,
    control: &Channel<Signal>,
) -> Result<StageReport, StageError> {
    let mut report = StageReport::default();

    match filter {
        None => {
            while let Cmd::Data(frame) = input.pop() {
                report.received += 1;
                output.push(Cmd::Data(frame));
                report.forwarded += 1;
            }
        }
        Some(filter) => {
            while let Cmd::Data(frame) = input.pop() {
                report.received += 1;
                let result = filter_one(filter, &frame, output, &mut report);
                // The filter took its own reference on submission.
                drop(frame);
                if let Err(e) = result {
                    let error = anyhow::Error::from(e).context("filter error");
                    return Err(fail_and_drain(
                        Stage::Filter,
                        error,
                        input,
                        output,
                        control,
                        &mut report,
                    ));
                }
            }
        }
    }

    log::info!("filter stage: end of stream, {}", report);
    output.push(Cmd::Eof);
    Ok(report)
}

fn filter_one<F>(
    filter: &mut dyn Filter<F>,
    frame: &F,
    output: &Channel<Cmd<F>>,
    report: &mut StageReport,
) -> Result<(), CodecError> {
    filter.send_frame(frame)?;
    while let Some(filtered) = filter.receive_frame()? {
        output.push(Cmd::Data(filtered));
        report.forwarded += 1;
    }
    Ok(())
}
