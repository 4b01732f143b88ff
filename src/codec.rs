//! Seams between the pipeline and the media backends.
//!
//! Each stage owns exactly one of these for the lifetime of a generation. The
//! FFmpeg backed implementations live behind the `ffmpeg` feature in
//! [`crate::av`]; tests drive the pipeline with in-memory fakes.
//!
//! Receiving follows the same convention everywhere: `Ok(Some(unit))` when the
//! backend produced output, `Ok(None)` when it needs more input (or has been
//! drained), `Err` when its internal state can no longer be trusted.

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The backend cannot take input right now; submit the same unit again.
    #[error("resource temporarily unavailable, try again")]
    Again,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Reads compressed units from the capture device.
pub trait CaptureSource<P>: Send {
    /// Blocks until the device delivers the next unit. Failures are not
    /// recoverable within a generation.
    fn read_packet(&mut self) -> anyhow::Result<P>;
}

pub trait Decode<P, F>: Send {
    fn send_packet(&mut self, packet: &P) -> Result<(), CodecError>;

    fn receive_frame(&mut self) -> Result<Option<F>, CodecError>;
}

/// Optional pixel format transform between decoder and encoder.
pub trait Filter<F>: Send {
    /// The filter keeps its own reference to whatever it needs from `frame`.
    fn send_frame(&mut self, frame: &F) -> Result<(), CodecError>;

    fn receive_frame(&mut self) -> Result<Option<F>, CodecError>;
}

pub trait Encode<F, P>: Send {
    fn send_frame(&mut self, frame: &F) -> Result<(), CodecError>;

    fn receive_packet(&mut self) -> Result<Option<P>, CodecError>;

    /// Signals end of stream to the encoder and returns whatever it still had
    /// buffered.
    fn flush(&mut self) -> anyhow::Result<Vec<P>>;
}

/// Builds a fresh encoder. The hardware encoder cannot be reset in place, so
/// one is opened per generation.
pub trait EncoderFactory<F, P>: Send {
    fn open(&mut self) -> anyhow::Result<Box<dyn Encode<F, P>>>;
}

impl<F, P, T> EncoderFactory<F, P> for T
where
    T: FnMut() -> anyhow::Result<Box<dyn Encode<F, P>>> + Send,
{
    fn open(&mut self) -> anyhow::Result<Box<dyn Encode<F, P>>> {
        self()
    }
}
