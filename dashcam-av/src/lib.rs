//! FFmpeg side of the recorder: the v4l2 capture device, the decoder, the
//! pixel format converter and the H.264 encoder.
//!
//! Every type here is driven from a single pipeline thread at a time and is
//! blocking. Receive calls fold "needs more input" and end of stream into
//! `Ok(None)`; send calls hand back the raw [`ffmpeg_next::Error`] so callers
//! can tell a busy codec apart with [`is_again`].

pub use ffmpeg_next;

pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod hw;
pub mod input;
pub mod packet;
pub mod scaler;
pub mod stream;

/// Registers FFmpeg formats and capture devices. Call once at startup before
/// opening the v4l2 input.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::device::register_all();
    Ok(())
}

/// Whether `error` is FFmpeg's "resource temporarily unavailable".
pub fn is_again(error: &ffmpeg_next::Error) -> bool {
    matches!(error, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}
