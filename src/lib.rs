//! Loop recorder for an always-on dashcam.
//!
//! Frames flow from the capture device through five stage workers connected
//! by bounded channels and end up in size-capped recordings. When a recording
//! is full the [`orchestrator`] restarts the pipeline around a fresh file,
//! deleting the oldest recordings whenever the volume runs low.

#[cfg(feature = "ffmpeg")]
pub mod av;
pub mod channel;
pub mod codec;
pub mod config;
pub mod media;
pub mod orchestrator;
pub mod stage;
pub mod status;
pub mod storage;
