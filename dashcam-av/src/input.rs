use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::Dictionary;

use crate::{packet::EncodedPacket, stream::AvStream};

/// How to open the capture device, e.g. `v4l2` on `/dev/video0` delivering
/// 1920x1080 MJPEG.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device: String,
    /// Input format name passed to `av_find_input_format`.
    pub format: String,
    /// Pixel format requested from the device (`input_format` option).
    pub pixel_format: String,
    pub video_size: String,
    pub frame_rate: u32,
}

impl CaptureSettings {
    fn options(&self) -> Dictionary<'static> {
        let mut options = Dictionary::new();
        options.set("input_format", &self.pixel_format);
        options.set("video_size", &self.video_size);
        options.set("framerate", &self.frame_rate.to_string());
        options
    }
}

pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    stream: AvStream,
}

// The format context is only touched by the thread that currently owns it.
unsafe impl Send for AvInput {}

impl AvInput {
    /// Resolve input format by name (e.g. "v4l2") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn open(settings: &CaptureSettings) -> anyhow::Result<Self> {
        use ffmpeg_next::format::format::Format;

        let format = Self::find_input_format(&settings.format)?;
        let ctx = ffmpeg_next::format::open_with(
            Path::new(&settings.device),
            &Format::Input(format),
            settings.options(),
        )
        .map_err(|e| anyhow::anyhow!("failed to open input device {}: {}", settings.device, e))?;
        let input = ctx.input();

        let video: Vec<AvStream> = input
            .streams()
            .map(AvStream::from)
            .filter(AvStream::is_video)
            .collect();
        let Some(stream) = video.first().cloned() else {
            anyhow::bail!("no video stream in input device {}", settings.device);
        };
        log::info!(
            "found {} suitable stream(s), choosing stream {} ({:?})",
            video.len(),
            stream.index(),
            stream.codec_id()
        );

        Ok(Self {
            inner: input,
            stream,
        })
    }

    pub fn stream(&self) -> &AvStream {
        &self.stream
    }

    /// Blocks until the device delivers the next packet of the chosen stream.
    pub fn read(&mut self) -> anyhow::Result<EncodedPacket> {
        loop {
            let mut packet = ffmpeg_next::codec::packet::Packet::empty();
            match packet.read(&mut self.inner) {
                Ok(()) if packet.stream() == self.stream.index() => {
                    return Ok(packet.into());
                }
                Ok(()) => continue,
                Err(ffmpeg_next::Error::Eof) => anyhow::bail!("end of input stream"),
                Err(e) => return Err(anyhow::anyhow!("failed to read packet: {}", e)),
            }
        }
    }
}
