use ffmpeg_next::{Dictionary, Rational};

use crate::{frame::VideoFrame, hw, packet::EncodedPacket};

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Preferred encoder; see [`hw::encoder_candidates`] for the fallbacks.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bit_rate: usize,
    pub gop_size: u32,
    pub max_b_frames: usize,
    pub pixel_format: ffmpeg_next::format::Pixel,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "h264_v4l2m2m".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: 30,
            bit_rate: 350_000,
            gop_size: 10,
            max_b_frames: 1,
            pixel_format: ffmpeg_next::format::Pixel::YUV420P,
        }
    }
}

pub struct Encoder {
    inner: ffmpeg_next::codec::encoder::Video,
    frame_index: i64,
}

unsafe impl Send for Encoder {}

impl Encoder {
    /// Opens the first encoder from the candidate list that accepts the
    /// settings.
    pub fn open(settings: &EncoderSettings) -> anyhow::Result<Self> {
        let time_base = Rational::new(1, settings.frame_rate.max(1) as i32);
        let mut last_error = None;

        for name in hw::encoder_candidates(&settings.codec) {
            let Some(codec) = ffmpeg_next::encoder::find_by_name(name) else {
                log::debug!("encoder {} not available", name);
                continue;
            };
            match Self::open_codec(codec, settings, time_base) {
                Ok(inner) => {
                    log::info!(
                        "{} encoder opened successfully: {}",
                        if hw::is_hardware(name) { "hardware" } else { "software" },
                        name
                    );
                    return Ok(Self {
                        inner,
                        frame_index: 0,
                    });
                }
                Err(e) => {
                    log::warn!("encoder {} failed to open: {}", name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => e.context("no usable encoder"),
            None => anyhow::anyhow!("no encoder found for {}", settings.codec),
        })
    }

    fn open_codec(
        codec: ffmpeg_next::Codec,
        settings: &EncoderSettings,
        time_base: Rational,
    ) -> anyhow::Result<ffmpeg_next::codec::encoder::Video> {
        let ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = ctx.encoder().video()?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(settings.pixel_format);
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(Rational::new(settings.frame_rate as i32, 1)));
        encoder.set_gop(settings.gop_size);
        encoder.set_max_b_frames(settings.max_b_frames);

        let mut opts = Dictionary::new();
        opts.set("preset", "veryfast");
        opts.set("tune", "zerolatency");
        Ok(encoder.open_with(opts)?)
    }

    /// Frames are stamped with a running index in the encoder's time base.
    pub fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), ffmpeg_next::Error> {
        let mut frame = frame.clone();
        frame.get_mut().set_pts(Some(self.frame_index));
        self.inner.send_frame(frame.as_video())?;
        self.frame_index += 1;
        Ok(())
    }

    pub fn receive_packet(&mut self) -> Result<Option<EncodedPacket>, ffmpeg_next::Error> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet.into())),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) if crate::is_again(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sends end of stream and collects every packet still buffered.
    pub fn flush(&mut self) -> anyhow::Result<Vec<EncodedPacket>> {
        self.inner.send_eof()?;
        let mut packets = Vec::new();
        while let Some(packet) = self.receive_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }
}
