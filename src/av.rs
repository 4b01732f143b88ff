//! FFmpeg implementations of the codec seams.

use dashcam_av::decoder::Decoder;
use dashcam_av::encoder::{Encoder, EncoderSettings};
use dashcam_av::ffmpeg_next;
use dashcam_av::frame::VideoFrame;
use dashcam_av::input::{AvInput, CaptureSettings};
use dashcam_av::packet::EncodedPacket;
use dashcam_av::scaler::FormatConverter;

use crate::codec::{CaptureSource, CodecError, Decode, Encode, Filter};
use crate::config::DashcamConfig;
use crate::media::Payload;
use crate::orchestrator::Pipeline;

fn codec_error(error: ffmpeg_next::Error) -> CodecError {
    if dashcam_av::is_again(&error) {
        CodecError::Again
    } else {
        CodecError::Failed(error.into())
    }
}

impl Payload for EncodedPacket {
    fn data(&self) -> &[u8] {
        EncodedPacket::data(self)
    }

    fn size(&self) -> usize {
        EncodedPacket::size(self)
    }
}

impl CaptureSource<EncodedPacket> for AvInput {
    fn read_packet(&mut self) -> anyhow::Result<EncodedPacket> {
        self.read()
    }
}

impl Decode<EncodedPacket, VideoFrame> for Decoder {
    fn send_packet(&mut self, packet: &EncodedPacket) -> Result<(), CodecError> {
        Decoder::send_packet(self, packet).map_err(codec_error)
    }

    fn receive_frame(&mut self) -> Result<Option<VideoFrame>, CodecError> {
        Decoder::receive_frame(self).map_err(codec_error)
    }
}

impl Filter<VideoFrame> for FormatConverter {
    fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), CodecError> {
        Ok(FormatConverter::send_frame(self, frame)?)
    }

    fn receive_frame(&mut self) -> Result<Option<VideoFrame>, CodecError> {
        Ok(FormatConverter::receive_frame(self))
    }
}

impl Encode<VideoFrame, EncodedPacket> for Encoder {
    fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), CodecError> {
        Encoder::send_frame(self, frame).map_err(codec_error)
    }

    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>, CodecError> {
        Encoder::receive_packet(self).map_err(codec_error)
    }

    fn flush(&mut self) -> anyhow::Result<Vec<EncodedPacket>> {
        Encoder::flush(self)
    }
}

/// Opens the capture device and decoder and prepares the encoder factory.
/// The encoder itself is opened by the orchestrator, once per generation.
pub fn open_pipeline(
    config: &DashcamConfig,
) -> anyhow::Result<Pipeline<EncodedPacket, VideoFrame>> {
    let (width, height) = config
        .dimensions()
        .ok_or_else(|| anyhow::anyhow!("invalid video size {:?}", config.video_size))?;

    let input = AvInput::open(&CaptureSettings {
        device: config.device.clone(),
        format: config.input_format.clone(),
        pixel_format: config.pixel_format.clone(),
        video_size: config.video_size.clone(),
        frame_rate: config.frame_rate,
    })?;
    let decoder = Decoder::new(input.stream())?;

    let settings = EncoderSettings {
        codec: config.encoder.clone(),
        width,
        height,
        frame_rate: config.frame_rate,
        bit_rate: config.bit_rate,
        gop_size: config.gop_size,
        max_b_frames: config.max_b_frames,
        pixel_format: ffmpeg_next::format::Pixel::YUV420P,
    };
    let filter = FormatConverter::new(settings.pixel_format, width, height);
    let encoders = move || -> anyhow::Result<Box<dyn Encode<VideoFrame, EncodedPacket>>> {
        Ok(Box::new(Encoder::open(&settings)?))
    };

    Ok(Pipeline {
        source: Box::new(input),
        decoder: Box::new(decoder),
        filter: Some(Box::new(filter)),
        encoders: Box::new(encoders),
    })
}
