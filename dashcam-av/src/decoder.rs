use crate::{frame::VideoFrame, packet::EncodedPacket, stream::AvStream};

pub struct Decoder {
    inner: ffmpeg_next::codec::decoder::Video,
}

unsafe impl Send for Decoder {}

impl Decoder {
    pub fn new(stream: &AvStream) -> anyhow::Result<Self> {
        let mut decoder_ctx =
            ffmpeg_next::codec::Context::from_parameters(stream.parameters().clone())?;
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
            // Raw v4l2 frames carry no pixel format of their own.
            if stream.codec_id() == ffmpeg_next::codec::Id::RAWVIDEO {
                (*decoder_ctx.as_mut_ptr()).pix_fmt = ffmpeg_next::format::Pixel::YUYV422.into();
            }
        }

        let video_decoder = decoder_ctx.decoder().video()?;
        if video_decoder.width() == 0 || video_decoder.height() == 0 {
            return Err(anyhow::anyhow!("missing codec parameters"));
        }
        log::info!(
            "decoder opened: {:?} {}x{}",
            stream.codec_id(),
            video_decoder.width(),
            video_decoder.height()
        );

        Ok(Self { inner: video_decoder })
    }

    pub fn send_packet(&mut self, packet: &EncodedPacket) -> Result<(), ffmpeg_next::Error> {
        self.inner.send_packet(packet.packet())
    }

    pub fn receive_frame(&mut self) -> Result<Option<VideoFrame>, ffmpeg_next::Error> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.inner.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(VideoFrame::from(frame))),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) if crate::is_again(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
