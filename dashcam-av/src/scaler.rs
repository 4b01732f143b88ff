use std::collections::VecDeque;

use crate::frame::VideoFrame;

pub struct Scaler {
    context: ffmpeg_next::software::scaling::Context,
}

impl Scaler {
    pub fn new(context: ffmpeg_next::software::scaling::Context) -> Self {
        Self { context }
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> anyhow::Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}

/// Converts decoded frames to the encoder's pixel format and size. The
/// scaling context is built from the first frame; frames that already match
/// pass through untouched.
pub struct FormatConverter {
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
    scaler: Option<Scaler>,
    pending: VecDeque<VideoFrame>,
}

impl FormatConverter {
    pub fn new(format: ffmpeg_next::format::Pixel, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            scaler: None,
            pending: VecDeque::new(),
        }
    }

    pub fn send_frame(&mut self, frame: &VideoFrame) -> anyhow::Result<()> {
        if frame.format() == self.format
            && frame.width() == self.width
            && frame.height() == self.height
        {
            self.pending.push_back(frame.clone());
            return Ok(());
        }

        let scaler = match &mut self.scaler {
            Some(scaler) => scaler,
            None => {
                log::info!(
                    "converting {:?} {}x{} to {:?} {}x{}",
                    frame.format(),
                    frame.width(),
                    frame.height(),
                    self.format,
                    self.width,
                    self.height
                );
                self.scaler.insert(Scaler::new(ffmpeg_next::software::scaling::Context::get(
                    frame.format(),
                    frame.width(),
                    frame.height(),
                    self.format,
                    self.width,
                    self.height,
                    ffmpeg_next::software::scaling::flag::Flags::BILINEAR,
                )?))
            }
        };

        let mut converted = ffmpeg_next::frame::Video::empty();
        scaler.run(frame.as_video(), &mut converted)?;
        converted.set_pts(frame.pts());
        self.pending.push_back(converted.into());
        Ok(())
    }

    pub fn receive_frame(&mut self) -> Option<VideoFrame> {
        self.pending.pop_front()
    }
}
