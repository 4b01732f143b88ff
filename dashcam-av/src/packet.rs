use ffmpeg_next::codec::packet::Packet;

/// A compressed unit: either an MJPEG frame from the camera or an H.264
/// packet from the encoder.
pub struct EncodedPacket {
    packet: Packet,
}

impl EncodedPacket {
    pub fn data(&self) -> &[u8] {
        self.packet.data().unwrap_or(&[])
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }
}

impl From<Packet> for EncodedPacket {
    fn from(packet: Packet) -> Self {
        Self { packet }
    }
}
