//! Converts AVCC length-prefixed NAL units (as stored in an MP4 `avc1` sample) into Annex-B
//! startcode-delimited NAL units, for consumers that want a raw elementary-stream-compatible
//! payload (`StreamAction::ReadRaw`).

use demux_core::error::Result;
use demux_core::formats::stream::BitstreamFilter;
use demux_core::packet::Packet;

use crate::nal;

pub struct AvccToAnnexBFilter {
    nal_length_size: u8,
}

impl AvccToAnnexBFilter {
    pub fn new(nal_length_size: u8) -> Self {
        AvccToAnnexBFilter { nal_length_size }
    }
}

impl BitstreamFilter for AvccToAnnexBFilter {
    fn filter(&mut self, packet: &mut Packet) -> Result<()> {
        let data = packet.buf().to_vec();
        let nals = nal::iter_avcc(&data, self.nal_length_size);

        let mut out = Vec::with_capacity(data.len() + nals.len() * 4);
        for n in &nals {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(&data[n.start - 1..n.end]);
        }

        *packet = demux_core::packet::PacketBuilder::default()
            .stream_id(packet.stream_id())
            .pts(packet.pts)
            .dts(packet.dts)
            .dur(packet.dur)
            .data(out)
            .flags(packet.flags)
            .frame_type(packet.frame_type)
            .build();

        Ok(())
    }
}
