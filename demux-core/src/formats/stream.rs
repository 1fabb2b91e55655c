//! The per-stream state machine: the packet FIFO, the optional bitstream filter / packet parser
//! pipeline stages, and the write-side finalization steps.

use std::collections::VecDeque;

use bitflags::bitflags;

use crate::codecs::CodecParameters;
use crate::error::Result;
use crate::fourcc::FourCc;
use crate::metadata::MetadataMap;
use crate::packet::{Packet, PacketFlags, PACKET_PADDING};
use crate::parser::ParserSink;
use crate::units::{Duration, Timestamp};

/// Which kind of elementary content a stream carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
    Text,
    Overlay,
    Message,
}

/// What the caller wants done with a stream's packets, set before `Stream::start`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StreamAction {
    #[default]
    Mute,
    /// Accepted for API completeness; behaves identically to `Parse` since no decoder is bound
    /// anywhere in this workspace.
    Decode,
    Parse,
    ReadRaw,
    Init,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct StreamFlags: u32 {
        /// The demuxer will not produce any more packets for this stream.
        const EOF_C = 1 << 0;
        /// The consumer has drained everything the stream will ever produce.
        const EOF_D = 1 << 1;
        /// The source is discontinuous (subtitles, sparse text/overlay tracks).
        const DISCONT = 1 << 2;
        const HAS_DTS = 1 << 3;
        const DTS_ONLY = 1 << 4;
        const FILTER_PACKETS = 1 << 5;
        const DEMUXER_SETS_PTS_END = 1 << 6;
        const PARSE_FULL = 1 << 7;
        const PARSE_FRAME = 1 << 8;
        const STANDALONE = 1 << 9;
        const NEED_START_PTS = 1 << 10;
        const STARTED = 1 << 11;
        const WRITE_STARTED = 1 << 12;
        const HAVE_FRAME = 1 << 13;
        const EXTERN = 1 << 14;
    }
}

/// Running per-stream aggregates, updated by the pipeline on every written packet.
#[derive(Copy, Clone, Debug, Default)]
pub struct StreamStats {
    pub pts_start: Timestamp,
    pub pts_end: Timestamp,
    pub total_packets: u64,
    pub total_bytes: u64,
    pub duration_min: Duration,
    pub duration_max: Duration,
}

impl StreamStats {
    fn on_packet(&mut self, pkt: &Packet) {
        if self.total_packets == 0 {
            self.pts_start = pkt.pts;
            self.duration_min = pkt.dur;
            self.duration_max = pkt.dur;
        }
        else {
            if !pkt.dur.is_undefined() {
                self.duration_min = self.duration_min.min(pkt.dur);
                self.duration_max = if pkt.dur > self.duration_max { pkt.dur } else { self.duration_max };
            }
        }

        self.total_packets += 1;
        self.total_bytes += pkt.buf().len().saturating_sub(PACKET_PADDING) as u64;

        if let Some(end) = pkt.pts.checked_add(pkt.dur) {
            if self.pts_end.is_undefined() || end > self.pts_end {
                self.pts_end = end;
            }
        }
    }
}

/// An in-line transform that rewrites coded bytes without decoding (e.g. AVCC length-prefix to
/// Annex-B startcode).
pub trait BitstreamFilter: Send {
    fn filter(&mut self, packet: &mut Packet) -> Result<()>;
}

/// One elementary stream within a [`crate::formats::Track`].
pub struct Stream {
    pub stream_id: u32,
    pub kind: StreamKind,
    pub fourcc: Option<FourCc>,
    /// Container-level PTS units per second.
    pub timescale: u32,
    /// Decoder-output units per second (sample rate for audio, video timescale for video).
    pub sample_timescale: u32,
    pub action: StreamAction,
    pub flags: StreamFlags,
    pub stats: StreamStats,
    pub metadata: MetadataMap,
    pub codec_params: CodecParameters,

    packet_buffer: VecDeque<Packet>,
    parser: Option<ParserSink>,
    bitstream_filter: Option<Box<dyn BitstreamFilter>>,
    end_pts: Option<Timestamp>,
}

impl Stream {
    pub fn new(stream_id: u32, kind: StreamKind, codec_params: CodecParameters) -> Self {
        Stream {
            stream_id,
            kind,
            fourcc: None,
            timescale: 1,
            sample_timescale: 1,
            action: StreamAction::Mute,
            flags: StreamFlags::empty(),
            stats: StreamStats::default(),
            metadata: MetadataMap::new(),
            codec_params,
            packet_buffer: VecDeque::new(),
            parser: None,
            bitstream_filter: None,
            end_pts: None,
        }
    }

    pub fn set_parser(&mut self, parser: ParserSink) {
        self.parser = Some(parser);
    }

    pub fn set_bitstream_filter(&mut self, filter: Box<dyn BitstreamFilter>) {
        self.bitstream_filter = Some(filter);
        self.flags |= StreamFlags::FILTER_PACKETS;
    }

    pub fn set_end_pts(&mut self, end_pts: Timestamp) {
        self.end_pts = Some(end_pts);
    }

    /// Marks the stream active (`STARTED`). The parser and bitstream filter, if any, are
    /// installed separately via `set_parser`/`set_bitstream_filter` by the owning demuxer and run
    /// regardless of `action`; `action` itself only tells the caller how to treat a stream's
    /// output (decode, parse, pass through raw, or ignore) and which streams count toward
    /// `Track::is_eof`.
    pub fn start(&mut self) {
        self.flags |= StreamFlags::STARTED;
    }

    /// Feed one container-level chunk of data into this stream's pipeline: through the packet
    /// parser if one is installed (PARSE_FULL/PARSE_FRAME), otherwise appended to the buffer
    /// directly as a single packet.
    pub fn push_raw(&mut self, data: &[u8], container_pts: Timestamp, position: Option<u64>) -> Result<()> {
        if let Some(parser) = &mut self.parser {
            parser.push(data, container_pts, position, &mut self.codec_params)?;
            while let Some(pkt) = parser.pop() {
                self.write_packet(pkt);
            }
        }
        else {
            let pkt = crate::packet::PacketBuilder::default()
                .stream_id(self.stream_id)
                .pts(container_pts)
                .dur(Duration::ZERO)
                .data(data.to_vec())
                .build();
            self.write_packet(pkt);
        }
        Ok(())
    }

    /// Commit a fully parsed packet into the buffer, running the write-side finalization steps
    /// in order.
    pub fn write_packet(&mut self, mut pkt: Packet) {
        // Step 2: on the first write per start, publish sample/packet timescales on stream
        // metadata, so a consumer inspecting `metadata` before decoding any packet still sees
        // the units `pts`/`dur` are expressed in.
        if !self.flags.contains(StreamFlags::WRITE_STARTED) {
            self.metadata.set("timescale", self.timescale.to_string());
            self.metadata.set("sample_timescale", self.sample_timescale.to_string());
        }

        // Step 3: back-fill constant frame duration for video.
        if self.kind == StreamKind::Video {
            if let Some(video) = &self.codec_params.video {
                if video.framerate_mode == crate::codecs::FramerateMode::Constant
                    && pkt.dur == Duration::ZERO
                {
                    pkt.dur = Duration::new(video.frame_duration);
                }
            }
        }

        // Step 4: attach pending palette extradata exactly once.
        if self.kind == StreamKind::Video && pkt.extradata.is_none() {
            if let Some(video) = &mut self.codec_params.video {
                if let Some(palette) = video.palette.take() {
                    pkt.extradata = Some(palette);
                }
            }
        }

        // Step 6: DTS-only streams move pts into dts.
        if self.flags.contains(StreamFlags::DTS_ONLY) {
            pkt.dts = pkt.pts;
            pkt.pts = Timestamp::UNDEFINED;
        }

        if let Some(filter) = &mut self.bitstream_filter {
            let _ = filter.filter(&mut pkt);
        }

        self.stats.on_packet(&pkt);
        self.packet_buffer.push_back(pkt);
        self.flags |= StreamFlags::WRITE_STARTED;
    }

    /// Pull the next buffered packet, if any, without driving the owning demuxer.
    pub fn pop_buffered(&mut self) -> Option<Packet> {
        self.packet_buffer.pop_front()
    }

    pub fn buffered_len(&self) -> usize {
        self.packet_buffer.len()
    }

    pub fn is_eof(&self) -> bool {
        self.flags.contains(StreamFlags::EOF_D)
            || (self.flags.contains(StreamFlags::EOF_C) && self.packet_buffer.is_empty())
    }

    /// Signal that the demuxer will not produce any more packets for this stream: sets `EOF_C`
    /// and gives the installed parser (if any) one chance to emit a packet it was holding back
    /// (e.g. an MPEG-4 ASP packed-B-frame sideband slot) before the stream is considered drained.
    pub fn mark_eof(&mut self) {
        if let Some(parser) = &mut self.parser {
            if let Some(pkt) = parser.flush() {
                self.write_packet(pkt);
            }
        }
        self.flags |= StreamFlags::EOF_C;
    }

    /// Drop buffered packets, reset the parser, and clear sync flags.
    pub fn clear(&mut self) {
        self.packet_buffer.clear();
        if let Some(parser) = &mut self.parser {
            parser.reset();
        }
        self.flags.remove(StreamFlags::EOF_C | StreamFlags::EOF_D | StreamFlags::HAVE_FRAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::CodecId;

    #[test]
    fn verify_write_packet_moves_pts_to_dts_when_dts_only() {
        let mut s = Stream::new(1, StreamKind::Audio, CodecParameters::new(CodecId::Mp3));
        s.flags |= StreamFlags::DTS_ONLY;

        let pkt = crate::packet::PacketBuilder::default()
            .stream_id(1)
            .pts(Timestamp::new(42))
            .dur(Duration::new(10))
            .data(vec![0u8; 2])
            .build();

        s.write_packet(pkt);

        let out = s.pop_buffered().unwrap();
        assert_eq!(out.dts, Timestamp::new(42));
        assert!(out.pts.is_undefined());
    }

    #[test]
    fn verify_stats_track_pts_end() {
        let mut s = Stream::new(1, StreamKind::Audio, CodecParameters::new(CodecId::Mp3));
        for i in 0..3 {
            let pkt = crate::packet::PacketBuilder::default()
                .stream_id(1)
                .pts(Timestamp::new(i * 10))
                .dur(Duration::new(10))
                .data(vec![0u8; 2])
                .build();
            s.write_packet(pkt);
        }
        assert_eq!(s.stats.total_packets, 3);
        assert_eq!(s.stats.pts_end, Timestamp::new(30));
    }
}
