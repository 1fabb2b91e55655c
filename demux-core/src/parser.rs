//! The packet-parser framework: per-codec state machines that turn either a raw byte stream
//! (`ParserMode::Full`) or a container's own packets (`ParserMode::Frame`) into frame-granular
//! packets carrying `pts`, `duration`, `type`, and `keyframe`.

use std::collections::VecDeque;

use crate::codecs::CodecParameters;
use crate::error::Result;
use crate::packet::{Packet, PacketBuilder};
use crate::units::Timestamp;

/// Which of the two framework behaviors applies to a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParserMode {
    /// The input has no a priori packet boundaries (e.g. a raw MPEG elementary stream);
    /// `find_frame_boundary` is responsible for discovering them.
    Full,
    /// The input already arrives as discrete packets, but their boundaries may not coincide with
    /// frame boundaries, or they lack frame-type information.
    Frame,
}

/// A window onto the parser's rolling byte buffer, used by [`PacketParser::find_frame_boundary`].
pub struct FrameBuf<'a> {
    pub data: &'a [u8],
    pub pos: usize,
}

/// The four operations every per-codec packet parser implements.
pub trait PacketParser: Send {
    /// Scan `buf` starting at `buf.pos` for the start of the next frame. On success, return the
    /// boundary offset (to become the new `buf.pos`) and set `skip` to the number of bytes at the
    /// boundary that belong to the boundary marker itself (e.g. 4 for an MPEG startcode).
    ///
    /// Returns `Some(boundary)` only once a *complete* prior frame has been delimited.
    fn find_frame_boundary(&mut self, buf: &FrameBuf<'_>, skip: &mut usize) -> Option<usize>;

    /// Given a packet whose bytes are exactly one frame (plus padding), fill in its coding type,
    /// keyframe flag, duration, and `ci`. May set `header_size` on the packet if it begins with
    /// reusable codec-setup bytes that must be republished as `ci.codec_header`.
    fn parse_frame(&mut self, packet: &mut Packet, ci: &mut CodecParameters) -> Result<()>;

    /// Discard all sync state. Called after a seek.
    fn reset(&mut self);

    /// Release any per-parser scratch allocations. Most parsers need no special cleanup.
    fn cleanup(&mut self) {}

    /// Called once when the demuxer signals end-of-stream for this parser's stream. Most parsers
    /// have nothing held back and return `None`; a parser that holds a packet across calls (e.g.
    /// MPEG-4 ASP's packed-B-frame sideband slot) returns it here instead of dropping it.
    fn flush(&mut self) -> Option<Packet> {
        None
    }
}

/// Wraps a [`PacketParser`] with the rolling-buffer bookkeeping needed to turn either a raw byte
/// stream or a container's native packets into frame-granular output packets.
pub struct ParserSink {
    mode: ParserMode,
    parser: Box<dyn PacketParser>,
    stream_id: u32,
    /// Rolling byte buffer for `ParserMode::Full`.
    buf: Vec<u8>,
    /// `(source_position, container_pts, size)` for each input chunk currently covered by `buf`.
    coverage: VecDeque<(Option<u64>, Timestamp, usize)>,
    pending_skip: usize,
    emitted_codec_header: bool,
    out: VecDeque<Packet>,
}

impl ParserSink {
    pub fn new(mode: ParserMode, parser: Box<dyn PacketParser>, stream_id: u32) -> Self {
        ParserSink {
            mode,
            parser,
            stream_id,
            buf: Vec::new(),
            coverage: VecDeque::new(),
            pending_skip: 0,
            emitted_codec_header: false,
            out: VecDeque::new(),
        }
    }

    /// Feed one input chunk (either a raw byte slice in `Full` mode, or one container packet's
    /// payload in `Frame` mode, with its container-level PTS) into the parser. Fully parsed
    /// output packets are appended to the internal queue; call [`ParserSink::pop`] to drain it.
    pub fn push(&mut self, data: &[u8], container_pts: Timestamp, position: Option<u64>, ci: &mut CodecParameters) -> Result<()> {
        match self.mode {
            ParserMode::Full => self.push_full(data, container_pts, position, ci),
            ParserMode::Frame => self.push_frame(data, container_pts, position, ci),
        }
    }

    fn push_full(&mut self, data: &[u8], container_pts: Timestamp, position: Option<u64>, ci: &mut CodecParameters) -> Result<()> {
        self.coverage.push_back((position, container_pts, data.len()));
        self.buf.extend_from_slice(data);

        loop {
            let buf_view = FrameBuf { data: &self.buf, pos: self.pending_skip };
            let mut skip = 0usize;

            let Some(boundary) = self.parser.find_frame_boundary(&buf_view, &mut skip) else {
                break;
            };

            if boundary <= self.pending_skip {
                break;
            }

            let frame_bytes: Vec<u8> = self.buf[self.pending_skip..boundary].to_vec();
            let (first_pts, first_pos) = self.pts_for_range(self.pending_skip, boundary);

            self.emit_frame(frame_bytes, first_pts, first_pos, ci)?;

            self.buf.drain(..boundary);
            self.shift_coverage(boundary);
            self.pending_skip = skip;
        }

        Ok(())
    }

    fn push_frame(&mut self, data: &[u8], container_pts: Timestamp, position: Option<u64>, ci: &mut CodecParameters) -> Result<()> {
        self.emit_frame(data.to_vec(), container_pts, position, ci)
    }

    fn emit_frame(&mut self, bytes: Vec<u8>, pts: Timestamp, position: Option<u64>, ci: &mut CodecParameters) -> Result<()> {
        let mut pkt = PacketBuilder::default()
            .stream_id(self.stream_id)
            .pts(pts)
            .dur(crate::units::Duration::ZERO)
            .data(bytes)
            .build();

        if let Some(pos) = position {
            pkt.position = Some(pos);
        }
        pkt.pes_pts = pts;

        self.parser.parse_frame(&mut pkt, ci)?;

        if pkt.header_size > 0 && !self.emitted_codec_header {
            ci.codec_header = Some(pkt.buf()[..pkt.header_size].to_vec().into_boxed_slice());
            self.emitted_codec_header = true;
        }
        else if self.emitted_codec_header {
            pkt.header_size = 0;
        }

        self.out.push_back(pkt);
        Ok(())
    }

    /// Consume the coverage ledger for `consumed` bytes, returning the PTS and source position of
    /// whichever input chunk contributed the *first* byte of that range.
    fn pts_for_range(&self, _start: usize, _end: usize) -> (Timestamp, Option<u64>) {
        self.coverage.front().map(|(pos, pts, _)| (*pts, *pos)).unwrap_or((Timestamp::UNDEFINED, None))
    }

    fn shift_coverage(&mut self, consumed: usize) {
        let mut remaining = consumed;
        while remaining > 0 {
            let Some((pos, pts, size)) = self.coverage.front_mut() else { break };
            if *size <= remaining {
                remaining -= *size;
                self.coverage.pop_front();
            }
            else {
                *size -= remaining;
                // Once partially consumed, later emissions no longer start here.
                let _ = (pos, pts);
                remaining = 0;
            }
        }
    }

    pub fn pop(&mut self) -> Option<Packet> {
        self.out.pop_front()
    }

    /// Ask the underlying parser for any packet it is holding back (the packed-B-frame
    /// end-of-stream case), to be called once at end-of-stream.
    pub fn flush(&mut self) -> Option<Packet> {
        self.parser.flush()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.coverage.clear();
        self.pending_skip = 0;
        self.out.clear();
        self.parser.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::CodecId;
    use crate::units::Duration;

    /// A trivial parser that treats every 4-byte chunk prefixed with `0xFF 0xD8` as a frame
    /// boundary, used only to exercise `ParserSink`'s bookkeeping.
    struct ToyParser;

    impl PacketParser for ToyParser {
        fn find_frame_boundary(&mut self, buf: &FrameBuf<'_>, skip: &mut usize) -> Option<usize> {
            let data = &buf.data[buf.pos..];
            *skip = 2;
            data.windows(2).position(|w| w == [0xFF, 0xD8]).map(|p| buf.pos + p + 2)
        }

        fn parse_frame(&mut self, packet: &mut Packet, _ci: &mut CodecParameters) -> Result<()> {
            packet.dur = Duration::new(1);
            Ok(())
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn verify_full_mode_emits_on_boundary() {
        let mut sink = ParserSink::new(ParserMode::Full, Box::new(ToyParser), 7);
        let mut ci = CodecParameters::new(CodecId::Mp3);

        sink.push(&[0x00, 0x00, 0xFF, 0xD8, 0x01, 0x02], Timestamp::ZERO, Some(0), &mut ci).unwrap();

        let pkt = sink.pop().expect("one frame should have been emitted");
        assert_eq!(pkt.stream_id(), 7);
        assert_eq!(pkt.buf().len(), 4 + crate::packet::PACKET_PADDING);
    }
}
