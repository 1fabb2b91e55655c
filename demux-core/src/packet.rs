//! The `Packet` type: a discrete unit of coded bytes with precise timing, carried from a demuxer
//! through the packet-parser framework to the caller.

use bitflags::bitflags;

use crate::units::{Duration, Timestamp};

/// Zero-byte padding appended to every packet's payload so codec bitstream readers that
/// over-read by a few bytes (common in exp-Golomb / bit-level parsers) never read uninitialized
/// memory.
pub const PACKET_PADDING: usize = 8;

/// The coding type of a single picture/frame, when known.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Unknown,
    I,
    P,
    B,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct PacketFlags: u32 {
        /// The packet decodes without reference to any other packet.
        const KEYFRAME  = 1 << 0;
        /// The packet is referenced by a later packet (relevant for open-GOP B-frames).
        const REFERENCE = 1 << 1;
        /// This is the last packet the source will ever produce for this stream.
        const LAST      = 1 << 2;
        /// The packet carries a single interlaced field rather than a full frame.
        const FIELD_PIC = 1 << 3;
        /// The packet should be decoded but not presented (e.g. seek preroll).
        const NO_OUTPUT = 1 << 4;
        /// The packet should be discarded without decoding.
        const SKIP      = 1 << 5;
    }
}

/// An axis-aligned rectangle, used for the source/destination placement of overlay packets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Interlacing mode of a single packet's payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum InterlaceMode {
    #[default]
    Unknown,
    Progressive,
    TopFieldFirst,
    BottomFieldFirst,
}

/// A discrete amount of encoded data for a single elementary stream.
///
/// `dur` must only ever cover *valid* (presented) frames while encoder delay/padding is carried
/// separately via `trim_start`/`trim_end`.
#[derive(Clone, Debug)]
pub struct Packet {
    stream_id: u32,
    /// Source byte offset of the first byte that produced this packet, or `None` if unknown.
    pub position: Option<u64>,
    pub pts: Timestamp,
    pub dts: Timestamp,
    pub dur: Duration,
    /// Container-level PTS prior to parser refinement; may differ from `pts` after a packet
    /// parser recomputes presentation order (e.g. B-frame reordering).
    pub pes_pts: Timestamp,
    pub trim_start: Duration,
    pub trim_end: Duration,
    pub flags: PacketFlags,
    pub frame_type: FrameType,
    /// Leading bytes of `data` that are codec-setup-only (e.g. SPS/PPS) and not sample data.
    pub header_size: usize,
    /// Offset within `data` where a trailing sequence-end marker begins, if any.
    pub sequence_end_pos: Option<usize>,
    pub interlace_mode: InterlaceMode,
    pub src_rect: Option<Rect>,
    pub dst_x: i32,
    pub dst_y: i32,
    /// Ancillary data such as a palette, not part of the coded bitstream itself.
    pub extradata: Option<Box<[u8]>>,
    pub timecode: Option<u64>,
    data: Box<[u8]>,
}

impl Packet {
    /// Create a new, untrimmed packet with no flags or extra metadata set.
    pub fn new(stream_id: u32, pts: Timestamp, dur: Duration, data: impl Into<Box<[u8]>>) -> Self {
        let mut data = data.into();
        pad_packet(&mut data);

        Packet {
            stream_id,
            position: None,
            pts,
            dts: pts,
            dur,
            pes_pts: pts,
            trim_start: Duration::ZERO,
            trim_end: Duration::ZERO,
            flags: PacketFlags::empty(),
            frame_type: FrameType::Unknown,
            header_size: 0,
            sequence_end_pos: None,
            interlace_mode: InterlaceMode::Unknown,
            src_rect: None,
            dst_x: 0,
            dst_y: 0,
            extradata: None,
            timecode: None,
            data,
        }
    }

    #[inline]
    pub const fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Duration of all *decoded* frames, including any trimmed delay/padding.
    #[inline]
    pub const fn block_dur(&self) -> Duration {
        self.dur.saturating_add(self.trim_start).saturating_add(self.trim_end)
    }

    #[inline]
    pub fn buf(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub const fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }
}

/// Zero-pads a packet payload to `PACKET_PADDING` bytes of trailing slack.4
/// step 5.
fn pad_packet(data: &mut Box<[u8]>) {
    let mut padded = vec![0u8; data.len() + PACKET_PADDING];
    padded[..data.len()].copy_from_slice(data);
    *data = padded.into_boxed_slice();
}

mod builder {
    use super::{pad_packet, FrameType, InterlaceMode, Packet, PacketFlags};
    use crate::units::{Duration, Timestamp};

    pub struct HasStreamId(u32);
    pub struct NoStreamId;

    pub struct HasPts(Timestamp);
    pub struct NoPts;

    pub struct HasDur(Duration);
    pub struct NoDur;

    pub struct HasBuf(Box<[u8]>);
    pub struct NoBuf;

    /// A builder for [`Packet`]s, grounded on symphonia-core's typestate `PacketBuilder`.
    ///
    /// The stream ID, PTS, duration, and data fields are mandatory and must be provided before a
    /// packet can be built; the remaining fields default sensibly.
    pub struct PacketBuilder<S, P, D, B> {
        stream_id: S,
        pts: P,
        dur: D,
        buf: B,
        dts: Option<Timestamp>,
        trim_start: Duration,
        trim_end: Duration,
        flags: PacketFlags,
        frame_type: FrameType,
        position: Option<u64>,
        interlace_mode: InterlaceMode,
    }

    impl Default for PacketBuilder<NoStreamId, NoPts, NoDur, NoBuf> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl PacketBuilder<NoStreamId, NoPts, NoDur, NoBuf> {
        pub fn new() -> Self {
            PacketBuilder {
                stream_id: NoStreamId,
                pts: NoPts,
                dur: NoDur,
                buf: NoBuf,
                dts: None,
                trim_start: Duration::ZERO,
                trim_end: Duration::ZERO,
                flags: PacketFlags::empty(),
                frame_type: FrameType::Unknown,
                position: None,
                interlace_mode: InterlaceMode::Unknown,
            }
        }
    }

    impl PacketBuilder<HasStreamId, HasPts, HasDur, HasBuf> {
        pub fn build(self) -> Packet {
            let mut data = self.buf.0;
            pad_packet(&mut data);

            Packet {
                stream_id: self.stream_id.0,
                position: self.position,
                pts: self.pts.0,
                dts: self.dts.unwrap_or(self.pts.0),
                dur: self.dur.0,
                pes_pts: self.pts.0,
                trim_start: self.trim_start,
                trim_end: self.trim_end,
                flags: self.flags,
                frame_type: self.frame_type,
                header_size: 0,
                sequence_end_pos: None,
                interlace_mode: self.interlace_mode,
                src_rect: None,
                dst_x: 0,
                dst_y: 0,
                extradata: None,
                timecode: None,
                data,
            }
        }
    }

    impl<S, B> PacketBuilder<S, HasPts, NoDur, B> {
        /// Provide the packet's full decoded-block duration and derive `dur`/`trim_start`/
        /// `trim_end` from it: frames with negative PTS are trimmed from the start, and frames
        /// past `end_pts` (if known) are trimmed from the end.
        pub fn trimmed_dur(
            self,
            block_dur: Duration,
            end_pts: Option<Timestamp>,
        ) -> PacketBuilder<S, HasPts, HasDur, B> {
            let negative = self.pts.0.duration_to(Timestamp::ZERO).unwrap_or(Duration::ZERO);
            let trim_start = negative.min(block_dur);

            let mut trim_end = Duration::ZERO;
            if let Some(end_pts) = end_pts {
                if let Some(pkt_end_pts) = self.pts.0.checked_add(block_dur) {
                    trim_end = pkt_end_pts.duration_from(end_pts).unwrap_or(Duration::ZERO);
                }
            }

            let dur = block_dur.saturating_sub(trim_start).saturating_sub(trim_end);

            PacketBuilder {
                stream_id: self.stream_id,
                pts: self.pts,
                dur: HasDur(dur),
                buf: self.buf,
                dts: self.dts,
                trim_start,
                trim_end,
                flags: self.flags,
                frame_type: self.frame_type,
                position: self.position,
                interlace_mode: self.interlace_mode,
            }
        }
    }

    impl<S, P, B> PacketBuilder<S, P, NoDur, B> {
        pub fn dur(self, dur: Duration) -> PacketBuilder<S, P, HasDur, B> {
            PacketBuilder {
                stream_id: self.stream_id,
                pts: self.pts,
                dur: HasDur(dur),
                buf: self.buf,
                dts: self.dts,
                trim_start: self.trim_start,
                trim_end: self.trim_end,
                flags: self.flags,
                frame_type: self.frame_type,
                position: self.position,
                interlace_mode: self.interlace_mode,
            }
        }
    }

    impl<S, P, D, B> PacketBuilder<S, P, D, B> {
        pub fn stream_id(self, stream_id: u32) -> PacketBuilder<HasStreamId, P, D, B> {
            PacketBuilder {
                stream_id: HasStreamId(stream_id),
                pts: self.pts,
                dur: self.dur,
                buf: self.buf,
                dts: self.dts,
                trim_start: self.trim_start,
                trim_end: self.trim_end,
                flags: self.flags,
                frame_type: self.frame_type,
                position: self.position,
                interlace_mode: self.interlace_mode,
            }
        }

        pub fn pts(self, pts: Timestamp) -> PacketBuilder<S, HasPts, D, B> {
            PacketBuilder {
                stream_id: self.stream_id,
                pts: HasPts(pts),
                dur: self.dur,
                buf: self.buf,
                dts: self.dts,
                trim_start: self.trim_start,
                trim_end: self.trim_end,
                flags: self.flags,
                frame_type: self.frame_type,
                position: self.position,
                interlace_mode: self.interlace_mode,
            }
        }

        pub fn data(self, buf: impl Into<Box<[u8]>>) -> PacketBuilder<S, P, D, HasBuf> {
            PacketBuilder {
                stream_id: self.stream_id,
                pts: self.pts,
                dur: self.dur,
                buf: HasBuf(buf.into()),
                dts: self.dts,
                trim_start: self.trim_start,
                trim_end: self.trim_end,
                flags: self.flags,
                frame_type: self.frame_type,
                position: self.position,
                interlace_mode: self.interlace_mode,
            }
        }

        pub fn dts(mut self, dts: Timestamp) -> Self {
            self.dts = Some(dts);
            self
        }

        pub fn position(mut self, position: u64) -> Self {
            self.position = Some(position);
            self
        }

        pub fn flags(mut self, flags: PacketFlags) -> Self {
            self.flags = flags;
            self
        }

        pub fn frame_type(mut self, frame_type: FrameType) -> Self {
            self.frame_type = frame_type;
            // Keyframe promotion: an I frame is, by definition, a keyframe.
            if frame_type == FrameType::I {
                self.flags |= PacketFlags::KEYFRAME;
            }
            self
        }

        pub fn interlace_mode(mut self, mode: InterlaceMode) -> Self {
            self.interlace_mode = mode;
            self
        }
    }
}

pub use builder::PacketBuilder;
