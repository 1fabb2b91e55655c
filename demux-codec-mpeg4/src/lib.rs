//! MPEG-4 ASP (Advanced Simple Profile) packet parsing: VOL header geometry/timing, VOP coding
//! type, and DivX-style packed-B-frame unpacking.
//!
//! Grounded on `lib/parse_mpeg4.c`/`lib/mpeg4_header.c`'s (DivX fourcc) handling and on the
//! MPEG-4 Visual (ISO/IEC 14496-2) VOL/VOP bitstream syntax.

use demux_bitstream::startcode::find_startcode;
use demux_bitstream::BitReaderLtr;
use demux_core::codecs::{CodecParameters, FramerateMode, VideoParams};
use demux_core::error::Result;
use demux_core::packet::{FrameType, Packet, PacketBuilder, PacketFlags};
use demux_core::parser::{FrameBuf, PacketParser};

const VOL_START_MIN: u8 = 0x20;
const VOL_START_MAX: u8 = 0x2F;
const VOP_START: u8 = 0xB6;

fn bits_for(value: u16) -> u32 {
    let mut n = 0u32;
    let mut v = 1u32;
    while v < value as u32 {
        v <<= 1;
        n += 1;
    }
    n.max(1)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VopCodingType {
    I,
    P,
    B,
    S,
}

fn vop_coding_type(bits: u32) -> VopCodingType {
    match bits {
        0 => VopCodingType::I,
        1 => VopCodingType::P,
        2 => VopCodingType::B,
        _ => VopCodingType::S,
    }
}

/// Result of scanning a packet's VOP start codes.
struct VopScan {
    /// Byte offset of each VOP start code (the `0x000001B6` marker's first byte).
    starts: Vec<usize>,
    coding_types: Vec<VopCodingType>,
    coded: Vec<bool>,
}

fn scan_vops(data: &[u8], vop_time_increment_resolution: u16) -> VopScan {
    let mut starts = Vec::new();
    let mut coding_types = Vec::new();
    let mut coded = Vec::new();

    let mut pos = 0usize;
    while let Some((after, len)) = find_startcode(data, pos) {
        let sc_start = after - len;
        if data[after] == VOP_START {
            starts.push(sc_start);
            let body = &data[after + 1..];
            let (ct, is_coded) = parse_vop_header(body, vop_time_increment_resolution);
            coding_types.push(ct);
            coded.push(is_coded);
        }
        pos = after;
        if pos >= data.len() {
            break;
        }
    }

    VopScan { starts, coding_types, coded }
}

fn parse_vop_header(body: &[u8], vop_time_increment_resolution: u16) -> (VopCodingType, bool) {
    let mut r = BitReaderLtr::new(body);
    let Some(ct_bits) = r.read_bits(2) else { return (VopCodingType::I, false) };
    let ct = vop_coding_type(ct_bits);

    // modulo_time_base: a run of 1-bits terminated by a 0-bit.
    loop {
        match r.read_bits(1) {
            Some(1) => continue,
            Some(_) => break,
            None => return (ct, false),
        }
    }
    let _marker = r.read_bits(1);
    let time_bits = bits_for(vop_time_increment_resolution.max(1));
    let _vop_time_increment = r.read_bits(time_bits);
    let _marker = r.read_bits(1);
    let coded = r.read_bits(1).map(|b| b != 0).unwrap_or(false);

    (ct, coded)
}

#[derive(Default)]
pub struct Mpeg4Parser {
    vop_time_increment_resolution: u16,
    /// A packed-B-frame held back across `parse_frame` calls    /// B-frame unpacking and its end-of-stream Open Question resolution.
    sideband_b: Option<Packet>,
}

impl Mpeg4Parser {
    pub fn new() -> Self {
        Mpeg4Parser::default()
    }

    fn parse_vol_header(&mut self, body: &[u8], ci: &mut CodecParameters) {
        let mut r = BitReaderLtr::new(body);
        let Some(_random_accessible) = r.read_bits(1) else { return };
        let Some(_video_object_type_indication) = r.read_bits(8) else { return };

        let Some(is_object_layer_identifier) = r.read_bits(1) else { return };
        if is_object_layer_identifier != 0 {
            let _ = r.read_bits(4); // video_object_layer_verid
            let _ = r.read_bits(3); // video_object_layer_priority
        }

        let Some(aspect_ratio_info) = r.read_bits(4) else { return };
        let mut par_width = 1u32;
        let mut par_height = 1u32;
        if aspect_ratio_info == 0xF {
            let Some(w) = r.read_bits(8) else { return };
            let Some(h) = r.read_bits(8) else { return };
            par_width = w;
            par_height = h;
        }

        let Some(vol_control_parameters) = r.read_bits(1) else { return };
        let mut low_delay = false;
        if vol_control_parameters != 0 {
            let _chroma_format = r.read_bits(2);
            let Some(ld) = r.read_bits(1) else { return };
            low_delay = ld != 0;
            let Some(vbv_parameters) = r.read_bits(1) else { return };
            if vbv_parameters != 0 {
                let _ = r.read_bits(15); // first_half_bit_rate
                let _ = r.read_bits(1); // marker
                let _ = r.read_bits(15); // latter_half_bit_rate
                let _ = r.read_bits(1); // marker
                let _ = r.read_bits(15); // first_half_vbv_buffer_size
                let _ = r.read_bits(1); // marker
                let _ = r.read_bits(3); // latter_half_vbv_buffer_size
                let _ = r.read_bits(11); // first_half_vbv_occupancy
                let _ = r.read_bits(1); // marker
                let _ = r.read_bits(15); // latter_half_vbv_occupancy
                let _ = r.read_bits(1); // marker
            }
        }

        let Some(video_object_layer_shape) = r.read_bits(2) else { return };
        let _ = r.read_bits(1); // marker_bit
        let Some(vop_time_increment_resolution) = r.read_bits(16) else { return };
        self.vop_time_increment_resolution = vop_time_increment_resolution as u16;
        let _ = r.read_bits(1); // marker_bit
        let Some(fixed_vop_rate) = r.read_bits(1) else { return };
        let mut frame_duration = 0u64;
        if fixed_vop_rate != 0 {
            let bits = bits_for((vop_time_increment_resolution as u16).max(1));
            if let Some(fixed_vop_time_increment) = r.read_bits(bits) {
                if vop_time_increment_resolution > 0 {
                    frame_duration = fixed_vop_time_increment as u64;
                }
            }
        }

        let mut video = VideoParams::default();
        if video_object_layer_shape == 0 {
            let Some(_marker) = r.read_bits(1) else { return };
            let Some(width) = r.read_bits(13) else { return };
            let Some(_marker) = r.read_bits(1) else { return };
            let Some(height) = r.read_bits(13) else { return };
            let Some(_marker) = r.read_bits(1) else { return };
            video.image_width = width;
            video.image_height = height;
            video.frame_width = width;
            video.frame_height = height;
        }

        video.pixel_width = par_width;
        video.pixel_height = par_height;
        // `frame_duration`/`timescale` are expressed in `vop_time_increment_resolution` ticks:
        // the demuxer that owns the stream's `timescale` field is expected to set it to this
        // resolution directly, so `frame_duration` here is already in the right unit.
        if frame_duration > 0 {
            video.frame_duration = frame_duration;
            video.framerate_mode = FramerateMode::Constant;
        }
        else {
            video.framerate_mode = FramerateMode::Variable;
        }

        ci.video = Some(video);
        if low_delay {
            ci.flags.remove(demux_core::codecs::CodecFlags::HAS_B_FRAMES);
        }
        else {
            ci.flags.insert(demux_core::codecs::CodecFlags::HAS_B_FRAMES);
        }
        ci.flags.insert(demux_core::codecs::CodecFlags::HAS_P_FRAMES);
    }
}

fn frame_type_of(ct: VopCodingType) -> FrameType {
    match ct {
        VopCodingType::I => FrameType::I,
        VopCodingType::P | VopCodingType::S => FrameType::P,
        VopCodingType::B => FrameType::B,
    }
}

impl PacketParser for Mpeg4Parser {
    fn find_frame_boundary(&mut self, buf: &FrameBuf<'_>, skip: &mut usize) -> Option<usize> {
        // Operates in `ParserMode::Frame`: the container already delivers one chunk per demuxer
        // read, which this parser re-labels/unpacks in `parse_frame`.
        *skip = 0;
        let _ = buf;
        None
    }

    fn parse_frame(&mut self, packet: &mut Packet, ci: &mut CodecParameters) -> Result<()> {
        let data = packet.buf().to_vec();

        let mut header_end = 0usize;
        let mut pos = 0usize;
        while let Some((after, len)) = find_startcode(&data, pos) {
            let sc_start = after - len;
            if (VOL_START_MIN..=VOL_START_MAX).contains(&data[after]) {
                self.parse_vol_header(&data[after + 1..], ci);
                header_end = header_end.max(sc_start);
            }
            pos = after;
            if pos >= data.len() {
                break;
            }
            if data[after] == VOP_START {
                break;
            }
        }
        if header_end > 0 {
            packet.header_size = header_end;
        }

        let scan = scan_vops(&data, self.vop_time_increment_resolution);

        if scan.starts.len() >= 2 {
            // Packed bitstream: [B_data, P/I_data]. Hold the B-frame back in the sideband and
            // rewrite this packet to contain only the trailing coded VOP.
            let b_start = scan.starts[0];
            let second_start = scan.starts[1];

            let b_bytes = data[b_start..second_start].to_vec();
            let sideband_pkt = PacketBuilder::default()
                .stream_id(packet.stream_id())
                .pts(packet.pts)
                .dur(packet.dur)
                .data(b_bytes)
                .frame_type(FrameType::B)
                .build();
            self.sideband_b = Some(sideband_pkt);

            let rest = data[second_start..].to_vec();
            let ct = scan.coding_types[1];
            *packet = PacketBuilder::default()
                .stream_id(packet.stream_id())
                .pts(packet.pts)
                .dts(packet.dts)
                .dur(packet.dur)
                .data(rest)
                .frame_type(frame_type_of(ct))
                .flags(if ct == VopCodingType::I { PacketFlags::KEYFRAME } else { PacketFlags::empty() })
                .build();
            return Ok(());
        }

        if scan.starts.len() == 1 && !scan.coded[0] {
            // Non-coded placeholder VOP: a held-back sideband B-frame belongs here.
            if let Some(sideband) = self.sideband_b.take() {
                *packet = sideband;
                return Ok(());
            }
            packet.flags |= PacketFlags::SKIP;
            packet.frame_type = FrameType::Unknown;
            return Ok(());
        }

        if let Some(&ct) = scan.coding_types.first() {
            packet.frame_type = frame_type_of(ct);
            if packet.frame_type == FrameType::I {
                packet.flags |= PacketFlags::KEYFRAME;
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.sideband_b = None;
    }

    fn flush(&mut self) -> Option<Packet> {
        self.sideband_b.take()
    }
}

#[allow(unused)]
fn codec_id() -> demux_core::codecs::CodecId {
    demux_core::codecs::CodecId::Mpeg4Asp
}
