//! MPEG-1/2 video packet parsing: a state machine over sequence/sequence-extension/GOP/picture/
//! picture-coding-extension/slice/sequence-end startcodes, delimiting frame boundaries at picture
//! or sequence headers seen while priorly in `slice` state.
//!
//! Grounded on `lib/parse_mpv.c`'s header tables (aspect ratio, frame
//! rate, D10 fourcc handling) and on the MPEG-1 (ISO/IEC 11172-2) and MPEG-2 (ISO/IEC 13818-2)
//! bitstream syntax that file reads.

use demux_bitstream::startcode::find_startcode;
use demux_bitstream::BitReaderLtr;
use demux_core::codecs::{CodecFlags, CodecParameters, FramerateMode, VideoParams};
use demux_core::error::Result;
use demux_core::packet::{FrameType, Packet, PacketFlags};
use demux_core::parser::{FrameBuf, PacketParser};
use demux_core::units::Duration;

const PICTURE_START: u8 = 0x00;
const USER_DATA_START: u8 = 0xB2;
const SEQUENCE_HEADER: u8 = 0xB3;
const SEQUENCE_ERROR: u8 = 0xB4;
const EXTENSION_START: u8 = 0xB5;
const SEQUENCE_END: u8 = 0xB7;
const GROUP_START: u8 = 0xB8;

const EXT_SEQUENCE: u32 = 1;
const EXT_PICTURE_CODING: u32 = 8;

/// Frames-per-second as `(numerator, denominator)` for `frame_rate_code` 1..=8.
const FRAME_RATE_TABLE: [(u32, u32); 8] = [
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
];

/// Nominal tick rate used to express `VideoParams::frame_duration`: the 90 kHz clock MPEG
/// containers (program stream, transport stream) conventionally use for PTS/DTS.
const TICKS_PER_SECOND: u64 = 90_000;

/// MPEG-2 `aspect_ratio_information` is a *display* aspect ratio, not a pixel aspect ratio;
/// `(num, den)` pairs here are DAR, converted to pixel aspect using picture geometry in
/// [`Mpeg12Parser::apply_aspect_ratio`].
const MPEG2_DAR_TABLE: [(u32, u32); 4] = [(1, 1), (4, 3), (16, 9), (221, 100)];

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a.max(1)
    }
    else {
        gcd(b, a % b)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Initial,
    Sequence,
    Picture,
    Slice,
}

pub struct Mpeg12Parser {
    state: State,
    is_mpeg2: bool,
    pic_width: u32,
    pic_height: u32,
    have_geometry: bool,
    d10_fourcc: Option<&'static str>,
}

impl Mpeg12Parser {
    pub fn new() -> Self {
        Mpeg12Parser {
            state: State::Initial,
            is_mpeg2: false,
            pic_width: 0,
            pic_height: 0,
            have_geometry: false,
            d10_fourcc: None,
        }
    }

    /// D10 (IMX) streams signal their fixed bitrate and field order via a container-level
    /// fourcc rather than the bitstream itself; the demuxer that owns that fourcc should call
    /// this before the first `parse_frame`.
    pub fn with_d10_fourcc(mut self, fourcc: &'static str) -> Self {
        self.d10_fourcc = Some(fourcc);
        self
    }
}

impl Default for Mpeg12Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn startcode_at(data: &[u8], pos: usize) -> Option<(usize, u8)> {
    let (after, len) = find_startcode(data, pos)?;
    let code_byte = *data.get(after)?;
    Some((after - len, code_byte))
}

impl PacketParser for Mpeg12Parser {
    fn find_frame_boundary(&mut self, buf: &FrameBuf<'_>, skip: &mut usize) -> Option<usize> {
        *skip = 4;
        let mut pos = buf.pos;

        loop {
            let (sc_start, code) = startcode_at(buf.data, pos)?;

            let was_slice = self.state == State::Slice;
            match code {
                PICTURE_START => self.state = State::Picture,
                SEQUENCE_HEADER | GROUP_START => self.state = State::Sequence,
                0x01..=0xAF => self.state = State::Slice,
                SEQUENCE_END => {
                    // A standalone sequence_end belongs to the previous picture as a trailing
                    // marker rather than starting a new frame; treat it as part of the prior
                    // frame and keep scanning.
                    pos = sc_start + 4;
                    continue;
                }
                _ => {}
            }

            if was_slice && matches!(code, PICTURE_START | SEQUENCE_HEADER | GROUP_START) {
                if sc_start > buf.pos {
                    return Some(sc_start);
                }
            }

            pos = sc_start + 4;
        }
    }

    fn parse_frame(&mut self, packet: &mut Packet, ci: &mut CodecParameters) -> Result<()> {
        let data = packet.buf();
        let mut pos = 0usize;
        let mut coding_type = 0u8;
        let mut header_end = 0usize;

        while let Some((after, len)) = find_startcode(data, pos) {
            let sc_start = after - len;
            let code = data[after];
            let body = &data[after + 1..];

            match code {
                SEQUENCE_HEADER => {
                    self.parse_sequence_header(body, ci);
                    header_end = sc_start.max(header_end);
                }
                EXTENSION_START => {
                    self.parse_extension(body, ci);
                }
                PICTURE_START => {
                    if let Some(ct) = parse_picture_coding_type(body) {
                        coding_type = ct;
                    }
                }
                SEQUENCE_END => {
                    packet.sequence_end_pos = Some(sc_start);
                }
                _ => {}
            }

            pos = after;
            if pos >= data.len() {
                break;
            }
        }

        packet.frame_type = match coding_type {
            1 => FrameType::I,
            2 => FrameType::P,
            3 => FrameType::B,
            _ => FrameType::Unknown,
        };
        if packet.frame_type == FrameType::I {
            packet.flags |= PacketFlags::KEYFRAME;
        }
        if header_end > 0 {
            packet.header_size = header_end;
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.state = State::Initial;
    }
}

impl Mpeg12Parser {
    fn parse_sequence_header(&mut self, body: &[u8], ci: &mut CodecParameters) {
        let mut r = BitReaderLtr::new(body);
        let Some(horizontal) = r.read_bits(12) else { return };
        let Some(vertical) = r.read_bits(12) else { return };
        let Some(aspect_ratio_information) = r.read_bits(4) else { return };
        let Some(frame_rate_code) = r.read_bits(4) else { return };
        let Some(bit_rate_value) = r.read_bits(18) else { return };
        let _marker = r.read_bits(1);
        let Some(vbv_buffer_size_value) = r.read_bits(10) else { return };

        self.pic_width = horizontal;
        self.pic_height = vertical;
        self.have_geometry = true;

        let mut video = VideoParams {
            image_width: horizontal,
            image_height: vertical,
            frame_width: horizontal,
            frame_height: vertical,
            ..Default::default()
        };

        if let Some(&(num, den)) = FRAME_RATE_TABLE.get(frame_rate_code.saturating_sub(1) as usize) {
            video.frame_duration = (TICKS_PER_SECOND * den as u64) / num as u64;
            video.framerate_mode = FramerateMode::Constant;
        }

        self.apply_aspect_ratio(aspect_ratio_information, &mut video);

        ci.video = Some(video);
        ci.bitrate = Some(bit_rate_value * 400).filter(|b| *b > 0);
        ci.video_buffer_size = Some(vbv_buffer_size_value * 2048);

        if let Some(fourcc) = self.d10_fourcc {
            if fourcc.starts_with("mx") || fourcc.starts_with('n') {
                ci.flags.remove(CodecFlags::HAS_P_FRAMES);
                ci.flags.remove(CodecFlags::HAS_B_FRAMES);
                if let Some(v) = ci.video.as_mut() {
                    v.interlaced = true;
                }
            }
        }
    }

    fn apply_aspect_ratio(&self, aspect_ratio_information: u32, video: &mut VideoParams) {
        if !self.is_mpeg2 {
            // MPEG-1's `pel_aspect_ratio` table is a direct pixel aspect ratio; this workspace's
            // scope covers MPEG-2 transport-stream video, so MPEG-1 streams fall back to square
            // pixels rather than reimplementing the 14-entry table.
            video.pixel_width = 1;
            video.pixel_height = 1;
            return;
        }

        let Some(&(dar_num, dar_den)) =
            MPEG2_DAR_TABLE.get(aspect_ratio_information.saturating_sub(1) as usize)
        else {
            return;
        };
        if video.image_width == 0 || video.image_height == 0 {
            return;
        }

        // display_aspect = (pixel_width * width) / (pixel_height * height)
        // => pixel_width/pixel_height = (dar_num * height) / (dar_den * width)
        let num = dar_num * video.image_height;
        let den = dar_den * video.image_width;
        let g = gcd(num, den);
        video.pixel_width = num / g;
        video.pixel_height = den / g;
    }

    fn parse_extension(&mut self, body: &[u8], ci: &mut CodecParameters) {
        let mut r = BitReaderLtr::new(body);
        let Some(ext_id) = r.read_bits(4) else { return };

        match ext_id {
            EXT_SEQUENCE => {
                self.is_mpeg2 = true;
                let Some(_profile_and_level) = r.read_bits(8) else { return };
                let Some(progressive_sequence) = r.read_bits(1) else { return };
                let _chroma_format = r.read_bits(2);
                let Some(horiz_ext) = r.read_bits(2) else { return };
                let Some(vert_ext) = r.read_bits(2) else { return };
                let Some(bitrate_ext) = r.read_bits(12) else { return };
                let _marker = r.read_bits(1);
                let Some(vbv_ext) = r.read_bits(8) else { return };
                let Some(low_delay) = r.read_bits(1) else { return };

                if let Some(video) = ci.video.as_mut() {
                    video.image_width += horiz_ext << 12;
                    video.image_height += vert_ext << 12;
                    video.frame_width = video.image_width;
                    video.frame_height = video.image_height;
                    video.interlaced = progressive_sequence == 0;
                }
                ci.bitrate = ci.bitrate.map(|b| b + (bitrate_ext << 18));
                ci.video_buffer_size = ci.video_buffer_size.map(|v| v + (vbv_ext << 10) * 2048);
                if low_delay != 0 {
                    ci.flags.remove(CodecFlags::HAS_B_FRAMES);
                }
                else {
                    ci.flags.insert(CodecFlags::HAS_B_FRAMES);
                    ci.flags.insert(CodecFlags::HAS_P_FRAMES);
                }
            }
            EXT_PICTURE_CODING => {
                let _f_code = r.read_bits(16);
                let _intra_dc_precision = r.read_bits(2);
                let Some(picture_structure) = r.read_bits(2) else { return };
                let Some(top_field_first) = r.read_bits(1) else { return };

                if let Some(video) = ci.video.as_mut() {
                    if picture_structure != 3 {
                        video.interlaced = true;
                    }
                    else if top_field_first == 0 {
                        // frame picture, top_field_first=0: leave interlaced as sequence-level set.
                    }
                }
            }
            _ => {}
        }
    }
}

/// Returns `picture_coding_type` (1=I, 2=P, 3=B, 4=D) from the bytes following a picture start
/// code, or `None` if the header is truncated.
fn parse_picture_coding_type(body: &[u8]) -> Option<u8> {
    let mut r = BitReaderLtr::new(body);
    let _temporal_reference = r.read_bits(10)?;
    let coding_type = r.read_bits(3)?;
    Some(coding_type as u8)
}

#[allow(unused)]
fn codec_id(is_mpeg2: bool) -> demux_core::codecs::CodecId {
    if is_mpeg2 {
        demux_core::codecs::CodecId::Mpeg2
    }
    else {
        demux_core::codecs::CodecId::Mpeg1
    }
}
