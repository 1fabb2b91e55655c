//! The H.264 packet parser: Annex-B access-unit boundary detection for raw elementary streams
//! (`ParserMode::Full`) and AVCC sample-to-frame classification for MP4 (`ParserMode::Frame`).

use demux_core::codecs::{CodecFlags, CodecParameters};
use demux_core::error::Result;
use demux_core::packet::{FrameType, Packet, PacketFlags};
use demux_core::parser::{FrameBuf, PacketParser};

use crate::nal::{self, NalRef};
use crate::slice;
use crate::sps;

/// How NAL units are delimited in the stream this parser is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NalSyntax {
    AnnexB,
    /// AVCC length-prefixed, with the configuration record's `lengthSizeMinusOne + 1`.
    Avcc(u8),
}

pub struct H264Parser {
    syntax: NalSyntax,
    last_frame_mbs_only: bool,
    have_seen_vcl: bool,
}

impl H264Parser {
    pub fn new(syntax: NalSyntax) -> Self {
        H264Parser { syntax, last_frame_mbs_only: true, have_seen_vcl: false }
    }

    fn iter_nals<'a>(&self, data: &'a [u8]) -> Vec<NalRef> {
        match self.syntax {
            NalSyntax::AnnexB => nal::iter_annexb(data),
            NalSyntax::Avcc(len) => nal::iter_avcc(data, len),
        }
    }
}

impl PacketParser for H264Parser {
    /// An access unit boundary falls just before an AUD NAL, or before a VCL NAL whose
    /// `first_mb_in_slice == 0` (the start of a new primary coded picture), mirroring the
    /// boundary heuristic used when no AUD is present.
    fn find_frame_boundary(&mut self, buf: &FrameBuf<'_>, skip: &mut usize) -> Option<usize> {
        *skip = 0;
        let data = &buf.data[buf.pos..];
        let nals = nal::iter_annexb(data);

        let mut boundary_nal_index = None;
        for (i, n) in nals.iter().enumerate() {
            if n.unit_type == nal::NAL_AUD {
                if i > 0 {
                    boundary_nal_index = Some(i);
                    break;
                }
                continue;
            }

            if nal::is_vcl(n.unit_type) {
                if !self.have_seen_vcl {
                    self.have_seen_vcl = true;
                    continue;
                }

                let rbsp_start = n.start.min(data.len());
                let rbsp_end = n.end.min(data.len());
                if let Some(header) = slice::parse_leading(&data[rbsp_start..rbsp_end]) {
                    if header.first_mb_in_slice == 0 && i > 0 {
                        boundary_nal_index = Some(i);
                        break;
                    }
                }
            }
        }

        // The boundary byte offset is the start of the NAL's startcode, which we recover from the
        // NAL header position minus 3 (the minimum startcode length); `iter_annexb` doesn't carry
        // the startcode length, so fall back to scanning backward for the `00 00 01` pattern.
        let idx = boundary_nal_index?;
        let header_pos = nals[idx].start - 1;
        let mut sc_start = header_pos;
        while sc_start > 0 && data[sc_start - 1] == 0 {
            sc_start -= 1;
        }

        Some(buf.pos + sc_start)
    }

    fn parse_frame(&mut self, packet: &mut Packet, ci: &mut CodecParameters) -> Result<()> {
        let data = packet.buf().to_vec();
        let nals = self.iter_nals(&data);

        let mut frame_type = FrameType::Unknown;
        let mut saw_idr = false;
        let mut header_len = 0usize;

        for n in &nals {
            match n.unit_type {
                nal::NAL_SPS => {
                    header_len = header_len.max(n.end);
                    if let Some(parsed) = sps::parse(&data[n.start..n.end.min(data.len())]) {
                        self.last_frame_mbs_only = parsed.frame_mbs_only_flag;
                        if let Some(video) = &mut ci.video {
                            if video.image_width == 0 {
                                video.image_width = parsed.pic_width;
                                video.image_height = parsed.pic_height;
                                video.frame_width = parsed.pic_width;
                                video.frame_height = parsed.pic_height;
                                video.interlaced = !parsed.frame_mbs_only_flag;
                                if parsed.sar_width > 0 && parsed.sar_height > 0 {
                                    video.pixel_width = parsed.sar_width;
                                    video.pixel_height = parsed.sar_height;
                                }
                            }
                        }
                    }
                }
                nal::NAL_PPS => header_len = header_len.max(n.end),
                nal::NAL_SLICE_IDR => {
                    saw_idr = true;
                    if let Some(h) = slice::parse_leading(&data[n.start..n.end.min(data.len())]) {
                        frame_type = h.frame_type;
                    }
                }
                t if nal::is_vcl(t) => {
                    if frame_type == FrameType::Unknown {
                        if let Some(h) = slice::parse_leading(&data[n.start..n.end.min(data.len())]) {
                            frame_type = h.frame_type;
                        }
                    }
                }
                _ => {}
            }
        }

        packet.frame_type = frame_type;
        packet.header_size = header_len;

        if saw_idr || frame_type == FrameType::I {
            packet.flags |= PacketFlags::KEYFRAME;
        }
        if frame_type == FrameType::B {
            ci.flags |= CodecFlags::HAS_B_FRAMES;
        }
        else if frame_type == FrameType::P {
            ci.flags |= CodecFlags::HAS_P_FRAMES;
        }
        if !self.last_frame_mbs_only {
            ci.flags |= CodecFlags::HAS_FIELD_PICTURES;
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.have_seen_vcl = false;
    }
}
