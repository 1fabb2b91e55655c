//! Vorbis packet classification: distinguishing the three out-of-band setup packets (identification,
//! comment, codebook setup) from audio packets, and reading channel/sample-rate from the
//! identification header.
//!
//! Per-packet sample-accurate duration for Vorbis is derived from Ogg granule positions at the
//! container level (`demux-format-ogg`), not from this parser: the short/long window size a
//! packet decodes to depends on the full codebook/mode setup (`lib/audio_vorbis.c`'s approach is
//! the same; it defers to libvorbis rather than tracking window sizes itself), which this
//! workspace's demuxer-only scope has no reason to reimplement.

use demux_core::codecs::{AudioParams, CodecId, CodecParameters};
use demux_core::error::Result;
use demux_core::packet::{FrameType, Packet};
use demux_core::parser::{FrameBuf, PacketParser};

pub const PACKET_TYPE_IDENTIFICATION: u8 = 1;
pub const PACKET_TYPE_COMMENT: u8 = 3;
pub const PACKET_TYPE_SETUP: u8 = 5;

#[derive(Copy, Clone, Debug)]
pub struct IdentHeader {
    pub channels: u32,
    pub sample_rate: u32,
    pub bitrate_nominal: u32,
    pub blocksize_0: u32,
    pub blocksize_1: u32,
}

/// Parse a Vorbis identification header packet (type byte + `"vorbis"` signature already
/// expected at the start of `data`).
pub fn parse_ident_header(data: &[u8]) -> Option<IdentHeader> {
    if data.len() < 30 || data[0] != PACKET_TYPE_IDENTIFICATION || &data[1..7] != b"vorbis" {
        return None;
    }

    let channels = data[11] as u32;
    let sample_rate = u32::from_le_bytes(data[12..16].try_into().ok()?);
    let bitrate_nominal = u32::from_le_bytes(data[20..24].try_into().ok()?);
    let blocksize_byte = data[28];
    let blocksize_0 = 1u32 << (blocksize_byte & 0x0F);
    let blocksize_1 = 1u32 << ((blocksize_byte >> 4) & 0x0F);

    Some(IdentHeader { channels, sample_rate, bitrate_nominal, blocksize_0, blocksize_1 })
}

fn packet_type(data: &[u8]) -> Option<u8> {
    if data.is_empty() {
        return None;
    }
    // Audio packets have a 0 low bit in their first byte; header packets are odd (1, 3, 5).
    if data[0] & 0x01 == 0 {
        Some(0)
    }
    else {
        Some(data[0])
    }
}

/// Operates in `ParserMode::Frame`: Ogg already delimits one Vorbis packet per page segment run,
/// so this parser only classifies and annotates, never re-segments.
pub struct VorbisParser {
    header_packets_seen: u32,
}

impl VorbisParser {
    pub fn new() -> Self {
        VorbisParser { header_packets_seen: 0 }
    }
}

impl Default for VorbisParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketParser for VorbisParser {
    fn find_frame_boundary(&mut self, buf: &FrameBuf<'_>, skip: &mut usize) -> Option<usize> {
        // Not used: Vorbis-in-Ogg always runs in `ParserMode::Frame`.
        *skip = 0;
        None
    }

    fn parse_frame(&mut self, packet: &mut Packet, ci: &mut CodecParameters) -> Result<()> {
        let data = packet.buf();
        let Some(ptype) = packet_type(data) else { return Ok(()) };

        match ptype {
            PACKET_TYPE_IDENTIFICATION => {
                self.header_packets_seen += 1;
                if let Some(ident) = parse_ident_header(data) {
                    ci.audio = Some(AudioParams {
                        sample_rate: ident.sample_rate,
                        num_channels: ident.channels,
                        ..Default::default()
                    });
                    ci.bitrate = Some(ident.bitrate_nominal).filter(|b| *b > 0);
                }
                packet.header_size = data.len();
            }
            PACKET_TYPE_COMMENT | PACKET_TYPE_SETUP => {
                self.header_packets_seen += 1;
                packet.header_size = data.len();
            }
            _ => {
                packet.frame_type = FrameType::Unknown;
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.header_packets_seen = 0;
    }
}

#[allow(unused)]
fn codec_id() -> CodecId {
    CodecId::Vorbis
}

#[cfg(test)]
mod tests {
    use super::*;
    use demux_core::units::{Duration, Timestamp};

    fn build_ident_header(sample_rate: u32, channels: u8) -> Vec<u8> {
        let mut data = vec![0u8; 30];
        data[0] = PACKET_TYPE_IDENTIFICATION;
        data[1..7].copy_from_slice(b"vorbis");
        data[11] = channels;
        data[12..16].copy_from_slice(&sample_rate.to_le_bytes());
        data[28] = (8 << 4) | 6; // blocksize_1=256, blocksize_0=64
        data
    }

    #[test]
    fn verify_parses_ident_header() {
        let data = build_ident_header(44100, 2);
        let ident = parse_ident_header(&data).unwrap();
        assert_eq!(ident.sample_rate, 44100);
        assert_eq!(ident.channels, 2);
        assert_eq!(ident.blocksize_0, 64);
        assert_eq!(ident.blocksize_1, 256);
    }

    #[test]
    fn verify_parse_frame_populates_audio_params_from_ident() {
        let data = build_ident_header(48000, 1);
        let mut pkt = demux_core::packet::PacketBuilder::default()
            .stream_id(0)
            .pts(Timestamp::ZERO)
            .dur(Duration::ZERO)
            .data(data)
            .build();
        let mut ci = CodecParameters::new(CodecId::Vorbis);
        let mut parser = VorbisParser::new();
        parser.parse_frame(&mut pkt, &mut ci).unwrap();

        assert_eq!(ci.audio.unwrap().sample_rate, 48000);
    }
}
