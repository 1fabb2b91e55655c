//! Minimal parsers for the two codec-setup structures this crate needs: the MPEG-4
//! `ESDescriptor` carried in `esds` (for AAC object-type identification and decoder-specific
//! config) and the `AVCDecoderConfigurationRecord` carried in `avcC` (for H.264's NAL length size
//! and profile/level).
//!
//! symphonia-format-isomp4's `esds.rs`/`avcc.rs` delegate the actual descriptor/record parsing to
//! `symphonia_common::mpeg::{formats, video}`, a dependency this workspace does not carry; these
//! are reimplemented directly from ISO/IEC 14496-1 (descriptor tags) and ISO/IEC 14496-15
//! (`AVCDecoderConfigurationRecord`) instead of pulling that crate in.

use demux_core::error::{decode_error, Result};
use demux_core::io::ReadBytes;

const ES_DESCR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCR_TAG: u8 = 0x04;
const DEC_SPECIFIC_INFO_TAG: u8 = 0x05;

/// Reads an MPEG-4 descriptor's variable-length size: up to 4 bytes, each contributing 7 bits,
/// with the top bit of each byte signalling "more bytes follow."
fn read_descr_len(data: &[u8], pos: &mut usize) -> Option<u32> {
    let mut len = 0u32;
    for _ in 0..4 {
        let byte = *data.get(*pos)?;
        *pos += 1;
        len = (len << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Some(len);
        }
    }
    Some(len)
}

/// The subset of an `ESDescriptor` this workspace needs: the decoder config's object type
/// (mapped to a `CodecId` by the caller) and the raw decoder-specific-info bytes (an
/// `AudioSpecificConfig` for AAC), published as `codec_header`.
pub struct EsDescriptor {
    pub object_type_indication: u8,
    pub dec_specific_info: Option<Box<[u8]>>,
}

/// Parses the `ESDescriptor` payload of an `esds` atom (the atom's own version/flags must already
/// have been consumed by the caller).
pub fn parse_es_descriptor(data: &[u8]) -> Result<EsDescriptor> {
    let mut pos = 0usize;

    let tag = *data.get(pos).ok_or_else(|| missing("es descriptor"))?;
    pos += 1;
    if tag != ES_DESCR_TAG {
        return decode_error("isomp4 (esds): expected an ES_Descriptor");
    }
    let _len = read_descr_len(data, &mut pos).ok_or_else(|| missing("es descriptor length"))?;

    // ES_ID (2 bytes) + flags byte.
    pos += 2;
    let flags = *data.get(pos).ok_or_else(|| missing("es descriptor flags"))?;
    pos += 1;
    if flags & 0x80 != 0 {
        pos += 2; // dependsOn_ES_ID
    }
    if flags & 0x40 != 0 {
        let url_len = *data.get(pos).ok_or_else(|| missing("url length"))? as usize;
        pos += 1 + url_len;
    }
    if flags & 0x20 != 0 {
        pos += 2; // OCR_ES_Id
    }

    let tag = *data.get(pos).ok_or_else(|| missing("decoder config descriptor"))?;
    pos += 1;
    if tag != DECODER_CONFIG_DESCR_TAG {
        return decode_error("isomp4 (esds): expected a DecoderConfigDescriptor");
    }
    let _len = read_descr_len(data, &mut pos).ok_or_else(|| missing("decoder config length"))?;

    let object_type_indication = *data.get(pos).ok_or_else(|| missing("object type indication"))?;
    pos += 1;

    // streamType(6 bits)/upStream(1 bit)/reserved(1 bit), bufferSizeDB(3), maxBitrate(4),
    // avgBitrate(4): none of these are needed here.
    pos += 1 + 3 + 4 + 4;

    let mut dec_specific_info = None;
    if let Some(&tag) = data.get(pos) {
        if tag == DEC_SPECIFIC_INFO_TAG {
            pos += 1;
            if let Some(len) = read_descr_len(data, &mut pos) {
                let len = len as usize;
                if let Some(bytes) = data.get(pos..pos + len.min(data.len().saturating_sub(pos))) {
                    dec_specific_info = Some(bytes.to_vec().into_boxed_slice());
                }
            }
        }
    }

    Ok(EsDescriptor { object_type_indication, dec_specific_info })
}

fn missing(what: &'static str) -> demux_core::error::Error {
    demux_core::error::Error::Decode(format!("isomp4 (esds): truncated, missing {what}"))
}

/// Maps an MPEG-4 `objectTypeIndication` byte to this workspace's `CodecId`, for the audio object
/// types this workspace's codec crates support.
pub fn audio_codec_from_object_type(object_type_indication: u8) -> Option<demux_core::codecs::CodecId> {
    use demux_core::codecs::CodecId;
    match object_type_indication {
        0x40 | 0x66 | 0x67 | 0x68 => Some(CodecId::Aac),
        0x69 | 0x6B => Some(CodecId::Mp3),
        _ => None,
    }
}

/// The subset of an `AVCDecoderConfigurationRecord` (ISO/IEC 14496-15) this workspace needs: the
/// NAL length field size (for both `nal::iter_avcc` and `AvccToAnnexBFilter`) and profile/level,
/// alongside the whole record passed through as `codec_header` by the caller.
pub struct AvcDecoderConfig {
    pub nal_length_size: u8,
    pub profile: u8,
    pub level: u8,
}

pub fn parse_avcc(data: &[u8]) -> Result<AvcDecoderConfig> {
    if data.len() < 7 {
        return decode_error("isomp4 (avcC): record too short");
    }
    let profile = data[1];
    let level = data[3];
    let nal_length_size = (data[4] & 0x03) + 1;
    Ok(AvcDecoderConfig { nal_length_size, profile, level })
}
