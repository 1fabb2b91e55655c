//! ID3v2 (2.2/2.3/2.4) tag parsing: syncsafe header sizes, the unsynchronisation scheme, and the
//! common text/comment frames used by the MP3 and WebVTT demuxers' metadata extraction.
//!
//! Grounded on symphonia's `symphonia-metadata::id3v2` module (header/frame layout,
//! `read_syncsafe_leq32`, the unsynchronisation decode loop) and on `lib/id3v2.c`'s frame-tag
//! tables for which frame IDs map to which standard key.

use demux_core::error::{unsupported_error, Result};
use demux_core::io::ReadBytes;
use demux_core::metadata::{keys, MetadataMap};

use crate::genres::genre_name;

#[derive(Copy, Clone, Debug)]
struct Header {
    major_version: u8,
    size: u32,
    unsynchronisation: bool,
    has_extended_header: bool,
}

/// Read a big-endian, syncsafe (7 significant bits per byte) integer of `bit_width` bits.
/// Grounded directly on symphonia's `unsync::read_syncsafe_leq32`.
fn read_syncsafe<R: ReadBytes>(reader: &mut R, bit_width: u32) -> Result<u32> {
    debug_assert!(bit_width <= 32);
    let mut result = 0u32;
    let mut bits_read = 0u32;

    while bits_read < bit_width {
        let next_read = (bit_width - bits_read).min(7);
        bits_read += next_read;
        let mask = (1u8 << next_read) - 1;
        result |= u32::from(reader.read_u8()? & mask) << (bit_width - bits_read);
    }

    Ok(result)
}

/// Reverse the unsynchronisation scheme (`FF 00` -> `FF`) in place, returning the decoded slice
/// length. Identical in structure to symphonia's `unsync::decode_unsynchronisation`.
fn decode_unsynchronisation(buf: &mut [u8]) -> usize {
    let len = buf.len();
    if len == 0 {
        return 0;
    }

    let mut src = 0;
    let mut dst = 0;

    while src < len - 1 {
        buf[dst] = buf[src];
        dst += 1;
        src += 1;

        if buf[src - 1] == 0xff && buf[src] == 0x00 {
            src += 1;
        }
    }

    if src < len {
        buf[dst] = buf[src];
        dst += 1;
    }

    dst
}

fn read_header<R: ReadBytes>(reader: &mut R) -> Result<Header> {
    let marker = [reader.read_u8()?, reader.read_u8()?, reader.read_u8()?];
    if &marker != b"ID3" {
        return unsupported_error("id3v2: missing ID3 marker");
    }

    let major_version = reader.read_u8()?;
    let _minor_version = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let size = read_syncsafe(reader, 28)?;

    Ok(Header {
        major_version,
        size,
        unsynchronisation: flags & 0x80 != 0,
        has_extended_header: flags & 0x40 != 0,
    })
}

/// A single decoded text/value frame, keyed by its 3- or 4-character frame ID.
struct Frame {
    id: String,
    data: Vec<u8>,
}

fn read_frame_id22<R: ReadBytes>(reader: &mut R) -> Result<Option<Frame>> {
    let mut id = [0u8; 3];
    reader.read_buf_exact(&mut id)?;
    if id == [0, 0, 0] {
        return Ok(None);
    }
    let size = reader.read_be_u24()?;
    let data = (0..size).map(|_| reader.read_u8()).collect::<Result<Vec<u8>>>()?;
    Ok(Some(Frame { id: String::from_utf8_lossy(&id).into_owned(), data }))
}

fn read_frame_v23plus<R: ReadBytes>(reader: &mut R, major_version: u8) -> Result<Option<Frame>> {
    let mut id = [0u8; 4];
    reader.read_buf_exact(&mut id)?;
    if id == [0, 0, 0, 0] {
        return Ok(None);
    }

    let size = if major_version >= 4 { read_syncsafe(reader, 32)? } else { reader.read_be_u32()? };
    let flags = reader.read_be_u16()?;
    let mut data = (0..size).map(|_| reader.read_u8()).collect::<Result<Vec<u8>>>()?;

    // Frame-level unsynchronisation flag (bit 1 of the flags' second byte, ID3v2.4).
    if major_version >= 4 && flags & 0x0002 != 0 {
        let len = decode_unsynchronisation(&mut data);
        data.truncate(len);
    }

    Ok(Some(Frame { id: String::from_utf8_lossy(&id).into_owned(), data }))
}

/// Decode a text frame's payload: the first byte selects the encoding
/// (0 = ISO-8859-1, 1 = UTF-16 with BOM, 2 = UTF-16BE, 3 = UTF-8).
fn decode_text_frame(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    let (encoding, body) = (data[0], &data[1..]);

    let text = match encoding {
        0 => body.iter().map(|&b| b as char).collect::<String>(),
        1 | 2 => {
            let (enc, body) = if encoding == 1 && body.len() >= 2 && body[0] == 0xff && body[1] == 0xfe {
                (encoding_rs::UTF_16LE, &body[2..])
            }
            else if encoding == 1 && body.len() >= 2 && body[0] == 0xfe && body[1] == 0xff {
                (encoding_rs::UTF_16BE, &body[2..])
            }
            else {
                (encoding_rs::UTF_16BE, body)
            };
            enc.decode(body).0.into_owned()
        }
        _ => encoding_rs::UTF_8.decode(body).0.into_owned(),
    };

    let trimmed = text.trim_end_matches('\0').trim().to_string();
    if trimmed.is_empty() {
        None
    }
    else {
        Some(trimmed)
    }
}

/// Parse an ID3v2 tag from the start of `reader` (already positioned at the `"ID3"` marker) into
/// `map`. Unknown/unsupported frame types are skipped rather than treated as a parse error.
pub fn read_id3v2<R: ReadBytes>(reader: &mut R, map: &mut MetadataMap) -> Result<()> {
    let header = read_header(reader)?;
    let mut remaining = header.size as i64;

    if header.has_extended_header {
        let ext_size =
            if header.major_version >= 4 { read_syncsafe(reader, 32)? } else { reader.read_be_u32()? };
        // The extended header's size field in v2.3 counts itself; in v2.4 it doesn't. Either
        // way we've already consumed 4 bytes for the size field itself.
        let skip = if header.major_version >= 4 { ext_size } else { ext_size.saturating_sub(4) };
        reader.ignore_bytes(skip as u64)?;
        remaining -= 4 + skip as i64;
    }

    while remaining > 10 {
        let frame = if header.major_version == 2 {
            let f = read_frame_id22(reader)?;
            remaining -= f.as_ref().map(|f| 6 + f.data.len() as i64).unwrap_or(3);
            f
        }
        else {
            let f = read_frame_v23plus(reader, header.major_version)?;
            remaining -= f.as_ref().map(|f| 10 + f.data.len() as i64).unwrap_or(4);
            f
        };

        let Some(frame) = frame else { break };
        apply_frame(&frame, map);
    }

    Ok(())
}

fn apply_frame(frame: &Frame, map: &mut MetadataMap) {
    let std_key = match frame.id.as_str() {
        "TIT2" | "TT2" => Some(keys::TITLE),
        "TPE1" | "TP1" => Some(keys::ARTIST),
        "TALB" | "TAL" => Some(keys::ALBUM),
        "TYER" | "TDRC" | "TYE" => Some(keys::DATE),
        "TRCK" | "TRK" => Some(keys::TRACK_NUMBER),
        "TLAN" | "TLA" => Some(keys::LANGUAGE),
        "TENC" | "TEN" => Some(keys::ENCODER),
        _ => None,
    };

    if let Some(key) = std_key {
        if let Some(value) = decode_text_frame(&frame.data) {
            map.set(key, value);
        }
        return;
    }

    if frame.id == "TCON" || frame.id == "TCO" {
        if let Some(value) = decode_text_frame(&frame.data) {
            map.set(keys::GENRE, resolve_genre_reference(&value));
        }
        return;
    }

    if frame.id == "COMM" || frame.id == "COM" {
        // Layout: encoding byte, 3-byte language code, short description, '\0', comment text.
        if frame.data.len() > 4 {
            if let Some(value) = decode_text_frame(&frame.data[4..]) {
                map.set(keys::COMMENT, value);
            }
        }
    }
}

/// ID3v2's `TCON` frame may hold a plain genre name, or the legacy `"(NN)"`/`"(NN)Refinement"`
/// numeric reference into the ID3v1 genre table.
fn resolve_genre_reference(value: &str) -> String {
    if let Some(rest) = value.strip_prefix('(') {
        if let Some(close) = rest.find(')') {
            if let Ok(index) = rest[..close].parse::<u8>() {
                if let Some(name) = genre_name(index) {
                    let refinement = rest[close + 1..].trim();
                    return if refinement.is_empty() {
                        name.to_string()
                    }
                    else {
                        refinement.to_string()
                    };
                }
            }
        }
    }
    value.to_string()
}
