//! ID3v1 trailer parsing: a fixed 128-byte tag appended to the end of an MP3 elementary stream.
//!
//! Grounded on symphonia's `symphonia-metadata::id3v1::read_id3v1`, adapted to write into
//! [`MetadataMap`](demux_core::metadata::MetadataMap) instead of a `MetadataBuilder`.

use demux_core::error::{unsupported_error, Result};
use demux_core::io::ReadBytes;
use demux_core::metadata::{keys, MetadataMap};

use crate::genres::genre_name;

/// The fixed size of an ID3v1 tag, including its `"TAG"` marker.
pub const ID3V1_TAG_SIZE: usize = 128;

/// Parse a 128-byte ID3v1 tag (the `reader` must be positioned at the `"TAG"` marker) into
/// `map`. Returns `Ok(())` with `map` populated, or an `Unsupported` error if the marker doesn't
/// match.
pub fn read_id3v1<R: ReadBytes>(reader: &mut R, map: &mut MetadataMap) -> Result<()> {
    let marker = [reader.read_u8()?, reader.read_u8()?, reader.read_u8()?];
    if &marker != b"TAG" {
        return unsupported_error("id3v1: missing TAG marker");
    }

    let mut buf = [0u8; 125];
    reader.read_buf_exact(&mut buf)?;

    if let Some(title) = decode_trimmed(&buf[0..30]) {
        map.set(keys::TITLE, title);
    }
    if let Some(artist) = decode_trimmed(&buf[30..60]) {
        map.set(keys::ARTIST, artist);
    }
    if let Some(album) = decode_trimmed(&buf[60..90]) {
        map.set(keys::ALBUM, album);
    }
    if let Some(year) = decode_trimmed(&buf[90..94]) {
        map.set(keys::DATE, year);
    }

    // ID3v1.1: if byte 125 (index 122 in `buf`) is zero, the comment field ends at 28 bytes and
    // the final byte is a track number.
    if buf[122] == 0 && buf[123] != 0 {
        map.set(keys::TRACK_NUMBER, buf[123].to_string());
        if let Some(comment) = decode_trimmed(&buf[94..122]) {
            map.set(keys::COMMENT, comment);
        }
    }
    else if let Some(comment) = decode_trimmed(&buf[94..124]) {
        map.set(keys::COMMENT, comment);
    }

    if let Some(genre) = genre_name(buf[124]) {
        map.set(keys::GENRE, genre);
    }

    Ok(())
}

/// Decode a fixed-width ISO-8859-1 field, trimming trailing NUL padding. Returns `None` for an
/// all-NUL (empty) field.
fn decode_trimmed(buf: &[u8]) -> Option<String> {
    let trimmed = buf.split(|&b| b == 0).next().unwrap_or(buf);
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.iter().map(|&b| b as char).collect())
}
