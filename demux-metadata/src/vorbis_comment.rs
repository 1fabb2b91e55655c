//! Vorbis comment parsing: the vendor-string + `KEY=VALUE` list format used by Ogg Vorbis and
//! carried, unchanged, inside FLAC `VORBIS_COMMENT` blocks.
//!
//! Grounded on symphonia's `symphonia-metadata::embedded::vorbis::read_vorbis_comment` for the
//! wire layout (vendor string, comment count, then length-prefixed `KEY=VALUE` strings); the
//! large standard-tag mapping table there is trimmed down to the keys this workspace's
//! [`MetadataMap`](demux_core::metadata::MetadataMap) models.

use demux_core::error::Result;
use demux_core::io::ReadBytes;
use demux_core::metadata::{keys, MetadataMap};

fn map_key(key: &str) -> Option<&'static str> {
    match key.to_ascii_lowercase().as_str() {
        "title" => Some(keys::TITLE),
        "artist" => Some(keys::ARTIST),
        "album" => Some(keys::ALBUM),
        "date" => Some(keys::DATE),
        "language" => Some(keys::LANGUAGE),
        "encoder" => Some(keys::ENCODER),
        "genre" => Some(keys::GENRE),
        "comment" | "description" => Some(keys::COMMENT),
        "tracknumber" | "track" => Some(keys::TRACK_NUMBER),
        _ => None,
    }
}

/// Parse a Vorbis comment header packet body (the vendor string and comment list, without the
/// packet type byte and `"vorbis"` signature that precede it in an Ogg Vorbis stream) into `map`.
pub fn read_vorbis_comment<R: ReadBytes>(reader: &mut R, map: &mut MetadataMap) -> Result<()> {
    let vendor_len = reader.read_le_u32()?;
    reader.ignore_bytes(u64::from(vendor_len))?;

    let num_comments = reader.read_le_u32()?;

    for _ in 0..num_comments {
        let len = reader.read_le_u32()?;
        let bytes = reader.read_boxed_slice_exact(len as usize)?;
        let comment = String::from_utf8_lossy(&bytes);

        let Some((key, value)) = comment.split_once('=') else { continue };

        if let Some(std_key) = map_key(key) {
            map.set(std_key, value);
        }
        else {
            map.set(format!("vorbis.{}", key.to_ascii_lowercase()), value);
        }
    }

    Ok(())
}
