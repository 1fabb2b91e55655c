//! On-disk superindex cache, keyed by an MD5 of the source URL.
//!
//! The cache format is a small fixed-layout binary encoding rather than a general-purpose
//! serialization crate: it only ever needs to round-trip [`PacketIndex`], and nothing else in
//! this workspace's dependency stack needs `serde`/`bincode`, so adding one just for this would
//! be a new dependency for a single file (see DESIGN.md).

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use md5::{Digest, Md5};

use crate::error::Result;
use crate::index::{IndexEntry, IndexEntryFlags, PacketIndex};
use crate::units::{Duration, Timestamp};

/// Below this scan duration, a freshly built index is not worth persisting.
pub const PERSIST_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(2);

pub fn cache_path(cache_dir: &Path, url: &str) -> PathBuf {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    cache_dir.join("indices").join(format!("{}.idx", hex))
}

/// Load a cached index, if present and newer than `source_mtime`.
pub fn load(cache_dir: &Path, url: &str, source_mtime: Option<SystemTime>) -> Option<PacketIndex> {
    let path = cache_path(cache_dir, url);
    let meta = fs::metadata(&path).ok()?;
    let cache_mtime = meta.modified().ok()?;

    if let Some(src) = source_mtime {
        if src > cache_mtime {
            return None;
        }
    }

    let mut file = fs::File::open(&path).ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).ok()?;
    decode(&bytes).ok()
}

/// Persist `index` under the cache path for `url`, creating parent directories as needed.
pub fn store(cache_dir: &Path, url: &str, index: &PacketIndex) -> Result<()> {
    let path = cache_path(cache_dir, url);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = encode(index);
    let mut file = fs::File::create(&path)?;
    file.write_all(&bytes)?;
    Ok(())
}

fn encode(index: &PacketIndex) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"DMXIDX01");
    out.extend_from_slice(&(index.len() as u32).to_le_bytes());

    for entry in index.iter() {
        out.extend_from_slice(&entry.stream_id.to_le_bytes());
        out.extend_from_slice(&entry.position.to_le_bytes());
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.extend_from_slice(&entry.pts.ticks().to_le_bytes());
        out.extend_from_slice(&entry.duration.ticks().to_le_bytes());
        out.push(entry.flags.keyframe as u8);
    }

    out
}

fn decode(bytes: &[u8]) -> std::result::Result<PacketIndex, &'static str> {
    if bytes.len() < 12 || &bytes[0..8] != b"DMXIDX01" {
        return Err("bad cache header");
    }

    let count = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let mut index = PacketIndex::new();
    let mut pos = 12usize;
    const ROW_LEN: usize = 4 + 8 + 4 + 8 + 8 + 1;

    for _ in 0..count {
        if pos + ROW_LEN > bytes.len() {
            return Err("truncated cache row");
        }
        let stream_id = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        let position = u64::from_le_bytes(bytes[pos + 4..pos + 12].try_into().unwrap());
        let size = u32::from_le_bytes(bytes[pos + 12..pos + 16].try_into().unwrap());
        let pts = i64::from_le_bytes(bytes[pos + 16..pos + 24].try_into().unwrap());
        let duration = u64::from_le_bytes(bytes[pos + 24..pos + 32].try_into().unwrap());
        let keyframe = bytes[pos + 32] != 0;
        pos += ROW_LEN;

        index.push(IndexEntry {
            stream_id,
            position,
            size,
            pts: Timestamp::new(pts),
            duration: Duration::new(duration),
            flags: IndexEntryFlags { keyframe },
        });
    }

    Ok(index)
}
