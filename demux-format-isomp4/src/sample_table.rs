//! The sample table (`stbl`): `stco`/`stsc`/`stsz`/`stts`/`stss`/`ctts` parsing and the chunk-walk
//! that turns them into a flat, per-sample `(position, size, dts, pts_offset, keyframe)` index.
//!
//! The chunk-to-sample walk is grounded on symphonia-core's `segments.rs`
//! (`Segment::from_moov`'s `stsc.entries.windows(2)` loop) and `stsc.rs`'s `post_processing`.
//! symphonia-format-isomp4's own `stbl.rs` does not read `stss` or `ctts` at all (`stss.rs` is a
//! `todo!()` stub and `ctts` has no reader in this copy of the crate); both are implemented here
//! from scratch, since keyframe indexing and composition-time offsets are both named requirements.

use demux_core::error::{decode_error, Result};
use demux_core::io::{MediaSourceStream, ReadBytes};

use crate::atom::AtomHeader;

#[derive(Debug)]
pub enum SampleSize {
    Constant(u32),
    Variable(Vec<u32>),
}

impl SampleSize {
    fn size_of(&self, sample_index: usize) -> u32 {
        match self {
            SampleSize::Constant(size) => *size,
            SampleSize::Variable(sizes) => sizes.get(sample_index).copied().unwrap_or(0),
        }
    }

    fn count(&self) -> usize {
        match self {
            SampleSize::Constant(_) => 0,
            SampleSize::Variable(sizes) => sizes.len(),
        }
    }
}

pub fn read_stsz(mss: &mut MediaSourceStream, header: AtomHeader) -> Result<(u32, SampleSize)> {
    let _ = mss.read_be_u32()?; // version + flags
    let sample_size = mss.read_be_u32()?;
    let sample_count = mss.read_be_u32()?;

    let sizes = if sample_size == 0 {
        let mut entries = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            entries.push(mss.read_be_u32()?);
        }
        SampleSize::Variable(entries)
    }
    else {
        SampleSize::Constant(sample_size)
    };

    let _ = header;
    Ok((sample_count, sizes))
}

pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
}

pub fn read_stsc(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<StscEntry>> {
    let _ = mss.read_be_u32()?;
    let entry_count = mss.read_be_u32()?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let first_chunk = mss.read_be_u32()?;
        if first_chunk == 0 {
            return decode_error("isomp4 (stsc): first_chunk must be indexed from 1");
        }
        let samples_per_chunk = mss.read_be_u32()?;
        let _sample_desc_index = mss.read_be_u32()?;
        entries.push(StscEntry { first_chunk: first_chunk - 1, samples_per_chunk });
    }
    Ok(entries)
}

pub fn read_stco(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<u64>> {
    let _ = mss.read_be_u32()?;
    let entry_count = mss.read_be_u32()?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        offsets.push(u64::from(mss.read_be_u32()?));
    }
    Ok(offsets)
}

pub fn read_co64(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<u64>> {
    let _ = mss.read_be_u32()?;
    let entry_count = mss.read_be_u32()?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        offsets.push(mss.read_be_u64()?);
    }
    Ok(offsets)
}

pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

pub fn read_stts(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<SttsEntry>> {
    let _ = mss.read_be_u32()?;
    let entry_count = mss.read_be_u32()?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let sample_count = mss.read_be_u32()?;
        let sample_delta = mss.read_be_u32()?;
        entries.push(SttsEntry { sample_count, sample_delta });
    }
    Ok(entries)
}

/// Sync sample table (`stss`): the 1-indexed sample numbers that are random-access points. Not
/// read by symphonia-format-isomp4 (`stss.rs` is a `todo!()` there); implemented here
/// since keyframe indexing is required.
pub fn read_stss(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<u32>> {
    let _ = mss.read_be_u32()?;
    let entry_count = mss.read_be_u32()?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(mss.read_be_u32()?);
    }
    Ok(entries)
}

/// Composition time-to-sample table (`ctts`): per-sample `pts - dts` offsets. Absent entirely from
/// symphonia-format-isomp4; implemented here since composition offsets are required.
pub fn read_ctts(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<(u32, i32)>> {
    let version_flags = mss.read_be_u32()?;
    let version = (version_flags >> 24) as u8;
    let entry_count = mss.read_be_u32()?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let sample_count = mss.read_be_u32()?;
        let raw_offset = mss.read_be_u32()?;
        // Version 0 defines the offset as unsigned; version 1 as signed. Either way the bit
        // pattern reinterprets cleanly as i32.
        let offset = if version == 0 { raw_offset as i32 } else { raw_offset as i32 };
        entries.push((sample_count, offset));
    }
    Ok(entries)
}

pub struct EditEntry {
    pub segment_duration: u64,
    pub media_time: i64,
}

pub fn read_elst(mss: &mut MediaSourceStream, _header: AtomHeader) -> Result<Vec<EditEntry>> {
    let version_flags = mss.read_be_u32()?;
    let version = (version_flags >> 24) as u8;
    let entry_count = mss.read_be_u32()?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let (segment_duration, media_time) = if version == 1 {
            (mss.read_be_u64()?, mss.read_be_u64()? as i64)
        }
        else {
            (u64::from(mss.read_be_u32()?), mss.read_be_u32()? as i32 as i64)
        };
        let _media_rate_int = mss.read_be_u16()?;
        let _media_rate_frac = mss.read_be_u16()?;
        entries.push(EditEntry { segment_duration, media_time });
    }
    Ok(entries)
}

/// One sample's resolved position in both the byte stream and the presentation timeline.
#[derive(Debug, Clone, Copy)]
pub struct SampleRecord {
    pub pos: u64,
    pub size: u32,
    /// Decode timestamp, in the track's own `mdhd` timescale.
    pub dts: u64,
    /// `pts - dts`, in the same timescale (from `ctts`; zero when absent).
    pub pts_offset: i64,
    pub keyframe: bool,
}

#[derive(Default)]
pub struct SampleTable {
    pub sample_count: u32,
    pub sample_sizes: Option<SampleSize>,
    pub stsc: Vec<StscEntry>,
    pub chunk_offsets: Vec<u64>,
    pub stts: Vec<SttsEntry>,
    pub stss: Option<Vec<u32>>,
    pub ctts: Option<Vec<(u32, i32)>>,
}

impl SampleTable {
    /// Walks `stsc`'s chunk runs (grounded on `Segment::from_moov`) to assign each sample its byte
    /// position, then walks `stts`/`ctts`/`stss` to assign timing and keyframe flags.
    pub fn build(&self) -> Result<Vec<SampleRecord>> {
        let Some(sizes) = &self.sample_sizes else {
            return decode_error("isomp4 (stbl): missing stsz");
        };

        let total = if let SampleSize::Constant(_) = sizes { self.sample_count as usize } else { sizes.count() };

        let mut records = Vec::with_capacity(total);

        // Chunk walk: for each stsc run, resolve every chunk's sample range and byte positions.
        let mut sample_index = 0usize;
        for (i, entry) in self.stsc.iter().enumerate() {
            let chunk_end = self.stsc.get(i + 1).map(|e| e.first_chunk).unwrap_or(self.chunk_offsets.len() as u32);

            for chunk in entry.first_chunk..chunk_end {
                let Some(mut pos) = self.chunk_offsets.get(chunk as usize).copied() else { break };

                for _ in 0..entry.samples_per_chunk {
                    if sample_index >= total {
                        break;
                    }
                    let size = sizes.size_of(sample_index);
                    records.push(SampleRecord { pos, size, dts: 0, pts_offset: 0, keyframe: true });
                    pos += u64::from(size);
                    sample_index += 1;
                }
            }
        }

        if records.len() != total {
            return decode_error("isomp4 (stbl): stsc/stco chunk walk did not cover every sample");
        }

        // Decode timestamps from stts, by cumulative sum.
        let mut dts = 0u64;
        let mut idx = 0usize;
        for entry in &self.stts {
            for _ in 0..entry.sample_count {
                if idx >= records.len() {
                    break;
                }
                records[idx].dts = dts;
                dts += u64::from(entry.sample_delta);
                idx += 1;
            }
        }

        // Composition offsets from ctts, by run-length.
        if let Some(ctts) = &self.ctts {
            let mut idx = 0usize;
            for (count, offset) in ctts {
                for _ in 0..*count {
                    if idx >= records.len() {
                        break;
                    }
                    records[idx].pts_offset = i64::from(*offset);
                    idx += 1;
                }
            }
        }

        // Keyframes from stss; absence means every sample is a sync sample (ISO/IEC 14496-12).
        if let Some(stss) = &self.stss {
            for record in &mut records {
                record.keyframe = false;
            }
            for &sample_num in stss {
                if sample_num == 0 {
                    continue;
                }
                if let Some(record) = records.get_mut(sample_num as usize - 1) {
                    record.keyframe = true;
                }
            }
        }

        Ok(records)
    }
}
