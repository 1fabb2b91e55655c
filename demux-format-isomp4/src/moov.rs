//! Walks `moov` → `trak` → (`edts`/`mdia`) → `mdia` → (`mdhd`/`hdlr`/`minf`) → `minf` → `stbl`,
//! collecting everything one elementary track needs: its sample entry, its sample table, and any
//! edit-list presentation-time shift.
//!
//! Grounded on symphonia's `moov.rs`/`trak.rs`/`mdia.rs`/`minf.rs`/`stbl.rs` for the nesting
//! order, adapted to walk this crate's own `AtomIterator` instead of a generic `B: ReadBytes`.

use demux_core::error::Result;
use demux_core::fourcc::FourCc;
use demux_core::formats::stream::StreamKind;
use demux_core::io::{MediaSourceStream, ReadBytes};

use crate::atom::AtomIterator;
use crate::sample_table::{self, SampleTable};
use crate::stsd::{self, SampleEntryResult};

pub struct TrakInfo {
    pub track_id: u32,
    pub timescale: u32,
    pub kind: StreamKind,
    pub sample_entry: SampleEntryResult,
    pub table: SampleTable,
    /// `pts - dts` shift from the track's first non-empty edit list entry, in track timescale
    /// units.
    pub edit_shift: i64,
}

fn handler_to_kind(handler_type: &[u8; 4]) -> Option<StreamKind> {
    match handler_type {
        b"vide" => Some(StreamKind::Video),
        b"soun" => Some(StreamKind::Audio),
        b"text" | b"subt" => Some(StreamKind::Text),
        _ => None,
    }
}

fn parse_edts(mss: &mut MediaSourceStream, end: u64) -> Result<i64> {
    let mut iter = AtomIterator::new(mss, Some(end));
    let mut shift = 0i64;
    while let Some(header) = iter.next()? {
        if header.atom_type == FourCc::new(b"elst") {
            let entries = sample_table::read_elst(iter.mss(), header)?;
            if let Some(first) = entries.iter().find(|e| e.media_time >= 0) {
                shift = -first.media_time;
            }
        }
    }
    Ok(shift)
}

fn parse_stbl(mss: &mut MediaSourceStream, end: u64) -> Result<(SampleEntryResult, SampleTable)> {
    let mut iter = AtomIterator::new(mss, Some(end));

    let mut sample_entry = None;
    let mut table = SampleTable::default();

    while let Some(header) = iter.next()? {
        match header.atom_type {
            t if t == FourCc::new(b"stsd") => {
                sample_entry = Some(stsd::read_stsd(iter.mss(), header)?);
            }
            t if t == FourCc::new(b"stts") => {
                table.stts = sample_table::read_stts(iter.mss(), header)?;
            }
            t if t == FourCc::new(b"stsc") => {
                table.stsc = sample_table::read_stsc(iter.mss(), header)?;
            }
            t if t == FourCc::new(b"stsz") => {
                let (count, sizes) = sample_table::read_stsz(iter.mss(), header)?;
                table.sample_count = count;
                table.sample_sizes = Some(sizes);
            }
            t if t == FourCc::new(b"stco") => {
                table.chunk_offsets = sample_table::read_stco(iter.mss(), header)?;
            }
            t if t == FourCc::new(b"co64") => {
                table.chunk_offsets = sample_table::read_co64(iter.mss(), header)?;
            }
            t if t == FourCc::new(b"stss") => {
                table.stss = Some(sample_table::read_stss(iter.mss(), header)?);
            }
            t if t == FourCc::new(b"ctts") => {
                table.ctts = Some(sample_table::read_ctts(iter.mss(), header)?);
            }
            _ => {}
        }
    }

    let sample_entry = sample_entry.ok_or_else(|| {
        demux_core::error::Error::Decode("isomp4 (stbl): missing stsd".to_string())
    })?;

    Ok((sample_entry, table))
}

fn parse_minf(mss: &mut MediaSourceStream, end: u64) -> Result<(SampleEntryResult, SampleTable)> {
    let mut iter = AtomIterator::new(mss, Some(end));
    let mut result = None;
    while let Some(header) = iter.next()? {
        if header.atom_type == FourCc::new(b"stbl") {
            let stbl_end = header.end.unwrap_or(end);
            result = Some(parse_stbl(iter.mss(), stbl_end)?);
        }
    }
    result.ok_or_else(|| demux_core::error::Error::Decode("isomp4 (minf): missing stbl".to_string()))
}

fn parse_mdia(mss: &mut MediaSourceStream, end: u64) -> Result<(u32, StreamKind, SampleEntryResult, SampleTable)> {
    let mut iter = AtomIterator::new(mss, Some(end));

    let mut timescale = None;
    let mut kind = None;
    let mut minf_result = None;

    while let Some(header) = iter.next()? {
        if header.atom_type == FourCc::new(b"mdhd") {
            let version_flags = iter.mss().read_be_u32()?;
            let version = (version_flags >> 24) as u8;
            if version == 1 {
                iter.mss().ignore_bytes(16)?;
                timescale = Some(iter.mss().read_be_u32()?);
                iter.mss().ignore_bytes(8)?;
            }
            else {
                iter.mss().ignore_bytes(8)?;
                timescale = Some(iter.mss().read_be_u32()?);
                iter.mss().ignore_bytes(4)?;
            }
        }
        else if header.atom_type == FourCc::new(b"hdlr") {
            iter.mss().ignore_bytes(4 + 4)?; // version/flags, pre_defined
            let mut handler_type = [0u8; 4];
            iter.mss().read_buf_exact(&mut handler_type)?;
            kind = handler_to_kind(&handler_type);
        }
        else if header.atom_type == FourCc::new(b"minf") {
            let minf_end = header.end.unwrap_or(end);
            minf_result = Some(parse_minf(iter.mss(), minf_end)?);
        }
    }

    let timescale = timescale
        .ok_or_else(|| demux_core::error::Error::Decode("isomp4 (mdia): missing mdhd".to_string()))?;
    let kind = kind.unwrap_or(StreamKind::Audio);
    let (sample_entry, table) = minf_result
        .ok_or_else(|| demux_core::error::Error::Decode("isomp4 (mdia): missing minf".to_string()))?;

    Ok((timescale, kind, sample_entry, table))
}

fn parse_trak(mss: &mut MediaSourceStream, end: u64) -> Result<Option<TrakInfo>> {
    let mut iter = AtomIterator::new(mss, Some(end));

    let mut track_id = None;
    let mut edit_shift = 0i64;
    let mut mdia_result = None;

    while let Some(header) = iter.next()? {
        if header.atom_type == FourCc::new(b"tkhd") {
            let version_flags = iter.mss().read_be_u32()?;
            let version = (version_flags >> 24) as u8;
            if version == 1 {
                iter.mss().ignore_bytes(16)?;
                track_id = Some(iter.mss().read_be_u32()?);
            }
            else {
                iter.mss().ignore_bytes(8)?;
                track_id = Some(iter.mss().read_be_u32()?);
            }
        }
        else if header.atom_type == FourCc::new(b"edts") {
            let edts_end = header.end.unwrap_or(end);
            edit_shift = parse_edts(iter.mss(), edts_end)?;
        }
        else if header.atom_type == FourCc::new(b"mdia") {
            let mdia_end = header.end.unwrap_or(end);
            mdia_result = Some(parse_mdia(iter.mss(), mdia_end)?);
        }
    }

    let Some(track_id) = track_id else { return Ok(None) };
    let Some((timescale, kind, sample_entry, table)) = mdia_result else { return Ok(None) };

    if kind != StreamKind::Video && kind != StreamKind::Audio {
        return Ok(None);
    }

    Ok(Some(TrakInfo { track_id, timescale, kind, sample_entry, table, edit_shift }))
}

pub fn parse_moov(mss: &mut MediaSourceStream, end: u64) -> Result<Vec<TrakInfo>> {
    let mut iter = AtomIterator::new(mss, Some(end));
    let mut traks = Vec::new();

    while let Some(header) = iter.next()? {
        if header.atom_type == FourCc::new(b"trak") {
            let trak_end = header.end.unwrap_or(end);
            if let Some(trak) = parse_trak(iter.mss(), trak_end)? {
                traks.push(trak);
            }
        }
    }

    Ok(traks)
}
