//! The superindex: a demuxer-wide, position-sorted packet index supporting seek-by-pts and
//! keyframe queries, used both by natively-indexed formats (MP4 sample tables, AVI `idx1`) and by
//! the seek engine's on-demand index builder.

use crate::units::{Duration, Timestamp};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct IndexEntryFlags {
    pub keyframe: bool,
}

/// One row of the superindex: `(stream_id, position, pts, duration, flags)`.
#[derive(Copy, Clone, Debug)]
pub struct IndexEntry {
    pub stream_id: u32,
    pub position: u64,
    pub size: u32,
    pub pts: Timestamp,
    pub duration: Duration,
    pub flags: IndexEntryFlags,
}

/// A sorted-by-position packet index for an entire demuxer session.
///
/// Grounded on symphonia-core's `formats::util::SeekIndex` binary-search algorithm, generalized
/// to carry every stream's entries together (rather than one index per format): this
/// superindex is demuxer-wide, not per-stream.
#[derive(Default)]
pub struct PacketIndex {
    entries: Vec<IndexEntry>,
    /// Whether `entries` is currently sorted by `position`; insertion doesn't always preserve
    /// this (fragmented MP4 appends out of order relative to other streams).
    sorted: bool,
}

impl PacketIndex {
    pub fn new() -> Self {
        PacketIndex { entries: Vec::new(), sorted: true }
    }

    pub fn push(&mut self, entry: IndexEntry) {
        if let Some(last) = self.entries.last() {
            if entry.position < last.position {
                self.sorted = false;
            }
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.entries.sort_by_key(|e| e.position);
            self.sorted = true;
        }
    }

    /// Binary search for the entry of `stream_id` whose PTS is nearest to, and not after,
    /// `target`. Grounded on symphonia's `SeekIndex::search` binary search.
    pub fn seek(&mut self, stream_id: u32, target: Timestamp) -> Option<IndexEntry> {
        self.ensure_sorted();

        let stream_entries: Vec<&IndexEntry> =
            self.entries.iter().filter(|e| e.stream_id == stream_id).collect();

        if stream_entries.is_empty() {
            return None;
        }

        let mut lo = 0usize;
        let mut hi = stream_entries.len();

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if stream_entries[mid].pts <= target {
                lo = mid + 1;
            }
            else {
                hi = mid;
            }
        }

        if lo == 0 {
            Some(*stream_entries[0])
        }
        else {
            Some(*stream_entries[lo - 1])
        }
    }

    /// The nearest keyframe at or before `entry_pts` for `stream_id`.
    pub fn keyframe_before(&mut self, stream_id: u32, target: Timestamp) -> Option<IndexEntry> {
        self.ensure_sorted();

        self.entries
            .iter()
            .filter(|e| e.stream_id == stream_id && e.flags.keyframe && e.pts <= target)
            .max_by_key(|e| e.pts)
            .copied()
    }

    /// The byte-position range `[first, last]` covered by `stream_id`'s entries, used by the
    /// demuxer context to detect non-interleaved layouts, by comparing per-stream first/last
    /// superindex positions.
    pub fn position_range(&self, stream_id: u32) -> Option<(u64, u64)> {
        let mut range = None;
        for e in self.entries.iter().filter(|e| e.stream_id == stream_id) {
            range = Some(match range {
                None => (e.position, e.position),
                Some((lo, hi)) => (lo.min(e.position), hi.max(e.position)),
            });
        }
        range
    }
}
