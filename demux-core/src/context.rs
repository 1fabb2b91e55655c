//! The demuxer context: the shared state a `FormatReader` owns across calls (the input, the
//! current track table, the optional superindex, and stream-routing state).

use bitflags::bitflags;

use crate::formats::{IndexMode, TrackTable};
use crate::index::PacketIndex;
use crate::io::MediaSourceStream;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct DemuxerContextFlags: u32 {
        /// The input is seekable AND the demuxer has a credible seek plan.
        const CAN_SEEK          = 1 << 0;
        /// Streams do not interleave; delivery must be driven per-stream via `request_stream`.
        const NONINTERLEAVED    = 1 << 1;
        /// The source is discontinuous (live capture, ICY metadata breaks, …).
        const DISCONT           = 1 << 2;
        const HAS_CLOCK_TIME    = 1 << 3;
        /// Peeking for more data forces an actual blocking read (no non-blocking input exists in
        /// this workspace, so this flag is modeled but never set).
        const PEEK_FORCES_READ  = 1 << 4;
        const SAMPLE_ACCURATE   = 1 << 5;
        const LIVE              = 1 << 6;
        const GET_DURATION      = 1 << 7;
    }
}

/// State shared by a `FormatReader` implementation and the framework plumbing around it.
pub struct DemuxerContext {
    pub input: MediaSourceStream,
    pub track_table: TrackTable,
    pub superindex: Option<PacketIndex>,
    /// Cursor into `superindex` when delivery is driven directly from the index.
    pub index_position: usize,
    /// Set by a stream's pull source on buffer underflow; `next_packet` must honor this in
    /// `NONINTERLEAVED` mode.
    pub request_stream: Option<u32>,
    pub flags: DemuxerContextFlags,
    pub index_mode: IndexMode,
}

impl DemuxerContext {
    pub fn new(input: MediaSourceStream, index_mode: IndexMode) -> Self {
        DemuxerContext {
            input,
            track_table: TrackTable::new(),
            superindex: None,
            index_position: 0,
            request_stream: None,
            flags: DemuxerContextFlags::empty(),
            index_mode,
        }
    }

    /// Detect non-interleaved layout by comparing each stream's first/last superindex byte
    /// position against every other stream's; if no two streams' ranges overlap, the container is
    /// effectively laid out one stream at a time.
    pub fn recompute_interleave_flag(&mut self) {
        let Some(index) = &self.superindex else { return };
        let Some(track) = self.track_table.current() else { return };

        let ranges: Vec<(u64, u64)> =
            track.streams().iter().filter_map(|s| index.position_range(s.stream_id)).collect();

        let mut any_overlap = false;
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                let (a0, a1) = ranges[i];
                let (b0, b1) = ranges[j];
                if a0 <= b1 && b0 <= a1 {
                    any_overlap = true;
                }
            }
        }

        self.flags.set(DemuxerContextFlags::NONINTERLEAVED, ranges.len() > 1 && !any_overlap);
    }
}
