//! The demuxer framework: the [`FormatReader`] trait every container demuxer implements, plus the
//! probe registry, track table, and per-stream pipeline it is built from.

pub mod probe;
pub mod stream;
pub mod track;

use crate::error::Result;
use crate::fourcc::FourCc;
use crate::io::MediaSourceStream;
use crate::metadata::MetadataMap;
use crate::packet::Packet;
use crate::units::Time;

pub use stream::{Stream, StreamAction, StreamFlags, StreamKind};
pub use track::{Track, TrackTable};

/// A stable identifier for a container format, derived from its short name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FormatId(u32);

impl FormatId {
    pub const fn new(short_name: &FourCc) -> Self {
        FormatId(short_name.to_be_u32())
    }
}

#[derive(Clone, Debug)]
pub struct FormatInfo {
    pub id: FormatId,
    pub short_name: &'static str,
    pub long_name: &'static str,
}

/// Options supplied to [`FormatReader::open`], grounded on symphonia-core's `FormatOptions`.
#[derive(Clone, Debug)]
pub struct FormatOptions {
    pub enable_gapless: bool,
    pub sample_accurate: bool,
    pub index_mode: IndexMode,
    /// Number of bytes the probe/open sequence is allowed to read ahead before giving up.
    pub prebuffer_bytes: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            enable_gapless: true,
            sample_accurate: false,
            index_mode: IndexMode::Simple,
            prebuffer_bytes: 1024 * 1024,
        }
    }
}

/// Whether, and how, the seek engine should build an on-demand packet index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexMode {
    None,
    Simple,
    /// Media-info index: like `Simple`, but also collects per-stream codec metadata while
    /// scanning (duration, average bitrate) for formats that cannot report it up front.
    MediaInfo,
}

/// A seek request.
#[derive(Copy, Clone, Debug)]
pub struct SeekTo {
    pub time: Time,
    pub track_id: Option<u32>,
    /// Request the most accurate seek possible, upgrading to a superindex-backed strategy if
    /// needed.
    pub accurate: bool,
}

/// The outcome of a successful seek.
#[derive(Copy, Clone, Debug)]
pub struct SeekedTo {
    pub actual_time: Time,
    pub track_id: u32,
}

/// The result of pulling one packet from a [`FormatReader`]: an `{Ok, Eof, Again}` pull-status
/// axis rather than bundling "no more data yet" into an error.
#[derive(Debug)]
pub enum NextPacket {
    Packet(Packet),
    /// The demuxer will not produce any more packets.
    Eof,
    /// No packet is available yet, but more data may arrive later (non-blocking input underflow).
    Again,
}

/// The demuxer framework's core contract: one implementation per container format.
pub trait FormatReader {
    /// Probe `mss` and, if this is a recognized instance of the format, open it and populate the
    /// returned reader's track table. `mss`'s read cursor is at the start of the file.
    fn try_open(mss: MediaSourceStream, opts: &FormatOptions) -> Result<Self>
    where
        Self: Sized;

    fn format_info(&self) -> &FormatInfo;

    fn tracks(&self) -> &TrackTable;

    fn tracks_mut(&mut self) -> &mut TrackTable;

    fn metadata(&self) -> Option<&MetadataMap>;

    /// Read until a packet can be delivered to exactly one stream, or the demuxer reaches EOF.
    fn next_packet(&mut self) -> Result<NextPacket>;

    /// One-shot or superindex-backed seek. Formats with no native seek plan leave this
    /// unimplemented (`Unsupported`), which upgrades the seek engine to iterative bisection.
    fn seek(&mut self, _to: SeekTo) -> Result<SeekedTo> {
        crate::error::unsupported_error("this format does not implement native seeking")
    }

    /// Re-establish parser/demuxer sync immediately after a byte-level seek landed at an
    /// arbitrary offset (used by the iterative-bisection strategy).
    fn post_seek_resync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether this format supports the iterative-bisection seek strategy. Formats without a
    /// native index but with a byte-stepped `post_seek_resync` (e.g. AVI without `idx1`) should
    /// return `true` and implement `seek_byte_fraction`.
    fn supports_bisection_seek(&self) -> bool {
        false
    }

    /// Seek the underlying byte source to approximately `fraction` (0.0..=1.0) of its total
    /// length, without attempting to interpret container structure at the new position. Only
    /// called by the bisection seek strategy.
    fn seek_byte_fraction(&mut self, _fraction: f64) -> Result<()> {
        crate::error::unsupported_error("this format does not support byte-fraction seeking")
    }

    fn select_track(&mut self, track_id: u32) -> Result<()> {
        if self.tracks().by_id(track_id).is_some() {
            self.tracks_mut().select(track_id);
            Ok(())
        }
        else {
            crate::error::unsupported_error("no such track")
        }
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream;
}
