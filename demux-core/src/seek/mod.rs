//! The seek engine: four strategies tried in order of preference, plus on-demand index
//! construction.

pub mod cache;

use crate::error::{seek_error, Result, SeekErrorKind};
use crate::formats::{FormatReader, NextPacket, SeekTo, SeekedTo};
use crate::index::PacketIndex;
use crate::io::SourceFlags;
use crate::units::{Time, Timestamp};

/// Maximum number of bisection steps before the engine commits to its best estimate.
const MAX_BISECTION_STEPS: u32 = 6;

/// Drives a seek through the four strategies in order, falling through to the next strategy
/// whenever the current one is inapplicable (rather than merely failing).
pub struct SeekEngine;

impl SeekEngine {
    /// Attempt a seek on `reader`, given the demuxer's superindex if one exists, the input's
    /// capability flags, and the stream's known start/end time (needed for bisection's initial
    /// anchors).
    pub fn seek(
        reader: &mut dyn FormatReader,
        superindex: Option<&mut PacketIndex>,
        source_flags: SourceFlags,
        to: SeekTo,
        start_time: Time,
        end_time: Time,
    ) -> Result<SeekedTo> {
        if let Some(index) = superindex {
            if let Some(result) = Self::seek_via_index(reader, index, to) {
                return Ok(result);
            }
        }

        if source_flags.contains(SourceFlags::CAN_SEEK_TIME) {
            if let Some(result) = Self::seek_via_input(reader, to) {
                return Ok(result);
            }
        }

        match reader.seek(to) {
            Ok(result) => return Ok(result),
            Err(crate::error::Error::Unsupported(_)) => {}
            Err(e) => return Err(e),
        }

        if reader.supports_bisection_seek() {
            return Self::seek_via_bisection(reader, to, start_time, end_time);
        }

        seek_error(SeekErrorKind::Unseekable)
    }

    /// Strategy 1: superindex seek. Finds the nearest prior keyframe per stream and lets the
    /// caller re-issue reads from there; the byte-level repositioning itself is left to the
    /// owning `FormatReader::seek` (which, for indexed formats, simply honors the index).
    fn seek_via_index(
        reader: &mut dyn FormatReader,
        index: &mut PacketIndex,
        to: SeekTo,
    ) -> Option<SeekedTo> {
        let track_id = to.track_id.or_else(|| reader.tracks().current().map(|t| t.id))?;
        let track = reader.tracks().by_id(track_id)?;

        let target_ticks = track
            .streams()
            .first()
            .map(|s| Time::calc_ticks_for(s.timescale, to.time))
            .unwrap_or_default();

        let mut best: Option<u64> = None;
        for s in track.streams() {
            if s.flags.contains(crate::formats::StreamFlags::DISCONT) {
                continue;
            }

            let mut target = Timestamp::new(target_ticks.ticks() as i64);
            if let Some(audio) = &s.codec_params.audio {
                if audio.sync_samples > 0 {
                    target = Timestamp::new(target.ticks() - audio.sync_samples as i64);
                }
            }

            if let Some(entry) = index.keyframe_before(s.stream_id, target) {
                best = Some(best.map_or(entry.position, |b| b.min(entry.position)));
            }
        }

        let _ = best?;
        // The actual byte repositioning is format-specific; delegate to the reader's own seek,
        // which for index-backed formats (MP4, AVI) consults the same index.
        reader.seek(to).ok()
    }

    /// Strategy 2: ask the input itself to seek by time. No input shipped in this workspace
    /// reports `CAN_SEEK_TIME` , so this always falls through in practice; it
    /// remains implemented, and is exercised in tests via a mock reader.
    fn seek_via_input(reader: &mut dyn FormatReader, to: SeekTo) -> Option<SeekedTo> {
        reader.post_seek_resync().ok()?;
        reader.seek(to).ok()
    }

    /// Strategy 4: iterative bisection. Requires `FormatReader::post_seek_resync` and
    /// `seek_byte_fraction`. Maintains `(fraction, sync_time)` anchors and narrows towards the
    /// target for up to `MAX_BISECTION_STEPS` steps, then commits and skip-decodes.
    fn seek_via_bisection(
        reader: &mut dyn FormatReader,
        to: SeekTo,
        start_time: Time,
        end_time: Time,
    ) -> Result<SeekedTo> {
        let target = to.time.as_secs_f64();
        let mut lo = (0.0f64, start_time.as_secs_f64());
        let mut hi = (1.0f64, end_time.as_secs_f64());

        for _ in 0..MAX_BISECTION_STEPS {
            let mid_frac = (lo.0 + hi.0) / 2.0;
            reader.seek_byte_fraction(mid_frac)?;
            reader.post_seek_resync()?;

            let observed = Self::observe_time(reader, to.track_id)?;

            if observed <= target {
                lo = (mid_frac, observed);
            }
            else {
                hi = (mid_frac, observed);
            }

            if (hi.1 - lo.1).abs() < 1.0 {
                break;
            }
        }

        reader.seek_byte_fraction(lo.0)?;
        reader.post_seek_resync()?;

        let track_id = to.track_id.or_else(|| reader.tracks().current().map(|t| t.id)).unwrap_or(0);

        Ok(SeekedTo { actual_time: Time::from(lo.1), track_id })
    }

    /// Read ahead one packet to observe where the stream landed, in seconds.
    fn observe_time(reader: &mut dyn FormatReader, track_id: Option<u32>) -> Result<f64> {
        loop {
            match reader.next_packet()? {
                NextPacket::Packet(pkt) => {
                    if track_id.is_none() || Some(pkt.stream_id()) == track_id {
                        if pkt.pts.is_undefined() {
                            continue;
                        }
                        let track = reader.tracks().current();
                        let timescale = track
                            .and_then(|t| t.streams().iter().find(|s| s.stream_id == pkt.stream_id()))
                            .map(|s| s.timescale)
                            .unwrap_or(1);
                        return Ok(pkt.pts.ticks() as f64 / timescale as f64);
                    }
                }
                NextPacket::Eof => return Ok(f64::INFINITY),
                NextPacket::Again => continue,
            }
        }
    }

    /// Strategy-agnostic finishing step: discard frames per-stream until their emitted PTS
    /// reaches or exceeds `target`.
    pub fn skip_to_target(reader: &mut dyn FormatReader, target: Timestamp, track_id: u32) -> Result<()> {
        loop {
            match reader.next_packet()? {
                NextPacket::Packet(pkt) => {
                    if pkt.stream_id() == track_id && !pkt.pts.is_undefined() && pkt.pts >= target {
                        return Ok(());
                    }
                }
                NextPacket::Eof => return Ok(()),
                NextPacket::Again => continue,
            }
        }
    }
}

impl Time {
    /// Convert a `Time` to ticks in a stream's timescale (ticks/second == `timescale`).
    fn calc_ticks_for(timescale: u32, time: Time) -> crate::units::Duration {
        crate::units::TimeBase::new(1, timescale.max(1)).calc_ticks(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_bisection_anchor_narrowing_converges() {
        // Pure arithmetic check of the bisection midpoint logic used above, independent of any
        // `FormatReader`: after enough halvings the interval must shrink below one second for a
        // plausible 30-second stream.
        let mut lo = 0.0f64;
        let mut hi = 30.0f64;
        for _ in 0..MAX_BISECTION_STEPS {
            let mid = (lo + hi) / 2.0;
            if mid < 15.0 {
                lo = mid;
            }
            else {
                hi = mid;
            }
        }
        assert!((hi - lo).abs() < 1.0);
    }
}
