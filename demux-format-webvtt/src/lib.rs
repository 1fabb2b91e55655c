//! WebVTT text-track demuxer: reads `WEBVTT` cue blocks as discrete text packets, one per cue,
//! with `pts`/`duration` in microseconds.
//!
//! Grounded on `demux-format-mpegaudio`'s `FormatReader` shape (single-track, fully-buffered-open
//! style), since WebVTT has no separate header/data-region split to stream incrementally; the
//! whole file is read and split into cues once, at `try_open`.

use std::collections::VecDeque;

use demux_core::codecs::{CodecId, CodecParameters};
use demux_core::error::{decode_error, Result};
use demux_core::formats::probe::{Descriptor, ProbeDataMatchSpec, Tier};
use demux_core::formats::stream::{Stream, StreamAction, StreamKind};
use demux_core::formats::track::{Track, TrackTable};
use demux_core::formats::{FormatId, FormatInfo, FormatOptions, FormatReader, NextPacket};
use demux_core::fourcc::FourCc;
use demux_core::io::MediaSourceStream;
use demux_core::metadata::MetadataMap;
use demux_core::packet::PacketBuilder;
use demux_core::units::{Duration, Timestamp};

const TIMESCALE: u32 = 1_000_000;
const TEXT_STREAM_ID: u32 = 0;

fn parse_timestamp(s: &str) -> Option<i64> {
    // `HH:MM:SS.mmm` or `MM:SS.mmm`.
    let (main, millis) = s.trim().split_once('.')?;
    let millis: i64 = millis.parse().ok()?;

    let parts: Vec<&str> = main.split(':').collect();
    let (h, m, sec) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse::<i64>().ok()?, s.parse::<i64>().ok()?),
        [m, s] => (0i64, m.parse().ok()?, s.parse::<i64>().ok()?),
        _ => return None,
    };

    Some(((h * 3600 + m * 60 + sec) * 1000 + millis) * 1000)
}

fn parse_cue_timing(line: &str) -> Option<(i64, i64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?; // ignore trailing cue settings
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

struct Cue {
    pts: i64,
    dur: i64,
    text: String,
}

fn parse_cues(body: &str) -> Vec<Cue> {
    let mut cues = Vec::new();

    for block in body.split("\n\n") {
        let mut lines = block.lines();
        let Some(first) = lines.next() else { continue };

        // A cue identifier line may precede the timing line.
        let timing_line = if first.contains("-->") {
            Some(first)
        }
        else {
            lines.next().filter(|l| l.contains("-->"))
        };

        let Some(timing_line) = timing_line else { continue };
        let Some((start, end)) = parse_cue_timing(timing_line) else { continue };

        let text: String = lines.collect::<Vec<_>>().join("\n");
        if !text.is_empty() {
            cues.push(Cue { pts: start, dur: (end - start).max(0), text });
        }
    }

    cues
}

pub struct WebVttReader {
    info: FormatInfo,
    tracks: TrackTable,
    cues: VecDeque<Cue>,
    mss: MediaSourceStream,
}

impl FormatReader for WebVttReader {
    fn try_open(mut mss: MediaSourceStream, _opts: &FormatOptions) -> Result<Self> {
        let mut raw = Vec::new();
        std::io::Read::read_to_end(&mut mss, &mut raw)?;
        let text = String::from_utf8_lossy(&raw).into_owned();

        let Some(rest) = text.strip_prefix("WEBVTT") else {
            return decode_error("webvtt: missing WEBVTT signature");
        };

        let cues: VecDeque<Cue> = parse_cues(rest.trim_start_matches(|c| c == '\r' || c == '\n')).into();

        let mut stream = Stream::new(TEXT_STREAM_ID, StreamKind::Text, CodecParameters::new(CodecId::None));
        stream.timescale = TIMESCALE;
        stream.action = StreamAction::Parse;

        let mut track = Track::new(0);
        track.add_stream(stream);

        let mut tracks = TrackTable::new();
        tracks.push(track);

        Ok(WebVttReader {
            info: FormatInfo {
                id: FormatId::new(&FourCc::new(b"VTT ")),
                short_name: "webvtt",
                long_name: "WebVTT",
            },
            tracks,
            cues,
            mss,
        })
    }

    fn format_info(&self) -> &FormatInfo {
        &self.info
    }

    fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    fn tracks_mut(&mut self) -> &mut TrackTable {
        &mut self.tracks
    }

    fn metadata(&self) -> Option<&MetadataMap> {
        None
    }

    fn next_packet(&mut self) -> Result<NextPacket> {
        let Some(cue) = self.cues.pop_front() else {
            let track = self.tracks.current_mut().expect("webvtt reader always builds exactly one track");
            let stream = track.stream_by_id_mut(TEXT_STREAM_ID).expect("text stream must exist");
            stream.mark_eof();
            return Ok(NextPacket::Eof);
        };

        let pkt = PacketBuilder::default()
            .stream_id(TEXT_STREAM_ID)
            .pts(Timestamp::new(cue.pts))
            .dur(Duration::new(cue.dur as u64))
            .data(cue.text.into_bytes())
            .build();

        Ok(NextPacket::Packet(pkt))
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        self.mss
    }
}

pub fn try_new(mss: MediaSourceStream, opts: &FormatOptions) -> Result<Box<dyn FormatReader>> {
    Ok(Box::new(WebVttReader::try_open(mss, opts)?))
}

pub fn probe_webvtt() -> Descriptor {
    Descriptor {
        name: "webvtt",
        tier: Tier::Preferred,
        spec: ProbeDataMatchSpec { markers: &[b"WEBVTT"], offset: 0, anchored: true },
        factory: try_new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn verify_parses_timestamp() {
        assert_eq!(parse_timestamp("00:00:01.000"), Some(1_000_000));
        assert_eq!(parse_timestamp("00:00:03.500"), Some(3_500_000));
    }

    #[test]
    fn verify_reads_hello_cue() {
        let data = b"WEBVTT\n\n00:00:01.000 --> 00:00:03.500\nHello".to_vec();
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let mut reader = WebVttReader::try_open(mss, &FormatOptions::default()).unwrap();

        assert_eq!(reader.tracks().current().unwrap().stream_by_id(TEXT_STREAM_ID).unwrap().timescale, TIMESCALE);

        match reader.next_packet().unwrap() {
            NextPacket::Packet(pkt) => {
                assert_eq!(pkt.pts, Timestamp::new(1_000_000));
                assert_eq!(pkt.dur, Duration::new(2_500_000));
                assert_eq!(&pkt.buf()[..5], b"Hello");
            }
            other => panic!("expected a packet, got {:?}", other),
        }

        match reader.next_packet().unwrap() {
            NextPacket::Eof => {}
            other => panic!("expected eof, got {:?}", other),
        }
    }

    #[test]
    fn verify_skips_cue_identifier_line() {
        let data = b"WEBVTT\n\n1\n00:00:00.000 --> 00:00:01.000\nFirst\n\n2\n00:00:01.000 --> 00:00:02.000\nSecond".to_vec();
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
        let reader = WebVttReader::try_open(mss, &FormatOptions::default()).unwrap();
        assert_eq!(reader.cues.len(), 2);
    }
}
