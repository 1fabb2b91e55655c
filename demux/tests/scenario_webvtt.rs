//! Scenario 5 : WebVTT, opened through the facade probe, yielding one text
//! packet per cue with a cue identifier line skipped ahead of its timing line.

use std::io::Cursor;

use demux_core::formats::stream::StreamKind;
use demux_core::formats::{FormatOptions, NextPacket};
use demux_core::io::MediaSourceStream;
use demux_core::units::{Duration, Timestamp};

fn build_vtt() -> Vec<u8> {
    b"WEBVTT\n\n\
      1\n00:00:01.000 --> 00:00:03.500\nFirst cue\n\n\
      00:00:04.000 --> 00:00:05.250\nSecond cue"
        .to_vec()
}

#[test]
fn probe_opens_vtt_and_reads_cues_in_order() {
    let data = build_vtt();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    let mut reader = demux::open(mss, &FormatOptions::default()).unwrap();

    assert_eq!(reader.format_info().short_name, "webvtt");
    assert_eq!(reader.tracks().len(), 1);

    let track = reader.tracks().current().unwrap();
    let stream = track.streams().first().unwrap();
    assert_eq!(stream.kind, StreamKind::Text);

    match reader.next_packet().unwrap() {
        NextPacket::Packet(pkt) => {
            assert_eq!(pkt.pts, Timestamp::new(1_000_000));
            assert_eq!(pkt.dur, Duration::new(2_500_000));
            assert_eq!(pkt.buf(), b"First cue");
        }
        other => panic!("expected a packet, got {:?}", other),
    }

    match reader.next_packet().unwrap() {
        NextPacket::Packet(pkt) => {
            assert_eq!(pkt.pts, Timestamp::new(4_000_000));
            assert_eq!(pkt.dur, Duration::new(1_250_000));
            assert_eq!(pkt.buf(), b"Second cue");
        }
        other => panic!("expected a packet, got {:?}", other),
    }

    match reader.next_packet().unwrap() {
        NextPacket::Eof => {}
        other => panic!("expected eof, got {:?}", other),
    }
}
