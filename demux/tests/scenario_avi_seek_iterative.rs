//! Scenario 6 : a 10-frame MPEG-4 ASP AVI with no `idx1`, on an input that
//! cannot seek by time, driven through [`SeekEngine`] end to end. With no superindex, no
//! time-seekable input, and the reader's own `seek` refusing for lack of an index, the engine
//! must fall through to iterative byte bisection.

mod fixtures;

use std::io::Cursor;

use demux_core::formats::{FormatOptions, FormatReader, NextPacket, SeekTo};
use demux_core::io::{MediaSourceStream, SourceFlags};
use demux_core::seek::SeekEngine;
use demux_core::units::Time;

#[test]
fn seek_engine_falls_through_to_bisection_without_index_or_time_seekable_input() {
    let n_frames = 10u32;
    let rate = 25.0;
    let data = fixtures::avi::build_avi_without_index(n_frames);

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    let mut reader = demux::open(mss, &FormatOptions::default()).unwrap();

    assert!(reader.supports_bisection_seek());

    let start_time = Time::from(0.0);
    let end_time = Time::from(n_frames as f64 / rate);
    let to = SeekTo { time: Time::from(0.2), track_id: None, accurate: false };

    let seeked = SeekEngine::seek(reader.as_mut(), None, SourceFlags::empty(), to, start_time, end_time).unwrap();

    // Bisection narrows toward 0.2s but, as an under-approximating strategy, must not land past it.
    assert!(seeked.actual_time.as_secs_f64() <= to.time.as_secs_f64() + 0.05);
    assert!(seeked.actual_time.as_secs_f64() >= 0.0);

    let mut saw_packet_at_or_after_target = false;
    loop {
        match reader.next_packet().unwrap() {
            NextPacket::Packet(pkt) => {
                let track = reader.tracks().current().unwrap();
                let timescale = track.streams().first().unwrap().timescale;
                let t = pkt.pts.ticks() as f64 / timescale as f64;
                if t >= to.time.as_secs_f64() - 0.05 {
                    saw_packet_at_or_after_target = true;
                    break;
                }
            }
            NextPacket::Eof => break,
            NextPacket::Again => continue,
        }
    }
    assert!(saw_packet_at_or_after_target);
}
