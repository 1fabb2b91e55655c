//! Scenario 4 : MPEG-TS with a PAT naming one program, whose PMT in turn names
//! an H.264 video PID and an AC-3 audio PID, opened through the facade probe.

use std::io::Cursor;

use demux_core::codecs::CodecId;
use demux_core::formats::stream::StreamKind;
use demux_core::formats::{FormatOptions, NextPacket};
use demux_core::io::MediaSourceStream;
use demux_core::units::Timestamp;

const TS_PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
const PID_PAT: u16 = 0x0000;
const TABLE_ID_PAT: u8 = 0x00;
const TABLE_ID_PMT: u8 = 0x02;
const STREAM_TYPE_H264: u8 = 0x1B;
const STREAM_TYPE_AC3_ATSC: u8 = 0x81;

fn crc_placeholder() -> [u8; 4] {
    [0, 0, 0, 0]
}

fn ts_packet(pid: u16, payload_unit_start: bool, payload: &[u8]) -> [u8; TS_PACKET_SIZE] {
    let mut pkt = [0xFFu8; TS_PACKET_SIZE];
    pkt[0] = SYNC_BYTE;
    pkt[1] = if payload_unit_start { 0x40 } else { 0x00 } | (((pid >> 8) & 0x1F) as u8);
    pkt[2] = (pid & 0xFF) as u8;
    pkt[3] = 0x10;
    let start = 4;
    let n = payload.len().min(TS_PACKET_SIZE - start);
    pkt[start..start + n].copy_from_slice(&payload[..n]);
    pkt
}

fn pat_section() -> Vec<u8> {
    let mut section = vec![0u8; 8];
    section[0] = TABLE_ID_PAT;
    let section_length = 9 + 4;
    section[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
    section[2] = (section_length & 0xFF) as u8;
    section[3] = 0x00;
    section[4] = 0x01;
    section[5] = 0xC1;
    section[6] = 0x00;
    section[7] = 0x00;
    section.extend_from_slice(&[0x00, 0x01]);
    section.extend_from_slice(&[0xE1, 0x00]);
    section.extend_from_slice(&crc_placeholder());
    section
}

fn pmt_section() -> Vec<u8> {
    let mut section = vec![0u8; 12];
    section[0] = TABLE_ID_PMT;
    let stream_entries = [(STREAM_TYPE_H264, 0x101u16), (STREAM_TYPE_AC3_ATSC, 0x102u16)];
    let section_length = 9 + stream_entries.len() * 5 + 4;
    section[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
    section[2] = (section_length & 0xFF) as u8;
    section[3] = 0x00;
    section[4] = 0x01;
    section[5] = 0xC1;
    section[6] = 0x00;
    section[7] = 0x00;
    section[8] = 0xE1;
    section[9] = 0x01;
    section[10] = 0xF0;
    section[11] = 0x00;
    for (stream_type, pid) in stream_entries {
        section.push(stream_type);
        section.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
        section.push((pid & 0xFF) as u8);
        section.push(0xF0);
        section.push(0x00);
    }
    section.extend_from_slice(&crc_placeholder());
    section
}

fn pes_packet(pts: u64, es_data: &[u8]) -> Vec<u8> {
    let mut pes = vec![0x00, 0x00, 0x01, 0xE0];
    let header_data_length = 5u8;
    let packet_len = (3 + header_data_length as usize + es_data.len()) as u16;
    pes.extend_from_slice(&packet_len.to_be_bytes());
    pes.push(0x80);
    pes.push(0x80);
    pes.push(header_data_length);
    pes.push(0x21 | (((pts >> 29) & 0x0E) as u8));
    pes.push(((pts >> 22) & 0xFF) as u8);
    pes.push((0x01 | ((pts >> 14) & 0xFE)) as u8);
    pes.push(((pts >> 7) & 0xFF) as u8);
    pes.push((0x01 | ((pts << 1) & 0xFE)) as u8);
    pes.extend_from_slice(es_data);
    pes
}

fn build_ts_stream() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&ts_packet(PID_PAT, true, &{
        let mut p = vec![0x00];
        p.extend_from_slice(&pat_section());
        p
    }));
    data.extend_from_slice(&ts_packet(0x100, true, &{
        let mut p = vec![0x00];
        p.extend_from_slice(&pmt_section());
        p
    }));

    let mut first_au = vec![0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
    first_au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00]);
    let first_pes = pes_packet(90_000, &first_au);
    data.extend_from_slice(&ts_packet(0x101, true, &first_pes));

    let mut second_au = vec![0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
    second_au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x20, 0x00]);
    let second_pes = pes_packet(93_600, &second_au);
    data.extend_from_slice(&ts_packet(0x101, true, &second_pes));

    let ac3_es = vec![0x0Bu8, 0x77, 0x01, 0x02, 0x03, 0x04];
    let ac3_pes = pes_packet(90_000, &ac3_es);
    data.extend_from_slice(&ts_packet(0x102, true, &ac3_pes));

    data
}

#[test]
fn probe_opens_ts_stream_via_pat_and_pmt() {
    let data = build_ts_stream();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    let mut reader = demux::open(mss, &FormatOptions::default()).unwrap();

    assert_eq!(reader.format_info().short_name, "mpegts");
    assert_eq!(reader.tracks().len(), 1);

    let track = reader.tracks().current().unwrap();
    let video = track.stream_by_id(0x101).unwrap();
    let audio = track.stream_by_id(0x102).unwrap();
    assert_eq!(video.kind, StreamKind::Video);
    assert_eq!(video.codec_params.id, CodecId::H264);
    assert_eq!(audio.kind, StreamKind::Audio);
    assert_eq!(audio.codec_params.id, CodecId::Ac3);

    let mut saw_video = false;
    let mut saw_audio_pts = false;
    loop {
        match reader.next_packet().unwrap() {
            NextPacket::Packet(pkt) if pkt.stream_id() == 0x101 => saw_video = true,
            NextPacket::Packet(pkt) if pkt.stream_id() == 0x102 => {
                assert_eq!(pkt.pes_pts, Timestamp::new(90_000));
                saw_audio_pts = true;
            }
            NextPacket::Packet(_) => {}
            NextPacket::Eof => break,
            NextPacket::Again => continue,
        }
    }

    assert!(saw_video);
    assert!(saw_audio_pts);
}
