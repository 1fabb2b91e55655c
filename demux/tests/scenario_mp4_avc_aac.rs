//! Scenario 2 : MP4 with one H.264 (`avc1`) video track and one AAC (`mp4a`)
//! audio track, each with their own `moov/trak/mdia/minf/stbl`, opened through the facade probe.

use std::io::Cursor;

use demux_core::codecs::CodecId;
use demux_core::formats::stream::StreamKind;
use demux_core::formats::{FormatOptions, NextPacket};
use demux_core::io::MediaSourceStream;

fn atom(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(payload);
    out
}

fn tkhd(track_id: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&track_id.to_be_bytes());
    atom(b"tkhd", &payload)
}

fn mdhd(timescale: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    atom(b"mdhd", &payload)
}

fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload.extend_from_slice(handler);
    payload.extend_from_slice(&[0u8; 12]);
    atom(b"hdlr", &payload)
}

fn stsz_constant(size: u32, count: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&size.to_be_bytes());
    payload.extend_from_slice(&count.to_be_bytes());
    atom(b"stsz", &payload)
}

fn stsc_one_chunk(samples_per_chunk: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&samples_per_chunk.to_be_bytes());
    payload.extend_from_slice(&1u32.to_be_bytes());
    atom(b"stsc", &payload)
}

fn stco_one_chunk(offset: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&offset.to_be_bytes());
    atom(b"stco", &payload)
}

fn stts_constant(count: u32, delta: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&count.to_be_bytes());
    payload.extend_from_slice(&delta.to_be_bytes());
    atom(b"stts", &payload)
}

fn avcc(profile: u8, level: u8) -> Vec<u8> {
    let mut payload = vec![1u8, profile, 0x00, level, 0xFF];
    payload.push(0xE1); // 1 SPS follows
    payload.extend_from_slice(&4u16.to_be_bytes());
    payload.extend_from_slice(&[0x67, profile, 0x00, level]);
    payload.push(1); // 1 PPS follows
    payload.extend_from_slice(&2u16.to_be_bytes());
    payload.extend_from_slice(&[0x68, 0xCE]);
    atom(b"avcC", &payload)
}

fn stsd_video_entry() -> Vec<u8> {
    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 16]);
    entry.extend_from_slice(&320u16.to_be_bytes());
    entry.extend_from_slice(&240u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 8]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 32]);
    entry.extend_from_slice(&24u16.to_be_bytes());
    entry.extend_from_slice(&0xFFFFu16.to_be_bytes());
    entry.extend_from_slice(&avcc(0x64, 0x1F));

    let mut container = vec![0u8; 8 + entry.len()];
    container[..4].copy_from_slice(&((8 + entry.len()) as u32).to_be_bytes());
    container[4..8].copy_from_slice(b"avc1");
    container[8..].copy_from_slice(&entry);
    container
}

fn es_descriptor(object_type: u8, dec_specific_info: &[u8]) -> Vec<u8> {
    let mut decoder_config = vec![object_type, 0x15, 0, 0, 0, 0, 0, 0];
    decoder_config.push(0x05); // DecSpecificInfoTag
    decoder_config.push(dec_specific_info.len() as u8);
    decoder_config.extend_from_slice(dec_specific_info);

    let mut es = vec![0x03, 0, 0, 0, 0x00]; // ES_DescrTag, placeholder len, ES_ID, flags
    es.push(0x04); // DecoderConfigDescrTag
    es.push(decoder_config.len() as u8);
    es.extend_from_slice(&decoder_config);
    es[1] = (es.len() - 2) as u8;
    es
}

fn stsd_audio_entry() -> Vec<u8> {
    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&0u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&2u16.to_be_bytes()); // channels
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 4]);
    entry.extend_from_slice(&((48000u32) << 16).to_be_bytes());

    // esds: version/flags then the ES_Descriptor.
    let mut esds_payload = vec![0u8; 4];
    esds_payload.extend_from_slice(&es_descriptor(0x40, &[0x12, 0x10]));
    entry.extend_from_slice(&atom(b"esds", &esds_payload));

    let mut container = vec![0u8; 8 + entry.len()];
    container[..4].copy_from_slice(&((8 + entry.len()) as u32).to_be_bytes());
    container[4..8].copy_from_slice(b"mp4a");
    container[8..].copy_from_slice(&entry);
    container
}

fn stsd(entry: Vec<u8>) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&entry);
    atom(b"stsd", &payload)
}

/// Every sample in both tracks built below is the same size, so `stsz`'s constant-size form
/// applies; a real encoder's variable sizes are exercised by `demux-format-isomp4`'s own
/// `sample_table` unit tests instead of being duplicated here.
fn build_trak(track_id: u32, handler: &[u8; 4], timescale: u32, stsd_entry: Vec<u8>, samples: &[Vec<u8>]) -> (Vec<u8>, Vec<u8>) {
    let sample_size = samples[0].len() as u32;
    assert!(samples.iter().all(|s| s.len() as u32 == sample_size));

    let stbl = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&stsd(stsd_entry));
        payload.extend_from_slice(&stts_constant(samples.len() as u32, 512));
        payload.extend_from_slice(&stsc_one_chunk(samples.len() as u32));
        payload.extend_from_slice(&stsz_constant(sample_size, samples.len() as u32));
        payload.extend_from_slice(&stco_one_chunk(0)); // patched by caller
        atom(b"stbl", &payload)
    };
    let minf = atom(b"minf", &stbl);
    let mdia = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&mdhd(timescale));
        payload.extend_from_slice(&hdlr(handler));
        payload.extend_from_slice(&minf);
        atom(b"mdia", &payload)
    };
    let mut trak_payload = Vec::new();
    trak_payload.extend_from_slice(&tkhd(track_id));
    trak_payload.extend_from_slice(&mdia);

    let mut sample_bytes = Vec::new();
    for s in samples {
        sample_bytes.extend_from_slice(s);
    }
    (atom(b"trak", &trak_payload), sample_bytes)
}

fn build_video_samples() -> Vec<Vec<u8>> {
    vec![vec![0, 0, 0, 2, 0x65, 0xAA], vec![0, 0, 0, 2, 0x41, 0xBB]]
}

fn build_audio_samples() -> Vec<Vec<u8>> {
    vec![vec![0xAAu8, 0xBB, 0xCC, 0xDD], vec![0x11u8, 0x22, 0x33, 0x44]]
}

fn build_mp4() -> Vec<u8> {
    let video_samples = build_video_samples();
    let audio_samples = build_audio_samples();

    let (video_trak, video_bytes) = build_trak(1, b"vide", 30, stsd_video_entry(), &video_samples);
    let (audio_trak, audio_bytes) = build_trak(2, b"soun", 48000, stsd_audio_entry(), &audio_samples);

    let moov = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&video_trak);
        payload.extend_from_slice(&audio_trak);
        atom(b"moov", &payload)
    };

    let ftyp = atom(b"ftyp", b"isomiso2mp41");

    let mut file = Vec::new();
    file.extend_from_slice(&ftyp);

    let video_mdat_pos = file.len() as u32 + 8;
    file.extend_from_slice(&atom(b"mdat", &video_bytes));
    let audio_mdat_pos = file.len() as u32 + 8;
    file.extend_from_slice(&atom(b"mdat", &audio_bytes));
    file.extend_from_slice(&moov);

    let video_needle = stco_one_chunk(0);
    let video_patch = stco_one_chunk(video_mdat_pos);
    let pos = file.windows(video_needle.len()).position(|w| w == video_needle).expect("video stco present");
    file[pos..pos + video_needle.len()].copy_from_slice(&video_patch);

    let audio_patch = stco_one_chunk(audio_mdat_pos);
    let pos = file.windows(video_needle.len()).rposition(|w| w == video_needle).expect("audio stco present");
    file[pos..pos + video_needle.len()].copy_from_slice(&audio_patch);

    file
}

#[test]
fn probe_opens_mp4_with_avc_and_aac_tracks() {
    let data = build_mp4();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)));
    let mut reader = demux::open(mss, &FormatOptions::default()).unwrap();

    assert_eq!(reader.format_info().short_name, "isomp4");
    assert_eq!(reader.tracks().len(), 1);

    let track = reader.tracks().current().unwrap();
    assert_eq!(track.streams().len(), 2);

    let video = track.streams().iter().find(|s| s.kind == StreamKind::Video).unwrap();
    assert_eq!(video.codec_params.id, CodecId::H264);

    let audio = track.streams().iter().find(|s| s.kind == StreamKind::Audio).unwrap();
    assert_eq!(audio.codec_params.id, CodecId::Aac);

    let mut video_packets = 0;
    let mut audio_packets = 0;
    loop {
        match reader.next_packet().unwrap() {
            NextPacket::Packet(pkt) => {
                if pkt.stream_id() == video.stream_id {
                    video_packets += 1;
                    // AVCC -> Annex-B rewrite prepends a 4-byte start code per NAL.
                    assert_eq!(&pkt.buf()[..4], &[0, 0, 0, 1]);
                }
                else {
                    audio_packets += 1;
                }
            }
            NextPacket::Eof => break,
            NextPacket::Again => continue,
        }
    }

    assert_eq!(video_packets, 2);
    assert_eq!(audio_packets, 2);
}
