//! Shared MP4 byte-builder for tests that need a two-track (AVC + AAC) file but don't care about
//! its exact framing, only that it opens and yields packets. Trimmed down from
//! `scenario_mp4_avc_aac.rs`'s fuller builder (no `avcC`/`esds` decoder-config bytes, since
//! nothing here inspects codec parameters).

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

    let avcc_payload = vec![1u8, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0, 4, 0x67, 0x64, 0x00, 0x1F, 1, 0, 2, 0x68, 0xCE];
    entry.extend_from_slice(&atom(b"avcC", &avcc_payload));

    let mut container = vec![0u8; 8 + entry.len()];
    container[..4].copy_from_slice(&((8 + entry.len()) as u32).to_be_bytes());
    container[4..8].copy_from_slice(b"avc1");
    container[8..].copy_from_slice(&entry);
    container
}

fn stsd_audio_entry() -> Vec<u8> {
    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&0u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&2u16.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 4]);
    entry.extend_from_slice(&((48000u32) << 16).to_be_bytes());

    let es_descriptor = vec![0x03, 13, 0, 0, 0x00, 0x04, 8, 0x40, 0x15, 0, 0, 0, 0, 0, 0, 0x05, 2, 0x12, 0x10];
    let mut esds_payload = vec![0u8; 4];
    esds_payload.extend_from_slice(&es_descriptor);
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

fn build_trak(track_id: u32, handler: &[u8; 4], timescale: u32, stsd_entry: Vec<u8>, samples: &[Vec<u8>]) -> (Vec<u8>, Vec<u8>) {
    let sample_size = samples[0].len() as u32;
    assert!(samples.iter().all(|s| s.len() as u32 == sample_size));

    let stbl = {
        let mut payload = Vec::new();
        payload.extend_from_slice(&stsd(stsd_entry));
        payload.extend_from_slice(&stts_constant(samples.len() as u32, 512));
        payload.extend_from_slice(&stsc_one_chunk(samples.len() as u32));
        payload.extend_from_slice(&stsz_constant(sample_size, samples.len() as u32));
        payload.extend_from_slice(&stco_one_chunk(0));
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

pub fn build_mp4() -> Vec<u8> {
    let video_samples = vec![vec![0, 0, 0, 2, 0x65, 0xAA], vec![0, 0, 0, 2, 0x41, 0xBB]];
    let audio_samples = vec![vec![0xAAu8, 0xBB, 0xCC, 0xDD], vec![0x11u8, 0x22, 0x33, 0x44]];

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
