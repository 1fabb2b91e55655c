//! Shared no-`idx1` AVI byte-builder, reused by `scenario_avi_seek_iterative.rs` and the seek
//! property tests in `property_tests.rs`.

fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(tag);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(list_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut inner = Vec::new();
    inner.extend_from_slice(list_type);
    inner.extend_from_slice(body);
    chunk(b"LIST", &inner)
}

fn build_strh(fcc_type: &[u8; 4], fcc_handler: &[u8; 4], scale: u32, rate: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(fcc_type);
    body.extend_from_slice(fcc_handler);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&scale.to_le_bytes());
    body.extend_from_slice(&rate.to_le_bytes());
    body
}

fn build_strf_video(width: u32, height: u32, compression: &[u8; 4]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&40u32.to_le_bytes());
    body.extend_from_slice(&width.to_le_bytes());
    body.extend_from_slice(&height.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&24u16.to_le_bytes());
    body.extend_from_slice(compression);
    body.extend_from_slice(&[0u8; 20]);
    body
}

pub fn build_avi_without_index(n_frames: u32) -> Vec<u8> {
    let strl = list(
        b"strl",
        &[chunk(b"strh", &build_strh(b"vids", b"XVID", 1, 25)), chunk(b"strf", &build_strf_video(320, 240, b"XVID"))]
            .concat(),
    );

    let hdrl_body = [
        chunk(b"avih", &{
            let mut b = Vec::new();
            b.extend_from_slice(&40_000u32.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&0u32.to_le_bytes());
            b.extend_from_slice(&n_frames.to_le_bytes());
            b.extend_from_slice(&[0u8; 20]);
            b
        }),
        strl,
    ]
    .concat();
    let hdrl = list(b"hdrl", &hdrl_body);

    let mut movi_body = Vec::new();
    movi_body.extend_from_slice(b"movi");
    for i in 0..n_frames {
        movi_body.extend_from_slice(&chunk(b"00dc", &vec![i as u8; 10]));
    }
    let movi = chunk(b"LIST", &movi_body);

    let mut riff_body = Vec::new();
    riff_body.extend_from_slice(b"AVI ");
    riff_body.extend_from_slice(&hdrl);
    riff_body.extend_from_slice(&movi);

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(riff_body.len() as u32).to_le_bytes());
    out.extend_from_slice(&riff_body);
    out
}
