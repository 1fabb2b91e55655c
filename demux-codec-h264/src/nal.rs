//! NAL unit identification and iteration over both Annex-B (startcode-delimited) and AVCC
//! (length-prefixed) H.264 elementary streams.

pub const NAL_SLICE_NON_IDR: u8 = 1;
pub const NAL_SLICE_PARTITION_A: u8 = 2;
pub const NAL_SLICE_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;
pub const NAL_END_OF_SEQUENCE: u8 = 10;
pub const NAL_END_OF_STREAM: u8 = 11;

/// Reference of one NAL unit within a buffer: `ref_idc`, `unit_type`, and the byte range of its
/// RBSP payload (header byte excluded, emulation-prevention bytes not yet removed).
#[derive(Copy, Clone, Debug)]
pub struct NalRef {
    pub ref_idc: u8,
    pub unit_type: u8,
    pub start: usize,
    pub end: usize,
}

/// True for slice NAL types that carry coded picture data.
pub fn is_vcl(unit_type: u8) -> bool {
    matches!(unit_type, 1..=5)
}

/// Iterate Annex-B NAL units in `data`, locating each by its `00 00 01`/`00 00 00 01` startcode.
pub fn iter_annexb(data: &[u8]) -> Vec<NalRef> {
    // Collect `(header_pos, startcode_len)` for every startcode in the buffer up front, so each
    // NAL's end can be computed as "the byte just before the next startcode begins".
    let mut marks = Vec::new();
    let mut search_from = 0usize;
    while let Some((body_start, sc_len)) = demux_bitstream::find_startcode(data, search_from) {
        marks.push((body_start, sc_len));
        search_from = body_start;
    }

    let mut nals = Vec::new();
    for (i, &(body_start, _)) in marks.iter().enumerate() {
        if body_start >= data.len() {
            continue;
        }

        let body_end = match marks.get(i + 1) {
            Some(&(next_body_start, next_sc_len)) => next_body_start - next_sc_len,
            None => data.len(),
        };

        let header = data[body_start];
        nals.push(NalRef {
            ref_idc: (header >> 5) & 0x03,
            unit_type: header & 0x1f,
            start: body_start + 1,
            end: body_end.max(body_start + 1),
        });
    }

    nals
}

/// Iterate AVCC length-prefixed NAL units in `data`, using `nal_length_size` bytes (1, 2, or 4)
/// per length prefix, as declared by the sample entry's `avcC` configuration record.
pub fn iter_avcc(data: &[u8], nal_length_size: u8) -> Vec<NalRef> {
    let mut nals = Vec::new();
    let mut pos = 0usize;
    let len_size = nal_length_size as usize;

    while pos + len_size <= data.len() {
        let mut len = 0usize;
        for i in 0..len_size {
            len = (len << 8) | data[pos + i] as usize;
        }
        pos += len_size;

        if len == 0 || pos >= data.len() {
            break;
        }

        let header = data[pos];
        let end = (pos + len).min(data.len());

        nals.push(NalRef {
            ref_idc: (header >> 5) & 0x03,
            unit_type: header & 0x1f,
            start: pos + 1,
            end,
        });

        pos = end;
    }

    nals
}
