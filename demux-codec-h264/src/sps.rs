//! Sequence Parameter Set parsing: just enough fields to populate `VideoParams` (picture size,
//! cropping, sample aspect ratio, interlace, B-frame presence cannot be derived from SPS alone so
//! is inferred from slice types instead, see `slice.rs`).

use demux_bitstream::BitReaderLtr;

/// The subset of SPS fields this workspace's demuxers need.
#[derive(Clone, Debug)]
pub struct Sps {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub frame_mbs_only_flag: bool,
    pub pic_width: u32,
    pub pic_height: u32,
    pub sar_width: u32,
    pub sar_height: u32,
}

/// The standard Table E-1 sample aspect ratio indicators (indices 1-16); index 0 is "unspecified"
/// and index 255 ("Extended_SAR") carries explicit width/height that follow in the bitstream.
const SAR_TABLE: &[(u32, u32)] = &[
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

/// Parse an SPS RBSP (emulation-prevention bytes already removed, NAL header byte already
/// stripped). Returns `None` on any malformed or unrecognized-profile input rather than erroring,
/// since a demuxer should tolerate an undecodable SPS by simply not refining picture geometry.
pub fn parse(rbsp: &[u8]) -> Option<Sps> {
    let mut r = BitReaderLtr::new(rbsp);

    let profile_idc = r.read_bits(8)? as u8;
    let _constraint_flags = r.read_bits(8)?;
    let level_idc = r.read_bits(8)? as u8;
    let seq_parameter_set_id = r.read_ue()?;

    if matches!(profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134) {
        let chroma_format_idc = r.read_ue()?;
        if chroma_format_idc == 3 {
            r.skip_bits(1)?; // separate_colour_plane_flag
        }
        r.read_ue()?; // bit_depth_luma_minus8
        r.read_ue()?; // bit_depth_chroma_minus8
        r.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        let seq_scaling_matrix_present = r.read_bool()?;
        if seq_scaling_matrix_present {
            // Conservatively bail: scaling-list parsing isn't needed for picture geometry and
            // adds considerable complexity for no benefit to this workspace's scope.
            return None;
        }
    }

    r.read_ue()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = r.read_ue()?;
    if pic_order_cnt_type == 0 {
        r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
    }
    else if pic_order_cnt_type == 1 {
        r.skip_bits(1)?;
        r.read_se()?;
        r.read_se()?;
        let num_ref_frames_in_cycle = r.read_ue()?;
        for _ in 0..num_ref_frames_in_cycle {
            r.read_se()?;
        }
    }

    r.read_ue()?; // max_num_ref_frames
    r.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = r.read_ue()?;
    let pic_height_in_map_units_minus1 = r.read_ue()?;
    let frame_mbs_only_flag = r.read_bool()?;
    if !frame_mbs_only_flag {
        r.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    r.skip_bits(1)?; // direct_8x8_inference_flag

    let frame_cropping_flag = r.read_bool()?;
    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
    if frame_cropping_flag {
        crop_left = r.read_ue()?;
        crop_right = r.read_ue()?;
        crop_top = r.read_ue()?;
        crop_bottom = r.read_ue()?;
    }

    let mut sar_width = 0;
    let mut sar_height = 0;
    let vui_parameters_present = r.read_bool()?;
    if vui_parameters_present {
        let aspect_ratio_info_present = r.read_bool()?;
        if aspect_ratio_info_present {
            let aspect_ratio_idc = r.read_bits(8)?;
            if aspect_ratio_idc == 255 {
                sar_width = r.read_bits(16)?;
                sar_height = r.read_bits(16)?;
            }
            else if let Some(&(w, h)) = SAR_TABLE.get(aspect_ratio_idc as usize - 1) {
                sar_width = w;
                sar_height = h;
            }
        }
    }

    let mb_width = pic_width_in_mbs_minus1 + 1;
    let mb_height_units = pic_height_in_map_units_minus1 + 1;
    let frame_mbs_factor = if frame_mbs_only_flag { 1 } else { 2 };

    let width_px = mb_width * 16;
    let height_px = mb_height_units * frame_mbs_factor * 16;

    // Cropping units are 2 luma samples for 4:2:0 chroma when not frame_mbs_only; use the common
    // monochrome/4:2:0 crop unit of 2 horizontally and `2 * frame_mbs_factor` vertically.
    let crop_unit_x = 2;
    let crop_unit_y = 2 * frame_mbs_factor;

    let pic_width = width_px.saturating_sub(crop_unit_x * (crop_left + crop_right));
    let pic_height = height_px.saturating_sub(crop_unit_y * (crop_top + crop_bottom));

    Some(Sps {
        profile_idc,
        level_idc,
        seq_parameter_set_id,
        frame_mbs_only_flag,
        pic_width,
        pic_height,
        sar_width,
        sar_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal Baseline-profile SPS for a progressive 176x144 (QCIF) stream with no VUI, no
    /// cropping: constructed by hand from the exp-Golomb grammar above.
    #[test]
    fn verify_parses_qcif_baseline_sps() {
        // profile_idc=66 (0x42), constraints=0xC0, level_idc=0x1E (30)
        // seq_parameter_set_id = ue(0) = "1"
        // log2_max_frame_num_minus4 = ue(0) = "1"
        // pic_order_cnt_type = ue(0) = "1"  (=> log2_max_pic_order_cnt_lsb_minus4 = ue(0) = "1")
        // max_num_ref_frames = ue(1) = "010"
        // gaps_in_frame_num_value_allowed_flag = 0
        // pic_width_in_mbs_minus1 = 10 (11 mbs = 176px) -> ue(10) = "0001011"
        // pic_height_in_map_units_minus1 = 8 (9 mbs = 144px) -> ue(8) = "0001001"
        // frame_mbs_only_flag = 1
        // direct_8x8_inference_flag = 1
        // frame_cropping_flag = 0
        // vui_parameters_present_flag = 0
        let bits = "1".to_string() // sps id
            + "1" // log2_max_frame_num_minus4
            + "1" // pic_order_cnt_type
            + "1" // log2_max_pic_order_cnt_lsb_minus4
            + "010" // max_num_ref_frames = 1
            + "0" // gaps
            + "0001011" // width mbs minus1 = 10
            + "0001001" // height map units minus1 = 8
            + "1" // frame_mbs_only
            + "1" // direct_8x8_inference
            + "0" // frame_cropping
            + "0"; // vui present

        let mut bytes = vec![0x42, 0xC0, 0x1E];
        let mut acc = 0u8;
        let mut n = 0;
        for c in bits.chars() {
            acc = (acc << 1) | if c == '1' { 1 } else { 0 };
            n += 1;
            if n == 8 {
                bytes.push(acc);
                acc = 0;
                n = 0;
            }
        }
        if n > 0 {
            acc <<= 8 - n;
            bytes.push(acc);
        }

        let sps = parse(&bytes).expect("sps should parse");
        assert_eq!(sps.pic_width, 176);
        assert_eq!(sps.pic_height, 144);
        assert!(sps.frame_mbs_only_flag);
    }
}
