//! Minimal H.264 SPS parsing: just enough Exp-Golomb decoding to recover
//! the coded width/height carried in a video config unit, so a later
//! resolution change can be detected without a full SPS parser dependency.

struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn read_bit(&mut self) -> Option<u32> {
        let byte = *self.data.get(self.byte_pos)?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
        Some(bit as u32)
    }

    fn read_bits(&mut self, count: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()?;
        }
        Some(value)
    }

    /// Unsigned Exp-Golomb codeword.
    fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zero_bits = 0u32;
        while self.read_bit()? == 0 {
            leading_zero_bits += 1;
            if leading_zero_bits > 32 {
                return None;
            }
        }
        if leading_zero_bits == 0 {
            return Some(0);
        }
        let rest = self.read_bits(leading_zero_bits)?;
        Some((1 << leading_zero_bits) - 1 + rest)
    }

    fn skip_ue(&mut self) -> Option<()> {
        self.read_ue().map(|_| ())
    }

    fn read_se(&mut self) -> Option<i32> {
        let code = self.read_ue()?;
        let value = (code as i64 + 1) / 2;
        Some(if code % 2 == 0 { -value as i32 } else { value as i32 })
    }
}

/// Parses `width`/`height` in pixels out of a raw SPS NAL payload (the
/// buffer starting at the NAL header byte, i.e. `payload[0]` is the NAL
/// header). Returns `None` for anything unexpected rather than panicking;
/// callers treat that as "dimensions unavailable" and fall back to the
/// handshake-negotiated `videoInfo` size.
pub fn parse_sps_dimensions(nal: &[u8]) -> Option<(u32, u32)> {
    if nal.len() < 4 {
        return None;
    }
    // Skip the 1-byte NAL header; the profile/compat/level bytes used by
    // the envelope config tag are the next three bytes.
    let mut reader = BitReader::new(&nal[1..]);

    let profile_idc = reader.read_bits(8)?;
    let _constraint_flags_and_reserved = reader.read_bits(8)?;
    let _level_idc = reader.read_bits(8)?;
    reader.skip_ue()?; // seq_parameter_set_id

    let high_profile = matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    );
    if high_profile {
        let chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            reader.read_bits(1)?; // separate_colour_plane_flag
        }
        reader.skip_ue()?; // bit_depth_luma_minus8
        reader.skip_ue()?; // bit_depth_chroma_minus8
        reader.read_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        let seq_scaling_matrix_present = reader.read_bits(1)?;
        if seq_scaling_matrix_present == 1 {
            // Scaling-list parsing is intentionally not implemented; high
            // profile streams with custom scaling matrices fall back to
            // the handshake-negotiated size.
            return None;
        }
    }

    reader.skip_ue()?; // log2_max_frame_num_minus4
    let pic_order_cnt_type = reader.read_ue()?;
    if pic_order_cnt_type == 0 {
        reader.skip_ue()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if pic_order_cnt_type == 1 {
        reader.read_bits(1)?; // delta_pic_order_always_zero_flag
        reader.read_se()?; // offset_for_non_ref_pic
        reader.read_se()?; // offset_for_top_to_bottom_field
        let cycle = reader.read_ue()?;
        for _ in 0..cycle {
            reader.read_se()?;
        }
    }

    reader.skip_ue()?; // max_num_ref_frames
    reader.read_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs_minus1 = reader.read_ue()?;
    let pic_height_in_map_units_minus1 = reader.read_ue()?;
    let frame_mbs_only_flag = reader.read_bits(1)?;
    if frame_mbs_only_flag == 0 {
        reader.read_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.read_bits(1)?; // direct_8x8_inference_flag

    let frame_cropping_flag = reader.read_bits(1)?;
    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
    if frame_cropping_flag == 1 {
        crop_left = reader.read_ue()?;
        crop_right = reader.read_ue()?;
        crop_top = reader.read_ue()?;
        crop_bottom = reader.read_ue()?;
    }

    let width = (pic_width_in_mbs_minus1 + 1) * 16 - (crop_left + crop_right) * 2;
    let frame_mb_height_factor = if frame_mbs_only_flag == 1 { 1 } else { 2 };
    let height = (pic_height_in_map_units_minus1 + 1) * frame_mb_height_factor * 16
        - (crop_top + crop_bottom) * 2;

    let _ = &mut crop_left;
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_on_truncated_input() {
        assert_eq!(parse_sps_dimensions(&[0x67]), None);
    }

    #[test]
    fn never_panics_on_arbitrary_bytes() {
        for len in 0..32 {
            let buf = vec![0xffu8; len];
            let _ = parse_sps_dimensions(&buf);
        }
    }
}
