//! An MSB-first bit reader over an in-memory RBSP buffer, used by the H.264/MPEG-4/MPEG-1-2
//! header parsers for fixed-width field reads and exp-Golomb (`ue(v)`/`se(v)`) decoding.
//!
//! Written fresh rather than adapted from symphonia's `symphonia-core::io::bit::BitReaderLtr`:
//! that type's `fetch_bits_partial` has a `todo!()` reachable after partial state mutation (see
//! DESIGN.md), so it is not a safe base to generalize from.

/// Reads bits left-to-right (most significant bit first) from a byte slice.
pub struct BitReaderLtr<'a> {
    data: &'a [u8],
    /// Absolute bit position from the start of `data`.
    bit_pos: usize,
}

impl<'a> BitReaderLtr<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReaderLtr { data, bit_pos: 0 }
    }

    pub fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.bit_pos.min(self.data.len() * 8)
    }

    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Read `n` bits (0..=32) as an unsigned integer, MSB first.
    pub fn read_bits(&mut self, n: u32) -> Option<u32> {
        if n == 0 {
            return Some(0);
        }
        if n > 32 || (n as usize) > self.bits_left() {
            return None;
        }

        let mut value: u32 = 0;
        for _ in 0..n {
            let byte_idx = self.bit_pos / 8;
            let bit_idx = 7 - (self.bit_pos % 8);
            let bit = (self.data[byte_idx] >> bit_idx) & 1;
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }

        Some(value)
    }

    pub fn read_bool(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b != 0)
    }

    /// Count leading zero bits up to and including the terminating one bit (exp-Golomb prefix).
    fn leading_zero_run(&mut self) -> Option<u32> {
        let mut count = 0u32;
        loop {
            let bit = self.read_bits(1)?;
            if bit == 1 {
                return Some(count);
            }
            count += 1;
            if count > 32 {
                return None;
            }
        }
    }

    /// Unsigned exp-Golomb code, `ue(v)` in the H.264/MPEG-4 spec grammar.
    pub fn read_ue(&mut self) -> Option<u32> {
        let leading_zeros = self.leading_zero_run()?;
        if leading_zeros == 0 {
            return Some(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Some((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Signed exp-Golomb code, `se(v)`: maps the unsigned code alternately to
    /// `0, 1, -1, 2, -2, ...`.
    pub fn read_se(&mut self) -> Option<i32> {
        let code = self.read_ue()?;
        let magnitude = (code + 1) / 2;
        if code % 2 == 0 {
            Some(-(magnitude as i32))
        }
        else {
            Some(magnitude as i32)
        }
    }

    /// Skip `n` bits without decoding them.
    pub fn skip_bits(&mut self, n: u32) -> Option<()> {
        if (n as usize) > self.bits_left() {
            return None;
        }
        self.bit_pos += n as usize;
        Some(())
    }

    /// True if the remaining bits are exactly the H.264 `rbsp_trailing_bits` pattern
    /// (a single `1` bit followed by zero-fill to the next byte boundary).
    pub fn has_more_rbsp_data(&self) -> bool {
        let remaining = self.bits_left();
        if remaining == 0 {
            return false;
        }
        if remaining > 8 {
            return true;
        }

        let mut probe = BitReaderLtr { data: self.data, bit_pos: self.bit_pos };
        match probe.read_bits(remaining as u32) {
            Some(tail) => tail != (1u32 << (remaining - 1)),
            None => false,
        }
    }
}
