// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

/// Lossy single-byte float encoding used for per-document field norms:
/// 3 mantissa bits, 5 exponent bits, exponent zero-point 15.
pub struct SmallFloat;

impl SmallFloat {
    /// Encode `f` into a byte. Negative values and zero collapse to 0,
    /// positive underflow to 1, overflow saturates at 255.
    pub fn float_to_byte315(f: f32) -> u8 {
        let bits = f.to_bits() as i32;
        let shifted = bits >> (24 - 3);
        if shifted <= (63 - 15) << 3 {
            return if bits <= 0 { 0 } else { 1 };
        }
        if shifted >= ((63 - 15) << 3) + 0x100 {
            return 255;
        }
        (shifted - ((63 - 15) << 3)) as u8
    }

    /// Decode a byte produced by `float_to_byte315`. Zero is preserved
    /// exactly; every other byte maps back to the smallest float of its
    /// truncation bucket.
    pub fn byte315_to_float(b: u8) -> f32 {
        if b == 0 {
            return 0f32;
        }
        let bits = (u32::from(b) << (24 - 3)) + ((63 - 15) << 24);
        f32::from_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_points() {
        assert_eq!(SmallFloat::float_to_byte315(0.0), 0);
        assert_eq!(SmallFloat::float_to_byte315(-1.0), 0);
        assert_eq!(SmallFloat::float_to_byte315(1.0), 124);
        assert_eq!(SmallFloat::float_to_byte315(f32::INFINITY), 255);
        assert_eq!(SmallFloat::float_to_byte315(1e-45), 1);

        assert_eq!(SmallFloat::byte315_to_float(0), 0.0);
        assert_eq!(SmallFloat::byte315_to_float(124), 1.0);
    }

    #[test]
    fn test_decode_is_monotonic() {
        let mut prev = SmallFloat::byte315_to_float(0);
        for b in 1..=255u8 {
            let f = SmallFloat::byte315_to_float(b);
            assert!(f > prev, "byte {} decoded to {} <= {}", b, f, prev);
            prev = f;
        }
    }

    #[test]
    fn test_round_trip_is_identity_on_code_points() {
        for b in 0..=255u8 {
            let f = SmallFloat::byte315_to_float(b);
            assert_eq!(SmallFloat::float_to_byte315(f), b);
        }
    }
}
