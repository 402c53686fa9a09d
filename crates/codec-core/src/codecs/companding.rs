//! G.711 µ-law companding
//!
//! Bit-exact with the ITU-T STL reference. Used by the simulation backend to
//! get a lossy but stable 8-bit representation of each sample.

/// Compress one 16-bit linear sample to 8-bit µ-law
pub fn ulaw_compress(sample: i16) -> u8 {
    let absno = if sample < 0 {
        (((!sample) as u16) >> 2) as i16 + 33
    } else {
        (sample >> 2) + 33
    };
    let absno = absno.min(0x1FFF);

    let mut i = absno >> 6;
    let mut segno = 1;
    while i != 0 {
        segno += 1;
        i >>= 1;
    }

    let high_nibble = 0x0008 - segno;
    let low_nibble = 0x000F - ((absno >> segno) & 0x000F);
    let mut result = (high_nibble << 4) | low_nibble;
    if sample >= 0 {
        result |= 0x0080;
    }
    result as u8
}

/// Expand one 8-bit µ-law code to a 16-bit linear sample
pub fn ulaw_expand(compressed: u8) -> i16 {
    let sign: i16 = if compressed < 0x80 { -1 } else { 1 };
    let inverted = (!compressed) as i16;
    let exponent = (inverted >> 4) & 0x0007;
    let mantissa = inverted & 0x000F;
    let step = 4 << (exponent + 1);

    sign * ((0x0080 << exponent) + step * mantissa + step / 2 - 4 * 33)
}

/// Compress a block of samples into `output`; lengths must match
pub fn compress_into(samples: &[i16], output: &mut [u8]) {
    for (out, sample) in output.iter_mut().zip(samples) {
        *out = ulaw_compress(*sample);
    }
}

/// Expand a block of µ-law codes into `output`; lengths must match
pub fn expand_into(encoded: &[u8], output: &mut [i16]) {
    for (out, code) in output.iter_mut().zip(encoded) {
        *out = ulaw_expand(*code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_round_trip() {
        let code = ulaw_compress(0);
        assert_eq!(code, 0xFF);
        assert_eq!(ulaw_expand(code), 0);
    }

    #[test]
    fn test_sign_preserved() {
        for sample in [-30000i16, -1000, -10, 10, 1000, 30000] {
            let back = ulaw_expand(ulaw_compress(sample));
            assert_eq!(back.signum(), sample.signum(), "sample {}", sample);
        }
    }

    #[test]
    fn test_quantization_error_bounded() {
        for sample in (-32000i16..32000).step_by(97) {
            let back = ulaw_expand(ulaw_compress(sample)) as i32;
            let err = (back - sample as i32).abs();
            // Largest µ-law segment step is 1024 in 16-bit scale
            assert!(err <= 1100, "sample {} came back as {}", sample, back);
        }
    }

    #[test]
    fn test_extremes_do_not_overflow() {
        let _ = ulaw_expand(ulaw_compress(i16::MIN));
        let _ = ulaw_expand(ulaw_compress(i16::MAX));
        for code in 0..=255u8 {
            let _ = ulaw_expand(code);
        }
    }
}
