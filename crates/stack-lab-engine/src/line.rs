//! Manchester line coding for the physical layer.
//!
//! Bits travel as `u8` symbols holding 0 or 1. Encoding maps `0 -> 01` and
//! `1 -> 10`, doubling the length; decoding consumes symbol pairs and keeps
//! going past invalid transitions, substituting [`INVALID_BIT`] and recording
//! the position so the caller can judge the whole stream afterwards.

/// Sentinel written where a symbol pair decoded to neither `01` nor `10`.
pub const INVALID_BIT: u8 = 0xFF;

/// Result of decoding a Manchester symbol stream.
#[derive(Debug, Clone)]
pub struct DecodedBits {
    pub bits: Vec<u8>,
    /// Bit positions (in the decoded stream) that held an invalid transition.
    pub invalid_positions: Vec<usize>,
}

impl DecodedBits {
    pub fn is_clean(&self) -> bool {
        self.invalid_positions.is_empty()
    }
}

/// Expand bytes into bits, most significant bit first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}

/// Pack bits back into bytes, most significant bit first. Sentinel bits count
/// as zero; a trailing partial byte is dropped.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit == 1))
        })
        .collect()
}

pub fn manchester_encode(bits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len() * 2);
    for &bit in bits {
        debug_assert!(bit <= 1, "manchester_encode expects binary input");
        if bit == 0 {
            out.extend_from_slice(&[0, 1]);
        } else {
            out.extend_from_slice(&[1, 0]);
        }
    }
    out
}

pub fn manchester_decode(symbols: &[u8]) -> DecodedBits {
    let mut bits = Vec::with_capacity(symbols.len() / 2);
    let mut invalid_positions = Vec::new();

    let mut pairs = symbols.chunks_exact(2);
    for pair in &mut pairs {
        let position = bits.len();
        match (pair[0], pair[1]) {
            (0, 1) => bits.push(0),
            (1, 0) => bits.push(1),
            _ => {
                bits.push(INVALID_BIT);
                invalid_positions.push(position);
            }
        }
    }
    if !pairs.remainder().is_empty() {
        // A dangling half-symbol cannot decode to anything.
        invalid_positions.push(bits.len());
        bits.push(INVALID_BIT);
    }

    DecodedBits {
        bits,
        invalid_positions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_doubles_length() {
        let bits = [1, 0, 1, 1, 0];
        let encoded = manchester_encode(&bits);
        assert_eq!(encoded.len(), bits.len() * 2);
        assert_eq!(encoded, [1, 0, 0, 1, 1, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn decode_inverts_encode() {
        let bits = bytes_to_bits(b"GET / HTTP/1.1");
        let decoded = manchester_decode(&manchester_encode(&bits));
        assert!(decoded.is_clean());
        assert_eq!(decoded.bits, bits);
    }

    #[test]
    fn invalid_pairs_are_recorded_without_aborting() {
        // 11 and 00 are illegal transitions; decoding continues past both.
        let symbols = [1, 1, 0, 1, 0, 0, 1, 0];
        let decoded = manchester_decode(&symbols);
        assert_eq!(decoded.bits, [INVALID_BIT, 0, INVALID_BIT, 1]);
        assert_eq!(decoded.invalid_positions, [0, 2]);
    }

    #[test]
    fn dangling_symbol_is_invalid() {
        let decoded = manchester_decode(&[0, 1, 1]);
        assert_eq!(decoded.bits, [0, INVALID_BIT]);
        assert_eq!(decoded.invalid_positions, [1]);
    }

    #[test]
    fn byte_round_trip_is_msb_first() {
        assert_eq!(bytes_to_bits(&[0b1010_0001]), [1, 0, 1, 0, 0, 0, 0, 1]);
        assert_eq!(bits_to_bytes(&bytes_to_bits(&[0xDE, 0xAD])), [0xDE, 0xAD]);
    }
}
