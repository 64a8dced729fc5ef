//! CRC-8 codec for RMAP headers and data, as specified by ECSS-E-ST-50-52C.
//!
//! The polynomial is equivalent to x^8 + x^2 + x + 1. RMAP processes bytes
//! LSB-first, so the lookup table is built by reflecting that polynomial
//! rather than transcribing a published table by hand; the witness
//! property below is what downstream code actually relies on.

use std::sync::LazyLock;

const POLY: u8 = 0xE0;

static TABLE: LazyLock<[u8; 256]> = LazyLock::new(build_table);

fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte = 0usize;
    while byte < 256 {
        let mut crc = byte as u8;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

/// Computes the RMAP CRC-8 over `data`, starting from `seed`.
///
/// Passing the previously returned value back in as `seed` allows the CRC
/// to be accumulated incrementally across discontiguous spans (for example
/// a header assembled in two writes).
pub fn crc(data: &[u8], seed: u8) -> u8 {
    let table = &*TABLE;
    data.iter().fold(seed, |acc, &byte| table[(acc ^ byte) as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn witness_over_self_trailer_is_zero() {
        let header = [0x32, 0x01, 0x4c, 0x00, 0xfe, 0x00, 0x01];
        let trailer = crc(&header, 0);
        let mut with_trailer = header.to_vec();
        with_trailer.push(trailer);
        assert_eq!(crc(&with_trailer, 0), 0);
    }

    #[test]
    fn bit_flip_breaks_witness() {
        let header = [0x32, 0x01, 0x4c, 0x00, 0xfe, 0x00, 0x01];
        let trailer = crc(&header, 0);
        let mut with_trailer = header.to_vec();
        with_trailer.push(trailer);
        with_trailer[0] ^= 0x01;
        assert_ne!(crc(&with_trailer, 0), 0);
    }

    #[test]
    fn seed_allows_incremental_computation() {
        let data = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06];
        let whole = crc(&data, 0);
        let partial = crc(&data[..3], 0);
        let incremental = crc(&data[3..], partial);
        assert_eq!(whole, incremental);
    }

    #[test]
    fn zero_length_input_returns_seed() {
        assert_eq!(crc(&[], 0x42), 0x42);
    }
}
