//! CRC-16/CCITT-FALSE.
//!
//! Poly `0x1021`, init `0xFFFF`, MSB-first, no reflection, no final XOR.
//! The device computes the same checksum over the JPEG payload before
//! sending, so the two sides must stay bit-identical.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Compute the CRC-16/CCITT-FALSE of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, &byte| update(crc, byte))
}

/// Check `data` against an expected checksum.
pub fn verify(data: &[u8], expected: u16) -> bool {
    crc16(data) == expected
}

fn update(mut crc: u16, byte: u8) -> u16 {
    crc ^= (byte as u16) << 8;
    for _ in 0..8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ POLY
        } else {
            crc << 1
        };
    }
    crc
}
