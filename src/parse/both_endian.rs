// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! ECMA-119 stores several multi-byte integers twice, once little-endian and
//! once big-endian, so a reader never needs to know the host's endianness.
//! We trust the little-endian copy and merely warn on mismatch, the same
//! tolerant stance the format's other readers take toward slightly broken
//! mastering tools.

use nom::{
    number::complete::{le_u16, le_u32},
    sequence::pair,
};

use crate::error::NomRes;

fn check_u16(pair: (u16, u16)) -> u16 {
    let (le, be) = pair;
    if le != be.swap_bytes() {
        log::warn!("both-endian u16 mismatch: LE={le:#06x} BE={be:#06x}");
    }
    le
}

fn check_u32(pair: (u32, u32)) -> u32 {
    let (le, be) = pair;
    if le != be.swap_bytes() {
        log::warn!("both-endian u32 mismatch: LE={le:#010x} BE={be:#010x}");
    }
    le
}

pub fn both_endian16(input: &[u8]) -> NomRes<&[u8], u16> {
    nom::combinator::map(pair(le_u16, nom::number::complete::be_u16), check_u16)(input)
}

pub fn both_endian32(input: &[u8]) -> NomRes<&[u8], u32> {
    nom::combinator::map(pair(le_u32, nom::number::complete::be_u32), check_u32)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matching_pair() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1234u32.to_le_bytes());
        buf.extend_from_slice(&1234u32.to_be_bytes());
        let (rest, v) = both_endian32(&buf).unwrap();
        assert_eq!(v, 1234);
        assert!(rest.is_empty());
    }

    #[test]
    fn tolerates_mismatch_and_keeps_le() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1234u16.to_le_bytes());
        buf.extend_from_slice(&9999u16.to_be_bytes());
        let (_, v) = both_endian16(&buf).unwrap();
        assert_eq!(v, 1234);
    }
}
