// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Parses a single 34-byte-plus-identifier directory record and whatever
//! System Use Area follows it.

use bitflags::bitflags;
use nom::{
    bytes::complete::take,
    combinator::{map, opt},
    number::complete::u8 as nom_u8,
    sequence::tuple,
};

use crate::{
    error::NomRes,
    parse::{
        both_endian::{both_endian16, both_endian32},
        date_time::dir_datetime,
        susp::{system_use_entries, SystemUseEntry},
    },
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u8 {
        const EXISTENCE        = 1 << 0;
        const DIRECTORY        = 1 << 1;
        const ASSOCIATED_FILE  = 1 << 2;
        const RECORD           = 1 << 3;
        const PROTECTION       = 1 << 4;
        const MULTIEXTENT      = 1 << 7;
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryEntryHeader {
    pub extent_location: u32,
    pub extent_length: u32,
    pub recording_date: Option<time::OffsetDateTime>,
    pub file_flags: FileFlags,
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_sequence_number: u16,
}

/// Special values the `identifier` byte takes for the `.` and `..`
/// records (ECMA-119 §9.1.11).
pub const IDENTIFIER_SELF: u8 = 0;
pub const IDENTIFIER_PARENT: u8 = 1;

#[derive(Debug, Clone)]
pub struct ParsedDirectoryEntry {
    pub header: DirectoryEntryHeader,
    pub identifier: Vec<u8>,
    pub system_use: Vec<SystemUseEntry>,
    /// Total on-disc length of this record, including padding, as declared
    /// by its own length byte — needed to advance to the next record.
    pub record_length: u8,
}

fn header(input: &[u8]) -> NomRes<&[u8], DirectoryEntryHeader> {
    let (input, extent_location) = both_endian32(input)?;
    let (input, extent_length) = both_endian32(input)?;
    let (input, recording_date) = dir_datetime(input)?;
    let (input, raw_flags) = nom_u8(input)?;
    let (input, file_unit_size) = nom_u8(input)?;
    let (input, interleave_gap_size) = nom_u8(input)?;
    let (input, volume_sequence_number) = both_endian16(input)?;
    Ok((
        input,
        DirectoryEntryHeader {
            extent_location,
            extent_length,
            recording_date: Some(recording_date),
            file_flags: FileFlags::from_bits_truncate(raw_flags),
            file_unit_size,
            interleave_gap_size,
            volume_sequence_number,
        },
    ))
}

/// Parses one directory record starting at its length byte. `full_record`
/// must contain at least `record_length` bytes (the caller slices a whole
/// block and repeatedly feeds the remainder back in).
pub fn directory_entry(input: &[u8]) -> NomRes<&[u8], ParsedDirectoryEntry> {
    let original = input;
    let (input, record_length) = nom_u8(input)?;
    if record_length == 0 {
        // Padding to the end of the sector; caller checks for this and
        // stops scanning the current block.
        return Ok((
            &original[original.len().min(1)..],
            ParsedDirectoryEntry {
                header: DirectoryEntryHeader {
                    extent_location: 0,
                    extent_length: 0,
                    recording_date: None,
                    file_flags: FileFlags::empty(),
                    file_unit_size: 0,
                    interleave_gap_size: 0,
                    volume_sequence_number: 0,
                },
                identifier: Vec::new(),
                system_use: Vec::new(),
                record_length: 0,
            },
        ));
    }

    let (input, _ext_attr_length) = nom_u8(input)?;
    let (input, hdr) = header(input)?;
    let (input, id_len) = nom_u8(input)?;
    let (input, id_bytes) = take(id_len as usize)(input)?;
    // A padding byte follows the identifier when its length is even, to
    // keep the record's total length even (ECMA-119 §9.1.12).
    let (input, _) = if id_len % 2 == 0 {
        take(1usize)(input)?
    } else {
        (input, &input[..0])
    };

    // Whatever is left in the record (as declared by `record_length`) is
    // the System Use Area.
    let consumed = original.len() - input.len();
    let remaining_in_record = (record_length as usize).saturating_sub(consumed);
    let (input, sua_bytes) = take(remaining_in_record.min(input.len()))(input)?;
    let system_use = opt(system_use_entries)(sua_bytes)
        .map(|(_, v)| v.unwrap_or_default())
        .unwrap_or_default();
    let _ = input;

    let identifier = id_bytes.to_vec();

    // Advance the outer cursor past the whole record, not just what we
    // chose to parse from the SUA, so a partially-understood SUA never
    // desyncs the directory scan.
    let next = &original[(record_length as usize).min(original.len())..];

    Ok((
        next,
        ParsedDirectoryEntry {
            header: hdr,
            identifier,
            system_use,
            record_length,
        },
    ))
}

pub fn is_self(identifier: &[u8]) -> bool {
    identifier.len() == 1 && identifier[0] == IDENTIFIER_SELF
}

pub fn is_parent(identifier: &[u8]) -> bool {
    identifier.len() == 1 && identifier[0] == IDENTIFIER_PARENT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(name: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes()); // ext loc LE
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&2048u32.to_le_bytes());
        body.extend_from_slice(&2048u32.to_be_bytes());
        body.extend_from_slice(&[124, 1, 1, 0, 0, 0, 0]); // recording date
        body.push(FileFlags::EXISTENCE.bits());
        body.push(0); // file unit size
        body.push(0); // interleave gap
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.push(name.len() as u8);
        body.extend_from_slice(name);
        if name.len() % 2 == 0 {
            body.push(0);
        }

        let mut record = Vec::new();
        record.push((body.len() + 2) as u8);
        record.push(0); // ext attr length
        record.extend_from_slice(&body);
        record
    }

    #[test]
    fn parses_plain_file_entry() {
        let record = sample_entry(b"FOO.TXT;1");
        let (rest, entry) = directory_entry(&record).unwrap();
        assert_eq!(entry.identifier, b"FOO.TXT;1");
        assert!(rest.is_empty());
        assert_eq!(entry.header.extent_length, 2048);
    }

    #[test]
    fn zero_length_byte_signals_padding() {
        let buf = [0u8; 16];
        let (rest, entry) = directory_entry(&buf).unwrap();
        assert_eq!(entry.record_length, 0);
        assert_eq!(rest.len(), 15);
    }
}
