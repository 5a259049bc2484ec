// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Parsers for the fixed 2048-byte Volume Descriptor records found at LBA
//! 16 onward: Boot Record, Primary, Supplementary/Enhanced, and the
//! Terminator that ends the sequence.

use nom::{
    bytes::complete::{tag, take},
    combinator::map,
    number::complete::{le_u32, u8 as nom_u8},
};

use crate::{
    block::BLOCK_SIZE,
    charset::CharacterEncoding,
    error::{ISOError, NomRes},
    parse::{both_endian::both_endian32, date_time::vd_datetime},
};

pub const STANDARD_ID: &[u8; 5] = b"CD001";

/// Fields shared by the Primary and Supplementary/Enhanced Volume
/// Descriptors; ECMA-119 §8.4/8.5 lay out an identical record shape for
/// both, differing only in the type code and (for Joliet) the escape
/// sequences field.
#[derive(Debug, Clone)]
pub struct VolumeDescriptorTable {
    pub volume_flags: u8,
    pub system_identifier: Vec<u8>,
    pub volume_identifier: Vec<u8>,
    pub volume_space_size: u32,
    pub escape_sequences: Vec<u8>,
    pub volume_set_size: u16,
    pub volume_sequence_number: u16,
    pub logical_block_size: u16,
    pub path_table_size: u32,
    pub type_l_path_table: u32,
    pub opt_type_l_path_table: u32,
    pub type_m_path_table: u32,
    pub opt_type_m_path_table: u32,
    pub root_directory_record: Vec<u8>,
    pub volume_set_identifier: Vec<u8>,
    pub publisher_identifier: Vec<u8>,
    pub data_preparer_identifier: Vec<u8>,
    pub application_identifier: Vec<u8>,
    pub copyright_file_identifier: Vec<u8>,
    pub abstract_file_identifier: Vec<u8>,
    pub bibliographic_file_identifier: Vec<u8>,
    pub creation_date: Option<time::OffsetDateTime>,
    pub modification_date: Option<time::OffsetDateTime>,
    pub expiration_date: Option<time::OffsetDateTime>,
    pub effective_date: Option<time::OffsetDateTime>,
    pub file_structure_version: u8,
}

impl VolumeDescriptorTable {
    pub fn encoding(&self) -> CharacterEncoding {
        CharacterEncoding::from_escape_sequences(&self.escape_sequences)
    }
}

#[derive(Debug, Clone)]
pub enum VolumeDescriptor {
    Primary(VolumeDescriptorTable),
    Supplementary(VolumeDescriptorTable),
    /// Type 2 with the "enhanced" bit (ECMA-119 has no separate type code
    /// for this; it is a Supplementary descriptor interpreted under ISO
    /// 9660:1999). We keep it distinct so the tree selection policy can
    /// still prefer Rock Ridge/Joliet over it.
    Enhanced(VolumeDescriptorTable),
    BootRecord {
        boot_system_identifier: Vec<u8>,
        boot_identifier: Vec<u8>,
        data: Vec<u8>,
    },
    VolumeDescriptorSetTerminator,
    VolumePartition {
        volume_partition_identifier: Vec<u8>,
    },
}

fn descriptor_table(input: &[u8], volume_flags: u8) -> NomRes<&[u8], VolumeDescriptorTable> {
    let (input, system_identifier) = take(32usize)(input)?;
    let (input, volume_identifier) = take(32usize)(input)?;
    let (input, _unused) = take(8usize)(input)?;
    let (input, volume_space_size) = both_endian32(input)?;
    let (input, escape_sequences) = take(32usize)(input)?;
    let (input, volume_set_size) = crate::parse::both_endian::both_endian16(input)?;
    let (input, volume_sequence_number) = crate::parse::both_endian::both_endian16(input)?;
    let (input, logical_block_size) = crate::parse::both_endian::both_endian16(input)?;
    let (input, path_table_size) = both_endian32(input)?;
    let (input, type_l_path_table) = le_u32(input)?;
    let (input, opt_type_l_path_table) = le_u32(input)?;
    let (input, type_m_path_table) = nom::number::complete::be_u32(input)?;
    let (input, opt_type_m_path_table) = nom::number::complete::be_u32(input)?;
    let (input, root_directory_record) = take(34usize)(input)?;
    let (input, volume_set_identifier) = take(128usize)(input)?;
    let (input, publisher_identifier) = take(128usize)(input)?;
    let (input, data_preparer_identifier) = take(128usize)(input)?;
    let (input, application_identifier) = take(128usize)(input)?;
    let (input, copyright_file_identifier) = take(37usize)(input)?;
    let (input, abstract_file_identifier) = take(37usize)(input)?;
    let (input, bibliographic_file_identifier) = take(37usize)(input)?;
    let (input, creation_date) = vd_datetime(input)?;
    let (input, modification_date) = vd_datetime(input)?;
    let (input, expiration_date) = vd_datetime(input)?;
    let (input, effective_date) = vd_datetime(input)?;
    let (input, file_structure_version) = nom_u8(input)?;

    Ok((
        input,
        VolumeDescriptorTable {
            volume_flags,
            system_identifier: system_identifier.to_vec(),
            volume_identifier: volume_identifier.to_vec(),
            volume_space_size,
            escape_sequences: escape_sequences.to_vec(),
            volume_set_size,
            volume_sequence_number,
            logical_block_size,
            path_table_size,
            type_l_path_table,
            opt_type_l_path_table,
            type_m_path_table,
            opt_type_m_path_table,
            root_directory_record: root_directory_record.to_vec(),
            volume_set_identifier: volume_set_identifier.to_vec(),
            publisher_identifier: publisher_identifier.to_vec(),
            data_preparer_identifier: data_preparer_identifier.to_vec(),
            application_identifier: application_identifier.to_vec(),
            copyright_file_identifier: copyright_file_identifier.to_vec(),
            abstract_file_identifier: abstract_file_identifier.to_vec(),
            bibliographic_file_identifier: bibliographic_file_identifier.to_vec(),
            creation_date,
            modification_date,
            expiration_date,
            effective_date,
            file_structure_version,
        },
    ))
}

fn boot_record(input: &[u8]) -> NomRes<&[u8], VolumeDescriptor> {
    let (input, boot_system_identifier) = take(32usize)(input)?;
    let (input, boot_identifier) = take(32usize)(input)?;
    let (input, data) = take(1977usize)(input)?;
    Ok((
        input,
        VolumeDescriptor::BootRecord {
            boot_system_identifier: boot_system_identifier.to_vec(),
            boot_identifier: boot_identifier.to_vec(),
            data: data.to_vec(),
        },
    ))
}

/// Parses one 2048-byte Volume Descriptor, dispatching on its type code.
/// The caller is expected to feed exactly one block at a time, starting at
/// LBA 16, and stop once [`VolumeDescriptor::VolumeDescriptorSetTerminator`]
/// is returned.
pub fn volume_descriptor(input: &[u8]) -> NomRes<&[u8], VolumeDescriptor> {
    let (input, type_code) = nom_u8(input)?;
    let (input, _) = tag(STANDARD_ID.as_slice())(input)?;
    let (input, volume_flags) = nom_u8(input)?;

    let (input, descriptor) = match type_code {
        0 => boot_record(input)?,
        1 => map(|i| descriptor_table(i, volume_flags), VolumeDescriptor::Primary)(input)?,
        2 => map(|i| descriptor_table(i, volume_flags), |t| {
            if volume_flags & 1 != 0 {
                VolumeDescriptor::Enhanced(t)
            } else {
                VolumeDescriptor::Supplementary(t)
            }
        })(input)?,
        3 => {
            let (input, volume_partition_identifier) = take(32usize)(input)?;
            (
                input,
                VolumeDescriptor::VolumePartition {
                    volume_partition_identifier: volume_partition_identifier.to_vec(),
                },
            )
        }
        255 => (input, VolumeDescriptor::VolumeDescriptorSetTerminator),
        _ => {
            use nom::error::ParseError;
            return Err(nom::Err::Failure(crate::error::OurNomError::from_error_kind(
                input,
                nom::error::ErrorKind::Switch,
            )));
        }
    };

    Ok((input, descriptor))
}

pub const PVD_LBA: u32 = 16;

pub fn read_length() -> u64 {
    BLOCK_SIZE
}

impl TryFrom<u8> for VdTypeCode {
    type Error = ISOError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => VdTypeCode::BootRecord,
            1 => VdTypeCode::Primary,
            2 => VdTypeCode::Supplementary,
            3 => VdTypeCode::Partition,
            255 => VdTypeCode::Terminator,
            other => return Err(ISOError::UnsupportedVd(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdTypeCode {
    BootRecord,
    Primary,
    Supplementary,
    Partition,
    Terminator,
}
