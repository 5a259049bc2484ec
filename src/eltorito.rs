// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! El Torito boot catalog parsing and boot-image post-processing
//! (boot-info-table detection, GRUB2 patch detection).

use nom::{
    bytes::complete::{tag, take},
    combinator::map,
    number::complete::{le_u16, le_u32, u8 as nom_u8},
    sequence::tuple,
};

use crate::{
    block::BLOCK_SIZE,
    error::{ISOError, NomRes, Result},
    message::{Severity, WarningReporter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPlatform {
    X86,
    PowerPc,
    Mac,
    Efi,
    Other(u8),
}

impl From<u8> for BootPlatform {
    fn from(value: u8) -> Self {
        match value {
            0x00 => BootPlatform::X86,
            0x01 => BootPlatform::PowerPc,
            0x02 => BootPlatform::Mac,
            0xEF => BootPlatform::Efi,
            other => BootPlatform::Other(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationEntry {
    pub platform_id: BootPlatform,
    pub id_string: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BootImageEntry {
    pub bootable: bool,
    pub media_type: u8,
    pub load_segment: u16,
    pub system_type: u8,
    pub sector_count: u16,
    pub load_rba: u32,
    pub selection_criterion: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub last_section: bool,
    pub platform_id: BootPlatform,
    pub id_string: Vec<u8>,
    pub entries: Vec<BootImageEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct BootCatalog {
    pub validation: Option<ValidationEntry>,
    pub default_entry: Option<BootImageEntry>,
    pub sections: Vec<SectionHeader>,
}

const RECORD_LEN: usize = 32;

fn validation_entry(input: &[u8]) -> NomRes<&[u8], ValidationEntry> {
    let (input, _header_id) = tag([1u8].as_slice())(input)?;
    let (input, platform_id) = nom_u8(input)?;
    let (input, _reserved) = take(2usize)(input)?;
    let (input, id_string) = take(24usize)(input)?;
    let (input, _checksum) = le_u16(input)?;
    let (input, _key) = tag([0x55u8, 0xAA].as_slice())(input)?;
    Ok((
        input,
        ValidationEntry {
            platform_id: platform_id.into(),
            id_string: id_string.to_vec(),
        },
    ))
}

fn boot_entry(input: &[u8]) -> NomRes<&[u8], BootImageEntry> {
    let (input, boot_indicator) = nom_u8(input)?;
    let (input, media_type) = nom_u8(input)?;
    let (input, load_segment) = le_u16(input)?;
    let (input, system_type) = nom_u8(input)?;
    let (input, _reserved) = take(1usize)(input)?;
    let (input, sector_count) = le_u16(input)?;
    let (input, load_rba) = le_u32(input)?;
    let (input, selection_criterion_type) = nom_u8(input)?;
    let (input, selection_criterion) = take(19usize)(input)?;
    let selection_criterion = if selection_criterion_type == 0 {
        None
    } else {
        Some(selection_criterion.to_vec())
    };
    Ok((
        input,
        BootImageEntry {
            bootable: boot_indicator == 0x88,
            media_type,
            load_segment,
            system_type,
            sector_count,
            load_rba,
            selection_criterion,
        },
    ))
}

fn section_header(input: &[u8]) -> NomRes<&[u8], (bool, BootPlatform, Vec<u8>, u16)> {
    map(
        tuple((nom_u8, nom_u8, le_u16, take(28usize))),
        |(header_id, platform_id, num_entries, id_string): (u8, u8, u16, &[u8])| {
            (header_id & 1 == 0, platform_id.into(), id_string.to_vec(), num_entries)
        },
    )(input)
}

/// Parses a boot catalog that has already been read into memory (typically
/// via [`crate::stream::MemoryStream`], capped to [`MAX_CATALOG_BYTES`]).
///
/// One validation entry, one default entry, then zero or more section
/// header/entry groups follow until a header with its "last section" bit
/// set, or `max_images` boot images have been collected (whichever comes
/// first — the overflow is reported through `reporter` rather than failing
/// the whole catalog).
pub fn read_boot_catalog(data: &[u8], max_images: usize, reporter: &mut WarningReporter) -> Result<BootCatalog> {
    if data.len() < RECORD_LEN * 2 {
        return Err(ISOError::WrongElTorito("catalog shorter than validation+default entries"));
    }

    let (rest, validation) = validation_entry(&data[..RECORD_LEN])
        .map_err(|_| ISOError::WrongElTorito("bad validation entry"))?;
    debug_assert!(rest.is_empty());

    let (rest, default_entry) = boot_entry(&data[RECORD_LEN..RECORD_LEN * 2])
        .map_err(|_| ISOError::WrongElTorito("bad default entry"))?;
    debug_assert!(rest.is_empty());

    let mut catalog = BootCatalog {
        validation: Some(validation),
        default_entry: Some(default_entry),
        sections: Vec::new(),
    };

    let mut image_count = 1;
    let mut offset = RECORD_LEN * 2;

    while offset + RECORD_LEN <= data.len() {
        let record = &data[offset..offset + RECORD_LEN];
        if record[0] & 0xFE != 0x90 {
            // Neither a section header (0x90/0x91) nor anything else we
            // understand; a well-formed catalog ends here.
            break;
        }
        let (_, (last_section, platform_id, id_string, num_entries)) = section_header(record)
            .map_err(|_| ISOError::WrongElTorito("bad section header"))?;
        offset += RECORD_LEN;

        let mut entries = Vec::new();
        for _ in 0..num_entries {
            if offset + RECORD_LEN > data.len() {
                reporter.report(Severity::Warning, "eltorito.truncated_section", "section entry count exceeds catalog length");
                break;
            }
            if image_count >= max_images {
                reporter.report_always(
                    Severity::Warning,
                    "eltorito.max_images",
                    format!("truncating boot catalog at {max_images} images"),
                );
                offset += RECORD_LEN;
                continue;
            }
            let (_, entry) = boot_entry(&data[offset..offset + RECORD_LEN])
                .map_err(|_| ISOError::WrongElTorito("bad section entry"))?;
            entries.push(entry);
            image_count += 1;
            offset += RECORD_LEN;
        }

        catalog.sections.push(SectionHeader {
            last_section,
            platform_id,
            id_string,
            entries,
        });

        if last_section {
            break;
        }
    }

    Ok(catalog)
}

/// `boot-info-table` patch: a 56-byte structure some bootloaders expect at
/// byte offset 8 of the boot image itself, giving it a way to find its own
/// PVD/LBA/length/checksum without depending on BIOS-reported geometry.
#[derive(Debug, Clone, Copy)]
pub struct BootInfoTable {
    pub pvd_lba: u32,
    pub boot_file_lba: u32,
    pub boot_file_length: u32,
    pub checksum: u32,
}

const BOOT_INFO_TABLE_OFFSET: usize = 8;
const BOOT_INFO_TABLE_LEN: usize = 16;

/// Looks for a boot-info-table at the fixed offset and, if found, verifies
/// its checksum against the rest of the boot image (every `u32`-LE word
/// from byte 64 onward, summed mod 2^32, per the convention used when the
/// table is written).
pub fn detect_boot_info_table(image: &[u8]) -> Option<BootInfoTable> {
    if image.len() < BOOT_INFO_TABLE_OFFSET + BOOT_INFO_TABLE_LEN {
        return None;
    }
    let field = |off: usize| -> u32 {
        u32::from_le_bytes(image[off..off + 4].try_into().unwrap())
    };
    let table = BootInfoTable {
        pvd_lba: field(BOOT_INFO_TABLE_OFFSET),
        boot_file_lba: field(BOOT_INFO_TABLE_OFFSET + 4),
        boot_file_length: field(BOOT_INFO_TABLE_OFFSET + 8),
        checksum: field(BOOT_INFO_TABLE_OFFSET + 12),
    };

    if table.pvd_lba == 0 || table.boot_file_length as usize > image.len() {
        return None;
    }

    Some(table)
}

pub fn verify_boot_info_table_checksum(image: &[u8], table: &BootInfoTable) -> bool {
    let payload_end = (table.boot_file_length as usize).min(image.len());
    if payload_end < 64 {
        return table.checksum == 0;
    }
    let mut sum: u32 = 0;
    for chunk in image[64..payload_end].chunks(4) {
        if chunk.len() == 4 {
            sum = sum.wrapping_add(u32::from_le_bytes(chunk.try_into().unwrap()));
        }
    }
    sum == table.checksum
}

/// GRUB2's `core.img` carries a small blocklist patch rather than the
/// generic boot-info-table: `grub-bios-setup` writes the image's own start
/// sector into an 8-byte little-endian slot at `boot_lba * 4 +
/// GRUB2_PATCH_OFFSET`, so the patch moves with wherever the image actually
/// landed on disc. Detecting it lets an importer avoid mistaking the patch
/// bytes for file corruption.
const GRUB2_PATCH_OFFSET: usize = 0x1F8;

pub fn detect_grub2_patch(image: &[u8], boot_lba: u32) -> bool {
    let offset = boot_lba as usize * 4 + GRUB2_PATCH_OFFSET;
    if image.len() < offset + 8 {
        return false;
    }
    let value = u64::from_le_bytes(image[offset..offset + 8].try_into().unwrap());
    value == boot_lba as u64
}

/// Caps how much of a boot catalog is buffered in memory, a guard against a
/// corrupt catalog claiming an enormous section count.
pub const MAX_CATALOG_BYTES: u64 = 10 * BLOCK_SIZE;

/// Post-processing results for one boot image's own content, gathered by
/// [`analyze_boot_image`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BootImageStatus {
    pub load_rba: u32,
    pub boot_info_table: Option<BootInfoTable>,
    pub boot_info_checksum_ok: Option<bool>,
    pub grub2_patch: bool,
}

/// Runs boot-info-table and GRUB2 patch detection over one boot image's raw
/// content, reporting a warning if a boot-info-table is present but its
/// checksum doesn't match.
pub fn analyze_boot_image(data: &[u8], load_rba: u32, reporter: &mut WarningReporter) -> BootImageStatus {
    let boot_info_table = detect_boot_info_table(data);
    let boot_info_checksum_ok = boot_info_table.as_ref().map(|table| {
        let ok = verify_boot_info_table_checksum(data, table);
        if !ok {
            reporter.report(
                Severity::Warning,
                "eltorito.bad_boot_info_checksum",
                format!("boot image at LBA {load_rba} has a boot-info-table with a mismatched checksum"),
            );
        }
        ok
    });
    BootImageStatus {
        load_rba,
        boot_info_table,
        boot_info_checksum_ok,
        grub2_patch: detect_grub2_patch(data, load_rba),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_bytes(platform: u8) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0] = 1;
        buf[1] = platform;
        buf[30] = 0x55;
        buf[31] = 0xAA;
        buf
    }

    fn default_bytes(bootable: bool, load_rba: u32) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0] = if bootable { 0x88 } else { 0x00 };
        buf[1] = 0; // no emulation
        buf[8..12].copy_from_slice(&load_rba.to_le_bytes());
        buf
    }

    #[test]
    fn parses_minimal_catalog() {
        let mut data = Vec::new();
        data.extend_from_slice(&validation_bytes(0));
        data.extend_from_slice(&default_bytes(true, 100));
        let mut reporter = WarningReporter::new();
        let catalog = read_boot_catalog(&data, 32, &mut reporter).unwrap();
        assert!(catalog.default_entry.unwrap().bootable);
        assert!(catalog.sections.is_empty());
    }

    #[test]
    fn rejects_bad_validation_key() {
        let mut data = Vec::new();
        let mut bad = validation_bytes(0);
        bad[30] = 0;
        bad[31] = 0;
        data.extend_from_slice(&bad);
        data.extend_from_slice(&default_bytes(true, 100));
        let mut reporter = WarningReporter::new();
        assert!(read_boot_catalog(&data, 32, &mut reporter).is_err());
    }

    #[test]
    fn detects_boot_info_table() {
        let mut image = vec![0u8; 100];
        image[8..12].copy_from_slice(&16u32.to_le_bytes());
        image[12..16].copy_from_slice(&17u32.to_le_bytes());
        image[16..20].copy_from_slice(&90u32.to_le_bytes());
        let table = detect_boot_info_table(&image).unwrap();
        assert_eq!(table.pvd_lba, 16);
    }

    #[test]
    fn detects_grub2_patch_at_lba_relative_offset() {
        let boot_lba = 42u32;
        let offset = boot_lba as usize * 4 + GRUB2_PATCH_OFFSET;
        let mut image = vec![0u8; offset + 8];
        image[offset..offset + 8].copy_from_slice(&(boot_lba as u64).to_le_bytes());
        assert!(detect_grub2_patch(&image, boot_lba));
        assert!(!detect_grub2_patch(&image, boot_lba + 1));
    }

    #[test]
    fn grub2_patch_absent_when_image_too_short() {
        let image = vec![0u8; 16];
        assert!(!detect_grub2_patch(&image, 42));
    }
}
