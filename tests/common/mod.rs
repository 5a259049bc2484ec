//! Builds minimal, byte-accurate ISO 9660 images in memory for the
//! integration tests in this directory. Not a general-purpose mastering
//! tool: just enough to exercise the importer against known bytes.

#![allow(dead_code)]

pub const BLOCK_SIZE: usize = 2048;

pub const IDENTIFIER_SELF: &[u8] = &[0];
pub const IDENTIFIER_PARENT: &[u8] = &[1];

/// File-flags bits from ECMA-119 §9.1.6, duplicated here (rather than
/// depending on the crate under test) so these tests stay a true black-box
/// check of the on-disc format.
pub const FLAG_DIRECTORY: u8 = 1 << 1;
pub const FLAG_MULTIEXTENT: u8 = 1 << 7;

/// One fixed recording date (2024-03-15 10:30:00 UTC) reused by every
/// directory record these tests build.
const RECORD_DATE: [u8; 7] = [124, 3, 15, 10, 30, 0, 0];

/// Builds one directory record: fixed header, identifier (with the
/// ECMA-119 padding-byte rule for even-length identifiers), and a caller
/// supplied System Use Area appended after the identifier.
pub fn directory_record(identifier: &[u8], flags: u8, extent_loc: u32, extent_len: u32, system_use: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&extent_loc.to_le_bytes());
    body.extend_from_slice(&extent_loc.to_be_bytes());
    body.extend_from_slice(&extent_len.to_le_bytes());
    body.extend_from_slice(&extent_len.to_be_bytes());
    body.extend_from_slice(&RECORD_DATE);
    body.push(flags);
    body.push(0); // file unit size
    body.push(0); // interleave gap size
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.push(identifier.len() as u8);
    body.extend_from_slice(identifier);
    if identifier.len() % 2 == 0 {
        body.push(0);
    }
    body.extend_from_slice(system_use);

    let mut total_len = body.len() + 2; // length byte + ext attr length byte
    if total_len % 2 != 0 {
        total_len += 1;
    }

    let mut record = Vec::with_capacity(total_len);
    record.push(total_len as u8);
    record.push(0); // ext attr length
    record.extend_from_slice(&body);
    record.resize(total_len, 0);
    record
}

/// One length-prefixed SUSP/Rock Ridge entry: 2-byte signature, 1-byte
/// total length (signature+length+version+data), 1-byte version, data.
pub fn susp_entry(signature: &[u8; 2], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(signature);
    buf.push((4 + data.len()) as u8);
    buf.push(1);
    buf.extend_from_slice(data);
    buf
}

/// A Rock Ridge `PX` entry: mode, links, uid, gid, each both-endian, plus
/// an optional both-endian inode.
pub fn px_entry(mode: u32, links: u32, uid: u32, gid: u32, inode: Option<u32>) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&mode.to_le_bytes());
    data.extend_from_slice(&mode.to_be_bytes());
    data.extend_from_slice(&links.to_le_bytes());
    data.extend_from_slice(&links.to_be_bytes());
    data.extend_from_slice(&uid.to_le_bytes());
    data.extend_from_slice(&uid.to_be_bytes());
    data.extend_from_slice(&gid.to_le_bytes());
    data.extend_from_slice(&gid.to_be_bytes());
    if let Some(inode) = inode {
        data.extend_from_slice(&inode.to_le_bytes());
        data.extend_from_slice(&inode.to_be_bytes());
    }
    susp_entry(b"PX", &data)
}

/// A Rock Ridge `NM` (alternate name) entry.
pub fn nm_entry(flags: u8, name: &[u8]) -> Vec<u8> {
    let mut data = vec![flags];
    data.extend_from_slice(name);
    susp_entry(b"NM", &data)
}

/// A Rock Ridge `SL` (symlink) entry with a single literal component.
pub fn sl_entry(record_flags: u8, component_flags: u8, component: &[u8]) -> Vec<u8> {
    let mut data = vec![record_flags];
    data.push(component_flags);
    data.push(component.len() as u8);
    data.extend_from_slice(component);
    susp_entry(b"SL", &data)
}

/// A Rock Ridge `CL` (child link) entry.
pub fn cl_entry(block: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&block.to_le_bytes());
    data.extend_from_slice(&block.to_be_bytes());
    susp_entry(b"CL", &data)
}

/// A Rock Ridge `RE` (relocated directory marker) entry, with no payload.
pub fn re_entry() -> Vec<u8> {
    susp_entry(b"RE", &[])
}

/// An `AA` AAIP field fragment. `continuation` sets the per-field
/// continuation flag bit this crate's decoder strips before reassembly.
pub fn aa_entry(continuation: bool, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![if continuation { 1 } else { 0 }];
    data.extend_from_slice(payload);
    susp_entry(b"AA", &data)
}

/// One length-prefixed AAIP component (used to build the reassembled
/// stream `AA` fields carry).
pub fn aaip_component(bytes: &[u8]) -> Vec<u8> {
    let mut out = (bytes.len() as u16).to_le_bytes().to_vec();
    out.extend_from_slice(bytes);
    out
}

/// One full name/value AAIP pair.
pub fn aaip_pair(name: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = aaip_component(name);
    out.extend(aaip_component(value));
    out
}

/// A fixed-size block buffer that records written blocks by LBA; any LBA
/// never written reads back as zeros, matching an image with unused gaps.
pub struct ImageBuilder {
    blocks: std::collections::BTreeMap<u32, Vec<u8>>,
    highest_lba: u32,
}

impl ImageBuilder {
    pub fn new() -> Self {
        ImageBuilder { blocks: std::collections::BTreeMap::new(), highest_lba: 17 }
    }

    /// Writes `data` at `lba`, zero-padded (or truncated) to one block.
    pub fn set_block(&mut self, lba: u32, mut data: Vec<u8>) -> &mut Self {
        data.resize(BLOCK_SIZE, 0);
        self.highest_lba = self.highest_lba.max(lba);
        self.blocks.insert(lba, data);
        self
    }

    /// Writes `records` concatenated into one directory block at `lba`.
    pub fn set_directory_block(&mut self, lba: u32, records: &[Vec<u8>]) -> &mut Self {
        let mut block = Vec::new();
        for record in records {
            block.extend_from_slice(record);
        }
        self.set_block(lba, block)
    }

    /// Writes the Primary Volume Descriptor at LBA 16 and the Volume
    /// Descriptor Set Terminator at LBA 17.
    pub fn set_primary_volume_descriptor(&mut self, root_lba: u32, root_len: u32, volume_space_size: u32) -> &mut Self {
        let mut block = Vec::new();
        block.push(1); // type code: Primary
        block.extend_from_slice(b"CD001");
        block.push(1); // version
        block.push(0); // volume flags

        block.extend_from_slice(&[0u8; 32]); // system identifier
        let mut volume_id = b"TESTVOL".to_vec();
        volume_id.resize(32, b' ');
        block.extend_from_slice(&volume_id);
        block.extend_from_slice(&[0u8; 8]); // unused

        block.extend_from_slice(&volume_space_size.to_le_bytes());
        block.extend_from_slice(&volume_space_size.to_be_bytes());
        block.extend_from_slice(&[0u8; 32]); // escape sequences (plain ECMA-119, no Joliet)

        block.extend_from_slice(&1u16.to_le_bytes());
        block.extend_from_slice(&1u16.to_be_bytes());
        block.extend_from_slice(&1u16.to_le_bytes());
        block.extend_from_slice(&1u16.to_be_bytes());
        block.extend_from_slice(&2048u16.to_le_bytes());
        block.extend_from_slice(&2048u16.to_be_bytes());

        block.extend_from_slice(&0u32.to_le_bytes());
        block.extend_from_slice(&0u32.to_be_bytes());
        block.extend_from_slice(&0u32.to_le_bytes());
        block.extend_from_slice(&0u32.to_le_bytes());
        block.extend_from_slice(&0u32.to_be_bytes());
        block.extend_from_slice(&0u32.to_be_bytes());

        let root_record = directory_record(IDENTIFIER_SELF, FLAG_DIRECTORY, root_lba, root_len, &[]);
        assert_eq!(root_record.len(), 34, "root directory record field must be exactly 34 bytes");
        block.extend_from_slice(&root_record);

        for len in [128, 128, 128, 128, 37, 37, 37] {
            block.extend_from_slice(&vec![b' '; len]);
        }

        for _ in 0..4 {
            block.extend_from_slice(&[0u8; 16]);
            block.push(0); // gmt offset
        }
        block.push(1); // file structure version

        self.set_block(16, block);
        self.set_block(17, {
            let mut term = vec![255u8];
            term.extend_from_slice(b"CD001");
            term.push(1);
            term
        });
        self
    }

    /// Adds an El Torito Boot Record volume descriptor at `lba`, pointing
    /// at a boot catalog starting at `catalog_lba`.
    pub fn set_boot_record(&mut self, lba: u32, catalog_lba: u32) -> &mut Self {
        let mut block = Vec::new();
        block.push(0); // type code: Boot Record
        block.extend_from_slice(b"CD001");
        block.push(1); // version
        let mut system_id = b"EL TORITO SPECIFICATION".to_vec();
        system_id.resize(32, 0);
        block.extend_from_slice(&system_id);
        block.extend_from_slice(&[0u8; 32]); // boot identifier
        let mut data = catalog_lba.to_le_bytes().to_vec();
        data.resize(1977, 0);
        block.extend_from_slice(&data);
        self.set_block(lba, block);
        self
    }

    /// Flattens every written block (plus zero-filled gaps) into one
    /// contiguous image buffer, long enough to cover the highest LBA
    /// written.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = vec![0u8; (self.highest_lba as usize + 1) * BLOCK_SIZE];
        for (&lba, data) in &self.blocks {
            let start = lba as usize * BLOCK_SIZE;
            out[start..start + BLOCK_SIZE].copy_from_slice(data);
        }
        out
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
