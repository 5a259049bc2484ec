// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MD5 tree-checksum verification.
//!
//! Some mastering tools stamp an image with MD5 tags covering the
//! superblock and the whole directory/file tree, recorded both as
//! `isofs.ca`/`isofs.cx` xattrs on the root and as small tag records
//! embedded directly in the first few blocks after the session start. This
//! module handles the embedded-tag form; the xattr form is decoded by
//! [`crate::aaip`] and cross-checked against it by the importer.

use nom::{
    bytes::complete::{tag as nom_tag, take},
    number::complete::{le_u32, u8 as nom_u8},
};

use crate::{
    block::BlockSource,
    error::{ISOError, NomRes, Result},
};

const TAG_MAGIC: &[u8; 3] = b"M5T";

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TagKind: u8 {
        const SUPERBLOCK          = 1 << 0;
        const TREE                = 1 << 1;
        const END                 = 1 << 2;
        const RELOCATED_SUPERBLOCK = 1 << 3;
        const SESSION_START       = 1 << 4;
    }
}

#[derive(Debug, Clone)]
pub struct Md5Tag {
    pub kind: TagKind,
    pub pos: u32,
    pub range_start: u32,
    pub range_size: u32,
    pub next_tag: u32,
    pub digest: [u8; 16],
}

fn md5_tag(input: &[u8]) -> NomRes<&[u8], Md5Tag> {
    let (input, _) = nom_tag(TAG_MAGIC.as_slice())(input)?;
    let (input, raw_kind) = nom_u8(input)?;
    let (input, pos) = le_u32(input)?;
    let (input, range_start) = le_u32(input)?;
    let (input, range_size) = le_u32(input)?;
    let (input, next_tag) = le_u32(input)?;
    let (input, digest_bytes) = take(16usize)(input)?;
    let mut digest = [0u8; 16];
    digest.copy_from_slice(digest_bytes);
    Ok((
        input,
        Md5Tag {
            kind: TagKind::from_bits_truncate(raw_kind),
            pos,
            range_start,
            range_size,
            next_tag,
            digest,
        },
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// Every required tag was found and matched its computed digest.
    Checked,
    /// No tags were present at all; this image simply isn't checksummed.
    NoTagsFound,
}

/// Scans up to 32 blocks starting at `start_lba + 2` for MD5 tags (the
/// superblock and tree tags conventionally sit at relative indices 2, 3
/// and 4), verifying each against freshly-read block content. A session
/// that doesn't start at LBA 0 (i.e. was accommodated from a multisession
/// image) does not require a `SESSION_START` tag, mirroring the relaxed
/// check a relocated superblock gets.
pub fn verify_sb_tree<T: BlockSource>(source: &mut T, start_lba: u32, strict: bool) -> Result<CheckResult> {
    verify_sb_tree_window(source, start_lba, start_lba.saturating_add(32), strict)
}

/// Core scan, bounded to `[start_lba + 2, window_end)`. Split out from
/// [`verify_sb_tree`] so a `RELOCATED_SUPERBLOCK` redirect can re-enter the
/// scan at the real session start without re-deriving the window math.
fn verify_sb_tree_window<T: BlockSource>(
    source: &mut T,
    start_lba: u32,
    window_end: u32,
    strict: bool,
) -> Result<CheckResult> {
    let desired = if start_lba == 0 {
        TagKind::TREE | TagKind::SESSION_START
    } else {
        TagKind::TREE
    };

    let mut found = TagKind::empty();
    let mut any_tag = false;

    for lba in (start_lba.saturating_add(2))..window_end {
        let block = match source.read_full_block(lba) {
            Ok(b) => b,
            Err(_) => break,
        };
        let Ok((_, parsed_tag)) = md5_tag(&block) else {
            continue;
        };
        any_tag = true;

        if parsed_tag.kind.contains(TagKind::RELOCATED_SUPERBLOCK) {
            // The real tree/superblock tags were written at a different
            // session start than the one we were asked to check (the
            // original session got grown and its checksum area moved);
            // `range_start` carries that real start, `next_tag` bounds how
            // far past it to keep scanning. Mirrors libisofs/tree.c's
            // `iso_src_check_sb_tree` redirect.
            return verify_sb_tree_window(source, parsed_tag.range_start, parsed_tag.next_tag, strict);
        }

        found |= parsed_tag.kind;

        if !verify_tag_digest(source, &parsed_tag)? {
            if strict {
                return Err(ISOError::Md5TagMismatch(lba));
            }
            log::warn!("MD5 tag mismatch at block {lba}");
        }
    }

    if !any_tag {
        return Ok(CheckResult::NoTagsFound);
    }
    if !found.contains(desired) {
        return Err(ISOError::Md5AreaCorrupted);
    }
    Ok(CheckResult::Checked)
}

fn verify_tag_digest<T: BlockSource>(source: &mut T, tag: &Md5Tag) -> Result<bool> {
    let mut ctx = md5::Context::new();
    let blocks = tag.range_size;
    for i in 0..blocks {
        let block = source.read_full_block(tag.range_start + i)?;
        ctx.consume(&block);
    }
    let digest = ctx.compute();
    Ok(digest.0 == tag.digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_tag(kind: TagKind, range_start: u32, range_size: u32, digest: [u8; 16]) -> Vec<u8> {
        build_tag_with_next(kind, range_start, range_size, 0, digest)
    }

    fn build_tag_with_next(kind: TagKind, range_start: u32, range_size: u32, next_tag: u32, digest: [u8; 16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(TAG_MAGIC.as_slice());
        buf.push(kind.bits());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&range_start.to_le_bytes());
        buf.extend_from_slice(&range_size.to_le_bytes());
        buf.extend_from_slice(&next_tag.to_le_bytes());
        buf.extend_from_slice(&digest);
        buf.resize(crate::block::BLOCK_SIZE as usize, 0);
        buf
    }

    #[test]
    fn no_tags_found_when_image_has_none() {
        let mut image = Cursor::new(vec![0u8; crate::block::BLOCK_SIZE as usize * 40]);
        let result = verify_sb_tree(&mut image, 0, false).unwrap();
        assert_eq!(result, CheckResult::NoTagsFound);
    }

    #[test]
    fn redirects_to_real_session_start_on_relocated_superblock() {
        let mut data_block = vec![0xABu8; crate::block::BLOCK_SIZE as usize];
        let mut ctx = md5::Context::new();
        ctx.consume(&data_block);
        let digest = ctx.compute();

        let mut image = vec![0u8; crate::block::BLOCK_SIZE as usize * 80];

        let redirect_block = build_tag_with_next(TagKind::RELOCATED_SUPERBLOCK, 50, 0, 70, [0u8; 16]);
        image[crate::block::BLOCK_SIZE as usize * 3..crate::block::BLOCK_SIZE as usize * 4]
            .copy_from_slice(&redirect_block);

        let real_tag_block = build_tag(TagKind::TREE | TagKind::SESSION_START, 60, 1, digest.0);
        image[crate::block::BLOCK_SIZE as usize * 52..crate::block::BLOCK_SIZE as usize * 53]
            .copy_from_slice(&real_tag_block);
        image[crate::block::BLOCK_SIZE as usize * 60..crate::block::BLOCK_SIZE as usize * 61]
            .copy_from_slice(&data_block);
        data_block.clear();

        let mut cursor = Cursor::new(image);
        let result = verify_sb_tree(&mut cursor, 0, true).unwrap();
        assert_eq!(result, CheckResult::Checked);
    }

    #[test]
    fn checks_matching_tree_tag() {
        let mut data_block = vec![0xABu8; crate::block::BLOCK_SIZE as usize];
        let mut ctx = md5::Context::new();
        ctx.consume(&data_block);
        let digest = ctx.compute();

        let mut image = vec![0u8; crate::block::BLOCK_SIZE as usize * 40];
        let tag_block = build_tag(TagKind::TREE | TagKind::SESSION_START, 20, 1, digest.0);
        image[crate::block::BLOCK_SIZE as usize * 3..crate::block::BLOCK_SIZE as usize * 4].copy_from_slice(&tag_block);
        image[crate::block::BLOCK_SIZE as usize * 20..crate::block::BLOCK_SIZE as usize * 21]
            .copy_from_slice(&data_block);
        data_block.clear();

        let mut cursor = Cursor::new(image);
        let result = verify_sb_tree(&mut cursor, 0, true).unwrap();
        assert_eq!(result, CheckResult::Checked);
    }
}
