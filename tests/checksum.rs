//! End-to-end MD5 tree-checksum verification through a full import.

mod common;

use std::io::Cursor;

use isofs_core::{import_image, options::ReadOptions};

const TAG_MAGIC: &[u8; 3] = b"M5T";
const KIND_TREE: u8 = 1 << 1;
const KIND_SESSION_START: u8 = 1 << 4;

fn md5_tag(kind: u8, range_start: u32, range_size: u32, digest: [u8; 16]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(TAG_MAGIC.as_slice());
    buf.push(kind);
    buf.extend_from_slice(&0u32.to_le_bytes()); // pos (unused by the checker)
    buf.extend_from_slice(&range_start.to_le_bytes());
    buf.extend_from_slice(&range_size.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // next_tag (unused by the checker)
    buf.extend_from_slice(&digest);
    buf
}

#[test]
fn matching_tree_tag_is_reported_as_checked() {
    let mut image = common::ImageBuilder::new();
    image.set_primary_volume_descriptor(18, 2048, 64);
    image.set_directory_block(
        18,
        &[
            common::directory_record(common::IDENTIFIER_SELF, common::FLAG_DIRECTORY, 18, 2048, &[]),
            common::directory_record(common::IDENTIFIER_PARENT, common::FLAG_DIRECTORY, 18, 2048, &[]),
        ],
    );

    let mut covered_block = vec![b'Z'; common::BLOCK_SIZE];
    covered_block.truncate(common::BLOCK_SIZE);
    image.set_block(20, covered_block.clone());
    let digest = md5::compute(&covered_block).0;

    let tag = md5_tag(KIND_TREE | KIND_SESSION_START, 20, 1, digest);
    image.set_block(2, tag);

    let cursor = Cursor::new(image.finish());
    let imported = import_image(cursor, &ReadOptions::default()).unwrap();
    assert!(imported.image.features.tree_checksums);
}

#[test]
fn mismatched_digest_in_strict_mode_fails_import() {
    let mut image = common::ImageBuilder::new();
    image.set_primary_volume_descriptor(18, 2048, 64);
    image.set_directory_block(
        18,
        &[
            common::directory_record(common::IDENTIFIER_SELF, common::FLAG_DIRECTORY, 18, 2048, &[]),
            common::directory_record(common::IDENTIFIER_PARENT, common::FLAG_DIRECTORY, 18, 2048, &[]),
        ],
    );
    image.set_block(20, vec![b'Z'; common::BLOCK_SIZE]);

    let wrong_digest = [0u8; 16];
    let tag = md5_tag(KIND_TREE | KIND_SESSION_START, 20, 1, wrong_digest);
    image.set_block(2, tag);

    let cursor = Cursor::new(image.finish());
    let mut options = ReadOptions::default();
    options.checksum_strict = true;
    assert!(import_image(cursor, &options).is_err());
}

#[test]
fn image_without_tags_imports_without_tree_checksums_feature() {
    let mut image = common::ImageBuilder::new();
    image.set_primary_volume_descriptor(18, 2048, 64);
    image.set_directory_block(
        18,
        &[
            common::directory_record(common::IDENTIFIER_SELF, common::FLAG_DIRECTORY, 18, 2048, &[]),
            common::directory_record(common::IDENTIFIER_PARENT, common::FLAG_DIRECTORY, 18, 2048, &[]),
        ],
    );

    let cursor = Cursor::new(image.finish());
    let imported = import_image(cursor, &ReadOptions::default()).unwrap();
    assert!(!imported.image.features.tree_checksums);
}
