//! End-to-end El Torito boot catalog decoding through a full import.

mod common;

use std::io::Cursor;

use isofs_core::{eltorito::BootPlatform, import_image, node::Node, options::ReadOptions};

/// Builds a 32-byte validation entry: header id, platform id, 2 reserved
/// bytes, 24-byte id string, checksum, and the `0x55 0xAA` key bytes.
fn validation_entry(platform_id: u8, id_string: &[u8]) -> Vec<u8> {
    let mut record = vec![1u8, platform_id, 0, 0];
    let mut id = id_string.to_vec();
    id.resize(24, 0);
    record.extend_from_slice(&id);
    record.extend_from_slice(&0u16.to_le_bytes());
    record.extend_from_slice(&[0x55, 0xAA]);
    assert_eq!(record.len(), 32);
    record
}

/// Builds a 32-byte default/section boot image entry.
fn boot_image_entry(bootable: bool, load_rba: u32, sector_count: u16) -> Vec<u8> {
    let mut record = vec![if bootable { 0x88 } else { 0x00 }, 0];
    record.extend_from_slice(&0u16.to_le_bytes()); // load segment
    record.push(0); // system type
    record.push(0); // reserved
    record.extend_from_slice(&sector_count.to_le_bytes());
    record.extend_from_slice(&load_rba.to_le_bytes());
    record.push(0); // selection criterion type: none
    record.extend_from_slice(&[0u8; 19]);
    assert_eq!(record.len(), 32);
    record
}

#[test]
fn boot_catalog_decoded_from_boot_record() {
    let mut image = common::ImageBuilder::new();
    image.set_primary_volume_descriptor(18, 2048, 64);
    image.set_boot_record(19, 30);

    let boot_image_content = vec![0xEBu8; 2048];

    image.set_directory_block(
        18,
        &[
            common::directory_record(common::IDENTIFIER_SELF, common::FLAG_DIRECTORY, 18, 2048, &[]),
            common::directory_record(common::IDENTIFIER_PARENT, common::FLAG_DIRECTORY, 18, 2048, &[]),
            common::directory_record(b"BOOT.IMG;1", 0, 31, boot_image_content.len() as u32, &[]),
        ],
    );
    image.set_block(31, boot_image_content);

    let mut catalog = validation_entry(0x00, b"TEST");
    catalog.extend(boot_image_entry(true, 31, 4));
    image.set_block(30, catalog);

    let cursor = Cursor::new(image.finish());
    let imported = import_image(cursor, &ReadOptions::default()).unwrap();

    assert!(imported.image.features.el_torito);
    let catalog = imported.boot_catalog.expect("boot catalog present");
    let validation = catalog.validation.expect("validation entry present");
    assert_eq!(validation.platform_id, BootPlatform::X86);

    let default_entry = catalog.default_entry.expect("default entry present");
    assert!(default_entry.bootable);
    assert_eq!(default_entry.load_rba, 31);
    assert!(imported.hidden_boot_images.is_empty(), "boot image is reachable from the directory tree");
}

#[test]
fn boot_image_not_referenced_by_tree_is_reported_hidden() {
    let mut image = common::ImageBuilder::new();
    image.set_primary_volume_descriptor(18, 2048, 64);
    image.set_boot_record(19, 30);

    image.set_directory_block(
        18,
        &[
            common::directory_record(common::IDENTIFIER_SELF, common::FLAG_DIRECTORY, 18, 2048, &[]),
            common::directory_record(common::IDENTIFIER_PARENT, common::FLAG_DIRECTORY, 18, 2048, &[]),
        ],
    );

    let mut catalog = validation_entry(0x00, b"TEST");
    catalog.extend(boot_image_entry(true, 99, 4));
    image.set_block(30, catalog);
    image.set_block(99, vec![0u8; 2048]);

    let cursor = Cursor::new(image.finish());
    let imported = import_image(cursor, &ReadOptions::default()).unwrap();

    assert!(imported.image.features.el_torito);
    assert_eq!(imported.hidden_boot_images, vec![99]);

    let root = imported.effective_root(false);
    let placeholder = imported.arena.find(root, "boot_image_99").expect("placeholder node attached under root");
    let Node::BootPlaceholder(placeholder) = imported.arena.get(placeholder) else {
        panic!("boot_image_99 should be a BootPlaceholder node");
    };
    assert_eq!(placeholder.load_rba, 99);
    assert_eq!(placeholder.size, 2048);
}
