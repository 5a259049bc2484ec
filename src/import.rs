// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Ties every other module together: reads volume descriptors, walks the
//! directory tree, decodes Rock Ridge/AAIP along the way, and parses the
//! El Torito boot catalog and tree checksums when present.

use std::collections::HashSet;

use crate::{
    aaip::{self, AttributeList},
    block::{BlockSource, BlockSourceHandle, BLOCK_SIZE},
    charset::{CharacterEncoding, CharsetConverter},
    checksum,
    error::{ISOError, Result},
    eltorito::{self, BootCatalog},
    features::{ImageFeatures, SuspExtension},
    inode::InodeAllocator,
    message::{Severity, WarningReporter},
    node::{DirNode, FileNode, Node, NodeArena, NodeIndex, SpecialKind, SpecialNode, SymlinkNode},
    options::ReadOptions,
    parse::{
        directory_entry::{self, FileFlags},
        susp::{PosixFileMode, SystemUseEntry},
        volume_descriptor::{self, VolumeDescriptor, VolumeDescriptorTable},
    },
    rockridge::{self, RockRidgeInfo},
    stream::{FileSourceStream, MemoryStream, StreamHandle, StreamId},
};

/// Owns the mutable state one import run needs to thread through the whole
/// tree walk: the inode counter, the warning de-dup table and which
/// extensions were observed.
#[derive(Debug, Default)]
pub struct Image {
    pub features: ImageFeatures,
    pub inode_alloc: InodeAllocator,
    pub reporter: WarningReporter,
    /// LBAs of every regular file's first extent seen while walking the
    /// tree, used to tell whether an El Torito boot image is reachable
    /// from the directory hierarchy or only from the boot catalog.
    file_lbas: HashSet<u32>,
}

pub struct ImportedImage {
    pub arena: NodeArena,
    pub root: NodeIndex,
    pub joliet_root: Option<NodeIndex>,
    pub boot_catalog: Option<BootCatalog>,
    /// LBAs of catalog boot images not reachable from the directory tree.
    /// Each one also got a `Node::BootPlaceholder` attached under the root
    /// (named `boot_image_<lba>`) so it's still reachable by consumers that
    /// only walk the tree.
    pub hidden_boot_images: Vec<u32>,
    /// Boot-info-table/GRUB2-patch detection results for every catalog
    /// boot image, in catalog order (default entry first, then sections).
    pub boot_image_status: Vec<eltorito::BootImageStatus>,
    pub image: Image,
}

impl ImportedImage {
    /// Picks the tree to expose by default: Rock Ridge over Joliet over
    /// plain ECMA-119.
    pub fn effective_root(&self, prefer_joliet: bool) -> NodeIndex {
        if self.image.features.is_rock_ridge() {
            self.root
        } else if prefer_joliet {
            self.joliet_root.unwrap_or(self.root)
        } else {
            self.root
        }
    }
}

struct VolumeDescriptors {
    primary: VolumeDescriptorTable,
    supplementary: Option<VolumeDescriptorTable>,
    boot_record: Option<(Vec<u8>, Vec<u8>, Vec<u8>)>,
}

fn read_volume_descriptors<T: BlockSource>(source: &mut T) -> Result<VolumeDescriptors> {
    let mut primary = None;
    let mut supplementary = None;
    let mut boot_record = None;
    let mut lba = volume_descriptor::PVD_LBA;

    loop {
        let block = source.read_full_block(lba)?;
        let (_, vd) = volume_descriptor::volume_descriptor(&block)?;
        match vd {
            VolumeDescriptor::Primary(table) => primary = Some(table),
            VolumeDescriptor::Supplementary(table) | VolumeDescriptor::Enhanced(table) => {
                if supplementary.is_none() {
                    supplementary = Some(table);
                }
            }
            VolumeDescriptor::BootRecord { boot_system_identifier, boot_identifier, data } => {
                boot_record = Some((boot_system_identifier, boot_identifier, data));
            }
            VolumeDescriptor::VolumeDescriptorSetTerminator => break,
            VolumeDescriptor::VolumePartition { .. } => {}
        }
        lba += 1;
        if lba > volume_descriptor::PVD_LBA + 256 {
            return Err(ISOError::WrongPvd("no volume descriptor set terminator found"));
        }
    }

    let primary = primary.ok_or(ISOError::WrongPvd("missing primary volume descriptor"))?;
    Ok(VolumeDescriptors { primary, supplementary, boot_record })
}

fn root_extent(table: &VolumeDescriptorTable) -> Result<(u32, u32)> {
    let (_, hdr) = directory_entry::directory_entry(&table.root_directory_record)
        .map_err(|_| ISOError::WrongPvd("malformed root directory record"))?;
    Ok((hdr.header.extent_location, hdr.header.extent_length))
}

/// Imports a whole image from `source` into a fresh node tree.
pub fn import_image<T: BlockSource + Clone + 'static>(source: T, options: &ReadOptions) -> Result<ImportedImage> {
    let mut probe = source.clone();
    let vds = read_volume_descriptors(&mut probe)?;

    let mut image = Image::default();

    if options.verify_checksums {
        match checksum::verify_sb_tree(&mut probe, 0, options.checksum_strict) {
            Ok(checksum::CheckResult::Checked) => image.features.tree_checksums = true,
            Ok(checksum::CheckResult::NoTagsFound) => {}
            Err(e) if options.checksum_strict => return Err(e),
            Err(e) => image.reporter.report(Severity::Warning, "checksum.failed", e.to_string()),
        }
    }

    let mut arena = NodeArena::new();
    let handle = BlockSourceHandle::new(source);
    let mut visited = HashSet::new();

    let (root_lba, root_len) = root_extent(&vds.primary)?;
    let root = build_directory_tree(
        &mut arena,
        &handle,
        root_lba,
        root_len,
        None,
        vds.primary.encoding(),
        options,
        &mut image,
        &mut visited,
    )?;

    let joliet_root = if let Some(sup) = &vds.supplementary {
        image.features.joliet = true;
        let (lba, len) = root_extent(sup)?;
        let mut joliet_visited = HashSet::new();
        Some(build_directory_tree(
            &mut arena,
            &handle,
            lba,
            len,
            None,
            sup.encoding(),
            options,
            &mut image,
            &mut joliet_visited,
        )?)
    } else {
        None
    };

    let mut boot_catalog = None;
    let mut hidden_boot_images = Vec::new();
    let mut boot_image_status = Vec::new();
    if options.el_torito {
        if let Some((system_id, _ident, data)) = &vds.boot_record {
            if system_id.starts_with(b"EL TORITO SPECIFICATION") {
                image.features.el_torito = true;
                let catalog_lba = u32::from_le_bytes(data[0..4].try_into().unwrap());
                let catalog_bytes = read_capped(&handle, catalog_lba, eltorito::MAX_CATALOG_BYTES)?;
                let catalog = eltorito::read_boot_catalog(&catalog_bytes, options.max_boot_images, &mut image.reporter)?;

                for entry in catalog_image_entries(&catalog) {
                    let image_bytes = read_capped(
                        &handle,
                        entry.load_rba,
                        (entry.sector_count as u64 * 512).max(BLOCK_SIZE),
                    )?;
                    boot_image_status.push(eltorito::analyze_boot_image(&image_bytes, entry.load_rba, &mut image.reporter));

                    if !image.file_lbas.contains(&entry.load_rba) {
                        hidden_boot_images.push(entry.load_rba);
                        image.reporter.report(
                            Severity::Warning,
                            "eltorito.hidden_image",
                            format!("boot image at LBA {} is not reachable from the directory tree", entry.load_rba),
                        );
                        let placeholder_name = format!("boot_image_{}", entry.load_rba);
                        let placeholder = arena.insert(Node::BootPlaceholder(crate::node::BootPlaceholderNode {
                            attrs: fresh_attrs(&placeholder_name, PosixFileMode::TYPE_REGULAR, &mut image),
                            parent: None,
                            load_rba: entry.load_rba,
                            size: BLOCK_SIZE,
                        }));
                        rename_and_attach(&mut arena, root, &placeholder_name, placeholder)?;
                    }
                }
                boot_catalog = Some(catalog);
            }
        }
    }

    Ok(ImportedImage {
        arena,
        root,
        joliet_root,
        boot_catalog,
        hidden_boot_images,
        boot_image_status,
        image,
    })
}

fn catalog_image_entries(catalog: &BootCatalog) -> Vec<&eltorito::BootImageEntry> {
    let mut out = Vec::new();
    out.extend(catalog.default_entry.iter());
    for section in &catalog.sections {
        out.extend(section.entries.iter());
    }
    out
}

fn read_capped<T: BlockSource>(handle: &BlockSourceHandle<T>, start_lba: u32, max_bytes: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let blocks = max_bytes / BLOCK_SIZE;
    for i in 0..blocks as u32 {
        match handle.read_full_block(start_lba + i) {
            Ok(block) => out.extend_from_slice(&block),
            Err(_) => break,
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn build_directory_tree<T: BlockSource + Clone + 'static>(
    arena: &mut NodeArena,
    handle: &BlockSourceHandle<T>,
    lba: u32,
    len: u32,
    parent: Option<NodeIndex>,
    encoding: CharacterEncoding,
    options: &ReadOptions,
    image: &mut Image,
    visited: &mut HashSet<u32>,
) -> Result<NodeIndex> {
    if !visited.insert(lba) {
        return Err(ISOError::WrongEcma119("directory extent cycle detected"));
    }

    let dir_index = arena.insert(Node::Dir(DirNode::new(
        fresh_attrs("", PosixFileMode::TYPE_DIRECTORY, image),
        parent,
    )));

    let blocks = len.div_ceil(BLOCK_SIZE as u32);
    let mut pending_multiextent: Option<(String, RockRidgeInfo, Vec<(u32, u32)>)> = None;

    for block_index in 0..blocks {
        let block = handle.read_full_block(lba + block_index)?;
        let mut cursor: &[u8] = &block;

        while !cursor.is_empty() {
            let (rest, entry) = directory_entry::directory_entry(cursor)?;
            if entry.record_length == 0 {
                break;
            }
            cursor = rest;

            if directory_entry::is_self(&entry.identifier) || directory_entry::is_parent(&entry.identifier) {
                continue;
            }

            let all_entries = rockridge::collect_all_entries(entry.system_use.clone(), |ce_block, ce_offset, ce_length| {
                let block = handle.read_full_block(ce_block)?;
                let start = ce_offset as usize;
                let end = (start + ce_length as usize).min(block.len());
                Ok(block[start.min(block.len())..end].to_vec())
            })?;

            for e in &all_entries {
                if let SystemUseEntry::RockRidge(_) = e {
                    image.features.mark(SuspExtension::RockRidge);
                }
                if let SystemUseEntry::Aaip(_) = e {
                    image.features.mark(SuspExtension::Aaip);
                }
                if let SystemUseEntry::Zisofs(_) = e {
                    image.features.mark(SuspExtension::Zisofs);
                }
            }

            let rr = if options.rock_ridge {
                rockridge::decode(&all_entries, &mut image.reporter)
            } else {
                RockRidgeInfo::default()
            };

            if rr.relocated && options.fold_relocated_directories {
                // This record lives under the synthetic "moved" directory;
                // its logical parent reaches it via CL instead.
                continue;
            }

            let raw_name = encoding.decode(&strip_version(&entry.identifier)).unwrap_or_else(|_| {
                String::from_utf8_lossy(&entry.identifier).into_owned()
            });
            let name = rr.name.clone().unwrap_or(raw_name);

            if entry.header.file_flags.contains(FileFlags::DIRECTORY)
                && entry.header.file_flags.contains(FileFlags::MULTIEXTENT)
            {
                return Err(ISOError::WrongEcma119("directory record flagged MULTIEXTENT"));
            }

            if entry.header.file_flags.contains(FileFlags::MULTIEXTENT) {
                let continues_pending = pending_multiextent
                    .as_ref()
                    .map(|(pending_name, _, _)| *pending_name == name)
                    .unwrap_or(false);
                if !continues_pending {
                    pending_multiextent = Some((name.clone(), rr.clone(), Vec::new()));
                }
                if let Some((_, _, sections)) = pending_multiextent.as_mut() {
                    sections.push((entry.header.extent_location, entry.header.extent_length));
                }
                continue;
            }

            let sections = match pending_multiextent.take() {
                Some((pending_name, _, mut sections)) if pending_name == name => {
                    sections.push((entry.header.extent_location, entry.header.extent_length));
                    sections
                }
                Some(other) => {
                    pending_multiextent = Some(other);
                    vec![(entry.header.extent_location, entry.header.extent_length)]
                }
                None => vec![(entry.header.extent_location, entry.header.extent_length)],
            };

            if let Some(cl) = rr.child_link {
                let relocated_len = directory_extent_len(handle, cl)?;
                let child = build_directory_tree(
                    arena, handle, cl, relocated_len, Some(dir_index), encoding, options, image, visited,
                )?;
                arena.get_mut(child).attrs_mut().name.clear();
                rename_and_attach(arena, dir_index, &name, child)?;
                continue;
            }

            if entry.header.file_flags.contains(FileFlags::DIRECTORY) {
                let child = build_directory_tree(
                    arena,
                    handle,
                    entry.header.extent_location,
                    entry.header.extent_length,
                    Some(dir_index),
                    encoding,
                    options,
                    image,
                    visited,
                )?;
                rename_and_attach(arena, dir_index, &name, child)?;
                continue;
            }

            let attrs_list = if options.aaip {
                decode_aaip(&all_entries, image)?
            } else {
                None
            };

            let total_len: u64 = sections.iter().map(|&(_, extent_len)| extent_len as u64).sum();
            let child = build_leaf_node(arena, handle, &rr, sections, total_len, image, attrs_list)?;
            rename_and_attach(arena, dir_index, &name, child)?;
        }
    }

    Ok(dir_index)
}

/// Peeks the `.` self-entry of the directory at `lba` to recover its real
/// extent length, since a Rock Ridge `CL` entry only carries the target
/// LBA, not its size.
fn directory_extent_len<T: BlockSource>(handle: &BlockSourceHandle<T>, lba: u32) -> Result<u32> {
    let block = handle.read_full_block(lba)?;
    match directory_entry::directory_entry(&block) {
        Ok((_, entry)) if directory_entry::is_self(&entry.identifier) => Ok(entry.header.extent_length),
        _ => Ok(BLOCK_SIZE as u32),
    }
}

fn rename_and_attach(arena: &mut NodeArena, parent: NodeIndex, name: &str, child: NodeIndex) -> Result<()> {
    match arena.add_child(parent, name, child) {
        Ok(()) => Ok(()),
        Err(ISOError::NodeNameNotUnique(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

fn strip_version(identifier: &[u8]) -> Vec<u8> {
    let without_version = match identifier.iter().position(|&b| b == b';') {
        Some(pos) => &identifier[..pos],
        None => identifier,
    };
    match without_version.split_last() {
        Some((b'.', rest)) if !rest.is_empty() => rest.to_vec(),
        _ => without_version.to_vec(),
    }
}

fn fresh_attrs(name: &str, mode: PosixFileMode, image: &mut Image) -> crate::node::NodeAttrs {
    crate::node::NodeAttrs {
        name: name.to_owned(),
        mode,
        uid: 0,
        gid: 0,
        links: 1,
        ino: image.inode_alloc.allocate() as u64,
        atime: None,
        mtime: None,
        ctime: None,
        hidden: false,
        xinfo: crate::xinfo::XinfoList::new(),
    }
}

fn decode_aaip(entries: &[SystemUseEntry], image: &mut Image) -> Result<Option<AttributeList>> {
    let stream = aaip::reassemble_chain(entries);
    if stream.is_empty() {
        return Ok(None);
    }
    match aaip::decode_list(&stream, crate::options::DecodeOptions::default()) {
        Ok(list) => Ok(Some(list)),
        Err(e) => {
            image.reporter.report(Severity::Warning, "aaip.decode_failed", e.to_string());
            Ok(None)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_leaf_node<T: BlockSource + Clone + 'static>(
    arena: &mut NodeArena,
    handle: &BlockSourceHandle<T>,
    rr: &RockRidgeInfo,
    sections: Vec<(u32, u32)>,
    total_len: u64,
    image: &mut Image,
    attrs_list: Option<AttributeList>,
) -> Result<NodeIndex> {
    let mode = rr.mode.unwrap_or(PosixFileMode::TYPE_REGULAR);

    let mut attrs = crate::node::NodeAttrs {
        name: String::new(),
        mode,
        uid: rr.uid.unwrap_or(0),
        gid: rr.gid.unwrap_or(0),
        links: rr.links.unwrap_or(1),
        ino: rr
            .explicit_inode
            .map(|i| i as u64)
            .unwrap_or_else(|| image.inode_alloc.allocate() as u64),
        atime: rr.timestamps.get(&rockridge::TimestampKind::Access).copied(),
        mtime: rr.timestamps.get(&rockridge::TimestampKind::Modify).copied(),
        ctime: rr.timestamps.get(&rockridge::TimestampKind::AttributeChange).copied(),
        hidden: false,
        xinfo: crate::xinfo::XinfoList::new(),
    };

    if let Some(inode) = rr.explicit_inode {
        image.inode_alloc.seed_explicit(inode);
    }

    for &(section_lba, _) in &sections {
        image.file_lbas.insert(section_lba);
    }

    if let Some(list) = attrs_list {
        if let Some(acl) = list.access_acl {
            attrs.xinfo.push(crate::xinfo::XinfoValue::AccessAcl(acl));
        }
        if let Some(acl) = list.default_acl {
            attrs.xinfo.push(crate::xinfo::XinfoValue::DefaultAcl(acl));
        }
    }

    let node = if mode.is_symlink() {
        Node::Symlink(SymlinkNode {
            attrs,
            parent: None,
            target: rr.symlink_target.clone().unwrap_or_default(),
        })
    } else if let Some(device) = rr.device {
        let kind = match mode & PosixFileMode::TYPE_MASK {
            m if m == PosixFileMode::TYPE_FIFO => SpecialKind::Fifo,
            m if m == PosixFileMode::TYPE_SOCKET => SpecialKind::Socket,
            m if m == PosixFileMode::TYPE_BLOCKDEV => SpecialKind::BlockDevice,
            _ => SpecialKind::CharDevice,
        };
        Node::Special(SpecialNode { attrs, parent: None, kind, device })
    } else {
        let identity = StreamId {
            fs_id: 1,
            dev_id: 0,
            ino_id: attrs.ino,
        };
        let stream: Box<dyn crate::stream::Stream> = if sections.is_empty() || total_len == 0 {
            Box::new(MemoryStream::new(Vec::new()))
        } else {
            Box::new(FileSourceStream::new(handle.clone(), sections, identity))
        };
        attrs.mode = if attrs.mode.is_dir() { attrs.mode } else { PosixFileMode::TYPE_REGULAR | attrs.mode };
        Node::File(FileNode {
            attrs,
            parent: None,
            size: total_len,
            stream: StreamHandle::new(stream),
            from_boot_catalog: false,
        })
    };

    Ok(arena.insert(node))
}
