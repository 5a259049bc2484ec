// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Rock Ridge (RRIP) decoding: folding a directory record's System Use Area,
//! plus any `CE` continuation areas it points into, into a single
//! high-level [`RockRidgeInfo`].

use std::{collections::BTreeMap, path::PathBuf};

use crate::{
    error::Result,
    message::{Severity, WarningReporter},
    parse::susp::{
        PosixFileMode, PosixTimestampFlags, SymlinkComponent, SystemUseEntry,
    },
};

/// Which of the seven Rock Ridge timestamp slots a given value fills. Order
/// matches the bit order of [`PosixTimestampFlags`] so a `TF` entry's
/// values line up positionally with the flags that announce them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimestampKind {
    Creation,
    Modify,
    Access,
    AttributeChange,
    Backup,
    Expiration,
    Effective,
}

const TIMESTAMP_ORDER: [(PosixTimestampFlags, TimestampKind); 7] = [
    (PosixTimestampFlags::CREATION, TimestampKind::Creation),
    (PosixTimestampFlags::MODIFY, TimestampKind::Modify),
    (PosixTimestampFlags::ACCESS, TimestampKind::Access),
    (PosixTimestampFlags::ATTRIBUTES, TimestampKind::AttributeChange),
    (PosixTimestampFlags::BACKUP, TimestampKind::Backup),
    (PosixTimestampFlags::EXPIRATION, TimestampKind::Expiration),
    (PosixTimestampFlags::EFFECTIVE, TimestampKind::Effective),
];

#[derive(Debug, Clone, Default)]
pub struct RockRidgeInfo {
    pub name: Option<String>,
    pub mode: Option<PosixFileMode>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub links: Option<u32>,
    pub explicit_inode: Option<u32>,
    pub timestamps: BTreeMap<TimestampKind, time::OffsetDateTime>,
    pub symlink_target: Option<PathBuf>,
    pub relocated: bool,
    pub child_link: Option<u32>,
    pub parent_link: Option<u32>,
    pub device: Option<(u32, u32)>,
    pub is_rock_ridge: bool,
}

/// Follows a chain of `CE` continuation areas, reading further blocks via
/// `read_ce`, and returns the union of every entry encountered (initial
/// record plus every continuation). `read_ce(block, offset, length)` must
/// return exactly `length` bytes read from `block` at `offset`.
pub fn collect_all_entries(
    initial: Vec<SystemUseEntry>,
    mut read_ce: impl FnMut(u32, u32, u32) -> Result<Vec<u8>>,
) -> Result<Vec<SystemUseEntry>> {
    let mut all = Vec::new();
    let mut pending_ce = None;

    for entry in initial {
        if let SystemUseEntry::ContinuationArea(ce) = &entry {
            pending_ce = Some((ce.block, ce.offset, ce.length));
        } else {
            all.push(entry);
        }
    }

    while let Some((block, offset, length)) = pending_ce.take() {
        let bytes = read_ce(block, offset, length)?;
        let (_, entries) = crate::parse::susp::system_use_entries(&bytes)?;
        for entry in entries {
            if let SystemUseEntry::ContinuationArea(ce) = &entry {
                pending_ce = Some((ce.block, ce.offset, ce.length));
            } else {
                all.push(entry);
            }
        }
    }

    Ok(all)
}

/// Folds a flattened entry list (after [`collect_all_entries`]) into one
/// [`RockRidgeInfo`], de-duplicating repeated `NM`/`TF`/`PX` occurrences and
/// reporting anything malformed through `reporter`.
pub fn decode(entries: &[SystemUseEntry], reporter: &mut WarningReporter) -> RockRidgeInfo {
    let mut info = RockRidgeInfo::default();
    let mut name_parts: Vec<u8> = Vec::new();
    let mut name_continues = false;
    let mut symlink_parts: Vec<SymlinkComponent> = Vec::new();
    let mut symlink_continues = false;
    let mut saw_px = false;
    let mut saw_name = false;

    for entry in entries {
        match entry {
            SystemUseEntry::RockRidge(_) => info.is_rock_ridge = true,
            SystemUseEntry::PosixAttributes(px) => {
                if saw_px {
                    reporter.report(Severity::Warning, "rockridge.duplicate_px", "ignoring repeated PX entry");
                    continue;
                }
                saw_px = true;
                info.is_rock_ridge = true;
                info.mode = Some(px.mode);
                info.uid = Some(px.uid);
                info.gid = Some(px.gid);
                info.links = Some(px.links);
                info.explicit_inode = px.inode;
            }
            SystemUseEntry::AlternateName(nm) => {
                info.is_rock_ridge = true;
                if nm.flags.contains(crate::parse::susp::AlternateNameFlags::CURRENT) {
                    saw_name = true;
                    name_parts.extend_from_slice(b".");
                } else if nm.flags.contains(crate::parse::susp::AlternateNameFlags::PARENT) {
                    saw_name = true;
                    name_parts.extend_from_slice(b"..");
                } else {
                    if saw_name && !name_continues {
                        reporter.report(Severity::Warning, "rockridge.duplicate_nm", "ignoring repeated NM entry");
                        name_parts.clear();
                    }
                    saw_name = true;
                    name_parts.extend_from_slice(&nm.name);
                }
                name_continues = nm.flags.contains(crate::parse::susp::AlternateNameFlags::CONTINUE);
            }
            SystemUseEntry::PosixTimestamp(tf) => {
                info.is_rock_ridge = true;
                let expected = TIMESTAMP_ORDER.iter().filter(|(flag, _)| tf.flags.contains(*flag)).count();
                if tf.times.len() != expected {
                    reporter.report(
                        Severity::Warning,
                        "rockridge.malformed_tf",
                        format!("TF flags claim {expected} timestamp(s) but {} were present", tf.times.len()),
                    );
                }
                let mut kinds = TIMESTAMP_ORDER
                    .iter()
                    .filter(|(flag, _)| tf.flags.contains(*flag))
                    .map(|(_, kind)| *kind);
                for value in &tf.times {
                    if let Some(kind) = kinds.next() {
                        if info.timestamps.insert(kind, *value).is_some() {
                            reporter.report(Severity::Note, "rockridge.duplicate_tf", format!("{kind:?}"));
                        }
                    }
                }
            }
            SystemUseEntry::SymbolicLink(sl) => {
                info.is_rock_ridge = true;
                if sl.components.is_empty() {
                    reporter.report(Severity::Warning, "rockridge.malformed_sl", "SL entry carries no path components");
                }
                if !symlink_continues {
                    symlink_parts.clear();
                }
                symlink_parts.extend(sl.components.iter().cloned());
                symlink_continues = sl.flags.contains(crate::parse::susp::SymbolicLinkRecordFlags::CONTINUE);
                if !symlink_continues {
                    info.symlink_target = Some(build_symlink_path(&symlink_parts));
                }
            }
            SystemUseEntry::ChildLink(cl) => {
                info.is_rock_ridge = true;
                info.child_link = Some(cl.block);
            }
            SystemUseEntry::ParentLink(pl) => {
                info.is_rock_ridge = true;
                info.parent_link = Some(pl.block);
            }
            SystemUseEntry::RelocatedDirectory(_) => {
                info.is_rock_ridge = true;
                info.relocated = true;
            }
            SystemUseEntry::DeviceNumber(dn) => {
                info.is_rock_ridge = true;
                if dn.dev_t_high == 0 && dn.dev_t_low == 0 {
                    reporter.report(Severity::Note, "rockridge.malformed_pn", "PN entry carries an all-zero device number");
                }
                info.device = Some((dn.dev_t_high, dn.dev_t_low));
            }
            SystemUseEntry::Zisofs(zf) => {
                if zf.header_size_div4 == 0 || !(15..=20).contains(&zf.block_size_log2) {
                    reporter.report(
                        Severity::Warning,
                        "rockridge.malformed_zf",
                        format!("implausible ZF header (header_size_div4={}, block_size_log2={})", zf.header_size_div4, zf.block_size_log2),
                    );
                }
            }
            SystemUseEntry::ContinuationArea(_) => {
                reporter.report(
                    Severity::Note,
                    "rockridge.unresolved_ce",
                    "CE entry left over after continuation collection",
                );
            }
            _ => {}
        }
    }

    if !name_parts.is_empty() {
        info.name = String::from_utf8(name_parts)
            .map_err(|_| ())
            .ok()
            .or(info.name);
    }

    if info.is_rock_ridge && !saw_px {
        reporter.report(Severity::Warning, "rockridge.missing_px", "no mandatory PX entry found on a Rock Ridge node");
    }

    info
}

fn build_symlink_path(components: &[SymlinkComponent]) -> PathBuf {
    let mut path = PathBuf::new();
    for component in components {
        match component {
            SymlinkComponent::Root => path = PathBuf::from("/"),
            SymlinkComponent::Current => path.push("."),
            SymlinkComponent::Parent => path.push(".."),
            SymlinkComponent::Name(name) => path.push(name),
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::susp::{AlternateName, AlternateNameFlags};

    #[test]
    fn folds_split_name_across_nm_entries() {
        let mut reporter = WarningReporter::new();
        let entries = vec![
            SystemUseEntry::AlternateName(AlternateName {
                flags: AlternateNameFlags::CONTINUE,
                name: b"long_file_".to_vec(),
            }),
            SystemUseEntry::AlternateName(AlternateName {
                flags: AlternateNameFlags::empty(),
                name: b"name.txt".to_vec(),
            }),
        ];
        let info = decode(&entries, &mut reporter);
        assert_eq!(info.name.as_deref(), Some("long_file_name.txt"));
    }

    #[test]
    fn reports_missing_mandatory_px() {
        let mut reporter = WarningReporter::new();
        let entries = vec![SystemUseEntry::AlternateName(AlternateName {
            flags: AlternateNameFlags::empty(),
            name: b"no_px.txt".to_vec(),
        })];
        let info = decode(&entries, &mut reporter);
        assert!(info.mode.is_none());
        assert_eq!(reporter.seen_count(), 1);
    }

    #[test]
    fn reports_malformed_tf_when_time_count_mismatches_flags() {
        let mut reporter = WarningReporter::new();
        let entries = vec![SystemUseEntry::PosixTimestamp(crate::parse::susp::PosixTimestamp {
            flags: PosixTimestampFlags::CREATION | PosixTimestampFlags::MODIFY,
            times: vec![time::OffsetDateTime::UNIX_EPOCH],
        })];
        decode(&entries, &mut reporter);
        assert_eq!(reporter.seen_count(), 1);
    }

    #[test]
    fn reports_malformed_sl_with_no_components() {
        let mut reporter = WarningReporter::new();
        let entries = vec![SystemUseEntry::SymbolicLink(crate::parse::susp::SymbolicLink {
            flags: crate::parse::susp::SymbolicLinkRecordFlags::empty(),
            components: vec![],
        })];
        decode(&entries, &mut reporter);
        assert_eq!(reporter.seen_count(), 1);
    }

    #[test]
    fn builds_symlink_path_with_special_components() {
        let mut reporter = WarningReporter::new();
        let entries = vec![SystemUseEntry::SymbolicLink(crate::parse::susp::SymbolicLink {
            flags: crate::parse::susp::SymbolicLinkRecordFlags::empty(),
            components: vec![
                SymlinkComponent::Parent,
                SymlinkComponent::Name("usr".into()),
                SymlinkComponent::Name("bin".into()),
            ],
        })];
        let info = decode(&entries, &mut reporter);
        assert_eq!(info.symlink_target, Some(PathBuf::from("../usr/bin")));
    }
}
