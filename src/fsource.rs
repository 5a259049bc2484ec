// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! A uniform file-source abstraction over both an imported ISO node tree
//! and the local host filesystem, so higher-level code (an export routine,
//! a FUSE adapter) never has to know which one it's talking to.

use std::{
    io::{Read, Seek, SeekFrom},
    path::PathBuf,
};

use crate::{
    aaip::AclEntry,
    error::{ISOError, Result},
    node::{Node, NodeArena, NodeIndex},
    parse::susp::PosixFileMode,
    stream::StreamId,
};

#[derive(Debug, Clone)]
pub struct FileStat {
    pub mode: PosixFileMode,
    pub uid: u32,
    pub gid: u32,
    pub links: u32,
    pub size: u64,
    pub ino: u64,
    pub identity: StreamId,
    pub atime: Option<time::OffsetDateTime>,
    pub mtime: Option<time::OffsetDateTime>,
    pub ctime: Option<time::OffsetDateTime>,
}

/// The operations any backing store for node content must provide: open
/// and read a stream, stat a node, list or resolve within a directory,
/// read a symlink target. Grounded on `libisofs/fsource.h`'s
/// `IsoFileSource`/`IsoFilesystem` vtables.
pub trait FileSourceIface {
    fn open(&mut self, path: &str) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
    fn stat(&self, path: &str) -> Result<FileStat>;
    fn readdir(&self, path: &str) -> Result<Vec<String>>;
    fn readlink(&self, path: &str) -> Result<PathBuf>;
    fn get_acl(&self, path: &str) -> Result<Option<Vec<AclEntry>>>;
    /// Canonicalized path within this source, the counterpart of
    /// `IsoFileSource::get_path`.
    fn get_path(&self, path: &str) -> Result<String>;
    /// The on-disc name of the final path component, which can differ from
    /// what was asked for (case folding, Rock Ridge renaming).
    fn get_name(&self, path: &str) -> Result<String>;
    /// Whether `path` can be reached at all; `Ok(())` mirrors POSIX
    /// `access(2)` succeeding, any `Err` means it can't.
    fn access(&self, path: &str) -> Result<()>;
    /// A short tag identifying which backing store this is, so a caller
    /// can tell two `FileSourceIface` handles apart without downcasting.
    fn get_filesystem(&self) -> &str;
    /// The raw AAIP attribute-list bytes for `path`, or an empty stream if
    /// it carries none.
    fn get_aa_string(&self, path: &str) -> Result<Vec<u8>>;
    /// An independent handle to the same backing store, with no open
    /// stream of its own.
    fn clone_src(&self) -> Box<dyn FileSourceIface + '_>;
}

/// Adapts an in-memory [`NodeArena`] tree to [`FileSourceIface`].
pub struct IsoFileSource<'a> {
    arena: &'a NodeArena,
    root: NodeIndex,
    open_handle: Option<(NodeIndex, u64)>,
}

impl<'a> IsoFileSource<'a> {
    pub fn new(arena: &'a NodeArena, root: NodeIndex) -> Self {
        IsoFileSource { arena, root, open_handle: None }
    }

    fn resolve(&self, path: &str) -> Result<NodeIndex> {
        self.arena.find_recursive(self.root, path.trim_start_matches('/'))
    }

    fn stat_node(&self, index: NodeIndex) -> FileStat {
        let node = self.arena.get(index);
        let attrs = node.attrs();
        let (size, identity) = match node {
            Node::File(f) => (f.size, f.stream.identity()),
            Node::BootPlaceholder(p) => (p.size, StreamId::NONE),
            _ => (0, StreamId::NONE),
        };
        FileStat {
            mode: attrs.mode,
            uid: attrs.uid,
            gid: attrs.gid,
            links: attrs.links,
            size,
            ino: attrs.ino,
            identity,
            atime: attrs.atime,
            mtime: attrs.mtime,
            ctime: attrs.ctime,
        }
    }
}

impl<'a> FileSourceIface for IsoFileSource<'a> {
    fn open(&mut self, path: &str) -> Result<()> {
        if self.open_handle.is_some() {
            return Err(ISOError::FileAlreadyOpened);
        }
        let index = self.resolve(path)?;
        match self.arena.get(index) {
            Node::File(_) => {}
            Node::Dir(_) => return Err(ISOError::FileIsDir),
            _ => return Err(ISOError::FileBadPath("not a regular file")),
        }
        self.open_handle = Some((index, 0));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open_handle.take().ok_or(ISOError::FileNotOpened)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (index, position) = self.open_handle.ok_or(ISOError::FileNotOpened)?;
        let Node::File(file) = self.arena.get(index) else {
            return Err(ISOError::FileIsDir);
        };
        let n = file.stream.read_at(buf, position).map_err(|_| ISOError::FileReadError)?;
        self.open_handle = Some((index, position + n as u64));
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (index, position) = self.open_handle.ok_or(ISOError::FileNotOpened)?;
        let Node::File(file) = self.arena.get(index) else {
            return Err(ISOError::FileIsDir);
        };
        let new_position = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(p) => position as i64 + p,
            SeekFrom::End(p) => file.size as i64 + p,
        };
        if new_position < 0 {
            return Err(ISOError::FileOffsetTooBig);
        }
        self.open_handle = Some((index, new_position as u64));
        Ok(new_position as u64)
    }

    fn stat(&self, path: &str) -> Result<FileStat> {
        let index = self.resolve(path)?;
        if matches!(self.arena.get(index), Node::Symlink(_)) {
            return Err(ISOError::FileBadPath("path resolves to a symlink; use readlink instead"));
        }
        Ok(self.stat_node(index))
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let index = self.resolve(path)?;
        self.arena
            .children(index)?
            .iter()
            .map(|&c| Ok(self.arena.get(c).attrs().name.clone()))
            .collect()
    }

    fn readlink(&self, path: &str) -> Result<PathBuf> {
        let index = self.resolve(path)?;
        Ok(self.arena.get(index).as_symlink()?.target.clone())
    }

    fn get_acl(&self, path: &str) -> Result<Option<Vec<AclEntry>>> {
        let index = self.resolve(path)?;
        Ok(self.arena.get(index).attrs().xinfo.access_acl().map(<[_]>::to_vec))
    }

    fn get_path(&self, path: &str) -> Result<String> {
        self.resolve(path)?;
        Ok(path.to_owned())
    }

    fn get_name(&self, path: &str) -> Result<String> {
        let index = self.resolve(path)?;
        Ok(self.arena.get(index).attrs().name.clone())
    }

    fn access(&self, path: &str) -> Result<()> {
        self.resolve(path)?;
        Ok(())
    }

    fn get_filesystem(&self) -> &str {
        "iso"
    }

    fn get_aa_string(&self, path: &str) -> Result<Vec<u8>> {
        let index = self.resolve(path)?;
        let xinfo = &self.arena.get(index).attrs().xinfo;
        let list = crate::aaip::AttributeList {
            attrs: Default::default(),
            access_acl: xinfo.access_acl().map(<[_]>::to_vec),
            default_acl: xinfo.default_acl().map(<[_]>::to_vec),
        };
        if list.access_acl.is_none() && list.default_acl.is_none() {
            return Ok(Vec::new());
        }
        crate::aaip::encode_list(&list)
    }

    fn clone_src(&self) -> Box<dyn FileSourceIface + '_> {
        Box::new(IsoFileSource { arena: self.arena, root: self.root, open_handle: None })
    }
}

/// Adapts the local host filesystem to [`FileSourceIface`], so a tool that
/// builds an image can treat whatever it's importing *from* as just
/// another file source.
pub struct LocalFileSource {
    base: PathBuf,
    open_file: Option<std::fs::File>,
}

impl LocalFileSource {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        LocalFileSource { base: base.into(), open_file: None }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }
}

impl FileSourceIface for LocalFileSource {
    fn open(&mut self, path: &str) -> Result<()> {
        if self.open_file.is_some() {
            return Err(ISOError::FileAlreadyOpened);
        }
        self.open_file = Some(std::fs::File::open(self.full_path(path))?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open_file.take().ok_or(ISOError::FileNotOpened)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.open_file.as_mut().ok_or(ISOError::FileNotOpened)?;
        Ok(file.read(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let file = self.open_file.as_mut().ok_or(ISOError::FileNotOpened)?;
        Ok(file.seek(pos)?)
    }

    fn stat(&self, path: &str) -> Result<FileStat> {
        let meta = std::fs::symlink_metadata(self.full_path(path))?;
        if meta.file_type().is_symlink() {
            return Err(ISOError::FileBadPath("path resolves to a symlink; use readlink instead"));
        }
        Ok(FileStat {
            mode: PosixFileMode::from_bits_truncate(mode_of(&meta)),
            uid: uid_of(&meta),
            gid: gid_of(&meta),
            links: 1,
            size: meta.len(),
            ino: ino_of(&meta),
            identity: StreamId::NONE,
            atime: None,
            mtime: None,
            ctime: None,
        })
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.full_path(path))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn readlink(&self, path: &str) -> Result<PathBuf> {
        Ok(std::fs::read_link(self.full_path(path))?)
    }

    fn get_acl(&self, _path: &str) -> Result<Option<Vec<AclEntry>>> {
        Err(ISOError::AaipNoGetLocal)
    }

    fn get_path(&self, path: &str) -> Result<String> {
        Ok(path.to_owned())
    }

    fn get_name(&self, path: &str) -> Result<String> {
        Ok(self
            .full_path(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    fn access(&self, path: &str) -> Result<()> {
        std::fs::symlink_metadata(self.full_path(path))?;
        Ok(())
    }

    fn get_filesystem(&self) -> &str {
        "local"
    }

    fn get_aa_string(&self, _path: &str) -> Result<Vec<u8>> {
        Err(ISOError::AaipNoGetLocal)
    }

    fn clone_src(&self) -> Box<dyn FileSourceIface + '_> {
        Box::new(LocalFileSource { base: self.base.clone(), open_file: None })
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn uid_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.uid()
}

#[cfg(not(unix))]
fn uid_of(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn gid_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.gid()
}

#[cfg(not(unix))]
fn gid_of(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn ino_of(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn ino_of(_meta: &std::fs::Metadata) -> u64 {
    0
}

/// Joins a `FileSourceIface` path, tolerating a missing leading slash on
/// either side.
pub fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() || base == "/" {
        format!("/{name}")
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_handles_root() {
        assert_eq!(join_path("/", "foo"), "/foo");
        assert_eq!(join_path("/dir", "foo"), "/dir/foo");
    }
}
