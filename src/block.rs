// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Logical-block access to the underlying image.

use std::{
    cell::RefCell,
    io::{self, Read, Seek, SeekFrom},
    rc::Rc,
};

use crate::error::{ISOError, Result};

/// The fixed logical block size ECMA-119 mandates for all sector-addressed
/// structures (directory records, volume descriptors, path tables).
pub const BLOCK_SIZE: u64 = 2048;

/// Reads a single logical block, identified by LBA, from a backing image.
///
/// Implemented for anything that is [`Read`] + [`Seek`], so a plain `File`,
/// an in-memory `Cursor<Vec<u8>>` (used by the test builders) or a
/// network-backed reader all work without their own impl.
pub trait BlockSource {
    /// Reads exactly one block's worth of bytes starting at `lba`.
    /// Returns the number of bytes actually read (equal to `buf.len()` on
    /// success, or the remainder of the stream near EOF).
    fn read_block_at(&mut self, buf: &mut [u8], lba: u32) -> io::Result<usize>;

    /// Convenience: reads exactly `BLOCK_SIZE` bytes at `lba`, erroring if
    /// short.
    fn read_full_block(&mut self, lba: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BLOCK_SIZE as usize];
        let n = self.read_block_at(&mut buf, lba)?;
        if (n as u64) < BLOCK_SIZE {
            return Err(ISOError::ReadSize(n));
        }
        Ok(buf)
    }
}

impl<T: Read + Seek> BlockSource for T {
    fn read_block_at(&mut self, buf: &mut [u8], lba: u32) -> io::Result<usize> {
        self.seek(SeekFrom::Start(lba as u64 * BLOCK_SIZE))?;
        self.read(buf)
    }
}

/// A cheaply-cloneable handle to a shared, interior-mutable block source.
///
/// The arena-based node tree needs many nodes to share one backing reader
/// without a lifetime threading through every type; `Rc<RefCell<T>>` is the
/// same trade the single-threaded design already makes elsewhere (the node
/// arena itself is not `Send`).
pub struct BlockSourceHandle<T>(Rc<RefCell<T>>);

impl<T> BlockSourceHandle<T> {
    pub fn new(inner: T) -> Self {
        BlockSourceHandle(Rc::new(RefCell::new(inner)))
    }
}

impl<T> Clone for BlockSourceHandle<T> {
    fn clone(&self) -> Self {
        BlockSourceHandle(Rc::clone(&self.0))
    }
}

impl<T: BlockSource> BlockSourceHandle<T> {
    pub fn read_full_block(&self, lba: u32) -> Result<Vec<u8>> {
        self.0.borrow_mut().read_full_block(lba)
    }

    pub fn read_block_at(&self, buf: &mut [u8], lba: u32) -> io::Result<usize> {
        self.0.borrow_mut().read_block_at(buf, lba)
    }
}

/// So a [`BlockSourceHandle`] can itself stand in for `T` — a
/// [`crate::stream::FileSourceStream`] holds one directly, letting several
/// file streams share the same underlying reader through one `Rc`.
impl<T: BlockSource> BlockSource for BlockSourceHandle<T> {
    fn read_block_at(&mut self, buf: &mut [u8], lba: u32) -> io::Result<usize> {
        BlockSourceHandle::read_block_at(self, buf, lba)
    }
}
