// SPDX-License-Identifier: (MIT OR Apache-2.0)

use std::{
    io,
    num::{ParseIntError, TryFromIntError},
    str,
};

use thiserror::Error;

/// The master error type for every operation in this crate.
///
/// Variants are grouped by subsystem: core ECMA-119 violations, SUSP/Rock
/// Ridge, AAIP, El Torito, checksum, node-tree mutation and stream/xinfo
/// cloning.
#[derive(Error, Debug)]
pub enum ISOError {
    /// I/O error while reading the block source.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A required argument was missing or null where one was required.
    #[error("null pointer / missing argument")]
    NullPointer,

    /// Allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// String value expected to be UTF-8 was not.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] str::Utf8Error),

    /// `encoding_rs` could not decode a UCS-2 / Joliet string.
    #[error("UTF-16 / UCS-2 conversion error")]
    Utf16,

    /// A numeric identifier string (file version) did not parse.
    #[error("int parse error: {0}")]
    ParseInt(#[from] ParseIntError),

    /// Integer conversion over/underflow.
    #[error("integer conversion error (over/underflow): {0}")]
    TryFromInt(#[from] TryFromIntError),

    /// Fewer bytes were read than `BLOCK_SIZE` requires.
    #[error("wanted to read '{}' bytes, got '{0}' bytes", crate::BLOCK_SIZE)]
    ReadSize(usize),

    /// An LBA lies beyond the end of the image.
    #[error("LBA {0} is out of range")]
    RangeError(u32),

    /// A `nom` parser failed; the image is most likely corrupt.
    #[cfg(not(feature = "verbose-error"))]
    #[error("parse error: {0:?}")]
    Nom(nom::error::ErrorKind),

    /// Verbose variant of the above, enabled by the `verbose-error` feature.
    #[cfg(feature = "verbose-error")]
    #[error("parse error: {0:?}")]
    VerboseNom(nom::error::VerboseError<Vec<u8>>),

    /// A core ECMA-119 invariant was violated (e.g. a directory split across
    /// multiple sections).
    #[error("ECMA-119 violation: {0}")]
    WrongEcma119(&'static str),

    /// A valid but unsupported ECMA-119 feature was encountered
    /// (interleaving, extended-attribute records).
    #[error("unsupported ECMA-119 feature: {0}")]
    UnsupportedEcma119(&'static str),

    /// The Primary Volume Descriptor failed sanity checks.
    #[error("invalid primary volume descriptor: {0}")]
    WrongPvd(&'static str),

    /// An unknown volume descriptor type was encountered.
    #[error("unsupported volume descriptor type {0}")]
    UnsupportedVd(u8),

    /// The root's `SP` entry was malformed; Rock Ridge decoding is disabled.
    #[error("malformed SP entry, Rock Ridge disabled")]
    UnsupportedSusp,

    /// More than one `ER` entry claims the same extension family.
    #[error("unrecognized ER identifier: {0}")]
    SuspMultipleEr(String),

    /// A Rock Ridge entry was malformed (recoverable, de-duplicated warning).
    #[error("malformed Rock Ridge {0} entry")]
    WrongRr(&'static str),

    /// An unsupported but recognized Rock Ridge feature was found (e.g. a
    /// sparse file marker).
    #[error("unsupported Rock Ridge feature: {0}")]
    UnsupportedRr(&'static str),

    /// A boot catalog entry was malformed beyond repair.
    #[error("malformed El Torito boot catalog: {0}")]
    WrongElTorito(&'static str),

    /// A recognized-but-unsupported El Torito platform/feature.
    #[error("unsupported El Torito feature: {0}")]
    UnsupportedElTorito(&'static str),

    /// Non-fatal catalog oddity (e.g. too many boot images).
    #[error("El Torito warning: {0}")]
    ElToritoWarn(&'static str),

    /// A boot image is not reachable from the directory tree.
    #[error("hidden boot image at LBA {0}")]
    ElToritoHidden(u32),

    /// An AA/AL field chain could not be decoded.
    #[error("malformed AAIP attribute string")]
    AaipBadAaString,

    /// An AAIP value claiming to be an ACL did not decode.
    #[error("malformed AAIP ACL value")]
    AaipBadAcl,

    /// ACL long-text form could not be parsed.
    #[error("malformed ACL text: {0}")]
    AaipBadAclText(&'static str),

    /// Multiple empty-name (ACL) entries found in one attribute list.
    #[error("multiple ACL objects in one AAIP attribute list")]
    AaipAclMultObj,

    /// Attempted to set a non-`user.` namespace attribute without the
    /// required permission bit.
    #[error("attribute name is not in the user namespace")]
    AaipNonUserName,

    /// Attribute name is not of a form the host adapter accepts.
    #[error("invalid attribute name")]
    AaipBadAttrName,

    /// Host adapter cannot read local extended attributes.
    #[error("host filesystem does not support reading xattrs")]
    AaipNoGetLocal,

    /// Host adapter cannot write local extended attributes.
    #[error("host filesystem does not support writing xattrs")]
    AaipNoSetLocal,

    /// AAIP support was not enabled for this operation.
    #[error("AAIP support is not enabled")]
    AaipNotEnabled,

    /// Tree-area MD5 verification failed.
    #[error("superblock/tree checksum mismatch")]
    SbTreeCorrupted,

    /// A single MD5 tag did not match its computed digest.
    #[error("MD5 tag mismatch at block {0}")]
    Md5TagMismatch(u32),

    /// The MD5 tag area itself is malformed.
    #[error("MD5 tag area is corrupted")]
    Md5AreaCorrupted,

    /// Character-set conversion failed; raw bytes were kept.
    #[error("charset conversion error for {0:?}")]
    FilenameWrongCharset(Vec<u8>),

    /// A generic node operation cannot add a child (name collision etc.)
    #[error("cannot add file: {0}")]
    FileCantAdd(&'static str),

    /// Operation requires a non-directory node.
    #[error("is a directory")]
    FileIsDir,

    /// Operation requires a directory node.
    #[error("is not a directory")]
    FileIsNotDir,

    /// Operation requires a symlink node.
    #[error("is not a symlink")]
    FileIsNotSymlink,

    /// The requested path does not exist.
    #[error("no such file or directory")]
    FileDoesntExist,

    /// Permission was denied by the host filesystem adapter.
    #[error("access denied")]
    FileAccessDenied,

    /// A path was malformed, or `stat()` was requested on an ISO symlink
    /// (a known limitation — see `FileSourceIface::stat`).
    #[error("bad path: {0}")]
    FileBadPath(&'static str),

    /// `open` was called twice without an intervening `close`.
    #[error("file source already open")]
    FileAlreadyOpened,

    /// An operation requiring an open handle was called on a closed one.
    #[error("file source not open")]
    FileNotOpened,

    /// A read failed at the block-source level.
    #[error("file read error")]
    FileReadError,

    /// A seek went beyond what a `u64` offset can represent.
    #[error("offset too large")]
    FileOffsetTooBig,

    /// `readlink` truncated the destination because the caller's buffer was
    /// too small.
    #[error("path too long")]
    RrPathTooLong,

    /// A Rock Ridge name exceeds `NODE_NAME_MAX`.
    #[error("name too long")]
    RrNameTooLong,

    /// A name is `.`, `..`, empty, or contains `/`.
    #[error("reserved or invalid name")]
    RrNameReserved,

    /// Two children of the same directory share a name.
    #[error("name '{0}' is not unique in this directory")]
    NodeNameNotUnique(String),

    /// A node is already attached to a directory.
    #[error("node already added to a directory")]
    NodeAlreadyAdded,

    /// A node was asked to detach from a directory it is not a child of.
    #[error("node was not added to this directory")]
    NodeNotAddedToDir,

    /// A stream (or a link in a filter-stream chain) does not support
    /// cloning.
    #[error("stream does not support cloning")]
    StreamNoClone,

    /// An xinfo value's type has no registered/implemented cloner.
    #[error("xinfo value does not support cloning")]
    XinfoNoClone,

    /// A symlink resolves to nothing.
    #[error("dead symlink")]
    DeadSymlink,

    /// A symlink chain exceeded the maximum resolution depth.
    #[error("symlink chain too deep")]
    DeepSymlink,

    /// An internal invariant broke; indicates a bug in this crate.
    #[error("internal assertion failed: {0}")]
    AssertFailure(&'static str),

    /// The read was interrupted.
    #[error("interrupted")]
    Interrupted,

    /// The message sink requested the import be aborted.
    #[error("import canceled")]
    Canceled,
}

#[cfg(not(feature = "verbose-error"))]
impl From<nom::Err<nom::error::Error<&[u8]>>> for ISOError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> ISOError {
        ISOError::Nom(match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.code,
            nom::Err::Incomplete(_) => nom::error::ErrorKind::Complete,
        })
    }
}

#[cfg(feature = "verbose-error")]
impl From<nom::Err<nom::error::VerboseError<&[u8]>>> for ISOError {
    fn from(err: nom::Err<nom::error::VerboseError<&[u8]>>) -> ISOError {
        ISOError::VerboseNom(match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => nom::error::VerboseError {
                errors: e
                    .errors
                    .into_iter()
                    .map(|(i, e)| (i.to_owned(), e))
                    .collect(),
            },
            nom::Err::Incomplete(_) => nom::error::VerboseError { errors: Vec::new() },
        })
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "verbose-error")] {
        pub(crate) type OurNomError<T> = nom::error::VerboseError<T>;
    } else {
        pub(crate) type OurNomError<T> = nom::error::Error<T>;
    }
}

pub(crate) type NomRes<T, U> = nom::IResult<T, U, OurNomError<T>>;

/// [`Result`](std::result::Result) specialized to [`ISOError`].
pub type Result<T> = std::result::Result<T, ISOError>;
