// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Named configuration structs, in place of bitfield flag integers.

/// Controls how an image is imported into a [`crate::node::NodeArena`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Decode Rock Ridge (`PX`/`TF`/`NM`/`SL`/...) entries when present.
    pub rock_ridge: bool,

    /// Decode AAIP (`AA`/`AL`) extended attributes and ACLs.
    pub aaip: bool,

    /// Parse the El Torito boot catalog, if a Boot Record volume descriptor
    /// is present.
    pub el_torito: bool,

    /// Prefer the Joliet (Supplementary) tree over the Rock Ridge/plain
    /// Primary tree when both are present. Default mirrors the common
    /// preference order: Rock Ridge, then Joliet, then plain ECMA-119.
    pub prefer_joliet: bool,

    /// Verify `isofs.ca`/`isofs.cx` MD5 tags against actual block content.
    /// When false, tags are still parsed (to locate the tree-checksum
    /// range) but digests are not recomputed.
    pub verify_checksums: bool,

    /// Treat a checksum mismatch as a hard error instead of a warning.
    pub checksum_strict: bool,

    /// Upper bound on the number of boot images read from one catalog;
    /// exceeding it truncates the catalog with a warning rather than
    /// failing the import.
    pub max_boot_images: usize,

    /// Relocated directories (Rock Ridge `CL`/`RE` rewriting) are folded
    /// back into their logical location in the tree rather than left under
    /// the synthetic `/rr_moved`-style directory the on-disc layout uses.
    pub fold_relocated_directories: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            rock_ridge: true,
            aaip: true,
            el_torito: true,
            prefer_joliet: false,
            verify_checksums: true,
            checksum_strict: false,
            max_boot_images: 32,
            fold_relocated_directories: true,
        }
    }
}

/// Controls how an AAIP attribute list is decoded into ACL and xattr data.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Resolve numeric uid/gid qualifiers to names where the host platform
    /// allows it (no-op on this crate's pure-Rust decode path, kept for
    /// symmetry with the encode side).
    pub numeric_qualifiers: bool,

    /// Include a default (directory-inherited) ACL alongside the access
    /// ACL, when both are present in the AAIP stream.
    pub include_default_acl: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            numeric_qualifiers: false,
            include_default_acl: true,
        }
    }
}
