// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Character-set handling for directory record identifiers.
//!
//! Plain ECMA-119 names are bytes out of a restricted d/a-character set;
//! Joliet (Supplementary Volume Descriptor) names are big-endian UCS-2. We
//! model this as a small trait so the rest of the crate never has to branch
//! on which volume descriptor produced a name.

use encoding_rs::UTF_16BE;

use crate::error::{ISOError, Result};

/// Escape sequences a Supplementary Volume Descriptor's `escape_sequences`
/// field uses to announce which UCS-2 level it follows (ECMA-119 appendix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterEncoding {
    /// Plain d/a-character ECMA-119 identifiers.
    Iso9660,
    Ucs2Level1,
    Ucs2Level2,
    Ucs2Level3,
}

impl CharacterEncoding {
    /// Inspects a volume descriptor's `escape_sequences` field and decides
    /// which encoding it declares. Unrecognized sequences fall back to
    /// plain ECMA-119, matching how a reader must tolerate author tools that
    /// got the UCS-2 level escape wrong.
    pub fn from_escape_sequences(seq: &[u8]) -> CharacterEncoding {
        const LEVEL1: &[u8] = b"%/@";
        const LEVEL2: &[u8] = b"%/C";
        const LEVEL3: &[u8] = b"%/E";
        if seq.starts_with(LEVEL1) {
            CharacterEncoding::Ucs2Level1
        } else if seq.starts_with(LEVEL2) {
            CharacterEncoding::Ucs2Level2
        } else if seq.starts_with(LEVEL3) {
            CharacterEncoding::Ucs2Level3
        } else {
            CharacterEncoding::Iso9660
        }
    }

    pub fn is_joliet(self) -> bool {
        !matches!(self, CharacterEncoding::Iso9660)
    }
}

/// Converts an on-disc directory-record identifier to a [`String`],
/// according to the encoding declared by the owning volume descriptor.
pub trait CharsetConverter {
    fn decode(&self, bytes: &[u8]) -> Result<String>;
}

impl CharsetConverter for CharacterEncoding {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            CharacterEncoding::Iso9660 => {
                std::str::from_utf8(bytes).map(str::to_owned).map_err(ISOError::from)
            }
            CharacterEncoding::Ucs2Level1 | CharacterEncoding::Ucs2Level2 | CharacterEncoding::Ucs2Level3 => {
                let (cow, _, had_errors) = UTF_16BE.decode(bytes);
                if had_errors {
                    return Err(ISOError::Utf16);
                }
                Ok(cow.into_owned())
            }
        }
    }
}
