// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! AAIP (Arbitrary Attribute Interchange Protocol) decoding: turning the
//! `AA`/`AL` SUSP field chain attached to a node into extended attributes
//! and, when present, a POSIX ACL.
//!
//! Decoding happens in three tiers, mirroring how a caller might want
//! different amounts of detail:
//!   - [`decode_component`] pulls one length-prefixed name/value chunk out
//!     of a raw byte stream;
//!   - [`decode_pair`] groups components into a single attribute, resolving
//!     the special empty-name marker used for ACLs;
//!   - [`decode_list`] drives the above across a whole reassembled stream
//!     and hands back a structured [`AttributeList`].

use std::collections::BTreeMap;

use crate::{
    error::{ISOError, Result},
    options::DecodeOptions,
    parse::susp::SystemUseEntry,
};

/// Marks which ACL an empty-named AAIP value carries, prepended as the
/// first byte of its value payload.
const SWITCH_MARK_ACCESS: u8 = 0;
const SWITCH_MARK_DEFAULT: u8 = 1;

/// Per-field continuation bit: when set, the next `AA` field's payload is a
/// direct continuation of this one (mirrors the `CE` chaining idea, scaled
/// down to fit inside one field instead of spanning blocks).
const FLAG_CONTINUE: u8 = 1 << 0;

/// Reassembles the ordered `AA`/`AL` field payloads attached to one node
/// into a single logical byte stream, stripping the per-field continuation
/// flag byte.
pub fn reassemble_chain(entries: &[SystemUseEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        if let SystemUseEntry::Aaip(field) = entry {
            if let Some((&flags, payload)) = field.data.split_first() {
                out.extend_from_slice(payload);
                if flags & FLAG_CONTINUE == 0 {
                    // A field without the continuation bit ends a group;
                    // further AA fields (if any) start a new component.
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclTag {
    UserObj,
    User(u32),
    GroupObj,
    Group(u32),
    Mask,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub tag: AclTag,
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeList {
    pub attrs: BTreeMap<String, Vec<u8>>,
    pub access_acl: Option<Vec<AclEntry>>,
    pub default_acl: Option<Vec<AclEntry>>,
}

/// Reads one length-prefixed component: a single `u16`-LE length byte pair
/// followed by that many bytes. Used for both the name and value halves of
/// a pair.
pub fn decode_component(input: &[u8]) -> Result<(&[u8], &[u8])> {
    if input.len() < 2 {
        return Err(ISOError::AaipBadAaString);
    }
    let (len_bytes, rest) = input.split_at(2);
    let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    if rest.len() < len {
        return Err(ISOError::AaipBadAaString);
    }
    Ok((&rest[..len], &rest[len..]))
}

/// Encodes one length-prefixed component: a `u16`-LE length followed by the
/// bytes themselves. The inverse of [`decode_component`].
pub fn encode_component(bytes: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let len: u16 = bytes.len().try_into().map_err(|_| ISOError::AaipBadAaString)?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

/// Encodes a single name/value attribute pair, the inverse of the
/// `DecodedPair::Attribute` arm of [`decode_pair`].
pub fn encode_attribute(name: &str, value: &[u8], out: &mut Vec<u8>) -> Result<()> {
    encode_component(name.as_bytes(), out)?;
    encode_component(value, out)
}

/// Encodes an ACL as an AAIP pair: an empty name, then a value whose first
/// byte is the access/default switch mark followed by the ACL's POSIX long
/// text form. The inverse of the `DecodedPair::Acl` arm of [`decode_pair`].
pub fn encode_acl(is_default: bool, acl: &[AclEntry], out: &mut Vec<u8>) -> Result<()> {
    encode_component(&[], out)?;
    let mut value = vec![if is_default { SWITCH_MARK_DEFAULT } else { SWITCH_MARK_ACCESS }];
    value.extend_from_slice(format_acl_text(acl).as_bytes());
    encode_component(&value, out)
}

/// Renders an ACL back to its POSIX long text form (`user::rwx,group::r-x,
/// other::r--`), the inverse of [`parse_acl_text`].
pub fn format_acl_text(acl: &[AclEntry]) -> String {
    acl.iter()
        .map(|e| {
            let (kind, qualifier) = match e.tag {
                AclTag::UserObj => ("user".to_string(), String::new()),
                AclTag::User(uid) => ("user".to_string(), uid.to_string()),
                AclTag::GroupObj => ("group".to_string(), String::new()),
                AclTag::Group(gid) => ("group".to_string(), gid.to_string()),
                AclTag::Mask => ("mask".to_string(), String::new()),
                AclTag::Other => ("other".to_string(), String::new()),
            };
            let perm = [
                if e.read { b'r' } else { b'-' },
                if e.write { b'w' } else { b'-' },
                if e.execute { b'x' } else { b'-' },
            ];
            format!("{kind}:{qualifier}:{}", std::str::from_utf8(&perm).unwrap())
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Encodes a whole [`AttributeList`] back into a reassembled AAIP byte
/// stream, the inverse of [`decode_list`]. Extended attributes are emitted
/// in `BTreeMap` (sorted-name) order, followed by the access ACL, then the
/// default ACL, matching libisofs's `aaip_encode_both_acl` ordering of
/// plain attributes before ACL entries.
pub fn encode_list(list: &AttributeList) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (name, value) in &list.attrs {
        encode_attribute(name, value, &mut out)?;
    }
    if let Some(acl) = &list.access_acl {
        encode_acl(false, acl, &mut out)?;
    }
    if let Some(acl) = &list.default_acl {
        encode_acl(true, acl, &mut out)?;
    }
    Ok(out)
}

/// One decoded name/value pair, or an ACL payload flagged by an empty name.
pub enum DecodedPair<'a> {
    Attribute { name: &'a [u8], value: &'a [u8] },
    Acl { is_default: bool, value: &'a [u8] },
}

/// Decodes a single name/value pair starting at `input`, returning it and
/// the unparsed remainder.
pub fn decode_pair(input: &[u8]) -> Result<(DecodedPair<'_>, &[u8])> {
    let (name, rest) = decode_component(input)?;
    let (value, rest) = decode_component(rest)?;
    if name.is_empty() {
        let (&switch_mark, acl_value) = value.split_first().ok_or(ISOError::AaipBadAcl)?;
        let is_default = match switch_mark {
            SWITCH_MARK_ACCESS => false,
            SWITCH_MARK_DEFAULT => true,
            _ => return Err(ISOError::AaipBadAcl),
        };
        Ok((DecodedPair::Acl { is_default, value: acl_value }, rest))
    } else {
        Ok((DecodedPair::Attribute { name, value }, rest))
    }
}

/// Decodes every pair in a reassembled AAIP stream into an
/// [`AttributeList`]. A second empty-name (ACL) entry of the same kind is
/// rejected as a malformed attribute list ("multiple ACL objects").
pub fn decode_list(stream: &[u8], _options: DecodeOptions) -> Result<AttributeList> {
    let mut list = AttributeList::default();
    let mut remaining = stream;
    while !remaining.is_empty() {
        let (pair, rest) = decode_pair(remaining)?;
        match pair {
            DecodedPair::Attribute { name, value } => {
                let name = String::from_utf8(name.to_vec()).map_err(|_| ISOError::AaipBadAttrName)?;
                list.attrs.insert(name, value.to_vec());
            }
            DecodedPair::Acl { is_default, value } => {
                let acl = parse_acl_text(std::str::from_utf8(value).map_err(|_| ISOError::AaipBadAcl)?)?;
                let slot = if is_default { &mut list.default_acl } else { &mut list.access_acl };
                if slot.is_some() {
                    return Err(ISOError::AaipAclMultObj);
                }
                *slot = Some(acl);
            }
        }
        remaining = rest;
    }
    Ok(list)
}

/// Parses the POSIX long text form of an ACL (`user::rwx,group::r-x,...`).
pub fn parse_acl_text(text: &str) -> Result<Vec<AclEntry>> {
    let mut entries = Vec::new();
    for clause in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut fields = clause.splitn(3, ':');
        let kind = fields.next().ok_or(ISOError::AaipBadAclText("missing tag"))?;
        let qualifier = fields.next().ok_or(ISOError::AaipBadAclText("missing qualifier"))?;
        let perm = fields.next().ok_or(ISOError::AaipBadAclText("missing perm"))?;

        let tag = match kind {
            "u" | "user" if qualifier.is_empty() => AclTag::UserObj,
            "u" | "user" => AclTag::User(qualifier.parse().map_err(|_| ISOError::AaipBadAclText("bad uid"))?),
            "g" | "group" if qualifier.is_empty() => AclTag::GroupObj,
            "g" | "group" => AclTag::Group(qualifier.parse().map_err(|_| ISOError::AaipBadAclText("bad gid"))?),
            "m" | "mask" => AclTag::Mask,
            "o" | "other" => AclTag::Other,
            _ => return Err(ISOError::AaipBadAclText("unknown tag")),
        };

        let perm = perm.as_bytes();
        if perm.len() != 3 {
            return Err(ISOError::AaipBadAclText("perm field must be 3 chars"));
        }
        entries.push(AclEntry {
            tag,
            read: perm[0] == b'r',
            write: perm[1] == b'w',
            execute: perm[2] == b'x',
        });
    }
    Ok(entries)
}

bitflags::bitflags! {
    /// Result of comparing an ACL's `user::`/`group::`/`other::` entries
    /// against `st_mode`: which bits the ACL overrides versus which already
    /// match.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AclStMode: u8 {
        const OVERRIDES_OTHER = 1 << 0;
        const OVERRIDES_GROUP = 1 << 1;
        const OVERRIDES_USER  = 1 << 2;
        const MATCHES_OTHER   = 1 << 3;
        const MATCHES_GROUP   = 1 << 4;
        const MATCHES_USER    = 1 << 5;
    }
}

/// Computes the POSIX-mode-equivalent permission bits an access ACL's
/// three required entries (`user::`, `group::`, `other::`) imply, and
/// compares them against `mode`'s low 9 bits.
pub fn analyze_acl_against_mode(acl: &[AclEntry], mode: u32) -> AclStMode {
    let mut result = AclStMode::empty();
    let perm_bits = |e: &AclEntry| -> u32 {
        (e.read as u32) << 2 | (e.write as u32) << 1 | (e.execute as u32)
    };

    for entry in acl {
        let (shift, overrides, matches) = match entry.tag {
            AclTag::UserObj => (6, AclStMode::OVERRIDES_USER, AclStMode::MATCHES_USER),
            AclTag::GroupObj => (3, AclStMode::OVERRIDES_GROUP, AclStMode::MATCHES_GROUP),
            AclTag::Other => (0, AclStMode::OVERRIDES_OTHER, AclStMode::MATCHES_OTHER),
            _ => continue,
        };
        let mode_bits = (mode >> shift) & 0o7;
        if perm_bits(entry) == mode_bits {
            result |= matches;
        } else {
            result |= overrides;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(bytes: &[u8]) -> Vec<u8> {
        let mut out = (bytes.len() as u16).to_le_bytes().to_vec();
        out.extend_from_slice(bytes);
        out
    }

    #[test]
    fn decodes_single_attribute_pair() {
        let mut stream = component(b"user.checksum");
        stream.extend(component(b"deadbeef"));
        let options = DecodeOptions::default();
        let list = decode_list(&stream, options).unwrap();
        assert_eq!(list.attrs.get("user.checksum").unwrap(), b"deadbeef");
    }

    #[test]
    fn decodes_access_acl() {
        let mut stream = component(b"");
        let mut value = vec![SWITCH_MARK_ACCESS];
        value.extend_from_slice(b"user::rwx,group::r-x,other::r--");
        stream.extend(component(&value));
        let list = decode_list(&stream, DecodeOptions::default()).unwrap();
        let acl = list.access_acl.unwrap();
        assert_eq!(acl.len(), 3);
        assert_eq!(acl[0].tag, AclTag::UserObj);
        assert!(acl[0].execute);
    }

    #[test]
    fn duplicate_acl_of_same_kind_is_rejected() {
        let mut stream = component(b"");
        let mut value = vec![SWITCH_MARK_ACCESS];
        value.extend_from_slice(b"user::rwx,group::r-x,other::r--");
        stream.extend(component(&value));
        stream.extend(component(b""));
        let mut value2 = vec![SWITCH_MARK_ACCESS];
        value2.extend_from_slice(b"user::rw-,group::r--,other::---");
        stream.extend(component(&value2));
        assert!(decode_list(&stream, DecodeOptions::default()).is_err());
    }

    #[test]
    fn round_trips_attribute_through_encode_and_decode() {
        let mut list = AttributeList::default();
        list.attrs.insert("user.checksum".to_string(), b"deadbeef".to_vec());
        list.attrs.insert("user.note".to_string(), b"hello".to_vec());
        let stream = encode_list(&list).unwrap();
        let decoded = decode_list(&stream, DecodeOptions::default()).unwrap();
        assert_eq!(decoded.attrs, list.attrs);
    }

    #[test]
    fn round_trips_access_and_default_acl_through_encode_and_decode() {
        let acl = parse_acl_text("user::rwx,group::r-x,other::r--").unwrap();
        let default_acl = parse_acl_text("user::rw-,group::r--,other::---").unwrap();
        let mut list = AttributeList::default();
        list.access_acl = Some(acl.clone());
        list.default_acl = Some(default_acl.clone());
        let stream = encode_list(&list).unwrap();
        let decoded = decode_list(&stream, DecodeOptions::default()).unwrap();
        assert_eq!(decoded.access_acl.unwrap(), acl);
        assert_eq!(decoded.default_acl.unwrap(), default_acl);
    }

    #[test]
    fn analyzes_acl_equivalent_to_mode() {
        let acl = parse_acl_text("user::rwx,group::r-x,other::r--").unwrap();
        let result = analyze_acl_against_mode(&acl, 0o754);
        assert!(result.contains(AclStMode::MATCHES_USER));
        assert!(result.contains(AclStMode::MATCHES_GROUP));
        assert!(result.contains(AclStMode::MATCHES_OTHER));
    }
}
