// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Extensible per-node metadata slots.
//!
//! A closed enum plus a `Custom` escape hatch gives extensions a place to
//! attach typed data to any node without unsafe function-pointer plumbing:
//! built-in extensions (ACL, zisofs header, an explicit inode override) are
//! enum variants, and anything else implements [`Xinfo`] and rides in
//! `Custom`.

use std::fmt;

use crate::{aaip::AclEntry, parse::susp::ZisofsHeader};

/// Implemented by user-defined extension payloads stored under
/// [`XinfoValue::Custom`].
pub trait Xinfo: fmt::Debug {
    /// Attempts to clone this value for a node-tree copy. Returns `None`
    /// when the extension has no meaningful clone semantics (the default),
    /// which callers surface as [`crate::error::ISOError::XinfoNoClone`].
    fn try_clone_box(&self) -> Option<Box<dyn Xinfo>> {
        None
    }
}

#[derive(Debug)]
pub enum XinfoValue {
    AccessAcl(Vec<AclEntry>),
    DefaultAcl(Vec<AclEntry>),
    ExplicitInode(u32),
    Zisofs(ZisofsHeader),
    Custom(Box<dyn Xinfo>),
}

impl Clone for XinfoValue {
    fn clone(&self) -> Self {
        match self {
            XinfoValue::AccessAcl(acl) => XinfoValue::AccessAcl(acl.clone()),
            XinfoValue::DefaultAcl(acl) => XinfoValue::DefaultAcl(acl.clone()),
            XinfoValue::ExplicitInode(i) => XinfoValue::ExplicitInode(*i),
            XinfoValue::Zisofs(z) => XinfoValue::Zisofs(z.clone()),
            XinfoValue::Custom(c) => match c.try_clone_box() {
                Some(cloned) => XinfoValue::Custom(cloned),
                None => panic!("attempted to clone a non-cloneable xinfo value"),
            },
        }
    }
}

/// A small ordered bag of [`XinfoValue`]s attached to one node. Lookup is
/// linear, matching the handful-of-entries-per-node reality this models.
#[derive(Debug, Clone, Default)]
pub struct XinfoList(Vec<XinfoValue>);

impl XinfoList {
    pub fn new() -> Self {
        XinfoList(Vec::new())
    }

    pub fn push(&mut self, value: XinfoValue) {
        self.0.push(value);
    }

    pub fn access_acl(&self) -> Option<&[AclEntry]> {
        self.0.iter().find_map(|v| match v {
            XinfoValue::AccessAcl(acl) => Some(acl.as_slice()),
            _ => None,
        })
    }

    pub fn default_acl(&self) -> Option<&[AclEntry]> {
        self.0.iter().find_map(|v| match v {
            XinfoValue::DefaultAcl(acl) => Some(acl.as_slice()),
            _ => None,
        })
    }

    pub fn explicit_inode(&self) -> Option<u32> {
        self.0.iter().find_map(|v| match v {
            XinfoValue::ExplicitInode(i) => Some(*i),
            _ => None,
        })
    }

    pub fn zisofs(&self) -> Option<&ZisofsHeader> {
        self.0.iter().find_map(|v| match v {
            XinfoValue::Zisofs(z) => Some(z),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &XinfoValue> {
        self.0.iter()
    }

    /// Tries to clone every entry; fails the whole operation if any entry
    /// refuses (e.g. a `Custom` value with no clone support), matching the
    /// all-or-nothing semantics a node copy needs.
    pub fn try_clone(&self) -> crate::error::Result<XinfoList> {
        let mut cloned = Vec::with_capacity(self.0.len());
        for value in &self.0 {
            let copy = match value {
                XinfoValue::Custom(c) => XinfoValue::Custom(
                    c.try_clone_box()
                        .ok_or(crate::error::ISOError::XinfoNoClone)?,
                ),
                other => other.clone(),
            };
            cloned.push(copy);
        }
        Ok(XinfoList(cloned))
    }
}
