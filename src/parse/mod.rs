// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Low-level, allocation-light parsers for the on-disc structures. Callers
//! outside this crate should prefer [`crate::import`] and [`crate::node`];
//! everything here operates on raw block bytes via `nom`.

pub mod both_endian;
pub mod date_time;
pub mod directory_entry;
pub mod susp;
pub mod volume_descriptor;
