// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! SUSP (System Use Sharing Protocol) and Rock Ridge system-use entries.
//!
//! Every entry starts with a 2-byte signature, a 1-byte length (including
//! the signature and length bytes themselves) and a 1-byte version. Readers
//! must skip unrecognized signatures rather than fail, since SUSP is
//! explicitly designed to let unrelated extensions share one byte stream.

use bitflags::bitflags;
use nom::{
    branch::alt,
    bytes::complete::{tag, take},
    combinator::{map, rest, verify},
    multi::many0,
    number::complete::{le_u32, u8 as nom_u8},
    sequence::tuple,
};

use crate::{
    error::NomRes,
    parse::both_endian::{both_endian32, both_endian16},
    parse::date_time::dir_datetime,
};

/// Implemented by every SUSP system-use entry so the generic
/// [`system_use_entries`] combinator can dispatch on a 2-byte signature.
pub trait ParseSusp<'a>: Sized {
    const SIGNATURE: &'static [u8; 2];

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self>;

    /// Parses `SIGNATURE`, the length byte, the version byte, and then
    /// hands the remainder (sized to `length - 4`) to `parse_data`.
    fn parse(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, _) = tag(Self::SIGNATURE.as_slice())(input)?;
        let (input, length) = nom_u8(input)?;
        let (input, _version) = nom_u8(input)?;
        let data_len = (length as usize).saturating_sub(4);
        let (input, data) = take(data_len)(input)?;
        let (_, value) = Self::parse_data(data)?;
        Ok((input, value))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlternateNameFlags: u8 {
        const CONTINUE = 1 << 0;
        const CURRENT  = 1 << 1;
        const PARENT   = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PosixTimestampFlags: u8 {
        const CREATION        = 1 << 0;
        const MODIFY          = 1 << 1;
        const ACCESS          = 1 << 2;
        const ATTRIBUTES      = 1 << 3;
        const BACKUP          = 1 << 4;
        const EXPIRATION      = 1 << 5;
        const EFFECTIVE       = 1 << 6;
        const LONG_FORM       = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PosixFileMode: u32 {
        const OTHER_EXEC   = 0o0001;
        const OTHER_WRITE  = 0o0002;
        const OTHER_READ   = 0o0004;
        const GROUP_EXEC   = 0o0010;
        const GROUP_WRITE  = 0o0020;
        const GROUP_READ   = 0o0040;
        const OWNER_EXEC   = 0o0100;
        const OWNER_WRITE  = 0o0200;
        const OWNER_READ   = 0o0400;
        const STICKY       = 0o1000;
        const SETGID       = 0o2000;
        const SETUID       = 0o4000;

        const TYPE_FIFO     = 0o010000;
        const TYPE_CHARDEV  = 0o020000;
        const TYPE_DIRECTORY = 0o040000;
        const TYPE_BLOCKDEV = 0o060000;
        const TYPE_REGULAR  = 0o100000;
        const TYPE_SYMLINK  = 0o120000;
        const TYPE_SOCKET   = 0o140000;
        const TYPE_MASK     = 0o170000;
    }
}

impl PosixFileMode {
    pub fn is_dir(self) -> bool {
        (self & PosixFileMode::TYPE_MASK) == PosixFileMode::TYPE_DIRECTORY
    }

    pub fn is_symlink(self) -> bool {
        (self & PosixFileMode::TYPE_MASK) == PosixFileMode::TYPE_SYMLINK
    }

    pub fn is_regular(self) -> bool {
        (self & PosixFileMode::TYPE_MASK) == PosixFileMode::TYPE_REGULAR
    }
}

impl std::fmt::Display for PosixFileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let triplet = |r, w, x| -> String {
            format!(
                "{}{}{}",
                if self.contains(r) { "r" } else { "-" },
                if self.contains(w) { "w" } else { "-" },
                if self.contains(x) { "x" } else { "-" },
            )
        };
        write!(
            f,
            "{}{}{}{}",
            triplet(PosixFileMode::OWNER_READ, PosixFileMode::OWNER_WRITE, PosixFileMode::OWNER_EXEC),
            triplet(PosixFileMode::GROUP_READ, PosixFileMode::GROUP_WRITE, PosixFileMode::GROUP_EXEC),
            triplet(PosixFileMode::OTHER_READ, PosixFileMode::OTHER_WRITE, PosixFileMode::OTHER_EXEC),
            if self.contains(PosixFileMode::SETUID) { "+s" } else { "" },
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RockRidgeFlags: u8 {
        const PX = 1 << 0;
        const PN = 1 << 1;
        const SL = 1 << 2;
        const NM = 1 << 3;
        const CL = 1 << 4;
        const PL = 1 << 5;
        const RE = 1 << 6;
        const TF = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolicLinkComponentFlags: u8 {
        const CONTINUE = 1 << 0;
        const CURRENT  = 1 << 1;
        const PARENT   = 1 << 2;
        const ROOT     = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolicLinkRecordFlags: u8 {
        const CONTINUE = 1 << 0;
    }
}

/// One component of a Rock Ridge `SL` symlink target: either a literal path
/// segment, or one of the special markers (`.`, `..`, `/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymlinkComponent {
    Current,
    Parent,
    Root,
    Name(String),
}

#[derive(Debug, Clone)]
pub struct ContinuationArea {
    pub block: u32,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone)]
pub struct ExtensionsReference {
    pub id: String,
    pub descriptor: String,
    pub source: String,
    pub version: u8,
}

#[derive(Debug, Clone)]
pub struct SuspIndicator {
    pub len_skp: u8,
}

#[derive(Debug, Clone)]
pub struct AlternateName {
    pub flags: AlternateNameFlags,
    pub name: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PosixAttributes {
    pub mode: PosixFileMode,
    pub links: u32,
    pub uid: u32,
    pub gid: u32,
    pub inode: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PosixTimestamp {
    pub flags: PosixTimestampFlags,
    pub times: Vec<time::OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct RockRidgeIndicator {
    pub flags: RockRidgeFlags,
}

#[derive(Debug, Clone)]
pub struct SymbolicLink {
    pub flags: SymbolicLinkRecordFlags,
    pub components: Vec<SymlinkComponent>,
}

#[derive(Debug, Clone)]
pub struct ChildLink {
    pub block: u32,
}

#[derive(Debug, Clone)]
pub struct ParentLink {
    pub block: u32,
}

#[derive(Debug, Clone)]
pub struct RelocatedDirectory;

#[derive(Debug, Clone)]
pub struct DeviceNumber {
    pub dev_t_high: u32,
    pub dev_t_low: u32,
}

#[derive(Debug, Clone)]
pub struct ZisofsHeader {
    pub header_size_div4: u8,
    pub block_size_log2: u8,
    pub uncompressed_size: u32,
}

/// `AA`/`AL` AAIP payload fragment; the codec layer reassembles the chain
/// (see [`crate::aaip`]).
#[derive(Debug, Clone)]
pub struct AaipField {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum SystemUseEntry {
    ContinuationArea(ContinuationArea),
    ExtensionsReference(ExtensionsReference),
    SuspIndicator(SuspIndicator),
    AlternateName(AlternateName),
    PosixAttributes(PosixAttributes),
    PosixTimestamp(PosixTimestamp),
    RockRidge(RockRidgeIndicator),
    SymbolicLink(SymbolicLink),
    ChildLink(ChildLink),
    ParentLink(ParentLink),
    RelocatedDirectory(RelocatedDirectory),
    DeviceNumber(DeviceNumber),
    Zisofs(ZisofsHeader),
    Aaip(AaipField),
    Unknown { signature: [u8; 2] },
}

impl<'a> ParseSusp<'a> for ContinuationArea {
    const SIGNATURE: &'static [u8; 2] = b"CE";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        map(tuple((both_endian32, both_endian32, both_endian32)), |(block, offset, length)| {
            ContinuationArea { block, offset, length }
        })(input)
    }
}

fn pascal_style_string(input: &[u8]) -> NomRes<&[u8], String> {
    map(nom::combinator::map_res(rest, std::str::from_utf8), str::to_owned)(input)
}

impl<'a> ParseSusp<'a> for ExtensionsReference {
    const SIGNATURE: &'static [u8; 2] = b"ER";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, len_id) = nom_u8(input)?;
        let (input, len_des) = nom_u8(input)?;
        let (input, len_src) = nom_u8(input)?;
        let (input, version) = nom_u8(input)?;
        let (input, id) = take(len_id as usize)(input)?;
        let (input, descriptor) = take(len_des as usize)(input)?;
        let (input, source) = take(len_src as usize)(input)?;
        Ok((
            input,
            ExtensionsReference {
                id: String::from_utf8_lossy(id).into_owned(),
                descriptor: String::from_utf8_lossy(descriptor).into_owned(),
                source: String::from_utf8_lossy(source).into_owned(),
                version,
            },
        ))
    }
}

impl<'a> ParseSusp<'a> for SuspIndicator {
    const SIGNATURE: &'static [u8; 2] = b"SP";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, _check) = verify(tuple((nom_u8, nom_u8)), |&(a, b)| a == 0xBE && b == 0xEF)(input)?;
        let (input, len_skp) = nom_u8(input)?;
        Ok((input, SuspIndicator { len_skp }))
    }
}

impl<'a> ParseSusp<'a> for AlternateName {
    const SIGNATURE: &'static [u8; 2] = b"NM";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, raw_flags) = nom_u8(input)?;
        let flags = AlternateNameFlags::from_bits_truncate(raw_flags);
        let (input, name) = rest(input)?;
        Ok((input, AlternateName { flags, name: name.to_vec() }))
    }
}

impl<'a> ParseSusp<'a> for PosixAttributes {
    const SIGNATURE: &'static [u8; 2] = b"PX";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, mode) = both_endian32(input)?;
        let (input, links) = both_endian32(input)?;
        let (input, uid) = both_endian32(input)?;
        let (input, gid) = both_endian32(input)?;
        let (input, inode) = nom::combinator::opt(both_endian32)(input)?;
        Ok((
            input,
            PosixAttributes {
                mode: PosixFileMode::from_bits_truncate(mode),
                links,
                uid,
                gid,
                inode,
            },
        ))
    }
}

impl<'a> ParseSusp<'a> for PosixTimestamp {
    const SIGNATURE: &'static [u8; 2] = b"TF";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, raw_flags) = nom_u8(input)?;
        let flags = PosixTimestampFlags::from_bits_truncate(raw_flags);
        let count = (flags & !PosixTimestampFlags::LONG_FORM).bits().count_ones() as usize;
        let (input, times) = if flags.contains(PosixTimestampFlags::LONG_FORM) {
            nom::multi::count(crate::parse::date_time::vd_datetime, count)(input)
                .map(|(i, v)| (i, v.into_iter().flatten().collect()))?
        } else {
            nom::multi::count(dir_datetime, count)(input)?
        };
        Ok((input, PosixTimestamp { flags, times }))
    }
}

impl<'a> ParseSusp<'a> for RockRidgeIndicator {
    const SIGNATURE: &'static [u8; 2] = b"RR";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, raw) = nom_u8(input)?;
        Ok((input, RockRidgeIndicator { flags: RockRidgeFlags::from_bits_truncate(raw) }))
    }
}

fn symlink_component(input: &[u8]) -> NomRes<&[u8], SymlinkComponent> {
    let (input, raw_flags) = nom_u8(input)?;
    let flags = SymbolicLinkComponentFlags::from_bits_truncate(raw_flags);
    let (input, len) = nom_u8(input)?;
    let (input, content) = take(len as usize)(input)?;

    let component = if flags.contains(SymbolicLinkComponentFlags::ROOT) {
        SymlinkComponent::Root
    } else if flags.contains(SymbolicLinkComponentFlags::PARENT) {
        SymlinkComponent::Parent
    } else if flags.contains(SymbolicLinkComponentFlags::CURRENT) {
        SymlinkComponent::Current
    } else {
        SymlinkComponent::Name(String::from_utf8_lossy(content).into_owned())
    };
    Ok((input, component))
}

impl<'a> ParseSusp<'a> for SymbolicLink {
    const SIGNATURE: &'static [u8; 2] = b"SL";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, raw_flags) = nom_u8(input)?;
        let flags = SymbolicLinkRecordFlags::from_bits_truncate(raw_flags);
        let (input, components) = many0(symlink_component)(input)?;
        Ok((input, SymbolicLink { flags, components }))
    }
}

impl<'a> ParseSusp<'a> for ChildLink {
    const SIGNATURE: &'static [u8; 2] = b"CL";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        map(both_endian32, |block| ChildLink { block })(input)
    }
}

impl<'a> ParseSusp<'a> for ParentLink {
    const SIGNATURE: &'static [u8; 2] = b"PL";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        map(both_endian32, |block| ParentLink { block })(input)
    }
}

impl<'a> ParseSusp<'a> for RelocatedDirectory {
    const SIGNATURE: &'static [u8; 2] = b"RE";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        Ok((input, RelocatedDirectory))
    }
}

impl<'a> ParseSusp<'a> for DeviceNumber {
    const SIGNATURE: &'static [u8; 2] = b"PN";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        map(tuple((both_endian32, both_endian32)), |(dev_t_high, dev_t_low)| DeviceNumber {
            dev_t_high,
            dev_t_low,
        })(input)
    }
}

impl<'a> ParseSusp<'a> for ZisofsHeader {
    const SIGNATURE: &'static [u8; 2] = b"ZF";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        let (input, _algorithm) = take(2usize)(input)?;
        let (input, header_size_div4) = nom_u8(input)?;
        let (input, block_size_log2) = nom_u8(input)?;
        let (input, uncompressed_size) = le_u32(input)?;
        Ok((
            input,
            ZisofsHeader {
                header_size_div4,
                block_size_log2,
                uncompressed_size,
            },
        ))
    }
}

impl<'a> ParseSusp<'a> for AaipField {
    const SIGNATURE: &'static [u8; 2] = b"AA";

    fn parse_data(input: &'a [u8]) -> NomRes<&'a [u8], Self> {
        map(rest, |data: &[u8]| AaipField { data: data.to_vec() })(input)
    }
}

/// Identical wire shape to `AA`, used by the continuation variant some
/// mastering tools emit (`AL`) instead of repeating `AA`. Folded into the
/// same [`SystemUseEntry::Aaip`] variant by [`system_use_entries`].
fn al_entry(input: &[u8]) -> NomRes<&[u8], SystemUseEntry> {
    let (input, _) = tag(b"AL".as_slice())(input)?;
    let (input, length) = nom_u8(input)?;
    let (input, _version) = nom_u8(input)?;
    let data_len = (length as usize).saturating_sub(4);
    let (input, data) = take(data_len)(input)?;
    Ok((input, SystemUseEntry::Aaip(AaipField { data: data.to_vec() })))
}

fn unknown_entry(input: &[u8]) -> NomRes<&[u8], SystemUseEntry> {
    let (input, sig) = take(2usize)(input)?;
    let (input, length) = nom_u8(input)?;
    let (input, _version) = nom_u8(input)?;
    let skip = (length as usize).saturating_sub(4);
    let (input, _) = take(skip)(input)?;
    let mut signature = [0u8; 2];
    signature.copy_from_slice(sig);
    Ok((input, SystemUseEntry::Unknown { signature }))
}

/// Parses a chain of SUSP entries until the input runs out or fewer than 4
/// bytes remain (not enough for another signature+length+version header).
pub fn system_use_entries(input: &[u8]) -> NomRes<&[u8], Vec<SystemUseEntry>> {
    many0(alt((
        map(ContinuationArea::parse, SystemUseEntry::ContinuationArea),
        map(ExtensionsReference::parse, SystemUseEntry::ExtensionsReference),
        map(SuspIndicator::parse, SystemUseEntry::SuspIndicator),
        map(AlternateName::parse, SystemUseEntry::AlternateName),
        map(PosixAttributes::parse, SystemUseEntry::PosixAttributes),
        map(PosixTimestamp::parse, SystemUseEntry::PosixTimestamp),
        map(RockRidgeIndicator::parse, SystemUseEntry::RockRidge),
        map(SymbolicLink::parse, SystemUseEntry::SymbolicLink),
        map(ChildLink::parse, SystemUseEntry::ChildLink),
        map(ParentLink::parse, SystemUseEntry::ParentLink),
        map(RelocatedDirectory::parse, SystemUseEntry::RelocatedDirectory),
        map(DeviceNumber::parse, SystemUseEntry::DeviceNumber),
        map(ZisofsHeader::parse, SystemUseEntry::Zisofs),
        map(AaipField::parse, SystemUseEntry::Aaip),
        al_entry,
        unknown_entry,
    )))(input)
}

/// Recognizes the extension identifier strings an `ER` entry may carry;
/// used to decide whether `RR` bookkeeping should switch on Rock Ridge
/// decoding even absent a per-node `RR` entry (some mastering tools omit
/// it once 1991A is signaled once at the root).
pub fn susp_extension(id: &str) -> Option<&'static str> {
    match id {
        "RRIP_1991A" => Some("RRIP_1991A"),
        "IEEE_P1282" => Some("IEEE_P1282"),
        "AAIP_0200" | "2AA1CB711CA3D6C46CBF9AA0A17DB7E2" => Some("AAIP_0200"),
        _ => None,
    }
}
