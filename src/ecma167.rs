//! ECMA-167 and OSTA UDF on-disk structures
//!
//! Parsers and validators for the descriptors the driver core consumes,
//! operating on logical blocks already read from the device
//!
//! The paragraph number in the specifications is indicated in parentheses

use crate::error::{Result, UdfError};
use crate::ioutil::{rdu16le, rdu32le, rdu64le, rdu8};
use std::fmt::{Debug, Display};
use std::io::Read;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Crc calculator for Descriptor Tags
const TAG_CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

/// Byte length of a Descriptor Tag (7.2)
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone)]
/// Descriptor tag (7.2)
pub struct DescriptorTag {
    /// Tag Identifier
    pub identifier: u16,
    /// Descriptor Version
    pub version: u16,
    /// Tag Serial Number
    pub serial_number: u16,
    /// Descriptor CRC
    pub crc: u16,
    /// Descriptor CRC Length
    pub crclen: usize,
    /// Tag Location
    pub lba: u32,
}

impl DescriptorTag {
    /*
     * 1 => Primary Volume Descriptor (3/10.1)
     * 2 => Anchor Volume Descriptor Pointer (3/10.2)
     * 3 => Volume Descriptor Pointer (3/10.3)
     * 4 => Implementation Use Volume Descriptor (3/10.4)
     * 5 => Partition Descriptor (3/10.5)
     * 6 => Logical Volume Descriptor (3/10.6)
     * 7 => Unallocated Space Descriptor (3/10.8)
     * 8 => Terminating Descriptor (3/10.9 and 4/14.2)
     * 9 => Logical Volume Integrity Descriptor (3/10.10)

     * 256 => File Set Descriptor (4/14.1)
     * 257 => File Identifier Descriptor (4/14.4)
     * 258 => Allocation Extent Descriptor (4/14.5)
     * 261 => File Entry (4/14.9)
     * 264 => Space Bitmap Descriptor (4/14.12)
     * 266 => Extended File Entry (4/14.17)
     */

    /// Checks the 8-bit tag checksum over a raw tag header
    ///
    /// The checksum covers bytes 0-3 and 5-15; byte 4 carries the sum itself.
    pub fn checksum_valid(header: &[u8]) -> bool {
        if header.len() < TAG_LEN {
            return false;
        }
        let mut sum = 0u8;
        for (i, b) in header[0..TAG_LEN].iter().enumerate() {
            if i != 4 {
                sum = sum.wrapping_add(*b);
            }
        }
        sum == header[4]
    }

    /// Parses and validates a tag from the start of a logical block
    pub fn parse(block: &[u8]) -> Result<Self> {
        if block.len() < TAG_LEN {
            return Err(UdfError::VolumeCorrupted("short descriptor tag"));
        }
        if !Self::checksum_valid(block) {
            return Err(UdfError::VolumeCorrupted("descriptor tag checksum mismatch"));
        }
        let r = &mut &block[0..TAG_LEN];
        let identifier = rdu16le(r).unwrap(); // safe bc length check
        let version = rdu16le(r).unwrap();
        let _chksum = rdu8(r).unwrap();
        let rsvd = rdu8(r).unwrap();
        if rsvd != 0 {
            warn!("Found tag (id: {identifier}) with bad reserved byte");
        }
        let serial_number = rdu16le(r).unwrap();
        let crc = rdu16le(r).unwrap();
        let crclen = usize::from(rdu16le(r).unwrap());
        let lba = rdu32le(r).unwrap();
        Ok(Self {
            identifier,
            version,
            serial_number,
            crc,
            crclen,
            lba,
        })
    }

    /// Checks the 16-bit descriptor CRC over the tag body
    ///
    /// The CRC covers `crclen` bytes immediately following the tag header; a
    /// declared length extending past the available block is a mismatch.
    pub fn body_crc_valid(&self, block: &[u8]) -> bool {
        let Some(end) = TAG_LEN.checked_add(self.crclen) else {
            return false;
        };
        if end > block.len() {
            return false;
        }
        TAG_CRC.checksum(&block[TAG_LEN..end]) == self.crc
    }
}

#[derive(Debug, Clone)]
/// Extent Descriptor (7.1 / 14.14.1)
pub struct ExtentAD {
    /// Extent Length
    pub length: u32,
    /// Extent Location
    pub lba: u32,
}

impl ExtentAD {
    pub(crate) fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            length: rdu32le(r)?,
            lba: rdu32le(r)?,
        })
    }
}

/// Extent interpretation carried in the top 2 bits of an AD length (14.14.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentKind {
    /// Extent recorded and allocated
    Recorded,
    /// Extent allocated but not recorded
    NotRecorded,
    /// Extent neither allocated nor recorded
    NotAllocated,
    /// Pointer to the next extent of allocation descriptors
    Continuation,
}

#[derive(Debug, Clone)]
/// Long Allocation Descriptor (14.14.2)
pub struct LongAD {
    /// Extent Length
    pub length: u32,
    /// Extent Location
    pub lba: u32,
    /// Partition Reference Number
    pub part_ref: u16,
    /// Flags (UDF 2.3.10.1)
    pub flags: u16,
    /// Implementation Use
    pub impl_use: [u8; 4],
}

impl LongAD {
    pub(crate) fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let length = rdu32le(r)?;
        let lba = rdu32le(r)?;
        let part_ref = rdu16le(r)?;
        let flags = rdu16le(r)?;
        let mut impl_use = [0u8; 4];
        r.read_exact(&mut impl_use)?;
        Ok(Self {
            length,
            lba,
            part_ref,
            flags,
            impl_use,
        })
    }

    pub(crate) fn from_short(short: ExtentAD, part_ref: u16) -> Self {
        Self {
            length: short.length,
            lba: short.lba,
            part_ref,
            flags: 0,
            impl_use: [0; 4],
        }
    }

    /// The extent interpretation encoded in the top bits of the length
    pub fn kind(&self) -> ExtentKind {
        match self.length >> 30 {
            0 => ExtentKind::Recorded,
            1 => ExtentKind::NotRecorded,
            2 => ExtentKind::NotAllocated,
            _ => ExtentKind::Continuation,
        }
    }

    /// The extent length with the interpretation bits masked off
    pub fn unmasked_length(&self) -> u32 {
        self.length & !0xc000_0000
    }

    /// Whether this descriptor references no extent at all
    pub fn is_empty(&self) -> bool {
        self.unmasked_length() == 0
    }
}

#[derive(PartialEq, Eq, Clone)]
/// Character set specification (7.2.1)
pub struct CharSpec {
    /// Character Set Type
    pub cset_type: u8,
    /// Character Set Information
    pub cset_info: [u8; 63],
}

impl CharSpec {
    pub(crate) fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let cset_type = rdu8(r)?;
        let mut cset_info = [0u8; 63];
        r.read_exact(&mut cset_info)?;
        Ok(Self {
            cset_type,
            cset_info,
        })
    }

    /// Checks if the defined character set is CS0 (7.2.2)
    pub fn is_osta_cs0(&self) -> bool {
        self.cset_type == 0 && &self.cset_info == b"OSTA Compressed Unicode\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0"
    }
}

impl Debug for CharSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut x = f.debug_struct("CharSpec");
        x.field("cset_type", &self.cset_type);
        if let Ok(s) = String::from_utf8(self.cset_info.to_vec()) {
            x.field("cset_info", &s);
        } else {
            x.field("cset_info", &self.cset_info);
        }
        x.finish()
    }
}

#[derive(Clone)]
/// Entity identifier (7.4)
pub struct EntityId {
    /// Flags
    pub flags: u8,
    /// Identifier
    pub identifier: [u8; 23],
    /// Identifier Suffix
    pub suffix: [u8; 8],
}

impl EntityId {
    pub(crate) fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let flags = rdu8(r)?;
        let mut identifier = [0u8; 23];
        r.read_exact(&mut identifier)?;
        let mut suffix = [0u8; 8];
        r.read_exact(&mut suffix)?;
        Ok(Self {
            flags,
            identifier,
            suffix,
        })
    }

    /// Checks if the entity falls within the *OSTA UDF Compliant* domain
    pub fn is_osta_udf_compliant(&self) -> bool {
        self.flags == 0 && &self.identifier == b"*OSTA UDF Compliant\x00\x00\x00\x00"
    }

    /// Return the identifier as a lossy string
    pub fn lossy_identifier(&self) -> String {
        String::from_utf8_lossy(&self.identifier)
            .trim_end_matches('\0')
            .to_string()
    }
}

impl Debug for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut x = f.debug_struct("EntityId");
        x.field("flags", &self.flags);
        if let Ok(s) = String::from_utf8(self.identifier.to_vec()) {
            x.field("identifier", &s);
        } else {
            x.field("identifier", &self.identifier);
        }
        if let Ok(s) = String::from_utf8(self.suffix.to_vec()) {
            x.field("suffix", &s);
        } else {
            x.field("suffix", &self.suffix);
        }
        x.finish()
    }
}

/// Decodes OSTA compressed d-characters into native text (OSTA CS0 2.1.2)
///
/// `compid` 8 consumes one input byte per UTF-16 code unit (zero-extended),
/// 16 consumes big-endian pairs; anything else is a corrupt record.
pub fn decode_dchars(compid: u8, chars: &[u8]) -> Result<String> {
    match compid {
        8 => Ok(
            char::decode_utf16(chars.iter().map(|b| u16::from(*b)))
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
        ),
        16 => {
            if chars.len() % 2 != 0 {
                return Err(UdfError::VolumeCorrupted(
                    "odd byte count in 16-bit compressed identifier",
                ));
            }
            Ok(char::decode_utf16(
                chars
                    .chunks_exact(2)
                    .map(|word| u16::from_be_bytes(word.try_into().unwrap())), // safe bc chunks_exact
            )
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
        }
        _ => Err(UdfError::VolumeCorrupted("invalid compression id")),
    }
}

/// Decodes a compressed identifier whose first byte is the compression id
///
/// An empty buffer decodes to the empty string (parent FIDs carry no
/// identifier at all).
pub fn decode_identifier(buf: &[u8]) -> Result<String> {
    if buf.is_empty() {
        return Ok(String::new());
    }
    decode_dchars(buf[0], &buf[1..])
}

/// Encodes native text as OSTA compressed d-characters, id byte first
///
/// The inverse of [`decode_identifier`]; with `compid` 8 every code unit of
/// the input must fit one byte.
pub fn encode_dchars(compid: u8, s: &str) -> Result<Vec<u8>> {
    match compid {
        8 => {
            let mut out = Vec::with_capacity(1 + s.len());
            out.push(8u8);
            for unit in s.encode_utf16() {
                if unit > 0xff {
                    return Err(UdfError::Unsupported(
                        "character not representable in 8-bit compression",
                    ));
                }
                out.push(unit as u8); // safe bc range check
            }
            Ok(out)
        }
        16 => {
            let mut out = Vec::with_capacity(1 + s.len() * 2);
            out.push(16u8);
            for unit in s.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
            Ok(out)
        }
        _ => Err(UdfError::VolumeCorrupted("invalid compression id")),
    }
}

#[derive(PartialEq, Eq, Clone)]
/// Fixed-length character fields (7.2.12)
pub struct Dstring(String);

impl Dstring {
    /// Decodes a fixed-size dstring field (length byte last)
    pub(crate) fn new(buf: &[u8]) -> Self {
        assert!(
            buf.len() >= 2,
            "Internal error, Dstring with insufficient length"
        );
        let compid = buf[0];
        let mut len = usize::from(buf[buf.len() - 1]);
        if len == 0 {
            // A zero length string is recorded by setting the entire dstring
            // field to all zeros (2.1.1)
            return Self(String::new());
        }
        len -= 1; // The length of a dstring includes the compression code byte
        let buf = &buf[1..(buf.len() - 1)];
        if len > buf.len() {
            warn!("Overflowing Dstring truncated");
            len = buf.len();
        }
        match decode_dchars(compid, &buf[0..len]) {
            Ok(s) => Self(s),
            Err(_) => {
                warn!("Invalid Dstring compression id {compid}");
                Self(String::new())
            }
        }
    }
}

impl Debug for Dstring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl Display for Dstring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone)]
/// UDF date and time (7.3)
pub enum UdfDate {
    /// The datetime is present, valid and carries TZ info
    ValidTz(time::OffsetDateTime),
    /// The datetime is present, valid and is naive
    ValidNoTz(time::PrimitiveDateTime),
    /// The datetime is missing
    Unset,
    /// The datetime is present but not valid
    Invalid,
}

impl UdfDate {
    pub(crate) fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let ty_tz = rdu16le(r)?;
        let yr = rdu16le(r)?;
        let mut rest = [0u8; 8];
        r.read_exact(&mut rest)?;
        let [mo, da, hr, mi, se, cs, hs, us] = rest;
        if ty_tz == 0 && yr == 0 && rest.iter().all(|v| *v == 0) {
            return Ok(Self::Unset);
        }
        if ty_tz >> 12 != 1 {
            // All timestamps shall be recorded in local time
            return Ok(Self::Invalid);
        }
        let Ok(mo) = time::Month::try_from(mo) else {
            return Ok(Self::Invalid);
        };
        let Ok(date) = time::Date::from_calendar_date(i32::from(yr), mo, da) else {
            return Ok(Self::Invalid);
        };
        if cs > 99 || hs > 99 || us > 99 {
            return Ok(Self::Invalid);
        }
        let us = u32::from(us) + u32::from(hs) * 100 + u32::from(cs) * 10000;
        let Ok(time) = time::Time::from_hms_micro(hr, mi, se, us) else {
            return Ok(Self::Invalid);
        };
        let dt = time::PrimitiveDateTime::new(date, time);
        if ty_tz & 0xfff == 0xfff {
            return Ok(Self::ValidNoTz(dt));
        }
        let minutes = (ty_tz & 0x7ff) as i16; // safe bc mask
        let minutes = if ty_tz & 0x800 != 0 { -minutes } else { minutes };
        if !(-1440..=1440).contains(&minutes) {
            return Ok(Self::Invalid);
        }
        let Ok(offset) = time::UtcOffset::from_whole_seconds(i32::from(minutes) * 60) else {
            return Ok(Self::Invalid);
        };
        Ok(Self::ValidTz(dt.assume_offset(offset)))
    }

    /// Returns a string representation, if possible
    pub fn to_string_maybe(&self) -> Option<String> {
        match self {
            Self::ValidTz(t) => Some(t.to_string()),
            Self::ValidNoTz(t) => Some(t.to_string()),
            Self::Unset => None,
            Self::Invalid => Some("INVALID".to_string()),
        }
    }

    /// Returns the unix_timestamp, if possible
    pub fn to_ts_maybe(&self) -> Option<i64> {
        match self {
            Self::ValidTz(t) => Some(t.unix_timestamp()),
            Self::ValidNoTz(t) => Some(t.assume_offset(time::UtcOffset::UTC).unix_timestamp()),
            Self::Unset => None,
            Self::Invalid => Some(0),
        }
    }
}

#[derive(Debug, Clone)]
/// Anchor Volume Descriptor Pointer (10.2)
pub struct AnchorVolumeDescriptorPointer {
    /// Main Volume Descriptor Sequence Extent
    pub main: ExtentAD,
    /// Reserve Volume Descriptor Sequence Extent
    pub reserve: ExtentAD,
}

impl AnchorVolumeDescriptorPointer {
    /// Parses the descriptor body (everything after the tag)
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let r = &mut &body[..];
        let out = || -> std::io::Result<Self> {
            Ok(Self {
                main: ExtentAD::read_from(r)?,
                reserve: ExtentAD::read_from(r)?,
            })
        }();
        out.map_err(|_| UdfError::VolumeCorrupted("short anchor volume descriptor pointer"))
    }
}

#[derive(Debug)]
/// Primary Volume Descriptor (10.1)
pub struct PrimaryVolumeDescriptor {
    /// Volume Descriptor Sequence Number
    pub desc_sequence_number: u32,
    /// Primary Volume Descriptor Number
    pub number: u32,
    /// Volume Identifier
    pub identifier: Dstring,
    /// Volume Sequence Number
    pub sequence_number: u16,
    /// Maximum Volume Sequence Number
    pub max_sequence_number: u16,
    /// Interchange Level
    pub interchange_level: u16,
    /// Maximum Interchange Level
    pub max_interchange_level: u16,
    /// Volume Set Identifier
    pub set_identifier: Dstring,
    /// Descriptor Character Set
    pub desc_charset: CharSpec,
    /// Application Identifier
    pub app_identifier: EntityId,
    /// Recording Date and Time
    pub datetime: UdfDate,
    /// Implementation Identifier
    pub impl_identifier: EntityId,
    /// Flags
    pub flags: u16,
}

impl PrimaryVolumeDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        Self::read_from(&mut &body[..])
            .map_err(|_| UdfError::VolumeCorrupted("short primary volume descriptor"))
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let desc_sequence_number = rdu32le(r)?;
        let number = rdu32le(r)?;
        let mut buf = [0u8; 32];
        r.read_exact(&mut buf)?;
        let identifier = Dstring::new(&buf);
        let sequence_number = rdu16le(r)?;
        let max_sequence_number = rdu16le(r)?;
        let interchange_level = rdu16le(r)?;
        let max_interchange_level = rdu16le(r)?;
        let _charset_list = rdu32le(r)?;
        let _max_charset_list = rdu32le(r)?;
        let mut buf = [0u8; 128];
        r.read_exact(&mut buf)?;
        let set_identifier = Dstring::new(&buf);
        let desc_charset = CharSpec::read_from(r)?;
        let _expl_desc_charset = CharSpec::read_from(r)?;
        let _vol_abstract = ExtentAD::read_from(r)?;
        let _copyright_notice = ExtentAD::read_from(r)?;
        let app_identifier = EntityId::read_from(r)?;
        let datetime = UdfDate::read_from(r)?;
        let impl_identifier = EntityId::read_from(r)?;
        let mut impl_use = [0u8; 64];
        r.read_exact(&mut impl_use)?;
        let _predecessor_seq_location = rdu32le(r)?;
        let flags = rdu16le(r)?;
        Ok(Self {
            desc_sequence_number,
            number,
            identifier,
            sequence_number,
            max_sequence_number,
            interchange_level,
            max_interchange_level,
            set_identifier,
            desc_charset,
            app_identifier,
            datetime,
            impl_identifier,
            flags,
        })
    }
}

#[derive(Debug)]
/// Partition Descriptor (10.5)
pub struct PartitionDescriptor {
    /// Volume Descriptor Sequence Number
    pub desc_sequence_number: u32,
    /// Partition Flags
    pub flags: u16,
    /// Partition Number
    pub partition_number: u16,
    /// Partition Contents
    pub partition_contents: EntityId,
    /// Access Type
    pub access_type: u32,
    /// Partition Starting Location
    pub partition_starting_location: u32,
    /// Partition Length
    pub partition_length: u32,
    /// Implementation Identifier
    pub impl_identifier: EntityId,
}

impl PartitionDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        Self::read_from(&mut &body[..])
            .map_err(|_| UdfError::VolumeCorrupted("short partition descriptor"))
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let desc_sequence_number = rdu32le(r)?;
        let flags = rdu16le(r)?;
        let partition_number = rdu16le(r)?;
        let partition_contents = EntityId::read_from(r)?;
        let mut partition_contents_use = [0u8; 128];
        r.read_exact(&mut partition_contents_use)?;
        let access_type = rdu32le(r)?;
        let partition_starting_location = rdu32le(r)?;
        let partition_length = rdu32le(r)?;
        let impl_identifier = EntityId::read_from(r)?;
        Ok(Self {
            desc_sequence_number,
            flags,
            partition_number,
            partition_contents,
            access_type,
            partition_starting_location,
            partition_length,
            impl_identifier,
        })
    }
}

#[derive(Debug, Clone)]
/// Type 1 partition map (10.7.2): a direct partition reference
pub struct PartitionMap {
    /// Volume Sequence Number
    pub volume_sequence_number: u16,
    /// Partition Number
    pub partition_number: u16,
}

impl PartitionMap {
    fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let pmtype = rdu8(r).map_err(|_| UdfError::VolumeCorrupted("short partition map"))?;
        let len = rdu8(r).map_err(|_| UdfError::VolumeCorrupted("short partition map"))?;
        if pmtype != 1 || len != 6 {
            // Type 2 maps carry virtual/sparable/metadata partitions
            return Err(UdfError::Unsupported("non-type-1 partition map"));
        }
        let volume_sequence_number =
            rdu16le(r).map_err(|_| UdfError::VolumeCorrupted("short partition map"))?;
        let partition_number =
            rdu16le(r).map_err(|_| UdfError::VolumeCorrupted("short partition map"))?;
        Ok(Self {
            volume_sequence_number,
            partition_number,
        })
    }
}

#[derive(Debug)]
/// Logical Volume Descriptor (10.6)
pub struct LogicalVolumeDescriptor {
    /// Volume Descriptor Sequence Number
    pub desc_sequence_number: u32,
    /// Descriptor Character Set
    pub desc_charset: CharSpec,
    /// Logical Volume Identifier
    pub identifier: Dstring,
    /// Logical Block Size
    pub block_size: u32,
    /// Domain Identifier
    pub domain_identifier: EntityId,
    /// Logical Volume Contents Use: location of the File Set Descriptor
    pub fsd_location: LongAD,
    /// Implementation Identifier
    pub impl_identifier: EntityId,
    /// Integrity Sequence Extent
    pub integrity_seq_extent: ExtentAD,
    /// Partition Maps
    pub partition_maps: Vec<PartitionMap>,
}

impl LogicalVolumeDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let r = &mut &body[..];
        let (mut lvd, map_table_length, n_partition_maps) = Self::read_from(r)
            .map_err(|_| UdfError::VolumeCorrupted("short logical volume descriptor"))?;
        if usize::try_from(map_table_length).is_err()
            || (map_table_length as usize) > body.len()
        {
            return Err(UdfError::VolumeCorrupted("partition map table overflow"));
        }
        for _ in 0..n_partition_maps {
            lvd.partition_maps.push(PartitionMap::read_from(r)?);
        }
        Ok(lvd)
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<(Self, u32, u32)> {
        let desc_sequence_number = rdu32le(r)?;
        let desc_charset = CharSpec::read_from(r)?;
        let mut buf = [0u8; 128];
        r.read_exact(&mut buf)?;
        let identifier = Dstring::new(&buf);
        let block_size = rdu32le(r)?;
        let domain_identifier = EntityId::read_from(r)?;
        let fsd_location = LongAD::read_from(r)?;
        let map_table_length = rdu32le(r)?;
        let n_partition_maps = rdu32le(r)?;
        let impl_identifier = EntityId::read_from(r)?;
        let mut impl_use = [0u8; 128];
        r.read_exact(&mut impl_use)?;
        let integrity_seq_extent = ExtentAD::read_from(r)?;
        Ok((
            Self {
                desc_sequence_number,
                desc_charset,
                identifier,
                block_size,
                domain_identifier,
                fsd_location,
                impl_identifier,
                integrity_seq_extent,
                partition_maps: Vec::new(),
            },
            map_table_length,
            n_partition_maps,
        ))
    }

    /// Checks if the LVD is UDF compliant
    pub fn is_compliant(&self) -> bool {
        &self.domain_identifier.identifier == b"*OSTA UDF Compliant\0\0\0\0"
    }
}

#[derive(Debug)]
/// File Set Descriptor (14.1)
pub struct FileSetDescriptor {
    /// Recording Date and Time
    pub recording_datetime: UdfDate,
    /// Interchange Level
    pub interchange_level: u16,
    /// Maximum Interchange Level
    pub max_interchange_level: u16,
    /// File Set Number
    pub fileset_number: u32,
    /// File Set Descriptor Number
    pub fileset_desc_number: u32,
    /// Logical Volume Identifier
    pub lv_id: Dstring,
    /// File Set Identifier
    pub fileset_id: Dstring,
    /// Root Directory ICB
    pub root_dir_icb: LongAD,
    /// Domain Identifier
    pub domain_identifier: EntityId,
    /// Next Extent
    pub next_extent: LongAD,
}

impl FileSetDescriptor {
    #[instrument(skip_all)]
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        Self::read_from(&mut &body[..])
            .map_err(|_| UdfError::VolumeCorrupted("short file set descriptor"))
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let recording_datetime = UdfDate::read_from(r)?;
        let interchange_level = rdu16le(r)?;
        let max_interchange_level = rdu16le(r)?;
        let _charset_list = rdu32le(r)?;
        let _max_charset_list = rdu32le(r)?;
        let fileset_number = rdu32le(r)?;
        let fileset_desc_number = rdu32le(r)?;
        let _lv_id_charset = CharSpec::read_from(r)?;
        let mut buf = [0u8; 128];
        r.read_exact(&mut buf)?;
        let lv_id = Dstring::new(&buf);
        let _fileset_charset = CharSpec::read_from(r)?;
        let mut buf = [0u8; 32];
        r.read_exact(&mut buf)?;
        let fileset_id = Dstring::new(&buf);
        r.read_exact(&mut buf)?;
        let _copyright_file_id = Dstring::new(&buf);
        r.read_exact(&mut buf)?;
        let _abstract_file_id = Dstring::new(&buf);
        let root_dir_icb = LongAD::read_from(r)?;
        let domain_identifier = EntityId::read_from(r)?;
        let next_extent = LongAD::read_from(r)?;
        Ok(Self {
            recording_datetime,
            interchange_level,
            max_interchange_level,
            fileset_number,
            fileset_desc_number,
            lv_id,
            fileset_id,
            root_dir_icb,
            domain_identifier,
            next_extent,
        })
    }

    /// Checks if the FSD is UDF compliant
    pub fn is_compliant(&self) -> bool {
        &self.domain_identifier.identifier == b"*OSTA UDF Compliant\0\0\0\0"
    }
}

#[derive(Debug, Clone)]
/// Extent address within a partition (7.1)
pub struct RecordedAddress {
    /// Logical Block Number
    pub lba: u32,
    /// Partition Reference Number
    pub partition_reference_number: u16,
}

impl RecordedAddress {
    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            lba: rdu32le(r)?,
            partition_reference_number: rdu16le(r)?,
        })
    }
}

/// Recording mode of a File Entry's data (14.6 flags bits 0-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ADType {
    /// Data described by Short Allocation Descriptors
    Short,
    /// Data described by Long Allocation Descriptors
    Long,
    /// Data described by Extended Allocation Descriptors
    Extended,
    /// Data embedded inside the File Entry itself
    Embedded,
}

#[derive(Debug, Clone)]
/// ICB Tag (14.6)
pub struct ICBTag {
    /// Prior Recorded Number of Direct Entries
    pub prior_entries: u32,
    /// Strategy Type
    pub strategy_type: u16,
    /// Strategy Parameter
    pub strategy_parameter: [u8; 2],
    /// Maximum Number of Entries
    pub max_entries: u16,
    /// File Type
    pub file_type: u8,
    /// Parent ICB Location
    pub parent_icb_location: RecordedAddress,
    /// Flags
    pub flags: u16,
}

impl ICBTag {
    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            prior_entries: rdu32le(r)?,
            strategy_type: rdu16le(r)?,
            strategy_parameter: [rdu8(r)?, rdu8(r)?],
            max_entries: rdu16le(r)?,
            file_type: {
                let _rsvd = rdu8(r)?;
                rdu8(r)?
            },
            parent_icb_location: RecordedAddress::read_from(r)?,
            flags: rdu16le(r)?,
        })
    }

    /// The recording mode, if the flags carry a valid one
    pub fn ad_type(&self) -> Option<ADType> {
        match self.flags & 0b111 {
            0 => Some(ADType::Short),
            1 => Some(ADType::Long),
            2 => Some(ADType::Extended),
            3 => Some(ADType::Embedded),
            _ => None,
        }
    }

    /// Checks if the ICB Tag refers to a directory
    pub fn is_directory(&self) -> bool {
        self.file_type == 4
    }

    /// Checks if the ICB Tag refers to a regular file
    pub fn is_regular(&self) -> bool {
        self.file_type == 5
    }

    /// Checks if the ICB Tag refers to a symbolic link
    pub fn is_link(&self) -> bool {
        self.file_type == 12
    }
}

#[derive(Debug, Clone)]
/// File Entry (14.9) and Extended File Entry (14.17)
pub struct FileEntry {
    /// ICB Tag
    pub icb_tag: ICBTag,
    /// Uid
    pub uid: u32,
    /// Gid
    pub gid: u32,
    /// Permissions
    pub permissions: u32,
    /// File Link Count
    pub file_link_count: u16,
    /// Record Format
    pub record_format: u8,
    /// Record Display Attributes
    pub record_display_attributes: u8,
    /// Record Length
    pub record_length: u32,
    /// Information Length
    pub information_length: u64,
    /// Object Size (Extended File Entry only)
    pub object_size: Option<u64>,
    /// Logical Blocks Recorded
    pub logical_blocks_recorded: u64,
    /// Access Date and Time
    pub access_time: UdfDate,
    /// Modification Date and Time
    pub modification_time: UdfDate,
    /// Creation Date and Time (Extended File Entry only)
    pub creation_time: UdfDate,
    /// Attribute Date and Time
    pub attribute_time: UdfDate,
    /// Checkpoint
    pub checkpoint: u32,
    /// Extended Attribute ICB
    pub extended_attribute_icb: LongAD,
    /// Stream Directory ICB (Extended File Entry only)
    pub stream_directory: Option<LongAD>,
    /// Implementation Identifier
    pub implementation_identifier: EntityId,
    /// Unique Id
    pub unique_id: u64,
    /// Extended Attributes
    pub extended_attributes: Vec<u8>,
    ad_type: ADType,
    ad_data: Vec<u8>,
    partition_ref: u16,
}

impl FileEntry {
    /// Parses a File Entry block previously validated by tag id and CRC
    ///
    /// `icb` is the allocation descriptor the entry was located through; its
    /// partition reference scopes any short ADs found inside.
    #[instrument(skip_all)]
    pub(crate) fn parse(
        tag: &DescriptorTag,
        body: &[u8],
        icb: &LongAD,
        block_size: u32,
    ) -> Result<Self> {
        let is_extended = tag.identifier == 266;
        let r = &mut &body[..];
        let mut res = Self::read_fixed(r, is_extended)
            .map_err(|_| UdfError::VolumeCorrupted("short file entry"))?;
        res.partition_ref = icb.part_ref;
        let extended_attributes_len = rdu32le(r)
            .map_err(|_| UdfError::VolumeCorrupted("short file entry"))?;
        let allocation_descriptors_len = rdu32le(r)
            .map_err(|_| UdfError::VolumeCorrupted("short file entry"))?;

        let fixed = if is_extended { 216u64 } else { 176u64 };
        if fixed + u64::from(extended_attributes_len) + u64::from(allocation_descriptors_len)
            > u64::from(block_size)
        {
            return Err(UdfError::VolumeCorrupted("file entry overflows its block"));
        }

        let mut extended_attributes = vec![0u8; extended_attributes_len as usize];
        r.read_exact(&mut extended_attributes)
            .map_err(|_| UdfError::VolumeCorrupted("short file entry"))?;
        res.extended_attributes = extended_attributes;

        let mut ad_data = vec![0u8; allocation_descriptors_len as usize];
        r.read_exact(&mut ad_data)
            .map_err(|_| UdfError::VolumeCorrupted("short file entry"))?;

        res.ad_type = res
            .icb_tag
            .ad_type()
            .ok_or(UdfError::VolumeCorrupted("invalid recording mode"))?;
        if res.ad_type == ADType::Embedded && u64::try_from(ad_data.len()).unwrap_or(u64::MAX) < res.information_length {
            return Err(UdfError::VolumeCorrupted(
                "embedded data shorter than information length",
            ));
        }
        res.ad_data = ad_data;
        Ok(res)
    }

    fn read_fixed<R: Read>(r: &mut R, is_extended: bool) -> std::io::Result<Self> {
        Ok(Self {
            icb_tag: ICBTag::read_from(r)?,
            uid: rdu32le(r)?,
            gid: rdu32le(r)?,
            permissions: rdu32le(r)?,
            file_link_count: rdu16le(r)?,
            record_format: rdu8(r)?,
            record_display_attributes: rdu8(r)?,
            record_length: rdu32le(r)?,
            information_length: rdu64le(r)?,
            object_size: if is_extended {
                Some(rdu64le(r)?)
            } else {
                None
            },
            logical_blocks_recorded: rdu64le(r)?,
            access_time: UdfDate::read_from(r)?,
            modification_time: UdfDate::read_from(r)?,
            creation_time: if is_extended {
                UdfDate::read_from(r)?
            } else {
                UdfDate::Unset
            },
            attribute_time: UdfDate::read_from(r)?,
            checkpoint: rdu32le(r)?,
            extended_attribute_icb: {
                if is_extended {
                    // Skip reserved
                    rdu32le(r)?;
                };
                LongAD::read_from(r)?
            },
            stream_directory: if is_extended {
                Some(LongAD::read_from(r)?)
            } else {
                None
            },
            implementation_identifier: EntityId::read_from(r)?,
            unique_id: rdu64le(r)?,
            extended_attributes: Vec::new(),
            ad_type: ADType::Embedded,
            ad_data: Vec::new(),
            partition_ref: 0,
        })
    }

    /// The recording mode of this entry's data
    pub fn ad_type(&self) -> ADType {
        self.ad_type
    }

    /// Partition reference number scoping this entry's short ADs
    pub fn partition_ref(&self) -> u16 {
        self.partition_ref
    }

    /// The embedded file content, for [`ADType::Embedded`] entries
    pub fn inline_data(&self) -> Result<&[u8]> {
        if self.ad_type != ADType::Embedded {
            return Err(UdfError::VolumeCorrupted(
                "inline data requested from an allocated file entry",
            ));
        }
        // Bounds guaranteed by the parse-time length check
        Ok(&self.ad_data[0..self.information_length as usize])
    }

    /// The packed allocation descriptor run, for AD-recorded entries
    pub fn allocation_descriptors(&self) -> Result<&[u8]> {
        match self.ad_type {
            ADType::Short | ADType::Long => Ok(&self.ad_data),
            ADType::Extended => Err(UdfError::Unsupported("extended allocation descriptors")),
            ADType::Embedded => Err(UdfError::VolumeCorrupted(
                "allocation descriptors requested from an embedded file entry",
            )),
        }
    }

    /// Returns permissions as a string
    pub fn perms_str(&self) -> String {
        fn perm2str(p: u32) -> String {
            format!(
                "{}{}{}{}{}",
                if p & 0x10 != 0 { 'D' } else { 'd' },
                if p & 0x8 != 0 { 'A' } else { 'a' },
                if p & 0x4 != 0 { 'R' } else { 'r' },
                if p & 0x2 != 0 { 'W' } else { 'w' },
                if p & 0x1 != 0 { 'X' } else { 'x' },
            )
        }
        perm2str((self.permissions >> 10) & 0x1f) + // u
            &perm2str((self.permissions >> 5) & 0x1f) + // g
            &perm2str(self.permissions & 0x1f) // o
    }

    /// Whether this is an Extended File Entry
    pub fn is_extended(&self) -> bool {
        self.object_size.is_some()
    }

    /// Whether the data is embedded in the entry rather than allocated
    pub fn is_embedded(&self) -> bool {
        self.ad_type == ADType::Embedded
    }
}

/// Fixed byte length of a FID up to the implementation use field (14.4)
pub const FID_FIXED_LEN: usize = 38;

#[derive(Debug, Clone)]
/// File Identifier Descriptor (14.4)
pub struct FileIdentifierDescriptor {
    /// File Version Number
    pub version_number: u16,
    /// File Characteristics
    pub characteristics: u8,
    /// ICB
    pub icb: LongAD,
    /// Implementation use
    pub implementation_use: Vec<u8>,
    /// File Identifier
    pub identifier: String,
    /// File Identifier, raw compressed bytes
    pub identifier_bytes: Vec<u8>,
}

impl FileIdentifierDescriptor {
    /// Parses one FID record from the head of `buf`
    ///
    /// Returns the descriptor and the number of bytes it occupies in the
    /// directory stream (rounded up to a 4 byte boundary). The record carries
    /// its own embedded tag; the tag location cannot be validated here
    /// because FIDs are addressed by stream offset, not by block.
    #[instrument(skip_all)]
    pub(crate) fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let tag = DescriptorTag::parse(buf)?;
        if tag.identifier != 257 {
            warn!("Invalid File Identifier Descriptor tag (id {})", tag.identifier);
            return Err(UdfError::VolumeCorrupted(
                "invalid file identifier descriptor tag",
            ));
        }
        let r = &mut &buf[TAG_LEN..];
        let short = |_| UdfError::VolumeCorrupted("truncated file identifier descriptor");
        let version_number = rdu16le(r).map_err(short)?;
        let characteristics = rdu8(r).map_err(short)?;
        let id_len = usize::from(rdu8(r).map_err(short)?);
        let icb = LongAD::read_from(r).map_err(short)?;
        let iu_len = usize::from(rdu16le(r).map_err(short)?);

        let record_len = Self::record_length(id_len, iu_len);
        if record_len > buf.len() {
            return Err(UdfError::VolumeCorrupted(
                "file identifier descriptor extends past its stream",
            ));
        }
        if !tag.body_crc_valid(&buf[0..record_len]) {
            return Err(UdfError::VolumeCorrupted(
                "file identifier descriptor crc mismatch",
            ));
        }
        let mut implementation_use = vec![0u8; iu_len];
        r.read_exact(&mut implementation_use).map_err(short)?;
        let mut identifier_bytes = vec![0u8; id_len];
        r.read_exact(&mut identifier_bytes).map_err(short)?;
        let identifier = decode_identifier(&identifier_bytes)?;
        Ok((
            Self {
                version_number,
                characteristics,
                icb,
                implementation_use,
                identifier,
                identifier_bytes,
            },
            record_len,
        ))
    }

    /// Stream footprint of a FID with the given identifier and impl-use sizes
    pub fn record_length(id_len: usize, iu_len: usize) -> usize {
        (FID_FIXED_LEN + id_len + iu_len).next_multiple_of(4)
    }

    /// Whether the entry is hidden
    pub fn is_hidden(&self) -> bool {
        self.characteristics & 0b1 != 0
    }

    /// Whether the entry names a directory
    pub fn is_directory(&self) -> bool {
        self.characteristics & 0b10 != 0
    }

    /// Whether the entry has been deleted
    pub fn is_deleted(&self) -> bool {
        self.characteristics & 0b100 != 0
    }

    /// Whether the entry points at the parent directory
    pub fn is_parent(&self) -> bool {
        self.characteristics & 0b1000 != 0
    }
}

#[derive(Debug)]
/// Allocation Extent Descriptor (14.5)
///
/// The landing block of an indirect "next extent" allocation descriptor; its
/// body is a further run of allocation descriptors.
pub struct AllocationExtentDescriptor {
    /// Previous Allocation Extent Location
    pub previous_aed_location: u32,
    /// Length of Allocation Descriptors
    pub ads_length: u32,
}

impl AllocationExtentDescriptor {
    /// Parses the descriptor body and returns it with the embedded AD run
    pub(crate) fn parse(body: &[u8]) -> Result<(Self, &[u8])> {
        let r = &mut &body[..];
        let short = |_| UdfError::VolumeCorrupted("short allocation extent descriptor");
        let previous_aed_location = rdu32le(r).map_err(short)?;
        let ads_length = rdu32le(r).map_err(short)?;
        let ads_len = ads_length as usize;
        if ads_len > body.len() - 8 {
            return Err(UdfError::VolumeCorrupted(
                "allocation extent descriptor overflows its block",
            ));
        }
        Ok((
            Self {
                previous_aed_location,
                ads_length,
            },
            &body[8..8 + ads_len],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_tag(id: u16, lba: u32, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; TAG_LEN];
        out[0..2].copy_from_slice(&id.to_le_bytes());
        out[2..4].copy_from_slice(&2u16.to_le_bytes());
        let crc = TAG_CRC.checksum(body);
        out[8..10].copy_from_slice(&crc.to_le_bytes());
        out[10..12].copy_from_slice(&(body.len() as u16).to_le_bytes());
        out[12..16].copy_from_slice(&lba.to_le_bytes());
        let mut sum = 0u8;
        for (i, b) in out.iter().enumerate() {
            if i != 4 {
                sum = sum.wrapping_add(*b);
            }
        }
        out[4] = sum;
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn tag_checksum_accepts_valid() {
        let block = mk_tag(256, 7, &[0u8; 48]);
        let tag = DescriptorTag::parse(&block).unwrap();
        assert_eq!(tag.identifier, 256);
        assert_eq!(tag.lba, 7);
        assert_eq!(tag.crclen, 48);
        assert!(tag.body_crc_valid(&block));
    }

    #[test]
    fn tag_checksum_flip_rejects() {
        let block = mk_tag(2, 256, &[0u8; 16]);
        // Flipping any header byte except the checksum itself must invalidate
        for pos in 0..TAG_LEN {
            if pos == 4 {
                continue;
            }
            let mut bad = block.clone();
            bad[pos] ^= 0x5a;
            assert!(
                !DescriptorTag::checksum_valid(&bad),
                "flip at {pos} not caught"
            );
            assert!(matches!(
                DescriptorTag::parse(&bad),
                Err(UdfError::VolumeCorrupted(_))
            ));
        }
    }

    #[test]
    fn tag_body_crc_detects_damage() {
        let mut block = mk_tag(261, 0, b"some descriptor body data charge");
        let tag = DescriptorTag::parse(&block).unwrap();
        assert!(tag.body_crc_valid(&block));
        block[TAG_LEN + 3] ^= 1;
        assert!(!tag.body_crc_valid(&block));
    }

    #[test]
    fn tag_crclen_past_block_is_invalid() {
        let mut block = mk_tag(261, 0, &[0u8; 8]);
        block.truncate(TAG_LEN + 4);
        // Fix up the checksum after truncation is not needed: header untouched
        let tag = DescriptorTag::parse(&block).unwrap();
        assert!(!tag.body_crc_valid(&block));
    }

    #[test]
    fn osta_round_trip_8bit() {
        let text = "HELLO.TXT";
        let enc = encode_dchars(8, text).unwrap();
        assert_eq!(enc[0], 8);
        assert_eq!(enc.len(), 1 + text.len());
        assert_eq!(decode_identifier(&enc).unwrap(), text);
    }

    #[test]
    fn osta_round_trip_16bit() {
        let text = "Ðì®€µþŧ¥";
        let enc = encode_dchars(16, text).unwrap();
        assert_eq!(enc[0], 16);
        assert_eq!(decode_identifier(&enc).unwrap(), text);
    }

    #[test]
    fn osta_8bit_rejects_wide_chars() {
        assert!(matches!(
            encode_dchars(8, "€"),
            Err(UdfError::Unsupported(_))
        ));
    }

    #[test]
    fn osta_invalid_compression_id() {
        assert!(matches!(
            decode_dchars(9, b"abc"),
            Err(UdfError::VolumeCorrupted(_))
        ));
        assert!(matches!(
            decode_identifier(&[0u8, 65]),
            Err(UdfError::VolumeCorrupted(_))
        ));
        assert_eq!(decode_identifier(&[]).unwrap(), "");
    }

    #[test]
    fn extent_kind_from_length_bits() {
        let mut ad = LongAD {
            length: 512,
            lba: 10,
            part_ref: 0,
            flags: 0,
            impl_use: [0; 4],
        };
        assert_eq!(ad.kind(), ExtentKind::Recorded);
        ad.length = 0x4000_0200;
        assert_eq!(ad.kind(), ExtentKind::NotRecorded);
        assert_eq!(ad.unmasked_length(), 512);
        ad.length = 0x8000_0200;
        assert_eq!(ad.kind(), ExtentKind::NotAllocated);
        ad.length = 0xc000_0200;
        assert_eq!(ad.kind(), ExtentKind::Continuation);
        assert_eq!(ad.unmasked_length(), 512);
    }

    fn mk_fid(name: &str, characteristics: u8, icb_lba: u32) -> Vec<u8> {
        let id = if name.is_empty() {
            Vec::new()
        } else {
            encode_dchars(8, name).unwrap()
        };
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_le_bytes()); // version
        body.push(characteristics);
        body.push(id.len() as u8);
        body.extend_from_slice(&2048u32.to_le_bytes()); // icb length
        body.extend_from_slice(&icb_lba.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes()); // part ref
        body.extend_from_slice(&[0u8; 6]); // icb impl use
        body.extend_from_slice(&0u16.to_le_bytes()); // iu len
        body.extend_from_slice(&id);
        while (body.len() + TAG_LEN) % 4 != 0 {
            body.push(0);
        }
        mk_tag(257, 0, &body)
    }

    #[test]
    fn fid_record_length_invariants() {
        for name in ["A", "AB", "ABC", "LONGERNAME.TXT", ""] {
            let rec = mk_fid(name, 0, 5);
            let (fid, consumed) = FileIdentifierDescriptor::parse(&rec).unwrap();
            assert_eq!(consumed % 4, 0);
            assert!(consumed >= FID_FIXED_LEN + fid.identifier_bytes.len());
            assert_eq!(consumed, rec.len());
            assert_eq!(fid.identifier, name);
        }
    }

    #[test]
    fn fid_parent_has_no_identifier() {
        let rec = mk_fid("", 0b1010, 3);
        let (fid, _) = FileIdentifierDescriptor::parse(&rec).unwrap();
        assert!(fid.is_parent());
        assert!(fid.is_directory());
        assert!(!fid.is_deleted());
        assert_eq!(fid.identifier, "");
        assert_eq!(fid.icb.lba, 3);
    }

    #[test]
    fn fid_bad_crc_rejected() {
        let mut rec = mk_fid("FILE", 0, 5);
        let last = rec.len() - 2;
        rec[last] ^= 0xff;
        assert!(matches!(
            FileIdentifierDescriptor::parse(&rec),
            Err(UdfError::VolumeCorrupted(_))
        ));
    }

    #[test]
    fn udf_date_with_timezone() {
        let mut buf = Vec::new();
        // +120 minutes, type 1
        buf.extend_from_slice(&(0x1000u16 | 120).to_le_bytes());
        buf.extend_from_slice(&2024u16.to_le_bytes());
        buf.extend_from_slice(&[1, 5, 18, 31, 39, 30, 24, 65]);
        let date = UdfDate::read_from(&mut &buf[..]).unwrap();
        match date {
            UdfDate::ValidTz(t) => {
                assert_eq!(t, time::macros::datetime!(2024-01-05 18:31:39.302465 +02:00:00));
            }
            other => panic!("unexpected date {other:?}"),
        }
    }

    #[test]
    fn udf_date_unset_and_invalid() {
        let zero = [0u8; 12];
        assert!(matches!(
            UdfDate::read_from(&mut &zero[..]).unwrap(),
            UdfDate::Unset
        ));
        let mut bad = [0u8; 12];
        bad[0] = 0x00;
        bad[1] = 0x10; // type 1, tz 0
        bad[4] = 13; // month 13
        assert!(matches!(
            UdfDate::read_from(&mut &bad[..]).unwrap(),
            UdfDate::Invalid
        ));
    }

    #[test]
    fn aed_bounds() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&[0xabu8; 16]);
        let (aed, ads) = AllocationExtentDescriptor::parse(&body).unwrap();
        assert_eq!(aed.ads_length, 16);
        assert_eq!(ads.len(), 16);

        let mut overflow = Vec::new();
        overflow.extend_from_slice(&0u32.to_le_bytes());
        overflow.extend_from_slice(&64u32.to_le_bytes());
        overflow.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            AllocationExtentDescriptor::parse(&overflow),
            Err(UdfError::VolumeCorrupted(_))
        ));
    }
}
