//! UDF/ECMA-167 descriptors (C5).
//!
//! No example repo implements UDF; the tag and descriptor layouts are taken directly from
//! ECMA-167. The `from_to_other` tagged-enum idiom is shared with [`crate::voldesc`], and the
//! table-driven CRC-16 follows the packed-struct/table-decoding shape `binms::pe`/`binms::clr`
//! use for their own checksums. Unlike ISO9660, ECMA-167 fields are plain little-endian, so no
//! `EndianPair` is used here.

use from_to_repr::from_to_other;

use crate::error::{Error, ImageLocation, Result};

pub const BLOCK_SIZE: usize = 2048;
pub const ANCHOR_BLOCK: u32 = 256;
pub const TAG_LEN: usize = 16;

#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum TagIdentifier {
    PrimaryVolumeDescriptor = 1,
    AnchorVolumeDescriptorPointer = 2,
    VolumeDescriptorPointer = 3,
    ImplementationUseVolumeDescriptor = 4,
    PartitionDescriptor = 5,
    LogicalVolumeDescriptor = 6,
    UnallocatedSpaceDescriptor = 7,
    TerminatingDescriptor = 8,
    LogicalVolumeIntegrityDescriptor = 9,
    FileSetDescriptor = 256,
    FileIdentifierDescriptor = 257,
    AllocationExtentDescriptor = 258,
    FileEntry = 261,
    ExtendedFileEntry = 266,
    Other(u16),
}

/// CRC-16/ANSI-X3.66, the variant ECMA-167 4/7.2.2 specifies for descriptor tags.
fn crc16(data: &[u8]) -> u16 {
    const POLY: u16 = 0x1021;
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
        }
    }
    crc
}

/// The 16-byte descriptor tag every ECMA-167 structure begins with. ECMA-167 § 3/7.2.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorTag {
    pub identifier: TagIdentifier,
    pub descriptor_version: u16,
    pub serial_number: u16,
    pub location: u32,
}
impl DescriptorTag {
    /// Encodes the tag, given the already-encoded descriptor body that follows it (used to
    /// compute the descriptor CRC over exactly that span).
    pub fn encode(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(TAG_LEN);
        out.extend_from_slice(&u16::from(self.identifier).to_le_bytes());
        out.extend_from_slice(&self.descriptor_version.to_le_bytes());
        out.push(0); // tag checksum, filled in below
        out.push(0); // reserved
        out.extend_from_slice(&self.serial_number.to_le_bytes());
        let crc = crc16(body);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(body.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.location.to_le_bytes());

        let checksum = tag_checksum(&out);
        out[4] = checksum;
        out
    }

    pub fn decode(buf: &[u8], location: ImageLocation) -> Result<(Self, u16, u16)> {
        if buf.len() < TAG_LEN {
            return Err(Error::malformed("UDF descriptor tag truncated", location));
        }
        let checksum = tag_checksum(&buf[0..TAG_LEN]);
        if checksum != buf[4] {
            return Err(Error::malformed("UDF descriptor tag checksum mismatch", location));
        }
        let identifier = TagIdentifier::from(u16::from_le_bytes(buf[0..2].try_into().unwrap()));
        let descriptor_version = u16::from_le_bytes(buf[2..4].try_into().unwrap());
        let serial_number = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        let descriptor_crc = u16::from_le_bytes(buf[8..10].try_into().unwrap());
        let descriptor_crc_length = u16::from_le_bytes(buf[10..12].try_into().unwrap());
        let tag_location = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        Ok((
            Self { identifier, descriptor_version, serial_number, location: tag_location },
            descriptor_crc,
            descriptor_crc_length,
        ))
    }

    /// Verifies the descriptor CRC recorded in the tag against the actual body bytes.
    pub fn verify_crc(expected: u16, body: &[u8], location: ImageLocation) -> Result<()> {
        if crc16(body) != expected {
            return Err(Error::malformed("UDF descriptor CRC mismatch", location));
        }
        Ok(())
    }
}

/// Sum of the tag's first 16 bytes, excluding the checksum byte itself, modulo 256.
fn tag_checksum(tag: &[u8]) -> u8 {
    tag[0..TAG_LEN].iter().enumerate()
        .filter(|(i, _)| *i != 4)
        .fold(0u8, |acc, (_, b)| acc.wrapping_add(*b))
}
/// A `lb_addr` logical block address: a 32-bit block number plus its partition reference number.
/// ECMA-167 § 4/7.1.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LbAddr {
    pub logical_block_number: u32,
    pub partition_reference_number: u16,
}
impl LbAddr {
    pub const LEN: usize = 6;
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.logical_block_number.to_le_bytes());
        out.extend_from_slice(&self.partition_reference_number.to_le_bytes());
    }
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            logical_block_number: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            partition_reference_number: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
        }
    }
}

/// A `short_ad` allocation descriptor: extent length plus position, same partition as the owner.
/// ECMA-167 § 4/14.14.1.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ShortAd {
    pub extent_length: u32,
    pub extent_position: u32,
}
impl ShortAd {
    pub const LEN: usize = 8;
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.extent_length.to_le_bytes());
        out.extend_from_slice(&self.extent_position.to_le_bytes());
    }
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            extent_length: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            extent_position: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        }
    }
}

/// A `long_ad` allocation descriptor: extent length/position plus an explicit `lb_addr`.
/// ECMA-167 § 4/14.14.2.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LongAd {
    pub extent_length: u32,
    pub extent_location: LbAddr,
}
impl LongAd {
    pub const LEN: usize = 16;
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.extent_length.to_le_bytes());
        self.extent_location.encode(out);
        out.extend_from_slice(&[0u8; 6]); // implementation use
    }
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            extent_length: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            extent_location: LbAddr::decode(&buf[4..10]),
        }
    }
}

/// Encodes a string in CS0 with the "8-bit" compression ID (0x08): ASCII/Latin-1 only.
pub fn str_to_cs0(s: &str) -> Result<Vec<u8>> {
    if s.chars().all(|c| (c as u32) <= 0xFF) {
        let mut out = Vec::with_capacity(1 + s.len());
        out.push(0x08);
        out.extend(s.chars().map(|c| c as u8));
        Ok(out)
    } else {
        let mut out = Vec::with_capacity(1 + s.len() * 2);
        out.push(0x10);
        for c in s.chars() {
            let cp = c as u32;
            if cp > 0xFFFF {
                return Err(Error::invalid_input(format!(
                    "code point U+{:X} is outside the Basic Multilingual Plane and cannot be encoded in CS0", cp,
                )));
            }
            out.extend_from_slice(&(cp as u16).to_be_bytes());
        }
        Ok(out)
    }
}

/// Decodes a CS0-encoded string (compression byte 0x08 or 0x10).
pub fn cs0_to_str(bytes: &[u8]) -> Result<String> {
    let location = ImageLocation::UNKNOWN;
    match bytes.first() {
        Some(0x08) => Ok(bytes[1..].iter().map(|&b| b as char).collect()),
        Some(0x10) => {
            let rest = &bytes[1..];
            if rest.len() % 2 != 0 {
                return Err(Error::malformed("CS0 16-bit string has odd length", location));
            }
            let units: Vec<u16> = rest.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
            String::from_utf16(&units).map_err(|_| Error::malformed("CS0 16-bit string is not valid UTF-16", location))
        },
        Some(other) => Err(Error::malformed(format!("unrecognized CS0 compression ID {:#04X}", other), location)),
        None => Ok(String::new()),
    }
}

/// Anchor Volume Descriptor Pointer: points at the main and reserve volume descriptor sequences.
/// ECMA-167 § 3/10.2. Always found at block 256; duplicated at N-1/N on write.
#[derive(Clone, Copy, Debug)]
pub struct AnchorVolumeDescriptorPointer {
    pub main_vds: ShortAd,
    pub reserve_vds: ShortAd,
}
impl AnchorVolumeDescriptorPointer {
    pub fn encode(&self, location: u32, serial: u16) -> Vec<u8> {
        let mut body = Vec::with_capacity(16);
        self.main_vds.encode(&mut body);
        self.reserve_vds.encode(&mut body);
        body.resize(BLOCK_SIZE - TAG_LEN, 0);
        let tag = DescriptorTag {
            identifier: TagIdentifier::AnchorVolumeDescriptorPointer,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < BLOCK_SIZE {
            return Err(Error::malformed("anchor volume descriptor pointer block truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::AnchorVolumeDescriptorPointer {
            return Err(Error::malformed("block 256 is not an anchor volume descriptor pointer", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;
        Ok(Self { main_vds: ShortAd::decode(&body[0..8]), reserve_vds: ShortAd::decode(&body[8..16]) })
    }
}

/// Primary Volume Descriptor. ECMA-167 § 3/10.1.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PrimaryVolumeDescriptor {
    pub volume_descriptor_sequence_number: u32,
    pub primary_volume_descriptor_number: u32,
    pub volume_identifier: Vec<u8>,
    pub volume_sequence_number: u16,
    pub max_volume_sequence_number: u16,
    pub interchange_level: u16,
    pub max_interchange_level: u16,
    pub character_set_list: u32,
    pub max_character_set_list: u32,
    pub volume_set_identifier: Vec<u8>,
}
impl PrimaryVolumeDescriptor {
    pub fn encode(&self, location: u32, serial: u16) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.volume_descriptor_sequence_number.to_le_bytes());
        body.extend_from_slice(&self.primary_volume_descriptor_number.to_le_bytes());
        let mut ident = self.volume_identifier.clone();
        ident.resize(32, 0);
        body.extend_from_slice(&ident);
        body.extend_from_slice(&self.volume_sequence_number.to_le_bytes());
        body.extend_from_slice(&self.max_volume_sequence_number.to_le_bytes());
        body.extend_from_slice(&self.interchange_level.to_le_bytes());
        body.extend_from_slice(&self.max_interchange_level.to_le_bytes());
        body.extend_from_slice(&self.character_set_list.to_le_bytes());
        body.extend_from_slice(&self.max_character_set_list.to_le_bytes());
        let mut set_ident = self.volume_set_identifier.clone();
        set_ident.resize(128, 0);
        body.extend_from_slice(&set_ident);
        body.resize(BLOCK_SIZE - TAG_LEN, 0);

        if body.len() > BLOCK_SIZE - TAG_LEN {
            return Err(Error::internal("primary volume descriptor body exceeds one block"));
        }
        let tag = DescriptorTag {
            identifier: TagIdentifier::PrimaryVolumeDescriptor,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < BLOCK_SIZE {
            return Err(Error::malformed("primary volume descriptor block truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::PrimaryVolumeDescriptor {
            return Err(Error::malformed("expected a primary volume descriptor", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;
        Ok(Self {
            volume_descriptor_sequence_number: u32::from_le_bytes(body[0..4].try_into().unwrap()),
            primary_volume_descriptor_number: u32::from_le_bytes(body[4..8].try_into().unwrap()),
            volume_identifier: body[8..40].to_vec(),
            volume_sequence_number: u16::from_le_bytes(body[40..42].try_into().unwrap()),
            max_volume_sequence_number: u16::from_le_bytes(body[42..44].try_into().unwrap()),
            interchange_level: u16::from_le_bytes(body[44..46].try_into().unwrap()),
            max_interchange_level: u16::from_le_bytes(body[46..48].try_into().unwrap()),
            character_set_list: u32::from_le_bytes(body[48..52].try_into().unwrap()),
            max_character_set_list: u32::from_le_bytes(body[52..56].try_into().unwrap()),
            volume_set_identifier: body[56..184].to_vec(),
        })
    }
}

/// Partition Descriptor: maps one partition number to a starting block and length. ECMA-167 §
/// 3/10.5. This crate supports only a single Type 1 (plain) partition map, the "bridge disc"
/// shape genisoimage/mkisofs produce.
#[derive(Clone, Copy, Debug)]
pub struct PartitionDescriptor {
    pub volume_descriptor_sequence_number: u32,
    pub partition_number: u16,
    pub partition_starting_location: u32,
    pub partition_length: u32,
}
impl PartitionDescriptor {
    pub fn encode(&self, location: u32, serial: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.volume_descriptor_sequence_number.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes()); // partition flags: not allocated as unallocated
        body.extend_from_slice(&self.partition_number.to_le_bytes());
        let mut contents_id = [0u8; 32];
        contents_id[0] = 2; // flags: identifier is stored as 8-bit characters
        contents_id[1..1 + b"+NSR02".len()].copy_from_slice(b"+NSR02");
        body.extend_from_slice(&contents_id); // partition contents identifier
        body.extend_from_slice(&[0u8; 128]); // partition contents use
        body.extend_from_slice(&0u32.to_le_bytes()); // access type: read/write
        body.extend_from_slice(&self.partition_starting_location.to_le_bytes());
        body.extend_from_slice(&self.partition_length.to_le_bytes());
        body.resize(BLOCK_SIZE - TAG_LEN, 0);
        let tag = DescriptorTag {
            identifier: TagIdentifier::PartitionDescriptor,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < BLOCK_SIZE {
            return Err(Error::malformed("partition descriptor block truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::PartitionDescriptor {
            return Err(Error::malformed("expected a partition descriptor", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;
        Ok(Self {
            volume_descriptor_sequence_number: u32::from_le_bytes(body[0..4].try_into().unwrap()),
            partition_number: u16::from_le_bytes(body[6..8].try_into().unwrap()),
            partition_starting_location: u32::from_le_bytes(body[172..176].try_into().unwrap()),
            partition_length: u32::from_le_bytes(body[176..180].try_into().unwrap()),
        })
    }
}

/// File Set Descriptor: the root of a UDF logical volume's file-identifier tree. ECMA-167 §
/// 4/14.1.
#[derive(Clone, Copy, Debug)]
pub struct FileSetDescriptor {
    pub file_set_number: u32,
    pub root_directory_icb: LongAd,
}
impl FileSetDescriptor {
    pub fn encode(&self, location: u32, serial: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0u8; 8]); // recording date and time (unspecified)
        body.extend_from_slice(&1u16.to_le_bytes()); // interchange level
        body.extend_from_slice(&3u16.to_le_bytes()); // max interchange level
        body.extend_from_slice(&0u32.to_le_bytes()); // character set list
        body.extend_from_slice(&1u32.to_le_bytes()); // max character set list
        body.extend_from_slice(&self.file_set_number.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // file set descriptor number
        body.resize(body.len() + 8 + 8 + 32 + 32 + 32 + 32, 0); // charsets/identifiers, unused here
        self.root_directory_icb.encode(&mut body);
        body.resize(BLOCK_SIZE - TAG_LEN, 0);
        let tag = DescriptorTag {
            identifier: TagIdentifier::FileSetDescriptor,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < BLOCK_SIZE {
            return Err(Error::malformed("file set descriptor block truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::FileSetDescriptor {
            return Err(Error::malformed("expected a file set descriptor", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;
        let file_set_number = u32::from_le_bytes(body[20..24].try_into().unwrap());
        let icb_offset = 8 + 2 + 2 + 4 + 4 + 4 + 4 + (8 + 8 + 32 + 32 + 32 + 32);
        Ok(Self {
            file_set_number,
            root_directory_icb: LongAd::decode(&body[icb_offset..icb_offset + LongAd::LEN]),
        })
    }
}

/// ICB tag: the fixed header every ICB-bearing descriptor (file entry, extended file entry)
/// starts with. ECMA-167 § 4/14.6.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IcbTag {
    pub prior_recorded_number_of_direct_entries: u32,
    pub strategy_type: u16,
    pub file_type: u8,
    pub parent_icb: LbAddr,
    pub flags: u16,
}
impl IcbTag {
    pub const LEN: usize = 20;
    pub const FILE_TYPE_DIRECTORY: u8 = 4;
    pub const FILE_TYPE_REGULAR: u8 = 5;
    pub const FILE_TYPE_SYMLINK: u8 = 12;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.prior_recorded_number_of_direct_entries.to_le_bytes());
        out.extend_from_slice(&self.strategy_type.to_le_bytes());
        out.extend_from_slice(&[0u8; 2]); // strategy parameter
        out.extend_from_slice(&1u16.to_le_bytes()); // max number of entries
        out.push(0); // reserved
        out.push(self.file_type);
        self.parent_icb.encode(out);
        out.extend_from_slice(&self.flags.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            prior_recorded_number_of_direct_entries: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            strategy_type: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            file_type: buf[11],
            parent_icb: LbAddr::decode(&buf[12..18]),
            flags: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
        }
    }
}

/// File Entry (FE): a file or directory's metadata plus its allocation descriptors. ECMA-167 §
/// 4/14.9. Extended file entries are not produced by this crate but are accepted on read by
/// reusing the same field layout up to the allocation descriptors (the extra EFE fields are
/// skipped).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileEntry {
    pub icb_tag: IcbTag,
    pub uid: u32,
    pub gid: u32,
    pub permissions: u32,
    pub file_link_count: u16,
    pub record_format: u8,
    pub information_length: u64,
    pub logical_blocks_recorded: u64,
    /// `long_ad` allocation descriptors for this file's extents.
    pub allocation_descriptors: Vec<LongAd>,
}
impl FileEntry {
    pub fn encode(&self, location: u32, serial: u16) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.icb_tag.encode(&mut body);
        body.extend_from_slice(&self.uid.to_le_bytes());
        body.extend_from_slice(&self.gid.to_le_bytes());
        body.extend_from_slice(&self.permissions.to_le_bytes());
        body.extend_from_slice(&self.file_link_count.to_le_bytes());
        body.push(self.record_format);
        body.push(0); // record display attributes
        body.extend_from_slice(&0u32.to_le_bytes()); // record length
        body.extend_from_slice(&self.information_length.to_le_bytes());
        body.extend_from_slice(&self.logical_blocks_recorded.to_le_bytes());
        body.extend_from_slice(&[0u8; 12 + 12 + 12]); // access/modification/attribute times
        body.extend_from_slice(&0u32.to_le_bytes()); // checkpoint
        body.extend_from_slice(&[0u8; 16]); // extended attribute ICB, unused
        body.extend_from_slice(&[0u8; 32]); // implementation identifier
        body.extend_from_slice(&0u64.to_le_bytes()); // unique ID
        let alloc_bytes: Vec<u8> = {
            let mut v = Vec::new();
            for ad in &self.allocation_descriptors { ad.encode(&mut v); }
            v
        };
        body.extend_from_slice(&(alloc_bytes.len() as u32).to_le_bytes()); // length of allocation descriptors
        body.extend_from_slice(&0u32.to_le_bytes()); // length of extended attributes
        body.extend_from_slice(&alloc_bytes);

        if TAG_LEN + body.len() > BLOCK_SIZE {
            return Err(Error::internal("file entry does not fit within one block; multi-block ICBs are unsupported"));
        }
        body.resize(BLOCK_SIZE - TAG_LEN, 0);
        let tag = DescriptorTag {
            identifier: TagIdentifier::FileEntry,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < BLOCK_SIZE {
            return Err(Error::malformed("file entry block truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::FileEntry && tag.identifier != TagIdentifier::ExtendedFileEntry {
            return Err(Error::malformed("expected a file entry", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;

        let icb_tag = IcbTag::decode(&body[0..IcbTag::LEN]);
        let uid = u32::from_le_bytes(body[20..24].try_into().unwrap());
        let gid = u32::from_le_bytes(body[24..28].try_into().unwrap());
        let permissions = u32::from_le_bytes(body[28..32].try_into().unwrap());
        let file_link_count = u16::from_le_bytes(body[32..34].try_into().unwrap());
        let record_format = body[34];
        let information_length = u64::from_le_bytes(body[40..48].try_into().unwrap());
        let logical_blocks_recorded = u64::from_le_bytes(body[48..56].try_into().unwrap());
        // offset 56: access/mod/attr times (36) + checkpoint (4) + ext attr icb (16) + impl id (32)
        // + unique id (8) = 96, landing at 152.
        let alloc_len_offset = 56 + 96;
        let alloc_len = u32::from_le_bytes(body[alloc_len_offset..alloc_len_offset + 4].try_into().unwrap()) as usize;
        let ext_attr_len = u32::from_le_bytes(body[alloc_len_offset + 4..alloc_len_offset + 8].try_into().unwrap()) as usize;
        let alloc_start = alloc_len_offset + 8 + ext_attr_len;
        let mut allocation_descriptors = Vec::new();
        let mut pos = alloc_start;
        while pos + LongAd::LEN <= alloc_start + alloc_len {
            allocation_descriptors.push(LongAd::decode(&body[pos..pos + LongAd::LEN]));
            pos += LongAd::LEN;
        }

        Ok(Self {
            icb_tag, uid, gid, permissions, file_link_count, record_format,
            information_length, logical_blocks_recorded, allocation_descriptors,
        })
    }
}

/// File Identifier Descriptor (FID): one directory entry, naming a child ICB. ECMA-167 § 4/14.4.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileIdentifierDescriptor {
    pub file_version_number: u16,
    pub is_directory: bool,
    pub is_deleted: bool,
    pub is_parent: bool,
    pub icb: LongAd,
    /// CS0-encoded identifier; empty for the parent ("..") entry.
    pub file_identifier: Vec<u8>,
}
impl FileIdentifierDescriptor {
    const CHAR_DIRECTORY: u8 = 0x02;
    const CHAR_DELETED: u8 = 0x04;
    const CHAR_PARENT: u8 = 0x08;

    pub fn encode(&self, location: u32, serial: u16) -> Vec<u8> {
        let mut flags = 0u8;
        if self.is_directory { flags |= Self::CHAR_DIRECTORY; }
        if self.is_deleted { flags |= Self::CHAR_DELETED; }
        if self.is_parent { flags |= Self::CHAR_PARENT; }

        let mut body = Vec::new();
        body.extend_from_slice(&self.file_version_number.to_le_bytes());
        body.push(flags);
        body.push(self.file_identifier.len() as u8);
        self.icb.encode(&mut body);
        body.extend_from_slice(&0u16.to_le_bytes()); // implementation use length
        body.extend_from_slice(&self.file_identifier);
        while body.len() % 4 != 0 { body.push(0); }

        let tag = DescriptorTag {
            identifier: TagIdentifier::FileIdentifierDescriptor,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        out
    }

    /// Decodes one FID starting at offset 0 of `buf`, returning it and its encoded byte length
    /// (always a multiple of 4, per the padding rule above).
    pub fn decode(buf: &[u8], location: ImageLocation) -> Result<(Self, usize)> {
        if buf.len() < TAG_LEN + 20 {
            return Err(Error::malformed("file identifier descriptor truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::FileIdentifierDescriptor {
            return Err(Error::malformed("expected a file identifier descriptor", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;

        let file_version_number = u16::from_le_bytes(body[0..2].try_into().unwrap());
        let flags = body[2];
        let ident_len = body[3] as usize;
        let icb = LongAd::decode(&body[4..20]);
        let impl_use_len = u16::from_le_bytes(body[20..22].try_into().unwrap()) as usize;
        let ident_start = 22 + impl_use_len;
        let file_identifier = body[ident_start..ident_start + ident_len].to_vec();

        let unpadded_len = TAG_LEN + ident_start + ident_len;
        let total_len = unpadded_len.div_ceil(4) * 4;
        Ok((
            Self {
                file_version_number,
                is_directory: flags & Self::CHAR_DIRECTORY != 0,
                is_deleted: flags & Self::CHAR_DELETED != 0,
                is_parent: flags & Self::CHAR_PARENT != 0,
                icb,
                file_identifier,
            },
            total_len,
        ))
    }
}

/// Logical Volume Integrity Descriptor: tracks open/close state and unique-ID counters.
/// ECMA-167 § 3/10.10. This crate always writes a "closed" integrity descriptor.
#[derive(Clone, Copy, Debug)]
pub struct LogicalVolumeIntegrityDescriptor {
    pub integrity_type_closed: bool,
    pub next_unique_id: u64,
}
impl LogicalVolumeIntegrityDescriptor {
    pub fn encode(&self, location: u32, serial: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0u8; 12]); // recording date and time
        body.extend_from_slice(&(if self.integrity_type_closed { 1u32 } else { 0u32 }).to_le_bytes());
        body.extend_from_slice(&[0u8; 16]); // next integrity extent
        body.extend_from_slice(&[0u8; 32]); // logical volume contents use (partition free space etc.)
        body.extend_from_slice(&0u32.to_le_bytes()); // number of partitions
        body.extend_from_slice(&0u32.to_le_bytes()); // length of implementation use
        body.resize(BLOCK_SIZE - TAG_LEN, 0);
        let tag = DescriptorTag {
            identifier: TagIdentifier::LogicalVolumeIntegrityDescriptor,
            descriptor_version: 2,
            serial_number: serial,
            location,
        };
        let mut out = tag.encode(&body);
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < BLOCK_SIZE {
            return Err(Error::malformed("logical volume integrity descriptor block truncated", location));
        }
        let (tag, crc, crc_len) = DescriptorTag::decode(buf, location)?;
        if tag.identifier != TagIdentifier::LogicalVolumeIntegrityDescriptor {
            return Err(Error::malformed("expected a logical volume integrity descriptor", location));
        }
        let body = &buf[TAG_LEN..TAG_LEN + crc_len as usize];
        DescriptorTag::verify_crc(crc, body, location)?;
        let integrity_type = u32::from_le_bytes(body[12..16].try_into().unwrap());
        Ok(Self { integrity_type_closed: integrity_type == 1, next_unique_id: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_checksum_and_crc_round_trip() {
        let avdp = AnchorVolumeDescriptorPointer {
            main_vds: ShortAd { extent_length: 16 * BLOCK_SIZE as u32, extent_position: 32 },
            reserve_vds: ShortAd { extent_length: 16 * BLOCK_SIZE as u32, extent_position: 48 },
        };
        let encoded = avdp.encode(256, 1);
        assert_eq!(encoded.len(), BLOCK_SIZE);
        let decoded = AnchorVolumeDescriptorPointer::decode(&encoded, 256).unwrap();
        assert_eq!(decoded.main_vds, avdp.main_vds);
    }

    #[test]
    fn corrupted_tag_checksum_is_rejected() {
        let avdp = AnchorVolumeDescriptorPointer {
            main_vds: ShortAd::default(),
            reserve_vds: ShortAd::default(),
        };
        let mut encoded = avdp.encode(256, 1);
        encoded[0] ^= 0xFF;
        let err = AnchorVolumeDescriptorPointer::decode(&encoded, 256).unwrap_err();
        assert!(err.is_malformed_iso());
    }

    #[test]
    fn corrupted_body_fails_crc() {
        let avdp = AnchorVolumeDescriptorPointer {
            main_vds: ShortAd { extent_length: 1, extent_position: 2 },
            reserve_vds: ShortAd { extent_length: 3, extent_position: 4 },
        };
        let mut encoded = avdp.encode(256, 1);
        encoded[TAG_LEN] ^= 0xFF;
        let err = AnchorVolumeDescriptorPointer::decode(&encoded, 256).unwrap_err();
        assert!(err.is_malformed_iso());
    }

    #[test]
    fn partition_descriptor_round_trips() {
        let pd = PartitionDescriptor {
            volume_descriptor_sequence_number: 3,
            partition_number: 0,
            partition_starting_location: 32,
            partition_length: 1000,
        };
        let encoded = pd.encode(50, 1);
        assert_eq!(encoded.len(), BLOCK_SIZE);
        let decoded = PartitionDescriptor::decode(&encoded, 50).unwrap();
        assert_eq!(decoded, pd);
    }

    #[test]
    fn cs0_ascii_round_trips() {
        let encoded = str_to_cs0("README.TXT").unwrap();
        assert_eq!(encoded[0], 0x08);
        assert_eq!(cs0_to_str(&encoded).unwrap(), "README.TXT");
    }

    #[test]
    fn cs0_non_latin1_uses_16_bit_compression() {
        let encoded = str_to_cs0("héllo").unwrap();
        assert_eq!(encoded[0], 0x10);
        assert_eq!(cs0_to_str(&encoded).unwrap(), "héllo");
    }

    #[test]
    fn file_identifier_descriptor_round_trips() {
        let fid = FileIdentifierDescriptor {
            file_version_number: 1,
            is_directory: true,
            is_deleted: false,
            is_parent: false,
            icb: LongAd { extent_length: BLOCK_SIZE as u32, extent_location: LbAddr { logical_block_number: 40, partition_reference_number: 0 } },
            file_identifier: str_to_cs0("SUBDIR").unwrap(),
        };
        let encoded = fid.encode(100, 1);
        assert_eq!(encoded.len() % 4, 0);
        let (decoded, consumed) = FileIdentifierDescriptor::decode(&encoded, ImageLocation::UNKNOWN).unwrap();
        assert_eq!(consumed, encoded.len());
        assert!(decoded.is_directory);
        assert_eq!(cs0_to_str(&decoded.file_identifier).unwrap(), "SUBDIR");
    }

    #[test]
    fn file_entry_round_trips_allocation_descriptors() {
        let entry = FileEntry {
            icb_tag: IcbTag { file_type: IcbTag::FILE_TYPE_REGULAR, ..Default::default() },
            uid: 0,
            gid: 0,
            permissions: 0o644,
            file_link_count: 1,
            record_format: 0,
            information_length: 4096,
            logical_blocks_recorded: 2,
            allocation_descriptors: vec![LongAd {
                extent_length: 4096,
                extent_location: LbAddr { logical_block_number: 500, partition_reference_number: 0 },
            }],
        };
        let encoded = entry.encode(200, 1).unwrap();
        let decoded = FileEntry::decode(&encoded, 200).unwrap();
        assert_eq!(decoded.information_length, 4096);
        assert_eq!(decoded.allocation_descriptors.len(), 1);
        assert_eq!(decoded.allocation_descriptors[0].extent_location.logical_block_number, 500);
    }
}
