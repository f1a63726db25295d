//! ISO9660/Joliet volume descriptors (C4).
//!
//! Grounded on `expandms::iso9660::VolumeDescriptor`/`PartitionDescriptor`/`VolumeFlags`, narrowed
//! to the pure-ISO9660 (no High Sierra) shape and generalized with `read`/`write` methods.

use bitflags::bitflags;
use from_to_repr::from_to_other;

use crate::codec::{DigitTimestamp, EndianPair};
use crate::error::{Error, ImageLocation, Result};
use crate::record::DirectoryRecord;

pub const LOGICAL_BLOCK_SIZE: usize = 2048;
pub const VOLUME_DESCRIPTOR_SET_START_BLOCK: u32 = 16;

pub const STANDARD_IDENTIFIER: [u8; 5] = *b"CD001";

/// Joliet SVD escape sequences (ECMA-157/ISO10646 UCS-2 levels 1-3).
pub const JOLIET_ESCAPE_LEVEL_1: [u8; 3] = [0x25, 0x2F, 0x40];
pub const JOLIET_ESCAPE_LEVEL_2: [u8; 3] = [0x25, 0x2F, 0x43];
pub const JOLIET_ESCAPE_LEVEL_3: [u8; 3] = [0x25, 0x2F, 0x45];

#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum DescriptorType {
    BootRecord = 0x00,
    Primary = 0x01,
    Supplementary = 0x02,
    VolumePartition = 0x03,
    SetTerminator = 0xFF,
    Other(u8),
}
impl Default for DescriptorType {
    fn default() -> Self { Self::SetTerminator }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct VolumeFlags : u8 {
        /// `escape_sequences` contains at least one ISO2375-unregistered escape sequence.
        const CONTAINS_NON_ISO_2375_ESCAPE_SEQUENCE = 0x01;
    }
}

fn pad_d(s: &str, len: usize) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.resize(len, b' ');
    out.truncate(len);
    out
}

/// Primary or Supplementary (Joliet) Volume Descriptor. ISO9660 § 8.4 / § 8.5.
///
/// Both flavors share this shape; [`VolumeDescriptor::is_joliet`] tells them apart by escape
/// sequence, the same way `expandms::iso9660::VolumeDescriptor` doubles as both SFS/CCSFS and
/// Primary/Supplementary depending on `vd_type`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PrimaryOrSupplementaryDescriptor {
    pub descriptor_type: DescriptorType,
    pub version: u8,
    pub flags: VolumeFlags,
    pub system_identifier: [u8; 32],
    pub volume_identifier: [u8; 32],
    pub volume_space_size: EndianPair<u32>,
    pub escape_sequences: [u8; 32],
    pub volume_set_size: EndianPair<u16>,
    pub volume_sequence_number: EndianPair<u16>,
    pub logical_block_size: EndianPair<u16>,
    pub path_table_size: EndianPair<u32>,
    pub le_path_table_location: u32,
    pub le_path_table_backup_location: u32,
    pub be_path_table_location: u32,
    pub be_path_table_backup_location: u32,
    pub root_directory_record: DirectoryRecord,
    pub volume_set_identifier: [u8; 128],
    pub publisher_identifier: [u8; 128],
    pub data_preparer_identifier: [u8; 128],
    pub application_identifier: [u8; 128],
    pub copyright_file_identifier: [u8; 37],
    pub abstract_file_identifier: [u8; 37],
    pub bibliographic_file_identifier: [u8; 37],
    pub volume_creation_timestamp: DigitTimestamp,
    pub volume_modification_timestamp: DigitTimestamp,
    pub volume_expiration_timestamp: DigitTimestamp,
    pub volume_effective_timestamp: DigitTimestamp,
    pub file_structure_version: u8,
    pub application_use: [u8; 512],
}
impl PrimaryOrSupplementaryDescriptor {
    pub fn is_joliet(&self) -> bool {
        self.descriptor_type == DescriptorType::Supplementary
            && matches!(
                self.escape_sequences[0..3].try_into().unwrap_or([0u8; 3]),
                JOLIET_ESCAPE_LEVEL_1 | JOLIET_ESCAPE_LEVEL_2 | JOLIET_ESCAPE_LEVEL_3
            )
    }

    pub fn set_identifier(s: &str, buf: &mut [u8]) {
        buf.copy_from_slice(&pad_d(s, buf.len()));
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(LOGICAL_BLOCK_SIZE);
        out.push(self.descriptor_type.into());
        out.extend_from_slice(&STANDARD_IDENTIFIER);
        out.push(self.version);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.system_identifier);
        out.extend_from_slice(&self.volume_identifier);
        out.extend(std::iter::repeat(0u8).take(8)); // reserved
        self.volume_space_size.write(&mut out);
        out.extend_from_slice(&self.escape_sequences);
        self.volume_set_size.write(&mut out);
        self.volume_sequence_number.write(&mut out);
        self.logical_block_size.write(&mut out);
        self.path_table_size.write(&mut out);
        out.extend_from_slice(&self.le_path_table_location.to_le_bytes());
        out.extend_from_slice(&self.le_path_table_backup_location.to_le_bytes());
        out.extend_from_slice(&self.be_path_table_location.to_be_bytes());
        out.extend_from_slice(&self.be_path_table_backup_location.to_be_bytes());
        out.extend_from_slice(&self.root_directory_record.encode()?);
        // Directory record for the root must be padded out to 34 bytes in the fixed field.
        out.resize(out.len() + (34usize.saturating_sub(self.root_directory_record.byte_len())), 0);
        out.extend_from_slice(&self.volume_set_identifier);
        out.extend_from_slice(&self.publisher_identifier);
        out.extend_from_slice(&self.data_preparer_identifier);
        out.extend_from_slice(&self.application_identifier);
        out.extend_from_slice(&self.copyright_file_identifier);
        out.extend_from_slice(&self.abstract_file_identifier);
        out.extend_from_slice(&self.bibliographic_file_identifier);
        self.volume_creation_timestamp.write(&mut out);
        self.volume_modification_timestamp.write(&mut out);
        self.volume_expiration_timestamp.write(&mut out);
        self.volume_effective_timestamp.write(&mut out);
        out.push(self.file_structure_version);
        out.push(0); // reserved
        out.extend_from_slice(&self.application_use);
        out.resize(LOGICAL_BLOCK_SIZE, 0);
        Ok(out)
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < LOGICAL_BLOCK_SIZE {
            return Err(Error::malformed("volume descriptor block truncated", location));
        }
        if &buf[1..6] != &STANDARD_IDENTIFIER {
            return Err(Error::malformed("volume descriptor standard identifier mismatch", location));
        }
        let descriptor_type = DescriptorType::from(buf[0]);
        let version = buf[6];
        let flags = VolumeFlags::from_bits_retain(buf[7]);
        let system_identifier = buf[8..40].try_into().unwrap();
        let volume_identifier = buf[40..72].try_into().unwrap();
        let volume_space_size = EndianPair::<u32>::read(&buf[80..88], location)?;
        let escape_sequences = buf[88..120].try_into().unwrap();
        let volume_set_size = EndianPair::<u16>::read(&buf[120..124], location)?;
        let volume_sequence_number = EndianPair::<u16>::read(&buf[124..128], location)?;
        let logical_block_size = EndianPair::<u16>::read(&buf[128..132], location)?;
        let path_table_size = EndianPair::<u32>::read(&buf[132..140], location)?;
        let le_path_table_location = u32::from_le_bytes(buf[140..144].try_into().unwrap());
        let le_path_table_backup_location = u32::from_le_bytes(buf[144..148].try_into().unwrap());
        let be_path_table_location = u32::from_be_bytes(buf[148..152].try_into().unwrap());
        let be_path_table_backup_location = u32::from_be_bytes(buf[152..156].try_into().unwrap());
        let (root_directory_record, _) = DirectoryRecord::decode(&buf[156..190], location)?
            .ok_or_else(|| Error::malformed("root directory record is empty", location))?;
        let volume_set_identifier = buf[190..318].try_into().unwrap();
        let publisher_identifier = buf[318..446].try_into().unwrap();
        let data_preparer_identifier = buf[446..574].try_into().unwrap();
        let application_identifier = buf[574..702].try_into().unwrap();
        let copyright_file_identifier = buf[702..739].try_into().unwrap();
        let abstract_file_identifier = buf[739..776].try_into().unwrap();
        let bibliographic_file_identifier = buf[776..813].try_into().unwrap();
        let volume_creation_timestamp = DigitTimestamp::read(&buf[813..830])?;
        let volume_modification_timestamp = DigitTimestamp::read(&buf[830..847])?;
        let volume_expiration_timestamp = DigitTimestamp::read(&buf[847..864])?;
        let volume_effective_timestamp = DigitTimestamp::read(&buf[864..881])?;
        let file_structure_version = buf[881];
        let application_use = buf[883..1395].try_into().unwrap();

        Ok(Self {
            descriptor_type, version, flags, system_identifier, volume_identifier,
            volume_space_size, escape_sequences, volume_set_size, volume_sequence_number,
            logical_block_size, path_table_size, le_path_table_location,
            le_path_table_backup_location, be_path_table_location, be_path_table_backup_location,
            root_directory_record, volume_set_identifier, publisher_identifier,
            data_preparer_identifier, application_identifier, copyright_file_identifier,
            abstract_file_identifier, bibliographic_file_identifier, volume_creation_timestamp,
            volume_modification_timestamp, volume_expiration_timestamp, volume_effective_timestamp,
            file_structure_version, application_use,
        })
    }
}

/// Boot Record Volume Descriptor. ISO9660 § 8.2; carries the El Torito boot catalog pointer.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BootRecordDescriptor {
    pub boot_system_identifier: [u8; 32],
    pub boot_identifier: [u8; 32],
    pub boot_catalog_extent: u32,
}
impl BootRecordDescriptor {
    pub const EL_TORITO_SYSTEM_IDENTIFIER: &'static [u8] = b"EL TORITO SPECIFICATION";

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LOGICAL_BLOCK_SIZE);
        out.push(DescriptorType::BootRecord.into());
        out.extend_from_slice(&STANDARD_IDENTIFIER);
        out.push(1);
        out.extend_from_slice(&self.boot_system_identifier);
        out.extend_from_slice(&self.boot_identifier);
        out.extend_from_slice(&self.boot_catalog_extent.to_le_bytes());
        out.resize(LOGICAL_BLOCK_SIZE, 0);
        out
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < LOGICAL_BLOCK_SIZE {
            return Err(Error::malformed("boot record block truncated", location));
        }
        Ok(Self {
            boot_system_identifier: buf[7..39].try_into().unwrap(),
            boot_identifier: buf[39..71].try_into().unwrap(),
            boot_catalog_extent: u32::from_le_bytes(buf[71..75].try_into().unwrap()),
        })
    }

    pub fn is_el_torito(&self) -> bool {
        self.boot_system_identifier.starts_with(Self::EL_TORITO_SYSTEM_IDENTIFIER)
    }

    pub fn el_torito(boot_catalog_extent: u32) -> Self {
        let mut boot_system_identifier = [0x20u8; 32];
        boot_system_identifier[..Self::EL_TORITO_SYSTEM_IDENTIFIER.len()]
            .copy_from_slice(Self::EL_TORITO_SYSTEM_IDENTIFIER);
        Self { boot_system_identifier, boot_identifier: [0u8; 32], boot_catalog_extent }
    }
}

/// Volume Partition Descriptor. ISO9660 § 8.6.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VolumePartitionDescriptor {
    pub system_identifier: [u8; 32],
    pub partition_identifier: [u8; 32],
    pub partition_location: EndianPair<u32>,
    pub partition_size: EndianPair<u32>,
}
impl VolumePartitionDescriptor {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LOGICAL_BLOCK_SIZE);
        out.push(DescriptorType::VolumePartition.into());
        out.extend_from_slice(&STANDARD_IDENTIFIER);
        out.push(1);
        out.push(0); // reserved
        out.extend_from_slice(&self.system_identifier);
        out.extend_from_slice(&self.partition_identifier);
        self.partition_location.write(&mut out);
        self.partition_size.write(&mut out);
        out.resize(LOGICAL_BLOCK_SIZE, 0);
        out
    }

    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        let location = ImageLocation::at_block(block);
        if buf.len() < LOGICAL_BLOCK_SIZE {
            return Err(Error::malformed("volume partition block truncated", location));
        }
        Ok(Self {
            system_identifier: buf[8..40].try_into().unwrap(),
            partition_identifier: buf[40..72].try_into().unwrap(),
            partition_location: EndianPair::<u32>::read(&buf[72..80], location)?,
            partition_size: EndianPair::<u32>::read(&buf[80..88], location)?,
        })
    }
}

/// The full set of volume descriptors an image carries, in on-disk order.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VolumeDescriptor {
    Primary(PrimaryOrSupplementaryDescriptor),
    BootRecord(BootRecordDescriptor),
    Supplementary(PrimaryOrSupplementaryDescriptor),
    Partition(VolumePartitionDescriptor),
    Terminator,
}
impl VolumeDescriptor {
    pub fn decode(buf: &[u8], block: u32) -> Result<Self> {
        if buf.is_empty() {
            return Err(Error::malformed("empty volume descriptor block", ImageLocation::at_block(block)));
        }
        match DescriptorType::from(buf[0]) {
            DescriptorType::Primary => Ok(Self::Primary(PrimaryOrSupplementaryDescriptor::decode(buf, block)?)),
            DescriptorType::Supplementary => Ok(Self::Supplementary(PrimaryOrSupplementaryDescriptor::decode(buf, block)?)),
            DescriptorType::BootRecord => Ok(Self::BootRecord(BootRecordDescriptor::decode(buf, block)?)),
            DescriptorType::VolumePartition => Ok(Self::Partition(VolumePartitionDescriptor::decode(buf, block)?)),
            DescriptorType::SetTerminator => Ok(Self::Terminator),
            DescriptorType::Other(other) => Err(Error::malformed(
                format!("unrecognized volume descriptor type {:#04X}", other),
                ImageLocation::at_block(block),
            )),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Primary(pvd) | Self::Supplementary(pvd) => pvd.encode(),
            Self::BootRecord(brd) => Ok(brd.encode()),
            Self::Partition(vpd) => Ok(vpd.encode()),
            Self::Terminator => {
                let mut out = Vec::with_capacity(LOGICAL_BLOCK_SIZE);
                out.push(DescriptorType::SetTerminator.into());
                out.extend_from_slice(&STANDARD_IDENTIFIER);
                out.push(1);
                out.resize(LOGICAL_BLOCK_SIZE, 0);
                Ok(out)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DirectoryRecordFlags;

    fn blank_pvd() -> PrimaryOrSupplementaryDescriptor {
        PrimaryOrSupplementaryDescriptor {
            descriptor_type: DescriptorType::Primary,
            version: 1,
            flags: VolumeFlags::empty(),
            system_identifier: [0x20; 32],
            volume_identifier: pad_d("MYVOL", 32).try_into().unwrap(),
            volume_space_size: EndianPair::<u32>::of(100),
            escape_sequences: [0; 32],
            volume_set_size: EndianPair::<u16>::of(1),
            volume_sequence_number: EndianPair::<u16>::of(1),
            logical_block_size: EndianPair::<u16>::of(2048),
            path_table_size: EndianPair::<u32>::of(10),
            le_path_table_location: 19,
            le_path_table_backup_location: 20,
            be_path_table_location: 21,
            be_path_table_backup_location: 22,
            root_directory_record: DirectoryRecord::dot_entry(
                false, 23, 2048, DirectoryRecordFlags::empty(), crate::codec::RecordingDate::UNSPECIFIED,
            ),
            volume_set_identifier: [0x20; 128],
            publisher_identifier: [0x20; 128],
            data_preparer_identifier: [0x20; 128],
            application_identifier: [0x20; 128],
            copyright_file_identifier: [0x20; 37],
            abstract_file_identifier: [0x20; 37],
            bibliographic_file_identifier: [0x20; 37],
            volume_creation_timestamp: DigitTimestamp::UNSPECIFIED,
            volume_modification_timestamp: DigitTimestamp::UNSPECIFIED,
            volume_expiration_timestamp: DigitTimestamp::UNSPECIFIED,
            volume_effective_timestamp: DigitTimestamp::UNSPECIFIED,
            file_structure_version: 1,
            application_use: [0; 512],
        }
    }

    #[test]
    fn pvd_round_trips() {
        let pvd = blank_pvd();
        let encoded = pvd.encode().unwrap();
        assert_eq!(encoded.len(), LOGICAL_BLOCK_SIZE);
        let decoded = PrimaryOrSupplementaryDescriptor::decode(&encoded, 16).unwrap();
        assert_eq!(decoded.descriptor_type, DescriptorType::Primary);
        assert_eq!(decoded.volume_space_size, pvd.volume_space_size);
        assert_eq!(decoded.root_directory_record.extent_location, pvd.root_directory_record.extent_location);
    }

    #[test]
    fn joliet_detected_by_escape_sequence() {
        let mut svd = blank_pvd();
        svd.descriptor_type = DescriptorType::Supplementary;
        svd.escape_sequences[0..3].copy_from_slice(&JOLIET_ESCAPE_LEVEL_3);
        assert!(svd.is_joliet());
    }

    #[test]
    fn terminator_round_trips() {
        let encoded = VolumeDescriptor::Terminator.encode().unwrap();
        let decoded = VolumeDescriptor::decode(&encoded, 17).unwrap();
        assert_eq!(decoded, VolumeDescriptor::Terminator);
    }
}
