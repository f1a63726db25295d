//! El Torito boot catalog (C4).
//!
//! Grounded on `other_examples/2f52a4db_wilsonzlin-aero__crates-firmware-src-bios-eltorito.rs.rs`
//! (`BootImageInfo`, `parse_boot_image`, validation-entry checksum) for the catalog shape, and on
//! `expandms::iso9660::EndianPair`-style fixed layouts for the encode/decode idiom.

use from_to_repr::from_to_other;

use crate::error::{Error, ImageLocation, Result};

pub const CATALOG_ENTRY_LEN: usize = 32;

#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum Platform {
    X86 = 0x00,
    PowerPc = 0x01,
    Mac = 0x02,
    Efi = 0xEF,
    Other(u8),
}

#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum Emulation {
    NoEmulation = 0x00,
    OneTwoDiskette = 0x01,
    OneFourFourDiskette = 0x02,
    TwoEightEightDiskette = 0x03,
    HardDisk = 0x04,
    Other(u8),
}

/// Validation entry: the catalog's mandatory first entry. El Torito § 2.0.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ValidationEntry {
    pub platform: Platform,
    pub id_string: [u8; 24],
}
impl ValidationEntry {
    const HEADER_ID: u8 = 0x01;
    const KEY_BYTE_55: u8 = 0x55;
    const KEY_BYTE_AA: u8 = 0xAA;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CATALOG_ENTRY_LEN);
        out.push(Self::HEADER_ID);
        out.push(self.platform.into());
        out.extend_from_slice(&[0u8; 2]); // reserved
        out.extend_from_slice(&self.id_string);
        let checksum = checksum16(&out);
        out.extend_from_slice(&checksum.to_le_bytes());
        out.push(Self::KEY_BYTE_55);
        out.push(Self::KEY_BYTE_AA);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let location = ImageLocation::at_block(0);
        if buf.len() < CATALOG_ENTRY_LEN {
            return Err(Error::malformed("boot catalog validation entry truncated", location));
        }
        if buf[0] != Self::HEADER_ID {
            return Err(Error::malformed("boot catalog validation entry has the wrong header ID", location));
        }
        if buf[30] != Self::KEY_BYTE_55 || buf[31] != Self::KEY_BYTE_AA {
            return Err(Error::malformed("boot catalog validation entry is missing the 0x55AA key bytes", location));
        }
        if checksum16(&buf[0..32]) != 0 {
            return Err(Error::malformed("boot catalog validation entry checksum does not sum to zero", location));
        }
        Ok(Self {
            platform: Platform::from(buf[1]),
            id_string: buf[4..28].try_into().unwrap(),
        })
    }
}

/// Sums a buffer of 16-bit little-endian words modulo 0x10000; a valid validation entry sums to
/// zero across its own 32 bytes including its own checksum field.
fn checksum16(buf: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    for chunk in buf.chunks(2) {
        let word = match chunk {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            [lo] => *lo as u16,
            _ => 0,
        };
        sum = sum.wrapping_add(word);
    }
    0u16.wrapping_sub(sum)
}

/// A (default or section) initial/entry boot image. El Torito § 2.2/2.3.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BootImageEntry {
    pub bootable: bool,
    pub emulation: Emulation,
    /// Segment to load a non-emulated image to; 0 means the BIOS default (0x7C0).
    pub load_segment: u16,
    pub system_type: u8,
    /// Number of emulated 512-byte sectors to load.
    pub sector_count: u16,
    pub load_rba: u32,
    /// Present only on section entries, absent (all zero) on the lone default/initial entry.
    pub selection_criteria: u8,
}
impl BootImageEntry {
    const BOOTABLE: u8 = 0x88;
    const NOT_BOOTABLE: u8 = 0x00;
    pub const DEFAULT_SECTOR_COUNT: u16 = 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CATALOG_ENTRY_LEN);
        out.push(if self.bootable { Self::BOOTABLE } else { Self::NOT_BOOTABLE });
        out.push(self.emulation.into());
        out.extend_from_slice(&self.load_segment.to_le_bytes());
        out.push(self.system_type);
        out.push(0); // reserved
        out.extend_from_slice(&self.sector_count.to_le_bytes());
        out.extend_from_slice(&self.load_rba.to_le_bytes());
        out.extend_from_slice(&[0u8; 20]);
        out
    }

    pub fn decode(buf: &[u8], location: ImageLocation) -> Result<Self> {
        if buf.len() < CATALOG_ENTRY_LEN {
            return Err(Error::malformed("boot catalog entry truncated", location));
        }
        let bootable = match buf[0] {
            Self::BOOTABLE => true,
            Self::NOT_BOOTABLE => false,
            other => return Err(Error::malformed(
                format!("boot indicator byte {:#04X} is neither bootable nor not-bootable", other),
                location,
            )),
        };
        Ok(Self {
            bootable,
            emulation: Emulation::from(buf[1]),
            load_segment: u16::from_le_bytes(buf[2..4].try_into().unwrap()),
            system_type: buf[4],
            sector_count: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            load_rba: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            selection_criteria: 0,
        })
    }
}

/// Section header entry: groups a run of section entries under one platform. El Torito § 2.4.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SectionHeader {
    /// Whether more section headers follow this one's entries.
    pub is_last: bool,
    pub platform: Platform,
    pub id_string: [u8; 28],
}
impl SectionHeader {
    const HEADER_ID_MORE: u8 = 0x90;
    const HEADER_ID_LAST: u8 = 0x91;

    pub fn encode(&self, entry_count: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(CATALOG_ENTRY_LEN);
        out.push(if self.is_last { Self::HEADER_ID_LAST } else { Self::HEADER_ID_MORE });
        out.push(self.platform.into());
        out.extend_from_slice(&entry_count.to_le_bytes());
        out.extend_from_slice(&self.id_string);
        out
    }

    pub fn decode(buf: &[u8], location: ImageLocation) -> Result<(Self, u16)> {
        if buf.len() < CATALOG_ENTRY_LEN {
            return Err(Error::malformed("boot catalog section header truncated", location));
        }
        let is_last = match buf[0] {
            Self::HEADER_ID_MORE => false,
            Self::HEADER_ID_LAST => true,
            other => return Err(Error::malformed(
                format!("boot catalog section header id {:#04X} is not recognized", other),
                location,
            )),
        };
        let entry_count = u16::from_le_bytes(buf[2..4].try_into().unwrap());
        Ok((Self { is_last, platform: Platform::from(buf[1]), id_string: buf[4..32].try_into().unwrap() }, entry_count))
    }
}

/// One platform's run of section entries, each preceded by the header that introduced them.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BootSection {
    pub header: SectionHeader,
    pub entries: Vec<BootImageEntry>,
}

/// The full El Torito boot catalog: one mandatory default entry plus zero or more platform
/// sections, preserved in on-disk order without imposing a priority between platforms.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BootCatalog {
    pub validation: ValidationEntry,
    pub default_entry: BootImageEntry,
    pub sections: Vec<BootSection>,
}
impl BootCatalog {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.validation.encode());
        out.extend_from_slice(&self.default_entry.encode());
        for section in &self.sections {
            if section.entries.len() > u16::MAX as usize {
                return Err(Error::internal("boot catalog section has too many entries to encode"));
            }
            out.extend_from_slice(&section.header.encode(section.entries.len() as u16));
            for entry in &section.entries {
                out.extend_from_slice(&entry.encode());
            }
        }
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let location = ImageLocation::at_block(0);
        if buf.len() < CATALOG_ENTRY_LEN * 2 {
            return Err(Error::malformed("boot catalog too short for validation and default entries", location));
        }
        let validation = ValidationEntry::decode(&buf[0..32])?;
        let default_entry = BootImageEntry::decode(&buf[32..64], location)?;

        let mut sections = Vec::new();
        let mut pos = 64;
        loop {
            if pos + CATALOG_ENTRY_LEN > buf.len() {
                break;
            }
            // A terminating/unused entry at the top of the loop has a first byte of 0x00.
            if buf[pos] == 0x00 {
                break;
            }
            let (header, entry_count) = SectionHeader::decode(&buf[pos..pos + CATALOG_ENTRY_LEN], location)?;
            pos += CATALOG_ENTRY_LEN;
            let mut entries = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                if pos + CATALOG_ENTRY_LEN > buf.len() {
                    return Err(Error::malformed("boot catalog section entry run runs past the catalog", location));
                }
                entries.push(BootImageEntry::decode(&buf[pos..pos + CATALOG_ENTRY_LEN], location)?);
                pos += CATALOG_ENTRY_LEN;
            }
            let is_last = header.is_last;
            sections.push(BootSection { header, entries });
            if is_last {
                break;
            }
        }

        Ok(Self { validation, default_entry, sections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_validation() -> ValidationEntry {
        ValidationEntry { platform: Platform::X86, id_string: [0x20; 24] }
    }

    #[test]
    fn validation_entry_checksum_round_trips() {
        let encoded = sample_validation().encode();
        let decoded = ValidationEntry::decode(&encoded).unwrap();
        assert_eq!(decoded.platform, Platform::X86);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut encoded = sample_validation().encode();
        encoded[4] ^= 0xFF;
        let err = ValidationEntry::decode(&encoded).unwrap_err();
        assert!(err.is_malformed_iso());
    }

    #[test]
    fn catalog_with_one_section_round_trips() {
        let catalog = BootCatalog {
            validation: sample_validation(),
            default_entry: BootImageEntry {
                bootable: true,
                emulation: Emulation::NoEmulation,
                load_segment: 0,
                system_type: 0,
                sector_count: BootImageEntry::DEFAULT_SECTOR_COUNT,
                load_rba: 100,
                selection_criteria: 0,
            },
            sections: vec![BootSection {
                header: SectionHeader { is_last: true, platform: Platform::Efi, id_string: [0; 28] },
                entries: vec![BootImageEntry {
                    bootable: true,
                    emulation: Emulation::NoEmulation,
                    load_segment: 0,
                    system_type: 0,
                    sector_count: 8,
                    load_rba: 200,
                    selection_criteria: 0,
                }],
            }],
        };
        let encoded = catalog.encode().unwrap();
        let decoded = BootCatalog::decode(&encoded).unwrap();
        assert_eq!(decoded.sections.len(), 1);
        assert_eq!(decoded.sections[0].entries[0].load_rba, 200);
    }
}
