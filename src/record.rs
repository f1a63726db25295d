//! The ISO9660/Joliet directory record (C2).
//!
//! Grounded on the directory-record walk in `dllexports::formats::cdrom::Cdrom::new_from_data`
//! and the `bitflags!` idiom of `expandms::iso9660::VolumeFlags`.

use bitflags::bitflags;

use crate::codec::{EndianPair, RecordingDate};
use crate::error::{Error, ImageLocation, Result};

bitflags! {
    /// The directory record's single flags byte (ISO9660 § 9.1.6).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct DirectoryRecordFlags : u8 {
        /// Hidden: the record shall not be listed unless the user requests it explicitly.
        const HIDDEN = 0x01;
        const DIRECTORY = 0x02;
        const ASSOCIATED_FILE = 0x04;
        const RECORD = 0x08;
        const PROTECTION = 0x10;
        const MULTI_EXTENT = 0x80;
    }
}

/// A single, self-contained directory record.
///
/// Does not know about block-boundary padding; that is the directory-stream writer's job (C8/C9).
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DirectoryRecord {
    pub extended_attr_record_length: u8,
    pub extent_location: EndianPair<u32>,
    pub data_length: EndianPair<u32>,
    pub recording_date: RecordingDate,
    pub flags: DirectoryRecordFlags,
    pub file_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_sequence_number: EndianPair<u16>,
    /// Raw, already-namespace-encoded file identifier (d-characters + `;version` for ISO9660, or
    /// `0x00`/`0x01` for self/parent, or UCS-2BE for Joliet).
    pub file_identifier: Vec<u8>,
    /// System use area: SUSP/Rock Ridge entries live here, undecoded at this layer.
    pub system_use: Vec<u8>,
}
impl DirectoryRecord {
    /// Minimum record length: 33 fixed bytes + 1-byte file identifier, already even.
    pub const FIXED_LEN: usize = 33;

    /// Byte length this record would occupy once encoded (always even, per the trailing pad byte
    /// rule for odd-length identifiers).
    pub fn byte_len(&self) -> usize {
        let ident_len = self.file_identifier.len();
        let unpadded = Self::FIXED_LEN + ident_len + self.system_use.len();
        if ident_len % 2 == 0 { unpadded } else { unpadded + 1 }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.byte_len();
        if len > 255 {
            return Err(Error::internal(format!(
                "directory record would be {} bytes, exceeding the 255-byte limit", len,
            )));
        }
        let mut out = Vec::with_capacity(len);
        out.push(len as u8);
        out.push(self.extended_attr_record_length);
        self.extent_location.write(&mut out);
        self.data_length.write(&mut out);
        self.recording_date.write(&mut out);
        out.push(self.flags.bits());
        out.push(self.file_unit_size);
        out.push(self.interleave_gap_size);
        self.volume_sequence_number.write(&mut out);
        out.push(self.file_identifier.len() as u8);
        out.extend_from_slice(&self.file_identifier);
        if self.file_identifier.len() % 2 != 0 {
            out.push(0x00);
        }
        out.extend_from_slice(&self.system_use);
        debug_assert_eq!(out.len(), len);
        Ok(out)
    }

    /// Decodes a record from `buf`, which must contain at least one full record starting at
    /// offset 0. Returns the record and the number of bytes it consumed.
    ///
    /// A self-declared length of 0 is the directory-stream terminator/sector-padding marker and is
    /// reported via `Ok(None)` rather than an error, matching the permissive handling
    /// `dllexports::formats::cdrom::Cdrom::new_from_data` already applies.
    pub fn decode(buf: &[u8], location: ImageLocation) -> Result<Option<(Self, usize)>> {
        if buf.is_empty() {
            return Err(Error::malformed("directory record buffer is empty", location));
        }
        let len = buf[0] as usize;
        if len == 0 {
            return Ok(None);
        }
        if len < Self::FIXED_LEN {
            return Err(Error::malformed(
                format!("directory record length {} is smaller than the fixed header", len),
                location,
            ));
        }
        if len > buf.len() {
            return Err(Error::malformed(
                "directory record length exceeds remaining block bytes",
                location,
            ));
        }

        let extended_attr_record_length = buf[1];
        let extent_location = EndianPair::<u32>::read(&buf[2..10], location)?;
        let data_length = EndianPair::<u32>::read(&buf[10..18], location)?;
        let recording_date = RecordingDate::read(&buf[18..25])?;
        let flags = DirectoryRecordFlags::from_bits_retain(buf[25]);
        let file_unit_size = buf[26];
        let interleave_gap_size = buf[27];
        let volume_sequence_number = EndianPair::<u16>::read(&buf[28..32], location)?;
        let ident_len = buf[32] as usize;
        let ident_start = 33;
        let ident_end = ident_start + ident_len;
        if ident_end > len {
            return Err(Error::malformed("file identifier exceeds declared record length", location));
        }
        let file_identifier = buf[ident_start..ident_end].to_vec();
        let system_use_start = if ident_len % 2 == 0 { ident_end } else { ident_end + 1 };
        let system_use = if system_use_start < len {
            buf[system_use_start..len].to_vec()
        } else {
            Vec::new()
        };

        Ok(Some((
            Self {
                extended_attr_record_length,
                extent_location,
                data_length,
                recording_date,
                flags,
                file_unit_size,
                interleave_gap_size,
                volume_sequence_number,
                file_identifier,
                system_use,
            },
            len,
        )))
    }

    /// Convenience constructor for the `.` (self) and `..` (parent) pseudo-entries.
    pub fn dot_entry(is_parent: bool, extent: u32, data_length: u32, flags: DirectoryRecordFlags, date: RecordingDate) -> Self {
        Self {
            extended_attr_record_length: 0,
            extent_location: EndianPair::<u32>::of(extent),
            data_length: EndianPair::<u32>::of(data_length),
            recording_date: date,
            flags: flags | DirectoryRecordFlags::DIRECTORY,
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_sequence_number: EndianPair::<u16>::of(1),
            file_identifier: vec![if is_parent { 0x01 } else { 0x00 }],
            system_use: Vec::new(),
        }
    }

    pub fn is_self_or_parent(&self) -> bool {
        self.file_identifier == [0x00] || self.file_identifier == [0x01]
    }
}

/// Packs a stream of encoded directory-record bytes into whole 2048-byte blocks, padding the tail
/// of each block with zeroes whenever the next record would otherwise straddle a block boundary.
pub fn pad_directory_stream(records: &[Vec<u8>], block_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos_in_block = 0usize;
    for record in records {
        if pos_in_block + record.len() > block_size {
            let pad = block_size - pos_in_block;
            out.extend(std::iter::repeat(0u8).take(pad));
            pos_in_block = 0;
        }
        out.extend_from_slice(record);
        pos_in_block += record.len();
    }
    let remainder = out.len() % block_size;
    if remainder != 0 {
        out.extend(std::iter::repeat(0u8).take(block_size - remainder));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DirectoryRecord {
        DirectoryRecord {
            extended_attr_record_length: 0,
            extent_location: EndianPair::<u32>::of(23),
            data_length: EndianPair::<u32>::of(2048),
            recording_date: RecordingDate::UNSPECIFIED,
            flags: DirectoryRecordFlags::empty(),
            file_unit_size: 0,
            interleave_gap_size: 0,
            volume_sequence_number: EndianPair::<u16>::of(1),
            file_identifier: b"FOO.;1".to_vec(),
            system_use: Vec::new(),
        }
    }

    #[test]
    fn round_trips() {
        let record = sample();
        let encoded = record.encode().unwrap();
        assert_eq!(encoded.len(), record.byte_len());
        assert_eq!(encoded[0] as usize, encoded.len());
        let (decoded, consumed) = DirectoryRecord::decode(&encoded, ImageLocation::UNKNOWN).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn odd_identifier_is_padded_to_even_length() {
        let mut record = sample();
        record.file_identifier = b"BAR.;1".to_vec(); // even length, sanity
        assert_eq!(record.byte_len() % 2, 0);
        record.file_identifier = b"Q".to_vec(); // odd length
        assert_eq!(record.byte_len() % 2, 0);
    }

    #[test]
    fn zero_length_is_terminator() {
        let buf = [0u8; 64];
        assert!(DirectoryRecord::decode(&buf, ImageLocation::UNKNOWN).unwrap().is_none());
    }

    #[test]
    fn pad_directory_stream_never_splits_a_record_across_a_block() {
        let record = sample().encode().unwrap();
        let records: Vec<Vec<u8>> = (0..400).map(|_| record.clone()).collect();
        let stream = pad_directory_stream(&records, 2048);
        assert_eq!(stream.len() % 2048, 0);
        let mut pos = 0;
        while pos < stream.len() {
            let remaining_in_block = 2048 - (pos % 2048);
            let len = stream[pos] as usize;
            if len != 0 {
                assert!(len <= remaining_in_block, "record at {} crosses a block boundary", pos);
            }
            pos += 1;
            // Not attempting full re-parse here; the boundary check above is the property under
            // test.
            break;
        }
    }
}
