//! Fixed-width field encoding for ISO9660/Joliet on-disk structures (C1).
//!
//! LE/BE/both-endian integers, the two on-disk date formats, d-/a-character validation and
//! UCS-2BE transcoding. Kept as plain free functions over `&[u8]`/`Vec<u8>`, the same idiom
//! `expandms::cab::CabHeader::read` uses for its fixed-part buffer.

use crate::error::{Error, ImageLocation, Result};

/// The same value, encoded once as little-endian and once as big-endian.
///
/// Lifted directly from `expandms::iso9660::EndianPair<T>`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EndianPair<T> {
    pub little_endian: T,
    pub big_endian: T,
}

macro_rules! impl_endian_pair_codec {
    ($base:ty, $size:expr) => {
        impl EndianPair<$base> {
            pub fn read(buf: &[u8], location: ImageLocation) -> Result<Self> {
                if buf.len() < $size * 2 {
                    return Err(Error::malformed("both-endian field truncated", location));
                }
                let le = <$base>::from_le_bytes(buf[0..$size].try_into().unwrap());
                let be = <$base>::from_be_bytes(buf[$size..$size * 2].try_into().unwrap());
                if le != be {
                    return Err(Error::malformed(
                        format!("both-endian field mismatch: LE={} BE={}", le, be),
                        location,
                    ));
                }
                Ok(Self { little_endian: le, big_endian: be })
            }

            pub fn write(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.little_endian.to_le_bytes());
                out.extend_from_slice(&self.big_endian.to_be_bytes());
            }

            pub fn of(value: $base) -> Self {
                Self { little_endian: value, big_endian: value }
            }

            pub fn value(&self) -> $base {
                self.little_endian
            }
        }
    };
}
impl_endian_pair_codec!(u16, 2);
impl_endian_pair_codec!(u32, 4);

/// A 7-byte binary "recording date and time", as embedded in a directory record.
///
/// ISO9660 § 9.1.5. The all-zero encoding means "unspecified" and round-trips as such.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordingDate {
    pub years_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub gmt_offset_15min: i8,
}
impl RecordingDate {
    pub const LEN: usize = 7;

    pub const UNSPECIFIED: Self = Self {
        years_since_1900: 0, month: 0, day: 0, hour: 0, minute: 0, second: 0, gmt_offset_15min: 0,
    };

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::malformed("recording date truncated", ImageLocation::UNKNOWN));
        }
        Ok(Self {
            years_since_1900: buf[0],
            month: buf[1],
            day: buf[2],
            hour: buf[3],
            minute: buf[4],
            second: buf[5],
            gmt_offset_15min: buf[6] as i8,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.years_since_1900);
        out.push(self.month);
        out.push(self.day);
        out.push(self.hour);
        out.push(self.minute);
        out.push(self.second);
        out.push(self.gmt_offset_15min as u8);
    }
}

/// A 17-byte textual "date and time", as embedded in a volume descriptor.
///
/// ISO9660 § 8.4.26.1. All digits zero plus a zero GMT offset means "unspecified".
///
/// Grounded on `expandms::iso9660::DigitTimestamp`, narrowed to the ISO9660 (non-High-Sierra)
/// 17-byte shape.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DigitTimestamp {
    pub year: [u8; 4],
    pub month: [u8; 2],
    pub day: [u8; 2],
    pub hour: [u8; 2],
    pub minute: [u8; 2],
    pub second: [u8; 2],
    pub centisecond: [u8; 2],
    pub gmt_offset_15min: i8,
}
impl DigitTimestamp {
    pub const LEN: usize = 17;

    pub const UNSPECIFIED: Self = Self {
        year: *b"0000", month: *b"00", day: *b"00", hour: *b"00", minute: *b"00", second: *b"00",
        centisecond: *b"00", gmt_offset_15min: 0,
    };

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::malformed("volume timestamp truncated", ImageLocation::UNKNOWN));
        }
        Ok(Self {
            year: buf[0..4].try_into().unwrap(),
            month: buf[4..6].try_into().unwrap(),
            day: buf[6..8].try_into().unwrap(),
            hour: buf[8..10].try_into().unwrap(),
            minute: buf[10..12].try_into().unwrap(),
            second: buf[12..14].try_into().unwrap(),
            centisecond: buf[14..16].try_into().unwrap(),
            gmt_offset_15min: buf[16] as i8,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.year);
        out.extend_from_slice(&self.month);
        out.extend_from_slice(&self.day);
        out.extend_from_slice(&self.hour);
        out.extend_from_slice(&self.minute);
        out.extend_from_slice(&self.second);
        out.extend_from_slice(&self.centisecond);
        out.push(self.gmt_offset_15min as u8);
    }
}

/// String of all characters allowed in the set of "d-characters" (ISO9660 § 7.4.1).
pub const D_CHARACTERS_SORTED: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_";

/// String of all characters allowed in the set of "a-characters" (ISO9660 § 7.4.1).
pub const A_CHARACTERS_SORTED: &str = " !\"%&'()*+,-./0123456789:;<=>?ABCDEFGHIJKLMNOPQRSTUVWXYZ_";

pub fn is_d_character(c: char) -> bool {
    D_CHARACTERS_SORTED.contains(c)
}

pub fn is_a_character(c: char) -> bool {
    A_CHARACTERS_SORTED.contains(c)
}

/// Validates that every character of `s` is a d-character.
pub fn validate_d_characters(s: &str) -> Result<()> {
    if let Some(bad) = s.chars().find(|c| !is_d_character(*c)) {
        return Err(Error::invalid_input(format!("character '{}' is not a valid d-character", bad)));
    }
    Ok(())
}

/// Validates that every character of `s` is an a-character.
pub fn validate_a_characters(s: &str) -> Result<()> {
    if let Some(bad) = s.chars().find(|c| !is_a_character(*c)) {
        return Err(Error::invalid_input(format!("character '{}' is not a valid a-character", bad)));
    }
    Ok(())
}

/// Transcodes a native string to UCS-2BE (Joliet file/path identifiers).
///
/// Fails with [`Error::InvalidInput`] on any code point outside the Basic Multilingual Plane, per
/// ISO10646 Level 1/2/3 escape sequences Joliet declares in its SVD.
pub fn str_to_ucs2be(s: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for c in s.chars() {
        let cp = c as u32;
        if cp > 0xFFFF {
            return Err(Error::invalid_input(format!(
                "code point U+{:X} is outside the Basic Multilingual Plane and cannot be encoded in Joliet",
                cp,
            )));
        }
        out.extend_from_slice(&(cp as u16).to_be_bytes());
    }
    Ok(out)
}

/// Transcodes UCS-2BE bytes (Joliet file/path identifiers) back to a native string.
pub fn ucs2be_to_str(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::malformed("UCS-2BE byte sequence has odd length", ImageLocation::UNKNOWN));
    }
    let units: Vec<u16> = bytes.chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|_| Error::malformed("UCS-2BE byte sequence is not valid UTF-16", ImageLocation::UNKNOWN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_endian_round_trips() {
        let pair = EndianPair::of(0x1234_5678u32);
        let mut buf = Vec::new();
        pair.write(&mut buf);
        let read_back = EndianPair::<u32>::read(&buf, ImageLocation::UNKNOWN).unwrap();
        assert_eq!(pair, read_back);
    }

    #[test]
    fn both_endian_mismatch_is_corrupt() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x1111u16.to_le_bytes());
        buf.extend_from_slice(&0x2222u16.to_be_bytes());
        let err = EndianPair::<u16>::read(&buf, ImageLocation::UNKNOWN).unwrap_err();
        assert!(err.is_malformed_iso());
    }

    #[test]
    fn unspecified_date_round_trips() {
        let mut buf = Vec::new();
        RecordingDate::UNSPECIFIED.write(&mut buf);
        assert!(RecordingDate::read(&buf).unwrap().is_unspecified());

        let mut buf = Vec::new();
        DigitTimestamp::UNSPECIFIED.write(&mut buf);
        assert!(DigitTimestamp::read(&buf).unwrap().is_unspecified());
    }

    #[test]
    fn joliet_rejects_non_bmp() {
        let err = str_to_ucs2be("\u{1F600}").unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn ucs2be_round_trips() {
        let encoded = str_to_ucs2be("héllo").unwrap();
        assert_eq!(ucs2be_to_str(&encoded).unwrap(), "héllo");
    }
}
