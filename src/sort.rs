//! Per-namespace directory-entry ordering (C6/C8).
//!
//! ISO9660 pads to equal length with `0x20` and compares byte-wise; Joliet pads with `0x0000` and
//! compares 16-bit units big-endian; UDF compares its CS0 bytes directly. Grounded on the same
//! plain-comparator style `dllexports::formats::cdrom` uses for its `BTreeMap<PathBuf, _>` key
//! ordering, specialized per namespace instead of relying on `PathBuf`'s own `Ord`.

use std::cmp::Ordering;

use crate::path::Namespace;

pub fn compare_encoded_names(namespace: Namespace, a: &[u8], b: &[u8]) -> Ordering {
    match namespace {
        Namespace::Iso9660 | Namespace::RockRidge => compare_padded(a, b, 0x20),
        Namespace::Joliet => compare_ucs2_padded(a, b),
        Namespace::Udf => a.cmp(b),
    }
}

fn compare_padded(a: &[u8], b: &[u8], pad: u8) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let byte_a = a.get(i).copied().unwrap_or(pad);
        let byte_b = b.get(i).copied().unwrap_or(pad);
        match byte_a.cmp(&byte_b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn compare_ucs2_padded(a: &[u8], b: &[u8]) -> Ordering {
    let units_a: Vec<u16> = a.chunks(2).map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { c[0] as u16 }).collect();
    let units_b: Vec<u16> = b.chunks(2).map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { c[0] as u16 }).collect();
    let len = units_a.len().max(units_b.len());
    for i in 0..len {
        let unit_a = units_a.get(i).copied().unwrap_or(0);
        let unit_b = units_b.get(i).copied().unwrap_or(0);
        match unit_a.cmp(&unit_b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso9660_short_name_sorts_before_longer_prefix_match() {
        // "A" padded with 0x20 compares less than "AB" because 0x20 < 'B'.
        assert_eq!(compare_encoded_names(Namespace::Iso9660, b"A", b"AB"), Ordering::Less);
    }

    #[test]
    fn joliet_compares_as_utf16_units() {
        let a = crate::codec::str_to_ucs2be("a").unwrap();
        let b = crate::codec::str_to_ucs2be("b").unwrap();
        assert_eq!(compare_encoded_names(Namespace::Joliet, &a, &b), Ordering::Less);
    }

    #[test]
    fn udf_compares_raw_bytes() {
        let a = crate::udf::str_to_cs0("a").unwrap();
        let b = crate::udf::str_to_cs0("b").unwrap();
        assert_eq!(compare_encoded_names(Namespace::Udf, &a, &b), Ordering::Less);
    }
}
