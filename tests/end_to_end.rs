//! Integration tests for the six end-to-end scenarios the component design calls out.

use std::io::Cursor;

use isoimage::eltorito::{Emulation, Platform};
use isoimage::path::Namespace;
use isoimage::volume::{Namespaces, Volume};

fn empty_volume(namespaces: Namespaces) -> Volume<Cursor<Vec<u8>>> {
    Volume::new("TESTVOL", namespaces).unwrap()
}

#[test]
fn basic_file_and_directory_write_then_read_back() {
    let mut volume = empty_volume(Namespaces::default());
    volume.add_directory("/DOCS", Namespace::Iso9660).unwrap();
    volume.add_fp(Cursor::new(b"contents".to_vec()), 8, Some("/DOCS/A.TXT"), None, None).unwrap();

    let mut out = Cursor::new(Vec::new());
    volume.write(&mut out).unwrap();

    let mut reopened = Volume::open_fp(out, false).unwrap();
    let children = reopened.list_children("/DOCS", Namespace::Iso9660).unwrap();
    assert_eq!(children, vec!["A.TXT".to_string()]);
    let bytes = reopened.get_file_from_iso("/DOCS/A.TXT").unwrap();
    assert_eq!(bytes, b"contents");
}

#[test]
fn joliet_shares_payload_with_iso9660_hard_link() {
    let mut volume = empty_volume(Namespaces { joliet: true, ..Default::default() });
    volume.add_fp(Cursor::new(b"shared".to_vec()), 6, Some("/SHARED.TXT"), Some("/shared.txt"), None).unwrap();

    let iso_node = volume.resolve_path(Namespace::Iso9660, "/SHARED.TXT").unwrap().unwrap();
    let joliet_node = volume.resolve_path(Namespace::Joliet, "/shared.txt").unwrap().unwrap();
    assert_eq!(iso_node, joliet_node);
}

#[test]
fn add_and_remove_hard_link_across_namespaces_is_independent() {
    let mut volume = empty_volume(Namespaces { joliet: true, ..Default::default() });
    volume.add_fp(Cursor::new(b"x".to_vec()), 1, Some("/A.TXT"), Some("/a.txt"), None).unwrap();
    volume.add_hard_link(Namespace::Iso9660, "/A.TXT", Namespace::Iso9660, "/B.TXT").unwrap();

    assert!(volume.resolve_path(Namespace::Iso9660, "/B.TXT").unwrap().is_some());
    assert!(volume.resolve_path(Namespace::Joliet, "/a.txt").unwrap().is_some());

    volume.rm_hard_link(Namespace::Iso9660, "/B.TXT").unwrap();
    assert!(volume.resolve_path(Namespace::Iso9660, "/B.TXT").unwrap().is_none());
    // Removing one namespace's link must not disturb the Joliet link to the same payload.
    assert!(volume.resolve_path(Namespace::Joliet, "/a.txt").unwrap().is_some());
}

#[test]
fn el_torito_boot_catalog_round_trips_with_a_valid_checksum() {
    let mut volume = empty_volume(Namespaces::default());
    volume.add_fp(Cursor::new(vec![0u8; 512]), 512, Some("/BOOT.IMG"), None, None).unwrap();
    volume.add_eltorito("/BOOT.IMG", Platform::X86, Emulation::NoEmulation).unwrap();

    let mut out = Cursor::new(Vec::new());
    volume.write(&mut out).unwrap();

    let mut reopened = Volume::open_fp(out, false).unwrap();
    let boot_extent = reopened.get_record(Namespace::Iso9660, "/BOOT.IMG").unwrap().extent.unwrap();

    // Re-opening re-validates the catalog's checksum internally (`ValidationEntry::decode`); a
    // catalog reaching this point at all proves the checksum summed to zero on read.
    let catalog = reopened.boot_catalog().expect("boot catalog should have been written and re-read");
    assert_eq!(catalog.default_entry.load_rba, boot_extent);
}

#[test]
fn modify_file_in_place_changes_only_the_payload() {
    let mut volume = empty_volume(Namespaces::default());
    volume.add_fp(Cursor::new(vec![0xAAu8; 10]), 10, Some("/A.BIN"), None, None).unwrap();
    volume.modify_file_in_place(Cursor::new(vec![0xBBu8; 10]), 10, "/A.BIN").unwrap();

    let mut out = Cursor::new(Vec::new());
    volume.write(&mut out).unwrap();
    let mut reopened = Volume::open_fp(out, false).unwrap();
    let bytes = reopened.get_file_from_iso("/A.BIN").unwrap();
    assert_eq!(bytes, vec![0xBBu8; 10]);
}

#[test]
fn deeply_nested_directory_tree_exceeding_iso9660_depth_eight() {
    let mut volume = empty_volume(Namespaces::default());
    let mut path = String::new();
    for i in 0..9 {
        path.push_str(&format!("/D{}", i));
        volume.add_directory(&path, Namespace::Iso9660).unwrap();
    }
    path.push_str("/LEAF.TXT");
    volume.add_fp(Cursor::new(b"deep".to_vec()), 4, Some(&path), None, None).unwrap();

    assert!(volume.resolve_path(Namespace::Iso9660, &path).unwrap().is_some());
}
