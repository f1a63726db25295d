//! Streaming image writer (C9).
//!
//! Grounded on `dllexports::main`'s reader-in/writer-out streaming pattern (no intermediate
//! scratch file) and `dllexports::read_ext::ReadExt::read_exact_or_eof`, generalized from "copy
//! one decompressed stream" to "emit every block of a laid-out image in ascending extent order".

use std::io::{Read, Seek, SeekFrom, Write};

use crate::codec::{EndianPair, RecordingDate};
use crate::eltorito::BootCatalog;
use crate::error::{Error, Result};
use crate::layout::{Layout, PathTableRegion};
use crate::node::{NodeId, PayloadSource, VolumeModel, ROOT_NODE};
use crate::path::Namespace;
use crate::path_table::build_path_tables;
use crate::record::{pad_directory_stream, DirectoryRecord};
use crate::voldesc::{
    BootRecordDescriptor, DescriptorType, PrimaryOrSupplementaryDescriptor, VolumeDescriptor,
    LOGICAL_BLOCK_SIZE, VOLUME_DESCRIPTOR_SET_START_BLOCK,
};

/// Writes the full image described by `model`+`layout` to `sink`, given a source of file payload
/// bytes for any node whose payload is still a range of the original input image.
///
/// `sink` need only support forward writes; the writer never seeks backward, emitting blocks in
/// ascending extent order as the component design requires.
pub fn write<W: Write, R: Read + Seek>(
    sink: &mut W,
    model: &VolumeModel,
    layout: &Layout,
    volume_identifier: &str,
    joliet_enabled: bool,
    system_area: Option<&[u8]>,
    boot_catalog: Option<&BootCatalog>,
    image_source: Option<&mut R>,
) -> Result<()> {
    let mut written_blocks = 0u32;
    let mut image_source = image_source;

    let mut write_block = |sink: &mut W, block: u32, data: &[u8]| -> Result<()> {
        if block < written_blocks {
            return Err(Error::internal("writer attempted to move backward in the output stream"));
        }
        while written_blocks < block {
            sink.write_all(&[0u8; LOGICAL_BLOCK_SIZE])?;
            written_blocks += 1;
        }
        sink.write_all(data)?;
        written_blocks += (data.len() / LOGICAL_BLOCK_SIZE) as u32;
        Ok(())
    };

    if let Some(mbr) = system_area {
        let mut padded = mbr.to_vec();
        padded.resize(VOLUME_DESCRIPTOR_SET_START_BLOCK as usize * LOGICAL_BLOCK_SIZE, 0);
        write_block(sink, 0, &padded)?;
    }

    let root = build_root_descriptor(model, layout, Namespace::Iso9660, volume_identifier)?;
    write_block(sink, VOLUME_DESCRIPTOR_SET_START_BLOCK, &VolumeDescriptor::Primary(root).encode()?)?;

    if let (Some(block), Some(catalog_extent)) = (layout.boot_record_block, layout.boot_catalog_extent) {
        write_block(sink, block, &encode_boot_record(catalog_extent))?;
    }

    if joliet_enabled {
        let svd = build_root_descriptor(model, layout, Namespace::Joliet, volume_identifier)?;
        let svd_block = layout.svd_block
            .ok_or_else(|| Error::internal("joliet is enabled but layout has no reserved SVD block"))?;
        write_block(sink, svd_block, &VolumeDescriptor::Supplementary(svd).encode()?)?;
    }

    write_block(sink, layout.terminator_block, &VolumeDescriptor::Terminator.encode()?)?;

    if let (Some(catalog), Some(extent)) = (boot_catalog, layout.boot_catalog_extent) {
        let mut bytes = catalog.encode()?;
        let padded_len = bytes.len().div_ceil(LOGICAL_BLOCK_SIZE).max(1) * LOGICAL_BLOCK_SIZE;
        bytes.resize(padded_len, 0);
        write_block(sink, extent, &bytes)?;
    }

    write_path_table_region(sink, &mut write_block, model, Namespace::Iso9660, &layout.iso_path_table, layout)?;
    if let Some(region) = &layout.joliet_path_table {
        write_path_table_region(sink, &mut write_block, model, Namespace::Joliet, region, layout)?;
    }

    let mut directory_entries: Vec<_> = layout.directory_extents.iter().collect();
    directory_entries.sort_by_key(|(_, (extent, _))| *extent);
    for ((namespace, node_id), (extent, _)) in directory_entries {
        let stream = encode_directory_stream(model, *namespace, *node_id, layout)?;
        write_block(sink, *extent, &stream)?;
    }

    let mut payload_entries: Vec<_> = layout.payload_extents.iter().collect();
    payload_entries.sort_by_key(|(_, (extent, _))| *extent);
    for (node_id, (extent, length)) in payload_entries {
        let Some(payload_id) = model.node(*node_id).payload else { continue };
        let bytes = match &model.payload(payload_id).source {
            PayloadSource::Owned(bytes) => bytes.clone(),
            PayloadSource::ImageRange { start_block, length: _ } => {
                let source = image_source.as_deref_mut().ok_or_else(|| {
                    Error::internal("payload references the original image but no image source was supplied to the writer")
                })?;
                source.seek(SeekFrom::Start(*start_block as u64 * LOGICAL_BLOCK_SIZE as u64))?;
                let mut buf = vec![0u8; *length as usize];
                source.read_exact(&mut buf)?;
                buf
            },
        };
        let padded_len = (*length as usize).div_ceil(LOGICAL_BLOCK_SIZE) * LOGICAL_BLOCK_SIZE;
        let mut padded = bytes;
        padded.resize(padded_len, 0);
        write_block(sink, *extent, &padded)?;
    }

    sink.flush()?;
    Ok(())
}

/// Writes one namespace's four path-table copies (primary/backup × LE/BE) at their reserved
/// extents, built from the now-final directory extents.
fn write_path_table_region<W: Write>(
    sink: &mut W,
    write_block: &mut impl FnMut(&mut W, u32, &[u8]) -> Result<()>,
    model: &VolumeModel,
    namespace: Namespace,
    region: &PathTableRegion,
    layout: &Layout,
) -> Result<()> {
    let (mut le, mut be) = build_path_tables(model, namespace, &layout.directory_extents);
    let padded_len = (region.size as usize).div_ceil(LOGICAL_BLOCK_SIZE).max(1) * LOGICAL_BLOCK_SIZE;
    le.resize(padded_len, 0);
    be.resize(padded_len, 0);
    write_block(sink, region.le_extent, &le)?;
    write_block(sink, region.le_backup_extent, &le)?;
    write_block(sink, region.be_extent, &be)?;
    write_block(sink, region.be_backup_extent, &be)?;
    Ok(())
}

fn build_root_descriptor(
    model: &VolumeModel,
    layout: &Layout,
    namespace: Namespace,
    volume_identifier: &str,
) -> Result<PrimaryOrSupplementaryDescriptor> {
    let (root_extent, root_length) = layout.directory_extents.get(&(namespace, ROOT_NODE))
        .copied()
        .ok_or_else(|| Error::internal("root directory has no assigned extent; run force_consistency first"))?;

    let root_record = DirectoryRecord::dot_entry(
        false, root_extent, root_length as u32, crate::record::DirectoryRecordFlags::DIRECTORY, RecordingDate::UNSPECIFIED,
    );

    let mut volume_identifier_bytes = volume_identifier.as_bytes().to_vec();
    volume_identifier_bytes.resize(32, b' ');

    let path_table = if namespace == Namespace::Joliet {
        layout.joliet_path_table.unwrap_or_default()
    } else {
        layout.iso_path_table
    };

    Ok(PrimaryOrSupplementaryDescriptor {
        descriptor_type: if namespace == Namespace::Joliet { DescriptorType::Supplementary } else { DescriptorType::Primary },
        version: 1,
        flags: crate::voldesc::VolumeFlags::empty(),
        system_identifier: [0x20; 32],
        volume_identifier: volume_identifier_bytes.try_into().unwrap_or([0x20; 32]),
        volume_space_size: EndianPair::<u32>::of(layout.next_free_block),
        escape_sequences: if namespace == Namespace::Joliet {
            let mut esc = [0u8; 32];
            esc[0..3].copy_from_slice(&crate::voldesc::JOLIET_ESCAPE_LEVEL_3);
            esc
        } else {
            [0u8; 32]
        },
        volume_set_size: EndianPair::<u16>::of(1),
        volume_sequence_number: EndianPair::<u16>::of(1),
        logical_block_size: EndianPair::<u16>::of(LOGICAL_BLOCK_SIZE as u16),
        path_table_size: EndianPair::<u32>::of(path_table.size),
        le_path_table_location: path_table.le_extent,
        le_path_table_backup_location: path_table.le_backup_extent,
        be_path_table_location: path_table.be_extent,
        be_path_table_backup_location: path_table.be_backup_extent,
        root_directory_record: root_record,
        volume_set_identifier: [0x20; 128],
        publisher_identifier: [0x20; 128],
        data_preparer_identifier: [0x20; 128],
        application_identifier: [0x20; 128],
        copyright_file_identifier: [0x20; 37],
        abstract_file_identifier: [0x20; 37],
        bibliographic_file_identifier: [0x20; 37],
        volume_creation_timestamp: crate::codec::DigitTimestamp::UNSPECIFIED,
        volume_modification_timestamp: crate::codec::DigitTimestamp::UNSPECIFIED,
        volume_expiration_timestamp: crate::codec::DigitTimestamp::UNSPECIFIED,
        volume_effective_timestamp: crate::codec::DigitTimestamp::UNSPECIFIED,
        file_structure_version: 1,
        application_use: [0; 512],
    })
}

fn encode_directory_stream(model: &VolumeModel, namespace: Namespace, node_id: NodeId, layout: &Layout) -> Result<Vec<u8>> {
    let (self_extent, self_length) = layout.directory_extents.get(&(namespace, node_id)).copied().unwrap_or((0, 0));
    let mut records = vec![
        DirectoryRecord::dot_entry(false, self_extent, self_length as u32, crate::record::DirectoryRecordFlags::DIRECTORY, RecordingDate::UNSPECIFIED).encode()?,
        DirectoryRecord::dot_entry(true, self_extent, self_length as u32, crate::record::DirectoryRecordFlags::DIRECTORY, RecordingDate::UNSPECIFIED).encode()?,
    ];

    if let Some(children) = model.node(node_id).children.get(&namespace) {
        for entry in children {
            let child = model.node(entry.child);
            let is_dir = child.is_directory();
            let (extent, length) = if is_dir {
                layout.directory_extents.get(&(namespace, entry.child)).copied().unwrap_or((0, 0))
            } else {
                layout.payload_extents.get(&entry.child).copied().unwrap_or((0, 0))
            };
            let mut flags = crate::record::DirectoryRecordFlags::empty();
            if is_dir {
                flags |= crate::record::DirectoryRecordFlags::DIRECTORY;
            }
            // ISO9660 has no native symlink bit; Rock Ridge's SL entry carries that semantics and
            // is attached to `system_use` by the caller building the record, not here.
            let record = DirectoryRecord {
                extended_attr_record_length: 0,
                extent_location: EndianPair::<u32>::of(extent),
                data_length: EndianPair::<u32>::of(length as u32),
                recording_date: RecordingDate::UNSPECIFIED,
                flags,
                file_unit_size: 0,
                interleave_gap_size: 0,
                volume_sequence_number: EndianPair::<u16>::of(1),
                file_identifier: entry.name.clone(),
                system_use: Vec::new(),
            };
            records.push(record.encode()?);
        }
    }

    Ok(pad_directory_stream(&records, LOGICAL_BLOCK_SIZE))
}

/// Encodes a boot record descriptor pointing at `boot_catalog_extent`, for callers that enabled
/// El Torito; kept separate from [`write`] since the block it occupies is optional.
pub fn encode_boot_record(boot_catalog_extent: u32) -> Vec<u8> {
    BootRecordDescriptor::el_torito(boot_catalog_extent).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::force_consistency;
    use crate::node::{Node, NodeKind, Payload, PayloadSource};
    use std::io::Cursor;

    #[test]
    fn writes_an_empty_volume() {
        let mut model = VolumeModel::new_empty();
        let layout = force_consistency(&mut model, false, None).unwrap();
        let mut out = Cursor::new(Vec::new());
        let mut no_source: Option<&mut Cursor<Vec<u8>>> = None;
        write(&mut out, &model, &layout, "EMPTY", false, None, None, no_source.take()).unwrap();
        assert!(out.into_inner().len() >= LOGICAL_BLOCK_SIZE * 17);
    }

    #[test]
    fn writes_a_single_owned_file() {
        let mut model = VolumeModel::new_empty();
        let payload = model.push_payload(Payload { source: PayloadSource::Owned(b"hello world".to_vec()) });
        let mut file = Node::empty(NodeKind::File);
        file.payload = Some(payload);
        let file_id = model.push_node(file);
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"HELLO.TXT;1".to_vec(), file_id);
        let layout = force_consistency(&mut model, false, None).unwrap();
        let mut out = Cursor::new(Vec::new());
        let mut no_source: Option<&mut Cursor<Vec<u8>>> = None;
        write(&mut out, &model, &layout, "VOL", false, None, None, no_source.take()).unwrap();
        let bytes = out.into_inner();
        assert!(bytes.windows(b"hello world".len()).any(|w| w == b"hello world"));
    }

    #[test]
    fn el_torito_boot_record_and_catalog_are_emitted_at_their_assigned_extent() {
        use crate::eltorito::{BootCatalog, BootImageEntry, Emulation, Platform, ValidationEntry};

        let mut model = VolumeModel::new_empty();
        let payload = model.push_payload(Payload { source: PayloadSource::Owned(vec![0u8; 512]) });
        let mut file = Node::empty(NodeKind::File);
        file.payload = Some(payload);
        let file_id = model.push_node(file);
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"BOOT.IMG;1".to_vec(), file_id);

        let catalog = BootCatalog {
            validation: ValidationEntry { platform: Platform::X86, id_string: [0x20; 24] },
            default_entry: BootImageEntry {
                bootable: true,
                emulation: Emulation::NoEmulation,
                load_segment: 0,
                system_type: 0,
                sector_count: BootImageEntry::DEFAULT_SECTOR_COUNT,
                load_rba: 0,
                selection_criteria: 0,
            },
            sections: Vec::new(),
        };
        let layout = force_consistency(&mut model, false, Some(&catalog)).unwrap();
        let boot_extent = layout.payload_extents[&file_id].0;
        let mut resolved = catalog;
        resolved.default_entry.load_rba = boot_extent;

        let mut out = Cursor::new(Vec::new());
        let mut no_source: Option<&mut Cursor<Vec<u8>>> = None;
        write(&mut out, &model, &layout, "BOOTVOL", false, None, Some(&resolved), no_source.take()).unwrap();
        let bytes = out.into_inner();

        let boot_record_block = layout.boot_record_block.unwrap();
        let boot_record = &bytes[boot_record_block as usize * LOGICAL_BLOCK_SIZE..][..LOGICAL_BLOCK_SIZE];
        assert!(BootRecordDescriptor::decode(boot_record, boot_record_block).unwrap().is_el_torito());

        let catalog_extent = layout.boot_catalog_extent.unwrap();
        let catalog_block = &bytes[catalog_extent as usize * LOGICAL_BLOCK_SIZE..][..LOGICAL_BLOCK_SIZE];
        let decoded = BootCatalog::decode(catalog_block).unwrap();
        assert_eq!(decoded.default_entry.load_rba, boot_extent);
    }
}
