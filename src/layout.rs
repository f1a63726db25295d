//! Deterministic layout planner (C8).
//!
//! No single teacher routine grounds this: the teacher repo only ever reads formats. Written in
//! the teacher's plain free-function-over-explicit-`Vec` style (`Cdrom::new_from_data`'s
//! `directory_stack` is the closest analog) since nothing in the pack lays an image out.

use std::collections::BTreeMap;

use crate::codec::RecordingDate;
use crate::eltorito::BootCatalog;
use crate::error::{Error, Result};
use crate::node::{NodeId, VolumeModel, ROOT_NODE};
use crate::path::Namespace;
use crate::path_table;
use crate::record::{pad_directory_stream, DirectoryRecord, DirectoryRecordFlags};
use crate::voldesc::{LOGICAL_BLOCK_SIZE, VOLUME_DESCRIPTOR_SET_START_BLOCK};

/// The four extents (primary/backup, LE/BE) a single namespace's path table occupies, plus its
/// shared byte size.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathTableRegion {
    pub size: u32,
    pub le_extent: u32,
    pub le_backup_extent: u32,
    pub be_extent: u32,
    pub be_backup_extent: u32,
}

/// Extents assigned to every directory and file, keyed by `(namespace, node)` for directories and
/// by node alone for file payloads (one payload, one extent, regardless of how many namespaces
/// link to it).
#[derive(Clone, Debug, Default)]
pub struct Layout {
    pub directory_extents: BTreeMap<(Namespace, NodeId), (u32, u64)>,
    pub payload_extents: BTreeMap<NodeId, (u32, u64)>,
    pub iso_path_table: PathTableRegion,
    pub joliet_path_table: Option<PathTableRegion>,
    /// Block of the boot record volume descriptor, if an El Torito boot catalog is present.
    pub boot_record_block: Option<u32>,
    /// Block of the supplementary (Joliet) volume descriptor, if Joliet is enabled.
    pub svd_block: Option<u32>,
    pub terminator_block: u32,
    /// Extent the boot catalog itself (validation + default entry + sections) is written at.
    pub boot_catalog_extent: Option<u32>,
    pub next_free_block: u32,
}

fn bfs_order(model: &VolumeModel, namespace: Namespace) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut pending = vec![ROOT_NODE];
    while let Some(node_id) = pending.pop() {
        order.push(node_id);
        if let Some(children) = model.node(node_id).children.get(&namespace) {
            for entry in children {
                if model.node(entry.child).is_directory() {
                    pending.push(entry.child);
                }
            }
        }
    }
    order
}

/// Runs the full 7-step deterministic layout process and writes extent/size fields back into
/// every node's record views. Clears `model.dirty` on success.
pub fn force_consistency(model: &mut VolumeModel, joliet_enabled: bool, boot_catalog: Option<&BootCatalog>) -> Result<Layout> {
    let mut layout = Layout::default();

    // Step 4 reserves block 16.. for volume descriptors: PVD, an optional boot record, an
    // optional SVD (Joliet), then the terminator; the boot catalog's own extent (sized from its
    // real encoded length, since a section-heavy catalog can exceed one block) follows right
    // after.
    let mut next_block: u32 = VOLUME_DESCRIPTOR_SET_START_BLOCK + 1;
    layout.boot_record_block = boot_catalog.map(|_| {
        let block = next_block;
        next_block += 1;
        block
    });
    layout.svd_block = if joliet_enabled {
        let block = next_block;
        next_block += 1;
        Some(block)
    } else {
        None
    };
    layout.terminator_block = next_block;
    next_block += 1;
    if let Some(catalog) = boot_catalog {
        let catalog_len = catalog.encode()?.len() as u64;
        let catalog_blocks = catalog_len.div_ceil(LOGICAL_BLOCK_SIZE as u64).max(1) as u32;
        layout.boot_catalog_extent = Some(next_block);
        next_block += catalog_blocks;
    }

    // Step 3: size each namespace's path table from directory identifiers alone — this doesn't
    // need extents, only the directory tree shape, so it can run before extents exist.
    let iso_table_len = path_table::encoded_len(model, Namespace::Iso9660);
    let iso_table_blocks = iso_table_len.div_ceil(LOGICAL_BLOCK_SIZE as u64).max(1) as u32;
    let mut iso_path_table = PathTableRegion { size: iso_table_len as u32, ..Default::default() };
    iso_path_table.le_extent = next_block;
    next_block += iso_table_blocks;
    iso_path_table.le_backup_extent = next_block;
    next_block += iso_table_blocks;
    iso_path_table.be_extent = next_block;
    next_block += iso_table_blocks;
    iso_path_table.be_backup_extent = next_block;
    next_block += iso_table_blocks;
    layout.iso_path_table = iso_path_table;

    if joliet_enabled {
        let joliet_table_len = path_table::encoded_len(model, Namespace::Joliet);
        let joliet_table_blocks = joliet_table_len.div_ceil(LOGICAL_BLOCK_SIZE as u64).max(1) as u32;
        let mut joliet_path_table = PathTableRegion { size: joliet_table_len as u32, ..Default::default() };
        joliet_path_table.le_extent = next_block;
        next_block += joliet_table_blocks;
        joliet_path_table.le_backup_extent = next_block;
        next_block += joliet_table_blocks;
        joliet_path_table.be_extent = next_block;
        next_block += joliet_table_blocks;
        joliet_path_table.be_backup_extent = next_block;
        next_block += joliet_table_blocks;
        layout.joliet_path_table = Some(joliet_path_table);
    }

    // Step 4: ISO9660 directories in BFS order, then Joliet directories in BFS order.
    for node_id in bfs_order(model, Namespace::Iso9660) {
        let size = directory_stream_length(model, Namespace::Iso9660, node_id)?;
        let blocks = size.div_ceil(LOGICAL_BLOCK_SIZE as u64) as u32;
        layout.directory_extents.insert((Namespace::Iso9660, node_id), (next_block, size));
        next_block += blocks.max(1);
    }
    if joliet_enabled {
        for node_id in bfs_order(model, Namespace::Joliet) {
            let size = directory_stream_length(model, Namespace::Joliet, node_id)?;
            let blocks = size.div_ceil(LOGICAL_BLOCK_SIZE as u64) as u32;
            layout.directory_extents.insert((Namespace::Joliet, node_id), (next_block, size));
            next_block += blocks.max(1);
        }
    }

    // Step 4 (payloads): first ISO9660 appearance order, falling back to Joliet-only files.
    for node_id in iso9660_then_joliet_file_order(model, joliet_enabled) {
        if layout.payload_extents.contains_key(&node_id) {
            continue;
        }
        let Some(payload_id) = model.node(node_id).payload else { continue };
        let length = model.payload(payload_id).source.length();
        let blocks = length.div_ceil(LOGICAL_BLOCK_SIZE as u64) as u32;
        layout.payload_extents.insert(node_id, (next_block, length));
        next_block += blocks.max(1);
    }

    layout.next_free_block = next_block;

    // Step 5: write extent/size back into every record view that has one.
    for ((namespace, node_id), (extent, size)) in &layout.directory_extents {
        let view = match namespace {
            Namespace::Iso9660 | Namespace::RockRidge => &mut model.node_mut(*node_id).iso9660,
            Namespace::Joliet => &mut model.node_mut(*node_id).joliet,
            Namespace::Udf => &mut model.node_mut(*node_id).udf,
        };
        if let Some(view) = view {
            view.extent = Some(*extent);
            view.data_length = Some(*size);
        }
    }
    for (node_id, (extent, size)) in &layout.payload_extents {
        let node = model.node_mut(*node_id);
        if let Some(view) = &mut node.iso9660 {
            view.extent = Some(*extent);
            view.data_length = Some(*size);
        }
        if let Some(view) = &mut node.joliet {
            view.extent = Some(*extent);
            view.data_length = Some(*size);
        }
    }

    model.dirty = false;
    Ok(layout)
}

/// Recomputes a directory's record-stream length by encoding every `.`/`..`/child record it
/// would emit, without running the layout itself (extents here are placeholders).
fn directory_stream_length(model: &VolumeModel, namespace: Namespace, node_id: NodeId) -> Result<u64> {
    let mut records = Vec::new();
    records.push(DirectoryRecord::dot_entry(false, 0, 0, DirectoryRecordFlags::empty(), RecordingDate::UNSPECIFIED).encode()?);
    records.push(DirectoryRecord::dot_entry(true, 0, 0, DirectoryRecordFlags::empty(), RecordingDate::UNSPECIFIED).encode()?);
    if let Some(children) = model.node(node_id).children.get(&namespace) {
        for entry in children {
            let view = match namespace {
                Namespace::Iso9660 | Namespace::RockRidge => model.node(entry.child).iso9660.as_ref(),
                Namespace::Joliet => model.node(entry.child).joliet.as_ref(),
                Namespace::Udf => model.node(entry.child).udf.as_ref(),
            };
            let flags = view.map(|v| v.flags).unwrap_or_default();
            let record = DirectoryRecord {
                extended_attr_record_length: 0,
                extent_location: crate::codec::EndianPair::<u32>::of(0),
                data_length: crate::codec::EndianPair::<u32>::of(0),
                recording_date: RecordingDate::UNSPECIFIED,
                flags,
                file_unit_size: 0,
                interleave_gap_size: 0,
                volume_sequence_number: crate::codec::EndianPair::<u16>::of(1),
                file_identifier: entry.name.clone(),
                system_use: Vec::new(),
            };
            records.push(record.encode()?);
        }
    }
    Ok(pad_directory_stream(&records, LOGICAL_BLOCK_SIZE).len() as u64)
}

fn iso9660_then_joliet_file_order(model: &VolumeModel, joliet_enabled: bool) -> Vec<NodeId> {
    let mut order = Vec::new();
    for node_id in bfs_order(model, Namespace::Iso9660) {
        if !model.node(node_id).is_directory() {
            order.push(node_id);
        }
    }
    if joliet_enabled {
        for node_id in bfs_order(model, Namespace::Joliet) {
            if !model.node(node_id).is_directory() && !order.contains(&node_id) {
                order.push(node_id);
            }
        }
    }
    order
}

/// Checks the constraints `modify_file_in_place` imposes: the new length must fit within the
/// extent-aligned length of the existing payload, since no other metadata may move.
pub fn check_in_place_replacement(current_length: u64, new_length: u64) -> Result<()> {
    let extent_aligned = current_length.div_ceil(LOGICAL_BLOCK_SIZE as u64) * LOGICAL_BLOCK_SIZE as u64;
    if new_length > extent_aligned {
        return Err(Error::invalid_input(format!(
            "in-place replacement of {} bytes exceeds the extent-aligned length {} of the existing file",
            new_length, extent_aligned,
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeKind, Payload, PayloadSource};

    #[test]
    fn empty_volume_lays_out_without_error() {
        let mut model = VolumeModel::new_empty();
        let layout = force_consistency(&mut model, false, None).unwrap();
        assert!(layout.next_free_block > 16);
        assert!(!model.dirty);
    }

    #[test]
    fn file_payload_gets_an_extent() {
        let mut model = VolumeModel::new_empty();
        let payload = model.push_payload(Payload { source: PayloadSource::Owned(vec![1, 2, 3]) });
        let mut file = Node::empty(NodeKind::File);
        file.payload = Some(payload);
        let file_id = model.push_node(file);
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"A.TXT;1".to_vec(), file_id);
        let layout = force_consistency(&mut model, false, None).unwrap();
        assert!(layout.payload_extents.contains_key(&file_id));
    }

    #[test]
    fn in_place_replacement_rejects_growth_past_extent() {
        assert!(check_in_place_replacement(100, 2048).is_ok());
        assert!(check_in_place_replacement(100, 2049).unwrap_err().is_invalid_input());
    }
}
