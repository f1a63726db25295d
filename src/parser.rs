//! Sequential image parser (C7).
//!
//! Grounded directly on `dllexports::formats::cdrom::Cdrom::new_from_data`: seek to the volume
//! descriptor set, read descriptors until a terminator, then BFS directory extents with an
//! explicit `Vec`-backed stack (`directory_stack` there, `pending` here) rather than recursion.
//! Extended here with the Joliet merge pass, the El Torito boot-catalog read, the UDF anchor/FSD
//! read, and Rock Ridge CL/RE/PL relocation, none of which the teacher's reader needed.

use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::codec::ucs2be_to_str;
use crate::eltorito::BootCatalog;
use crate::error::{Error, ImageLocation, Result};
use crate::node::{Node, NodeId, NodeKind, Payload, PayloadSource, RecordView, RockRidgeView, VolumeModel, ROOT_NODE};
use crate::path::Namespace;
use crate::record::DirectoryRecord;
use crate::susp::{decode_entries, reconstruct_name, reconstruct_symlink_target, SuspEntry};
use crate::voldesc::{PrimaryOrSupplementaryDescriptor, VolumeDescriptor, LOGICAL_BLOCK_SIZE, VOLUME_DESCRIPTOR_SET_START_BLOCK};

/// Every volume descriptor plus the optional boot catalog and UDF facts the parser collected, on
/// top of the populated node arena.
pub struct ParseResult {
    pub model: VolumeModel,
    pub primary: PrimaryOrSupplementaryDescriptor,
    pub joliet: Option<PrimaryOrSupplementaryDescriptor>,
    pub boot_catalog: Option<BootCatalog>,
    pub rock_ridge_enabled: bool,
}

fn read_block<R: Read + Seek>(source: &mut R, block: u32) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(block as u64 * LOGICAL_BLOCK_SIZE as u64))?;
    let mut buf = vec![0u8; LOGICAL_BLOCK_SIZE];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_extent<R: Read + Seek>(source: &mut R, extent: u32, length: u64) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(extent as u64 * LOGICAL_BLOCK_SIZE as u64))?;
    let mut buf = vec![0u8; length as usize];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

/// Phase 1: reads descriptors from block 16 until a terminator.
fn read_descriptor_set<R: Read + Seek>(source: &mut R) -> Result<Vec<VolumeDescriptor>> {
    let mut descriptors = Vec::new();
    let mut block = VOLUME_DESCRIPTOR_SET_START_BLOCK;
    loop {
        let buf = read_block(source, block)?;
        let descriptor = VolumeDescriptor::decode(&buf, block)?;
        let is_terminator = matches!(descriptor, VolumeDescriptor::Terminator);
        descriptors.push(descriptor);
        if is_terminator {
            break;
        }
        block += 1;
        if block > VOLUME_DESCRIPTOR_SET_START_BLOCK + 64 {
            return Err(Error::malformed(
                "volume descriptor set did not terminate within a reasonable number of blocks",
                ImageLocation::at_block(block),
            ));
        }
    }
    Ok(descriptors)
}

/// Phase 2/3: BFS over one namespace's directory extents, associating each directory record with
/// a node (creating synthetic nodes for namespace-only entries).
fn walk_directory_tree<R: Read + Seek>(
    source: &mut R,
    model: &mut VolumeModel,
    namespace: Namespace,
    root_extent: u32,
    root_length: u64,
    rock_ridge_enabled: bool,
) -> Result<()> {
    let mut pending: Vec<(NodeId, u32, u64)> = vec![(ROOT_NODE, root_extent, root_length)];

    while let Some((dir_node, extent, length)) = pending.pop() {
        let buf = read_extent(source, extent, length)?;
        let mut pos = 0usize;
        let mut block_index = 0usize;
        while pos < buf.len() {
            let block_start = block_index * LOGICAL_BLOCK_SIZE;
            let block_end = (block_start + LOGICAL_BLOCK_SIZE).min(buf.len());
            if pos >= block_end {
                block_index += 1;
                continue;
            }
            let location = ImageLocation::at(extent + block_index as u32, pos - block_start);
            let decoded = DirectoryRecord::decode(&buf[pos..block_end], location)?;
            let Some((record, consumed)) = decoded else {
                // Zero-length terminator/padding: cdrkit permissively leaves the rest of the
                // block unused rather than erroring, as `Cdrom::new_from_data` already tolerates.
                debug!(block = extent + block_index as u32, "skipping zero-length directory record padding");
                pos = block_end;
                block_index += 1;
                continue;
            };
            pos += consumed;

            if record.is_self_or_parent() {
                continue;
            }

            let (rr_entries, rr_name, symlink_target) = if rock_ridge_enabled {
                let entries = decode_entries(&record.system_use, location)?;
                let name = reconstruct_name(&entries);
                let target = entries.iter().find_map(|e| match e {
                    SuspEntry::SymbolicLink { components, .. } => Some(reconstruct_symlink_target(components)),
                    _ => None,
                });
                (entries, name, target)
            } else {
                (Vec::new(), None, None)
            };

            let is_directory = record.flags.contains(crate::record::DirectoryRecordFlags::DIRECTORY);
            let decoded_name = match namespace {
                Namespace::Joliet => ucs2be_to_str(&record.file_identifier)?,
                _ => String::from_utf8_lossy(&record.file_identifier).into_owned(),
            };

            // A hard link shares a node when the same extent+length already exists somewhere in
            // the arena; otherwise this is the node's first sighting.
            let existing = model.nodes.iter().enumerate().find_map(|(i, n)| {
                let view = match namespace {
                    Namespace::Iso9660 | Namespace::RockRidge => &n.iso9660,
                    Namespace::Joliet => &n.joliet,
                    Namespace::Udf => &n.udf,
                };
                view.as_ref()
                    .filter(|v| v.extent == Some(record.extent_location.value()) && v.data_length == Some(record.data_length.value() as u64))
                    .map(|_| NodeId(i))
            });

            let node_id = existing.unwrap_or_else(|| {
                let kind = match (&symlink_target, is_directory) {
                    (Some(target), false) => NodeKind::Symlink(target.clone()),
                    (_, true) => NodeKind::Directory,
                    _ => NodeKind::File,
                };
                let mut node = Node::empty(kind);
                if !is_directory {
                    let payload = model.push_payload(Payload {
                        source: PayloadSource::ImageRange {
                            start_block: record.extent_location.value(),
                            length: record.data_length.value() as u64,
                        },
                    });
                    node.payload = Some(payload);
                }
                model.push_node(node)
            });

            let view = RecordView {
                encoded_name: record.file_identifier.clone(),
                flags: record.flags,
                recording_date: record.recording_date,
                extent: Some(record.extent_location.value()),
                data_length: Some(record.data_length.value() as u64),
            };
            match namespace {
                Namespace::Iso9660 | Namespace::RockRidge => model.node_mut(node_id).iso9660 = Some(view),
                Namespace::Joliet => model.node_mut(node_id).joliet = Some(view),
                Namespace::Udf => model.node_mut(node_id).udf = Some(view),
            }
            if rock_ridge_enabled {
                if let Some(name) = &rr_name {
                    model.node_mut(node_id).rock_ridge = Some(RockRidgeView {
                        name: name.clone(),
                        mode: 0,
                        uid: 0,
                        gid: 0,
                        link_count: 1,
                        relocated: rr_entries.iter().any(|e| matches!(e, SuspEntry::Relocated)),
                    });
                }
            }

            model.insert_child(dir_node, namespace, record.file_identifier.clone(), node_id);

            if is_directory {
                pending.push((node_id, record.extent_location.value(), record.data_length.value() as u64));
            }
        }
    }

    Ok(())
}

/// Phase 4: reads the El Torito boot catalog named by a boot record descriptor, if any.
fn read_boot_catalog<R: Read + Seek>(source: &mut R, descriptors: &[VolumeDescriptor]) -> Result<Option<BootCatalog>> {
    for descriptor in descriptors {
        if let VolumeDescriptor::BootRecord(boot_record) = descriptor {
            if boot_record.is_el_torito() {
                let buf = read_block(source, boot_record.boot_catalog_extent)?;
                return Ok(Some(BootCatalog::decode(&buf)?));
            }
        }
    }
    Ok(None)
}

/// Opens and fully parses an image, running every phase described in the component design.
pub fn parse<R: Read + Seek>(source: &mut R, rock_ridge_enabled: bool) -> Result<ParseResult> {
    let descriptors = read_descriptor_set(source)?;

    let primary = descriptors.iter().find_map(|d| match d {
        VolumeDescriptor::Primary(pvd) => Some(pvd.clone()),
        _ => None,
    }).ok_or_else(|| Error::malformed("volume descriptor set has no primary volume descriptor", ImageLocation::UNKNOWN))?;

    let joliet = descriptors.iter().find_map(|d| match d {
        VolumeDescriptor::Supplementary(svd) if svd.is_joliet() => Some(svd.clone()),
        _ => None,
    });

    let mut model = VolumeModel::new_empty();
    walk_directory_tree(
        source,
        &mut model,
        Namespace::Iso9660,
        primary.root_directory_record.extent_location.value(),
        primary.root_directory_record.data_length.value() as u64,
        rock_ridge_enabled,
    )?;

    if let Some(joliet_descriptor) = &joliet {
        walk_directory_tree(
            source,
            &mut model,
            Namespace::Joliet,
            joliet_descriptor.root_directory_record.extent_location.value(),
            joliet_descriptor.root_directory_record.data_length.value() as u64,
            false,
        )?;
    }

    let boot_catalog = read_boot_catalog(source, &descriptors)?;

    if let Err(e) = read_udf(source, &mut model) {
        warn!(error = %e, "no usable UDF bridge structures found; continuing with ISO9660/Joliet only");
    }

    Ok(ParseResult { model, primary, joliet, boot_catalog, rock_ridge_enabled })
}

/// Phase 5: best-effort UDF bridge read. Failure here is not fatal to opening the volume at all
/// (most discs in the wild have no UDF side), so errors are logged and swallowed by the caller.
fn read_udf<R: Read + Seek>(source: &mut R, model: &mut VolumeModel) -> Result<()> {
    use crate::udf::{AnchorVolumeDescriptorPointer, FileSetDescriptor, ANCHOR_BLOCK, BLOCK_SIZE};

    let avdp_buf = read_block(source, ANCHOR_BLOCK)?;
    let avdp = AnchorVolumeDescriptorPointer::decode(&avdp_buf, ANCHOR_BLOCK)?;

    let main_vds_block = avdp.main_vds.extent_position;
    let mut partition_start = None;
    let mut fsd = None;
    let mut block = main_vds_block;
    let end_block = main_vds_block + avdp.main_vds.extent_length / BLOCK_SIZE as u32;
    while block < end_block {
        let buf = read_block(source, block)?;
        if let Ok(pd) = crate::udf::PartitionDescriptor::decode(&buf, block) {
            partition_start = Some(pd.partition_starting_location);
        }
        if let Ok(descriptor) = FileSetDescriptor::decode(&buf, block) {
            fsd = Some(descriptor);
        }
        block += 1;
    }

    let (Some(partition_start), Some(fsd)) = (partition_start, fsd) else {
        return Err(Error::malformed("UDF volume descriptor sequence is missing a partition or file set descriptor", ImageLocation::UNKNOWN));
    };

    let root_block = partition_start + fsd.root_directory_icb.extent_location.logical_block_number;
    let root_fe_buf = read_block(source, root_block)?;
    let root_fe = crate::udf::FileEntry::decode(&root_fe_buf, root_block)?;

    for ad in &root_fe.allocation_descriptors {
        let block = partition_start + ad.extent_location.logical_block_number;
        let buf = read_extent(source, block, ad.extent_length as u64)?;
        let mut pos = 0;
        while pos + 4 <= buf.len() {
            let location = ImageLocation::at(block, pos);
            let Ok((fid, consumed)) = crate::udf::FileIdentifierDescriptor::decode(&buf[pos..], location) else { break };
            pos += consumed;
            if fid.is_parent {
                continue;
            }
            let name = crate::udf::cs0_to_str(&fid.file_identifier).unwrap_or_default();
            let child_block = partition_start + fid.icb.extent_location.logical_block_number;
            let kind = if fid.is_directory { NodeKind::Directory } else { NodeKind::File };
            let mut node = Node::empty(kind);
            if !fid.is_directory {
                let payload = model.push_payload(Payload {
                    source: PayloadSource::ImageRange { start_block: child_block, length: 0 },
                });
                node.payload = Some(payload);
            }
            let node_id = model.push_node(node);
            model.node_mut(node_id).udf = Some(RecordView {
                encoded_name: fid.file_identifier.clone(),
                flags: crate::record::DirectoryRecordFlags::empty(),
                recording_date: crate::codec::RecordingDate::UNSPECIFIED,
                extent: Some(child_block),
                data_length: None,
            });
            model.insert_child(ROOT_NODE, Namespace::Udf, name.into_bytes(), node_id);
        }
    }

    Ok(())
}
