//! The public `Volume` type and its operations (C10).
//!
//! Grounded on `dllexports::data_mgmt::{MultiFileContainer, SingleFileContainer}` for the
//! read-side surface (`list_files`/`read_file` generalize into `list_children`/
//! `open_file_from_iso`) and on `Cdrom::new_from_data` for the open path; the mutation methods
//! (`add_fp`, `rm_file`, …) have no teacher analog and are new code in the same error/flag idiom.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use tracing::info;

use crate::codec::validate_d_characters;
use crate::eltorito::{BootCatalog, BootImageEntry, Emulation, Platform, ValidationEntry};
use crate::error::{Error, Result};
use crate::layout::{check_in_place_replacement, force_consistency, Layout};
use crate::node::{Node, NodeId, NodeKind, Payload, PayloadSource, VolumeModel, ROOT_NODE};
use crate::parser::parse;
use crate::path::{join_absolute_path, split_absolute_path, Namespace};
use crate::record::DirectoryRecordFlags;
use crate::writer::write as write_image;

/// Which optional namespaces an empty volume was created with.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Namespaces {
    pub rock_ridge: bool,
    pub joliet: bool,
    pub udf: bool,
}

/// One open ISO9660/Joliet/Rock Ridge/UDF/El-Torito volume.
pub struct Volume<S = Cursor<Vec<u8>>> {
    model: VolumeModel,
    namespaces: Namespaces,
    volume_identifier: String,
    boot_catalog: Option<BootCatalog>,
    /// The node `add_eltorito`'s boot image path resolved to, so its real assigned extent can be
    /// patched into `boot_catalog.default_entry.load_rba` at write time, once layout is known.
    boot_image_node: Option<NodeId>,
    /// Kept open for the lifetime of the object, released only by [`Volume::close`], matching the
    /// "scoped acquisition at open time" resource-model contract.
    source: Option<S>,
    /// When true, [`Volume::force_consistency`] is re-run after every mutating call.
    always_consistent: bool,
    closed: bool,
    /// Isohybrid MBR/boot-code image occupying the system area (blocks 0-15), if installed.
    hybrid_mbr: Option<Vec<u8>>,
}

/// Size in bytes of the ISO9660 system area (blocks 0-15), the region isohybrid boot code and any
/// other pre-volume-descriptor payload must fit within.
const SYSTEM_AREA_SIZE: usize = 16 * crate::voldesc::LOGICAL_BLOCK_SIZE;

impl<S> Volume<S> {
    /// Creates an empty volume with the requested optional namespaces.
    pub fn new(volume_identifier: &str, namespaces: Namespaces) -> Result<Self> {
        validate_d_characters(volume_identifier)?;
        Ok(Self {
            model: VolumeModel::new_empty(),
            namespaces,
            volume_identifier: volume_identifier.to_string(),
            boot_catalog: None,
            boot_image_node: None,
            source: None,
            always_consistent: false,
            closed: false,
            hybrid_mbr: None,
        })
    }

    pub fn set_always_consistent(&mut self, value: bool) {
        self.always_consistent = value;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_input("operation attempted on a closed volume"));
        }
        Ok(())
    }

    fn maybe_reconcile(&mut self) -> Result<()> {
        if self.always_consistent {
            force_consistency(&mut self.model, self.namespaces.joliet, self.boot_catalog.as_ref())?;
        }
        Ok(())
    }

    /// Resolves `path` to the parent directory's `NodeId` and the final path component's
    /// namespace-encoded name, failing if any intermediate directory is missing.
    fn resolve_parent(&self, path: &str, namespace: Namespace) -> Result<(NodeId, Vec<String>)> {
        let components = split_absolute_path(path)?;
        if components.is_empty() {
            return Err(Error::invalid_input("path must name a file or directory, not the root"));
        }
        let mut current = ROOT_NODE;
        for component in &components[..components.len() - 1] {
            let encoded = encode_component(namespace, component)?;
            current = self.model.find_child(current, namespace, &encoded)
                .ok_or_else(|| Error::invalid_input(format!("intermediate directory '{}' does not exist", component)))?;
            if !self.model.node(current).is_directory() {
                return Err(Error::invalid_input(format!("path component '{}' is not a directory", component)));
            }
        }
        Ok((current, components))
    }

    /// Adds a file's bytes under one or more namespace paths, creating a single shared node the
    /// first time any path is supplied and hard-linking subsequent paths to it.
    #[allow(clippy::too_many_arguments)]
    pub fn add_fp<R: Read>(
        &mut self,
        mut stream: R,
        length: u64,
        iso_path: Option<&str>,
        joliet_path: Option<&str>,
        udf_path: Option<&str>,
    ) -> Result<()> {
        self.ensure_open()?;
        if iso_path.is_none() && joliet_path.is_none() && udf_path.is_none() {
            return Err(Error::invalid_input("add_fp requires at least one namespace path"));
        }
        if joliet_path.is_some() && !self.namespaces.joliet {
            return Err(Error::invalid_input("joliet_path given but Joliet is not enabled on this volume"));
        }
        if udf_path.is_some() && !self.namespaces.udf {
            return Err(Error::invalid_input("udf_path given but UDF is not enabled on this volume"));
        }

        let mut bytes = Vec::with_capacity(length as usize);
        stream.take(length).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != length {
            return Err(Error::invalid_input("stream yielded fewer bytes than the declared length"));
        }
        let payload = self.model.push_payload(Payload { source: PayloadSource::Owned(bytes) });
        let file_id = self.model.push_node(Node::empty(NodeKind::File));
        self.model.node_mut(file_id).payload = Some(payload);

        for (namespace, path) in [
            (Namespace::Iso9660, iso_path),
            (Namespace::Joliet, joliet_path),
            (Namespace::Udf, udf_path),
        ] {
            if let Some(path) = path {
                self.link_existing(file_id, namespace, path)?;
            }
        }

        self.maybe_reconcile()?;
        Ok(())
    }

    /// As [`Volume::add_fp`], reading the payload from a local filesystem path.
    pub fn add_file(&mut self, local_path: &Path, iso_path: Option<&str>, joliet_path: Option<&str>, udf_path: Option<&str>) -> Result<()> {
        let mut file = File::open(local_path)?;
        let length = file.metadata()?.len();
        self.add_fp(&mut file, length, iso_path, joliet_path, udf_path)
    }

    /// Links an already-existing node under `path` in `namespace`; used both by `add_fp` (first
    /// link) and [`Volume::add_hard_link`] (additional links to an existing file).
    fn link_existing(&mut self, node_id: NodeId, namespace: Namespace, path: &str) -> Result<()> {
        let (parent, components) = self.resolve_parent(path, namespace)?;
        let name = components.last().unwrap();
        let encoded = encode_component(namespace, name)?;
        if self.model.find_child(parent, namespace, &encoded).is_some() {
            return Err(Error::invalid_input(format!("path '{}' already exists in this namespace", path)));
        }
        self.model.insert_child(parent, namespace, encoded, node_id);
        Ok(())
    }

    /// Adds a single-namespace hard link from `new_path` to the node currently reachable via
    /// `existing_path` in `existing_namespace`, without touching any other namespace.
    pub fn add_hard_link(&mut self, existing_namespace: Namespace, existing_path: &str, new_namespace: Namespace, new_path: &str) -> Result<()> {
        self.ensure_open()?;
        let node_id = self.resolve_path(existing_namespace, existing_path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist in the source namespace", existing_path)))?;
        self.link_existing(node_id, new_namespace, new_path)?;
        self.maybe_reconcile()?;
        Ok(())
    }

    pub fn rm_hard_link(&mut self, namespace: Namespace, path: &str) -> Result<()> {
        self.ensure_open()?;
        let (parent, components) = self.resolve_parent(path, namespace)?;
        let name = components.last().unwrap();
        let encoded = encode_component(namespace, name)?;
        self.model.remove_child(parent, namespace, &encoded)
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist in this namespace", path)))?;
        self.maybe_reconcile()?;
        Ok(())
    }

    /// Removes a file's links from every namespace it is currently reachable through.
    pub fn rm_file(&mut self, path: &str, namespace: Namespace) -> Result<()> {
        let node_id = self.resolve_path(namespace, path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist", path)))?;
        for candidate_namespace in [Namespace::Iso9660, Namespace::Joliet, Namespace::Udf] {
            if let Some(encoded) = self.find_encoded_name_for(node_id, candidate_namespace) {
                let parent = self.find_parent_of(node_id, candidate_namespace);
                if let Some(parent) = parent {
                    self.model.remove_child(parent, candidate_namespace, &encoded);
                }
            }
        }
        self.maybe_reconcile()?;
        Ok(())
    }

    pub fn add_directory(&mut self, path: &str, namespace: Namespace) -> Result<()> {
        self.ensure_open()?;
        let (parent, components) = self.resolve_parent(path, namespace)?;
        let name = components.last().unwrap();
        let encoded = encode_component(namespace, name)?;
        if self.model.find_child(parent, namespace, &encoded).is_some() {
            return Err(Error::invalid_input(format!("path '{}' already exists", path)));
        }
        let mut dir = Node::empty(NodeKind::Directory);
        let view = crate::node::RecordView { flags: DirectoryRecordFlags::DIRECTORY, ..Default::default() };
        match namespace {
            Namespace::Iso9660 | Namespace::RockRidge => dir.iso9660 = Some(view),
            Namespace::Joliet => dir.joliet = Some(view),
            Namespace::Udf => dir.udf = Some(view),
        }
        let dir_id = self.model.push_node(dir);
        self.model.insert_child(parent, namespace, encoded, dir_id);
        self.maybe_reconcile()?;
        Ok(())
    }

    pub fn rm_directory(&mut self, path: &str, namespace: Namespace) -> Result<()> {
        self.rm_hard_link(namespace, path)
    }

    /// Installs an El Torito boot catalog with a single non-emulated default entry pointing at
    /// `bootfile_path`'s image data. The extent itself isn't known until layout runs, so
    /// `load_rba` is patched in at write time from the boot file's real assigned extent; see
    /// [`Volume::resolve_boot_catalog`].
    pub fn add_eltorito(&mut self, bootfile_path: &str, platform: Platform, emulation: Emulation) -> Result<()> {
        self.ensure_open()?;
        let node_id = self.resolve_path(Namespace::Iso9660, bootfile_path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist", bootfile_path)))?;
        self.boot_image_node = Some(node_id);
        self.boot_catalog = Some(BootCatalog {
            validation: ValidationEntry { platform, id_string: [0x20; 24] },
            default_entry: BootImageEntry {
                bootable: true,
                emulation,
                load_segment: 0,
                system_type: 0,
                sector_count: BootImageEntry::DEFAULT_SECTOR_COUNT,
                load_rba: 0,
                selection_criteria: 0,
            },
            sections: Vec::new(),
        });
        self.maybe_reconcile()?;
        Ok(())
    }

    /// The installed El Torito boot catalog, if any. `load_rba` here is a template value (patched
    /// to the boot image's real extent only at write time); after `open_fp`, it already reflects
    /// the extent the image was read from.
    pub fn boot_catalog(&self) -> Option<&BootCatalog> {
        self.boot_catalog.as_ref()
    }

    pub fn rm_eltorito(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.boot_catalog = None;
        self.boot_image_node = None;
        self.maybe_reconcile()?;
        Ok(())
    }

    /// Builds the final boot catalog for writing, with `default_entry.load_rba` patched to the
    /// boot image's real extent as assigned by `layout`. Returns `None` if no boot catalog is
    /// installed.
    fn resolve_boot_catalog(&self, layout: &Layout) -> Result<Option<BootCatalog>> {
        let Some(template) = &self.boot_catalog else { return Ok(None) };
        let node_id = self.boot_image_node
            .ok_or_else(|| Error::internal("boot catalog is installed but its boot image node was lost"))?;
        let (extent, _) = layout.payload_extents.get(&node_id).copied()
            .ok_or_else(|| Error::internal("boot image has no assigned extent; run force_consistency first"))?;
        let mut catalog = template.clone();
        catalog.default_entry.load_rba = extent;
        Ok(Some(catalog))
    }

    /// Installs isohybrid boot code (an MBR plus any loader bytes it needs) into the system area,
    /// blocks 0-15, making the image directly bootable as a USB/disk image as well as optical
    /// media. Requires an El Torito boot catalog, since the MBR's partition entry points at the
    /// same boot image.
    pub fn add_isohybrid(&mut self, mbr_template: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.boot_catalog.is_none() {
            return Err(Error::invalid_input("add_isohybrid requires an El Torito boot catalog"));
        }
        if mbr_template.len() > SYSTEM_AREA_SIZE {
            return Err(Error::invalid_input(format!(
                "isohybrid image of {} bytes exceeds the {}-byte system area",
                mbr_template.len(), SYSTEM_AREA_SIZE,
            )));
        }
        self.hybrid_mbr = Some(mbr_template.to_vec());
        Ok(())
    }

    pub fn rm_isohybrid(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.hybrid_mbr = None;
        Ok(())
    }

    /// Returns the namespace-specific record metadata for `path`, as last computed by
    /// [`Volume::force_consistency`] (extent/length may be stale relative to in-memory edits made
    /// since the last reconcile).
    pub fn get_record(&self, namespace: Namespace, path: &str) -> Result<crate::node::RecordView> {
        let node_id = self.resolve_path(namespace, path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist", path)))?;
        let node = self.model.node(node_id);
        let view = match namespace {
            Namespace::Iso9660 | Namespace::RockRidge => &node.iso9660,
            Namespace::Joliet => &node.joliet,
            Namespace::Udf => &node.udf,
        };
        view.clone().ok_or_else(|| Error::invalid_input(format!("'{}' has no record in the {:?} namespace", path, namespace)))
    }

    /// Replaces the bytes of an existing file without moving any other metadata. See C8.
    pub fn modify_file_in_place<R: Read>(&mut self, mut stream: R, length: u64, iso_path: &str) -> Result<()> {
        self.ensure_open()?;
        let node_id = self.resolve_path(Namespace::Iso9660, iso_path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist", iso_path)))?;
        let payload_id = self.model.node(node_id).payload
            .ok_or_else(|| Error::internal("file node has no payload"))?;
        let current_length = self.model.payload(payload_id).source.length();
        check_in_place_replacement(current_length, length)?;

        let mut bytes = Vec::with_capacity(length as usize);
        stream.take(length).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != length {
            return Err(Error::invalid_input("stream yielded fewer bytes than the declared length"));
        }
        self.model.payloads[payload_id.0] = Payload { source: PayloadSource::Owned(bytes) };
        let node = self.model.node_mut(node_id);
        if let Some(view) = &mut node.iso9660 {
            view.data_length = Some(length);
        }
        if let Some(view) = &mut node.joliet {
            view.data_length = Some(length);
        }
        // No layout change: record extents/sizes are patched directly; `dirty` stays false so a
        // subsequent `write` does not re-run the planner.
        Ok(())
    }

    /// Re-runs the layout planner unconditionally.
    pub fn force_consistency(&mut self) -> Result<Layout> {
        self.ensure_open()?;
        force_consistency(&mut self.model, self.namespaces.joliet, self.boot_catalog.as_ref())
    }

    pub fn walk(&self, namespace: Namespace) -> Vec<String> {
        let mut out = Vec::new();
        self.walk_into(ROOT_NODE, namespace, &mut Vec::new(), &mut out);
        out
    }

    fn walk_into(&self, node_id: NodeId, namespace: Namespace, prefix: &mut Vec<String>, out: &mut Vec<String>) {
        out.push(join_absolute_path(prefix));
        if let Some(children) = self.model.node(node_id).children.get(&namespace) {
            for entry in children {
                prefix.push(decode_component(namespace, &entry.name));
                self.walk_into(entry.child, namespace, prefix, out);
                prefix.pop();
            }
        }
    }

    pub fn list_children(&self, path: &str, namespace: Namespace) -> Result<Vec<String>> {
        let node_id = self.resolve_path(namespace, path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist", path)))?;
        let children = self.model.node(node_id).children.get(&namespace).cloned().unwrap_or_default();
        Ok(children.iter().map(|e| decode_component(namespace, &e.name)).collect())
    }

    pub fn resolve_path(&self, namespace: Namespace, path: &str) -> Result<Option<NodeId>> {
        let components = split_absolute_path(path)?;
        let mut current = ROOT_NODE;
        for component in &components {
            let encoded = encode_component(namespace, component)?;
            match self.model.find_child(current, namespace, &encoded) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn find_encoded_name_for(&self, node_id: NodeId, namespace: Namespace) -> Option<Vec<u8>> {
        self.model.nodes.iter()
            .flat_map(|n| n.children.get(&namespace).into_iter().flatten())
            .find(|e| e.child == node_id)
            .map(|e| e.name.clone())
    }

    fn find_parent_of(&self, node_id: NodeId, namespace: Namespace) -> Option<NodeId> {
        self.model.nodes.iter().enumerate()
            .find(|(_, n)| n.children.get(&namespace).map(|c| c.iter().any(|e| e.child == node_id)).unwrap_or(false))
            .map(|(i, _)| NodeId(i))
    }

    pub fn close(mut self) {
        self.closed = true;
    }
}

impl<S: Read + Seek> Volume<S> {
    /// Parses an existing image from `stream`.
    pub fn open_fp(mut stream: S, rock_ridge_enabled: bool) -> Result<Self> {
        let result = parse(&mut stream, rock_ridge_enabled)?;
        let volume_identifier = String::from_utf8_lossy(&result.primary.volume_identifier).trim_end().to_string();
        info!(volume_identifier = %volume_identifier, joliet = result.joliet.is_some(), "opened volume");
        Ok(Self {
            model: result.model,
            namespaces: Namespaces {
                rock_ridge: result.rock_ridge_enabled,
                joliet: result.joliet.is_some(),
                udf: false,
            },
            volume_identifier,
            boot_catalog: result.boot_catalog,
            boot_image_node: None,
            source: Some(stream),
            always_consistent: false,
            closed: false,
            hybrid_mbr: None,
        })
    }

    /// Reads a file's full contents, whether it came from the original image or was added since.
    /// Takes `&mut self` because extracting an image-backed payload seeks the shared source.
    pub fn get_file_from_iso(&mut self, iso_path: &str) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_file_from_iso(iso_path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Streams a file's contents without buffering them all at once.
    pub fn open_file_from_iso(&mut self, iso_path: &str) -> Result<Box<dyn Read + '_>> {
        let node_id = self.resolve_path(Namespace::Iso9660, iso_path)?
            .ok_or_else(|| Error::invalid_input(format!("'{}' does not exist", iso_path)))?;
        let payload_id = self.model.node(node_id).payload
            .ok_or_else(|| Error::invalid_input(format!("'{}' is not a file", iso_path)))?;
        match &self.model.payload(payload_id).source {
            PayloadSource::Owned(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            PayloadSource::ImageRange { start_block, length } => {
                let (start_block, length) = (*start_block, *length);
                let source = self.source.as_mut()
                    .ok_or_else(|| Error::internal("volume has no backing image source"))?;
                source.seek(std::io::SeekFrom::Start(start_block as u64 * crate::voldesc::LOGICAL_BLOCK_SIZE as u64))?;
                Ok(Box::new(source.take(length)))
            },
        }
    }
}

impl<S> Volume<S> {
    /// Reconciles if needed, then streams the image to `sink`.
    ///
    /// Rejects volumes opened with the UDF namespace enabled: the UDF codec (anchor/partition/
    /// file-set/file-entry descriptors, CS0 strings, tag CRCs) is implemented in [`crate::udf`],
    /// but layout assignment and writer emission for the UDF directory tree are not, so writing
    /// such a volume today would silently drop every UDF-namespace link. See DESIGN.md.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()>
    where
        S: Read + Seek,
    {
        self.ensure_open()?;
        if self.namespaces.udf {
            return Err(Error::invalid_input(
                "writing a volume with the UDF namespace enabled is not supported: UDF layout \
                 assignment and write emission are not implemented (see DESIGN.md)",
            ));
        }
        let layout = force_consistency(&mut self.model, self.namespaces.joliet, self.boot_catalog.as_ref())?;
        let boot_catalog = self.resolve_boot_catalog(&layout)?;
        write_image(
            sink, &self.model, &layout, &self.volume_identifier, self.namespaces.joliet,
            self.hybrid_mbr.as_deref(), boot_catalog.as_ref(), self.source.as_mut(),
        )
    }

    /// As [`Volume::write`]; kept under the name spec.md's external interface uses for the
    /// stream-taking overload, alongside the path-taking [`Volume::write_to_file`].
    pub fn write_fp<W: Write>(&mut self, sink: &mut W) -> Result<()>
    where
        S: Read + Seek,
    {
        self.write(sink)
    }

    /// As [`Volume::write`], creating (or truncating) a local file at `local_path`.
    pub fn write_to_file(&mut self, local_path: &Path) -> Result<()>
    where
        S: Read + Seek,
    {
        let mut file = File::create(local_path)?;
        self.write(&mut file)
    }
}

fn encode_component(namespace: Namespace, component: &str) -> Result<Vec<u8>> {
    match namespace {
        // File identifier syntax layers '.' and ';N' on top of d-characters; validate only the
        // d-character runs between those separators, not the whole identifier.
        Namespace::Iso9660 => {
            for part in component.split(['.', ';']) {
                validate_d_characters(part)?;
            }
            Ok(component.as_bytes().to_vec())
        },
        // Rock Ridge names are arbitrary POSIX filenames, not restricted to d-/a-characters.
        Namespace::RockRidge => Ok(component.as_bytes().to_vec()),
        Namespace::Joliet => crate::codec::str_to_ucs2be(component),
        Namespace::Udf => crate::udf::str_to_cs0(component),
    }
}

fn decode_component(namespace: Namespace, encoded: &[u8]) -> String {
    match namespace {
        Namespace::Iso9660 | Namespace::RockRidge => String::from_utf8_lossy(encoded).into_owned(),
        Namespace::Joliet => crate::codec::ucs2be_to_str(encoded).unwrap_or_default(),
        Namespace::Udf => crate::udf::cs0_to_str(encoded).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn new_volume_starts_empty() {
        let volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces::default()).unwrap();
        assert_eq!(volume.walk(Namespace::Iso9660), vec!["/".to_string()]);
    }

    #[test]
    fn add_and_write_a_file_round_trips() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces::default()).unwrap();
        volume.add_fp(Cursor::new(b"hi".to_vec()), 2, Some("/HI.TXT"), None, None).unwrap();
        let mut out = Cursor::new(Vec::new());
        volume.write(&mut out).unwrap();
        assert!(!out.into_inner().is_empty());
    }

    #[test]
    fn rm_file_removes_every_namespace_link() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces { joliet: true, ..Default::default() }).unwrap();
        volume.add_fp(Cursor::new(b"hi".to_vec()), 2, Some("/HI.TXT"), Some("/hi.txt"), None).unwrap();
        volume.rm_file("/HI.TXT", Namespace::Iso9660).unwrap();
        assert!(volume.resolve_path(Namespace::Iso9660, "/HI.TXT").unwrap().is_none());
        assert!(volume.resolve_path(Namespace::Joliet, "/hi.txt").unwrap().is_none());
    }

    #[test]
    fn modify_file_in_place_rejects_growth() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces::default()).unwrap();
        volume.add_fp(Cursor::new(vec![0u8; 10]), 10, Some("/A"), None, None).unwrap();
        let err = volume.modify_file_in_place(Cursor::new(vec![0u8; 3000]), 3000, "/A").unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn get_record_reports_the_file_s_iso9660_view() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces::default()).unwrap();
        volume.add_fp(Cursor::new(b"hi".to_vec()), 2, Some("/HI.TXT"), None, None).unwrap();
        volume.force_consistency().unwrap();
        let record = volume.get_record(Namespace::Iso9660, "/HI.TXT").unwrap();
        assert_eq!(record.data_length, Some(2));
    }

    #[test]
    fn isohybrid_requires_a_boot_catalog() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces::default()).unwrap();
        let err = volume.add_isohybrid(&[0u8; 440]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn isohybrid_mbr_is_written_to_the_system_area() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces::default()).unwrap();
        volume.add_fp(Cursor::new(vec![0u8; 512]), 512, Some("/BOOT.IMG"), None, None).unwrap();
        volume.add_eltorito("/BOOT.IMG", crate::eltorito::Platform::X86, crate::eltorito::Emulation::NoEmulation).unwrap();
        volume.add_isohybrid(b"\xEB\x48loader-stub").unwrap();
        let mut out = Cursor::new(Vec::new());
        volume.write_fp(&mut out).unwrap();
        let bytes = out.into_inner();
        assert!(bytes.starts_with(b"\xEB\x48loader-stub"));
        assert_eq!(&bytes[2048 * 16 + 1..2048 * 16 + 6], b"CD001");

        let boot_record_block = (2048 * 17) as usize;
        assert_eq!(&bytes[boot_record_block + 7..boot_record_block + 30], crate::voldesc::BootRecordDescriptor::EL_TORITO_SYSTEM_IDENTIFIER);
    }

    #[test]
    fn write_rejects_a_udf_enabled_volume() {
        let mut volume = Volume::<Cursor<Vec<u8>>>::new("MYVOL", Namespaces { udf: true, ..Default::default() }).unwrap();
        volume.add_fp(Cursor::new(b"hi".to_vec()), 2, None, None, Some("/hi.txt")).unwrap();
        let mut out = Cursor::new(Vec::new());
        let err = volume.write(&mut out).unwrap_err();
        assert!(err.is_invalid_input());
    }
}
