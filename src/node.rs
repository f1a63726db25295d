//! Arena-based in-memory volume model (C6).
//!
//! Grounded on `dllexports::formats::cdrom::Cdrom`'s `BTreeMap<PathBuf, FileEntry>` index,
//! generalized from "one flat index" to "one arena of nodes plus one child list per directory per
//! namespace", so that a single payload can be hard-linked into up to four independent
//! hierarchies. Arena indices replace pointers/`Rc` the way `dllexports::formats::cdrom` already
//! prefers owned collections over a pointer graph.

use std::collections::BTreeMap;

use crate::codec::RecordingDate;
use crate::path::Namespace;
use crate::record::DirectoryRecordFlags;

/// Index into [`VolumeModel::nodes`]. `0` is always the root directory.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub usize);
pub const ROOT_NODE: NodeId = NodeId(0);

/// Index into [`VolumeModel::payloads`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PayloadId(pub usize);

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NodeKind {
    Directory,
    File,
    /// A Rock Ridge symbolic link; its target is the `SL` reconstruction, carried on the node
    /// rather than on any one `RecordView` since symlinks only ever exist in the Rock Ridge view.
    Symlink(String),
}

/// Where a file's bytes come from. Shared by every hard-link of the same payload.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PayloadSource {
    /// A byte range of the image this volume was opened from.
    ImageRange { start_block: u32, length: u64 },
    /// Bytes supplied directly by the caller (`add_fp`/`modify_file_in_place` with an in-memory
    /// buffer, or any file read off the local filesystem by `add_file`).
    Owned(Vec<u8>),
}
impl PayloadSource {
    pub fn length(&self) -> u64 {
        match self {
            Self::ImageRange { length, .. } => *length,
            Self::Owned(bytes) => bytes.len() as u64,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Payload {
    pub source: PayloadSource,
}

/// Per-namespace metadata + layout state for one node. `extent`/`data_length` start `None` and
/// are filled in by [`crate::layout::force_consistency`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordView {
    /// Namespace-encoded name as it would appear in a directory record: d-characters + `;N` for
    /// ISO9660, UCS-2BE for Joliet, CS0 for UDF. Empty for the root.
    pub encoded_name: Vec<u8>,
    pub flags: DirectoryRecordFlags,
    pub recording_date: RecordingDate,
    pub extent: Option<u32>,
    pub data_length: Option<u64>,
}

/// Rock Ridge augments the ISO9660 view rather than owning its own directory tree, but it has an
/// independently addressable name and its own POSIX metadata, so it gets its own view struct.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RockRidgeView {
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub link_count: u32,
    /// Set when this node's Rock Ridge record was relocated under `RR_MOVED` (ISO9660 depth > 8).
    pub relocated: bool,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub child: NodeId,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Node {
    pub kind: NodeKind,
    pub payload: Option<PayloadId>,
    /// One child list per namespace this node participates in as a directory. Absent namespaces
    /// mean the directory does not exist (or is not yet populated) in that hierarchy.
    pub children: BTreeMap<Namespace, Vec<DirEntry>>,
    pub iso9660: Option<RecordView>,
    pub rock_ridge: Option<RockRidgeView>,
    pub joliet: Option<RecordView>,
    pub udf: Option<RecordView>,
}
impl Node {
    pub fn empty(kind: NodeKind) -> Self {
        Self {
            kind,
            payload: None,
            children: BTreeMap::new(),
            iso9660: None,
            rock_ridge: None,
            joliet: None,
            udf: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn in_namespace(&self, namespace: Namespace) -> bool {
        match namespace {
            Namespace::Iso9660 | Namespace::RockRidge => self.iso9660.is_some(),
            Namespace::Joliet => self.joliet.is_some(),
            Namespace::Udf => self.udf.is_some(),
        }
    }
}

/// The full in-memory filesystem arena for one volume, plus its dirty flag.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumeModel {
    pub nodes: Vec<Node>,
    pub payloads: Vec<Payload>,
    /// Set by any mutation; cleared by `force_consistency`.
    pub dirty: bool,
}
impl VolumeModel {
    pub fn new_empty() -> Self {
        let mut model = Self { nodes: Vec::new(), payloads: Vec::new(), dirty: true };
        model.nodes.push(Node::empty(NodeKind::Directory));
        model
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn payload(&self, id: PayloadId) -> &Payload {
        &self.payloads[id.0]
    }

    pub fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn push_payload(&mut self, payload: Payload) -> PayloadId {
        self.payloads.push(payload);
        PayloadId(self.payloads.len() - 1)
    }

    /// Looks up a direct child of `dir` in `namespace` by its namespace-encoded name.
    pub fn find_child(&self, dir: NodeId, namespace: Namespace, encoded_name: &[u8]) -> Option<NodeId> {
        self.node(dir).children.get(&namespace)
            .and_then(|entries| entries.iter().find(|e| e.name == encoded_name))
            .map(|e| e.child)
    }

    /// Inserts `child` under `dir` in `namespace`, keeping the list sorted per
    /// [`crate::sort::compare_encoded_names`].
    pub fn insert_child(&mut self, dir: NodeId, namespace: Namespace, name: Vec<u8>, child: NodeId) {
        let entries = self.node_mut(dir).children.entry(namespace).or_default();
        let pos = entries.binary_search_by(|e| crate::sort::compare_encoded_names(namespace, &e.name, &name))
            .unwrap_or_else(|p| p);
        entries.insert(pos, DirEntry { name, child });
        self.dirty = true;
    }

    /// Removes the link from `dir` to `child` in `namespace`, if present.
    pub fn remove_child(&mut self, dir: NodeId, namespace: Namespace, encoded_name: &[u8]) -> Option<NodeId> {
        let entries = self.node_mut(dir).children.get_mut(&namespace)?;
        let pos = entries.iter().position(|e| e.name == encoded_name)?;
        let removed = entries.remove(pos);
        self.dirty = true;
        Some(removed.child)
    }

    /// Counts directory-entry links referencing `node` across every namespace; used to decide
    /// whether removing one link also frees the payload.
    pub fn link_count(&self, node: NodeId) -> usize {
        self.nodes.iter()
            .flat_map(|n| n.children.values())
            .flat_map(|entries| entries.iter())
            .filter(|e| e.child == node)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_empty_has_just_the_root() {
        let model = VolumeModel::new_empty();
        assert_eq!(model.nodes.len(), 1);
        assert!(model.node(ROOT_NODE).is_directory());
        assert!(model.dirty);
    }

    #[test]
    fn insert_and_find_child_round_trips() {
        let mut model = VolumeModel::new_empty();
        let file = model.push_node(Node::empty(NodeKind::File));
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"FOO.TXT;1".to_vec(), file);
        assert_eq!(model.find_child(ROOT_NODE, Namespace::Iso9660, b"FOO.TXT;1"), Some(file));
        assert_eq!(model.find_child(ROOT_NODE, Namespace::Joliet, b"FOO.TXT;1"), None);
    }

    #[test]
    fn hard_link_is_reachable_from_two_directories() {
        let mut model = VolumeModel::new_empty();
        let dir = model.push_node(Node::empty(NodeKind::Directory));
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"SUB".to_vec(), dir);
        let file = model.push_node(Node::empty(NodeKind::File));
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"A.TXT;1".to_vec(), file);
        model.insert_child(dir, Namespace::Iso9660, b"B.TXT;1".to_vec(), file);
        assert_eq!(model.link_count(file), 2);
    }

    #[test]
    fn remove_child_drops_one_link_only() {
        let mut model = VolumeModel::new_empty();
        let dir = model.push_node(Node::empty(NodeKind::Directory));
        let file = model.push_node(Node::empty(NodeKind::File));
        model.insert_child(ROOT_NODE, Namespace::Iso9660, b"A.TXT;1".to_vec(), file);
        model.insert_child(dir, Namespace::Iso9660, b"B.TXT;1".to_vec(), file);
        model.remove_child(ROOT_NODE, Namespace::Iso9660, b"A.TXT;1");
        assert_eq!(model.link_count(file), 1);
    }
}
