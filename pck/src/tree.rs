//! Arena-based directory tree (§4.8): built from an archive's ordered entry
//! list, and flattened back into one when writing an archive out.

use std::collections::HashSet;

use crate::entry::{Entry, EntryKind};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// A snapshot view of one tree node, safe to hand to callers outside this
/// module.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub is_folder: bool,
    /// Index into the session's entry list, if this node has a backing
    /// entry (every node does except the implicit root).
    pub entry_index: Option<usize>,
}

#[derive(Debug)]
struct Arena {
    name: String,
    kind: EntryKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    entry_index: Option<usize>,
}

/// Strict parent/child tree rooted at an implicit empty-name node; no
/// cycles.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Arena>,
    root: NodeId,
}

impl Tree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Node {
        let a = &self.nodes[id.0];
        Node {
            name: a.name.clone(),
            is_folder: a.kind != EntryKind::File,
            entry_index: a.entry_index,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// I6-adjacent lookup: walks path components case-insensitively.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut cur = self.root;
        for comp in crate::path_codec::split_components(path) {
            cur = self.nodes[cur.0]
                .children
                .iter()
                .find(|c| self.nodes[c.0].name.eq_ignore_ascii_case(comp))
                .copied()?;
        }
        Some(cur)
    }

    pub fn full_path(&self, id: NodeId) -> String {
        let mut parts = vec![];
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == self.root {
                break;
            }
            parts.push(self.nodes[c.0].name.clone());
            cur = self.nodes[c.0].parent;
        }
        parts.reverse();
        parts.join("/")
    }

    fn new_node(&mut self, name: String, kind: EntryKind, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Arena {
            name,
            kind,
            parent: Some(parent),
            children: vec![],
            entry_index: None,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Builds a tree from an ordered entry list (the final entry, the tail,
    /// is skipped). Duplicate paths fail with `DuplicatePath` (I7).
    pub fn build(entries: &[Entry]) -> Result<Self, Error> {
        let mut tree = Tree {
            nodes: vec![Arena {
                name: String::new(),
                kind: EntryKind::Folder,
                parent: None,
                children: vec![],
                entry_index: None,
            }],
            root: NodeId(0),
        };
        let mut seen = HashSet::new();

        for (index, entry) in entries.iter().enumerate() {
            if entry.is_tail() {
                continue;
            }
            if !seen.insert(entry.name.to_lowercase()) {
                return Err(Error::DuplicatePath(entry.name.clone()));
            }

            let components = crate::path_codec::split_components(&entry.name);
            if components.is_empty() {
                return Err(Error::DuplicatePath(entry.name.clone()));
            }

            let mut cur = tree.root;
            let last = components.len() - 1;
            for (i, comp) in components.iter().enumerate() {
                let existing = tree.nodes[cur.0]
                    .children
                    .iter()
                    .find(|c| tree.nodes[c.0].name.eq_ignore_ascii_case(comp))
                    .copied();
                cur = match existing {
                    Some(id) => id,
                    None => {
                        let kind = if i == last { entry.kind } else { EntryKind::Folder };
                        tree.new_node((*comp).to_string(), kind, cur)
                    }
                };
            }
            tree.nodes[cur.0].entry_index = Some(index);
        }
        Ok(tree)
    }

    /// Depth-first flatten (§4.8's reverse direction): parent before
    /// children, folders before files at the same level, children in
    /// case-insensitive lexical order. The root is excluded from the
    /// output.
    pub fn flatten(&self) -> Vec<NodeId> {
        let mut out = vec![];
        self.flatten_from(self.root, &mut out);
        out
    }

    fn flatten_from(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if id != self.root {
            out.push(id);
        }
        let mut children = self.nodes[id.0].children.clone();
        children.sort_by(|a, b| {
            let na = &self.nodes[a.0];
            let nb = &self.nodes[b.0];
            (na.kind == EntryKind::File, na.name.to_lowercase())
                .cmp(&(nb.kind == EntryKind::File, nb.name.to_lowercase()))
        });
        for c in children {
            self.flatten_from(c, out);
        }
    }
}
