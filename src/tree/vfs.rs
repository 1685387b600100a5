// src/tree/vfs.rs

//! In-memory virtual tree backing
//!
//! Used by tests and by callers that already hold file data (for example a
//! retrieved archive unpacked in memory). Nodes live in an arena `Vec` and a
//! path index gives O(1) lookup, so repeated resolver probes stay cheap.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tree::TreeContainer;

/// Index into the node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(usize);

#[derive(Debug)]
enum NodeKind {
    Directory { children: Vec<NodeId> },
    File { data: Vec<u8> },
}

#[derive(Debug)]
struct Node {
    name: String,
    kind: NodeKind,
}

/// One directory declaration used to seed a [`VirtualTree`]
#[derive(Debug, Clone)]
pub struct VirtualDirectory {
    pub dir_path: PathBuf,
    pub children: Vec<VirtualFile>,
}

impl VirtualDirectory {
    pub fn new(dir_path: impl Into<PathBuf>, children: Vec<VirtualFile>) -> Self {
        Self {
            dir_path: dir_path.into(),
            children,
        }
    }
}

/// A child entry inside a [`VirtualDirectory`]
#[derive(Debug, Clone)]
pub struct VirtualFile {
    pub name: String,
    pub data: Option<Vec<u8>>,
    is_dir: bool,
}

impl VirtualFile {
    /// A file entry with empty content
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
            is_dir: false,
        }
    }

    /// A file entry with content
    pub fn data(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
            is_dir: false,
        }
    }

    /// A subdirectory entry; its own children come from a separate
    /// `VirtualDirectory` declaration with the joined path.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
            is_dir: true,
        }
    }
}

/// Arena-backed in-memory tree
#[derive(Debug, Default)]
pub struct VirtualTree {
    nodes: Vec<Node>,
    path_index: HashMap<PathBuf, NodeId>,
}

impl VirtualTree {
    /// Build a tree from directory declarations
    ///
    /// Ancestor directories of every declared path are created implicitly.
    /// A child marked as a directory may carry its own declaration; one
    /// without it is simply an empty directory.
    pub fn new(directories: Vec<VirtualDirectory>) -> Self {
        let mut tree = Self::default();
        for decl in &directories {
            tree.ensure_directory(&decl.dir_path);
        }
        for decl in directories {
            for child in decl.children {
                let path = decl.dir_path.join(&child.name);
                if child.is_dir {
                    tree.ensure_directory(&path);
                } else {
                    tree.insert_file(&path, child.data.unwrap_or_default());
                }
            }
        }
        tree
    }

    fn ensure_directory(&mut self, path: &Path) -> NodeId {
        if let Some(&id) = self.path_index.get(path) {
            return id;
        }
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = self.push_node(Node {
            name,
            kind: NodeKind::Directory {
                children: Vec::new(),
            },
        });
        self.path_index.insert(path.to_path_buf(), id);
        if let Some(parent) = parent {
            let parent_id = self.ensure_directory(parent);
            self.attach(parent_id, id);
        }
        id
    }

    fn insert_file(&mut self, path: &Path, data: Vec<u8>) {
        if self.path_index.contains_key(path) {
            return;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = self.push_node(Node {
            name,
            kind: NodeKind::File { data },
        });
        self.path_index.insert(path.to_path_buf(), id);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let parent_id = self.ensure_directory(parent);
            self.attach(parent_id, id);
        }
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let NodeKind::Directory { children } = &mut self.nodes[parent.0].kind {
            children.push(child);
        }
    }

    fn get(&self, path: &Path) -> Result<&Node> {
        self.path_index
            .get(path)
            .map(|id| &self.nodes[id.0])
            .ok_or_else(|| Error::PathNotFound(path.to_path_buf()))
    }
}

impl TreeContainer for VirtualTree {
    fn exists(&self, path: &Path) -> bool {
        self.path_index.contains_key(path)
    }

    fn is_directory(&self, path: &Path) -> Result<bool> {
        Ok(matches!(self.get(path)?.kind, NodeKind::Directory { .. }))
    }

    fn read_directory(&self, path: &Path) -> Result<Vec<String>> {
        match &self.get(path)?.kind {
            NodeKind::Directory { children } => {
                let mut names: Vec<String> = children
                    .iter()
                    .map(|id| self.nodes[id.0].name.clone())
                    .collect();
                names.sort();
                Ok(names)
            }
            NodeKind::File { .. } => Err(Error::NotADirectory(path.to_path_buf())),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        match &self.get(path)?.kind {
            NodeKind::File { data } => Ok(data.clone()),
            NodeKind::Directory { .. } => Err(Error::PathNotFound(path.to_path_buf())),
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read_file(path)?)))
    }
}
