// src/tree/mod.rs

//! Read-only file tree abstraction
//!
//! Resolution and conversion never touch the filesystem directly; they go
//! through `TreeContainer` so the same walk can run against the native
//! filesystem, an in-memory virtual tree, or any other backing that honors
//! the contract (for example a version-control snapshot loaded up front).
//!
//! Contracts:
//! - Paths are OS-normalized by the caller.
//! - `read_directory` returns entry names only, never joined paths.
//! - Trees are read-only and shareable; all mutation happens in writers.

mod native;
mod vfs;

pub use native::NativeTree;
pub use vfs::{VirtualDirectory, VirtualFile, VirtualTree};

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Read-only view over a file hierarchy
pub trait TreeContainer: Send + Sync {
    /// Whether the path exists in this tree
    fn exists(&self, path: &Path) -> bool;

    /// Whether the path names a directory
    ///
    /// Errors with `PathNotFound` if the path does not exist.
    fn is_directory(&self, path: &Path) -> Result<bool>;

    /// Entry names directly under a directory (not joined to the parent)
    fn read_directory(&self, path: &Path) -> Result<Vec<String>>;

    /// Full contents of a file
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file as a byte stream
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Every file at or below `root`, in sorted order
    ///
    /// Default implementation recurses through `read_directory`; backings
    /// with a cheaper listing may override.
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.is_directory(root)? {
            files.push(root.to_path_buf());
            return Ok(files);
        }
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for name in self.read_directory(&dir)? {
                let child = dir.join(&name);
                if self.is_directory(&child)? {
                    stack.push(child);
                } else {
                    files.push(child);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Split a path into its string segments
pub(crate) fn segments(path: &Path) -> Vec<String> {
    path.iter()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| s != "/" && s != "\\")
        .collect()
}
