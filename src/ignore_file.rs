// src/ignore_file.rs

//! Ignore-file exclusion filter
//!
//! A `.metapackignore` file at or above a resolved path excludes entries from
//! source resolution using gitignore syntax, including negation. The nearest
//! file ascending from the starting path wins; with no file present
//! everything is allowed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

use crate::tree::TreeContainer;

/// File name searched for when loading exclusion patterns
pub const IGNORE_FILE: &str = ".metapackignore";

/// Pattern filter sourced from the nearest ignore-file
///
/// Shared by reference between the resolver and every component it yields.
pub struct SourceIgnore {
    matcher: Gitignore,
    root: PathBuf,
    tree: Arc<dyn TreeContainer>,
}

impl SourceIgnore {
    /// Load the nearest ignore-file ascending from `start`
    ///
    /// `start` may be a file or a directory. Unparseable patterns are
    /// skipped with a warning rather than failing resolution.
    pub fn for_path(tree: Arc<dyn TreeContainer>, start: &Path) -> Self {
        let start_dir = if tree.is_directory(start).unwrap_or(false) {
            start.to_path_buf()
        } else {
            start.parent().map(Path::to_path_buf).unwrap_or_default()
        };

        let mut dir = Some(start_dir.clone());
        while let Some(current) = dir {
            let candidate = current.join(IGNORE_FILE);
            if tree.exists(&candidate) {
                debug!("loading ignore patterns from {}", candidate.display());
                return Self::from_file(tree, &current, &candidate);
            }
            dir = current.parent().map(Path::to_path_buf);
        }

        // Default-allow: an empty matcher rooted at the start directory.
        Self {
            matcher: Gitignore::empty(),
            root: start_dir,
            tree,
        }
    }

    fn from_file(tree: Arc<dyn TreeContainer>, root: &Path, file: &Path) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        match tree.read_file(file) {
            Ok(bytes) => {
                for line in String::from_utf8_lossy(&bytes).lines() {
                    if let Err(e) = builder.add_line(None, line) {
                        warn!("skipping unparseable ignore pattern {:?}: {}", line, e);
                    }
                }
            }
            Err(e) => warn!("failed to read {}: {}", file.display(), e),
        }
        let matcher = builder.build().unwrap_or_else(|e| {
            warn!("failed to build ignore matcher: {}", e);
            Gitignore::empty()
        });
        Self {
            matcher,
            root: root.to_path_buf(),
            tree,
        }
    }

    /// Whether the path is excluded by the loaded patterns
    pub fn denies(&self, path: &Path) -> bool {
        if self.matcher.is_empty() || !path.starts_with(&self.root) {
            return false;
        }
        let is_dir = self.tree.is_directory(path).unwrap_or(false);
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }

    /// Whether the path passes the loaded patterns
    pub fn accepts(&self, path: &Path) -> bool {
        !self.denies(path)
    }
}

impl std::fmt::Debug for SourceIgnore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceIgnore")
            .field("root", &self.root)
            .field("patterns", &self.matcher.num_ignores())
            .finish()
    }
}
