// src/tree/native.rs

//! Native filesystem backing for `TreeContainer`

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::tree::TreeContainer;

/// Tree served directly from the local filesystem
///
/// Entry names from `read_directory` are sorted so walks are deterministic
/// regardless of the underlying directory iteration order.
#[derive(Debug, Default)]
pub struct NativeTree;

impl NativeTree {
    pub fn new() -> Self {
        Self
    }
}

impl TreeContainer for NativeTree {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> Result<bool> {
        let meta = fs::metadata(path).map_err(|_| Error::PathNotFound(path.to_path_buf()))?;
        Ok(meta.is_dir())
    }

    fn read_directory(&self, path: &Path) -> Result<Vec<String>> {
        if !self.is_directory(path)? {
            return Err(Error::NotADirectory(path.to_path_buf()));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }
        Ok(fs::read(path)?)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        if !path.exists() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }
        Ok(Box::new(File::open(path)?))
    }
}
