// src/convert/writers.rs

//! Write-instruction consumers
//!
//! Transformers emit `WriteInfo`s; writers stage and commit them. The
//! standard writer stages a component's files in a temp directory and
//! renames them into place, so a component either lands whole or not at
//! all. The zip writer accumulates an in-memory archive and hands back a
//! single byte buffer on finalize.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;

use crate::component::SourceComponent;
use crate::error::{Error, Result};

/// Byte source for one write instruction
pub enum WriteSource {
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl WriteSource {
    pub(crate) fn copy_to(self, dest: &mut dyn Write) -> io::Result<u64> {
        match self {
            WriteSource::Bytes(bytes) => {
                dest.write_all(&bytes)?;
                Ok(bytes.len() as u64)
            }
            WriteSource::Stream(mut stream) => io::copy(&mut stream, dest),
        }
    }
}

impl std::fmt::Debug for WriteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            WriteSource::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// One `(source, destination)` pair
///
/// `output` is package-relative unless a merge rebased it onto an existing
/// component's absolute location.
#[derive(Debug)]
pub struct WriteInfo {
    pub source: WriteSource,
    pub output: PathBuf,
}

/// Everything a writer needs to commit one component
#[derive(Debug)]
pub struct WriterFormat {
    pub component: SourceComponent,
    pub write_infos: Vec<WriteInfo>,
}

/// Consumes write instructions a component at a time
pub trait MetadataWriter {
    /// Stage and commit one component's writes
    fn write(&mut self, format: WriterFormat) -> Result<()>;

    /// Commit a loose file outside any component, e.g. the manifest
    fn write_raw(&mut self, output: &Path, data: Vec<u8>) -> Result<()>;
}

/// Writes components into a directory tree
///
/// All of a component's files are staged into a temp directory under the
/// root first; a failure there drops the staging area and leaves the tree
/// untouched. Staged files are then renamed into place.
pub struct StandardWriter {
    root: PathBuf,
}

impl StandardWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn destination(&self, output: &Path) -> PathBuf {
        if output.is_absolute() {
            output.to_path_buf()
        } else {
            self.root.join(output)
        }
    }
}

impl MetadataWriter for StandardWriter {
    fn write(&mut self, format: WriterFormat) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging")
            .tempdir_in(&self.root)
            .map_err(|e| Error::Write(format!("failed to create staging area: {e}")))?;

        // Stage everything first; any failure here rolls the component back
        // by dropping the staging directory.
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (index, info) in format.write_infos.into_iter().enumerate() {
            let staged_path = staging.path().join(format!("wi-{index}"));
            let mut file = File::create(&staged_path)
                .map_err(|e| Error::Write(format!("failed to stage {}: {e}", info.output.display())))?;
            info.source
                .copy_to(&mut file)
                .map_err(|e| Error::Write(format!("failed to stage {}: {e}", info.output.display())))?;
            staged.push((staged_path, self.destination(&info.output)));
        }

        for (staged_path, dest) in staged {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Write(format!("failed to create {}: {e}", parent.display())))?;
            }
            fs::rename(&staged_path, &dest)
                .or_else(|_| fs::copy(&staged_path, &dest).map(|_| ()))
                .map_err(|e| Error::Write(format!("failed to commit {}: {e}", dest.display())))?;
        }

        debug!("committed {}", format.component.full_name());
        Ok(())
    }

    fn write_raw(&mut self, output: &Path, data: Vec<u8>) -> Result<()> {
        let dest = self.destination(output);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, data).map_err(|e| Error::Write(format!("failed to write {}: {e}", dest.display())))
    }
}

/// Accumulates components into an in-memory zip archive
pub struct ZipWriter {
    inner: zip::ZipWriter<Cursor<Vec<u8>>>,
}

impl Default for ZipWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipWriter {
    pub fn new() -> Self {
        Self {
            inner: zip::ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Finish the archive and return the packaged bytes
    pub fn finalize(self) -> Result<Vec<u8>> {
        let cursor = self
            .inner
            .finish()
            .map_err(|e| Error::Write(format!("failed to finalize archive: {e}")))?;
        Ok(cursor.into_inner())
    }

    fn add_entry(&mut self, output: &Path, data: &[u8]) -> Result<()> {
        let name = zip_entry_name(output);
        self.inner
            .start_file(name.as_str(), SimpleFileOptions::default())
            .map_err(|e| Error::Write(format!("failed to add {name}: {e}")))?;
        self.inner
            .write_all(data)
            .map_err(|e| Error::Write(format!("failed to add {name}: {e}")))?;
        Ok(())
    }
}

/// Archive entry names always use forward slashes
fn zip_entry_name(path: &Path) -> String {
    path.iter()
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl MetadataWriter for ZipWriter {
    fn write(&mut self, format: WriterFormat) -> Result<()> {
        // Buffer the whole component before touching the archive so a read
        // failure cannot leave a partial component behind.
        let mut buffered: Vec<(PathBuf, Vec<u8>)> = Vec::new();
        for info in format.write_infos {
            let mut data = Vec::new();
            info.source
                .copy_to(&mut data)
                .map_err(|e| Error::Write(format!("failed to read {}: {e}", info.output.display())))?;
            buffered.push((info.output, data));
        }
        for (output, data) in buffered {
            self.add_entry(&output, &data)?;
        }
        debug!("archived {}", format.component.full_name());
        Ok(())
    }

    fn write_raw(&mut self, output: &Path, data: Vec<u8>) -> Result<()> {
        self.add_entry(output, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore_file::SourceIgnore;
    use crate::registry::Registry;
    use crate::tree::{TreeContainer, VirtualDirectory, VirtualFile, VirtualTree};
    use std::io::Read as _;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn component() -> SourceComponent {
        let registry = Registry::load().unwrap();
        let tree: Arc<dyn TreeContainer> = Arc::new(VirtualTree::new(vec![
            VirtualDirectory::new("pkg/classes", vec![VirtualFile::empty("A.cls")]),
        ]));
        let ignore = Arc::new(SourceIgnore::for_path(Arc::clone(&tree), Path::new("pkg")));
        SourceComponent::new(registry.by_id("apexclass").unwrap(), "A", tree, ignore)
            .with_content("pkg/classes/A.cls")
    }

    fn format_with(infos: Vec<WriteInfo>) -> WriterFormat {
        WriterFormat {
            component: component(),
            write_infos: infos,
        }
    }

    #[test]
    fn test_standard_writer_commits_files() {
        let out = TempDir::new().unwrap();
        let mut writer = StandardWriter::new(out.path());
        writer
            .write(format_with(vec![
                WriteInfo {
                    source: WriteSource::Bytes(b"public class A {}".to_vec()),
                    output: PathBuf::from("classes/A.cls"),
                },
                WriteInfo {
                    source: WriteSource::Bytes(b"<ApexClass/>".to_vec()),
                    output: PathBuf::from("classes/A.cls-meta.xml"),
                },
            ]))
            .unwrap();

        let written = fs::read(out.path().join("classes/A.cls")).unwrap();
        assert_eq!(written, b"public class A {}");
        assert!(out.path().join("classes/A.cls-meta.xml").exists());
        // No staging leftovers.
        let leftovers: Vec<_> = fs::read_dir(out.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_standard_writer_rolls_back_on_stage_failure() {
        struct FailingRead;
        impl Read for FailingRead {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("boom"))
            }
        }

        let out = TempDir::new().unwrap();
        let mut writer = StandardWriter::new(out.path());
        let err = writer
            .write(format_with(vec![
                WriteInfo {
                    source: WriteSource::Bytes(b"ok".to_vec()),
                    output: PathBuf::from("classes/A.cls"),
                },
                WriteInfo {
                    source: WriteSource::Stream(Box::new(FailingRead)),
                    output: PathBuf::from("classes/A.cls-meta.xml"),
                },
            ]))
            .unwrap_err();
        assert!(matches!(err, Error::Write(_)));

        // Nothing committed, staging cleaned up.
        assert!(!out.path().join("classes").exists());
    }

    #[test]
    fn test_zip_writer_round_trip() {
        let mut writer = ZipWriter::new();
        writer
            .write(format_with(vec![WriteInfo {
                source: WriteSource::Bytes(b"public class A {}".to_vec()),
                output: PathBuf::from("classes/A.cls"),
            }]))
            .unwrap();
        writer
            .write_raw(Path::new("package.xml"), b"<Package/>".to_vec())
            .unwrap();

        let bytes = writer.finalize().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["classes/A.cls", "package.xml"]);

        let mut content = String::new();
        archive
            .by_name("classes/A.cls")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "public class A {}");
    }
}
