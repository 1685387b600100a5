// src/convert/mod.rs

//! Format conversion pipeline
//!
//! The converter walks a component set, dispatches each component to its
//! type's transformer, and feeds the resulting write instructions to the
//! chosen writer. Commits happen per component: a failure surfaces
//! immediately, but components already committed stay committed.

pub mod transformers;
pub mod writers;

pub use transformers::{create_transformer, MetadataTransformer};
pub use writers::{MetadataWriter, StandardWriter, WriteInfo, WriteSource, WriterFormat, ZipWriter};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::component::{ComponentSet, MetadataComponent, SourceComponent};
use crate::error::Result;
use crate::registry::Registry;

/// Manifest file name written into packaged output
pub const PACKAGE_XML: &str = "package.xml";

/// The two on-disk layouts of the same logical components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// Flat packaged layout consumed by the remote service
    Metadata,
    /// Decomposed project layout
    Source,
}

/// Where converted output lands
pub enum ConvertOutput {
    /// Write under a directory root
    Directory(PathBuf),
    /// Write into existing components where they match, defaulting the rest
    /// under a directory root
    Merge {
        components: Vec<SourceComponent>,
        default_directory: PathBuf,
    },
    /// Accumulate a zip archive in memory
    Zip,
}

/// Outcome of one conversion call
#[derive(Debug)]
pub struct ConvertResult {
    /// Packaged archive bytes, for zip output
    pub packaged: Option<Vec<u8>>,
    /// Output root, for directory output
    pub location: Option<PathBuf>,
    /// Abstract projection of everything converted
    pub converted: Vec<MetadataComponent>,
}

/// Orchestrates transformer dispatch over a set
pub struct MetadataConverter {
    registry: Arc<Registry>,
}

impl MetadataConverter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Convert every source-backed component of `set` into `target` format
    ///
    /// Packaged output also carries the set's manifest as `package.xml`.
    pub fn convert(
        &self,
        set: &ComponentSet,
        target: PackageFormat,
        output: ConvertOutput,
    ) -> Result<ConvertResult> {
        let components = set.source_components();
        info!("converting {} component(s)", components.len());

        match output {
            ConvertOutput::Zip => {
                let mut writer = ZipWriter::new();
                let converted = self.run(&components, target, None, &mut writer)?;
                if target == PackageFormat::Metadata {
                    writer.write_raw(Path::new(PACKAGE_XML), set.package_xml(4)?.into_bytes())?;
                }
                Ok(ConvertResult {
                    packaged: Some(writer.finalize()?),
                    location: None,
                    converted,
                })
            }
            ConvertOutput::Directory(root) => {
                let mut writer = StandardWriter::new(&root);
                let converted = self.run(&components, target, None, &mut writer)?;
                if target == PackageFormat::Metadata {
                    writer.write_raw(Path::new(PACKAGE_XML), set.package_xml(4)?.into_bytes())?;
                }
                Ok(ConvertResult {
                    packaged: None,
                    location: Some(root),
                    converted,
                })
            }
            ConvertOutput::Merge {
                components: merge_with,
                default_directory,
            } => {
                let mut writer = StandardWriter::new(&default_directory);
                let converted =
                    self.run(&components, target, Some(&merge_with), &mut writer)?;
                Ok(ConvertResult {
                    packaged: None,
                    location: Some(default_directory),
                    converted,
                })
            }
        }
    }

    fn run(
        &self,
        components: &[SourceComponent],
        target: PackageFormat,
        merge_with: Option<&[SourceComponent]>,
        writer: &mut dyn MetadataWriter,
    ) -> Result<Vec<MetadataComponent>> {
        let mut converted = Vec::new();
        for component in components {
            let transformer = create_transformer(&component.ty)?;
            let format = match target {
                PackageFormat::Metadata => transformer.to_metadata_format(component)?,
                PackageFormat::Source => {
                    let merge = merge_with.and_then(|candidates| {
                        candidates.iter().find(|m| {
                            m.ty.id == component.ty.id && m.full_name() == component.full_name()
                        })
                    });
                    transformer.to_source_format(component, merge)?
                }
            };
            debug!(
                "transforming {} ({} write instruction(s))",
                component.full_name(),
                format.write_infos.len()
            );
            writer.write(format)?;
            converted.push(component.member());
        }
        Ok(converted)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
