// src/manifest.rs

//! Manifest parsing and serialization
//!
//! The manifest is the `package.xml` document listing `(type, members)`
//! pairs plus an opaque version string. Single and repeated `types` /
//! `members` elements parse identically; serialization is grouped by type
//! name with members sorted.

use std::path::Path;
use std::sync::Arc;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use crate::component::{MetadataComponent, WILDCARD};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::tree::TreeContainer;

/// Namespace stamped on generated manifests
pub const MANIFEST_XMLNS: &str = "http://soap.sforce.com/2006/04/metadata";

/// One `types` block: a type name and its members
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageTypeMembers {
    #[serde(default)]
    pub members: Vec<String>,
    pub name: String,
}

/// Parsed manifest document
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    #[serde(rename = "@xmlns", default)]
    pub xmlns: String,
    #[serde(default)]
    pub types: Vec<PackageTypeMembers>,
    /// Opaque version text; never interpreted numerically
    pub version: String,
}

/// Deserialize a container that may arrive as a singleton or an array
///
/// Remote status payloads and manifest-shaped JSON collapse single-element
/// containers to a bare object; every such site deserializes through this
/// helper instead of branching locally.
pub fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(v) => vec![v],
    })
}

/// Serialize a manifest with the given indent width
pub fn write_package_xml(package: &PackageManifest, indent: usize) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("Package");
    root.push_attribute(("xmlns", package.xmlns.as_str()));
    writer.write_event(Event::Start(root))?;

    for block in &package.types {
        writer.write_event(Event::Start(BytesStart::new("types")))?;
        for member in &block.members {
            write_text_element(&mut writer, "members", member)?;
        }
        write_text_element(&mut writer, "name", &block.name)?;
        writer.write_event(Event::End(BytesEnd::new("types")))?;
    }
    write_text_element(&mut writer, "version", &package.version)?;
    writer.write_event(Event::End(BytesEnd::new("Package")))?;

    let mut xml = String::from_utf8(writer.into_inner())
        .map_err(|e| Error::ManifestParse(format!("non-utf8 manifest output: {e}")))?;
    xml.push('\n');
    Ok(xml)
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// A parsed manifest projected onto registry types
#[derive(Debug)]
pub struct ResolvedManifest {
    pub components: Vec<MetadataComponent>,
    pub package: PackageManifest,
}

/// Projects manifest members onto typed components
pub struct ManifestResolver {
    registry: Arc<Registry>,
}

impl ManifestResolver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Parse manifest XML and resolve each `{type, fullName}` member
    ///
    /// A member of an in-folder type whose full name carries no `/` denotes
    /// the enclosing folder component, so it resolves to the companion
    /// folder type instead.
    pub fn resolve(&self, xml: &str) -> Result<ResolvedManifest> {
        let package: PackageManifest = quick_xml::de::from_str(xml)
            .map_err(|e| Error::ManifestParse(e.to_string()))?;

        let mut components = Vec::new();
        for block in &package.types {
            let ty = self.registry.require_name(&block.name)?;
            for member in &block.members {
                let resolved_ty = match &ty.folder_type {
                    Some(folder_id) if member != WILDCARD && !member.contains('/') => {
                        self.registry.require(folder_id)?
                    }
                    _ => Arc::clone(&ty),
                };
                components.push(MetadataComponent::new(resolved_ty, member.clone()));
            }
        }

        Ok(ResolvedManifest {
            components,
            package,
        })
    }

    /// Read a manifest file out of a tree and resolve it
    pub fn resolve_tree(&self, tree: &dyn TreeContainer, path: &Path) -> Result<ResolvedManifest> {
        let bytes = tree.read_file(path)?;
        self.resolve(&String::from_utf8_lossy(&bytes))
    }
}
