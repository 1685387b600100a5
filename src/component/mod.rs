// src/component/mod.rs

//! Typed logical units of metadata
//!
//! A `MetadataComponent` is the abstract identity `(type, fullName)`. A
//! `SourceComponent` is the same identity backed by on-disk files (a
//! metadata xml, a content file or directory, or both) plus shared handles
//! to the tree and ignore filter it was resolved from.
//!
//! Parented components use the dotted form for their full name:
//! `Account__c.Status__c` names the `Status__c` field of `Account__c`.

mod set;

pub use set::ComponentSet;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ignore_file::SourceIgnore;
use crate::registry::{ElementParser, MetadataType};
use crate::tree::{self, TreeContainer};

/// Abstract component identity
#[derive(Debug, Clone)]
pub struct MetadataComponent {
    pub full_name: String,
    pub ty: Arc<MetadataType>,
    pub parent: Option<Box<MetadataComponent>>,
}

impl MetadataComponent {
    pub fn new(ty: Arc<MetadataType>, full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ty,
            parent: None,
        }
    }

    /// Identity key shared with `ComponentSet` indexing
    pub fn simple_key(&self) -> String {
        format!("{}#{}", self.ty.id, self.full_name)
    }

    /// Whether this member stands for every component of its type
    pub fn is_wildcard(&self) -> bool {
        self.full_name == WILDCARD
    }
}

/// Manifest member meaning "all components of this type"
pub const WILDCARD: &str = "*";

/// A component backed by files in a tree
#[derive(Clone)]
pub struct SourceComponent {
    /// Member name without any parent or folder prefix
    pub name: String,
    pub ty: Arc<MetadataType>,
    pub parent: Option<Arc<SourceComponent>>,
    /// Path of the `-meta.xml` (or packaged xml) file, when present
    pub xml: Option<PathBuf>,
    /// Path of the content file or directory, when present
    pub content: Option<PathBuf>,
    tree: Arc<dyn TreeContainer>,
    ignore: Arc<SourceIgnore>,
}

impl std::fmt::Debug for SourceComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceComponent")
            .field("type", &self.ty.id)
            .field("full_name", &self.full_name())
            .field("xml", &self.xml)
            .field("content", &self.content)
            .finish()
    }
}

impl SourceComponent {
    /// A source component carries at least one of `xml`/`content`; callers
    /// construct with `new` then attach paths with the `with_` builders.
    pub fn new(
        ty: Arc<MetadataType>,
        name: impl Into<String>,
        tree: Arc<dyn TreeContainer>,
        ignore: Arc<SourceIgnore>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            parent: None,
            xml: None,
            content: None,
            tree,
            ignore,
        }
    }

    pub fn with_xml(mut self, xml: impl Into<PathBuf>) -> Self {
        self.xml = Some(xml.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<PathBuf>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_parent(mut self, parent: Arc<SourceComponent>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// The tree this component reads from
    pub fn tree(&self) -> &Arc<dyn TreeContainer> {
        &self.tree
    }

    /// The ignore filter active when this component was resolved
    pub fn ignore(&self) -> &Arc<SourceIgnore> {
        &self.ignore
    }

    /// Dotted full name: `parent.name` when parented, `name` otherwise
    pub fn full_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}", parent.full_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// Identity key shared with `ComponentSet` indexing
    pub fn simple_key(&self) -> String {
        format!("{}#{}", self.ty.id, self.full_name())
    }

    /// Abstract projection of this component
    pub fn member(&self) -> MetadataComponent {
        MetadataComponent {
            full_name: self.full_name(),
            ty: Arc::clone(&self.ty),
            parent: self
                .parent
                .as_ref()
                .map(|p| Box::new(p.member())),
        }
    }

    /// Every file under `content`, or the content file itself
    pub fn walk_content(&self) -> Result<Vec<PathBuf>> {
        match &self.content {
            Some(content) => self.tree.walk(content),
            None => Ok(Vec::new()),
        }
    }

    /// Child components of a decomposed or element-parsed parent
    ///
    /// Decomposed children are separate `-meta.xml` files under `content`;
    /// element-parsed children are named elements inside this component's
    /// own xml. A parented component never yields further children.
    pub fn children(&self) -> Result<Vec<SourceComponent>> {
        if self.parent.is_some() {
            return Ok(Vec::new());
        }
        let Some(children) = &self.ty.children else {
            return Ok(Vec::new());
        };

        let this = Arc::new(self.clone());
        let mut out = Vec::new();

        if let Some(content) = &self.content {
            if self.tree.is_directory(content).unwrap_or(false) {
                for path in self.tree.walk(content)? {
                    let Some(parsed) = parse_metadata_xml(&path) else {
                        continue;
                    };
                    let Some(suffix) = parsed.suffix else {
                        continue;
                    };
                    let Some(child_id) = children.suffixes.get(&suffix) else {
                        continue;
                    };
                    let Some(child_ty) = children.types.get(child_id) else {
                        continue;
                    };
                    debug!(
                        "found child {} of {} at {}",
                        parsed.name,
                        self.full_name(),
                        path.display()
                    );
                    out.push(
                        SourceComponent::new(
                            Arc::new(child_ty.clone()),
                            parsed.name,
                            Arc::clone(&self.tree),
                            Arc::clone(&self.ignore),
                        )
                        .with_xml(path)
                        .with_parent(Arc::clone(&this)),
                    );
                }
            }
        }

        // Element-parsed children all share one child type; the parser names
        // the elements, the catalog names the type.
        if let (Some(parser), Some(xml)) = (&self.ty.strategies.element_parser, &self.xml) {
            if let Some(child_ty) = children.types.values().next() {
                for name in self.parse_child_names(parser, xml)? {
                    out.push(
                        SourceComponent::new(
                            Arc::new(child_ty.clone()),
                            name,
                            Arc::clone(&self.tree),
                            Arc::clone(&self.ignore),
                        )
                        .with_xml(xml.clone())
                        .with_parent(Arc::clone(&this)),
                    );
                }
                debug!(
                    "parsed element children of {} as {}",
                    self.full_name(),
                    child_ty.id
                );
            }
        }

        Ok(out)
    }

    /// Names found at the parser's element path inside `xml`
    fn parse_child_names(&self, parser: &ElementParser, xml: &Path) -> Result<Vec<String>> {
        let bytes = self.tree.read_file(xml)?;
        let text = String::from_utf8_lossy(&bytes);
        let target: Vec<&str> = parser.xml_path.split('.').collect();

        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut capture = false;
        let mut names = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    stack.push(name);
                    capture = stack.len() == target.len() + 1
                        && stack[..target.len()]
                            .iter()
                            .zip(&target)
                            .all(|(a, b)| a == b)
                        && stack.last().map(String::as_str) == Some(parser.name_attr.as_str());
                }
                Ok(Event::Text(t)) if capture => {
                    let value = t
                        .unescape()
                        .map_err(|e| {
                            Error::ManifestParse(format!("{}: {e}", xml.display()))
                        })?
                        .into_owned();
                    names.push(value);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                    capture = false;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::ManifestParse(format!("{}: {e}", xml.display())));
                }
            }
        }

        Ok(names)
    }

    /// Path of `path` relative to the package root, starting at this type's
    /// directory segment
    pub fn package_relative_path(&self, path: &Path) -> Result<PathBuf> {
        let segs = tree::segments(path);
        let dir = &self.ty.directory_name;
        match segs.iter().position(|s| s == dir) {
            Some(idx) => Ok(segs[idx..].iter().collect()),
            None => Err(Error::TypeInference(path.to_path_buf())),
        }
    }
}

/// Parsed shape of a metadata xml file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataXml {
    /// Name with the suffix and `-meta.xml` trimmed away
    pub name: String,
    /// Registered suffix between the name and `-meta.xml`, if any
    pub suffix: Option<String>,
}

/// Parse `N.suffix-meta.xml` / `N-meta.xml` file names
pub fn parse_metadata_xml(path: &Path) -> Option<MetadataXml> {
    let file = path.file_name()?.to_string_lossy();
    let trimmed = file.strip_suffix("-meta.xml")?;
    match trimmed.rsplit_once('.') {
        Some((name, suffix)) if !name.is_empty() => Some(MetadataXml {
            name: name.to_string(),
            suffix: Some(suffix.to_string()),
        }),
        _ => Some(MetadataXml {
            name: trimmed.to_string(),
            suffix: None,
        }),
    }
}

/// Whether the file name has the metadata-xml shape
pub fn is_metadata_xml(path: &Path) -> bool {
    parse_metadata_xml(path).is_some()
}
