// src/registry/mod.rs

//! Static metadata type catalog
//!
//! The registry is loaded once from the embedded JSON catalog and never
//! mutated. Lookups by id, name, suffix, and directory name are
//! constant-time; `find_type` is a linear scan reserved for the folder-style
//! metadata-xml edge case. Child types of decomposed parents are indexed
//! alongside top-level types so suffix inference reaches them directly.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Embedded type catalog, compiled into the binary
const CATALOG: &str = include_str!("catalog.json");

/// Strategy configuration carried by each type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStrategies {
    /// Adapter id dispatched during source resolution
    pub adapter: String,
    /// Transformer id dispatched during conversion
    pub transformer: String,
    /// Where non-decomposed children live inside the parent's xml
    #[serde(default)]
    pub element_parser: Option<ElementParser>,
}

/// Locates named child elements inside a parent metadata xml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementParser {
    /// Dotted element path from the document root, e.g. `CustomLabels.labels`
    pub xml_path: String,
    /// Child element holding the member name, e.g. `fullName`
    pub name_attr: String,
}

/// Child type record for decomposed parents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeChildren {
    /// Suffix of a child file mapped to the child type id
    pub suffixes: HashMap<String, String>,
    /// Child type definitions keyed by id
    pub types: HashMap<String, MetadataType>,
}

/// One typed category of metadata component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataType {
    /// Lowercased stable key
    pub id: String,
    /// Presentational name used in manifests and responses
    pub name: String,
    /// Folder under the package root holding this type's files
    pub directory_name: String,
    /// File extension (without dot) identifying this type's files
    #[serde(default)]
    pub suffix: Option<String>,
    /// Members are namespaced by an enclosing folder component
    #[serde(default)]
    pub in_folder: bool,
    /// Files must live directly under `directory_name`
    #[serde(default)]
    pub strict_directory_name: bool,
    /// Companion folder type id, for in-folder types
    #[serde(default)]
    pub folder_type: Option<String>,
    /// Content type id this folder type encloses
    #[serde(default)]
    pub folder_content_type: Option<String>,
    /// Element name this type takes inside a recomposed parent document
    #[serde(default)]
    pub xml_element_name: Option<String>,
    /// Decomposed child type records
    #[serde(default)]
    pub children: Option<TypeChildren>,
    pub strategies: TypeStrategies,
}

impl MetadataType {
    /// Simple membership key fragment for this type
    pub fn is_folder_type(&self) -> bool {
        self.folder_content_type.is_some()
    }
}

impl PartialEq for MetadataType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MetadataType {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    api_version: String,
    types: Vec<MetadataType>,
}

/// Immutable catalog of metadata types with precomputed lookup indices
#[derive(Debug)]
pub struct Registry {
    api_version: String,
    /// Top-level types in catalog order, for linear scans
    top_level: Vec<Arc<MetadataType>>,
    /// Every type (children included) by id
    by_id: HashMap<String, Arc<MetadataType>>,
    /// Every type by lowercased presentational name
    by_name: HashMap<String, Arc<MetadataType>>,
    /// Every registered suffix (children included) to its type
    by_suffix: HashMap<String, Arc<MetadataType>>,
    /// Strict directory names to their types
    strict_dirs: HashMap<String, Arc<MetadataType>>,
    /// Child type id to its decomposed parent
    parents: HashMap<String, Arc<MetadataType>>,
}

impl Registry {
    /// Load the embedded catalog
    pub fn load() -> Result<Arc<Self>> {
        Ok(Arc::new(Self::from_json(CATALOG)?))
    }

    /// Build a registry from catalog JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog =
            serde_json::from_str(json).map_err(|e| Error::Registry(format!("bad catalog: {e}")))?;

        let mut registry = Registry {
            api_version: catalog.api_version,
            top_level: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            by_suffix: HashMap::new(),
            strict_dirs: HashMap::new(),
            parents: HashMap::new(),
        };

        for ty in catalog.types {
            let ty = Arc::new(ty);
            registry.index(&ty);
            if let Some(children) = &ty.children {
                for child in children.types.values() {
                    let child = Arc::new(child.clone());
                    registry.index(&child);
                    registry.parents.insert(child.id.clone(), Arc::clone(&ty));
                }
            }
            registry.top_level.push(ty);
        }

        Ok(registry)
    }

    fn index(&mut self, ty: &Arc<MetadataType>) {
        self.by_id.insert(ty.id.clone(), Arc::clone(ty));
        self.by_name.insert(ty.name.to_lowercase(), Arc::clone(ty));
        if let Some(suffix) = &ty.suffix {
            self.by_suffix.insert(suffix.clone(), Arc::clone(ty));
        }
        if ty.strict_directory_name {
            self.strict_dirs
                .insert(ty.directory_name.clone(), Arc::clone(ty));
        }
    }

    /// Catalog-declared API version
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Look up a type by its id
    pub fn by_id(&self, id: &str) -> Option<Arc<MetadataType>> {
        self.by_id.get(id).cloned()
    }

    /// Look up a type by id, failing with a registry error
    pub fn require(&self, id: &str) -> Result<Arc<MetadataType>> {
        self.by_id(id)
            .ok_or_else(|| Error::Registry(format!("unknown type id: {id}")))
    }

    /// Look up a type by its presentational name (case-insensitive)
    pub fn by_name(&self, name: &str) -> Option<Arc<MetadataType>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    /// Look up a type by name, failing with a registry error
    pub fn require_name(&self, name: &str) -> Result<Arc<MetadataType>> {
        self.by_name(name)
            .ok_or_else(|| Error::Registry(format!("unknown type name: {name}")))
    }

    /// Look up a type by file suffix
    pub fn by_suffix(&self, suffix: &str) -> Option<Arc<MetadataType>> {
        self.by_suffix.get(suffix).cloned()
    }

    /// Look up a strict-directory type by its directory name
    pub fn strict_by_directory(&self, directory: &str) -> Option<Arc<MetadataType>> {
        self.strict_dirs.get(directory).cloned()
    }

    /// Decomposed parent of a child type, if any
    pub fn parent_of(&self, child_id: &str) -> Option<Arc<MetadataType>> {
        self.parents.get(child_id).cloned()
    }

    /// Linear scan over top-level types
    pub fn find_type<F>(&self, predicate: F) -> Option<Arc<MetadataType>>
    where
        F: Fn(&MetadataType) -> bool,
    {
        self.top_level.iter().find(|t| predicate(t)).cloned()
    }
}
