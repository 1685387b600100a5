// src/component/set.rs

//! De-duplicating, wildcard-aware component collection
//!
//! Identity is the `type.id#fullName` key. Source-backed entries keep a
//! second inner index keyed by name + full name + xml + content so the same
//! files never register twice. A member with full name `*` is a wildcard
//! for its type and matches any component of that type.
//!
//! Construction may carry a seed iterator; it is drained to exhaustion
//! before any observation of the set, so late-produced duplicates collapse
//! into the same keys as explicit adds.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::component::{MetadataComponent, SourceComponent, WILDCARD};
use crate::error::Result;
use crate::manifest::{self, PackageManifest, PackageTypeMembers};
use crate::registry::{MetadataType, Registry};

type Seed = Box<dyn Iterator<Item = SourceComponent> + Send>;

struct SetEntry {
    ty: Arc<MetadataType>,
    full_name: String,
    sources: Vec<SourceComponent>,
    variants: HashSet<String>,
}

#[derive(Default)]
struct SetInner {
    seed: Option<Seed>,
    order: Vec<String>,
    entries: HashMap<String, SetEntry>,
}

impl SetInner {
    fn add_member(&mut self, ty: Arc<MetadataType>, full_name: &str) {
        let key = format!("{}#{}", ty.id, full_name);
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
            self.entries.insert(
                key,
                SetEntry {
                    ty,
                    full_name: full_name.to_string(),
                    sources: Vec::new(),
                    variants: HashSet::new(),
                },
            );
        }
    }

    fn add_source(&mut self, component: SourceComponent) {
        let full_name = component.full_name();
        self.add_member(Arc::clone(&component.ty), &full_name);
        let key = component.simple_key();
        let entry = self.entries.get_mut(&key).expect("entry just added");

        let variant = format!(
            "{}{}{}{}",
            component.ty.name,
            full_name,
            component
                .xml
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            component
                .content
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        if entry.variants.insert(variant) {
            entry.sources.push(component);
        } else {
            debug!("skipping duplicate source-backed entry for {key}");
        }
    }

    fn flush_no_yield(&mut self) {
        if let Some(mut seed) = self.seed.take() {
            for component in seed.by_ref() {
                self.add_source(component);
            }
        }
    }
}

/// Ordered, de-duplicated collection of components
pub struct ComponentSet {
    registry: Arc<Registry>,
    api_version: Option<String>,
    inner: RefCell<SetInner>,
}

impl std::fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSet")
            .field("size", &self.len())
            .finish()
    }
}

impl ComponentSet {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            api_version: None,
            inner: RefCell::new(SetInner::default()),
        }
    }

    /// A set whose initial members come lazily from `seed`
    pub fn with_seed(registry: Arc<Registry>, seed: Seed) -> Self {
        let set = Self::new(registry);
        set.inner.borrow_mut().seed = Some(seed);
        set
    }

    /// Parse a manifest and seed the set with its members
    pub fn from_manifest(registry: Arc<Registry>, manifest_xml: &str) -> Result<Self> {
        let resolved = manifest::ManifestResolver::new(Arc::clone(&registry)).resolve(manifest_xml)?;
        let mut set = Self::new(registry);
        set.api_version = Some(resolved.package.version.clone());
        for member in resolved.components {
            set.add_member(&member);
        }
        Ok(set)
    }

    /// Override the api version stamped into generated manifests
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn api_version(&self) -> String {
        self.api_version
            .clone()
            .unwrap_or_else(|| self.registry.api_version().to_string())
    }

    /// Add an abstract member (possibly a wildcard)
    pub fn add_member(&mut self, member: &MetadataComponent) {
        let mut inner = self.inner.borrow_mut();
        inner.flush_no_yield();
        inner.add_member(Arc::clone(&member.ty), &member.full_name);
    }

    /// Add a source-backed component
    pub fn add_source(&mut self, component: SourceComponent) {
        let mut inner = self.inner.borrow_mut();
        inner.flush_no_yield();
        inner.add_source(component);
    }

    /// Number of distinct `type#fullName` keys
    pub fn len(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.flush_no_yield();
        inner.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership by key or by a wildcard entry of the same type
    pub fn has(&self, ty: &MetadataType, full_name: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.flush_no_yield();
        inner.entries.contains_key(&format!("{}#{}", ty.id, full_name))
            || inner
                .entries
                .contains_key(&format!("{}#{}", ty.id, WILDCARD))
    }

    /// Membership for a source component, falling back to its parent
    pub fn contains(&self, component: &SourceComponent) -> bool {
        if self.has(&component.ty, &component.full_name()) {
            return true;
        }
        component
            .parent
            .as_ref()
            .is_some_and(|parent| self.contains(parent))
    }

    /// Membership for an abstract member, falling back to its parent
    pub fn contains_member(&self, member: &MetadataComponent) -> bool {
        if self.has(&member.ty, &member.full_name) {
            return true;
        }
        member
            .parent
            .as_ref()
            .is_some_and(|parent| self.contains_member(parent))
    }

    /// One abstract component per distinct key, in insertion order
    ///
    /// Wildcard-only entries appear with full name `*`.
    pub fn members(&self) -> Vec<MetadataComponent> {
        let mut inner = self.inner.borrow_mut();
        inner.flush_no_yield();
        inner
            .order
            .iter()
            .map(|key| {
                let entry = &inner.entries[key];
                MetadataComponent::new(Arc::clone(&entry.ty), entry.full_name.clone())
            })
            .collect()
    }

    /// Every source-backed component, variants expanded, in insertion order
    pub fn source_components(&self) -> Vec<SourceComponent> {
        let mut inner = self.inner.borrow_mut();
        inner.flush_no_yield();
        inner
            .order
            .iter()
            .flat_map(|key| inner.entries[key].sources.clone())
            .collect()
    }

    /// Manifest projection of the current membership
    ///
    /// Grouped and sorted by type name; a folder type's members collapse
    /// into its content type's group.
    pub fn manifest_object(&self) -> PackageManifest {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for member in self.members() {
            let type_name = match member
                .ty
                .folder_content_type
                .as_deref()
                .and_then(|id| self.registry.by_id(id))
            {
                Some(content_ty) => content_ty.name.clone(),
                None => member.ty.name.clone(),
            };
            groups
                .entry(type_name)
                .or_default()
                .insert(member.full_name);
        }

        PackageManifest {
            xmlns: manifest::MANIFEST_XMLNS.to_string(),
            types: groups
                .into_iter()
                .map(|(name, members)| PackageTypeMembers {
                    members: members.into_iter().collect(),
                    name,
                })
                .collect(),
            version: self.api_version(),
        }
    }

    /// Serialize the current membership as manifest XML
    pub fn package_xml(&self, indent: usize) -> Result<String> {
        manifest::write_package_xml(&self.manifest_object(), indent)
    }
}
