// src/resolve/resolver.rs

//! Source tree resolution
//!
//! Walks one or more tree paths and yields typed components. Type inference
//! tries competing strategies in a fixed order; the order matters:
//!
//! 1. Strict-directory types claim any path passing through their folder.
//! 2. Metadata-xml file names resolve through their embedded suffix.
//! 3. Folder-style xml (`<name>-meta.xml`, no dot) resolves by the parent
//!    directory name.
//! 4. The bare file extension resolves as a suffix.
//!
//! A failure anywhere aborts the whole call; the resolver never yields a
//! partial result.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::component::{is_metadata_xml, parse_metadata_xml, ComponentSet, SourceComponent};
use crate::error::{Error, Result};
use crate::ignore_file::SourceIgnore;
use crate::registry::{MetadataType, Registry};
use crate::resolve::adapters::{create_adapter, AdapterContext};
use crate::tree::{self, TreeContainer};

/// Walk bookkeeping shared across one `resolve_source` call
struct WalkState {
    ignore: Arc<SourceIgnore>,
    /// Exact paths already claimed by a yielded component
    consumed: HashSet<PathBuf>,
    /// Content directories already claimed; everything under them is skipped
    consumed_roots: Vec<PathBuf>,
}

impl WalkState {
    fn is_consumed(&self, path: &Path) -> bool {
        self.consumed.contains(path)
            || self.consumed_roots.iter().any(|root| path.starts_with(root))
    }

    fn consume(&mut self, component: &SourceComponent, tree: &dyn TreeContainer) {
        if let Some(xml) = &component.xml {
            self.consumed.insert(xml.clone());
        }
        if let Some(content) = &component.content {
            if tree.is_directory(content).unwrap_or(false) {
                self.consumed_roots.push(content.clone());
            } else {
                self.consumed.insert(content.clone());
            }
        }
    }
}

/// Resolves components from a tree
pub struct SourceResolver {
    registry: Arc<Registry>,
    tree: Arc<dyn TreeContainer>,
}

impl SourceResolver {
    pub fn new(registry: Arc<Registry>, tree: Arc<dyn TreeContainer>) -> Self {
        Self { registry, tree }
    }

    /// Resolve every component reachable from `paths`
    ///
    /// With a `filter`, a resolved component is yielded only when the filter
    /// holds it; otherwise its children are consulted and the matching ones
    /// are yielded instead. Filter membership is wildcard-aware.
    pub fn resolve_source(
        &self,
        paths: &[PathBuf],
        filter: Option<&ComponentSet>,
    ) -> Result<ComponentSet> {
        let mut out = ComponentSet::new(Arc::clone(&self.registry));

        for path in paths {
            if !self.tree.exists(path) {
                return Err(Error::PathNotFound(path.clone()));
            }
            info!("resolving source from {}", path.display());
            let mut walk = WalkState {
                ignore: Arc::new(SourceIgnore::for_path(Arc::clone(&self.tree), path)),
                consumed: HashSet::new(),
                consumed_roots: Vec::new(),
            };

            if self.tree.is_directory(path)? {
                self.resolve_directory(path, &mut walk, filter, &mut out)?;
            } else if let Some(component) = self.resolve_component(path, true, &walk)? {
                self.emit(component, filter, &mut walk, &mut out)?;
            }
        }

        Ok(out)
    }

    fn resolve_directory(
        &self,
        dir: &Path,
        walk: &mut WalkState,
        filter: Option<&ComponentSet>,
        out: &mut ComponentSet,
    ) -> Result<()> {
        if self.resolve_directory_as_component(dir) {
            if let Some(component) = self.resolve_component(dir, true, walk)? {
                self.emit(component, filter, walk, out)?;
            }
            return Ok(());
        }

        for name in self.tree.read_directory(dir)? {
            // Hidden entries (the ignore file included) are never
            // resolution candidates.
            if name.starts_with('.') {
                continue;
            }
            let child = dir.join(&name);
            if walk.is_consumed(&child) {
                continue;
            }
            if walk.ignore.denies(&child) {
                debug!("ignoring {}", child.display());
                continue;
            }
            if self.tree.is_directory(&child)? {
                self.resolve_directory(&child, walk, filter, out)?;
            } else if let Some(component) = self.resolve_component(&child, false, walk)? {
                self.emit(component, filter, walk, out)?;
            }
        }
        Ok(())
    }

    fn emit(
        &self,
        component: SourceComponent,
        filter: Option<&ComponentSet>,
        walk: &mut WalkState,
        out: &mut ComponentSet,
    ) -> Result<()> {
        walk.consume(&component, self.tree.as_ref());
        match filter {
            None => out.add_source(component),
            Some(filter) if filter.contains(&component) => out.add_source(component),
            Some(filter) => {
                for child in component.children()? {
                    if filter.contains(&child) {
                        out.add_source(child);
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve one file or directory into a component
    pub fn resolve_component(
        &self,
        path: &Path,
        resolving_source: bool,
        walk: &WalkState,
    ) -> Result<Option<SourceComponent>> {
        if is_metadata_xml(path) && walk.ignore.denies(path) {
            return Ok(None);
        }

        let ty = self.resolve_type(path)?;

        let ctx = AdapterContext {
            registry: Arc::clone(&self.registry),
            tree: Arc::clone(&self.tree),
            ignore: Arc::clone(&walk.ignore),
        };
        let adapter = create_adapter(Arc::clone(&ty), ctx)?;

        // Content files with a registered suffix resolve through their
        // paired xml when one exists; the walk will reach it separately.
        // Packaged xml-only files carry no pair and resolve here.
        if !resolving_source && !adapter.allow_metadata_with_content() {
            let suffix_registered = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .and_then(|e| self.registry.by_suffix(&e))
                .is_some();
            let mut paired = path.as_os_str().to_os_string();
            paired.push("-meta.xml");
            if suffix_registered && self.tree.exists(Path::new(&paired)) {
                debug!("deferring {} to its metadata xml", path.display());
                return Ok(None);
            }
        }

        adapter.get_component(path, resolving_source)
    }

    /// Ordered type inference over a path
    pub fn resolve_type(&self, path: &Path) -> Result<Arc<MetadataType>> {
        let segs = tree::segments(path);

        // 1. Strict-directory types claim the whole subtree, except the
        //    folder layer of in-folder types.
        for (idx, seg) in segs.iter().enumerate() {
            if let Some(ty) = self.registry.strict_by_directory(seg) {
                let parent_is_type_dir = idx
                    .checked_sub(1)
                    .map(|i| segs[i] == ty.directory_name)
                    .unwrap_or(false);
                if !ty.in_folder || !parent_is_type_dir {
                    debug!(
                        "{} claimed by strict directory {:?} at segment {idx}",
                        path.display(),
                        ty.directory_name
                    );
                    return Ok(ty);
                }
            }
        }

        if let Some(parsed) = parse_metadata_xml(path) {
            // 2. Suffix embedded in a metadata-xml name.
            if let Some(suffix) = &parsed.suffix {
                if let Some(ty) = self.registry.by_suffix(suffix) {
                    return Ok(ty);
                }
            } else {
                // 3. Folder-style xml: no suffix, the parent directory names
                //    the (non-in-folder) type.
                let parent_dir = path
                    .parent()
                    .and_then(Path::file_name)
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(ty) = self
                    .registry
                    .find_type(|t| t.directory_name == parent_dir && !t.in_folder)
                {
                    return Ok(ty);
                }
            }
            return Err(Error::TypeInference(path.to_path_buf()));
        }

        // 4. Bare extension as suffix.
        if let Some(ty) = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .and_then(|e| self.registry.by_suffix(&e))
        {
            return Ok(ty);
        }

        Err(Error::TypeInference(path.to_path_buf()))
    }

    /// Whether `dir` resolves wholesale into a single component
    ///
    /// True only for a childless type whose directory appears in the path,
    /// with `dir` sitting at the component layer: one level below the type
    /// directory, two for in-folder types.
    pub fn resolve_directory_as_component(&self, dir: &Path) -> bool {
        let Ok(ty) = self.resolve_type(dir) else {
            return false;
        };
        if ty.children.is_some() {
            return false;
        }
        let segs = tree::segments(dir);
        let Some(idx) = segs.iter().position(|s| s == &ty.directory_name) else {
            return false;
        };
        let offset = if ty.in_folder { 3 } else { 2 };
        segs.len() - idx == offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::MetadataComponent;
    use crate::tree::{VirtualDirectory, VirtualFile, VirtualTree};

    fn resolver(tree: VirtualTree) -> SourceResolver {
        SourceResolver::new(Registry::load().unwrap(), Arc::new(tree))
    }

    fn source_tree() -> VirtualTree {
        VirtualTree::new(vec![
            VirtualDirectory::new(
                "force-app/classes",
                vec![
                    VirtualFile::data("A.cls", b"public class A {}".to_vec()),
                    VirtualFile::empty("A.cls-meta.xml"),
                    VirtualFile::data("B.cls", b"public class B {}".to_vec()),
                    VirtualFile::empty("B.cls-meta.xml"),
                ],
            ),
            VirtualDirectory::new(
                "force-app/aura/foo",
                vec![
                    VirtualFile::empty("foo.cmp"),
                    VirtualFile::empty("foo.cmp-meta.xml"),
                    VirtualFile::empty("fooController.js"),
                ],
            ),
            VirtualDirectory::new(
                "force-app/objects/Account__c",
                vec![
                    VirtualFile::data("Account__c.object-meta.xml", b"<CustomObject/>".to_vec()),
                    VirtualFile::dir("fields"),
                ],
            ),
            VirtualDirectory::new(
                "force-app/objects/Account__c/fields",
                vec![VirtualFile::data(
                    "Status__c.field-meta.xml",
                    b"<CustomField/>".to_vec(),
                )],
            ),
            VirtualDirectory::new(
                "force-app/reports/MyFolder",
                vec![VirtualFile::empty("MyReport.report-meta.xml")],
            ),
            VirtualDirectory::new(
                "force-app/reports",
                vec![VirtualFile::empty("MyFolder.reportFolder-meta.xml")],
            ),
        ])
    }

    // ===================
    // Type inference
    // ===================

    #[test]
    fn test_resolve_type_order() {
        let resolver = resolver(source_tree());

        // Strict directory wins over everything else on the path.
        assert_eq!(
            resolver
                .resolve_type(Path::new("force-app/aura/foo/fooController.js"))
                .unwrap()
                .id,
            "auradefinitionbundle"
        );
        // Metadata-xml suffix.
        assert_eq!(
            resolver
                .resolve_type(Path::new("force-app/classes/A.cls-meta.xml"))
                .unwrap()
                .id,
            "apexclass"
        );
        // Folder-style xml with no dot in the name.
        assert_eq!(
            resolver
                .resolve_type(Path::new("force-app/reports/MyFolder-meta.xml"))
                .unwrap()
                .id,
            "reportfolder"
        );
        // Bare extension.
        assert_eq!(
            resolver
                .resolve_type(Path::new("force-app/classes/A.cls"))
                .unwrap()
                .id,
            "apexclass"
        );
    }

    #[test]
    fn test_unclassifiable_path_fails() {
        let resolver = resolver(source_tree());
        let err = resolver
            .resolve_type(Path::new("force-app/classes/notes.txt"))
            .unwrap_err();
        assert!(matches!(err, Error::TypeInference(_)));
    }

    #[test]
    fn test_directory_as_component_rule() {
        let resolver = resolver(source_tree());
        assert!(resolver.resolve_directory_as_component(Path::new("force-app/aura/foo")));
        assert!(!resolver.resolve_directory_as_component(Path::new("force-app/aura")));
        // Decomposed parents have children, so they walk instead.
        assert!(!resolver.resolve_directory_as_component(Path::new(
            "force-app/objects/Account__c"
        )));
        assert!(!resolver.resolve_directory_as_component(Path::new("force-app/classes")));
    }

    // ===================
    // resolve_source
    // ===================

    #[test]
    fn test_resolve_single_class_pair() {
        let resolver = resolver(source_tree());
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app/classes")], None)
            .unwrap();

        let components = set.source_components();
        assert_eq!(components.len(), 2);
        let a = &components[0];
        assert_eq!(a.ty.name, "ApexClass");
        assert_eq!(a.full_name(), "A");
        assert_eq!(a.xml.as_deref(), Some(Path::new("force-app/classes/A.cls-meta.xml")));
        assert_eq!(a.content.as_deref(), Some(Path::new("force-app/classes/A.cls")));
    }

    #[test]
    fn test_resolver_idempotence() {
        let resolver = resolver(source_tree());
        let once = resolver
            .resolve_source(&[PathBuf::from("force-app/classes")], None)
            .unwrap();
        let twice = resolver
            .resolve_source(
                &[
                    PathBuf::from("force-app/classes"),
                    PathBuf::from("force-app/classes"),
                ],
                None,
            )
            .unwrap();
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn test_bundle_yields_once() {
        let resolver = resolver(source_tree());
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app/aura")], None)
            .unwrap();
        let components = set.source_components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].ty.name, "AuraDefinitionBundle");
        assert_eq!(components[0].full_name(), "foo");
    }

    #[test]
    fn test_decomposed_yields_parent_with_children() {
        let resolver = resolver(source_tree());
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app/objects")], None)
            .unwrap();
        let components = set.source_components();
        assert_eq!(components.len(), 1);
        let parent = &components[0];
        assert_eq!(parent.ty.name, "CustomObject");
        assert_eq!(parent.full_name(), "Account__c");

        let children = parent.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].ty.name, "CustomField");
        assert_eq!(children[0].full_name(), "Account__c.Status__c");
    }

    #[test]
    fn test_folder_components_resolve() {
        let resolver = resolver(source_tree());
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app/reports")], None)
            .unwrap();
        let names: Vec<String> = set
            .source_components()
            .iter()
            .map(|c| format!("{}:{}", c.ty.name, c.full_name()))
            .collect();
        assert!(names.contains(&"ReportFolder:MyFolder".to_string()));
        assert!(names.contains(&"Report:MyFolder/MyReport".to_string()));
    }

    #[test]
    fn test_packaged_xml_only_file_resolves_in_walk() {
        // Packaged layout: no `-meta.xml` twin to defer to.
        let tree = VirtualTree::new(vec![VirtualDirectory::new(
            "mdapi/layouts",
            vec![VirtualFile::empty("Account Layout.layout")],
        )]);
        let resolver = resolver(tree);
        let set = resolver
            .resolve_source(&[PathBuf::from("mdapi/layouts")], None)
            .unwrap();
        let components = set.source_components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].ty.name, "Layout");
        assert_eq!(components[0].full_name(), "Account Layout");
    }

    #[test]
    fn test_missing_path_fails() {
        let resolver = resolver(source_tree());
        let err = resolver
            .resolve_source(&[PathBuf::from("force-app/nothing")], None)
            .unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn test_misplaced_bundle_file_fails() {
        let tree = VirtualTree::new(vec![VirtualDirectory::new(
            "force-app/classes",
            vec![VirtualFile::empty("foo.cmp")],
        )]);
        let resolver = resolver(tree);
        let err = resolver
            .resolve_source(&[PathBuf::from("force-app/classes")], None)
            .unwrap_err();
        assert!(matches!(err, Error::TypeInference(_)));
    }

    #[test]
    fn test_ignore_excludes_component() {
        let tree = VirtualTree::new(vec![
            VirtualDirectory::new(
                "force-app",
                vec![VirtualFile::data(
                    crate::ignore_file::IGNORE_FILE,
                    b"B.cls*\n".to_vec(),
                )],
            ),
            VirtualDirectory::new(
                "force-app/classes",
                vec![
                    VirtualFile::empty("A.cls"),
                    VirtualFile::empty("A.cls-meta.xml"),
                    VirtualFile::empty("B.cls"),
                    VirtualFile::empty("B.cls-meta.xml"),
                ],
            ),
        ]);
        let resolver = resolver(tree);
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app/classes")], None)
            .unwrap();
        let names: Vec<String> = set
            .source_components()
            .iter()
            .map(|c| c.full_name())
            .collect();
        assert_eq!(names, vec!["A"]);
    }

    #[test]
    fn test_wildcard_filter_keeps_all_of_type() {
        let registry = Registry::load().unwrap();
        let mut filter = ComponentSet::new(Arc::clone(&registry));
        filter.add_member(&MetadataComponent::new(
            registry.by_id("apexclass").unwrap(),
            "*",
        ));

        let resolver = resolver(source_tree());
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app")], Some(&filter))
            .unwrap();

        let names: Vec<String> = set
            .source_components()
            .iter()
            .map(|c| c.full_name())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_filter_projects_children() {
        let registry = Registry::load().unwrap();
        let mut filter = ComponentSet::new(Arc::clone(&registry));
        filter.add_member(&MetadataComponent::new(
            registry.by_id("customfield").unwrap(),
            "Account__c.Status__c",
        ));

        let resolver = resolver(source_tree());
        let set = resolver
            .resolve_source(&[PathBuf::from("force-app/objects")], Some(&filter))
            .unwrap();

        let components = set.source_components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].ty.name, "CustomField");
        assert_eq!(components[0].full_name(), "Account__c.Status__c");
    }
}
