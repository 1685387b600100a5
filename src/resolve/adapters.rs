// src/resolve/adapters.rs

//! Per-type strategies for turning a path into a source component
//!
//! Each registered type names one adapter; the resolver dispatches by that
//! id once type inference has settled. Adapters own shared handles to the
//! registry, tree, and ignore filter so the components they build can keep
//! walking after resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::component::{parse_metadata_xml, SourceComponent};
use crate::error::{Error, Result};
use crate::ignore_file::SourceIgnore;
use crate::registry::{MetadataType, Registry};
use crate::tree::{self, TreeContainer};

/// Strategy interface for path-to-component resolution
pub trait SourceAdapter: std::fmt::Debug {
    /// Whether content files of this type resolve on their own during a
    /// tree walk. When false, the walk skips content files and lets the
    /// paired metadata xml produce the component.
    fn allow_metadata_with_content(&self) -> bool;

    /// Resolve `path` into a component, or `None` when the path cannot
    /// produce one in the current walk context.
    fn get_component(&self, path: &Path, resolving_source: bool)
        -> Result<Option<SourceComponent>>;
}

/// Shared construction state handed to every adapter
#[derive(Clone)]
pub struct AdapterContext {
    pub registry: Arc<Registry>,
    pub tree: Arc<dyn TreeContainer>,
    pub ignore: Arc<SourceIgnore>,
}

/// Dispatch on the type's adapter id
pub fn create_adapter(
    ty: Arc<MetadataType>,
    ctx: AdapterContext,
) -> Result<Box<dyn SourceAdapter>> {
    match ty.strategies.adapter.as_str() {
        "base" => Ok(Box::new(BaseAdapter { ty, ctx })),
        "matchingContentFile" => Ok(Box::new(MatchingContentAdapter { ty, ctx })),
        "mixedContent" => Ok(Box::new(MixedContentAdapter { ty, ctx })),
        "bundle" => Ok(Box::new(BundleAdapter { ty, ctx })),
        "decomposed" => Ok(Box::new(DecomposedAdapter { ty, ctx })),
        other => Err(Error::Registry(format!(
            "unknown adapter id {other:?} for type {}",
            ty.name
        ))),
    }
}

impl std::fmt::Debug for BaseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAdapter").finish()
    }
}

impl std::fmt::Debug for MatchingContentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingContentAdapter").finish()
    }
}

impl std::fmt::Debug for MixedContentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedContentAdapter").finish()
    }
}

impl std::fmt::Debug for BundleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleAdapter").finish()
    }
}

impl std::fmt::Debug for DecomposedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecomposedAdapter").finish()
    }
}

/// Prefix `name` with its enclosing folder for in-folder types
fn folder_prefixed_name(ty: &MetadataType, path: &Path, name: &str) -> String {
    if !ty.in_folder {
        return name.to_string();
    }
    match path.parent().and_then(Path::file_name) {
        Some(folder) if folder.to_string_lossy() != ty.directory_name => {
            format!("{}/{}", folder.to_string_lossy(), name)
        }
        _ => name.to_string(),
    }
}

/// Truncate `path` to the entry `levels` below the type directory
fn trim_to_type_entry(ty: &MetadataType, path: &Path, levels: usize) -> Option<PathBuf> {
    let segs = tree::segments(path);
    let idx = segs.iter().position(|s| s == &ty.directory_name)?;
    if segs.len() <= idx + levels {
        return None;
    }
    Some(segs[..=idx + levels].iter().collect())
}

/// Xml-only components: the path is the metadata xml itself
struct BaseAdapter {
    ty: Arc<MetadataType>,
    ctx: AdapterContext,
}

impl SourceAdapter for BaseAdapter {
    fn allow_metadata_with_content(&self) -> bool {
        false
    }

    fn get_component(
        &self,
        path: &Path,
        _resolving_source: bool,
    ) -> Result<Option<SourceComponent>> {
        let name = match parse_metadata_xml(path) {
            Some(parsed) => parsed.name,
            // Packaged layout keeps the suffix but drops `-meta.xml`.
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?,
        };
        let full_name = folder_prefixed_name(&self.ty, path, &name);
        Ok(Some(
            SourceComponent::new(
                Arc::clone(&self.ty),
                full_name,
                Arc::clone(&self.ctx.tree),
                Arc::clone(&self.ctx.ignore),
            )
            .with_xml(path),
        ))
    }
}

/// Metadata xml paired to a same-named sibling content file
struct MatchingContentAdapter {
    ty: Arc<MetadataType>,
    ctx: AdapterContext,
}

impl SourceAdapter for MatchingContentAdapter {
    fn allow_metadata_with_content(&self) -> bool {
        false
    }

    fn get_component(
        &self,
        path: &Path,
        _resolving_source: bool,
    ) -> Result<Option<SourceComponent>> {
        let (xml, content, name) = if let Some(parsed) = parse_metadata_xml(path) {
            let file = path.file_name().unwrap_or_default().to_string_lossy();
            let content = path.with_file_name(
                file.strip_suffix("-meta.xml").unwrap_or(&file).to_string(),
            );
            (path.to_path_buf(), content, parsed.name)
        } else {
            let mut xml_name = path.file_name().unwrap_or_default().to_os_string();
            xml_name.push("-meta.xml");
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;
            (path.with_file_name(xml_name), path.to_path_buf(), name)
        };

        if !self.ctx.tree.exists(&content) {
            return Err(Error::PathNotFound(content));
        }
        if !self.ctx.tree.exists(&xml) {
            return Err(Error::PathNotFound(xml));
        }

        let full_name = folder_prefixed_name(&self.ty, &xml, &name);
        Ok(Some(
            SourceComponent::new(
                Arc::clone(&self.ty),
                full_name,
                Arc::clone(&self.ctx.tree),
                Arc::clone(&self.ctx.ignore),
            )
            .with_xml(xml)
            .with_content(content),
        ))
    }
}

/// Content is a free-form file or directory beside its metadata xml
struct MixedContentAdapter {
    ty: Arc<MetadataType>,
    ctx: AdapterContext,
}

impl MixedContentAdapter {
    /// Locate the entry directly under the type directory that roots this
    /// component, ascending from any descendant path.
    fn root_entry(&self, path: &Path) -> Result<PathBuf> {
        let levels = if self.ty.in_folder { 2 } else { 1 };
        trim_to_type_entry(&self.ty, path, levels)
            .ok_or_else(|| Error::TypeInference(path.to_path_buf()))
    }
}

impl SourceAdapter for MixedContentAdapter {
    fn allow_metadata_with_content(&self) -> bool {
        true
    }

    fn get_component(
        &self,
        path: &Path,
        _resolving_source: bool,
    ) -> Result<Option<SourceComponent>> {
        let root = self.root_entry(path)?;

        let (xml, content, name) = if let Some(parsed) = parse_metadata_xml(&root) {
            // Entered through the xml: pair it to the sibling entry sharing
            // its trimmed name.
            let parent = root.parent().unwrap_or_else(|| Path::new(""));
            let sibling = self
                .ctx
                .tree
                .read_directory(parent)?
                .into_iter()
                .find(|entry| {
                    let entry_path = parent.join(entry);
                    entry_path != root
                        && Path::new(entry)
                            .file_stem()
                            .map(|s| s.to_string_lossy() == parsed.name)
                            .unwrap_or(false)
                })
                .map(|entry| parent.join(entry))
                .ok_or_else(|| Error::PathNotFound(parent.join(&parsed.name)))?;
            (root.clone(), sibling, parsed.name)
        } else {
            let name = root
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;
            let suffix = self.ty.suffix.as_deref().unwrap_or_default();
            let xml = root.with_file_name(format!("{name}.{suffix}-meta.xml"));
            if !self.ctx.tree.exists(&xml) {
                return Err(Error::PathNotFound(xml));
            }
            (xml, root.clone(), name)
        };

        let full_name = folder_prefixed_name(&self.ty, &xml, &name);
        Ok(Some(
            SourceComponent::new(
                Arc::clone(&self.ty),
                full_name,
                Arc::clone(&self.ctx.tree),
                Arc::clone(&self.ctx.ignore),
            )
            .with_xml(xml)
            .with_content(content),
        ))
    }
}

/// Content is a directory named after the component; walks never leave it
struct BundleAdapter {
    ty: Arc<MetadataType>,
    ctx: AdapterContext,
}

impl SourceAdapter for BundleAdapter {
    fn allow_metadata_with_content(&self) -> bool {
        true
    }

    fn get_component(
        &self,
        path: &Path,
        _resolving_source: bool,
    ) -> Result<Option<SourceComponent>> {
        let root = trim_to_type_entry(&self.ty, path, 1)
            .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;
        if !self.ctx.tree.is_directory(&root)? {
            return Err(Error::NotADirectory(root));
        }

        let name = root
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;

        // The bundle's own metadata xml, when present, sits directly inside
        // the bundle directory.
        let xml = self
            .ctx
            .tree
            .read_directory(&root)?
            .into_iter()
            .find(|entry| parse_metadata_xml(Path::new(entry)).is_some())
            .map(|entry| root.join(entry));

        let mut component = SourceComponent::new(
            Arc::clone(&self.ty),
            name,
            Arc::clone(&self.ctx.tree),
            Arc::clone(&self.ctx.ignore),
        )
        .with_content(root);
        if let Some(xml) = xml {
            component = component.with_xml(xml);
        }
        Ok(Some(component))
    }
}

/// Parent directory whose children live as separate metadata xml files
struct DecomposedAdapter {
    ty: Arc<MetadataType>,
    ctx: AdapterContext,
}

impl DecomposedAdapter {
    fn parent_type(&self) -> Result<Arc<MetadataType>> {
        if self.ty.children.is_some() {
            return Ok(Arc::clone(&self.ty));
        }
        self.ctx.registry.parent_of(&self.ty.id).ok_or_else(|| {
            Error::Registry(format!("type {} has no decomposed parent", self.ty.name))
        })
    }
}

impl SourceAdapter for DecomposedAdapter {
    fn allow_metadata_with_content(&self) -> bool {
        true
    }

    /// Always resolves to the decomposed parent; children are reached
    /// through the parent's `children()` walk.
    fn get_component(
        &self,
        path: &Path,
        _resolving_source: bool,
    ) -> Result<Option<SourceComponent>> {
        let parent_ty = self.parent_type()?;
        let root = trim_to_type_entry(&parent_ty, path, 1)
            .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;

        if self.ctx.tree.is_directory(&root)? {
            let name = root
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;
            // Parent xml is the suffix-matched metadata file inside the
            // directory, when the source tree carries one.
            let parent_suffix = parent_ty.suffix.as_deref().unwrap_or_default();
            let xml = self
                .ctx
                .tree
                .read_directory(&root)?
                .into_iter()
                .find(|entry| {
                    parse_metadata_xml(Path::new(entry))
                        .and_then(|p| p.suffix)
                        .as_deref()
                        == Some(parent_suffix)
                })
                .map(|entry| root.join(entry));

            let mut component = SourceComponent::new(
                parent_ty,
                name,
                Arc::clone(&self.ctx.tree),
                Arc::clone(&self.ctx.ignore),
            )
            .with_content(root);
            if let Some(xml) = xml {
                component = component.with_xml(xml);
            }
            debug!("resolved decomposed parent {}", component.full_name());
            Ok(Some(component))
        } else {
            // Packaged layout: the parent is one merged xml file.
            let name = root
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| Error::TypeInference(path.to_path_buf()))?;
            Ok(Some(
                SourceComponent::new(
                    parent_ty,
                    name,
                    Arc::clone(&self.ctx.tree),
                    Arc::clone(&self.ctx.ignore),
                )
                .with_xml(root),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{VirtualDirectory, VirtualFile, VirtualTree};

    fn context(tree: VirtualTree) -> AdapterContext {
        let tree: Arc<dyn TreeContainer> = Arc::new(tree);
        let ignore = Arc::new(SourceIgnore::for_path(Arc::clone(&tree), Path::new("pkg")));
        AdapterContext {
            registry: Registry::load().unwrap(),
            tree,
            ignore,
        }
    }

    fn adapter(ctx: &AdapterContext, ty: &str) -> Box<dyn SourceAdapter> {
        create_adapter(ctx.registry.by_id(ty).unwrap(), ctx.clone()).unwrap()
    }

    #[test]
    fn test_unknown_adapter_id_is_fatal() {
        let ctx = context(VirtualTree::new(vec![]));
        let mut ty = (*ctx.registry.by_id("apexclass").unwrap()).clone();
        ty.strategies.adapter = "bogus".to_string();
        let err = create_adapter(Arc::new(ty), ctx).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn test_base_adapter_xml_only() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/layouts",
            vec![VirtualFile::empty("Account Layout.layout-meta.xml")],
        )]));
        let component = adapter(&ctx, "layout")
            .get_component(Path::new("pkg/layouts/Account Layout.layout-meta.xml"), true)
            .unwrap()
            .unwrap();
        assert_eq!(component.full_name(), "Account Layout");
        assert!(component.content.is_none());
        assert!(component.xml.is_some());
    }

    #[test]
    fn test_base_adapter_in_folder_prefix() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/reports/MyFolder",
            vec![VirtualFile::empty("MyReport.report-meta.xml")],
        )]));
        let component = adapter(&ctx, "report")
            .get_component(
                Path::new("pkg/reports/MyFolder/MyReport.report-meta.xml"),
                true,
            )
            .unwrap()
            .unwrap();
        assert_eq!(component.full_name(), "MyFolder/MyReport");
    }

    #[test]
    fn test_matching_content_from_either_side() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/classes",
            vec![
                VirtualFile::data("A.cls", b"public class A {}".to_vec()),
                VirtualFile::empty("A.cls-meta.xml"),
            ],
        )]));
        let adapter = adapter(&ctx, "apexclass");

        let from_xml = adapter
            .get_component(Path::new("pkg/classes/A.cls-meta.xml"), true)
            .unwrap()
            .unwrap();
        assert_eq!(from_xml.content.as_deref(), Some(Path::new("pkg/classes/A.cls")));

        let from_content = adapter
            .get_component(Path::new("pkg/classes/A.cls"), true)
            .unwrap()
            .unwrap();
        assert_eq!(from_content.full_name(), "A");
        assert_eq!(
            from_content.xml.as_deref(),
            Some(Path::new("pkg/classes/A.cls-meta.xml"))
        );
    }

    #[test]
    fn test_matching_content_missing_pair_fails() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/classes",
            vec![VirtualFile::empty("A.cls-meta.xml")],
        )]));
        let err = adapter(&ctx, "apexclass")
            .get_component(Path::new("pkg/classes/A.cls-meta.xml"), true)
            .unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn test_mixed_content_ascends_from_descendant() {
        let ctx = context(VirtualTree::new(vec![
            VirtualDirectory::new(
                "pkg/staticresources",
                vec![
                    VirtualFile::dir("Site"),
                    VirtualFile::empty("Site.resource-meta.xml"),
                ],
            ),
            VirtualDirectory::new(
                "pkg/staticresources/Site/js",
                vec![VirtualFile::empty("app.js")],
            ),
        ]));
        let component = adapter(&ctx, "staticresource")
            .get_component(Path::new("pkg/staticresources/Site/js/app.js"), true)
            .unwrap()
            .unwrap();
        assert_eq!(component.full_name(), "Site");
        assert_eq!(
            component.content.as_deref(),
            Some(Path::new("pkg/staticresources/Site"))
        );
        assert_eq!(
            component.xml.as_deref(),
            Some(Path::new("pkg/staticresources/Site.resource-meta.xml"))
        );
    }

    #[test]
    fn test_mixed_content_single_file() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/staticresources",
            vec![
                VirtualFile::data("Logo.png", vec![0x89]),
                VirtualFile::empty("Logo.resource-meta.xml"),
            ],
        )]));
        let component = adapter(&ctx, "staticresource")
            .get_component(Path::new("pkg/staticresources/Logo.resource-meta.xml"), true)
            .unwrap()
            .unwrap();
        assert_eq!(component.full_name(), "Logo");
        assert_eq!(
            component.content.as_deref(),
            Some(Path::new("pkg/staticresources/Logo.png"))
        );
    }

    #[test]
    fn test_bundle_resolves_to_bundle_root() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/aura/foo",
            vec![
                VirtualFile::empty("foo.cmp"),
                VirtualFile::empty("foo.cmp-meta.xml"),
                VirtualFile::empty("fooController.js"),
            ],
        )]));
        let component = adapter(&ctx, "auradefinitionbundle")
            .get_component(Path::new("pkg/aura/foo/fooController.js"), true)
            .unwrap()
            .unwrap();
        assert_eq!(component.full_name(), "foo");
        assert_eq!(component.content.as_deref(), Some(Path::new("pkg/aura/foo")));
        assert_eq!(
            component.xml.as_deref(),
            Some(Path::new("pkg/aura/foo/foo.cmp-meta.xml"))
        );
    }

    #[test]
    fn test_decomposed_child_path_resolves_parent() {
        let ctx = context(VirtualTree::new(vec![
            VirtualDirectory::new(
                "pkg/objects/Account__c",
                vec![
                    VirtualFile::empty("Account__c.object-meta.xml"),
                    VirtualFile::dir("fields"),
                ],
            ),
            VirtualDirectory::new(
                "pkg/objects/Account__c/fields",
                vec![VirtualFile::empty("Status__c.field-meta.xml")],
            ),
        ]));
        let component = adapter(&ctx, "customfield")
            .get_component(
                Path::new("pkg/objects/Account__c/fields/Status__c.field-meta.xml"),
                true,
            )
            .unwrap()
            .unwrap();
        assert_eq!(component.ty.id, "customobject");
        assert_eq!(component.full_name(), "Account__c");
        assert_eq!(
            component.xml.as_deref(),
            Some(Path::new("pkg/objects/Account__c/Account__c.object-meta.xml"))
        );
    }

    #[test]
    fn test_decomposed_packaged_layout_is_single_file() {
        let ctx = context(VirtualTree::new(vec![VirtualDirectory::new(
            "pkg/objects",
            vec![VirtualFile::empty("Account__c.object")],
        )]));
        let component = adapter(&ctx, "customobject")
            .get_component(Path::new("pkg/objects/Account__c.object"), false)
            .unwrap()
            .unwrap();
        assert_eq!(component.full_name(), "Account__c");
        assert!(component.content.is_none());
        assert_eq!(
            component.xml.as_deref(),
            Some(Path::new("pkg/objects/Account__c.object"))
        );
    }
}
