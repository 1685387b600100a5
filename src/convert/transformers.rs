// src/convert/transformers.rs

//! Per-type conversion strategies
//!
//! A transformer turns one component into the write instructions for a
//! target format. The default transformer passes files through with the
//! `-meta.xml` suffix math; the bundle transformer carries every file of
//! the bundle directory; the decomposed transformer merges child files
//! into one parent document on the way out and splits it back on the way
//! in. All transformers are deterministic: same component, same output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::warn;

use crate::component::SourceComponent;
use crate::convert::writers::{WriteInfo, WriteSource, WriterFormat};
use crate::error::{Error, Result};
use crate::manifest::MANIFEST_XMLNS;
use crate::registry::MetadataType;

/// Strategy interface for format transformation
pub trait MetadataTransformer: std::fmt::Debug {
    /// Write instructions for the flat packaged layout
    fn to_metadata_format(&self, component: &SourceComponent) -> Result<WriterFormat>;

    /// Write instructions for the decomposed source layout
    ///
    /// With `merge_with`, destinations are rebased onto the matching
    /// existing component instead of a fresh package-relative layout.
    fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<WriterFormat>;
}

/// Dispatch on the type's transformer id
pub fn create_transformer(ty: &MetadataType) -> Result<Box<dyn MetadataTransformer>> {
    match ty.strategies.transformer.as_str() {
        "standard" => Ok(Box::new(DefaultTransformer)),
        "bundle" => Ok(Box::new(BundleTransformer)),
        "decomposed" => Ok(Box::new(DecomposedTransformer)),
        other => Err(Error::Registry(format!(
            "unknown transformer id {other:?} for type {}",
            ty.name
        ))),
    }
}

fn open(component: &SourceComponent, path: &Path) -> Result<WriteSource> {
    Ok(WriteSource::Stream(component.tree().open(path)?))
}

/// Last segment of the full name, without any folder prefix
fn leaf_name(component: &SourceComponent) -> String {
    let full = component.full_name();
    full.rsplit('/').next().unwrap_or(&full).to_string()
}

/// Destination for a content file, honoring a merge target
fn content_destination(
    component: &SourceComponent,
    merge_with: Option<&SourceComponent>,
    file: &Path,
) -> Result<PathBuf> {
    if let (Some(merge), Some(content)) = (merge_with, &component.content) {
        if let (Some(merge_content), Ok(rel)) = (&merge.content, file.strip_prefix(content)) {
            return Ok(merge_content.join(rel));
        }
    }
    component.package_relative_path(file)
}

/// Passes files through, adjusting only the xml file name
///
/// The packaged layout drops `-meta.xml` from xml-only components and drops
/// the suffix from folder components; the source layout restores both.
#[derive(Debug)]
struct DefaultTransformer;

impl DefaultTransformer {
    fn xml_output(component: &SourceComponent, xml: &Path, to_metadata: bool) -> Result<PathBuf> {
        let rel = component.package_relative_path(xml)?;
        let dir = rel.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let leaf = leaf_name(component);
        let suffix = component.ty.suffix.as_deref().unwrap_or_default();

        let file = if component.ty.is_folder_type() {
            // Folder xmls keep `-meta.xml` in both layouts; only the suffix
            // comes and goes.
            if to_metadata {
                format!("{leaf}-meta.xml")
            } else {
                format!("{leaf}.{suffix}-meta.xml")
            }
        } else if component.content.is_some() {
            rel.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else if to_metadata {
            format!("{leaf}.{suffix}")
        } else {
            format!("{leaf}.{suffix}-meta.xml")
        };

        Ok(dir.join(file))
    }
}

impl MetadataTransformer for DefaultTransformer {
    fn to_metadata_format(&self, component: &SourceComponent) -> Result<WriterFormat> {
        let mut write_infos = Vec::new();
        for file in component.walk_content()? {
            write_infos.push(WriteInfo {
                source: open(component, &file)?,
                output: component.package_relative_path(&file)?,
            });
        }
        if let Some(xml) = &component.xml {
            write_infos.push(WriteInfo {
                source: open(component, xml)?,
                output: Self::xml_output(component, xml, true)?,
            });
        }
        Ok(WriterFormat {
            component: component.clone(),
            write_infos,
        })
    }

    fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<WriterFormat> {
        let mut write_infos = Vec::new();
        for file in component.walk_content()? {
            write_infos.push(WriteInfo {
                source: open(component, &file)?,
                output: content_destination(component, merge_with, &file)?,
            });
        }
        if let Some(xml) = &component.xml {
            let output = match merge_with.and_then(|m| m.xml.clone()) {
                Some(existing) => existing,
                None => Self::xml_output(component, xml, false)?,
            };
            write_infos.push(WriteInfo {
                source: open(component, xml)?,
                output,
            });
        }
        Ok(WriterFormat {
            component: component.clone(),
            write_infos,
        })
    }
}

/// Carries every file of the bundle directory; identical in both layouts
#[derive(Debug)]
struct BundleTransformer;

impl BundleTransformer {
    fn carry(
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<WriterFormat> {
        let mut write_infos = Vec::new();
        for file in component.walk_content()? {
            write_infos.push(WriteInfo {
                source: open(component, &file)?,
                output: content_destination(component, merge_with, &file)?,
            });
        }
        Ok(WriterFormat {
            component: component.clone(),
            write_infos,
        })
    }
}

impl MetadataTransformer for BundleTransformer {
    fn to_metadata_format(&self, component: &SourceComponent) -> Result<WriterFormat> {
        Self::carry(component, None)
    }

    fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<WriterFormat> {
        Self::carry(component, merge_with)
    }
}

/// Merges decomposed children into the parent document and back
#[derive(Debug)]
struct DecomposedTransformer;

impl DecomposedTransformer {
    /// Packaged location of the merged parent document
    fn merged_output(component: &SourceComponent) -> PathBuf {
        let suffix = component.ty.suffix.as_deref().unwrap_or("xml");
        PathBuf::from(&component.ty.directory_name)
            .join(format!("{}.{suffix}", component.full_name()))
    }

    /// Recompose the parent xml plus child files into one document
    fn recompose(component: &SourceComponent) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new(component.ty.name.as_str());
        root.push_attribute(("xmlns", MANIFEST_XMLNS));
        writer.write_event(Event::Start(root))?;

        if let Some(xml) = &component.xml {
            let bytes = component.tree().read_file(xml)?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            copy_document(&text, &mut writer, None)
                .map_err(|e| annotate(e, xml))?;
        }

        let mut children = component.children()?;
        children.sort_by(|a, b| a.xml.cmp(&b.xml));
        for child in children {
            let Some(child_xml) = &child.xml else { continue };
            let element = element_name(&child.ty);
            let bytes = component.tree().read_file(child_xml)?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            copy_document(&text, &mut writer, Some(&element))
                .map_err(|e| annotate(e, child_xml))?;
        }

        writer.write_event(Event::End(BytesEnd::new(component.ty.name.as_str())))?;
        let mut out = writer.into_inner();
        out.push(b'\n');
        Ok(out)
    }

    /// Split a merged document into parent and child files
    fn decompose(component: &SourceComponent, base: &Path) -> Result<Vec<WriteInfo>> {
        let xml = component
            .xml
            .as_ref()
            .ok_or_else(|| Error::Unsupported(component.ty.name.clone()))?;
        let children = component
            .ty
            .children
            .as_ref()
            .ok_or_else(|| Error::Registry(format!("type {} has no children", component.ty.name)))?;
        let by_element: HashMap<String, &MetadataType> = children
            .types
            .values()
            .map(|t| (element_name(t), t))
            .collect();

        let bytes = component.tree().read_file(xml)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);

        let mut parent = Writer::new_with_indent(Vec::new(), b' ', 4);
        parent.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new(component.ty.name.as_str());
        root.push_attribute(("xmlns", MANIFEST_XMLNS));
        parent.write_event(Event::Start(root))?;

        let mut write_infos = Vec::new();
        let mut depth = 0usize;

        loop {
            match reader.read_event().map_err(|e| annotate_parse(e, xml))? {
                Event::Start(e) => {
                    let name = local_name(&e);
                    if depth == 1 {
                        if let Some(child_ty) = by_element.get(&name) {
                            if let Some(info) =
                                extract_child(&mut reader, child_ty, base, xml)?
                            {
                                write_infos.push(info);
                            }
                            continue;
                        }
                        // Parent-owned element: copy it whole.
                        parent.write_event(Event::Start(e))?;
                        copy_until_end(&mut reader, &mut parent, xml)?;
                        parent.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                        continue;
                    }
                    depth += 1;
                }
                Event::Empty(e) => {
                    if depth == 1 {
                        parent.write_event(Event::Empty(e))?;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        parent.write_event(Event::End(BytesEnd::new(component.ty.name.as_str())))?;
        let suffix = component.ty.suffix.as_deref().unwrap_or("xml");
        let mut parent_bytes = parent.into_inner();
        parent_bytes.push(b'\n');
        write_infos.insert(
            0,
            WriteInfo {
                source: WriteSource::Bytes(parent_bytes),
                output: base.join(format!("{}.{suffix}-meta.xml", component.full_name())),
            },
        );
        Ok(write_infos)
    }
}

impl MetadataTransformer for DecomposedTransformer {
    fn to_metadata_format(&self, component: &SourceComponent) -> Result<WriterFormat> {
        let output = Self::merged_output(component);
        let write_infos = if component.content.is_some() {
            vec![WriteInfo {
                source: WriteSource::Bytes(Self::recompose(component)?),
                output,
            }]
        } else if let Some(xml) = &component.xml {
            // Already merged; pass the document through.
            vec![WriteInfo {
                source: open(component, xml)?,
                output,
            }]
        } else {
            Vec::new()
        };
        Ok(WriterFormat {
            component: component.clone(),
            write_infos,
        })
    }

    fn to_source_format(
        &self,
        component: &SourceComponent,
        merge_with: Option<&SourceComponent>,
    ) -> Result<WriterFormat> {
        // A component already in source shape copies through unchanged.
        if component.content.is_some() {
            return DefaultTransformer.to_source_format(component, merge_with);
        }

        let base = match merge_with.and_then(|m| m.content.clone()) {
            Some(existing) => existing,
            None => PathBuf::from(&component.ty.directory_name).join(component.full_name()),
        };
        Ok(WriterFormat {
            component: component.clone(),
            write_infos: Self::decompose(component, &base)?,
        })
    }
}

fn element_name(ty: &MetadataType) -> String {
    ty.xml_element_name
        .clone()
        .unwrap_or_else(|| ty.directory_name.clone())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn annotate(err: Error, path: &Path) -> Error {
    match err {
        Error::ManifestParse(msg) => Error::ManifestParse(format!("{}: {msg}", path.display())),
        other => other,
    }
}

fn annotate_parse(err: quick_xml::Error, path: &Path) -> Error {
    Error::ManifestParse(format!("{}: {err}", path.display()))
}

/// Copy a standalone document into `writer`
///
/// The document's root element is dropped when `rename_root` is `None`
/// (the caller supplied its own enclosing root) or rewritten to the given
/// element name, with the original root's attributes discarded.
fn copy_document(text: &str, writer: &mut Writer<Vec<u8>>, rename_root: Option<&str>) -> Result<()> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut depth = 0usize;

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::ManifestParse(e.to_string()))?
        {
            Event::Start(e) => {
                if depth == 0 {
                    if let Some(name) = rename_root {
                        writer.write_event(Event::Start(BytesStart::new(name)))?;
                    }
                } else {
                    writer.write_event(Event::Start(e))?;
                }
                depth += 1;
            }
            Event::End(e) => {
                depth -= 1;
                if depth == 0 {
                    if let Some(name) = rename_root {
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                } else {
                    writer.write_event(Event::End(e))?;
                }
            }
            Event::Empty(e) => {
                if depth > 0 {
                    writer.write_event(Event::Empty(e))?;
                } else if let Some(name) = rename_root {
                    writer.write_event(Event::Empty(BytesStart::new(name)))?;
                }
            }
            Event::Text(t) => {
                if depth > 0 {
                    writer.write_event(Event::Text(t))?;
                }
            }
            Event::CData(t) => writer.write_event(Event::CData(t))?,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

/// Copy events until the end tag closing the current element, exclusive
fn copy_until_end(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    path: &Path,
) -> Result<()> {
    let mut depth = 1usize;
    loop {
        match reader.read_event().map_err(|e| annotate_parse(e, path))? {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => writer.write_event(Event::Empty(e))?,
            Event::Text(t) => writer.write_event(Event::Text(t))?,
            Event::CData(t) => writer.write_event(Event::CData(t))?,
            Event::Eof => {
                return Err(Error::ManifestParse(format!(
                    "{}: unexpected end of document",
                    path.display()
                )))
            }
            _ => {}
        }
    }
}

/// Extract one child element into its own metadata xml file
///
/// The reader is positioned just past the child's start tag. Returns `None`
/// when the element carries no `fullName` to name the file by.
fn extract_child(
    reader: &mut Reader<&[u8]>,
    child_ty: &MetadataType,
    base: &Path,
    path: &Path,
) -> Result<Option<WriteInfo>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new(child_ty.name.as_str());
    root.push_attribute(("xmlns", MANIFEST_XMLNS));
    writer.write_event(Event::Start(root))?;

    let mut depth = 1usize;
    let mut capturing = false;
    let mut full_name: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| annotate_parse(e, path))? {
            Event::Start(e) => {
                capturing = depth == 1 && local_name(&e) == "fullName";
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Text(t) => {
                if capturing && full_name.is_none() {
                    full_name = Some(
                        t.unescape()
                            .map_err(|e| annotate_parse(e.into(), path))?
                            .into_owned(),
                    );
                }
                writer.write_event(Event::Text(t))?;
            }
            Event::End(e) => {
                depth -= 1;
                capturing = false;
                if depth == 0 {
                    break;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => writer.write_event(Event::Empty(e))?,
            Event::CData(t) => writer.write_event(Event::CData(t))?,
            Event::Eof => {
                return Err(Error::ManifestParse(format!(
                    "{}: unexpected end of document",
                    path.display()
                )))
            }
            _ => {}
        }
    }

    writer.write_event(Event::End(BytesEnd::new(child_ty.name.as_str())))?;

    let Some(full_name) = full_name else {
        warn!(
            "dropping {} element without a fullName in {}",
            child_ty.name,
            path.display()
        );
        return Ok(None);
    };

    let suffix = child_ty.suffix.as_deref().unwrap_or("xml");
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(Some(WriteInfo {
        source: WriteSource::Bytes(bytes),
        output: base
            .join(&child_ty.directory_name)
            .join(format!("{full_name}.{suffix}-meta.xml")),
    }))
}
