// src/lib.rs

//! Metapack
//!
//! Metadata source/package converter and transfer driver for
//! declarative-cloud deployments. The same logical components exist in two
//! on-disk layouts, a decomposed source tree and a flat packaged format;
//! this crate moves between them and drives deploy/retrieve transfers
//! against the remote metadata service.
//!
//! # Architecture
//!
//! - Registry-first: a static type catalog drives inference, adapters, and
//!   transformers
//! - Trees: resolution reads through an abstract tree, never the raw
//!   filesystem
//! - Components: `(type, fullName)` identity, de-duplicated sets,
//!   wildcard-aware membership
//! - Conversion: per-type transformers emit write instructions; writers
//!   commit per component
//! - Transfers: poll-driven lifecycle with cooperative cancellation and
//!   per-file result synthesis

pub mod component;
pub mod convert;
mod error;
pub mod ignore_file;
pub mod manifest;
pub mod project;
pub mod registry;
pub mod resolve;
pub mod transfer;
pub mod tree;

pub use component::{ComponentSet, MetadataComponent, SourceComponent, WILDCARD};
pub use convert::{
    ConvertOutput, ConvertResult, MetadataConverter, PackageFormat, StandardWriter, ZipWriter,
};
pub use error::{Error, Result};
pub use ignore_file::SourceIgnore;
pub use manifest::{ManifestResolver, PackageManifest, PackageTypeMembers, ResolvedManifest};
pub use project::{PackageDirectory, ProjectConfig};
pub use registry::{MetadataType, Registry};
pub use resolve::SourceResolver;
pub use transfer::{
    DeployOptions, DeployResult, FileResponse, FileResponseState, MetadataApiDeploy,
    MetadataApiRetrieve, MetadataConnection, MetadataTransfer, RequestStatus, RetrieveResult,
    TransferCancel, TransferListener,
};
pub use tree::{NativeTree, TreeContainer, VirtualTree};
