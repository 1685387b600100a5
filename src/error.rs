// src/error.rs

//! Crate-wide error type and result alias
//!
//! Every subsystem reports through this enum so callers see one taxonomy:
//! tree lookups, type inference, registry dispatch, manifest parsing,
//! writer commits, and remote transfer requests.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by resolution, conversion, and transfer operations
#[derive(Debug, Error)]
pub enum Error {
    /// A tree lookup missed entirely
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    /// A directory operation was attempted on a non-directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The resolver could not classify a path as any registered type
    #[error("could not infer a metadata type for {0}")]
    TypeInference(PathBuf),

    /// Missing adapter/transformer id or unknown type name
    #[error("registry error: {0}")]
    Registry(String),

    /// Malformed manifest XML
    #[error("failed to parse manifest: {0}")]
    ManifestParse(String),

    /// Writer IO failure; the offending component's writes were rolled back
    #[error("write failed: {0}")]
    Write(String),

    /// Remote SDK failure during a transfer; terminates the poll loop
    #[error("metadata transfer request failed: {0}")]
    Request(String),

    /// Operation invoked on a type that does not support it
    #[error("operation not supported for type: {0}")]
    Unsupported(String),

    /// Deploy called with a set containing no source-backed components
    #[error("deploy requires at least one source-backed component")]
    DeployNoSource,

    /// Underlying IO failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
