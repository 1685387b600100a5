// src/resolve/mod.rs

//! Source resolution: type inference, adapters, and the tree walk

pub mod adapters;
mod resolver;

pub use adapters::{create_adapter, AdapterContext, SourceAdapter};
pub use resolver::SourceResolver;
