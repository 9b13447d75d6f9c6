//! # hicmap-core
//!
//! Data model shared by the hicmap crates: genomic regions and spans,
//! contacts (edges) with typed extension fields, region/window keys, and
//! per-chromosome interval search.
//!
//! Higher-level crates build on these types: `hicmap-store` persists
//! regions and edges, `hicmap-matrix` materializes dense windows. Nothing
//! in this crate touches the filesystem.

pub mod errors;
pub mod models;
