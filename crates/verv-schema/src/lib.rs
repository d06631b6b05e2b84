//! Requirement manifest parsing and package identifiers for verv.
//!
//! This crate defines the schema layer: the plain-text manifest reader
//! (`read_manifest`), the ordered `Manifest` it produces, and the
//! `PackageName` newtype with import-name derivation used by verification.

pub mod manifest;
pub mod types;

pub use manifest::{
    parse_manifest_str, read_manifest, Manifest, ManifestError, DEFAULT_MANIFEST_NAME,
};
pub use types::PackageName;
