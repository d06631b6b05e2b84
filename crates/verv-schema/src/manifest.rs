use crate::types::PackageName;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the manifest when none is configured.
pub const DEFAULT_MANIFEST_NAME: &str = "requirements.txt";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ordered list of package identifiers read from a plain-text manifest.
///
/// Order and duplicates are preserved exactly as written; only blank lines
/// are dropped and surrounding whitespace trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<PackageName>,
}

impl Manifest {
    pub fn packages(&self) -> &[PackageName] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageName> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a PackageName;
    type IntoIter = std::slice::Iter<'a, PackageName>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<PackageName> for Manifest {
    fn from_iter<I: IntoIterator<Item = PackageName>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

pub fn parse_manifest_str(input: &str) -> Manifest {
    input
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PackageName::from)
        .collect()
}

/// Read the manifest at `path`, fresh on every call.
///
/// A missing file is an absence condition and yields `Ok(None)`; callers treat
/// it as "nothing to do". Any other I/O failure is an error.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Option<Manifest>, ManifestError> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(parse_manifest_str(&content))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ManifestError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_blanks_trims_and_keeps_duplicates_in_order() {
        let manifest = parse_manifest_str("requests\n\n  numpy  \nrequests\n");
        let names: Vec<&str> = manifest.iter().map(PackageName::as_str).collect();
        assert_eq!(names, vec!["requests", "numpy", "requests"]);
    }

    #[test]
    fn whitespace_only_lines_are_blank() {
        let manifest = parse_manifest_str(" \t\n\n   \n");
        assert!(manifest.is_empty());
    }

    #[test]
    fn handles_crlf_and_missing_trailing_newline() {
        let manifest = parse_manifest_str("six\r\nattrs");
        assert_eq!(manifest.packages(), &[PackageName::new("six"), PackageName::new("attrs")]);
    }

    #[test]
    fn leading_byte_order_mark_is_ignored() {
        let manifest = parse_manifest_str("\u{feff}six\n");
        assert_eq!(manifest.packages(), &[PackageName::new("six")]);
    }

    #[test]
    fn hash_lines_are_entries_not_comments() {
        let manifest = parse_manifest_str("# not a comment\nsix\n");
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn missing_file_is_absence_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_manifest(dir.path().join("requirements.txt")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "requests\n\n  numpy  \nrequests\n").unwrap();
        let manifest = read_manifest(&path).unwrap().unwrap();
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.packages()[1], "numpy");
    }

    #[test]
    fn directory_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_manifest(dir.path()).unwrap_err();
        assert!(err.to_string().contains("failed to read manifest"));
    }

    #[test]
    fn serializes_as_plain_list() {
        let manifest = parse_manifest_str("a\nb\n");
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }
}
