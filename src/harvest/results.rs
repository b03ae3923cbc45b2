// src/harvest/results.rs

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{Result, RunnerError};
use crate::fs::FileSystem;

/// Harvested files keyed by their path relative to the output directory
/// (`"A"`, `"osde2e-runner-out.txt"`, `"nested/report.xml"`).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResultSet(BTreeMap<String, Vec<u8>>);

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        self.0.insert(path.into(), contents);
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.0.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Error listing every name in `expected` that is not present.
    pub fn require(&self, expected: &[&str]) -> Result<()> {
        let missing: Vec<String> = expected
            .iter()
            .filter(|name| !self.contains(name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::MissingArtifacts(missing))
        }
    }

    /// Write every file below `dir`, keeping relative paths.
    pub fn write_to(&self, fs: &dyn FileSystem, dir: &Path) -> Result<()> {
        fs.create_dir_all(dir)?;
        for (path, contents) in self.iter() {
            fs.write(&dir.join(path), contents)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<u8>> {
        self.0
    }
}

impl FromIterator<(String, Vec<u8>)> for ResultSet {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
