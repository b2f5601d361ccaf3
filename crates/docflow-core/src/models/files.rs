use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One input requirement bound to a concrete file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    /// Input name from the capability descriptor.
    pub name: String,
    /// Pattern after parameter substitution.
    pub pattern: String,
    /// Absolute path of the bound file.
    pub path: String,
}

/// Input name → resolved file, one entry per required pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedFileSet(pub BTreeMap<String, ResolvedFile>);

impl ResolvedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: ResolvedFile) {
        self.0.insert(file.name.clone(), file);
    }

    pub fn path_of(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|f| f.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.0.values()
    }
}

/// Metadata about a resolved file, reported by the resolution surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub exists: bool,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
