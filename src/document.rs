//! The shared `containers_<HHMM>` document.
//!
//! Every cooperating process appends `<container>` entries to the same XML
//! file during a round. The file is always rewritten in full:
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <containers><container name="node-a-311" index="1"/><container name="node-b-97" index="1"/></containers>
//! ```
//!
//! Entries keep append order. `index` grows within one process's appends but
//! says nothing about ordering across processes.

use crate::constants::{DOCUMENT_FILE_EXTENSION, DOCUMENT_KEY_PREFIX};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Human-readable name of a shared document, also used as its lock name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Time-bucketed key for the round starting at `start`, e.g.
    /// `containers_0905`.
    pub fn for_round<T: Timelike>(start: &T) -> Self {
        Self(format!("{DOCUMENT_KEY_PREFIX}_{:02}{:02}", start.hour(), start.minute()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<base_dir>/<key>.xml`
    pub fn document_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(format!("{}.{DOCUMENT_FILE_EXTENSION}", self.0))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One appended record: who wrote it and its per-process sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEntry {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@index")]
    pub index: u32,
}

impl ContainerEntry {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed XML: {0}")]
    Decode(String),

    #[error("cannot serialize document: {0}")]
    Encode(String),
}

/// In-memory form of a shared document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "containers")]
pub struct ContainerDocument {
    #[serde(rename = "container", default)]
    entries: Vec<ContainerEntry>,
}

impl ContainerDocument {
    /// Empty skeleton used when the document does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ContainerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: ContainerEntry) {
        self.entries.push(entry);
    }

    pub fn from_xml(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(bytes)?;
        quick_xml::de::from_str(text).map_err(|e| DocumentError::Decode(e.to_string()))
    }

    pub fn to_xml(&self) -> Result<Vec<u8>, DocumentError> {
        let body = quick_xml::se::to_string(self).map_err(|e| DocumentError::Encode(e.to_string()))?;
        Ok(format!("{XML_DECLARATION}\n{body}").into_bytes())
    }
}
