//! Element index consumed by lookups and search.
//!
//! The extractor is the only writer. [`JsonIndex`] keeps records in a single
//! JSON document, which is enough for lookups by name and substring search;
//! other stores plug in through [`IndexStore`].

use crate::kind::ElementKind;
use crate::model::Element;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index not found: {0}")]
    Missing(PathBuf),

    #[error("I/O error on index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed index {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Location and outline of one element in the source export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub kind: ElementKind,
    pub name: String,
    /// Offset of the element in the decoded source text.
    pub offset: usize,
    pub length: usize,
    pub methods: Vec<String>,
}

impl From<&Element> for IndexRecord {
    fn from(element: &Element) -> Self {
        Self {
            kind: element.kind,
            name: element.name.clone(),
            offset: element.byte_range.start,
            length: element.byte_range.len(),
            methods: element.methods.keys().cloned().collect(),
        }
    }
}

/// How well a record matched a search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchQuality {
    Exact,
    Prefix,
    Substring,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub record: IndexRecord,
    pub quality: MatchQuality,
}

/// Lookup interface over indexed elements.
pub trait IndexStore {
    /// Insert or replace the record with the same `(kind, name)`.
    fn upsert(&mut self, record: IndexRecord);

    /// Find an element by name, optionally restricted to one kind.
    fn find(&self, name: &str, kind: Option<ElementKind>) -> Option<&IndexRecord>;

    /// Method names of an element, sorted.
    fn methods(&self, name: &str, kind: Option<ElementKind>) -> Option<Vec<String>> {
        self.find(name, kind).map(|record| {
            let mut methods = record.methods.clone();
            methods.sort();
            methods
        })
    }

    /// Case-insensitive search over names, kind tags and method names.
    fn search(&self, query: &str, limit: usize) -> Vec<SearchHit>;

    /// Persist pending changes.
    fn flush(&mut self) -> Result<(), IndexError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    records: Vec<IndexRecord>,
}

/// JSON-file backed index.
#[derive(Debug)]
pub struct JsonIndex {
    path: PathBuf,
    document: IndexDocument,
    dirty: bool,
}

impl JsonIndex {
    /// Start an empty index that will be written to `path` on flush.
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: IndexDocument::default(),
            dirty: true,
        }
    }

    /// Load an existing index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IndexError::Missing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = serde_json::from_str(&text).map_err(|source| IndexError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            document,
            dirty: false,
        })
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Ok(Self::create(path))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.document.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.records.is_empty()
    }
}

impl IndexStore for JsonIndex {
    fn upsert(&mut self, record: IndexRecord) {
        let existing = self
            .document
            .records
            .iter_mut()
            .find(|r| r.kind == record.kind && r.name == record.name);
        match existing {
            Some(slot) => *slot = record,
            None => self.document.records.push(record),
        }
        self.dirty = true;
    }

    fn find(&self, name: &str, kind: Option<ElementKind>) -> Option<&IndexRecord> {
        self.document
            .records
            .iter()
            .find(|r| r.name == name && kind.map_or(true, |k| r.kind == k))
    }

    fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .document
            .records
            .iter()
            .filter_map(|record| {
                let name = record.name.to_lowercase();
                let quality = if name == needle {
                    MatchQuality::Exact
                } else if name.starts_with(&needle) {
                    MatchQuality::Prefix
                } else if name.contains(&needle) || record.kind.tag().eq_ignore_ascii_case(&needle)
                {
                    MatchQuality::Substring
                } else if record
                    .methods
                    .iter()
                    .any(|m| m.to_lowercase().contains(&needle))
                {
                    MatchQuality::Method
                } else {
                    return None;
                };
                Some(SearchHit {
                    record: record.clone(),
                    quality,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.quality
                .cmp(&b.quality)
                .then_with(|| a.record.name.cmp(&b.record.name))
        });
        hits.truncate(limit);
        hits
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.document).map_err(|source| {
            IndexError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| IndexError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        log::debug!("wrote {} index records to {}", self.len(), self.path.display());
        Ok(())
    }
}
