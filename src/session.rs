//! Per-process context for lookups against an indexed export.
//!
//! Built once from a [`Config`]; the index, the decoded source and the
//! working tree are each opened on first use and kept for the rest of the
//! session. A failed initialization is returned to the caller and retried on
//! the next call.

use crate::config::Config;
use crate::encoding::{read_source, EncodingError, SourceText};
use crate::extract::parse_span;
use crate::index::{IndexError, IndexStore, JsonIndex, SearchHit};
use crate::kind::ElementKind;
use crate::model::Element;
use crate::scan::{scan_elements, ELEMENT_MARKER};
use crate::tree::{SaveReport, TreeError, WorkingTree};
use filetime::FileTime;
use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no source export configured for this session")]
    NoSource,

    #[error("index unavailable: {0}")]
    Index(#[from] IndexError),

    #[error("source export unavailable: {0}")]
    Source(#[from] EncodingError),

    #[error("cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working tree unavailable: {0}")]
    Tree(#[from] TreeError),

    #[error("element '{name}' not found in the index")]
    ElementNotFound {
        name: String,
        kind: Option<ElementKind>,
    },

    #[error("method '{method}' not found in element '{element}'")]
    MethodNotFound { element: String, method: String },

    #[error("index entry for '{name}' at offset {offset} no longer matches the source; re-run extract")]
    StaleIndex { name: String, offset: usize },
}

struct LoadedSource {
    text: SourceText,
    modified: FileTime,
}

pub struct Session {
    config: Config,
    source_path: Option<PathBuf>,
    index: OnceCell<JsonIndex>,
    source: OnceCell<LoadedSource>,
    tree: OnceCell<WorkingTree>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source_path: None,
            index: OnceCell::new(),
            source: OnceCell::new(),
            tree: OnceCell::new(),
        }
    }

    /// Export the index offsets refer to.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    fn index(&self) -> Result<&JsonIndex, SessionError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let index = JsonIndex::open(&self.config.index.path)?;
        log::debug!("loaded index with {} records", index.len());
        Ok(self.index.get_or_init(|| index))
    }

    fn source(&self) -> Result<&LoadedSource, SessionError> {
        if let Some(source) = self.source.get() {
            return Ok(source);
        }
        let path = self.source_path.as_deref().ok_or(SessionError::NoSource)?;
        let text = read_source(path, self.config.fallback_encoding())?;
        let meta = fs::metadata(path).map_err(|source| SessionError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded = LoadedSource {
            text,
            modified: FileTime::from_last_modification_time(&meta),
        };
        Ok(self.source.get_or_init(|| loaded))
    }

    fn tree(&self) -> Result<&WorkingTree, SessionError> {
        if let Some(tree) = self.tree.get() {
            return Ok(tree);
        }
        let tree = WorkingTree::create(
            &self.config.tree.dir,
            self.config.tree_layout(),
            self.config.fallback_encoding(),
        )?;
        Ok(self.tree.get_or_init(|| tree))
    }

    /// Parse one element straight from its indexed byte range.
    pub fn get_element(
        &self,
        name: &str,
        kind: Option<ElementKind>,
    ) -> Result<Element, SessionError> {
        let record = self
            .index()?
            .find(name, kind)
            .cloned()
            .ok_or_else(|| SessionError::ElementNotFound {
                name: name.to_string(),
                kind,
            })?;
        let source = &self.source()?.text.text;

        let stale = || SessionError::StaleIndex {
            name: record.name.clone(),
            offset: record.offset,
        };
        let end = record.offset.checked_add(record.length).ok_or_else(stale)?;
        let text = source
            .get(record.offset..end)
            .filter(|text| text.starts_with(ELEMENT_MARKER))
            .ok_or_else(stale)?;
        let span = scan_elements(text).into_iter().next().ok_or_else(stale)?;
        let mut element = parse_span(text, &span)
            .ok()
            .flatten()
            .filter(|element| element.kind == record.kind && element.name == record.name)
            .ok_or_else(stale)?;

        element.byte_range = record.offset..end;
        Ok(element)
    }

    /// Decoded body of one method.
    pub fn get_method(
        &self,
        element: &str,
        method: &str,
        kind: Option<ElementKind>,
    ) -> Result<String, SessionError> {
        let mut parsed = self.get_element(element, kind)?;
        parsed
            .methods
            .swap_remove(method)
            .ok_or_else(|| SessionError::MethodNotFound {
                element: element.to_string(),
                method: method.to_string(),
            })
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SessionError> {
        Ok(self.index()?.search(query, limit))
    }

    /// Write one element to the working tree, replacing its method files.
    ///
    /// Files are stamped with the source's modification time, so they only
    /// become edit candidates once edited.
    pub fn checkout_element(
        &self,
        name: &str,
        kind: Option<ElementKind>,
    ) -> Result<(Element, SaveReport), SessionError> {
        let element = self.get_element(name, kind)?;
        let stamp = self.source()?.modified;
        let report = self.tree()?.save(&element, true, Some(stamp))?;
        Ok((element, report))
    }
}
