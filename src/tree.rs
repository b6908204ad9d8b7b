//! File-per-method working tree.
//!
//! Each element is projected to `<root>/<element name>/` holding one
//! `<method>.<ext>` file per method and a metadata file whose first line is
//! `Type: <TAG>`, followed by `Key: Value` property lines.

use crate::encoding::{read_text_file, EncodingError};
use crate::kind::ElementKind;
use crate::model::Element;
use encoding_rs::Encoding;
use filetime::FileTime;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const TYPE_KEY: &str = "Type";

/// File naming inside the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    /// Extension of method files, without the dot.
    pub method_ext: String,
    pub metadata_file: String,
}

impl Default for TreeLayout {
    fn default() -> Self {
        Self {
            method_ext: "xpp".to_string(),
            metadata_file: "properties.txt".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("working tree not found: {0}")]
    Missing(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata in {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("'{name}' is already extracted as {existing}; refusing to save a {found} over it")]
    KindConflict {
        name: String,
        existing: ElementKind,
        found: ElementKind,
    },

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TreeError + '_ {
    move |source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Element directory found in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRecord {
    pub name: String,
    pub dir: PathBuf,
}

/// Parsed metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: ElementKind,
    pub properties: IndexMap<String, String>,
}

/// One method file with its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFile {
    pub method: String,
    pub path: PathBuf,
    pub modified: FileTime,
}

/// Outcome of persisting one element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub written: usize,
    /// Method files left untouched because they already existed.
    pub kept: usize,
}

#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
    layout: TreeLayout,
    fallback: &'static Encoding,
}

impl WorkingTree {
    /// Open the tree at `root`, creating the directory if needed.
    pub fn create(
        root: impl Into<PathBuf>,
        layout: TreeLayout,
        fallback: &'static Encoding,
    ) -> Result<Self, TreeError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self {
            root,
            layout,
            fallback,
        })
    }

    /// Open an existing tree; a missing root is an error.
    pub fn open(
        root: impl Into<PathBuf>,
        layout: TreeLayout,
        fallback: &'static Encoding,
    ) -> Result<Self, TreeError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TreeError::Missing(root));
        }
        Ok(Self {
            root,
            layout,
            fallback,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    pub fn element_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn method_path(&self, element: &str, method: &str) -> PathBuf {
        self.element_dir(element)
            .join(format!("{method}.{}", self.layout.method_ext))
    }

    /// True when the element directory holds at least one method file.
    pub fn has_methods(&self, name: &str) -> bool {
        let dir = self.element_dir(name);
        let Ok(entries) = fs::read_dir(&dir) else {
            return false;
        };
        entries
            .filter_map(Result::ok)
            .any(|entry| self.is_method_file(&entry.path()))
    }

    /// Kind recorded in the element directory's metadata, if readable.
    pub fn existing_kind(&self, name: &str) -> Option<ElementKind> {
        let path = self.element_dir(name).join(&self.layout.metadata_file);
        let text = read_text_file(&path, self.fallback).ok()?;
        parse_metadata(&text).ok().map(|metadata| metadata.kind)
    }

    /// True when `element` needs no extraction: its directory already holds
    /// method files, or, for an element without methods, metadata of the
    /// same kind. A directory of another kind never counts.
    pub fn is_extracted(&self, element: &Element) -> bool {
        match self.existing_kind(&element.name) {
            Some(kind) if kind != element.kind => false,
            Some(_) => element.methods.is_empty() || self.has_methods(&element.name),
            None => self.has_methods(&element.name),
        }
    }

    fn is_method_file(&self, path: &Path) -> bool {
        path.is_file()
            && path.extension().and_then(|ext| ext.to_str()) == Some(self.layout.method_ext.as_str())
    }

    /// Persist an element.
    ///
    /// The metadata file is always rewritten. Existing method files are only
    /// replaced when `overwrite` is set. When `stamp` is given, every written
    /// method file gets it as modification time.
    ///
    /// A directory whose metadata names another kind is left untouched and
    /// reported as [`TreeError::KindConflict`].
    pub fn save(
        &self,
        element: &Element,
        overwrite: bool,
        stamp: Option<FileTime>,
    ) -> Result<SaveReport, TreeError> {
        if let Some(existing) = self.existing_kind(&element.name) {
            if existing != element.kind {
                return Err(TreeError::KindConflict {
                    name: element.name.clone(),
                    existing,
                    found: element.kind,
                });
            }
        }

        let dir = self.element_dir(&element.name);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let metadata_path = dir.join(&self.layout.metadata_file);
        fs::write(&metadata_path, render_metadata(element)).map_err(io_error(&metadata_path))?;

        let mut report = SaveReport::default();
        for (method, body) in &element.methods {
            let path = self.method_path(&element.name, method);
            if !overwrite && path.exists() {
                report.kept += 1;
                continue;
            }
            fs::write(&path, body).map_err(io_error(&path))?;
            if let Some(stamp) = stamp {
                filetime::set_file_mtime(&path, stamp).map_err(io_error(&path))?;
            }
            report.written += 1;
        }

        log::debug!(
            "saved {} {}: {} written, {} kept",
            element.kind,
            element.name,
            report.written,
            report.kept
        );
        Ok(report)
    }

    /// Element directories sorted by name. Hidden directories are ignored.
    pub fn records(&self) -> Result<Vec<TreeRecord>, TreeError> {
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| TreeError::Io {
                path: self.root.clone(),
                source: err.into(),
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            records.push(TreeRecord {
                name,
                dir: entry.into_path(),
            });
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn read_metadata(&self, record: &TreeRecord) -> Result<Metadata, TreeError> {
        let path = record.dir.join(&self.layout.metadata_file);
        if !path.is_file() {
            return Err(TreeError::Metadata {
                path,
                reason: "metadata file is missing".to_string(),
            });
        }
        let text = read_text_file(&path, self.fallback)?;
        parse_metadata(&text).map_err(|reason| TreeError::Metadata { path, reason })
    }

    /// Method files of a record, sorted by method name.
    pub fn method_files(&self, record: &TreeRecord) -> Result<Vec<MethodFile>, TreeError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&record.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| TreeError::Io {
                path: record.dir.clone(),
                source: err.into(),
            })?;
            let path = entry.path();
            if !self.is_method_file(path) {
                continue;
            }
            let Some(method) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let meta = entry.metadata().map_err(|err| TreeError::Io {
                path: path.to_path_buf(),
                source: err.into(),
            })?;
            files.push(MethodFile {
                method: method.to_string(),
                path: path.to_path_buf(),
                modified: FileTime::from_last_modification_time(&meta),
            });
        }
        files.sort_by(|a, b| a.method.cmp(&b.method));
        Ok(files)
    }

    /// Method files of `record` modified strictly after `reference`.
    pub fn edited_methods(
        &self,
        record: &TreeRecord,
        reference: FileTime,
    ) -> Result<Vec<MethodFile>, TreeError> {
        let mut files = self.method_files(record)?;
        files.retain(|file| file.modified > reference);
        Ok(files)
    }

    pub fn read_method(&self, file: &MethodFile) -> Result<String, TreeError> {
        Ok(read_text_file(&file.path, self.fallback)?)
    }

    /// Remove the whole tree and recreate an empty root.
    pub fn reset(&self) -> Result<(), TreeError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(io_error(&self.root))?;
            log::info!("removed working tree {}", self.root.display());
        }
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))
    }
}

fn render_metadata(element: &Element) -> String {
    let mut out = format!("{TYPE_KEY}: {}\n", element.kind.tag());
    for (key, value) in &element.properties {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out
}

fn parse_metadata(text: &str) -> Result<Metadata, String> {
    let mut kind = None;
    let mut properties = IndexMap::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if kind.is_none() && key == TYPE_KEY {
            kind = Some(value.parse::<ElementKind>().map_err(|err| err.to_string())?);
            continue;
        }
        properties.insert(key.to_string(), value.to_string());
    }

    let kind = kind.ok_or_else(|| format!("no '{TYPE_KEY}:' line"))?;
    Ok(Metadata { kind, properties })
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1251;

    fn sample_element() -> Element {
        let mut element = Element::new(ElementKind::Class, "Foo", 0..100);
        element
            .properties
            .insert("Extends".to_string(), "RunBase".to_string());
        element
            .methods
            .insert("bar".to_string(), "return 1;".to_string());
        element.methods.insert("empty".to_string(), String::new());
        element
    }

    #[test]
    fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();

        let report = tree.save(&sample_element(), false, None).unwrap();
        assert_eq!(report, SaveReport { written: 2, kept: 0 });
        assert!(tree.has_methods("Foo"));
        assert!(!tree.has_methods("Bar"));

        let records = tree.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Foo");

        let metadata = tree.read_metadata(&records[0]).unwrap();
        assert_eq!(metadata.kind, ElementKind::Class);
        assert_eq!(metadata.properties.get("Extends").unwrap(), "RunBase");

        let files = tree.method_files(&records[0]).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.method.as_str()).collect();
        assert_eq!(names, ["bar", "empty"]);
        assert_eq!(tree.read_method(&files[0]).unwrap(), "return 1;");
    }

    #[test]
    fn test_save_without_overwrite_keeps_edits() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();
        tree.save(&sample_element(), false, None).unwrap();

        let path = tree.method_path("Foo", "bar");
        fs::write(&path, "return 2;").unwrap();

        let report = tree.save(&sample_element(), false, None).unwrap();
        assert_eq!(report.kept, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "return 2;");

        tree.save(&sample_element(), true, None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "return 1;");
    }

    #[test]
    fn test_stamp_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();
        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        tree.save(&sample_element(), false, Some(stamp)).unwrap();

        let records = tree.records().unwrap();
        for file in tree.method_files(&records[0]).unwrap() {
            assert_eq!(file.modified, stamp);
        }
    }

    #[test]
    fn test_edited_methods_are_strictly_newer() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();
        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        tree.save(&sample_element(), false, Some(stamp)).unwrap();

        let later = FileTime::from_unix_time(1_600_000_100, 0);
        filetime::set_file_mtime(tree.method_path("Foo", "bar"), later).unwrap();

        let records = tree.records().unwrap();
        let edited = tree.edited_methods(&records[0], stamp).unwrap();
        assert_eq!(edited.len(), 1);
        assert_eq!(edited[0].method, "bar");
        assert!(tree.edited_methods(&records[0], later).unwrap().is_empty());
    }

    #[test]
    fn test_save_refuses_other_kind() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();
        tree.save(&sample_element(), false, None).unwrap();

        let mut form = Element::new(ElementKind::Form, "Foo", 0..10);
        form.methods.insert("init".to_string(), "super();".to_string());
        let result = tree.save(&form, true, None);
        assert!(matches!(
            result,
            Err(TreeError::KindConflict {
                existing: ElementKind::Class,
                found: ElementKind::Form,
                ..
            })
        ));

        assert_eq!(tree.existing_kind("Foo"), Some(ElementKind::Class));
        assert!(!tree.method_path("Foo", "init").exists());
        assert!(!tree.is_extracted(&form));
    }

    #[test]
    fn test_element_without_methods_counts_as_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();
        let edt = Element::new(ElementKind::EditType, "CustAccount", 0..10);
        assert!(!tree.is_extracted(&edt));

        tree.save(&edt, false, None).unwrap();
        assert!(!tree.has_methods("CustAccount"));
        assert!(tree.is_extracted(&edt));

        let mut with_method = edt.clone();
        with_method.methods.insert("x".to_string(), String::new());
        assert!(!tree.is_extracted(&with_method));
    }

    #[test]
    fn test_open_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        let result = WorkingTree::open(dir.path().join("nope"), TreeLayout::default(), WINDOWS_1251);
        assert!(matches!(result, Err(TreeError::Missing(_))));
    }

    #[test]
    fn test_metadata_errors() {
        assert!(parse_metadata("Extends: RunBase\n").is_err());
        assert!(parse_metadata("Type: XYZ\n").is_err());
        let parsed = parse_metadata("Type: JOB\nOrigin: {1234}\n").unwrap();
        assert_eq!(parsed.kind, ElementKind::Job);
        assert_eq!(parsed.properties.get("Origin").unwrap(), "{1234}");
    }

    #[test]
    fn test_missing_metadata_file() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();
        fs::create_dir_all(dir.path().join("Orphan")).unwrap();
        let records = tree.records().unwrap();
        assert!(matches!(
            tree.read_metadata(&records[0]),
            Err(TreeError::Metadata { .. })
        ));
    }

    #[test]
    fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree");
        let tree = WorkingTree::create(&root, TreeLayout::default(), WINDOWS_1251).unwrap();
        tree.save(&sample_element(), false, None).unwrap();
        tree.reset().unwrap();
        assert!(root.is_dir());
        assert!(tree.records().unwrap().is_empty());
    }
}
