//! Read path: export text to elements to working tree.
//!
//! One scan over the buffer, one kind-specific parse per span. A span that
//! cannot be parsed is recorded and skipped; only an unreadable source file
//! or a failing write to the tree stops the pass.

use crate::codec::decode;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::encoding::{read_source, EncodingError, SourceEncoding};
use crate::index::{IndexError, IndexRecord, IndexStore};
use crate::kind::ElementKind;
use crate::model::Element;
use crate::scan::{
    find_region, method_blocks, method_scope, parse_properties, resolve_name, scan_elements,
    ElementSpan, END_PROPERTIES, END_TAG, PROPERTIES,
};
use crate::tree::{TreeError, WorkingTree};
use encoding_rs::Encoding;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("source export unavailable: {0}")]
    Source(#[from] EncodingError),

    #[error("cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working tree write failed: {0}")]
    Tree(#[from] TreeError),

    #[error("index update failed: {0}")]
    Index(#[from] IndexError),
}

/// Elements parsed from a buffer, without touching the filesystem.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub elements: Vec<Element>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse one span into an element.
///
/// Returns `Ok(None)` for spans whose tag is outside the supported set and
/// `Err` when a supported span has no resolvable name.
pub fn parse_span(buffer: &str, span: &ElementSpan) -> Result<Option<Element>, Diagnostic> {
    let Some(kind) = span.kind else {
        if span.tag != END_TAG {
            log::debug!("ignoring element tag '{}' at offset {}", span.tag, span.start);
        }
        return Ok(None);
    };

    let text = span.text(buffer);
    let name = resolve_name(kind, text).ok_or_else(|| {
        Diagnostic::new(
            DiagnosticKind::UnparseableSpan,
            format!(
                "{} span at offset {} has no '{} #<name>' header",
                kind,
                span.start,
                kind.name_keyword()
            ),
        )
    })?;

    let mut element = Element::new(kind, name, span.range());

    if let Some(region) = find_region(text, PROPERTIES, END_PROPERTIES) {
        element.properties = parse_properties(region.content(text));
    }

    let scope = method_scope(kind, text);
    let scoped = &text[scope];
    for block in method_blocks(scoped) {
        let body = decode(block.raw_body(scoped));
        if element.methods.contains_key(&block.name) {
            log::debug!(
                "{} {} repeats method '{}'; keeping the first",
                kind,
                element.name,
                block.name
            );
            continue;
        }
        element.methods.insert(block.name, body);
    }

    Ok(Some(element))
}

/// Parse every element of an export buffer.
pub fn parse_elements(buffer: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for span in scan_elements(buffer) {
        match parse_span(buffer, &span) {
            Ok(Some(element)) => {
                if element.kind == ElementKind::Job && element.methods.len() > 1 {
                    outcome.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::MultiMethodJob,
                            format!(
                                "job holds {} methods; named after the first",
                                element.methods.len()
                            ),
                        )
                        .element(&element.name)
                        .emit(),
                    );
                }
                outcome.elements.push(element);
            }
            Ok(None) => {}
            Err(diagnostic) => outcome.diagnostics.push(diagnostic.emit()),
        }
    }

    outcome
}

/// Summary of one extraction pass.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Elements written to the working tree.
    pub extracted: Vec<Element>,
    /// Names of elements left alone because they were already extracted.
    pub skipped: Vec<String>,
    pub methods_written: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// Encoding the source was read with, when extracted from a file.
    pub encoding: Option<SourceEncoding>,
}

impl ExtractReport {
    pub fn parsed(&self) -> usize {
        self.extracted.len()
    }

    pub fn unparseable(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnparseableSpan)
            .count()
    }
}

/// Extraction pass over one export into one working tree.
pub struct Extractor<'a> {
    tree: &'a WorkingTree,
    index: Option<&'a mut dyn IndexStore>,
    skip_existing: bool,
    stamp: Option<FileTime>,
}

impl<'a> Extractor<'a> {
    pub fn new(tree: &'a WorkingTree) -> Self {
        Self {
            tree,
            index: None,
            skip_existing: true,
            stamp: None,
        }
    }

    /// Skip elements that are already in the tree (the default).
    /// Passing `false` forces a full re-parse that overwrites method files.
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Modification time given to every written method file.
    pub fn stamp(mut self, stamp: Option<FileTime>) -> Self {
        self.stamp = stamp;
        self
    }

    /// Also record every parsed element in `index`.
    pub fn with_index(mut self, index: &'a mut dyn IndexStore) -> Self {
        self.index = Some(index);
        self
    }

    /// Extract from an already decoded buffer.
    pub fn run(&mut self, buffer: &str) -> Result<ExtractReport, ExtractError> {
        let outcome = parse_elements(buffer);
        let mut report = ExtractReport {
            diagnostics: outcome.diagnostics,
            ..ExtractReport::default()
        };

        for element in outcome.elements {
            if let Some(index) = self.index.as_deref_mut() {
                index.upsert(IndexRecord::from(&element));
            }

            if let Some(existing) = self.tree.existing_kind(&element.name) {
                if existing != element.kind {
                    report.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::NameCollision,
                            format!(
                                "working tree already holds a {existing} of this name; {} not extracted",
                                element.kind
                            ),
                        )
                        .element(&element.name)
                        .emit(),
                    );
                    continue;
                }
            }

            if self.skip_existing && self.tree.is_extracted(&element) {
                log::debug!("{} {} already extracted; skipping", element.kind, element.name);
                report.skipped.push(element.name);
                continue;
            }

            let saved = self.tree.save(&element, !self.skip_existing, self.stamp)?;
            report.methods_written += saved.written;
            report.extracted.push(element);
        }

        if let Some(index) = self.index.as_deref_mut() {
            index.flush()?;
        }

        log::info!(
            "extracted {} elements, skipped {}, {} unparseable",
            report.parsed(),
            report.skipped.len(),
            report.unparseable()
        );
        Ok(report)
    }

    /// Extract from an export file.
    ///
    /// Method files are stamped with the source's modification time so that
    /// only later edits count as changes on write-back.
    pub fn run_file(
        &mut self,
        path: &Path,
        fallback: &'static Encoding,
    ) -> Result<ExtractReport, ExtractError> {
        let source = read_source(path, fallback)?;
        let meta = fs::metadata(path).map_err(|source| ExtractError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        if self.stamp.is_none() {
            self.stamp = Some(FileTime::from_last_modification_time(&meta));
        }

        let mut report = self.run(&source.text)?;
        report.encoding = Some(source.encoding);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::JsonIndex;
    use crate::tree::TreeLayout;
    use encoding_rs::WINDOWS_1251;

    const EXPORT: &str = "Exportfile for AOT version 1.0 or later
Formatversion: 1

***Element: CLS

; Microsoft Dynamics AX Class: Foo unloaded
; --------------------------------------------------------------------------------
  CLSVERSION 1

  CLASS #Foo
    PROPERTIES
      Name                #Foo
      Extends             #RunBase
    ENDPROPERTIES

    METHODS
      SOURCE #classDeclaration
        #class Foo extends RunBase
        #{
        #}
      ENDSOURCE
      SOURCE #bar
        #int bar()
        #{
        #    return 1;
        #}
      ENDSOURCE
    ENDMETHODS
  ENDCLASS

***Element: TAB

  TABLE
    PROPERTIES
    ENDPROPERTIES

***Element: JOB

; Microsoft Dynamics AX Job: mainJob unloaded
; --------------------------------------------------------------------------------
  JOBVERSION 1

  SOURCE #mainJob
    #static void mainJob(Args _args)
    #{
    #    info(\"done\");
    #}
  ENDSOURCE

***Element: END
";

    #[test]
    fn test_parse_elements() {
        let outcome = parse_elements(EXPORT);
        assert_eq!(outcome.elements.len(), 2);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::UnparseableSpan);

        let foo = &outcome.elements[0];
        assert_eq!(foo.kind, ElementKind::Class);
        assert_eq!(foo.name, "Foo");
        assert_eq!(foo.extends(), Some("RunBase"));
        let methods: Vec<_> = foo.methods.keys().map(String::as_str).collect();
        assert_eq!(methods, ["classDeclaration", "bar"]);
        assert_eq!(foo.method("bar"), Some("int bar()\n{\n    return 1;\n}"));
        assert_eq!(foo.declaration_body(), Some("{\n}"));
        assert!(EXPORT[foo.byte_range.clone()].starts_with("***Element: CLS"));

        let job = &outcome.elements[1];
        assert_eq!(job.kind, ElementKind::Job);
        assert_eq!(job.name, "mainJob");
        assert!(job.method("mainJob").unwrap().contains("info(\"done\");"));
    }

    #[test]
    fn test_extract_and_skip_existing() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();

        let first = Extractor::new(&tree).run(EXPORT).unwrap();
        assert_eq!(first.parsed(), 2);
        assert_eq!(first.methods_written, 3);
        assert_eq!(first.unparseable(), 1);
        assert!(dir.path().join("mainJob/mainJob.xpp").is_file());
        assert!(dir.path().join("Foo/bar.xpp").is_file());

        let second = Extractor::new(&tree).run(EXPORT).unwrap();
        assert_eq!(second.parsed(), 0);
        assert_eq!(second.skipped, ["Foo", "mainJob"]);

        let forced = Extractor::new(&tree).skip_existing(false).run(EXPORT).unwrap();
        assert_eq!(forced.parsed(), 2);
    }

    #[test]
    fn test_extract_updates_index() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path().join("tree"), TreeLayout::default(), WINDOWS_1251)
            .unwrap();
        let mut index = JsonIndex::create(dir.path().join("index.json"));

        Extractor::new(&tree).with_index(&mut index).run(EXPORT).unwrap();

        let record = index.find("Foo", Some(ElementKind::Class)).unwrap();
        assert_eq!(&EXPORT[record.offset..record.offset + record.length][..15], "***Element: CLS");
        assert_eq!(record.methods, ["classDeclaration", "bar"]);
        assert!(dir.path().join("index.json").is_file());
    }

    const SHARED_NAME: &str = "Exportfile for AOT version 1.0 or later
***Element: TAB

  TABLE #CustTable
    METHODS
      SOURCE #find
        #static CustTable find()
        #{
        #}
      ENDSOURCE
    ENDMETHODS
  ENDTABLE

***Element: FRM

  FORM #CustTable
    METHODS
      SOURCE #init
        #void init()
        #{
        #    super();
        #}
      ENDSOURCE
    ENDMETHODS
  ENDFORM

***Element: END
";

    #[test]
    fn test_same_name_of_another_kind_is_a_collision() {
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();

        let report = Extractor::new(&tree).run(SHARED_NAME).unwrap();
        assert_eq!(report.parsed(), 1);
        assert_eq!(report.extracted[0].kind, ElementKind::Table);
        assert!(report.skipped.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        let collision = &report.diagnostics[0];
        assert_eq!(collision.kind, DiagnosticKind::NameCollision);
        assert_eq!(collision.element.as_deref(), Some("CustTable"));
        assert!(collision.message.contains("TAB"));
        assert!(collision.message.contains("FRM"));

        let forced = Extractor::new(&tree).skip_existing(false).run(SHARED_NAME).unwrap();
        assert_eq!(forced.parsed(), 1);
        assert_eq!(forced.diagnostics[0].kind, DiagnosticKind::NameCollision);

        let metadata = fs::read_to_string(dir.path().join("CustTable/properties.txt")).unwrap();
        assert!(metadata.starts_with("Type: TAB\n"));
        assert!(dir.path().join("CustTable/find.xpp").is_file());
        assert!(!dir.path().join("CustTable/init.xpp").exists());
    }

    #[test]
    fn test_element_without_methods_is_skipped_on_rerun() {
        let text = "***Element: EDT\n\n  EDT #CustAccount\n    PROPERTIES\n      Name #CustAccount\n    ENDPROPERTIES\n  ENDEDT\n";
        let dir = tempfile::tempdir().unwrap();
        let tree = WorkingTree::create(dir.path(), TreeLayout::default(), WINDOWS_1251).unwrap();

        let first = Extractor::new(&tree).run(text).unwrap();
        assert_eq!(first.parsed(), 1);
        assert_eq!(first.methods_written, 0);

        let second = Extractor::new(&tree).run(text).unwrap();
        assert_eq!(second.parsed(), 0);
        assert_eq!(second.skipped, ["CustAccount"]);
    }

    #[test]
    fn test_multi_method_job_warns() {
        let text = "***Element: JOB\n  SOURCE #first\n    #a\n  ENDSOURCE\n  SOURCE #second\n    #b\n  ENDSOURCE\n";
        let outcome = parse_elements(text);
        assert_eq!(outcome.elements[0].name, "first");
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::MultiMethodJob);
    }
}
