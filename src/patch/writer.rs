//! Write path: working-tree edits back into the export.
//!
//! A pass runs through four phases, each with one input and one output:
//!
//! - **Scanning**: original buffer to the list of named element spans.
//! - **Matching**: spans plus working tree to verified splices, one per
//!   edited method.
//! - **Splicing**: splices applied to a copy of the buffer, highest offset
//!   first.
//! - **Validating**: edited buffer to a clean or degraded status.
//!
//! Failures below the pass level (an element that is gone, a method that was
//! renamed upstream, an unreadable file) become [`Diagnostic`]s and the pass
//! continues.

use crate::codec::{encode_block, normalize_body, BlockLayout, DEFAULT_INDENT};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::kind::ElementKind;
use crate::patch::PatchError;
use crate::patch::splice::{apply_descending, Splice, SpliceError, SpliceResult};
use crate::patch::validate::check_structure;
use crate::scan::{find_method, method_scope, resolve_name, scan_elements};
use crate::tree::{TreeError, TreeRecord, WorkingTree};
use filetime::FileTime;
use std::fmt;
use std::ops::Range;

/// Minimum similarity for an element-not-found suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Phase of a write-back pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPhase {
    Idle,
    Scanning,
    Matching,
    Splicing,
    Validating,
    Done,
}

impl fmt::Display for PatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchPhase::Idle => "idle",
            PatchPhase::Scanning => "scanning",
            PatchPhase::Matching => "matching",
            PatchPhase::Splicing => "splicing",
            PatchPhase::Validating => "validating",
            PatchPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Element located in the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedElement {
    pub kind: ElementKind,
    pub name: String,
    pub range: Range<usize>,
}

/// One edited method, ready to be spliced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSplice {
    pub element: String,
    pub method: String,
    pub splice: Splice,
}

/// A method that changed the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedMethod {
    pub element: String,
    pub method: String,
    /// Offset of the replaced block in the original buffer.
    pub offset: usize,
    /// Change in buffer length caused by this method.
    pub delta: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Clean,
    /// The structural check failed; the output was still produced.
    WithWarnings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBackOutcome {
    /// No edited method could be spliced, either because no method file was
    /// newer than the reference time or because none could be located.
    /// Nothing to write.
    NoChanges { diagnostics: Vec<Diagnostic> },
    Written(WrittenBuffer),
}

impl WriteBackOutcome {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            WriteBackOutcome::NoChanges { diagnostics } => diagnostics,
            WriteBackOutcome::Written(written) => &written.diagnostics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenBuffer {
    pub buffer: String,
    /// Methods applied, in application order (highest offset first).
    pub updated: Vec<UpdatedMethod>,
    /// Edit candidates whose block already held the new text.
    pub unchanged: Vec<(String, String)>,
    pub status: WriteStatus,
    pub diagnostics: Vec<Diagnostic>,
}

/// Output of the matching phase.
#[derive(Debug, Default)]
struct Matched {
    splices: Vec<MethodSplice>,
    candidates: usize,
}

/// Write-back pass over one working tree.
pub struct Patcher<'a> {
    tree: &'a WorkingTree,
    body_indent: String,
    phase: PatchPhase,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Patcher<'a> {
    pub fn new(tree: &'a WorkingTree) -> Self {
        Self {
            tree,
            body_indent: DEFAULT_INDENT.to_string(),
            phase: PatchPhase::Idle,
            diagnostics: Vec::new(),
        }
    }

    /// Indentation placed before the marker of every re-encoded body line.
    pub fn body_indent(mut self, indent: impl Into<String>) -> Self {
        self.body_indent = indent.into();
        self
    }

    pub fn phase(&self) -> PatchPhase {
        self.phase
    }

    fn enter(&mut self, phase: PatchPhase) {
        log::debug!("write-back: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic.emit());
    }

    /// Splice every method file newer than `reference` into a copy of
    /// `original`.
    ///
    /// Only a splice that fails verification against the original buffer
    /// aborts the pass, since that means the located ranges are wrong.
    pub fn write_back(
        mut self,
        original: &str,
        reference: FileTime,
    ) -> Result<WriteBackOutcome, PatchError> {
        self.enter(PatchPhase::Scanning);
        let located = locate_elements(original);

        self.enter(PatchPhase::Matching);
        let matched = self.match_edits(original, &located, reference)?;
        if matched.splices.is_empty() {
            self.enter(PatchPhase::Done);
            if matched.candidates == 0 {
                log::info!("no method files newer than the reference time");
            } else {
                log::info!("none of {} edited methods could be located", matched.candidates);
            }
            return Ok(WriteBackOutcome::NoChanges {
                diagnostics: self.diagnostics,
            });
        }

        self.enter(PatchPhase::Splicing);
        let mut buffer = original.to_string();
        let (updated, unchanged) = splice_all(&mut buffer, matched.splices)?;

        self.enter(PatchPhase::Validating);
        let issues = check_structure(&buffer);
        let status = if issues.is_empty() {
            WriteStatus::Clean
        } else {
            for issue in issues {
                self.record(Diagnostic::new(
                    DiagnosticKind::StructuralWarning,
                    issue.to_string(),
                ));
            }
            WriteStatus::WithWarnings
        };

        self.enter(PatchPhase::Done);
        log::info!(
            "write-back: {} methods updated, {} unchanged",
            updated.len(),
            unchanged.len()
        );
        Ok(WriteBackOutcome::Written(WrittenBuffer {
            buffer,
            updated,
            unchanged,
            status,
            diagnostics: self.diagnostics,
        }))
    }

    fn match_edits(
        &mut self,
        original: &str,
        located: &[LocatedElement],
        reference: FileTime,
    ) -> Result<Matched, PatchError> {
        let mut matched = Matched::default();

        for record in self.tree.records()? {
            let metadata = match self.tree.read_metadata(&record) {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.record(
                        Diagnostic::new(DiagnosticKind::InvalidRecord, err.to_string())
                            .element(&record.name),
                    );
                    continue;
                }
            };

            let candidates = self.edit_candidates(&record, reference)?;
            if candidates.is_empty() {
                continue;
            }
            matched.candidates += candidates.len();

            let Some(element) = located
                .iter()
                .find(|e| e.kind == metadata.kind && e.name == record.name)
            else {
                let message = match suggest(&record.name, metadata.kind, located) {
                    Some(close) => format!(
                        "no {} named '{}' in the source (did you mean '{close}'?)",
                        metadata.kind, record.name
                    ),
                    None => format!("no {} named '{}' in the source", metadata.kind, record.name),
                };
                self.record(
                    Diagnostic::new(DiagnosticKind::ElementNotFound, message)
                        .element(&record.name),
                );
                continue;
            };

            let span_text = &original[element.range.clone()];
            let scope = method_scope(element.kind, span_text);
            let scoped = &span_text[scope.clone()];
            let base = element.range.start + scope.start;

            for (method, body) in candidates {
                let Some(block) = find_method(scoped, &method) else {
                    self.record(
                        Diagnostic::new(
                            DiagnosticKind::MethodNotFound,
                            "no SOURCE block with this name in the element",
                        )
                        .element(&element.name)
                        .method(&method),
                    );
                    continue;
                };
                let block = block.shifted(base);
                let layout = BlockLayout {
                    indent: &block.indent,
                    end_indent: &block.end_indent,
                    body_indent: &self.body_indent,
                    eol: block.eol,
                };
                let new_text = encode_block(&method, &body, layout);
                let splice = Splice::new(block.range(), new_text, &original[block.range()]);
                matched.splices.push(MethodSplice {
                    element: element.name.clone(),
                    method,
                    splice,
                });
            }
        }

        Ok(matched)
    }

    /// Method files of `record` modified after `reference`, with their bodies.
    fn edit_candidates(
        &mut self,
        record: &TreeRecord,
        reference: FileTime,
    ) -> Result<Vec<(String, String)>, TreeError> {
        let mut candidates = Vec::new();
        for file in self.tree.edited_methods(record, reference)? {
            match self.tree.read_method(&file) {
                Ok(body) => candidates.push((file.method, normalize_body(&body))),
                Err(err) => self.record(
                    Diagnostic::new(DiagnosticKind::UnreadableMethod, err.to_string())
                        .element(&record.name)
                        .method(&file.method),
                ),
            }
        }
        Ok(candidates)
    }
}

/// Scanning phase: every supported span with a resolvable name.
pub fn locate_elements(buffer: &str) -> Vec<LocatedElement> {
    scan_elements(buffer)
        .into_iter()
        .filter_map(|span| {
            let kind = span.kind?;
            let name = resolve_name(kind, span.text(buffer))?;
            Some(LocatedElement {
                kind,
                name,
                range: span.range(),
            })
        })
        .collect()
}

/// Splicing phase.
fn splice_all(
    buffer: &mut String,
    splices: Vec<MethodSplice>,
) -> Result<(Vec<UpdatedMethod>, Vec<(String, String)>), SpliceError> {
    let mut by_start: Vec<(usize, String, String)> = splices
        .iter()
        .map(|s| (s.splice.start, s.element.clone(), s.method.clone()))
        .collect();
    by_start.sort_by(|a, b| b.0.cmp(&a.0));

    let results = apply_descending(buffer, splices.into_iter().map(|s| s.splice).collect())?;

    let mut updated = Vec::new();
    let mut unchanged = Vec::new();
    for (result, (offset, element, method)) in results.into_iter().zip(by_start) {
        match result {
            SpliceResult::Applied { delta, .. } => updated.push(UpdatedMethod {
                element,
                method,
                offset,
                delta,
            }),
            SpliceResult::AlreadyApplied { .. } => unchanged.push((element, method)),
        }
    }
    Ok((updated, unchanged))
}

fn suggest<'l>(name: &str, kind: ElementKind, located: &'l [LocatedElement]) -> Option<&'l str> {
    located
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| (strsim::jaro_winkler(name, &e.name), e.name.as_str()))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, name)| name)
}
