use crate::kind::{ElementKind, MethodRegion};
use crate::scan::{
    find_region, is_word_char, keyword_value, lines, ELEMENT_MARKER, END_METHODS, METHODS,
};
use std::ops::Range;

/// Candidate top-level element located by its `***Element:` delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpan {
    /// Raw tag following the delimiter (`CLS`, `JOB`, `END`, ...).
    pub tag: String,
    /// Resolved kind, `None` for tags outside the supported set.
    pub kind: Option<ElementKind>,
    /// Offset of the delimiter line (inclusive).
    pub start: usize,
    /// Offset of the next delimiter line, or the buffer length (exclusive).
    pub end: usize,
}

impl ElementSpan {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn text<'a>(&self, buffer: &'a str) -> &'a str {
        &buffer[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition `buffer` into element spans.
///
/// Spans are contiguous: each span ends where the next one starts and the
/// last one ends at `buffer.len()`. Text before the first delimiter (the
/// signature header) belongs to no span.
pub fn scan_elements(buffer: &str) -> Vec<ElementSpan> {
    let mut starts: Vec<(usize, String)> = Vec::new();

    for line in lines(buffer) {
        let Some(rest) = line.text.strip_prefix(ELEMENT_MARKER) else {
            continue;
        };
        let rest = rest.trim_start();
        let tag_len = rest
            .char_indices()
            .find(|(_, c)| !is_word_char(*c))
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        starts.push((line.start, rest[..tag_len].to_string()));
    }

    let mut spans = Vec::with_capacity(starts.len());
    for (idx, (start, tag)) in starts.iter().enumerate() {
        let end = starts
            .get(idx + 1)
            .map(|(next, _)| *next)
            .unwrap_or(buffer.len());
        spans.push(ElementSpan {
            kind: ElementKind::from_tag(tag),
            tag: tag.clone(),
            start: *start,
            end,
        });
    }

    log::debug!("scanned {} element spans", spans.len());
    spans
}

/// Resolve the declared name of an element from its span text.
///
/// Returns `None` when the kind-specific header is missing; callers skip
/// such spans rather than failing the pass.
pub fn resolve_name(kind: ElementKind, span_text: &str) -> Option<String> {
    let keyword = kind.name_keyword();
    lines(span_text)
        .find_map(|line| keyword_value(line.trimmed(), keyword))
        .map(str::to_string)
}

/// Range of `span_text` that holds the element's method sub-blocks.
///
/// Enclosed kinds use the first `METHODS` ... `ENDMETHODS` region and fall
/// back to the whole span when it is absent; free-standing kinds always use
/// the whole span. Extraction and write-back share this so they always see
/// the same blocks.
pub fn method_scope(kind: ElementKind, span_text: &str) -> Range<usize> {
    match kind.method_region() {
        MethodRegion::Enclosed => find_region(span_text, METHODS, END_METHODS)
            .map(|region| region.content_start..region.content_end)
            .unwrap_or(0..span_text.len()),
        MethodRegion::FreeStanding => 0..span_text.len(),
    }
}
