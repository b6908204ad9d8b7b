//! Boundary scanning over the raw text of an AOT export.
//!
//! Every structural keyword in the format is line-anchored: it is the first
//! non-whitespace token of its physical line. Encoded method bodies prefix
//! every line with `#`, so keyword-looking text inside a body can never be
//! mistaken for a boundary. Scanning is pure and total; spans that cannot be
//! resolved are reported, never raised.

pub mod block;
pub mod braces;
pub mod element;

pub use block::{
    count_method_markers, find_method, find_region, method_blocks, parse_properties, MethodBlock,
    Region,
};
pub use braces::{braced_region, class_body, LiteralState};
pub use element::{method_scope, resolve_name, scan_elements, ElementSpan};

/// First line of every export.
pub const SIGNATURE: &str = "Exportfile for AOT";
/// Section delimiter that opens every top-level element.
pub const ELEMENT_MARKER: &str = "***Element:";
/// Tag of the closing pseudo-element.
pub const END_TAG: &str = "END";
pub const PROPERTIES: &str = "PROPERTIES";
pub const END_PROPERTIES: &str = "ENDPROPERTIES";
pub const METHODS: &str = "METHODS";
pub const END_METHODS: &str = "ENDMETHODS";
pub const SOURCE: &str = "SOURCE";
pub const END_SOURCE: &str = "ENDSOURCE";

/// One physical line of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Offset of the first byte of the line.
    pub start: usize,
    /// Offset just past the content, before any `\r\n` / `\n`.
    pub end: usize,
    /// Offset of the first byte of the next line.
    pub next: usize,
    /// Line content without its terminator.
    pub text: &'a str,
}

impl<'a> Line<'a> {
    /// Leading whitespace of the line.
    pub fn indent(&self) -> &'a str {
        let trimmed = self.text.trim_start();
        &self.text[..self.text.len() - trimmed.len()]
    }

    pub fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    pub fn is_crlf(&self) -> bool {
        self.next - self.end == 2
    }
}

/// Iterate over the physical lines of `text`, keeping byte offsets.
pub fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= text.len() {
            return None;
        }
        let start = pos;
        let (end, next) = match text[start..].find('\n') {
            Some(rel) => {
                let nl = start + rel;
                let end = if nl > start && text.as_bytes()[nl - 1] == b'\r' {
                    nl - 1
                } else {
                    nl
                };
                (end, nl + 1)
            }
            None => (text.len(), text.len()),
        };
        pos = next;
        Some(Line {
            start,
            end,
            next,
            text: &text[start..end],
        })
    })
}

/// Parse `<keyword> #<identifier>` at the start of an already trimmed line.
///
/// The identifier is matched as a whole word, so `CLASS #Foo` yields `Foo`
/// and never a prefix of a longer name.
pub fn keyword_value<'a>(trimmed: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = trimmed.strip_prefix(keyword)?;
    let after_ws = rest.trim_start();
    if after_ws.len() == rest.len() {
        return None;
    }
    let ident = after_ws.strip_prefix('#')?;
    let len = ident
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map(|(idx, _)| idx)
        .unwrap_or(ident.len());
    if len == 0 {
        None
    } else {
        Some(&ident[..len])
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
