use crate::scan::{keyword_value, lines, END_SOURCE, SOURCE};
use indexmap::IndexMap;
use std::ops::Range;

/// A keyword-delimited region such as `PROPERTIES` ... `ENDPROPERTIES`.
///
/// Offsets are relative to the text the region was searched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Start of the opening keyword line.
    pub start: usize,
    /// First byte after the opening keyword line.
    pub content_start: usize,
    /// Start of the closing keyword line.
    pub content_end: usize,
    /// First byte after the closing keyword line.
    pub end: usize,
}

impl Region {
    pub fn content<'a>(&self, text: &'a str) -> &'a str {
        &text[self.content_start..self.content_end]
    }
}

/// Find the first `begin` ... `end` keyword region in `text`.
///
/// Both keywords must stand alone on their lines. An opening keyword with no
/// closing one yields `None`.
pub fn find_region(text: &str, begin: &str, end: &str) -> Option<Region> {
    let mut iter = lines(text);
    let open = iter.find(|line| line.trimmed() == begin)?;
    let close = iter.find(|line| line.trimmed() == end)?;
    Some(Region {
        start: open.start,
        content_start: open.next,
        content_end: close.start,
        end: close.next,
    })
}

/// One `SOURCE #<name>` ... `ENDSOURCE` sub-block.
///
/// Offsets are relative to the text the block was scanned in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBlock {
    pub name: String,
    /// Start of the begin-marker line.
    pub start: usize,
    /// Just past the method name on the begin-marker line.
    pub name_end: usize,
    /// Start of the end-marker line.
    pub end_line_start: usize,
    /// Just past the `ENDSOURCE` keyword (line terminator excluded).
    pub end: usize,
    /// Whitespace before `SOURCE`.
    pub indent: String,
    /// Whitespace before `ENDSOURCE`.
    pub end_indent: String,
    /// Line terminator used on the begin-marker line.
    pub eol: &'static str,
}

impl MethodBlock {
    /// Whole block, from the begin-marker line to the end keyword.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Encoded body between the markers, as consumed by [`crate::codec::decode`].
    pub fn raw_body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.name_end..self.end_line_start]
    }

    pub fn shifted(mut self, offset: usize) -> Self {
        self.start += offset;
        self.name_end += offset;
        self.end_line_start += offset;
        self.end += offset;
        self
    }
}

fn is_end_marker(trimmed: &str) -> bool {
    trimmed
        .strip_prefix(END_SOURCE)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Collect every method sub-block of `text` in order of appearance.
///
/// A begin marker followed by another begin marker before any end marker is
/// unterminated: it is logged and dropped, and scanning resumes at the new
/// begin marker.
pub fn method_blocks(text: &str) -> Vec<MethodBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, usize, usize, String, &'static str)> = None;

    for line in lines(text) {
        let trimmed = line.trimmed();
        if let Some(name) = keyword_value(trimmed, SOURCE) {
            if let Some((previous, ..)) = open.take() {
                log::warn!("method block '{previous}' has no ENDSOURCE; skipping it");
            }
            let hash = line.text.find('#').unwrap_or(0);
            let name_end = line.start + hash + 1 + name.len();
            let eol = if line.is_crlf() { "\r\n" } else { "\n" };
            open = Some((
                name.to_string(),
                line.start,
                name_end,
                line.indent().to_string(),
                eol,
            ));
            continue;
        }

        if is_end_marker(trimmed) {
            match open.take() {
                Some((name, start, name_end, indent, eol)) => {
                    let end_indent = line.indent().to_string();
                    blocks.push(MethodBlock {
                        name,
                        start,
                        name_end,
                        end_line_start: line.start,
                        end: line.start + end_indent.len() + END_SOURCE.len(),
                        indent,
                        end_indent,
                        eol,
                    });
                }
                None => log::debug!("stray ENDSOURCE at offset {}", line.start),
            }
        }
    }

    if let Some((name, ..)) = open {
        log::warn!("method block '{name}' has no ENDSOURCE; skipping it");
    }

    blocks
}

/// Locate the first sub-block named exactly `name`.
pub fn find_method(text: &str, name: &str) -> Option<MethodBlock> {
    method_blocks(text).into_iter().find(|block| block.name == name)
}

/// Count line-anchored begin and end markers.
pub fn count_method_markers(text: &str) -> (usize, usize) {
    lines(text).fold((0, 0), |(begins, ends), line| {
        let trimmed = line.trimmed();
        if keyword_value(trimmed, SOURCE).is_some() {
            (begins + 1, ends)
        } else if is_end_marker(trimmed) {
            (begins, ends + 1)
        } else {
            (begins, ends)
        }
    })
}

/// Parse `Key   #Value` lines of a property block.
///
/// Values keep everything after the `#`; lines without a value marker are
/// ignored. The first occurrence of a key wins.
pub fn parse_properties(content: &str) -> IndexMap<String, String> {
    let mut properties = IndexMap::new();
    for line in lines(content) {
        let trimmed = line.trimmed();
        let Some((key, rest)) = trimmed.split_once(char::is_whitespace) else {
            continue;
        };
        let Some(value) = rest.trim_start().strip_prefix('#') else {
            continue;
        };
        properties
            .entry(key.to_string())
            .or_insert_with(|| value.trim_end().to_string());
    }
    properties
}
