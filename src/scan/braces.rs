//! Brace matching that is not fooled by braces inside string literals.

use crate::scan::is_word_char;
use std::ops::Range;

/// Scanner state while walking source one character at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralState {
    Normal,
    /// Inside a literal opened by the given quote character.
    InString(char),
}

/// Find the first `{` at or after `from` and its matching `}`.
///
/// Quotes (`"` or `'`) toggle the string state unless preceded by a
/// backslash inside the literal; braces only count in [`LiteralState::Normal`].
/// The returned range covers both braces. Unbalanced input yields `None`.
pub fn braced_region(text: &str, from: usize) -> Option<Range<usize>> {
    let mut state = LiteralState::Normal;
    let mut depth = 0usize;
    let mut open = None;
    let mut escaped = false;

    for (idx, c) in text.get(from..)?.char_indices() {
        let pos = from + idx;
        match state {
            LiteralState::InString(quote) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    state = LiteralState::Normal;
                }
            }
            LiteralState::Normal => match c {
                '"' | '\'' => state = LiteralState::InString(c),
                '{' => {
                    if open.is_none() {
                        open = Some(pos);
                    }
                    depth += 1;
                }
                '}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        return open.map(|start| start..pos + 1);
                    }
                }
                _ => {}
            },
        }
    }

    None
}

/// Return the braced body of `class <name> ... { ... }` in decoded source.
pub fn class_body<'a>(text: &'a str, class_name: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(rel) = text[search..].find("class") {
        let at = search + rel;
        search = at + "class".len();

        let preceded_by_word = text[..at].chars().next_back().is_some_and(is_word_char);
        let rest = &text[search..];
        let after_ws = rest.trim_start();
        if preceded_by_word || after_ws.len() == rest.len() {
            continue;
        }
        let Some(tail) = after_ws.strip_prefix(class_name) else {
            continue;
        };
        if tail.chars().next().is_some_and(is_word_char) {
            continue;
        }
        let header_end = text.len() - tail.len();
        return braced_region(text, header_end).map(|range| &text[range]);
    }
    None
}
