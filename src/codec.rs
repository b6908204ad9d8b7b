//! Line-prefix codec for method bodies.
//!
//! Inside a `SOURCE` block every physical line of the body is written as
//! `<indent>#<line>`. [`decode`] strips that prefix and [`encode`] puts it
//! back, so `decode(&encode(body, indent, eol)) == body` for any body without
//! carriage returns.

use crate::scan::{END_SOURCE, SOURCE};

/// Line-structural marker that prefixes every encoded body line.
pub const LINE_MARKER: char = '#';

/// Default indentation used in front of [`LINE_MARKER`].
pub const DEFAULT_INDENT: &str = "    ";

/// Decode the raw text between a begin marker's name and its end-marker line.
///
/// The raw text opens with the remainder of the begin-marker line and closes
/// with the terminator of the last body line, so one leading and one trailing
/// blank line are structural and dropped before any marker is stripped.
/// Each remaining line loses one leading marker (and the whitespace before
/// it). Never fails.
pub fn decode(raw: &str) -> String {
    let mut lines: Vec<&str> = raw
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    if lines.first().is_some_and(|line| line.trim().is_empty()) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    lines
        .into_iter()
        .map(strip_marker)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_marker(line: &str) -> &str {
    line.trim_start()
        .strip_prefix(LINE_MARKER)
        .unwrap_or(line)
}

/// Encode a clean body into the raw form read back by [`decode`].
///
/// The result starts with `eol` (closing the begin-marker line) and ends with
/// `eol` (closing the last body line). Every body line, empty ones included,
/// becomes `indent` + marker + line.
pub fn encode(body: &str, indent: &str, eol: &str) -> String {
    let mut out = String::with_capacity(body.len() + 16);
    out.push_str(eol);
    for line in body.split('\n') {
        out.push_str(indent);
        out.push(LINE_MARKER);
        out.push_str(line);
        out.push_str(eol);
    }
    out
}

/// Layout of a sub-block captured from existing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout<'a> {
    /// Whitespace before the begin marker.
    pub indent: &'a str,
    /// Whitespace before the end marker.
    pub end_indent: &'a str,
    /// Indentation in front of each encoded body line.
    pub body_indent: &'a str,
    pub eol: &'a str,
}

/// Render a complete sub-block, from the begin marker through `ENDSOURCE`.
///
/// The trailing line terminator after `ENDSOURCE` is not included, matching
/// [`crate::scan::MethodBlock::range`].
pub fn encode_block(name: &str, body: &str, layout: BlockLayout<'_>) -> String {
    format!(
        "{indent}{SOURCE} {marker}{name}{encoded}{end_indent}{END_SOURCE}",
        indent = layout.indent,
        marker = LINE_MARKER,
        encoded = encode(body, layout.body_indent, layout.eol),
        end_indent = layout.end_indent,
    )
}

/// Normalize text read from a working-tree file before encoding it.
///
/// Drops a UTF-8 byte order mark and converts CRLF to LF.
pub fn normalize_body(text: &str) -> String {
    text.strip_prefix('\u{feff}')
        .unwrap_or(text)
        .replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_strips_one_marker() {
        let raw = "\n    #return 1;\n    ##define\n    #\n";
        assert_eq!(decode(raw), "return 1;\n#define\n");
    }

    #[test]
    fn test_decode_keeps_indentation_after_marker() {
        let raw = "\n        #{\n        #    x = 1;\n        #}\n      ";
        assert_eq!(decode(raw), "{\n    x = 1;\n}");
    }

    #[test]
    fn test_decode_crlf() {
        let raw = "\r\n    #a\r\n    #b\r\n";
        assert_eq!(decode(raw), "a\nb");
    }

    #[test]
    fn test_decode_empty_block() {
        assert_eq!(decode("\n"), "");
        assert_eq!(decode(""), "");
    }

    #[test]
    fn test_decode_line_without_marker_is_kept() {
        assert_eq!(decode("\n    plain\n"), "    plain");
    }

    #[test]
    fn test_encode_scenario() {
        assert_eq!(encode("return 1;", "    ", "\n"), "\n    #return 1;\n");
        assert_eq!(encode("a\n\nb", "  ", "\r\n"), "\r\n  #a\r\n  #\r\n  #b\r\n");
    }

    #[test]
    fn test_encode_block_layout() {
        let layout = BlockLayout {
            indent: "      ",
            end_indent: "      ",
            body_indent: "        ",
            eol: "\n",
        };
        assert_eq!(
            encode_block("bar", "return 1;", layout),
            "      SOURCE #bar\n        #return 1;\n      ENDSOURCE"
        );
    }

    #[test]
    fn test_repeated_round_trips_do_not_compound_markers() {
        let body = "void run()\n{\n    #localMacro\n}";
        let mut current = body.to_string();
        for _ in 0..3 {
            current = decode(&encode(&current, DEFAULT_INDENT, "\n"));
        }
        assert_eq!(current, body);
    }

    #[test]
    fn test_normalize_body() {
        assert_eq!(normalize_body("\u{feff}a\r\nb\r\n"), "a\nb\n");
    }

    proptest! {
        #[test]
        fn prop_round_trip(body in "[ -~\\t\\n]{0,200}", crlf in any::<bool>()) {
            let eol = if crlf { "\r\n" } else { "\n" };
            prop_assert_eq!(decode(&encode(&body, DEFAULT_INDENT, eol)), body);
        }
    }
}
