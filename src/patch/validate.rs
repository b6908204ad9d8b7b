//! Structural check of a written export.
//!
//! This is not a parser: it only confirms that the output still looks like
//! an export that the import side will accept. A failed check never rolls
//! back the write, it downgrades the outcome to "written with warnings".

use crate::scan::{count_method_markers, lines, ELEMENT_MARKER, END_TAG, SIGNATURE};
use thiserror::Error;

/// One structural defect of an export buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureIssue {
    #[error("missing 'Exportfile for AOT' signature")]
    MissingSignature,

    #[error("missing '***Element: END' terminator")]
    MissingTerminator,

    #[error("{begins} SOURCE markers but {ends} ENDSOURCE markers")]
    UnbalancedMethods { begins: usize, ends: usize },
}

/// Check `buffer` and return every defect found.
pub fn check_structure(buffer: &str) -> Vec<StructureIssue> {
    let mut issues = Vec::new();

    if !buffer.trim_start_matches('\u{feff}').starts_with(SIGNATURE) {
        issues.push(StructureIssue::MissingSignature);
    }

    let terminated = lines(buffer).any(|line| {
        line.text
            .strip_prefix(ELEMENT_MARKER)
            .is_some_and(|rest| rest.trim() == END_TAG)
    });
    if !terminated {
        issues.push(StructureIssue::MissingTerminator);
    }

    let (begins, ends) = count_method_markers(buffer);
    if begins != ends {
        issues.push(StructureIssue::UnbalancedMethods { begins, ends });
    }

    issues
}
