//! Isolated failures collected during batch passes.
//!
//! Nothing recorded here aborts a pass: each entry names the element (and
//! method, when relevant) that was skipped or degraded and why.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A top-level span whose name could not be resolved.
    UnparseableSpan,
    /// A job holding more than one method; the first one names the element.
    MultiMethodJob,
    /// An element whose name is already taken in the tree by another kind.
    NameCollision,
    /// A working-tree directory without usable metadata.
    InvalidRecord,
    /// A working-tree element missing from the source export.
    ElementNotFound,
    /// An edited method missing from its element's current text.
    MethodNotFound,
    /// A method file that could not be read.
    UnreadableMethod,
    /// The post-write structural check failed.
    StructuralWarning,
    /// Characters that the output encoding cannot represent.
    LossyEncoding,
}

impl DiagnosticKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticKind::UnparseableSpan => "unparseable span",
            DiagnosticKind::MultiMethodJob => "multi-method job",
            DiagnosticKind::NameCollision => "name collision",
            DiagnosticKind::InvalidRecord => "invalid record",
            DiagnosticKind::ElementNotFound => "element not found",
            DiagnosticKind::MethodNotFound => "method not found",
            DiagnosticKind::UnreadableMethod => "unreadable method",
            DiagnosticKind::StructuralWarning => "structure",
            DiagnosticKind::LossyEncoding => "encoding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub element: Option<String>,
    pub method: Option<String>,
    /// Human-readable reason
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            element: None,
            method: None,
            message: message.into(),
        }
    }

    pub fn element(mut self, name: impl Into<String>) -> Self {
        self.element = Some(name.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.method = Some(name.into());
        self
    }

    /// Log through the `log` facade at warn level.
    pub(crate) fn emit(self) -> Self {
        log::warn!("{self}");
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind.label())?;
        match (&self.element, &self.method) {
            (Some(element), Some(method)) => write!(f, " {element}.{method}:")?,
            (Some(element), None) => write!(f, " {element}:")?,
            (None, Some(method)) => write!(f, " {method}:")?,
            (None, None) => {}
        }
        write!(f, " {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let diag = Diagnostic::new(DiagnosticKind::MethodNotFound, "no SOURCE block")
            .element("Foo")
            .method("bar");
        assert_eq!(diag.to_string(), "[method not found] Foo.bar: no SOURCE block");

        let diag = Diagnostic::new(DiagnosticKind::StructuralWarning, "1 SOURCE vs 0 ENDSOURCE");
        assert_eq!(diag.to_string(), "[structure] 1 SOURCE vs 0 ENDSOURCE");
    }
}
