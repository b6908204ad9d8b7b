use crate::kind::ElementKind;
use crate::scan::class_body;
use indexmap::IndexMap;
use serde::Serialize;
use std::ops::Range;

/// Name of the method holding a class header and member declarations.
pub const CLASS_DECLARATION: &str = "classDeclaration";

/// One parsed top-level element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub kind: ElementKind,
    pub name: String,
    /// Half-open range of the element in the decoded source buffer.
    pub byte_range: Range<usize>,
    /// Property block entries in order of appearance.
    pub properties: IndexMap<String, String>,
    /// Decoded method bodies in order of appearance.
    pub methods: IndexMap<String, String>,
}

impl Element {
    pub fn new(kind: ElementKind, name: impl Into<String>, byte_range: Range<usize>) -> Self {
        Self {
            kind,
            name: name.into(),
            byte_range,
            properties: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }

    /// Parent element from the `Extends` property.
    pub fn extends(&self) -> Option<&str> {
        self.properties.get("Extends").map(String::as_str)
    }

    pub fn method(&self, name: &str) -> Option<&str> {
        self.methods.get(name).map(String::as_str)
    }

    /// Braced body of the class declaration, if this is a class with one.
    pub fn declaration_body(&self) -> Option<&str> {
        if self.kind != ElementKind::Class {
            return None;
        }
        class_body(self.method(CLASS_DECLARATION)?, &self.name)
    }
}
