//! Closed set of element kinds found in an AOT export.
//!
//! Each kind carries its name keyword and method-region policy as data, so
//! the scanner and the patcher never branch on raw tag strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the method sub-blocks of an element live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRegion {
    /// Methods are wrapped in a `METHODS` ... `ENDMETHODS` region.
    /// The whole span is searched when the region is missing.
    Enclosed,
    /// Methods sit directly in the element span (jobs, macros).
    FreeStanding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Class,
    Table,
    Form,
    Job,
    Macro,
    Enum,
    EditType,
    Privilege,
    Map,
    Query,
}

impl ElementKind {
    pub const ALL: [ElementKind; 10] = [
        ElementKind::Class,
        ElementKind::Table,
        ElementKind::Form,
        ElementKind::Job,
        ElementKind::Macro,
        ElementKind::Enum,
        ElementKind::EditType,
        ElementKind::Privilege,
        ElementKind::Map,
        ElementKind::Query,
    ];

    /// Tag written after `***Element:` and into `Type:` metadata lines.
    pub fn tag(self) -> &'static str {
        match self {
            ElementKind::Class => "CLS",
            ElementKind::Table => "TAB",
            ElementKind::Form => "FRM",
            ElementKind::Job => "JOB",
            ElementKind::Macro => "MCR",
            ElementKind::Enum => "ENU",
            ElementKind::EditType => "EDT",
            ElementKind::Privilege => "SPV",
            ElementKind::Map => "MAP",
            ElementKind::Query => "QTY",
        }
    }

    /// Keyword that precedes `#<name>` in the element header.
    ///
    /// Jobs have no header of their own: the element takes the name of its
    /// first `SOURCE` block.
    pub fn name_keyword(self) -> &'static str {
        match self {
            ElementKind::Class => "CLASS",
            ElementKind::Table => "TABLE",
            ElementKind::Form => "FORM",
            ElementKind::Job => "SOURCE",
            ElementKind::Macro => "MACRO",
            ElementKind::Enum => "ENUM",
            ElementKind::EditType => "EDT",
            ElementKind::Privilege => "PRIVILEGE",
            ElementKind::Map => "MAP",
            ElementKind::Query => "QUERY",
        }
    }

    pub fn method_region(self) -> MethodRegion {
        match self {
            ElementKind::Job | ElementKind::Macro => MethodRegion::FreeStanding,
            _ => MethodRegion::Enclosed,
        }
    }

    /// True when the element name is borrowed from its first method.
    pub fn named_by_first_method(self) -> bool {
        matches!(self, ElementKind::Job)
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown element kind tag '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for ElementKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase();
        Self::from_tag(&tag).ok_or(UnknownKind(tag))
    }
}
