use crate::encoding::{default_fallback, resolve_label};
use crate::patch::{WriteOptions, DEFAULT_OUTPUT_SUFFIX};
use crate::tree::TreeLayout;
use encoding_rs::Encoding;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub tree: TreeSection,
    #[serde(default)]
    pub write: WriteSection,
    #[serde(default)]
    pub encoding: EncodingSection,
    #[serde(default)]
    pub index: IndexSection,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.tree.dir.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "tree",
                field: "dir",
            });
        }
        check_file_name(&mut issues, "tree", "method_ext", &self.tree.method_ext, true);
        check_file_name(
            &mut issues,
            "tree",
            "metadata_file",
            &self.tree.metadata_file,
            false,
        );

        if self.write.indent.chars().any(|c| c != ' ' && c != '\t') {
            issues.push(ValidationIssue::InvalidValue {
                section: "write",
                field: "indent",
                message: "must contain only spaces and tabs".to_string(),
            });
        }
        if self.write.output_suffix.is_empty() {
            issues.push(ValidationIssue::InvalidValue {
                section: "write",
                field: "output_suffix",
                message: "an empty suffix would overwrite the input".to_string(),
            });
        } else {
            check_file_name(
                &mut issues,
                "write",
                "output_suffix",
                &self.write.output_suffix,
                false,
            );
        }

        if resolve_label(&self.encoding.fallback).is_err() {
            issues.push(ValidationIssue::UnknownEncoding(self.encoding.fallback.clone()));
        }

        if self.index.path.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "index",
                field: "path",
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn tree_layout(&self) -> TreeLayout {
        TreeLayout {
            method_ext: self.tree.method_ext.clone(),
            metadata_file: self.tree.metadata_file.clone(),
        }
    }

    /// Fallback encoding, or the built-in default for an unknown label.
    pub fn fallback_encoding(&self) -> &'static Encoding {
        resolve_label(&self.encoding.fallback).unwrap_or_else(|_| default_fallback())
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            body_indent: self.write.indent.clone(),
            output_suffix: self.write.output_suffix.clone(),
            fallback: self.fallback_encoding(),
            ..WriteOptions::default()
        }
    }
}

fn check_file_name(
    issues: &mut Vec<ValidationIssue>,
    section: &'static str,
    field: &'static str,
    value: &str,
    is_extension: bool,
) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::MissingField { section, field });
        return;
    }
    if value.contains(['/', '\\']) || (is_extension && value.contains('.')) {
        issues.push(ValidationIssue::InvalidValue {
            section,
            field,
            message: format!("'{value}' must be a plain file name component"),
        });
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TreeSection {
    #[serde(default = "default_tree_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_method_ext")]
    pub method_ext: String,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            dir: default_tree_dir(),
            method_ext: default_method_ext(),
            metadata_file: default_metadata_file(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WriteSection {
    /// Indentation before the marker of each re-encoded body line.
    #[serde(default = "default_indent")]
    pub indent: String,
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

impl Default for WriteSection {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            output_suffix: default_output_suffix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct EncodingSection {
    /// WHATWG label of the single-byte code page tried after UTF-8.
    #[serde(default = "default_fallback_label")]
    pub fallback: String,
}

impl Default for EncodingSection {
    fn default() -> Self {
        Self {
            fallback: default_fallback_label(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct IndexSection {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_tree_dir() -> PathBuf {
    PathBuf::from("parserXPO")
}

fn default_method_ext() -> String {
    TreeLayout::default().method_ext
}

fn default_metadata_file() -> String {
    TreeLayout::default().metadata_file
}

fn default_indent() -> String {
    crate::codec::DEFAULT_INDENT.to_string()
}

fn default_output_suffix() -> String {
    DEFAULT_OUTPUT_SUFFIX.to_string()
}

fn default_fallback_label() -> String {
    default_fallback().name().to_string()
}

fn default_index_path() -> PathBuf {
    PathBuf::from("xpo_index.json")
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    InvalidValue {
        section: &'static str,
        field: &'static str,
        message: String,
    },
    UnknownEncoding(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { section, field } => {
                write!(f, "[{section}] missing required field '{field}'")
            }
            ValidationIssue::InvalidValue {
                section,
                field,
                message,
            } => write!(f, "[{section}] invalid '{field}': {message}"),
            ValidationIssue::UnknownEncoding(label) => {
                write!(f, "[encoding] unknown fallback encoding '{label}'")
            }
        }
    }
}
