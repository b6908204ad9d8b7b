//! Write-back of edited methods into an export file.
//!
//! [`Patcher`] works on buffers; [`write_back_file`] wraps it with the file
//! concerns: decoding the input, deriving the sibling output path and writing
//! it atomically in the input's own encoding.

pub mod splice;
pub mod validate;
pub mod writer;

pub use splice::{
    apply_descending, atomic_write, Splice, SpliceError, SpliceResult, SpliceVerification,
};
pub use validate::{check_structure, StructureIssue};
pub use writer::{
    locate_elements, LocatedElement, PatchPhase, Patcher, UpdatedMethod, WriteBackOutcome,
    WriteStatus, WrittenBuffer,
};

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::encoding::{encode_text, read_source, EncodingError, SourceEncoding};
use crate::tree::{TreeError, WorkingTree};
use encoding_rs::Encoding;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix appended to the input's file stem when naming the output.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_WR";

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("source export unavailable: {0}")]
    Source(#[from] EncodingError),

    #[error("cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working tree unavailable: {0}")]
    Tree(#[from] TreeError),

    #[error("stale edit, the source changed under the located block: {0}")]
    Splice(#[from] SpliceError),

    #[error("cannot write output: {0}")]
    Write(#[source] SpliceError),

    #[error("output path {0} would overwrite the input")]
    OutputIsInput(PathBuf),
}

/// Options for [`write_back_file`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub body_indent: String,
    pub output_suffix: String,
    pub fallback: &'static Encoding,
    /// Explicit output path instead of the derived sibling.
    pub output: Option<PathBuf>,
    /// Reference time instead of the input's modification time.
    pub reference: Option<FileTime>,
    /// Compute the result without writing the output file.
    pub dry_run: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            body_indent: crate::codec::DEFAULT_INDENT.to_string(),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            fallback: crate::encoding::default_fallback(),
            output: None,
            reference: None,
            dry_run: false,
        }
    }
}

/// Result of a file-level write-back.
#[derive(Debug)]
pub struct FileWriteReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub encoding: SourceEncoding,
    /// Decoded input, kept for diffing.
    pub original: String,
    pub outcome: WriteBackOutcome,
    /// True when the output file was actually written.
    pub written: bool,
}

impl FileWriteReport {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.outcome.diagnostics()
    }

    /// True when the run needs attention: warnings or isolated failures.
    pub fn has_problems(&self) -> bool {
        match &self.outcome {
            WriteBackOutcome::NoChanges { diagnostics } => !diagnostics.is_empty(),
            WriteBackOutcome::Written(written) => {
                written.status == WriteStatus::WithWarnings || !written.diagnostics.is_empty()
            }
        }
    }
}

/// `<dir>/<stem><suffix>.xpo` next to `input`.
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "xpo".to_string());
    input.with_file_name(format!("{stem}{suffix}.{ext}"))
}

/// Write edited methods from `tree` back into a copy of `input`.
///
/// Missing input is fatal. With nothing newer than the reference time no
/// file is written.
pub fn write_back_file(
    input: &Path,
    tree: &WorkingTree,
    options: &WriteOptions,
) -> Result<FileWriteReport, PatchError> {
    let source = read_source(input, options.fallback)?;
    let reference = match options.reference {
        Some(reference) => reference,
        None => {
            let meta = fs::metadata(input).map_err(|source| PatchError::Stat {
                path: input.to_path_buf(),
                source,
            })?;
            FileTime::from_last_modification_time(&meta)
        }
    };

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| output_path(input, &options.output_suffix));
    if same_file(input, &output) {
        return Err(PatchError::OutputIsInput(output));
    }

    let mut outcome = Patcher::new(tree)
        .body_indent(options.body_indent.as_str())
        .write_back(&source.text, reference)?;

    let mut written = false;
    if let WriteBackOutcome::Written(result) = &mut outcome {
        let encoded = encode_text(&result.buffer, source.encoding);
        if encoded.lossy {
            result.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::LossyEncoding,
                    format!(
                        "some characters cannot be written as {}; they were replaced",
                        source.encoding
                    ),
                )
                .emit(),
            );
        }
        if options.dry_run {
            log::info!("dry run: {} not written", output.display());
        } else {
            atomic_write(&output, &encoded.bytes).map_err(PatchError::Write)?;
            written = true;
            log::info!("wrote {}", output.display());
        }
    }

    Ok(FileWriteReport {
        input: input.to_path_buf(),
        output,
        encoding: source.encoding,
        original: source.text,
        outcome,
        written,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
