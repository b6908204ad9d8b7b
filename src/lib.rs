//! XPO Patcher: round-trip editing of Dynamics AX AOT export files
//!
//! Extracts the methods of every element in an `.xpo` export into a
//! file-per-method working tree, and writes methods edited there back into a
//! copy of the export without touching anything else.
//!
//! # Architecture
//!
//! - [`scan`] finds element spans and method blocks. It is pure and total.
//! - [`codec`] strips and re-applies the `#` line prefix of method bodies.
//! - [`extract`] turns an export into [`Element`]s and persists them through
//!   [`WorkingTree`].
//! - [`patch`] compiles edited methods into [`Splice`]s over the original
//!   buffer and applies them from the highest offset down.
//!
//! # Safety
//!
//! - Every splice verifies the text it replaces
//! - Output is written atomically (tempfile + fsync + rename) next to the input
//! - The input's encoding is detected on read and reused on write
//! - Unchanged method files are never candidates for write-back
//!
//! # Example
//!
//! ```no_run
//! use xpo_patcher::{write_back_file, Extractor, WorkingTree, WriteOptions};
//! use xpo_patcher::tree::TreeLayout;
//! use std::path::Path;
//!
//! let options = WriteOptions::default();
//! let tree = WorkingTree::create("parserXPO", TreeLayout::default(), options.fallback)?;
//! let input = Path::new("export.xpo");
//!
//! Extractor::new(&tree).run_file(input, options.fallback)?;
//! // ... edit parserXPO/<Element>/<method>.xpp ...
//! let report = write_back_file(input, &tree, &options)?;
//! println!("wrote {}", report.output.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod config;
pub mod diagnostic;
pub mod encoding;
pub mod extract;
pub mod index;
pub mod kind;
pub mod model;
pub mod patch;
pub mod scan;
pub mod session;
pub mod tree;

// Re-exports
pub use codec::{decode, encode};
pub use config::{load_from_path, load_from_str, load_or_default, Config, ConfigError};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use encoding::{EncodingError, SourceEncoding};
pub use extract::{parse_elements, ExtractError, ExtractReport, Extractor};
pub use index::{IndexError, IndexRecord, IndexStore, JsonIndex, SearchHit};
pub use kind::ElementKind;
pub use model::Element;
pub use patch::{
    write_back_file, FileWriteReport, PatchError, Patcher, Splice, SpliceError,
    WriteBackOutcome, WriteOptions, WriteStatus,
};
pub use session::{Session, SessionError};
pub use tree::{TreeError, WorkingTree};
