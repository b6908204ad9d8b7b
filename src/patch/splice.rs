use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Spans longer than this are verified by hash instead of by text.
const HASH_THRESHOLD: usize = 1024;

/// The one mutation the patcher performs: replace a byte range of a buffer.
///
/// Every write-back compiles down to a list of splices over the original
/// buffer. Finding the right range is the caller's job; applying it is not.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Splice does nothing until applied"]
pub struct Splice {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    pub new_text: String,
    /// What the range must currently hold
    pub expected_before: SpliceVerification,
}

/// How the current text of a range is checked before it is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceVerification {
    ExactMatch(String),
    /// xxh3 of the expected text
    Hash(u64),
}

impl SpliceVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            SpliceVerification::ExactMatch(expected) => text == expected,
            SpliceVerification::Hash(expected) => xxh3_64(text.as_bytes()) == *expected,
        }
    }

    /// Exact text for short spans, hash for long ones.
    pub fn from_text(text: &str) -> Self {
        if text.len() > HASH_THRESHOLD {
            SpliceVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            SpliceVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum SpliceError {
    #[error("before-text verification failed at [{start}, {end})")]
    BeforeTextMismatch {
        start: usize,
        end: usize,
        found: String,
    },

    #[error("invalid byte range [{start}, {end}) in buffer of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("range [{start}, {end}) does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },

    #[error("splices overlap: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceResult {
    /// Replaced; `delta` is the change in buffer length.
    Applied { start: usize, delta: isize },
    /// The range already held the new text.
    AlreadyApplied { start: usize },
}

impl Splice {
    /// Splice whose verification is derived from the text it replaces.
    pub fn new(range: Range<usize>, new_text: impl Into<String>, before: &str) -> Self {
        Self {
            start: range.start,
            end: range.end,
            new_text: new_text.into(),
            expected_before: SpliceVerification::from_text(before),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Length change this splice causes when applied.
    pub fn delta(&self) -> isize {
        self.new_text.len() as isize - (self.end - self.start) as isize
    }

    fn validate<'a>(&self, buffer: &'a str) -> Result<&'a str, SpliceError> {
        if self.start > self.end || self.end > buffer.len() {
            return Err(SpliceError::InvalidRange {
                start: self.start,
                end: self.end,
                len: buffer.len(),
            });
        }
        if !buffer.is_char_boundary(self.start) || !buffer.is_char_boundary(self.end) {
            return Err(SpliceError::NotCharBoundary {
                start: self.start,
                end: self.end,
            });
        }

        let current = &buffer[self.start..self.end];
        if current == self.new_text {
            return Ok(current);
        }
        if !self.expected_before.matches(current) {
            return Err(SpliceError::BeforeTextMismatch {
                start: self.start,
                end: self.end,
                found: current.to_string(),
            });
        }
        Ok(current)
    }
}

/// Apply `splices` to `buffer` in a single pass.
///
/// Every splice is validated against the unmodified buffer before anything
/// changes, so a failure leaves `buffer` untouched. Application runs from the
/// highest offset down, which keeps all lower offsets valid.
pub fn apply_descending(
    buffer: &mut String,
    mut splices: Vec<Splice>,
) -> Result<Vec<SpliceResult>, SpliceError> {
    if splices.is_empty() {
        return Ok(Vec::new());
    }

    splices.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    for splice in &splices {
        splice.validate(buffer)?;
    }

    // Sorted descending: the earlier splice must end before the later starts.
    for window in splices.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.end > later.start {
            return Err(SpliceError::Overlap {
                first_start: earlier.start,
                first_end: earlier.end,
                second_start: later.start,
                second_end: later.end,
            });
        }
    }

    let mut results = Vec::with_capacity(splices.len());
    for splice in &splices {
        if buffer[splice.range()] == splice.new_text {
            results.push(SpliceResult::AlreadyApplied {
                start: splice.start,
            });
            continue;
        }
        buffer.replace_range(splice.range(), &splice.new_text);
        results.push(SpliceResult::Applied {
            start: splice.start,
            delta: splice.delta(),
        });
    }

    Ok(results)
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
///
/// Either the whole content lands at `path` or the previous file stays.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), SpliceError> {
    let io_err = |source| SpliceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|err| io_err(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_verification_exact_and_hash() {
        let exact = SpliceVerification::from_text("hello");
        assert!(matches!(exact, SpliceVerification::ExactMatch(_)));
        assert!(exact.matches("hello"));
        assert!(!exact.matches("hell"));

        let long = "x".repeat(2000);
        let hashed = SpliceVerification::from_text(&long);
        assert!(matches!(hashed, SpliceVerification::Hash(_)));
        assert!(hashed.matches(&long));
        assert!(!hashed.matches("x"));
    }

    #[test]
    fn test_apply_descending_keeps_offsets_valid() {
        let mut buffer = "line1\nline2\nline3\n".to_string();
        let splices = vec![
            Splice::new(0..5, "FIRST LINE", "line1"),
            Splice::new(12..17, "3", "line3"),
            Splice::new(6..11, "", "line2"),
        ];
        let results = apply_descending(&mut buffer, splices).unwrap();
        assert_eq!(buffer, "FIRST LINE\n\n3\n");
        assert_eq!(
            results,
            [
                SpliceResult::Applied { start: 12, delta: -4 },
                SpliceResult::Applied { start: 6, delta: -5 },
                SpliceResult::Applied { start: 0, delta: 5 },
            ]
        );
    }

    #[test]
    fn test_idempotent_splice() {
        let mut buffer = "hello world".to_string();
        let results =
            apply_descending(&mut buffer, vec![Splice::new(0..5, "hello", "other")]).unwrap();
        assert_eq!(results, [SpliceResult::AlreadyApplied { start: 0 }]);
        assert_eq!(buffer, "hello world");
    }

    #[test]
    fn test_mismatch_leaves_buffer_untouched() {
        let mut buffer = "hello world".to_string();
        let splices = vec![
            Splice::new(6..11, "there", "world"),
            Splice::new(0..5, "HELLO", "howdy"),
        ];
        let err = apply_descending(&mut buffer, splices).unwrap_err();
        assert!(matches!(err, SpliceError::BeforeTextMismatch { start: 0, .. }));
        assert_eq!(buffer, "hello world");
    }

    #[test]
    fn test_invalid_ranges() {
        let mut buffer = "hello".to_string();
        let err = apply_descending(&mut buffer, vec![Splice::new(3..9, "x", "")]).unwrap_err();
        assert!(matches!(err, SpliceError::InvalidRange { .. }));

        let mut buffer = "héllo".to_string();
        let err = apply_descending(&mut buffer, vec![Splice::new(0..2, "x", "h")]).unwrap_err();
        assert!(matches!(err, SpliceError::NotCharBoundary { .. }));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut buffer = "abcdefgh".to_string();
        let splices = vec![
            Splice::new(0..4, "x", "abcd"),
            Splice::new(2..6, "y", "cdef"),
        ];
        let err = apply_descending(&mut buffer, splices).unwrap_err();
        assert!(matches!(err, SpliceError::Overlap { .. }));
        assert_eq!(buffer, "abcdefgh");
    }

    #[test]
    fn test_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xpo");
        fs::write(&path, b"old").unwrap();
        atomic_write(&path, b"new content").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new content");
    }
}
