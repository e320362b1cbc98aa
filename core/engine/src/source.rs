//! Source identifiers and positions.
//!
//! A [`SourceId`] names a compilation unit (usually a file path) and a
//! [`Position`] is a 1-based `(line, column)` pair inside it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A line/column position in a source unit, ordered line-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Identifier of a source unit.
///
/// Comparison ignores ASCII case in the filesystem root (`C:\`, `\\server\share\`)
/// and is exact everywhere else, so the same file reported with different
/// drive-letter casing still resolves to one unit.
#[derive(Debug, Clone)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a source id from a path or name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split_root(&self) -> (&str, &str) {
        let len = root_len(&self.0);
        self.0.split_at(len)
    }
}

/// Length of the filesystem-root prefix of `path`.
fn root_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    let is_sep = |b: u8| b == b'/' || b == b'\\';

    // Drive letter: `C:` optionally followed by a separator.
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return if bytes.len() > 2 && is_sep(bytes[2]) { 3 } else { 2 };
    }

    // UNC: `\\server\share\`.
    if bytes.len() >= 2 && is_sep(bytes[0]) && is_sep(bytes[1]) {
        let mut separators = 0;
        for (i, &b) in bytes.iter().enumerate().skip(2) {
            if is_sep(b) {
                separators += 1;
                if separators == 2 {
                    return i + 1;
                }
            }
        }
        return bytes.len();
    }

    usize::from(bytes.first().copied().is_some_and(is_sep))
}

impl PartialEq for SourceId {
    fn eq(&self, other: &Self) -> bool {
        let (root, rest) = self.split_root();
        let (other_root, other_rest) = other.split_root();
        root.eq_ignore_ascii_case(other_root) && rest == other_rest
    }
}

impl Eq for SourceId {}

impl Hash for SourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (root, rest) = self.split_root();
        for b in root.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        rest.hash(state);
    }
}

impl PartialOrd for SourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (root, rest) = self.split_root();
        let (other_root, other_rest) = other.split_root();
        root.bytes()
            .map(|b| b.to_ascii_lowercase())
            .cmp(other_root.bytes().map(|b| b.to_ascii_lowercase()))
            .then_with(|| rest.cmp(other_rest))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A position inside a specific source unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// The unit the position belongs to.
    pub source_id: SourceId,
    /// The position inside the unit.
    pub position: Position,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub const fn new(source_id: SourceId, position: Position) -> Self {
        Self {
            source_id,
            position,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.position)
    }
}
