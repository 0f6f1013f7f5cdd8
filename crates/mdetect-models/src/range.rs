//! HTTP byte-range parsing for media delivery.

use std::fmt;

use thiserror::Error;

/// Errors from parsing a `Range` header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The header is not a single `bytes=start-end` range.
    #[error("Malformed range header: {0}")]
    Malformed(String),

    /// The range does not overlap the resource.
    #[error("Range not satisfiable for resource of {size} bytes")]
    Unsatisfiable { size: u64 },
}

/// A resolved, inclusive byte range within a resource of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ByteRange {
    /// Parse a `Range` header value against a resource of `size` bytes.
    ///
    /// Accepts `bytes=start-end` where either bound may be omitted. A missing
    /// start means 0. A missing end, or one past the resource, resolves to
    /// `size - 1`.
    pub fn parse(header: &str, size: u64) -> Result<Self, RangeError> {
        let malformed = || RangeError::Malformed(header.to_string());

        let (unit, spec) = header.trim().split_once('=').ok_or_else(malformed)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return Err(malformed());
        }

        let spec = spec.trim();
        if spec.contains(',') {
            return Err(malformed());
        }

        let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
        let start = match start.trim() {
            "" => 0,
            s => s.parse::<u64>().map_err(|_| malformed())?,
        };
        let end = match end.trim() {
            "" => None,
            s => Some(s.parse::<u64>().map_err(|_| malformed())?),
        };

        if size == 0 {
            return Err(RangeError::Unsatisfiable { size });
        }

        let last = size - 1;
        let end = end.map_or(last, |e| e.min(last));

        if start > end {
            return Err(RangeError::Unsatisfiable { size });
        }

        Ok(Self { start, end, size })
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.size)
    }
}
