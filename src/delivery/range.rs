use crate::core::error::DeliveryError;

// ---------------------------------------------------------------------------
// Range header parsing
// ---------------------------------------------------------------------------

/// A single byte-range request as written by the client, not yet checked
/// against the size of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=<start>-` or `bytes=<start>-<end>`.
    FromTo { start: u64, end: Option<u64> },
    /// `bytes=-<len>`: the last `len` bytes of the file.
    Suffix { len: u64 },
}

/// An inclusive byte range that has been validated against a file size.
///
/// Only `RangeSpec::resolve` builds one, so `start <= end < size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
    size: u64,
}

impl ByteRange {
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered, `end - start + 1`.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false: a resolved range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Parse a `Range` header value like `bytes=0-1048575`.
///
/// Only a single range in the `bytes` unit is accepted. Syntax errors are
/// reported as `InvalidRange`; whether the range fits the file is decided
/// later by [`RangeSpec::resolve`].
pub fn parse_range_header(value: &str) -> Result<RangeSpec, DeliveryError> {
    let value = value.trim();
    let set = match value.split_once('=') {
        Some((unit, set)) if unit.trim().eq_ignore_ascii_case("bytes") => set.trim(),
        _ => return Err(invalid("expected 'bytes=<start>-<end>'")),
    };

    if set.contains(',') {
        return Err(invalid("multiple ranges are not supported"));
    }

    let (start, end) = set
        .split_once('-')
        .ok_or_else(|| invalid("missing '-' between range bounds"))?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => Err(invalid("range has neither start nor end")),
        (true, false) => Ok(RangeSpec::Suffix {
            len: parse_bound(end)?,
        }),
        (false, true) => Ok(RangeSpec::FromTo {
            start: parse_bound(start)?,
            end: None,
        }),
        (false, false) => Ok(RangeSpec::FromTo {
            start: parse_bound(start)?,
            end: Some(parse_bound(end)?),
        }),
    }
}

impl RangeSpec {
    /// Check the range against the file size and produce the bytes to serve.
    ///
    /// An omitted end means "to the last byte". Out-of-bounds ranges are
    /// rejected, never clamped: `start > end`, `start >= size` and
    /// `end >= size` all fail with `RangeNotSatisfiable`, as does any range
    /// on an empty file.
    pub fn resolve(self, size: u64) -> Result<ByteRange, DeliveryError> {
        let unsatisfiable = DeliveryError::RangeNotSatisfiable { size };
        if size == 0 {
            return Err(unsatisfiable);
        }
        let last = size - 1;

        let (start, end) = match self {
            RangeSpec::FromTo { start, end } => (start, end.unwrap_or(last)),
            RangeSpec::Suffix { len: 0 } => return Err(unsatisfiable),
            RangeSpec::Suffix { len } => (size.saturating_sub(len), last),
        };

        if start > end || start >= size || end >= size {
            return Err(unsatisfiable);
        }

        Ok(ByteRange { start, end, size })
    }
}

fn parse_bound(s: &str) -> Result<u64, DeliveryError> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(&format!("'{}' is not a byte offset", s)));
    }
    s.parse()
        .map_err(|_| invalid(&format!("byte offset '{}' is out of range", s)))
}

fn invalid(reason: &str) -> DeliveryError {
    DeliveryError::InvalidRange {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(header: &str, size: u64) -> Result<ByteRange, DeliveryError> {
        parse_range_header(header)?.resolve(size)
    }

    fn assert_unsatisfiable(header: &str, size: u64) {
        match resolve(header, size) {
            Err(DeliveryError::RangeNotSatisfiable { size: s }) => assert_eq!(s, size),
            other => panic!("expected 416 for {header:?} on {size} bytes, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_closed_range() {
        assert_eq!(
            parse_range_header("bytes=0-1048575").unwrap(),
            RangeSpec::FromTo {
                start: 0,
                end: Some(1048575)
            }
        );
    }

    #[test]
    fn test_parse_open_and_suffix_ranges() {
        assert_eq!(
            parse_range_header("bytes=100-").unwrap(),
            RangeSpec::FromTo {
                start: 100,
                end: None
            }
        );
        assert_eq!(
            parse_range_header("bytes=-500").unwrap(),
            RangeSpec::Suffix { len: 500 }
        );
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_unit_case() {
        assert_eq!(
            parse_range_header("  Bytes = 5 - 9 ").unwrap(),
            RangeSpec::FromTo {
                start: 5,
                end: Some(9)
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for header in [
            "",
            "0-10",
            "items=0-10",
            "bytes=",
            "bytes=-",
            "bytes=10",
            "bytes=a-b",
            "bytes=+1-5",
            "bytes=1--5",
            "bytes=0-99999999999999999999999",
        ] {
            assert!(
                matches!(
                    parse_range_header(header),
                    Err(DeliveryError::InvalidRange { .. })
                ),
                "expected invalid range for {header:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_multiple_ranges() {
        assert!(matches!(
            parse_range_header("bytes=0-1,5-9"),
            Err(DeliveryError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_resolve_closed_range() {
        let range = resolve("bytes=10-19", 100).unwrap();
        assert_eq!(range.start(), 10);
        assert_eq!(range.end(), 19);
        assert_eq!(range.len(), 10);
        assert!(!range.is_empty());
        assert_eq!(range.content_range(), "bytes 10-19/100");
    }

    #[test]
    fn test_explicit_zero_end_is_one_byte() {
        let range = resolve("bytes=0-0", 100).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range.content_range(), "bytes 0-0/100");
    }

    #[test]
    fn test_open_range_runs_to_last_byte() {
        let range = resolve("bytes=100-", 1000).unwrap();
        assert_eq!(range.start(), 100);
        assert_eq!(range.end(), 999);
        assert_eq!(range.len(), 900);
    }

    #[test]
    fn test_whole_file_and_last_byte() {
        assert_eq!(resolve("bytes=0-99", 100).unwrap().len(), 100);
        let last = resolve("bytes=99-99", 100).unwrap();
        assert_eq!(last.content_range(), "bytes 99-99/100");
    }

    #[test]
    fn test_suffix_range() {
        let range = resolve("bytes=-10", 100).unwrap();
        assert_eq!(range.content_range(), "bytes 90-99/100");

        let whole = resolve("bytes=-500", 100).unwrap();
        assert_eq!(whole.content_range(), "bytes 0-99/100");
    }

    #[test]
    fn test_unsatisfiable_ranges() {
        assert_unsatisfiable("bytes=20-10", 100);
        assert_unsatisfiable("bytes=100-", 100);
        assert_unsatisfiable("bytes=100-150", 100);
        assert_unsatisfiable("bytes=50-100", 100);
        assert_unsatisfiable("bytes=-0", 100);
        assert_unsatisfiable("bytes=0-0", 0);
        assert_unsatisfiable("bytes=0-", 0);
        assert_unsatisfiable("bytes=-5", 0);
    }
}
