//! `Range` header parsing and `If-Range` evaluation.
//!
//! Only a single `bytes` range is honoured. Multiple ranges, multiple
//! headers, or a foreign unit make the request a plain full-body request.

use axum::http::header::{self, HeaderMap};

use crate::conditional::{EntityTag, Validators};

/// An inclusive byte span within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered (`end - start + 1`).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a resource of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Result of range parsing.
///
/// `is_range_request && range.is_none()` means the range is unsatisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeRequest {
    pub is_range_request: bool,
    pub range: Option<ByteRange>,
}

impl RangeRequest {
    const NONE: RangeRequest = RangeRequest {
        is_range_request: false,
        range: None,
    };

    const UNSATISFIABLE: RangeRequest = RangeRequest {
        is_range_request: true,
        range: None,
    };
}

/// A parsed but not yet normalised range spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSpec {
    /// `start-` or `start-end`.
    From { start: u64, end: Option<u64> },
    /// `-n`: the last `n` bytes.
    Suffix(u64),
}

fn parse_spec(spec: &str) -> Option<RangeSpec> {
    let (start, end) = spec.trim().split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return end.parse().ok().map(RangeSpec::Suffix);
    }

    let start: u64 = start.parse().ok()?;
    let end: Option<u64> = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    if matches!(end, Some(e) if e < start) {
        return None;
    }
    Some(RangeSpec::From { start, end })
}

fn normalize(spec: RangeSpec, length: u64) -> Option<ByteRange> {
    match spec {
        RangeSpec::From { start, end } => {
            if start >= length {
                return None;
            }
            let end = match end {
                Some(e) if e < length => e,
                _ => length - 1,
            };
            Some(ByteRange { start, end })
        }
        RangeSpec::Suffix(0) => None,
        RangeSpec::Suffix(n) => {
            let bytes = n.min(length);
            let start = length - bytes;
            Some(ByteRange {
                start,
                end: start + bytes - 1,
            })
        }
    }
}

/// Parse the raw `Range` header values for a resource of `length` bytes.
pub fn parse_range(values: &[&str], length: u64) -> RangeRequest {
    let [value] = values else {
        // None, or more than one header.
        return RangeRequest::NONE;
    };
    if value.contains(',') {
        return RangeRequest::NONE;
    }
    let Some((unit, spec)) = value.split_once('=') else {
        return RangeRequest::NONE;
    };
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return RangeRequest::NONE;
    }

    let Some(spec) = parse_spec(spec) else {
        return RangeRequest::UNSATISFIABLE;
    };
    if length == 0 {
        return RangeRequest::UNSATISFIABLE;
    }

    RangeRequest {
        is_range_request: true,
        range: normalize(spec, length),
    }
}

/// Collect `Range` values from `headers` and parse them.
pub fn range_from_headers(headers: &HeaderMap, length: u64) -> RangeRequest {
    let values: Vec<&str> = headers
        .get_all(header::RANGE)
        .iter()
        .map(|v| v.to_str().unwrap_or(""))
        .collect();
    parse_range(&values, length)
}

/// Whether an `If-Range` validator lets the `Range` header apply.
///
/// Absent → yes. An entity tag must match strongly. A date must not be
/// older than the resource's last modification. Anything else → no.
pub fn if_range_permits(headers: &HeaderMap, validators: &Validators) -> bool {
    let Some(value) = headers.get(header::IF_RANGE) else {
        return true;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    let value = value.trim();

    if value.starts_with('"') || value.starts_with("W/") {
        return EntityTag::parse(value).is_some_and(|tag| tag.strong_eq(&validators.etag));
    }

    match httpdate::parse_http_date(value) {
        Ok(date) => date >= validators.last_modified,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::{Duration, UNIX_EPOCH};

    fn range(start: u64, end: u64) -> RangeRequest {
        RangeRequest {
            is_range_request: true,
            range: Some(ByteRange { start, end }),
        }
    }

    #[test]
    fn first_hundred_bytes() {
        assert_eq!(parse_range(&["bytes=0-99"], 1000), range(0, 99));
    }

    #[test]
    fn open_ended() {
        assert_eq!(parse_range(&["bytes=500-"], 1000), range(500, 999));
    }

    #[test]
    fn suffix() {
        assert_eq!(parse_range(&["bytes=-100"], 1000), range(900, 999));
        assert_eq!(parse_range(&["bytes=-5000"], 1000), range(0, 999));
    }

    #[test]
    fn start_past_end_is_unsatisfiable() {
        assert_eq!(parse_range(&["bytes=1000-"], 1000), RangeRequest::UNSATISFIABLE);
        assert_eq!(parse_range(&["bytes=-0"], 1000), RangeRequest::UNSATISFIABLE);
    }

    #[test]
    fn end_is_clamped() {
        assert_eq!(parse_range(&["bytes=10-5000"], 1000), range(10, 999));
    }

    #[test]
    fn no_header_is_not_a_range() {
        assert_eq!(parse_range(&[], 1000), RangeRequest::NONE);
    }

    #[test]
    fn multi_range_is_declined() {
        assert_eq!(parse_range(&["bytes=0-1,5-6"], 1000), RangeRequest::NONE);
        assert_eq!(parse_range(&["bytes=0-1", "bytes=5-6"], 1000), RangeRequest::NONE);
    }

    #[test]
    fn other_units_are_ignored() {
        assert_eq!(parse_range(&["items=0-5"], 1000), RangeRequest::NONE);
        assert_eq!(parse_range(&["garbage"], 1000), RangeRequest::NONE);
    }

    #[test]
    fn unparseable_bytes_spec_is_unsatisfiable() {
        assert_eq!(parse_range(&["bytes=abc"], 1000), RangeRequest::UNSATISFIABLE);
        assert_eq!(parse_range(&["bytes=9-3"], 1000), RangeRequest::UNSATISFIABLE);
        assert_eq!(parse_range(&["bytes=-"], 1000), RangeRequest::UNSATISFIABLE);
    }

    #[test]
    fn zero_length_resource_is_unsatisfiable() {
        assert_eq!(parse_range(&["bytes=0-0"], 0), RangeRequest::UNSATISFIABLE);
    }

    #[test]
    fn unit_is_case_insensitive() {
        assert_eq!(parse_range(&["Bytes=0-0"], 10), range(0, 0));
    }

    #[test]
    fn byte_range_helpers() {
        let r = ByteRange { start: 0, end: 99 };
        assert_eq!(r.len(), 100);
        assert_eq!(r.content_range(1000), "bytes 0-99/1000");
    }

    fn validators() -> Validators {
        Validators {
            etag: EntityTag::strong("abc"),
            last_modified: UNIX_EPOCH + Duration::from_secs(1_000_000),
        }
    }

    #[test]
    fn if_range_absent_permits() {
        assert!(if_range_permits(&HeaderMap::new(), &validators()));
    }

    #[test]
    fn if_range_etag() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_RANGE, HeaderValue::from_static("\"abc\""));
        assert!(if_range_permits(&headers, &validators()));

        headers.insert(header::IF_RANGE, HeaderValue::from_static("\"other\""));
        assert!(!if_range_permits(&headers, &validators()));

        headers.insert(header::IF_RANGE, HeaderValue::from_static("W/\"abc\""));
        assert!(!if_range_permits(&headers, &validators()));
    }

    #[test]
    fn if_range_date() {
        let v = validators();
        let mut headers = HeaderMap::new();

        let same = httpdate::fmt_http_date(v.last_modified);
        headers.insert(header::IF_RANGE, HeaderValue::from_str(&same).unwrap());
        assert!(if_range_permits(&headers, &v));

        let older = httpdate::fmt_http_date(v.last_modified - Duration::from_secs(60));
        headers.insert(header::IF_RANGE, HeaderValue::from_str(&older).unwrap());
        assert!(!if_range_permits(&headers, &v));
    }

    #[test]
    fn if_range_garbage_ignores_range() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_RANGE, HeaderValue::from_static("not a validator"));
        assert!(!if_range_permits(&headers, &validators()));
    }
}
