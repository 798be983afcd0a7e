//! Conditional request evaluation (If-Match, If-None-Match,
//! If-Modified-Since, If-Unmodified-Since).
//!
//! Each header yields a [`PreconditionState`]; the overall outcome is the
//! maximum under the order
//! `Unspecified < NotModified < ShouldProcess < PreconditionFailed`.

use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::header::{self, HeaderMap, HeaderName};

/// 100-ns ticks between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_OFFSET: i128 = 116_444_736_000_000_000;

// ---------------------------------------------------------------------------
// PreconditionState
// ---------------------------------------------------------------------------

/// Outcome of evaluating one (or all) conditional headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreconditionState {
    Unspecified,
    NotModified,
    ShouldProcess,
    PreconditionFailed,
}

impl PreconditionState {
    fn rank(self) -> u8 {
        match self {
            PreconditionState::Unspecified => 0,
            PreconditionState::NotModified => 1,
            PreconditionState::ShouldProcess => 2,
            PreconditionState::PreconditionFailed => 3,
        }
    }

    /// Max-reduce a set of per-header states. An empty set is `Unspecified`.
    pub fn combine(states: impl IntoIterator<Item = PreconditionState>) -> PreconditionState {
        states
            .into_iter()
            .max()
            .unwrap_or(PreconditionState::Unspecified)
    }
}

impl Ord for PreconditionState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for PreconditionState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// EntityTag
// ---------------------------------------------------------------------------

/// An HTTP entity tag such as `"abc"` or `W/"abc"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTag {
    pub weak: bool,
    pub tag: String,
}

impl EntityTag {
    pub fn strong(tag: impl Into<String>) -> Self {
        Self {
            weak: false,
            tag: tag.into(),
        }
    }

    /// Parse a single quoted entity tag. Returns `None` if malformed.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (weak, rest) = match s.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let inner = rest.strip_prefix('"')?.strip_suffix('"')?;
        if inner.contains('"') {
            return None;
        }
        Some(Self {
            weak,
            tag: inner.to_string(),
        })
    }

    /// Strong comparison: both tags strong and byte-identical.
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.tag == other.tag
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.tag)
        } else {
            write!(f, "\"{}\"", self.tag)
        }
    }
}

/// One member of an If-Match / If-None-Match list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagListItem {
    Any,
    Tag(EntityTag),
}

/// Split a comma-separated tag list, ignoring commas inside quotes.
fn split_tag_list(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// Collect every list item across all values of `name`. Malformed members
/// are skipped.
fn tag_list(headers: &HeaderMap, name: &HeaderName) -> Vec<TagListItem> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(split_tag_list)
        .filter_map(|item| {
            let item = item.trim();
            if item == "*" {
                Some(TagListItem::Any)
            } else {
                EntityTag::parse(item).map(TagListItem::Tag)
            }
        })
        .collect()
}

fn http_date(headers: &HeaderMap, name: &HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| httpdate::parse_http_date(s.trim()).ok())
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Validators describing the current state of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    pub etag: EntityTag,
    /// Last write time, truncated to whole seconds.
    pub last_modified: SystemTime,
}

impl Validators {
    /// Derive validators from a file's last write time and size.
    pub fn new(modified: SystemTime, len: u64) -> Self {
        Self {
            etag: compute_etag(modified, len),
            last_modified: truncate_to_secs(modified),
        }
    }

    pub fn last_modified_header(&self) -> String {
        httpdate::fmt_http_date(self.last_modified)
    }
}

/// Strong ETag: hex of (write time in 100-ns ticks since 1601) XOR size.
pub fn compute_etag(modified: SystemTime, len: u64) -> EntityTag {
    let nanos: i128 = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    };
    let ticks = (nanos / 100 + FILETIME_UNIX_OFFSET) as u64;
    EntityTag::strong(format!("{:x}", ticks ^ len))
}

/// Drop sub-second precision; HTTP dates carry whole seconds only.
pub fn truncate_to_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

// ---------------------------------------------------------------------------
// Per-header rules
// ---------------------------------------------------------------------------

pub fn eval_if_match(items: &[TagListItem], etag: &EntityTag) -> PreconditionState {
    if items.is_empty() {
        return PreconditionState::Unspecified;
    }
    let matched = items.iter().any(|item| match item {
        TagListItem::Any => true,
        TagListItem::Tag(t) => t.strong_eq(etag),
    });
    if matched {
        PreconditionState::ShouldProcess
    } else {
        PreconditionState::PreconditionFailed
    }
}

pub fn eval_if_none_match(items: &[TagListItem], etag: &EntityTag) -> PreconditionState {
    if items.is_empty() {
        return PreconditionState::Unspecified;
    }
    let matched = items.iter().any(|item| match item {
        TagListItem::Any => true,
        TagListItem::Tag(t) => t.strong_eq(etag),
    });
    if matched {
        PreconditionState::NotModified
    } else {
        PreconditionState::ShouldProcess
    }
}

pub fn eval_if_modified_since(
    since: Option<SystemTime>,
    last_modified: SystemTime,
    now: SystemTime,
) -> PreconditionState {
    match since {
        Some(date) if date <= now => {
            if last_modified > date {
                PreconditionState::ShouldProcess
            } else {
                PreconditionState::NotModified
            }
        }
        _ => PreconditionState::Unspecified,
    }
}

pub fn eval_if_unmodified_since(
    since: Option<SystemTime>,
    last_modified: SystemTime,
    now: SystemTime,
) -> PreconditionState {
    match since {
        Some(date) if date <= now => {
            if last_modified <= date {
                PreconditionState::ShouldProcess
            } else {
                PreconditionState::PreconditionFailed
            }
        }
        _ => PreconditionState::Unspecified,
    }
}

/// Conditional headers extracted from a request.
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub if_match: Vec<TagListItem>,
    pub if_none_match: Vec<TagListItem>,
    pub if_modified_since: Option<SystemTime>,
    pub if_unmodified_since: Option<SystemTime>,
}

impl Preconditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_match: tag_list(headers, &header::IF_MATCH),
            if_none_match: tag_list(headers, &header::IF_NONE_MATCH),
            if_modified_since: http_date(headers, &header::IF_MODIFIED_SINCE),
            if_unmodified_since: http_date(headers, &header::IF_UNMODIFIED_SINCE),
        }
    }

    /// Evaluate every header against `validators` and combine the results.
    pub fn evaluate(&self, validators: &Validators, now: SystemTime) -> PreconditionState {
        PreconditionState::combine([
            eval_if_match(&self.if_match, &validators.etag),
            eval_if_none_match(&self.if_none_match, &validators.etag),
            eval_if_modified_since(self.if_modified_since, validators.last_modified, now),
            eval_if_unmodified_since(self.if_unmodified_since, validators.last_modified, now),
        ])
    }
}
