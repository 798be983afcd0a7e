//! File delivery with conditional and range support.
//!
//! Order within a request is fixed: read metadata once, evaluate
//! preconditions, evaluate the range, then transfer bytes. The body is a
//! `ReaderStream` over a file handle it owns, so the handle is released
//! whenever the stream is dropped, including on client disconnect.

use std::path::Path;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use rh_core::{guess_content_type, Error, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::conditional::{PreconditionState, Preconditions, Validators};
use crate::range::{if_range_permits, range_from_headers, ByteRange};

/// Read buffer size for streamed bodies.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Metadata captured once per request.
#[derive(Debug, Clone)]
struct FileInfo {
    len: u64,
    validators: Validators,
    content_type: &'static str,
}

async fn file_info(path: &Path) -> Result<FileInfo> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(Error::not_found("file", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found("file", path.display()))
        }
        Err(e) => return Err(e.into()),
    };
    let modified = metadata.modified()?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    Ok(FileInfo {
        len: metadata.len(),
        validators: Validators::new(modified, metadata.len()),
        content_type: guess_content_type(file_name),
    })
}

fn validator_headers(info: &FileInfo) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&info.validators.last_modified_header()) {
        headers.insert(header::LAST_MODIFIED, v);
    }
    if let Ok(v) = HeaderValue::from_str(&info.validators.etag.to_string()) {
        headers.insert(header::ETAG, v);
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers
}

fn entity_headers(info: &FileInfo, content_length: u64) -> HeaderMap {
    let mut headers = validator_headers(info);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(info.content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers
}

async fn open_at(path: &Path, start: u64) -> Result<tokio::fs::File> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found("file", path.display())
        } else {
            e.into()
        }
    })?;
    if start > 0 {
        file.seek(std::io::SeekFrom::Start(start)).await?;
    }
    Ok(file)
}

/// Body streaming exactly `span` bytes of `path`.
async fn span_body(path: &Path, span: ByteRange) -> Result<Body> {
    let file = open_at(path, span.start).await?;
    let stream = ReaderStream::with_capacity(file.take(span.len()), CHUNK_SIZE);
    Ok(Body::from_stream(stream))
}

/// Build the response for `method` on the file at `path`.
///
/// Missing files surface as [`Error::NotFound`]; every protocol outcome
/// (304, 412, 416) is a regular response.
pub async fn serve_file(method: &Method, headers: &HeaderMap, path: &Path) -> Result<Response> {
    serve_file_at(method, headers, path, SystemTime::now()).await
}

pub async fn serve_file_at(
    method: &Method,
    headers: &HeaderMap,
    path: &Path,
    now: SystemTime,
) -> Result<Response> {
    let info = file_info(path).await?;

    let state = Preconditions::from_headers(headers).evaluate(&info.validators, now);
    match state {
        PreconditionState::NotModified => {
            return Ok((StatusCode::NOT_MODIFIED, validator_headers(&info)).into_response());
        }
        PreconditionState::PreconditionFailed => {
            return Ok(StatusCode::PRECONDITION_FAILED.into_response());
        }
        PreconditionState::Unspecified | PreconditionState::ShouldProcess => {}
    }

    if method == Method::HEAD {
        return Ok((StatusCode::OK, entity_headers(&info, info.len), Body::empty()).into_response());
    }

    let mut range = range_from_headers(headers, info.len);
    if range.is_range_request && !if_range_permits(headers, &info.validators) {
        range.is_range_request = false;
    }

    match (range.is_range_request, range.range) {
        (true, Some(span)) => {
            let mut out = entity_headers(&info, span.len());
            if let Ok(v) = HeaderValue::from_str(&span.content_range(info.len)) {
                out.insert(header::CONTENT_RANGE, v);
            }
            let body = span_body(path, span).await?;
            Ok((StatusCode::PARTIAL_CONTENT, out, body).into_response())
        }
        (true, None) => {
            let mut out = HeaderMap::new();
            if let Ok(v) = HeaderValue::from_str(&format!("bytes */{}", info.len)) {
                out.insert(header::CONTENT_RANGE, v);
            }
            Ok((StatusCode::RANGE_NOT_SATISFIABLE, out).into_response())
        }
        (false, _) => {
            let file = open_at(path, 0).await?;
            let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
            Ok((StatusCode::OK, entity_headers(&info, info.len), body).into_response())
        }
    }
}
