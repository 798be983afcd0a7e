//! Stream key issuance, completion, and delivery.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use rh_core::{Error, VideoId};
use rh_db::pool::get_conn;
use rh_db::queries::{libraries, stream_tokens, videos};

use crate::context::AppContext;
use crate::delivery;
use crate::error::AppError;
use crate::middleware::auth::Caller;

/// POST /api/stream/{video_id}
///
/// Open a stream for the caller's device and return the stream key.
#[utoipa::path(
    post,
    path = "/api/stream/{video_id}",
    params(("video_id" = String, Path, description = "Video ID")),
    responses(
        (status = 200, description = "Stream key", body = String),
        (status = 400, description = "Invalid video ID or no device"),
        (status = 404, description = "Video not found")
    )
)]
pub async fn issue_stream(
    State(ctx): State<AppContext>,
    Extension(caller): Extension<Caller>,
    Path(video_id): Path<String>,
) -> Result<Json<String>, AppError> {
    let video_id: VideoId = video_id
        .parse()
        .map_err(|_| Error::Validation("Invalid video ID".into()))?;
    let device_id = caller
        .device_id
        .ok_or_else(|| Error::Validation("a device is required to stream".into()))?;

    let (token, path) = {
        let conn = get_conn(&ctx.db)?;
        let video = videos::get_video(&conn, video_id)?
            .ok_or_else(|| Error::not_found("video", video_id))?;
        let library = libraries::get_library(&conn, video.library_id)?
            .ok_or_else(|| Error::not_found("library", video.library_id))?;
        let token = stream_tokens::create_stream_token(&conn, caller.user_id, device_id, video_id)?;
        let path = ctx
            .config
            .media
            .library_root(&library.media_path)
            .join(&video.library_path);
        (token, path)
    };

    tracing::info!(
        video_id = %video_id,
        user_id = %caller.user_id,
        stream_token = %token.id,
        "Stream opened"
    );

    Ok(Json(ctx.tokens.issue(token.id, path)))
}

/// PUT /api/stream/{stream_key}
///
/// Mark a stream as ended. The key stops resolving immediately.
#[utoipa::path(
    put,
    path = "/api/stream/{stream_key}",
    params(("stream_key" = String, Path, description = "Stream key")),
    responses(
        (status = 204, description = "Stream ended"),
        (status = 400, description = "Malformed stream key"),
        (status = 404, description = "Stream not found")
    )
)]
pub async fn complete_stream(
    State(ctx): State<AppContext>,
    Extension(caller): Extension<Caller>,
    Path(stream_key): Path<String>,
) -> Result<StatusCode, AppError> {
    let token_id = ctx.tokens.token_id(&stream_key)?;

    {
        let conn = get_conn(&ctx.db)?;
        let token = stream_tokens::get_stream_token(&conn, token_id)?
            .filter(|t| t.user_id == caller.user_id)
            .ok_or_else(|| Error::not_found("stream", token_id))?;
        stream_tokens::mark_stream_ended(&conn, token.id, &Utc::now().to_rfc3339())?;
    }
    ctx.tokens.invalidate(token_id);

    tracing::info!(stream_token = %token_id, "Stream ended");
    Ok(StatusCode::NO_CONTENT)
}

/// GET|HEAD /stream/{stream_key}
///
/// Serve the file behind a stream key with conditional and range support.
#[utoipa::path(
    get,
    path = "/stream/{stream_key}",
    params(("stream_key" = String, Path, description = "Stream key")),
    responses(
        (status = 200, description = "Whole file"),
        (status = 206, description = "Requested byte range"),
        (status = 304, description = "Not modified"),
        (status = 400, description = "Malformed stream key"),
        (status = 404, description = "Unknown stream or missing file"),
        (status = 412, description = "Precondition failed"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn stream_video(
    State(ctx): State<AppContext>,
    Path(stream_key): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = ctx
        .tokens
        .resolve(&stream_key)?
        .ok_or_else(|| Error::not_found("stream", &stream_key))?;

    let response = delivery::serve_file(&method, &headers, &path).await?;
    Ok(response.into_response())
}
