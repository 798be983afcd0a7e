//! Library management and browsing route handlers.

use std::path::Component;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rh_core::{DirId, Error, LibraryId};
use rh_db::models::{Dir, Library, Video};
use rh_db::pool::get_conn;
use rh_db::queries::{dirs, libraries, videos};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::indexer::IndexMode;

/// Request body for creating a library.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateLibraryRequest {
    pub name: String,
    /// Directory relative to the media root.
    pub media_path: String,
}

/// Request body for renaming a library.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RenameLibraryRequest {
    pub name: String,
}

/// Library response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LibraryResponse {
    pub id: String,
    pub name: String,
    pub media_path: String,
    pub indexing: bool,
    pub last_index_started: Option<String>,
    pub last_index_completed: Option<String>,
    pub created_at: String,
}

impl LibraryResponse {
    fn from_model(lib: &Library) -> Self {
        Self {
            id: lib.id.to_string(),
            name: lib.name.clone(),
            media_path: lib.media_path.clone(),
            indexing: lib.is_indexing(),
            last_index_started: lib.last_index_started.clone(),
            last_index_completed: lib.last_index_completed.clone(),
            created_at: lib.created_at.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct IndexQuery {
    /// Also probe video durations.
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IndexResponse {
    pub library_id: String,
    pub mode: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct IndexAllResponse {
    pub queued: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DirResponse {
    pub id: String,
    pub parent_dir_id: Option<String>,
    pub depth: i64,
    pub name: String,
    pub library_path: String,
}

impl From<Dir> for DirResponse {
    fn from(d: Dir) -> Self {
        Self {
            id: d.id.to_string(),
            parent_dir_id: d.parent_dir_id.map(|p| p.to_string()),
            depth: d.depth,
            name: d.name,
            library_path: d.library_path,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: String,
    pub dir_id: Option<String>,
    pub title: String,
    pub library_path: String,
    pub duration_secs: Option<f64>,
}

impl From<Video> for VideoResponse {
    fn from(v: Video) -> Self {
        Self {
            id: v.id.to_string(),
            dir_id: v.dir_id.map(|d| d.to_string()),
            title: v.title,
            library_path: v.library_path,
            duration_secs: v.duration_secs,
        }
    }
}

/// One level of the directory tree.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DirListing {
    /// The dir being listed; `None` at the library root.
    pub dir: Option<DirResponse>,
    pub dirs: Vec<DirResponse>,
    pub videos: Vec<VideoResponse>,
}

fn parse_library_id(id: &str) -> Result<LibraryId, Error> {
    id.parse()
        .map_err(|_| Error::Validation("Invalid library ID".into()))
}

/// Canonical form of a media path: relative, `/`-separated, no `.` or `..`
/// segments, no empty segments.
fn normalize_media_path(raw: &str) -> Result<String, Error> {
    let mut segments = Vec::new();
    for component in std::path::Path::new(raw.trim()).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            Component::CurDir => {}
            _ => {
                return Err(Error::Validation(
                    "media_path must be relative to the media root".into(),
                ))
            }
        }
    }
    if segments.is_empty() {
        return Err(Error::Validation("media_path is required".into()));
    }
    Ok(segments.join("/"))
}

/// GET /api/libraries
#[utoipa::path(
    get,
    path = "/api/libraries",
    responses(
        (status = 200, description = "List all libraries", body = Vec<LibraryResponse>)
    )
)]
pub async fn list_libraries(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<LibraryResponse>>, AppError> {
    let conn = get_conn(&ctx.db)?;
    let libs = libraries::list_libraries(&conn)?;
    Ok(Json(libs.iter().map(LibraryResponse::from_model).collect()))
}

/// POST /api/libraries
#[utoipa::path(
    post,
    path = "/api/libraries",
    request_body = CreateLibraryRequest,
    responses(
        (status = 201, description = "Library created", body = LibraryResponse),
        (status = 400, description = "Invalid name or media path"),
        (status = 409, description = "Media path already registered")
    )
)]
pub async fn create_library(
    State(ctx): State<AppContext>,
    Json(payload): Json<CreateLibraryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("name is required".into()).into());
    }
    let media_path = normalize_media_path(&payload.media_path)?;

    let root = ctx.config.media.library_root(&media_path);
    if !tokio::fs::metadata(&root).await.is_ok_and(|m| m.is_dir()) {
        return Err(Error::Validation(format!(
            "media_path {media_path} does not exist under the media root"
        ))
        .into());
    }

    let conn = get_conn(&ctx.db)?;
    let lib = libraries::create_library(&conn, name, &media_path)?;
    tracing::info!(library_id = %lib.id, media_path = %lib.media_path, "Library created");

    Ok((StatusCode::CREATED, Json(LibraryResponse::from_model(&lib))))
}

/// PUT /api/libraries/{id}
#[utoipa::path(
    put,
    path = "/api/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    request_body = RenameLibraryRequest,
    responses(
        (status = 200, description = "Library renamed", body = LibraryResponse),
        (status = 404, description = "Library not found")
    )
)]
pub async fn rename_library(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(payload): Json<RenameLibraryRequest>,
) -> Result<Json<LibraryResponse>, AppError> {
    let lib_id = parse_library_id(&id)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("name is required".into()).into());
    }

    let conn = get_conn(&ctx.db)?;
    if !libraries::rename_library(&conn, lib_id, name)? {
        return Err(Error::not_found("library", lib_id).into());
    }
    let lib = libraries::get_library(&conn, lib_id)?
        .ok_or_else(|| Error::not_found("library", lib_id))?;

    Ok(Json(LibraryResponse::from_model(&lib)))
}

/// DELETE /api/libraries/{id}
#[utoipa::path(
    delete,
    path = "/api/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    responses(
        (status = 204, description = "Library deleted"),
        (status = 404, description = "Library not found")
    )
)]
pub async fn delete_library(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let lib_id = parse_library_id(&id)?;

    let conn = get_conn(&ctx.db)?;
    if !libraries::delete_library(&conn, lib_id)? {
        return Err(Error::not_found("library", lib_id).into());
    }
    tracing::info!(library_id = %lib_id, "Library deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/libraries/{id}/index
#[utoipa::path(
    post,
    path = "/api/libraries/{id}/index",
    params(("id" = String, Path, description = "Library ID"), IndexQuery),
    responses(
        (status = 202, description = "Index queued", body = IndexResponse),
        (status = 404, description = "Library not found"),
        (status = 409, description = "An index is already queued or running")
    )
)]
pub async fn index_library(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, AppError> {
    let lib_id = parse_library_id(&id)?;
    {
        let conn = get_conn(&ctx.db)?;
        libraries::get_library(&conn, lib_id)?.ok_or_else(|| Error::not_found("library", lib_id))?;
    }

    let mode = IndexMode::from_full(query.full);
    if !ctx.scheduler.enqueue(lib_id, mode) {
        return Err(Error::Conflict(format!("library {lib_id} is already being indexed")).into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(IndexResponse {
            library_id: lib_id.to_string(),
            mode: mode.to_string(),
        }),
    ))
}

/// POST /api/libraries/index-all
#[utoipa::path(
    post,
    path = "/api/libraries/index-all",
    params(IndexQuery),
    responses((status = 202, description = "Libraries queued", body = IndexAllResponse))
)]
pub async fn index_all(
    State(ctx): State<AppContext>,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, AppError> {
    let queued = ctx.scheduler.enqueue_all(IndexMode::from_full(query.full))?;
    Ok((StatusCode::ACCEPTED, Json(IndexAllResponse { queued })))
}

/// GET /api/libraries/{id}/dirs
#[utoipa::path(
    get,
    path = "/api/libraries/{id}/dirs",
    params(("id" = String, Path, description = "Library ID")),
    responses(
        (status = 200, description = "Top-level dirs and videos", body = DirListing),
        (status = 404, description = "Library not found")
    )
)]
pub async fn browse_root(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<DirListing>, AppError> {
    let lib_id = parse_library_id(&id)?;

    let conn = get_conn(&ctx.db)?;
    libraries::get_library(&conn, lib_id)?.ok_or_else(|| Error::not_found("library", lib_id))?;

    Ok(Json(DirListing {
        dir: None,
        dirs: dirs::list_root_dirs(&conn, lib_id)?
            .into_iter()
            .map(Into::into)
            .collect(),
        videos: videos::list_root_videos(&conn, lib_id)?
            .into_iter()
            .map(Into::into)
            .collect(),
    }))
}

/// GET /api/libraries/{id}/dirs/{dir_id}
#[utoipa::path(
    get,
    path = "/api/libraries/{id}/dirs/{dir_id}",
    params(
        ("id" = String, Path, description = "Library ID"),
        ("dir_id" = String, Path, description = "Dir ID")
    ),
    responses(
        (status = 200, description = "Sub-dirs and videos of a dir", body = DirListing),
        (status = 404, description = "Dir not found")
    )
)]
pub async fn browse_dir(
    State(ctx): State<AppContext>,
    Path((id, dir_id)): Path<(String, String)>,
) -> Result<Json<DirListing>, AppError> {
    let lib_id = parse_library_id(&id)?;
    let dir_id: DirId = dir_id
        .parse()
        .map_err(|_| Error::Validation("Invalid dir ID".into()))?;

    let conn = get_conn(&ctx.db)?;
    let dir = dirs::get_dir(&conn, lib_id, dir_id)?.ok_or_else(|| Error::not_found("dir", dir_id))?;

    Ok(Json(DirListing {
        dirs: dirs::list_child_dirs(&conn, dir.id)?
            .into_iter()
            .map(Into::into)
            .collect(),
        videos: videos::list_videos_in_dir(&conn, dir.id)?
            .into_iter()
            .map(Into::into)
            .collect(),
        dir: Some(dir.into()),
    }))
}
