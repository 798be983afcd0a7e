//! Axum router construction.

use axum::middleware;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::libraries::list_libraries,
        routes::libraries::create_library,
        routes::libraries::rename_library,
        routes::libraries::delete_library,
        routes::libraries::index_library,
        routes::libraries::index_all,
        routes::libraries::browse_root,
        routes::libraries::browse_dir,
        routes::stream::issue_stream,
        routes::stream::complete_stream,
        routes::stream::stream_video,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::libraries::CreateLibraryRequest,
        routes::libraries::RenameLibraryRequest,
        routes::libraries::LibraryResponse,
        routes::libraries::IndexResponse,
        routes::libraries::IndexAllResponse,
        routes::libraries::DirResponse,
        routes::libraries::VideoResponse,
        routes::libraries::DirListing,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The auth middleware also runs when auth is disabled; it then injects
    // the anonymous caller that handlers extract.
    let api = Router::new()
        .route(
            "/libraries",
            get(routes::libraries::list_libraries).post(routes::libraries::create_library),
        )
        .route("/libraries/index-all", post(routes::libraries::index_all))
        .route(
            "/libraries/{id}",
            put(routes::libraries::rename_library).delete(routes::libraries::delete_library),
        )
        .route("/libraries/{id}/index", post(routes::libraries::index_library))
        .route("/libraries/{id}/dirs", get(routes::libraries::browse_root))
        .route(
            "/libraries/{id}/dirs/{dir_id}",
            get(routes::libraries::browse_dir),
        )
        // POST takes a video id, PUT a stream key.
        .route(
            "/stream/{id}",
            post(routes::stream::issue_stream).put(routes::stream::complete_stream),
        )
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    // Stream keys are bearer capabilities; players fetch them without auth.
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/stream/{stream_key}", get(routes::stream::stream_video))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
