use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use vouch_store::{
    Database, InsertPosition, ListFilter, MoveDirection, NewTestimonial, Testimonial,
    TestimonialPatch,
};

use crate::auth::require_editor;
use crate::avatar_store::AvatarStore;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::export;
use crate::fetcher::{FetchedTweet, TweetFetcher};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub avatars: Arc<AvatarStore>,
    pub fetcher: Arc<TweetFetcher>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    fn db(&self) -> Result<MutexGuard<'_, Database>, ApiError> {
        self.db
            .lock()
            .map_err(|e| ApiError::Internal(format!("Lock poisoned: {e}")))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/testimonials",
            get(list_testimonials).post(create_testimonial),
        )
        .route("/api/testimonials/reorder", post(reorder_testimonial))
        .route("/api/testimonials/check", get(check_duplicate))
        .route("/api/testimonials/fetch-tweet", post(fetch_tweet))
        .route(
            "/api/testimonials/:id",
            get(get_testimonial)
                .put(update_testimonial)
                .delete(delete_testimonial),
        )
        .route("/api/export", get(export_bundle))
        .route("/api/avatars/:filename", get(get_avatar))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Listing / single reads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    search: Option<String>,
    is_active: Option<String>,
}

async fn list_testimonials(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Testimonial>>, ApiError> {
    require_editor(&headers, &state.config)?;

    let filter = ListFilter {
        search: query.search,
        is_active: match query.is_active.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        },
    };

    let rows = state.db()?.list_testimonials(&filter)?;
    Ok(Json(rows))
}

async fn get_testimonial(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Testimonial>, ApiError> {
    require_editor(&headers, &state.config)?;
    let row = state.db()?.get_testimonial(id)?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// JSON body accepted by the create endpoint.  `insertPosition` is either a
/// keyword string (`"top"`, `"bottom"`, `"after:<id>"`) or an object
/// `{ "afterId": "<id>" }`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    tweet_url: String,
    #[serde(default)]
    author_name: String,
    handle: String,
    tweet_text: String,
    #[serde(default)]
    display_text: String,
    date: String,
    #[serde(default)]
    insert_position: Option<InsertPositionBody>,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    fetched_avatar_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InsertPositionBody {
    Keyword(String),
    After {
        #[serde(rename = "afterId")]
        after_id: String,
    },
}

struct UploadedAvatar {
    file_name: String,
    content_type: String,
    data: Bytes,
}

struct CreateInput {
    body: CreateBody,
    upload: Option<UploadedAvatar>,
}

fn parse_insert_position(raw: Option<InsertPositionBody>) -> Result<InsertPosition, ApiError> {
    let Some(raw) = raw else {
        return Ok(InsertPosition::Bottom);
    };
    match raw {
        InsertPositionBody::After { after_id } => parse_after_id(&after_id),
        InsertPositionBody::Keyword(s) => match s.as_str() {
            "top" => Ok(InsertPosition::Top),
            s if s.starts_with("after:") => parse_after_id(&s["after:".len()..]),
            // Anything else (including the explicit "bottom") appends.
            _ => Ok(InsertPosition::Bottom),
        },
    }
}

fn parse_after_id(raw: &str) -> Result<InsertPosition, ApiError> {
    Uuid::parse_str(raw.trim())
        .map(InsertPosition::After)
        .map_err(|_| ApiError::InvalidArgument("Invalid insertPosition: afterId not found".into()))
}

async fn read_create_multipart(mut multipart: Multipart) -> Result<CreateInput, ApiError> {
    let mut tweet_url = String::new();
    let mut author_name = String::new();
    let mut handle = String::new();
    let mut tweet_text = String::new();
    let mut display_text = String::new();
    let mut date = String::new();
    let mut is_active = false;
    let mut insert_position = None;
    let mut fetched_avatar_token = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidArgument(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "avatar" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidArgument(format!("Failed to read field: {e}")))?;
                if !data.is_empty() {
                    upload = Some(UploadedAvatar {
                        file_name,
                        content_type,
                        data,
                    });
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidArgument(format!("Failed to read field: {e}")))?;
                match name.as_str() {
                    "tweetUrl" => tweet_url = value,
                    "authorName" => author_name = value,
                    "handle" => handle = value,
                    "tweetText" => tweet_text = value,
                    "displayText" => display_text = value,
                    "date" => date = value,
                    "isActive" => is_active = value == "true" || value == "on",
                    "insertPosition" => insert_position = Some(InsertPositionBody::Keyword(value)),
                    "fetchedAvatarToken" => {
                        if !value.is_empty() {
                            fetched_avatar_token = Some(value);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(CreateInput {
        body: CreateBody {
            tweet_url,
            author_name,
            handle,
            tweet_text,
            display_text,
            date,
            insert_position,
            is_active,
            fetched_avatar_token,
        },
        upload,
    })
}

async fn create_testimonial(
    headers: HeaderMap,
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Testimonial>, ApiError> {
    let principal = require_editor(&headers, &state.config)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let input = if content_type.contains("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::InvalidArgument(format!("Multipart error: {e}")))?;
        read_create_multipart(multipart).await?
    } else {
        let Json(body) = Json::<CreateBody>::from_request(request, &())
            .await
            .map_err(|e| ApiError::InvalidArgument(format!("Invalid JSON body: {e}")))?;
        CreateInput { body, upload: None }
    };

    let position = parse_insert_position(input.body.insert_position)?;

    // Resolve the avatar before touching the database so a rejected image
    // never perturbs the ordering.
    let id = Uuid::new_v4();
    let avatar_file_name = if let Some(file) = &input.upload {
        state
            .avatars
            .save_upload(id, &file.file_name, &file.content_type, &file.data)
            .await?
    } else if let Some(token) = &input.body.fetched_avatar_token {
        state.avatars.claim(token, id).await?
    } else {
        return Err(ApiError::InvalidArgument(
            "Avatar is required. Use \"Fetch from tweet\" or upload an image.".to_string(),
        ));
    };

    let new = NewTestimonial {
        id,
        tweet_url: input.body.tweet_url,
        author_name: input.body.author_name,
        handle: input.body.handle,
        avatar_file_name,
        tweet_text: input.body.tweet_text,
        display_text: input.body.display_text,
        date: input.body.date,
        is_active: input.body.is_active,
    };

    let created = state.db()?.create_testimonial(&new, position)?;

    info!(id = %created.id, editor = %principal.email, "testimonial created");
    Ok(Json(created))
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

async fn read_update_multipart(
    mut multipart: Multipart,
) -> Result<(TestimonialPatch, Option<UploadedAvatar>), ApiError> {
    // Checkbox semantics: an absent isActive field means unchecked.
    let mut patch = TestimonialPatch {
        is_active: Some(false),
        ..Default::default()
    };
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidArgument(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "avatar" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidArgument(format!("Failed to read field: {e}")))?;
                if !data.is_empty() {
                    upload = Some(UploadedAvatar {
                        file_name,
                        content_type,
                        data,
                    });
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidArgument(format!("Failed to read field: {e}")))?;
                match name.as_str() {
                    "tweetUrl" => patch.tweet_url = Some(value),
                    "authorName" => patch.author_name = Some(value),
                    "handle" => patch.handle = Some(value),
                    "tweetText" => patch.tweet_text = Some(value),
                    "displayText" => patch.display_text = Some(value),
                    "date" => patch.date = Some(value),
                    "columnIndex" => {
                        if !value.is_empty() {
                            patch.column_index = Some(parse_int_field(&name, &value)?);
                        }
                    }
                    "sortOrder" => {
                        if !value.is_empty() {
                            patch.sort_order = Some(parse_int_field(&name, &value)?);
                        }
                    }
                    "isActive" => patch.is_active = Some(value == "true" || value == "on"),
                    _ => {}
                }
            }
        }
    }

    Ok((patch, upload))
}

fn parse_int_field(name: &str, value: &str) -> Result<i64, ApiError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::InvalidArgument(format!("Invalid {name}: '{value}'")))
}

async fn update_testimonial(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Request,
) -> Result<Json<Testimonial>, ApiError> {
    let principal = require_editor(&headers, &state.config)?;

    // Existence check up front so an avatar for a bogus id is never written.
    state.db()?.get_testimonial(id)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let (mut patch, upload) = if content_type.contains("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::InvalidArgument(format!("Multipart error: {e}")))?;
        read_update_multipart(multipart).await?
    } else {
        let Json(patch) = Json::<TestimonialPatch>::from_request(request, &())
            .await
            .map_err(|e| ApiError::InvalidArgument(format!("Invalid JSON body: {e}")))?;
        (patch, None)
    };

    if let Some(file) = &upload {
        let file_name = state
            .avatars
            .save_upload(id, &file.file_name, &file.content_type, &file.data)
            .await?;
        patch.avatar_file_name = Some(file_name);
    }

    let updated = state.db()?.update_testimonial(id, &patch)?;

    info!(id = %updated.id, editor = %principal.email, "testimonial updated");
    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// Delete / reorder
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn delete_testimonial(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let principal = require_editor(&headers, &state.config)?;

    state.db()?.delete_testimonial(id)?;

    info!(id = %id, editor = %principal.email, "testimonial deleted");
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Deserialize)]
struct ReorderRequest {
    id: Uuid,
    direction: MoveDirection,
}

async fn reorder_testimonial(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    require_editor(&headers, &state.config)?;

    state.db()?.move_testimonial(req.id, req.direction)?;
    Ok(Json(OkResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// Duplicate check / metadata fetch
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckQuery {
    tweet_url: Option<String>,
}

#[derive(Serialize)]
struct CheckResponse {
    duplicate: bool,
}

async fn check_duplicate(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    require_editor(&headers, &state.config)?;

    let duplicate = match query.tweet_url.as_deref() {
        Some(url) => state.db()?.check_duplicate(url)?,
        None => false,
    };
    Ok(Json(CheckResponse { duplicate }))
}

#[derive(Deserialize)]
struct FetchTweetRequest {
    url: String,
}

async fn fetch_tweet(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<FetchTweetRequest>,
) -> Result<Json<FetchedTweet>, ApiError> {
    require_editor(&headers, &state.config)?;

    let fetched = state.fetcher.fetch(&req.url, &state.avatars).await?;
    Ok(Json(fetched))
}

// ---------------------------------------------------------------------------
// Export / avatar serving
// ---------------------------------------------------------------------------

async fn export_bundle(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<axum::response::Response, ApiError> {
    let principal = require_editor(&headers, &state.config)?;

    let active = state.db()?.list_active_testimonials()?;
    let bytes = export::build_bundle(&active, &state.avatars)?;
    let file_name = export::bundle_file_name(Utc::now());

    info!(
        editor = %principal.email,
        records = active.len(),
        size = bytes.len(),
        "export bundle built"
    );

    use axum::response::IntoResponse;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn get_avatar(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    require_editor(&headers, &state.config)?;

    let data = state.avatars.read(&filename).await?;
    let content_type = if filename.to_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    };

    use axum::response::IntoResponse;
    Ok(([(header::CONTENT_TYPE, content_type.to_string())], data).into_response())
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_position_parsing() {
        assert_eq!(
            parse_insert_position(Some(InsertPositionBody::Keyword("top".into()))).unwrap(),
            InsertPosition::Top
        );
        assert_eq!(
            parse_insert_position(Some(InsertPositionBody::Keyword("bottom".into()))).unwrap(),
            InsertPosition::Bottom
        );
        assert_eq!(parse_insert_position(None).unwrap(), InsertPosition::Bottom);

        let id = Uuid::new_v4();
        assert_eq!(
            parse_insert_position(Some(InsertPositionBody::Keyword(format!("after:{id}"))))
                .unwrap(),
            InsertPosition::After(id)
        );
        assert_eq!(
            parse_insert_position(Some(InsertPositionBody::After {
                after_id: id.to_string()
            }))
            .unwrap(),
            InsertPosition::After(id)
        );
        assert!(parse_insert_position(Some(InsertPositionBody::Keyword(
            "after:not-a-uuid".into()
        )))
        .is_err());
    }
}
