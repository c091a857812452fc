use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query,
        multipart::{Field, Multipart, MultipartError},
    },
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ModelValidationError;
use crate::models::attachment::{AttachmentUpload, DEFAULT_CONTENT_TYPE};
use crate::models::note::{Note, NoteChanges, SortField};
use crate::security::auth::{AuthenticatedUser, authenticate};
use crate::security::json::ValidatedJson;
use crate::services::notes::{CreateNote, SearchPage};
use crate::state::AppState;
use crate::store::PageRequest;

pub fn router() -> Router {
    Router::new()
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/search", get(search_notes))
        .route("/notes/sort", get(sort_notes))
        .route(
            "/notes/:note_id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route(
            "/notes/:note_id/attachments/:attachment_id",
            delete(remove_attachment),
        )
        .route(
            "/notes/:note_id/attachments/:attachment_id/download",
            get(download_attachment),
        )
        .route_layer(middleware::from_fn(authenticate))
}

/// Paging and sort parameters. Values that do not parse as numbers fall
/// back to the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    page: Option<String>,
    limit: Option<String>,
    sort_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

fn parse_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse().ok())
}

fn page_request(page: Option<&str>, limit: Option<&str>) -> PageRequest {
    PageRequest::new(parse_number(page), parse_number(limit))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::Validation(format!("malformed multipart body: {}", err.body_text()))
}

fn parse_tags(raw: &str) -> Result<Vec<String>, AppError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str::<Vec<String>>(raw)
        .map_err(|_| AppError::Validation("tags must be a JSON array of strings".to_string()))
}

/// Reads one uploaded file, aborting as soon as it grows past `limit`.
async fn read_file(mut field: Field<'_>, limit: usize) -> Result<AttachmentUpload, AppError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > limit {
            return Err(ModelValidationError::AttachmentTooLarge {
                name: filename,
                limit,
            }
            .into());
        }
        data.extend_from_slice(&chunk);
    }

    Ok(AttachmentUpload {
        filename,
        content_type,
        data,
    })
}

async fn read_create_form(
    mut multipart: Multipart,
    max_files: usize,
    max_file_bytes: usize,
) -> Result<CreateNote, AppError> {
    let mut input = CreateNote::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => input.title = Some(field.text().await.map_err(multipart_error)?),
            Some("content") => {
                input.content = Some(field.text().await.map_err(multipart_error)?)
            }
            Some("tags") => {
                let raw = field.text().await.map_err(multipart_error)?;
                input.tags = Some(parse_tags(&raw)?);
            }
            Some("attachments") | Some("attachments[]") => {
                if input.attachments.len() >= max_files {
                    return Err(ModelValidationError::TooManyAttachments(max_files).into());
                }
                input.attachments.push(read_file(field, max_file_bytes).await?);
            }
            _ => {}
        }
    }

    Ok(input)
}

pub async fn create_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let input = read_create_form(
        multipart,
        state.notes.max_attachments(),
        state.config.max_attachment_bytes,
    )
    .await?;

    let note = state.notes.create(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_notes(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Note>>, AppError> {
    let page = page_request(query.page.as_deref(), query.limit.as_deref());
    let sort = SortField::parse_or_default(query.sort_by.as_deref());

    let notes = state.notes.list(user_id, page, sort).await?;
    Ok(Json(notes))
}

pub async fn sort_notes(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Note>>, AppError> {
    let sort = SortField::parse_or_default(query.sort_by.as_deref());
    let notes = state.notes.sorted(user_id, sort).await?;
    Ok(Json(notes))
}

pub async fn search_notes(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchPage>, AppError> {
    let needle = query
        .query
        .ok_or_else(|| AppError::Validation("query parameter is required".to_string()))?;
    let page = page_request(query.page.as_deref(), query.limit.as_deref());

    let result = state.notes.search(user_id, &needle, page).await?;
    Ok(Json(result))
}

pub async fn get_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Note>, AppError> {
    let note = state.notes.get(user_id, note_id).await?;
    Ok(Json(note))
}

pub async fn update_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    ValidatedJson(changes): ValidatedJson<NoteChanges>,
) -> Result<Json<Note>, AppError> {
    let note = state.notes.update(user_id, note_id, changes).await?;
    Ok(Json(note))
}

pub async fn delete_note(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Note>, AppError> {
    let note = state.notes.delete(user_id, note_id).await?;
    Ok(Json(note))
}

pub async fn remove_attachment(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path((note_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .notes
        .remove_attachment(user_id, note_id, attachment_id)
        .await?;

    Ok(Json(MessageResponse {
        message: "Attachment deleted successfully",
    }))
}

pub async fn download_attachment(
    Extension(state): Extension<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path((note_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let payload = state
        .notes
        .attachment_payload(user_id, note_id, attachment_id)
        .await?;

    let content_type = HeaderValue::from_str(&payload.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(&payload.filename)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let length = HeaderValue::from(payload.data.len());

    let headers = [
        (CONTENT_TYPE, content_type),
        (CONTENT_DISPOSITION, disposition),
        (CONTENT_LENGTH, length),
    ];

    Ok((headers, payload.data).into_response())
}
