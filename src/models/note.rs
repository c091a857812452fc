use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::notes;

use super::attachment::AttachmentInfo;
use super::{ModelValidationError, ValidationResult};
use crate::models::user::User;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_TAGS: usize = 32;
pub const MAX_TAG_CHARS: usize = 64;

/// A row of the `notes` table, without its attachments.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = notes)]
#[diesel(belongs_to(User))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NoteRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A note together with the metadata of its attachments, as returned to
/// clients. Attachment payloads are only served by the download route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub attachments: Vec<AttachmentInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn from_parts(record: NoteRecord, mut attachments: Vec<AttachmentInfo>) -> Self {
        attachments.sort_by_key(|attachment| attachment.position);
        Self {
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            content: record.content,
            tags: record.tags,
            attachments,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNote {
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

impl NewNote {
    pub fn new(
        user_id: Uuid,
        title: Option<String>,
        content: Option<String>,
        tags: Option<Vec<String>>,
    ) -> ValidationResult<Self> {
        let title = normalize_title(title.unwrap_or_default())?;
        let tags = normalize_tags(tags.unwrap_or_default())?;

        Ok(Self {
            user_id,
            title,
            content: content.unwrap_or_default(),
            tags,
        })
    }
}

/// Partial update of a note's text fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = notes)]
#[serde(deny_unknown_fields)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NoteChanges {
    pub fn validate(mut self) -> ValidationResult<Self> {
        self.title = self.title.map(normalize_title).transpose()?;
        self.tags = self.tags.map(normalize_tags).transpose()?;
        Ok(self)
    }

    pub fn apply_to(&self, record: &mut NoteRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
    }
}

/// Fields a listing can be ordered by. Ordering is always descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    #[default]
    UpdatedAt,
    Title,
}

impl SortField {
    /// Resolves a client-supplied field name. Unknown names fall back to
    /// the default ordering instead of failing the request.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("createdAt") => SortField::CreatedAt,
            Some("updatedAt") => SortField::UpdatedAt,
            Some("title") => SortField::Title,
            None | Some("") => SortField::default(),
            Some(other) => {
                tracing::debug!(sort_by = other, "Unknown sort field, using default");
                SortField::default()
            }
        }
    }
}

/// Timestamp for a mutation of a note last touched at `previous`, kept
/// strictly after it even when the clock has not advanced.
pub fn next_update_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let floor = previous + Duration::microseconds(1);
    if now > previous { now } else { floor }
}

fn normalize_title(value: String) -> ValidationResult<String> {
    let trimmed = value.trim().to_string();
    if trimmed.chars().count() > MAX_TITLE_CHARS || trimmed.chars().any(|c| c.is_control()) {
        return Err(ModelValidationError::InvalidNoteTitle);
    }
    Ok(trimmed)
}

fn normalize_tags(tags: Vec<String>) -> ValidationResult<Vec<String>> {
    let tags: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    if tags.len() > MAX_TAGS {
        return Err(ModelValidationError::TooManyTags(MAX_TAGS));
    }

    if tags
        .iter()
        .any(|tag| tag.chars().count() > MAX_TAG_CHARS || tag.chars().any(|c| c.is_control()))
    {
        return Err(ModelValidationError::InvalidTag);
    }

    Ok(tags)
}
