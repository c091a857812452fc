use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::attachments;

use super::note::NoteRecord;
use super::{ModelValidationError, ValidationResult};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const FALLBACK_FILENAME: &str = "attachment";

/// Attachment metadata. Selecting this never reads the payload column.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(table_name = attachments)]
#[diesel(belongs_to(NoteRecord, foreign_key = note_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub note_id: Uuid,
    #[serde(skip_serializing)]
    pub position: i32,
    pub filename: String,
    pub content_type: String,
    #[serde(rename = "size")]
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub note_id: Uuid,
    pub position: i32,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub data: Option<Vec<u8>>,
}

/// A file received with a note creation request.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// An upload that passed validation, not yet bound to a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl ValidatedUpload {
    pub fn into_new_attachment(self, note_id: Uuid, position: i32) -> NewAttachment {
        NewAttachment {
            note_id,
            position,
            filename: self.filename,
            content_type: self.content_type,
            size_bytes: self.data.len() as i64,
            data: Some(self.data),
        }
    }
}

impl AttachmentUpload {
    /// Checks the payload against `max_bytes` and normalizes the name. The
    /// declared content type is kept as sent.
    pub fn validate(self, max_bytes: usize) -> ValidationResult<ValidatedUpload> {
        let filename = sanitize_filename(&self.filename);

        if self.data.is_empty() {
            return Err(ModelValidationError::EmptyAttachment(filename));
        }

        if self.data.len() > max_bytes {
            return Err(ModelValidationError::AttachmentTooLarge {
                name: filename,
                limit: max_bytes,
            });
        }

        let content_type = self
            .content_type
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(ValidatedUpload {
            filename,
            content_type,
            data: self.data,
        })
    }
}

/// The stored bytes of one attachment, ready to stream to the owner.
#[derive(Debug, Clone)]
pub struct AttachmentPayload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Keeps only the final path component of a client-supplied file name.
fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    let name = name.trim();

    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        name.to_string()
    }
}
