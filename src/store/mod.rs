//! Persistence seam for users and notes.
//!
//! Every note query takes the owner id and filters on it, so a caller can
//! only ever observe its own notes. Absent and foreign notes look the same.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::attachment::{AttachmentPayload, ValidatedUpload};
use crate::models::note::{NewNote, Note, NoteChanges, SortField};
use crate::models::user::{NewUser, User};

#[cfg(test)]
pub mod memory;
pub mod pattern;
pub mod postgres;

pub use postgres::PgStore;

/// One page of a listing. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Clamps raw query values: pages below 1 become 1, a missing or zero
    /// limit becomes the default, and limits are capped.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = match limit {
            None | Some(0) => Self::DEFAULT_LIMIT,
            Some(value) => value.min(Self::MAX_LIMIT),
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

/// Outcome of removing one attachment from a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentRemoval {
    NoteMissing,
    AttachmentMissing,
    Removed { updated_at: DateTime<Utc> },
}

/// Outcome of reading one attachment's bytes.
#[derive(Debug, Clone)]
pub enum AttachmentLookup {
    NoteMissing,
    AttachmentMissing,
    /// The attachment record exists but carries no bytes.
    PayloadMissing,
    Found(AttachmentPayload),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns the user with this username, creating it when absent. The
    /// flag is true when this call created the record.
    async fn find_or_create(&self, new_user: NewUser) -> Result<(User, bool), AppError>;
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Stores a note and its attachments atomically, in upload order.
    async fn insert(&self, note: NewNote, uploads: Vec<ValidatedUpload>) -> Result<Note, AppError>;

    async fn fetch(&self, owner: Uuid, note_id: Uuid) -> Result<Option<Note>, AppError>;

    /// Lists the owner's notes in descending `sort` order; all of them when
    /// `page` is `None`.
    async fn list(
        &self,
        owner: Uuid,
        sort: SortField,
        page: Option<PageRequest>,
    ) -> Result<Vec<Note>, AppError>;

    /// Applies `changes` and bumps the update timestamp.
    async fn update(
        &self,
        owner: Uuid,
        note_id: Uuid,
        changes: NoteChanges,
    ) -> Result<Option<Note>, AppError>;

    async fn delete(&self, owner: Uuid, note_id: Uuid) -> Result<Option<Note>, AppError>;

    /// Case-insensitive literal substring match over title, content and
    /// tags, newest update first. Returns the page and the total match count.
    async fn search(
        &self,
        owner: Uuid,
        needle: &str,
        page: PageRequest,
    ) -> Result<(Vec<Note>, u64), AppError>;

    async fn remove_attachment(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentRemoval, AppError>;

    async fn attachment_payload(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentLookup, AppError>;
}
