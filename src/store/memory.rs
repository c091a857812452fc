use std::cmp::Reverse;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::attachment::{AttachmentInfo, AttachmentPayload, ValidatedUpload};
use crate::models::note::{
    NewNote, Note, NoteChanges, NoteRecord, SortField, next_update_timestamp,
};
use crate::models::user::{NewUser, User};

use super::pattern::{contains_pattern, ilike};
use super::{
    AttachmentLookup, AttachmentRemoval, NoteRepository, PageRequest, UserRepository,
};

/// Process-local store with the same scoping rules as the database one.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    notes: Vec<StoredNote>,
}

struct StoredNote {
    record: NoteRecord,
    attachments: Vec<StoredAttachment>,
}

struct StoredAttachment {
    info: AttachmentInfo,
    data: Option<Vec<u8>>,
}

impl StoredNote {
    fn to_note(&self) -> Note {
        Note::from_parts(
            self.record.clone(),
            self.attachments.iter().map(|a| a.info.clone()).collect(),
        )
    }

    fn matches(&self, pattern: &str) -> bool {
        ilike(pattern, &self.record.title)
            || ilike(pattern, &self.record.content)
            || self.record.tags.iter().any(|tag| ilike(pattern, tag))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store lock poisoned")
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    /// Drops the stored bytes of an attachment while keeping its record.
    pub fn clear_payload(&self, attachment_id: Uuid) {
        let mut state = self.lock();
        for note in &mut state.notes {
            for attachment in &mut note.attachments {
                if attachment.info.id == attachment_id {
                    attachment.data = None;
                }
            }
        }
    }

    fn owned<'a>(state: &'a mut MemoryState, owner: Uuid, note_id: Uuid) -> Option<&'a mut StoredNote> {
        state
            .notes
            .iter_mut()
            .find(|note| note.record.id == note_id && note.record.user_id == owner)
    }
}

fn sort_notes(notes: &mut [&StoredNote], sort: SortField) {
    match sort {
        SortField::CreatedAt => {
            notes.sort_by_key(|n| (Reverse(n.record.created_at), Reverse(n.record.id)))
        }
        SortField::UpdatedAt => {
            notes.sort_by_key(|n| (Reverse(n.record.updated_at), Reverse(n.record.id)))
        }
        SortField::Title => {
            notes.sort_by_key(|n| (Reverse(n.record.title.clone()), Reverse(n.record.id)))
        }
    }
}

fn paginate(notes: Vec<&StoredNote>, page: PageRequest) -> Vec<Note> {
    notes
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .map(StoredNote::to_note)
        .collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_or_create(&self, new_user: NewUser) -> Result<(User, bool), AppError> {
        let mut state = self.lock();
        if let Some(user) = state.users.iter().find(|u| u.username == new_user.username) {
            return Ok((user.clone(), false));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        Ok((user, true))
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn insert(&self, note: NewNote, uploads: Vec<ValidatedUpload>) -> Result<Note, AppError> {
        let now = Utc::now();
        let record = NoteRecord {
            id: Uuid::new_v4(),
            user_id: note.user_id,
            title: note.title,
            content: note.content,
            tags: note.tags,
            created_at: now,
            updated_at: now,
        };

        let attachments = uploads
            .into_iter()
            .enumerate()
            .map(|(position, upload)| {
                let row = upload.into_new_attachment(record.id, position as i32);
                StoredAttachment {
                    info: AttachmentInfo {
                        id: Uuid::new_v4(),
                        note_id: row.note_id,
                        position: row.position,
                        filename: row.filename,
                        content_type: row.content_type,
                        size_bytes: row.size_bytes,
                    },
                    data: row.data,
                }
            })
            .collect();

        let stored = StoredNote {
            record,
            attachments,
        };
        let note = stored.to_note();
        self.lock().notes.push(stored);
        Ok(note)
    }

    async fn fetch(&self, owner: Uuid, note_id: Uuid) -> Result<Option<Note>, AppError> {
        let mut state = self.lock();
        Ok(Self::owned(&mut state, owner, note_id).map(|note| note.to_note()))
    }

    async fn list(
        &self,
        owner: Uuid,
        sort: SortField,
        page: Option<PageRequest>,
    ) -> Result<Vec<Note>, AppError> {
        let state = self.lock();
        let mut notes: Vec<&StoredNote> = state
            .notes
            .iter()
            .filter(|note| note.record.user_id == owner)
            .collect();
        sort_notes(&mut notes, sort);

        Ok(match page {
            Some(page) => paginate(notes, page),
            None => notes.into_iter().map(StoredNote::to_note).collect(),
        })
    }

    async fn update(
        &self,
        owner: Uuid,
        note_id: Uuid,
        changes: NoteChanges,
    ) -> Result<Option<Note>, AppError> {
        let mut state = self.lock();
        let Some(note) = Self::owned(&mut state, owner, note_id) else {
            return Ok(None);
        };

        changes.apply_to(&mut note.record);
        note.record.updated_at = next_update_timestamp(note.record.updated_at);
        Ok(Some(note.to_note()))
    }

    async fn delete(&self, owner: Uuid, note_id: Uuid) -> Result<Option<Note>, AppError> {
        let mut state = self.lock();
        let position = state
            .notes
            .iter()
            .position(|note| note.record.id == note_id && note.record.user_id == owner);

        Ok(position.map(|index| state.notes.remove(index).to_note()))
    }

    async fn search(
        &self,
        owner: Uuid,
        needle: &str,
        page: PageRequest,
    ) -> Result<(Vec<Note>, u64), AppError> {
        let pattern = contains_pattern(needle);
        let state = self.lock();
        let mut notes: Vec<&StoredNote> = state
            .notes
            .iter()
            .filter(|note| note.record.user_id == owner && note.matches(&pattern))
            .collect();
        sort_notes(&mut notes, SortField::UpdatedAt);

        let total = notes.len() as u64;
        Ok((paginate(notes, page), total))
    }

    async fn remove_attachment(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentRemoval, AppError> {
        let mut state = self.lock();
        let Some(note) = Self::owned(&mut state, owner, note_id) else {
            return Ok(AttachmentRemoval::NoteMissing);
        };

        let Some(index) = note
            .attachments
            .iter()
            .position(|attachment| attachment.info.id == attachment_id)
        else {
            return Ok(AttachmentRemoval::AttachmentMissing);
        };

        note.attachments.remove(index);
        let updated_at = next_update_timestamp(note.record.updated_at);
        note.record.updated_at = updated_at;
        Ok(AttachmentRemoval::Removed { updated_at })
    }

    async fn attachment_payload(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentLookup, AppError> {
        let mut state = self.lock();
        let Some(note) = Self::owned(&mut state, owner, note_id) else {
            return Ok(AttachmentLookup::NoteMissing);
        };

        let Some(attachment) = note
            .attachments
            .iter()
            .find(|attachment| attachment.info.id == attachment_id)
        else {
            return Ok(AttachmentLookup::AttachmentMissing);
        };

        Ok(match &attachment.data {
            None => AttachmentLookup::PayloadMissing,
            Some(data) => AttachmentLookup::Found(AttachmentPayload {
                filename: attachment.info.filename.clone(),
                content_type: attachment.info.content_type.clone(),
                data: data.clone(),
            }),
        })
    }
}
