use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::logging::LoggableUuid;
use crate::models::ModelValidationError;
use crate::models::attachment::{AttachmentPayload, AttachmentUpload};
use crate::models::note::{NewNote, Note, NoteChanges, SortField};
use crate::store::{AttachmentLookup, AttachmentRemoval, NoteRepository, PageRequest};

/// Input of a note creation.
#[derive(Debug, Clone, Default)]
pub struct CreateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub attachments: Vec<AttachmentUpload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub notes: Vec<Note>,
    pub current_page: u32,
    pub total_pages: u64,
}

/// Note operations on behalf of one authenticated owner at a time.
#[derive(Clone)]
pub struct NotesService {
    repo: Arc<dyn NoteRepository>,
    max_attachment_bytes: usize,
    max_attachments: usize,
}

impl NotesService {
    pub fn new(
        repo: Arc<dyn NoteRepository>,
        max_attachment_bytes: usize,
        max_attachments: usize,
    ) -> Self {
        Self {
            repo,
            max_attachment_bytes,
            max_attachments,
        }
    }

    pub fn max_attachments(&self) -> usize {
        self.max_attachments
    }

    #[tracing::instrument(
        name = "create_note",
        skip(self, input),
        fields(owner = %LoggableUuid(owner), attachments = input.attachments.len())
    )]
    pub async fn create(&self, owner: Uuid, input: CreateNote) -> Result<Note, AppError> {
        if input.attachments.len() > self.max_attachments {
            return Err(ModelValidationError::TooManyAttachments(self.max_attachments).into());
        }

        let new_note = NewNote::new(owner, input.title, input.content, input.tags)?;
        let uploads = input
            .attachments
            .into_iter()
            .map(|upload| upload.validate(self.max_attachment_bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let note = self.repo.insert(new_note, uploads).await?;

        tracing::info!(
            note_id = %LoggableUuid(note.id),
            attachments = note.attachments.len(),
            "Note created"
        );
        Ok(note)
    }

    pub async fn get(&self, owner: Uuid, note_id: Uuid) -> Result<Note, AppError> {
        self.repo
            .fetch(owner, note_id)
            .await?
            .ok_or_else(AppError::note_not_found)
    }

    #[tracing::instrument(name = "list_notes", skip(self), fields(owner = %LoggableUuid(owner)))]
    pub async fn list(
        &self,
        owner: Uuid,
        page: PageRequest,
        sort: SortField,
    ) -> Result<Vec<Note>, AppError> {
        self.repo.list(owner, sort, Some(page)).await
    }

    /// Every note of the owner, without pagination.
    pub async fn sorted(&self, owner: Uuid, sort: SortField) -> Result<Vec<Note>, AppError> {
        self.repo.list(owner, sort, None).await
    }

    #[tracing::instrument(
        name = "update_note",
        skip(self, changes),
        fields(owner = %LoggableUuid(owner), note_id = %LoggableUuid(note_id))
    )]
    pub async fn update(
        &self,
        owner: Uuid,
        note_id: Uuid,
        changes: NoteChanges,
    ) -> Result<Note, AppError> {
        let changes = changes.validate()?;
        self.repo
            .update(owner, note_id, changes)
            .await?
            .ok_or_else(AppError::note_not_found)
    }

    #[tracing::instrument(
        name = "delete_note",
        skip(self),
        fields(owner = %LoggableUuid(owner), note_id = %LoggableUuid(note_id))
    )]
    pub async fn delete(&self, owner: Uuid, note_id: Uuid) -> Result<Note, AppError> {
        let note = self
            .repo
            .delete(owner, note_id)
            .await?
            .ok_or_else(AppError::note_not_found)?;

        tracing::info!("Note deleted");
        Ok(note)
    }

    #[tracing::instrument(name = "search_notes", skip(self, query), fields(owner = %LoggableUuid(owner)))]
    pub async fn search(
        &self,
        owner: Uuid,
        query: &str,
        page: PageRequest,
    ) -> Result<SearchPage, AppError> {
        let (notes, total) = self.repo.search(owner, query, page).await?;

        Ok(SearchPage {
            notes,
            current_page: page.page,
            total_pages: page.total_pages(total),
        })
    }

    #[tracing::instrument(
        name = "remove_attachment",
        skip(self),
        fields(
            owner = %LoggableUuid(owner),
            note_id = %LoggableUuid(note_id),
            attachment_id = %LoggableUuid(attachment_id)
        )
    )]
    pub async fn remove_attachment(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<(), AppError> {
        match self
            .repo
            .remove_attachment(owner, note_id, attachment_id)
            .await?
        {
            AttachmentRemoval::NoteMissing => Err(AppError::note_not_found()),
            AttachmentRemoval::AttachmentMissing => Err(AppError::attachment_not_found()),
            AttachmentRemoval::Removed { updated_at } => {
                tracing::info!(%updated_at, "Attachment removed");
                Ok(())
            }
        }
    }

    #[tracing::instrument(
        name = "download_attachment",
        skip(self),
        fields(
            owner = %LoggableUuid(owner),
            note_id = %LoggableUuid(note_id),
            attachment_id = %LoggableUuid(attachment_id)
        )
    )]
    pub async fn attachment_payload(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentPayload, AppError> {
        match self
            .repo
            .attachment_payload(owner, note_id, attachment_id)
            .await?
        {
            AttachmentLookup::NoteMissing => Err(AppError::note_not_found()),
            AttachmentLookup::AttachmentMissing => Err(AppError::attachment_not_found()),
            AttachmentLookup::PayloadMissing => {
                tracing::error!("Attachment record has no stored payload");
                Err(AppError::attachment_not_found())
            }
            AttachmentLookup::Found(payload) => Ok(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    const MAX_BYTES: usize = 64;

    fn service() -> (NotesService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (NotesService::new(store.clone(), MAX_BYTES, 5), store)
    }

    fn text_note(title: &str, content: &str) -> CreateNote {
        CreateNote {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    fn file(name: &str, data: &[u8]) -> AttachmentUpload {
        AttachmentUpload {
            filename: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_create_round_trip() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();

        let created = notes
            .create(
                owner,
                CreateNote {
                    title: Some("Trip".to_string()),
                    content: Some("pack bags".to_string()),
                    tags: Some(vec!["a".to_string(), "b".to_string()]),
                    attachments: vec![file("ticket.pdf", b"0123456789")],
                },
            )
            .await
            .unwrap();

        assert_eq!(created.user_id, owner);
        let listed = notes
            .list(owner, PageRequest::new(None, None), SortField::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tags, vec!["a", "b"]);
        assert_eq!(listed[0].attachments[0].filename, "ticket.pdf");
        assert_eq!(listed[0].attachments[0].content_type, "application/pdf");
        assert_eq!(listed[0].attachments[0].size_bytes, 10);

        let payload = notes
            .attachment_payload(owner, created.id, created.attachments[0].id)
            .await
            .unwrap();
        assert_eq!(payload.data, b"0123456789");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_attachments() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();

        let mut input = text_note("t", "c");
        input.attachments = vec![file("empty.bin", b"")];
        assert!(matches!(
            notes.create(owner, input).await,
            Err(AppError::Validation(_))
        ));

        let mut input = text_note("t", "c");
        input.attachments = vec![file("big.bin", &[7u8; MAX_BYTES + 1])];
        assert!(matches!(
            notes.create(owner, input).await,
            Err(AppError::Validation(_))
        ));

        let mut input = text_note("t", "c");
        input.attachments = (0..6).map(|i| file(&format!("{i}.bin"), b"x")).collect();
        assert!(matches!(
            notes.create(owner, input).await,
            Err(AppError::Validation(_))
        ));

        let listed = notes.sorted(owner, SortField::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_other_owner_sees_not_found() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();

        let mut input = text_note("private", "secret");
        input.attachments = vec![file("a.txt", b"data")];
        let note = notes.create(owner, input).await.unwrap();
        let attachment_id = note.attachments[0].id;

        assert!(matches!(
            notes.get(intruder, note.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes
                .update(intruder, note.id, NoteChanges::default())
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes.delete(intruder, note.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes
                .attachment_payload(intruder, note.id, attachment_id)
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            notes
                .remove_attachment(intruder, note.id, attachment_id)
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(notes.sorted(intruder, SortField::default()).await.unwrap().is_empty());

        // Still intact for the owner.
        let kept = notes.get(owner, note.id).await.unwrap();
        assert_eq!(kept.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        let note = notes.create(owner, text_note("t", "c")).await.unwrap();

        let deleted = notes.delete(owner, note.id).await.unwrap();
        assert_eq!(deleted.id, note.id);
        assert!(matches!(
            notes.delete(owner, note.id).await,
            Err(AppError::NotFound("note"))
        ));
    }

    #[tokio::test]
    async fn test_second_page_holds_remainder() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        for i in 0..15 {
            notes
                .create(owner, text_note(&format!("note {i}"), "body"))
                .await
                .unwrap();
        }

        let page = notes
            .list(owner, PageRequest::new(Some(2), Some(10)), SortField::default())
            .await
            .unwrap();
        assert_eq!(page.len(), 5);
        assert!(page.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
    }

    #[tokio::test]
    async fn test_sort_by_title_descending() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        for title in ["banana", "cherry", "apple"] {
            notes.create(owner, text_note(title, "")).await.unwrap();
        }

        let sorted = notes.sorted(owner, SortField::Title).await.unwrap();
        let titles: Vec<_> = sorted.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["cherry", "banana", "apple"]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_literal() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        notes.create(owner, text_note("Alpha Report", "q1 numbers")).await.unwrap();
        notes.create(owner, text_note("Beta Memo", "reminder")).await.unwrap();

        for query in ["alpha", "ALPHA", "AlPhA"] {
            let result = notes
                .search(owner, query, PageRequest::new(None, None))
                .await
                .unwrap();
            assert_eq!(result.notes.len(), 1);
            assert_eq!(result.notes[0].title, "Alpha Report");
            assert_eq!(result.total_pages, 1);
        }

        let result = notes
            .search(owner, ".*", PageRequest::new(None, None))
            .await
            .unwrap();
        assert!(result.notes.is_empty());
        assert_eq!(result.total_pages, 0);
    }

    #[tokio::test]
    async fn test_search_wildcards_match_literally() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        notes.create(owner, text_note("500 items", "stock")).await.unwrap();
        notes.create(owner, text_note("Sale", "now 50% off")).await.unwrap();
        notes.create(owner, text_note("axb", "plain")).await.unwrap();
        notes.create(owner, text_note("naming", "use A_B here")).await.unwrap();

        let titles = |page: SearchPage| -> Vec<String> {
            page.notes.into_iter().map(|note| note.title).collect()
        };

        let result = notes
            .search(owner, "50%", PageRequest::new(None, None))
            .await
            .unwrap();
        assert_eq!(titles(result), vec!["Sale"]);

        let result = notes
            .search(owner, "a_b", PageRequest::new(None, None))
            .await
            .unwrap();
        assert_eq!(titles(result), vec!["naming"]);
    }

    #[tokio::test]
    async fn test_search_matches_tags() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        let mut input = text_note("plain", "nothing here");
        input.tags = Some(vec!["Urgent".to_string()]);
        notes.create(owner, input).await.unwrap();

        let result = notes
            .search(owner, "urg", PageRequest::new(None, None))
            .await
            .unwrap();
        assert_eq!(result.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_search_pages() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        for i in 0..7 {
            notes
                .create(owner, text_note(&format!("match {i}"), ""))
                .await
                .unwrap();
        }

        let result = notes
            .search(owner, "match", PageRequest::new(Some(2), Some(3)))
            .await
            .unwrap();
        assert_eq!(result.current_page, 2);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.notes.len(), 3);
    }

    #[tokio::test]
    async fn test_update_is_partial_and_bumps_timestamp() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        let mut input = text_note("draft", "first");
        input.tags = Some(vec!["x".to_string()]);
        input.attachments = vec![file("a.txt", b"abc")];
        let note = notes.create(owner, input).await.unwrap();

        let updated = notes
            .update(
                owner,
                note.id,
                NoteChanges {
                    content: Some("second".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "draft");
        assert_eq!(updated.content, "second");
        assert_eq!(updated.tags, vec!["x"]);
        assert_eq!(updated.attachments.len(), 1);
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.created_at, note.created_at);
    }

    #[tokio::test]
    async fn test_remove_attachment_bumps_timestamp() {
        let (notes, _) = service();
        let owner = Uuid::new_v4();
        let mut input = text_note("with files", "");
        input.attachments = vec![file("a.txt", b"a"), file("b.txt", b"b")];
        let note = notes.create(owner, input).await.unwrap();
        let removed_id = note.attachments[0].id;

        notes
            .remove_attachment(owner, note.id, removed_id)
            .await
            .unwrap();

        let after = notes.get(owner, note.id).await.unwrap();
        assert!(after.updated_at > note.updated_at);
        assert_eq!(after.attachments.len(), 1);
        assert_eq!(after.attachments[0].filename, "b.txt");

        assert!(matches!(
            notes.remove_attachment(owner, note.id, removed_id).await,
            Err(AppError::NotFound("attachment"))
        ));
        assert!(matches!(
            notes
                .remove_attachment(owner, Uuid::new_v4(), removed_id)
                .await,
            Err(AppError::NotFound("note"))
        ));
    }

    #[tokio::test]
    async fn test_missing_payload_reported_as_not_found() {
        let (notes, store) = service();
        let owner = Uuid::new_v4();
        let mut input = text_note("t", "");
        input.attachments = vec![file("gone.bin", b"bytes")];
        let note = notes.create(owner, input).await.unwrap();
        let attachment_id = note.attachments[0].id;

        store.clear_payload(attachment_id);

        assert!(matches!(
            notes.attachment_payload(owner, note.id, attachment_id).await,
            Err(AppError::NotFound("attachment"))
        ));
    }
}
