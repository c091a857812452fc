use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Text};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{PgPool, connection};
use crate::errors::AppError;
use crate::models::attachment::{AttachmentInfo, AttachmentPayload, ValidatedUpload};
use crate::models::note::{
    NewNote, Note, NoteChanges, NoteRecord, SortField, next_update_timestamp,
};
use crate::models::user::{NewUser, User};
use crate::schema::{attachments, notes, users};

use super::pattern::contains_pattern;
use super::{
    AttachmentLookup, AttachmentRemoval, NoteRepository, PageRequest, UserRepository,
};

/// Diesel-backed store over the shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type NotePredicate = Box<dyn BoxableExpression<notes::table, Pg, SqlType = Bool>>;

/// `pattern` must already be escaped. Backslash is the default LIKE escape
/// character in PostgreSQL.
fn matches_pattern(pattern: String) -> NotePredicate {
    let any_tag = sql::<Bool>("EXISTS (SELECT 1 FROM unnest(notes.tags) AS tag WHERE tag ILIKE ")
        .bind::<Text, _>(pattern.clone())
        .sql(")");

    Box::new(
        notes::title
            .ilike(pattern.clone())
            .or(notes::content.ilike(pattern))
            .or(any_tag),
    )
}

async fn with_attachments(
    conn: &mut AsyncPgConnection,
    records: Vec<NoteRecord>,
) -> QueryResult<Vec<Note>> {
    let infos = AttachmentInfo::belonging_to(&records)
        .select(AttachmentInfo::as_select())
        .order(attachments::position.asc())
        .load::<AttachmentInfo>(conn)
        .await?;

    let grouped = infos.grouped_by(&records);
    Ok(records
        .into_iter()
        .zip(grouped)
        .map(|(record, attachments)| Note::from_parts(record, attachments))
        .collect())
}

async fn owned_note_for_update(
    conn: &mut AsyncPgConnection,
    owner: Uuid,
    note_id: Uuid,
) -> QueryResult<Option<NoteRecord>> {
    notes::table
        .filter(notes::id.eq(note_id).and(notes::user_id.eq(owner)))
        .select(NoteRecord::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_or_create(&self, new_user: NewUser) -> Result<(User, bool), AppError> {
        let mut conn = connection(&self.pool).await?;

        let inserted = diesel::insert_into(users::table)
            .values(&new_user)
            .on_conflict(users::username)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        let user = users::table
            .filter(users::username.eq(&new_user.username))
            .select(User::as_select())
            .first(&mut conn)
            .await?;

        Ok((user, inserted == 1))
    }
}

#[async_trait]
impl NoteRepository for PgStore {
    async fn insert(&self, note: NewNote, uploads: Vec<ValidatedUpload>) -> Result<Note, AppError> {
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let record: NoteRecord = diesel::insert_into(notes::table)
                    .values(&note)
                    .returning(NoteRecord::as_returning())
                    .get_result(conn)
                    .await?;

                let rows: Vec<_> = uploads
                    .into_iter()
                    .enumerate()
                    .map(|(position, upload)| {
                        upload.into_new_attachment(record.id, position as i32)
                    })
                    .collect();

                let infos = if rows.is_empty() {
                    Vec::new()
                } else {
                    diesel::insert_into(attachments::table)
                        .values(&rows)
                        .returning(AttachmentInfo::as_returning())
                        .get_results(conn)
                        .await?
                };

                Ok(Note::from_parts(record, infos))
            }
            .scope_boxed()
        })
        .await
    }

    async fn fetch(&self, owner: Uuid, note_id: Uuid) -> Result<Option<Note>, AppError> {
        let mut conn = connection(&self.pool).await?;

        let record = notes::table
            .filter(notes::id.eq(note_id).and(notes::user_id.eq(owner)))
            .select(NoteRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        match record {
            Some(record) => Ok(with_attachments(&mut conn, vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        owner: Uuid,
        sort: SortField,
        page: Option<PageRequest>,
    ) -> Result<Vec<Note>, AppError> {
        let mut conn = connection(&self.pool).await?;

        let query = notes::table
            .filter(notes::user_id.eq(owner))
            .select(NoteRecord::as_select())
            .into_boxed();

        let mut query = match sort {
            SortField::CreatedAt => query.order(notes::created_at.desc()),
            SortField::UpdatedAt => query.order(notes::updated_at.desc()),
            SortField::Title => query.order(notes::title.desc()),
        }
        .then_order_by(notes::id.desc());

        if let Some(page) = page {
            query = query
                .offset(page.offset() as i64)
                .limit(i64::from(page.limit));
        }

        let records = query.load::<NoteRecord>(&mut conn).await?;
        Ok(with_attachments(&mut conn, records).await?)
    }

    async fn update(
        &self,
        owner: Uuid,
        note_id: Uuid,
        changes: NoteChanges,
    ) -> Result<Option<Note>, AppError> {
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let Some(current) = owned_note_for_update(conn, owner, note_id).await? else {
                    return Ok(None);
                };

                let record = diesel::update(notes::table.find(current.id))
                    .set((
                        &changes,
                        notes::updated_at.eq(next_update_timestamp(current.updated_at)),
                    ))
                    .returning(NoteRecord::as_returning())
                    .get_result(conn)
                    .await?;

                Ok(with_attachments(conn, vec![record]).await?.pop())
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete(&self, owner: Uuid, note_id: Uuid) -> Result<Option<Note>, AppError> {
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let Some(record) = owned_note_for_update(conn, owner, note_id).await? else {
                    return Ok(None);
                };

                let note = with_attachments(conn, vec![record]).await?.pop();

                // Attachments go with the note through ON DELETE CASCADE.
                diesel::delete(notes::table.find(note_id))
                    .execute(conn)
                    .await?;

                Ok(note)
            }
            .scope_boxed()
        })
        .await
    }

    async fn search(
        &self,
        owner: Uuid,
        needle: &str,
        page: PageRequest,
    ) -> Result<(Vec<Note>, u64), AppError> {
        let mut conn = connection(&self.pool).await?;
        let pattern = contains_pattern(needle);

        let total: i64 = notes::table
            .into_boxed()
            .filter(notes::user_id.eq(owner))
            .filter(matches_pattern(pattern.clone()))
            .count()
            .get_result(&mut conn)
            .await?;

        let records = notes::table
            .into_boxed()
            .filter(notes::user_id.eq(owner))
            .filter(matches_pattern(pattern))
            .select(NoteRecord::as_select())
            .order(notes::updated_at.desc())
            .then_order_by(notes::id.desc())
            .offset(page.offset() as i64)
            .limit(i64::from(page.limit))
            .load::<NoteRecord>(&mut conn)
            .await?;

        let notes = with_attachments(&mut conn, records).await?;
        Ok((notes, total.max(0) as u64))
    }

    async fn remove_attachment(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentRemoval, AppError> {
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let Some(record) = owned_note_for_update(conn, owner, note_id).await? else {
                    return Ok(AttachmentRemoval::NoteMissing);
                };

                let removed = diesel::delete(
                    attachments::table.filter(
                        attachments::id
                            .eq(attachment_id)
                            .and(attachments::note_id.eq(record.id)),
                    ),
                )
                .execute(conn)
                .await?;

                if removed == 0 {
                    return Ok(AttachmentRemoval::AttachmentMissing);
                }

                let updated_at = next_update_timestamp(record.updated_at);
                diesel::update(notes::table.find(record.id))
                    .set(notes::updated_at.eq(updated_at))
                    .execute(conn)
                    .await?;

                Ok(AttachmentRemoval::Removed { updated_at })
            }
            .scope_boxed()
        })
        .await
    }

    async fn attachment_payload(
        &self,
        owner: Uuid,
        note_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentLookup, AppError> {
        let mut conn = connection(&self.pool).await?;

        let owned = notes::table
            .filter(notes::id.eq(note_id).and(notes::user_id.eq(owner)))
            .select(notes::id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()?;

        if owned.is_none() {
            return Ok(AttachmentLookup::NoteMissing);
        }

        let row = attachments::table
            .filter(
                attachments::id
                    .eq(attachment_id)
                    .and(attachments::note_id.eq(note_id)),
            )
            .select((
                attachments::filename,
                attachments::content_type,
                attachments::data,
            ))
            .first::<(String, String, Option<Vec<u8>>)>(&mut conn)
            .await
            .optional()?;

        Ok(match row {
            None => AttachmentLookup::AttachmentMissing,
            Some((_, _, None)) => AttachmentLookup::PayloadMissing,
            Some((filename, content_type, Some(data))) => {
                AttachmentLookup::Found(AttachmentPayload {
                    filename,
                    content_type,
                    data,
                })
            }
        })
    }
}
