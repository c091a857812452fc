pub mod attachment;
pub mod note;
pub mod user;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelValidationError {
    #[error("username must be 1-{} characters with no control characters", user::MAX_USERNAME_CHARS)]
    InvalidUsername,
    #[error("note title must be at most 200 characters and contain no control characters")]
    InvalidNoteTitle,
    #[error("a note may carry at most {0} tags")]
    TooManyTags(usize),
    #[error("tags must be at most 64 characters and contain no control characters")]
    InvalidTag,
    #[error("attachment '{0}' is empty")]
    EmptyAttachment(String),
    #[error("attachment '{name}' exceeds the {limit} byte limit")]
    AttachmentTooLarge { name: String, limit: usize },
    #[error("a note may carry at most {0} attachments")]
    TooManyAttachments(usize),
}

pub type ValidationResult<T> = Result<T, ModelValidationError>;
