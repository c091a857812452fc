use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::users;

use super::{ModelValidationError, ValidationResult};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
}

impl NewUser {
    pub fn new(username: &str) -> ValidationResult<Self> {
        let username = username.trim().to_string();
        ensure_valid_username(&username)?;
        Ok(Self { username })
    }
}

/// Matches the `VARCHAR(32)` column.
pub const MAX_USERNAME_CHARS: usize = 32;

/// Any script is accepted. Only emptiness, length and control characters are
/// rejected; callers trim first.
fn ensure_valid_username(value: &str) -> ValidationResult<()> {
    let len = value.chars().count();
    if len == 0 || len > MAX_USERNAME_CHARS {
        tracing::debug!(length = len, "Username rejected: invalid length");
        return Err(ModelValidationError::InvalidUsername);
    }

    if value.chars().any(char::is_control) {
        tracing::debug!("Username rejected: contains control characters");
        return Err(ModelValidationError::InvalidUsername);
    }
    Ok(())
}
