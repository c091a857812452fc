use std::sync::Arc;

use serde::Serialize;

use crate::errors::AppError;
use crate::logging::{LoggableUuid, SanitizedUsername, SecurityEvent};
use crate::models::user::NewUser;
use crate::security::auth::TokenService;
use crate::store::UserRepository;

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// Username-only login: unknown usernames are registered on first use.
#[derive(Clone)]
pub struct LoginService {
    users: Arc<dyn UserRepository>,
    tokens: TokenService,
}

impl LoginService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    #[tracing::instrument(name = "login_user", skip(self, username), fields(user_id))]
    pub async fn login(&self, username: &str) -> Result<LoginResponse, AppError> {
        let new_user = NewUser::new(username).map_err(|err| {
            crate::log_security_event!(
                SecurityEvent::LoginFailure,
                username = %SanitizedUsername::new(username),
                reason = "invalid_username",
                "Login rejected"
            );
            AppError::from(err)
        })?;

        let (user, created) = self.users.find_or_create(new_user).await?;
        tracing::Span::current().record("user_id", tracing::field::display(LoggableUuid(user.id)));

        if created {
            crate::log_security_event!(
                SecurityEvent::UserCreated,
                user_id = %LoggableUuid(user.id),
                username = %SanitizedUsername::new(&user.username),
                "User created on first login"
            );
        }

        let token = self.tokens.issue(user.id)?;

        crate::log_security_event!(
            SecurityEvent::LoginSuccess,
            user_id = %LoggableUuid(user.id),
            username = %SanitizedUsername::new(&user.username),
            "User logged in successfully"
        );

        Ok(LoginResponse {
            token,
            username: user.username,
        })
    }
}
