use std::sync::Arc;

use crate::config::AppConfig;
use crate::security::auth::TokenService;
use crate::security::rate_limit::LoginThrottle;
use crate::services::notes::NotesService;
use crate::services::users::LoginService;
use crate::store::{NoteRepository, UserRepository};

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub notes: NotesService,
    pub logins: LoginService,
    pub login_throttle: LoginThrottle,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        notes: Arc<dyn NoteRepository>,
    ) -> Self {
        let tokens = TokenService::new(&config);
        let notes = NotesService::new(
            notes,
            config.max_attachment_bytes,
            config.max_attachments_per_note,
        );
        let logins = LoginService::new(users, tokens.clone());
        let login_throttle = LoginThrottle::from_config(&config);

        Self {
            config: Arc::new(config),
            tokens,
            notes,
            logins,
            login_throttle,
        }
    }
}
