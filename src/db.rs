use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};

use crate::errors::AppError;

pub type PgPool = Pool<AsyncPgConnection>;
pub type PgConnection<'a> = PooledConnection<'a, AsyncPgConnection>;

const MAX_POOL_SIZE: u32 = 16;
const MIN_IDLE: u32 = 4;
const CONNECTION_TIMEOUT_SECS: u64 = 5;

#[tracing::instrument(name = "database_pool_setup", skip(database_url))]
pub async fn establish_pool(database_url: &str) -> anyhow::Result<PgPool> {
    tracing::debug!("Initializing database connection pool");

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);

    let pool = Pool::builder()
        .max_size(MAX_POOL_SIZE)
        .min_idle(Some(MIN_IDLE))
        .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .idle_timeout(Some(Duration::from_secs(600)))
        .max_lifetime(Some(Duration::from_secs(3600)))
        .build(manager)
        .await?;

    tracing::info!(
        max_size = MAX_POOL_SIZE,
        min_idle = MIN_IDLE,
        connection_timeout_secs = CONNECTION_TIMEOUT_SECS,
        "Database connection pool established"
    );

    Ok(pool)
}

pub async fn connection(pool: &PgPool) -> Result<PgConnection<'_>, AppError> {
    pool.get()
        .await
        .map_err(|err| AppError::Pool(err.to_string()))
}
