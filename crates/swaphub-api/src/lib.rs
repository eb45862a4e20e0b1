pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod sessions;

use std::sync::Arc;

use swaphub_store::Database;

use error::ApiError;
use swaphub_types::Error;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

/// Run a store operation off the async runtime. SQLite calls block, so they
/// go through spawn_blocking like every DB access in the handlers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("spawn_blocking join error: {}", e);
        ApiError::from(Error::Internal(anyhow::anyhow!("task join error: {}", e)))
    })?;
    result.map_err(ApiError::from)
}
