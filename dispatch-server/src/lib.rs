pub mod api;
pub mod intake;

use axum::Router;
use dispatch_core::{DispatchError, DispatchService, Store};

/// Intake webhooks plus the dispatch API, sharing one store.
pub fn router(store: Store) -> Router {
    intake::intake_router(store.clone()).merge(api::api_router(DispatchService::new(store)))
}

/// Runs a store call on the blocking pool so SQLite work never stalls the
/// async workers.
pub(crate) async fn blocking<T, F>(work: F) -> dispatch_core::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dispatch_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| DispatchError::Io(std::io::Error::other(err)))?
}
