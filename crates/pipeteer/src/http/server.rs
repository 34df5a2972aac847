//! Server side of the HTTP queue protocol
//!
//! Exposes one queue path as a small `axum` router. Mirroring the route
//! style `everruns-api` uses for its admin surface: typed extractors, JSON
//! bodies, one handler per operation.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::queue::{QueuePath, QueueStore};

struct ServerState<S> {
    store: Arc<S>,
    path: QueuePath,
}

// Not derived: `#[derive(Clone)]` would require `S: Clone`, but `Arc<S>` is
// `Clone` regardless of `S` — neither backend (`InMemoryStore`,
// `PostgresStore`) implements `Clone` itself.
impl<S> Clone for ServerState<S> {
    fn clone(&self) -> Self {
        ServerState { store: self.store.clone(), path: self.path.clone() }
    }
}

#[derive(Debug, Deserialize)]
struct ReserveQuery {
    reserve: Option<u64>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::InexistentItem(_) => StatusCode::NOT_FOUND,
            Error::Protocol(_) => StatusCode::BAD_REQUEST,
            Error::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Build a router exposing `path` on `store` over the HTTP queue protocol:
/// `POST /write/{key}`, `DELETE /read/item/{key}`, `GET
/// /read/item/{key}?reserve=`, `GET /read/item?reserve=` (read-any), `GET
/// /read/keys`, `DELETE /read/` (clear).
pub fn router<S: QueueStore>(path: QueuePath, store: Arc<S>) -> Router {
    let state = ServerState { store, path };
    Router::new()
        .route("/write/:key", post(write::<S>))
        .route("/read/item/:key", get(read_item::<S>).delete(pop_item::<S>))
        .route("/read/item", get(read_any::<S>))
        .route("/read/keys", get(keys::<S>))
        .route("/read/", axum::routing::delete(clear::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn write<S: QueueStore>(
    State(state): State<ServerState<S>>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<StatusCode, Error> {
    state.store.push(&state.path, &key, value).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pop_item<S: QueueStore>(
    State(state): State<ServerState<S>>,
    Path(key): Path<String>,
) -> Result<StatusCode, Error> {
    state.store.pop(&state.path, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_item<S: QueueStore>(
    State(state): State<ServerState<S>>,
    Path(key): Path<String>,
    Query(q): Query<ReserveQuery>,
) -> Result<Json<Value>, Error> {
    let reserve = q.reserve.map(Duration::from_secs);
    let value = state.store.read(&state.path, &key, reserve).await?;
    Ok(Json(value))
}

async fn read_any<S: QueueStore>(
    State(state): State<ServerState<S>>,
    Query(q): Query<ReserveQuery>,
) -> Result<Json<Option<(String, Value)>>, Error> {
    let reserve = q.reserve.map(Duration::from_secs);
    match state.store.read_any(&state.path, reserve).await {
        Ok(item) => Ok(Json(Some(item))),
        Err(Error::InexistentItem(_)) => Ok(Json(None)),
        Err(e) => Err(e),
    }
}

async fn keys<S: QueueStore>(
    State(state): State<ServerState<S>>,
) -> Result<Json<Vec<String>>, Error> {
    Ok(Json(state.store.keys(&state.path).await?))
}

async fn clear<S: QueueStore>(
    State(state): State<ServerState<S>>,
) -> Result<StatusCode, Error> {
    state.store.clear(&state.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::InMemoryStore;

    #[test]
    fn router_builds_without_panicking() {
        let store = Arc::new(InMemoryStore::new());
        let _ = router(QueuePath::from("orders"), store);
    }
}
