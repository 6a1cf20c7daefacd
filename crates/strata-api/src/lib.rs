//! JSON REST API for Strata.
//!
//! Exposes an axum [`Router`] backed by a [`Maintainer`] over any
//! [`LedgerStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", strata_api::api_router(maintainer.clone()))
//! ```

pub mod error;
pub mod events;
pub mod intervals;
pub mod maintenance;
pub mod snapshot;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use strata_core::{maintain::Maintainer, store::LedgerStore};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build a fully-materialised API router around `maintainer`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(maintainer: Arc<Maintainer<S>>) -> Router<()>
where
  S: LedgerStore + Clone + 'static,
{
  Router::new()
    // Events
    .route("/events", post(events::append::<S>))
    // Intervals
    .route("/entities/{id}/intervals", get(intervals::history::<S>))
    .route("/entities/{id}/rebuild", post(intervals::rebuild::<S>))
    // Point-in-time
    .route("/snapshot", get(snapshot::handler::<S>))
    // Maintenance
    .route("/maintenance", post(maintenance::run::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(maintainer)
}

#[cfg(test)]
pub(crate) mod test_util {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use strata_core::maintain::{Maintainer, MaintainerConfig};
  use strata_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  pub async fn maintainer() -> Arc<Maintainer<SqliteStore>> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Arc::new(Maintainer::new(store, MaintainerConfig::default()))
  }

  /// Send one request and decode the JSON response body.
  pub async fn send(
    maintainer: &Arc<Maintainer<SqliteStore>>,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
  ) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(json) => {
        builder = builder.header("content-type", "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    let resp = super::api_router(Arc::clone(maintainer))
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();

    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let json = if bytes.is_empty() {
      serde_json::Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
  }
}
