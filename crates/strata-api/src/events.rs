//! Handlers for `/events`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/events` | Body: `[RawEvent]`; 201 + stored events, or 400 listing every malformed event |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use strata_core::{
  event::{NewEvent, RawEvent},
  maintain::Maintainer,
  store::LedgerStore,
};

use crate::error::{ApiError, Rejection};

/// `POST /events`: validates the whole batch before storing any of it.
pub async fn append<S>(
  State(maintainer): State<Arc<Maintainer<S>>>,
  Json(body): Json<Vec<RawEvent>>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LedgerStore + Clone + 'static,
{
  let mut accepted = Vec::with_capacity(body.len());
  let mut rejected = Vec::new();
  for (index, raw) in body.into_iter().enumerate() {
    match NewEvent::try_from(raw) {
      Ok(event) => accepted.push(event),
      Err(err) => rejected.push(Rejection { index, reason: err.to_string() }),
    }
  }
  if !rejected.is_empty() {
    return Err(ApiError::Rejected(rejected));
  }

  let stored = maintainer
    .store()
    .append_events(accepted)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  tracing::debug!(count = stored.len(), "events appended");
  Ok((StatusCode::CREATED, Json(stored)))
}

#[cfg(test)]
mod tests {
  use axum::http::StatusCode;
  use serde_json::json;
  use strata_core::{event::EntityId, store::LedgerStore};

  use crate::test_util::{maintainer, send};

  #[tokio::test]
  async fn append_returns_stored_events() {
    let m = maintainer().await;
    let (status, body) = send(
      &m,
      "POST",
      "/events",
      Some(json!([
        {
          "entity_id": "ORD-1",
          "observed_status": "pending",
          "observed_at": "2025-03-01T09:00:00Z",
          "payload": { "customer_id": "C-42" }
        },
        {
          "entity_id": "ORD-1",
          "observed_status": "completed",
          "observed_at": "2025-03-02T09:00:00Z"
        }
      ])),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let events = body.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["status"], "pending");
    assert_eq!(events[0]["payload"]["customer_id"], "C-42");
    assert!(events[0]["arrival"].as_i64() < events[1]["arrival"].as_i64());
  }

  #[tokio::test]
  async fn malformed_batch_is_rejected_whole() {
    let m = maintainer().await;
    let (status, body) = send(
      &m,
      "POST",
      "/events",
      Some(json!([
        { "entity_id": "ORD-1", "observed_status": "pending", "observed_at": "2025-03-01T09:00:00Z" },
        { "entity_id": "ORD-1", "observed_status": "shipped", "observed_at": "2025-03-01T10:00:00Z" },
        { "observed_status": "pending", "observed_at": "2025-03-01T11:00:00Z" }
      ])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let rejected = body["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0]["index"], 1);
    assert_eq!(rejected[1]["index"], 2);

    let stored = m
      .store()
      .entity_events(&EntityId::new("ORD-1").unwrap(), None)
      .await
      .unwrap();
    assert!(stored.is_empty());
  }
}
