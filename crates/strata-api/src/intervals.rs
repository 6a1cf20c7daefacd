//! Handlers for `/entities/{id}/…` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities/{id}/intervals` | Full history as `IntervalRecord`s; 404 if none |
//! | `POST` | `/entities/{id}/rebuild` | Re-derives the entity from all its events; 404 if it has none |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use strata_core::{
  event::EntityId,
  interval::IntervalRecord,
  maintain::Maintainer,
  store::LedgerStore,
};

use crate::error::ApiError;

fn entity_id(raw: String) -> Result<EntityId, ApiError> {
  EntityId::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ─── History ─────────────────────────────────────────────────────────────────

/// `GET /entities/{id}/intervals`
pub async fn history<S>(
  State(maintainer): State<Arc<Maintainer<S>>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<IntervalRecord>>, ApiError>
where
  S: LedgerStore + Clone + 'static,
{
  let id = entity_id(id)?;
  let intervals = maintainer
    .store()
    .entity_intervals(&id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if intervals.is_empty() {
    return Err(ApiError::NotFound(format!("no intervals for {id}")));
  }
  Ok(Json(intervals.into_iter().map(IntervalRecord::from).collect()))
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

/// `POST /entities/{id}/rebuild`
pub async fn rebuild<S>(
  State(maintainer): State<Arc<Maintainer<S>>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<IntervalRecord>>, ApiError>
where
  S: LedgerStore + Clone + 'static,
{
  let id = entity_id(id)?;
  let intervals = maintainer.rebuild_entity(&id).await?;
  if intervals.is_empty() {
    return Err(ApiError::NotFound(format!("no events for {id}")));
  }
  Ok(Json(intervals.into_iter().map(IntervalRecord::from).collect()))
}

#[cfg(test)]
mod tests {
  use axum::http::StatusCode;
  use chrono::{TimeZone, Utc};
  use strata_core::{
    event::{EntityId, NewEvent, OrderStatus},
    store::LedgerStore,
  };

  use crate::test_util::{maintainer, send};

  #[tokio::test]
  async fn unknown_entity_is_404() {
    let m = maintainer().await;
    let (status, _) = send(&m, "GET", "/entities/ORD-404/intervals", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&m, "POST", "/entities/ORD-404/rebuild", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn rebuild_then_read_history() {
    let m = maintainer().await;
    let id = EntityId::new("ORD-1").unwrap();
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 21, 0, 0).unwrap();
    m.store()
      .append_events(vec![
        NewEvent::new(id.clone(), OrderStatus::Pending, t0),
        NewEvent::new(id.clone(), OrderStatus::Completed, t1),
      ])
      .await
      .unwrap();

    let (status, _) = send(&m, "POST", "/entities/ORD-1/rebuild", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&m, "GET", "/entities/ORD-1/intervals", None).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["status"], "pending");
    assert_eq!(records[0]["is_current"], false);
    assert_eq!(records[0]["duration_hours"], 12.0);
    assert_eq!(records[1]["sequence"], 2);
    assert_eq!(records[1]["is_current"], true);
    assert!(records[1]["effective_end"].is_null());
  }
}
