//! Handler for `/snapshot`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/snapshot` | `?from=YYYY-MM-DD&to=YYYY-MM-DD`, both inclusive, at most [`MAX_SNAPSHOT_DAYS`]; optional `entity_id` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use strata_core::{
  event::EntityId,
  maintain::Maintainer,
  resolve::{CalendarSpine, SnapshotRow, snapshot},
  store::LedgerStore,
};

use crate::error::ApiError;

/// Longest date range one request may resolve.
pub const MAX_SNAPSHOT_DAYS: usize = 366;

#[derive(Debug, Deserialize)]
pub struct SnapshotParams {
  pub from:      NaiveDate,
  pub to:        NaiveDate,
  /// Restrict the rows to one entity.
  pub entity_id: Option<String>,
}

/// `GET /snapshot?from=<date>&to=<date>[&entity_id=<id>]`
pub async fn handler<S>(
  State(maintainer): State<Arc<Maintainer<S>>>,
  Query(params): Query<SnapshotParams>,
) -> Result<Json<Vec<SnapshotRow>>, ApiError>
where
  S: LedgerStore + Clone + 'static,
{
  let spine = CalendarSpine::between(params.from, params.to)?;
  if spine.day_count() > MAX_SNAPSHOT_DAYS {
    return Err(ApiError::BadRequest(format!(
      "range covers {} days; at most {MAX_SNAPSHOT_DAYS} allowed",
      spine.day_count()
    )));
  }
  let entity_id = params.entity_id.map(EntityId::new).transpose()?;
  let rows = snapshot(maintainer.store(), &spine, entity_id.as_ref()).await?;
  Ok(Json(rows))
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
  async fn inverted_range_is_400() {
    let m = maintainer().await;
    let (status, body) =
      send(&m, "GET", "/snapshot?from=2025-03-05&to=2025-03-01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("spine"));
  }

  #[tokio::test]
  async fn oversized_range_is_400() {
    let m = maintainer().await;
    let (status, body) =
      send(&m, "GET", "/snapshot?from=0001-01-01&to=9999-12-31", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("at most 366"));

    let (status, _) =
      send(&m, "GET", "/snapshot?from=2024-01-01&to=2024-12-31", None).await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn rows_resolve_status_per_date() {
    let m = maintainer().await;
    let at = |d, h| Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap();
    let a = EntityId::new("A").unwrap();
    let b = EntityId::new("B").unwrap();
    m.store()
      .append_events(vec![
        NewEvent::new(a.clone(), OrderStatus::Pending, at(1, 9)),
        NewEvent::new(a.clone(), OrderStatus::ItemsAdded, at(2, 9)),
        NewEvent::new(b.clone(), OrderStatus::Pending, at(3, 9)),
      ])
      .await
      .unwrap();
    m.rebuild_all().await.unwrap();

    let (status, body) =
      send(&m, "GET", "/snapshot?from=2025-03-01&to=2025-03-03", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<_> = body
      .as_array()
      .unwrap()
      .iter()
      .map(|r| {
        (
          r["entity_id"].as_str().unwrap().to_owned(),
          r["date"].as_str().unwrap().to_owned(),
          r["status"].as_str().unwrap().to_owned(),
        )
      })
      .collect();
    let expected = [
      ("A", "2025-03-01", "pending"),
      ("A", "2025-03-02", "items_added"),
      ("A", "2025-03-03", "items_added"),
      ("B", "2025-03-03", "pending"),
    ]
    .map(|(e, d, s)| (e.to_owned(), d.to_owned(), s.to_owned()));
    assert_eq!(rows, expected);

    let (_, body) = send(
      &m,
      "GET",
      "/snapshot?from=2025-03-01&to=2025-03-03&entity_id=B",
      None,
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
  }
}
