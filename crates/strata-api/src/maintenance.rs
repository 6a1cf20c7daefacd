//! Handler for `/maintenance`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/maintenance` | Runs one pass; optional `?as_of=<RFC 3339>` (defaults to now) |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use strata_core::{
  maintain::{MaintenanceReport, Maintainer},
  store::LedgerStore,
};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RunParams {
  /// End of the lookback window. Defaults to now.
  pub as_of: Option<DateTime<Utc>>,
}

/// `POST /maintenance[?as_of=<timestamp>]`
///
/// Per-entity failures are reported in the body; the response is still 200.
pub async fn run<S>(
  State(maintainer): State<Arc<Maintainer<S>>>,
  Query(params): Query<RunParams>,
) -> Result<Json<MaintenanceReport>, ApiError>
where
  S: LedgerStore + Clone + 'static,
{
  let as_of = params.as_of.unwrap_or_else(Utc::now);
  let report = maintainer.run(as_of).await?;
  Ok(Json(report))
}

#[cfg(test)]
mod tests {
  use axum::http::StatusCode;
  use serde_json::json;

  use crate::test_util::{maintainer, send};

  #[tokio::test]
  async fn pass_materializes_and_reports() {
    let m = maintainer().await;
    send(
      &m,
      "POST",
      "/events",
      Some(json!([
        { "entity_id": "ORD-1", "observed_status": "pending", "observed_at": "2025-03-01T09:00:00Z" },
        { "entity_id": "ORD-1", "observed_status": "cancelled", "observed_at": "2025-03-01T10:30:00Z" }
      ])),
    )
    .await;

    let (status, report) =
      send(&m, "POST", "/maintenance?as_of=2025-03-02T00:00:00Z", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["window_start"], "2025-02-27T00:00:00Z");
    assert_eq!(report["entities"]["ORD-1"]["outcome"], "applied");
    assert_eq!(report["entities"]["ORD-1"]["appended"], json!([1, 2]));

    let (_, report) =
      send(&m, "POST", "/maintenance?as_of=2025-03-02T00:00:00Z", None).await;
    assert_eq!(report["entities"]["ORD-1"]["outcome"], "unchanged");

    let (_, history) = send(&m, "GET", "/entities/ORD-1/intervals", None).await;
    assert_eq!(history[0]["duration_hours"], 1.5);
  }
}
