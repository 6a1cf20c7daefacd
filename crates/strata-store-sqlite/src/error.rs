//! Error type for `strata-store-sqlite`.

use strata_core::event::EntityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] strata_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown status in database: {0:?}")]
  UnknownStatus(String),

  /// The entity's intervals changed between planning and applying.
  #[error("intervals for {entity_id} moved: expected head {expected:?}, found {found:?}")]
  HeadMoved {
    entity_id: EntityId,
    expected:  Option<u32>,
    found:     Option<u32>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
