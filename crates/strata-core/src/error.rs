//! Error types for `strata-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EntityId;

#[derive(Debug, Error)]
pub enum Error {
  /// An event is missing a required field, carries an unknown status, or
  /// cannot be appended after the entity's current interval.
  #[error(
    "malformed event for {}: {reason}",
    .entity_id.as_ref().map_or("<unknown entity>", EntityId::as_str)
  )]
  MalformedEvent {
    entity_id: Option<EntityId>,
    reason:    String,
  },

  /// The interval preceding a new event could not be located, even after
  /// reading the entity's history past the lookback window.
  #[error("window coverage gap for {entity_id}: {detail}")]
  WindowCoverageGap { entity_id: EntityId, detail: String },

  /// A materialized interval chain broke one of its invariants. Never
  /// repaired.
  #[error("interval invariant violated for {entity_id} at sequence {sequence}: {detail}")]
  NonOverlapViolation {
    entity_id: EntityId,
    sequence:  u32,
    detail:    String,
  },

  #[error("invalid calendar spine: {0}")]
  InvalidSpine(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The task updating an entity panicked or was cancelled.
  #[error("entity task failed: {0}")]
  Task(String),
}

impl Error {
  pub fn malformed(entity_id: &EntityId, reason: impl Into<String>) -> Self {
    Self::MalformedEvent {
      entity_id: Some(entity_id.clone()),
      reason:    reason.into(),
    }
  }

  pub(crate) fn violation(
    entity_id: &EntityId,
    sequence: u32,
    detail: impl Into<String>,
  ) -> Self {
    Self::NonOverlapViolation {
      entity_id: entity_id.clone(),
      sequence,
      detail: detail.into(),
    }
  }

  /// Wrap a backend error.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  pub fn kind(&self) -> FailureKind {
    match self {
      Self::MalformedEvent { .. } => FailureKind::MalformedEvent,
      Self::WindowCoverageGap { .. } => FailureKind::WindowCoverageGap,
      Self::NonOverlapViolation { .. } => FailureKind::NonOverlapViolation,
      Self::InvalidSpine(_) => FailureKind::InvalidSpine,
      Self::Store(_) | Self::Serialization(_) => FailureKind::Store,
      Self::Task(_) => FailureKind::Task,
    }
  }
}

/// Serializable classification of an [`Error`], used in maintenance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  MalformedEvent,
  WindowCoverageGap,
  NonOverlapViolation,
  InvalidSpine,
  Store,
  Task,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
