//! Events: the immutable raw observations the ledger is derived from.
//!
//! An event records that an entity (an order) was observed in a status at a
//! point in time. Events are appended once and never updated; every interval
//! in the ledger can be re-derived from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Entity ──────────────────────────────────────────────────────────────────

/// Identifier of a tracked entity, e.g. `20250101-120000-000001`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
  /// Build an id, rejecting empty or whitespace-only strings.
  pub fn new(id: impl Into<String>) -> Result<Self> {
    let id = id.into();
    if id.trim().is_empty() {
      return Err(Error::MalformedEvent {
        entity_id: None,
        reason:    "entity_id is empty".into(),
      });
    }
    Ok(Self(id))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// The order lifecycle vocabulary.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  ItemsAdded,
  Completed,
  Cancelled,
  Refunded,
}

impl OrderStatus {
  /// The string stored in `status` columns. Must match the serde names.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::ItemsAdded => "items_added",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
      Self::Refunded => "refunded",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pending" => Some(Self::Pending),
      "items_added" => Some(Self::ItemsAdded),
      "completed" => Some(Self::Completed),
      "cancelled" => Some(Self::Cancelled),
      "refunded" => Some(Self::Refunded),
      _ => None,
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// Values observed alongside the status (amounts, customer, aggregates).
/// Carried verbatim from the event onto its interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(pub serde_json::Map<String, serde_json::Value>);

impl Payload {
  pub fn get(&self, key: &str) -> Option<&serde_json::Value> { self.0.get(key) }

  pub fn with(
    mut self,
    key: impl Into<String>,
    value: impl Into<serde_json::Value>,
  ) -> Self {
    self.0.insert(key.into(), value.into());
    self
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A stored observation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  /// Store-assigned identity.
  pub event_id:    Uuid,
  pub entity_id:   EntityId,
  pub status:      OrderStatus,
  pub observed_at: DateTime<Utc>,
  pub payload:     Payload,
  /// Store-assigned insertion ordinal. Breaks ties between events of one
  /// entity observed at the same instant.
  pub arrival:     i64,
}

impl Event {
  /// Total order used when sequencing one entity's events.
  pub fn order_key(&self) -> (DateTime<Utc>, i64, Uuid) {
    (self.observed_at, self.arrival, self.event_id)
  }
}

/// Input to [`crate::store::LedgerStore::append_events`]. `event_id` and
/// `arrival` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
  pub entity_id:   EntityId,
  pub status:      OrderStatus,
  pub observed_at: DateTime<Utc>,
  pub payload:     Payload,
}

impl NewEvent {
  pub fn new(
    entity_id: EntityId,
    status: OrderStatus,
    observed_at: DateTime<Utc>,
  ) -> Self {
    Self { entity_id, status, observed_at, payload: Payload::default() }
  }
}

// ─── RawEvent ────────────────────────────────────────────────────────────────

/// The unvalidated shape delivered by upstream sources. Every field may be
/// missing; [`NewEvent::try_from`] reports what is wrong.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEvent {
  pub entity_id:       Option<String>,
  pub observed_status: Option<String>,
  pub observed_at:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub payload:         Payload,
}

impl TryFrom<RawEvent> for NewEvent {
  type Error = Error;

  fn try_from(raw: RawEvent) -> Result<Self> {
    let entity_id = match raw.entity_id {
      Some(id) => EntityId::new(id)?,
      None => {
        return Err(Error::MalformedEvent {
          entity_id: None,
          reason:    "missing entity_id".into(),
        });
      }
    };

    let status_str = raw
      .observed_status
      .ok_or_else(|| Error::malformed(&entity_id, "missing observed_status"))?;
    let status = OrderStatus::parse(&status_str).ok_or_else(|| {
      Error::malformed(&entity_id, format!("unknown status {status_str:?}"))
    })?;

    let observed_at = raw
      .observed_at
      .ok_or_else(|| Error::malformed(&entity_id, "missing observed_at"))?;

    Ok(Self { entity_id, status, observed_at, payload: raw.payload })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn raw(id: Option<&str>, status: Option<&str>) -> RawEvent {
    RawEvent {
      entity_id:       id.map(str::to_owned),
      observed_status: status.map(str::to_owned),
      observed_at:     Some(Utc::now()),
      payload:         Payload::default(),
    }
  }

  #[test]
  fn valid_raw_event_converts() {
    let ev = NewEvent::try_from(raw(Some("ORD-1"), Some("items_added"))).unwrap();
    assert_eq!(ev.entity_id.as_str(), "ORD-1");
    assert_eq!(ev.status, OrderStatus::ItemsAdded);
  }

  #[test]
  fn missing_fields_are_malformed() {
    let err = NewEvent::try_from(raw(None, Some("pending"))).unwrap_err();
    assert!(matches!(err, Error::MalformedEvent { entity_id: None, .. }));

    let err = NewEvent::try_from(raw(Some("ORD-1"), None)).unwrap_err();
    assert!(matches!(err, Error::MalformedEvent { entity_id: Some(_), .. }));

    let mut missing_time = raw(Some("ORD-1"), Some("pending"));
    missing_time.observed_at = None;
    assert!(NewEvent::try_from(missing_time).is_err());
  }

  #[test]
  fn empty_entity_id_rejected() {
    let err = NewEvent::try_from(raw(Some("  "), Some("pending"))).unwrap_err();
    assert!(matches!(err, Error::MalformedEvent { .. }));
  }

  #[test]
  fn unknown_status_rejected() {
    let err = NewEvent::try_from(raw(Some("ORD-1"), Some("shipped"))).unwrap_err();
    assert!(err.to_string().contains("shipped"));
  }

  #[test]
  fn status_names_match_serde() {
    for s in [
      OrderStatus::Pending,
      OrderStatus::ItemsAdded,
      OrderStatus::Completed,
      OrderStatus::Cancelled,
      OrderStatus::Refunded,
    ] {
      let json = serde_json::to_value(s).unwrap();
      assert_eq!(json.as_str(), Some(s.as_str()));
      assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
    }
  }

  #[test]
  fn raw_event_deserializes_from_json() {
    let raw: RawEvent = serde_json::from_str(
      r#"{"entity_id":"ORD-9","observed_status":"pending",
          "observed_at":"2025-01-01T10:00:00Z",
          "payload":{"total_amount":"42.50","customer_id":7}}"#,
    )
    .unwrap();
    let ev = NewEvent::try_from(raw).unwrap();
    assert_eq!(ev.payload.get("customer_id"), Some(&serde_json::json!(7)));
  }
}
