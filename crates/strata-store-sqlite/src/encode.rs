//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so that SQL text
//! comparison matches chronological order. Payloads are compact JSON. UUIDs
//! are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use strata_core::{
  event::{EntityId, Event, OrderStatus, Payload},
  interval::Interval,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Status ──────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<OrderStatus> {
  OrderStatus::parse(s).ok_or_else(|| Error::UnknownStatus(s.to_owned()))
}

// ─── Payload ─────────────────────────────────────────────────────────────────

pub fn encode_payload(p: &Payload) -> Result<String> { Ok(serde_json::to_string(p)?) }

pub fn decode_payload(s: &str) -> Result<Payload> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const EVENT_COLUMNS: &str =
  "arrival, event_id, entity_id, status, observed_at, payload_json";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub arrival:      i64,
  pub event_id:     String,
  pub entity_id:    String,
  pub status:       String,
  pub observed_at:  String,
  pub payload_json: String,
}

impl RawEvent {
  /// Map a row selected with [`EVENT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      arrival:      row.get(0)?,
      event_id:     row.get(1)?,
      entity_id:    row.get(2)?,
      status:       row.get(3)?,
      observed_at:  row.get(4)?,
      payload_json: row.get(5)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:    decode_uuid(&self.event_id)?,
      entity_id:   EntityId::new(self.entity_id)?,
      status:      decode_status(&self.status)?,
      observed_at: decode_dt(&self.observed_at)?,
      payload:     decode_payload(&self.payload_json)?,
      arrival:     self.arrival,
    })
  }
}

pub const INTERVAL_COLUMNS: &str =
  "entity_id, sequence, event_id, status, effective_start, effective_end, payload_json";

/// Raw values read directly from an `intervals` row.
pub struct RawInterval {
  pub entity_id:       String,
  pub sequence:        u32,
  pub event_id:        String,
  pub status:          String,
  pub effective_start: String,
  pub effective_end:   Option<String>,
  pub payload_json:    String,
}

impl RawInterval {
  /// Map a row selected with [`INTERVAL_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:       row.get(0)?,
      sequence:        row.get(1)?,
      event_id:        row.get(2)?,
      status:          row.get(3)?,
      effective_start: row.get(4)?,
      effective_end:   row.get(5)?,
      payload_json:    row.get(6)?,
    })
  }

  pub fn into_interval(self) -> Result<Interval> {
    Ok(Interval {
      entity_id:       EntityId::new(self.entity_id)?,
      sequence:        self.sequence,
      event_id:        decode_uuid(&self.event_id)?,
      status:          decode_status(&self.status)?,
      effective_start: decode_dt(&self.effective_start)?,
      effective_end:   self.effective_end.as_deref().map(decode_dt).transpose()?,
      payload:         decode_payload(&self.payload_json)?,
    })
  }
}

/// Column values for writing one interval.
pub struct IntervalParams {
  pub entity_id:       String,
  pub sequence:        u32,
  pub event_id:        String,
  pub status:          &'static str,
  pub effective_start: String,
  pub effective_end:   Option<String>,
  pub duration_hours:  Option<f64>,
  pub payload_json:    String,
}

impl IntervalParams {
  pub fn encode(interval: &Interval) -> Result<Self> {
    Ok(Self {
      entity_id:       interval.entity_id.as_str().to_owned(),
      sequence:        interval.sequence,
      event_id:        encode_uuid(interval.event_id),
      status:          interval.status.as_str(),
      effective_start: encode_dt(interval.effective_start),
      effective_end:   interval.effective_end.map(encode_dt),
      duration_hours:  interval.duration_hours(),
      payload_json:    encode_payload(&interval.payload)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let a = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::TimeDelta::microseconds(1500);
    let c = a + chrono::TimeDelta::hours(30);
    let encoded = [encode_dt(a), encode_dt(b), encode_dt(c)];
    assert!(encoded[0] < encoded[1] && encoded[1] < encoded[2]);
    assert_eq!(encoded[0], "2025-01-01T09:00:00.000000Z");
    assert_eq!(decode_dt(&encoded[1]).unwrap(), b);
  }

  #[test]
  fn bad_values_are_rejected() {
    assert!(decode_dt("yesterday").is_err());
    assert!(matches!(decode_status("shipped"), Err(Error::UnknownStatus(_))));
  }
}
