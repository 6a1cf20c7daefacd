//! Intervals and the materializer that derives them from sequenced events.
//!
//! One interval exists per event: it starts when the event was observed and
//! ends when the entity's next event was observed. The latest interval is
//! open (`effective_end` is `None`) and is the entity's current state.
//! Whether an interval is current, and how long it lasted, are always
//! computed from `effective_end` and never stored on their own.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{EntityId, OrderStatus, Payload},
  sequence::SequencedEvent,
};

const SECONDS_PER_HOUR: f64 = 3600.0;

// ─── Interval ────────────────────────────────────────────────────────────────

/// One contiguous period during which an entity held one status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
  pub entity_id:       EntityId,
  pub sequence:        u32,
  /// The event this interval was derived from.
  pub event_id:        Uuid,
  pub status:          OrderStatus,
  pub effective_start: DateTime<Utc>,
  pub effective_end:   Option<DateTime<Utc>>,
  pub payload:         Payload,
}

impl Interval {
  pub fn is_current(&self) -> bool { self.effective_end.is_none() }

  pub fn duration(&self) -> Option<TimeDelta> {
    self.effective_end.map(|end| end - self.effective_start)
  }

  /// Duration in fractional hours; `None` while current.
  pub fn duration_hours(&self) -> Option<f64> {
    self
      .duration()
      .map(|d| d.num_microseconds().unwrap_or(i64::MAX) as f64 / 1e6 / SECONDS_PER_HOUR)
  }

  /// A copy of this interval ended at `end`.
  pub fn closed_at(&self, end: DateTime<Utc>) -> Self {
    Self { effective_end: Some(end), ..self.clone() }
  }

  /// Whether the interval covers calendar date `date` (UTC), closed-open.
  pub fn covers(&self, date: chrono::NaiveDate) -> bool {
    self.effective_start.date_naive() <= date
      && self.effective_end.is_none_or(|end| end.date_naive() > date)
  }
}

/// The wire form of an interval with its derived fields spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
  #[serde(flatten)]
  pub interval:       Interval,
  pub is_current:     bool,
  pub duration_hours: Option<f64>,
}

impl From<Interval> for IntervalRecord {
  fn from(interval: Interval) -> Self {
    Self {
      is_current: interval.is_current(),
      duration_hours: interval.duration_hours(),
      interval,
    }
  }
}

// ─── Materializer ────────────────────────────────────────────────────────────

/// Turn sequenced events into a chained interval list. Each interval ends
/// where the next begins; the last stays open.
pub fn materialize(events: &[SequencedEvent]) -> Result<Vec<Interval>> {
  let mut intervals: Vec<Interval> = Vec::with_capacity(events.len());

  for (i, current) in events.iter().enumerate() {
    let effective_end = events.get(i + 1).map(|next| next.event.observed_at);

    if let Some(end) = effective_end
      && end < current.event.observed_at
    {
      return Err(Error::violation(
        &current.event.entity_id,
        current.sequence,
        "events are not in observed_at order",
      ));
    }

    intervals.push(Interval {
      entity_id: current.event.entity_id.clone(),
      sequence: current.sequence,
      event_id: current.event.event_id,
      status: current.event.status,
      effective_start: current.event.observed_at,
      effective_end,
      payload: current.event.payload.clone(),
    });
  }

  verify_chain(&intervals)?;
  Ok(intervals)
}

// ─── Post-conditions ─────────────────────────────────────────────────────────

/// Check that `intervals` form one unbroken run: consecutive sequences, each
/// end equal to the next start, non-negative durations, and only the final
/// interval open.
pub fn verify_chain(intervals: &[Interval]) -> Result<()> {
  let Some(first) = intervals.first() else {
    return Ok(());
  };

  for (i, interval) in intervals.iter().enumerate() {
    if interval.entity_id != first.entity_id {
      return Err(Error::violation(
        &first.entity_id,
        interval.sequence,
        format!("interval belongs to {}", interval.entity_id),
      ));
    }

    if interval.duration().is_some_and(|d| d < TimeDelta::zero()) {
      return Err(Error::violation(
        &interval.entity_id,
        interval.sequence,
        "negative duration",
      ));
    }

    match intervals.get(i + 1) {
      Some(next) => {
        if next.sequence != interval.sequence + 1 {
          return Err(Error::violation(
            &interval.entity_id,
            next.sequence,
            format!("expected sequence {}", interval.sequence + 1),
          ));
        }
        if interval.effective_end != Some(next.effective_start) {
          return Err(Error::violation(
            &interval.entity_id,
            interval.sequence,
            "end does not meet the next interval's start",
          ));
        }
      }
      None => {
        if !interval.is_current() {
          return Err(Error::violation(
            &interval.entity_id,
            interval.sequence,
            "latest interval is closed",
          ));
        }
      }
    }
  }

  Ok(())
}

/// [`verify_chain`] for an entity's complete history, which must start at
/// sequence 1.
pub fn verify_history(intervals: &[Interval]) -> Result<()> {
  if let Some(first) = intervals.first()
    && first.sequence != 1
  {
    return Err(Error::violation(
      &first.entity_id,
      first.sequence,
      "history does not start at sequence 1",
    ));
  }
  verify_chain(intervals)
}
