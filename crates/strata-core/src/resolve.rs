//! Point-in-time resolution: the state of every entity on every date of a
//! calendar spine.
//!
//! An interval covers date `D` when it started on or before `D` and had not
//! ended by the start of `D + 1` (closed-open on UTC calendar dates). Because
//! an entity's intervals are contiguous, exactly one of them covers each date
//! from the entity's first event onwards; an interval that starts and ends on
//! the same date covers nothing, so the last status of a day wins.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  event::{EntityId, OrderStatus, Payload},
  interval::Interval,
  store::LedgerStore,
};

// ─── Spine ───────────────────────────────────────────────────────────────────

/// A contiguous, non-empty run of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarSpine {
  first: NaiveDate,
  last:  NaiveDate,
}

impl CalendarSpine {
  /// Every date from `first` to `last`, inclusive.
  pub fn between(first: NaiveDate, last: NaiveDate) -> Result<Self> {
    if last < first {
      return Err(Error::InvalidSpine(format!("{last} is before {first}")));
    }
    Ok(Self { first, last })
  }

  /// Validate an externally supplied list of dates.
  pub fn from_dates(dates: &[NaiveDate]) -> Result<Self> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
      return Err(Error::InvalidSpine("no dates".into()));
    };
    for pair in dates.windows(2) {
      if pair[0].succ_opt() != Some(pair[1]) {
        return Err(Error::InvalidSpine(format!(
          "{} is not followed by the next day (found {})",
          pair[0], pair[1]
        )));
      }
    }
    Ok(Self { first, last })
  }

  pub fn first(&self) -> NaiveDate { self.first }

  pub fn last(&self) -> NaiveDate { self.last }

  /// Number of dates in the spine; never zero.
  pub fn day_count(&self) -> usize { ((self.last - self.first).num_days() + 1) as usize }

  pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
    let last = self.last;
    self.first.iter_days().take_while(move |d| *d <= last)
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// An entity's state on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
  pub entity_id: EntityId,
  pub date:      NaiveDate,
  pub status:    OrderStatus,
  /// Sequence of the covering interval.
  pub sequence:  u32,
  pub payload:   Payload,
}

/// Intersect `spine` with `intervals`, producing one row per covered
/// `(entity, date)` ordered by entity then date.
pub fn resolve(spine: &CalendarSpine, intervals: &[Interval]) -> Result<Vec<SnapshotRow>> {
  let mut by_entity: BTreeMap<&EntityId, Vec<&Interval>> = BTreeMap::new();
  for interval in intervals {
    by_entity.entry(&interval.entity_id).or_default().push(interval);
  }

  let mut rows = Vec::new();
  for (entity_id, mut chain) in by_entity {
    chain.sort_by_key(|i| i.sequence);

    let mut idx = 0;
    for date in spine.dates() {
      while chain
        .get(idx)
        .and_then(|i| i.effective_end)
        .is_some_and(|end| end.date_naive() <= date)
      {
        idx += 1;
      }
      let Some(interval) = chain.get(idx) else {
        break;
      };
      if !interval.covers(date) {
        continue;
      }
      if let Some(next) = chain.get(idx + 1)
        && next.covers(date)
      {
        return Err(Error::violation(
          entity_id,
          next.sequence,
          format!("overlaps interval {} on {date}", interval.sequence),
        ));
      }

      rows.push(SnapshotRow {
        entity_id: entity_id.clone(),
        date,
        status: interval.status,
        sequence: interval.sequence,
        payload: interval.payload.clone(),
      });
    }
  }

  Ok(rows)
}

/// Resolve `spine` against the intervals a store holds for that range,
/// optionally for one entity only.
pub async fn snapshot<S: LedgerStore>(
  store: &S,
  spine: &CalendarSpine,
  entity_id: Option<&EntityId>,
) -> Result<Vec<SnapshotRow>> {
  let intervals = store
    .intervals_overlapping(spine.first(), spine.last(), entity_id)
    .await
    .map_err(Error::store)?;
  resolve(spine, &intervals)
}

/// The instants `(start, end)` that bound the intervals able to cover a date
/// in `first..=last`: those starting before `end` and not ended before
/// `start`.
pub fn overlap_bounds(
  first: NaiveDate,
  last: NaiveDate,
) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
  let day_after = |d: NaiveDate| (d + TimeDelta::days(1)).and_time(chrono::NaiveTime::MIN).and_utc();
  (day_after(first), day_after(last))
}
