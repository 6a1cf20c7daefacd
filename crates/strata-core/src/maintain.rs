//! Incremental maintenance of the interval table.
//!
//! A maintenance pass reads the events observed inside a trailing lookback
//! window, and for each entity they touch closes the entity's current
//! interval and appends intervals for the new events. The predecessor is
//! always found by `(entity_id, max sequence)` and the entity's events are
//! re-read from that interval's start, so events that fell outside the
//! window are never skipped and an `effective_end` is never computed from the
//! batch alone.

use std::{
  collections::{BTreeMap, HashSet},
  sync::Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::FailureKind,
  event::{EntityId, Event},
  interval::{Interval, materialize, verify_chain, verify_history},
  sequence::{partition_by_entity, sequence, sequence_from},
  store::LedgerStore,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tuning for maintenance passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintainerConfig {
  /// Width of the trailing window, in days, used to pick up new events.
  #[serde(default = "default_lookback_days")]
  pub lookback_days: u32,
  /// Maximum number of entities maintained concurrently.
  #[serde(default = "default_parallelism")]
  pub parallelism:   usize,
}

fn default_lookback_days() -> u32 { 3 }

fn default_parallelism() -> usize { 8 }

impl Default for MaintainerConfig {
  fn default() -> Self {
    Self {
      lookback_days: default_lookback_days(),
      parallelism:   default_parallelism(),
    }
  }
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// The writes needed to bring one entity up to date. Applied atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPlan {
  pub entity_id:     EntityId,
  /// Highest persisted sequence the plan was built against; `None` when the
  /// entity had no intervals.
  pub expected_head: Option<u32>,
  /// The previously current interval, now ended.
  pub close:         Option<Interval>,
  /// New intervals in sequence order; only the last is open.
  pub append:        Vec<Interval>,
}

/// Build the close-and-append plan for `pending` events following `head`.
///
/// Returns `None` when there is nothing to append.
pub fn plan_append(
  entity_id: &EntityId,
  head: Option<&Interval>,
  pending: Vec<Event>,
) -> Result<Option<EntityPlan>> {
  if pending.is_empty() {
    return Ok(None);
  }
  if let Some(stray) = pending.iter().find(|e| &e.entity_id != entity_id) {
    return Err(Error::malformed(
      entity_id,
      format!("event {} belongs to {}", stray.event_id, stray.entity_id),
    ));
  }

  let next = head.map_or(1, |h| h.sequence + 1);
  let sequenced = sequence_from(next, pending)?;
  let append = materialize(&sequenced)?;

  let close = match head {
    Some(head) => {
      if !head.is_current() {
        return Err(Error::violation(entity_id, head.sequence, "latest interval is closed"));
      }
      let first_start = append[0].effective_start;
      if first_start < head.effective_start {
        return Err(Error::malformed(
          entity_id,
          format!(
            "event observed at {first_start} precedes current interval {} starting {}",
            head.sequence, head.effective_start
          ),
        ));
      }
      Some(head.closed_at(first_start))
    }
    None => None,
  };

  let chain: Vec<Interval> = close.iter().chain(&append).cloned().collect();
  if close.is_some() {
    verify_chain(&chain)?;
  } else {
    verify_history(&chain)?;
  }

  Ok(Some(EntityPlan {
    entity_id: entity_id.clone(),
    expected_head: head.map(|h| h.sequence),
    close,
    append,
  }))
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What a maintenance pass did to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntityOutcome {
  /// Every event for the entity was already materialized.
  Unchanged,
  Applied {
    /// Sequence of the interval that was closed, if any.
    closed:   Option<u32>,
    appended: Vec<u32>,
    /// Events outside the batch had to be read to complete the chain.
    widened:  bool,
  },
  /// The entity's intervals were left untouched; retried on the next pass.
  Failed { kind: FailureKind, message: String },
}

/// Summary of one maintenance pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
  pub run_id:       Uuid,
  pub as_of:        DateTime<Utc>,
  pub window_start: DateTime<Utc>,
  pub entities:     BTreeMap<EntityId, EntityOutcome>,
}

impl MaintenanceReport {
  pub fn failures(&self) -> impl Iterator<Item = (&EntityId, &EntityOutcome)> {
    self
      .entities
      .iter()
      .filter(|(_, o)| matches!(o, EntityOutcome::Failed { .. }))
  }

  pub fn applied_count(&self) -> usize {
    self
      .entities
      .values()
      .filter(|o| matches!(o, EntityOutcome::Applied { .. }))
      .count()
  }
}

/// Summary of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
  pub entities:  usize,
  pub intervals: usize,
}

// ─── Maintainer ──────────────────────────────────────────────────────────────

/// Drives maintenance passes and rebuilds against a [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct Maintainer<S> {
  store:  S,
  config: MaintainerConfig,
}

impl<S> Maintainer<S>
where
  S: LedgerStore + Clone + 'static,
{
  pub fn new(store: S, config: MaintainerConfig) -> Self { Self { store, config } }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &MaintainerConfig { &self.config }

  /// Run one pass over the events observed from `lookback_days` before
  /// `as_of` onwards. Events observed after `as_of` are included too.
  ///
  /// Entities are maintained in parallel and independently: a failure is
  /// recorded in the report and leaves that entity's intervals untouched.
  /// Only a failure to read the batch itself aborts the pass.
  pub async fn run(&self, as_of: DateTime<Utc>) -> Result<MaintenanceReport> {
    let run_id = Uuid::new_v4();
    let window_start = as_of - TimeDelta::days(i64::from(self.config.lookback_days));

    let batch = self
      .store
      .events_observed_since(window_start)
      .await
      .map_err(Error::store)?;
    let groups = partition_by_entity(batch);
    info!(%run_id, %window_start, entities = groups.len(), "starting maintenance pass");

    let scheduled: Vec<EntityId> = groups.keys().cloned().collect();
    let permits = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut tasks = JoinSet::new();
    for (entity_id, events) in groups {
      let store = self.store.clone();
      let permits = Arc::clone(&permits);
      tasks.spawn(async move {
        let _permit = permits.acquire_owned().await.ok();
        // A panic while updating one entity must not take the pass down.
        let id = entity_id.clone();
        let outcome =
          match tokio::spawn(async move { maintain_entity(&store, &id, events).await }).await {
            Ok(outcome) => outcome,
            Err(err) => Err(Error::Task(err.to_string())),
          };
        (entity_id, outcome)
      });
    }

    let mut entities = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
      let (entity_id, outcome) = match joined {
        Ok(done) => done,
        Err(err) => {
          warn!(%run_id, error = %err, "maintenance task lost");
          continue;
        }
      };
      let outcome = outcome.unwrap_or_else(|err| {
        warn!(%run_id, entity = %entity_id, error = %err, "entity maintenance failed");
        EntityOutcome::Failed { kind: err.kind(), message: err.to_string() }
      });
      entities.insert(entity_id, outcome);
    }
    for entity_id in scheduled {
      entities.entry(entity_id).or_insert_with(|| EntityOutcome::Failed {
        kind:    FailureKind::Task,
        message: "task ended without reporting".into(),
      });
    }

    let report = MaintenanceReport { run_id, as_of, window_start, entities };
    info!(
      %run_id,
      applied = report.applied_count(),
      failed = report.failures().count(),
      "maintenance pass finished"
    );
    Ok(report)
  }

  /// Re-derive one entity's intervals from its full event history.
  pub async fn rebuild_entity(&self, entity_id: &EntityId) -> Result<Vec<Interval>> {
    let history = self
      .store
      .entity_events(entity_id, None)
      .await
      .map_err(Error::store)?;
    let intervals = materialize(&sequence(history)?)?;
    verify_history(&intervals)?;

    self
      .store
      .replace_intervals(entity_id, intervals.clone())
      .await
      .map_err(Error::store)?;
    debug!(entity = %entity_id, intervals = intervals.len(), "rebuilt entity");
    Ok(intervals)
  }

  /// Re-derive every entity's intervals.
  pub async fn rebuild_all(&self) -> Result<RebuildSummary> {
    let ids = self.store.entity_ids().await.map_err(Error::store)?;
    let mut summary = RebuildSummary::default();
    for entity_id in &ids {
      summary.intervals += self.rebuild_entity(entity_id).await?.len();
      summary.entities += 1;
    }
    info!(entities = summary.entities, intervals = summary.intervals, "rebuild finished");
    Ok(summary)
  }
}

/// Bring one entity's intervals up to date with its events.
async fn maintain_entity<S: LedgerStore>(
  store: &S,
  entity_id: &EntityId,
  batch: Vec<Event>,
) -> Result<EntityOutcome> {
  let head = store
    .current_interval(entity_id)
    .await
    .map_err(Error::store)?;

  // Read from the predecessor's start, not from the window.
  let history = store
    .entity_events(entity_id, head.as_ref().map(|h| h.effective_start))
    .await
    .map_err(Error::store)?;

  let mut candidates: Vec<Uuid> = history.iter().map(|e| e.event_id).collect();
  candidates.extend(batch.iter().map(|e| e.event_id));
  candidates.sort_unstable();
  candidates.dedup();
  let known = store
    .materialized_event_ids(entity_id, &candidates)
    .await
    .map_err(Error::store)?;

  if let Some(head) = &head {
    let Some(anchor) = history.iter().find(|e| e.event_id == head.event_id) else {
      return Err(Error::WindowCoverageGap {
        entity_id: entity_id.clone(),
        detail:    format!(
          "event {} behind current interval {} not found from {}",
          head.event_id, head.sequence, head.effective_start
        ),
      });
    };

    // Unmaterialized events behind the anchor may sit outside both the
    // window and the widened read.
    let behind = store
      .unmaterialized_events_until(entity_id, anchor.observed_at)
      .await
      .map_err(Error::store)?;

    let anchor_key = anchor.order_key();
    if let Some(late) = behind
      .iter()
      .chain(&history)
      .chain(&batch)
      .find(|e| !known.contains(&e.event_id) && e.order_key() < anchor_key)
    {
      return Err(Error::malformed(
        entity_id,
        format!(
          "event {} observed at {} sorts before current interval {} starting {}",
          late.event_id, late.observed_at, head.sequence, head.effective_start
        ),
      ));
    }
  }

  let pending: Vec<Event> = history
    .into_iter()
    .filter(|e| !known.contains(&e.event_id))
    .collect();

  let pending_ids: HashSet<Uuid> = pending.iter().map(|e| e.event_id).collect();
  if let Some(missing) = batch
    .iter()
    .find(|e| !known.contains(&e.event_id) && !pending_ids.contains(&e.event_id))
  {
    return Err(Error::WindowCoverageGap {
      entity_id: entity_id.clone(),
      detail:    format!("event {} missing from the entity's history", missing.event_id),
    });
  }

  let batch_ids: HashSet<Uuid> = batch.iter().map(|e| e.event_id).collect();
  let widened = pending.iter().any(|e| !batch_ids.contains(&e.event_id));

  let Some(plan) = plan_append(entity_id, head.as_ref(), pending)? else {
    debug!(entity = %entity_id, "already up to date");
    return Ok(EntityOutcome::Unchanged);
  };

  let closed = plan.close.as_ref().map(|c| c.sequence);
  let appended: Vec<u32> = plan.append.iter().map(|i| i.sequence).collect();
  store.apply_plan(plan).await.map_err(Error::store)?;

  debug!(entity = %entity_id, ?closed, ?appended, widened, "applied plan");
  Ok(EntityOutcome::Applied { closed, appended, widened })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use proptest::prelude::*;

  use super::*;
  use crate::event::{OrderStatus, Payload};

  fn at(day: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, h, 0, 0).unwrap()
  }

  fn id() -> EntityId { EntityId::new("ORD-1").unwrap() }

  fn ev(status: OrderStatus, observed_at: DateTime<Utc>, arrival: i64) -> Event {
    Event {
      event_id: Uuid::new_v4(),
      entity_id: id(),
      status,
      observed_at,
      payload: Payload::default(),
      arrival,
    }
  }

  fn full(events: Vec<Event>) -> Vec<Interval> {
    materialize(&sequence(events).unwrap()).unwrap()
  }

  #[test]
  fn first_plan_starts_history() {
    let plan = plan_append(&id(), None, vec![
      ev(OrderStatus::ItemsAdded, at(2, 0), 2),
      ev(OrderStatus::Pending, at(1, 0), 1),
    ])
    .unwrap()
    .unwrap();

    assert_eq!(plan.expected_head, None);
    assert!(plan.close.is_none());
    assert_eq!(plan.append.len(), 2);
    assert_eq!(plan.append[0].sequence, 1);
    assert_eq!(plan.append[0].effective_end, Some(at(2, 0)));
    assert!(plan.append[1].is_current());
  }

  #[test]
  fn plan_closes_head_and_appends() {
    let (t0, t1, t2, t3) = (at(1, 0), at(1, 6), at(2, 0), at(5, 12));
    let existing = full(vec![
      ev(OrderStatus::Pending, t0, 1),
      ev(OrderStatus::ItemsAdded, t1, 2),
      ev(OrderStatus::Completed, t2, 3),
    ]);

    let plan = plan_append(&id(), existing.last(), vec![ev(OrderStatus::Cancelled, t3, 4)])
      .unwrap()
      .unwrap();

    assert_eq!(plan.expected_head, Some(3));
    let closed = plan.close.unwrap();
    assert_eq!(closed.sequence, 3);
    assert_eq!(closed.status, OrderStatus::Completed);
    assert_eq!(closed.effective_end, Some(t3));
    assert_eq!(closed.duration(), Some(t3 - t2));
    assert!(!closed.is_current());

    assert_eq!(plan.append.len(), 1);
    let new = &plan.append[0];
    assert_eq!((new.sequence, new.status), (4, OrderStatus::Cancelled));
    assert_eq!(new.effective_start, t3);
    assert!(new.is_current());
  }

  #[test]
  fn nothing_pending_is_no_plan() {
    let existing = full(vec![ev(OrderStatus::Pending, at(1, 0), 1)]);
    assert!(plan_append(&id(), existing.last(), vec![]).unwrap().is_none());
  }

  #[test]
  fn event_before_head_is_rejected() {
    let existing = full(vec![ev(OrderStatus::Completed, at(3, 0), 1)]);
    let err = plan_append(&id(), existing.last(), vec![ev(OrderStatus::Pending, at(2, 0), 2)])
      .unwrap_err();
    assert!(matches!(err, Error::MalformedEvent { .. }));
  }

  #[test]
  fn closed_head_is_a_violation() {
    let mut existing = full(vec![ev(OrderStatus::Pending, at(1, 0), 1)]);
    existing[0].effective_end = Some(at(1, 5));
    let err = plan_append(&id(), existing.last(), vec![ev(OrderStatus::Completed, at(2, 0), 2)])
      .unwrap_err();
    assert!(matches!(err, Error::NonOverlapViolation { .. }));
  }

  #[test]
  fn foreign_event_is_rejected() {
    let mut other = ev(OrderStatus::Pending, at(1, 0), 1);
    other.entity_id = EntityId::new("ORD-2").unwrap();
    assert!(plan_append(&id(), None, vec![other]).is_err());
  }

  #[test]
  fn config_defaults_apply_to_partial_input() {
    let cfg: MaintainerConfig = serde_json::from_str(r#"{"lookback_days":7}"#).unwrap();
    assert_eq!(cfg.lookback_days, 7);
    assert_eq!(cfg.parallelism, MaintainerConfig::default().parallelism);
  }

  proptest! {
    /// Applying a plan on top of a prefix equals materializing everything.
    #[test]
    fn incremental_equals_full(
      offsets in proptest::collection::vec(0i64..200_000, 1..30),
      split in 0usize..30,
    ) {
      let mut events: Vec<Event> = offsets
        .iter()
        .enumerate()
        .map(|(i, secs)| ev(OrderStatus::Pending, at(1, 0) + TimeDelta::seconds(*secs), i as i64))
        .collect();
      crate::sequence::order(&mut events);
      let split = split.min(events.len());
      let later = events.split_off(split);

      let expected = full(events.iter().cloned().chain(later.iter().cloned()).collect());

      let mut persisted = full(events);
      if let Some(plan) = plan_append(&id(), persisted.last(), later).unwrap() {
        if let Some(closed) = plan.close {
          let last = persisted.len() - 1;
          persisted[last] = closed;
        }
        persisted.extend(plan.append);
      }

      prop_assert_eq!(persisted, expected);
    }
  }
}
