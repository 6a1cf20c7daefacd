//! The `LedgerStore` trait.
//!
//! A backend plays two roles: the append-only event store the ledger is
//! derived from, and the interval store the maintainer writes into. Higher
//! layers (`strata-api`, `strata-cli`) depend on this abstraction, not on any
//! concrete backend.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  event::{EntityId, Event, NewEvent},
  interval::Interval,
  maintain::EntityPlan,
};

/// Abstraction over a ledger backend.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tasks in multi-threaded runtimes.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Events (append-only) ──────────────────────────────────────────────

  /// Persist events, assigning `event_id` and `arrival` in input order.
  fn append_events(
    &self,
    events: Vec<NewEvent>,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  /// All events with `observed_at >= since`, across entities.
  fn events_observed_since(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  /// One entity's events, optionally only those with `observed_at >= since`.
  fn entity_events<'a>(
    &'a self,
    entity_id: &'a EntityId,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + 'a;

  /// Every entity with at least one stored event.
  fn entity_ids(
    &self,
  ) -> impl Future<Output = Result<Vec<EntityId>, Self::Error>> + Send + '_;

  /// One entity's events observed at or before `until` that no interval has
  /// been derived from, whenever they were appended.
  fn unmaterialized_events_until<'a>(
    &'a self,
    entity_id: &'a EntityId,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + 'a;

  // ── Intervals ─────────────────────────────────────────────────────────

  /// The interval with the highest sequence for `entity_id`, open or not.
  fn current_interval<'a>(
    &'a self,
    entity_id: &'a EntityId,
  ) -> impl Future<Output = Result<Option<Interval>, Self::Error>> + Send + 'a;

  /// One entity's intervals ordered by sequence.
  fn entity_intervals<'a>(
    &'a self,
    entity_id: &'a EntityId,
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;

  /// The subset of `candidates` that already have an interval for
  /// `entity_id`.
  fn materialized_event_ids<'a>(
    &'a self,
    entity_id: &'a EntityId,
    candidates: &'a [Uuid],
  ) -> impl Future<Output = Result<HashSet<Uuid>, Self::Error>> + Send + 'a;

  /// Atomically close the plan's predecessor and upsert its new intervals.
  ///
  /// Fails without writing anything if the entity's highest persisted
  /// sequence is no longer `plan.expected_head`.
  fn apply_plan(
    &self,
    plan: EntityPlan,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Atomically replace all of an entity's intervals.
  fn replace_intervals<'a>(
    &'a self,
    entity_id: &'a EntityId,
    intervals: Vec<Interval>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Intervals that may cover any date in `first..=last`, ordered by
  /// `(entity_id, sequence)`, optionally for one entity only.
  fn intervals_overlapping<'a>(
    &'a self,
    first: NaiveDate,
    last: NaiveDate,
    entity_id: Option<&'a EntityId>,
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;
}
