//! Sequencer: orders one entity's events and numbers them.
//!
//! Events are ordered by `observed_at`; ties are broken by the store's
//! arrival ordinal, then by `event_id` so the order is total even for events
//! that never touched a store.

use std::collections::BTreeMap;

use crate::{
  Error, Result,
  event::{EntityId, Event},
};

/// An event with its position in the entity's history.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
  /// 1-based position in the entity's event order.
  pub sequence:   u32,
  pub event:      Event,
  /// `true` only for the last event of the sequence.
  pub is_current: bool,
}

/// Sort events into sequencing order in place.
pub fn order(events: &mut [Event]) { events.sort_by_key(Event::order_key); }

/// Sequence a complete history, numbering from 1.
pub fn sequence(events: Vec<Event>) -> Result<Vec<SequencedEvent>> {
  sequence_from(1, events)
}

/// Sequence events that continue an existing history whose next free
/// sequence number is `start`.
pub fn sequence_from(start: u32, mut events: Vec<Event>) -> Result<Vec<SequencedEvent>> {
  if let Some(first) = events.first() {
    let entity_id = first.entity_id.clone();
    if let Some(stray) = events.iter().find(|e| e.entity_id != entity_id) {
      return Err(Error::malformed(
        &entity_id,
        format!("event {} belongs to {}", stray.event_id, stray.entity_id),
      ));
    }
  }

  order(&mut events);
  let last = events.len();
  Ok(
    events
      .into_iter()
      .zip(start..)
      .enumerate()
      .map(|(i, (event, sequence))| SequencedEvent {
        sequence,
        event,
        is_current: i + 1 == last,
      })
      .collect(),
  )
}

/// Group a mixed batch by entity. Each group keeps arrival order; sequencing
/// sorts it.
pub fn partition_by_entity(events: Vec<Event>) -> BTreeMap<EntityId, Vec<Event>> {
  let mut groups: BTreeMap<EntityId, Vec<Event>> = BTreeMap::new();
  for event in events {
    groups.entry(event.entity_id.clone()).or_default().push(event);
  }
  groups
}
