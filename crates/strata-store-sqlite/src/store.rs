//! [`SqliteStore`], the SQLite implementation of [`LedgerStore`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, NaiveDate, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use strata_core::{
  event::{EntityId, Event, NewEvent},
  interval::Interval,
  maintain::EntityPlan,
  resolve::overlap_bounds,
  store::LedgerStore,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, INTERVAL_COLUMNS, IntervalParams, RawEvent, RawInterval, decode_uuid,
    encode_dt, encode_payload, encode_uuid,
  },
  schema::SCHEMA,
};

const UPSERT_INTERVAL: &str = "
  INSERT INTO intervals (
    entity_id, sequence, event_id, status, effective_start,
    effective_end, duration_hours, payload_json, materialized_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
  ON CONFLICT (entity_id, sequence) DO UPDATE SET
    event_id        = excluded.event_id,
    status          = excluded.status,
    effective_start = excluded.effective_start,
    effective_end   = excluded.effective_end,
    duration_hours  = excluded.duration_hours,
    payload_json    = excluded.payload_json,
    materialized_at = excluded.materialized_at";

fn upsert_interval(
  tx: &rusqlite::Transaction<'_>,
  p: &IntervalParams,
  materialized_at: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    UPSERT_INTERVAL,
    rusqlite::params![
      p.entity_id,
      p.sequence,
      p.event_id,
      p.status,
      p.effective_start,
      p.effective_end,
      p.duration_hours,
      p.payload_json,
      materialized_at,
    ],
  )?;
  Ok(())
}

fn max_sequence(conn: &rusqlite::Connection, entity_id: &str) -> rusqlite::Result<Option<u32>> {
  conn.query_row(
    "SELECT MAX(sequence) FROM intervals WHERE entity_id = ?1",
    rusqlite::params![entity_id],
    |r| r.get(0),
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strata ledger backed by a single SQLite file.
///
/// Clones share one reference-counted connection. All calls
/// are serialised on the connection's thread, and every multi-statement
/// write runs in one transaction, so readers only ever observe an entity
/// before or after a complete update.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a fresh store that lives only as long as the connection.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run an event query with the given `WHERE` clause and parameters.
  async fn select_events(
    &self,
    where_clause: &'static str,
    params: Vec<String>,
  ) -> Result<Vec<Event>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {EVENT_COLUMNS} FROM events WHERE {where_clause}
           ORDER BY entity_id, observed_at, arrival"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  /// Run an interval query with the given `WHERE` clause and parameters.
  async fn select_intervals(
    &self,
    where_clause: &'static str,
    params: Vec<String>,
  ) -> Result<Vec<Interval>> {
    let raws: Vec<RawInterval> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {INTERVAL_COLUMNS} FROM intervals WHERE {where_clause}
           ORDER BY entity_id, sequence"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawInterval::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawInterval::into_interval).collect()
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  // ── Events ────────────────────────────────────────────────────────────────

  async fn append_events(&self, events: Vec<NewEvent>) -> Result<Vec<Event>> {
    let ingested_at = encode_dt(Utc::now());
    let prepared = events
      .into_iter()
      .map(|e| {
        // Stored precision is microseconds; hand back exactly what was stored.
        let observed_at = e.observed_at.trunc_subsecs(6);
        let payload_json = encode_payload(&e.payload)?;
        Ok((Uuid::new_v4(), e, observed_at, payload_json))
      })
      .collect::<Result<Vec<_>>>()?;

    let rows: Vec<(Uuid, NewEvent, DateTime<Utc>, i64)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut out = Vec::with_capacity(prepared.len());
        {
          let mut stmt = tx.prepare(
            "INSERT INTO events (event_id, entity_id, status, observed_at, payload_json, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for (event_id, event, observed_at, payload_json) in prepared {
            stmt.execute(rusqlite::params![
              encode_uuid(event_id),
              event.entity_id.as_str(),
              event.status.as_str(),
              encode_dt(observed_at),
              payload_json,
              ingested_at,
            ])?;
            out.push((event_id, event, observed_at, tx.last_insert_rowid()));
          }
        }
        tx.commit()?;
        Ok(out)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|(event_id, e, observed_at, arrival)| Event {
          event_id,
          entity_id: e.entity_id,
          status: e.status,
          observed_at,
          payload: e.payload,
          arrival,
        })
        .collect(),
    )
  }

  async fn events_observed_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>> {
    self.select_events("observed_at >= ?1", vec![encode_dt(since)]).await
  }

  async fn entity_events(
    &self,
    entity_id: &EntityId,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<Event>> {
    let id = entity_id.as_str().to_owned();
    match since {
      Some(since) => {
        self
          .select_events("entity_id = ?1 AND observed_at >= ?2", vec![id, encode_dt(since)])
          .await
      }
      None => self.select_events("entity_id = ?1", vec![id]).await,
    }
  }

  async fn entity_ids(&self) -> Result<Vec<EntityId>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT entity_id FROM events ORDER BY entity_id")?;
        let rows = stmt
          .query_map([], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(ids.into_iter().map(EntityId::new).collect::<strata_core::Result<_>>()?)
  }

  async fn unmaterialized_events_until(
    &self,
    entity_id: &EntityId,
    until: DateTime<Utc>,
  ) -> Result<Vec<Event>> {
    self
      .select_events(
        "entity_id = ?1 AND observed_at <= ?2
         AND NOT EXISTS (SELECT 1 FROM intervals i WHERE i.event_id = events.event_id)",
        vec![entity_id.as_str().to_owned(), encode_dt(until)],
      )
      .await
  }

  // ── Intervals ─────────────────────────────────────────────────────────────

  async fn current_interval(&self, entity_id: &EntityId) -> Result<Option<Interval>> {
    let id = entity_id.as_str().to_owned();

    let raw: Option<RawInterval> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {INTERVAL_COLUMNS} FROM intervals
           WHERE entity_id = ?1 ORDER BY sequence DESC LIMIT 1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], RawInterval::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawInterval::into_interval).transpose()
  }

  async fn entity_intervals(&self, entity_id: &EntityId) -> Result<Vec<Interval>> {
    self
      .select_intervals("entity_id = ?1", vec![entity_id.as_str().to_owned()])
      .await
  }

  async fn materialized_event_ids(
    &self,
    entity_id: &EntityId,
    candidates: &[Uuid],
  ) -> Result<HashSet<Uuid>> {
    let id = entity_id.as_str().to_owned();
    let wanted: HashSet<String> = candidates.iter().copied().map(encode_uuid).collect();

    // An entity's intervals are one per event, so scanning its event ids is
    // bounded by the entity's history rather than the table.
    let found: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT event_id FROM intervals WHERE entity_id = ?1")?;
        let rows = stmt
          .query_map(rusqlite::params![id], |r| r.get::<_, String>(0))?
          .filter(|r| r.as_ref().map_or(true, |s| wanted.contains(s)))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    found.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn apply_plan(&self, plan: EntityPlan) -> Result<()> {
    let entity = plan.entity_id.clone();
    let id = entity.as_str().to_owned();
    let expected = plan.expected_head;
    let close = plan.close.as_ref().map(IntervalParams::encode).transpose()?;
    let append = plan
      .append
      .iter()
      .map(IntervalParams::encode)
      .collect::<Result<Vec<_>>>()?;
    let materialized_at = encode_dt(Utc::now());

    let found: Option<Option<u32>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let head = max_sequence(&tx, &id)?;
        if head != expected {
          // Dropping the transaction rolls it back.
          return Ok(Some(head));
        }

        if let Some(close) = &close {
          tx.execute(
            "UPDATE intervals SET effective_end = ?3, duration_hours = ?4, materialized_at = ?5
             WHERE entity_id = ?1 AND sequence = ?2 AND effective_end IS NULL",
            rusqlite::params![
              close.entity_id,
              close.sequence,
              close.effective_end,
              close.duration_hours,
              materialized_at,
            ],
          )?;
        }
        for p in &append {
          upsert_interval(&tx, p, &materialized_at)?;
        }

        tx.commit()?;
        Ok(None)
      })
      .await?;

    if let Some(found) = found {
      return Err(Error::HeadMoved { entity_id: entity, expected, found });
    }
    debug!(entity = %plan.entity_id, appended = plan.append.len(), "plan committed");
    Ok(())
  }

  async fn replace_intervals(&self, entity_id: &EntityId, intervals: Vec<Interval>) -> Result<()> {
    let id = entity_id.as_str().to_owned();
    let params = intervals
      .iter()
      .map(IntervalParams::encode)
      .collect::<Result<Vec<_>>>()?;
    let materialized_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM intervals WHERE entity_id = ?1", rusqlite::params![id])?;
        for p in &params {
          upsert_interval(&tx, p, &materialized_at)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn intervals_overlapping(
    &self,
    first: NaiveDate,
    last: NaiveDate,
    entity_id: Option<&EntityId>,
  ) -> Result<Vec<Interval>> {
    let (start, end) = overlap_bounds(first, last);
    let mut params = vec![encode_dt(end), encode_dt(start)];
    let where_clause = match entity_id {
      Some(id) => {
        params.push(id.as_str().to_owned());
        "effective_start < ?1 AND (effective_end IS NULL OR effective_end >= ?2)
         AND entity_id = ?3"
      }
      None => "effective_start < ?1 AND (effective_end IS NULL OR effective_end >= ?2)",
    };
    self.select_intervals(where_clause, params).await
  }
}
