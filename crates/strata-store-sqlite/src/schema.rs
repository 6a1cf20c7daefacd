//! SQL schema for the Strata SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.
//!
//! Timestamps are fixed-width RFC 3339 strings (microseconds, `Z` suffix), so
//! text comparison in SQL orders them chronologically.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS events (
    arrival      INTEGER PRIMARY KEY AUTOINCREMENT,  -- tie-break ordinal
    event_id     TEXT NOT NULL UNIQUE,
    entity_id    TEXT NOT NULL,
    status       TEXT NOT NULL,
    observed_at  TEXT NOT NULL,
    payload_json TEXT NOT NULL DEFAULT '{}',
    ingested_at  TEXT NOT NULL
);

-- Derived state; always re-derivable from `events`.
CREATE TABLE IF NOT EXISTS intervals (
    entity_id       TEXT    NOT NULL,
    sequence        INTEGER NOT NULL CHECK (sequence >= 1),
    event_id        TEXT    NOT NULL REFERENCES events(event_id),
    status          TEXT    NOT NULL,
    effective_start TEXT    NOT NULL,
    effective_end   TEXT,
    duration_hours  REAL,
    payload_json    TEXT    NOT NULL DEFAULT '{}',
    is_current      INTEGER GENERATED ALWAYS AS (effective_end IS NULL) VIRTUAL,
    materialized_at TEXT    NOT NULL,
    PRIMARY KEY (entity_id, sequence),
    CHECK (effective_end IS NULL OR effective_end >= effective_start),
    CHECK ((effective_end IS NULL) = (duration_hours IS NULL))
);

CREATE INDEX IF NOT EXISTS events_entity_idx   ON events(entity_id, observed_at, arrival);
CREATE INDEX IF NOT EXISTS events_observed_idx ON events(observed_at);

-- At most one open interval per entity.
CREATE UNIQUE INDEX IF NOT EXISTS intervals_current_idx
    ON intervals(entity_id) WHERE effective_end IS NULL;
CREATE INDEX IF NOT EXISTS intervals_event_idx ON intervals(event_id);
CREATE INDEX IF NOT EXISTS intervals_start_idx ON intervals(effective_start);

PRAGMA user_version = 1;
";
