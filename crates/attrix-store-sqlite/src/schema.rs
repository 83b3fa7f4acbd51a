//! SQL schema for the attrix SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full measurement schema DDL; idempotent thanks to
/// `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sources (
    source_id                   TEXT PRIMARY KEY,
    registrant                  TEXT NOT NULL,   -- e.g. 'android-app://com.example.app'
    publisher                   TEXT NOT NULL,   -- site matched by deletion filters
    event_time                  TEXT NOT NULL,   -- ISO 8601 UTC
    status                      TEXT NOT NULL,   -- 'active' | 'ignored' | 'marked_to_delete'
    aggregate_contributions     INTEGER NOT NULL DEFAULT 0,
    event_report_dedup_keys     TEXT NOT NULL DEFAULT '[]',  -- JSON list of decimal strings
    aggregate_report_dedup_keys TEXT NOT NULL DEFAULT '[]',  -- JSON list of decimal strings
    attribution_status          TEXT,            -- JSON list of attributed triggers
    trigger_specs               TEXT             -- non-NULL marks a flex source
);

CREATE TABLE IF NOT EXISTS triggers (
    trigger_id              TEXT PRIMARY KEY,
    registrant              TEXT NOT NULL,
    attribution_destination TEXT NOT NULL,       -- site matched by deletion filters
    trigger_time            TEXT NOT NULL,
    status                  TEXT NOT NULL        -- 'pending' | 'ignored' | 'attributed' | 'marked_to_delete'
);

-- Reports cascade away with the source or trigger they derive from.
CREATE TABLE IF NOT EXISTS event_reports (
    report_id         TEXT PRIMARY KEY,
    source_id         TEXT REFERENCES sources(source_id) ON DELETE CASCADE,
    trigger_id        TEXT NOT NULL REFERENCES triggers(trigger_id) ON DELETE CASCADE,
    trigger_dedup_key TEXT,                      -- decimal string
    report_time       TEXT NOT NULL,
    status            TEXT NOT NULL              -- 'pending' | 'delivered' | 'marked_to_delete'
);

CREATE TABLE IF NOT EXISTS aggregate_reports (
    report_id             TEXT PRIMARY KEY,
    source_id             TEXT REFERENCES sources(source_id) ON DELETE CASCADE,
    trigger_id            TEXT NOT NULL REFERENCES triggers(trigger_id) ON DELETE CASCADE,
    contributions         TEXT NOT NULL DEFAULT '[]',  -- JSON histogram contributions
    dedup_key             TEXT,                  -- decimal string
    scheduled_report_time TEXT NOT NULL,
    status                TEXT NOT NULL          -- 'pending' | 'delivered' | 'marked_to_delete'
);

CREATE TABLE IF NOT EXISTS async_registrations (
    registration_id TEXT PRIMARY KEY,
    registrant      TEXT NOT NULL,
    top_origin      TEXT NOT NULL,               -- site matched by deletion filters
    request_time    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS sources_registrant_idx        ON sources(registrant);
CREATE INDEX IF NOT EXISTS triggers_registrant_idx       ON triggers(registrant);
CREATE INDEX IF NOT EXISTS event_reports_source_idx      ON event_reports(source_id);
CREATE INDEX IF NOT EXISTS event_reports_trigger_idx     ON event_reports(trigger_id);
CREATE INDEX IF NOT EXISTS aggregate_reports_source_idx  ON aggregate_reports(source_id);
CREATE INDEX IF NOT EXISTS aggregate_reports_trigger_idx ON aggregate_reports(trigger_id);

PRAGMA user_version = 1;
";

/// Schema for the rollback-record sidecar database. Kept in its own file so
/// the records survive a measurement wipe.
pub const ROLLBACK_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS rollback_records (
    row_id         TEXT PRIMARY KEY,
    reason         TEXT NOT NULL UNIQUE,
    module_version TEXT NOT NULL,                -- decimal string
    recorded_at    TEXT NOT NULL
);

PRAGMA user_version = 1;
";
