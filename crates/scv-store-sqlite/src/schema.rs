//! SQL schema for the tables this crate owns.
//!
//! Only `clients` and `raw_records` are created here. The match-decision,
//! evidence-artefact, and audit ledgers belong to external processes and
//! are discovered at read time by [`crate::resolver`] — creating them here
//! would pin their shape and defeat the adaptive reads.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS clients (
    client_id   TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL    -- ISO 8601 UTC
);

-- One row per upstream record; the natural key is unique so re-ingestion
-- overwrites attributes in place rather than duplicating rows.
CREATE TABLE IF NOT EXISTS raw_records (
    record_id        TEXT PRIMARY KEY,
    source_system    TEXT NOT NULL,
    source_record_id TEXT NOT NULL,
    attributes       TEXT NOT NULL DEFAULT '{}',  -- JSON attribute map
    ingested_at      TEXT NOT NULL,               -- set once at insert
    updated_at       TEXT NOT NULL,               -- moves on every overwrite
    UNIQUE (source_system, source_record_id)
);

CREATE INDEX IF NOT EXISTS raw_records_system_idx
    ON raw_records(source_system, ingested_at);

PRAGMA user_version = 1;
";
