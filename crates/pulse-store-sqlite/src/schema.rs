//! SQL schema for the Trade Pulse lineage store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS raw_inputs (
    source_id      TEXT PRIMARY KEY,
    discovered_at  TEXT NOT NULL,   -- RFC 3339 UTC, fixed microsecond width
    payload        TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'discovered',
                                    -- 'discovered' | 'processed' | 'failed'
    processed_at   TEXT,
    failure_reason TEXT
);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id    TEXT PRIMARY KEY,
    tier           TEXT NOT NULL,   -- 'daily' | 'weekly' | 'monthly'
    period_key     TEXT NOT NULL,   -- '2025-11-28' | '2025-W48' | '2025-11'
    period_start   TEXT NOT NULL,
    period_end     TEXT NOT NULL,
    anchor_date    TEXT NOT NULL,   -- windowing key for the tier above
    generated_at   TEXT NOT NULL,
    content        TEXT NOT NULL,
    content_digest TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'available',
                                    -- 'available' | 'included'
    published_at   TEXT,
    UNIQUE (tier, period_key)
);

-- Inclusion edges are strictly append-only.
-- A child appears at most once, so lineage is a forest.
CREATE TABLE IF NOT EXISTS inclusion_edges (
    edge_id      TEXT PRIMARY KEY,
    child_kind   TEXT NOT NULL,     -- 'raw' | 'artifact'
    child_id     TEXT NOT NULL,     -- source_id or artifact_id
    parent_id    TEXT NOT NULL REFERENCES artifacts(artifact_id),
    committed_at TEXT NOT NULL,
    UNIQUE (child_kind, child_id)
);

CREATE TRIGGER IF NOT EXISTS inclusion_edges_no_update
BEFORE UPDATE ON inclusion_edges
BEGIN
    SELECT RAISE(ABORT, 'inclusion edges are append-only');
END;

CREATE TRIGGER IF NOT EXISTS inclusion_edges_no_delete
BEFORE DELETE ON inclusion_edges
BEGIN
    SELECT RAISE(ABORT, 'inclusion edges are append-only');
END;

-- Status only ever moves forward.
CREATE TRIGGER IF NOT EXISTS artifacts_status_forward
BEFORE UPDATE OF status ON artifacts
WHEN OLD.status = 'included'
BEGIN
    SELECT RAISE(ABORT, 'artifact already included');
END;

CREATE TRIGGER IF NOT EXISTS raw_inputs_status_forward
BEFORE UPDATE OF status ON raw_inputs
WHEN OLD.status != 'discovered'
BEGIN
    SELECT RAISE(ABORT, 'raw input already settled');
END;

CREATE INDEX IF NOT EXISTS raw_inputs_pending_idx
    ON raw_inputs(status, discovered_at);
CREATE INDEX IF NOT EXISTS artifacts_pending_idx
    ON artifacts(tier, status, anchor_date);
CREATE INDEX IF NOT EXISTS inclusion_edges_parent_idx
    ON inclusion_edges(parent_id);

PRAGMA user_version = 1;
";
