//! SQL schema for the Taxon SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per concept. A row with redirect_target set is a stub: its
-- canonical_id has been superseded and every payload column is empty.
CREATE TABLE IF NOT EXISTS categories (
    local_id                    TEXT PRIMARY KEY,
    canonical_id                TEXT,
    redirect_target             TEXT,
    taxonomy_name               TEXT,
    label                       TEXT,
    description                 TEXT,
    aliases                     TEXT NOT NULL DEFAULT '[]',   -- JSON array
    instance_of_ids             TEXT NOT NULL DEFAULT '[]',   -- JSON array
    latitude                    REAL,
    longitude                   REAL,
    area_sqm                    REAL,
    image_url                   TEXT,
    preferred_language_at_fetch TEXT,
    fetched_at                  TEXT,                         -- ISO 8601 UTC
    CHECK (
      (canonical_id IS NOT NULL AND canonical_id != '')
      OR (taxonomy_name IS NOT NULL AND taxonomy_name != '')
    )
);

CREATE UNIQUE INDEX IF NOT EXISTS categories_canonical_idx
    ON categories(canonical_id) WHERE canonical_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS categories_taxonomy_idx
    ON categories(taxonomy_name) WHERE taxonomy_name IS NOT NULL;

-- At most one interaction per category; re-pointed, never copied, when two
-- categories merge.
CREATE TABLE IF NOT EXISTS interactions (
    interaction_id TEXT PRIMARY KEY,
    category_id    TEXT UNIQUE REFERENCES categories(local_id) ON DELETE SET NULL,
    last_viewed_at TEXT,
    view_count     INTEGER NOT NULL DEFAULT 0 CHECK (view_count >= 0),
    is_bookmarked  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS interactions_viewed_idx ON interactions(last_viewed_at);

PRAGMA user_version = 1;
";
