//! v001 -- Initial schema creation.
//!
//! Creates the single `testimonials` table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Testimonials
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS testimonials (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    tweet_id         TEXT NOT NULL DEFAULT '',    -- numeric status id when recognizable
    tweet_url        TEXT NOT NULL,
    author_name      TEXT NOT NULL,
    handle           TEXT NOT NULL,               -- always starts with '@'
    avatar_file_name TEXT NOT NULL,               -- file in the avatars directory
    tweet_text       TEXT NOT NULL,
    display_text     TEXT NOT NULL DEFAULT '',    -- public override; '' falls back to tweet_text
    date             TEXT NOT NULL,               -- YYYY-MM-DD
    column_index     INTEGER NOT NULL DEFAULT 0,  -- export bucket, 0..=4
    sort_order       INTEGER NOT NULL,            -- dense global order, 0..N-1
    is_active        INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    created_at       TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_testimonials_sort_order
    ON testimonials(sort_order ASC, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
