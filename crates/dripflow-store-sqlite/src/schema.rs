//! SQL schema for the Dripflow SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS drip_streams (
    stream_id    TEXT PRIMARY KEY,
    origin_type  TEXT NOT NULL,
    origin_id    INTEGER NOT NULL,
    is_public    INTEGER NOT NULL DEFAULT 1,
    unlock_mode  TEXT NOT NULL DEFAULT 'relative',  -- 'fixed' | 'relative'
    start_date   TEXT,                              -- RFC 3339 UTC or NULL
    is_active    INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    CHECK (unlock_mode IN ('fixed', 'relative')),
    CHECK (unlock_mode != 'fixed' OR start_date IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS drip_events (
    event_id        TEXT PRIMARY KEY,
    stream_id       TEXT NOT NULL
                    REFERENCES drip_streams(stream_id) ON DELETE CASCADE,
    eventable_type  TEXT NOT NULL,
    eventable_id    INTEGER NOT NULL,
    offset_interval TEXT NOT NULL DEFAULT '0',     -- digits or ISO 8601
    is_visible      INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- At most one row per (subscriber, stream).
CREATE TABLE IF NOT EXISTS drip_subscriptions (
    subscription_id TEXT PRIMARY KEY,
    subscriber_type TEXT NOT NULL,
    subscriber_id   INTEGER NOT NULL,
    stream_id       TEXT NOT NULL
                    REFERENCES drip_streams(stream_id) ON DELETE CASCADE,
    joined_at       TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    CONSTRAINT unique_subscription
        UNIQUE (subscriber_type, subscriber_id, stream_id)
);

CREATE INDEX IF NOT EXISTS drip_streams_origin_idx
    ON drip_streams(origin_type, origin_id);
CREATE INDEX IF NOT EXISTS drip_events_stream_idx
    ON drip_events(stream_id, eventable_type, eventable_id);
CREATE INDEX IF NOT EXISTS drip_subscriptions_subscriber_idx
    ON drip_subscriptions(subscriber_type, subscriber_id);

PRAGMA user_version = 1;
";
