//! SQL schema for the chanpass SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per (subscriber, product). Rows are never deleted.
CREATE TABLE IF NOT EXISTS subscriptions (
    subscriber_id     INTEGER NOT NULL,
    stream            TEXT    NOT NULL,
    subject           TEXT    NOT NULL,
    resource_ref      TEXT    NOT NULL,
    purchased_at      INTEGER NOT NULL,   -- unix millis
    expires_at        INTEGER NOT NULL,   -- unix millis
    status            TEXT    NOT NULL,   -- 'active' | 'expired'
    last_reminded_at  INTEGER,            -- unix millis or NULL
    PRIMARY KEY (subscriber_id, stream, subject)
);

-- Payment ids already applied to a subscription.
CREATE TABLE IF NOT EXISTS applied_payments (
    payment_id     TEXT    PRIMARY KEY,
    subscriber_id  INTEGER NOT NULL,
    stream         TEXT    NOT NULL,
    subject        TEXT    NOT NULL,
    applied_at     INTEGER NOT NULL,
    FOREIGN KEY (subscriber_id, stream, subject)
      REFERENCES subscriptions(subscriber_id, stream, subject)
);

CREATE INDEX IF NOT EXISTS subscriptions_due_idx
    ON subscriptions(status, expires_at);

PRAGMA user_version = 1;
";
