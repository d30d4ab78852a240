/// MIGRATION 0001: Initial database schema.
pub const MIGRATION_0001: &str = r#"
-- Photos Table: one row per detected original, never deleted.
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'NEW',
    shrink_path TEXT,
    labels TEXT,            -- JSON array of {term, confidence}
    translated_labels TEXT, -- JSON array of strings, aligned with labels
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    error_kind TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

-- Indexes for faster queries
CREATE INDEX IF NOT EXISTS idx_photos_identity ON photos (identity);
CREATE INDEX IF NOT EXISTS idx_photos_state ON photos (state);
CREATE INDEX IF NOT EXISTS idx_photos_path ON photos (path);
"#;

/// MIGRATION 0002: Drain bookkeeping for operator audit.
pub const MIGRATION_0002: &str = r#"
CREATE TABLE IF NOT EXISTS drain_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    started_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    finished_at INTEGER,
    snapshot_size INTEGER NOT NULL DEFAULT 0,
    written INTEGER NOT NULL DEFAULT 0,
    retried INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0
);
"#;

/// MIGRATION 0003: Control mailbox so CLI invocations can steer a running
/// daemon through the shared database.
pub const MIGRATION_0003: &str = r#"
CREATE TABLE IF NOT EXISTS control_commands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
"#;
