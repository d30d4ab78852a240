use crate::error::{FailureKind, Result};
use crate::models::{FailedSample, PhotoRecord, PhotoState, ScoredLabel, StatusReport};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Outcome of an optimistic state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Current state no longer matched `from`; another worker owns the
    /// record. Not an error.
    Conflict,
}

fn row_to_record(row: &Row) -> rusqlite::Result<PhotoRecord> {
    let state: String = row.get("state")?;
    // A state string nothing can parse means the row was corrupted; erroring
    // beats silently rerunning the photo from scratch.
    let state = PhotoState::parse(&state).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown photo state: {state}").into(),
        )
    })?;
    let labels: Option<String> = row.get("labels")?;
    let translated: Option<String> = row.get("translated_labels")?;
    let error_kind: Option<String> = row.get("error_kind")?;
    Ok(PhotoRecord {
        identity: row.get("identity")?,
        path: row.get("path")?,
        size: row.get("size")?,
        mtime: row.get("mtime")?,
        state,
        shrink_path: row.get("shrink_path")?,
        labels: labels
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        translated_labels: translated
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        attempt_count: row.get("attempt_count")?,
        last_error: row.get("last_error")?,
        error_kind: error_kind.as_deref().and_then(FailureKind::parse),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const RECORD_COLUMNS: &str = "identity, path, size, mtime, state, shrink_path, labels, \
     translated_labels, attempt_count, last_error, error_kind, created_at, updated_at";

pub fn get(conn: &Connection, identity: &str) -> Result<Option<PhotoRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM photos WHERE identity = ?1"),
            params![identity],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// Registers a freshly detected original at `NEW`. Re-detections of a known
/// identity leave the existing row (and its state) alone.
pub fn upsert_detected(conn: &Connection, path: &Path, size: i64, mtime: i64) -> Result<PhotoRecord> {
    let identity = crate::models::photo_identity(path, size, mtime);
    conn.execute(
        "INSERT INTO photos (identity, path, size, mtime, state)
         VALUES (?1, ?2, ?3, ?4, 'NEW')
         ON CONFLICT (identity) DO NOTHING",
        params![identity, path.to_string_lossy(), size, mtime],
    )?;
    get(conn, &identity)?
        .ok_or_else(|| crate::error::Error::Init(format!("Missing row after upsert: {identity}")))
}

/// Single-statement optimistic transition; zero affected rows means the
/// record moved under us.
pub fn transition(
    conn: &Connection,
    identity: &str,
    from: PhotoState,
    to: PhotoState,
) -> Result<Transition> {
    let changed = conn.execute(
        "UPDATE photos
         SET state = ?3, updated_at = strftime('%s', 'now')
         WHERE identity = ?1 AND state = ?2",
        params![identity, from.as_str(), to.as_str()],
    )?;
    Ok(if changed == 1 {
        Transition::Applied
    } else {
        Transition::Conflict
    })
}

pub fn mark_shrunk(conn: &Connection, identity: &str, shrink_path: &Path) -> Result<Transition> {
    let changed = conn.execute(
        "UPDATE photos
         SET state = 'SHRUNK', shrink_path = ?2, updated_at = strftime('%s', 'now')
         WHERE identity = ?1 AND state = 'NEW'",
        params![identity, shrink_path.to_string_lossy()],
    )?;
    Ok(if changed == 1 {
        Transition::Applied
    } else {
        Transition::Conflict
    })
}

/// Oldest-first listing so drains stay roughly FIFO.
pub fn list_by_state(conn: &Connection, state: PhotoState) -> Result<Vec<PhotoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM photos WHERE state = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![state.as_str()], row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Snapshot of everything a drain should touch: fresh shrinks, manually
/// requeued records, and partially-analyzed records awaiting translation or
/// a sidecar rewrite. FAILED rows are deliberately absent.
pub fn list_drainable(conn: &Connection) -> Result<Vec<PhotoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM photos
         WHERE state IN ('SHRUNK', 'QUEUED', 'ANALYZED')
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([], row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// Counts work the immediate-mode trigger may act on. Records that already
/// carry an error stay parked for the scheduled drain so a failing
/// collaborator cannot be hammered in a tight loop.
pub fn fresh_work_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM photos
         WHERE state IN ('SHRUNK', 'QUEUED', 'ANALYZED')
           AND attempt_count = 0 AND last_error IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Persists filtered vision labels and completes `ANALYZING -> ANALYZED`.
pub fn record_labels(conn: &Connection, identity: &str, labels: &[ScoredLabel]) -> Result<Transition> {
    let json = serde_json::to_string(labels)?;
    let changed = conn.execute(
        "UPDATE photos
         SET labels = ?2, state = 'ANALYZED', last_error = NULL, error_kind = NULL,
             updated_at = strftime('%s', 'now')
         WHERE identity = ?1 AND state = 'ANALYZING'",
        params![identity, json],
    )?;
    Ok(if changed == 1 {
        Transition::Applied
    } else {
        Transition::Conflict
    })
}

pub fn record_translations(conn: &Connection, identity: &str, translated: &[String]) -> Result<()> {
    let json = serde_json::to_string(translated)?;
    conn.execute(
        "UPDATE photos
         SET translated_labels = ?2, last_error = NULL, error_kind = NULL,
             updated_at = strftime('%s', 'now')
         WHERE identity = ?1",
        params![identity, json],
    )?;
    Ok(())
}

/// Books a per-item failure: stores the reason, optionally bumps the attempt
/// counter, and parks the record at `next_state`.
pub fn record_failure(
    conn: &Connection,
    identity: &str,
    kind: FailureKind,
    message: &str,
    next_state: PhotoState,
    count_attempt: bool,
) -> Result<()> {
    conn.execute(
        "UPDATE photos
         SET state = ?2, error_kind = ?3, last_error = ?4,
             attempt_count = attempt_count + ?5,
             updated_at = strftime('%s', 'now')
         WHERE identity = ?1",
        params![
            identity,
            next_state.as_str(),
            kind.as_str(),
            message,
            i64::from(count_attempt)
        ],
    )?;
    Ok(())
}

pub fn mark_written(conn: &Connection, identity: &str) -> Result<Transition> {
    transition(conn, identity, PhotoState::Analyzed, PhotoState::Written)
}

pub fn clear_shrink(conn: &Connection, identity: &str) -> Result<()> {
    conn.execute(
        "UPDATE photos SET shrink_path = NULL, updated_at = strftime('%s', 'now')
         WHERE identity = ?1",
        params![identity],
    )?;
    Ok(())
}

/// Puts a record back through the full pipeline, clearing prior results.
/// Used by forced rescans of photos that already finished or capped out.
pub fn reset_for_reprocess(conn: &Connection, identity: &str) -> Result<()> {
    conn.execute(
        "UPDATE photos
         SET state = 'NEW', labels = NULL, translated_labels = NULL,
             attempt_count = 0, last_error = NULL, error_kind = NULL,
             updated_at = strftime('%s', 'now')
         WHERE identity = ?1",
        params![identity],
    )?;
    Ok(())
}

/// Manual operator reset: `FAILED -> QUEUED` with a zeroed attempt counter.
/// Returns how many records re-entered the drainable set.
pub fn reset_failed(conn: &Connection, identity: Option<&str>) -> Result<usize> {
    let changed = match identity {
        Some(identity) => conn.execute(
            "UPDATE photos
             SET state = 'QUEUED', attempt_count = 0, updated_at = strftime('%s', 'now')
             WHERE identity = ?1 AND state = 'FAILED'",
            params![identity],
        )?,
        None => conn.execute(
            "UPDATE photos
             SET state = 'QUEUED', attempt_count = 0, updated_at = strftime('%s', 'now')
             WHERE state = 'FAILED'",
            [],
        )?,
    };
    Ok(changed)
}

pub fn status_report(conn: &Connection, failed_samples: usize) -> Result<StatusReport> {
    let mut report = StatusReport::default();
    for state in PhotoState::ALL {
        report.counts.insert(state.as_str().to_string(), 0);
    }

    let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM photos GROUP BY state")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (state, count) = row?;
        report.counts.insert(state, count);
    }

    let mut stmt = conn.prepare(
        "SELECT identity, path, attempt_count, error_kind, last_error
         FROM photos WHERE state = 'FAILED'
         ORDER BY updated_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![failed_samples as i64], |row| {
        Ok(FailedSample {
            identity: row.get(0)?,
            path: row.get(1)?,
            attempt_count: row.get(2)?,
            error_kind: row.get(3)?,
            last_error: row.get(4)?,
        })
    })?;
    for row in rows {
        report.failed.push(row?);
    }

    Ok(report)
}

/// Drain audit row helpers.
pub fn open_drain_run(conn: &Connection, run_id: &str, snapshot_size: usize) -> Result<()> {
    conn.execute(
        "INSERT INTO drain_runs (run_id, snapshot_size) VALUES (?1, ?2)",
        params![run_id, snapshot_size as i64],
    )?;
    Ok(())
}

pub fn close_drain_run(
    conn: &Connection,
    run_id: &str,
    written: usize,
    retried: usize,
    failed: usize,
    skipped: usize,
) -> Result<()> {
    conn.execute(
        "UPDATE drain_runs
         SET finished_at = strftime('%s', 'now'),
             written = ?2, retried = ?3, failed = ?4, skipped = ?5
         WHERE run_id = ?1",
        params![
            run_id,
            written as i64,
            retried as i64,
            failed as i64,
            skipped as i64
        ],
    )?;
    Ok(())
}

/// Control mailbox: out-of-process commands for a running daemon. The CLI
/// inserts rows, the scheduler drains them each tick.
pub fn enqueue_control(conn: &Connection, command: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO control_commands (command) VALUES (?1)",
        params![command],
    )?;
    Ok(())
}

pub fn take_control_commands(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id, command FROM control_commands ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut taken = Vec::new();
    for row in rows {
        taken.push(row?);
    }
    for (id, _) in &taken {
        conn.execute("DELETE FROM control_commands WHERE id = ?1", params![id])?;
    }
    Ok(taken.into_iter().map(|(_, command)| command).collect())
}
