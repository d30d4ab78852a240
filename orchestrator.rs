use crate::config::Settings;
use crate::db::DbPool;
use crate::error::{Error, FailureKind, Result};
use crate::models::{PhotoRecord, PhotoState, ScoredLabel};
use crate::services::{call_with_deadline, Translator, VisionLabeler};
use crate::sidecar;
use crate::store::{self, Transition};
use crossbeam_channel::bounded;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use uuid::Uuid;

/// The two external services a drain talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub vision: Arc<dyn VisionLabeler>,
    pub translator: Arc<dyn Translator>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainOutcome {
    pub run_id: String,
    pub snapshot_size: usize,
    pub written: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum ItemOutcome {
    Written,
    /// Parked for the next drain (external failure below the cap, or a
    /// sidecar write failure).
    Retried,
    /// Capped out, excluded from future drains.
    Failed,
    /// Lost the optimistic-transition race; another worker owns the item.
    Skipped,
}

#[derive(Default)]
struct DrainCounters {
    written: AtomicUsize,
    retried: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// One drain pass over the snapshot taken at start. Items shrunk while the
/// drain runs wait for the next one, which bounds a single run's duration.
/// Per-item errors are booked on the record; only store-level errors abort
/// the run.
pub fn run_drain(
    pool: &DbPool,
    collaborators: &Collaborators,
    settings: &Settings,
    cancel: &Arc<AtomicBool>,
) -> Result<DrainOutcome> {
    let run_id = Uuid::new_v4().to_string();
    let snapshot = {
        let conn = pool.get()?;
        let snapshot = store::list_drainable(&conn)?;
        store::open_drain_run(&conn, &run_id, snapshot.len())?;
        snapshot
    };
    log::info!("Drain {} starting with {} items", run_id, snapshot.len());

    let snapshot_size = snapshot.len();
    let (tx, rx) = bounded(snapshot_size.max(1));
    for record in snapshot {
        let _ = tx.send(record);
    }
    drop(tx);

    let counters = Arc::new(DrainCounters::default());
    let abort = Arc::new(AtomicBool::new(false));
    let store_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

    let workers = settings.drain_concurrency.max(1);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = rx.clone();
        let pool = pool.clone();
        let collaborators = collaborators.clone();
        let settings = settings.clone();
        let cancel = cancel.clone();
        let abort = abort.clone();
        let counters = counters.clone();
        let store_error = store_error.clone();
        handles.push(thread::spawn(move || {
            loop {
                // Cooperative cancellation: checked between items only.
                if cancel.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed) {
                    break;
                }
                let Ok(record) = rx.recv() else { break };
                match process_item(&pool, &collaborators, &settings, record) {
                    Ok(ItemOutcome::Written) => {
                        counters.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(ItemOutcome::Retried) => {
                        counters.retried.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(ItemOutcome::Failed) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(ItemOutcome::Skipped) => {
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        // The store itself is unhealthy; stop every worker
                        // and surface the error to the operator.
                        log::error!("Drain aborted, state store unavailable: {err}");
                        *store_error.lock().unwrap() = Some(err);
                        abort.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.join();
    }

    let outcome = DrainOutcome {
        run_id: run_id.clone(),
        snapshot_size,
        written: counters.written.load(Ordering::Relaxed),
        retried: counters.retried.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
    };

    if let Some(err) = store_error.lock().unwrap().take() {
        return Err(err);
    }

    let conn = pool.get()?;
    store::close_drain_run(
        &conn,
        &run_id,
        outcome.written,
        outcome.retried,
        outcome.failed,
        outcome.skipped,
    )?;
    log::info!(
        "Drain {} finished: {} written, {} retried, {} failed, {} skipped",
        run_id,
        outcome.written,
        outcome.retried,
        outcome.failed,
        outcome.skipped
    );
    Ok(outcome)
}

/// Keeps provider order, drops everything under the confidence floor, and
/// truncates to the label cap.
fn filter_labels(raw: Vec<ScoredLabel>, min_confidence: f32, max_labels: usize) -> Vec<ScoredLabel> {
    raw.into_iter()
        .filter(|label| label.confidence >= min_confidence)
        .take(max_labels)
        .collect()
}

/// First-occurrence-ordered distinct terms, so the translation batch stays
/// as small as the provider allows.
fn distinct_terms(labels: &[ScoredLabel]) -> Vec<String> {
    let mut terms: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        if !terms.contains(&label.term) {
            terms.push(label.term.clone());
        }
    }
    terms
}

fn book_external_failure(
    conn: &rusqlite::Connection,
    identity: &str,
    attempts_before: i64,
    max_attempts: i64,
    revert_to: PhotoState,
    err: &Error,
) -> Result<ItemOutcome> {
    let capped = attempts_before + 1 >= max_attempts;
    let next = if capped { PhotoState::Failed } else { revert_to };
    store::record_failure(
        conn,
        identity,
        FailureKind::ExternalService,
        &err.to_string(),
        next,
        true,
    )?;
    if capped {
        log::warn!("Photo {identity} reached the attempt cap: {err}");
        Ok(ItemOutcome::Failed)
    } else {
        log::warn!("Photo {identity} will retry next drain: {err}");
        Ok(ItemOutcome::Retried)
    }
}

/// Runs one snapshot item to completion or to its parked retry state.
/// Returns `Err` only for store-level failures.
fn process_item(
    pool: &DbPool,
    collaborators: &Collaborators,
    settings: &Settings,
    record: PhotoRecord,
) -> Result<ItemOutcome> {
    let conn = pool.get()?;
    let identity = record.identity.clone();
    let entry_state = record.state;
    let mut attempts = record.attempt_count;
    let mut labels = record.labels.clone();

    // Vision leg, skipped for records resuming from ANALYZED: their labels
    // already survived a translation or write failure.
    if matches!(entry_state, PhotoState::Shrunk | PhotoState::Queued) {
        if store::transition(&conn, &identity, entry_state, PhotoState::Analyzing)?
            == Transition::Conflict
        {
            return Ok(ItemOutcome::Skipped);
        }

        let Some(shrink_path) = record.shrink_path.as_deref() else {
            store::record_failure(
                &conn,
                &identity,
                FailureKind::Decode,
                "shrink copy path missing from record",
                PhotoState::Failed,
                true,
            )?;
            return Ok(ItemOutcome::Failed);
        };
        let bytes = match fs::read(shrink_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                store::record_failure(
                    &conn,
                    &identity,
                    FailureKind::Decode,
                    &format!("shrink copy unreadable: {err}"),
                    PhotoState::Failed,
                    true,
                )?;
                return Ok(ItemOutcome::Failed);
            }
        };

        let vision = collaborators.vision.clone();
        match call_with_deadline(settings.call_timeout_ms, move || vision.label(&bytes)) {
            Ok(raw) => {
                labels = filter_labels(raw, settings.min_confidence, settings.max_labels);
                if store::record_labels(&conn, &identity, &labels)? == Transition::Conflict {
                    return Ok(ItemOutcome::Skipped);
                }
            }
            Err(err) => {
                return book_external_failure(
                    &conn,
                    &identity,
                    attempts,
                    settings.max_attempts,
                    PhotoState::Shrunk,
                    &err,
                );
            }
        }
    }

    // Translation leg. All-or-nothing: a short reply counts as a whole-call
    // failure and the batch is retried next drain with labels intact.
    let translated = if labels.is_empty() {
        Vec::new()
    } else if matches!(entry_state, PhotoState::Analyzed)
        && record.translated_labels.len() == labels.len()
    {
        // Resuming after a sidecar write failure; translations already held.
        record.translated_labels.clone()
    } else {
        let terms = distinct_terms(&labels);
        let batch = terms.clone();
        let translator = collaborators.translator.clone();
        let reply =
            call_with_deadline(settings.call_timeout_ms, move || translator.translate(&batch));
        let reply = reply.and_then(|reply| {
            if reply.len() == terms.len() {
                Ok(reply)
            } else {
                Err(Error::Translation(format!(
                    "expected {} translations, got {}",
                    terms.len(),
                    reply.len()
                )))
            }
        });
        match reply {
            Ok(reply) => {
                let by_term: HashMap<&str, &str> = terms
                    .iter()
                    .map(String::as_str)
                    .zip(reply.iter().map(String::as_str))
                    .collect();
                let aligned: Vec<String> = labels
                    .iter()
                    .map(|label| by_term[label.term.as_str()].to_string())
                    .collect();
                store::record_translations(&conn, &identity, &aligned)?;
                aligned
            }
            Err(err) => {
                attempts = store::get(&conn, &identity)?
                    .map(|r| r.attempt_count)
                    .unwrap_or(attempts);
                return book_external_failure(
                    &conn,
                    &identity,
                    attempts,
                    settings.max_attempts,
                    PhotoState::Analyzed,
                    &err,
                );
            }
        }
    };

    // Sidecar leg. Write failures are usually operator-fixable, so they
    // park the record at ANALYZED indefinitely without consuming attempts.
    let terms = sidecar::merge_terms(&labels, &translated);
    let original = Path::new(&record.path);
    if let Err(err) = sidecar::write_sidecar(original, &settings.sidecar_extension, &terms) {
        store::record_failure(
            &conn,
            &identity,
            FailureKind::Write,
            &err.to_string(),
            PhotoState::Analyzed,
            false,
        )?;
        log::warn!("Sidecar write failed for {}: {}", record.path, err);
        return Ok(ItemOutcome::Retried);
    }

    if store::mark_written(&conn, &identity)? == Transition::Conflict {
        return Ok(ItemOutcome::Skipped);
    }

    // The shrink copy is done once the sidecar exists; a failed delete is
    // logged and swept up later, never rolled back.
    if let Some(shrink_path) = record.shrink_path.as_deref() {
        match fs::remove_file(shrink_path) {
            Ok(()) => store::clear_shrink(&conn, &identity)?,
            Err(err) => log::warn!("Could not delete shrink {shrink_path}: {err}"),
        }
    }
    Ok(ItemOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedVision {
        replies: Mutex<VecDeque<Result<Vec<ScoredLabel>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedVision {
        fn new(replies: Vec<Result<Vec<ScoredLabel>>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl VisionLabeler for ScriptedVision {
        fn label(&self, _image: &[u8]) -> Result<Vec<ScoredLabel>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Vision("script exhausted".into())))
        }
    }

    struct ScriptedTranslator {
        replies: Mutex<VecDeque<Result<Vec<String>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTranslator {
        fn new(replies: Vec<Result<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Translator for ScriptedTranslator {
        fn translate(&self, _terms: &[String]) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Translation("script exhausted".into())))
        }
    }

    struct Fixture {
        pool: crate::db::DbPool,
        dir: PathBuf,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("ps_drain_{}", Uuid::new_v4()));
            fs::create_dir_all(dir.join("staging")).unwrap();
            let mut settings = Settings::default();
            settings.min_confidence = 0.7;
            settings.max_attempts = 3;
            settings.drain_concurrency = 1;
            settings.call_timeout_ms = 2_000;
            Self {
                pool: db::test_pool(),
                dir,
                settings,
            }
        }

        /// Seeds one SHRUNK record with a real original and shrink file.
        fn seed(&self, name: &str) -> PhotoRecord {
            let original = self.dir.join(name);
            fs::write(&original, b"original bytes").unwrap();
            let shrink = self.dir.join("staging").join(format!("{name}.shrink.jpg"));
            fs::write(&shrink, b"shrink bytes").unwrap();

            let conn = self.pool.get().unwrap();
            let record = store::upsert_detected(&conn, &original, 14, 1_700_000_000).unwrap();
            store::mark_shrunk(&conn, &record.identity, &shrink).unwrap();
            store::get(&conn, &record.identity).unwrap().unwrap()
        }

        fn collaborators(
            &self,
            vision: Arc<ScriptedVision>,
            translator: Arc<ScriptedTranslator>,
        ) -> Collaborators {
            Collaborators {
                vision,
                translator,
            }
        }

        fn drain(&self, collaborators: &Collaborators) -> DrainOutcome {
            let cancel = Arc::new(AtomicBool::new(false));
            run_drain(&self.pool, collaborators, &self.settings, &cancel).unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            fs::remove_dir_all(&self.dir).ok();
        }
    }

    fn scenario_labels() -> Vec<ScoredLabel> {
        vec![
            ScoredLabel::new("Sky", 0.95),
            ScoredLabel::new("Cloud", 0.9),
            ScoredLabel::new("Noise", 0.4),
        ]
    }

    #[test]
    fn full_scenario_writes_bilingual_sidecar_and_cleans_shrink() {
        let fixture = Fixture::new();
        let record = fixture.seed("IMG_001.jpg");
        let vision = ScriptedVision::new(vec![Ok(scenario_labels())]);
        let translator =
            ScriptedTranslator::new(vec![Ok(vec!["空".to_string(), "雲".to_string()])]);
        let collaborators = fixture.collaborators(vision.clone(), translator.clone());

        let outcome = fixture.drain(&collaborators);
        assert_eq!(outcome.snapshot_size, 1);
        assert_eq!(outcome.written, 1);

        let doc = fs::read_to_string(fixture.dir.join("IMG_001.xmp")).unwrap();
        for term in ["空", "雲", "Sky", "Cloud"] {
            assert!(doc.contains(&format!("<rdf:li>{term}</rdf:li>")), "missing {term}");
        }
        assert!(!doc.contains("Noise"));

        let conn = fixture.pool.get().unwrap();
        let finished = store::get(&conn, &record.identity).unwrap().unwrap();
        assert_eq!(finished.state, PhotoState::Written);
        assert_eq!(finished.labels.len(), 2);
        assert_eq!(finished.translated_labels, vec!["空", "雲"]);
        assert!(finished.shrink_path.is_none());
        assert!(!record.shrink_path.map(PathBuf::from).unwrap().exists());
    }

    #[test]
    fn redrain_with_no_new_work_is_a_no_op() {
        let fixture = Fixture::new();
        fixture.seed("IMG_002.jpg");
        let vision = ScriptedVision::new(vec![Ok(scenario_labels())]);
        let translator =
            ScriptedTranslator::new(vec![Ok(vec!["空".to_string(), "雲".to_string()])]);
        let collaborators = fixture.collaborators(vision.clone(), translator.clone());

        fixture.drain(&collaborators);
        let second = fixture.drain(&collaborators);
        assert_eq!(second.snapshot_size, 0);
        assert_eq!(vision.calls(), 1);
        assert_eq!(translator.calls(), 1);
    }

    #[test]
    fn translation_failure_keeps_labels_and_retries_without_vision() {
        let fixture = Fixture::new();
        let record = fixture.seed("IMG_003.jpg");
        let vision = ScriptedVision::new(vec![Ok(scenario_labels())]);
        let translator = ScriptedTranslator::new(vec![
            Err(Error::Translation("provider timeout".into())),
            Ok(vec!["空".to_string(), "雲".to_string()]),
        ]);
        let collaborators = fixture.collaborators(vision.clone(), translator.clone());

        fixture.drain(&collaborators);
        let conn = fixture.pool.get().unwrap();
        let parked = store::get(&conn, &record.identity).unwrap().unwrap();
        assert_eq!(parked.state, PhotoState::Analyzed);
        assert_eq!(parked.labels.len(), 2);
        assert_eq!(parked.attempt_count, 1);
        drop(conn);

        let second = fixture.drain(&collaborators);
        assert_eq!(second.written, 1);
        // Vision was never re-called for the retry.
        assert_eq!(vision.calls(), 1);
        assert_eq!(translator.calls(), 2);
    }

    #[test]
    fn short_translation_reply_is_a_whole_call_failure() {
        let fixture = Fixture::new();
        let record = fixture.seed("IMG_004.jpg");
        let vision = ScriptedVision::new(vec![Ok(scenario_labels())]);
        let translator = ScriptedTranslator::new(vec![Ok(vec!["空".to_string()])]);
        let collaborators = fixture.collaborators(vision, translator);

        fixture.drain(&collaborators);
        let conn = fixture.pool.get().unwrap();
        let parked = store::get(&conn, &record.identity).unwrap().unwrap();
        assert_eq!(parked.state, PhotoState::Analyzed);
        assert_eq!(parked.attempt_count, 1);
        assert!(parked.translated_labels.is_empty());
        assert!(!fixture.dir.join("IMG_004.xmp").exists());
    }

    #[test]
    fn attempt_cap_parks_record_at_failed_and_excludes_it() {
        let mut fixture = Fixture::new();
        fixture.settings.max_attempts = 2;
        let record = fixture.seed("IMG_005.jpg");
        let vision = ScriptedVision::new(vec![
            Err(Error::Vision("503".into())),
            Err(Error::Vision("503".into())),
        ]);
        let translator = ScriptedTranslator::new(vec![]);
        let collaborators = fixture.collaborators(vision.clone(), translator);

        fixture.drain(&collaborators);
        {
            let conn = fixture.pool.get().unwrap();
            let parked = store::get(&conn, &record.identity).unwrap().unwrap();
            assert_eq!(parked.state, PhotoState::Shrunk);
            assert_eq!(parked.attempt_count, 1);
        }

        let capping = fixture.drain(&collaborators);
        assert_eq!(capping.failed, 1);
        {
            let conn = fixture.pool.get().unwrap();
            let failed = store::get(&conn, &record.identity).unwrap().unwrap();
            assert_eq!(failed.state, PhotoState::Failed);
            assert_eq!(failed.attempt_count, 2);
            assert_eq!(failed.error_kind, Some(FailureKind::ExternalService));
        }

        // Capped records never re-enter automatic drains.
        let excluded = fixture.drain(&collaborators);
        assert_eq!(excluded.snapshot_size, 0);
        assert_eq!(vision.calls(), 2);
    }

    #[test]
    fn losing_the_transition_race_skips_without_external_calls() {
        let fixture = Fixture::new();
        let record = fixture.seed("IMG_006.jpg");
        let vision = ScriptedVision::new(vec![Ok(scenario_labels())]);
        let translator = ScriptedTranslator::new(vec![]);
        let collaborators = fixture.collaborators(vision.clone(), translator);

        // A concurrent drain claimed the record after our snapshot was taken.
        let conn = fixture.pool.get().unwrap();
        store::transition(&conn, &record.identity, PhotoState::Shrunk, PhotoState::Analyzing)
            .unwrap();
        drop(conn);

        let outcome = process_item(&fixture.pool, &collaborators, &fixture.settings, record);
        assert!(matches!(outcome, Ok(ItemOutcome::Skipped)));
        assert_eq!(vision.calls(), 0);
    }

    #[test]
    fn sidecar_write_failure_parks_at_analyzed_without_attempts() {
        let fixture = Fixture::new();
        let record = fixture.seed("IMG_007.jpg");

        // Point the record at an original whose directory cannot exist, so
        // the temp-file write fails.
        let conn = fixture.pool.get().unwrap();
        conn.execute(
            "UPDATE photos SET path = ?1 WHERE identity = ?2",
            rusqlite::params![
                fixture
                    .dir
                    .join("gone")
                    .join("IMG_007.jpg")
                    .to_string_lossy(),
                record.identity
            ],
        )
        .unwrap();
        drop(conn);

        let vision = ScriptedVision::new(vec![Ok(scenario_labels())]);
        let translator =
            ScriptedTranslator::new(vec![Ok(vec!["空".to_string(), "雲".to_string()])]);
        let collaborators = fixture.collaborators(vision, translator);

        let outcome = fixture.drain(&collaborators);
        assert_eq!(outcome.retried, 1);

        let conn = fixture.pool.get().unwrap();
        let parked = store::get(&conn, &record.identity).unwrap().unwrap();
        assert_eq!(parked.state, PhotoState::Analyzed);
        assert_eq!(parked.error_kind, Some(FailureKind::Write));
        assert_eq!(parked.attempt_count, 0);
        assert_eq!(parked.translated_labels, vec!["空", "雲"]);
    }

    #[test]
    fn empty_label_set_after_filtering_still_writes_a_sidecar() {
        let fixture = Fixture::new();
        let record = fixture.seed("IMG_008.jpg");
        let vision = ScriptedVision::new(vec![Ok(vec![ScoredLabel::new("Noise", 0.1)])]);
        let translator = ScriptedTranslator::new(vec![]);
        let collaborators = fixture.collaborators(vision, translator.clone());

        let outcome = fixture.drain(&collaborators);
        assert_eq!(outcome.written, 1);
        // Nothing to translate.
        assert_eq!(translator.calls(), 0);

        let conn = fixture.pool.get().unwrap();
        let finished = store::get(&conn, &record.identity).unwrap().unwrap();
        assert_eq!(finished.state, PhotoState::Written);
        assert!(fixture.dir.join("IMG_008.xmp").exists());
    }

    #[test]
    fn duplicate_labels_translate_as_one_batched_term() {
        let fixture = Fixture::new();
        fixture.seed("IMG_009.jpg");
        let vision = ScriptedVision::new(vec![Ok(vec![
            ScoredLabel::new("Sky", 0.95),
            ScoredLabel::new("Sky", 0.9),
        ])]);
        // One distinct term, so the scripted reply has length one.
        let translator = ScriptedTranslator::new(vec![Ok(vec!["空".to_string()])]);
        let collaborators = fixture.collaborators(vision, translator);

        let outcome = fixture.drain(&collaborators);
        assert_eq!(outcome.written, 1);

        let doc = fs::read_to_string(fixture.dir.join("IMG_009.xmp")).unwrap();
        assert_eq!(doc.matches("<rdf:li>空</rdf:li>").count(), 1);
        assert_eq!(doc.matches("<rdf:li>Sky</rdf:li>").count(), 1);
    }

    #[test]
    fn filter_respects_threshold_boundary_and_cap() {
        let filtered = filter_labels(
            vec![
                ScoredLabel::new("at", 0.7),
                ScoredLabel::new("below", 0.699),
                ScoredLabel::new("above", 0.9),
            ],
            0.7,
            10,
        );
        let terms: Vec<_> = filtered.iter().map(|l| l.term.as_str()).collect();
        assert_eq!(terms, vec!["at", "above"]);

        let capped = filter_labels(
            (0..10)
                .map(|i| ScoredLabel::new(format!("t{i}"), 0.9))
                .collect(),
            0.5,
            3,
        );
        assert_eq!(capped.len(), 3);
    }
}
