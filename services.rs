use crate::error::{Error, Result};
use crate::models::ScoredLabel;
use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::Deserialize;
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Labels an image. Implementations are assumed fallible and rate-limited;
/// the orchestrator wraps every call in a deadline.
pub trait VisionLabeler: Send + Sync {
    fn label(&self, image: &[u8]) -> Result<Vec<ScoredLabel>>;
}

/// Translates a batch of distinct terms, returning one translation per input
/// term in the same order. A short or reordered reply is treated as a
/// whole-call failure upstream.
pub trait Translator: Send + Sync {
    fn translate(&self, terms: &[String]) -> Result<Vec<String>>;
}

/// Runs a collaborator call on a scratch thread and gives up after
/// `timeout_ms`. A hung provider therefore costs one parked thread, never a
/// wedged drain; a panicking provider is downgraded to an error.
pub fn call_with_deadline<T, F>(timeout_ms: u64, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let outcome = catch_unwind(AssertUnwindSafe(call));
        let _ = tx.send(outcome);
    });
    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(Error::CollaboratorPanic),
        Err(RecvTimeoutError::Timeout) => Err(Error::Deadline(timeout_ms)),
        Err(RecvTimeoutError::Disconnected) => Err(Error::CollaboratorPanic),
    }
}

/// Runs a collaborator process with a hard deadline. Stdin is fed and both
/// output pipes drained from helper threads so a chatty child cannot wedge on
/// a full pipe; a child still running at the deadline is killed and reaped.
fn run_command(
    program: &PathBuf,
    stdin_payload: &[u8],
    timeout_ms: u64,
    context: &str,
) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Init(format!("Failed to execute {context}: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Init(format!("No stdin handle for {context}")))?;
    let payload = stdin_payload.to_vec();
    let writer = thread::spawn(move || {
        let _ = stdin.write_all(&payload);
    });
    let stdout_reader = drain_pipe(child.stdout.take());
    let stderr_reader = drain_pipe(child.stderr.take());

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                // The pipe threads unblock once every writer is gone; a
                // grandchild may hold the pipes briefly, so don't join here.
                return Err(Error::Deadline(timeout_ms));
            }
            None => thread::sleep(Duration::from_millis(20)),
        }
    };

    let _ = writer.join();
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    if !status.success() {
        return Err(Error::Init(format!(
            "{context} returned non-zero status: {}",
            String::from_utf8_lossy(&stderr).trim()
        )));
    }
    Ok(stdout)
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Vision collaborator that shells out to a configured command: image bytes
/// on stdin, a JSON array of `{"label": ..., "confidence": ...}` on stdout.
pub struct ExecVisionLabeler {
    program: PathBuf,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct WireLabel {
    label: String,
    confidence: f32,
}

impl ExecVisionLabeler {
    pub fn new(program: PathBuf, timeout_ms: u64) -> Self {
        Self { program, timeout_ms }
    }
}

impl VisionLabeler for ExecVisionLabeler {
    fn label(&self, image: &[u8]) -> Result<Vec<ScoredLabel>> {
        let stdout = run_command(&self.program, image, self.timeout_ms, "vision command")
            .map_err(|e| Error::Vision(e.to_string()))?;
        let entries: Vec<WireLabel> =
            serde_json::from_slice(&stdout).map_err(|e| Error::Vision(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|entry| ScoredLabel::new(entry.label, entry.confidence))
            .collect())
    }
}

/// Translation collaborator that shells out to a configured command: a JSON
/// array of terms on stdin, a same-length JSON array of translations on
/// stdout.
pub struct ExecTranslator {
    program: PathBuf,
    timeout_ms: u64,
}

impl ExecTranslator {
    pub fn new(program: PathBuf, timeout_ms: u64) -> Self {
        Self { program, timeout_ms }
    }
}

impl Translator for ExecTranslator {
    fn translate(&self, terms: &[String]) -> Result<Vec<String>> {
        let payload = serde_json::to_vec(terms)?;
        let stdout = run_command(&self.program, &payload, self.timeout_ms, "translate command")
            .map_err(|e| Error::Translation(e.to_string()))?;
        let translated: Vec<String> =
            serde_json::from_slice(&stdout).map_err(|e| Error::Translation(e.to_string()))?;
        Ok(translated)
    }
}
