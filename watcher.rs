use crate::config::Settings;
use crate::error::Result;
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

/// One "new or modified file" notification. The channel carrying these is
/// the watcher boundary: anything able to produce events can stand in for
/// the built-in scanner, which also keeps the shrink producer testable
/// without a filesystem watcher.
#[derive(Debug, Clone)]
pub struct PhotoEvent {
    pub path: PathBuf,
    /// Reprocess even if the photo already finished or capped out.
    pub force: bool,
}

impl PhotoEvent {
    pub fn new(path: PathBuf) -> Self {
        Self { path, force: false }
    }

    pub fn forced(path: PathBuf) -> Self {
        Self { path, force: true }
    }
}

/// Walks the upload tree once and emits an event per candidate file.
/// Delivery is at-least-once by design; the shrink producer dedupes by
/// identity. Returns the number of events sent.
pub fn scan_once(settings: &Settings, tx: &Sender<PhotoEvent>, force: bool) -> Result<usize> {
    let mut sent = 0;
    for entry in WalkDir::new(&settings.watch_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.into_path();
        if !settings.is_supported_extension(&path) {
            continue;
        }
        let event = if force {
            PhotoEvent::forced(path)
        } else {
            PhotoEvent::new(path)
        };
        if tx.send(event).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

/// Periodic rescan loop standing in for an OS watcher. Runs until `cancel`
/// is set or the consumer hangs up.
pub fn scan_loop(settings: Settings, tx: Sender<PhotoEvent>, cancel: Arc<AtomicBool>) {
    let interval = Duration::from_secs(settings.scan_interval_secs.max(1));
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match scan_once(&settings, &tx, false) {
            Ok(sent) => log::debug!("Scan pass emitted {sent} events"),
            Err(err) => log::warn!("Scan pass failed: {err}"),
        }
        // Coarse sleep with periodic cancel checks.
        let mut slept = Duration::ZERO;
        while slept < interval {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            std::thread::sleep(Duration::from_millis(200));
            slept += Duration::from_millis(200);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::fs;

    #[test]
    fn scan_emits_only_supported_files() {
        let dir = std::env::temp_dir().join(format!("ps_watch_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.jpg"), b"x").unwrap();
        fs::write(dir.join("nested/b.PNG"), b"x").unwrap();
        fs::write(dir.join("skip.txt"), b"x").unwrap();

        let mut settings = Settings::default();
        settings.watch_root = dir.clone();

        let (tx, rx) = unbounded();
        let sent = scan_once(&settings, &tx, false).unwrap();
        drop(tx);

        assert_eq!(sent, 2);
        let mut names: Vec<String> = rx
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn forced_scan_marks_events() {
        let dir = std::env::temp_dir().join(format!("ps_watchf_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.jpg"), b"x").unwrap();

        let mut settings = Settings::default();
        settings.watch_root = dir.clone();

        let (tx, rx) = unbounded();
        scan_once(&settings, &tx, true).unwrap();
        drop(tx);
        assert!(rx.iter().all(|e| e.force));

        fs::remove_dir_all(&dir).ok();
    }
}
