use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the pipeline needs to run, loadable from a JSON file.
/// Missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the watched upload tree.
    pub watch_root: PathBuf,
    /// Where the database and the shrink staging area live.
    pub data_dir: PathBuf,
    /// Lowercase extensions accepted by the shrink producer.
    pub extensions: Vec<String>,
    /// Target pixel length of the shrink copy's short edge.
    pub shrink_short_edge: u32,
    /// Two stats this far apart must agree before a file counts as
    /// fully written.
    pub settle_ms: u64,
    /// Interval between watcher rescans of the upload tree.
    pub scan_interval_secs: u64,
    /// Extension of the emitted sidecar, without the dot.
    pub sidecar_extension: String,
    /// Wall-clock drain trigger, in the timezone given by `utc_offset_minutes`.
    pub trigger_hour: u32,
    pub trigger_minute: u32,
    pub utc_offset_minutes: i32,
    /// Drain as soon as work appears instead of waiting for the trigger.
    pub immediate: bool,
    /// Vision labels below this confidence are dropped, not stored.
    pub min_confidence: f32,
    /// At most this many labels are kept per photo.
    pub max_labels: usize,
    /// External-service failures beyond this count park the record at FAILED.
    pub max_attempts: i64,
    /// Worker threads per drain.
    pub drain_concurrency: usize,
    /// Deadline applied to every vision/translation call.
    pub call_timeout_ms: u64,
    /// External command invoked for vision labeling (image bytes on stdin,
    /// JSON labels on stdout). Optional so status-only deployments work.
    pub vision_command: Option<PathBuf>,
    /// External command invoked for translation (JSON terms on stdin,
    /// JSON translations on stdout).
    pub translate_command: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_root: PathBuf::from("./uploads"),
            data_dir: PathBuf::from("./photo-sidecar-data"),
            extensions: ["jpg", "jpeg", "png", "tiff", "tif", "bmp", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shrink_short_edge: 640,
            settle_ms: 500,
            scan_interval_secs: 30,
            sidecar_extension: "xmp".into(),
            trigger_hour: 2,
            trigger_minute: 0,
            utc_offset_minutes: 0,
            immediate: false,
            min_confidence: 0.70,
            max_labels: 16,
            max_attempts: 3,
            drain_concurrency: 2,
            call_timeout_ms: 30_000,
            vision_command: None,
            translate_command: None,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&raw)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn is_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| e == &ext)
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub staging_dir: PathBuf,
}

impl AppPaths {
    pub fn discover(settings: &Settings) -> Result<Self> {
        let root = settings.data_dir.clone();
        let db_path = root.join("pipeline.db");
        let staging_dir = root.join("shrinks");

        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(&staging_dir)?;

        if !settings.watch_root.exists() {
            return Err(Error::Path(format!(
                "Watch root does not exist: {}",
                settings.watch_root.display()
            )));
        }

        Ok(Self {
            root,
            db_path,
            staging_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert!(settings.min_confidence > 0.0 && settings.min_confidence < 1.0);
        assert!(settings.max_attempts >= 1);
        assert!(settings.is_supported_extension(Path::new("a/b/IMG.JPG")));
        assert!(!settings.is_supported_extension(Path::new("a/b/notes.txt")));
        assert!(!settings.is_supported_extension(Path::new("a/b/noext")));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ps_settings_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "trigger_hour": 23, "min_confidence": 0.5 }"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.trigger_hour, 23);
        assert!((settings.min_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(settings.trigger_minute, Settings::default().trigger_minute);

        std::fs::remove_file(&path).ok();
    }
}
