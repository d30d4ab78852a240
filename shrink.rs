use crate::config::Settings;
use crate::db::DbPool;
use crate::error::{FailureKind, Result};
use crate::models::{photo_identity, PhotoState};
use crate::store;
use crate::watcher::PhotoEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::imageops::FilterType;
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Consumes watcher events and produces shrink copies until the channel
/// closes or `cancel` is set. Duplicate events for a known identity are
/// no-ops, so at-least-once delivery from the watcher is fine.
pub fn run_shrink_stage(
    rx: Receiver<PhotoEvent>,
    pool: DbPool,
    staging_dir: PathBuf,
    settings: Settings,
    cancel: Arc<AtomicBool>,
) {
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let event = match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if let Err(err) = handle_event(&event, &pool, &staging_dir, &settings) {
            // Store-level trouble; the event will come around on a rescan.
            log::error!("Shrink stage error for {}: {}", event.path.display(), err);
        }
    }
}

fn handle_event(
    event: &PhotoEvent,
    pool: &DbPool,
    staging_dir: &Path,
    settings: &Settings,
) -> Result<()> {
    if !settings.is_supported_extension(&event.path) {
        return Ok(());
    }

    let Some((size, mtime)) = fingerprint(&event.path) else {
        return Ok(());
    };
    let identity = photo_identity(&event.path, size, mtime);
    let conn = pool.get()?;

    // Dedupe before paying the settle wait: duplicates are the common case
    // once rescans run, and they must stay cheap.
    let mut forced_reset = false;
    match store::get(&conn, &identity)?.map(|r| r.state) {
        // Crashed after detection, before the shrink landed: redo the shrink.
        None | Some(PhotoState::New) => {}
        Some(PhotoState::Written) | Some(PhotoState::Failed) if event.force => {
            forced_reset = true;
        }
        // Already in flight or terminal: duplicate event, nothing to do.
        Some(_) => return Ok(()),
    }

    // Partially uploaded files shift under us; require a stable fingerprint
    // across the settle window and let the next scan retry the rest.
    if !is_settled(&event.path, (size, mtime), settings.settle_ms) {
        log::debug!("Still being written, skipping: {}", event.path.display());
        return Ok(());
    }

    if forced_reset {
        log::info!("Forced reprocess of {}", event.path.display());
        store::reset_for_reprocess(&conn, &identity)?;
    } else {
        store::upsert_detected(&conn, &event.path, size, mtime)?;
    }

    match build_shrink(&event.path, &identity, staging_dir, settings.shrink_short_edge) {
        Ok(shrink_path) => {
            store::mark_shrunk(&conn, &identity, &shrink_path)?;
            log::debug!(
                "Shrunk {} -> {}",
                event.path.display(),
                shrink_path.display()
            );
        }
        Err(err) => {
            // One attempt per detection event; a changed file gets a new
            // identity and a fresh record on the next scan.
            log::warn!("Shrink failed for {}: {}", event.path.display(), err);
            store::record_failure(
                &conn,
                &identity,
                FailureKind::Decode,
                &err.to_string(),
                PhotoState::Failed,
                true,
            )?;
        }
    }
    Ok(())
}

/// Re-stats the file after the settle window. A fingerprint that moved (or a
/// file that vanished) is still changing and gets picked up by a later scan.
fn is_settled(path: &Path, first: (i64, i64), settle_ms: u64) -> bool {
    thread::sleep(Duration::from_millis(settle_ms));
    fingerprint(path) == Some(first)
}

fn fingerprint(path: &Path) -> Option<(i64, i64)> {
    let metadata = fs::metadata(path).ok()?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Some((metadata.len() as i64, mtime))
}

/// Decodes the original, bakes EXIF orientation into the pixels, scales so
/// the short edge matches `short_edge` (never upscaling), and saves a JPEG
/// under an identity-derived name in the staging area. The original is only
/// ever read.
pub fn build_shrink(
    original: &Path,
    identity: &str,
    staging_dir: &Path,
    short_edge: u32,
) -> Result<PathBuf> {
    fs::create_dir_all(staging_dir)?;
    let img = image::open(original)?;
    let img = apply_orientation(img, read_orientation(original));

    let (w, h) = (img.width(), img.height());
    let short = w.min(h);
    let img = if short > short_edge {
        let scale = short_edge as f64 / short as f64;
        let nw = ((w as f64 * scale).round() as u32).max(1);
        let nh = ((h as f64 * scale).round() as u32).max(1);
        img.resize_exact(nw, nh, FilterType::CatmullRom)
    } else {
        img
    };

    let output = staging_dir.join(format!("{identity}_shrink.jpg"));
    // JPEG has no alpha channel.
    img.to_rgb8().save(&output)?;
    Ok(output)
}

fn read_orientation(path: &Path) -> u32 {
    let Ok(file) = fs::File::open(path) else {
        return 1;
    };
    let mut reader = std::io::BufReader::new(file);
    exif::Reader::new()
        .read_from_container(&mut reader)
        .ok()
        .and_then(|meta| {
            meta.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

/// The shrink is re-encoded without EXIF, so the rotation the tag described
/// is applied to the pixels instead.
fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate270(),
        6 => img.rotate90(),
        7 => img.fliph().rotate90(),
        8 => img.rotate270(),
        _ => img,
    }
}
