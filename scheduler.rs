use crate::config::Settings;
use crate::db::DbPool;
use crate::orchestrator::{self, Collaborators};
use crate::store;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Offset, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Operator commands accepted while the scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Arm and drain right now, regardless of the wall-clock trigger.
    DrainNow,
    /// Toggle immediate mode: drain whenever pending work exists.
    SetImmediate(bool),
    Stop,
}

impl Command {
    pub fn as_wire(self) -> &'static str {
        match self {
            Command::DrainNow => "DRAIN_NOW",
            Command::SetImmediate(true) => "IMMEDIATE_ON",
            Command::SetImmediate(false) => "IMMEDIATE_OFF",
            Command::Stop => "STOP",
        }
    }

    pub fn parse_wire(value: &str) -> Option<Command> {
        match value {
            "DRAIN_NOW" => Some(Command::DrainNow),
            "IMMEDIATE_ON" => Some(Command::SetImmediate(true)),
            "IMMEDIATE_OFF" => Some(Command::SetImmediate(false)),
            "STOP" => Some(Command::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Armed,
    Draining,
}

/// Next wall-clock trigger strictly after `after`, in `after`'s timezone.
/// Out-of-range configuration is clamped rather than rejected.
pub fn next_trigger(after: DateTime<FixedOffset>, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    let naive = after
        .date_naive()
        .and_hms_opt(hour.min(23), minute.min(59), 0);
    let candidate = match naive.and_then(|n| n.and_local_timezone(*after.offset()).single()) {
        Some(candidate) => candidate,
        // Unreachable with clamped inputs and a fixed offset.
        None => return after + ChronoDuration::days(1),
    };
    if candidate <= after {
        candidate + ChronoDuration::days(1)
    } else {
        candidate
    }
}

fn configured_offset(settings: &Settings) -> FixedOffset {
    match FixedOffset::east_opt(settings.utc_offset_minutes * 60) {
        Some(offset) => offset,
        None => {
            log::warn!(
                "utc_offset_minutes = {} is out of range; using UTC",
                settings.utc_offset_minutes
            );
            Utc.fix()
        }
    }
}

/// IDLE -> ARMED -> DRAINING -> IDLE loop. Arms daily at the configured
/// trigger, on `DrainNow`, or whenever work exists in immediate mode.
/// Runs until `Stop`, a hangup, or an external cancel.
pub fn run_scheduler(
    pool: DbPool,
    collaborators: Collaborators,
    settings: Settings,
    rx: Receiver<Command>,
    cancel: Arc<AtomicBool>,
) {
    let offset = configured_offset(&settings);
    let mut immediate = settings.immediate;
    let mut next = next_trigger(
        Utc::now().with_timezone(&offset),
        settings.trigger_hour,
        settings.trigger_minute,
    );
    let mut state = SchedulerState::Idle;
    log::info!("Scheduler started; next trigger at {next}");

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let mut commands = Vec::new();
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(command) => commands.push(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        commands.extend(poll_control(&pool));

        let mut stop = false;
        for command in commands {
            match command {
                Command::Stop => {
                    // Leaves any in-flight item at its last committed state.
                    cancel.store(true, Ordering::Relaxed);
                    stop = true;
                }
                Command::DrainNow => {
                    state = SchedulerState::Armed;
                }
                Command::SetImmediate(value) => {
                    immediate = value;
                    log::info!("Immediate mode: {immediate}");
                }
            }
        }
        if stop {
            break;
        }

        let now = Utc::now().with_timezone(&offset);
        if state == SchedulerState::Idle {
            if now >= next {
                state = SchedulerState::Armed;
                next = next_trigger(now, settings.trigger_hour, settings.trigger_minute);
            } else if immediate && has_pending_work(&pool) {
                state = SchedulerState::Armed;
            }
        }

        if state == SchedulerState::Armed {
            state = SchedulerState::Draining;
            log::debug!("Scheduler state: {state:?}");
            match orchestrator::run_drain(&pool, &collaborators, &settings, &cancel) {
                Ok(outcome) => {
                    log::info!(
                        "Scheduled drain {} done ({} items)",
                        outcome.run_id,
                        outcome.snapshot_size
                    );
                }
                Err(err) => {
                    // Store-level failure; the run already stopped cleanly.
                    log::error!("Drain aborted: {err}");
                }
            }
            state = SchedulerState::Idle;
            log::info!("Scheduler idle; next trigger at {next}");
        }
    }
    log::info!("Scheduler stopped");
}

// Immediate mode only reacts to untouched records; anything mid-retry waits
// for the wall-clock trigger or an operator command.
fn has_pending_work(pool: &DbPool) -> bool {
    match pool.get() {
        Ok(conn) => store::fresh_work_count(&conn).map(|n| n > 0).unwrap_or(false),
        Err(err) => {
            log::warn!("Pending-work check failed: {err}");
            false
        }
    }
}

/// Drains the control mailbox written by CLI subcommands.
fn poll_control(pool: &DbPool) -> Vec<Command> {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(err) => {
            log::warn!("Control poll failed: {err}");
            return Vec::new();
        }
    };
    match store::take_control_commands(&conn) {
        Ok(wire) => wire
            .iter()
            .filter_map(|value| {
                let parsed = Command::parse_wire(value);
                if parsed.is_none() {
                    log::warn!("Ignoring unknown control command: {value}");
                }
                parsed
            })
            .collect(),
        Err(err) => {
            log::warn!("Control poll failed: {err}");
            Vec::new()
        }
    }
}
