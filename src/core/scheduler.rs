/// Daily regeneration timer and the manual setup trigger.
///
/// The next fire time is recomputed from the wall clock before every sleep,
/// so suspends and slow runs never accumulate drift.
use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::harvest::{Confirmation, HarvestJob, HarvestOutcome};
use crate::schema::message::GuildId;

/// When the daily run fires.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSettings {
    pub hour: u32,
    pub timezone: Tz,
}

/// First instant strictly after `now` whose local time is `hour:00`.
///
/// Days where `hour:00` does not exist locally (DST gaps) are skipped.
pub fn next_fire_after(now: DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > now {
                return candidate;
            }
        }
        day = day + Days::new(1);
    }
}

/// Next fire time, never at or before the one that just fired.
///
/// A run can finish while the wall clock still reads just before `hour:00`.
fn following_fire(now: DateTime<Tz>, last_fire: Option<DateTime<Tz>>, hour: u32) -> DateTime<Tz> {
    let from = last_fire.map_or(now, |fired| fired.max(now));
    next_fire_after(from, hour)
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the daily timer. `start` and `stop` are explicit.
pub struct Scheduler {
    job: Arc<HarvestJob>,
    settings: ScheduleSettings,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(job: Arc<HarvestJob>, settings: ScheduleSettings) -> Self {
        Self {
            job,
            settings,
            running: Mutex::new(None),
        }
    }

    pub fn is_started(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Spawn the timer loop. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("scheduler already started");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(timer_loop(self.job.clone(), self.settings, cancel.clone()));
        info!(hour = self.settings.hour, timezone = %self.settings.timezone, "scheduler started");
        *running = Some(Running { cancel, task });
    }

    /// Cancel the pending timer. A run already in progress finishes.
    ///
    /// Returns the loop's handle so callers can wait for that run.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        running.cancel.cancel();
        info!("scheduler stopped");
        Some(running.task)
    }

    /// Run a confirmed full harvest now. Rejected with `Busy` while any
    /// harvest is active; never queued.
    pub async fn trigger_manual(
        &self,
        guild: GuildId,
        confirmer: &dyn Confirmation,
    ) -> HarvestOutcome {
        self.job.setup(guild, confirmer).await
    }

    pub fn job(&self) -> &Arc<HarvestJob> {
        &self.job
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            running.cancel.cancel();
        }
    }
}

async fn timer_loop(job: Arc<HarvestJob>, settings: ScheduleSettings, cancel: CancellationToken) {
    let mut last_fire = None;
    loop {
        let now = Utc::now().with_timezone(&settings.timezone);
        let next = following_fire(now, last_fire, settings.hour);
        let wait = (next.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(next = %next, wait_secs = wait.as_secs(), "next regeneration scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        last_fire = Some(next);

        // Not raced against the token: a started run is allowed to finish.
        match job.regenerate().await {
            HarvestOutcome::Busy => warn!("scheduled regeneration skipped: a harvest is already running"),
            HarvestOutcome::Failed(err) => warn!(error = %err, "scheduled regeneration failed"),
            _ => {}
        }

        if cancel.is_cancelled() {
            break;
        }
    }
    debug!("scheduler loop exited");
}
