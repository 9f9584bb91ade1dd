/// Harvest job — collects chat history into the corpus and rebuilds the model.
///
/// A full harvest (setup) reads every admissible channel from the start of
/// history and replaces the corpus. An incremental harvest (the daily run)
/// reads only recent history and appends. Both finish by rebuilding the
/// model from the whole corpus.
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ConfigStore};
use crate::core::corpus::{CorpusError, CorpusStore};
use crate::core::filter::MessageFilter;
use crate::core::markov::MarkovError;
use crate::core::model::ModelBuilder;
use crate::core::tokenizer::{tokenize, Segmenter};
use crate::schema::message::{Channel, ChannelId, ChannelKind, GuildId};
use crate::schema::platform::{ChatPlatform, PlatformError};
use crate::schema::rules::ExclusionRules;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] PlatformError),
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),
    #[error("model build failed: {0}")]
    Build(#[from] MarkovError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no guild has been set up yet")]
    NoGuild,
    #[error("background task failed: {0}")]
    Task(String),
}

/// Which history a run reads and how it writes the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    /// Whole history; replaces the corpus.
    Full,
    /// History newer than `since`; appends to the corpus.
    Incremental { since: DateTime<Utc> },
}

impl HarvestMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental { .. } => "incremental",
        }
    }
}

/// Lifecycle of the most recent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    Idle,
    Confirming,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// Counters for one run in progress.
#[derive(Debug, Clone)]
pub struct HarvestRun {
    pub mode: HarvestMode,
    pub started_at: DateTime<Utc>,
    pub messages_scanned: u64,
    pub messages_admitted: u64,
}

impl HarvestRun {
    fn new(mode: HarvestMode) -> Self {
        Self {
            mode,
            started_at: Utc::now(),
            messages_scanned: 0,
            messages_admitted: 0,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub mode: HarvestMode,
    pub started_at: DateTime<Utc>,
    pub messages_scanned: u64,
    pub messages_admitted: u64,
    pub lines_written: usize,
    pub elapsed: Duration,
}

/// How an invocation ended.
#[derive(Debug)]
pub enum HarvestOutcome {
    Succeeded(HarvestReport),
    Failed(HarvestError),
    /// Nobody confirmed within the confirmation window.
    TimedOut,
    /// The confirmer said no.
    Declined,
    /// Another run holds the run lock.
    Busy,
}

impl HarvestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// What a full harvest is about to do, shown to whoever confirms it.
#[derive(Debug, Clone)]
pub struct HarvestPlan {
    pub guild: GuildId,
    pub excluded_channels: Vec<ChannelId>,
    pub excluded_prefixes: Vec<String>,
}

/// Human confirmation step in front of a full harvest.
#[async_trait]
pub trait Confirmation: Send + Sync {
    /// Resolve to `true` to start the harvest.
    async fn confirm(&self, plan: &HarvestPlan) -> bool;

    /// Called once the confirmed run has ended.
    async fn finished(&self, _outcome: &HarvestOutcome) {}
}

/// Channel names a harvest would read, and those it skips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOverview {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

/// Settings fixed for the lifetime of a job.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub rules: ExclusionRules,
    pub timezone: Tz,
    pub lookback_days: u32,
    pub confirm_timeout: Duration,
    /// Progress messages go here when set.
    pub log_channel: Option<ChannelId>,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            rules: ExclusionRules::default(),
            timezone: Tz::UTC,
            lookback_days: 2,
            confirm_timeout: Duration::from_secs(30),
            log_channel: None,
        }
    }
}

/// Local midnight `lookback_days` before `now`, in UTC.
pub fn incremental_cutoff(now: DateTime<Tz>, lookback_days: u32) -> DateTime<Utc> {
    let tz = now.timezone();
    let day = now
        .date_naive()
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .unwrap_or(NaiveDate::MIN);
    let midnight = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Runs harvests. At most one runs at a time.
pub struct HarvestJob {
    platform: Arc<dyn ChatPlatform>,
    segmenter: Arc<dyn Segmenter>,
    corpus: CorpusStore,
    builder: ModelBuilder,
    config_store: Option<ConfigStore>,
    settings: HarvestSettings,
    run_lock: AsyncMutex<()>,
    /// Set while a run holds `run_lock`.
    running: AtomicBool,
    state: Mutex<HarvestState>,
    target_guild: Mutex<Option<GuildId>>,
}

/// Holds the run lock for one run and keeps `running` in step with it.
struct RunGuard<'a> {
    job: &'a HarvestJob,
    _lock: AsyncMutexGuard<'a, ()>,
}

impl<'a> RunGuard<'a> {
    fn new(job: &'a HarvestJob, lock: AsyncMutexGuard<'a, ()>) -> Self {
        job.running.store(true, Ordering::Release);
        job.set_state(HarvestState::Running);
        Self { job, _lock: lock }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        // A run dropped mid-flight never reached Succeeded or Failed.
        let mut state = self.job.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == HarvestState::Running {
            *state = HarvestState::Failed;
        }
        self.job.running.store(false, Ordering::Release);
    }
}

impl HarvestJob {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        segmenter: Arc<dyn Segmenter>,
        corpus: CorpusStore,
        builder: ModelBuilder,
        settings: HarvestSettings,
    ) -> Self {
        Self {
            platform,
            segmenter,
            corpus,
            builder,
            config_store: None,
            settings,
            run_lock: AsyncMutex::new(()),
            running: AtomicBool::new(false),
            state: Mutex::new(HarvestState::Idle),
            target_guild: Mutex::new(None),
        }
    }

    /// Persist the guild of each successful full harvest here.
    pub fn with_config_store(mut self, store: ConfigStore) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Guild incremental runs read from.
    pub fn with_target_guild(self, guild: Option<GuildId>) -> Self {
        *self.target_guild.lock().unwrap_or_else(|e| e.into_inner()) = guild;
        self
    }

    pub fn state(&self) -> HarvestState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn target_guild(&self) -> Option<GuildId> {
        *self.target_guild.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    fn set_state(&self, state: HarvestState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Confirmation-phase transitions never overwrite a run in progress.
    fn set_state_unless_running(&self, state: HarvestState) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current != HarvestState::Running {
            *current = state;
        }
    }

    pub fn plan(&self, guild: GuildId) -> HarvestPlan {
        let mut excluded_channels: Vec<ChannelId> =
            self.settings.rules.excluded_channel_ids.iter().copied().collect();
        excluded_channels.sort_by_key(|c| c.0);
        HarvestPlan {
            guild,
            excluded_channels,
            excluded_prefixes: self.settings.rules.excluded_prefixes.clone(),
        }
    }

    /// Confirmed full harvest of `guild`.
    pub async fn setup(&self, guild: GuildId, confirmer: &dyn Confirmation) -> HarvestOutcome {
        if self.is_running() {
            info!(guild = %guild, "setup rejected: a harvest is already running");
            return HarvestOutcome::Busy;
        }

        self.set_state_unless_running(HarvestState::Confirming);
        let plan = self.plan(guild);
        match tokio::time::timeout(self.settings.confirm_timeout, confirmer.confirm(&plan)).await {
            Ok(true) => {}
            Ok(false) => {
                info!(guild = %guild, "setup declined");
                self.set_state_unless_running(HarvestState::Idle);
                return HarvestOutcome::Declined;
            }
            Err(_) => {
                info!(guild = %guild, timeout = ?self.settings.confirm_timeout, "setup confirmation timed out");
                self.set_state_unless_running(HarvestState::TimedOut);
                return HarvestOutcome::TimedOut;
            }
        }

        warn!(guild = %guild, "full harvest started; large histories can take more than ten minutes");
        let outcome = self.run(guild, HarvestMode::Full).await;
        confirmer.finished(&outcome).await;
        outcome
    }

    /// Incremental harvest of the target guild, reading recent history.
    pub async fn regenerate(&self) -> HarvestOutcome {
        let Some(guild) = self.target_guild() else {
            warn!("regeneration skipped: no guild has been set up");
            return HarvestOutcome::Failed(HarvestError::NoGuild);
        };
        let now = Utc::now().with_timezone(&self.settings.timezone);
        let since = incremental_cutoff(now, self.settings.lookback_days);
        self.run(guild, HarvestMode::Incremental { since }).await
    }

    /// Run a harvest unless another one holds the run lock.
    pub async fn run(&self, guild: GuildId, mode: HarvestMode) -> HarvestOutcome {
        let Ok(lock) = self.run_lock.try_lock() else {
            info!(guild = %guild, mode = mode.name(), "harvest rejected: another run is active");
            return HarvestOutcome::Busy;
        };
        let _guard = RunGuard::new(self, lock);

        let clock = Instant::now();
        let mut run = HarvestRun::new(mode);
        self.notify(&format!("Model update started ({}).", mode.name())).await;

        match self.execute(guild, &mut run).await {
            Ok(lines_written) => {
                let report = HarvestReport {
                    mode,
                    started_at: run.started_at,
                    messages_scanned: run.messages_scanned,
                    messages_admitted: run.messages_admitted,
                    lines_written,
                    elapsed: clock.elapsed(),
                };
                if mode == HarvestMode::Full {
                    self.adopt_guild(guild).await;
                }
                info!(
                    guild = %guild,
                    mode = mode.name(),
                    messages_scanned = report.messages_scanned,
                    messages_admitted = report.messages_admitted,
                    lines_written = report.lines_written,
                    elapsed_secs = report.elapsed.as_secs_f64(),
                    "harvest succeeded"
                );
                self.notify(&format!(
                    "Model update finished in {}s ({} of {} messages used).",
                    report.elapsed.as_secs(),
                    report.messages_admitted,
                    report.messages_scanned
                ))
                .await;
                self.set_state(HarvestState::Succeeded);
                HarvestOutcome::Succeeded(report)
            }
            Err(err) => {
                error!(
                    guild = %guild,
                    mode = mode.name(),
                    messages_scanned = run.messages_scanned,
                    error = %err,
                    "harvest failed"
                );
                self.notify(&format!("Model update failed: {err}")).await;
                self.set_state(HarvestState::Failed);
                HarvestOutcome::Failed(err)
            }
        }
    }

    async fn execute(&self, guild: GuildId, run: &mut HarvestRun) -> Result<usize, HarvestError> {
        let channels = self.platform.list_channels(guild).await?;
        let targets = self.eligible_channels(channels);
        info!(guild = %guild, channels = targets.len(), mode = run.mode.name(), "harvesting");

        let lines_written = match run.mode {
            HarvestMode::Full => {
                let mut lines = Vec::new();
                for channel in &targets {
                    lines.extend(self.collect_channel(channel, None, run).await?);
                }
                self.notify(&format!(
                    "Fetched {} messages ({} usable). Writing corpus...",
                    run.messages_scanned, run.messages_admitted
                ))
                .await;
                if lines.is_empty() {
                    return Err(MarkovError::EmptyCorpus.into());
                }
                let written = lines.len();
                let store = self.corpus.clone();
                blocking(move || Ok(store.replace_lines(&lines)?)).await?;
                written
            }
            HarvestMode::Incremental { since } => {
                let mut written = 0;
                for channel in &targets {
                    let lines = self.collect_channel(channel, Some(since), run).await?;
                    if lines.is_empty() {
                        continue;
                    }
                    written += lines.len();
                    let store = self.corpus.clone();
                    blocking(move || Ok(store.append_lines(&lines)?)).await?;
                }
                self.notify(&format!(
                    "Fetched {} messages ({} usable) since {}.",
                    run.messages_scanned, run.messages_admitted, since
                ))
                .await;
                written
            }
        };

        self.notify("Corpus written. Building model...").await;
        let store = self.corpus.clone();
        let builder = self.builder.clone();
        blocking(move || {
            let text = store.read_all()?;
            builder.rebuild(&text)?;
            Ok(())
        })
        .await?;

        Ok(lines_written)
    }

    /// Read one channel's history and return its admitted, tokenized lines.
    async fn collect_channel(
        &self,
        channel: &Channel,
        after: Option<DateTime<Utc>>,
        run: &mut HarvestRun,
    ) -> Result<Vec<String>, HarvestError> {
        let mut lines = Vec::new();
        let mut history = self.platform.fetch_history(channel, after);
        while let Some(message) = history.next().await {
            let message = message?;
            run.messages_scanned += 1;
            if !MessageFilter::admit(&message, &self.settings.rules) {
                continue;
            }
            let line = tokenize(self.segmenter.as_ref(), &message.content);
            if line.is_empty() {
                continue;
            }
            run.messages_admitted += 1;
            lines.push(line);
        }
        debug!(channel = %channel.id, name = %channel.name, lines = lines.len(), "channel collected");
        Ok(lines)
    }

    /// Channels whose history is read: categories dropped, forums replaced
    /// by their threads, excluded ids skipped.
    pub fn eligible_channels(&self, channels: Vec<Channel>) -> Vec<Channel> {
        let rules = &self.settings.rules;
        let mut out = Vec::new();
        for channel in channels {
            if rules.excludes_channel(channel.id) {
                continue;
            }
            match channel.kind {
                ChannelKind::Category => {}
                ChannelKind::Forum { threads } => out.extend(
                    threads
                        .into_iter()
                        .filter(|t| !rules.excludes_channel(t.id)),
                ),
                ChannelKind::Text | ChannelKind::Thread => out.push(channel),
            }
        }
        out
    }

    /// Names of the channels a harvest of `guild` would read and skip.
    pub async fn channel_overview(&self, guild: GuildId) -> Result<ChannelOverview, PlatformError> {
        let rules = &self.settings.rules;
        let mut overview = ChannelOverview::default();
        for channel in self.platform.list_channels(guild).await? {
            if rules.excludes_channel(channel.id) {
                overview.excluded.push(channel.name);
                continue;
            }
            match channel.kind {
                ChannelKind::Category => {}
                ChannelKind::Forum { threads } => {
                    for thread in threads {
                        if rules.excludes_channel(thread.id) {
                            overview.excluded.push(thread.name);
                        } else {
                            overview.included.push(thread.name);
                        }
                    }
                }
                ChannelKind::Text | ChannelKind::Thread => overview.included.push(channel.name),
            }
        }
        Ok(overview)
    }

    /// Make `guild` the target of incremental runs and persist it.
    /// Runs while the run lock is held.
    async fn adopt_guild(&self, guild: GuildId) {
        *self.target_guild.lock().unwrap_or_else(|e| e.into_inner()) = Some(guild);
        let Some(store) = self.config_store.clone() else {
            return;
        };
        if let Err(err) = blocking(move || Ok(store.record_guild(guild)?)).await {
            error!(guild = %guild, error = %err, "failed to persist guild to config");
        }
    }

    async fn notify(&self, text: &str) {
        let Some(channel) = self.settings.log_channel else {
            return;
        };
        if let Err(err) = self.platform.send(channel, text).await {
            warn!(channel = %channel, error = %err, "failed to post harvest progress");
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, HarvestError>
where
    F: FnOnce() -> Result<T, HarvestError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HarvestError::Task(e.to_string()))?
}
