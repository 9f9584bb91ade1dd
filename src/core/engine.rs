/// Composition root: wires config, corpus, model, harvest, timers and
/// generation together, and exposes one method per chat command.
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ChatterConfig, ConfigError, ConfigStore};
use crate::core::autopost::{AutoPostSettings, AutoPoster};
use crate::core::corpus::{CorpusError, CorpusStore};
use crate::core::generator::{GenerateError, SentenceGenerator};
use crate::core::harvest::{
    ChannelOverview, Confirmation, HarvestJob, HarvestOutcome, HarvestSettings,
};
use crate::core::markov::MarkovError;
use crate::core::model::{ModelBuilder, ModelHandle};
use crate::core::scheduler::{ScheduleSettings, Scheduler};
use crate::core::tokenizer::Segmenter;
use crate::schema::message::{ChannelId, GuildId};
use crate::schema::platform::{ChatPlatform, PlatformError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),
    #[error("model build failed: {0}")]
    Build(#[from] MarkovError),
    #[error("no chat platform was provided")]
    MissingPlatform,
    #[error("background task failed: {0}")]
    Task(String),
}

/// The running bot core. Built via `ChatterEngine::builder()`.
pub struct ChatterEngine {
    config: ChatterConfig,
    platform: Arc<dyn ChatPlatform>,
    model: ModelHandle,
    builder: ModelBuilder,
    generator: Arc<SentenceGenerator>,
    scheduler: Scheduler,
    autoposter: Option<AutoPoster>,
    started: AtomicBool,
}

/// Builder for constructing a `ChatterEngine`.
#[derive(Default)]
pub struct ChatterEngineBuilder {
    config: Option<ChatterConfig>,
    config_path: Option<PathBuf>,
    platform: Option<Arc<dyn ChatPlatform>>,
    segmenter: Option<Arc<dyn Segmenter>>,
    rng_seed: Option<u64>,
}

impl ChatterEngine {
    pub fn builder() -> ChatterEngineBuilder {
        ChatterEngineBuilder::default()
    }

    pub fn config(&self) -> &ChatterConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn generator(&self) -> &Arc<SentenceGenerator> {
        &self.generator
    }

    pub fn job(&self) -> &Arc<HarvestJob> {
        self.scheduler.job()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Load the model from an existing corpus.
    ///
    /// Returns whether a model is ready afterwards. A missing or empty
    /// corpus is not an error.
    pub async fn bootstrap(&self) -> Result<bool, EngineError> {
        let store = self.job().corpus().clone();
        if !store.exists() {
            info!(path = %store.path().display(), "no model yet, run setup");
            return Ok(false);
        }

        let builder = self.builder.clone();
        let built = tokio::task::spawn_blocking(move || -> Result<(), EngineError> {
            let text = store.read_all()?;
            builder.rebuild(&text)?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?;

        match built {
            Ok(()) => Ok(true),
            Err(EngineError::Build(MarkovError::EmptyCorpus)) => {
                info!("corpus is empty: no model yet, run setup");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Start the daily scheduler and the auto poster, as configured.
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        self.start_scheduler_if_ready();
        if let Some(poster) = &self.autoposter {
            poster.start();
        }
    }

    /// Stop both timers and wait for a scheduled run in progress.
    pub async fn shutdown(&self) {
        self.started.store(false, Ordering::SeqCst);
        let poster = self.autoposter.as_ref().and_then(AutoPoster::stop);
        let scheduler = self.scheduler.stop();
        for handle in [poster, scheduler].into_iter().flatten() {
            if let Err(err) = handle.await {
                warn!(error = %err, "background task ended abnormally");
            }
        }
        info!("engine shut down");
    }

    fn start_scheduler_if_ready(&self) {
        if !self.config.regenerate.enabled {
            return;
        }
        if self.job().target_guild().is_none() {
            info!("daily regeneration waits for the first setup");
            return;
        }
        self.scheduler.start();
    }

    /// `setup`: confirmed full harvest of `guild`.
    pub async fn setup(&self, guild: GuildId, confirmer: &dyn Confirmation) -> HarvestOutcome {
        let outcome = self.scheduler.trigger_manual(guild, confirmer).await;
        if outcome.is_success() && self.started.load(Ordering::SeqCst) {
            self.start_scheduler_if_ready();
        }
        outcome
    }

    /// `make`: one sentence, optionally starting with `seed`.
    pub fn make(&self, seed: Option<&str>) -> Result<String, GenerateError> {
        self.generator.try_generate(seed)
    }

    /// `channels`: what a harvest of `guild` would read and skip.
    pub async fn channels(&self, guild: GuildId) -> Result<ChannelOverview, PlatformError> {
        self.job().channel_overview(guild).await
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }
}

impl ChatterEngineBuilder {
    pub fn config(mut self, config: ChatterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Config file to load (when no config is given) and to record the
    /// harvested guild in.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn platform(mut self, platform: Arc<dyn ChatPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Override the segmenter chosen by `generation.segmenter`.
    pub fn segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<ChatterEngine, EngineError> {
        let platform = self.platform.ok_or(EngineError::MissingPlatform)?;
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) if path.exists() => ChatterConfig::load_from_ron(path)?,
            (None, _) => ChatterConfig::default(),
        };

        let segmenter: Arc<dyn Segmenter> = match self.segmenter {
            Some(s) => s,
            None => Arc::from(config.generation.segmenter.build()),
        };

        let model = ModelHandle::new();
        let builder = ModelBuilder::new(
            model.clone(),
            config.generation.ngram,
            config.generation.reject_malformed,
        );

        let mut generator = SentenceGenerator::new(
            model.clone(),
            segmenter.clone(),
            config.generation.tries,
            config.generation.space_policy,
        );
        if let Some(seed) = self.rng_seed {
            generator = generator.with_rng_seed(seed);
        }
        let generator = Arc::new(generator);

        let timezone = config.timezone()?;
        let settings = HarvestSettings {
            rules: config.exclusion_rules(),
            timezone,
            lookback_days: config.regenerate.lookback_days,
            confirm_timeout: config.confirm_timeout(),
            log_channel: config.log_channel(),
        };
        let mut job = HarvestJob::new(
            platform.clone(),
            segmenter,
            CorpusStore::new(&config.corpus_path),
            builder.clone(),
            settings,
        )
        .with_target_guild(config.guild_id());
        if let Some(path) = self.config_path {
            job = job.with_config_store(ConfigStore::new(path));
        }

        let scheduler = Scheduler::new(
            Arc::new(job),
            ScheduleSettings {
                hour: config.regenerate.hour,
                timezone,
            },
        );

        let autoposter = match (config.auto.enabled, config.auto.channel) {
            (true, Some(channel)) => Some(AutoPoster::new(
                platform.clone(),
                generator.clone(),
                AutoPostSettings {
                    channel: ChannelId(channel),
                    interval: config.auto_interval(),
                    min: config.auto.min,
                    max: config.auto.max,
                },
            )),
            _ => None,
        };

        Ok(ChatterEngine {
            config,
            platform,
            model,
            builder,
            generator,
            scheduler,
            autoposter,
            started: AtomicBool::new(false),
        })
    }
}
