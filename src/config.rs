/// Engine configuration — RON file loading, validation, and guild persistence.
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::core::generator::{SpacePolicy, DEFAULT_TRIES};
use crate::core::tokenizer::SegmenterKind;
use crate::schema::message::{ChannelId, GuildId};
use crate::schema::rules::ExclusionRules;

/// Longest accepted auto-post interval: one week.
pub const MAX_AUTO_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Longest accepted incremental lookback.
pub const MAX_LOOKBACK_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration. Every section has defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatterConfig {
    /// Where the tokenized corpus lives.
    pub corpus_path: PathBuf,
    /// Guild harvested by the last successful full harvest.
    pub guild: Option<u64>,
    pub exclude: ExcludeConfig,
    pub regenerate: RegenerateConfig,
    pub auto: AutoConfig,
    pub generation: GenerationConfig,
    pub setup: SetupConfig,
}

impl Default for ChatterConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data.txt"),
            guild: None,
            exclude: ExcludeConfig::default(),
            regenerate: RegenerateConfig::default(),
            auto: AutoConfig::default(),
            generation: GenerationConfig::default(),
            setup: SetupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    pub channels: Vec<u64>,
    pub prefixes: Vec<String>,
}

/// Daily incremental regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerateConfig {
    pub enabled: bool,
    /// Local hour (0-23) the daily run fires at.
    pub hour: u32,
    /// IANA timezone name, e.g. `Asia/Tokyo`.
    pub timezone: String,
    /// Incremental runs fetch messages newer than local midnight minus this many days.
    pub lookback_days: u32,
    /// Post progress messages to `log_channel`.
    pub log: bool,
    pub log_channel: Option<u64>,
}

impl Default for RegenerateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: 0,
            timezone: "Asia/Tokyo".to_string(),
            lookback_days: 2,
            log: false,
            log_channel: None,
        }
    }
}

/// Periodic automatic posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    pub enabled: bool,
    pub channel: Option<u64>,
    pub interval_minutes: u64,
    /// Inclusive range of sentences posted per tick.
    pub min: u32,
    pub max: u32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: None,
            interval_minutes: 60,
            min: 1,
            max: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub tries: u32,
    pub ngram: usize,
    pub segmenter: SegmenterKind,
    pub space_policy: SpacePolicy,
    pub reject_malformed: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            tries: DEFAULT_TRIES,
            ngram: 3,
            segmenter: SegmenterKind::ScriptRuns,
            space_policy: SpacePolicy::Strip,
            reject_malformed: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub confirm_timeout_secs: u64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 30,
        }
    }
}

impl ChatterConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<ChatterConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn parse_ron(input: &str) -> Result<ChatterConfig, ConfigError> {
        let config: ChatterConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.regenerate.hour > 23 {
            return invalid(format!("regenerate.hour must be 0-23, got {}", self.regenerate.hour));
        }
        self.timezone()?;
        if self.regenerate.lookback_days > MAX_LOOKBACK_DAYS {
            return invalid(format!(
                "regenerate.lookback_days must be at most {MAX_LOOKBACK_DAYS}, got {}",
                self.regenerate.lookback_days
            ));
        }
        if self.regenerate.log && self.regenerate.log_channel.is_none() {
            return invalid("regenerate.log is enabled but regenerate.log_channel is not set".into());
        }
        if !(2..=4).contains(&self.generation.ngram) {
            return invalid(format!("generation.ngram must be 2-4, got {}", self.generation.ngram));
        }
        if self.generation.tries == 0 {
            return invalid("generation.tries must be at least 1".into());
        }
        if self.auto.min > self.auto.max {
            return invalid(format!(
                "auto.min ({}) is greater than auto.max ({})",
                self.auto.min, self.auto.max
            ));
        }
        if !(1..=MAX_AUTO_INTERVAL_MINUTES).contains(&self.auto.interval_minutes) {
            return invalid(format!(
                "auto.interval_minutes must be 1-{MAX_AUTO_INTERVAL_MINUTES}, got {}",
                self.auto.interval_minutes
            ));
        }
        if self.auto.enabled && self.auto.channel.is_none() {
            return invalid("auto.enabled is set but auto.channel is not".into());
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.regenerate
            .timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid(format!("regenerate.timezone: {e}")))
    }

    pub fn exclusion_rules(&self) -> ExclusionRules {
        ExclusionRules::new(self.exclude.channels.iter().copied(), self.exclude.prefixes.clone())
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        self.guild.map(GuildId)
    }

    pub fn log_channel(&self) -> Option<ChannelId> {
        self.regenerate
            .log
            .then_some(self.regenerate.log_channel)
            .flatten()
            .map(ChannelId)
    }

    pub fn auto_interval(&self) -> Duration {
        Duration::from_secs(self.auto.interval_minutes.saturating_mul(60))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.setup.confirm_timeout_secs)
    }
}

/// Writes the one field the engine persists back into the config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `guild` in the config file as one read-modify-write.
    ///
    /// The file is re-read so manual edits made since startup survive; the
    /// new content replaces the old through a rename.
    pub fn record_guild(&self, guild: GuildId) -> Result<(), ConfigError> {
        let mut config = match std::fs::read_to_string(&self.path) {
            Ok(contents) => ron::from_str::<ChatterConfig>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ChatterConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.guild = Some(guild.0);
        let serialized = config.to_ron()?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serialized.as_bytes())?;
        if let Ok(meta) = std::fs::metadata(&self.path) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(guild = guild.0, path = %self.path.display(), "recorded guild in config");
        Ok(())
    }
}
