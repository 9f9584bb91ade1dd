/// Engine integration tests — bootstrap, commands, and the background timers.
mod common;

use chatter_engine::config::ChatterConfig;
use chatter_engine::core::autopost::{AutoPostSettings, AutoPoster};
use chatter_engine::core::engine::{ChatterEngine, EngineError};
use chatter_engine::core::generator::{GenerateError, SentenceGenerator, SpacePolicy, DEFAULT_TRIES};
use chatter_engine::core::harvest::{HarvestJob, HarvestSettings};
use chatter_engine::core::corpus::CorpusStore;
use chatter_engine::core::model::{ModelBuilder, ModelHandle};
use chatter_engine::core::scheduler::{ScheduleSettings, Scheduler};
use chatter_engine::core::tokenizer::WhitespaceSegmenter;
use chatter_engine::schema::message::{Channel, ChannelId};
use chrono_tz::Tz;
use common::{FixedConfirm, MockPlatform, GUILD};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config_in(dir: &Path) -> ChatterConfig {
    let mut config = ChatterConfig::default();
    config.corpus_path = dir.join("data.txt");
    config.generation.segmenter = chatter_engine::core::tokenizer::SegmenterKind::Whitespace;
    config.generation.space_policy = SpacePolicy::Keep;
    config
}

fn chatty_guild(platform: &MockPlatform) {
    platform.add_channels(GUILD, vec![Channel::text(10, "general")]);
    platform.add_messages(
        10,
        &[
            "the cat sat on the mat and slept all day",
            "the dog ran to the park and slept all night",
            "the cat ran to the door and barked at birds",
            "the dog sat on the rug and ate all day",
        ],
    );
}

#[test]
fn build_requires_platform() {
    let result = ChatterEngine::builder().config(ChatterConfig::default()).build();
    assert!(matches!(result, Err(EngineError::MissingPlatform)));
}

#[test]
fn build_rejects_invalid_config() {
    let mut config = ChatterConfig::default();
    config.generation.ngram = 9;
    let result = ChatterEngine::builder()
        .config(config)
        .platform(MockPlatform::new())
        .build();
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn build_rejects_oversized_auto_interval() {
    let mut config = ChatterConfig::default();
    config.auto.enabled = true;
    config.auto.channel = Some(7);
    config.auto.interval_minutes = u64::MAX / 2;
    let result = ChatterEngine::builder()
        .config(config)
        .platform(MockPlatform::new())
        .build();
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[tokio::test]
async fn bootstrap_without_corpus_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ChatterEngine::builder()
        .config(config_in(dir.path()))
        .platform(MockPlatform::new())
        .build()
        .unwrap();

    assert!(!engine.bootstrap().await.unwrap());
    assert_eq!(engine.make(None), Err(GenerateError::NotReady));

    std::fs::write(dir.path().join("data.txt"), "").unwrap();
    assert!(!engine.bootstrap().await.unwrap());
}

#[tokio::test]
async fn bootstrap_loads_existing_corpus() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy("tests/fixtures/chat_corpus.txt", dir.path().join("data.txt")).unwrap();
    let engine = ChatterEngine::builder()
        .config(config_in(dir.path()))
        .platform(MockPlatform::new())
        .rng_seed(9)
        .build()
        .unwrap();

    assert!(engine.bootstrap().await.unwrap());
    assert!(engine.make(None).is_ok());
}

#[tokio::test]
async fn setup_then_make_and_channels() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.ron");
    std::fs::write(
        &config_path,
        format!(
            "(corpus_path: {:?}, generation: (segmenter: Whitespace, space_policy: Keep))",
            dir.path().join("data.txt")
        ),
    )
    .unwrap();
    let platform = MockPlatform::new();
    chatty_guild(&platform);

    let engine = ChatterEngine::builder()
        .config_path(&config_path)
        .platform(platform.clone())
        .rng_seed(1)
        .build()
        .unwrap();

    assert!(engine.setup(GUILD, &FixedConfirm::yes()).await.is_success());

    let sentence = engine.make(Some("the")).unwrap();
    assert!(sentence.starts_with("the "), "{sentence}");
    assert!(engine.make(None).is_ok());
    assert_eq!(
        engine.make(Some("zebra")),
        Err(GenerateError::SeedNotFound("zebra".to_string()))
    );

    let overview = engine.channels(GUILD).await.unwrap();
    assert_eq!(overview.included, vec!["general"]);
    assert_eq!(ChatterConfig::load_from_ron(&config_path).unwrap().guild, Some(GUILD.0));
}

#[tokio::test]
async fn scheduler_waits_for_first_setup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.regenerate.enabled = true;
    let platform = MockPlatform::new();
    chatty_guild(&platform);

    let engine = ChatterEngine::builder()
        .config(config)
        .platform(platform)
        .build()
        .unwrap();

    engine.start();
    assert!(!engine.scheduler().is_started());

    assert!(engine.setup(GUILD, &FixedConfirm::yes()).await.is_success());
    assert!(engine.scheduler().is_started());

    engine.shutdown().await;
    assert!(!engine.scheduler().is_started());
}

#[tokio::test]
async fn scheduler_starts_with_known_guild() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.regenerate.enabled = true;
    config.guild = Some(GUILD.0);

    let engine = ChatterEngine::builder()
        .config(config)
        .platform(MockPlatform::new())
        .build()
        .unwrap();

    engine.start();
    assert!(engine.scheduler().is_started());
    engine.shutdown().await;
    assert!(!engine.scheduler().is_started());
}

#[tokio::test(start_paused = true)]
async fn scheduled_regeneration_runs_incremental_harvest() {
    let dir = tempfile::tempdir().unwrap();
    let platform = MockPlatform::new();
    chatty_guild(&platform);
    let model = ModelHandle::new();
    let job = HarvestJob::new(
        platform.clone(),
        Arc::new(WhitespaceSegmenter),
        CorpusStore::new(dir.path().join("data.txt")),
        ModelBuilder::new(model.clone(), 3, true),
        HarvestSettings::default(),
    )
    .with_target_guild(Some(GUILD));
    let scheduler = Scheduler::new(
        Arc::new(job),
        ScheduleSettings {
            hour: 3,
            timezone: Tz::UTC,
        },
    );

    scheduler.start();
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(25 * 3600)).await;
    scheduler.stop().unwrap().await.unwrap();

    let fetched = platform.fetched();
    assert!(!fetched.is_empty());
    assert!(fetched.iter().all(|(_, after)| after.is_some()));
    assert!(model.is_ready());
    assert!(scheduler.stop().is_none());
}

fn ready_generator() -> Arc<SentenceGenerator> {
    let handle = ModelHandle::new();
    ModelBuilder::new(handle.clone(), 3, true)
        .rebuild(&std::fs::read_to_string("tests/fixtures/chat_corpus.txt").unwrap())
        .unwrap();
    Arc::new(SentenceGenerator::new(
        handle,
        Arc::new(WhitespaceSegmenter),
        DEFAULT_TRIES,
        SpacePolicy::Strip,
    ))
}

#[tokio::test]
async fn auto_post_sends_between_min_and_max() {
    let platform = MockPlatform::new();
    let poster = AutoPoster::new(
        platform.clone(),
        ready_generator(),
        AutoPostSettings {
            channel: ChannelId(7),
            interval: Duration::from_secs(60),
            min: 2,
            max: 4,
        },
    );

    let sent = poster.post_batch().await;
    assert!((2..=4).contains(&sent));
    assert_eq!(platform.sent_to(7).len(), sent);
}

#[tokio::test]
async fn auto_post_skips_without_model() {
    let platform = MockPlatform::new();
    let generator = Arc::new(SentenceGenerator::new(
        ModelHandle::new(),
        Arc::new(WhitespaceSegmenter),
        DEFAULT_TRIES,
        SpacePolicy::Strip,
    ));
    let poster = AutoPoster::new(
        platform.clone(),
        generator,
        AutoPostSettings {
            channel: ChannelId(7),
            interval: Duration::from_secs(60),
            min: 1,
            max: 1,
        },
    );

    assert_eq!(poster.post_batch().await, 0);
    assert!(platform.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_post_loop_posts_every_interval() {
    let platform = MockPlatform::new();
    let poster = AutoPoster::new(
        platform.clone(),
        ready_generator(),
        AutoPostSettings {
            channel: ChannelId(7),
            interval: Duration::from_secs(3600),
            min: 1,
            max: 1,
        },
    );

    poster.start();
    tokio::time::sleep(Duration::from_secs(2 * 3600 + 1)).await;
    poster.stop().unwrap().await.unwrap();

    // Ticks at 0h, 1h and 2h.
    assert_eq!(platform.sent_to(7).len(), 3);
}
