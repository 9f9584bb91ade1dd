/// Periodic posting of generated sentences to one channel.
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::generator::SentenceGenerator;
use crate::schema::message::ChannelId;
use crate::schema::platform::ChatPlatform;

#[derive(Debug, Clone, Copy)]
pub struct AutoPostSettings {
    pub channel: ChannelId,
    pub interval: Duration,
    /// Inclusive range of sentences per tick.
    pub min: u32,
    pub max: u32,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct AutoPoster {
    platform: Arc<dyn ChatPlatform>,
    generator: Arc<SentenceGenerator>,
    settings: AutoPostSettings,
    running: Mutex<Option<Running>>,
}

impl AutoPoster {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        generator: Arc<SentenceGenerator>,
        settings: AutoPostSettings,
    ) -> Self {
        Self {
            platform,
            generator,
            settings,
            running: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(post_loop(
            self.platform.clone(),
            self.generator.clone(),
            self.settings,
            cancel.clone(),
        ));
        info!(
            channel = %self.settings.channel,
            interval_secs = self.settings.interval.as_secs(),
            "auto posting started"
        );
        *running = Some(Running { cancel, task });
    }

    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        running.cancel.cancel();
        info!("auto posting stopped");
        Some(running.task)
    }

    /// Post one batch now. Returns how many sentences were sent.
    pub async fn post_batch(&self) -> usize {
        post_batch(self.platform.as_ref(), &self.generator, &self.settings).await
    }
}

impl Drop for AutoPoster {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            running.cancel.cancel();
        }
    }
}

async fn post_loop(
    platform: Arc<dyn ChatPlatform>,
    generator: Arc<SentenceGenerator>,
    settings: AutoPostSettings,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        post_batch(platform.as_ref(), &generator, &settings).await;
    }
}

async fn post_batch(
    platform: &dyn ChatPlatform,
    generator: &SentenceGenerator,
    settings: &AutoPostSettings,
) -> usize {
    if !generator.is_ready() {
        debug!("auto post skipped: no model yet");
        return 0;
    }
    let (lo, hi) = (settings.min.min(settings.max), settings.max.max(settings.min));
    let count = rand::thread_rng().gen_range(lo..=hi);

    let mut sent = 0;
    for _ in 0..count {
        let Some(sentence) = generator.generate(None) else {
            warn!("auto post: generation failed");
            continue;
        };
        match platform.send(settings.channel, &sentence).await {
            Ok(()) => sent += 1,
            Err(err) => warn!(channel = %settings.channel, error = %err, "auto post failed"),
        }
    }
    sent
}
