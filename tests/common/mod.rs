//! Shared test doubles: an in-memory chat platform and scripted confirmers.
#![allow(dead_code)]

use async_trait::async_trait;
use chatter_engine::core::harvest::{Confirmation, HarvestOutcome, HarvestPlan};
use chatter_engine::schema::message::{Channel, ChannelId, ChannelKind, GuildId, Message};
use chatter_engine::schema::platform::{ChatPlatform, PlatformError};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// In-memory platform. Histories are returned oldest first.
#[derive(Default)]
pub struct MockPlatform {
    guilds: Mutex<HashMap<GuildId, Vec<Channel>>>,
    history: Mutex<HashMap<ChannelId, Vec<Message>>>,
    /// Channel fails after yielding this many messages.
    failures: Mutex<HashMap<ChannelId, usize>>,
    /// When set, every history stream waits for one permit before yielding.
    gate: Mutex<Option<Arc<Notify>>>,
    fetched: Mutex<Vec<(ChannelId, Option<DateTime<Utc>>)>>,
    sent: Mutex<Vec<(ChannelId, String)>>,
    failing_sends: Mutex<bool>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_channels(&self, guild: GuildId, channels: Vec<Channel>) {
        self.guilds
            .lock()
            .unwrap()
            .entry(guild)
            .or_default()
            .extend(channels);
    }

    /// Human messages in `channel`, stamped one minute apart ending now.
    pub fn add_messages(&self, channel: u64, contents: &[&str]) {
        let now = Utc::now();
        let count = contents.len() as i64;
        let messages = contents.iter().enumerate().map(|(i, c)| Message {
            content: c.to_string(),
            author_is_bot: false,
            channel_id: ChannelId(channel),
            timestamp: now - Duration::minutes(count - i as i64),
        });
        self.history
            .lock()
            .unwrap()
            .entry(ChannelId(channel))
            .or_default()
            .extend(messages);
    }

    pub fn add_message(&self, message: Message) {
        self.history
            .lock()
            .unwrap()
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    pub fn fail_after(&self, channel: u64, yielded: usize) {
        self.failures.lock().unwrap().insert(ChannelId(channel), yielded);
    }

    pub fn fail_sends(&self) {
        *self.failing_sends.lock().unwrap() = true;
    }

    /// Make history streams block until the returned `Notify` is signalled.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn fetched(&self) -> Vec<(ChannelId, Option<DateTime<Utc>>)> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetched_channels(&self) -> Vec<u64> {
        self.fetched().into_iter().map(|(c, _)| c.0).collect()
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel: u64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c.0 == channel)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn list_channels(&self, guild: GuildId) -> Result<Vec<Channel>, PlatformError> {
        self.guilds
            .lock()
            .unwrap()
            .get(&guild)
            .cloned()
            .ok_or(PlatformError::GuildNotFound(guild))
    }

    fn fetch_history<'a>(
        &'a self,
        channel: &'a Channel,
        after: Option<DateTime<Utc>>,
    ) -> BoxStream<'a, Result<Message, PlatformError>> {
        assert!(
            !matches!(channel.kind, ChannelKind::Category | ChannelKind::Forum { .. }),
            "history requested for container channel {}",
            channel.name
        );
        self.fetched.lock().unwrap().push((channel.id, after));

        let mut items: Vec<Result<Message, PlatformError>> = self
            .history
            .lock()
            .unwrap()
            .get(&channel.id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| after.map_or(true, |t| m.timestamp > t))
            .map(Ok)
            .collect();
        if let Some(&n) = self.failures.lock().unwrap().get(&channel.id) {
            items.truncate(n);
            items.push(Err(PlatformError::request(format!(
                "history of {} unavailable",
                channel.id
            ))));
        }

        let gate = self.gate.lock().unwrap().clone();
        stream::once(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
        })
        .flat_map(move |_| stream::iter(std::mem::take(&mut items)))
        .boxed()
    }

    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
        if *self.failing_sends.lock().unwrap() {
            return Err(PlatformError::ChannelNotFound(channel));
        }
        self.sent.lock().unwrap().push((channel, text.to_string()));
        Ok(())
    }
}

/// Answers every confirmation with a fixed value.
pub struct FixedConfirm {
    answer: bool,
    asked: AtomicUsize,
    finished: AtomicUsize,
}

impl FixedConfirm {
    pub fn yes() -> Self {
        Self::new(true)
    }

    pub fn no() -> Self {
        Self::new(false)
    }

    fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn asked_count(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Confirmation for FixedConfirm {
    async fn confirm(&self, _plan: &HarvestPlan) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }

    async fn finished(&self, _outcome: &HarvestOutcome) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Never answers.
pub struct SilentConfirm;

#[async_trait]
impl Confirmation for SilentConfirm {
    async fn confirm(&self, _plan: &HarvestPlan) -> bool {
        std::future::pending().await
    }
}

pub const GUILD: GuildId = GuildId(1);

/// Answers with a fixed value once released.
pub struct GatedConfirm {
    answer: bool,
    release: Notify,
}

impl GatedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            release: Notify::new(),
        }
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Confirmation for GatedConfirm {
    async fn confirm(&self, _plan: &HarvestPlan) -> bool {
        self.release.notified().await;
        self.answer
    }
}
