use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use reqwest::Client;
use serde::Serialize;

use crate::config::settings::NotifierSettings;
use crate::errors::LadderError;
use crate::session::{Outcome, SessionStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecapEntry {
    pub player_name: String,
    pub outcome: Option<Outcome>,
    pub finish_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecapMatch {
    pub seed: Option<String>,
    pub entries: Vec<RecapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecap {
    pub league: String,
    pub session_id: i32,
    pub status: SessionStatus,
    pub start_date: DateTime<Utc>,
    pub matches: Vec<RecapMatch>,
}

/// Events emitted by the ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A session's matches. `to` is a user or the league's announce
    /// channel; `None` when the league has no announce channel.
    SessionRecap {
        to: Option<String>,
        recap: SessionRecap,
    },
    SpoilerLogUnlocked {
        player: String,
        seed: String,
        spoiler_log: String,
    },
    /// Needs a human: retries are exhausted and the ladder cannot proceed.
    OperatorAlert { message: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Picks the notifier matching the configuration.
pub fn from_settings(settings: &NotifierSettings) -> Result<Arc<dyn Notifier>> {
    match &settings.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone(), settings)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Sends `notification` within `timeout`, logging instead of failing.
/// Delivery problems never affect the state of a session.
pub async fn deliver(notifier: &dyn Notifier, notification: Notification, timeout: Duration) {
    match tokio::time::timeout(timeout, notifier.send(&notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Notification delivery failed: {:#}", e),
        Err(_) => error!("Notification delivery timed out after {:?}", timeout),
    }
}

/// Writes every event to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        match notification {
            Notification::SessionRecap { to, recap } => info!(
                "Recap for {} session {} ({}, {} matches) to {}",
                recap.league,
                recap.session_id,
                recap.status,
                recap.matches.len(),
                to.as_deref().unwrap_or("nobody")
            ),
            Notification::SpoilerLogUnlocked { player, seed, spoiler_log } => info!(
                "Spoiler log for seed {} sent to {} ({} bytes)",
                seed,
                player,
                spoiler_log.len()
            ),
            Notification::OperatorAlert { message } => warn!("Operator alert: {}", message),
        }
        Ok(())
    }
}

/// POSTs events as JSON to a webhook endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, settings: &NotifierSettings) -> Result<Self> {
        let client = Self::build_client(settings.user_agent, settings.timeout)?;
        Ok(Self { client, url })
    }

    fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
        Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| LadderError::Notification(e.to_string()))?;
        Ok(())
    }
}

/// Keeps notifications in memory, for embedding applications that poll
/// and for tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("Notification log poisoned"))?
            .push(notification.clone());
        Ok(())
    }
}
