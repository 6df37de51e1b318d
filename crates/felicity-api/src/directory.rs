//! Lookups against the core Felicity API: which events exist, who organizes
//! them and who is registered. The forum never stores this itself.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use felicity_types::models::EventInfo;

/// Event metadata rarely changes; registrations are always asked fresh.
const EVENT_CACHE_TTL: Duration = Duration::from_secs(60);

/// A hung core API must fail the request instead of stalling it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("request to core API failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("core API returned {0}")]
    Status(StatusCode),
}

pub enum Directory {
    Remote(RemoteDirectory),
    Static(StaticDirectory),
}

impl Directory {
    pub async fn event(&self, event_id: Uuid, token: &str) -> Result<Option<EventInfo>, DirectoryError> {
        match self {
            Self::Remote(remote) => remote.event(event_id, token).await,
            Self::Static(roster) => Ok(roster.events.get(&event_id).cloned()),
        }
    }

    pub async fn is_registered(&self, event_id: Uuid, user_id: Uuid, token: &str) -> Result<bool, DirectoryError> {
        match self {
            Self::Remote(remote) => remote.is_registered(event_id, token).await,
            Self::Static(roster) => Ok(roster.registrations.contains(&(event_id, user_id))),
        }
    }
}

pub struct RemoteDirectory {
    client: Client,
    base_url: String,
    events: RwLock<HashMap<Uuid, (Instant, EventInfo)>>,
}

#[derive(Deserialize)]
struct RegistrationCheck {
    registered: bool,
}

impl RemoteDirectory {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DirectoryError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;
        info!("Using core API at {} for forum access checks", base_url);
        Ok(Self {
            client,
            base_url,
            events: RwLock::new(HashMap::new()),
        })
    }

    async fn event(&self, event_id: Uuid, token: &str) -> Result<Option<EventInfo>, DirectoryError> {
        if let Some((fetched, info)) = self.events.read().await.get(&event_id) {
            if fetched.elapsed() < EVENT_CACHE_TTL {
                return Ok(Some(info.clone()));
            }
        }

        let resp = self
            .client
            .get(format!("{}/api/events/{}", self.base_url, event_id))
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!("Core API has no event {}", event_id);
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(DirectoryError::Status(resp.status()));
        }

        let info: EventInfo = resp.json().await?;
        self.events
            .write()
            .await
            .insert(event_id, (Instant::now(), info.clone()));
        Ok(Some(info))
    }

    /// The core API identifies the user from the forwarded token.
    async fn is_registered(&self, event_id: Uuid, token: &str) -> Result<bool, DirectoryError> {
        let resp = self
            .client
            .get(format!("{}/api/registrations/check/{}", self.base_url, event_id))
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Status(resp.status()));
        }

        let check: RegistrationCheck = resp.json().await?;
        Ok(check.registered)
    }
}

/// Fixed roster, loaded from a JSON file or built in code.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    events: HashMap<Uuid, EventInfo>,
    registrations: HashSet<(Uuid, Uuid)>,
}

#[derive(Deserialize)]
struct RosterFile {
    #[serde(default)]
    events: Vec<EventInfo>,
    #[serde(default)]
    registrations: Vec<RosterRegistration>,
}

#[derive(Deserialize)]
struct RosterRegistration {
    event_id: Uuid,
    user_id: Uuid,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let file: RosterFile = serde_json::from_str(raw).context("invalid roster JSON")?;
        let roster = file
            .registrations
            .into_iter()
            .fold(Self::new(), |roster, r| roster.with_registration(r.event_id, r.user_id));
        Ok(file.events.into_iter().fold(roster, Self::with_event))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster {}", path.display()))?;
        let roster = Self::from_json(&raw)?;
        info!(
            "Loaded static roster from {} ({} events, {} registrations)",
            path.display(),
            roster.events.len(),
            roster.registrations.len()
        );
        Ok(roster)
    }

    pub fn with_event(mut self, event: EventInfo) -> Self {
        self.events.insert(event.id, event);
        self
    }

    pub fn with_registration(mut self, event_id: Uuid, user_id: Uuid) -> Self {
        self.registrations.insert((event_id, user_id));
        self
    }
}
