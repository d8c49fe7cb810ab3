//! Activation takeover: skip-waiting triggers and client claim.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cache::CacheIdentity;

/// Recognized control-channel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SkipWaiting,
}

impl ControlMessage {
    pub const SKIP_WAITING: &'static str = "SKIP_WAITING";

    /// Parse a raw message; anything unrecognized yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromStr for ControlMessage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            Self::SKIP_WAITING => Ok(ControlMessage::SkipWaiting),
            _ => Err(()),
        }
    }
}

/// An open client session and the version controlling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub id: String,
    pub controller: Option<CacheIdentity>,
}

/// Tracks skip-waiting and which version controls each client.
#[derive(Debug, Default)]
pub struct ActivationController {
    skip_waiting: RwLock<bool>,
    clients: RwLock<BTreeMap<String, Option<CacheIdentity>>>,
}

impl ActivationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the waiting version activate without waiting for old clients to close.
    pub async fn skip_waiting(&self) {
        *self.skip_waiting.write().await = true;
    }

    pub async fn is_skip_waiting(&self) -> bool {
        *self.skip_waiting.read().await
    }

    /// Forget a previous skip-waiting request, e.g. when a new install starts.
    pub(crate) async fn reset(&self) {
        *self.skip_waiting.write().await = false;
    }

    /// Register a client on first contact. Existing registrations are kept.
    pub async fn register(&self, client_id: &str, controller: Option<&CacheIdentity>) {
        self.clients
            .write()
            .await
            .entry(client_id.to_string())
            .or_insert_with(|| controller.cloned());
    }

    /// Clients controlled by some version other than `current`.
    pub async fn held_by_other(&self, current: &CacheIdentity) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.as_ref().is_some_and(|c| c != current))
            .count()
    }

    /// Whether the version `current`, installed and waiting, may activate now.
    pub async fn may_activate(&self, current: &CacheIdentity) -> bool {
        self.is_skip_waiting().await || self.held_by_other(current).await == 0
    }

    /// Take control of every open client. Returns the ids that changed controller.
    pub async fn claim(&self, current: &CacheIdentity) -> Vec<String> {
        let mut clients = self.clients.write().await;
        let mut claimed = Vec::new();
        for (id, controller) in clients.iter_mut() {
            if controller.as_ref() != Some(current) {
                *controller = Some(current.clone());
                claimed.push(id.clone());
            }
        }
        claimed
    }

    pub async fn clients(&self) -> Vec<ClientSession> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, controller)| ClientSession { id: id.clone(), controller: controller.clone() })
            .collect()
    }
}
