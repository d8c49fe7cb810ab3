//! Lifecycle state machine and event dispatcher.
//!
//! ```text
//!  Idle ──Install──▶ Installing ──ok──▶ Waiting ──Activate──▶ Activating ──▶ Active
//!   ▲                    │
//!   └──── Redundant ◀─err┘
//! ```
//!
//! Install and activate are serialized by a lifecycle lock. Fetches only read
//! a snapshot of the live identity and never wait on that lock, so a fetch may
//! run against an instance that an in-flight activation is about to delete.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::activation::{ActivationController, ClientSession, ControlMessage};
use crate::cache::{CacheDb, CacheIdentity};
use crate::config::AppConfig;
use crate::http::ProxyRequest;
use crate::lifecycle::LifecycleManager;
use crate::network::Network;
use crate::policy::EligibilityFilter;
use crate::strategy::{FetchStrategy, Served};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerState {
    Idle,
    Installing,
    /// Installed; waiting for permission to activate.
    Waiting,
    Activating,
    Active,
    /// Install failed; a later install may retry.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(ProxyRequest),
    Message(String),
}

impl WorkerEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Installed { seeded: usize, activation_ready: bool },
    Activated { deleted: Vec<CacheIdentity>, claimed: Vec<String> },
    Fetched(Served),
    Message { accepted: bool, activation_ready: bool },
}

/// Point-in-time view of the worker and its store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub identity: CacheIdentity,
    pub live: Option<CacheIdentity>,
    pub instances: Vec<CacheIdentity>,
    pub live_entries: u64,
    pub clients: Vec<ClientSession>,
}

pub struct Worker {
    state: RwLock<WorkerState>,
    live: RwLock<Option<CacheIdentity>>,
    lifecycle_lock: Mutex<()>,
    db: CacheDb,
    lifecycle: LifecycleManager,
    strategy: FetchStrategy,
    controller: ActivationController,
    auto_skip_waiting: bool,
}

impl Worker {
    /// Build a worker for the configured version.
    ///
    /// The previously activated identity recorded in the store, if any, stays
    /// live until this version activates.
    pub async fn from_config(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let identity = config.identity();

        let filter = EligibilityFilter::new(&origin, config.bypass_paths.clone());
        let strategy = FetchStrategy::new(filter, db.clone(), network.clone());
        let lifecycle = LifecycleManager::new(db.clone(), network, identity, origin, config.precache_manifest.clone());

        let live = db.live_identity().await?;
        if let Some(previous) = &live {
            tracing::info!(cache = %previous, "previous version live until activation");
        }

        Ok(Self {
            state: RwLock::new(WorkerState::Idle),
            live: RwLock::new(live),
            lifecycle_lock: Mutex::new(()),
            db,
            lifecycle,
            strategy,
            controller: ActivationController::new(),
            auto_skip_waiting: config.auto_skip_waiting,
        })
    }

    pub fn identity(&self) -> &CacheIdentity {
        self.lifecycle.identity()
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn live(&self) -> Option<CacheIdentity> {
        self.live.read().await.clone()
    }

    pub fn controller(&self) -> &ActivationController {
        &self.controller
    }

    /// Route one event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<WorkerOutcome, Error> {
        tracing::trace!(event = event.name(), "dispatch");
        match event {
            WorkerEvent::Install => self.install().await,
            WorkerEvent::Activate => self.activate().await,
            WorkerEvent::Fetch(request) => self.fetch(&request).await.map(WorkerOutcome::Fetched),
            WorkerEvent::Message(raw) => Ok(self.message(&raw).await),
        }
    }

    /// Install, then activate if nothing holds the activation back.
    pub async fn run_lifecycle(&self) -> Result<WorkerState, Error> {
        if let WorkerOutcome::Installed { activation_ready: true, .. } = self.dispatch(WorkerEvent::Install).await? {
            self.dispatch(WorkerEvent::Activate).await?;
        }
        Ok(self.state().await)
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        let from = *state;
        tracing::info!(cache = %self.identity(), %from, to = %next, "worker state");
        *state = next;
    }

    fn invalid(state: WorkerState, event: &WorkerEvent) -> Error {
        Error::InvalidTransition { state: state.to_string(), event: event.name().to_string() }
    }

    async fn install(&self) -> Result<WorkerOutcome, Error> {
        let _guard = self.lifecycle_lock.lock().await;

        let state = self.state().await;
        if !matches!(state, WorkerState::Idle | WorkerState::Redundant) {
            return Err(Self::invalid(state, &WorkerEvent::Install));
        }

        self.set_state(WorkerState::Installing).await;
        self.controller.reset().await;

        match self.lifecycle.install().await {
            Ok(seeded) => {
                self.set_state(WorkerState::Waiting).await;
                if self.auto_skip_waiting {
                    self.controller.skip_waiting().await;
                }
                let activation_ready = self.controller.may_activate(self.identity()).await;
                Ok(WorkerOutcome::Installed { seeded, activation_ready })
            }
            Err(e) => {
                tracing::warn!(cache = %self.identity(), error = %e, "install failed; previous version stays in control");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    async fn activate(&self) -> Result<WorkerOutcome, Error> {
        let _guard = self.lifecycle_lock.lock().await;

        let state = self.state().await;
        match state {
            WorkerState::Waiting => {
                if !self.controller.may_activate(self.identity()).await {
                    let held = self.controller.held_by_other(self.identity()).await;
                    return Err(Error::ActivationDeferred(held));
                }
            }
            WorkerState::Active => {}
            _ => return Err(Self::invalid(state, &WorkerEvent::Activate)),
        }

        let previous = self.live().await;
        if state == WorkerState::Waiting {
            self.set_state(WorkerState::Activating).await;
        }
        *self.live.write().await = Some(self.identity().clone());

        let deleted = match self.lifecycle.activate().await {
            Ok(deleted) => deleted,
            Err(e) => {
                if state == WorkerState::Waiting {
                    *self.live.write().await = previous;
                    self.set_state(WorkerState::Waiting).await;
                }
                return Err(e);
            }
        };

        let claimed = self.controller.claim(self.identity()).await;
        if state == WorkerState::Waiting {
            self.set_state(WorkerState::Active).await;
        }

        tracing::info!(cache = %self.identity(), claimed = claimed.len(), "activated");
        Ok(WorkerOutcome::Activated { deleted, claimed })
    }

    /// Intercept one request. Never waits on install or activate.
    pub async fn fetch(&self, request: &ProxyRequest) -> Result<Served, Error> {
        let live = self.live().await;

        if let Some(client_id) = &request.client_id {
            self.controller.register(client_id, live.as_ref()).await;
        }

        self.strategy.handle(request, live.as_ref()).await
    }

    async fn message(&self, raw: &str) -> WorkerOutcome {
        match ControlMessage::parse(raw) {
            Some(ControlMessage::SkipWaiting) => {
                self.controller.skip_waiting().await;
                let activation_ready = self.state().await == WorkerState::Waiting;
                tracing::info!(cache = %self.identity(), activation_ready, "skip waiting requested");
                WorkerOutcome::Message { accepted: true, activation_ready }
            }
            None => {
                tracing::debug!(len = raw.len(), "ignored control message");
                WorkerOutcome::Message { accepted: false, activation_ready: false }
            }
        }
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        let live = self.live().await;
        let live_entries = match &live {
            Some(live) => self.db.entry_count(live).await?,
            None => 0,
        };

        Ok(WorkerStatus {
            state: self.state().await,
            identity: self.identity().clone(),
            live,
            instances: self.db.instance_names().await?,
            live_entries,
            clients: self.controller.clients().await,
        })
    }
}
