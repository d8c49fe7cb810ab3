//! Lifecycle tools: lifecycle_install, lifecycle_activate and post_message.
//!
//! Each tool dispatches one event to the worker and reports the state it
//! ended in.

use precache_core::{CacheIdentity, Worker, WorkerEvent, WorkerOutcome, WorkerState};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallOutput {
    pub state: WorkerState,
    /// Number of manifest entries stored.
    pub seeded: usize,
    /// Whether activation may proceed immediately.
    pub activation_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivateOutput {
    pub state: WorkerState,
    /// Stale cache instances removed.
    pub deleted: Vec<String>,
    /// Client sessions taken over.
    pub claimed: Vec<String>,
}

/// Parameters for the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageParams {
    /// Control token. Only "SKIP_WAITING" is recognized.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageOutput {
    pub accepted: bool,
    pub activation_ready: bool,
    pub state: WorkerState,
}

fn unexpected(outcome: &WorkerOutcome) -> McpError {
    ToolError::OutputFailed(format!("unexpected worker outcome: {outcome:?}")).into()
}

/// Implementation of the lifecycle_install tool.
pub async fn install_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let outcome = worker.dispatch(WorkerEvent::Install).await?;
    let WorkerOutcome::Installed { seeded, activation_ready } = outcome else {
        return Err(unexpected(&outcome));
    };

    json_result(&InstallOutput { state: worker.state().await, seeded, activation_ready })
}

/// Implementation of the lifecycle_activate tool.
pub async fn activate_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let outcome = worker.dispatch(WorkerEvent::Activate).await?;
    let WorkerOutcome::Activated { deleted, claimed } = outcome else {
        return Err(unexpected(&outcome));
    };

    json_result(&ActivateOutput {
        state: worker.state().await,
        deleted: deleted.iter().map(CacheIdentity::to_string).collect(),
        claimed,
    })
}

/// Implementation of the post_message tool.
pub async fn message_impl(worker: &Worker, params: PostMessageParams) -> Result<CallToolResult, McpError> {
    let outcome = worker.dispatch(WorkerEvent::Message(params.message)).await?;
    let WorkerOutcome::Message { accepted, activation_ready } = outcome else {
        return Err(unexpected(&outcome));
    };

    json_result(&PostMessageOutput { accepted, activation_ready, state: worker.state().await })
}
