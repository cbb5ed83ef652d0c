//! Network Protocol Definitions
//!
//! Defines the messages exchanged between the application client and the cluster
//! masters, plus the HTTP routes both sides expose for them.
//!
//! Outbound messages (client -> master) are one-way except for the two control
//! requests, which are answered with an `AskReply`. Inbound messages
//! (master -> client) are all one-way.

use super::types::{ApplicationDescription, ExecutorState, MasterAddress};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ENDPOINT_REGISTER_APPLICATION: &str = "/master/register_application";
pub const ENDPOINT_UNREGISTER_APPLICATION: &str = "/master/unregister_application";
pub const ENDPOINT_EXECUTOR_STATE_CHANGED: &str = "/master/executor_state_changed";
pub const ENDPOINT_MASTER_CHANGE_ACKNOWLEDGED: &str = "/master/master_change_acknowledged";
pub const ENDPOINT_REQUEST_EXECUTORS: &str = "/master/request_executors";
pub const ENDPOINT_KILL_EXECUTORS: &str = "/master/kill_executors";

pub const ENDPOINT_REGISTERED_APPLICATION: &str = "/app/registered";
pub const ENDPOINT_APPLICATION_REMOVED: &str = "/app/removed";
pub const ENDPOINT_EXECUTOR_ADDED: &str = "/app/executor_added";
pub const ENDPOINT_EXECUTOR_UPDATED: &str = "/app/executor_updated";
pub const ENDPOINT_WORKER_REMOVED: &str = "/app/worker_removed";
pub const ENDPOINT_MASTER_CHANGED: &str = "/app/master_changed";
pub const ENDPOINT_STATUS: &str = "/status";

// ============================================================
// CLIENT -> MASTER
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterApplication {
    /// Stable for the lifetime of one client, so a master can recognise
    /// repeated announces across registration rounds.
    pub client_id: Uuid,
    pub description: ApplicationDescription,
    /// Where the master should send its replies (`host:port`).
    pub reply_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnregisterApplication {
    pub app_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorStateChanged {
    pub app_id: String,
    pub executor_id: u32,
    pub state: ExecutorState,
    pub message: Option<String>,
    pub exit_status: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterChangeAcknowledged {
    pub app_id: String,
}

/// One-way messages sent to a master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MasterMessage {
    RegisterApplication(RegisterApplication),
    UnregisterApplication(UnregisterApplication),
    ExecutorStateChanged(ExecutorStateChanged),
    MasterChangeAcknowledged(MasterChangeAcknowledged),
}

impl MasterMessage {
    pub fn endpoint(&self) -> &'static str {
        match self {
            MasterMessage::RegisterApplication(_) => ENDPOINT_REGISTER_APPLICATION,
            MasterMessage::UnregisterApplication(_) => ENDPOINT_UNREGISTER_APPLICATION,
            MasterMessage::ExecutorStateChanged(_) => ENDPOINT_EXECUTOR_STATE_CHANGED,
            MasterMessage::MasterChangeAcknowledged(_) => ENDPOINT_MASTER_CHANGE_ACKNOWLEDGED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestExecutors {
    pub app_id: String,
    pub requested_total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KillExecutors {
    pub app_id: String,
    pub executor_ids: Vec<String>,
}

/// Control requests that expect an acknowledgement from the master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MasterRequest {
    RequestExecutors(RequestExecutors),
    KillExecutors(KillExecutors),
}

impl MasterRequest {
    pub fn endpoint(&self) -> &'static str {
        match self {
            MasterRequest::RequestExecutors(_) => ENDPOINT_REQUEST_EXECUTORS,
            MasterRequest::KillExecutors(_) => ENDPOINT_KILL_EXECUTORS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskReply {
    pub acknowledged: bool,
}

// ============================================================
// MASTER -> CLIENT
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredApplication {
    pub app_id: String,
    pub master: MasterAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRemoved {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorAdded {
    pub id: u32,
    pub worker_id: String,
    pub host_port: String,
    pub cores: u32,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorUpdated {
    pub id: u32,
    pub state: ExecutorState,
    pub message: Option<String>,
    pub exit_status: Option<i32>,
    /// Set when the whole worker hosting the executor went away.
    #[serde(default)]
    pub worker_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRemoved {
    pub worker_id: String,
    pub host: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterChanged {
    pub master: MasterAddress,
    pub master_web_ui_url: String,
}

/// Messages a master delivers to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    RegisteredApplication(RegisteredApplication),
    ApplicationRemoved(ApplicationRemoved),
    ExecutorAdded(ExecutorAdded),
    ExecutorUpdated(ExecutorUpdated),
    WorkerRemoved(WorkerRemoved),
    MasterChanged(MasterChanged),
}
