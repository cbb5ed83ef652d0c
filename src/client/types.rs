use serde::{Deserialize, Serialize};
use std::fmt;

/// Network location of a cluster master.
///
/// Candidate masters are resolved once at startup; failover replaces the
/// active master but never changes the candidate set. Equality is purely
/// address based, so two candidates with the same host and port are the
/// same master as far as failover is concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MasterAddress {
    pub host: String,
    pub port: u16,
}

impl MasterAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for MasterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Describes the application being registered with the master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationDescription {
    pub name: String,
    /// Upper bound on cores across all executors; `None` lets the master decide.
    pub max_cores: Option<u32>,
    pub memory_per_executor_mb: u32,
    pub cores_per_executor: Option<u32>,
    /// Command the workers launch for each executor.
    pub command: String,
    pub app_ui_url: String,
    pub initial_executor_limit: Option<u32>,
}

impl ApplicationDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_cores: None,
            memory_per_executor_mb: 1024,
            cores_per_executor: None,
            command: String::new(),
            app_ui_url: String::new(),
            initial_executor_limit: None,
        }
    }
}

/// Lifecycle state of an executor as reported by the master.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorState {
    Launching,
    Running,
    Killed,
    Failed,
    Lost,
    Exited,
    Decommissioned,
}

impl ExecutorState {
    /// Finished executors are gone for good and get reported as removed.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecutorState::Killed
                | ExecutorState::Failed
                | ExecutorState::Lost
                | ExecutorState::Exited
        )
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Launching => "LAUNCHING",
            ExecutorState::Running => "RUNNING",
            ExecutorState::Killed => "KILLED",
            ExecutorState::Failed => "FAILED",
            ExecutorState::Lost => "LOST",
            ExecutorState::Exited => "EXITED",
            ExecutorState::Decommissioned => "DECOMMISSIONED",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the membership session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientStatus {
    pub registered: bool,
    pub app_id: Option<String>,
    pub active_master: Option<MasterAddress>,
    pub master_web_ui_url: Option<String>,
    pub disconnected: bool,
    pub dead: bool,
    pub registration_attempt: u32,
}

/// Qualified executor id as seen by the application: `<app id>/<executor id>`.
pub fn full_executor_id(app_id: &str, executor_id: u32) -> String {
    format!("{}/{}", app_id, executor_id)
}
