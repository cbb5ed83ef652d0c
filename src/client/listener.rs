//! Lifecycle Listener
//!
//! The owning application observes the membership session through an
//! `AppClientListener`. `ListenerBridge` sits between the endpoint loop and the
//! listener and guarantees that `connected`, `disconnected` and `dead` are each
//! delivered at most once, however many internal triggers fire. Executor events
//! are forwarded as they arrive.

use std::sync::Arc;

/// Callbacks invoked by the client. Implementations must be cheap and must not
/// block: they run on the endpoint's message loop.
pub trait AppClientListener: Send + Sync {
    fn connected(&self, app_id: &str);

    /// The active master went away. The session may recover via a master change.
    fn disconnected(&self);

    /// The session ended for good and will not recover.
    fn dead(&self, reason: &str);

    fn executor_added(
        &self,
        full_id: &str,
        worker_id: &str,
        host_port: &str,
        cores: u32,
        memory_mb: u32,
    );

    fn executor_removed(
        &self,
        full_id: &str,
        message: &str,
        exit_status: Option<i32>,
        worker_host: Option<&str>,
    );

    fn executor_decommissioned(&self, _full_id: &str, _message: &str, _worker_host: Option<&str>) {}

    fn worker_removed(&self, _worker_id: &str, _host: &str, _message: &str) {}
}

/// Once-only guards around the lifecycle callbacks.
///
/// Owned by the endpoint loop, so the flags are plain booleans.
pub struct ListenerBridge {
    listener: Arc<dyn AppClientListener>,
    connected: bool,
    disconnected: bool,
    dead: bool,
}

impl ListenerBridge {
    pub fn new(listener: Arc<dyn AppClientListener>) -> Self {
        Self {
            listener,
            connected: false,
            disconnected: false,
            dead: false,
        }
    }

    /// Returns `true` when the callback was delivered.
    pub fn connected(&mut self, app_id: &str) -> bool {
        if self.connected {
            return false;
        }
        self.connected = true;
        self.listener.connected(app_id);
        true
    }

    pub fn disconnected(&mut self) -> bool {
        if self.disconnected {
            return false;
        }
        self.disconnected = true;
        self.listener.disconnected();
        true
    }

    /// Re-arms `disconnected` once a new master has taken over.
    pub fn reconnected(&mut self) {
        self.disconnected = false;
    }

    pub fn dead(&mut self, reason: &str) -> bool {
        if self.dead {
            return false;
        }
        self.dead = true;
        self.listener.dead(reason);
        true
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn executor_added(
        &self,
        full_id: &str,
        worker_id: &str,
        host_port: &str,
        cores: u32,
        memory_mb: u32,
    ) {
        self.listener
            .executor_added(full_id, worker_id, host_port, cores, memory_mb);
    }

    pub fn executor_removed(
        &self,
        full_id: &str,
        message: &str,
        exit_status: Option<i32>,
        worker_host: Option<&str>,
    ) {
        self.listener
            .executor_removed(full_id, message, exit_status, worker_host);
    }

    pub fn executor_decommissioned(&self, full_id: &str, message: &str, worker_host: Option<&str>) {
        self.listener
            .executor_decommissioned(full_id, message, worker_host);
    }

    pub fn worker_removed(&self, worker_id: &str, host: &str, message: &str) {
        self.listener.worker_removed(worker_id, host, message);
    }
}
