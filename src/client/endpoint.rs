//! Client Endpoint (Membership State Machine)
//!
//! A single tokio task owns every piece of mutable membership state and processes
//! `EndpointMessage`s from its mailbox one at a time. Everything else (inbound
//! HTTP handlers, registration attempts, the retry scheduler, the public
//! `AppClient` API) talks to it only by enqueueing messages through an
//! `EndpointHandle`.
//!
//! The one exception is the `registered` flag, which is mirrored into an
//! `AtomicBool` so registration attempts can skip redundant announces. It only
//! ever goes from `false` to `true`.

use super::listener::{AppClientListener, ListenerBridge};
use super::protocol::*;
use super::registration::{self, RegistrationSettings};
use super::transport::{MasterTransport, is_unreachable};
use super::types::{ClientStatus, ExecutorState, MasterAddress, full_executor_id};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ALL_MASTERS_UNRESPONSIVE: &str = "All masters are unresponsive! Giving up.";
pub const APPLICATION_STOPPED: &str = "Application has been stopped.";

pub enum EndpointMessage {
    /// A protocol message delivered by a master.
    Inbound(ClientMessage),
    /// The connection to `master` was lost.
    Disconnected(MasterAddress),
    NetworkError {
        master: MasterAddress,
        error: String,
    },
    RegistrationRound(u32),
    RegistrationTimedOut,
    RequestExecutors {
        total: u32,
        reply: oneshot::Sender<bool>,
    },
    KillExecutors {
        executor_ids: Vec<String>,
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<ClientStatus>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable sender side of the endpoint mailbox.
#[derive(Clone)]
pub struct EndpointHandle {
    tx: mpsc::UnboundedSender<EndpointMessage>,
}

impl EndpointHandle {
    /// Returns `false` once the endpoint has stopped.
    pub fn send(&self, message: EndpointMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn deliver(&self, message: ClientMessage) -> bool {
        self.send(EndpointMessage::Inbound(message))
    }

    /// Turns a failed send to `master` into the matching notice.
    pub fn report_failure(&self, master: MasterAddress, err: &anyhow::Error) {
        let message = if is_unreachable(err) {
            EndpointMessage::Disconnected(master)
        } else {
            EndpointMessage::NetworkError {
                master,
                error: err.to_string(),
            }
        };
        self.send(message);
    }

    pub async fn request_executors(&self, total: u32) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.send(EndpointMessage::RequestExecutors { total, reply }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn kill_executors(&self, executor_ids: Vec<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.send(EndpointMessage::KillExecutors {
            executor_ids,
            reply,
        }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn status(&self) -> Option<ClientStatus> {
        let (reply, rx) = oneshot::channel();
        if !self.send(EndpointMessage::Status { reply }) {
            return None;
        }
        rx.await.ok()
    }

    /// Asks the endpoint to stop; resolves to `false` if it is already gone.
    pub async fn stop(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if !self.send(EndpointMessage::Stop { reply }) {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct MembershipState {
    registered: bool,
    app_id: Option<String>,
    active_master: Option<MasterAddress>,
    master_web_ui_url: Option<String>,
    registration_attempt: u32,
}

/// Everything the endpoint needs that outlives a single message.
pub struct EndpointContext {
    pub masters: Arc<Vec<MasterAddress>>,
    pub transport: Arc<dyn MasterTransport>,
    pub listener: Arc<dyn AppClientListener>,
    pub announce: RegisterApplication,
    pub registration: RegistrationSettings,
    pub ask_timeout: Duration,
    pub registered: Arc<AtomicBool>,
    pub app_id: Arc<OnceLock<String>>,
    pub shutdown: CancellationToken,
}

pub struct ClientEndpoint {
    ctx: EndpointContext,
    state: MembershipState,
    listener: ListenerBridge,
    handle: EndpointHandle,
    inbox: mpsc::UnboundedReceiver<EndpointMessage>,
    registration_task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl ClientEndpoint {
    pub fn new(ctx: EndpointContext) -> (Self, EndpointHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let handle = EndpointHandle { tx };
        let listener = ListenerBridge::new(ctx.listener.clone());

        let endpoint = Self {
            ctx,
            state: MembershipState::default(),
            listener,
            handle: handle.clone(),
            inbox,
            registration_task: None,
            stopped: false,
        };

        (endpoint, handle)
    }

    /// Spawns the message loop; it starts registering with the masters right away.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        tracing::info!(
            "Client endpoint started, registering with {} master(s)",
            self.ctx.masters.len()
        );

        self.registration_task = Some(registration::spawn(
            self.ctx.masters.clone(),
            self.ctx.transport.clone(),
            self.ctx.announce.clone(),
            self.ctx.registration.clone(),
            self.ctx.registered.clone(),
            self.handle.clone(),
            self.ctx.shutdown.child_token(),
        ));

        while !self.stopped {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
            }
        }

        self.on_stop().await;
    }

    async fn on_stop(&mut self) {
        self.ctx.shutdown.cancel();
        self.inbox.close();

        if let Some(task) = self.registration_task.take()
            && let Err(e) = task.await
        {
            tracing::error!("Registration task ended abnormally: {}", e);
        }

        tracing::info!("Client endpoint stopped");
    }

    fn handle_message(&mut self, message: EndpointMessage) {
        match message {
            EndpointMessage::Inbound(message) => self.handle_inbound(message),

            EndpointMessage::Disconnected(address) => self.handle_disconnected(address),

            EndpointMessage::NetworkError { master, error } => {
                if self.ctx.masters.contains(&master) {
                    tracing::warn!("Could not connect to {}: {}", master, error);
                } else {
                    tracing::debug!("Network error from non-master {}: {}", master, error);
                }
            }

            EndpointMessage::RegistrationRound(attempt) => {
                self.state.registration_attempt = attempt;
            }

            EndpointMessage::RegistrationTimedOut => {
                if self.state.registered {
                    tracing::debug!("Ignoring registration timeout, already registered");
                } else {
                    self.mark_dead(ALL_MASTERS_UNRESPONSIVE);
                    self.stopped = true;
                }
            }

            EndpointMessage::RequestExecutors { total, reply } => {
                let request = self.state.app_id.clone().map(|app_id| {
                    MasterRequest::RequestExecutors(RequestExecutors {
                        app_id,
                        requested_total: total,
                    })
                });
                self.ask_master(request, reply, "request executors");
            }

            EndpointMessage::KillExecutors {
                executor_ids,
                reply,
            } => {
                let request = self.state.app_id.clone().map(|app_id| {
                    MasterRequest::KillExecutors(KillExecutors {
                        app_id,
                        executor_ids,
                    })
                });
                self.ask_master(request, reply, "kill executors");
            }

            EndpointMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }

            EndpointMessage::Stop { reply } => {
                self.mark_dead(APPLICATION_STOPPED);
                if let Some(app_id) = self.state.app_id.clone() {
                    self.send_to_master(MasterMessage::UnregisterApplication(
                        UnregisterApplication { app_id },
                    ));
                }
                let _ = reply.send(true);
                self.stopped = true;
            }
        }
    }

    fn handle_inbound(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::RegisteredApplication(RegisteredApplication { app_id, master }) => {
                self.handle_registered(app_id, master);
            }

            ClientMessage::ApplicationRemoved(ApplicationRemoved { message }) => {
                tracing::error!("Master removed our application: {}", message);
                self.mark_dead(&message);
                self.stopped = true;
            }

            ClientMessage::ExecutorAdded(added) => {
                let Some(app_id) = self.state.app_id.clone() else {
                    tracing::warn!("Ignoring executor {} added before registration", added.id);
                    return;
                };
                let full_id = full_executor_id(&app_id, added.id);
                tracing::info!(
                    "Executor added: {} on {} ({}) with {} core(s)",
                    full_id,
                    added.worker_id,
                    added.host_port,
                    added.cores
                );

                self.send_to_master(MasterMessage::ExecutorStateChanged(ExecutorStateChanged {
                    app_id,
                    executor_id: added.id,
                    state: ExecutorState::Running,
                    message: None,
                    exit_status: None,
                }));

                self.listener.executor_added(
                    &full_id,
                    &added.worker_id,
                    &added.host_port,
                    added.cores,
                    added.memory_mb,
                );
            }

            ClientMessage::ExecutorUpdated(updated) => {
                let Some(app_id) = self.state.app_id.as_deref() else {
                    tracing::warn!("Ignoring executor {} update before registration", updated.id);
                    return;
                };
                let full_id = full_executor_id(app_id, updated.id);
                let message = updated.message.unwrap_or_default();
                if message.is_empty() {
                    tracing::info!("Executor updated: {} is now {}", full_id, updated.state);
                } else {
                    tracing::info!(
                        "Executor updated: {} is now {} ({})",
                        full_id,
                        updated.state,
                        message
                    );
                }

                if updated.state.is_finished() {
                    self.listener.executor_removed(
                        &full_id,
                        &message,
                        updated.exit_status,
                        updated.worker_host.as_deref(),
                    );
                } else if updated.state == ExecutorState::Decommissioned {
                    self.listener.executor_decommissioned(
                        &full_id,
                        &message,
                        updated.worker_host.as_deref(),
                    );
                }
            }

            ClientMessage::WorkerRemoved(WorkerRemoved {
                worker_id,
                host,
                message,
            }) => {
                if !self.state.registered {
                    tracing::warn!("Ignoring removal of worker {} before registration", worker_id);
                    return;
                }
                tracing::info!("Master removed worker {}: {}", worker_id, message);
                self.listener.worker_removed(&worker_id, &host, &message);
            }

            ClientMessage::MasterChanged(MasterChanged {
                master,
                master_web_ui_url,
            }) => {
                tracing::info!("Master has changed, new master is at {}", master);
                self.state.active_master = Some(master);
                self.state.master_web_ui_url = Some(master_web_ui_url);
                self.listener.reconnected();

                match self.state.app_id.clone() {
                    Some(app_id) => self.send_to_master(MasterMessage::MasterChangeAcknowledged(
                        MasterChangeAcknowledged { app_id },
                    )),
                    None => tracing::warn!("Master changed before an application id was assigned"),
                }
            }
        }
    }

    /// Last registration wins for the active master; the first application id sticks.
    fn handle_registered(&mut self, app_id: String, master: MasterAddress) {
        if !self.ctx.masters.contains(&master) {
            tracing::warn!(
                "Ignoring registration of {} from {}, which is not a configured master",
                app_id,
                master
            );
            return;
        }

        let app_id = match self.state.app_id.clone() {
            Some(existing) => {
                if existing != app_id {
                    tracing::warn!(
                        "Master {} registered us as {}, keeping existing application id {}",
                        master,
                        app_id,
                        existing
                    );
                }
                existing
            }
            None => {
                let _ = self.ctx.app_id.set(app_id.clone());
                self.state.app_id = Some(app_id.clone());
                app_id
            }
        };

        self.state.registered = true;
        self.ctx.registered.store(true, Ordering::Release);
        self.state.active_master = Some(master.clone());

        tracing::info!(
            "Successfully registered with master {} as application {}",
            master,
            app_id
        );
        self.listener.connected(&app_id);
    }

    fn handle_disconnected(&mut self, address: MasterAddress) {
        if self.state.active_master.as_ref() != Some(&address) {
            if self.ctx.masters.contains(&address) {
                tracing::warn!("Could not connect to {}: master is unreachable", address);
            } else {
                tracing::debug!("Lost connection to non-master {}", address);
            }
            return;
        }
        tracing::warn!(
            "Connection to {} failed; waiting for master to reconnect...",
            address
        );
        self.listener.disconnected();
    }

    fn mark_dead(&mut self, reason: &str) {
        if self.listener.dead(reason) {
            tracing::error!("Application client is dead: {}", reason);
        }
    }

    /// Best effort; silently dropped when no master is active.
    fn send_to_master(&self, message: MasterMessage) {
        let Some(master) = self.state.active_master.clone() else {
            tracing::debug!("No active master, dropping {}", message.endpoint());
            return;
        };
        let transport = self.ctx.transport.clone();
        let handle = self.handle.clone();

        tokio::spawn(async move {
            if let Err(e) = transport.send(&master, message).await {
                tracing::warn!("Failed to send message to master {}: {}", master, e);
                handle.report_failure(master, &e);
            }
        });
    }

    /// Forwards a control request on its own task so the loop never waits on a master.
    /// The task is abandoned, answering `false`, once the endpoint shuts down.
    fn ask_master(
        &self,
        request: Option<MasterRequest>,
        reply: oneshot::Sender<bool>,
        what: &'static str,
    ) {
        let Some(request) = request else {
            tracing::warn!("Attempted to {} before registering with Master.", what);
            let _ = reply.send(false);
            return;
        };
        let Some(master) = self.state.active_master.clone() else {
            tracing::warn!("Attempted to {} while no master is active.", what);
            let _ = reply.send(false);
            return;
        };
        let transport = self.ctx.transport.clone();
        let handle = self.handle.clone();
        let timeout = self.ctx.ask_timeout;
        let cancel = self.ctx.shutdown.child_token();

        tokio::spawn(async move {
            let acknowledged = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Abandoning {} via master {}, client is stopping", what, master);
                    false
                }
                result = transport.ask(&master, request, timeout) => match result {
                    Ok(acknowledged) => acknowledged,
                    Err(e) => {
                        tracing::warn!("Failed to {} via master {}: {}", what, master, e);
                        handle.report_failure(master, &e);
                        false
                    }
                },
            };
            let _ = reply.send(acknowledged);
        });
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            registered: self.state.registered,
            app_id: self.state.app_id.clone(),
            active_master: self.state.active_master.clone(),
            master_web_ui_url: self.state.master_web_ui_url.clone(),
            disconnected: self.listener.is_disconnected(),
            dead: self.listener.is_dead(),
            registration_attempt: self.state.registration_attempt,
        }
    }
}
