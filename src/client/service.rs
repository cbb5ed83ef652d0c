use super::address::resolve_masters;
use super::endpoint::{ClientEndpoint, EndpointContext, EndpointHandle};
use super::listener::AppClientListener;
use super::protocol::RegisterApplication;
use super::transport::MasterTransport;
use super::types::{ClientStatus, MasterAddress};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Running {
    handle: EndpointHandle,
    task: JoinHandle<()>,
    shutdown: CancellationToken,
}

enum Lifecycle {
    Idle,
    Running(Running),
    Stopped,
}

/// Public face of the client: start registration, forward executor control
/// calls to the active master, stop.
pub struct AppClient {
    config: ClientConfig,
    masters: Arc<Vec<MasterAddress>>,
    client_id: Uuid,
    transport: Arc<dyn MasterTransport>,
    listener: Arc<dyn AppClientListener>,
    registered: Arc<AtomicBool>,
    app_id: Arc<OnceLock<String>>,
    lifecycle: Mutex<Lifecycle>,
}

impl AppClient {
    /// Resolves the configured masters; malformed urls are fatal here.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn MasterTransport>,
        listener: Arc<dyn AppClientListener>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let masters = resolve_masters(&config.masters)?;

        Ok(Arc::new(Self {
            config,
            masters: Arc::new(masters),
            client_id: Uuid::new_v4(),
            transport,
            listener,
            registered: Arc::new(AtomicBool::new(false)),
            app_id: Arc::new(OnceLock::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }))
    }

    pub fn masters(&self) -> &[MasterAddress] {
        &self.masters
    }

    pub fn app_id(&self) -> Option<String> {
        self.app_id.get().cloned()
    }

    /// Starts the endpoint and the first registration round. Calling it again
    /// returns the same handle.
    pub async fn start(&self) -> Result<EndpointHandle> {
        let mut lifecycle = self.lifecycle.lock().await;

        match &*lifecycle {
            Lifecycle::Running(running) => {
                tracing::debug!("Client already started");
                return Ok(running.handle.clone());
            }
            Lifecycle::Stopped => return Err(ClientError::EndpointClosed),
            Lifecycle::Idle => {}
        }

        let shutdown = CancellationToken::new();
        let (endpoint, handle) = ClientEndpoint::new(EndpointContext {
            masters: self.masters.clone(),
            transport: self.transport.clone(),
            listener: self.listener.clone(),
            announce: RegisterApplication {
                client_id: self.client_id,
                description: self.config.application.clone(),
                reply_to: self.config.reply_to().to_string(),
            },
            registration: self.config.registration_settings(),
            ask_timeout: self.config.ask_timeout,
            registered: self.registered.clone(),
            app_id: self.app_id.clone(),
            shutdown: shutdown.clone(),
        });

        tracing::info!(
            "Starting application client '{}' (client id {})",
            self.config.application.name,
            self.client_id
        );

        let task = endpoint.spawn();
        *lifecycle = Lifecycle::Running(Running {
            handle: handle.clone(),
            task,
            shutdown,
        });

        Ok(handle)
    }

    async fn running_handle(&self) -> Option<EndpointHandle> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(running) => Some(running.handle.clone()),
            _ => None,
        }
    }

    /// Asks the active master for `total` executors in all. Returns `false`
    /// without any network round trip when the client is not registered yet.
    pub async fn request_total_executors(&self, total: u32) -> bool {
        let Some(handle) = self.running_handle().await else {
            tracing::warn!("Attempted to request executors before driver fully initialized.");
            return false;
        };
        if self.app_id.get().is_none() {
            tracing::warn!("Attempted to request executors before registering with Master.");
            return false;
        }
        handle.request_executors(total).await
    }

    pub async fn kill_executors(&self, executor_ids: Vec<String>) -> bool {
        let Some(handle) = self.running_handle().await else {
            tracing::warn!("Attempted to kill executors before driver fully initialized.");
            return false;
        };
        if self.app_id.get().is_none() {
            tracing::warn!("Attempted to kill executors before registering with Master.");
            return false;
        }
        handle.kill_executors(executor_ids).await
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        let handle = match &*self.lifecycle.lock().await {
            Lifecycle::Idle => return Err(ClientError::NotStarted),
            Lifecycle::Stopped => return Err(ClientError::EndpointClosed),
            Lifecycle::Running(running) => running.handle.clone(),
        };
        handle.status().await.ok_or(ClientError::EndpointClosed)
    }

    /// True once the endpoint loop and its registration machinery have exited,
    /// either through `stop()` or a terminal transition.
    pub async fn is_terminated(&self) -> bool {
        match &*self.lifecycle.lock().await {
            Lifecycle::Idle => false,
            Lifecycle::Running(running) => running.task.is_finished(),
            Lifecycle::Stopped => true,
        }
    }

    /// Stops the endpoint, waiting at most `stop_timeout` for it to acknowledge.
    /// Background work is torn down even when the acknowledgement never comes.
    pub async fn stop(&self) {
        let running = {
            let mut lifecycle = self.lifecycle.lock().await;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(running) => running,
                _ => return,
            }
        };

        match tokio::time::timeout(self.config.stop_timeout, running.handle.stop()).await {
            Ok(true) => tracing::info!("Application client stopped"),
            Ok(false) => tracing::debug!("Client endpoint had already stopped"),
            Err(_) => tracing::warn!(
                "Timed out after {:?} waiting for the client endpoint to stop; proceeding",
                self.config.stop_timeout
            ),
        }

        running.shutdown.cancel();
        if let Err(e) = running.task.await {
            tracing::error!("Client endpoint ended abnormally: {}", e);
        }
    }
}
