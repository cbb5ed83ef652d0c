//! Master Transport
//!
//! The client talks to masters through the `MasterTransport` trait so the
//! membership logic stays independent of the wire. `HttpMasterTransport` is the
//! production implementation: JSON over HTTP, one POST route per message.
//!
//! Connection-level failures are reported as `MasterUnreachable` so the
//! endpoint can tell "the master is gone" apart from any other failure.

use super::protocol::{AskReply, MasterMessage, MasterRequest};
use super::types::MasterAddress;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF_MS: u64 = 150;
const MAX_BACKOFF_MS: u64 = 1200;

/// The master could not be reached at the connection level.
#[derive(Debug, thiserror::Error)]
#[error("master {0} is unreachable")]
pub struct MasterUnreachable(pub MasterAddress);

pub fn is_unreachable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<MasterUnreachable>().is_some()
}

#[async_trait]
pub trait MasterTransport: Send + Sync + 'static {
    /// Fire-and-forget delivery of a one-way message.
    async fn send(&self, master: &MasterAddress, message: MasterMessage) -> Result<()>;

    /// Sends a control request and waits for the master's acknowledgement.
    async fn ask(
        &self,
        master: &MasterAddress,
        request: MasterRequest,
        timeout: Duration,
    ) -> Result<bool>;
}

pub struct HttpMasterTransport {
    http_client: reqwest::Client,
    ask_attempts: usize,
}

impl HttpMasterTransport {
    pub fn new(ask_attempts: usize) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            ask_attempts: ask_attempts.max(1),
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        master: &MasterAddress,
        endpoint: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let url = format!("http://{}{}", master, endpoint);
        self.http_client
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    anyhow::Error::new(MasterUnreachable(master.clone()))
                } else {
                    anyhow::anyhow!(e)
                }
            })
    }

    async fn post_message(&self, master: &MasterAddress, message: &MasterMessage) -> Result<()> {
        let endpoint = message.endpoint();
        let response = match message {
            MasterMessage::RegisterApplication(m) => {
                self.post(master, endpoint, m, SEND_TIMEOUT).await?
            }
            MasterMessage::UnregisterApplication(m) => {
                self.post(master, endpoint, m, SEND_TIMEOUT).await?
            }
            MasterMessage::ExecutorStateChanged(m) => {
                self.post(master, endpoint, m, SEND_TIMEOUT).await?
            }
            MasterMessage::MasterChangeAcknowledged(m) => {
                self.post(master, endpoint, m, SEND_TIMEOUT).await?
            }
        };

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Master {} rejected {}: {}",
                master,
                endpoint,
                response.status()
            ));
        }

        Ok(())
    }

    async fn post_request(
        &self,
        master: &MasterAddress,
        request: &MasterRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let endpoint = request.endpoint();
        match request {
            MasterRequest::RequestExecutors(r) => self.post(master, endpoint, r, timeout).await,
            MasterRequest::KillExecutors(r) => self.post(master, endpoint, r, timeout).await,
        }
    }
}

#[async_trait]
impl MasterTransport for HttpMasterTransport {
    async fn send(&self, master: &MasterAddress, message: MasterMessage) -> Result<()> {
        tracing::trace!("Sending {} to {}", message.endpoint(), master);
        self.post_message(master, &message).await
    }

    /// Retries with exponential backoff and jitter; the timeout bounds each try.
    async fn ask(
        &self,
        master: &MasterAddress,
        request: MasterRequest,
        timeout: Duration,
    ) -> Result<bool> {
        let mut delay_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..self.ask_attempts {
            match self.post_request(master, &request, timeout).await {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(anyhow::anyhow!(
                            "Master {} rejected {}: {}",
                            master,
                            request.endpoint(),
                            response.status()
                        ));
                    }
                    let reply: AskReply = response.json().await?;
                    return Ok(reply.acknowledged);
                }
                Err(e) => {
                    if attempt + 1 == self.ask_attempts {
                        return Err(e);
                    }
                    tracing::debug!(
                        "Ask {} to {} failed (attempt {}): {}",
                        request.endpoint(),
                        master,
                        attempt + 1,
                        e
                    );
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::protocol::*;
    use crate::client::types::ApplicationDescription;

    use axum::routing::post;
    use axum::{Extension, Json, Router, http::StatusCode};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    // ============================================================
    // STUB MASTER
    // ============================================================

    #[derive(Default)]
    struct Hits {
        register: AtomicUsize,
        request: AtomicUsize,
        kill: AtomicUsize,
    }

    async fn accept_register(
        Extension(hits): Extension<Arc<Hits>>,
        Json(_): Json<RegisterApplication>,
    ) -> StatusCode {
        hits.register.fetch_add(1, Ordering::SeqCst);
        StatusCode::OK
    }

    async fn decline_request(
        Extension(hits): Extension<Arc<Hits>>,
        Json(_): Json<RequestExecutors>,
    ) -> Json<AskReply> {
        hits.request.fetch_add(1, Ordering::SeqCst);
        Json(AskReply {
            acknowledged: false,
        })
    }

    async fn fail_kill(
        Extension(hits): Extension<Arc<Hits>>,
        Json(_): Json<KillExecutors>,
    ) -> StatusCode {
        hits.kill.fetch_add(1, Ordering::SeqCst);
        StatusCode::INTERNAL_SERVER_ERROR
    }

    async fn slow_ack(
        Extension(hits): Extension<Arc<Hits>>,
        Json(_): Json<RequestExecutors>,
    ) -> Json<AskReply> {
        hits.request.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        Json(AskReply { acknowledged: true })
    }

    async fn serve(app: Router) -> MasterAddress {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MasterAddress::new("127.0.0.1", port)
    }

    async fn closed_port() -> MasterAddress {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        MasterAddress::new("127.0.0.1", port)
    }

    fn announce() -> MasterMessage {
        MasterMessage::RegisterApplication(RegisterApplication {
            client_id: Uuid::new_v4(),
            description: ApplicationDescription::new("transport-test"),
            reply_to: "127.0.0.1:7078".to_string(),
        })
    }

    fn request_executors() -> MasterRequest {
        MasterRequest::RequestExecutors(RequestExecutors {
            app_id: "app-1".to_string(),
            requested_total: 2,
        })
    }

    // ============================================================
    // TESTS
    // ============================================================

    #[tokio::test]
    async fn test_closed_port_is_reported_unreachable() {
        let master = closed_port().await;
        let transport = HttpMasterTransport::new(1);

        let err = transport.send(&master, announce()).await.unwrap_err();
        assert!(is_unreachable(&err), "expected unreachable, got {}", err);

        let err = transport
            .ask(&master, request_executors(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(is_unreachable(&err), "expected unreachable, got {}", err);
    }

    #[tokio::test]
    async fn test_send_and_ask_against_stub_master() {
        // ARRANGE
        let hits = Arc::new(Hits::default());
        let app = Router::new()
            .route(ENDPOINT_REGISTER_APPLICATION, post(accept_register))
            .route(ENDPOINT_REQUEST_EXECUTORS, post(decline_request))
            .route(ENDPOINT_KILL_EXECUTORS, post(fail_kill))
            .layer(Extension(hits.clone()));
        let master = serve(app).await;
        let transport = HttpMasterTransport::new(3);

        // ACT + ASSERT: one-way message accepted
        transport.send(&master, announce()).await.unwrap();
        assert_eq!(hits.register.load(Ordering::SeqCst), 1);

        // ACT + ASSERT: the reply body decides the answer
        let acknowledged = transport
            .ask(&master, request_executors(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!acknowledged);
        assert_eq!(hits.request.load(Ordering::SeqCst), 1);

        // ACT + ASSERT: a 500 is a rejection, not a lost master, and is not retried
        let err = transport
            .ask(
                &master,
                MasterRequest::KillExecutors(KillExecutors {
                    app_id: "app-1".to_string(),
                    executor_ids: vec!["1".to_string()],
                }),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(!is_unreachable(&err));
        assert_eq!(hits.kill.load(Ordering::SeqCst), 1);

        // ACT + ASSERT: a route the master does not serve is rejected too
        let err = transport
            .send(
                &master,
                MasterMessage::UnregisterApplication(UnregisterApplication {
                    app_id: "app-1".to_string(),
                }),
            )
            .await
            .unwrap_err();
        assert!(!is_unreachable(&err));
    }

    #[tokio::test]
    async fn test_ask_retries_timeouts_up_to_budget() {
        // ARRANGE: the master answers, but always too late
        let hits = Arc::new(Hits::default());
        let app = Router::new()
            .route(ENDPOINT_REQUEST_EXECUTORS, post(slow_ack))
            .layer(Extension(hits.clone()));
        let master = serve(app).await;
        let transport = HttpMasterTransport::new(2);

        // ACT
        let err = transport
            .ask(&master, request_executors(), Duration::from_millis(100))
            .await
            .unwrap_err();

        // ASSERT
        assert!(!is_unreachable(&err));
        assert_eq!(hits.request.load(Ordering::SeqCst), 2);
    }
}
