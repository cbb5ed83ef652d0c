//! Registration Rounds
//!
//! Registration is driven by a single scheduler task:
//! 1. **Round**: one announce task per candidate master, all launched together.
//!    Each task sends a single `RegisterApplication` and exits; it never retries.
//! 2. **Tick**: every `timeout`, the scheduler checks the shared `registered` flag.
//!    Registered -> cancel stragglers and finish. Out of attempts -> tell the
//!    endpoint to give up. Otherwise -> cancel the current round and start the next.
//!
//! Rounds are cancelled through a `CancellationToken`; attempt tasks observe it
//! before sending and while the send is in flight.

use super::endpoint::{EndpointHandle, EndpointMessage};
use super::protocol::{MasterMessage, RegisterApplication};
use super::transport::MasterTransport;
use super::types::MasterAddress;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_MAX_REGISTRATION_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSettings {
    /// Time between scheduler ticks; one full round gets this long to succeed.
    pub timeout: Duration,
    /// Number of rounds before giving up.
    pub max_attempts: u32,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REGISTRATION_TIMEOUT,
            max_attempts: DEFAULT_MAX_REGISTRATION_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Registered,
    Exhausted,
    Retry,
}

pub fn evaluate_tick(registered: bool, attempt: u32, max_attempts: u32) -> TickOutcome {
    if registered {
        TickOutcome::Registered
    } else if attempt >= max_attempts {
        TickOutcome::Exhausted
    } else {
        TickOutcome::Retry
    }
}

struct AttemptRound {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl AttemptRound {
    fn cancel(self) {
        self.token.cancel();
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// One announce task per candidate master, so no candidate waits on another.
pub struct AttemptPool {
    masters: Arc<Vec<MasterAddress>>,
    transport: Arc<dyn MasterTransport>,
    announce: RegisterApplication,
    registered: Arc<AtomicBool>,
    endpoint: EndpointHandle,
    shutdown: CancellationToken,
    current: Option<AttemptRound>,
}

impl AttemptPool {
    pub fn new(
        masters: Arc<Vec<MasterAddress>>,
        transport: Arc<dyn MasterTransport>,
        announce: RegisterApplication,
        registered: Arc<AtomicBool>,
        endpoint: EndpointHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            masters,
            transport,
            announce,
            registered,
            endpoint,
            shutdown,
            current: None,
        }
    }

    /// Cancels whatever is still in flight, then announces to every candidate.
    pub fn launch_round(&mut self, attempt: u32) {
        self.cancel_round();
        if self.shutdown.is_cancelled() {
            return;
        }

        tracing::debug!(
            "Starting registration round {} against {} master(s)",
            attempt,
            self.masters.len()
        );

        let token = self.shutdown.child_token();
        let handles = self
            .masters
            .iter()
            .map(|master| {
                tokio::spawn(register_with_master(
                    master.clone(),
                    self.transport.clone(),
                    self.announce.clone(),
                    self.registered.clone(),
                    self.endpoint.clone(),
                    token.clone(),
                ))
            })
            .collect();

        self.current = Some(AttemptRound { token, handles });
    }

    pub fn cancel_round(&mut self) {
        if let Some(round) = self.current.take() {
            round.cancel();
        }
    }

    /// Idempotent.
    pub fn shutdown(&mut self) {
        self.cancel_round();
        self.shutdown.cancel();
    }
}

async fn register_with_master(
    master: MasterAddress,
    transport: Arc<dyn MasterTransport>,
    announce: RegisterApplication,
    registered: Arc<AtomicBool>,
    endpoint: EndpointHandle,
    token: CancellationToken,
) {
    if registered.load(Ordering::Acquire) || token.is_cancelled() {
        return;
    }

    tracing::info!("Connecting to master {}...", master);
    let message = MasterMessage::RegisterApplication(announce);

    tokio::select! {
        _ = token.cancelled() => {
            tracing::trace!("Registration attempt to {} cancelled", master);
        }
        result = transport.send(&master, message) => {
            if let Err(e) = result {
                if token.is_cancelled() {
                    return;
                }
                tracing::debug!("Registration attempt to {} failed: {}", master, e);
                endpoint.report_failure(master, &e);
            }
        }
    }
}

/// Spawns the scheduler. The first round starts immediately; the first tick
/// comes one full `timeout` later.
pub fn spawn(
    masters: Arc<Vec<MasterAddress>>,
    transport: Arc<dyn MasterTransport>,
    announce: RegisterApplication,
    settings: RegistrationSettings,
    registered: Arc<AtomicBool>,
    endpoint: EndpointHandle,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let pool = AttemptPool::new(
        masters,
        transport,
        announce,
        registered.clone(),
        endpoint.clone(),
        shutdown.clone(),
    );

    tokio::spawn(run_scheduler(pool, settings, registered, endpoint, shutdown))
}

async fn run_scheduler(
    mut pool: AttemptPool,
    settings: RegistrationSettings,
    registered: Arc<AtomicBool>,
    endpoint: EndpointHandle,
    shutdown: CancellationToken,
) {
    let mut attempt = 1;
    endpoint.send(EndpointMessage::RegistrationRound(attempt));
    pool.launch_round(attempt);

    let mut ticker = tokio::time::interval_at(Instant::now() + settings.timeout, settings.timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("Registration scheduler cancelled");
                break;
            }
            _ = ticker.tick() => {
                match evaluate_tick(registered.load(Ordering::Acquire), attempt, settings.max_attempts) {
                    TickOutcome::Registered => {
                        tracing::debug!("Registration confirmed after {} round(s)", attempt);
                        break;
                    }
                    TickOutcome::Exhausted => {
                        tracing::warn!("No master answered after {} round(s)", attempt);
                        if !endpoint.send(EndpointMessage::RegistrationTimedOut) {
                            tracing::debug!("Endpoint already stopped, dropping registration timeout");
                        }
                        break;
                    }
                    TickOutcome::Retry => {
                        attempt += 1;
                        endpoint.send(EndpointMessage::RegistrationRound(attempt));
                        pool.launch_round(attempt);
                    }
                }
            }
        }
    }

    pool.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_registered_wins_over_exhaustion() {
        assert_eq!(evaluate_tick(true, 3, 3), TickOutcome::Registered);
    }

    #[test]
    fn test_tick_exhausted_at_max_attempts() {
        assert_eq!(evaluate_tick(false, 3, 3), TickOutcome::Exhausted);
        assert_eq!(evaluate_tick(false, 4, 3), TickOutcome::Exhausted);
    }

    #[test]
    fn test_tick_retries_below_max() {
        assert_eq!(evaluate_tick(false, 1, 3), TickOutcome::Retry);
        assert_eq!(evaluate_tick(false, 2, 3), TickOutcome::Retry);
    }

    #[test]
    fn test_default_settings() {
        let settings = RegistrationSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(settings.max_attempts, 3);
    }
}
