//! Client Configuration
//!
//! `ClientConfig` gathers every knob the client recognises. Defaults match the
//! usual cluster setup: 20 second registration rounds, 3 rounds before giving up
//! and a 120 second ask timeout for control calls.

use crate::client::registration::{
    DEFAULT_MAX_REGISTRATION_RETRIES, DEFAULT_REGISTRATION_TIMEOUT, RegistrationSettings,
};
use crate::client::types::ApplicationDescription;
use crate::error::{ClientError, Result};

use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_ASK_RETRIES: usize = 3;
pub const DEFAULT_CALLBACK_PORT: u16 = 7078;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Candidate master urls, in priority order.
    pub masters: Vec<String>,
    pub registration_timeout: Duration,
    pub max_registration_retries: u32,
    pub ask_timeout: Duration,
    /// Upper bound on how long `stop()` waits for the endpoint.
    pub stop_timeout: Duration,
    pub ask_retries: usize,
    /// Local address the callback server listens on.
    pub callback_addr: SocketAddr,
    /// Address announced to masters when it differs from `callback_addr`,
    /// e.g. when listening on `0.0.0.0`.
    pub advertised_addr: Option<SocketAddr>,
    pub application: ApplicationDescription,
}

impl ClientConfig {
    pub fn new(masters: Vec<String>, application: ApplicationDescription) -> Self {
        Self {
            masters,
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            max_registration_retries: DEFAULT_MAX_REGISTRATION_RETRIES,
            ask_timeout: DEFAULT_ASK_TIMEOUT,
            stop_timeout: DEFAULT_ASK_TIMEOUT,
            ask_retries: DEFAULT_ASK_RETRIES,
            callback_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_CALLBACK_PORT)),
            advertised_addr: None,
            application,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.masters.is_empty() {
            return Err(ClientError::NoMasters);
        }
        if self.registration_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "registration timeout must be positive".to_string(),
            ));
        }
        if self.max_registration_retries == 0 {
            return Err(ClientError::InvalidConfig(
                "max registration retries must be at least 1".to_string(),
            ));
        }
        if self.ask_timeout.is_zero() || self.stop_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "ask and stop timeouts must be positive".to_string(),
            ));
        }
        let reply_to = self.reply_to();
        if reply_to.ip().is_unspecified() || reply_to.port() == 0 {
            return Err(ClientError::InvalidConfig(format!(
                "masters cannot reply to {}; set an advertised address",
                reply_to
            )));
        }
        Ok(())
    }

    /// Where masters send their replies.
    pub fn reply_to(&self) -> SocketAddr {
        self.advertised_addr.unwrap_or(self.callback_addr)
    }

    pub fn registration_settings(&self) -> RegistrationSettings {
        RegistrationSettings {
            timeout: self.registration_timeout,
            max_attempts: self.max_registration_retries,
        }
    }

    /// Parses command line flags (program name excluded).
    ///
    /// `--master` may be repeated or carry a comma separated list.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::new(Vec::new(), ApplicationDescription::new("app-client"));
        let mut stop_timeout_set = false;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = || {
                args.get(i + 1)
                    .map(String::as_str)
                    .ok_or_else(|| ClientError::InvalidConfig(format!("{} needs a value", flag)))
            };

            match flag {
                "--master" => config.masters.push(value()?.to_string()),
                "--bind" => config.callback_addr = parse(flag, value()?)?,
                "--advertise" => config.advertised_addr = Some(parse(flag, value()?)?),
                "--name" => config.application.name = value()?.to_string(),
                "--cores" => config.application.cores_per_executor = Some(parse(flag, value()?)?),
                "--max-cores" => config.application.max_cores = Some(parse(flag, value()?)?),
                "--memory" => config.application.memory_per_executor_mb = parse(flag, value()?)?,
                "--command" => config.application.command = value()?.to_string(),
                "--registration-timeout" => {
                    config.registration_timeout = Duration::from_secs(parse(flag, value()?)?)
                }
                "--max-retries" => config.max_registration_retries = parse(flag, value()?)?,
                "--ask-timeout" => config.ask_timeout = Duration::from_secs(parse(flag, value()?)?),
                "--stop-timeout" => {
                    config.stop_timeout = Duration::from_secs(parse(flag, value()?)?);
                    stop_timeout_set = true;
                }
                other => {
                    return Err(ClientError::InvalidConfig(format!("unknown flag {}", other)));
                }
            }
            i += 2;
        }

        if !stop_timeout_set {
            config.stop_timeout = config.ask_timeout;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ClientError::InvalidConfig(format!("invalid value '{}' for {}", value, flag)))
}
