//! Cluster Application Client Library
//!
//! Client-side half of a cluster application's membership protocol. An
//! application uses it to register with one of several candidate masters, keep
//! its identity across master failover, and ask the active master to grow or
//! shrink its set of executors.
//!
//! ## Modules
//! - **`client`**: Registration rounds, the membership state machine, the
//!   lifecycle listener bridge and the HTTP boundary towards masters.
//! - **`config`**: `ClientConfig`, defaults and command line parsing.
//! - **`error`**: `ClientError`, the typed errors of the public API.

pub mod client;
pub mod config;
pub mod error;

pub use client::listener::AppClientListener;
pub use client::service::AppClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
