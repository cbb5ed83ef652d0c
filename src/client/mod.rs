//! Application Client Module
//!
//! Registers a running application with one of several candidate cluster
//! masters, follows master failover, and forwards executor control calls to
//! whichever master is active.
//!
//! ## Moving Parts
//! - **`address`**: Resolves configured master urls into `MasterAddress` candidates.
//! - **`registration`**: Fans out one announce per candidate each round and decides,
//!   on a fixed timer, whether to stop, retry or give up.
//! - **`endpoint`**: Single-owner membership state machine fed by a mailbox.
//! - **`listener`**: Once-only delivery of lifecycle callbacks to the application.
//! - **`service`**: `AppClient`, the caller-facing API (`start`, `stop`,
//!   `request_total_executors`, `kill_executors`).
//! - **`transport`** / **`handlers`**: The HTTP boundary towards and from masters.

pub mod address;
pub mod endpoint;
pub mod handlers;
pub mod listener;
pub mod protocol;
pub mod registration;
pub mod service;
pub mod transport;
pub mod types;
