use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors surfaced at the client's public boundary.
///
/// Runtime failures inside background work (registration attempts, scheduler
/// ticks, forwarded asks) never come back through this type; they are logged
/// and turned into listener callbacks or `false` acknowledgements instead.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid master url '{url}': {reason}")]
    InvalidMasterUrl { url: String, reason: String },
    #[error("no master urls configured")]
    NoMasters,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("client not started")]
    NotStarted,
    #[error("client endpoint is closed")]
    EndpointClosed,
}
