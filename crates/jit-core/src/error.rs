//! The error type shared by every crate in this workspace.
//!
//! One variant per failure domain: store failures abort the current
//! tick, source-control failures are split into transient (retry) and
//! permanent (give up), and cluster failures carry enough context for
//! 409/404 idempotency checks upstream of this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The state store could not be reached or returned a transport error.
    /// The caller aborts the current tick; the next tick retries from
    /// scratch (§7.5).
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    /// A cluster API call failed for a reason other than the 404/409
    /// idempotency cases, which callers translate to `Ok` before this
    /// variant is ever constructed.
    #[error("cluster api error: {0}")]
    ClusterApi(String),

    /// A source-control call failed transiently (network, 5xx,
    /// rate-limit). Retryable.
    #[error("source control transient error: {0}")]
    SourceControlTransient(String),

    /// A source-control call failed permanently (auth, missing runner
    /// group, 4xx). Not retryable; the Dispatch Worker gives up.
    #[error("source control permanent error: {0}")]
    SourceControlPermanent(String),

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A declarative cap file failed to parse.
    #[error("invalid cap file: {0}")]
    CapFile(#[from] serde_yaml::Error),

    /// A stored JSON payload (a `PendingJob` or `RunnerRecord`) failed to
    /// (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A spawned Tokio task panicked or was cancelled.
    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// The cap file could not be read from disk.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller should retry the operation that produced this
    /// error, as opposed to giving up (§4.5, §7).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::ClusterApi(_) | Error::SourceControlTransient(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
