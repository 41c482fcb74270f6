use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub weekday: u8,
    pub slot: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("credentials rejected: {0}")]
    CredentialsRejected(String),
    #[error("two-factor code required")]
    TwoFactorRequired,
    #[error("two-factor code rejected: {0}")]
    TwoFactorRejected(String),
    #[error("access forbidden: {0}")]
    AccessForbidden(String),
    #[error("session token expired")]
    TokenExpired,
    #[error("booking service needs a two-factor code for {username}")]
    RescueTwoFactorRequired { username: String },
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("booking service http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("booking service rejected request: {0}")]
    ServiceRejected(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("silent reconnect failed: {0}")]
    ReconnectFailed(String),
    #[error("response discarded after session change")]
    StaleResponse,
    #[error("{succeeded} monthly tasks created, {} failed", failures.len())]
    PartialBatchFailure {
        succeeded: usize,
        failures: Vec<BatchFailure>,
    },
}

impl InfraError {
    /// Failures that only mean the background poll should try again next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::Http { .. })
    }
}
