//! Error types for the vote submitter

use std::fmt;
use thiserror::Error;

/// Classification of a JSON-RPC failure, derived once at the client boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Fee too low for the pool, or a same-nonce replacement was underpriced
    Underpriced,
    NonceTooLow,
    InsufficientFunds,
    /// Execution reverted during a call or estimate
    Reverted,
    Other,
}

impl RpcErrorKind {
    /// Map provider-specific error text to a kind.
    ///
    /// Node implementations disagree on wording, so this matches on lowercase
    /// substrings. Keep all such matching here; callers only see the kind.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_ascii_lowercase().replace('_', " ");

        if msg.contains("underpriced") || msg.contains("replacement") || msg.contains("fee too low")
        {
            RpcErrorKind::Underpriced
        } else if msg.contains("nonce too low") {
            RpcErrorKind::NonceTooLow
        } else if msg.contains("insufficient funds") || msg.contains("insufficient balance") {
            RpcErrorKind::InsufficientFunds
        } else if msg.contains("revert") {
            RpcErrorKind::Reverted
        } else {
            RpcErrorKind::Other
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcErrorKind::Underpriced => "underpriced",
            RpcErrorKind::NonceTooLow => "nonce too low",
            RpcErrorKind::InsufficientFunds => "insufficient funds",
            RpcErrorKind::Reverted => "reverted",
            RpcErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A failed RPC request with its classified kind
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct RpcError {
    pub kind: RpcErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: RpcErrorKind::classify(&message),
            message,
        }
    }
}

/// Main error type for the submitter
#[derive(Error, Debug)]
pub enum SubmitterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Nonce error for chain {chain_id}: {message}")]
    Nonce { chain_id: u64, message: String },

    #[error("Fee estimation error: {0}")]
    FeeEstimation(String),

    #[error("eth_call reverted/failed: {0}")]
    PreflightRevert(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Submission rejected ({kind}): {message}")]
    SubmissionRejected { kind: RpcErrorKind, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubmitterError {
    /// Whether the rejection qualifies for the single fee-bump resubmission
    pub fn is_underpriced(&self) -> bool {
        matches!(
            self,
            SubmitterError::SubmissionRejected {
                kind: RpcErrorKind::Underpriced,
                ..
            }
        )
    }

    /// Short label used for the failure metric
    pub fn label(&self) -> &'static str {
        match self {
            SubmitterError::Config(_) => "config",
            SubmitterError::ChainConnection { .. } => "chain_connection",
            SubmitterError::Wallet(_) => "wallet",
            SubmitterError::Signing(_) => "signing",
            SubmitterError::Nonce { .. } => "nonce",
            SubmitterError::FeeEstimation(_) => "fee_estimation",
            SubmitterError::PreflightRevert(_) => "preflight_revert",
            SubmitterError::GasEstimation(_) => "gas_estimation",
            SubmitterError::SubmissionRejected { .. } => "submission_rejected",
            SubmitterError::Internal(_) => "internal",
        }
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            SubmitterError::Wallet(_)
                | SubmitterError::SubmissionRejected {
                    kind: RpcErrorKind::InsufficientFunds,
                    ..
                }
        )
    }
}

impl From<RpcError> for SubmitterError {
    fn from(e: RpcError) -> Self {
        SubmitterError::SubmissionRejected {
            kind: e.kind,
            message: e.message,
        }
    }
}

/// Result type for submitter operations
pub type SubmitterResult<T> = Result<T, SubmitterError>;
