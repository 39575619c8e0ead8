//! Error types for the x402-solana library.
//!
//! This module defines all error types that can occur while negotiating, assembling,
//! verifying, and settling x402 payments.

use thiserror::Error;

/// Main error type for x402 operations.
#[derive(Error, Debug)]
pub enum X402Error {
    /// Error during HTTP request/response handling
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error during Base64 encoding/decoding
    #[error("Base64 error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// Error parsing URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// A challenge, payment header, or settlement receipt could not be decoded
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// None of the offered requirements match the client's scheme and network family
    #[error("No suitable payment requirement found (offered networks: {})", offered.join(", "))]
    NoSuitableRequirement {
        /// Networks named by the rejected requirements, for diagnostics
        offered: Vec<String>,
    },

    /// The selected requirement asks for more than the configured spending ceiling
    #[error("Payment amount {amount} exceeds configured limit {limit}")]
    AmountExceedsLimit {
        /// Requested amount in atomic units
        amount: u64,
        /// Configured ceiling in atomic units
        limit: u64,
    },

    /// The wallet does not expose a transaction signing operation
    #[error("Wallet does not provide a transaction signing capability")]
    MissingWalletCapability,

    /// The payer's token account for the asset does not exist
    #[error("Source token account does not exist: {0}")]
    MissingSourceAccount(String),

    /// The recipient's token account for the asset does not exist
    #[error("Destination token account does not exist: {0}")]
    MissingDestinationAccount(String),

    /// The settlement service does not offer the exact scheme (or a fee payer) for a network
    #[error("Facilitator does not support network: {0}")]
    FacilitatorNetworkUnsupported(String),

    /// The settlement service could not be reached or answered with a transport-level failure
    #[error("Facilitator transport error: {0}")]
    FacilitatorTransport(String),

    /// The settlement service processed the request and rejected the payment
    #[error("Facilitator rejected payment: {reason}")]
    FacilitatorRejection {
        /// Reason reported by the settlement service
        reason: String,
    },

    /// Error talking to the ledger RPC endpoint
    #[error("Ledger error: {0}")]
    LedgerError(String),

    /// Error while assembling or signing a transaction
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Unsupported network
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// Invalid address format
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for x402 operations.
pub type Result<T> = std::result::Result<T, X402Error>;

impl From<solana_client::client_error::ClientError> for X402Error {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        X402Error::LedgerError(err.to_string())
    }
}

impl X402Error {
    /// Returns `true` for failures that never reached a settlement-service decision.
    ///
    /// Callers can show "invalid payment" for a [`X402Error::FacilitatorRejection`], but
    /// transport failures are operational events.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            X402Error::FacilitatorTransport(_) | X402Error::HttpError(_)
        )
    }
}
