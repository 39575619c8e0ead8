//! Payment scheme implementations.
//!
//! This module contains the trait a client-side scheme implements and the concrete
//! implementation for Solana.

pub mod exact_svm;

use crate::errors::Result;
use crate::types::PaymentRequirements;
use crate::wallet::Wallet;
use async_trait::async_trait;

/// Trait for building the payment proof of a scheme.
///
/// A scheme turns a selected requirement into the transaction blob placed in the
/// payment payload. Verification and settlement are delegated to the settlement service.
#[async_trait]
pub trait Scheme: Send + Sync {
    /// Returns the name of this scheme (e.g., "exact").
    fn name(&self) -> &str;

    /// Builds and signs the transfer described by `requirement`.
    ///
    /// # Arguments
    ///
    /// * `requirement` - The requirement selected from the server's challenge
    /// * `wallet` - The payer's wallet; only its signing capability is used
    ///
    /// # Returns
    ///
    /// The base64-encoded signed transaction
    async fn build_transaction(
        &self,
        requirement: &PaymentRequirements,
        wallet: &Wallet,
    ) -> Result<String>;
}
