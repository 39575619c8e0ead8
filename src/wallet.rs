//! Wallet signing capability.
//!
//! The library never handles key material directly. A [`Wallet`] carries the payer's
//! address and, optionally, something that can sign transactions. A wallet without a
//! signer can still be described (for instance from a browser-style `{publicKey}` object)
//! but fails with [`X402Error::MissingWalletCapability`] as soon as it is asked to pay.

use crate::errors::{Result, X402Error};
use async_trait::async_trait;
use serde::Deserialize;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Something that can add the payer's signature to a transaction.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address whose signature this signer produces.
    fn pubkey(&self) -> Pubkey;

    /// Signs `tx` for [`TransactionSigner::pubkey`], leaving other signature slots untouched.
    async fn sign_transaction(&self, tx: VersionedTransaction) -> Result<VersionedTransaction>;
}

/// Places `signer`'s signature at its slot among the required signers.
///
/// The fee payer's slot stays empty (default signature) for the settlement service to fill.
pub fn sign_partial<S: Signer + ?Sized>(
    mut tx: VersionedTransaction,
    signer: &S,
) -> Result<VersionedTransaction> {
    let msg_bytes = tx.message.serialize();
    let signature = signer
        .try_sign_message(msg_bytes.as_slice())
        .map_err(|e| X402Error::SigningError(e.to_string()))?;

    let num_required = tx.message.header().num_required_signatures as usize;
    let signer_pubkey = signer.pubkey();
    let position = tx
        .message
        .static_account_keys()
        .iter()
        .take(num_required)
        .position(|key| *key == signer_pubkey)
        .ok_or_else(|| {
            X402Error::SigningError(format!("{signer_pubkey} is not a required signer"))
        })?;

    if tx.signatures.len() < num_required {
        tx.signatures.resize(num_required, Signature::default());
    }
    tx.signatures[position] = signature;
    Ok(tx)
}

#[async_trait]
impl TransactionSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Signer::pubkey(self)
    }

    async fn sign_transaction(&self, tx: VersionedTransaction) -> Result<VersionedTransaction> {
        sign_partial(tx, self)
    }
}

#[async_trait]
impl<T: TransactionSigner + ?Sized> TransactionSigner for Arc<T> {
    fn pubkey(&self) -> Pubkey {
        (**self).pubkey()
    }

    async fn sign_transaction(&self, tx: VersionedTransaction) -> Result<VersionedTransaction> {
        (**self).sign_transaction(tx).await
    }
}

/// A wallet as described at an integration boundary.
///
/// Accepts either `address` or `publicKey` as the field name.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletDescriptor {
    #[serde(alias = "publicKey")]
    pub address: String,
}

/// The payer: an address plus an optional signing capability.
#[derive(Clone)]
pub struct Wallet {
    address: Pubkey,
    signer: Option<Arc<dyn TransactionSigner>>,
}

impl Wallet {
    /// Creates a wallet that can sign.
    pub fn new<S: TransactionSigner + 'static>(signer: S) -> Self {
        Self {
            address: signer.pubkey(),
            signer: Some(Arc::new(signer)),
        }
    }

    /// Creates a wallet that only knows its address.
    pub fn watch_only(address: Pubkey) -> Self {
        Self {
            address,
            signer: None,
        }
    }

    /// Normalizes a boundary description into a watch-only wallet.
    pub fn from_descriptor(descriptor: &WalletDescriptor) -> Result<Self> {
        let address = Pubkey::from_str(&descriptor.address)
            .map_err(|e| X402Error::InvalidAddress(format!("{}: {}", descriptor.address, e)))?;
        Ok(Self::watch_only(address))
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    /// Signs through the wallet's capability.
    pub async fn sign_transaction(&self, tx: VersionedTransaction) -> Result<VersionedTransaction> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(X402Error::MissingWalletCapability)?;
        signer.sign_transaction(tx).await
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_message::v0::Message as MessageV0;
    use solana_message::{Hash, VersionedMessage};
    use solana_transaction::Instruction;
    use solana_instruction::AccountMeta;

    fn two_signer_tx(fee_payer: Pubkey, payer: Pubkey) -> VersionedTransaction {
        let ix = Instruction::new_with_bytes(
            Pubkey::new_from_array([9; 32]),
            &[1, 2, 3],
            vec![AccountMeta::new_readonly(payer, true)],
        );
        let message =
            MessageV0::try_compile(&fee_payer, &[ix], &[], Hash::new_from_array([7; 32])).unwrap();
        VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        }
    }

    #[tokio::test]
    async fn test_keypair_fills_only_its_own_slot() {
        let keypair = Keypair::new_from_array([3; 32]);
        let fee_payer = Pubkey::new_from_array([1; 32]);
        let tx = two_signer_tx(fee_payer, Signer::pubkey(&keypair));

        let wallet = Wallet::new(keypair);
        let signed = wallet.sign_transaction(tx).await.unwrap();

        assert_eq!(signed.signatures.len(), 2);
        assert_eq!(signed.signatures[0], Signature::default());
        assert_ne!(signed.signatures[1], Signature::default());
    }

    #[tokio::test]
    async fn test_watch_only_wallet_cannot_sign() {
        let wallet = Wallet::watch_only(Pubkey::new_from_array([4; 32]));
        let tx = two_signer_tx(Pubkey::new_from_array([1; 32]), wallet.address());
        assert!(matches!(
            wallet.sign_transaction(tx).await,
            Err(X402Error::MissingWalletCapability)
        ));
    }

    #[tokio::test]
    async fn test_signer_outside_required_set_is_rejected() {
        let keypair = Keypair::new_from_array([5; 32]);
        let tx = two_signer_tx(
            Pubkey::new_from_array([1; 32]),
            Pubkey::new_from_array([2; 32]),
        );
        assert!(matches!(
            keypair.sign_transaction(tx).await,
            Err(X402Error::SigningError(_))
        ));
    }

    #[test]
    fn test_descriptor_accepts_both_field_names() {
        let address = Pubkey::new_from_array([8; 32]).to_string();
        for field in ["address", "publicKey"] {
            let json = format!(r#"{{"{field}": "{address}"}}"#);
            let descriptor: WalletDescriptor = serde_json::from_str(&json).unwrap();
            let wallet = Wallet::from_descriptor(&descriptor).unwrap();
            assert_eq!(wallet.address().to_string(), address);
            assert!(!wallet.can_sign());
        }
    }
}
