//! Exact payment scheme on Solana.
//!
//! The payer signs a versioned transaction containing exactly three instructions:
//!
//! 1. `SetComputeUnitLimit`
//! 2. `SetComputeUnitPrice`
//! 3. `TransferChecked` from the payer's associated token account to the recipient's
//!
//! The fee payer named in the requirement occupies the first signature slot and is left
//! unsigned; the settlement service co-signs and submits.

use super::Scheme;
use crate::errors::{Result, X402Error};
use crate::ledger::{associated_token_address, fetch_mint, LedgerClient, TokenProgram};
use crate::types::{PaymentRequirements, EXACT_SCHEME};
use crate::wallet::Wallet;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_message::v0::Message as MessageV0;
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction::Instruction;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Compute budget attached to every payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeBudget {
    pub unit_limit: u32,
    pub unit_price_micro_lamports: u64,
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self {
            unit_limit: 20_000,
            unit_price_micro_lamports: 1,
        }
    }
}

/// Builds signed SPL transfers for the exact scheme.
#[derive(Clone)]
pub struct ExactSvmScheme {
    ledger: Arc<dyn LedgerClient>,
    compute_budget: ComputeBudget,
}

impl ExactSvmScheme {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            compute_budget: ComputeBudget::default(),
        }
    }

    pub fn with_compute_budget(mut self, compute_budget: ComputeBudget) -> Self {
        self.compute_budget = compute_budget;
        self
    }

    /// Assembles and signs the transfer, returning the unsubmitted transaction.
    pub async fn build_signed_transaction(
        &self,
        requirement: &PaymentRequirements,
        wallet: &Wallet,
    ) -> Result<VersionedTransaction> {
        if !wallet.can_sign() {
            return Err(X402Error::MissingWalletCapability);
        }

        let fee_payer = requirement
            .fee_payer()
            .ok_or_else(|| {
                X402Error::ProtocolDecode("requirement is missing extra.feePayer".to_string())
            })
            .and_then(parse_pubkey)?;
        let pay_to = parse_pubkey(&requirement.pay_to)?;
        let mint = parse_pubkey(&requirement.asset)?;
        let amount = requirement.amount_atomic()?;
        let owner = wallet.address();

        let mint_info = fetch_mint(self.ledger.as_ref(), &mint).await?;
        let source = associated_token_address(&owner, &mint, mint_info.program);
        let destination = associated_token_address(&pay_to, &mint, mint_info.program);

        let accounts = self
            .ledger
            .get_multiple_accounts(&[source, destination])
            .await?;
        if accounts.first().map_or(true, Option::is_none) {
            return Err(X402Error::MissingSourceAccount(source.to_string()));
        }
        if accounts.get(1).map_or(true, Option::is_none) {
            return Err(X402Error::MissingDestinationAccount(destination.to_string()));
        }

        let transfer = transfer_checked_instruction(
            mint_info.program,
            &source,
            &mint,
            &destination,
            &owner,
            amount,
            mint_info.decimals,
        )?;
        let instructions = [
            ComputeBudgetInstruction::set_compute_unit_limit(self.compute_budget.unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(
                self.compute_budget.unit_price_micro_lamports,
            ),
            transfer,
        ];

        let recent_blockhash = self.ledger.get_latest_blockhash().await?;
        let message = MessageV0::try_compile(&fee_payer, &instructions, &[], recent_blockhash)
            .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;
        let message = VersionedMessage::V0(message);
        let num_required = message.header().num_required_signatures as usize;
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); num_required],
            message,
        };

        debug!(
            %fee_payer,
            %source,
            %destination,
            amount,
            decimals = mint_info.decimals,
            program = ?mint_info.program,
            "Assembled exact transfer"
        );

        wallet.sign_transaction(tx).await
    }
}

#[async_trait]
impl Scheme for ExactSvmScheme {
    fn name(&self) -> &str {
        EXACT_SCHEME
    }

    async fn build_transaction(
        &self,
        requirement: &PaymentRequirements,
        wallet: &Wallet,
    ) -> Result<String> {
        let tx = self.build_signed_transaction(requirement, wallet).await?;
        encode_transaction(&tx)
    }
}

/// Serializes a transaction with bincode and base64-encodes it.
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String> {
    let bytes = bincode::serialize(tx).map_err(|e| X402Error::SigningError(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Inverse of [`encode_transaction`].
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction> {
    let bytes = BASE64.decode(encoded.as_bytes())?;
    bincode::deserialize(&bytes)
        .map_err(|e| X402Error::ProtocolDecode(format!("invalid transaction: {e}")))
}

fn parse_pubkey(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).map_err(|e| X402Error::InvalidAddress(format!("{address}: {e}")))
}

fn transfer_checked_instruction(
    program: TokenProgram,
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction> {
    let ix = match program {
        TokenProgram::Token => spl_token::instruction::transfer_checked(
            &program.id(),
            source,
            mint,
            destination,
            authority,
            &[],
            amount,
            decimals,
        ),
        TokenProgram::Token2022 => spl_token_2022::instruction::transfer_checked(
            &program.id(),
            source,
            mint,
            destination,
            authority,
            &[],
            amount,
            decimals,
        ),
    };
    ix.map_err(|e| X402Error::SigningError(e.to_string()))
}
