//! Read access to the Solana ledger.
//!
//! The transaction assembler and the requirement builder only need three reads: a single
//! account, a batch of accounts, and the latest blockhash. [`LedgerClient`] is that seam;
//! it is implemented for the nonblocking [`RpcClient`] and faked in tests.

use crate::errors::{Result, X402Error};
use async_trait::async_trait;
use solana_account::Account;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_message::Hash;
use solana_pubkey::{pubkey, Pubkey};
use spl_token::solana_program::program_pack::Pack;
use std::sync::Arc;

/// Associated Token Account program.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Ledger reads used while paying and pricing.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Account>;

    /// Fetches several accounts in one round-trip; missing accounts are `None`.
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Account> {
        Ok(RpcClient::get_account(self, pubkey).await?)
    }

    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        Ok(RpcClient::get_multiple_accounts(self, pubkeys).await?)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(RpcClient::get_latest_blockhash(self).await?)
    }
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Account> {
        (**self).get_account(pubkey).await
    }

    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        (**self).get_multiple_accounts(pubkeys).await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        (**self).get_latest_blockhash().await
    }
}

/// Opens a nonblocking RPC client for `rpc_url`.
pub fn rpc_ledger(rpc_url: &str) -> Arc<dyn LedgerClient> {
    Arc::new(RpcClient::new(rpc_url.to_string()))
}

/// The two token program families a mint can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProgram {
    Token,
    Token2022,
}

impl TokenProgram {
    pub fn id(&self) -> Pubkey {
        match self {
            TokenProgram::Token => spl_token::id(),
            TokenProgram::Token2022 => spl_token_2022::id(),
        }
    }
}

/// What the ledger says about a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    pub decimals: u8,
    pub program: TokenProgram,
}

/// Reads a mint account and determines its owning token program and decimals.
pub async fn fetch_mint<L: LedgerClient + ?Sized>(ledger: &L, mint: &Pubkey) -> Result<MintInfo> {
    let account = ledger.get_account(mint).await?;
    if account.owner == spl_token::id() {
        let state = spl_token::state::Mint::unpack(&account.data)
            .map_err(|e| X402Error::LedgerError(format!("failed to unpack mint {mint}: {e}")))?;
        Ok(MintInfo {
            decimals: state.decimals,
            program: TokenProgram::Token,
        })
    } else if account.owner == spl_token_2022::id() {
        let state = spl_token_2022::state::Mint::unpack(&account.data)
            .map_err(|e| X402Error::LedgerError(format!("failed to unpack mint {mint}: {e}")))?;
        Ok(MintInfo {
            decimals: state.decimals,
            program: TokenProgram::Token2022,
        })
    } else {
        Err(X402Error::LedgerError(format!(
            "mint {mint} is owned by {}, not a token program",
            account.owner
        )))
    }
}

/// Derives the associated token account of `owner` for `mint` under `program`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, program: TokenProgram) -> Pubkey {
    let (address, _) = Pubkey::find_program_address(
        &[owner.as_ref(), program.id().as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    address
}
