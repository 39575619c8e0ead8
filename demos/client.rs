//! Example x402 client.
//!
//! This example demonstrates how to make requests to an x402-enabled server,
//! automatically paying when it answers 402.
//!
//! Run with:
//! ```bash
//! cargo run --example client
//! ```
//!
//! Environment variables (a `.env` file is read when present):
//! - PRIVATE_KEY: Payer keypair as a JSON byte array, as written by `solana-keygen`
//! - X402_NETWORK: `solana` or `solana-devnet` (default: devnet)
//! - X402_RPC_URL: RPC endpoint override
//! - MAX_AMOUNT: Spending ceiling in atomic units
//! - API_URL: The protected API endpoint to access

use anyhow::Context;
use solana_keypair::Keypair;
use solana_signer::Signer;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;
use x402_solana::client::{get, X402ClientConfig};
use x402_solana::codec::decode_payment_response;
use x402_solana::network::SolanaNetwork;
use x402_solana::wallet::Wallet;

fn load_keypair() -> anyhow::Result<Keypair> {
    match std::env::var("PRIVATE_KEY") {
        Ok(raw) => {
            let bytes: Vec<u8> =
                serde_json::from_str(&raw).context("PRIVATE_KEY must be a JSON byte array")?;
            Keypair::try_from(bytes.as_slice()).map_err(|e| anyhow::anyhow!("PRIVATE_KEY: {e}"))
        }
        Err(_) => {
            tracing::warn!("No PRIVATE_KEY set, using a throwaway keypair");
            Ok(Keypair::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let keypair = load_keypair()?;
    let network = match std::env::var("X402_NETWORK") {
        Ok(name) => SolanaNetwork::from_str(&name)?,
        Err(_) => SolanaNetwork::Devnet,
    };
    let api_url =
        std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000/weather".to_string());

    tracing::info!(payer = %keypair.pubkey(), %network, %api_url, "x402 example client");

    let mut config = X402ClientConfig::new(Wallet::new(keypair), network).with_verbose(true);
    if let Ok(rpc_url) = std::env::var("X402_RPC_URL") {
        config = config.with_rpc_url(rpc_url);
    }
    if let Ok(max_amount) = std::env::var("MAX_AMOUNT") {
        config = config.with_max_amount(max_amount.parse()?);
    }

    let response = get(&config, &api_url).await?;
    tracing::info!(status = %response.status(), "Response received");

    if let Some(settlement) = decode_payment_response(response.headers())? {
        tracing::info!(
            success = settlement.success,
            transaction = ?settlement.transaction,
            "Payment settled"
        );
    }

    let body = String::from_utf8_lossy(response.body());
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
