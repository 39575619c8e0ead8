//! # x402-solana
//!
//! A Rust implementation of the x402 protocol for paying for HTTP resources with SPL tokens
//! on Solana.
//!
//! The x402 protocol revitalizes the HTTP 402 "Payment Required" status code: a server
//! answers an unpaid request with a payment challenge, the client signs a token transfer and
//! retries, and a settlement service (the facilitator) verifies and broadcasts it. The crate
//! speaks both protocol generations and chooses the one the server used.
//!
//! ## Features
//!
//! - **Client Support**: Transparent handling of 402 responses with a spending ceiling
//! - **Server Support**: Requirement building, challenge rendering and the verify, serve,
//!   settle sequence, independent of the web framework
//! - **Facilitator Client**: Discovery, verification and settlement with optional bearer tokens
//! - **Solana**: `exact` scheme transfers for SPL Token and Token-2022 mints
//!
//! ## Quick Start
//!
//! ### Client Example
//!
//! ```rust,no_run
//! use solana_keypair::Keypair;
//! use x402_solana::client::{get, X402ClientConfig};
//! use x402_solana::network::SolanaNetwork;
//! use x402_solana::wallet::Wallet;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let wallet = Wallet::new(Keypair::new());
//! let config = X402ClientConfig::new(wallet, SolanaNetwork::Devnet)
//!     .with_max_amount(1_000_000);
//!
//! let response = get(&config, "https://api.example.com/weather").await?;
//! println!("Response: {}", String::from_utf8_lossy(response.body()));
//! # Ok(())
//! # }
//! ```
//!
//! ### Server Example
//!
//! ```rust,no_run
//! use x402_solana::network::SolanaNetwork;
//! use x402_solana::server::{PaymentConfig, PaymentHandler, RouteConfig};
//!
//! # fn example() -> x402_solana::Result<()> {
//! let config = PaymentConfig::new(
//!     SolanaNetwork::Devnet,
//!     "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
//!     "https://facilitator.example.com",
//! )
//! .with_description("Weather API access");
//!
//! let handler = PaymentHandler::new(config)?;
//! let route = RouteConfig::new("$0.01");
//! # let _ = (handler, route);
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! 1. **Client requests resource**: Standard HTTP request
//! 2. **Server responds with 402**: Requirements in the `PAYMENT-REQUIRED` header (v2) or
//!    the JSON body (v1)
//! 3. **Client builds payment**: A partially signed transfer transaction; the facilitator
//!    pays the network fee
//! 4. **Client retries with payment**: `PAYMENT-SIGNATURE` (v2) or `X-PAYMENT` (v1)
//! 5. **Server verifies**: Through the facilitator, before any work is done
//! 6. **Server responds and settles**: The receipt travels in `PAYMENT-RESPONSE` (v2) or
//!    `X-PAYMENT-RESPONSE` (v1)
//!
//! ## Supported Networks
//!
//! - Solana mainnet (`solana`, `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`)
//! - Solana devnet (`solana-devnet`, `solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1`)
//!
//! ## References
//!
//! - [x402 Specification](https://github.com/coinbase/x402)
//! - [x402.org](https://x402.org)
//! - [CAIP-2](https://github.com/ChainAgnostic/CAIPs/blob/main/CAIPs/caip-2.md)

#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod codec;
pub mod errors;
pub mod facilitator;
pub mod ledger;
pub mod network;
pub mod schemes;
pub mod server;
pub mod types;
pub mod utils;
pub mod wallet;

// Re-export commonly used items
pub use errors::{Result, X402Error};
pub use network::SolanaNetwork;
pub use types::{
    PaymentChallenge, PaymentPayload, PaymentRequirements, ProtocolVersion, SettleResponse,
    SupportedKind, SupportedResponse, VerifyResponse,
};
pub use wallet::Wallet;
