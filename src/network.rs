//! Network identifier normalization.
//!
//! Solana networks appear on the wire in two spellings: a short human name used by the
//! legacy protocol (`"solana"`, `"solana-devnet"`) and a [CAIP-2](https://standards.chainagnostic.org/CAIPs/caip-2)
//! chain identifier used by the newer one (`"solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"`).
//! This module maps between the two.
//!
//! Any `solana:*` identifier that is not one of the two known references still belongs to
//! the Solana family, but normalizes to [`SolanaNetwork::Devnet`]: unknown chains are never
//! treated as production.
//!
//! # Examples
//!
//! ```
//! use x402_solana::network::{to_canonical, to_human, SolanaNetwork};
//!
//! let devnet = to_canonical(SolanaNetwork::Devnet);
//! assert_eq!(devnet.to_string(), "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
//! assert_eq!(to_human(&devnet.to_string()).unwrap(), SolanaNetwork::Devnet);
//! assert_eq!(to_human("solana").unwrap(), SolanaNetwork::Mainnet);
//! ```

use crate::errors::{Result, X402Error};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use solana_pubkey::{pubkey, Pubkey};
use std::fmt;
use std::str::FromStr;

/// The CAIP-2 namespace for Solana chains.
pub const SOLANA_NAMESPACE: &str = "solana";

/// Genesis-hash prefix identifying Solana mainnet-beta.
pub const SOLANA_MAINNET_REFERENCE: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";

/// Genesis-hash prefix identifying Solana devnet.
pub const SOLANA_DEVNET_REFERENCE: &str = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

/// The two Solana networks this crate recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolanaNetwork {
    /// Solana mainnet-beta (the primary network)
    #[serde(rename = "solana")]
    Mainnet,
    /// Solana devnet (the secondary network)
    #[serde(rename = "solana-devnet")]
    Devnet,
}

impl SolanaNetwork {
    /// Human-readable name used by the legacy protocol.
    pub fn name(&self) -> &'static str {
        match self {
            SolanaNetwork::Mainnet => "solana",
            SolanaNetwork::Devnet => "solana-devnet",
        }
    }

    /// CAIP-2 reference of this network.
    pub fn reference(&self) -> &'static str {
        match self {
            SolanaNetwork::Mainnet => SOLANA_MAINNET_REFERENCE,
            SolanaNetwork::Devnet => SOLANA_DEVNET_REFERENCE,
        }
    }

    /// Public RPC endpoint used when no override is configured.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            SolanaNetwork::Mainnet => "https://api.mainnet-beta.solana.com",
            SolanaNetwork::Devnet => "https://api.devnet.solana.com",
        }
    }

    /// USDC mint on this network.
    pub fn usdc_mint(&self) -> Pubkey {
        match self {
            SolanaNetwork::Mainnet => pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            SolanaNetwork::Devnet => pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
        }
    }
}

impl fmt::Display for SolanaNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolanaNetwork {
    type Err = X402Error;

    /// Accepts either spelling of a Solana network.
    fn from_str(s: &str) -> Result<Self> {
        to_human(s)
    }
}

/// A CAIP-2 chain identifier: `namespace:reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    /// The blockchain namespace (e.g. `solana`, `eip155`).
    pub namespace: String,
    /// The chain-specific reference.
    pub reference: String,
}

impl ChainId {
    /// Creates a chain ID from its two components.
    pub fn new(namespace: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainId {
    type Err = X402Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((namespace, reference)) if !namespace.is_empty() && !reference.is_empty() => {
                Ok(ChainId::new(namespace, reference))
            }
            _ => Err(X402Error::UnsupportedNetwork(format!(
                "invalid chain id format: {s}"
            ))),
        }
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}

impl From<SolanaNetwork> for ChainId {
    fn from(network: SolanaNetwork) -> Self {
        to_canonical(network)
    }
}

/// Either spelling of a network, as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkId {
    /// A short human name such as `solana-devnet`
    Named(String),
    /// A CAIP-2 chain identifier
    Caip(ChainId),
}

impl NetworkId {
    /// Classifies a wire string. Strings containing `:` are treated as CAIP-2 identifiers.
    pub fn parse(network: &str) -> Self {
        match ChainId::from_str(network) {
            Ok(chain_id) => NetworkId::Caip(chain_id),
            Err(_) => NetworkId::Named(network.to_string()),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Named(name) => f.write_str(name),
            NetworkId::Caip(chain_id) => write!(f, "{chain_id}"),
        }
    }
}

/// Returns the canonical CAIP-2 identifier of a supported network.
pub fn to_canonical(network: SolanaNetwork) -> ChainId {
    ChainId::new(SOLANA_NAMESPACE, network.reference())
}

/// Resolves either spelling to a supported network.
///
/// Unknown references inside the `solana` namespace resolve to [`SolanaNetwork::Devnet`].
/// Anything outside the Solana family is an [`X402Error::UnsupportedNetwork`].
pub fn to_human(network: &str) -> Result<SolanaNetwork> {
    match NetworkId::parse(network) {
        NetworkId::Named(name) => match name.as_str() {
            "solana" => Ok(SolanaNetwork::Mainnet),
            "solana-devnet" => Ok(SolanaNetwork::Devnet),
            _ => Err(X402Error::UnsupportedNetwork(name)),
        },
        NetworkId::Caip(chain_id) if chain_id.namespace == SOLANA_NAMESPACE => {
            if chain_id.reference == SOLANA_MAINNET_REFERENCE {
                Ok(SolanaNetwork::Mainnet)
            } else {
                Ok(SolanaNetwork::Devnet)
            }
        }
        NetworkId::Caip(chain_id) => Err(X402Error::UnsupportedNetwork(chain_id.to_string())),
    }
}

/// Whether the network string belongs to the Solana family in either spelling.
pub fn is_member(network: &str) -> bool {
    to_human(network).is_ok()
}

/// Whether the network string denotes Solana mainnet.
pub fn is_primary(network: &str) -> bool {
    matches!(to_human(network), Ok(SolanaNetwork::Mainnet))
}

/// Whether the network string denotes Solana devnet, or an unknown Solana chain.
pub fn is_secondary(network: &str) -> bool {
    matches!(to_human(network), Ok(SolanaNetwork::Devnet))
}

/// Whether `network` (either spelling) is the same network as `target`.
pub fn matches_family(network: &str, target: SolanaNetwork) -> bool {
    to_human(network).map(|n| n == target).unwrap_or(false)
}
