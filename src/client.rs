//! Client-side functionality for the x402 protocol.
//!
//! This module provides functions for making HTTP requests that handle 402 Payment Required
//! responses: the challenge is decoded, a requirement is selected, a signed Solana transfer
//! is assembled, and the request is retried exactly once with the payment header.

use crate::codec::{decode_challenge, decode_payment_response, encode_payment_header};
use crate::errors::{Result, X402Error};
use crate::ledger::{rpc_ledger, LedgerClient};
use crate::network::{matches_family, SolanaNetwork};
use crate::schemes::exact_svm::{ComputeBudget, ExactSvmScheme};
use crate::schemes::Scheme;
use crate::types::{PaymentChallenge, PaymentPayload, PaymentRequirements, ResourceInfo};
use crate::wallet::Wallet;
use async_trait::async_trait;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;

/// Sends HTTP requests on behalf of the negotiator.
///
/// Timeouts and cancellation are whatever the implementation provides.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let request = reqwest::Request::try_from(request)?;
        let response = self.execute(request).await?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.version_mut() = version;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

/// Configuration for x402 client requests.
#[derive(Clone)]
pub struct X402ClientConfig {
    /// The payer's wallet
    pub wallet: Wallet,

    /// Network family the client pays on
    pub network: SolanaNetwork,

    /// RPC endpoint override; the network's public endpoint is used otherwise
    pub rpc_url: Option<String>,

    /// Spending ceiling in atomic units; `None` or `0` means no ceiling
    pub max_amount: Option<u64>,

    /// Transport used for the original request and the paid retry
    pub transport: Arc<dyn HttpTransport>,

    /// Log negotiation steps at `info` instead of `debug`
    pub verbose: bool,

    /// Compute budget attached to payment transactions
    pub compute_budget: ComputeBudget,

    ledger: Arc<dyn LedgerClient>,
}

impl X402ClientConfig {
    /// Creates a new client configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use solana_keypair::Keypair;
    /// use x402_solana::client::X402ClientConfig;
    /// use x402_solana::network::SolanaNetwork;
    /// use x402_solana::wallet::Wallet;
    ///
    /// let wallet = Wallet::new(Keypair::new_from_array([7; 32]));
    /// let config = X402ClientConfig::new(wallet, SolanaNetwork::Devnet)
    ///     .with_max_amount(1_000_000)
    ///     .with_verbose(true);
    /// assert_eq!(config.rpc_url(), "https://api.devnet.solana.com");
    /// ```
    pub fn new(wallet: Wallet, network: SolanaNetwork) -> Self {
        Self {
            wallet,
            network,
            rpc_url: None,
            max_amount: None,
            transport: Arc::new(reqwest::Client::new()),
            verbose: false,
            compute_budget: ComputeBudget::default(),
            ledger: rpc_ledger(network.default_rpc_url()),
        }
    }

    /// Sets the RPC endpoint used for ledger reads.
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        let rpc_url = rpc_url.into();
        self.ledger = rpc_ledger(&rpc_url);
        self.rpc_url = Some(rpc_url);
        self
    }

    /// Sets the spending ceiling in atomic units.
    pub fn with_max_amount(mut self, max_amount: u64) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    /// Sets a custom HTTP transport.
    pub fn with_transport<T: HttpTransport + 'static>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Sets a custom reqwest client.
    pub fn with_client(self, client: reqwest::Client) -> Self {
        self.with_transport(client)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_compute_budget(mut self, compute_budget: ComputeBudget) -> Self {
        self.compute_budget = compute_budget;
        self
    }

    /// Replaces the ledger client, bypassing the RPC endpoint.
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = ledger;
        self
    }

    /// The RPC endpoint in effect.
    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }

    fn scheme(&self) -> ExactSvmScheme {
        ExactSvmScheme::new(self.ledger.clone()).with_compute_budget(self.compute_budget)
    }
}

macro_rules! step {
    ($config:expr, $($arg:tt)+) => {
        if $config.verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Sends `request`, paying once if the server answers 402.
///
/// A non-402 response is returned untouched after a single transport call. Otherwise the
/// request is retried exactly once with the payment header, and whatever comes back is
/// returned without further negotiation.
pub async fn fetch_with_payment(
    config: &X402ClientConfig,
    request: Request<Vec<u8>>,
) -> Result<Response<Vec<u8>>> {
    let retry = duplicate(&request);
    let response = config.transport.send(request).await?;
    if response.status() != StatusCode::PAYMENT_REQUIRED {
        return Ok(response);
    }

    let (version, challenge) = decode_challenge(response.headers(), response.body())?;
    step!(
        config,
        version = version.value(),
        offered = challenge.accepts.len(),
        "Received payment challenge"
    );

    let requirement = select_requirement(&challenge, config.network)?;
    let amount = requirement.amount_atomic()?;
    if let Some(limit) = config.max_amount.filter(|limit| *limit > 0) {
        if amount > limit {
            return Err(X402Error::AmountExceedsLimit { amount, limit });
        }
    }

    step!(
        config,
        network = %requirement.network,
        amount,
        pay_to = %requirement.pay_to,
        "Selected payment requirement"
    );

    let transaction = config
        .scheme()
        .build_transaction(requirement, &config.wallet)
        .await?;

    let resource = challenge
        .resource
        .clone()
        .unwrap_or_else(|| resource_from(requirement, &retry.uri().to_string()));
    let payload = PaymentPayload::new(version, requirement, Some(resource), transaction);
    let header_value = HeaderValue::from_str(&encode_payment_header(&payload)?)
        .map_err(|e| X402Error::ProtocolDecode(e.to_string()))?;

    let mut retry = retry;
    retry
        .headers_mut()
        .insert(version.payment_header_name(), header_value);
    step!(config, header = version.payment_header(), "Retrying with payment");

    let response = config.transport.send(retry).await?;
    match decode_payment_response(response.headers()) {
        Ok(Some(settlement)) => step!(
            config,
            success = settlement.success,
            transaction = ?settlement.transaction,
            network = %settlement.network,
            "Payment response received"
        ),
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "Ignoring undecodable payment response"),
    }
    Ok(response)
}

/// Makes an HTTP request with automatic x402 payment handling.
///
/// # Examples
///
/// ```no_run
/// use http::Method;
/// use solana_keypair::Keypair;
/// use x402_solana::client::{request_with_payment, X402ClientConfig};
/// use x402_solana::network::SolanaNetwork;
/// use x402_solana::wallet::Wallet;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let wallet = Wallet::new(Keypair::new_from_array([7; 32]));
/// let config = X402ClientConfig::new(wallet, SolanaNetwork::Devnet);
///
/// let response = request_with_payment(
///     &config,
///     Method::GET,
///     "https://api.example.com/weather",
///     None,
/// ).await?;
///
/// println!("Response: {}", String::from_utf8_lossy(response.body()));
/// # Ok(())
/// # }
/// ```
pub async fn request_with_payment(
    config: &X402ClientConfig,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Response<Vec<u8>>> {
    let mut builder = Request::builder().method(method).uri(url);
    let bytes = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            serde_json::to_vec(&body)?
        }
        None => Vec::new(),
    };
    let request = builder
        .body(bytes)
        .map_err(|e| X402Error::ConfigError(format!("invalid request: {e}")))?;
    fetch_with_payment(config, request).await
}

/// A simpler convenience function for GET requests.
pub async fn get(config: &X402ClientConfig, url: &str) -> Result<Response<Vec<u8>>> {
    request_with_payment(config, Method::GET, url, None).await
}

/// A simpler convenience function for POST requests.
pub async fn post(config: &X402ClientConfig, url: &str, body: Value) -> Result<Response<Vec<u8>>> {
    request_with_payment(config, Method::POST, url, Some(body)).await
}

/// Picks the first exact-scheme requirement on the client's network family.
///
/// Either network spelling matches.
pub fn select_requirement(
    challenge: &PaymentChallenge,
    network: SolanaNetwork,
) -> Result<&PaymentRequirements> {
    challenge
        .accepts
        .iter()
        .find(|r| r.is_exact() && matches_family(&r.network, network))
        .ok_or_else(|| X402Error::NoSuitableRequirement {
            offered: challenge.accepts.iter().map(|r| r.network.clone()).collect(),
        })
}

fn resource_from(requirement: &PaymentRequirements, url: &str) -> ResourceInfo {
    let extra = requirement.extra.as_ref();
    ResourceInfo {
        url: requirement
            .resource
            .clone()
            .or_else(|| extra.and_then(|e| e.resource.clone()))
            .unwrap_or_else(|| url.to_string()),
        description: requirement
            .description
            .clone()
            .or_else(|| extra.and_then(|e| e.description.clone()))
            .unwrap_or_default(),
        mime_type: requirement
            .mime_type
            .clone()
            .or_else(|| extra.and_then(|e| e.mime_type.clone()))
            .unwrap_or_default(),
    }
}

fn duplicate(request: &Request<Vec<u8>>) -> Request<Vec<u8>> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}
