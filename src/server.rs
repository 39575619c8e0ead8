//! Server-side functionality for the x402 protocol.
//!
//! [`PaymentHandler`] protects a resource: it builds requirements from route pricing,
//! answers unpaid requests with a 402 challenge, verifies payments through the settlement
//! service, runs the protected logic, and settles afterwards. The handler is framework
//! agnostic; it works with [`http`] types so any server can host it.
//!
//! Settlement happens after the response has been computed. A failed settlement does not
//! withdraw the response; it is logged and handed to the optional settlement hook.

use crate::codec::{
    decode_payment_header, encode_challenge_body, encode_challenge_header,
    encode_payment_response,
};
use crate::errors::{Result, X402Error};
use crate::facilitator::{ApiCredentials, FacilitatorClient};
use crate::ledger::{fetch_mint, rpc_ledger, LedgerClient};
use crate::network::{to_canonical, SolanaNetwork};
use crate::types::{
    payment_required_header_name, PaymentChallenge, PaymentPayload, PaymentRequirements,
    ProtocolVersion, RequirementExtra, ResourceInfo, SettleResponse, EXACT_SCHEME,
};
use crate::utils::money_to_atomic;
use http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use serde_json::Value;
use solana_pubkey::Pubkey;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use crate::codec::extract_payment;

/// Default validity window of a payment, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// Token used for payments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetConfig {
    /// Mint address
    pub address: String,

    /// Mint decimals; read from the ledger when absent
    pub decimals: Option<u8>,
}

impl AssetConfig {
    pub fn new(address: impl Into<String>, decimals: Option<u8>) -> Self {
        Self {
            address: address.into(),
            decimals,
        }
    }

    /// USDC on `network`.
    pub fn usdc(network: SolanaNetwork) -> Self {
        Self::new(network.usdc_mint().to_string(), Some(6))
    }
}

/// Server-wide payment configuration.
#[derive(Clone, Debug)]
pub struct PaymentConfig {
    /// Network payments are accepted on
    pub network: SolanaNetwork,

    /// Treasury address receiving payments
    pub pay_to: String,

    /// Settlement service URL
    pub facilitator_url: String,

    /// Optional settlement service credentials
    pub credentials: Option<ApiCredentials>,

    /// RPC endpoint override; the network's public endpoint is used otherwise
    pub rpc_url: Option<String>,

    /// Default asset
    pub asset: AssetConfig,

    /// Default description of protected resources
    pub description: String,

    /// Default MIME type of protected resources
    pub mime_type: String,

    /// Default payment validity window in seconds
    pub max_timeout_seconds: u64,

    /// Protocol generation used for challenges
    pub protocol_version: ProtocolVersion,

    /// Cache lifetime of the settlement service's supported kinds
    pub supported_cache_ttl: Option<Duration>,
}

impl PaymentConfig {
    /// Creates a new payment configuration paying USDC on `network`.
    ///
    /// # Examples
    ///
    /// ```
    /// use x402_solana::network::SolanaNetwork;
    /// use x402_solana::server::PaymentConfig;
    ///
    /// let config = PaymentConfig::new(
    ///     SolanaNetwork::Devnet,
    ///     "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
    ///     "https://facilitator.example.com",
    /// )
    /// .with_description("Weather API access");
    /// assert_eq!(config.asset.decimals, Some(6));
    /// ```
    pub fn new(
        network: SolanaNetwork,
        pay_to: impl Into<String>,
        facilitator_url: impl Into<String>,
    ) -> Self {
        Self {
            network,
            pay_to: pay_to.into(),
            facilitator_url: facilitator_url.into(),
            credentials: None,
            rpc_url: None,
            asset: AssetConfig::usdc(network),
            description: String::new(),
            mime_type: "application/json".to_string(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            protocol_version: ProtocolVersion::V2,
            supported_cache_ttl: None,
        }
    }

    /// Reads the configuration from `X402_*` environment variables.
    ///
    /// `X402_PAY_TO` and `X402_FACILITATOR_URL` are required. Optional:
    /// `X402_NETWORK`, `X402_RPC_URL`, `X402_API_KEY_ID` with `X402_API_KEY_SECRET`,
    /// `X402_ASSET`, `X402_ASSET_DECIMALS`, `X402_DESCRIPTION`, `X402_MIME_TYPE`,
    /// `X402_TIMEOUT_SECONDS`, `X402_PROTOCOL_VERSION` and `X402_SUPPORTED_CACHE_SECONDS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PaymentConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| X402Error::ConfigError(format!("{key} is not set")))
        };
        let parsed = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|e| X402Error::ConfigError(format!("{key}: {e}")))
                })
                .transpose()
        };

        let network = match lookup("X402_NETWORK") {
            Some(name) => SolanaNetwork::from_str(name.trim())?,
            None => SolanaNetwork::Devnet,
        };
        let mut config = Self::new(
            network,
            required("X402_PAY_TO")?,
            required("X402_FACILITATOR_URL")?,
        );

        if let Some(rpc_url) = lookup("X402_RPC_URL") {
            config = config.with_rpc_url(rpc_url);
        }
        match (lookup("X402_API_KEY_ID"), lookup("X402_API_KEY_SECRET")) {
            (Some(id), Some(secret)) => {
                config = config.with_credentials(ApiCredentials::new(id, secret))
            }
            (None, None) => {}
            _ => {
                return Err(X402Error::ConfigError(
                    "X402_API_KEY_ID and X402_API_KEY_SECRET must be set together".to_string(),
                ))
            }
        }
        if let Some(asset) = lookup("X402_ASSET") {
            let decimals = parsed("X402_ASSET_DECIMALS")?
                .map(|d| {
                    u8::try_from(d)
                        .map_err(|e| X402Error::ConfigError(format!("X402_ASSET_DECIMALS: {e}")))
                })
                .transpose()?;
            config = config.with_asset(AssetConfig::new(asset, decimals));
        }
        if let Some(description) = lookup("X402_DESCRIPTION") {
            config = config.with_description(description);
        }
        if let Some(mime_type) = lookup("X402_MIME_TYPE") {
            config = config.with_mime_type(mime_type);
        }
        if let Some(seconds) = parsed("X402_TIMEOUT_SECONDS")? {
            config = config.with_timeout(seconds);
        }
        if let Some(version) = parsed("X402_PROTOCOL_VERSION")? {
            let version = u8::try_from(version)
                .map_err(|e| X402Error::ConfigError(format!("X402_PROTOCOL_VERSION: {e}")))
                .and_then(ProtocolVersion::try_from)?;
            config = config.with_protocol_version(version);
        }
        if let Some(seconds) = parsed("X402_SUPPORTED_CACHE_SECONDS")? {
            config = config.with_supported_cache_ttl(Duration::from_secs(seconds));
        }
        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    pub fn with_asset(mut self, asset: AssetConfig) -> Self {
        self.asset = asset;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the timeout for payment validity.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache_ttl = Some(ttl);
        self
    }

    /// The RPC endpoint in effect.
    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }

    /// Network string as it appears in requirements of the configured generation.
    pub fn network_id(&self) -> String {
        self.network_id_for(self.protocol_version)
    }

    /// Network string as it appears in requirements of `version`.
    pub fn network_id_for(&self, version: ProtocolVersion) -> String {
        match version {
            ProtocolVersion::V2 => to_canonical(self.network).to_string(),
            ProtocolVersion::V1 => self.network.name().to_string(),
        }
    }
}

/// Price of a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Price {
    /// Human money string such as `"$0.01"`, converted with the asset's decimals
    Money(String),
    /// Exact amount in atomic units
    Atomic(u64),
}

/// Per-route pricing and metadata; unset fields fall back to [`PaymentConfig`].
#[derive(Clone, Debug)]
pub struct RouteConfig {
    pub price: Price,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub max_timeout_seconds: Option<u64>,
    pub asset: Option<AssetConfig>,
    pub output_schema: Option<Value>,
}

impl RouteConfig {
    /// A route priced with a money string.
    pub fn new(price: impl Into<String>) -> Self {
        Self::with_price(Price::Money(price.into()))
    }

    /// A route priced in atomic units.
    pub fn atomic(amount: u64) -> Self {
        Self::with_price(Price::Atomic(amount))
    }

    fn with_price(price: Price) -> Self {
        Self {
            price,
            description: None,
            mime_type: None,
            max_timeout_seconds: None,
            asset: None,
            output_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = Some(seconds);
        self
    }

    pub fn with_asset(mut self, asset: AssetConfig) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// A settlement that did not complete after the response was produced.
#[derive(Clone, Debug)]
pub struct SettlementFailure {
    pub requirement: PaymentRequirements,
    pub reason: String,
    /// The settlement service's answer, when there was one
    pub settlement: Option<SettleResponse>,
}

/// Operator callback for failed settlements.
pub type SettlementHook = Arc<dyn Fn(&SettlementFailure) + Send + Sync>;

/// A request that was paid for and served.
#[derive(Debug)]
pub struct Served<T> {
    /// Output of the protected logic
    pub value: T,
    /// The settlement service's answer, if it answered
    pub settlement: Option<SettleResponse>,
    /// Settlement receipt to attach to the response
    pub payment_response: Option<(HeaderName, HeaderValue)>,
}

impl<T> Served<T> {
    /// Adds the settlement receipt header, if any, to `headers`.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        if let Some((name, value)) = &self.payment_response {
            headers.insert(name.clone(), value.clone());
        }
    }
}

/// Result of [`PaymentHandler::process`].
#[derive(Debug)]
pub enum PaymentOutcome<T> {
    /// The request was not paid for; send this 402 response
    PaymentRequired(Response<Vec<u8>>),
    /// The protected logic ran
    Served(Served<T>),
}

/// Guards resources behind x402 payments.
#[derive(Clone)]
pub struct PaymentHandler {
    config: PaymentConfig,
    facilitator: FacilitatorClient,
    ledger: Arc<dyn LedgerClient>,
    settlement_hook: Option<SettlementHook>,
}

impl PaymentHandler {
    /// Creates a handler talking to the configured settlement service and RPC endpoint.
    pub fn new(config: PaymentConfig) -> Result<Self> {
        Pubkey::from_str(&config.pay_to)
            .map_err(|e| X402Error::InvalidAddress(format!("{}: {}", config.pay_to, e)))?;

        let mut facilitator = FacilitatorClient::new(&config.facilitator_url)?;
        if let Some(credentials) = &config.credentials {
            facilitator = facilitator.with_credentials(credentials.clone());
        }
        if let Some(ttl) = config.supported_cache_ttl {
            facilitator = facilitator.with_supported_cache_ttl(ttl);
        }
        let ledger = rpc_ledger(config.rpc_url());
        Ok(Self {
            config,
            facilitator,
            ledger,
            settlement_hook: None,
        })
    }

    pub fn with_facilitator(mut self, facilitator: FacilitatorClient) -> Self {
        self.facilitator = facilitator;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Registers a callback invoked when settlement fails after serving.
    pub fn on_settlement_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SettlementFailure) + Send + Sync + 'static,
    {
        self.settlement_hook = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    pub fn facilitator(&self) -> &FacilitatorClient {
        &self.facilitator
    }

    /// Builds the requirement for a route.
    ///
    /// The fee payer comes from the settlement service; pricing, description and timeout
    /// come from the route, falling back to the server defaults.
    pub async fn create_requirement(
        &self,
        route: &RouteConfig,
        resource_url: &str,
    ) -> Result<PaymentRequirements> {
        self.requirement_for(route, resource_url, self.config.protocol_version)
            .await
    }

    /// Builds the requirement for a route, shaped for `version`.
    pub async fn requirement_for(
        &self,
        route: &RouteConfig,
        resource_url: &str,
        version: ProtocolVersion,
    ) -> Result<PaymentRequirements> {
        let network = self.config.network_id_for(version);
        let fee_payer = self.facilitator.fee_payer(&network).await?;

        let asset = route.asset.as_ref().unwrap_or(&self.config.asset);
        let amount = match &route.price {
            Price::Atomic(amount) => *amount,
            Price::Money(price) => {
                let decimals = match asset.decimals {
                    Some(decimals) => decimals,
                    None => {
                        let mint = Pubkey::from_str(&asset.address).map_err(|e| {
                            X402Error::InvalidAddress(format!("{}: {}", asset.address, e))
                        })?;
                        fetch_mint(self.ledger.as_ref(), &mint).await?.decimals
                    }
                };
                money_to_atomic(price, decimals)?
            }
        };

        let description = route
            .description
            .clone()
            .unwrap_or_else(|| self.config.description.clone());
        let mime_type = route
            .mime_type
            .clone()
            .unwrap_or_else(|| self.config.mime_type.clone());
        let legacy = version == ProtocolVersion::V1;

        Ok(PaymentRequirements {
            scheme: EXACT_SCHEME.to_string(),
            network,
            amount: amount.to_string(),
            pay_to: self.config.pay_to.clone(),
            asset: asset.address.clone(),
            max_timeout_seconds: route
                .max_timeout_seconds
                .unwrap_or(self.config.max_timeout_seconds),
            resource: legacy.then(|| resource_url.to_string()),
            description: legacy.then(|| description.clone()),
            mime_type: legacy.then(|| mime_type.clone()),
            output_schema: route.output_schema.clone(),
            extra: Some(RequirementExtra {
                fee_payer: Some(fee_payer),
                description: Some(description),
                mime_type: Some(mime_type),
                resource: Some(resource_url.to_string()),
                ..Default::default()
            }),
        })
    }

    /// Wraps requirements into a challenge of the configured generation.
    pub fn build_challenge(
        &self,
        requirements: Vec<PaymentRequirements>,
        resource_url: &str,
    ) -> PaymentChallenge {
        self.challenge_for(requirements, resource_url, self.config.protocol_version)
    }

    /// Wraps requirements into a challenge of `version`.
    pub fn challenge_for(
        &self,
        requirements: Vec<PaymentRequirements>,
        resource_url: &str,
        version: ProtocolVersion,
    ) -> PaymentChallenge {
        let resource = match version {
            ProtocolVersion::V2 => {
                let first = requirements.first().and_then(|r| r.extra.as_ref());
                Some(ResourceInfo {
                    url: resource_url.to_string(),
                    description: first
                        .and_then(|e| e.description.clone())
                        .unwrap_or_else(|| self.config.description.clone()),
                    mime_type: first
                        .and_then(|e| e.mime_type.clone())
                        .unwrap_or_else(|| self.config.mime_type.clone()),
                })
            }
            ProtocolVersion::V1 => None,
        };
        PaymentChallenge {
            x402_version: version.value(),
            resource,
            accepts: requirements,
            error: None,
        }
    }

    /// Renders a challenge as an HTTP 402 response.
    ///
    /// Version 2 challenges travel in the `PAYMENT-REQUIRED` header; both generations also
    /// carry the challenge as the JSON body.
    pub fn challenge_response(&self, challenge: &PaymentChallenge) -> Result<Response<Vec<u8>>> {
        let mut response = Response::new(encode_challenge_body(challenge)?);
        *response.status_mut() = StatusCode::PAYMENT_REQUIRED;
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if challenge.x402_version == ProtocolVersion::V2.value() {
            headers.insert(
                payment_required_header_name(),
                header_value(&encode_challenge_header(challenge)?)?,
            );
        }
        Ok(response)
    }

    fn payment_required(
        &self,
        requirement: PaymentRequirements,
        resource_url: &str,
        version: ProtocolVersion,
        error: impl Into<String>,
    ) -> Result<Response<Vec<u8>>> {
        let mut challenge = self.challenge_for(vec![requirement], resource_url, version);
        challenge.error = Some(error.into());
        self.challenge_response(&challenge)
    }

    /// Runs the verify, serve, settle sequence for one request.
    ///
    /// `protected` runs only after the payment verifies. Its output is returned even if
    /// settlement then fails.
    pub async fn process<F, Fut, T>(
        &self,
        headers: &HeaderMap,
        route: &RouteConfig,
        resource_url: &str,
        protected: F,
    ) -> Result<PaymentOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let payment = extract_payment(headers);
        let version = payment
            .as_ref()
            .map_or(self.config.protocol_version, |(version, _)| *version);
        let requirement = self.requirement_for(route, resource_url, version).await?;

        let Some((_, payment_header)) = payment else {
            debug!(resource = resource_url, "No payment header, sending challenge");
            let error = format!("{} header is required", version.payment_header());
            return self
                .payment_required(requirement, resource_url, version, error)
                .map(PaymentOutcome::PaymentRequired);
        };

        let payload = match decode_payment_header(&payment_header) {
            Ok(payload) if payload.version() == version => payload,
            Ok(payload) => {
                debug!(
                    header = version.value(),
                    payload = payload.version().value(),
                    "Payment header and payload generations differ"
                );
                let error = format!(
                    "{} header must carry a version {} payload",
                    version.payment_header(),
                    version.value()
                );
                return self
                    .payment_required(requirement, resource_url, version, error)
                    .map(PaymentOutcome::PaymentRequired);
            }
            Err(e) => {
                debug!(error = %e, "Undecodable payment header");
                return self
                    .payment_required(requirement, resource_url, version, e.to_string())
                    .map(PaymentOutcome::PaymentRequired);
            }
        };

        if let PaymentPayload::V2(v2) = &payload {
            if !same_terms(&v2.accepted, &requirement) {
                info!(resource = resource_url, "Accepted requirement differs from the offer");
                return self
                    .payment_required(requirement, resource_url, version, "accepted_mismatch")
                    .map(PaymentOutcome::PaymentRequired);
            }
        }

        let verification = self.facilitator.verify(&payload, &requirement).await?;
        if !verification.is_valid {
            let reason = verification
                .invalid_reason
                .unwrap_or_else(|| "invalid_payment".to_string());
            info!(%reason, resource = resource_url, "Payment rejected");
            return self
                .payment_required(requirement, resource_url, version, reason)
                .map(PaymentOutcome::PaymentRequired);
        }

        let value = protected().await;

        let settlement = self.facilitator.settle(&payload, &requirement).await;
        let (settlement, failure) = match settlement {
            Ok(settlement) if settlement.success => (Some(settlement), None),
            Ok(settlement) => {
                let reason = settlement
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                (Some(settlement), Some(reason))
            }
            Err(e) => (None, Some(e.to_string())),
        };

        if let Some(reason) = failure {
            warn!(%reason, resource = resource_url, "Settlement failed after serving");
            if let Some(hook) = &self.settlement_hook {
                hook(&SettlementFailure {
                    requirement: requirement.clone(),
                    reason,
                    settlement: settlement.clone(),
                });
            }
        } else {
            info!(
                transaction = ?settlement.as_ref().and_then(|s| s.transaction.as_ref()),
                resource = resource_url,
                "Payment settled"
            );
        }

        let payment_response = match &settlement {
            Some(settlement) => Some((
                version.payment_response_header_name(),
                header_value(&encode_payment_response(settlement)?)?,
            )),
            None => None,
        };

        Ok(PaymentOutcome::Served(Served {
            value,
            settlement,
            payment_response,
        }))
    }
}

impl std::fmt::Debug for PaymentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentHandler")
            .field("config", &self.config)
            .field("facilitator", &self.facilitator)
            .finish_non_exhaustive()
    }
}

/// Whether a payer echoed the offered terms unchanged.
fn same_terms(accepted: &PaymentRequirements, offered: &PaymentRequirements) -> bool {
    accepted.scheme == offered.scheme
        && accepted.network == offered.network
        && accepted.amount == offered.amount
        && accepted.pay_to == offered.pay_to
        && accepted.asset == offered.asset
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| X402Error::ProtocolDecode(e.to_string()))
}
