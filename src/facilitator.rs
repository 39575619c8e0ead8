//! HTTP client for a remote settlement service (facilitator).
//!
//! The facilitator exposes three endpoints:
//!
//! - `GET /supported` lists the (version, scheme, network) combinations it handles, along
//!   with the fee payer address for each Solana network.
//! - `POST /verify` checks a payment payload against a requirement.
//! - `POST /settle` co-signs and submits the transaction.
//!
//! Verification and settlement outcomes are data: a non-2xx answer becomes a local
//! failure result so the caller can still answer its own client with a 402. Only transport
//! faults (connection errors, an unreachable or failing discovery/token endpoint) are
//! raised as [`X402Error::FacilitatorTransport`].
//!
//! ## Example
//!
//! ```
//! use x402_solana::facilitator::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::new("https://facilitator.example.com").unwrap();
//! assert_eq!(facilitator.verify_url().as_str(), "https://facilitator.example.com/verify");
//! ```

use crate::codec::decode_payment_header;
use crate::errors::{Result, X402Error};
use crate::network::to_human;
use crate::types::{
    FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse, SupportedKind,
    SupportedResponse, VerifyResponse, EXACT_SCHEME,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};
use url::Url;

/// Reason reported when `/verify` answers with a non-2xx status.
pub const UNEXPECTED_VERIFY_ERROR: &str = "unexpected_verify_error";

/// Reason reported when `/settle` answers with a non-2xx status.
pub const UNEXPECTED_SETTLE_ERROR: &str = "unexpected_settle_error";

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 30;

/// API credentials exchanged for a bearer token.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredentials {
    pub api_key_id: String,
    pub api_key_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key_id: impl Into<String>, api_key_secret: impl Into<String>) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key_id", &self.api_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: Instant,
}

/// Time-bounded cache of the `/supported` answer.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        if Instant::now() < cache.expires_at {
            Some(cache.response.clone())
        } else {
            None
        }
    }

    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub async fn clear(&self) {
        *self.state.write().await = None;
    }
}

enum Reply<R> {
    Success(R),
    Status { status: StatusCode, body: String },
}

/// Client for a remote settlement service.
///
/// Clones share the bearer-token cache and the discovery cache.
#[derive(Clone)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    token_url: Url,
    client: Client,
    timeout: Option<Duration>,
    credentials: Option<ApiCredentials>,
    token: Arc<Mutex<Option<CachedToken>>>,
    supported_cache: Option<Arc<SupportedCache>>,
}

impl FacilitatorClient {
    /// Creates a client for the service at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        Ok(Self {
            verify_url: base_url.join("./verify")?,
            settle_url: base_url.join("./settle")?,
            supported_url: base_url.join("./supported")?,
            token_url: base_url.join("./auth/token")?,
            base_url,
            client: Client::new(),
            timeout: None,
            credentials: None,
            token: Arc::new(Mutex::new(None)),
            supported_cache: None,
        })
    }

    /// Authenticates every call with a bearer token obtained from these credentials.
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self.token = Arc::new(Mutex::new(None));
        self
    }

    /// Applies a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Caches `/supported` for `ttl`. A zero TTL disables the cache.
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = (!ttl.is_zero()).then(|| Arc::new(SupportedCache::new(ttl)));
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    pub fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    pub fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    /// Fetches the service's supported kinds, through the cache when one is configured.
    pub async fn supported(&self) -> Result<SupportedResponse> {
        if let Some(cache) = &self.supported_cache {
            if let Some(response) = cache.get().await {
                return Ok(response);
            }
        }

        let response = self.fetch_supported().await?;
        if let Some(cache) = &self.supported_cache {
            cache.set(response.clone()).await;
        }
        Ok(response)
    }

    #[instrument(name = "x402.facilitator.supported", skip_all, err)]
    async fn fetch_supported(&self) -> Result<SupportedResponse> {
        let request = self.authorize(self.client.get(self.supported_url.clone())).await?;
        match self.send_json(request, "GET /supported").await? {
            Reply::Success(response) => Ok(response),
            Reply::Status { status, body } => Err(X402Error::FacilitatorTransport(format!(
                "GET /supported returned {status}: {body}"
            ))),
        }
    }

    pub async fn supported_kinds(&self) -> Result<Vec<SupportedKind>> {
        Ok(self.supported().await?.kinds)
    }

    /// Resolves the fee payer the service uses on `network` (either spelling).
    ///
    /// Kinds match on the exact scheme and the same network, mainnet to mainnet and
    /// devnet to devnet.
    pub async fn fee_payer(&self, network: &str) -> Result<String> {
        let target = to_human(network)?;
        let kinds = self.supported_kinds().await?;
        kinds
            .iter()
            .filter(|kind| kind.scheme == EXACT_SCHEME)
            .filter(|kind| to_human(&kind.network).map_or(false, |n| n == target))
            .find_map(|kind| kind.extra.as_ref().and_then(|e| e.fee_payer.clone()))
            .ok_or_else(|| X402Error::FacilitatorNetworkUnsupported(network.to_string()))
    }

    /// Decodes a payment header and asks the service to verify it.
    pub async fn verify_payment(
        &self,
        payment_header: &str,
        requirement: &PaymentRequirements,
    ) -> Result<VerifyResponse> {
        let payload = decode_payment_header(payment_header)?;
        self.verify(&payload, requirement).await
    }

    /// Decodes a payment header and asks the service to settle it.
    pub async fn settle_payment(
        &self,
        payment_header: &str,
        requirement: &PaymentRequirements,
    ) -> Result<SettleResponse> {
        let payload = decode_payment_header(payment_header)?;
        self.settle(&payload, requirement).await
    }

    #[instrument(
        name = "x402.facilitator.verify",
        skip_all,
        fields(network = %requirement.network, amount = %requirement.amount),
        err
    )]
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirements,
    ) -> Result<VerifyResponse> {
        let body = facilitator_request(payload, requirement);
        let request = self
            .authorize(self.client.post(self.verify_url.clone()).json(&body))
            .await?;
        match self.send_json::<VerifyResponse>(request, "POST /verify").await? {
            Reply::Success(response) => {
                debug!(
                    is_valid = response.is_valid,
                    reason = ?response.invalid_reason,
                    "Verification answered"
                );
                Ok(response)
            }
            Reply::Status { status, body } => {
                warn!(%status, body = %body, "Verification endpoint failed");
                Ok(VerifyResponse::invalid(UNEXPECTED_VERIFY_ERROR))
            }
        }
    }

    #[instrument(
        name = "x402.facilitator.settle",
        skip_all,
        fields(network = %requirement.network, amount = %requirement.amount),
        err
    )]
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirements,
    ) -> Result<SettleResponse> {
        let body = facilitator_request(payload, requirement);
        let request = self
            .authorize(self.client.post(self.settle_url.clone()).json(&body))
            .await?;
        match self.send_json::<SettleResponse>(request, "POST /settle").await? {
            Reply::Success(response) => {
                debug!(
                    success = response.success,
                    transaction = ?response.transaction,
                    reason = ?response.error_reason,
                    "Settlement answered"
                );
                Ok(response)
            }
            Reply::Status { status, body } => {
                warn!(%status, body = %body, "Settlement endpoint failed");
                Ok(SettleResponse::failed(
                    requirement.network.clone(),
                    UNEXPECTED_SETTLE_ERROR,
                ))
            }
        }
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match self.bearer_token().await? {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Ok(request),
        }
    }

    /// Returns a valid bearer token, refreshing it if needed.
    ///
    /// The lock is held across the refresh, so concurrent callers wait for a single
    /// token request and then reuse its result.
    async fn bearer_token(&self) -> Result<Option<String>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(Some(token.access_token.clone()));
        }

        let request = self.client.post(self.token_url.clone()).json(credentials);
        let token = match self.send_json::<TokenResponse>(request, "POST /auth/token").await? {
            Reply::Success(token) => token,
            Reply::Status { status, body } => {
                return Err(X402Error::FacilitatorTransport(format!(
                    "POST /auth/token returned {status}: {body}"
                )))
            }
        };
        debug!(expires_in = token.expires_in, "Obtained facilitator token");

        let expires_at = chrono::Duration::try_seconds(token.expires_in)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                X402Error::FacilitatorTransport(format!(
                    "POST /auth/token: invalid expiresIn {}",
                    token.expires_in
                ))
            })?;
        let fresh = CachedToken {
            access_token: token.access_token,
            expires_at,
        };
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(Some(access_token))
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        mut request: RequestBuilder,
        context: &'static str,
    ) -> Result<Reply<R>> {
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| X402Error::FacilitatorTransport(format!("{context}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| X402Error::FacilitatorTransport(format!("{context}: {e}")))?;
            let parsed = serde_json::from_slice(&bytes)
                .map_err(|e| X402Error::ProtocolDecode(format!("{context}: {e}")))?;
            Ok(Reply::Success(parsed))
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(Reply::Status { status, body })
        }
    }
}

impl std::fmt::Debug for FacilitatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.credentials.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn facilitator_request(
    payload: &PaymentPayload,
    requirement: &PaymentRequirements,
) -> FacilitatorRequest {
    FacilitatorRequest {
        x402_version: payload.version().value(),
        payment_payload: payload.clone(),
        payment_requirements: requirement.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_payment_header;
    use crate::types::{ProtocolVersion, RequirementExtra};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MAINNET_CAIP: &str = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";
    const DEVNET_CAIP: &str = "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

    fn requirement() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: DEVNET_CAIP.to_string(),
            amount: "10000".to_string(),
            pay_to: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
            asset: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU".to_string(),
            max_timeout_seconds: 300,
            resource: None,
            description: None,
            mime_type: None,
            output_schema: None,
            extra: Some(RequirementExtra {
                fee_payer: Some("2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4".to_string()),
                ..Default::default()
            }),
        }
    }

    fn payment_header() -> String {
        let payload = PaymentPayload::new(ProtocolVersion::V2, &requirement(), None, "AQID".into());
        encode_payment_header(&payload).unwrap()
    }

    fn supported_body() -> serde_json::Value {
        json!({
            "kinds": [
                {"x402Version": 2, "scheme": "exact", "network": "eip155:8453"},
                {"x402Version": 2, "scheme": "exact", "network": MAINNET_CAIP,
                 "extra": {"feePayer": "MainnetFeePayer1111111111111111111111111111"}},
                {"x402Version": 1, "scheme": "exact", "network": "solana-devnet",
                 "extra": {"feePayer": "DevnetFeePayer11111111111111111111111111111"}}
            ]
        })
    }

    #[tokio::test]
    async fn test_fee_payer_matches_network_family() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_body()))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        assert_eq!(
            facilitator.fee_payer("solana").await.unwrap(),
            "MainnetFeePayer1111111111111111111111111111"
        );
        assert_eq!(
            facilitator.fee_payer(DEVNET_CAIP).await.unwrap(),
            "DevnetFeePayer11111111111111111111111111111"
        );
        assert_eq!(facilitator.supported_kinds().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fee_payer_missing_is_unsupported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kinds": [{"x402Version": 2, "scheme": "exact", "network": MAINNET_CAIP}]
            })))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        assert!(matches!(
            facilitator.fee_payer("solana").await,
            Err(X402Error::FacilitatorNetworkUnsupported(_))
        ));
        assert!(matches!(
            facilitator.fee_payer("solana-devnet").await,
            Err(X402Error::FacilitatorNetworkUnsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_non_2xx_is_local_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        let result = facilitator
            .verify_payment(&payment_header(), &requirement())
            .await
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.invalid_reason.as_deref(), Some(UNEXPECTED_VERIFY_ERROR));
    }

    #[tokio::test]
    async fn test_verify_passes_through_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(json!({
                "x402Version": 2,
                "paymentPayload": {"payload": {"transaction": "AQID"}},
                "paymentRequirements": {"amount": "10000", "network": DEVNET_CAIP}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isValid": false,
                "invalidReason": "insufficient_funds",
                "payer": "Payer111"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        let result = facilitator
            .verify_payment(&payment_header(), &requirement())
            .await
            .unwrap();
        assert_eq!(
            result,
            VerifyResponse {
                is_valid: false,
                invalid_reason: Some("insufficient_funds".to_string()),
                payer: Some("Payer111".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_settle_non_2xx_carries_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        let result = facilitator
            .settle_payment(&payment_header(), &requirement())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.network, DEVNET_CAIP);
        assert_eq!(result.error_reason.as_deref(), Some(UNEXPECTED_SETTLE_ERROR));
    }

    #[tokio::test]
    async fn test_settle_passes_through_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "network": "solana-devnet",
                "errorReason": "blockhash_expired"
            })))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        let result = facilitator
            .settle_payment(&payment_header(), &requirement())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.network, "solana-devnet");
        assert_eq!(result.error_reason.as_deref(), Some("blockhash_expired"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let facilitator = FacilitatorClient::new(&uri).unwrap();

        let err = facilitator
            .verify_payment(&payment_header(), &requirement())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_bad_payment_header_is_decode_error() {
        let facilitator = FacilitatorClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            facilitator.verify_payment("not base64!", &requirement()).await,
            Err(X402Error::ProtocolDecode(_))
        ));
    }

    #[tokio::test]
    async fn test_token_is_fetched_once_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_partial_json(json!({"apiKeyId": "id", "apiKeySecret": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "tok",
                "expiresIn": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true})))
            .expect(4)
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri())
            .unwrap()
            .with_credentials(ApiCredentials::new("id", "secret"));

        let header_value = payment_header();
        let req = requirement();
        let (a, b, c) = tokio::join!(
            facilitator.verify_payment(&header_value, &req),
            facilitator.verify_payment(&header_value, &req),
            facilitator.verify_payment(&header_value, &req),
        );
        assert!(a.unwrap().is_valid && b.unwrap().is_valid && c.unwrap().is_valid);

        let shared = facilitator.clone();
        assert!(shared
            .verify_payment(&header_value, &req)
            .await
            .unwrap()
            .is_valid);
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "tok",
                "expiresIn": 10
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_body()))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri())
            .unwrap()
            .with_credentials(ApiCredentials::new("id", "secret"));

        facilitator.supported().await.unwrap();
        facilitator.supported().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri())
            .unwrap()
            .with_credentials(ApiCredentials::new("id", "wrong"));

        let err = facilitator
            .verify_payment(&payment_header(), &requirement())
            .await
            .unwrap_err();
        assert!(matches!(err, X402Error::FacilitatorTransport(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_token_lifetime_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "tok",
                "expiresIn": 10_000_000_000_000i64
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true})))
            .expect(0)
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri())
            .unwrap()
            .with_credentials(ApiCredentials::new("id", "secret"));

        let err = facilitator
            .verify_payment(&payment_header(), &requirement())
            .await
            .unwrap_err();
        assert!(matches!(err, X402Error::FacilitatorTransport(_)));
    }

    #[tokio::test]
    async fn test_supported_cache_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_body()))
            .expect(1)
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri())
            .unwrap()
            .with_supported_cache_ttl(Duration::from_secs(60));

        facilitator.fee_payer("solana").await.unwrap();
        facilitator.fee_payer("solana-devnet").await.unwrap();
    }

    #[tokio::test]
    async fn test_discovery_is_uncached_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_body()))
            .expect(2)
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        facilitator.supported().await.unwrap();
        facilitator.supported().await.unwrap();
    }

    #[tokio::test]
    async fn test_supported_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let facilitator = FacilitatorClient::new(&server.uri()).unwrap();

        assert!(matches!(
            facilitator.fee_payer("solana").await,
            Err(X402Error::FacilitatorTransport(_))
        ));
    }

    #[test]
    fn test_urls_keep_base_path() {
        let facilitator = FacilitatorClient::new("https://example.com/x402").unwrap();
        assert_eq!(facilitator.verify_url().as_str(), "https://example.com/x402/verify");
        assert_eq!(facilitator.settle_url().as_str(), "https://example.com/x402/settle");
        assert_eq!(
            facilitator.supported_url().as_str(),
            "https://example.com/x402/supported"
        );
    }
}
