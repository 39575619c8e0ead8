//! Integration tests for the x402-solana library.
//!
//! The client negotiates against a [`PaymentHandler`] running in-process, which in turn
//! talks to a mocked facilitator. The ledger is an in-memory map.

use async_trait::async_trait;
use http::{HeaderMap, Request, Response, StatusCode};
use serde_json::{json, Value};
use solana_account::Account;
use solana_keypair::Keypair;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use spl_token::solana_program::program_option::COption;
use spl_token::solana_program::program_pack::Pack;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use x402_solana::client::{get, HttpTransport, X402ClientConfig};
use x402_solana::codec::decode_payment_response;
use x402_solana::ledger::{associated_token_address, LedgerClient, TokenProgram};
use x402_solana::schemes::exact_svm::decode_transaction;
use x402_solana::server::{PaymentConfig, PaymentHandler, PaymentOutcome, RouteConfig};
use x402_solana::types::PaymentPayload;
use x402_solana::wallet::Wallet;
use x402_solana::{ProtocolVersion, SolanaNetwork, X402Error};

const PAY_TO: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
const FEE_PAYER: &str = "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4";
const DEVNET_CAIP: &str = "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1";
const RESOURCE: &str = "http://api.test/weather";

#[derive(Default)]
struct MemoryLedger {
    accounts: Mutex<HashMap<Pubkey, Account>>,
}

impl MemoryLedger {
    /// A devnet ledger where `payer` and the treasury hold USDC accounts.
    fn funded(payer: &Pubkey) -> Arc<Self> {
        let ledger = Arc::new(Self::default());
        let mint = SolanaNetwork::Devnet.usdc_mint();
        let treasury = Pubkey::from_str(PAY_TO).unwrap();

        let mut data = vec![0u8; spl_token::state::Mint::LEN];
        spl_token::state::Mint::pack(
            spl_token::state::Mint {
                mint_authority: COption::None,
                supply: 1_000_000_000,
                decimals: 6,
                is_initialized: true,
                freeze_authority: COption::None,
            },
            &mut data,
        )
        .unwrap();
        ledger.insert(mint, data);
        for owner in [payer, &treasury] {
            let ata = associated_token_address(owner, &mint, TokenProgram::Token);
            ledger.insert(ata, vec![0u8; 165]);
        }
        ledger
    }

    fn insert(&self, pubkey: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(
            pubkey,
            Account {
                lamports: 1,
                data,
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_account(&self, pubkey: &Pubkey) -> x402_solana::Result<Account> {
        self.accounts
            .lock()
            .unwrap()
            .get(pubkey)
            .cloned()
            .ok_or_else(|| X402Error::LedgerError(format!("account {pubkey} not found")))
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> x402_solana::Result<Vec<Option<Account>>> {
        let accounts = self.accounts.lock().unwrap();
        Ok(pubkeys.iter().map(|p| accounts.get(p).cloned()).collect())
    }

    async fn get_latest_blockhash(&self) -> x402_solana::Result<Hash> {
        Ok(Hash::new_from_array([9; 32]))
    }
}

/// Routes client requests straight into a payment handler.
#[derive(Clone)]
struct InProcessServer {
    handler: PaymentHandler,
    route: RouteConfig,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl HttpTransport for InProcessServer {
    async fn send(&self, request: Request<Vec<u8>>) -> x402_solana::Result<Response<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let uri = request.uri().to_string();
        let outcome = self
            .handler
            .process(request.headers(), &self.route, &uri, || async {
                json!({"forecast": "sunny"}).to_string().into_bytes()
            })
            .await?;
        match outcome {
            PaymentOutcome::PaymentRequired(response) => Ok(response),
            PaymentOutcome::Served(served) => {
                let mut headers = HeaderMap::new();
                served.apply_headers(&mut headers);
                let mut response = Response::new(served.value);
                *response.headers_mut() = headers;
                Ok(response)
            }
        }
    }
}

async fn facilitator(verify: Value, expected_verifications: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/supported"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kinds": [
                {"x402Version": 2, "scheme": "exact", "network": DEVNET_CAIP,
                 "extra": {"feePayer": FEE_PAYER}},
                {"x402Version": 1, "scheme": "exact", "network": "solana-devnet",
                 "extra": {"feePayer": FEE_PAYER}}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(verify))
        .expect(expected_verifications)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "transaction": "3xSettledSignature",
            "network": DEVNET_CAIP,
            "payer": "payer"
        })))
        .mount(&server)
        .await;
    server
}

fn server(
    facilitator: &MockServer,
    version: ProtocolVersion,
    ledger: Arc<MemoryLedger>,
) -> InProcessServer {
    let config = PaymentConfig::new(SolanaNetwork::Devnet, PAY_TO, facilitator.uri())
        .with_description("Weather forecast")
        .with_protocol_version(version);
    InProcessServer {
        handler: PaymentHandler::new(config).unwrap().with_ledger(ledger),
        route: RouteConfig::new("$0.01"),
        calls: Arc::new(AtomicUsize::new(0)),
    }
}

fn client(keypair: Keypair, server: &InProcessServer, ledger: Arc<MemoryLedger>) -> X402ClientConfig {
    X402ClientConfig::new(Wallet::new(keypair), SolanaNetwork::Devnet)
        .with_transport(server.clone())
        .with_ledger(ledger)
}

async fn verified_payload(facilitator: &MockServer) -> PaymentPayload {
    let requests = facilitator.received_requests().await.unwrap();
    let verify = requests
        .iter()
        .find(|r| r.url.path() == "/verify")
        .expect("verify was called");
    let body: Value = serde_json::from_slice(&verify.body).unwrap();
    serde_json::from_value(body["paymentPayload"].clone()).unwrap()
}

#[tokio::test]
async fn test_v2_payment_end_to_end() {
    let keypair = Keypair::new_from_array([3; 32]);
    let payer = keypair.pubkey();
    let ledger = MemoryLedger::funded(&payer);
    let facilitator = facilitator(json!({"isValid": true, "payer": payer.to_string()}), 1).await;
    let server = server(&facilitator, ProtocolVersion::V2, ledger.clone());
    let config = client(keypair, &server, ledger);

    let response = get(&config, RESOURCE).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.calls.load(Ordering::SeqCst), 2);

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["forecast"], "sunny");

    let receipt = decode_payment_response(response.headers()).unwrap().unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.transaction.as_deref(), Some("3xSettledSignature"));
    assert!(response.headers().contains_key("payment-response"));

    let payload = verified_payload(&facilitator).await;
    assert_eq!(payload.version(), ProtocolVersion::V2);
    assert_eq!(payload.network(), DEVNET_CAIP);

    let tx = decode_transaction(payload.transaction()).unwrap();
    assert_eq!(tx.message.instructions().len(), 3);
    assert_eq!(tx.message.static_account_keys()[0].to_string(), FEE_PAYER);
    assert_eq!(tx.signatures.len(), 2);
    assert_eq!(tx.signatures[0], Signature::default());
    assert_ne!(tx.signatures[1], Signature::default());
}

#[tokio::test]
async fn test_v1_payment_end_to_end() {
    let keypair = Keypair::new_from_array([4; 32]);
    let ledger = MemoryLedger::funded(&keypair.pubkey());
    let facilitator = facilitator(json!({"isValid": true}), 1).await;
    let server = server(&facilitator, ProtocolVersion::V1, ledger.clone());
    let config = client(keypair, &server, ledger);

    let response = get(&config, RESOURCE).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-payment-response"));

    let payload = verified_payload(&facilitator).await;
    assert_eq!(payload.version(), ProtocolVersion::V1);
    assert_eq!(payload.network(), "solana-devnet");
    assert_eq!(payload.scheme(), "exact");
}

#[tokio::test]
async fn test_rejected_payment_is_returned_without_looping() {
    let keypair = Keypair::new_from_array([5; 32]);
    let ledger = MemoryLedger::funded(&keypair.pubkey());
    let facilitator = facilitator(
        json!({"isValid": false, "invalidReason": "insufficient_funds"}),
        1,
    )
    .await;
    let server = server(&facilitator, ProtocolVersion::V2, ledger.clone());
    let config = client(keypair, &server, ledger);

    let response = get(&config, RESOURCE).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(server.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_spending_ceiling_blocks_payment() {
    let keypair = Keypair::new_from_array([6; 32]);
    let ledger = MemoryLedger::funded(&keypair.pubkey());
    let facilitator = facilitator(json!({"isValid": true}), 0).await;
    let server = server(&facilitator, ProtocolVersion::V2, ledger.clone());
    let config = client(keypair, &server, ledger).with_max_amount(5_000);

    let err = get(&config, RESOURCE).await.unwrap_err();
    assert!(matches!(
        err,
        X402Error::AmountExceedsLimit {
            amount: 10_000,
            limit: 5_000
        }
    ));
    assert_eq!(server.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_watch_only_wallet_cannot_pay() {
    let keypair = Keypair::new_from_array([7; 32]);
    let ledger = MemoryLedger::funded(&keypair.pubkey());
    let facilitator = facilitator(json!({"isValid": true}), 0).await;
    let server = server(&facilitator, ProtocolVersion::V2, ledger.clone());
    let config = X402ClientConfig::new(Wallet::watch_only(keypair.pubkey()), SolanaNetwork::Devnet)
        .with_transport(server.clone())
        .with_ledger(ledger);

    let err = get(&config, RESOURCE).await.unwrap_err();
    assert!(matches!(err, X402Error::MissingWalletCapability));
}

#[tokio::test]
async fn test_unfunded_payer_fails_before_retry() {
    let keypair = Keypair::new_from_array([8; 32]);
    let ledger = MemoryLedger::funded(&Pubkey::new_from_array([1; 32]));
    let facilitator = facilitator(json!({"isValid": true}), 0).await;
    let server = server(&facilitator, ProtocolVersion::V2, ledger.clone());
    let config = client(keypair, &server, ledger);

    let err = get(&config, RESOURCE).await.unwrap_err();
    assert!(matches!(err, X402Error::MissingSourceAccount(_)));
    assert_eq!(server.calls.load(Ordering::SeqCst), 1);
}
