//! Example x402 facilitator stub.
//!
//! A facilitator verifies payment payloads and settles them on-chain, paying the network
//! fee. This stub performs structural checks on the payer's transaction and answers
//! settlement without broadcasting, which is enough to drive the example server and client
//! locally.
//!
//! Run with:
//! ```bash
//! cargo run --example facilitator
//! ```
//!
//! Environment variables:
//! - FEE_PAYER: Address advertised as fee payer (default: a fixed devnet address)
//! - PORT: Server port (default: 3001)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use solana_signature::Signature;
use spl_token::instruction::TokenInstruction;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use x402_solana::network::{to_canonical, SolanaNetwork};
use x402_solana::schemes::exact_svm::decode_transaction;
use x402_solana::types::{
    FacilitatorRequest, SettleResponse, SupportedKind, SupportedKindExtra, SupportedResponse,
    VerifyResponse, EXACT_SCHEME,
};

struct AppState {
    fee_payer: String,
}

/// Checks the payload's transaction against the requirement; returns the payer on success.
fn check(state: &AppState, request: &FacilitatorRequest) -> Result<String, String> {
    let requirement = &request.payment_requirements;
    let tx = decode_transaction(request.payment_payload.transaction())
        .map_err(|_| "invalid_transaction".to_string())?;

    let keys = tx.message.static_account_keys();
    if keys.first().map(|k| k.to_string()).as_deref() != Some(state.fee_payer.as_str()) {
        return Err("invalid_fee_payer".to_string());
    }
    let payer = keys.get(1).ok_or("missing_payer")?.to_string();
    if tx.signatures.len() < 2 || tx.signatures[1] == Signature::default() {
        return Err("missing_payer_signature".to_string());
    }

    let instructions = tx.message.instructions();
    if instructions.len() != 3 {
        return Err("invalid_instruction_count".to_string());
    }
    let amount = match TokenInstruction::unpack(&instructions[2].data) {
        Ok(TokenInstruction::TransferChecked { amount, .. }) => amount,
        _ => return Err("invalid_transfer_instruction".to_string()),
    };
    if amount.to_string() != requirement.amount {
        return Err("invalid_amount".to_string());
    }
    Ok(payer)
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FacilitatorRequest>,
) -> impl IntoResponse {
    let response = match check(&state, &request) {
        Ok(payer) => VerifyResponse {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer),
        },
        Err(reason) => {
            tracing::info!(%reason, "Rejecting payment");
            VerifyResponse::invalid(reason)
        }
    };
    Json(response)
}

async fn settle_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FacilitatorRequest>,
) -> impl IntoResponse {
    let network = request.payment_requirements.network.clone();
    let response = match check(&state, &request) {
        Ok(payer) => {
            let signature = decode_transaction(request.payment_payload.transaction())
                .ok()
                .and_then(|tx| tx.signatures.get(1).copied())
                .unwrap_or_default();
            tracing::info!(%payer, %signature, "Pretending to settle");
            SettleResponse {
                success: true,
                transaction: Some(signature.to_string()),
                network,
                error_reason: None,
                payer: Some(payer),
            }
        }
        Err(reason) => SettleResponse::failed(network, reason),
    };
    Json(response)
}

async fn supported_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let extra = Some(SupportedKindExtra {
        fee_payer: Some(state.fee_payer.clone()),
    });
    let mut kinds = Vec::new();
    for network in [SolanaNetwork::Devnet, SolanaNetwork::Mainnet] {
        kinds.push(SupportedKind {
            x402_version: 2,
            scheme: EXACT_SCHEME.to_string(),
            network: to_canonical(network).to_string(),
            extra: extra.clone(),
        });
        kinds.push(SupportedKind {
            x402_version: 1,
            scheme: EXACT_SCHEME.to_string(),
            network: network.name().to_string(),
            extra: extra.clone(),
        });
    }
    (StatusCode::OK, Json(SupportedResponse { kinds }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "x402-facilitator-stub",
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let fee_payer = std::env::var("FEE_PAYER")
        .unwrap_or_else(|_| "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse::<u16>()?;

    tracing::info!(%fee_payer, port, "Starting x402 facilitator stub");
    let state = Arc::new(AppState { fee_payer });

    let app = Router::new()
        .route("/verify", post(verify_handler))
        .route("/settle", post(settle_handler))
        .route("/supported", get(supported_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Facilitator listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
