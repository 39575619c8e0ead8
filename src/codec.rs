//! Wire encoding for both protocol generations.
//!
//! Headers carry base64-encoded JSON. The version 2 challenge lives in the
//! `PAYMENT-REQUIRED` header; the legacy challenge is the JSON body of the 402 response.
//! The generation is detected once by [`decode_challenge`] and then threaded through
//! as a [`ProtocolVersion`].

use crate::errors::{Result, X402Error};
use crate::types::{
    PaymentChallenge, PaymentPayload, ProtocolVersion, SettleResponse, PAYMENT_REQUIRED_HEADER,
    PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER, X_PAYMENT_HEADER,
    X_PAYMENT_RESPONSE_HEADER,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn encode_b64_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64.encode(json))
}

fn decode_b64_json<T: DeserializeOwned>(encoded: &str, what: &str) -> Result<T> {
    let bytes = BASE64
        .decode(encoded.trim().as_bytes())
        .map_err(|e| X402Error::ProtocolDecode(format!("{what}: invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::ProtocolDecode(format!("{what}: invalid JSON: {e}")))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Encodes a challenge for the `PAYMENT-REQUIRED` header.
pub fn encode_challenge_header(challenge: &PaymentChallenge) -> Result<String> {
    encode_b64_json(challenge)
}

/// Decodes the value of a `PAYMENT-REQUIRED` header.
pub fn decode_challenge_header(encoded: &str) -> Result<PaymentChallenge> {
    decode_b64_json(encoded, "payment challenge header")
}

/// Encodes a challenge as a legacy 402 body.
pub fn encode_challenge_body(challenge: &PaymentChallenge) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(challenge)?)
}

/// Decodes a legacy 402 body.
pub fn decode_challenge_body(body: &[u8]) -> Result<PaymentChallenge> {
    serde_json::from_slice(body)
        .map_err(|e| X402Error::ProtocolDecode(format!("payment challenge body: {e}")))
}

/// Decodes the challenge of a 402 response, detecting the protocol generation.
///
/// The presence of a `PAYMENT-REQUIRED` header selects version 2; otherwise the body is
/// parsed as a legacy challenge.
pub fn decode_challenge(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(ProtocolVersion, PaymentChallenge)> {
    match header_str(headers, PAYMENT_REQUIRED_HEADER) {
        Some(encoded) => Ok((ProtocolVersion::V2, decode_challenge_header(encoded)?)),
        None => Ok((ProtocolVersion::V1, decode_challenge_body(body)?)),
    }
}

/// Encodes a payment payload as a base64 JSON header value.
///
/// # Examples
///
/// ```
/// use x402_solana::codec::{decode_payment_header, encode_payment_header};
/// use x402_solana::types::{ExactSvmPayload, PaymentPayload, PaymentPayloadV1, X402Version1};
///
/// let payload = PaymentPayload::V1(PaymentPayloadV1 {
///     x402_version: X402Version1,
///     scheme: "exact".to_string(),
///     network: "solana-devnet".to_string(),
///     payload: ExactSvmPayload { transaction: "AQID".to_string() },
/// });
///
/// let encoded = encode_payment_header(&payload).unwrap();
/// let decoded = decode_payment_header(&encoded).unwrap();
/// assert_eq!(decoded.network(), "solana-devnet");
/// ```
pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String> {
    encode_b64_json(payload)
}

/// Decodes a payment header value into a payload of either generation.
pub fn decode_payment_header(encoded: &str) -> Result<PaymentPayload> {
    decode_b64_json(encoded, "payment header")
}

/// Finds whichever payment header is present on an inbound request.
///
/// Header names match case-insensitively. When both are present the version 2 header wins.
pub fn extract_payment(headers: &HeaderMap) -> Option<(ProtocolVersion, String)> {
    if let Some(value) = header_str(headers, PAYMENT_SIGNATURE_HEADER) {
        return Some((ProtocolVersion::V2, value.to_string()));
    }
    header_str(headers, X_PAYMENT_HEADER).map(|value| (ProtocolVersion::V1, value.to_string()))
}

/// Encodes a settlement receipt for the payment response header.
pub fn encode_payment_response(settlement: &SettleResponse) -> Result<String> {
    encode_b64_json(settlement)
}

/// Decodes the settlement receipt attached to a paid response, if any.
pub fn decode_payment_response(headers: &HeaderMap) -> Result<Option<SettleResponse>> {
    let encoded = header_str(headers, PAYMENT_RESPONSE_HEADER)
        .or_else(|| header_str(headers, X_PAYMENT_RESPONSE_HEADER));
    match encoded {
        Some(encoded) => decode_b64_json(encoded, "payment response header").map(Some),
        None => Ok(None),
    }
}
