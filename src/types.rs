//! Core type definitions for the x402 protocol.
//!
//! This module contains the wire structures exchanged between client, resource server,
//! and settlement service, for both protocol generations:
//!
//! - **Version 1 (legacy)**: the challenge travels as JSON in the 402 body, requirements
//!   name the network by its human name, and the payment payload is flat.
//! - **Version 2**: the challenge travels base64-encoded in the `PAYMENT-REQUIRED` header,
//!   networks are CAIP-2 identifiers, and the payment payload echoes the accepted
//!   requirement together with a resource descriptor.

use crate::errors::{Result, X402Error};
use http::HeaderName;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// The only payment scheme this crate implements.
pub const EXACT_SCHEME: &str = "exact";

/// Header carrying the version 2 challenge on a 402 response.
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";

/// Header carrying the version 2 payment proof on the retried request.
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";

/// Header carrying the version 2 settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";

/// Header carrying the legacy payment proof.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Header carrying the legacy settlement receipt.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Protocol generation, detected once per exchange and threaded through explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Body-carried challenge, `X-PAYMENT` header, flat payload
    V1,
    /// Header-carried challenge, `PAYMENT-SIGNATURE` header, payload echoes the requirement
    V2,
}

impl ProtocolVersion {
    /// Numeric `x402Version` value.
    pub fn value(&self) -> u8 {
        match self {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }

    /// Request header that carries the payment proof for this generation.
    pub fn payment_header(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => X_PAYMENT_HEADER,
            ProtocolVersion::V2 => PAYMENT_SIGNATURE_HEADER,
        }
    }

    /// Response header that carries the settlement receipt for this generation.
    pub fn payment_response_header(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => X_PAYMENT_RESPONSE_HEADER,
            ProtocolVersion::V2 => PAYMENT_RESPONSE_HEADER,
        }
    }

    /// [`ProtocolVersion::payment_header`] as a typed header name.
    pub fn payment_header_name(&self) -> HeaderName {
        match self {
            ProtocolVersion::V1 => HeaderName::from_static("x-payment"),
            ProtocolVersion::V2 => HeaderName::from_static("payment-signature"),
        }
    }

    /// [`ProtocolVersion::payment_response_header`] as a typed header name.
    pub fn payment_response_header_name(&self) -> HeaderName {
        match self {
            ProtocolVersion::V1 => HeaderName::from_static("x-payment-response"),
            ProtocolVersion::V2 => HeaderName::from_static("payment-response"),
        }
    }
}

/// Typed name of the `PAYMENT-REQUIRED` header.
pub fn payment_required_header_name() -> HeaderName {
    HeaderName::from_static("payment-required")
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = X402Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            other => Err(X402Error::ProtocolDecode(format!(
                "unsupported x402Version {other}"
            ))),
        }
    }
}

macro_rules! version_marker {
    ($name:ident, $value:literal) => {
        #[doc = concat!("Marker that serializes as `", stringify!($value), "` and rejects any other version.")]
        #[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
        pub struct $name;

        impl $name {
            /// Numeric value of this marker.
            pub const VALUE: u8 = $value;
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_u8(Self::VALUE)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let num = u8::deserialize(deserializer)?;
                if num == Self::VALUE {
                    Ok($name)
                } else {
                    Err(serde::de::Error::custom(format!(
                        "expected version {}, got {}",
                        Self::VALUE,
                        num
                    )))
                }
            }
        }
    };
}

version_marker!(X402Version1, 1);
version_marker!(X402Version2, 2);

/// Metadata about the resource being paid for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// URL of the resource
    pub url: String,

    /// Human-readable description of the resource
    #[serde(default)]
    pub description: String,

    /// MIME type of the resource content
    #[serde(default)]
    pub mime_type: String,
}

/// Scheme-specific extra data attached to a requirement.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequirementExtra {
    /// Address that pays network fees, supplied by the settlement service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Fields this crate does not interpret, preserved verbatim
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Describes the payment terms for a specific resource.
///
/// The amount is read from either `amount` or the legacy `maxAmountRequired` field, and
/// always written back as `amount`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme (only `"exact"` is selectable)
    pub scheme: String,

    /// Network, either as a human name (`"solana"`) or CAIP-2 id
    pub network: String,

    /// Amount in atomic units of the asset, as a decimal string
    #[serde(alias = "maxAmountRequired")]
    pub amount: String,

    /// Recipient wallet address
    pub pay_to: String,

    /// Token mint address
    pub asset: String,

    /// Maximum time in seconds that the payment is valid
    pub max_timeout_seconds: u64,

    /// Resource URL (legacy generation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Description (legacy generation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type (legacy generation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// JSON schema describing the output format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Scheme-specific extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<RequirementExtra>,
}

impl PaymentRequirements {
    /// Parses the amount as a `u64` atomic-unit value.
    pub fn amount_atomic(&self) -> Result<u64> {
        self.amount
            .parse::<u64>()
            .map_err(|e| X402Error::InvalidAmount(format!("{}: {}", self.amount, e)))
    }

    /// Fee payer supplied by the settlement service, if any.
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.as_ref().and_then(|e| e.fee_payer.as_deref())
    }

    /// Whether this requirement uses the exact scheme.
    pub fn is_exact(&self) -> bool {
        self.scheme == EXACT_SCHEME
    }
}

/// Challenge returned by a server when payment is required (HTTP 402).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    /// Protocol version
    pub x402_version: u8,

    /// Resource descriptor (version 2 only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,

    /// Accepted payment requirements, in the server's order of preference
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,

    /// Optional error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scheme payload of the exact Solana scheme: a partially signed transfer transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExactSvmPayload {
    /// Base64-encoded bincode `VersionedTransaction`
    pub transaction: String,
}

/// Version 2 payment payload: echoes the accepted requirement.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayloadV2 {
    pub x402_version: X402Version2,
    #[serde(default)]
    pub resource: Option<ResourceInfo>,
    pub accepted: PaymentRequirements,
    pub payload: ExactSvmPayload,
}

/// Version 1 payment payload: flat, no resource descriptor, no echoed requirement.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayloadV1 {
    pub x402_version: X402Version1,
    pub scheme: String,
    pub network: String,
    pub payload: ExactSvmPayload,
}

/// Payment proof sent by the client in the payment header, tagged by protocol version.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum PaymentPayload {
    V2(PaymentPayloadV2),
    V1(PaymentPayloadV1),
}

impl PaymentPayload {
    /// Builds a payload shaped for `version` around a signed transaction.
    pub fn new(
        version: ProtocolVersion,
        requirement: &PaymentRequirements,
        resource: Option<ResourceInfo>,
        transaction: String,
    ) -> Self {
        let payload = ExactSvmPayload { transaction };
        match version {
            ProtocolVersion::V2 => PaymentPayload::V2(PaymentPayloadV2 {
                x402_version: X402Version2,
                resource,
                accepted: requirement.clone(),
                payload,
            }),
            ProtocolVersion::V1 => PaymentPayload::V1(PaymentPayloadV1 {
                x402_version: X402Version1,
                scheme: requirement.scheme.clone(),
                network: requirement.network.clone(),
                payload,
            }),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        match self {
            PaymentPayload::V2(_) => ProtocolVersion::V2,
            PaymentPayload::V1(_) => ProtocolVersion::V1,
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            PaymentPayload::V2(p) => &p.accepted.scheme,
            PaymentPayload::V1(p) => &p.scheme,
        }
    }

    pub fn network(&self) -> &str {
        match self {
            PaymentPayload::V2(p) => &p.accepted.network,
            PaymentPayload::V1(p) => &p.network,
        }
    }

    /// Base64 signed transaction blob.
    pub fn transaction(&self) -> &str {
        match self {
            PaymentPayload::V2(p) => &p.payload.transaction,
            PaymentPayload::V1(p) => &p.payload.transaction,
        }
    }
}

/// Body of `POST /verify` and `POST /settle`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    pub x402_version: u8,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Request sent to the settlement service's `/verify` endpoint.
pub type VerifyRequest = FacilitatorRequest;

/// Request sent to the settlement service's `/settle` endpoint.
pub type SettleRequest = FacilitatorRequest;

/// Response from the settlement service's `/verify` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment payload is valid
    pub is_valid: bool,

    /// Reason if invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,

    /// Paying address, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// A locally produced failure for a settlement service that did not answer properly.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            payer: None,
        }
    }

    /// Converts a semantic rejection into [`X402Error::FacilitatorRejection`].
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(X402Error::FacilitatorRejection {
                reason: self
                    .invalid_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        }
    }
}

/// Response from the settlement service's `/settle` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether the transfer was executed
    pub success: bool,

    /// Transaction signature of the settlement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,

    /// Network where settlement happened or was attempted
    #[serde(default)]
    pub network: String,

    /// Reason if settlement failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    /// Paying address, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    /// A locally produced failure carrying the requirement's network.
    pub fn failed(network: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: None,
            network: network.into(),
            error_reason: Some(reason.into()),
            payer: None,
        }
    }

    /// Converts a semantic failure into [`X402Error::FacilitatorRejection`].
    pub fn ensure_success(&self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(X402Error::FacilitatorRejection {
                reason: self
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        }
    }
}

/// Extra data advertised for a supported kind.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKindExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
}

/// A (version, scheme, network) combination offered by the settlement service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub x402_version: u8,
    pub scheme: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<SupportedKindExtra>,
}

/// Response from the settlement service's `/supported` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SupportedResponse {
    #[serde(default)]
    pub kinds: Vec<SupportedKind>,
}
