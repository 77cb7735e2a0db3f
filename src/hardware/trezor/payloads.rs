//! Trezor service payloads
//!
//! Every request to the Trezor service names its operation type and the
//! minimum firmware the operation needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::defaults::trezor::FIRMWARE_MIN;

/// Operation tag plus firmware constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadType {
    pub kind: &'static str,
    pub required_firmware: &'static str,
}

pub const PAYLOAD_XPUB: PayloadType = PayloadType { kind: "xpubkey", required_firmware: FIRMWARE_MIN };
pub const PAYLOAD_SIGNTX: PayloadType = PayloadType { kind: "signethtx", required_firmware: FIRMWARE_MIN };
pub const PAYLOAD_SIGNMSG: PayloadType = PayloadType { kind: "signethmsg", required_firmware: FIRMWARE_MIN };
pub const PAYLOAD_VERIFYMSG: PayloadType = PayloadType { kind: "verifyethmsg", required_firmware: FIRMWARE_MIN };

/// Operation-specific fields. Hex values are sent without the `0x` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum TrezorParams {
    SignTransaction {
        path: String,
        nonce: String,
        gas_price: String,
        gas_limit: String,
        to: Option<String>,
        value: String,
        data: String,
        chain_id: u64,
    },
    VerifyMessage {
        address: String,
        message: String,
        signature: String,
    },
    SignMessage {
        path: String,
        /// Hex-encoded message bytes.
        message: String,
        hex: bool,
    },
    ExportPublicKey {
        path: String,
    },
}

/// One request to the Trezor service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrezorPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub required_firmware: String,
    #[serde(flatten)]
    pub params: TrezorParams,
}

impl TrezorPayload {
    /// Builds a payload, overriding the firmware floor when one is configured.
    pub fn new(payload_type: PayloadType, required_firmware: Option<&str>, params: TrezorParams) -> Self {
        Self {
            kind: payload_type.kind.to_string(),
            required_firmware: required_firmware.unwrap_or(payload_type.required_firmware).to_string(),
            params,
        }
    }
}

/// `xpubkey` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: String,
    pub chain_code: String,
}

/// `signethtx` response. `v` is whatever integer the device sent.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureComponents {
    pub r: String,
    pub s: String,
    pub v: Value,
}

/// `signethmsg` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSignatureResponse {
    pub address: String,
    pub signature: String,
}
