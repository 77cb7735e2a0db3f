//! Trezor 设备管理
//!
//! 基于 USB HID 的 [`TrezorConnector`] 实现：把服务 payload 转成以太坊 Protobuf
//! 消息，处理按钮确认，再把设备响应转回 JSON。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::helpers::TrezorFailure;
use super::messages::{
    bytes_field, decode_failure, decode_fields, decode_message_signature, decode_public_key, decode_tx_request,
    encode_bool_field, encode_bytes_field, encode_string_field, encode_uint32_field, encode_bip32_path,
    varint_field, MessageType, TrezorMessage,
};
use super::payloads::{TrezorParams, TrezorPayload};
use super::transport::TrezorTransport;
use super::TrezorConnector;
use crate::core::errors::WalletError;
use crate::hardware::parse_bip32_path;

/// 首个 EthereumSignTx 消息携带的数据上限
const DATA_CHUNK_SIZE: usize = 1024;

/// Trezor 设备信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrezorFeatures {
    pub vendor: String,
    pub model: String,
    pub firmware: (u32, u32, u32),
}

impl TrezorFeatures {
    /// `Features { vendor = 1; major = 2; minor = 3; patch = 4; model = 21; }`
    pub fn decode(payload: &[u8]) -> Result<Self, WalletError> {
        let fields = decode_fields(payload)?;
        let text = |num| {
            bytes_field(&fields, num)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default()
        };
        let number = |num| varint_field(&fields, num).unwrap_or_default() as u32;
        Ok(Self { vendor: text(1), model: text(21), firmware: (number(2), number(3), number(4)) })
    }

    /// 固件版本是否满足 `required`（形如 `1.5.2`）
    pub fn satisfies(&self, required: &str) -> bool {
        let mut parts = required.split('.').map(|part| part.parse::<u32>().unwrap_or_default());
        let required = (
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
        );
        self.firmware >= required
    }
}

/// 通过 USB HID 直连设备的 Trezor 连接器
pub struct HidTrezorConnector {
    transport: Arc<Mutex<TrezorTransport>>,
    features: TrezorFeatures,
}

impl HidTrezorConnector {
    /// 连接并初始化设备
    pub fn connect(timeout: Duration) -> Result<Self, WalletError> {
        let transport = TrezorTransport::open(timeout)?;
        let response = transport.exchange(&TrezorMessage::new(MessageType::Initialize, vec![]))?;
        if response.msg_type != MessageType::Features {
            return Err(WalletError::Crypto(format!("Expected Features, got {:?}", response.msg_type)));
        }
        let features = TrezorFeatures::decode(&response.payload)?;
        let (major, minor, patch) = features.firmware;
        info!("✅ Trezor: {} {} v{}.{}.{}", features.vendor, features.model, major, minor, patch);

        Ok(Self { transport: Arc::new(Mutex::new(transport)), features })
    }

    pub fn features(&self) -> &TrezorFeatures {
        &self.features
    }
}

#[async_trait]
impl TrezorConnector for HidTrezorConnector {
    async fn payload_listener(&self, payload: TrezorPayload) -> Result<Value, TrezorFailure> {
        if !self.features.satisfies(&payload.required_firmware) {
            let (major, minor, patch) = self.features.firmware;
            return Err(TrezorFailure::new(
                None,
                format!(
                    "Firmware {}.{}.{} is older than the required {}",
                    major, minor, patch, payload.required_firmware
                ),
            ));
        }

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            let transport = transport.lock();
            dispatch(&transport, payload.params)
        })
        .await
        .map_err(|e| TrezorFailure::new(None, e.to_string()))?
    }
}

fn device_error(error: WalletError) -> TrezorFailure {
    TrezorFailure::new(None, error.to_string())
}

/// 发送请求并处理中间的 ButtonRequest，Failure 转为 [`TrezorFailure`]
fn call(transport: &TrezorTransport, request: TrezorMessage) -> Result<TrezorMessage, TrezorFailure> {
    let mut response = transport.exchange(&request).map_err(device_error)?;
    loop {
        match response.msg_type {
            MessageType::ButtonRequest => {
                debug!("等待设备按钮确认...");
                response = transport
                    .exchange(&TrezorMessage::new(MessageType::ButtonAck, vec![]))
                    .map_err(device_error)?;
            }
            MessageType::Failure => {
                let (code, message) = decode_failure(&response.payload).map_err(device_error)?;
                warn!("Trezor failure {:?}: {}", code, message);
                return Err(TrezorFailure::new(code, message));
            }
            MessageType::PinMatrixRequest => {
                return Err(TrezorFailure::new(None, "Unlock the device before connecting"));
            }
            _ => return Ok(response),
        }
    }
}

fn expect(response: &TrezorMessage, expected: MessageType) -> Result<(), TrezorFailure> {
    if response.msg_type == expected {
        Ok(())
    } else {
        Err(TrezorFailure::new(None, format!("Expected {:?}, got {:?}", expected, response.msg_type)))
    }
}

/// 设备期望无前导零的大端整数
fn integer_bytes(hex_value: &str) -> Result<Vec<u8>, TrezorFailure> {
    let bytes = hex::decode(hex_value).map_err(|e| TrezorFailure::new(None, e.to_string()))?;
    Ok(bytes.into_iter().skip_while(|b| *b == 0).collect())
}

/// Device fields carrying lengths and chain ids are `uint32`.
fn uint32(field: &str, value: u64) -> Result<u32, TrezorFailure> {
    u32::try_from(value).map_err(|_| {
        TrezorFailure::new(None, format!("{} {} does not fit the device's uint32 field", field, value))
    })
}

fn address_n(path: &str) -> Result<Vec<u8>, TrezorFailure> {
    parse_bip32_path(path).map(|path| encode_bip32_path(&path)).map_err(device_error)
}

fn dispatch(transport: &TrezorTransport, params: TrezorParams) -> Result<Value, TrezorFailure> {
    match params {
        TrezorParams::ExportPublicKey { path } => {
            let mut request = address_n(&path)?;
            request.extend(encode_bool_field(2, false));
            let response = call(transport, TrezorMessage::new(MessageType::EthereumGetPublicKey, request))?;
            expect(&response, MessageType::EthereumPublicKey)?;
            let (public_key, chain_code) = decode_public_key(&response.payload).map_err(device_error)?;
            Ok(json!({ "publicKey": hex::encode(public_key), "chainCode": hex::encode(chain_code) }))
        }
        TrezorParams::SignTransaction { path, nonce, gas_price, gas_limit, to, value, data, chain_id } => {
            let data = hex::decode(&data).map_err(|e| TrezorFailure::new(None, e.to_string()))?;
            let mut request = address_n(&path)?;
            request.extend(encode_bytes_field(2, &integer_bytes(&nonce)?));
            request.extend(encode_bytes_field(3, &integer_bytes(&gas_price)?));
            request.extend(encode_bytes_field(4, &integer_bytes(&gas_limit)?));
            if let Some(to) = &to {
                request.extend(encode_string_field(11, &format!("0x{}", to)));
            }
            request.extend(encode_bytes_field(6, &integer_bytes(&value)?));
            let (initial, mut rest) = data.split_at(data.len().min(DATA_CHUNK_SIZE));
            if !initial.is_empty() {
                request.extend(encode_bytes_field(7, initial));
                request.extend(encode_uint32_field(8, uint32("Data length", data.len() as u64)?));
            }
            request.extend(encode_uint32_field(9, uint32("Chain id", chain_id)?));

            let mut response = call(transport, TrezorMessage::new(MessageType::EthereumSignTx, request))?;
            loop {
                expect(&response, MessageType::EthereumTxRequest)?;
                let tx_request = decode_tx_request(&response.payload).map_err(device_error)?;
                match tx_request.data_length {
                    Some(length) if length > 0 => {
                        let (chunk, remaining) = rest.split_at((length as usize).min(rest.len()));
                        rest = remaining;
                        response = call(
                            transport,
                            TrezorMessage::new(MessageType::EthereumTxAck, encode_bytes_field(1, chunk)),
                        )?;
                    }
                    _ => {
                        let (Some(v), Some(r), Some(s)) =
                            (tx_request.signature_v, tx_request.signature_r, tx_request.signature_s)
                        else {
                            return Err(TrezorFailure::new(None, "EthereumTxRequest without signature"));
                        };
                        return Ok(json!({ "r": hex::encode(r), "s": hex::encode(s), "v": v }));
                    }
                }
            }
        }
        TrezorParams::SignMessage { path, message, hex: _ } => {
            let message = hex::decode(&message).map_err(|e| TrezorFailure::new(None, e.to_string()))?;
            let mut request = address_n(&path)?;
            request.extend(encode_bytes_field(2, &message));
            let response = call(transport, TrezorMessage::new(MessageType::EthereumSignMessage, request))?;
            expect(&response, MessageType::EthereumMessageSignature)?;
            let (signature, address) = decode_message_signature(&response.payload).map_err(device_error)?;
            Ok(json!({ "address": address, "signature": hex::encode(signature) }))
        }
        TrezorParams::VerifyMessage { address, message, signature } => {
            let signature = hex::decode(&signature).map_err(|e| TrezorFailure::new(None, e.to_string()))?;
            let mut request = encode_bytes_field(2, &signature);
            request.extend(encode_bytes_field(3, message.as_bytes()));
            request.extend(encode_string_field(4, &format!("0x{}", address)));
            let response = call(transport, TrezorMessage::new(MessageType::EthereumVerifyMessage, request))?;
            expect(&response, MessageType::Success)?;
            Ok(json!({ "success": true }))
        }
    }
}
