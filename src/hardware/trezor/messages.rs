//! Trezor Protobuf 消息定义
//!
//! 手写的 Protobuf 编解码，只覆盖以太坊账户导出、签名和验签所需的消息。

use crate::core::errors::WalletError;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Initialize = 0,
    Success = 2,
    Failure = 3,
    Features = 17,
    PinMatrixRequest = 18,
    ButtonRequest = 26,
    ButtonAck = 27,
    EthereumSignTx = 58,
    EthereumTxRequest = 59,
    EthereumTxAck = 60,
    EthereumSignMessage = 64,
    EthereumVerifyMessage = 65,
    EthereumMessageSignature = 66,
    EthereumGetPublicKey = 450,
    EthereumPublicKey = 451,
}

impl MessageType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Initialize),
            2 => Some(Self::Success),
            3 => Some(Self::Failure),
            17 => Some(Self::Features),
            18 => Some(Self::PinMatrixRequest),
            26 => Some(Self::ButtonRequest),
            27 => Some(Self::ButtonAck),
            58 => Some(Self::EthereumSignTx),
            59 => Some(Self::EthereumTxRequest),
            60 => Some(Self::EthereumTxAck),
            64 => Some(Self::EthereumSignMessage),
            65 => Some(Self::EthereumVerifyMessage),
            66 => Some(Self::EthereumMessageSignature),
            450 => Some(Self::EthereumGetPublicKey),
            451 => Some(Self::EthereumPublicKey),
            _ => None,
        }
    }
}

/// Trezor 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrezorMessage {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl TrezorMessage {
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// 序列化：类型（2 字节）+ 长度（4 字节）+ 内容，均为大端
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.payload.len());
        buf.extend_from_slice(&(self.msg_type as u16).to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// 反序列化消息
    pub fn deserialize(data: &[u8]) -> Result<Self, WalletError> {
        if data.len() < 6 {
            return Err(WalletError::Crypto("Trezor message too short".to_string()));
        }
        let msg_type_val = u16::from_be_bytes([data[0], data[1]]);
        let msg_type = MessageType::from_u16(msg_type_val)
            .ok_or_else(|| WalletError::Crypto(format!("Unknown Trezor message type: {}", msg_type_val)))?;

        let msg_len = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
        if data.len() < 6 + msg_len {
            return Err(WalletError::Crypto("Trezor message incomplete".to_string()));
        }
        Ok(Self { msg_type, payload: data[6..6 + msg_len].to_vec() })
    }
}

/// BIP32 路径编码（repeated uint32，字段 1）
pub fn encode_bip32_path(path: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    for &index in path {
        buf.extend_from_slice(&encode_uint32_field(1, index));
    }
    buf
}

/// Protobuf varint 编码
pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Protobuf varint 解码，返回 (值, 消耗的字节数)
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), WalletError> {
    let mut result = 0u64;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return Err(WalletError::Crypto("Varint overflow".to_string()));
        }
    }
    Err(WalletError::Crypto("Varint incomplete".to_string()))
}

/// 编码字节字段
pub fn encode_bytes_field(field_num: u32, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_varint(&mut buf, ((field_num << 3) | 2) as u64);
    encode_varint(&mut buf, value.len() as u64);
    buf.extend_from_slice(value);
    buf
}

/// 编码字符串字段
pub fn encode_string_field(field_num: u32, value: &str) -> Vec<u8> {
    encode_bytes_field(field_num, value.as_bytes())
}

/// 编码 varint 字段（uint32 / uint64 / bool）
pub fn encode_uint64_field(field_num: u32, value: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_varint(&mut buf, (field_num << 3) as u64);
    encode_varint(&mut buf, value);
    buf
}

pub fn encode_uint32_field(field_num: u32, value: u32) -> Vec<u8> {
    encode_uint64_field(field_num, value as u64)
}

pub fn encode_bool_field(field_num: u32, value: bool) -> Vec<u8> {
    encode_uint64_field(field_num, value as u64)
}

/// 解码后的字段值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    Bytes(Vec<u8>),
}

/// 解码一条消息的所有顶层字段
pub fn decode_fields(mut data: &[u8]) -> Result<Vec<(u32, FieldValue)>, WalletError> {
    let mut fields = Vec::new();
    while !data.is_empty() {
        let (tag, used) = decode_varint(data)?;
        data = &data[used..];
        let field_num = (tag >> 3) as u32;
        match tag & 0x7 {
            0 => {
                let (value, used) = decode_varint(data)?;
                data = &data[used..];
                fields.push((field_num, FieldValue::Varint(value)));
            }
            2 => {
                let (len, used) = decode_varint(data)?;
                let end = used + len as usize;
                if data.len() < end {
                    return Err(WalletError::Crypto("Length-delimited field truncated".to_string()));
                }
                fields.push((field_num, FieldValue::Bytes(data[used..end].to_vec())));
                data = &data[end..];
            }
            wire_type => {
                return Err(WalletError::Crypto(format!("Unsupported wire type: {}", wire_type)));
            }
        }
    }
    Ok(fields)
}

pub fn bytes_field(fields: &[(u32, FieldValue)], field_num: u32) -> Option<&[u8]> {
    fields.iter().find_map(|(num, value)| match value {
        FieldValue::Bytes(bytes) if *num == field_num => Some(bytes.as_slice()),
        _ => None,
    })
}

pub fn varint_field(fields: &[(u32, FieldValue)], field_num: u32) -> Option<u64> {
    fields.iter().find_map(|(num, value)| match value {
        FieldValue::Varint(v) if *num == field_num => Some(*v),
        _ => None,
    })
}

/// `Failure { code = 1; message = 2; }`
pub fn decode_failure(payload: &[u8]) -> Result<(Option<u32>, String), WalletError> {
    let fields = decode_fields(payload)?;
    let code = varint_field(&fields, 1).map(|code| code as u32);
    let message = bytes_field(&fields, 2)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_else(|| "Unknown failure".to_string());
    Ok((code, message))
}

/// `EthereumPublicKey { HDNodeType node = 1; }`，返回 (public_key, chain_code)
pub fn decode_public_key(payload: &[u8]) -> Result<(Vec<u8>, Vec<u8>), WalletError> {
    let fields = decode_fields(payload)?;
    let node = bytes_field(&fields, 1)
        .ok_or_else(|| WalletError::Crypto("EthereumPublicKey without node".to_string()))?;
    let node = decode_fields(node)?;
    // HDNodeType: chain_code = 4, public_key = 6
    let chain_code = bytes_field(&node, 4)
        .ok_or_else(|| WalletError::Crypto("HDNode without chain code".to_string()))?;
    let public_key = bytes_field(&node, 6)
        .ok_or_else(|| WalletError::Crypto("HDNode without public key".to_string()))?;
    Ok((public_key.to_vec(), chain_code.to_vec()))
}

/// `EthereumTxRequest`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequest {
    pub data_length: Option<u32>,
    pub signature_v: Option<u32>,
    pub signature_r: Option<Vec<u8>>,
    pub signature_s: Option<Vec<u8>>,
}

pub fn decode_tx_request(payload: &[u8]) -> Result<TxRequest, WalletError> {
    let fields = decode_fields(payload)?;
    Ok(TxRequest {
        data_length: varint_field(&fields, 1).map(|v| v as u32),
        signature_v: varint_field(&fields, 2).map(|v| v as u32),
        signature_r: bytes_field(&fields, 3).map(<[u8]>::to_vec),
        signature_s: bytes_field(&fields, 4).map(<[u8]>::to_vec),
    })
}

/// `EthereumMessageSignature { signature = 2; address = 3; }`
pub fn decode_message_signature(payload: &[u8]) -> Result<(Vec<u8>, String), WalletError> {
    let fields = decode_fields(payload)?;
    let signature = bytes_field(&fields, 2)
        .ok_or_else(|| WalletError::Crypto("EthereumMessageSignature without signature".to_string()))?;
    let address = bytes_field(&fields, 3)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default();
    Ok((signature.to_vec(), address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = TrezorMessage::new(MessageType::Initialize, vec![0x01, 0x02, 0x03]);
        let serialized = msg.serialize();

        assert_eq!(&serialized[0..2], &[0x00, 0x00]);
        assert_eq!(&serialized[2..6], &[0x00, 0x00, 0x00, 0x03]);
        assert_eq!(&serialized[6..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_message_deserialization() {
        let data = vec![0x01, 0xC3, 0x00, 0x00, 0x00, 0x02, 0x0A, 0x00];
        let msg = TrezorMessage::deserialize(&data).unwrap();
        assert_eq!(msg.msg_type, MessageType::EthereumPublicKey);
        assert_eq!(msg.payload, vec![0x0A, 0x00]);
    }

    #[test]
    fn test_message_deserialization_errors() {
        assert!(TrezorMessage::deserialize(&[0x00]).is_err());
        assert!(TrezorMessage::deserialize(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x10, 0x01]).is_err());
        assert!(TrezorMessage::deserialize(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_varint() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
        assert_eq!(decode_varint(&buf).unwrap(), (300, 2));

        assert!(decode_varint(&[0x80]).is_err());
        assert!(decode_varint(&[0x80; 10]).is_err());
    }

    #[test]
    fn test_decode_fields() {
        let mut payload = encode_uint32_field(1, 4);
        payload.extend(encode_string_field(2, "Action cancelled by user"));
        assert_eq!(decode_failure(&payload).unwrap(), (Some(4), "Action cancelled by user".to_string()));
    }

    #[test]
    fn test_decode_public_key() {
        let mut node = encode_uint32_field(1, 4);
        node.extend(encode_bytes_field(4, &[7u8; 32]));
        node.extend(encode_bytes_field(6, &[2u8; 33]));
        let payload = encode_bytes_field(1, &node);

        let (public_key, chain_code) = decode_public_key(&payload).unwrap();
        assert_eq!(public_key, vec![2u8; 33]);
        assert_eq!(chain_code, vec![7u8; 32]);
    }

    #[test]
    fn test_decode_tx_request() {
        let mut payload = encode_uint32_field(2, 37);
        payload.extend(encode_bytes_field(3, &[1u8; 32]));
        payload.extend(encode_bytes_field(4, &[2u8; 32]));
        let request = decode_tx_request(&payload).unwrap();
        assert_eq!(request.data_length, None);
        assert_eq!(request.signature_v, Some(37));
        assert_eq!(request.signature_r, Some(vec![1u8; 32]));
    }
}
