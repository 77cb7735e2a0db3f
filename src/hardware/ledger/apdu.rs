//! APDU (Application Protocol Data Unit) 命令处理
//!
//! 实现与 Ledger 以太坊应用通信的 APDU 协议

use crate::core::errors::WalletError;
use tracing::debug;

/// APDU 命令类（以太坊应用使用 0xE0）
pub const CLA_ETHEREUM: u8 = 0xE0;

/// 单个 APDU 的最大数据长度
pub const MAX_CHUNK_SIZE: usize = 255;

/// 以太坊应用指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApduInstruction {
    /// fetch公钥和address
    GetAddress = 0x02,
    /// Sign transaction
    SignTransaction = 0x04,
    /// fetch应用配置
    GetAppConfiguration = 0x06,
    /// personal_sign 消息
    SignPersonalMessage = 0x08,
}

/// 分块签名时 P1 的取值
pub const P1_FIRST_CHUNK: u8 = 0x00;
pub const P1_MORE_CHUNKS: u8 = 0x80;

/// APDU 命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(ins: ApduInstruction, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self { cla: CLA_ETHEREUM, ins: ins as u8, p1, p2, data }
    }

    /// 序列化为字节数组
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.cla, self.ins, self.p1, self.p2, self.data.len() as u8];
        bytes.extend_from_slice(&self.data);

        debug!(
            "APDU 命令: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Len={}",
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.data.len()
        );
        bytes
    }
}

/// APDU 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub status: u16,
}

impl ApduResponse {
    /// from字节数组解析，最后两个字节为状态字
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() < 2 {
            return Err(WalletError::Crypto("APDU response too short".to_string()));
        }
        let (data, sw) = bytes.split_at(bytes.len() - 2);
        let status = u16::from_be_bytes([sw[0], sw[1]]);
        debug!("APDU 响应: SW={:04X} DataLen={}", status, data.len());
        Ok(Self { data: data.to_vec(), status })
    }

    pub fn is_success(&self) -> bool {
        self.status == crate::core::defaults::ledger::SW_OK
    }

    /// fetcherror描述
    pub fn error_description(&self) -> &'static str {
        match self.status {
            0x9000 => "success",
            0x6982 => "Security status not satisfied",
            0x6985 => "Condition of use not satisfied",
            0x6A80 => "Invalid data",
            0x6B00 => "Incorrect parameter P1 or P2",
            0x6D00 => "Instruction not supported, is the Ethereum app open?",
            0x6E00 => "Class not supported",
            0x6700 => "Incorrect length",
            _ => "Unknown status",
        }
    }
}

/// BIP32 路径编码：1 字节层数 + 每层 4 字节大端
pub fn encode_path(path: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + path.len() * 4);
    bytes.push(path.len() as u8);
    for index in path {
        bytes.extend_from_slice(&index.to_be_bytes());
    }
    bytes
}

/// 把签名数据切分为多个 APDU：首块带路径前缀，后续块 P1 = 0x80
pub fn chunked_commands(ins: ApduInstruction, path: &[u32], payload: &[u8]) -> Vec<ApduCommand> {
    let mut first = encode_path(path);
    let first_len = (MAX_CHUNK_SIZE - first.len()).min(payload.len());
    first.extend_from_slice(&payload[..first_len]);

    let mut commands = vec![ApduCommand::new(ins, P1_FIRST_CHUNK, 0x00, first)];
    commands.extend(
        payload[first_len..]
            .chunks(MAX_CHUNK_SIZE)
            .map(|chunk| ApduCommand::new(ins, P1_MORE_CHUNKS, 0x00, chunk.to_vec())),
    );
    commands
}

/// `v || r || s` 签名响应
pub fn parse_signature(data: &[u8]) -> Result<(u8, Vec<u8>, Vec<u8>), WalletError> {
    if data.len() < 65 {
        return Err(WalletError::Crypto("Ledger signature response incomplete".to_string()));
    }
    Ok((data[0], data[1..33].to_vec(), data[33..65].to_vec()))
}

/// `getAddress` 响应：公钥长度 + 公钥 + address长度 + address（ASCII）+ 可选 chain code
pub fn parse_address(data: &[u8], with_chain_code: bool) -> Result<(Vec<u8>, String, Option<Vec<u8>>), WalletError> {
    let incomplete = || WalletError::Crypto("Ledger address response incomplete".to_string());

    let key_len = *data.first().ok_or_else(incomplete)? as usize;
    let public_key = data.get(1..1 + key_len).ok_or_else(incomplete)?.to_vec();
    let mut offset = 1 + key_len;

    let address_len = *data.get(offset).ok_or_else(incomplete)? as usize;
    offset += 1;
    let address = data.get(offset..offset + address_len).ok_or_else(incomplete)?;
    let address = String::from_utf8_lossy(address).into_owned();
    offset += address_len;

    let chain_code = if with_chain_code {
        Some(data.get(offset..offset + 32).ok_or_else(incomplete)?.to_vec())
    } else {
        None
    };
    Ok((public_key, address, chain_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apdu_command_serialization() {
        let cmd = ApduCommand::new(ApduInstruction::GetAddress, 0x00, 0x01, vec![0x01, 0x02, 0x03]);
        assert_eq!(cmd.to_bytes(), vec![0xE0, 0x02, 0x00, 0x01, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_apdu_response_parsing() {
        let response = ApduResponse::from_bytes(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(response.data, vec![0x01, 0x02]);
        assert!(response.is_success());

        let denied = ApduResponse::from_bytes(&[0x69, 0x85]).unwrap();
        assert!(!denied.is_success());
        assert_eq!(denied.status, 0x6985);
        assert_eq!(denied.error_description(), "Condition of use not satisfied");

        assert!(ApduResponse::from_bytes(&[0x90]).is_err());
    }

    #[test]
    fn test_encode_path() {
        let bytes = encode_path(&[0x8000002C, 0x8000003C, 0x80000000, 0, 0]);
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], 5);
        assert_eq!(&bytes[1..5], &[0x80, 0x00, 0x00, 0x2C]);
    }

    #[test]
    fn test_chunked_commands() {
        let path = [0x8000002C, 0x8000003C, 0x80000000, 0, 0];
        let commands = chunked_commands(ApduInstruction::SignTransaction, &path, &[0xAB; 400]);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].p1, P1_FIRST_CHUNK);
        assert_eq!(commands[0].data.len(), MAX_CHUNK_SIZE);
        assert_eq!(commands[1].p1, P1_MORE_CHUNKS);
        assert_eq!(commands[1].data.len(), 400 - (MAX_CHUNK_SIZE - 21));
    }

    #[test]
    fn test_parse_address() {
        let mut data = vec![65];
        data.extend_from_slice(&[4u8; 65]);
        data.push(40);
        data.extend_from_slice(b"3535353535353535353535353535353535353535");
        data.extend_from_slice(&[7u8; 32]);

        let (public_key, address, chain_code) = parse_address(&data, true).unwrap();
        assert_eq!(public_key.len(), 65);
        assert_eq!(address, "3535353535353535353535353535353535353535");
        assert_eq!(chain_code, Some(vec![7u8; 32]));
        assert!(parse_address(&data[..80], false).is_err());
    }

    #[test]
    fn test_parse_signature() {
        let mut data = vec![0x25];
        data.extend_from_slice(&[1u8; 64]);
        let (v, r, s) = parse_signature(&data).unwrap();
        assert_eq!(v, 37);
        assert_eq!(r, vec![1u8; 32]);
        assert_eq!(s.len(), 32);
    }
}
