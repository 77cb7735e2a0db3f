//! Ledger 设备管理
//!
//! 基于 USB HID 的 [`LedgerConnector`] 实现。HID I/O 是阻塞的，所有 APDU 交换
//! 都放到 `spawn_blocking` 中执行。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

use super::apdu::{chunked_commands, encode_path, parse_address, parse_signature, ApduCommand, ApduInstruction, ApduResponse};
use super::transport::LedgerTransport;
use super::{LedgerAddress, LedgerConnector, LedgerFailure, LedgerSession, LedgerSignature};
use crate::core::errors::WalletError;
use crate::hardware::{parse_bip32_path, OpenOptions};

fn transport_failure(error: WalletError) -> LedgerFailure {
    LedgerFailure::new(None, error.to_string())
}

fn check(response: ApduResponse) -> Result<Vec<u8>, LedgerFailure> {
    if response.is_success() {
        Ok(response.data)
    } else {
        Err(LedgerFailure::new(Some(response.status), response.error_description()))
    }
}

fn bip32_path(path: &str) -> Result<Vec<u32>, LedgerFailure> {
    parse_bip32_path(path).map_err(transport_failure)
}

/// 通过 USB HID 直连设备的 Ledger 连接器
pub struct HidLedgerConnector {
    timeout: Duration,
}

impl HidLedgerConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Uses the configured Ledger read timeout.
    pub fn from_options(options: &OpenOptions) -> Self {
        Self::new(Duration::from_secs(options.timeout_secs))
    }
}

#[async_trait]
impl LedgerConnector for HidLedgerConnector {
    async fn connect(&self) -> Result<Box<dyn LedgerSession>, LedgerFailure> {
        let timeout = self.timeout;
        let transport = tokio::task::spawn_blocking(move || LedgerTransport::open(timeout))
            .await
            .map_err(|e| LedgerFailure::new(None, e.to_string()))?
            .map_err(transport_failure)?;
        Ok(Box::new(HidLedgerSession { transport: Arc::new(Mutex::new(transport)) }))
    }
}

/// 一次打开的以太坊应用会话
pub struct HidLedgerSession {
    transport: Arc<Mutex<LedgerTransport>>,
}

impl HidLedgerSession {
    /// 依次发送命令，返回最后一个响应的数据
    async fn run(&self, commands: Vec<ApduCommand>) -> Result<Vec<u8>, LedgerFailure> {
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            let transport = transport.lock();
            let mut data = Vec::new();
            for command in &commands {
                data = check(transport.exchange(command).map_err(transport_failure)?)?;
            }
            Ok::<_, LedgerFailure>(data)
        })
        .await
        .map_err(|e| LedgerFailure::new(None, e.to_string()))?
    }

    async fn sign(&self, ins: ApduInstruction, path: &str, payload: Vec<u8>) -> Result<LedgerSignature, LedgerFailure> {
        let commands = chunked_commands(ins, &bip32_path(path)?, &payload);
        let data = self.run(commands).await?;
        let (v, r, s) = parse_signature(&data).map_err(transport_failure)?;
        Ok(LedgerSignature { r: hex::encode(r), s: hex::encode(s), v: Value::from(v) })
    }
}

#[async_trait]
impl LedgerSession for HidLedgerSession {
    async fn get_address(&self, path: &str, display: bool, chain_code: bool) -> Result<LedgerAddress, LedgerFailure> {
        let path = bip32_path(path)?;
        let command = ApduCommand::new(
            ApduInstruction::GetAddress,
            display as u8,
            chain_code as u8,
            encode_path(&path),
        );
        let data = self.run(vec![command]).await?;
        let (public_key, address, chain_code) = parse_address(&data, chain_code).map_err(transport_failure)?;
        info!("✅ Ledger address: 0x{}", address);
        Ok(LedgerAddress {
            public_key: hex::encode(public_key),
            address,
            chain_code: chain_code.map(hex::encode),
        })
    }

    async fn sign_transaction(&self, path: &str, raw_tx_hex: &str) -> Result<LedgerSignature, LedgerFailure> {
        let raw_tx = hex::decode(raw_tx_hex).map_err(|e| LedgerFailure::new(None, e.to_string()))?;
        self.sign(ApduInstruction::SignTransaction, path, raw_tx).await
    }

    async fn sign_personal_message(&self, path: &str, message_hex: &str) -> Result<LedgerSignature, LedgerFailure> {
        let message = hex::decode(message_hex).map_err(|e| LedgerFailure::new(None, e.to_string()))?;
        let mut payload = (message.len() as u32).to_be_bytes().to_vec();
        payload.extend_from_slice(&message);
        self.sign(ApduInstruction::SignPersonalMessage, path, payload).await
    }
}
