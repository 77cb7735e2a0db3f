//! Ledger 传输层
//!
//! 实现与 Ledger 设备的 HID 通信。APDU 被切分为 64 字节的数据包，每个包带有
//! 通道号、标签和序列号；首包额外携带 APDU 总长度。

use super::apdu::{ApduCommand, ApduResponse};
use crate::core::errors::{Vendor, WalletError};
use hidapi::{HidApi, HidDevice};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ledger 设备 USB 参数
pub const LEDGER_VENDOR_ID: u16 = 0x2C97;
pub const LEDGER_USAGE_PAGE: u16 = 0xFFA0;

/// HID 数据包大小
const HID_PACKET_SIZE: usize = 64;

/// APDU 传输通道
const CHANNEL: u16 = 0x0101;

/// HID 命令标签
const TAG_APDU: u8 = 0x05;

/// 防止设备异常时无限读取
const MAX_PACKETS: u16 = 100;

/// Ledger HID 传输
pub struct LedgerTransport {
    device: HidDevice,
    timeout: Duration,
}

impl LedgerTransport {
    /// 打开第一个已连接的 Ledger 设备
    pub fn open(timeout: Duration) -> Result<Self, WalletError> {
        info!("正在连接 Ledger 设备...");

        let api = HidApi::new().map_err(|e| WalletError::transport(Vendor::Ledger, e.to_string()))?;
        let device_info = api
            .device_list()
            .find(|d| d.vendor_id() == LEDGER_VENDOR_ID && d.usage_page() == LEDGER_USAGE_PAGE)
            .ok_or_else(|| {
                WalletError::transport(Vendor::Ledger, "Ledger device not found, make sure it is connected and unlocked")
            })?;

        let device = device_info
            .open_device(&api)
            .map_err(|e| WalletError::transport(Vendor::Ledger, e.to_string()))?;

        info!("✅ 已连接到 Ledger 设备");
        if let Some(product) = device_info.product_string() {
            info!("  产品: {}", product);
        }
        Ok(Self { device, timeout })
    }

    /// 发送 APDU 命令并接收响应
    pub fn exchange(&self, command: &ApduCommand) -> Result<ApduResponse, WalletError> {
        for packet in build_packets(&command.to_bytes()) {
            let mut report = Vec::with_capacity(HID_PACKET_SIZE + 1);
            report.push(0x00); // Report ID
            report.extend_from_slice(&packet);
            self.device
                .write(&report)
                .map_err(|e| WalletError::transport(Vendor::Ledger, e.to_string()))?;
        }

        let response = ApduResponse::from_bytes(&self.receive()?)?;
        if !response.is_success() {
            warn!("⚠️ APDU 命令failed: {:04X} - {}", response.status, response.error_description());
        }
        Ok(response)
    }

    fn receive(&self) -> Result<Vec<u8>, WalletError> {
        let mut assembler = PacketAssembler::default();
        loop {
            let mut packet = [0u8; HID_PACKET_SIZE];
            let read_len = self
                .device
                .read_timeout(&mut packet, self.timeout.as_millis() as i32)
                .map_err(|e| WalletError::transport(Vendor::Ledger, e.to_string()))?;
            if read_len == 0 {
                return Err(WalletError::transport(Vendor::Ledger, "Ledger read timed out"));
            }
            if let Some(apdu) = assembler.push(&packet[..read_len])? {
                return Ok(apdu);
            }
        }
    }
}

/// 将 APDU 切分为 HID 数据包（不含 report id）
pub fn build_packets(apdu: &[u8]) -> Vec<Vec<u8>> {
    let mut stream = (apdu.len() as u16).to_be_bytes().to_vec();
    stream.extend_from_slice(apdu);

    stream
        .chunks(HID_PACKET_SIZE - 5)
        .enumerate()
        .map(|(sequence, chunk)| {
            let mut packet = Vec::with_capacity(HID_PACKET_SIZE);
            packet.extend_from_slice(&CHANNEL.to_be_bytes());
            packet.push(TAG_APDU);
            packet.extend_from_slice(&(sequence as u16).to_be_bytes());
            packet.extend_from_slice(chunk);
            packet.resize(HID_PACKET_SIZE, 0);
            packet
        })
        .collect()
}

/// 重组 HID 数据包
#[derive(Default)]
pub struct PacketAssembler {
    buffer: Vec<u8>,
    expected: Option<usize>,
    sequence: u16,
}

impl PacketAssembler {
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, WalletError> {
        if packet.len() < 5 {
            return Err(WalletError::transport(Vendor::Ledger, "Ledger packet too short"));
        }
        let channel = u16::from_be_bytes([packet[0], packet[1]]);
        if channel != CHANNEL || packet[2] != TAG_APDU {
            debug!("忽略非 APDU 数据包");
            return Ok(None);
        }
        let sequence = u16::from_be_bytes([packet[3], packet[4]]);
        if sequence != self.sequence {
            return Err(WalletError::transport(
                Vendor::Ledger,
                format!("Sequence mismatch: expected {}, got {}", self.sequence, sequence),
            ));
        }

        let mut data = &packet[5..];
        if self.expected.is_none() {
            if data.len() < 2 {
                return Err(WalletError::transport(Vendor::Ledger, "Ledger response header incomplete"));
            }
            self.expected = Some(u16::from_be_bytes([data[0], data[1]]) as usize);
            data = &data[2..];
        }
        self.buffer.extend_from_slice(data);
        self.sequence += 1;

        match self.expected {
            Some(expected) if self.buffer.len() >= expected => {
                self.buffer.truncate(expected);
                Ok(Some(std::mem::take(&mut self.buffer)))
            }
            _ if self.sequence > MAX_PACKETS => {
                Err(WalletError::transport(Vendor::Ledger, "Too many packets in Ledger response"))
            }
            _ => Ok(None),
        }
    }
}
