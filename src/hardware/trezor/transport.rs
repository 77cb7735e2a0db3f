//! Trezor 传输层
//!
//! 实现与 Trezor 设备的 USB HID 通信。每个 HID 报告 64 字节：首包以 `?##` 开头，
//! 紧跟消息类型和长度；后续包以 `?` 开头。

use super::messages::TrezorMessage;
use crate::core::errors::{Vendor, WalletError};
use hidapi::{HidApi, HidDevice};
use std::time::Duration;
use tracing::{debug, info};

/// Trezor USB 参数
pub const TREZOR_VENDOR_ID: u16 = 0x534C; // SatoshiLabs
pub const TREZOR_ONE_PRODUCT_ID: u16 = 0x0001;
pub const TREZOR_T_PRODUCT_ID: u16 = 0x0002;

/// HID 数据包大小
const HID_PACKET_SIZE: usize = 64;

/// Trezor 传输协议魔术字节
const HEADER_MAGIC: &[u8] = b"?##";
const CONTINUATION_MAGIC: u8 = b'?';

/// Trezor HID 传输
pub struct TrezorTransport {
    device: HidDevice,
    timeout: Duration,
}

impl TrezorTransport {
    /// 打开 Trezor 设备
    pub fn open(timeout: Duration) -> Result<Self, WalletError> {
        info!("正在连接 Trezor 设备...");

        let api = HidApi::new().map_err(|e| WalletError::transport(Vendor::Trezor, e.to_string()))?;

        let device = api
            .open(TREZOR_VENDOR_ID, TREZOR_ONE_PRODUCT_ID)
            .or_else(|_| api.open(TREZOR_VENDOR_ID, TREZOR_T_PRODUCT_ID))
            .map_err(|e| WalletError::transport(Vendor::Trezor, format!("Trezor device not found: {}", e)))?;

        info!("✅ 已连接到 Trezor 设备");
        Ok(Self { device, timeout })
    }

    /// 发送消息
    pub fn write(&self, message: &TrezorMessage) -> Result<(), WalletError> {
        let packets = build_packets(message);
        debug!("发送 Trezor 消息: {:?}, {} 个数据包", message.msg_type, packets.len());

        for packet in &packets {
            // hidapi 需要前置 report id 0x00
            let mut report = Vec::with_capacity(HID_PACKET_SIZE + 1);
            report.push(0x00);
            report.extend_from_slice(packet);
            self.device
                .write(&report)
                .map_err(|e| WalletError::transport(Vendor::Trezor, e.to_string()))?;
        }
        Ok(())
    }

    /// 接收消息
    pub fn read(&self) -> Result<TrezorMessage, WalletError> {
        let mut assembler = PacketAssembler::default();
        loop {
            let mut packet = [0u8; HID_PACKET_SIZE];
            let read_len = self
                .device
                .read_timeout(&mut packet, self.timeout.as_millis() as i32)
                .map_err(|e| WalletError::transport(Vendor::Trezor, e.to_string()))?;
            if read_len == 0 {
                return Err(WalletError::transport(Vendor::Trezor, "Trezor read timed out"));
            }
            if let Some(message) = assembler.push(&packet[..read_len])? {
                debug!("接收 Trezor 消息: {:?}, 长度: {}", message.msg_type, message.payload.len());
                return Ok(message);
            }
        }
    }

    /// 交换消息（发送并接收）
    pub fn exchange(&self, message: &TrezorMessage) -> Result<TrezorMessage, WalletError> {
        self.write(message)?;
        self.read()
    }
}

/// 将消息切分为 64 字节的 HID 报告（不含 report id）
pub fn build_packets(message: &TrezorMessage) -> Vec<Vec<u8>> {
    let mut stream = HEADER_MAGIC.to_vec();
    stream.extend_from_slice(&message.serialize());

    let mut packets = Vec::new();
    let first_len = stream.len().min(HID_PACKET_SIZE);
    packets.push(pad(&stream[..first_len]));

    for chunk in stream[first_len..].chunks(HID_PACKET_SIZE - 1) {
        let mut packet = vec![CONTINUATION_MAGIC];
        packet.extend_from_slice(chunk);
        packets.push(pad(&packet));
    }
    packets
}

fn pad(data: &[u8]) -> Vec<u8> {
    let mut packet = data.to_vec();
    packet.resize(HID_PACKET_SIZE, 0);
    packet
}

/// 重组多个 HID 报告为一条消息
#[derive(Default)]
pub struct PacketAssembler {
    buffer: Vec<u8>,
    expected: Option<usize>,
}

impl PacketAssembler {
    /// 追加一个报告；消息完整时返回它
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<TrezorMessage>, WalletError> {
        match self.expected {
            None => {
                if packet.len() < 9 || &packet[..3] != HEADER_MAGIC {
                    return Err(WalletError::Crypto("Invalid Trezor response header".to_string()));
                }
                let len = u32::from_be_bytes([packet[5], packet[6], packet[7], packet[8]]) as usize;
                self.expected = Some(6 + len);
                self.buffer.extend_from_slice(&packet[3..]);
            }
            Some(_) => {
                if packet.first() != Some(&CONTINUATION_MAGIC) {
                    return Err(WalletError::Crypto("Invalid Trezor continuation packet".to_string()));
                }
                self.buffer.extend_from_slice(&packet[1..]);
            }
        }

        match self.expected {
            Some(expected) if self.buffer.len() >= expected => {
                self.buffer.truncate(expected);
                TrezorMessage::deserialize(&self.buffer).map(Some)
            }
            _ => Ok(None),
        }
    }
}
