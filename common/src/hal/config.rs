use crate::hal::TX_TIMEOUT_MS;
use crate::protocol::FRAME_SIZE;

/// LoRa 信道带宽
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Khz7_8,
    Khz10_4,
    Khz15_6,
    Khz20_8,
    Khz31_25,
    Khz41_7,
    Khz62_5,
    Khz125,
    Khz250,
    Khz500,
}

impl Bandwidth {
    /// 以赫兹表示的带宽
    pub const fn hz(self) -> u32 {
        match self {
            Bandwidth::Khz7_8 => 7_800,
            Bandwidth::Khz10_4 => 10_400,
            Bandwidth::Khz15_6 => 15_600,
            Bandwidth::Khz20_8 => 20_800,
            Bandwidth::Khz31_25 => 31_250,
            Bandwidth::Khz41_7 => 41_700,
            Bandwidth::Khz62_5 => 62_500,
            Bandwidth::Khz125 => 125_000,
            Bandwidth::Khz250 => 250_000,
            Bandwidth::Khz500 => 500_000,
        }
    }
}

/// 前向纠错编码率
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Cr4_5 = 1,
    Cr4_6 = 2,
    Cr4_7 = 3,
    Cr4_8 = 4,
}

/// 射频参数，链路两端必须一致，否则所有数据都会被静默丢弃
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// 载波频率（Hz）
    pub frequency_hz: u32,
    pub bandwidth: Bandwidth,
    /// 扩频因子 6-12
    pub spreading_factor: u8,
    pub coding_rate: CodingRate,
    /// 私有网络同步字（SX127x 格式）
    pub sync_word: u8,
    /// 发射功率（dBm）
    pub tx_power_dbm: i8,
    pub preamble_len: u16,
    /// 固定负载长度
    pub payload_len: u8,
    /// 芯片级 CRC
    pub crc_on: bool,
    /// 发送完成等待上限（毫秒）
    pub tx_timeout_ms: u32,
}

impl RadioConfig {
    pub const DEFAULT: Self = Self {
        frequency_hz: 915_000_000,
        bandwidth: Bandwidth::Khz125,
        spreading_factor: 7,
        coding_rate: CodingRate::Cr4_5,
        sync_word: 0x12,
        tx_power_dbm: 20,
        preamble_len: 8,
        payload_len: FRAME_SIZE as u8,
        crc_on: true,
        tx_timeout_ms: TX_TIMEOUT_MS,
    };

    /// 符号时长超过16ms时需要打开低速率优化
    pub fn low_data_rate_optimize(&self) -> bool {
        let symbol_us = (1u64 << self.spreading_factor) * 1_000_000 / self.bandwidth.hz() as u64;
        symbol_us > 16_000
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
