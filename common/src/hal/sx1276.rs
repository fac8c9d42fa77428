//! SX1276/77/78/79 寄存器型 LoRa 收发器驱动

use embedded_hal::blocking::delay::DelayMs;

use crate::hal::bus::Bus;
use crate::hal::config::{Bandwidth, RadioConfig};
use crate::hal::{RadioError, RadioInterface, TransceiverState};

const REG_FIFO: u8 = 0x00;
const REG_OP_MODE: u8 = 0x01;
const REG_FRF_MSB: u8 = 0x06;
const REG_FRF_MID: u8 = 0x07;
const REG_FRF_LSB: u8 = 0x08;
const REG_PA_CONFIG: u8 = 0x09;
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_RX_NB_BYTES: u8 = 0x13;
const REG_PKT_RSSI_VALUE: u8 = 0x1A;
const REG_MODEM_CONFIG_1: u8 = 0x1D;
const REG_MODEM_CONFIG_2: u8 = 0x1E;
const REG_PREAMBLE_MSB: u8 = 0x20;
const REG_PREAMBLE_LSB: u8 = 0x21;
const REG_PAYLOAD_LENGTH: u8 = 0x22;
const REG_MODEM_CONFIG_3: u8 = 0x26;
const REG_SYNC_WORD: u8 = 0x39;
const REG_VERSION: u8 = 0x42;
const REG_PA_DAC: u8 = 0x4D;

const MODE_LONG_RANGE: u8 = 0x80;
const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_RX_CONTINUOUS: u8 = 0x05;

const IRQ_TX_DONE: u8 = 0x08;
const IRQ_RX_DONE: u8 = 0x40;
const IRQ_ALL: u8 = 0xFF;

const PA_BOOST: u8 = 0x80;
const PA_DAC_DEFAULT: u8 = 0x84;
const PA_DAC_HIGH_POWER: u8 = 0x87;

const CHIP_VERSION: u8 = 0x12;
const FIFO_SIZE: usize = 256;
const RSSI_OFFSET_HF: i16 = -157;

const RESET_PULSE_MS: u32 = 10;
const RESET_SETTLE_MS: u32 = 10;

fn bandwidth_bits(bw: Bandwidth) -> u8 {
    match bw {
        Bandwidth::Khz7_8 => 0,
        Bandwidth::Khz10_4 => 1,
        Bandwidth::Khz15_6 => 2,
        Bandwidth::Khz20_8 => 3,
        Bandwidth::Khz31_25 => 4,
        Bandwidth::Khz41_7 => 5,
        Bandwidth::Khz62_5 => 6,
        Bandwidth::Khz125 => 7,
        Bandwidth::Khz250 => 8,
        Bandwidth::Khz500 => 9,
    }
}

/// PA_BOOST 输出下的 (RegPaConfig, RegPaDac)
fn pa_settings(power_dbm: i8) -> (u8, u8) {
    let power = power_dbm.clamp(2, 20) as u8;
    if power > 17 {
        (PA_BOOST | 0x70 | (power - 5), PA_DAC_HIGH_POWER)
    } else {
        (PA_BOOST | 0x70 | (power - 2), PA_DAC_DEFAULT)
    }
}

/// 寄存器映射的 LoRa 收发器
pub struct Sx1276<B, D> {
    bus: B,
    delay: D,
    config: RadioConfig,
    state: TransceiverState,
    last_rssi: i16,
    rx_pending: bool,
}

impl<B, D> Sx1276<B, D>
where
    B: Bus,
    D: DelayMs<u32>,
{
    pub fn new(bus: B, delay: D, config: RadioConfig) -> Self {
        Self {
            bus,
            delay,
            config,
            state: TransceiverState::Sleep,
            last_rssi: 0,
            rx_pending: false,
        }
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// 取回总线与延时器
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, RadioError<B::Error>> {
        let mut value = [0u8];
        self.bus.transact(&[reg & 0x7F], &mut value)?;
        Ok(value[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), RadioError<B::Error>> {
        self.bus.transact(&[reg | 0x80, value], &mut [])?;
        Ok(())
    }

    fn set_mode(&mut self, mode: u8) -> Result<(), RadioError<B::Error>> {
        self.write_reg(REG_OP_MODE, MODE_LONG_RANGE | mode)?;
        self.state = match mode {
            MODE_SLEEP => TransceiverState::Sleep,
            MODE_TX => TransceiverState::Transmitting,
            MODE_RX_CONTINUOUS => TransceiverState::ReceivingContinuous,
            _ => TransceiverState::Standby,
        };
        Ok(())
    }

    fn reset(&mut self) -> Result<(), RadioError<B::Error>> {
        self.bus.set_reset(true)?;
        self.delay.delay_ms(RESET_PULSE_MS);
        self.bus.set_reset(false)?;
        self.delay.delay_ms(RESET_SETTLE_MS);
        Ok(())
    }

    fn set_frequency(&mut self, frequency_hz: u32) -> Result<(), RadioError<B::Error>> {
        let frf = ((frequency_hz as u64) << 19) / 32_000_000;
        self.write_reg(REG_FRF_MSB, (frf >> 16) as u8)?;
        self.write_reg(REG_FRF_MID, (frf >> 8) as u8)?;
        self.write_reg(REG_FRF_LSB, frf as u8)?;
        Ok(())
    }

    fn apply_config(&mut self) -> Result<(), RadioError<B::Error>> {
        let config = self.config;

        self.set_frequency(config.frequency_hz)?;

        let (pa_config, pa_dac) = pa_settings(config.tx_power_dbm);
        self.write_reg(REG_PA_CONFIG, pa_config)?;
        self.write_reg(REG_PA_DAC, pa_dac)?;

        // 显式头模式
        let modem1 = (bandwidth_bits(config.bandwidth) << 4) | ((config.coding_rate as u8) << 1);
        let modem2 = (config.spreading_factor << 4) | ((config.crc_on as u8) << 2);
        // 自动增益
        let modem3 = ((config.low_data_rate_optimize() as u8) << 3) | 0x04;
        self.write_reg(REG_MODEM_CONFIG_1, modem1)?;
        self.write_reg(REG_MODEM_CONFIG_2, modem2)?;
        self.write_reg(REG_MODEM_CONFIG_3, modem3)?;

        self.write_reg(REG_PREAMBLE_MSB, (config.preamble_len >> 8) as u8)?;
        self.write_reg(REG_PREAMBLE_LSB, config.preamble_len as u8)?;
        self.write_reg(REG_PAYLOAD_LENGTH, config.payload_len)?;
        self.write_reg(REG_SYNC_WORD, config.sync_word)?;

        self.write_reg(REG_FIFO_TX_BASE_ADDR, 0)?;
        self.write_reg(REG_FIFO_RX_BASE_ADDR, 0)?;
        Ok(())
    }

    fn start_rx_continuous(&mut self) -> Result<(), RadioError<B::Error>> {
        self.write_reg(REG_IRQ_FLAGS, IRQ_ALL)?;
        self.write_reg(REG_FIFO_ADDR_PTR, 0)?;
        self.set_mode(MODE_RX_CONTINUOUS)
    }
}

impl<B, D> RadioInterface for Sx1276<B, D>
where
    B: Bus,
    D: DelayMs<u32>,
{
    type Error = RadioError<B::Error>;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.reset()?;

        let version = self.read_reg(REG_VERSION)?;
        if version != CHIP_VERSION {
            error!("SX1276 not detected, version register {}", version);
            return Err(RadioError::UnknownChip { version });
        }

        // LoRa 模式只能在睡眠下切换
        self.set_mode(MODE_SLEEP)?;
        self.delay.delay_ms(10);
        self.set_mode(MODE_STDBY)?;

        self.apply_config()?;
        self.write_reg(REG_IRQ_FLAGS, IRQ_ALL)?;
        self.rx_pending = false;

        info!(
            "SX1276 ready: {} Hz, SF{}, {} dBm",
            self.config.frequency_hz, self.config.spreading_factor, self.config.tx_power_dbm
        );
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if data.len() >= FIFO_SIZE {
            return Err(RadioError::PayloadTooLarge { len: data.len() });
        }

        if self.state != TransceiverState::Standby {
            self.set_mode(MODE_STDBY)?;
        }

        self.write_reg(REG_FIFO_ADDR_PTR, 0)?;
        for byte in data {
            self.write_reg(REG_FIFO, *byte)?;
        }
        self.write_reg(REG_PAYLOAD_LENGTH, data.len() as u8)?;
        self.write_reg(REG_IRQ_FLAGS, IRQ_ALL)?;
        self.set_mode(MODE_TX)?;

        let timeout = self.config.tx_timeout_ms;
        let mut waited = 0;
        loop {
            if self.read_reg(REG_IRQ_FLAGS)? & IRQ_TX_DONE != 0 {
                self.write_reg(REG_IRQ_FLAGS, IRQ_ALL)?;
                self.set_mode(MODE_STDBY)?;
                debug!("SX1276 TX done after {} ms", waited);
                return Ok(());
            }
            if waited >= timeout {
                break;
            }
            self.delay.delay_ms(1);
            waited += 1;
        }

        error!("SX1276 TX timeout after {} ms", timeout);
        self.set_mode(MODE_STDBY)?;
        Err(RadioError::TxTimeout)
    }

    fn poll_received(&mut self) -> Result<bool, Self::Error> {
        if self.state != TransceiverState::ReceivingContinuous {
            return Ok(false);
        }
        if self.read_reg(REG_IRQ_FLAGS)? & IRQ_RX_DONE != 0 {
            self.rx_pending = true;
        }
        Ok(self.rx_pending)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.rx_pending {
            return Err(RadioError::NoPacket);
        }

        self.set_mode(MODE_STDBY)?;

        let len = self.read_reg(REG_RX_NB_BYTES)? as usize;
        let offset = self.read_reg(REG_FIFO_RX_CURRENT_ADDR)?;
        self.write_reg(REG_FIFO_ADDR_PTR, offset)?;

        let count = len.min(buffer.len());
        for slot in buffer[..count].iter_mut() {
            *slot = self.read_reg(REG_FIFO)?;
        }
        if count < len {
            warn!("SX1276 RX truncated {} of {} bytes", count, len);
        }

        let raw_rssi = self.read_reg(REG_PKT_RSSI_VALUE)?;
        self.last_rssi = RSSI_OFFSET_HF + raw_rssi as i16;

        self.rx_pending = false;
        self.start_rx_continuous()?;
        Ok(count)
    }

    fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.set_mode(MODE_SLEEP)?;
        self.rx_pending = false;
        debug!("SX1276 sleeping");
        Ok(())
    }

    fn wake(&mut self) -> Result<(), Self::Error> {
        if self.state == TransceiverState::Sleep {
            self.set_mode(MODE_STDBY)?;
        }
        self.start_rx_continuous()?;
        debug!("SX1276 listening");
        Ok(())
    }

    fn state(&self) -> TransceiverState {
        self.state
    }
}
