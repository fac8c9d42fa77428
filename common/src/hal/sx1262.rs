//! SX1261/62 命令型 LoRa 收发器驱动
//!
//! 每条命令发出前都要等待 BUSY 释放，模式切换后通过 GetStatus 读回确认。

use embedded_hal::blocking::delay::DelayMs;
use heapless::Vec;

use crate::hal::bus::Bus;
use crate::hal::config::{Bandwidth, RadioConfig};
use crate::hal::{RadioError, RadioInterface, TransceiverState, BUSY_RETRY_LIMIT};

const CMD_SET_SLEEP: u8 = 0x84;
const CMD_SET_STANDBY: u8 = 0x80;
const CMD_SET_TX: u8 = 0x83;
const CMD_SET_RX: u8 = 0x82;
const CMD_SET_PACKET_TYPE: u8 = 0x8A;
const CMD_SET_RF_FREQUENCY: u8 = 0x86;
const CMD_SET_PA_CONFIG: u8 = 0x95;
const CMD_SET_TX_PARAMS: u8 = 0x8E;
const CMD_SET_BUFFER_BASE: u8 = 0x8F;
const CMD_SET_MODULATION_PARAMS: u8 = 0x8B;
const CMD_SET_PACKET_PARAMS: u8 = 0x8C;
const CMD_SET_DIO_IRQ_PARAMS: u8 = 0x08;
const CMD_GET_IRQ_STATUS: u8 = 0x12;
const CMD_CLEAR_IRQ_STATUS: u8 = 0x02;
const CMD_WRITE_BUFFER: u8 = 0x0E;
const CMD_READ_BUFFER: u8 = 0x1E;
const CMD_WRITE_REGISTER: u8 = 0x0D;
const CMD_GET_RX_BUFFER_STATUS: u8 = 0x13;
const CMD_GET_PACKET_STATUS: u8 = 0x14;
const CMD_SET_DIO2_AS_RF_SWITCH: u8 = 0x9D;
const CMD_SET_DIO3_AS_TCXO: u8 = 0x97;
const CMD_CALIBRATE: u8 = 0x89;
const CMD_CALIBRATE_IMAGE: u8 = 0x98;
const CMD_GET_STATUS: u8 = 0xC0;

const NOP: u8 = 0x00;

/// 热启动睡眠，保留配置
const SLEEP_WARM_START: u8 = 0x04;
const STANDBY_RC: u8 = 0x00;
const PACKET_TYPE_LORA: u8 = 0x01;
const CALIBRATE_ALL: u8 = 0x7F;
const RX_CONTINUOUS: [u8; 3] = [0xFF, 0xFF, 0xFF];

const REG_LORA_SYNC_WORD_MSB: u16 = 0x0740;

const IRQ_TX_DONE: u16 = 1 << 0;
const IRQ_RX_DONE: u16 = 1 << 1;
const IRQ_TIMEOUT: u16 = 1 << 9;
const IRQ_ALL: u16 = 0xFFFF;

/// GetStatus 返回的芯片模式（bit 6:4）
const CHIP_MODE_STBY_RC: u8 = 0x2;
const CHIP_MODE_RX: u8 = 0x5;
/// 读回等待上限
const MODE_POLL_LIMIT: u32 = 10;

const BUFFER_SIZE: usize = 256;

const RESET_PULSE_MS: u32 = 20;
const RESET_SETTLE_MS: u32 = 50;
const CALIBRATE_MS: u32 = 10;
const WAKE_SETTLE_MS: u32 = 10;

fn bandwidth_code(bw: Bandwidth) -> u8 {
    match bw {
        Bandwidth::Khz7_8 => 0x00,
        Bandwidth::Khz10_4 => 0x08,
        Bandwidth::Khz15_6 => 0x01,
        Bandwidth::Khz20_8 => 0x09,
        Bandwidth::Khz31_25 => 0x02,
        Bandwidth::Khz41_7 => 0x0A,
        Bandwidth::Khz62_5 => 0x03,
        Bandwidth::Khz125 => 0x04,
        Bandwidth::Khz250 => 0x05,
        Bandwidth::Khz500 => 0x06,
    }
}

/// 按频段选择镜像校准参数
fn image_calibration(frequency_hz: u32) -> [u8; 2] {
    match frequency_hz / 1_000_000 {
        900.. => [0xE1, 0xE9],
        850..=899 => [0xD7, 0xDB],
        770..=849 => [0xC1, 0xC5],
        460..=769 => [0x75, 0x81],
        _ => [0x6B, 0x6F],
    }
}

/// SX127x 单字节同步字转换为 SX126x 的双字节格式
fn sync_word_registers(sync_word: u8) -> [u8; 2] {
    [(sync_word & 0xF0) | 0x04, ((sync_word & 0x0F) << 4) | 0x04]
}

/// 命令型 LoRa 收发器
pub struct Sx1262<B, D> {
    bus: B,
    delay: D,
    config: RadioConfig,
    state: TransceiverState,
    last_rssi: i16,
    rx_pending: bool,
}

impl<B, D> Sx1262<B, D>
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

    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    fn wait_busy(&mut self) -> Result<(), RadioError<B::Error>> {
        for _ in 0..BUSY_RETRY_LIMIT {
            if !self.bus.is_busy()? {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        error!("SX1262 BUSY stuck after {} polls", BUSY_RETRY_LIMIT);
        Err(RadioError::BusyTimeout)
    }

    fn command(&mut self, cmd: &[u8]) -> Result<(), RadioError<B::Error>> {
        self.wait_busy()?;
        self.bus.transact(cmd, &mut [])?;
        Ok(())
    }

    fn query(&mut self, cmd: &[u8], response: &mut [u8]) -> Result<(), RadioError<B::Error>> {
        self.wait_busy()?;
        self.bus.transact(cmd, response)?;
        Ok(())
    }

    fn chip_mode(&mut self) -> Result<u8, RadioError<B::Error>> {
        let mut status = [0u8];
        self.query(&[CMD_GET_STATUS], &mut status)?;
        Ok((status[0] >> 4) & 0x07)
    }

    /// 读回芯片模式直到与预期一致
    fn await_mode(&mut self, expected: u8) -> Result<(), RadioError<B::Error>> {
        let mut actual = 0;
        for _ in 0..MODE_POLL_LIMIT {
            actual = self.chip_mode()?;
            if actual == expected {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        error!("SX1262 mode readback {} != {}", actual, expected);
        Err(RadioError::ModeNotReached { expected, actual })
    }

    /// 睡眠中 BUSY 保持高电平，第一笔事务不能等待，片选边沿本身就是唤醒信号
    fn wakeup(&mut self) -> Result<(), RadioError<B::Error>> {
        let mut status = [0u8];
        self.bus.transact(&[CMD_GET_STATUS], &mut status)?;
        self.wait_busy()
    }

    fn standby(&mut self) -> Result<(), RadioError<B::Error>> {
        if self.state == TransceiverState::Sleep {
            self.wakeup()?;
        }
        self.command(&[CMD_SET_STANDBY, STANDBY_RC])?;
        self.await_mode(CHIP_MODE_STBY_RC)?;
        self.state = TransceiverState::Standby;
        Ok(())
    }

    fn start_rx_continuous(&mut self) -> Result<(), RadioError<B::Error>> {
        self.clear_irq(IRQ_ALL)?;
        let [t0, t1, t2] = RX_CONTINUOUS;
        self.command(&[CMD_SET_RX, t0, t1, t2])?;
        self.await_mode(CHIP_MODE_RX)?;
        self.state = TransceiverState::ReceivingContinuous;
        Ok(())
    }

    fn irq_status(&mut self) -> Result<u16, RadioError<B::Error>> {
        let mut irq = [0u8; 2];
        self.query(&[CMD_GET_IRQ_STATUS, NOP], &mut irq)?;
        Ok(u16::from_be_bytes(irq))
    }

    fn clear_irq(&mut self, mask: u16) -> Result<(), RadioError<B::Error>> {
        let [hi, lo] = mask.to_be_bytes();
        self.command(&[CMD_CLEAR_IRQ_STATUS, hi, lo])
    }

    fn write_register(&mut self, addr: u16, values: &[u8]) -> Result<(), RadioError<B::Error>> {
        let [hi, lo] = addr.to_be_bytes();
        let mut cmd: Vec<u8, 8> = Vec::new();
        cmd.extend_from_slice(&[CMD_WRITE_REGISTER, hi, lo])
            .and_then(|_| cmd.extend_from_slice(values))
            .map_err(|_| RadioError::PayloadTooLarge { len: values.len() })?;
        self.command(&cmd)
    }

    fn set_packet_params(&mut self, payload_len: u8) -> Result<(), RadioError<B::Error>> {
        let [pre_hi, pre_lo] = self.config.preamble_len.to_be_bytes();
        // 显式头，标准 IQ
        self.command(&[
            CMD_SET_PACKET_PARAMS,
            pre_hi,
            pre_lo,
            0x00,
            payload_len,
            self.config.crc_on as u8,
            0x00,
        ])
    }

    fn reset(&mut self) -> Result<(), RadioError<B::Error>> {
        self.bus.set_reset(true)?;
        self.delay.delay_ms(RESET_PULSE_MS);
        self.bus.set_reset(false)?;
        self.delay.delay_ms(RESET_SETTLE_MS);
        self.wait_busy()
    }

    fn apply_config(&mut self) -> Result<(), RadioError<B::Error>> {
        let config = self.config;

        self.command(&[CMD_SET_DIO2_AS_RF_SWITCH, 0x01])?;
        // TCXO 1.7V，启动超时约 1ms
        self.command(&[CMD_SET_DIO3_AS_TCXO, 0x02, 0x00, 0x00, 0x40])?;
        self.command(&[CMD_CALIBRATE, CALIBRATE_ALL])?;
        self.delay.delay_ms(CALIBRATE_MS);

        self.command(&[CMD_SET_PACKET_TYPE, PACKET_TYPE_LORA])?;

        let frf = (((config.frequency_hz as u64) << 25) / 32_000_000) as u32;
        let [f0, f1, f2, f3] = frf.to_be_bytes();
        self.command(&[CMD_SET_RF_FREQUENCY, f0, f1, f2, f3])?;

        let [cal0, cal1] = image_calibration(config.frequency_hz);
        self.command(&[CMD_CALIBRATE_IMAGE, cal0, cal1])?;

        // SX1262 高功率 PA
        self.command(&[CMD_SET_PA_CONFIG, 0x04, 0x07, 0x00, 0x01])?;
        let power = config.tx_power_dbm.clamp(-9, 22);
        // 斜升 200us
        self.command(&[CMD_SET_TX_PARAMS, power as u8, 0x04])?;

        self.command(&[
            CMD_SET_MODULATION_PARAMS,
            config.spreading_factor,
            bandwidth_code(config.bandwidth),
            config.coding_rate as u8,
            config.low_data_rate_optimize() as u8,
        ])?;
        self.set_packet_params(config.payload_len)?;

        self.write_register(REG_LORA_SYNC_WORD_MSB, &sync_word_registers(config.sync_word))?;
        self.command(&[CMD_SET_BUFFER_BASE, 0x00, 0x00])?;

        let [mask_hi, mask_lo] = (IRQ_TX_DONE | IRQ_RX_DONE | IRQ_TIMEOUT).to_be_bytes();
        self.command(&[
            CMD_SET_DIO_IRQ_PARAMS,
            mask_hi,
            mask_lo,
            mask_hi,
            mask_lo,
            0x00,
            0x00,
            0x00,
            0x00,
        ])?;
        self.clear_irq(IRQ_ALL)
    }
}

impl<B, D> RadioInterface for Sx1262<B, D>
where
    B: Bus,
    D: DelayMs<u32>,
{
    type Error = RadioError<B::Error>;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.reset()?;

        self.command(&[CMD_SET_STANDBY, STANDBY_RC])?;
        // 芯片不存在时 GetStatus 读回全 0 或全 1
        self.await_mode(CHIP_MODE_STBY_RC)?;
        self.state = TransceiverState::Standby;

        self.apply_config()?;
        self.rx_pending = false;

        info!(
            "SX1262 ready: {} Hz, SF{}, {} dBm",
            self.config.frequency_hz, self.config.spreading_factor, self.config.tx_power_dbm
        );
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if data.len() >= BUFFER_SIZE {
            return Err(RadioError::PayloadTooLarge { len: data.len() });
        }

        if self.state != TransceiverState::Standby {
            self.standby()?;
        }

        self.set_packet_params(data.len() as u8)?;
        self.clear_irq(IRQ_ALL)?;

        let mut cmd: Vec<u8, { BUFFER_SIZE + 1 }> = Vec::new();
        cmd.extend_from_slice(&[CMD_WRITE_BUFFER, 0x00])
            .and_then(|_| cmd.extend_from_slice(data))
            .map_err(|_| RadioError::PayloadTooLarge { len: data.len() })?;
        self.command(&cmd)?;

        // 超时 0：由软件轮询兜底
        self.command(&[CMD_SET_TX, 0x00, 0x00, 0x00])?;
        self.state = TransceiverState::Transmitting;

        let timeout = self.config.tx_timeout_ms;
        let mut waited = 0;
        loop {
            if self.irq_status()? & IRQ_TX_DONE != 0 {
                self.clear_irq(IRQ_ALL)?;
                self.standby()?;
                debug!("SX1262 TX done after {} ms", waited);
                return Ok(());
            }
            if waited >= timeout {
                break;
            }
            self.delay.delay_ms(1);
            waited += 1;
        }

        error!("SX1262 TX timeout after {} ms", timeout);
        self.standby()?;
        Err(RadioError::TxTimeout)
    }

    fn poll_received(&mut self) -> Result<bool, Self::Error> {
        if self.state != TransceiverState::ReceivingContinuous {
            return Ok(false);
        }
        if self.irq_status()? & IRQ_RX_DONE != 0 {
            self.rx_pending = true;
        }
        Ok(self.rx_pending)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.rx_pending {
            return Err(RadioError::NoPacket);
        }

        let mut status = [0u8; 2];
        self.query(&[CMD_GET_RX_BUFFER_STATUS, NOP], &mut status)?;
        let [len, offset] = status;
        let len = len as usize;

        let count = len.min(buffer.len());
        self.query(&[CMD_READ_BUFFER, offset, NOP], &mut buffer[..count])?;
        if count < len {
            warn!("SX1262 RX truncated {} of {} bytes", count, len);
        }

        let mut packet = [0u8; 3];
        self.query(&[CMD_GET_PACKET_STATUS, NOP], &mut packet)?;
        self.last_rssi = -(packet[0] as i16) / 2;

        self.rx_pending = false;
        self.start_rx_continuous()?;
        Ok(count)
    }

    fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        if self.state == TransceiverState::Sleep {
            return Ok(());
        }
        self.command(&[CMD_SET_SLEEP, SLEEP_WARM_START])?;
        self.state = TransceiverState::Sleep;
        self.rx_pending = false;
        debug!("SX1262 sleeping");
        Ok(())
    }

    fn wake(&mut self) -> Result<(), Self::Error> {
        let was_sleeping = self.state == TransceiverState::Sleep;
        self.standby()?;
        if was_sleeping {
            self.delay.delay_ms(WAKE_SETTLE_MS);
        }
        self.start_rx_continuous()?;
        debug!("SX1262 listening");
        Ok(())
    }

    fn state(&self) -> TransceiverState {
        self.state
    }
}
