//! 调度与流水线测试用的脚本化硬件、收发器和显示

use std::cell::Cell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::hal::{Hardware, RadioInterface, TransceiverState, WakeCause};
use crate::protocol::{NodeId, Packet};
use crate::pipeline::StatusSink;

/// 时钟只在延时和睡眠时前进
pub struct ScriptedHardware {
    pub node_id: NodeId,
    pub now: Cell<u32>,
    /// `None` 表示读数失败
    pub battery: Option<u8>,
    /// 依次消费的电量读数，耗尽后使用 `battery`
    pub battery_script: VecDeque<Option<u8>>,
    pub battery_reads: u32,
    pub light_sleeps: Vec<u32>,
    /// 浅睡眠实际经过的时长，`None` 表示睡满
    pub light_sleep_wakes_after: Option<u32>,
}

impl ScriptedHardware {
    pub fn new(battery: u8) -> Self {
        Self {
            node_id: NodeId(0x01),
            now: Cell::new(0),
            battery: Some(battery),
            battery_script: VecDeque::new(),
            battery_reads: 0,
            light_sleeps: Vec::new(),
            light_sleep_wakes_after: None,
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn set_now(&self, ms: u32) {
        self.now.set(ms);
    }
}

impl Hardware for ScriptedHardware {
    type Error = ();

    fn get_node_id(&self) -> NodeId {
        self.node_id
    }

    fn get_battery_level(&mut self) -> Result<u8, Self::Error> {
        self.battery_reads += 1;
        let reading = self.battery_script.pop_front().unwrap_or(self.battery);
        reading.ok_or(())
    }

    fn get_timestamp_ms(&self) -> u32 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }

    fn light_sleep(&mut self, max_ms: u32) -> WakeCause {
        self.light_sleeps.push(max_ms);
        match self.light_sleep_wakes_after {
            Some(ms) if ms < max_ms => {
                self.advance(ms);
                WakeCause::External
            }
            _ => {
                self.advance(max_ms);
                WakeCause::Timer
            }
        }
    }

    fn deep_sleep(&mut self, max_ms: u32) -> ! {
        panic!("deep sleep requested for {} ms", max_ms)
    }
}

/// 记录调用的收发器
pub struct RecordingRadio {
    pub state: TransceiverState,
    pub sent: Vec<Vec<u8>>,
    pub inbound: VecDeque<(Vec<u8>, i16)>,
    pub fail_transmits: u32,
    pub sleeps: u32,
    pub wakes: u32,
    last_rssi: i16,
    pending: Option<(Vec<u8>, i16)>,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self {
            state: TransceiverState::Standby,
            sent: Vec::new(),
            inbound: VecDeque::new(),
            fail_transmits: 0,
            sleeps: 0,
            wakes: 0,
            last_rssi: 0,
            pending: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    TxTimeout,
    NoPacket,
}

impl RadioInterface for RecordingRadio {
    type Error = RecordingError;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.state = TransceiverState::Standby;
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.state = TransceiverState::Standby;
        if self.fail_transmits > 0 {
            self.fail_transmits -= 1;
            return Err(RecordingError::TxTimeout);
        }
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn poll_received(&mut self) -> Result<bool, Self::Error> {
        if self.pending.is_none() && self.state == TransceiverState::ReceivingContinuous {
            self.pending = self.inbound.pop_front();
        }
        Ok(self.pending.is_some())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let (data, rssi) = self.pending.take().ok_or(RecordingError::NoPacket)?;
        let count = data.len().min(buffer.len());
        buffer[..count].copy_from_slice(&data[..count]);
        self.last_rssi = rssi;
        Ok(count)
    }

    fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.sleeps += 1;
        self.state = TransceiverState::Sleep;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), Self::Error> {
        self.wakes += 1;
        self.state = TransceiverState::ReceivingContinuous;
        Ok(())
    }

    fn state(&self) -> TransceiverState {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Boot(NodeId),
    Tx(Packet, u32),
    Idle(u8),
    Sleep,
    Rx(Packet, u32, i16),
    CrcError(u32),
    Listening,
}

#[derive(Default)]
pub struct RecordingSink {
    pub screens: Vec<Screen>,
}

impl StatusSink for RecordingSink {
    fn show_boot(&mut self, node_id: NodeId) {
        self.screens.push(Screen::Boot(node_id));
    }

    fn show_tx(&mut self, packet: &Packet, tx_count: u32) {
        self.screens.push(Screen::Tx(*packet, tx_count));
    }

    fn show_idle(&mut self, battery: u8) {
        self.screens.push(Screen::Idle(battery));
    }

    fn show_sleep(&mut self) {
        self.screens.push(Screen::Sleep);
    }

    fn show_rx(&mut self, packet: &Packet, rx_count: u32, rssi: i16) {
        self.screens.push(Screen::Rx(*packet, rx_count, rssi));
    }

    fn show_crc_error(&mut self, error_count: u32) {
        self.screens.push(Screen::CrcError(error_count));
    }

    fn show_listening(&mut self) {
        self.screens.push(Screen::Listening);
    }
}
