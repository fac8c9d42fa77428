use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::hal::{Hardware, RadioConfig, RadioInterface, TransceiverState, WakeCause};
use crate::protocol::NodeId;

/// 模拟器错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatorError {
    /// 共享信道锁中毒
    ChannelPoisoned,
    NoPacket,
    PayloadTooLarge,
    /// 模拟的发送失败
    TxTimeout,
    /// 模拟的 ADC 读取失败
    BatteryReadFailed,
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::ChannelPoisoned => write!(f, "Shared channel poisoned"),
            SimulatorError::NoPacket => write!(f, "No packet pending"),
            SimulatorError::PayloadTooLarge => write!(f, "Payload too large"),
            SimulatorError::TxTimeout => write!(f, "Simulated transmit timeout"),
            SimulatorError::BatteryReadFailed => write!(f, "Battery read failed"),
        }
    }
}

impl std::error::Error for SimulatorError {}

const MAX_FRAME: usize = 255;

/// 空中的一帧
#[derive(Debug, Clone)]
struct AirFrame {
    source: NodeId,
    config: RadioConfig,
    data: Vec<u8>,
    rssi: i16,
}

#[derive(Default)]
struct ChannelState {
    frames: VecDeque<AirFrame>,
    /// 接下来若干帧在空中被翻转一位
    corrupt_next: u32,
    /// 静默丢弃接下来若干帧
    drop_next: u32,
}

/// 共享通信通道，用于在多个模拟节点之间传递帧
#[derive(Clone, Default)]
pub struct SimChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl SimChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入误码：后续 `count` 帧的第一个字节翻转最低位
    pub fn corrupt_next(&self, count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.corrupt_next += count;
        }
    }

    /// 模拟信号丢失
    pub fn drop_next(&self, count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.drop_next += count;
        }
    }

    /// 尚在空中的帧数
    pub fn pending(&self) -> usize {
        self.state.lock().map(|state| state.frames.len()).unwrap_or(0)
    }

    fn push(&self, mut frame: AirFrame) -> Result<(), SimulatorError> {
        let mut state = self.state.lock().map_err(|_| SimulatorError::ChannelPoisoned)?;
        if state.drop_next > 0 {
            state.drop_next -= 1;
            return Ok(());
        }
        if state.corrupt_next > 0 {
            state.corrupt_next -= 1;
            if let Some(byte) = frame.data.first_mut() {
                *byte ^= 0x01;
            }
        }
        state.frames.push_back(frame);
        Ok(())
    }

    /// 取出第一帧非自己发送的帧；参数不一致的帧直接丢弃
    fn take_for(&self, listener: NodeId, config: &RadioConfig) -> Result<Option<AirFrame>, SimulatorError> {
        let mut state = self.state.lock().map_err(|_| SimulatorError::ChannelPoisoned)?;
        let position = state.frames.iter().position(|frame| frame.source != listener);
        let Some(index) = position else {
            return Ok(None);
        };
        let frame = state.frames.remove(index);
        Ok(frame.filter(|frame| frame.config == *config))
    }
}

/// 模拟无线电接口，模式状态机与真实驱动一致
pub struct SimRadio {
    channel: SimChannel,
    node_id: NodeId,
    config: RadioConfig,
    state: TransceiverState,
    rssi: i16,
    last_rssi: i16,
    pending: Option<AirFrame>,
    fail_next_tx: Arc<AtomicBool>,
}

impl SimRadio {
    pub fn new(channel: SimChannel, node_id: NodeId, config: RadioConfig) -> Self {
        Self {
            channel,
            node_id,
            config,
            state: TransceiverState::Sleep,
            rssi: -70,
            last_rssi: 0,
            pending: None,
            fail_next_tx: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 本节点发出的帧在接收端呈现的信号强度
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// 让下一次发送超时失败，返回可跨线程设置的句柄
    pub fn tx_fault(&self) -> Arc<AtomicBool> {
        self.fail_next_tx.clone()
    }
}

impl RadioInterface for SimRadio {
    type Error = SimulatorError;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        self.state = TransceiverState::Standby;
        self.pending = None;
        info!("SimRadio {} ready on {} Hz", self.node_id.0, self.config.frequency_hz);
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if data.len() > MAX_FRAME {
            return Err(SimulatorError::PayloadTooLarge);
        }
        self.state = TransceiverState::Transmitting;

        let result = if self.fail_next_tx.swap(false, Ordering::SeqCst) {
            Err(SimulatorError::TxTimeout)
        } else {
            self.channel.push(AirFrame {
                source: self.node_id,
                config: self.config,
                data: data.to_vec(),
                rssi: self.rssi,
            })
        };

        self.state = TransceiverState::Standby;
        result
    }

    fn poll_received(&mut self) -> Result<bool, Self::Error> {
        if self.state != TransceiverState::ReceivingContinuous {
            return Ok(false);
        }
        if self.pending.is_none() {
            self.pending = self.channel.take_for(self.node_id, &self.config)?;
        }
        Ok(self.pending.is_some())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let frame = self.pending.take().ok_or(SimulatorError::NoPacket)?;
        let count = frame.data.len().min(buffer.len());
        buffer[..count].copy_from_slice(&frame.data[..count]);
        self.last_rssi = frame.rssi;
        self.state = TransceiverState::ReceivingContinuous;
        Ok(count)
    }

    fn last_rssi(&self) -> i16 {
        self.last_rssi
    }

    fn sleep(&mut self) -> Result<(), Self::Error> {
        self.state = TransceiverState::Sleep;
        self.pending = None;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), Self::Error> {
        self.state = TransceiverState::ReceivingContinuous;
        Ok(())
    }

    fn state(&self) -> TransceiverState {
        self.state
    }
}

/// 外部唤醒信号（模拟红外中断线）
#[derive(Clone, Default)]
pub struct WakeLine {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl WakeLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, condvar) = &*self.inner;
        if let Ok(mut raised) = flag.lock() {
            *raised = true;
            condvar.notify_all();
        }
    }

    /// 等待触发或超时，返回是否被触发
    fn wait(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let Ok(guard) = flag.lock() else {
            return false;
        };
        match condvar.wait_timeout_while(guard, timeout, |raised| !*raised) {
            Ok((mut raised, _)) => {
                let triggered = *raised;
                *raised = false;
                triggered
            }
            Err(_) => false,
        }
    }
}

/// 电池电量读数；0 表示外部供电，`u8::MAX` 模拟读数失败
#[derive(Clone)]
pub struct BatteryGauge {
    level: Arc<AtomicU8>,
}

impl BatteryGauge {
    pub const READ_FAILURE: u8 = u8::MAX;

    pub fn new(level: u8) -> Self {
        Self {
            level: Arc::new(AtomicU8::new(level)),
        }
    }

    pub fn set(&self, level: u8) {
        self.level.store(level, Ordering::SeqCst);
    }

    pub fn get(&self) -> u8 {
        self.level.load(Ordering::SeqCst)
    }
}

/// 模拟器硬件实现；克隆共享同一时钟起点、电池和唤醒线
#[derive(Clone)]
pub struct SimHardware {
    node_id: NodeId,
    start_time: Instant,
    battery: BatteryGauge,
    wake_line: WakeLine,
}

impl SimHardware {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            start_time: Instant::now(),
            battery: BatteryGauge::new(100),
            wake_line: WakeLine::new(),
        }
    }

    pub fn battery(&self) -> BatteryGauge {
        self.battery.clone()
    }

    pub fn wake_line(&self) -> WakeLine {
        self.wake_line.clone()
    }
}

impl Hardware for SimHardware {
    type Error = SimulatorError;

    fn get_node_id(&self) -> NodeId {
        self.node_id
    }

    fn get_battery_level(&mut self) -> Result<u8, Self::Error> {
        match self.battery.get() {
            BatteryGauge::READ_FAILURE => Err(SimulatorError::BatteryReadFailed),
            level => Ok(level.min(100)),
        }
    }

    fn get_timestamp_ms(&self) -> u32 {
        // 与嵌入式计数器一样按 2^32 回绕
        self.start_time.elapsed().as_millis() as u32
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }

    fn light_sleep(&mut self, max_ms: u32) -> WakeCause {
        debug!("Node {} light sleep up to {} ms", self.node_id.0, max_ms);
        if self.wake_line.wait(Duration::from_millis(max_ms as u64)) {
            WakeCause::External
        } else {
            WakeCause::Timer
        }
    }

    fn deep_sleep(&mut self, max_ms: u32) -> ! {
        // 深睡眠唤醒等同重启，模拟器直接结束进程
        warn!("Node {} deep sleep for {} ms, exiting", self.node_id.0, max_ms);
        std::process::exit(0)
    }
}
