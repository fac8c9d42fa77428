pub mod bus;
pub mod config;
pub mod sx1262;
pub mod sx1276;
#[cfg(feature = "simulator")]
pub mod simulator;
#[cfg(test)]
pub(crate) mod emulator;

use core::fmt;

use crate::protocol::NodeId;

pub use bus::{Bus, NoBusy, SpiBus, SpiBusError};
pub use config::{Bandwidth, CodingRate, RadioConfig};
pub use sx1262::Sx1262;
pub use sx1276::Sx1276;

/// 发送完成等待上限（毫秒），按1毫秒粒度轮询
pub const TX_TIMEOUT_MS: u32 = 5000;
/// 命令型收发器 BUSY 引脚最多轮询次数，每次间隔1毫秒
pub const BUSY_RETRY_LIMIT: u32 = 1000;

/// 收发器工作模式，每个驱动实例独占一份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverState {
    Sleep,
    Standby,
    Transmitting,
    ReceivingContinuous,
}

/// 收发器驱动错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError<E> {
    /// 底层总线错误
    Bus(E),
    /// BUSY 信号在重试上限内一直未释放
    BusyTimeout,
    /// 模式切换后读回的芯片模式不符
    ModeNotReached { expected: u8, actual: u8 },
    /// 发送完成标志在超时时间内未出现
    TxTimeout,
    /// 上电检测到的芯片版本不对
    UnknownChip { version: u8 },
    /// 未检测到待读取的数据包
    NoPacket,
    /// 负载超过芯片缓冲区
    PayloadTooLarge { len: usize },
}

impl<E> From<E> for RadioError<E> {
    fn from(err: E) -> Self {
        RadioError::Bus(err)
    }
}

impl<E: fmt::Debug> fmt::Display for RadioError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::Bus(err) => write!(f, "Bus error: {:?}", err),
            RadioError::BusyTimeout => write!(f, "Busy line never released"),
            RadioError::ModeNotReached { expected, actual } => write!(
                f,
                "Chip mode readback mismatch: expected {:#04x}, got {:#04x}",
                expected, actual
            ),
            RadioError::TxTimeout => write!(f, "Transmit timeout"),
            RadioError::UnknownChip { version } => {
                write!(f, "Radio not detected (version {:#04x})", version)
            }
            RadioError::NoPacket => write!(f, "No packet pending"),
            RadioError::PayloadTooLarge { len } => write!(f, "Payload too large: {} bytes", len),
        }
    }
}

/// 无线电接口抽象
///
/// 两种芯片变体共享同一个模式状态机，对外行为完全一致。
/// 驱动不可重入，只能由一个任务持有。
pub trait RadioInterface {
    type Error: fmt::Debug;

    /// 上电复位并写入全部射频参数，结束时处于 Standby
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// 阻塞发送，直到完成标志或超时；超时后强制回到 Standby，不自动重试
    fn transmit(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// 连续接收模式下查询是否收到完整的帧
    fn poll_received(&mut self) -> Result<bool, Self::Error>;

    /// 读出收到的帧（截断到缓冲区长度），清除标志并重新进入连续接收
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// 最近一个数据包的信号强度（dBm）
    fn last_rssi(&self) -> i16;

    /// 进入睡眠
    fn sleep(&mut self) -> Result<(), Self::Error>;

    /// 唤醒并进入连续接收
    fn wake(&mut self) -> Result<(), Self::Error>;

    /// 当前模式
    fn state(&self) -> TransceiverState;
}

/// 浅睡眠唤醒原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// 外部触发（红外）
    External,
    /// 定时器兜底
    Timer,
}

/// 硬件抽象层接口
pub trait Hardware {
    type Error: fmt::Debug;

    /// 获取本节点ID
    fn get_node_id(&self) -> NodeId;

    /// 获取电池电量百分比（0-100）
    fn get_battery_level(&mut self) -> Result<u8, Self::Error>;

    /// 获取上电以来的毫秒数，2^32 回绕
    fn get_timestamp_ms(&self) -> u32;

    /// 延时指定毫秒数
    fn delay_ms(&mut self, ms: u32);

    /// 浅睡眠，保留内存；外部触发或定时器到期后返回
    fn light_sleep(&mut self, max_ms: u32) -> WakeCause;

    /// 深睡眠，内存丢失，唤醒等同重启，不返回调用者
    fn deep_sleep(&mut self, max_ms: u32) -> !;
}
