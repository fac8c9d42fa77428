pub mod packet;

pub use packet::Packet;

// 协议常量和公共类型定义

/// 完整无线帧长度（负载 + CRC）
pub const FRAME_SIZE: usize = 9;
/// 参与CRC计算的负载长度
pub const PAYLOAD_SIZE: usize = 7;

/// 事件类型
///
/// 线上只是一个字节，未知取值保留在 `Other` 中原样转发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// 人体红外触发
    Motion,
    /// 周期心跳
    Heartbeat,
    /// 电池电量低
    LowBattery,
    /// 其他扩展事件
    Other(u8),
}

impl EventType {
    pub const MOTION: u8 = 0x01;
    pub const HEARTBEAT: u8 = 0x02;
    pub const LOW_BATTERY: u8 = 0x03;

    pub const fn from_code(code: u8) -> Self {
        match code {
            Self::MOTION => Self::Motion,
            Self::HEARTBEAT => Self::Heartbeat,
            Self::LOW_BATTERY => Self::LowBattery,
            other => Self::Other(other),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Motion => Self::MOTION,
            Self::Heartbeat => Self::HEARTBEAT,
            Self::LowBattery => Self::LOW_BATTERY,
            Self::Other(code) => code,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Heartbeat => "heartbeat",
            Self::LowBattery => "low_battery",
            Self::Other(_) => "other",
        }
    }
}

impl From<u8> for EventType {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl From<EventType> for u8 {
    fn from(event: EventType) -> Self {
        event.code()
    }
}

/// 节点ID，一个字节，发送端静态配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u8);

impl NodeId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }
}
