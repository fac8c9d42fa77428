use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::protocol::{EventType, NodeId, FRAME_SIZE, PAYLOAD_SIZE};
use crate::utils::crc16;

/// 线上帧布局，多字节字段均为大端
///
/// | node_id | timestamp (4B) | event_type | battery | crc16 (2B) |
#[derive(AsBytes, FromBytes, Unaligned)]
#[repr(C)]
struct WireFrame {
    node_id: u8,
    timestamp: U32<BigEndian>,
    event_type: u8,
    battery_level: u8,
    crc: U16<BigEndian>,
}

impl WireFrame {
    fn payload(&self) -> &[u8] {
        &self.as_bytes()[..PAYLOAD_SIZE]
    }
}

/// 传感器事件数据包（9字节）
///
/// 构建后不可修改，接收端必须显式调用 [`Packet::validate`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    node_id: NodeId,
    timestamp: u32,
    event_type: EventType,
    battery_level: u8,
    crc: u16,
}

impl Packet {
    /// 由原始字段构建数据包并计算CRC
    ///
    /// `Other` 携带已知编码时归一为对应的具名事件，与解码结果保持一致。
    pub fn build(node_id: NodeId, timestamp: u32, event_type: EventType, battery_level: u8) -> Self {
        let mut packet = Self {
            node_id,
            timestamp,
            event_type: EventType::from_code(event_type.code()),
            battery_level,
            crc: 0,
        };
        packet.crc = crc16(packet.to_wire().payload());
        packet
    }

    fn to_wire(&self) -> WireFrame {
        WireFrame {
            node_id: self.node_id.0,
            timestamp: U32::new(self.timestamp),
            event_type: self.event_type.code(),
            battery_level: self.battery_level,
            crc: U16::new(self.crc),
        }
    }

    /// 序列化为无线帧
    pub fn serialize(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame.copy_from_slice(self.to_wire().as_bytes());
        frame
    }

    /// 从无线帧还原，不做CRC校验
    pub fn deserialize(frame: &[u8; FRAME_SIZE]) -> Self {
        let mut wire = WireFrame::new_zeroed();
        wire.as_bytes_mut().copy_from_slice(frame);

        Self {
            node_id: NodeId(wire.node_id),
            timestamp: wire.timestamp.get(),
            event_type: EventType::from_code(wire.event_type),
            battery_level: wire.battery_level,
            crc: wire.crc.get(),
        }
    }

    /// 长度不是整帧时返回 `None`
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let frame: [u8; FRAME_SIZE] = bytes.try_into().ok()?;
        Some(Self::deserialize(&frame))
    }

    /// 重新计算负载CRC并与携带的CRC比较
    pub fn validate(&self) -> bool {
        crc16(self.to_wire().payload()) == self.crc
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }
}
