//! 事件流水线：中断 → 事件队列 → 组包 → 发送队列 → 收发器，以及接收方向

pub mod queue;
pub mod receive;
pub mod sink;
pub mod transmit;

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::spsc::Queue;

use crate::protocol::{EventType, Packet};

pub use queue::{Inbox, Outbox};
pub use receive::{display_step, ReceivedPacket, RxOutcome, RxTask};
pub use sink::{LogSink, StatusSink};
pub use transmit::{Debouncer, EventSource, MotionInput, TxOutcome, TxTask};

pub const EVENT_QUEUE_DEPTH: usize = 10;
pub const TX_QUEUE_DEPTH: usize = 5;
pub const RX_QUEUE_DEPTH: usize = 10;

// spsc 队列实际容量为 N - 1
pub type EventQueue = Queue<EventType, { EVENT_QUEUE_DEPTH + 1 }>;
pub type TxQueue = Queue<Packet, { TX_QUEUE_DEPTH + 1 }>;
pub type RxQueue = Queue<ReceivedPacket, { RX_QUEUE_DEPTH + 1 }>;

/// 流水线时间参数（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 两次有效触发的最小间隔
    pub debounce_ms: u32,
    /// 事件任务等待事件
    pub event_wait_ms: u32,
    /// 组好的包放入发送队列的等待上限
    pub enqueue_wait_ms: u32,
    /// 发送任务等待数据包
    pub tx_wait_ms: u32,
    /// 每次发送后的停顿
    pub post_tx_pause_ms: u32,
    pub rx_poll_ms: u32,
    /// 显示任务等待数据包
    pub display_wait_ms: u32,
    /// 无事件多久后发送心跳
    pub heartbeat_ms: u32,
}

impl PipelineConfig {
    pub const DEFAULT: Self = Self {
        debounce_ms: 500,
        event_wait_ms: 100,
        enqueue_wait_ms: 100,
        tx_wait_ms: 500,
        post_tx_pause_ms: 100,
        rx_poll_ms: 10,
        display_wait_ms: 500,
        heartbeat_ms: 60_000,
    };
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 链路计数器，各任务共享引用，中断上下文也可以更新
#[derive(Default)]
pub struct LinkStats {
    tx_count: AtomicU32,
    tx_failures: AtomicU32,
    rx_count: AtomicU32,
    crc_errors: AtomicU32,
    dropped_events: AtomicU32,
    dropped_packets: AtomicU32,
}

/// 某一时刻的计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub tx_count: u32,
    pub tx_failures: u32,
    pub rx_count: u32,
    pub crc_errors: u32,
    pub dropped_events: u32,
    pub dropped_packets: u32,
}

fn bump(counter: &AtomicU32) -> u32 {
    counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            tx_count: AtomicU32::new(0),
            tx_failures: AtomicU32::new(0),
            rx_count: AtomicU32::new(0),
            crc_errors: AtomicU32::new(0),
            dropped_events: AtomicU32::new(0),
            dropped_packets: AtomicU32::new(0),
        }
    }

    /// 以下 `record_*` 均返回自增后的值
    pub fn record_tx(&self) -> u32 {
        bump(&self.tx_count)
    }

    pub fn record_tx_failure(&self) -> u32 {
        bump(&self.tx_failures)
    }

    pub fn record_rx(&self) -> u32 {
        bump(&self.rx_count)
    }

    pub fn record_crc_error(&self) -> u32 {
        bump(&self.crc_errors)
    }

    pub fn record_dropped_event(&self) -> u32 {
        bump(&self.dropped_events)
    }

    pub fn record_dropped_packet(&self) -> u32 {
        bump(&self.dropped_packets)
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            tx_count: self.tx_count.load(Ordering::Relaxed),
            tx_failures: self.tx_failures.load(Ordering::Relaxed),
            rx_count: self.rx_count.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
        }
    }
}
