#![cfg_attr(not(any(test, feature = "simulator")), no_std)]

#[macro_use]
mod fmt;

pub mod protocol;
pub mod hal;
pub mod power;
pub mod pipeline;
pub mod utils;

#[cfg(test)]
mod testing;

// 重新导出核心模块
pub use protocol::{EventType, NodeId, Packet};
pub use hal::{Hardware, RadioConfig, RadioError, RadioInterface, TransceiverState, WakeCause};
pub use power::{ActivityMonitor, PowerConfig, PowerManager, PowerState, Transition};
pub use pipeline::{LinkSnapshot, LinkStats, LogSink, PipelineConfig, StatusSink};
pub use utils::{crc16, verify_checksum};
