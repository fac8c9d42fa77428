//! 传感器节点到基站的 LoRa 单向链路
//!
//! 实现都在 `common` 中，这里只做重新导出。

pub use common::*;
