use crate::protocol::{NodeId, Packet};

/// 状态显示接口（屏幕或日志），链路正确性不依赖它
pub trait StatusSink {
    fn show_boot(&mut self, node_id: NodeId);

    fn show_tx(&mut self, packet: &Packet, tx_count: u32);

    fn show_idle(&mut self, battery: u8);

    fn show_sleep(&mut self);

    fn show_rx(&mut self, packet: &Packet, rx_count: u32, rssi: i16);

    fn show_crc_error(&mut self, error_count: u32);

    fn show_listening(&mut self);
}

/// 把各个画面输出到日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn show_boot(&mut self, node_id: NodeId) {
        info!("[boot] node {} initializing", node_id.0);
    }

    fn show_tx(&mut self, packet: &Packet, tx_count: u32) {
        info!(
            "[tx] #{} event {} t={}s batt={}%",
            tx_count,
            packet.event_type().name(),
            packet.timestamp() / 1000,
            packet.battery_level()
        );
    }

    fn show_idle(&mut self, battery: u8) {
        debug!("[idle] waiting for events, battery {}%", battery);
    }

    fn show_sleep(&mut self) {
        info!("[sleep] sleeping...");
    }

    fn show_rx(&mut self, packet: &Packet, rx_count: u32, rssi: i16) {
        info!(
            "[rx] #{} node {} event {} batt={}% rssi={} dBm",
            rx_count,
            packet.node_id().0,
            packet.event_type().name(),
            packet.battery_level(),
            rssi
        );
    }

    fn show_crc_error(&mut self, error_count: u32) {
        warn!("[rx] CRC error #{}", error_count);
    }

    fn show_listening(&mut self) {
        debug!("[rx] listening...");
    }
}
