//! 模拟的远端传感器节点，让基站单独运行时也能收到数据

use std::thread;

use common::hal::simulator::{SimChannel, SimHardware, SimRadio};
use common::{EventType, Hardware, NodeId, Packet, RadioConfig, RadioInterface};

const REMOTE_ID: NodeId = NodeId(0x01);
const SEND_INTERVAL_MS: u32 = 2_000;
/// 每隔若干帧在空中损坏一帧
const CORRUPT_EVERY: u32 = 7;

/// 在后台线程中周期性发送事件帧
pub fn spawn(channel: SimChannel) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut hw = SimHardware::new(REMOTE_ID);
        let mut radio = SimRadio::new(channel.clone(), REMOTE_ID, RadioConfig::DEFAULT).with_rssi(-68);
        if let Err(err) = radio.initialize() {
            log::error!("Remote sensor radio init failed: {}", err);
            return;
        }

        let mut battery = 100u8;
        let mut sent = 0u32;
        loop {
            hw.delay_ms(SEND_INTERVAL_MS);
            sent += 1;

            let event = if sent % 5 == 0 {
                EventType::Heartbeat
            } else {
                EventType::Motion
            };
            if sent % CORRUPT_EVERY == 0 {
                channel.corrupt_next(1);
            }

            let packet = Packet::build(REMOTE_ID, hw.get_timestamp_ms(), event, battery);
            if let Err(err) = radio.transmit(&packet.serialize()) {
                log::warn!("Remote sensor transmit failed: {}", err);
            }
            battery = battery.saturating_sub(1).max(1);
        }
    })
}
