//! 传感器节点：红外中断 → 事件任务 → 发送任务，发送任务同时承担功耗调度

mod motion;

use std::thread;

use common::pipeline::{
    EventQueue, EventSource, Inbox, LinkStats, LogSink, MotionInput, Outbox, PipelineConfig,
    StatusSink, TxOutcome, TxQueue, TxTask,
};
use common::power::{ActivityMonitor, PowerConfig, PowerManager, Transition};
use common::{Hardware, NodeId, RadioInterface};
use heapless::spsc::Queue;

const NODE_ID: NodeId = NodeId(0x01);

#[cfg(feature = "simulator")]
fn main() {
    use common::hal::simulator::{SimChannel, SimHardware, SimRadio};
    use common::RadioConfig;
    use motion::MotionScenario;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting transmitter (simulator mode)");

    // 单进程内没有接收端，帧留在信道里
    let channel = SimChannel::new();
    let hardware = SimHardware::new(NODE_ID);
    let radio = SimRadio::new(channel, NODE_ID, RadioConfig::DEFAULT);

    let scenario = MotionScenario::from_env();
    let battery = hardware.battery();
    battery.set(scenario.start_battery);
    let wake_line = hardware.wake_line();

    transmitter_main(hardware, radio, move |on_trigger| {
        scenario.run(&battery, &wake_line, on_trigger)
    });
}

/// 运行节点直到深睡眠；`sensor` 在独立线程中扮演中断源，每次触发调用一次回调
fn transmitter_main<H, R, F>(mut hw: H, mut radio: R, sensor: F)
where
    H: Hardware + Clone + Send,
    R: RadioInterface,
    F: FnOnce(&mut dyn FnMut()) + Send,
{
    let mut sink = LogSink;
    sink.show_boot(hw.get_node_id());

    if let Err(err) = radio.initialize() {
        log::error!("Radio init failed: {:?}", err);
        return;
    }

    let config = PipelineConfig::DEFAULT;
    let power_config = PowerConfig::DEFAULT;
    let stats = &LinkStats::new();
    let activity = &ActivityMonitor::new();
    let mut power = PowerManager::new(power_config, activity, &mut hw);

    let mut event_queue: EventQueue = Queue::new();
    let (event_producer, event_consumer) = event_queue.split();
    let mut tx_queue: TxQueue = Queue::new();
    let (tx_producer, tx_consumer) = tx_queue.split();

    thread::scope(|scope| {
        // 中断上下文：只去抖和非阻塞入队
        let isr_hw = hw.clone();
        let mut input = MotionInput::new(&config, Outbox::new(event_producer, "event"), activity, stats);
        scope.spawn(move || {
            sensor(&mut || {
                input.on_trigger(isr_hw.get_timestamp_ms());
            })
        });

        let mut event_hw = hw.clone();
        scope.spawn(move || {
            let mut source = EventSource::new(
                event_hw.get_node_id(),
                config,
                power_config,
                activity,
                event_hw.get_timestamp_ms(),
            );
            let mut events = Inbox::new(event_consumer);
            let mut packets = Outbox::new(tx_producer, "tx");
            loop {
                source.pump(&mut events, &mut packets, &mut event_hw, stats);
            }
        });

        let mut tx = TxTask::new(radio, config, stats);
        let mut packets = Inbox::new(tx_consumer);
        loop {
            if let TxOutcome::Failed(packet, err) = tx.step(&mut packets, &mut hw, &mut sink) {
                log::warn!("Packet ts={} lost: {:?}", packet.timestamp(), err);
            }

            if let Transition::DeepSleep { max_ms } = tx.service_power(&mut power, &mut hw, &mut sink) {
                log::info!("Link summary: {:?}", stats.snapshot());
                hw.deep_sleep(max_ms);
            }
        }
    });
}
