//! 基站：接收任务轮询收发器并校验，显示任务消费接收队列

mod remote;

use std::thread;

use common::pipeline::{display_step, Inbox, LinkStats, LogSink, Outbox, PipelineConfig, RxQueue, RxTask, StatusSink};
use common::{Hardware, NodeId, RadioInterface};
use heapless::spsc::Queue;

const NODE_ID: NodeId = NodeId(0x00);
/// 链路统计的输出周期
const SUMMARY_INTERVAL_MS: u32 = 30_000;

#[cfg(feature = "simulator")]
fn main() {
    use common::hal::simulator::{SimChannel, SimHardware, SimRadio};
    use common::RadioConfig;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting receiver (simulator mode)");

    let channel = SimChannel::new();
    let hardware = SimHardware::new(NODE_ID);
    let radio = SimRadio::new(channel.clone(), NODE_ID, RadioConfig::DEFAULT);

    remote::spawn(channel);
    receiver_main(hardware, radio);
}

/// 运行基站；只有收发器初始化失败时才返回
fn receiver_main<H, R>(mut hw: H, mut radio: R)
where
    H: Hardware + Clone + Send,
    R: RadioInterface,
{
    let mut sink = LogSink;
    sink.show_boot(hw.get_node_id());

    if let Err(err) = radio.initialize() {
        log::error!("Radio init failed: {:?}", err);
        return;
    }

    let config = PipelineConfig::DEFAULT;
    let stats = &LinkStats::new();
    let mut rx = RxTask::new(radio, stats);
    if let Err(err) = rx.listen() {
        log::error!("Failed to enter receive mode: {:?}", err);
        return;
    }
    log::info!("Listening for packets");

    let mut rx_queue: RxQueue = Queue::new();
    let (rx_producer, rx_consumer) = rx_queue.split();

    thread::scope(|scope| {
        let mut display_hw = hw.clone();
        scope.spawn(move || {
            let mut inbox = Inbox::new(rx_consumer);
            let mut display = LogSink;
            loop {
                display_step(&mut inbox, &mut display_hw, &mut display, config.display_wait_ms);
            }
        });

        let mut outbox = Outbox::new(rx_producer, "rx");
        let mut last_summary_ms = hw.get_timestamp_ms();
        loop {
            if let Err(err) = rx.poll(&mut outbox, &mut sink) {
                log::error!("Receive failed: {:?}", err);
            }
            hw.delay_ms(config.rx_poll_ms);

            let now = hw.get_timestamp_ms();
            if now.wrapping_sub(last_summary_ms) >= SUMMARY_INTERVAL_MS {
                last_summary_ms = now;
                let snapshot = stats.snapshot();
                log::info!(
                    "Link summary: rx={} crc_errors={} dropped={}",
                    snapshot.rx_count,
                    snapshot.crc_errors,
                    snapshot.dropped_packets
                );
            }
        }
    });
}
