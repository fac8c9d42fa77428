//! 发送方向：中断触发 → 事件任务组包 → 发送任务

use crate::hal::{Hardware, RadioInterface};
use crate::pipeline::{Inbox, LinkStats, Outbox, PipelineConfig, StatusSink};
use crate::power::{ActivityMonitor, PowerConfig, PowerManager, Transition};
use crate::protocol::{EventType, NodeId, Packet};

/// 去抖：距离上一次被接受的触发不足窗口期的触发被丢弃
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window_ms: u32,
    last_accepted_ms: Option<u32>,
}

impl Debouncer {
    pub const fn new(window_ms: u32) -> Self {
        Self {
            window_ms,
            last_accepted_ms: None,
        }
    }

    pub fn accept(&mut self, now_ms: u32) -> bool {
        match self.last_accepted_ms {
            Some(last) if now_ms.wrapping_sub(last) < self.window_ms => false,
            _ => {
                self.last_accepted_ms = Some(now_ms);
                true
            }
        }
    }
}

/// 中断侧：只做去抖、活动时间戳和非阻塞入队
pub struct MotionInput<'q, 'a, const N: usize> {
    debouncer: Debouncer,
    events: Outbox<'q, EventType, N>,
    activity: &'a ActivityMonitor,
    stats: &'a LinkStats,
}

impl<'q, 'a, const N: usize> MotionInput<'q, 'a, N> {
    pub fn new(
        config: &PipelineConfig,
        events: Outbox<'q, EventType, N>,
        activity: &'a ActivityMonitor,
        stats: &'a LinkStats,
    ) -> Self {
        Self {
            debouncer: Debouncer::new(config.debounce_ms),
            events,
            activity,
            stats,
        }
    }

    /// 返回触发是否产生了一个事件
    pub fn on_trigger(&mut self, now_ms: u32) -> bool {
        if !self.debouncer.accept(now_ms) {
            return false;
        }
        self.activity.notify(now_ms);
        if self.events.send(EventType::Motion) {
            true
        } else {
            self.stats.record_dropped_event();
            false
        }
    }
}

/// 事件任务：取出事件并打上时间戳与电量，另外产生心跳和低电事件
///
/// 低电阈值与功耗调度共用同一份 [`PowerConfig`]。
pub struct EventSource<'a> {
    node_id: NodeId,
    config: PipelineConfig,
    power: PowerConfig,
    activity: &'a ActivityMonitor,
    last_event_ms: u32,
    low_battery_reported: bool,
    pending: Option<EventType>,
}

impl<'a> EventSource<'a> {
    pub fn new(
        node_id: NodeId,
        config: PipelineConfig,
        power: PowerConfig,
        activity: &'a ActivityMonitor,
        now_ms: u32,
    ) -> Self {
        Self {
            node_id,
            config,
            power,
            activity,
            last_event_ms: now_ms,
            low_battery_reported: false,
            pending: None,
        }
    }

    /// 有界等待一个事件并组包；没有事件时返回 `None`
    pub fn next_packet<H: Hardware, const N: usize>(
        &mut self,
        events: &mut Inbox<'_, EventType, N>,
        hw: &mut H,
    ) -> Option<Packet> {
        let event = match self.pending.take() {
            Some(event) => event,
            None => match events.recv_timeout(hw, self.config.event_wait_ms) {
                Some(event) => event,
                None => self.heartbeat_due(hw.get_timestamp_ms())?,
            },
        };

        let timestamp = hw.get_timestamp_ms();
        let battery = match hw.get_battery_level() {
            Ok(level) => level,
            Err(_) => {
                warn!("Battery read failed, reporting 0%");
                0
            }
        };
        self.last_event_ms = timestamp;
        self.track_battery(battery);

        let packet = Packet::build(self.node_id, timestamp, event, battery);
        self.activity.notify(timestamp);
        info!(
            "Packet built - node {} event {} batt {}%",
            self.node_id.0,
            event.code(),
            battery
        );
        Some(packet)
    }

    /// 取事件并放入发送队列，队列满时有界等待
    pub fn pump<H: Hardware, const N: usize, const M: usize>(
        &mut self,
        events: &mut Inbox<'_, EventType, N>,
        packets: &mut Outbox<'_, Packet, M>,
        hw: &mut H,
        stats: &LinkStats,
    ) -> Option<Packet> {
        let packet = self.next_packet(events, hw)?;
        if !packets.send_timeout(packet, hw, self.config.enqueue_wait_ms) {
            stats.record_dropped_packet();
        }
        Some(packet)
    }

    fn heartbeat_due(&self, now_ms: u32) -> Option<EventType> {
        if now_ms.wrapping_sub(self.last_event_ms) >= self.config.heartbeat_ms {
            Some(EventType::Heartbeat)
        } else {
            None
        }
    }

    /// 电量跌破阈值时只上报一次，回升后重新布防
    fn track_battery(&mut self, battery: u8) {
        if self.power.is_low(battery) && !self.low_battery_reported {
            self.low_battery_reported = true;
            self.pending = Some(EventType::LowBattery);
            warn!("Battery low ({}%)", battery);
        } else if battery > self.power.low_battery {
            self.low_battery_reported = false;
        }
    }
}

/// 发送任务一轮的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome<E> {
    Sent(Packet),
    Failed(Packet, E),
    /// 等待超时，没有数据包
    Idle,
}

/// 发送任务：独占收发器，同时负责功耗调度
pub struct TxTask<'a, R> {
    radio: R,
    config: PipelineConfig,
    stats: &'a LinkStats,
    last_power_tick_ms: u32,
}

impl<'a, R: RadioInterface> TxTask<'a, R> {
    pub fn new(radio: R, config: PipelineConfig, stats: &'a LinkStats) -> Self {
        Self {
            radio,
            config,
            stats,
            last_power_tick_ms: 0,
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// 等待一个数据包并发送；发送失败不重试
    pub fn step<H, S, const N: usize>(
        &mut self,
        packets: &mut Inbox<'_, Packet, N>,
        hw: &mut H,
        sink: &mut S,
    ) -> TxOutcome<R::Error>
    where
        H: Hardware,
        S: StatusSink,
    {
        let Some(packet) = packets.recv_timeout(hw, self.config.tx_wait_ms) else {
            if let Ok(battery) = hw.get_battery_level() {
                sink.show_idle(battery);
            }
            return TxOutcome::Idle;
        };

        let tx_count = self.stats.record_tx();
        sink.show_tx(&packet, tx_count);

        let outcome = match self.radio.transmit(&packet.serialize()) {
            Ok(()) => {
                info!(
                    "Packet sent - event {} ts {}",
                    packet.event_type().code(),
                    packet.timestamp()
                );
                TxOutcome::Sent(packet)
            }
            Err(err) => {
                let failures = self.stats.record_tx_failure();
                error!("Packet send failed ({} failures)", failures);
                TxOutcome::Failed(packet, err)
            }
        };

        hw.delay_ms(self.config.post_tx_pause_ms);
        outcome
    }

    /// 按调度周期运行功耗管理；返回 [`Transition::DeepSleep`] 时调用方必须进入深睡眠
    pub fn service_power<H, S>(&mut self, power: &mut PowerManager<'_>, hw: &mut H, sink: &mut S) -> Transition
    where
        H: Hardware,
        S: StatusSink,
    {
        let now = hw.get_timestamp_ms();
        if now.wrapping_sub(self.last_power_tick_ms) < power.config().tick_interval_ms {
            return Transition::Stay;
        }
        self.last_power_tick_ms = now;
        power.tick(hw, &mut self.radio, sink)
    }
}
