//! 接收方向：收发器轮询 → 校验 → 接收队列 → 显示

use crate::hal::{Hardware, RadioInterface};
use crate::pipeline::{Inbox, LinkStats, Outbox, StatusSink};
use crate::protocol::{Packet, FRAME_SIZE};

/// 通过校验的数据包及其接收信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub packet: Packet,
    pub rssi: i16,
    /// 第几个有效包
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    Nothing,
    Accepted(ReceivedPacket),
    /// 长度不对或 CRC 不符，已丢弃
    Rejected { len: usize },
}

/// 接收任务：独占收发器
pub struct RxTask<'a, R> {
    radio: R,
    stats: &'a LinkStats,
}

impl<'a, R: RadioInterface> RxTask<'a, R> {
    pub fn new(radio: R, stats: &'a LinkStats) -> Self {
        Self { radio, stats }
    }

    /// 进入连续接收
    pub fn listen(&mut self) -> Result<(), R::Error> {
        self.radio.wake()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn poll<S, const N: usize>(
        &mut self,
        outbox: &mut Outbox<'_, ReceivedPacket, N>,
        sink: &mut S,
    ) -> Result<RxOutcome, R::Error>
    where
        S: StatusSink,
    {
        if !self.radio.poll_received()? {
            return Ok(RxOutcome::Nothing);
        }

        // 多留一个字节用来识别超长帧
        let mut frame = [0u8; FRAME_SIZE + 1];
        let len = self.radio.receive(&mut frame)?;

        let packet = match Packet::from_slice(&frame[..len]) {
            Some(packet) if packet.validate() => packet,
            Some(_) => return Ok(self.reject(len, sink)),
            None => {
                warn!("Unexpected packet size: {}", len);
                return Ok(self.reject(len, sink));
            }
        };

        let received = ReceivedPacket {
            packet,
            rssi: self.radio.last_rssi(),
            sequence: self.stats.record_rx(),
        };
        if !outbox.send(received) {
            self.stats.record_dropped_packet();
        }
        Ok(RxOutcome::Accepted(received))
    }

    fn reject<S: StatusSink>(&mut self, len: usize, sink: &mut S) -> RxOutcome {
        let errors = self.stats.record_crc_error();
        sink.show_crc_error(errors);
        error!("CRC error #{}", errors);
        RxOutcome::Rejected { len }
    }
}

/// 显示任务一轮：有包就显示包，没有就显示监听画面
pub fn display_step<H, S, const N: usize>(
    inbox: &mut Inbox<'_, ReceivedPacket, N>,
    hw: &mut H,
    sink: &mut S,
    wait_ms: u32,
) -> Option<ReceivedPacket>
where
    H: Hardware,
    S: StatusSink,
{
    match inbox.recv_timeout(hw, wait_ms) {
        Some(received) => {
            sink.show_rx(&received.packet, received.sequence, received.rssi);
            info!(
                "Displayed packet #{} - node {} event {} rssi {}",
                received.sequence,
                received.packet.node_id().0,
                received.packet.event_type().code(),
                received.rssi
            );
            Some(received)
        }
        None => {
            sink.show_listening();
            None
        }
    }
}
