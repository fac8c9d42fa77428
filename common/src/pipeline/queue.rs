use heapless::spsc::{Consumer, Producer};

use crate::hal::Hardware;

/// 有界队列的生产端；满时拒绝最新的元素，从不阻塞（除非显式给出等待时间）
pub struct Outbox<'q, T, const N: usize> {
    producer: Producer<'q, T, N>,
    name: &'static str,
}

impl<'q, T, const N: usize> Outbox<'q, T, N> {
    pub fn new(producer: Producer<'q, T, N>, name: &'static str) -> Self {
        Self { producer, name }
    }

    /// 非阻塞入队，可在中断上下文调用
    pub fn send(&mut self, item: T) -> bool {
        match self.producer.enqueue(item) {
            Ok(()) => true,
            Err(_) => {
                warn!("{} queue full, dropping", self.name);
                false
            }
        }
    }

    /// 队列满时每毫秒重试一次，直到超时
    pub fn send_timeout<H: Hardware>(&mut self, item: T, hw: &mut H, timeout_ms: u32) -> bool {
        let mut item = item;
        let mut waited = 0;
        loop {
            match self.producer.enqueue(item) {
                Ok(()) => return true,
                Err(rejected) => item = rejected,
            }
            if waited >= timeout_ms {
                warn!("{} queue full for {} ms, dropping", self.name, timeout_ms);
                return false;
            }
            hw.delay_ms(1);
            waited += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.producer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 有界队列的消费端
pub struct Inbox<'q, T, const N: usize> {
    consumer: Consumer<'q, T, N>,
}

impl<'q, T, const N: usize> Inbox<'q, T, N> {
    pub fn new(consumer: Consumer<'q, T, N>) -> Self {
        Self { consumer }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.consumer.dequeue()
    }

    /// 有界等待；超时返回 `None`，表示“暂时没有”而不是错误
    pub fn recv_timeout<H: Hardware>(&mut self, hw: &mut H, timeout_ms: u32) -> Option<T> {
        let mut waited = 0;
        loop {
            if let Some(item) = self.consumer.dequeue() {
                return Some(item);
            }
            if waited >= timeout_ms {
                return None;
            }
            hw.delay_ms(1);
            waited += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
