//! 测试用的收发器仿真：寄存器型与命令型两种总线

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;

use crate::hal::bus::Bus;

/// 只累计时长的延时器
#[derive(Clone, Default)]
pub struct CountingDelay {
    elapsed: Rc<RefCell<u32>>,
}

impl CountingDelay {
    pub fn elapsed_ms(&self) -> u32 {
        *self.elapsed.borrow()
    }

    pub fn reset(&self) {
        *self.elapsed.borrow_mut() = 0;
    }
}

impl DelayMs<u32> for CountingDelay {
    fn delay_ms(&mut self, ms: u32) {
        *self.elapsed.borrow_mut() += ms;
    }
}

/// 总线上的一次寄存器访问
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegAccess {
    Read(u8),
    Write(u8, u8),
}

pub struct Sx1276Regs {
    pub regs: [u8; 128],
    pub fifo: [u8; 256],
    fifo_ptr: u8,
    /// 进入 TX 后第几次读中断寄存器时置位 TxDone，`None` 表示永不完成
    pub tx_done_after: Option<u32>,
    tx_countdown: Option<u32>,
    pub log: Vec<RegAccess>,
    pub resets: Vec<bool>,
}

/// SX1276 寄存器文件仿真
#[derive(Clone)]
pub struct Sx1276Emulator {
    pub chip: Rc<RefCell<Sx1276Regs>>,
}

impl Sx1276Emulator {
    pub fn new() -> Self {
        let mut regs = [0u8; 128];
        regs[0x42] = 0x12;
        Self {
            chip: Rc::new(RefCell::new(Sx1276Regs {
                regs,
                fifo: [0; 256],
                fifo_ptr: 0,
                tx_done_after: Some(3),
                tx_countdown: None,
                log: Vec::new(),
                resets: Vec::new(),
            })),
        }
    }

    pub fn reg(&self, addr: u8) -> u8 {
        self.chip.borrow().regs[addr as usize]
    }

    /// 模拟空中收到一帧
    pub fn inject_rx(&self, frame: &[u8], rssi_raw: u8) {
        let mut chip = self.chip.borrow_mut();
        let offset = 0x40u8;
        for (i, byte) in frame.iter().enumerate() {
            chip.fifo[offset as usize + i] = *byte;
        }
        chip.regs[0x10] = offset;
        chip.regs[0x13] = frame.len() as u8;
        chip.regs[0x1A] = rssi_raw;
        chip.regs[0x12] |= 0x40;
    }

    /// 写入过的值（按顺序）
    pub fn writes_to(&self, addr: u8) -> Vec<u8> {
        self.chip
            .borrow()
            .log
            .iter()
            .filter_map(|access| match access {
                RegAccess::Write(reg, value) if *reg == addr => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.chip.borrow_mut().log.clear();
    }
}

impl Bus for Sx1276Emulator {
    type Error = ();

    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        let mut chip = self.chip.borrow_mut();
        let addr = write[0];
        let reg = addr & 0x7F;

        if addr & 0x80 != 0 {
            for value in &write[1..] {
                chip.log.push(RegAccess::Write(reg, *value));
                match reg {
                    0x00 => {
                        let ptr = chip.fifo_ptr;
                        chip.fifo[ptr as usize] = *value;
                        chip.fifo_ptr = ptr.wrapping_add(1);
                    }
                    0x0D => chip.fifo_ptr = *value,
                    0x12 => chip.regs[0x12] &= !*value,
                    0x01 => {
                        chip.regs[0x01] = *value;
                        chip.tx_countdown = if *value & 0x07 == 0x03 {
                            chip.tx_done_after
                        } else {
                            None
                        };
                    }
                    _ => chip.regs[reg as usize] = *value,
                }
            }
        } else {
            for slot in read.iter_mut() {
                chip.log.push(RegAccess::Read(reg));
                *slot = match reg {
                    0x00 => {
                        let ptr = chip.fifo_ptr;
                        chip.fifo_ptr = ptr.wrapping_add(1);
                        chip.fifo[ptr as usize]
                    }
                    0x12 => {
                        if let Some(left) = chip.tx_countdown {
                            if left <= 1 {
                                chip.tx_countdown = None;
                                chip.regs[0x12] |= 0x08;
                            } else {
                                chip.tx_countdown = Some(left - 1);
                            }
                        }
                        chip.regs[0x12]
                    }
                    _ => chip.regs[reg as usize],
                };
            }
        }
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), Self::Error> {
        self.chip.borrow_mut().resets.push(asserted);
        Ok(())
    }
}

pub const MODE_STBY_RC: u8 = 0x2;
pub const MODE_RX: u8 = 0x5;
pub const MODE_TX: u8 = 0x6;

pub struct Sx1262Chip {
    pub mode: u8,
    pub sleeping: bool,
    pub irq: u16,
    pub buffer: [u8; 256],
    pub rx_len: u8,
    pub rx_offset: u8,
    pub rssi_pkt: u8,
    pub registers: BTreeMap<u16, u8>,
    /// 每条命令后 BUSY 保持的轮询次数
    pub busy_per_command: u32,
    pub busy_left: u32,
    /// BUSY 永远不释放
    pub stuck_busy: bool,
    /// 忽略模式切换命令
    pub frozen_mode: bool,
    pub tx_done_after: Option<u32>,
    tx_countdown: Option<u32>,
    pub commands: Vec<Vec<u8>>,
    /// 睡眠期间收到的事务数（唤醒边沿）
    pub wake_edges: u32,
    /// 在 BUSY 未释放时收到的事务数
    pub busy_violations: u32,
    pub resets: Vec<bool>,
}

/// SX1262 命令解释器仿真
#[derive(Clone)]
pub struct Sx1262Emulator {
    pub chip: Rc<RefCell<Sx1262Chip>>,
}

impl Sx1262Emulator {
    pub fn new() -> Self {
        Self {
            chip: Rc::new(RefCell::new(Sx1262Chip {
                mode: MODE_STBY_RC,
                sleeping: false,
                irq: 0,
                buffer: [0; 256],
                rx_len: 0,
                rx_offset: 0,
                rssi_pkt: 0,
                registers: BTreeMap::new(),
                busy_per_command: 2,
                busy_left: 0,
                stuck_busy: false,
                frozen_mode: false,
                tx_done_after: Some(3),
                tx_countdown: None,
                commands: Vec::new(),
                wake_edges: 0,
                busy_violations: 0,
                resets: Vec::new(),
            })),
        }
    }

    pub fn inject_rx(&self, frame: &[u8], rssi_pkt: u8) {
        let mut chip = self.chip.borrow_mut();
        let offset = 0x80u8;
        for (i, byte) in frame.iter().enumerate() {
            chip.buffer[offset as usize + i] = *byte;
        }
        chip.rx_offset = offset;
        chip.rx_len = frame.len() as u8;
        chip.rssi_pkt = rssi_pkt;
        chip.irq |= 0x0002;
    }

    /// 以指定操作码开头的命令
    pub fn commands_with(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.chip
            .borrow()
            .commands
            .iter()
            .filter(|cmd| cmd.first() == Some(&opcode))
            .cloned()
            .collect()
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.chip.borrow().commands.iter().map(|cmd| cmd[0]).collect()
    }

    pub fn clear_log(&self) {
        self.chip.borrow_mut().commands.clear();
    }
}

impl Sx1262Chip {
    fn set_mode(&mut self, mode: u8) {
        if !self.frozen_mode {
            self.mode = mode;
        }
    }

    fn execute(&mut self, write: &[u8], read: &mut [u8]) {
        match write[0] {
            0x80 => self.set_mode(MODE_STBY_RC),
            0x84 => {
                if !self.frozen_mode {
                    self.sleeping = true;
                }
            }
            0x83 => {
                self.set_mode(MODE_TX);
                self.tx_countdown = self.tx_done_after;
            }
            0x82 => self.set_mode(MODE_RX),
            0x0E => {
                let offset = write[1] as usize;
                for (i, byte) in write[2..].iter().enumerate() {
                    self.buffer[(offset + i) & 0xFF] = *byte;
                }
            }
            0x1E => {
                let offset = write[1] as usize;
                for (i, slot) in read.iter_mut().enumerate() {
                    *slot = self.buffer[(offset + i) & 0xFF];
                }
            }
            0x12 => {
                if let Some(left) = self.tx_countdown {
                    if left <= 1 {
                        self.tx_countdown = None;
                        self.irq |= 0x0001;
                        self.set_mode(MODE_STBY_RC);
                    } else {
                        self.tx_countdown = Some(left - 1);
                    }
                }
                read[..2].copy_from_slice(&self.irq.to_be_bytes());
            }
            0x02 => {
                let mask = u16::from_be_bytes([write[1], write[2]]);
                self.irq &= !mask;
            }
            0x13 => {
                read[0] = self.rx_len;
                read[1] = self.rx_offset;
            }
            0x14 => {
                read[0] = self.rssi_pkt;
                read[1] = 0;
                read[2] = self.rssi_pkt;
            }
            0xC0 => read[0] = self.mode << 4,
            0x0D => {
                let addr = u16::from_be_bytes([write[1], write[2]]);
                for (i, value) in write[3..].iter().enumerate() {
                    self.registers.insert(addr + i as u16, *value);
                }
            }
            _ => {}
        }
    }
}

impl Bus for Sx1262Emulator {
    type Error = ();

    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        let mut chip = self.chip.borrow_mut();
        chip.commands.push(write.to_vec());

        if chip.sleeping {
            // 片选边沿唤醒芯片，本次事务内容被丢弃
            chip.sleeping = false;
            chip.mode = MODE_STBY_RC;
            chip.wake_edges += 1;
            chip.busy_left = chip.busy_per_command;
            return Ok(());
        }
        if chip.stuck_busy || chip.busy_left > 0 {
            chip.busy_violations += 1;
        }

        chip.execute(write, read);
        chip.busy_left = chip.busy_per_command;
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, Self::Error> {
        let mut chip = self.chip.borrow_mut();
        if chip.stuck_busy || chip.sleeping {
            return Ok(true);
        }
        if chip.busy_left > 0 {
            chip.busy_left -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), Self::Error> {
        let mut chip = self.chip.borrow_mut();
        chip.resets.push(asserted);
        if !asserted && !chip.frozen_mode {
            chip.sleeping = false;
            chip.mode = MODE_STBY_RC;
        }
        Ok(())
    }
}
