use core::convert::Infallible;
use core::fmt;

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::{InputPin, OutputPin};

/// 单次总线事务最大字节数（写入 + 读出）
pub const MAX_TRANSACTION: usize = 260;

/// 收发器总线抽象
///
/// `transact` 先发出 `write`，随后继续时钟 `read.len()` 个字节读回，
/// 整个过程在一次片选内完成。
pub trait Bus {
    type Error: fmt::Debug;

    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error>;

    /// 芯片忙信号（命令型收发器才有意义）
    fn is_busy(&mut self) -> Result<bool, Self::Error>;

    /// 控制复位引脚，`true` 为拉低复位
    fn set_reset(&mut self, asserted: bool) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiBusError<E> {
    Spi(E),
    Pin,
    /// 事务超过 [`MAX_TRANSACTION`]
    Overflow,
}

/// 未连接 BUSY 引脚时使用，恒为空闲
pub struct NoBusy;

impl InputPin for NoBusy {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// 基于 embedded-hal 阻塞 SPI 的总线实现，片选由本结构手动控制
pub struct SpiBus<SPI, CS, RST, BUSY = NoBusy> {
    spi: SPI,
    cs: CS,
    reset: RST,
    busy: BUSY,
    scratch: [u8; MAX_TRANSACTION],
}

impl<SPI, CS, RST> SpiBus<SPI, CS, RST, NoBusy>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    RST: OutputPin,
{
    /// 寄存器型收发器：没有 BUSY 引脚
    pub fn new(spi: SPI, cs: CS, reset: RST) -> Self {
        Self::with_busy(spi, cs, reset, NoBusy)
    }
}

impl<SPI, CS, RST, BUSY> SpiBus<SPI, CS, RST, BUSY>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    pub fn with_busy(spi: SPI, cs: CS, reset: RST, busy: BUSY) -> Self {
        Self {
            spi,
            cs,
            reset,
            busy,
            scratch: [0; MAX_TRANSACTION],
        }
    }

    /// 取回底层外设
    pub fn release(self) -> (SPI, CS, RST, BUSY) {
        (self.spi, self.cs, self.reset, self.busy)
    }
}

impl<SPI, CS, RST, BUSY> Bus for SpiBus<SPI, CS, RST, BUSY>
where
    SPI: Transfer<u8>,
    SPI::Error: fmt::Debug,
    CS: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    type Error = SpiBusError<SPI::Error>;

    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        let total = write.len() + read.len();
        if total > MAX_TRANSACTION {
            return Err(SpiBusError::Overflow);
        }

        let frame = &mut self.scratch[..total];
        frame[..write.len()].copy_from_slice(write);
        frame[write.len()..].fill(0x00);

        self.cs.set_low().map_err(|_| SpiBusError::Pin)?;
        let result = self.spi.transfer(frame).map(|rx| {
            read.copy_from_slice(&rx[write.len()..]);
        });
        // 无论传输是否成功都要释放片选
        self.cs.set_high().map_err(|_| SpiBusError::Pin)?;

        result.map_err(SpiBusError::Spi)
    }

    fn is_busy(&mut self) -> Result<bool, Self::Error> {
        self.busy.is_high().map_err(|_| SpiBusError::Pin)
    }

    fn set_reset(&mut self, asserted: bool) -> Result<(), Self::Error> {
        if asserted {
            self.reset.set_low().map_err(|_| SpiBusError::Pin)
        } else {
            self.reset.set_high().map_err(|_| SpiBusError::Pin)
        }
    }
}
