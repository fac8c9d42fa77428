//! 功耗调度：根据空闲时间和电池电量决定收发器与处理器何时休眠

use core::sync::atomic::{AtomicU32, Ordering};

use crate::hal::{Hardware, RadioInterface, WakeCause};
use crate::pipeline::StatusSink;

/// 调度阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerConfig {
    /// 无活动多久后进入浅睡眠
    pub idle_timeout_ms: u32,
    /// 浅睡眠定时器兜底
    pub light_sleep_max_ms: u32,
    pub deep_sleep_max_ms: u32,
    /// 上电后不做任何休眠判断的时间
    pub boot_grace_ms: u32,
    /// 低于该电量（且非 0）进入深睡眠
    pub critical_battery: u8,
    /// 不高于该电量视为低电
    pub low_battery: u8,
    /// 调度周期
    pub tick_interval_ms: u32,
}

impl PowerConfig {
    pub const DEFAULT: Self = Self {
        idle_timeout_ms: 5_000,
        light_sleep_max_ms: 30_000,
        deep_sleep_max_ms: 30_000,
        boot_grace_ms: 10_000,
        critical_battery: 5,
        low_battery: 20,
        tick_interval_ms: 1_000,
    };

    /// 0% 读数表示外部供电，不算低电
    pub fn is_low(&self, battery: u8) -> bool {
        battery > 0 && battery <= self.low_battery
    }

    pub fn is_critical(&self, battery: u8) -> bool {
        battery > 0 && battery < self.critical_battery
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    LightSleep,
    DeepSleep,
}

/// 一次调度的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 保持运行
    Stay,
    /// 已完成一次浅睡眠并返回
    LightSlept(WakeCause),
    /// 收发器已进入睡眠，调用方必须接着执行 [`Hardware::deep_sleep`]
    DeepSleep { max_ms: u32 },
}

/// 最近一次活动时间戳，可在中断上下文中更新
pub struct ActivityMonitor {
    last_activity_ms: AtomicU32,
}

impl ActivityMonitor {
    pub const fn new() -> Self {
        Self {
            last_activity_ms: AtomicU32::new(0),
        }
    }

    pub fn notify(&self, now_ms: u32) {
        self.last_activity_ms.store(now_ms, Ordering::Release);
    }

    pub fn last_activity_ms(&self) -> u32 {
        self.last_activity_ms.load(Ordering::Acquire)
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PowerManager<'a> {
    config: PowerConfig,
    activity: &'a ActivityMonitor,
    boot_ms: u32,
    externally_powered: bool,
    state: PowerState,
}

impl<'a> PowerManager<'a> {
    /// 记录上电时间；首次电量读数为 0 时锁定为外部供电
    pub fn new<H: Hardware>(config: PowerConfig, activity: &'a ActivityMonitor, hw: &mut H) -> Self {
        let now = hw.get_timestamp_ms();
        activity.notify(now);

        let externally_powered = matches!(hw.get_battery_level(), Ok(0));
        if externally_powered {
            info!("External power detected, sleep disabled");
        }

        info!("Power manager initialized");
        Self {
            config,
            activity,
            boot_ms: now,
            externally_powered,
            state: PowerState::Active,
        }
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn is_externally_powered(&self) -> bool {
        self.externally_powered
    }

    pub fn notify_event(&self, now_ms: u32) {
        self.activity.notify(now_ms);
    }

    /// 仅做判断，不产生副作用；`battery` 为 `None` 表示读数失败，此时跳过电量规则
    pub fn evaluate(&self, now_ms: u32, battery: Option<u8>) -> PowerState {
        if self.externally_powered {
            return PowerState::Active;
        }
        if now_ms.wrapping_sub(self.boot_ms) < self.config.boot_grace_ms {
            return PowerState::Active;
        }
        if battery.map_or(false, |level| self.config.is_critical(level)) {
            return PowerState::DeepSleep;
        }
        let idle_ms = now_ms.wrapping_sub(self.activity.last_activity_ms());
        if idle_ms >= self.config.idle_timeout_ms {
            return PowerState::LightSleep;
        }
        PowerState::Active
    }

    /// 执行一次调度
    ///
    /// 浅睡眠在本函数内完成，返回前重置空闲计时；深睡眠只做准备工作，
    /// 由调用方以 [`Hardware::deep_sleep`] 结束。
    pub fn tick<H, R, S>(&mut self, hw: &mut H, radio: &mut R, sink: &mut S) -> Transition
    where
        H: Hardware,
        R: RadioInterface,
        S: StatusSink,
    {
        if self.externally_powered {
            return Transition::Stay;
        }

        let now = hw.get_timestamp_ms();
        if now.wrapping_sub(self.boot_ms) < self.config.boot_grace_ms {
            return Transition::Stay;
        }

        let battery = match hw.get_battery_level() {
            Ok(level) => Some(level),
            Err(_) => {
                warn!("Battery read failed, skipping battery check");
                None
            }
        };

        self.state = self.evaluate(now, battery);
        match self.state {
            PowerState::Active => {
                // 低电但未到休眠条件时提前显示睡眠画面
                if battery.map_or(false, |level| self.config.is_low(level)) {
                    sink.show_sleep();
                }
                Transition::Stay
            }
            PowerState::DeepSleep => {
                warn!(
                    "Critical battery ({}%), entering deep sleep",
                    battery.unwrap_or(0)
                );
                if radio.sleep().is_err() {
                    warn!("Radio did not acknowledge sleep");
                }
                sink.show_sleep();
                Transition::DeepSleep {
                    max_ms: self.config.deep_sleep_max_ms,
                }
            }
            PowerState::LightSleep => {
                let idle_ms = now.wrapping_sub(self.activity.last_activity_ms());
                info!("Idle {} ms, entering light sleep", idle_ms);
                if radio.sleep().is_err() {
                    warn!("Radio did not acknowledge sleep");
                }
                sink.show_sleep();

                let cause = hw.light_sleep(self.config.light_sleep_max_ms);
                match cause {
                    WakeCause::External => info!("Wakeup: motion detected"),
                    WakeCause::Timer => info!("Wakeup: timer expired"),
                }

                self.notify_event(hw.get_timestamp_ms());
                self.state = PowerState::Active;
                Transition::LightSlept(cause)
            }
        }
    }
}
