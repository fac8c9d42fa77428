//! 模拟红外传感器：按固定节奏触发中断，同时缓慢消耗电量

use std::env;
use std::thread;
use std::time::Duration;

use common::hal::simulator::{BatteryGauge, WakeLine};

/// 触发间隔（毫秒），循环使用。包含落在去抖窗口内的抖动，以及足以进入浅睡眠的安静期
const PATTERN_MS: [u64; 7] = [1_200, 180, 3_000, 250, 9_000, 400, 15_000];

/// 模拟场景参数
#[derive(Debug, Clone, Copy)]
pub struct MotionScenario {
    /// 初始电量，0 表示外部供电
    pub start_battery: u8,
    /// 每次触发消耗的电量
    pub drain_per_trigger: u8,
}

impl MotionScenario {
    pub const DEFAULT: Self = Self {
        start_battery: 100,
        drain_per_trigger: 2,
    };

    /// 读取 `LORA_SIM_BATTERY` 和 `LORA_SIM_DRAIN` 覆盖默认值
    pub fn from_env() -> Self {
        let mut scenario = Self::DEFAULT;
        if let Some(level) = read_env("LORA_SIM_BATTERY") {
            scenario.start_battery = level.min(100);
        }
        if let Some(drain) = read_env("LORA_SIM_DRAIN") {
            scenario.drain_per_trigger = drain;
        }
        scenario
    }

    /// 永久运行；每次触发先拉起唤醒线再调用中断回调
    pub fn run(&self, battery: &BatteryGauge, wake_line: &WakeLine, on_trigger: &mut dyn FnMut()) -> ! {
        let mut level = self.start_battery;
        battery.set(level);

        let mut step = 0;
        loop {
            thread::sleep(Duration::from_millis(PATTERN_MS[step % PATTERN_MS.len()]));
            step += 1;

            wake_line.trigger();
            on_trigger();

            // 外部供电时电量保持为 0
            if level > 0 {
                level = level.saturating_sub(self.drain_per_trigger).max(1);
                battery.set(level);
            }
        }
    }
}

fn read_env(name: &str) -> Option<u8> {
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: expected 0-255", name, value);
            None
        }
    }
}
