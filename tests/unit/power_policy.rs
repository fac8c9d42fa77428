#[cfg(test)]
mod power_policy_tests {
    use std::thread;
    use std::time::Duration;

    use common::hal::simulator::{SimChannel, SimHardware, SimRadio};
    use common::pipeline::LogSink;
    use common::power::{ActivityMonitor, PowerConfig, PowerManager, PowerState, Transition};
    use common::{Hardware, NodeId, RadioConfig, RadioInterface, TransceiverState, WakeCause};

    // 很短的阈值，让测试在真实时钟下也能很快跑完
    const FAST: PowerConfig = PowerConfig {
        idle_timeout_ms: 50,
        light_sleep_max_ms: 200,
        deep_sleep_max_ms: 1_000,
        boot_grace_ms: 0,
        critical_battery: 5,
        low_battery: 20,
        tick_interval_ms: 10,
    };

    fn node() -> (SimHardware, SimRadio) {
        let hw = SimHardware::new(NodeId(0x01));
        let mut radio = SimRadio::new(SimChannel::new(), NodeId(0x01), RadioConfig::DEFAULT);
        radio.initialize().unwrap();
        (hw, radio)
    }

    #[test]
    fn test_default_thresholds() {
        let config = PowerConfig::DEFAULT;
        assert!(config.is_critical(3));
        assert!(!config.is_critical(5));
        assert!(!config.is_critical(0));
        assert!(config.is_low(20));
        assert!(!config.is_low(21));
        assert!(!config.is_low(0));
    }

    #[test]
    fn test_decision_table() {
        let activity = ActivityMonitor::new();
        let mut hw = SimHardware::new(NodeId(0x01));
        hw.battery().set(80);
        let power = PowerManager::new(PowerConfig::DEFAULT, &activity, &mut hw);

        // 上电保护期内电量再低也保持运行
        assert_eq!(power.evaluate(5_000, Some(3)), PowerState::Active);
        assert_eq!(power.evaluate(20_000, Some(3)), PowerState::DeepSleep);

        activity.notify(14_000);
        assert_eq!(power.evaluate(16_000, Some(80)), PowerState::Active);
        assert_eq!(power.evaluate(20_000, Some(80)), PowerState::LightSleep);
        // 读数失败时只看空闲时间
        assert_eq!(power.evaluate(16_000, None), PowerState::Active);
        assert_eq!(power.evaluate(20_000, None), PowerState::LightSleep);
    }

    #[test]
    fn test_external_power_is_latched() {
        let activity = ActivityMonitor::new();
        let mut hw = SimHardware::new(NodeId(0x01));
        hw.battery().set(0);
        let power = PowerManager::new(PowerConfig::DEFAULT, &activity, &mut hw);

        assert!(power.is_externally_powered());
        // 之后读到低电量也不改变判断
        hw.battery().set(3);
        assert_eq!(power.evaluate(600_000, Some(3)), PowerState::Active);
    }

    #[test]
    fn test_light_sleep_ends_on_motion() {
        let activity = ActivityMonitor::new();
        let (mut hw, mut radio) = node();
        hw.battery().set(80);
        let mut power = PowerManager::new(FAST, &activity, &mut hw);
        let mut sink = LogSink;

        let line = hw.wake_line();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            line.trigger();
        });

        hw.delay_ms(60);
        let transition = power.tick(&mut hw, &mut radio, &mut sink);
        trigger.join().unwrap();

        assert_eq!(transition, Transition::LightSlept(WakeCause::External));
        assert_eq!(radio.state(), TransceiverState::Sleep);
        assert_eq!(power.state(), PowerState::Active);
        // 醒来后空闲计时从唤醒时刻重新开始
        assert!(activity.last_activity_ms() >= 60);
        assert_eq!(power.evaluate(activity.last_activity_ms(), Some(80)), PowerState::Active);
    }

    #[test]
    fn test_light_sleep_timer_fallback() {
        let activity = ActivityMonitor::new();
        let (mut hw, mut radio) = node();
        hw.battery().set(80);
        let config = PowerConfig {
            light_sleep_max_ms: 30,
            ..FAST
        };
        let mut power = PowerManager::new(config, &activity, &mut hw);

        hw.delay_ms(60);
        assert_eq!(
            power.tick(&mut hw, &mut radio, &mut LogSink),
            Transition::LightSlept(WakeCause::Timer)
        );
    }

    #[test]
    fn test_critical_battery_requests_deep_sleep() {
        let activity = ActivityMonitor::new();
        let (mut hw, mut radio) = node();
        hw.battery().set(3);
        let mut power = PowerManager::new(FAST, &activity, &mut hw);

        assert_eq!(
            power.tick(&mut hw, &mut radio, &mut LogSink),
            Transition::DeepSleep { max_ms: 1_000 }
        );
        assert_eq!(power.state(), PowerState::DeepSleep);
        assert_eq!(radio.state(), TransceiverState::Sleep);
    }
}
