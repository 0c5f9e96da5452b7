//! 控制循环
//!
//! 单一后台线程上的定频调度器，每个 tick（`dt = 1/update_hz`）按固定
//! 顺序执行：
//!
//! ```text
//! 读取/仿真传感 → (仅 Sim) PID → 电机下游 → 发布快照 → sleep(dt)
//! ```
//!
//! Real 模式下数据源按优先级取用：桥推送的摄入缓冲 > 拉取式传感回调 >
//! 无源衰减（`rate *= 0.95`，避免停更的数值看起来像冻结）。Real 模式
//! 完全跳过本地 PID，`pid_out` 直接取自推送的 `motor_pwm.left`，闭环
//! 控制委托给硬件桥，这里只镜像遥测。
//!
//! 没有任何重试：坏掉的传感读取或电机回调只降级当前 tick。

use crate::hooks::RobotHooks;
use crate::params::{Parsed, lenient_f64, lenient_i64};
use crate::state::RobotContext;
use balbot_core::{
    LeftRight, Mode, PendulumSim, PendulumState, PidController, TelemetrySnapshot,
    pid::encoder_delta,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

// 使用 spin_sleep 提供微秒级周期精度（相比 std::thread::sleep 的 1-2ms）
use spin_sleep;

/// 无传感数据源时每 tick 的角速度衰减因子
const NO_SOURCE_RATE_DECAY: f64 = 0.95;

/// 循环私有状态
///
/// 姿态（角度/角速度）在两种模式之间共用同一份：Real 模式下中继写入的
/// 姿态在切回 Sim 后直接成为仿真起点。PID 积分器同样跨模式、跨 tick
/// 持久，永不复位。
pub struct LoopState {
    pub(crate) attitude: PendulumState,
    pub(crate) accel_g: f64,
    pub(crate) encoders: LeftRight<i64>,
    pub(crate) pid_out: f64,
    pid: PidController,
    sim: PendulumSim,
}

impl LoopState {
    pub fn new() -> Self {
        Self::with_sim(PendulumSim::new())
    }

    /// 注入仿真器（测试用 `PendulumSim::with_noise_amp(0.0)` 得到确定性轨迹）
    pub fn with_sim(sim: PendulumSim) -> Self {
        Self {
            attitude: PendulumState::default(),
            accel_g: 0.0,
            encoders: LeftRight::uniform(0),
            pid_out: 0.0,
            pid: PidController::new(),
            sim,
        }
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前 UNIX 时间（秒）
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// 拉取式传感数据的逐字段宽容合并
///
/// 每个字段独立解析，坏字段保留上一次的值。编码器支持嵌套
/// (`encoders: {left, right}`) 与扁平 (`enc_left` / `enc_right`) 两种
/// 形态，格式良好的嵌套形态优先。
fn merge_sensor_fields(state: &mut LoopState, data: &Value) {
    if let Parsed::Ok(v) = lenient_f64(data, "angle_deg") {
        state.attitude.angle_deg = v;
    }
    if let Parsed::Ok(v) = lenient_f64(data, "gyro_dps") {
        state.attitude.gyro_dps = v;
    }
    if let Parsed::Ok(v) = lenient_f64(data, "accel_g") {
        state.accel_g = v;
    }

    match data.get("encoders") {
        Some(nested) if nested.is_object() => {
            if let Parsed::Ok(v) = lenient_i64(nested, "left") {
                state.encoders.left = v;
            }
            if let Parsed::Ok(v) = lenient_i64(nested, "right") {
                state.encoders.right = v;
            }
        },
        _ => {
            if let Parsed::Ok(v) = lenient_i64(data, "enc_left") {
                state.encoders.left = v;
            }
            if let Parsed::Ok(v) = lenient_i64(data, "enc_right") {
                state.encoders.right = v;
            }
        },
    }
}

/// 执行一个 tick
///
/// 从循环体中拆出便于确定性测试；语义与循环内完全一致。
pub fn run_tick(ctx: &RobotContext, hooks: &RobotHooks, state: &mut LoopState, dt: f64) {
    // 每 tick 读取一次配置（标量字段，命令线程并发写入是良性的）
    let (mode, gains, setpoint, imu_model) = {
        let config = ctx.config.read();
        (
            config.mode,
            config.pid,
            config.setpoint,
            config.imu_model.clone(),
        )
    };

    match mode {
        Mode::Sim => {
            state.accel_g = state.sim.step(&mut state.attitude, dt);

            state.pid_out = state
                .pid
                .update(&gains, setpoint, state.attitude.angle_deg, dt);

            // 仿真里程计：与输出成正比累积
            let delta = encoder_delta(state.pid_out);
            state.encoders.left += delta;
            state.encoders.right += delta;
        },
        Mode::Real => {
            if let Some(hw) = ctx.ingest_copy() {
                // 桥推送优先于拉取回调
                state.attitude.angle_deg = hw.angle_deg;
                state.attitude.gyro_dps = hw.gyro_dps;
                state.accel_g = hw.accel_g;
                state.encoders = hw.encoders;
                state.pid_out = f64::from(hw.motor_pwm.left);
            } else if let Some(sensor) = &hooks.sensor {
                match sensor.sample() {
                    Ok(data) => merge_sensor_fields(state, &data),
                    Err(err) => warn!("sensor provider failed, keeping previous values: {err}"),
                }
            } else {
                // 无数据源：衰减角速度，避免陈旧值看起来像冻结
                state.attitude.gyro_dps *= NO_SOURCE_RATE_DECAY;
            }
            // Real 模式跳过本地 PID；无推送时 pid_out 保持上一次的值
        },
    }

    if let Some(motor) = &hooks.motor {
        let pwm = state.pid_out.round() as i32;
        if let Err(err) = motor.drive(pwm, pwm) {
            warn!("motor sink failed, ignoring: {err}");
        }
    }

    let snapshot = TelemetrySnapshot {
        ts: unix_now(),
        angle_deg: state.attitude.angle_deg,
        gyro_dps: state.attitude.gyro_dps,
        accel_g: state.accel_g,
        pid: gains,
        setpoint,
        motor_pwm: LeftRight::uniform(state.pid_out.round() as i32),
        encoders: state.encoders,
        mode,
        imu_model,
    };

    if let Ok(payload) = serde_json::to_value(&snapshot) {
        hooks.push_ui("telemetry", &payload, None);
    }
    ctx.publish(snapshot);
}

/// 循环入口（专用后台线程上运行，直到观察到停止标志）
pub fn control_loop(ctx: Arc<RobotContext>, hooks: RobotHooks, update_hz: u32) {
    let dt = 1.0 / f64::from(update_hz.max(1));
    let period = Duration::from_secs_f64(dt);
    let mut state = LoopState::new();

    info!("control loop started at {} Hz", update_hz.max(1));

    while !ctx.stop.load(Ordering::Relaxed) {
        run_tick(&ctx, &hooks, &mut state, dt);
        spin_sleep::sleep(period);
    }

    info!("control loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;
    use crate::hooks::{MotorSink, SensorProvider};
    use crate::state::HardwareIngest;
    use balbot_core::RobotConfig;
    use parking_lot::Mutex;
    use serde_json::json;

    fn sim_ctx(update_hz: u32) -> RobotContext {
        RobotContext::new(RobotConfig::new("mpu6050", true, update_hz))
    }

    fn real_ctx() -> RobotContext {
        RobotContext::new(RobotConfig::new("mpu6050", false, 15))
    }

    fn quiet_state() -> LoopState {
        LoopState::with_sim(PendulumSim::with_noise_amp(0.0))
    }

    struct CapturingSink {
        calls: Mutex<Vec<(i32, i32)>>,
        fail: bool,
    }

    impl MotorSink for CapturingSink {
        fn drive(&self, left: i32, right: i32) -> Result<(), HookError> {
            if self.fail {
                return Err(HookError::Motor("pwm bus gone".into()));
            }
            self.calls.lock().push((left, right));
            Ok(())
        }
    }

    struct StaticProvider(Value);

    impl SensorProvider for StaticProvider {
        fn sample(&self) -> Result<Value, HookError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    impl SensorProvider for FailingProvider {
        fn sample(&self) -> Result<Value, HookError> {
            Err(HookError::Sensor("i2c timeout".into()))
        }
    }

    #[test]
    fn test_sim_first_tick_deterministic() {
        let ctx = sim_ctx(15);
        let hooks = RobotHooks::default();
        let mut state = quiet_state();
        let dt = 1.0 / 15.0;

        run_tick(&ctx, &hooks, &mut state, dt);

        let snap = ctx.telemetry_snapshot();
        assert!((snap.gyro_dps - (-0.2)).abs() < 1e-9);
        assert!((snap.angle_deg - (12.0 - 0.2 / 15.0)).abs() < 1e-9);
        assert_eq!(snap.mode, Mode::Sim);
        assert_eq!(snap.imu_model, "mpu6050");
        assert!(snap.ts > 0.0);
    }

    #[test]
    fn test_sim_pwm_always_within_limits() {
        let ctx = sim_ctx(15);
        // 离谱的增益也不能突破 ±255
        ctx.config.write().pid.p = 1e6;
        let hooks = RobotHooks::default();
        let mut state = quiet_state();
        for _ in 0..50 {
            run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);
            let snap = ctx.telemetry_snapshot();
            assert!((-255..=255).contains(&snap.motor_pwm.left));
            assert!((-255..=255).contains(&snap.motor_pwm.right));
        }
    }

    #[test]
    fn test_sim_encoders_accumulate() {
        let ctx = sim_ctx(15);
        let hooks = RobotHooks::default();
        let mut state = quiet_state();

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);
        let expected = encoder_delta(state.pid_out);
        let snap = ctx.telemetry_snapshot();
        assert_eq!(snap.encoders.left, expected);
        assert_eq!(snap.encoders.right, expected);
        assert_ne!(expected, 0, "p=12 at 12 deg should move the encoders");
    }

    #[test]
    fn test_real_push_source_wins_and_skips_pid() {
        let ctx = real_ctx();
        *ctx.ingest.lock() = Some(HardwareIngest {
            angle_deg: 2.5,
            gyro_dps: -1.0,
            accel_g: 0.25,
            motor_pwm: LeftRight::uniform(77),
            encoders: LeftRight { left: 10, right: 11 },
            mode: "real".to_string(),
            imu_model: "bmi270".to_string(),
        });
        let hooks = RobotHooks::default();
        let mut state = quiet_state();

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        let snap = ctx.telemetry_snapshot();
        assert_eq!(snap.angle_deg, 2.5);
        assert_eq!(snap.gyro_dps, -1.0);
        assert_eq!(snap.motor_pwm, LeftRight::uniform(77));
        assert_eq!(snap.encoders, LeftRight { left: 10, right: 11 });
        assert_eq!(snap.mode, Mode::Real);
        // imu_model 仍来自本地配置, 推送里的型号只存在缓冲里
        assert_eq!(snap.imu_model, "mpu6050");
    }

    #[test]
    fn test_real_pull_merge_is_lenient_per_field() {
        let ctx = real_ctx();
        let hooks = RobotHooks {
            sensor: Some(Arc::new(StaticProvider(json!({
                "angle_deg": "not-a-number",
                "gyro_dps": 3.0,
                "encoders": {"left": 42, "right": "bad"},
            })))),
            ..Default::default()
        };
        let mut state = quiet_state();
        state.attitude.angle_deg = 5.0;
        state.encoders.right = 7;

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        let snap = ctx.telemetry_snapshot();
        // 坏字段保留旧值, 好字段生效
        assert_eq!(snap.angle_deg, 5.0);
        assert_eq!(snap.gyro_dps, 3.0);
        assert_eq!(snap.encoders.left, 42);
        assert_eq!(snap.encoders.right, 7);
    }

    #[test]
    fn test_real_pull_flat_encoder_fallback() {
        let ctx = real_ctx();
        let hooks = RobotHooks {
            sensor: Some(Arc::new(StaticProvider(json!({
                "enc_left": 100, "enc_right": 200,
            })))),
            ..Default::default()
        };
        let mut state = quiet_state();

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        let snap = ctx.telemetry_snapshot();
        assert_eq!(snap.encoders, LeftRight { left: 100, right: 200 });
    }

    #[test]
    fn test_real_provider_failure_keeps_previous_tick() {
        let ctx = real_ctx();
        let hooks = RobotHooks {
            sensor: Some(Arc::new(FailingProvider)),
            ..Default::default()
        };
        let mut state = quiet_state();
        state.attitude.angle_deg = 4.0;
        state.attitude.gyro_dps = 2.0;

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        let snap = ctx.telemetry_snapshot();
        assert_eq!(snap.angle_deg, 4.0);
        assert_eq!(snap.gyro_dps, 2.0);
    }

    #[test]
    fn test_real_no_source_decays_rate() {
        let ctx = real_ctx();
        let hooks = RobotHooks::default();
        let mut state = quiet_state();
        state.attitude.gyro_dps = 10.0;

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);
        assert!((state.attitude.gyro_dps - 9.5).abs() < 1e-9);
        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);
        assert!((state.attitude.gyro_dps - 9.025).abs() < 1e-9);
    }

    #[test]
    fn test_motor_sink_called_both_modes_and_failure_swallowed() {
        let sink = Arc::new(CapturingSink {
            calls: Mutex::new(Vec::new()),
            fail: false,
        });
        let hooks = RobotHooks {
            motor: Some(sink.clone()),
            ..Default::default()
        };

        let ctx = sim_ctx(15);
        let mut state = quiet_state();
        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        ctx.config.write().mode = Mode::Real;
        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        let calls = sink.calls.lock();
        assert_eq!(calls.len(), 2);
        // 两轮永远同值
        for (l, r) in calls.iter() {
            assert_eq!(l, r);
        }
        drop(calls);

        // 失败的 sink 不影响发布
        let failing = RobotHooks {
            motor: Some(Arc::new(CapturingSink {
                calls: Mutex::new(Vec::new()),
                fail: true,
            })),
            ..Default::default()
        };
        run_tick(&ctx, &failing, &mut state, 1.0 / 15.0);
        assert!(ctx.telemetry_snapshot().ts > 0.0);
    }

    #[test]
    fn test_real_to_sim_attitude_continuity() {
        let ctx = real_ctx();
        *ctx.ingest.lock() = Some(HardwareIngest {
            angle_deg: 3.0,
            gyro_dps: 0.0,
            accel_g: 0.3,
            motor_pwm: LeftRight::uniform(0),
            encoders: LeftRight::uniform(0),
            mode: "real".to_string(),
            imu_model: "mpu6050".to_string(),
        });
        let hooks = RobotHooks::default();
        let mut state = quiet_state();

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);
        assert_eq!(state.attitude.angle_deg, 3.0);

        // 切回 Sim: 仿真从中继写入的姿态继续, 而不是从 12.0 重新开始
        ctx.config.write().mode = Mode::Sim;
        let dt = 1.0 / 15.0;
        run_tick(&ctx, &hooks, &mut state, dt);

        let expected_rate = dt * (-0.25 * 3.0);
        let snap = ctx.telemetry_snapshot();
        assert!((snap.gyro_dps - expected_rate).abs() < 1e-9);
        assert!((snap.angle_deg - (3.0 + expected_rate * dt)).abs() < 1e-9);
    }

    #[test]
    fn test_ingest_not_consumed_by_tick() {
        let ctx = real_ctx();
        *ctx.ingest.lock() = Some(HardwareIngest {
            angle_deg: 1.0,
            gyro_dps: 1.0,
            accel_g: 0.1,
            motor_pwm: LeftRight::uniform(5),
            encoders: LeftRight::uniform(1),
            mode: "real".to_string(),
            imu_model: "mpu6050".to_string(),
        });
        let hooks = RobotHooks::default();
        let mut state = quiet_state();

        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);
        run_tick(&ctx, &hooks, &mut state, 1.0 / 15.0);

        // 最新值语义: 同一份推送服务于后续所有 tick
        assert_eq!(ctx.telemetry_snapshot().angle_deg, 1.0);
        assert!(ctx.ingest_copy().is_some());
    }
}
