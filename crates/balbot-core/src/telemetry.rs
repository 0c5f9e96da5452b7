//! 遥测快照
//!
//! 每个 tick 产生一个不可变的 `TelemetrySnapshot`，通过整体替换发布
//! （`balbot-driver` 用 ArcSwap 做原子指针交换），读者永远看到一个
//! 内部一致的快照。只保留最新值，不保留历史。

use crate::config::{LeftRight, Mode, PidGains};
use serde::{Deserialize, Serialize};

/// PWM 输出上限（绝对值）
pub const PWM_LIMIT: f64 = 255.0;

/// 遥测快照（不可变值）
///
/// 字段名即 UI/HTTP 侧的 wire 格式；`pid` 与 `setpoint` 是发布时刻
/// 配置的拷贝，保证快照内部自洽。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// 发布时刻（UNIX 秒）
    pub ts: f64,
    /// 姿态角（度）
    pub angle_deg: f64,
    /// 角速度（度/秒）
    pub gyro_dps: f64,
    /// 加速度（g）
    pub accel_g: f64,
    /// PID 增益拷贝
    pub pid: PidGains,
    /// 目标角拷贝
    pub setpoint: f64,
    /// 电机 PWM，每侧 ∈ [-255, 255]
    pub motor_pwm: LeftRight<i32>,
    /// 编码器计数
    pub encoders: LeftRight<i64>,
    /// 发布时刻的运行模式
    pub mode: Mode,
    /// IMU 型号
    pub imu_model: String,
}

impl Default for TelemetrySnapshot {
    /// 首个 tick 之前的初始快照（全零）
    fn default() -> Self {
        Self {
            ts: 0.0,
            angle_deg: 0.0,
            gyro_dps: 0.0,
            accel_g: 0.0,
            pid: PidGains::default(),
            setpoint: 0.0,
            motor_pwm: LeftRight::uniform(0),
            encoders: LeftRight::uniform(0),
            mode: Mode::Sim,
            imu_model: String::new(),
        }
    }
}

/// PWM 值夹持到 [-255, 255]
pub fn clamp_pwm(value: f64) -> f64 {
    value.clamp(-PWM_LIMIT, PWM_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_zeroed() {
        let snap = TelemetrySnapshot::default();
        assert_eq!(snap.ts, 0.0);
        assert_eq!(snap.angle_deg, 0.0);
        assert_eq!(snap.motor_pwm, LeftRight::uniform(0));
        assert_eq!(snap.encoders, LeftRight::uniform(0));
        assert_eq!(snap.mode, Mode::Sim);
    }

    #[test]
    fn test_clamp_pwm() {
        assert_eq!(clamp_pwm(1000.0), 255.0);
        assert_eq!(clamp_pwm(-1000.0), -255.0);
        assert_eq!(clamp_pwm(42.5), 42.5);
    }

    #[test]
    fn test_snapshot_wire_format() {
        let snap = TelemetrySnapshot {
            angle_deg: 12.0,
            gyro_dps: -0.2,
            ..Default::default()
        };
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["angle_deg"], 12.0);
        assert_eq!(value["gyro_dps"], -0.2);
        assert_eq!(value["motor_pwm"]["left"], 0);
        assert_eq!(value["mode"], "sim");
    }
}
