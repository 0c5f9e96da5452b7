//! 共享状态上下文
//!
//! 运行时的三块共享数据，按访问模式选择同步原语：
//!
//! - 配置：`RwLock<RobotConfig>`（命令线程写，循环线程每 tick 读，
//!   字段均为标量，不保证多字段事务）
//! - 遥测：`ArcSwap<TelemetrySnapshot>`（每 tick 整体替换，wait-free 读）
//! - 硬件摄入缓冲：`Mutex<Option<HardwareIngest>>`（唯一需要互斥的结构，
//!   桥入站线程写、循环线程读；最新值语义，读走拷贝、不消费）

use arc_swap::ArcSwap;
use balbot_core::{LeftRight, RobotConfig, TelemetrySnapshot};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// 桥推送的最新一份硬件遥测
///
/// `mode` / `imu_model` 来自对端，原样保存；控制循环只消费
/// 姿态、加速度、PWM 与编码器字段。
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareIngest {
    pub angle_deg: f64,
    pub gyro_dps: f64,
    pub accel_g: f64,
    pub motor_pwm: LeftRight<i32>,
    pub encoders: LeftRight<i64>,
    pub mode: String,
    pub imu_model: String,
}

/// 机器人共享上下文
pub struct RobotContext {
    /// 配置（命令路由写入，循环每 tick 读取）
    pub config: RwLock<RobotConfig>,
    /// 当前遥测快照（任意时刻恰好一份 "current"）
    pub telemetry: ArcSwap<TelemetrySnapshot>,
    /// 硬件摄入缓冲（push 优先于 pull 的数据源）
    pub ingest: Mutex<Option<HardwareIngest>>,
    /// 协作式停止标志
    pub stop: AtomicBool,
}

impl RobotContext {
    pub fn new(config: RobotConfig) -> Self {
        Self {
            config: RwLock::new(config),
            telemetry: ArcSwap::from_pointee(TelemetrySnapshot::default()),
            ingest: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    /// 当前快照的拷贝（无锁读取）
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.load().as_ref().clone()
    }

    /// 发布新快照（整体替换）
    pub fn publish(&self, snapshot: TelemetrySnapshot) {
        self.telemetry.store(Arc::new(snapshot));
    }

    /// 摄入缓冲的拷贝（不消费：连续 tick 看到同一份最新值）
    pub fn ingest_copy(&self) -> Option<HardwareIngest> {
        self.ingest.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balbot_core::Mode;

    #[test]
    fn test_context_initial_state() {
        let ctx = RobotContext::new(RobotConfig::default());
        assert_eq!(ctx.telemetry_snapshot(), TelemetrySnapshot::default());
        assert!(ctx.ingest_copy().is_none());
        assert_eq!(ctx.config.read().mode, Mode::Sim);
    }

    #[test]
    fn test_publish_replaces_wholesale() {
        let ctx = RobotContext::new(RobotConfig::default());
        let snap = TelemetrySnapshot {
            angle_deg: 3.5,
            ..Default::default()
        };
        ctx.publish(snap.clone());
        assert_eq!(ctx.telemetry_snapshot(), snap);
    }

    #[test]
    fn test_ingest_copy_does_not_consume() {
        let ctx = RobotContext::new(RobotConfig::default());
        *ctx.ingest.lock() = Some(HardwareIngest {
            angle_deg: 1.0,
            gyro_dps: 2.0,
            accel_g: 0.1,
            motor_pwm: LeftRight::uniform(40),
            encoders: LeftRight { left: 5, right: 6 },
            mode: "real".to_string(),
            imu_model: "mpu6050".to_string(),
        });

        let first = ctx.ingest_copy();
        let second = ctx.ingest_copy();
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
