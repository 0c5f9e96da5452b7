//! 机器人配置记录
//!
//! `RobotConfig` 由进程启动时创建，之后只通过命令路由（`balbot-driver` 的
//! `CommandRouter`）的校验 setter 修改，进程退出前不会销毁。
//!
//! 不变量：
//! - `axis_sign`、`motor_invert.*`、`encoder_invert.*` 恒 ∈ {-1, 1}
//! - `mode` ∈ {Sim, Real}
//! - `update_hz` ≥ 1

use serde::{Deserialize, Serialize};
use std::fmt;

/// 运行模式
///
/// - `Sim`: 内部物理仿真 + 本地 PID 闭环
/// - `Real`: 传感/执行全部委托给硬件桥（MCU），本地循环只镜像遥测
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// 仿真模式（默认）
    #[default]
    Sim,
    /// 硬件中继模式
    Real,
}

impl Mode {
    /// 从外部字符串解析模式
    ///
    /// 只有严格等于 `"real"` 才进入 Real，其余一律 Sim（与原始协议一致）。
    pub fn from_label(label: &str) -> Self {
        if label == "real" { Self::Real } else { Self::Sim }
    }

    /// 是否为仿真模式
    pub fn is_sim(self) -> bool {
        self == Self::Sim
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sim => write!(f, "sim"),
            Self::Real => write!(f, "real"),
        }
    }
}

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            p: 12.0,
            i: 0.0,
            d: 0.4,
        }
    }
}

/// 左右轮成对值（PWM、编码器计数、极性翻转均复用此结构）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeftRight<T> {
    pub left: T,
    pub right: T,
}

impl<T: Copy> LeftRight<T> {
    /// 左右同值
    pub fn uniform(value: T) -> Self {
        Self {
            left: value,
            right: value,
        }
    }
}

/// 符号强制
///
/// 外部输入的极性参数一律折叠到 {-1, 1}：负数为 -1，其余（含 0）为 1。
pub fn sign_of(value: i64) -> i32 {
    if value < 0 { -1 } else { 1 }
}

/// 机器人配置（可变记录）
///
/// 字段均为简单标量，命令线程与控制循环之间不做多字段事务保证，
/// 由 `balbot-driver` 用 RwLock 包裹后共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// IMU 型号（如 "mpu6050"，仅作标签透传给硬件桥）
    pub imu_model: String,
    /// PID 增益
    pub pid: PidGains,
    /// 平衡目标角（度）
    pub setpoint: f64,
    /// 平衡轴（自由字符串，仅校验非空，典型值 "pitch"/"roll"）
    pub axis_mode: String,
    /// 平衡轴符号，∈ {-1, 1}
    pub axis_sign: i32,
    /// 电机极性翻转，每侧 ∈ {-1, 1}
    pub motor_invert: LeftRight<i32>,
    /// 编码器极性翻转，每侧 ∈ {-1, 1}
    pub encoder_invert: LeftRight<i32>,
    /// 运行模式
    pub mode: Mode,
    /// 控制循环频率（Hz，下限 1）
    pub update_hz: u32,
}

impl RobotConfig {
    /// 创建启动配置
    ///
    /// 默认值：p=12.0, i=0.0, d=0.4, setpoint=0.0, axis_mode="pitch",
    /// axis_sign=1，所有极性为 1，mode 由 `simulated` 推导。
    pub fn new(imu_model: impl Into<String>, simulated: bool, update_hz: u32) -> Self {
        Self {
            imu_model: imu_model.into(),
            pid: PidGains::default(),
            setpoint: 0.0,
            axis_mode: "pitch".to_string(),
            axis_sign: 1,
            motor_invert: LeftRight::uniform(1),
            encoder_invert: LeftRight::uniform(1),
            mode: if simulated { Mode::Sim } else { Mode::Real },
            update_hz: update_hz.max(1),
        }
    }

    /// tick 周期（秒）
    pub fn dt(&self) -> f64 {
        1.0 / f64::from(self.update_hz.max(1))
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self::new("mpu6050", true, 15)
    }
}
