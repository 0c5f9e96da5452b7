//! 倒立摆物理仿真
//!
//! 阻尼 + 噪声驱动的倒立摆模型，无主动控制时刻意不稳定，
//! 留给 PID 回路去纠正。每个 tick（`dt = 1/update_hz`）：
//!
//! ```text
//! rate  += dt * (-K_ANGLE*angle - K_RATE*rate + uniform(-noise, noise))
//! angle += rate * dt
//! accel  = clamp(angle / 10, -2.0, 2.0)
//! ```
//!
//! 初始姿态 `angle=12.0, rate=0.0`，故意偏离平衡点以便演示恢复过程。

use rand::Rng;

/// 角度回复系数
const K_ANGLE: f64 = 0.25;
/// 角速度阻尼系数
const K_RATE: f64 = 0.03;
/// 默认噪声幅度（均匀分布的半宽）
const DEFAULT_NOISE_AMP: f64 = 0.5;
/// 加速度输出上限（g）
const ACCEL_LIMIT: f64 = 2.0;

/// 摆体姿态
///
/// 由控制循环持有，仿真和硬件中继共用同一份：Real 模式下中继写入的
/// 姿态会在切回 Sim 后成为仿真的起点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumState {
    /// 姿态角（度）
    pub angle_deg: f64,
    /// 角速度（度/秒）
    pub gyro_dps: f64,
}

impl Default for PendulumState {
    fn default() -> Self {
        Self {
            angle_deg: 12.0,
            gyro_dps: 0.0,
        }
    }
}

/// 倒立摆仿真器
#[derive(Debug, Clone)]
pub struct PendulumSim {
    noise_amp: f64,
}

impl PendulumSim {
    pub fn new() -> Self {
        Self {
            noise_amp: DEFAULT_NOISE_AMP,
        }
    }

    /// 指定噪声幅度（0.0 可得到确定性轨迹，用于测试）
    pub fn with_noise_amp(noise_amp: f64) -> Self {
        Self {
            noise_amp: noise_amp.abs(),
        }
    }

    /// 推进一个 tick，返回派生加速度（g）
    pub fn step(&mut self, state: &mut PendulumState, dt: f64) -> f64 {
        let noise = if self.noise_amp > 0.0 {
            rand::thread_rng().gen_range(-self.noise_amp..self.noise_amp)
        } else {
            0.0
        };

        state.gyro_dps += dt * (-K_ANGLE * state.angle_deg - K_RATE * state.gyro_dps + noise);
        state.angle_deg += state.gyro_dps * dt;

        (state.angle_deg / 10.0).clamp(-ACCEL_LIMIT, ACCEL_LIMIT)
    }
}

impl Default for PendulumSim {
    fn default() -> Self {
        Self::new()
    }
}
