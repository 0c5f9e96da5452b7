//! 离散 PID 控制器
//!
//! ```text
//! error      = setpoint - angle
//! integral  += error * dt
//! derivative = (error - last_error) / dt
//! output     = clamp(p*error + i*integral + d*derivative, -255, 255)
//! ```
//!
//! 刻意不做积分限幅 / 抗饱和：积分与 `last_error` 跨 tick 持久累积，
//! 模式切换、目标角变化都不会复位（与原始控制器一致的取舍）。
//! 仅在仿真模式下驱动执行器；Real 模式闭环在硬件桥侧完成。

use crate::config::PidGains;
use crate::telemetry::clamp_pwm;

/// 仿真里程计增益：编码器每 tick 累加 `(output * 0.12) as i64`
pub const ENCODER_GAIN: f64 = 0.12;

/// PID 积分器状态
#[derive(Debug, Clone, Default)]
pub struct PidController {
    integral: f64,
    last_error: f64,
}

impl PidController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 执行一步 PID 计算，返回夹持到 [-255, 255] 的输出
    ///
    /// `dt` 必须为正（由调用方的 `update_hz.max(1)` 保证）。
    pub fn update(&mut self, gains: &PidGains, setpoint: f64, angle_deg: f64, dt: f64) -> f64 {
        let error = setpoint - angle_deg;
        self.integral += error * dt;
        let derivative = (error - self.last_error) / dt;
        self.last_error = error;

        clamp_pwm(gains.p * error + gains.i * self.integral + gains.d * derivative)
    }

    /// 当前积分值（调试用）
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

/// 一个 tick 的仿真里程计增量
pub fn encoder_delta(output: f64) -> i64 {
    (output * ENCODER_GAIN) as i64
}
