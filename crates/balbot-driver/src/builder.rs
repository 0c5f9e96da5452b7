//! Balbot 构造器
//!
//! 所有外部能力（桥传输、UI 通道、传感/电机回调）在构造期一次性注入，
//! 运行期不可替换。挂了桥传输时构造过程会做一次就绪探测
//! （`get_status`，超时 2 秒），探测失败不阻止构造——桥会在下一次
//! 使用时重新探测。

use crate::bridge::{BridgeLink, BridgeTransport};
use crate::hooks::{MotorSink, RobotHooks, SensorProvider, UiChannel};
use crate::robot::Balbot;
use crate::state::RobotContext;
use balbot_core::RobotConfig;
use std::sync::Arc;
use tracing::debug;

/// Builder（链式配置）
///
/// # Example
///
/// ```rust,no_run
/// use balbot_driver::BalbotBuilder;
///
/// let mut bot = BalbotBuilder::new()
///     .imu_model("mpu6050")
///     .simulated(true)
///     .update_hz(50)
///     .build();
/// bot.start();
/// ```
pub struct BalbotBuilder {
    imu_model: String,
    simulated: bool,
    update_hz: u32,
    bridge: Option<Arc<dyn BridgeTransport>>,
    ui: Option<Arc<dyn UiChannel>>,
    sensor: Option<Arc<dyn SensorProvider>>,
    motor: Option<Arc<dyn MotorSink>>,
}

impl BalbotBuilder {
    pub fn new() -> Self {
        Self {
            imu_model: "mpu6050".to_string(),
            simulated: true,
            update_hz: 15,
            bridge: None,
            ui: None,
            sensor: None,
            motor: None,
        }
    }

    /// IMU 型号标签（默认 "mpu6050"）
    pub fn imu_model(mut self, model: impl Into<String>) -> Self {
        self.imu_model = model.into();
        self
    }

    /// 是否从仿真模式启动（默认 true）
    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    /// 控制循环频率（Hz，下限 1，默认 15）
    pub fn update_hz(mut self, update_hz: u32) -> Self {
        self.update_hz = update_hz;
        self
    }

    /// 挂接硬件桥传输
    pub fn bridge(mut self, transport: Arc<dyn BridgeTransport>) -> Self {
        self.bridge = Some(transport);
        self
    }

    /// 挂接 UI 推送通道
    pub fn ui(mut self, channel: Arc<dyn UiChannel>) -> Self {
        self.ui = Some(channel);
        self
    }

    /// 挂接拉取式传感回调（Real 模式、无桥推送时的数据源）
    pub fn sensor_provider(mut self, provider: Arc<dyn SensorProvider>) -> Self {
        self.sensor = Some(provider);
        self
    }

    /// 挂接电机 PWM 下游
    pub fn motor_sink(mut self, sink: Arc<dyn MotorSink>) -> Self {
        self.motor = Some(sink);
        self
    }

    /// 组装运行时（不启动循环，需显式 `start()`）
    pub fn build(self) -> Balbot {
        let config = RobotConfig::new(self.imu_model, self.simulated, self.update_hz);
        let ctx = Arc::new(RobotContext::new(config));

        let bridge = Arc::new(match self.bridge {
            Some(transport) => BridgeLink::new(transport),
            None => BridgeLink::disconnected(),
        });
        if bridge.is_attached() && !bridge.ensure_ready() {
            debug!("bridge not ready at construction, will re-probe on next use");
        }

        let hooks = RobotHooks {
            sensor: self.sensor,
            motor: self.motor,
            ui: self.ui,
        };

        Balbot::assemble(ctx, hooks, bridge)
    }
}

impl Default for BalbotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
