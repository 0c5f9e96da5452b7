//! 钩子系统（Hook System）
//!
//! 控制循环与外部世界的三个接缝，全部在构造期通过 Builder 注入
//! （显式能力注入，不做运行时替换）：
//!
//! - [`SensorProvider`]: 拉取式传感回调（Real 模式、无桥推送时使用）
//! - [`MotorSink`]: 电机 PWM 下游（两种模式下每 tick 调用）
//! - [`UiChannel`]: UI 推送通道（`config` / `telemetry` 消息）
//!
//! 所有回调失败都被就地吞掉：坏的一个 tick 只降级一个 tick。

use crate::error::HookError;
use serde_json::Value;
use std::sync::Arc;

/// 拉取式传感回调
///
/// 返回松散类型的遥测 map（字段可缺失、可为字符串数字），
/// 控制循环逐字段宽容解析，坏字段保留上一次的值。
pub trait SensorProvider: Send + Sync {
    fn sample(&self) -> Result<Value, HookError>;
}

/// 电机 PWM 下游
///
/// 每 tick 以 `(round(pid_out), round(pid_out))` 调用，两轮同值。
pub trait MotorSink: Send + Sync {
    fn drive(&self, left: i32, right: i32) -> Result<(), HookError>;
}

/// UI 推送通道（push/subscribe 语义）
///
/// - `client = Some(id)`: 发给触发请求的客户端（`get_initial_state` 的应答）
/// - `client = None`: 广播
///
/// 传输本身（WebSocket/轮询）在本 crate 之外实现。
pub trait UiChannel: Send + Sync {
    fn send_message(&self, topic: &str, payload: &Value, client: Option<&str>);
}

/// 注入的回调集合
///
/// 三个能力都可缺省；缺省时对应步骤直接跳过。
#[derive(Default, Clone)]
pub struct RobotHooks {
    pub sensor: Option<Arc<dyn SensorProvider>>,
    pub motor: Option<Arc<dyn MotorSink>>,
    pub ui: Option<Arc<dyn UiChannel>>,
}

impl RobotHooks {
    /// 推送 UI 消息（未挂 UI 时为 no-op）
    pub fn push_ui(&self, topic: &str, payload: &Value, client: Option<&str>) {
        if let Some(ui) = &self.ui {
            ui.send_message(topic, payload, client);
        }
    }
}
