//! 命令路由
//!
//! 接收 UI / HTTP 侧的外部命令（消息名寻址，载荷为松散 JSON），把校验
//! 后的变更写入配置，并在 Real 模式下转发给硬件桥。契约：
//!
//! - 解析失败从不向调用方报错，操作静默变为 no-op，先前状态不变；
//!   唯一可观察的反馈是返回的当前配置
//! - 多数 setter 对不可解析输入整体放弃；极性类 setter
//!   （`set_axis_sign` / `set_motor_invert` / `set_encoder_invert`）
//!   对不可解析输入强制 +1 —— 这是沿用下来的不对称行为，刻意保留
//! - 每个 setter 结束时都把完整配置推送给 UI（幂等，未变更时推送也安全）
//!
//! 命令处理器在调用方线程上同步执行，只写配置并触发桥通知，
//! 从不阻塞控制循环。

use crate::bridge::BridgeLink;
use crate::hooks::RobotHooks;
use crate::params::{Parsed, lenient_f64, lenient_i64, non_empty_str};
use crate::state::RobotContext;
use balbot_core::{Mode, RobotConfig, TelemetrySnapshot, sign_of};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// `motor_test` 的 PWM 工作范围
const MOTOR_TEST_PWM: (i64, i64) = (-255, 255);
/// `motor_test` 的时长范围（毫秒）
const MOTOR_TEST_DURATION_MS: (i64, i64) = (100, 5000);
/// `kick` 缺省角度（度）
const DEFAULT_KICK_ANGLE: f64 = 30.0;
/// `kick` 注入的角速度幅值（度/秒），符号跟随角度
const KICK_GYRO_DPS: f64 = 5.0;

/// `get_state` 返回的组合视图
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub config: RobotConfig,
    pub telemetry: TelemetrySnapshot,
}

/// 命令路由器
///
/// 持有共享上下文、桥链路与 UI 通道；自身无状态，可被多个
/// 传输线程并发调用。
pub struct CommandRouter {
    ctx: Arc<RobotContext>,
    bridge: Arc<BridgeLink>,
    hooks: RobotHooks,
}

impl CommandRouter {
    pub fn new(ctx: Arc<RobotContext>, bridge: Arc<BridgeLink>, hooks: RobotHooks) -> Self {
        Self { ctx, bridge, hooks }
    }

    /// 按消息名分发 UI 命令
    pub fn dispatch(&self, topic: &str, payload: &Value, client: Option<&str>) {
        match topic {
            "get_initial_state" => self.get_initial_state(client),
            "set_pid" => {
                self.set_pid(payload);
            },
            "set_setpoint" => {
                self.set_setpoint(payload);
            },
            "set_imu_model" => {
                self.set_imu_model(payload);
            },
            "set_axis_mode" => {
                self.set_axis_mode(payload);
            },
            "set_axis_sign" => {
                self.set_axis_sign(payload);
            },
            "set_motor_invert" => {
                self.set_motor_invert(payload);
            },
            "set_encoder_invert" => {
                self.set_encoder_invert(payload);
            },
            "motor_test" => {
                self.motor_test(payload);
            },
            "stop_motor_test" => {
                self.stop_motor_test();
            },
            "set_mode" => {
                self.set_mode(payload);
            },
            "kick" => {
                self.kick(payload);
            },
            other => warn!("unknown command topic `{other}`, ignoring"),
        }
    }

    /// 当前配置的拷贝
    pub fn current_config(&self) -> RobotConfig {
        self.ctx.config.read().clone()
    }

    /// 组合视图：配置 + 最新遥测
    pub fn get_state(&self) -> StateView {
        StateView {
            config: self.current_config(),
            telemetry: self.ctx.telemetry_snapshot(),
        }
    }

    /// `get_initial_state`: 向请求方推送当前配置
    pub fn get_initial_state(&self, client: Option<&str>) {
        self.push_config(client);
    }

    /// `set_pid(p?, i?, d?)`
    ///
    /// 出现的字段逐个解析；任一字段不可解析则整次调用作废
    /// （单次调用内不做部分应用），且不向桥转发。Real 模式下成功后
    /// 把三个当前增益一起转发（而非只发变更的）。
    pub fn set_pid(&self, payload: &Value) -> RobotConfig {
        let p = lenient_f64(payload, "p");
        let i = lenient_f64(payload, "i");
        let d = lenient_f64(payload, "d");
        let dropped = p.is_invalid() || i.is_invalid() || d.is_invalid();

        if !dropped {
            let mut config = self.ctx.config.write();
            if let Parsed::Ok(v) = p {
                config.pid.p = v;
            }
            if let Parsed::Ok(v) = i {
                config.pid.i = v;
            }
            if let Parsed::Ok(v) = d {
                config.pid.d = v;
            }
        } else {
            debug!("set_pid: unparsable field, dropping the whole call");
        }

        let config = self.current_config();
        if !dropped && config.mode == Mode::Real {
            self.notify_pid(&config);
        }
        self.push_config(None);
        config
    }

    /// `set_setpoint(setpoint?)`
    ///
    /// 坏值整次作废且不转发；缺失时仍把当前值转发一遍（轻量重同步）。
    pub fn set_setpoint(&self, payload: &Value) -> RobotConfig {
        let parsed = lenient_f64(payload, "setpoint");
        if let Parsed::Ok(v) = parsed {
            self.ctx.config.write().setpoint = v;
        }

        let config = self.current_config();
        if !parsed.is_invalid() && config.mode == Mode::Real {
            self.bridge
                .notify("set_setpoint", &[json!(config.setpoint)]);
        }
        self.push_config(None);
        config
    }

    /// `set_imu_model(imu_model?)`: 仅非空字符串生效，生效后才转发
    pub fn set_imu_model(&self, payload: &Value) -> RobotConfig {
        let applied = if let Some(model) = non_empty_str(payload, "imu_model") {
            self.ctx.config.write().imu_model = model.to_string();
            true
        } else {
            false
        };

        let config = self.current_config();
        if applied && config.mode == Mode::Real {
            self.bridge
                .notify("set_imu_model", &[json!(config.imu_model)]);
        }
        self.push_config(None);
        config
    }

    /// `set_axis_mode(axis_mode?)`: 仅非空字符串生效
    ///
    /// 成功后把 `set_axis_mode` 与 `set_axis_sign`（当前值）一并转发，
    /// 让桥侧的轴坐标系保持一致。
    pub fn set_axis_mode(&self, payload: &Value) -> RobotConfig {
        if let Some(axis) = non_empty_str(payload, "axis_mode") {
            self.ctx.config.write().axis_mode = axis.to_string();

            let config = self.current_config();
            if config.mode == Mode::Real {
                self.bridge
                    .notify("set_axis_mode", &[json!(config.axis_mode)]);
                self.bridge
                    .notify("set_axis_sign", &[json!(config.axis_sign)]);
            }
        }

        self.push_config(None);
        self.current_config()
    }

    /// `set_axis_sign(sign?)`
    ///
    /// 缺失 → no-op 且不转发；存在但不可解析 → 强制 +1（与其他
    /// setter 的静默放弃不同，算一次成功写入）；可解析 → 取整数符号。
    pub fn set_axis_sign(&self, payload: &Value) -> RobotConfig {
        let parsed = lenient_i64(payload, "axis_sign");
        match parsed {
            Parsed::Missing => {},
            Parsed::Invalid => self.ctx.config.write().axis_sign = 1,
            Parsed::Ok(v) => self.ctx.config.write().axis_sign = sign_of(v),
        }

        let config = self.current_config();
        if !matches!(parsed, Parsed::Missing) && config.mode == Mode::Real {
            self.bridge
                .notify("set_axis_sign", &[json!(config.axis_sign)]);
        }
        self.push_config(None);
        config
    }

    /// `set_motor_invert(left?, right?)`: 每侧独立，强制规则同 axis_sign
    pub fn set_motor_invert(&self, payload: &Value) -> RobotConfig {
        {
            let mut config = self.ctx.config.write();
            apply_side(&mut config.motor_invert.left, lenient_i64(payload, "left"));
            apply_side(&mut config.motor_invert.right, lenient_i64(payload, "right"));
        }

        let config = self.current_config();
        if config.mode == Mode::Real {
            self.notify_motor_invert(&config);
        }
        self.push_config(None);
        config
    }

    /// `set_encoder_invert(left?, right?)`
    pub fn set_encoder_invert(&self, payload: &Value) -> RobotConfig {
        {
            let mut config = self.ctx.config.write();
            apply_side(
                &mut config.encoder_invert.left,
                lenient_i64(payload, "left"),
            );
            apply_side(
                &mut config.encoder_invert.right,
                lenient_i64(payload, "right"),
            );
        }

        let config = self.current_config();
        if config.mode == Mode::Real {
            self.notify_encoder_invert(&config);
        }
        self.push_config(None);
        config
    }

    /// `motor_test(left?, right?, duration_ms?)`
    ///
    /// 仿真模式下 no-op；Real 模式下夹持后整体转发——纯透传命令，
    /// 永不写入本地状态。
    pub fn motor_test(&self, payload: &Value) -> RobotConfig {
        let config = self.current_config();
        if config.mode.is_sim() {
            return config;
        }

        let left = lenient_i64(payload, "left");
        let right = lenient_i64(payload, "right");
        let duration = lenient_i64(payload, "duration_ms");
        if left.is_invalid() || right.is_invalid() || duration.is_invalid() {
            return config;
        }

        let left = unwrap_or(left, 0).clamp(MOTOR_TEST_PWM.0, MOTOR_TEST_PWM.1);
        let right = unwrap_or(right, 0).clamp(MOTOR_TEST_PWM.0, MOTOR_TEST_PWM.1);
        let duration_ms =
            unwrap_or(duration, 1000).clamp(MOTOR_TEST_DURATION_MS.0, MOTOR_TEST_DURATION_MS.1);

        self.bridge.notify(
            "motor_test",
            &[json!(left), json!(right), json!(duration_ms)],
        );
        config
    }

    /// `stop_motor_test()`: 仿真模式下 no-op
    pub fn stop_motor_test(&self) -> RobotConfig {
        let config = self.current_config();
        if config.mode.is_sim() {
            return config;
        }
        self.bridge.notify("stop_motor_test", &[]);
        config
    }

    /// `set_mode(mode?)`
    ///
    /// `mode = Real` 当且仅当输入串等于 `"real"`。切入 Real 触发全量
    /// 重同步，按固定顺序重发 `set_mode`、`set_pid`、`set_setpoint`、
    /// `set_imu_model`、`set_axis_mode`、`set_axis_sign`、
    /// `set_motor_invert`、`set_encoder_invert`；切入 Sim 只发 `set_mode`。
    pub fn set_mode(&self, payload: &Value) -> RobotConfig {
        let label = payload
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or("sim");
        let mode = Mode::from_label(label);
        self.ctx.config.write().mode = mode;

        let config = self.current_config();
        self.bridge.notify("set_mode", &[json!(mode.to_string())]);
        if mode == Mode::Real {
            self.notify_pid(&config);
            self.bridge
                .notify("set_setpoint", &[json!(config.setpoint)]);
            self.bridge
                .notify("set_imu_model", &[json!(config.imu_model)]);
            self.bridge
                .notify("set_axis_mode", &[json!(config.axis_mode)]);
            self.bridge
                .notify("set_axis_sign", &[json!(config.axis_sign)]);
            self.notify_motor_invert(&config);
            self.notify_encoder_invert(&config);
        }
        self.push_config(None);
        config
    }

    /// `kick(angle?)`
    ///
    /// 仅在仿真模式下有效：直接改写*已发布快照*的角度与角速度
    /// （角速度为 ±5.0 dps，符号跟随角度），模拟外部扰动。仿真器
    /// 自身的状态变量不受影响，下一个 tick 会照常覆盖——效果只可见
    /// 约一个 tick，这是刻意保留的逃生舱口行为。Real 模式下 no-op
    /// （避免对真实硬件来一下）。
    pub fn kick(&self, payload: &Value) -> RobotConfig {
        let config = self.current_config();
        if config.mode != Mode::Sim {
            return config;
        }

        let angle = match lenient_f64(payload, "angle") {
            Parsed::Ok(v) => v,
            Parsed::Missing | Parsed::Invalid => DEFAULT_KICK_ANGLE,
        };

        let mut snapshot = self.ctx.telemetry_snapshot();
        snapshot.angle_deg = angle;
        snapshot.gyro_dps = if angle >= 0.0 {
            KICK_GYRO_DPS
        } else {
            -KICK_GYRO_DPS
        };
        self.ctx.publish(snapshot);
        config
    }

    fn notify_pid(&self, config: &RobotConfig) {
        self.bridge.notify(
            "set_pid",
            &[
                json!(config.pid.p),
                json!(config.pid.i),
                json!(config.pid.d),
            ],
        );
    }

    fn notify_motor_invert(&self, config: &RobotConfig) {
        self.bridge.notify(
            "set_motor_invert",
            &[
                json!(config.motor_invert.left),
                json!(config.motor_invert.right),
            ],
        );
    }

    fn notify_encoder_invert(&self, config: &RobotConfig) {
        self.bridge.notify(
            "set_encoder_invert",
            &[
                json!(config.encoder_invert.left),
                json!(config.encoder_invert.right),
            ],
        );
    }

    /// 推送完整配置（幂等）
    fn push_config(&self, client: Option<&str>) {
        if let Ok(payload) = serde_json::to_value(self.current_config()) {
            self.hooks.push_ui("config", &payload, client);
        }
    }
}

/// 极性类 setter 的每侧应用规则：缺失不动，坏值强制 +1，好值取符号
fn apply_side(slot: &mut i32, parsed: Parsed<i64>) {
    match parsed {
        Parsed::Missing => {},
        Parsed::Invalid => *slot = 1,
        Parsed::Ok(v) => *slot = sign_of(v),
    }
}

fn unwrap_or(parsed: Parsed<i64>, default: i64) -> i64 {
    match parsed {
        Parsed::Ok(v) => v,
        _ => default,
    }
}
