//! balbot-driver
//!
//! 两轮自平衡机器人的运行时：定频控制循环（仿真 / 硬件中继双模式）、
//! 遥测快照发布、命令路由与硬件桥 RPC 链路。
//!
//! 架构（单循环线程 + 多命令线程）：
//!
//! ```text
//! 命令路由 → 配置 (RwLock) → 控制循环每 tick 读取
//! 控制循环 → 遥测快照 (ArcSwap 整体替换) → UI 推送 / 状态查询
//! 桥入站 record_telemetry → 摄入缓冲 (Mutex) → 控制循环读取
//! ```

pub mod bridge;
pub mod builder;
pub mod error;
pub mod hooks;
pub mod params;
pub mod pipeline;
pub mod robot;
pub mod router;
pub mod state;

pub use bridge::{BridgeLink, BridgeReadiness, BridgeTransport};
pub use builder::BalbotBuilder;
pub use error::{BridgeError, HookError};
pub use hooks::{MotorSink, RobotHooks, SensorProvider, UiChannel};
pub use robot::Balbot;
pub use router::{CommandRouter, StateView};
pub use state::{HardwareIngest, RobotContext};
