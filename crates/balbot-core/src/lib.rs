//! balbot-core
//!
//! 两轮自平衡机器人的核心领域类型与算法：
//!
//! - [`config`]: 机器人配置记录（PID 增益、轴向、电机/编码器极性等）
//! - [`telemetry`]: 遥测快照（每个 tick 整体替换发布的不可变值）
//! - [`pid`]: 离散 PID 控制器（仅在仿真模式下驱动执行器）
//! - [`sim`]: 倒立摆物理仿真（阻尼 + 噪声驱动，刻意不稳定）
//!
//! 本 crate 不含任何线程或 IO 逻辑，所有运行时编排见 `balbot-driver`。

pub mod config;
pub mod pid;
pub mod sim;
pub mod telemetry;

pub use config::{LeftRight, Mode, PidGains, RobotConfig, sign_of};
pub use pid::{ENCODER_GAIN, PidController};
pub use sim::{PendulumSim, PendulumState};
pub use telemetry::{PWM_LIMIT, TelemetrySnapshot};
