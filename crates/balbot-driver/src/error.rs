//! Driver 模块错误类型定义
//!
//! 对外的命令入口永远不向调用方返回错误（失败一律静默降级，唯一可观察
//! 反馈是返回的当前配置）；这里的类型只存在于 trait 接缝处（硬件桥传输、
//! 传感回调、电机回调），在内部被日志 + 吞掉。

use std::time::Duration;
use thiserror::Error;

/// 硬件桥（RPC 对端）错误
#[derive(Error, Debug)]
pub enum BridgeError {
    /// 请求超时（就绪探测 `get_status` 默认 2 秒）
    #[error("bridge call timed out after {0:?}")]
    Timeout(Duration),

    /// 传输层错误（连接断开、序列化失败等，由具体传输实现填充）
    #[error("bridge transport error: {0}")]
    Transport(String),

    /// 对端不可用
    #[error("bridge unavailable")]
    Unavailable,
}

/// 传感/执行回调错误
#[derive(Error, Debug)]
pub enum HookError {
    /// 拉取式传感回调失败（该 tick 回退到上一次的值）
    #[error("sensor provider failed: {0}")]
    Sensor(String),

    /// 电机回调失败（忽略，不影响本 tick 其余步骤）
    #[error("motor sink failed: {0}")]
    Motor(String),
}
