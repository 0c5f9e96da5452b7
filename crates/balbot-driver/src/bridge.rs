//! 硬件桥（MCU 对端）RPC 链路
//!
//! 桥是物理硬件控制器的 RPC 对端，提供两个原语：
//! - `notify(method, params)`: fire-and-forget，不等待完成
//! - `call(method, params, timeout)`: 请求/应答，仅用于初始就绪探测 `get_status`
//!
//! 就绪状态用显式三态机建模（取代简单布尔缓存）：
//! `Unprobed` 和 `Unreachable` 在下一次使用时都会重新探测，区别只在于
//! 记录了失败原因；`Ready` 之后不再逐条通知重复校验，直到某次通知失败
//! 把状态打回 `Unreachable`。

use crate::error::BridgeError;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// 就绪探测默认超时
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// 桥传输抽象
///
/// 具体实现（进程间 RPC、串口协议等）在本 crate 之外。
pub trait BridgeTransport: Send + Sync {
    /// fire-and-forget 通知
    fn notify(&self, method: &str, params: &[Value]) -> Result<(), BridgeError>;

    /// 请求/应答调用
    fn call(&self, method: &str, params: &[Value], timeout: Duration) -> Result<Value, BridgeError>;
}

/// 桥连接的三态就绪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BridgeReadiness {
    /// 尚未探测过（下次使用时探测）
    #[default]
    Unprobed = 0,
    /// 探测通过，逐条通知不再重复校验
    Ready = 1,
    /// 最近一次探测或通知失败（下次使用时重新探测）
    Unreachable = 2,
}

impl BridgeReadiness {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ready,
            2 => Self::Unreachable,
            _ => Self::Unprobed,
        }
    }
}

/// 桥链路：可选传输 + 原子就绪状态
///
/// 命令线程、控制循环与 `record_telemetry` 入口共享一个实例，
/// 状态切换全部走原子操作，无锁。
pub struct BridgeLink {
    transport: Option<Arc<dyn BridgeTransport>>,
    readiness: AtomicU8,
}

impl BridgeLink {
    /// 无桥链路（所有通知直接丢弃）
    pub fn disconnected() -> Self {
        Self {
            transport: None,
            readiness: AtomicU8::new(BridgeReadiness::Unprobed as u8),
        }
    }

    pub fn new(transport: Arc<dyn BridgeTransport>) -> Self {
        Self {
            transport: Some(transport),
            readiness: AtomicU8::new(BridgeReadiness::Unprobed as u8),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    /// 当前就绪状态
    pub fn readiness(&self) -> BridgeReadiness {
        BridgeReadiness::from_u8(self.readiness.load(Ordering::Relaxed))
    }

    /// 入站推送证明对端存活（`record_telemetry` 调用）
    pub fn mark_ready(&self) {
        self.readiness
            .store(BridgeReadiness::Ready as u8, Ordering::Relaxed);
    }

    /// 确保桥已就绪
    ///
    /// `Ready` 直接返回 true；`Unprobed`/`Unreachable` 触发一次
    /// `get_status` 探测（超时 [`PROBE_TIMEOUT`]）并记录结果。
    pub fn ensure_ready(&self) -> bool {
        let Some(transport) = &self.transport else {
            return false;
        };
        if self.readiness() == BridgeReadiness::Ready {
            return true;
        }

        match transport.call("get_status", &[], PROBE_TIMEOUT) {
            Ok(_) => {
                self.mark_ready();
                true
            },
            Err(err) => {
                debug!("bridge readiness probe failed: {err}");
                self.readiness
                    .store(BridgeReadiness::Unreachable as u8, Ordering::Relaxed);
                false
            },
        }
    }

    /// 发送 fire-and-forget 通知
    ///
    /// 未挂桥或探测失败时丢弃本条；传输错误丢弃本条并把状态打回
    /// `Unreachable`，让下一次使用重新探测。永不向调用方返回错误。
    pub fn notify(&self, method: &str, params: &[Value]) {
        let Some(transport) = &self.transport else {
            return;
        };
        if !self.ensure_ready() {
            debug!("bridge not ready, dropping notification `{method}`");
            return;
        }
        if let Err(err) = transport.notify(method, params) {
            warn!("bridge notify `{method}` failed, re-probing on next use: {err}");
            self.readiness
                .store(BridgeReadiness::Unreachable as u8, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// 记录所有 notify 调用的测试传输，call 的成败可配置
    struct RecordingTransport {
        notifications: Mutex<Vec<(String, Vec<Value>)>>,
        call_ok: Mutex<bool>,
        calls: Mutex<u32>,
        fail_notify: Mutex<bool>,
    }

    impl RecordingTransport {
        fn new(call_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                notifications: Mutex::new(Vec::new()),
                call_ok: Mutex::new(call_ok),
                calls: Mutex::new(0),
                fail_notify: Mutex::new(false),
            })
        }
    }

    impl BridgeTransport for RecordingTransport {
        fn notify(&self, method: &str, params: &[Value]) -> Result<(), BridgeError> {
            if *self.fail_notify.lock() {
                return Err(BridgeError::Transport("connection reset".into()));
            }
            self.notifications
                .lock()
                .push((method.to_string(), params.to_vec()));
            Ok(())
        }

        fn call(
            &self,
            _method: &str,
            _params: &[Value],
            timeout: Duration,
        ) -> Result<Value, BridgeError> {
            *self.calls.lock() += 1;
            if *self.call_ok.lock() {
                Ok(Value::Null)
            } else {
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    #[test]
    fn test_disconnected_link_drops_everything() {
        let link = BridgeLink::disconnected();
        assert!(!link.is_attached());
        assert!(!link.ensure_ready());
        link.notify("set_pid", &[]);
        assert_eq!(link.readiness(), BridgeReadiness::Unprobed);
    }

    #[test]
    fn test_probe_success_then_no_reprobe() {
        let transport = RecordingTransport::new(true);
        let link = BridgeLink::new(transport.clone());

        link.notify("set_setpoint", &[Value::from(1.5)]);
        link.notify("set_setpoint", &[Value::from(2.5)]);

        // Ready 之后不再逐条探测
        assert_eq!(*transport.calls.lock(), 1);
        assert_eq!(link.readiness(), BridgeReadiness::Ready);
        assert_eq!(transport.notifications.lock().len(), 2);
    }

    #[test]
    fn test_probe_failure_drops_and_reprobes_next_use() {
        let transport = RecordingTransport::new(false);
        let link = BridgeLink::new(transport.clone());

        link.notify("set_pid", &[]);
        assert_eq!(link.readiness(), BridgeReadiness::Unreachable);
        assert!(transport.notifications.lock().is_empty());

        // 下一次使用重新探测
        link.notify("set_pid", &[]);
        assert_eq!(*transport.calls.lock(), 2);

        // 对端恢复后通知恢复送达
        *transport.call_ok.lock() = true;
        link.notify("set_pid", &[]);
        assert_eq!(transport.notifications.lock().len(), 1);
        assert_eq!(link.readiness(), BridgeReadiness::Ready);
    }

    #[test]
    fn test_notify_failure_resets_readiness() {
        let transport = RecordingTransport::new(true);
        let link = BridgeLink::new(transport.clone());
        assert!(link.ensure_ready());

        *transport.fail_notify.lock() = true;
        link.notify("motor_test", &[]);
        assert_eq!(link.readiness(), BridgeReadiness::Unreachable);
    }

    #[test]
    fn test_mark_ready_skips_probe() {
        let transport = RecordingTransport::new(false);
        let link = BridgeLink::new(transport.clone());

        // 入站推送直接标记就绪, 即使探测本来会失败
        link.mark_ready();
        link.notify("set_mode", &[Value::from("real")]);
        assert_eq!(*transport.calls.lock(), 0);
        assert_eq!(transport.notifications.lock().len(), 1);
    }
}
