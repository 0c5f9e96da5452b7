//! 对外 API
//!
//! `Balbot` 封装控制循环线程的生命周期与桥入站入口。恰好一个专用
//! 后台线程运行控制循环；命令处理器在各自的调用方线程上执行，
//! 从不阻塞循环。

use crate::bridge::BridgeLink;
use crate::hooks::RobotHooks;
use crate::pipeline::control_loop;
use crate::router::{CommandRouter, StateView};
use crate::state::{HardwareIngest, RobotContext};
use balbot_core::LeftRight;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{info, warn};

/// 停止时等待循环线程退出的上限
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> bool;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> bool {
        // 看门狗线程代为 join，主线程带超时等待信号
        let (tx, rx) = crossbeam_channel::bounded(1);
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result.is_ok());
        });
        match rx.recv_timeout(timeout) {
            Ok(joined) => joined,
            // 超时: 看门狗线程继续挂着, 进程退出时由 OS 回收
            Err(_) => false,
        }
    }
}

/// 两轮自平衡机器人运行时
pub struct Balbot {
    ctx: Arc<RobotContext>,
    hooks: RobotHooks,
    bridge: Arc<BridgeLink>,
    router: Arc<CommandRouter>,
    loop_thread: Option<JoinHandle<()>>,
    // 循环线程退出时自行清除; stop() 超时后 handle 已交给看门狗,
    // 只有这个标志还能证明循环是否存活
    loop_running: Arc<AtomicBool>,
}

impl Balbot {
    pub(crate) fn assemble(
        ctx: Arc<RobotContext>,
        hooks: RobotHooks,
        bridge: Arc<BridgeLink>,
    ) -> Self {
        let router = Arc::new(CommandRouter::new(
            ctx.clone(),
            bridge.clone(),
            hooks.clone(),
        ));
        Self {
            ctx,
            hooks,
            bridge,
            router,
            loop_thread: None,
            loop_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 启动控制循环（幂等：线程存活时再次调用是 no-op，包括
    /// `stop()` 超时后循环仍在挂着的情况）
    pub fn start(&mut self) {
        if self.loop_running.load(Ordering::Relaxed) {
            return;
        }

        self.ctx.stop.store(false, Ordering::Relaxed);
        self.loop_running.store(true, Ordering::Relaxed);
        let update_hz = self.ctx.config.read().update_hz;
        let ctx = self.ctx.clone();
        let hooks = self.hooks.clone();
        let running = self.loop_running.clone();
        self.loop_thread = Some(spawn(move || {
            control_loop(ctx, hooks, update_hz);
            running.store(false, Ordering::Relaxed);
        }));
    }

    /// 协作式停止
    ///
    /// 设置停止标志后最多等 [`STOP_TIMEOUT`] 让循环观察到并退出，
    /// 超时则继续（不强杀线程）。
    pub fn stop(&mut self) {
        self.ctx.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.loop_thread.take() {
            if !handle.join_timeout(STOP_TIMEOUT) {
                warn!("control loop did not stop within {STOP_TIMEOUT:?}, detaching");
            } else {
                info!("control loop joined");
            }
        }
    }

    /// 命令路由（UI / HTTP 传输层挂接点）
    pub fn router(&self) -> Arc<CommandRouter> {
        self.router.clone()
    }

    /// 当前 `{config, telemetry}` 视图
    pub fn get_state(&self) -> StateView {
        self.router.get_state()
    }

    /// 桥入站遥测入口
    ///
    /// 硬件桥推送传感数据时调用：在互斥锁下覆盖摄入缓冲（最新值
    /// 语义），并把桥标记为就绪（入站推送即存活证明）。PWM 夹持到
    /// ±255 维持不变量。
    #[allow(clippy::too_many_arguments)]
    pub fn record_telemetry(
        &self,
        angle_deg: f64,
        gyro_dps: f64,
        accel_g: f64,
        pwm: i32,
        enc_left: i64,
        enc_right: i64,
        mode: &str,
        imu_model: &str,
    ) {
        let pwm = pwm.clamp(-255, 255);
        *self.ctx.ingest.lock() = Some(HardwareIngest {
            angle_deg,
            gyro_dps,
            accel_g,
            motor_pwm: LeftRight::uniform(pwm),
            encoders: LeftRight {
                left: enc_left,
                right: enc_right,
            },
            mode: mode.to_string(),
            imu_model: imu_model.to_string(),
        });
        self.bridge.mark_ready();
    }
}

impl Drop for Balbot {
    fn drop(&mut self) {
        self.stop();
    }
}
