//! # runtime 模块说明
//!
//! ## 角色定位（Why）
//! - 代理的异步调用与异步 Bean 方法都需要一个执行上下文来驱动 Future；
//! - 执行上下文以 [`TaskExecutor`] 注入，调用方掌握生命周期；未注入时回落到进程级共享池
//!   [`SharedExecutor`]，该池按需启动，关闭后下一次提交会重新创建。
//!
//! ## 并发语义（What）
//! - 共享池状态由一把互斥锁保护，创建与关闭在锁内完成，重复初始化是幂等的；
//! - 提交的任务不返回句柄，结果经由任务自身携带的通道回传。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder as RuntimeBuilder, Handle, Runtime};

use crate::fault::Fault;
use crate::future::BoxFuture;

/// 任务执行上下文。
pub trait TaskExecutor: Send + Sync {
    /// 提交一个后台任务；执行器不可用时返回故障。
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), Fault>;
}

/// 共享执行器引用。
pub type ExecutorRef = Arc<dyn TaskExecutor>;

/// 包装现成 Tokio 运行时句柄的执行器，生命周期由调用方管理。
#[derive(Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// 捕获当前线程所在的 Tokio 运行时；不在运行时内时返回 `None`。
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioExecutor").finish_non_exhaustive()
    }
}

impl TaskExecutor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), Fault> {
        drop(self.handle.spawn(task));
        Ok(())
    }
}

struct SharedState {
    runtime: Option<Runtime>,
    worker_threads: usize,
    thread_name: String,
    generation: u64,
}

static SHARED: Mutex<SharedState> = parking_lot::const_mutex(SharedState {
    runtime: None,
    worker_threads: 0,
    thread_name: String::new(),
    generation: 0,
});

const DEFAULT_THREAD_NAME: &str = "ferry-proxy";

/// 进程级共享工作池。
///
/// # 教案式说明
/// - **意图 (Why)**：未显式注入执行器的代理仍需要“默认共享、按需启动”的异步能力；
/// - **契约 (What)**：
///   - `spawn` 在池未启动时创建多线程 Tokio 运行时，之后复用；
///   - `shutdown` 以后台方式关闭运行时，不等待在途任务；
///   - 关闭后的 `spawn` 会重新创建运行时，`generation` 随每次创建递增；
/// - **风险提示 (Trade-offs)**：`configure` 只影响下一次创建，已运行的池不会被重建。
#[derive(Clone, Copy, Debug, Default)]
pub struct SharedExecutor;

impl SharedExecutor {
    pub fn global() -> Self {
        SharedExecutor
    }

    /// 设置下一次创建时使用的线程数（`0` 表示由 Tokio 决定）与线程名前缀。
    pub fn configure(&self, worker_threads: usize, thread_name: impl Into<String>) {
        let mut state = SHARED.lock();
        state.worker_threads = worker_threads;
        state.thread_name = thread_name.into();
    }

    /// 下一次创建时使用的线程数与线程名前缀。
    pub fn pool_settings(&self) -> (usize, String) {
        let state = SHARED.lock();
        let name = if state.thread_name.is_empty() {
            DEFAULT_THREAD_NAME.to_owned()
        } else {
            state.thread_name.clone()
        };
        (state.worker_threads, name)
    }

    pub fn is_running(&self) -> bool {
        SHARED.lock().runtime.is_some()
    }

    /// 已创建运行时的次数。
    pub fn generation(&self) -> u64 {
        SHARED.lock().generation
    }

    pub fn shutdown(&self) {
        let runtime = SHARED.lock().runtime.take();
        if let Some(runtime) = runtime {
            tracing::debug!("shutting down shared ferry executor");
            runtime.shutdown_background();
        }
    }
}

fn build_runtime(state: &SharedState) -> Result<Runtime, Fault> {
    let mut builder = RuntimeBuilder::new_multi_thread();
    if state.worker_threads > 0 {
        builder.worker_threads(state.worker_threads);
    }
    let name = if state.thread_name.is_empty() {
        DEFAULT_THREAD_NAME.to_owned()
    } else {
        state.thread_name.clone()
    };
    builder.thread_name(name).enable_all().build().map_err(|err| {
        Fault::illegal_state(format!("failed to start shared executor: {err}"))
            .with_code("runtime.executor_start")
            .with_origin(err)
    })
}

impl TaskExecutor for SharedExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), Fault> {
        let mut state = SHARED.lock();
        if state.runtime.is_none() {
            let runtime = build_runtime(&state)?;
            state.generation += 1;
            tracing::debug!(generation = state.generation, "started shared ferry executor");
            state.runtime = Some(runtime);
        }
        match state.runtime.as_ref() {
            Some(runtime) => {
                drop(runtime.spawn(task));
                Ok(())
            }
            None => Err(Fault::illegal_state("shared executor unavailable")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;

    #[test]
    fn shared_executor_restarts_after_shutdown() {
        let executor = SharedExecutor::global();

        let (tx, rx) = oneshot::channel();
        executor
            .spawn(Box::pin(async move {
                let _ = tx.send(1);
            }))
            .unwrap();
        assert_eq!(futures::executor::block_on(rx).unwrap(), 1);
        let first = executor.generation();

        executor.shutdown();
        let (tx, rx) = oneshot::channel();
        executor
            .spawn(Box::pin(async move {
                let _ = tx.send(2);
            }))
            .unwrap();
        assert_eq!(futures::executor::block_on(rx).unwrap(), 2);
        assert!(executor.generation() > first);
        assert!(executor.is_running());
    }
}
