//! 日志安装入口。
//!
//! 库代码只依赖 `tracing` 门面；宿主进程若没有自己的 Subscriber，可调用 [`install_fmt`]
//! 获得 `fmt + EnvFilter` 的默认组合。未开启 `subscriber` Feature 时仅保留错误类型。

use std::sync::OnceLock;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装阶段的失败路径。
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// `install_fmt` 被重复调用。
    #[error("ferry 日志层已完成安装，禁止重复调用 install_fmt")]
    AlreadyInstalled,
    /// 外部提前设置了全局 `tracing` Subscriber。
    #[error("全局 tracing Subscriber 已存在，ferry 无法覆盖")]
    SubscriberAlreadySet,
    /// 设置全局 Subscriber 失败的底层错误。
    #[error("设置 tracing 全局 Subscriber 失败: {0}")]
    SetGlobalSubscriber(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// 安装 `fmt` 输出层，过滤规则取自 `RUST_LOG`，缺省为 `info`。
///
/// # 教案式说明
/// - **逻辑（How）**：先检查重复安装与外部 Subscriber，再组装 `registry + EnvFilter + fmt` 并设为全局；
/// - **契约（What）**：成功后进程内所有 `tracing` 事件按过滤规则输出到 stdout。
#[cfg(feature = "subscriber")]
pub fn install_fmt() -> Result<(), InstallError> {
    use tracing_subscriber::layer::SubscriberExt;

    if INSTALLED.get().is_some() {
        return Err(InstallError::AlreadyInstalled);
    }
    if tracing::dispatcher::has_been_set() {
        return Err(InstallError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED.set(()).map_err(|_| InstallError::AlreadyInstalled)
}

#[cfg(feature = "subscriber")]
fn build_env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// 是否已经通过 [`install_fmt`] 完成安装。
pub fn is_installed() -> bool {
    INSTALLED.get().is_some()
}
