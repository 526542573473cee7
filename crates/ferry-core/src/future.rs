use std::{future::Future, pin::Pin};

/// 对象安全的 `Send` Future 包装。
///
/// # 契约说明（What）
/// - 与 `futures::future::BoxFuture` 为同一类型，可以直接互换；
/// - 异步 Bean 方法的调用器、代理的异步回复以及执行器任务都以此类型流转。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
