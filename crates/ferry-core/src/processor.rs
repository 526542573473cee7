//! 处理步骤与生产者契约。
//!
//! - [`Processor`]：同步处理步骤，就地修改 Exchange；
//! - [`AsyncProcessor`]：异步处理步骤，完成时通过回调交还 Exchange；
//! - [`Producer`]：把 Exchange 发送到路由其余部分并取回结果，代理方向的出口。

use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;

use crate::exchange::Exchange;
use crate::fault::Fault;

/// 同步处理步骤。
///
/// 返回 `Err` 表示步骤本身失败；调用方负责把它写入 Exchange 的异常槽位。
pub trait Processor: Send + Sync {
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault>;
}

impl<F> Processor for F
where
    F: Fn(&mut Exchange) -> Result<(), Fault> + Send + Sync,
{
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        self(exchange)
    }
}

/// 异步完成回调：交还 Exchange 与“是否同步完成”标志。
pub type AsyncCallback = Box<dyn FnOnce(Exchange, bool) + Send>;

/// 异步处理步骤。
///
/// # 契约说明（What）
/// - 返回 `true` 表示在返回前已同步完成，`false` 表示稍后由回调通知；
/// - 无论成功失败，回调恰好被调用一次，且其 `done_sync` 参数与返回值一致。
pub trait AsyncProcessor: Send + Sync {
    fn process_async(&self, exchange: Exchange, callback: AsyncCallback) -> bool;
}

/// 以阻塞方式驱动异步处理步骤，返回处理后的 Exchange。
///
/// 回调在未被调用的情况下被丢弃时返回 `IllegalStateException` 类故障。
pub fn process_blocking(
    processor: &dyn AsyncProcessor,
    exchange: Exchange,
) -> Result<Exchange, Fault> {
    let (tx, rx) = oneshot::channel();
    processor.process_async(
        exchange,
        Box::new(move |exchange, _done_sync| {
            let _ = tx.send(exchange);
        }),
    );
    futures::executor::block_on(rx)
        .map_err(|_| Fault::illegal_state("async processor dropped its completion callback"))
}

/// 发送 Exchange 并取回结果的下游出口。
pub trait Producer: Send + Sync {
    /// 发送并等待处理完成；失败记录在返回 Exchange 的异常槽位中。
    fn send(&self, exchange: Exchange) -> Exchange;

    /// 目标端点描述，仅用于诊断。
    fn endpoint(&self) -> &str {
        "direct:anonymous"
    }
}

/// 在当前线程直接运行一个 [`Processor`] 的生产者。
#[derive(Clone)]
pub struct ProcessorProducer {
    endpoint: String,
    processor: Arc<dyn Processor>,
}

impl ProcessorProducer {
    pub fn new(endpoint: impl Into<String>, processor: Arc<dyn Processor>) -> Self {
        Self {
            endpoint: endpoint.into(),
            processor,
        }
    }
}

impl fmt::Debug for ProcessorProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorProducer")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Producer for ProcessorProducer {
    fn send(&self, mut exchange: Exchange) -> Exchange {
        if let Err(fault) = self.processor.process(&mut exchange) {
            exchange.set_exception(fault);
        }
        exchange
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
