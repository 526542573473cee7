//! # proxy 模块说明
//!
//! ## 角色定位（Why）
//! - 反向方向：应用代码调用一个接口描述 [`InterfaceSpec`]，[`ProxyHandler`] 把调用变成新的 Exchange，
//!   经 [`Producer`] 发送到路由其余部分，再把回复转换为接口声明的返回类型；
//! - 返回类型为 `Future<T>` 的方法在执行器上异步发送，调用方得到 [`PendingReply`]。
//!
//! ## 故障映射（What）
//! 1. 依声明顺序检查每个声明的故障类型，在故障链上由外向内寻找第一个匹配者并原样返回；
//! 2. 运行时包装故障的原因为非受检故障时返回该原因；
//! 3. 非受检故障原样返回；
//! 4. 未声明的受检故障包装为运行时包装故障。
//!
//! ## 状态机
//! - `DISPATCHED → COMPLETED`（同步）或 `DISPATCHED → PENDING → COMPLETED`（异步）。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use ferry_core::{
    DefaultTypeConverter, Exchange, ExchangePattern, ExecutorRef, Fault, FaultKind, Producer,
    SharedExecutor, TypeConverter, Value, ValueType, kinds,
};
use futures::channel::oneshot;

use crate::error::BeanError;
use crate::invocation::DeferredInvocation;
use crate::settings::ProxySettings;

/// 接口方法描述。
#[derive(Clone, Debug)]
pub struct InterfaceMethod {
    name: String,
    params: Vec<ValueType>,
    return_type: ValueType,
    throws: Vec<&'static FaultKind>,
    one_way: bool,
}

impl InterfaceMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: ValueType::Void,
            throws: Vec::new(),
            one_way: false,
        }
    }

    pub fn param(mut self, ty: ValueType) -> Self {
        self.params.push(ty);
        self
    }

    pub fn returns(mut self, ty: ValueType) -> Self {
        self.return_type = ty;
        self
    }

    /// 以源码形式的签名声明返回类型，如 `CompletableFuture<String>`；无法解析时视为 `Any`。
    pub fn returns_signature(self, signature: &str) -> Self {
        let ty = ValueType::parse(signature).unwrap_or(ValueType::Any);
        self.returns(ty)
    }

    pub fn throws(mut self, kind: &'static FaultKind) -> Self {
        self.throws.push(kind);
        self
    }

    /// 单向调用：以 `InOnly` 模式发送。
    pub fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }
}

/// 代理的接口描述。
#[derive(Clone, Debug)]
pub struct InterfaceSpec {
    name: String,
    methods: Vec<InterfaceMethod>,
}

impl InterfaceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: InterfaceMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[InterfaceMethod] {
        &self.methods
    }
}

/// 每个接口方法缓存的调用元数据。
#[derive(Debug)]
struct MethodMetadata {
    name: String,
    params: Vec<ValueType>,
    pattern: ExchangePattern,
    return_type: ValueType,
    throws: Vec<&'static FaultKind>,
}

impl MethodMetadata {
    fn of(method: &InterfaceMethod) -> Self {
        Self {
            name: method.name.clone(),
            params: method.params.clone(),
            pattern: if method.one_way {
                ExchangePattern::InOnly
            } else {
                ExchangePattern::InOut
            },
            return_type: method.return_type.clone(),
            throws: method.throws.clone(),
        }
    }

    fn is_future(&self) -> bool {
        self.return_type.is_future()
    }
}

/// 按声明映射回复中的故障。
pub fn map_fault(fault: Fault, declared: &[&'static FaultKind]) -> Fault {
    for kind in declared {
        if let Some(found) = fault.chain().find(|f| f.is_a(kind)) {
            return found.clone();
        }
    }
    if fault.is_a(&kinds::RUNTIME_WRAPPER)
        && let Some(cause) = fault.cause()
        && !cause.is_checked()
    {
        return cause.clone();
    }
    if !fault.is_checked() {
        return fault;
    }
    Fault::wrap_runtime(fault)
}

/// 尚未完成的代理回复。
pub struct PendingReply {
    state: PendingState,
}

enum PendingState {
    Ready(Option<Result<Value, Fault>>),
    Waiting(oneshot::Receiver<Result<Value, Fault>>),
}

impl PendingReply {
    fn ready(result: Result<Value, Fault>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    fn waiting(receiver: oneshot::Receiver<Result<Value, Fault>>) -> Self {
        Self {
            state: PendingState::Waiting(receiver),
        }
    }

    /// 阻塞当前线程直到完成；不得在异步运行时的工作线程上调用。
    pub fn wait(self) -> Result<Value, Fault> {
        futures::executor::block_on(self)
    }
}

impl Future for PendingReply {
    type Output = Result<Value, Fault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            PendingState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(Fault::illegal_state("proxy reply already taken"))),
            ),
            PendingState::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|received| {
                received.unwrap_or_else(|_| Err(Fault::illegal_state("proxy reply was dropped before completion")))
            }),
        }
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            PendingState::Ready(_) => "ready",
            PendingState::Waiting(_) => "waiting",
        };
        f.debug_struct("PendingReply").field("state", &state).finish()
    }
}

/// 一次代理调用的结果。
#[derive(Debug)]
pub enum ProxyReply {
    /// 同步完成的返回值。
    Value(Value),
    /// 返回类型为 `Future` 时的待完成回复。
    Pending(PendingReply),
}

/// 代理构建器。
pub struct ProxyBuilder {
    producer: Arc<dyn Producer>,
    converter: Option<Arc<dyn TypeConverter>>,
    executor: Option<ExecutorRef>,
    binding: bool,
    pool: Option<(usize, String)>,
}

impl ProxyBuilder {
    pub fn new(producer: Arc<dyn Producer>) -> Self {
        Self {
            producer,
            converter: None,
            executor: None,
            binding: true,
            pool: None,
        }
    }

    pub fn converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// 异步调用使用的执行器；缺省为进程级共享池。
    pub fn executor(mut self, executor: ExecutorRef) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 绑定模式发送延迟调用对象；关闭时单个参数直接作为 body，多个参数作为列表。
    pub fn binding(mut self, binding: bool) -> Self {
        self.binding = binding;
        self
    }

    /// 应用配置。共享池参数只在构建时未注入执行器的情况下生效，且只影响共享池的下一次创建。
    pub fn settings(mut self, settings: &ProxySettings) -> Self {
        self.binding = settings.binding;
        self.pool = (settings.worker_threads > 0 || settings.thread_name.is_some()).then(|| {
            (
                settings.worker_threads,
                settings.thread_name.clone().unwrap_or_default(),
            )
        });
        self
    }

    pub fn build(self, interface: InterfaceSpec) -> ProxyHandler {
        if self.executor.is_none()
            && let Some((worker_threads, thread_name)) = &self.pool
        {
            SharedExecutor::global().configure(*worker_threads, thread_name.clone());
        }
        ProxyHandler {
            interface: Arc::new(interface),
            producer: self.producer,
            converter: self
                .converter
                .unwrap_or_else(|| Arc::new(DefaultTypeConverter::new())),
            executor: self.executor.unwrap_or_else(|| Arc::new(SharedExecutor::global())),
            binding: self.binding,
            metadata: DashMap::new(),
        }
    }
}

/// 把接口调用转换为 Exchange 的代理处理器。
pub struct ProxyHandler {
    interface: Arc<InterfaceSpec>,
    producer: Arc<dyn Producer>,
    converter: Arc<dyn TypeConverter>,
    executor: ExecutorRef,
    binding: bool,
    metadata: DashMap<(String, usize), Arc<MethodMetadata>>,
}

impl ProxyHandler {
    pub fn interface(&self) -> &InterfaceSpec {
        &self.interface
    }

    fn metadata(&self, method: &str, arity: usize) -> Result<Arc<MethodMetadata>, Fault> {
        let key = (method.to_owned(), arity);
        if let Some(found) = self.metadata.get(&key) {
            return Ok(found.value().clone());
        }
        let declared = self
            .interface
            .methods()
            .iter()
            .find(|m| m.name() == method && m.params().len() == arity)
            .ok_or_else(|| BeanError::Proxy {
                interface: self.interface.name().to_owned(),
                reason: format!("no method {method} with {arity} parameters"),
            })?;
        let metadata = Arc::new(MethodMetadata::of(declared));
        Ok(self.metadata.entry(key).or_insert(metadata).value().clone())
    }

    fn exchange_for(&self, metadata: &MethodMetadata, arguments: Vec<Value>) -> Exchange {
        let body = if self.binding {
            DeferredInvocation::new(metadata.name.clone(), metadata.params.clone(), arguments).into_value()
        } else {
            let mut arguments = arguments;
            match arguments.len() {
                0 => Value::Null,
                1 => arguments.remove(0),
                _ => Value::List(arguments),
            }
        };
        let mut exchange = Exchange::new(metadata.pattern);
        exchange.in_message_mut().set_body(body);
        exchange
    }

    /// 调用接口方法。
    pub fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<ProxyReply, Fault> {
        let metadata = self.metadata(method, arguments.len())?;
        let exchange = self.exchange_for(&metadata, arguments);
        tracing::trace!(
            interface = self.interface.name(),
            method,
            endpoint = self.producer.endpoint(),
            pattern = %metadata.pattern,
            "dispatching proxy invocation"
        );
        if !metadata.is_future() {
            let reply = self.producer.send(exchange);
            return complete(reply, &metadata, self.converter.as_ref()).map(ProxyReply::Value);
        }

        let (tx, rx) = oneshot::channel();
        let producer = self.producer.clone();
        let converter = self.converter.clone();
        let task_metadata = metadata.clone();
        self.executor.spawn(Box::pin(async move {
            let reply = producer.send(exchange);
            let _ = tx.send(complete(reply, &task_metadata, converter.as_ref()));
        }))?;
        Ok(ProxyReply::Pending(PendingReply::waiting(rx)))
    }

    /// 同步调用；返回 `Future` 的方法会阻塞等待完成。
    pub fn call(&self, method: &str, arguments: Vec<Value>) -> Result<Value, Fault> {
        match self.invoke(method, arguments)? {
            ProxyReply::Value(value) => Ok(value),
            ProxyReply::Pending(pending) => pending.wait(),
        }
    }

    /// 以 Future 形式调用；同步方法得到已完成的回复。
    pub fn call_async(&self, method: &str, arguments: Vec<Value>) -> PendingReply {
        match self.invoke(method, arguments) {
            Ok(ProxyReply::Pending(pending)) => pending,
            Ok(ProxyReply::Value(value)) => PendingReply::ready(Ok(value)),
            Err(fault) => PendingReply::ready(Err(fault)),
        }
    }
}

impl fmt::Debug for ProxyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandler")
            .field("interface", &self.interface.name())
            .field("endpoint", &self.producer.endpoint())
            .field("binding", &self.binding)
            .finish()
    }
}

fn complete(
    mut reply: Exchange,
    metadata: &MethodMetadata,
    converter: &dyn TypeConverter,
) -> Result<Value, Fault> {
    if let Some(fault) = reply.take_exception() {
        return Err(map_fault(fault, &metadata.throws));
    }
    let target = metadata.return_type.resolved();
    if target.is_void() {
        return Ok(Value::Null);
    }
    let body = reply.result_message().body();
    converter.convert(body, target).map_err(Fault::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    static ORDER_REJECTED: FaultKind = FaultKind::checked("OrderRejected", Some(&kinds::EXCEPTION));
    static UNDECLARED: FaultKind = FaultKind::checked("Undeclared", Some(&kinds::EXCEPTION));

    #[test]
    fn declared_fault_found_in_cause_chain() {
        let fault = Fault::wrap_runtime(Fault::new(&ORDER_REJECTED, "no stock"));
        let mapped = map_fault(fault, &[&ORDER_REJECTED]);
        assert!(mapped.is_a(&ORDER_REJECTED));
        assert_eq!(mapped.message(), "no stock");
    }

    #[test]
    fn runtime_wrapper_with_unchecked_cause_is_unwrapped() {
        let fault = Fault::wrap_runtime(Fault::illegal_state("closed"));
        let mapped = map_fault(fault, &[]);
        assert!(mapped.is_a(&kinds::ILLEGAL_STATE));
    }

    #[test]
    fn unchecked_passes_and_undeclared_checked_is_wrapped() {
        let mapped = map_fault(Fault::illegal_argument("x"), &[&ORDER_REJECTED]);
        assert!(mapped.is_a(&kinds::ILLEGAL_ARGUMENT));

        let mapped = map_fault(Fault::new(&UNDECLARED, "y"), &[&ORDER_REJECTED]);
        assert!(mapped.is_a(&kinds::RUNTIME_WRAPPER));
        assert!(mapped.cause().unwrap().is_a(&UNDECLARED));
    }

    struct Inline;

    impl ferry_core::TaskExecutor for Inline {
        fn spawn(&self, task: ferry_core::BoxFuture<'static, ()>) -> Result<(), Fault> {
            futures::executor::block_on(task);
            Ok(())
        }
    }

    #[test]
    fn pool_settings_only_apply_without_injected_executor() {
        let processor: Arc<dyn ferry_core::Processor> = Arc::new(|_: &mut Exchange| Ok::<(), Fault>(()));
        let producer: Arc<dyn Producer> = Arc::new(ferry_core::ProcessorProducer::new("direct:noop", processor));
        let shared = SharedExecutor::global();

        let injected = ProxySettings {
            worker_threads: 3,
            thread_name: Some("ferry-injected".to_owned()),
            ..ProxySettings::default()
        };
        let _ = ProxyBuilder::new(producer.clone())
            .settings(&injected)
            .executor(Arc::new(Inline))
            .build(InterfaceSpec::new("Noop"));
        assert_ne!(shared.pool_settings().1, "ferry-injected");

        let pooled = ProxySettings {
            worker_threads: 2,
            thread_name: Some("ferry-pooled".to_owned()),
            ..ProxySettings::default()
        };
        let _ = ProxyBuilder::new(producer)
            .settings(&pooled)
            .build(InterfaceSpec::new("Noop"));
        assert_eq!(shared.pool_settings(), (2, "ferry-pooled".to_owned()));
    }

    #[test]
    fn ready_reply_resolves_immediately() {
        let reply = PendingReply::ready(Ok(Value::Int(1)));
        assert_eq!(reply.wait().unwrap(), Value::Int(1));
    }
}
