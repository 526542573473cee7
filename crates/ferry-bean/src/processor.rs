//! # processor 模块说明
//!
//! ## 角色定位（Why）
//! - [`BeanProcessor`] 是路由中的处理步骤：解析目标 Bean、选择方法、求值参数、调用并写回结果；
//! - 同步契约 [`Processor`] 与异步契约 [`AsyncProcessor`] 共用同一条准备流程；异步 Bean 方法返回的
//!   Future 总是提交给执行器驱动，同步路径阻塞等待结果，异步路径经回调交还。
//!
//! ## 失败语义（What）
//! - 正向路径从不向调用方返回错误：目标解析、选择、绑定与调用中的失败都写入 Exchange 的异常槽位，
//!   运行时包装故障会被解开，只保留其原因；
//! - 异步路径的回调恰好调用一次，`done_sync` 与返回值一致；执行器丢弃挂起任务时，
//!   完成槽在析构中以 `IllegalStateException` 类故障完成回调。
//!
//! ## 保留头部
//! - `FerryBeanMethodName` 与 `FerryBeanMultiParameterArray` 在进入时即被移除，只作用于本次调用。

use std::fmt;
use std::sync::Arc;

use ferry_core::exchange::headers;
use ferry_core::{
    AsyncCallback, AsyncProcessor, BoxFuture, Exchange, ExecutorRef, Fault, Processor,
    SharedExecutor, Value, kinds,
};
use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::class::{BeanRef, bean_as_any};
use crate::context::BeanContext;
use crate::error::BeanError;
use crate::info::TypeDescriptor;
use crate::invocation::DeferredInvocation;
use crate::method::{InvocationOutcome, MethodDescriptor, MethodKey};
use crate::parameter::MethodCall;
use crate::selector::{MethodSelector, SelectionHints};
use crate::target::{BeanTarget, ConstantBeanTarget};

enum AdapterState {
    Unchecked,
    Checked(Option<Arc<dyn Processor>>),
}

enum Prepared {
    Adapter(Arc<dyn Processor>),
    Invoke {
        bean: BeanRef,
        method: Arc<MethodDescriptor>,
        arguments: Vec<Value>,
    },
}

/// Bean 调用引擎。
///
/// # 教案式说明
/// - **意图 (Why)**：让任意已注册的应用对象成为处理步骤，方法与参数由消息内容自动决定；
/// - **执行 (How)**：
///   1. 读取并移除方法名头部，否则使用配置的方法名或方法键；
///   2. 经 [`BeanTarget`] 解析实例与类型描述；
///   3. 未指定方法且类型没有 `Handler` 方法时，查询一次实例是否原生实现处理步骤，是则直接委派；
///   4. 入站 body 为延迟调用时按其记录的方法名与参数类型直接调用；
///   5. 否则交给 [`MethodSelector`]，无结果时报告带作用域的 `IllegalStateException`；
///   6. 求值参数、调用、写回结果。
/// - **风险提示 (Trade-offs)**：处理步骤适配只查询一次并缓存，注册表来源的实例后续被替换时不会重新查询。
pub struct BeanProcessor {
    target: Arc<dyn BeanTarget>,
    context: BeanContext,
    method: Option<MethodCall>,
    method_key: Option<MethodKey>,
    multi_parameter_array: bool,
    shorthand_getters: bool,
    executor: ExecutorRef,
    adapter: Mutex<AdapterState>,
}

impl BeanProcessor {
    pub fn builder(target: Arc<dyn BeanTarget>) -> BeanProcessorBuilder {
        BeanProcessorBuilder {
            target,
            context: None,
            method: None,
            method_key: None,
            multi_parameter_array: None,
            executor: None,
        }
    }

    /// 以固定实例与默认协作者构建。
    pub fn for_bean(bean: BeanRef) -> Self {
        Self::builder(Arc::new(ConstantBeanTarget::new(bean))).assemble(None)
    }

    pub fn context(&self) -> &BeanContext {
        &self.context
    }

    pub fn target(&self) -> &Arc<dyn BeanTarget> {
        &self.target
    }

    fn prepare(&self, exchange: &mut Exchange) -> Result<Prepared, Fault> {
        let header_method = exchange.in_message_mut().remove_header(headers::BEAN_METHOD_NAME);
        let header_multi = exchange
            .in_message_mut()
            .remove_header(headers::BEAN_MULTI_PARAMETER_ARRAY);
        let explicit = match header_method {
            Some(Value::Null) | None => None,
            Some(Value::Text(text)) => Some(MethodCall::parse(&text)?),
            Some(other) => Some(MethodCall::parse(&other.to_string())?),
        };
        let call = explicit.as_ref().or(self.method.as_ref());
        let multi_parameter_array = header_multi
            .as_ref()
            .and_then(flag)
            .unwrap_or(self.multi_parameter_array);

        let (bean, descriptor) = self.target.resolve(exchange, &self.context)?.into_parts();

        if call.is_none()
            && self.method_key.is_none()
            && !descriptor.has_any_handler_annotation()
            && let Some(adapter) = self.processor_adapter(&bean)
        {
            tracing::trace!(bean = %self.target.describe(), "delegating to native processor");
            return Ok(Prepared::Adapter(adapter));
        }

        if let Some(invocation) = DeferredInvocation::from_value(exchange.in_message().body()) {
            let method = deferred_method(&descriptor, invocation)?;
            let arguments = deferred_arguments(&method, invocation, &self.context)?;
            return Ok(Prepared::Invoke {
                bean,
                method,
                arguments,
            });
        }

        let method = match (call, &self.method_key) {
            (None, Some(key)) => descriptor
                .method_by_key(key)
                .cloned()
                .or_else(|| self.context.cache().method(&descriptor.type_key(), key)),
            _ => {
                let hints = SelectionHints {
                    method: call,
                    shorthand_getters: self.shorthand_getters,
                };
                MethodSelector::new(self.context.converter().as_ref())
                    .select(&descriptor, exchange, hints)?
            }
        };
        let method = method.ok_or_else(|| BeanError::NoMethodResolved {
            bean: self.target.describe(),
            scope: self.target.scope(),
        })?;
        let arguments = method.evaluate_arguments(
            exchange,
            self.context.converter().as_ref(),
            call,
            multi_parameter_array,
        )?;
        Ok(Prepared::Invoke {
            bean,
            method,
            arguments,
        })
    }

    fn processor_adapter(&self, bean: &BeanRef) -> Option<Arc<dyn Processor>> {
        let mut state = self.adapter.lock();
        match &*state {
            AdapterState::Checked(adapter) => adapter.clone(),
            AdapterState::Unchecked => {
                let adapter = bean.clone().as_processor();
                *state = AdapterState::Checked(adapter.clone());
                adapter
            }
        }
    }

    fn run_sync(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        match self.prepare(exchange)? {
            Prepared::Adapter(adapter) => adapter.process(exchange),
            Prepared::Invoke {
                bean,
                method,
                arguments,
            } => {
                let value = match method.invoke(bean_as_any(bean.as_ref()), exchange, arguments)? {
                    InvocationOutcome::Ready(value) => value,
                    InvocationOutcome::Pending(future) => self.wait_on_executor(future)?,
                };
                method.fill_result(exchange, value);
                Ok(())
            }
        }
    }

    /// 在执行器上驱动异步方法并阻塞等待；方法内可使用执行器提供的定时器与 I/O。
    fn wait_on_executor(&self, future: BoxFuture<'static, Result<Value, Fault>>) -> Result<Value, Fault> {
        let (tx, rx) = oneshot::channel();
        self.executor.spawn(Box::pin(async move {
            let _ = tx.send(future.await);
        }))?;
        futures::executor::block_on(rx).unwrap_or_else(|_| Err(executor_dropped()))
    }
}

impl Processor for BeanProcessor {
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        if let Err(fault) = self.run_sync(exchange) {
            record_failure(exchange, fault);
        }
        Ok(())
    }
}

impl AsyncProcessor for BeanProcessor {
    fn process_async(&self, mut exchange: Exchange, callback: AsyncCallback) -> bool {
        let outcome = self.prepare(&mut exchange).and_then(|prepared| match prepared {
            Prepared::Adapter(adapter) => adapter.process(&mut exchange).map(|()| None),
            Prepared::Invoke {
                bean,
                method,
                arguments,
            } => match method.invoke(bean_as_any(bean.as_ref()), &mut exchange, arguments)? {
                InvocationOutcome::Ready(value) => {
                    method.fill_result(&mut exchange, value);
                    Ok(None)
                }
                InvocationOutcome::Pending(future) => Ok(Some((method, future))),
            },
        });
        let (method, future) = match outcome {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                callback(exchange, true);
                return true;
            }
            Err(fault) => {
                record_failure(&mut exchange, fault);
                callback(exchange, true);
                return true;
            }
        };

        let completion = PendingCompletion {
            slot: Some((exchange, callback)),
            method,
        };
        let task = Box::pin(async move {
            let result = future.await;
            completion.complete(result);
        });
        // 被拒绝的任务已随 `spawn` 一起析构，回调已经以 `done_sync = false` 完成。
        if let Err(fault) = self.executor.spawn(task) {
            tracing::warn!(bean = %self.target.describe(), error = %fault, "executor rejected pending bean invocation");
        }
        false
    }
}

/// 挂起调用的完成槽：正常结束时写回结果，未完成即被析构时写入故障，两种情况都恰好回调一次。
struct PendingCompletion {
    slot: Option<(Exchange, AsyncCallback)>,
    method: Arc<MethodDescriptor>,
}

impl PendingCompletion {
    fn complete(mut self, result: Result<Value, Fault>) {
        if let Some((mut exchange, callback)) = self.slot.take() {
            match result {
                Ok(value) => self.method.fill_result(&mut exchange, value),
                Err(fault) => record_failure(&mut exchange, fault),
            }
            callback(exchange, false);
        }
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        if let Some((mut exchange, callback)) = self.slot.take() {
            record_failure(&mut exchange, executor_dropped());
            callback(exchange, false);
        }
    }
}

fn executor_dropped() -> Fault {
    Fault::illegal_state("executor dropped the pending bean invocation before completion")
        .with_code("bean.executor_dropped")
}

impl fmt::Debug for BeanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanProcessor")
            .field("target", &self.target.describe())
            .field("method", &self.method.as_ref().map(MethodCall::name))
            .field("method_key", &self.method_key)
            .field("multi_parameter_array", &self.multi_parameter_array)
            .finish()
    }
}

fn flag(value: &Value) -> Option<bool> {
    value
        .as_bool()
        .or_else(|| value.as_str().map(|text| text.trim().eq_ignore_ascii_case("true")))
}

/// 运行时包装故障解开为原因后写入异常槽位。
fn record_failure(exchange: &mut Exchange, fault: Fault) {
    let fault = match fault.cause() {
        Some(cause) if fault.is_a(&kinds::RUNTIME_WRAPPER) => cause.clone(),
        _ => fault,
    };
    tracing::debug!(exchange = exchange.id(), error = %fault, "bean invocation failed");
    exchange.set_exception(fault);
}

fn deferred_method(
    descriptor: &TypeDescriptor,
    invocation: &DeferredInvocation,
) -> Result<Arc<MethodDescriptor>, BeanError> {
    if let Some(method) = descriptor.find_method(invocation.method(), invocation.parameter_types()) {
        return Ok(method.clone());
    }
    let by_arity: Vec<&Arc<MethodDescriptor>> = descriptor
        .operation(invocation.method())
        .unwrap_or_default()
        .iter()
        .filter(|m| m.parameter_count() == invocation.arguments().len())
        .collect();
    match by_arity.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(BeanError::MethodNotFound {
            bean: descriptor.class_name().to_owned(),
            method: invocation.method().to_owned(),
            qualifier: format!(" (with {} parameters)", invocation.arguments().len()),
        }),
        many => Err(BeanError::AmbiguousMethodCall {
            candidates: many.iter().map(|m| m.key().clone()).collect(),
        }),
    }
}

fn deferred_arguments(
    method: &MethodDescriptor,
    invocation: &DeferredInvocation,
    context: &BeanContext,
) -> Result<Vec<Value>, BeanError> {
    let label = method.key().to_string();
    method
        .bindings()
        .iter()
        .zip(invocation.arguments())
        .map(|(binding, value)| binding.coerce(value.clone(), context.converter().as_ref(), &label))
        .collect()
}

/// [`BeanProcessor`] 构建器。
pub struct BeanProcessorBuilder {
    target: Arc<dyn BeanTarget>,
    context: Option<BeanContext>,
    method: Option<String>,
    method_key: Option<MethodKey>,
    multi_parameter_array: Option<bool>,
    executor: Option<ExecutorRef>,
}

impl BeanProcessorBuilder {
    pub fn context(mut self, context: BeanContext) -> Self {
        self.context = Some(context);
        self
    }

    /// 固定方法名，可带参数值，如 `greet('ann', *)`。
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// 固定方法键，跳过选择。
    pub fn method_key(mut self, key: MethodKey) -> Self {
        self.method_key = Some(key);
        self
    }

    pub fn multi_parameter_array(mut self, enabled: bool) -> Self {
        self.multi_parameter_array = Some(enabled);
        self
    }

    /// 驱动异步 Bean 方法的执行器；缺省为进程级共享池。
    pub fn executor(mut self, executor: ExecutorRef) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 构建；固定方法名语法非法时失败。
    pub fn build(self) -> Result<BeanProcessor, BeanError> {
        let method = self.method.as_deref().map(MethodCall::parse).transpose()?;
        Ok(self.assemble(method))
    }

    fn assemble(self, method: Option<MethodCall>) -> BeanProcessor {
        let context = self.context.unwrap_or_default();
        let multi_parameter_array = self
            .multi_parameter_array
            .unwrap_or(context.settings().multi_parameter_array);
        BeanProcessor {
            target: self.target,
            shorthand_getters: context.settings().shorthand_getters,
            context,
            method,
            method_key: self.method_key,
            multi_parameter_array,
            executor: self.executor.unwrap_or_else(|| Arc::new(SharedExecutor::global())),
            adapter: Mutex::new(AdapterState::Unchecked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Bean, BeanClass, MethodSignature};
    use ferry_core::ValueType;

    struct Echo;

    impl Bean for Echo {
        fn bean_class(&self) -> Arc<BeanClass> {
            BeanClass::builder::<Echo>("Echo")
                .method(
                    MethodSignature::new("echo").param(ValueType::Text).returns(ValueType::Text),
                    |_e: &Echo, mut args| Ok(Value::text(format!("echo:{}", args.take::<String>(0)?))),
                )
                .method(
                    MethodSignature::new("fail").param(ValueType::Text).returns(ValueType::Text),
                    |_e: &Echo, _args| Err(Fault::wrap_runtime(Fault::illegal_argument("bad input"))),
                )
                .build()
        }
    }

    #[test]
    #[tracing_test::traced_test]
    fn failures_are_recorded_unwrapped() {
        let processor = BeanProcessor::for_bean(Arc::new(Echo));
        let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "fail");
        processor.process(&mut exchange).unwrap();
        let fault = exchange.exception().unwrap();
        assert!(fault.is_a(&kinds::ILLEGAL_ARGUMENT));
        assert_eq!(fault.message(), "bad input");
        assert!(!exchange.in_message().has_header(headers::BEAN_METHOD_NAME));
        assert!(logs_contain("bean invocation failed"));
    }

    #[test]
    fn invalid_method_header_is_reported() {
        let processor = BeanProcessor::for_bean(Arc::new(Echo));
        let mut exchange = Exchange::with_body("x").with_in_header(headers::BEAN_METHOD_NAME, "echo(");
        processor.process(&mut exchange).unwrap();
        let origin = exchange
            .exception()
            .and_then(|f| f.downcast_origin::<BeanError>())
            .unwrap();
        assert_eq!(origin.code(), "bean.invalid_method_name");
    }
}
