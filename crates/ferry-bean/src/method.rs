//! # method 模块说明
//!
//! ## 角色定位（Why）
//! - [`MethodDescriptor`] 是单个候选方法的不可变元数据：参数绑定、body 参数子序列、
//!   注解标志、交换模式、返回类型与调用器，内省后经 `Arc` 共享给选择器与调用引擎；
//! - [`MethodKey`] 以“声明类 + 方法名 + 参数类型”唯一标识方法，作为方法级缓存的键。
//!
//! ## 调用语义（What）
//! - `invoke` 捕获调用器内的 panic 并转换为 `PanicException` 类故障，调用边界不会展开；
//! - 异步调用器返回的 Future 同样经过 panic 捕获，结果以 [`InvocationOutcome::Pending`] 交还；
//! - `fill_result` 对非 `Void` 返回值写出站 body 并复制入站头部，`Void` 不改动出站消息。

use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use ferry_core::{
    BoxFuture, Exchange, ExchangePattern, Fault, FaultKind, TypeConverter, Value, ValueType, kinds,
};
use futures::FutureExt;

use crate::class::{Arguments, Invoker, Upcast};
use crate::error::BeanError;
use crate::parameter::{BindingRole, MethodCall, ParameterBinding, ParameterValue};

/// 方法的唯一标识。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    declaring: TypeId,
    class_name: Arc<str>,
    name: Arc<str>,
    params: Arc<[ValueType]>,
}

impl MethodKey {
    pub fn new(
        declaring: TypeId,
        class_name: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        params: Vec<ValueType>,
    ) -> Self {
        Self {
            declaring,
            class_name: class_name.into(),
            name: name.into(),
            params: params.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(class_name: &str, name: &str, params: Vec<ValueType>) -> Self {
        Self::new(TypeId::of::<()>(), class_name, name, params)
    }

    pub fn declaring_type(&self) -> TypeId {
        self.declaring
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.class_name, self.name)?;
        for (index, ty) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// 一次调用的结果形态。
pub enum InvocationOutcome {
    /// 调用器同步返回。
    Ready(Value),
    /// 调用器返回 Future，需由调用方驱动。
    Pending(BoxFuture<'static, Result<Value, Fault>>),
}

impl fmt::Debug for InvocationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationOutcome::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            InvocationOutcome::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// 单个候选方法的元数据。
#[derive(Clone)]
pub struct MethodDescriptor {
    key: MethodKey,
    bindings: Vec<ParameterBinding>,
    body_indices: Vec<usize>,
    custom_annotation: bool,
    handler_annotation: bool,
    pattern: ExchangePattern,
    return_type: ValueType,
    throws: Vec<&'static FaultKind>,
    invoker: Invoker,
    upcasts: Vec<Arc<dyn Upcast>>,
}

/// 内省阶段组装 [`MethodDescriptor`] 的参数集合。
pub(crate) struct MethodParts {
    pub key: MethodKey,
    pub bindings: Vec<ParameterBinding>,
    pub body_indices: Vec<usize>,
    pub custom_annotation: bool,
    pub handler_annotation: bool,
    pub pattern: ExchangePattern,
    pub return_type: ValueType,
    pub throws: Vec<&'static FaultKind>,
    pub invoker: Invoker,
    pub upcasts: Vec<Arc<dyn Upcast>>,
}

impl MethodDescriptor {
    pub(crate) fn from_parts(parts: MethodParts) -> Self {
        Self {
            key: parts.key,
            bindings: parts.bindings,
            body_indices: parts.body_indices,
            custom_annotation: parts.custom_annotation,
            handler_annotation: parts.handler_annotation,
            pattern: parts.pattern,
            return_type: parts.return_type,
            throws: parts.throws,
            invoker: parts.invoker,
            upcasts: parts.upcasts,
        }
    }

    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn parameter_types(&self) -> &[ValueType] {
        self.key.params()
    }

    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    pub fn parameter_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn has_body_parameter(&self) -> bool {
        !self.body_indices.is_empty()
    }

    /// 第一个 body 参数的声明类型。
    pub fn body_parameter_type(&self) -> Option<&ValueType> {
        self.body_indices
            .first()
            .and_then(|index| self.bindings.get(*index))
            .map(ParameterBinding::ty)
    }

    pub fn has_custom_annotation(&self) -> bool {
        self.custom_annotation
    }

    pub fn has_handler_annotation(&self) -> bool {
        self.handler_annotation
    }

    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }

    /// 返回类型（解开 `Future` 后）为 `Void`。
    pub fn is_returning_void(&self) -> bool {
        self.return_type.resolved().is_void()
    }

    pub fn throws(&self) -> &[&'static FaultKind] {
        &self.throws
    }

    pub fn is_async(&self) -> bool {
        self.invoker.is_async()
    }

    /// 是否有参数接收 `Fault`。
    pub fn has_fault_parameter(&self) -> bool {
        self.bindings.iter().any(|b| *b.ty() == ValueType::Fault)
    }

    /// getter 形态：`getX()`/`get_x()` 返回非 `Void`，或 `isX()`/`is_x()` 返回 `Bool`。
    pub fn is_getter(&self) -> bool {
        if !self.bindings.is_empty() {
            return false;
        }
        let name = self.name();
        if accessor_suffix(name, "get").is_some() {
            return !self.is_returning_void();
        }
        accessor_suffix(name, "is").is_some() && *self.return_type.resolved() == ValueType::Bool
    }

    /// setter 形态：`setX(v)`/`set_x(v)` 且返回 `Void`。
    pub fn is_setter(&self) -> bool {
        self.bindings.len() == 1
            && self.is_returning_void()
            && accessor_suffix(self.name(), "set").is_some()
    }

    /// 求出全部实参。
    ///
    /// # 教案式说明
    /// - **多参数数组模式**：入站 body 为列表时按位置取元素，否则视为单元素列表；缺失位置与
    ///   `Exchange` 参数为 `Null`；
    /// - **方法名参数值**：`*` 与类型名沿用正常绑定，`null` 强制为空，字面量转换为声明类型；
    /// - **正常绑定**：逐个求值并转换，第一个失败即返回。
    pub fn evaluate_arguments(
        &self,
        exchange: &Exchange,
        converter: &dyn TypeConverter,
        call: Option<&MethodCall>,
        multi_parameter_array: bool,
    ) -> Result<Vec<Value>, BeanError> {
        let label = self.key.to_string();
        if multi_parameter_array {
            let elements = match exchange.in_message().body() {
                Value::List(items) => items.clone(),
                Value::Null => Vec::new(),
                other => vec![other.clone()],
            };
            return self
                .bindings
                .iter()
                .map(|binding| match elements.get(binding.index()) {
                    _ if binding.role() == BindingRole::Exchange => Ok(Value::Null),
                    Some(value) => binding.coerce(value.clone(), converter, &label),
                    None => Ok(Value::Null),
                })
                .collect();
        }
        let mut values = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            let value = match call.and_then(|c| c.parameter(binding.index())) {
                Some(ParameterValue::Null) => Value::Null,
                Some(ParameterValue::Literal(literal)) if binding.role() != BindingRole::Exchange => {
                    binding.coerce(literal.clone(), converter, &label)?
                }
                _ => binding.evaluate(exchange, converter, &label)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// 在目标实例上调用。`target` 为具体类的实例，继承方法经投影链到达声明类。
    pub fn invoke(
        &self,
        target: &dyn Any,
        exchange: &mut Exchange,
        arguments: Vec<Value>,
    ) -> Result<InvocationOutcome, Fault> {
        let mut receiver = target;
        for upcast in &self.upcasts {
            receiver = upcast.upcast(receiver).ok_or_else(|| {
                Fault::illegal_state(format!("cannot reach declaring class of {}", self.key))
            })?;
        }
        tracing::trace!(method = %self.key, "invoking bean method");
        let arguments = Arguments::new(arguments, exchange);
        match &self.invoker {
            Invoker::Sync(invoke) => {
                let result = catch_unwind(AssertUnwindSafe(|| invoke(receiver, arguments)))
                    .map_err(|payload| panic_fault(&self.key, payload.as_ref()))?;
                result.map(InvocationOutcome::Ready)
            }
            Invoker::Async(invoke) => {
                let future = catch_unwind(AssertUnwindSafe(|| invoke(receiver, arguments)))
                    .map_err(|payload| panic_fault(&self.key, payload.as_ref()))?;
                let key = self.key.clone();
                let guarded = AssertUnwindSafe(future).catch_unwind().map(move |result| {
                    result.unwrap_or_else(|payload| Err(panic_fault(&key, payload.as_ref())))
                });
                Ok(InvocationOutcome::Pending(Box::pin(guarded)))
            }
        }
    }

    /// 把返回值写入 Exchange。
    pub fn fill_result(&self, exchange: &mut Exchange, result: Value) {
        if self.is_returning_void() {
            return;
        }
        let headers = exchange.in_message().headers().clone();
        let out = exchange.out_message_mut();
        out.headers_mut().extend(headers);
        out.set_body(result);
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("key", &self.key)
            .field("body_indices", &self.body_indices)
            .field("custom_annotation", &self.custom_annotation)
            .field("handler_annotation", &self.handler_annotation)
            .field("pattern", &self.pattern)
            .field("return_type", &self.return_type)
            .finish()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}

fn accessor_suffix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?;
    if let Some(snake) = rest.strip_prefix('_') {
        return (!snake.is_empty()).then_some(snake);
    }
    rest.chars()
        .next()
        .filter(|c| c.is_ascii_uppercase())
        .map(|_| rest)
}

fn panic_fault(key: &MethodKey, payload: &(dyn Any + Send)) -> Fault {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    Fault::new(&kinds::PANIC, format!("bean method {key} panicked: {detail}"))
        .with_code("bean.invocation_panic")
}
