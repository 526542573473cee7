//! # exchange 模块说明
//!
//! ## 角色定位（Why）
//! - Exchange 是路由中一次消息交互的上下文：入站消息、可选的出站消息、属性以及异常槽位；
//! - Bean 调用子系统只消费与就地修改 Exchange，不管理其生命周期。
//!
//! ## 设计要求（What）
//! - 头部与属性使用有序映射，保证诊断输出稳定；
//! - `exception` 为 `None` 表示处理成功；调用方在每次处理之后都必须检查该槽位。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fault::Fault;
use crate::value::Value;

/// 保留头部名称，作为调用方与 Bean 子系统之间的边界协议。
pub mod headers {
    /// 显式指定要调用的方法名，可携带参数值，如 `greet('hi', *)`。
    pub const BEAN_METHOD_NAME: &str = "FerryBeanMethodName";
    /// 将列表形式的 body 视为按位置展开的多参数数组。
    pub const BEAN_MULTI_PARAMETER_ARRAY: &str = "FerryBeanMultiParameterArray";
}

/// 消息交换模式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExchangePattern {
    /// 单向，不期望回复。
    InOnly,
    /// 请求-回复。
    #[default]
    InOut,
}

impl ExchangePattern {
    /// 是否期望回复。
    pub fn is_out_capable(self) -> bool {
        matches!(self, ExchangePattern::InOut)
    }
}

impl fmt::Display for ExchangePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangePattern::InOnly => f.write_str("InOnly"),
            ExchangePattern::InOut => f.write_str("InOut"),
        }
    }
}

/// 一条消息：body 与头部。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    body: Value,
    headers: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> Value {
        std::mem::take(&mut self.body)
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    pub fn headers(&self) -> &BTreeMap<String, Value> {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.headers
    }
}

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// 在途消息交换。
///
/// # 契约说明（What）
/// - `id` 在进程内单调递增，仅用于诊断；
/// - `out_message` 只在处理步骤产生回复时创建，[`Exchange::result_message`] 在其缺席时回落到入站消息；
/// - 克隆会复制全部消息数据，`Object` 值按引用共享。
#[derive(Clone, Debug)]
pub struct Exchange {
    id: String,
    pattern: ExchangePattern,
    in_message: Message,
    out_message: Option<Message>,
    properties: BTreeMap<String, Value>,
    exception: Option<Fault>,
}

impl Exchange {
    pub fn new(pattern: ExchangePattern) -> Self {
        let sequence = NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("ID-ferry-{sequence}"),
            pattern,
            in_message: Message::default(),
            out_message: None,
            properties: BTreeMap::new(),
            exception: None,
        }
    }

    /// 以请求-回复模式创建并设置入站 body。
    pub fn with_body(body: impl Into<Value>) -> Self {
        let mut exchange = Self::new(ExchangePattern::InOut);
        exchange.in_message.set_body(body);
        exchange
    }

    pub fn with_in_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.in_message.set_header(name, value);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    pub fn set_pattern(&mut self, pattern: ExchangePattern) {
        self.pattern = pattern;
    }

    pub fn in_message(&self) -> &Message {
        &self.in_message
    }

    pub fn in_message_mut(&mut self) -> &mut Message {
        &mut self.in_message
    }

    pub fn has_out(&self) -> bool {
        self.out_message.is_some()
    }

    pub fn out_message(&self) -> Option<&Message> {
        self.out_message.as_ref()
    }

    /// 返回出站消息，不存在时先创建空消息。
    pub fn out_message_mut(&mut self) -> &mut Message {
        self.out_message.get_or_insert_with(Message::default)
    }

    pub fn set_out_message(&mut self, message: Message) {
        self.out_message = Some(message);
    }

    pub fn take_out_message(&mut self) -> Option<Message> {
        self.out_message.take()
    }

    /// 处理结果所在的消息：出站消息优先，否则为入站消息。
    pub fn result_message(&self) -> &Message {
        self.out_message.as_ref().unwrap_or(&self.in_message)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn exception(&self) -> Option<&Fault> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, fault: Fault) {
        self.exception = Some(fault);
    }

    pub fn take_exception(&mut self) -> Option<Fault> {
        self.exception.take()
    }

    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new(ExchangePattern::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Exchange::default();
        let b = Exchange::default();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn result_message_falls_back_to_inbound() {
        let mut exchange = Exchange::with_body("in");
        assert_eq!(exchange.result_message().body(), &Value::text("in"));
        exchange.out_message_mut().set_body("out");
        assert_eq!(exchange.result_message().body(), &Value::text("out"));
    }
}
