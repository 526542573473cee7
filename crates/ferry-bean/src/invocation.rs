//! 延迟调用：代理把一次接口调用打包为消息 body，调用引擎识别后直接调用同名同参方法。

use std::fmt;

use ferry_core::{Value, ValueType};

/// 一次已记录但尚未执行的方法调用。
#[derive(Clone, Debug, PartialEq)]
pub struct DeferredInvocation {
    method: String,
    parameter_types: Vec<ValueType>,
    arguments: Vec<Value>,
}

impl DeferredInvocation {
    /// 作为 `Value::Object` 携带时的类型名。
    pub const TYPE_NAME: &'static str = "ferry.DeferredInvocation";

    pub fn new(method: impl Into<String>, parameter_types: Vec<ValueType>, arguments: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            parameter_types,
            arguments,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameter_types(&self) -> &[ValueType] {
        &self.parameter_types
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn into_value(self) -> Value {
        Value::object(Self::TYPE_NAME, self)
    }

    /// 从消息 body 中识别延迟调用。
    pub fn from_value(value: &Value) -> Option<&DeferredInvocation> {
        value.downcast_object::<DeferredInvocation>()
    }
}

impl fmt::Display for DeferredInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.method)?;
        for (index, ty) in self.parameter_types.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}
