//! 消息数据的动态表示与声明类型。
//!
//! # 教案式说明
//! - **意图 (Why)**：Bean 方法的参数与返回值在运行期才能确定具体类型，Exchange 的 body/header
//!   需要一个统一的动态载体；选方法算法又需要“声明类型是否可由运行期类型赋值”的判断。
//! - **契约 (What)**：[`Value`] 是动态数据，[`ValueType`] 是声明类型；
//!   `ValueType::is_assignable_from` 实现精确匹配、`Any` 兜底、`Number` 聚合以及
//!   `Int → Long → Double` 的拓宽规则。
//! - **执行 (How)**：`Object` 变体以 `Arc<dyn Any>` 承载不透明对象（例如延迟调用描述），
//!   通过类型名参与匹配。

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::fault::Fault;

/// 不透明对象值。
#[derive(Clone)]
pub struct ObjectValue {
    type_name: Cow<'static, str>,
    value: Arc<dyn Any + Send + Sync>,
}

impl ObjectValue {
    pub fn new<T>(type_name: impl Into<Cow<'static, str>>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    pub fn from_arc(
        type_name: impl Into<Cow<'static, str>>,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn as_arc(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.value
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.type_name)
    }
}

/// 动态消息数据。
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Fault(Fault),
    Object(ObjectValue),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn object<T>(type_name: impl Into<Cow<'static, str>>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::Object(ObjectValue::new(type_name, value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// 运行期类型；`Null` 没有类型。
    pub fn value_type(&self) -> Option<ValueType> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Bytes(_) => ValueType::Bytes,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
            Value::Fault(_) => ValueType::Fault,
            Value::Object(object) => ValueType::Object(Cow::Owned(object.type_name().to_owned())),
        };
        Some(ty)
    }

    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed("null"),
            Value::Object(object) => Cow::Borrowed(object.type_name()),
            other => match other.value_type() {
                Some(ty) => Cow::Owned(ty.to_string()),
                None => Cow::Borrowed("null"),
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Value::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// 若为 `Object` 且底层类型为 `T`，返回其引用。
    pub fn downcast_object<T: Any>(&self) -> Option<&T> {
        self.as_object().and_then(ObjectValue::downcast_ref::<T>)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Fault(a), Value::Fault(b)) => {
                a.kind() == b.kind() && a.message() == b.message()
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a.as_arc(), b.as_arc()),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_str("}")
            }
            Value::Fault(fault) => write!(f, "{fault}"),
            Value::Object(object) => write!(f, "{}@{:p}", object.type_name(), object.as_arc()),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    Vec<Value> => List,
    BTreeMap<String, Value> => Map,
    Fault => Fault,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// 从 [`Value`] 中按精确类型取出 Rust 值。
///
/// 引擎在调用前已经把参数转换成声明类型，因此这里只做变体匹配，不做二次转换。
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, Fault>;
}

fn mismatch(expected: &str, value: &Value) -> Fault {
    Fault::illegal_argument(format!(
        "expected {expected} but got {}",
        value.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, Fault> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, Fault> {
        value.as_bool().ok_or_else(|| mismatch("Bool", &value))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(mismatch("Int", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, Fault> {
        value.as_i64().ok_or_else(|| mismatch("Long", &value))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, Fault> {
        value.as_f64().ok_or_else(|| mismatch("Double", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Text(text) => Ok(text),
            other => Err(mismatch("Text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Bytes(bytes) => Ok(bytes),
            other => Err(mismatch("Bytes", &other)),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::List(items) => Ok(items),
            other => Err(mismatch("List", &other)),
        }
    }
}

impl FromValue for BTreeMap<String, Value> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Map(entries) => Ok(entries),
            other => Err(mismatch("Map", &other)),
        }
    }
}

impl FromValue for Fault {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Fault(fault) => Ok(fault),
            other => Err(mismatch("Fault", &other)),
        }
    }
}

impl<T> FromValue for Option<T>
where
    T: FromValue,
{
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// 参数或返回值的声明类型。
///
/// # 契约说明（What）
/// - `Exchange` 只出现在参数声明中，表示“绑定 Exchange 本身”；
/// - `Future(T)` 只出现在返回值声明中，表示异步结果，`T` 为完成值的类型；
/// - `Void` 只出现在返回值声明中。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Long,
    Double,
    Number,
    Text,
    Bytes,
    List,
    Map,
    Fault,
    Exchange,
    Object(Cow<'static, str>),
    Future(Box<ValueType>),
    Void,
}

impl ValueType {
    pub fn object(name: impl Into<Cow<'static, str>>) -> Self {
        ValueType::Object(name.into())
    }

    pub fn future(inner: ValueType) -> Self {
        ValueType::Future(Box::new(inner))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ValueType::Void)
    }

    pub fn is_future(&self) -> bool {
        matches!(self, ValueType::Future(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Int | ValueType::Long | ValueType::Double | ValueType::Number
        )
    }

    /// 对 `Future(T)` 返回 `T`，其余返回自身。
    pub fn resolved(&self) -> &ValueType {
        match self {
            ValueType::Future(inner) => inner,
            other => other,
        }
    }

    /// 判断 `self` 声明的位置能否接收运行期类型为 `from` 的值。
    pub fn is_assignable_from(&self, from: &ValueType) -> bool {
        if self == from {
            return !matches!(self, ValueType::Void);
        }
        match (self, from) {
            (ValueType::Any, ValueType::Void) => false,
            (ValueType::Any, _) => true,
            (ValueType::Number, ValueType::Int | ValueType::Long | ValueType::Double) => true,
            (ValueType::Long, ValueType::Int) => true,
            (ValueType::Double, ValueType::Int | ValueType::Long) => true,
            _ => false,
        }
    }

    /// 判断运行期值能否直接赋给该声明类型；`Null` 可赋给除 `Void` 之外的任何类型。
    pub fn accepts(&self, value: &Value) -> bool {
        match value.value_type() {
            Some(ty) => self.is_assignable_from(&ty),
            None => !self.is_void(),
        }
    }

    /// 从源码形式的签名文本解析声明类型，支持 `Future<T>` 等泛型写法。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：代理接口的返回类型常以文本给出（如 `CompletableFuture<String>`），
    ///   需要解析出异步结果的类型参数才能正确转换返回值；
    /// - **执行 (How)**：去掉空白后识别 `Future`/`CompletableFuture`/`CompletionStage` 外壳并递归解析
    ///   尖括号内部；不带类型参数的 future 视为 `Future<Any>`；无法识别的名字视为 `Object(name)`。
    pub fn parse(signature: &str) -> Option<ValueType> {
        let signature = signature.trim();
        if signature.is_empty() {
            return None;
        }
        if let Some(open) = signature.find('<') {
            if !signature.ends_with('>') {
                return None;
            }
            let outer = signature[..open].trim();
            let inner = &signature[open + 1..signature.len() - 1];
            let simple = outer.rsplit(['.', ':']).next().unwrap_or(outer);
            return match simple {
                "Future" | "CompletableFuture" | "CompletionStage" | "BoxFuture" => {
                    ValueType::parse(inner).map(ValueType::future)
                }
                "List" | "Vec" => Some(ValueType::List),
                "Map" | "HashMap" | "BTreeMap" => Some(ValueType::Map),
                _ => Some(ValueType::object(outer.to_owned())),
            };
        }
        let ty = match signature {
            "()" | "void" | "Void" => ValueType::Void,
            "any" | "Any" | "Object" => ValueType::Any,
            "bool" | "boolean" | "Bool" | "Boolean" => ValueType::Bool,
            "i32" | "int" | "Int" | "Integer" => ValueType::Int,
            "i64" | "long" | "Long" => ValueType::Long,
            "f64" | "double" | "Double" => ValueType::Double,
            "Number" => ValueType::Number,
            "String" | "str" | "&str" | "Text" => ValueType::Text,
            "bytes" | "Bytes" | "byte[]" => ValueType::Bytes,
            "List" | "Vec" => ValueType::List,
            "Map" => ValueType::Map,
            "Fault" | "Exception" | "Throwable" => ValueType::Fault,
            "Exchange" => ValueType::Exchange,
            "Future" | "CompletableFuture" | "CompletionStage" => ValueType::future(ValueType::Any),
            other => ValueType::object(other.to_owned()),
        };
        Some(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("Any"),
            ValueType::Bool => f.write_str("Bool"),
            ValueType::Int => f.write_str("Int"),
            ValueType::Long => f.write_str("Long"),
            ValueType::Double => f.write_str("Double"),
            ValueType::Number => f.write_str("Number"),
            ValueType::Text => f.write_str("Text"),
            ValueType::Bytes => f.write_str("Bytes"),
            ValueType::List => f.write_str("List"),
            ValueType::Map => f.write_str("Map"),
            ValueType::Fault => f.write_str("Fault"),
            ValueType::Exchange => f.write_str("Exchange"),
            ValueType::Object(name) => f.write_str(name),
            ValueType::Future(inner) => write!(f, "Future<{inner}>"),
            ValueType::Void => f.write_str("Void"),
        }
    }
}
