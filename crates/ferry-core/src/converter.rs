//! # converter 模块说明
//!
//! ## 角色定位（Why）
//! - 参数绑定与 body 类型匹配都需要“把值转换成声明类型”的能力；
//! - 完整的转换器注册表属于外部协作者，本模块给出契约 [`TypeConverter`] 与覆盖标量常见路径的
//!   [`DefaultTypeConverter`]，并允许登记自定义转换。
//!
//! ## 设计要求（What）
//! - `convert` 无路径时返回 [`ConversionError::NoConverter`]，路径存在但数据非法时返回
//!   [`ConversionError::Failed`]；
//! - `try_convert` 把失败与 `Null` 结果统一视为“无法转换”，供 body 类型匹配使用。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::fault::{Fault, kinds};
use crate::value::{Value, ValueType};

/// 类型转换失败。
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    #[error("no type converter available to convert from {from} to {to}")]
    NoConverter { from: String, to: ValueType },
    #[error("failed to convert from {from} to {to}: {reason}")]
    Failed {
        from: String,
        to: ValueType,
        reason: String,
    },
}

impl ConversionError {
    pub fn no_converter(value: &Value, to: &ValueType) -> Self {
        Self::NoConverter {
            from: value.type_name().into_owned(),
            to: to.clone(),
        }
    }

    pub fn failed(value: &Value, to: &ValueType, reason: impl fmt::Display) -> Self {
        Self::Failed {
            from: value.type_name().into_owned(),
            to: to.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::NoConverter { .. } => "convert.no_converter",
            ConversionError::Failed { .. } => "convert.failed",
        }
    }
}

impl From<ConversionError> for Fault {
    fn from(error: ConversionError) -> Self {
        Fault::new(&kinds::TYPE_CONVERSION, error.to_string())
            .with_code(error.code())
            .with_origin(error)
    }
}

/// 类型转换契约。
pub trait TypeConverter: Send + Sync {
    /// 将 `value` 转换为 `target` 声明的类型。
    fn convert(&self, value: &Value, target: &ValueType) -> Result<Value, ConversionError>;

    /// 尝试转换；失败或得到 `Null` 时返回 `None`。
    fn try_convert(&self, value: &Value, target: &ValueType) -> Option<Value> {
        self.convert(value, target)
            .ok()
            .filter(|converted| !converted.is_null())
    }
}

/// 自定义转换函数。
pub type ConversionFn = Arc<dyn Fn(&Value) -> Result<Value, ConversionError> + Send + Sync>;

/// 内置转换器。
///
/// # 教案式说明
/// - **执行 (How)**：
///   1. `Null` 原样返回，`Void` 目标得到 `Null`，`Future<T>` 目标按 `T` 处理；
///   2. 已可赋值的值直接通过（数值拓宽时产出目标精确变体）；
///   3. 查询自定义转换表（键为运行期类型与目标类型）；
///   4. 回落到内置标量规则：文本与数值/布尔互转、文本与字节互转、单值包装为列表。
/// - **风险提示（Trade-offs）**：数值收窄（如 `Long → Int`）只在无损时成功。
#[derive(Default)]
pub struct DefaultTypeConverter {
    custom: RwLock<HashMap<(ValueType, ValueType), ConversionFn>>,
}

impl DefaultTypeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记 `from → to` 的自定义转换，覆盖同键的既有登记。
    pub fn register<F>(&self, from: ValueType, to: ValueType, conversion: F)
    where
        F: Fn(&Value) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.custom.write().insert((from, to), Arc::new(conversion));
    }

    fn lookup(&self, from: &ValueType, to: &ValueType) -> Option<ConversionFn> {
        self.custom.read().get(&(from.clone(), to.clone())).cloned()
    }
}

impl fmt::Debug for DefaultTypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultTypeConverter")
            .field("custom", &self.custom.read().len())
            .finish()
    }
}

impl TypeConverter for DefaultTypeConverter {
    fn convert(&self, value: &Value, target: &ValueType) -> Result<Value, ConversionError> {
        let target = target.resolved();
        let Some(source) = value.value_type() else {
            return Ok(Value::Null);
        };
        match target {
            ValueType::Void => return Ok(Value::Null),
            ValueType::Any => return Ok(value.clone()),
            _ => {}
        }
        if target.is_assignable_from(&source) {
            return Ok(widen(value, target));
        }
        if let Some(conversion) = self.lookup(&source, target) {
            return conversion(value);
        }
        builtin(value, target)
    }
}

fn widen(value: &Value, target: &ValueType) -> Value {
    match (value, target) {
        (Value::Int(v), ValueType::Long) => Value::Long(i64::from(*v)),
        (Value::Int(v), ValueType::Double) => Value::Double(f64::from(*v)),
        (Value::Long(v), ValueType::Double) => Value::Double(*v as f64),
        _ => value.clone(),
    }
}

fn builtin(value: &Value, target: &ValueType) -> Result<Value, ConversionError> {
    match (value, target) {
        (Value::Text(text), ValueType::Int) => text
            .trim()
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|err| ConversionError::failed(value, target, err)),
        (Value::Text(text), ValueType::Long) => text
            .trim()
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|err| ConversionError::failed(value, target, err)),
        (Value::Text(text), ValueType::Double) => text
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|err| ConversionError::failed(value, target, err)),
        (Value::Text(text), ValueType::Number) => parse_number(text.trim())
            .ok_or_else(|| ConversionError::failed(value, target, "not a number")),
        (Value::Text(text), ValueType::Bool) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ConversionError::failed(value, target, "not a boolean")),
        },
        (Value::Text(text), ValueType::Bytes) => Ok(Value::Bytes(text.as_bytes().to_vec())),
        (Value::Bytes(bytes), ValueType::Text) => String::from_utf8(bytes.clone())
            .map(Value::Text)
            .map_err(|err| ConversionError::failed(value, target, err)),
        (
            Value::Bool(_) | Value::Int(_) | Value::Long(_) | Value::Double(_),
            ValueType::Text,
        ) => Ok(Value::Text(value.to_string())),
        (Value::Long(v), ValueType::Int) => i32::try_from(*v)
            .map(Value::Int)
            .map_err(|err| ConversionError::failed(value, target, err)),
        (Value::Double(v), ValueType::Int) => integral(*v)
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Int)
            .ok_or_else(|| ConversionError::failed(value, target, "lossy narrowing")),
        (Value::Double(v), ValueType::Long) => integral(*v)
            .map(Value::Long)
            .ok_or_else(|| ConversionError::failed(value, target, "lossy narrowing")),
        (Value::List(_), _) => Err(ConversionError::no_converter(value, target)),
        (_, ValueType::List) => Ok(Value::List(vec![value.clone()])),
        _ => Err(ConversionError::no_converter(value, target)),
    }
}

fn integral(v: f64) -> Option<i64> {
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(v) = text.parse::<i32>() {
        return Some(Value::Int(v));
    }
    if let Ok(v) = text.parse::<i64>() {
        return Some(Value::Long(v));
    }
    text.parse::<f64>().ok().map(Value::Double)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_converts_to_int() {
        let converter = DefaultTypeConverter::new();
        assert_eq!(
            converter.convert(&Value::text(" 42 "), &ValueType::Int).unwrap(),
            Value::Int(42)
        );
        assert!(converter.try_convert(&Value::text("abc"), &ValueType::Int).is_none());
    }

    #[test]
    fn widening_produces_target_variant() {
        let converter = DefaultTypeConverter::new();
        assert_eq!(
            converter.convert(&Value::Int(3), &ValueType::Long).unwrap(),
            Value::Long(3)
        );
        assert_eq!(
            converter
                .convert(&Value::Int(3), &ValueType::future(ValueType::Text))
                .unwrap(),
            Value::text("3")
        );
    }

    #[test]
    fn custom_conversion_wins_over_builtin_miss() {
        let converter = DefaultTypeConverter::new();
        let order = ValueType::object("Order");
        assert!(matches!(
            converter.convert(&Value::text("o-1"), &order),
            Err(ConversionError::NoConverter { .. })
        ));
        converter.register(ValueType::Text, order.clone(), |value| {
            Ok(Value::object("Order", value.to_string()))
        });
        let converted = converter.convert(&Value::text("o-1"), &order).unwrap();
        assert_eq!(converted.downcast_object::<String>().unwrap(), "o-1");
    }

    #[test]
    fn conversion_error_becomes_type_conversion_fault() {
        let converter = DefaultTypeConverter::new();
        let error = converter
            .convert(&Value::text("x"), &ValueType::Long)
            .unwrap_err();
        let fault = Fault::from(error);
        assert!(fault.is_a(&kinds::TYPE_CONVERSION));
        assert_eq!(fault.code(), Some("convert.failed"));
        assert!(fault.downcast_origin::<ConversionError>().is_some());
    }
}
