//! # parameter 模块说明
//!
//! ## 角色定位（Why）
//! - 方法的每个参数都绑定一个表达式：自定义注解、参数映射策略或 body 兜底三者之一；
//!   调用时逐个求值并按声明类型转换，失败以 [`BeanError::ParameterBinding`] 报告；
//! - 方法名提示可以携带参数值（`greet('ann', *)`），[`MethodCall`] 负责语法解析，
//!   解析结果既参与重载筛选，也在求值阶段覆盖对应位置的绑定。
//!
//! ## 关键约束（What）
//! - `Exchange` 类型的参数不求值，占位为 `Null`，调用器通过 `Arguments::exchange` 访问；
//! - 表达式得到 `Null` 时保持 `Null`，不交给转换器。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ferry_core::{Exchange, ExpressionRef, TypeConverter, Value, ValueType, expression};

use crate::error::BeanError;

/// 参数的绑定来源。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingRole {
    /// body 参数：入站 body 按声明类型转换。
    Body,
    /// Exchange 本身。
    Exchange,
    /// 由参数注解给出的表达式。
    Custom,
    /// 由参数映射策略给出的表达式。
    Strategy,
}

/// 单个参数的绑定。
#[derive(Clone)]
pub struct ParameterBinding {
    index: usize,
    ty: ValueType,
    role: BindingRole,
    expression: Option<ExpressionRef>,
}

impl ParameterBinding {
    pub fn body(index: usize, ty: ValueType) -> Self {
        Self {
            index,
            ty,
            role: BindingRole::Body,
            expression: Some(expression::body()),
        }
    }

    pub fn exchange(index: usize) -> Self {
        Self {
            index,
            ty: ValueType::Exchange,
            role: BindingRole::Exchange,
            expression: None,
        }
    }

    pub fn custom(index: usize, ty: ValueType, expression: ExpressionRef) -> Self {
        Self {
            index,
            ty,
            role: BindingRole::Custom,
            expression: Some(expression),
        }
    }

    pub fn strategy(index: usize, ty: ValueType, expression: ExpressionRef) -> Self {
        Self {
            index,
            ty,
            role: BindingRole::Strategy,
            expression: Some(expression),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ty(&self) -> &ValueType {
        &self.ty
    }

    pub fn role(&self) -> BindingRole {
        self.role
    }

    pub fn expression(&self) -> Option<&ExpressionRef> {
        self.expression.as_ref()
    }

    /// 求值并转换为声明类型。
    pub fn evaluate(
        &self,
        exchange: &Exchange,
        converter: &dyn TypeConverter,
        method: &str,
    ) -> Result<Value, BeanError> {
        let Some(expression) = self.expression.as_ref() else {
            return Ok(Value::Null);
        };
        let value = expression.evaluate(exchange).map_err(|fault| BeanError::ParameterBinding {
            method: method.to_owned(),
            index: self.index,
            expected: self.ty.clone(),
            actual: format!("{expression:?}"),
            reason: fault.to_string(),
        })?;
        tracing::trace!(method, index = self.index, value = %value, "evaluated parameter");
        self.coerce(value, converter, method)
    }

    /// 把给定值转换为声明类型；`Null` 原样返回。
    pub fn coerce(
        &self,
        value: Value,
        converter: &dyn TypeConverter,
        method: &str,
    ) -> Result<Value, BeanError> {
        if value.is_null() || self.role == BindingRole::Exchange {
            return Ok(value);
        }
        converter
            .convert(&value, &self.ty)
            .map_err(|error| BeanError::ParameterBinding {
                method: method.to_owned(),
                index: self.index,
                expected: self.ty.clone(),
                actual: value.type_name().into_owned(),
                reason: error.to_string(),
            })
    }
}

impl fmt::Debug for ParameterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterBinding")
            .field("index", &self.index)
            .field("ty", &self.ty)
            .field("role", &self.role)
            .finish()
    }
}

/// 参数映射策略：为未注解的参数按类型给出默认表达式。
pub trait ParameterMappingStrategy: Send + Sync {
    /// 策略标识，参与类型描述缓存的键。
    fn id(&self) -> &str;

    fn default_expression(&self, ty: &ValueType) -> Option<ExpressionRef>;
}

/// 默认策略：`Fault` 类型参数绑定 Exchange 上的异常。
pub struct DefaultParameterMappingStrategy {
    id: String,
    mappings: HashMap<ValueType, ExpressionRef>,
}

impl DefaultParameterMappingStrategy {
    pub fn new() -> Self {
        let mut mappings = HashMap::new();
        mappings.insert(ValueType::Fault, expression::exception());
        Self {
            id: "default".to_owned(),
            mappings,
        }
    }

    /// 追加或覆盖一个类型映射。改变映射时应同时改变 `id`，否则缓存会复用旧的内省结果。
    pub fn with_mapping(mut self, ty: ValueType, expression: ExpressionRef) -> Self {
        self.mappings.insert(ty, expression);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Default for DefaultParameterMappingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultParameterMappingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultParameterMappingStrategy")
            .field("id", &self.id)
            .field("mappings", &self.mappings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ParameterMappingStrategy for DefaultParameterMappingStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn default_expression(&self, ty: &ValueType) -> Option<ExpressionRef> {
        self.mappings.get(ty).cloned()
    }
}

/// 方法名中给出的单个参数值。
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterValue {
    /// `*`：沿用正常绑定。
    Wildcard,
    /// `null`：强制为空。
    Null,
    /// 字面量：`'text'`、`"text"`、数字、`true`/`false`。
    Literal(Value),
    /// 类型名：只参与重载筛选，求值时沿用正常绑定。
    Type(ValueType),
}

impl ParameterValue {
    fn parse(token: &str) -> Self {
        let token = token.trim();
        if token == "*" {
            return ParameterValue::Wildcard;
        }
        if token == "null" {
            return ParameterValue::Null;
        }
        if let Some(text) = unquote(token) {
            return ParameterValue::Literal(Value::text(text));
        }
        match token {
            "true" => return ParameterValue::Literal(Value::Bool(true)),
            "false" => return ParameterValue::Literal(Value::Bool(false)),
            _ => {}
        }
        if let Ok(int) = token.parse::<i32>() {
            return ParameterValue::Literal(Value::Int(int));
        }
        if let Ok(long) = token.parse::<i64>() {
            return ParameterValue::Literal(Value::Long(long));
        }
        if token.contains('.')
            && let Ok(double) = token.parse::<f64>()
        {
            return ParameterValue::Literal(Value::Double(double));
        }
        match ValueType::parse(token) {
            Some(ty) => ParameterValue::Type(ty),
            None => ParameterValue::Wildcard,
        }
    }

    /// 不做转换时，该值能否落在声明类型 `ty` 的参数上。
    pub fn matches_exactly(&self, ty: &ValueType) -> bool {
        match self {
            ParameterValue::Wildcard | ParameterValue::Null => true,
            ParameterValue::Literal(value) => ty.accepts(value),
            ParameterValue::Type(declared) => ty == declared,
        }
    }

    /// 借助转换器时，该值能否落在声明类型 `ty` 的参数上。
    pub fn matches_with(&self, ty: &ValueType, converter: &dyn TypeConverter) -> bool {
        match self {
            ParameterValue::Literal(value) => converter.try_convert(value, ty).is_some(),
            ParameterValue::Type(declared) => ty.is_assignable_from(declared),
            ParameterValue::Wildcard | ParameterValue::Null => true,
        }
    }
}

fn unquote(token: &str) -> Option<&str> {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return Some(&token[1..token.len() - 1]);
        }
    }
    None
}

/// 解析后的方法名提示。
///
/// # 教案式说明
/// - **语法 (What)**：`name`、`name()`、`name(v1, v2, ...)`；参数值以逗号分隔，
///   引号内与嵌套括号内的逗号不参与分隔；
/// - **前置条件**：名称非空、括号成对且右括号位于末尾，否则返回 [`BeanError::InvalidMethodName`]；
/// - **语义**：`name()` 要求无参重载；带参数值时按参数个数筛选重载，并在求值时覆盖对应位置。
#[derive(Clone, Debug, PartialEq)]
pub struct MethodCall {
    name: String,
    parameters: Option<Vec<ParameterValue>>,
}

impl MethodCall {
    pub fn parse(text: &str) -> Result<Self, BeanError> {
        let text = text.trim();
        let invalid = |reason: &str| BeanError::InvalidMethodName {
            name: text.to_owned(),
            reason: reason.to_owned(),
        };
        let Some(open) = text.find('(') else {
            if text.contains(')') {
                return Err(invalid("unbalanced parenthesis"));
            }
            if text.is_empty() {
                return Err(invalid("method name is empty"));
            }
            return Ok(Self {
                name: text.to_owned(),
                parameters: None,
            });
        };
        let name = text[..open].trim();
        if name.is_empty() {
            return Err(invalid("method name is empty"));
        }
        if !text.ends_with(')') {
            return Err(invalid("method name must end with `)`"));
        }
        let inner = &text[open + 1..text.len() - 1];
        let tokens = split_parameters(inner).ok_or_else(|| invalid("unbalanced parenthesis or quote"))?;
        let parameters = tokens.iter().map(|t| ParameterValue::parse(t)).collect();
        Ok(Self {
            name: name.to_owned(),
            parameters: Some(parameters),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 括号内的参数值；没有括号时为 `None`。
    pub fn parameters(&self) -> Option<&[ParameterValue]> {
        self.parameters.as_deref()
    }

    /// 形如 `name()`。
    pub fn demands_no_parameters(&self) -> bool {
        matches!(&self.parameters, Some(values) if values.is_empty())
    }

    /// 带有至少一个参数值。
    pub fn has_parameter_values(&self) -> bool {
        matches!(&self.parameters, Some(values) if !values.is_empty())
    }

    pub fn parameter(&self, index: usize) -> Option<&ParameterValue> {
        self.parameters.as_ref().and_then(|values| values.get(index))
    }
}

impl fmt::Display for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(values) = &self.parameters {
            write!(f, "({} parameters)", values.len())?;
        }
        Ok(())
    }
}

fn split_parameters(inner: &str) -> Option<Vec<String>> {
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    for ch in inner.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '(') => {
                depth += 1;
                current.push(ch);
            }
            (None, ')') => {
                depth = depth.checked_sub(1)?;
                current.push(ch);
            }
            (None, ',') if depth == 0 => tokens.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() || depth != 0 {
        return None;
    }
    tokens.push(current);
    Some(tokens.into_iter().map(|t| t.trim().to_owned()).collect())
}

/// 共享策略引用。
pub type StrategyRef = Arc<dyn ParameterMappingStrategy>;

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{DefaultTypeConverter, Fault};

    #[test]
    fn parses_plain_and_parameterised_names() {
        let plain = MethodCall::parse("greet").unwrap();
        assert_eq!(plain.name(), "greet");
        assert!(plain.parameters().is_none());

        let empty = MethodCall::parse("greet()").unwrap();
        assert!(empty.demands_no_parameters());

        let call = MethodCall::parse("greet('a, b', *, 42, null, true, Text)").unwrap();
        assert_eq!(
            call.parameters().unwrap(),
            &[
                ParameterValue::Literal(Value::text("a, b")),
                ParameterValue::Wildcard,
                ParameterValue::Literal(Value::Int(42)),
                ParameterValue::Null,
                ParameterValue::Literal(Value::Bool(true)),
                ParameterValue::Type(ValueType::Text),
            ]
        );
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["greet(", "greet)", "greet('x)", "(1)", "greet(a)b", ""] {
            let error = MethodCall::parse(bad).unwrap_err();
            assert_eq!(error.code(), "bean.invalid_method_name", "{bad}");
        }
    }

    #[test]
    fn body_binding_converts_to_declared_type() {
        let converter = DefaultTypeConverter::new();
        let binding = ParameterBinding::body(0, ValueType::Int);
        let exchange = Exchange::with_body("17");
        assert_eq!(
            binding.evaluate(&exchange, &converter, "m").unwrap(),
            Value::Int(17)
        );

        let exchange = Exchange::with_body("seventeen");
        let error = binding.evaluate(&exchange, &converter, "m").unwrap_err();
        assert_eq!(error.code(), "bean.parameter_binding");
    }

    #[test]
    fn null_values_skip_conversion() {
        let converter = DefaultTypeConverter::new();
        let binding = ParameterBinding::custom(1, ValueType::Int, expression::header("missing"));
        let exchange = Exchange::with_body("x");
        assert_eq!(
            binding.evaluate(&exchange, &converter, "m").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn default_strategy_binds_faults_to_exception() {
        let strategy = DefaultParameterMappingStrategy::new();
        let expression = strategy.default_expression(&ValueType::Fault).unwrap();
        let mut exchange = Exchange::with_body("x");
        exchange.set_exception(Fault::runtime("boom"));
        let value = expression.evaluate(&exchange).unwrap();
        assert_eq!(value.as_fault().map(Fault::message), Some("boom"));
        assert!(strategy.default_expression(&ValueType::Text).is_none());
    }
}
