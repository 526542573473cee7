//! # expression 模块说明
//!
//! ## 角色定位（Why）
//! - 参数绑定的每一项都归结为“对 Exchange 求值得到一个 [`Value`]”；
//! - 完整的表达式语言（simple、XPath 等）不属于本仓库，这里只定义求值契约、
//!   内置的 body/header/property 取值表达式以及按名称注册语言的注册表。
//!
//! ## 设计要求（What）
//! - [`Expression`] 为对象安全 trait，以 `Arc<dyn Expression>` 在描述符间共享；
//! - 求值失败返回 `ExpressionEvaluationException` 类故障。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::exchange::Exchange;
use crate::fault::{Fault, kinds};
use crate::value::Value;

/// 针对 Exchange 的求值能力。
pub trait Expression: Send + Sync + fmt::Debug {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault>;
}

/// 共享表达式引用。
pub type ExpressionRef = Arc<dyn Expression>;

fn evaluation_fault(message: String) -> Fault {
    Fault::new(&kinds::EXPRESSION_EVALUATION, message).with_code("expression.evaluation")
}

/// 入站 body。
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyExpression;

impl Expression for BodyExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        Ok(exchange.in_message().body().clone())
    }
}

/// 入站 body，为空时失败。
#[derive(Debug, Default, Clone, Copy)]
pub struct MandatoryBodyExpression;

impl Expression for MandatoryBodyExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        let body = exchange.in_message().body();
        if body.is_null() {
            return Err(evaluation_fault(format!(
                "no body available on exchange {}",
                exchange.id()
            )));
        }
        Ok(body.clone())
    }
}

/// 单个入站头部，缺失时为 `Null`。
#[derive(Debug, Clone)]
pub struct HeaderExpression {
    name: String,
}

impl Expression for HeaderExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        Ok(exchange
            .in_message()
            .header(&self.name)
            .cloned()
            .unwrap_or_default())
    }
}

/// 全部入站头部，求值为 `Map`。
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadersExpression;

impl Expression for HeadersExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        Ok(Value::Map(exchange.in_message().headers().clone()))
    }
}

/// 单个 Exchange 属性，缺失时为 `Null`。
#[derive(Debug, Clone)]
pub struct PropertyExpression {
    name: String,
}

impl Expression for PropertyExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        Ok(exchange.property(&self.name).cloned().unwrap_or_default())
    }
}

/// 全部 Exchange 属性，求值为 `Map`。
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertiesExpression;

impl Expression for PropertiesExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        Ok(Value::Map(exchange.properties().clone()))
    }
}

/// Exchange 上当前的异常。
#[derive(Debug, Default, Clone, Copy)]
pub struct ExceptionExpression;

impl Expression for ExceptionExpression {
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        Ok(exchange
            .exception()
            .cloned()
            .map_or(Value::Null, Value::Fault))
    }
}

/// 常量。
#[derive(Debug, Clone)]
pub struct ConstantExpression {
    value: Value,
}

impl Expression for ConstantExpression {
    fn evaluate(&self, _exchange: &Exchange) -> Result<Value, Fault> {
        Ok(self.value.clone())
    }
}

/// 由闭包构成的表达式，`label` 用于诊断输出。
pub struct FnExpression<F> {
    label: String,
    f: F,
}

impl<F> fmt::Debug for FnExpression<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnExpression({})", self.label)
    }
}

impl<F> Expression for FnExpression<F>
where
    F: Fn(&Exchange) -> Result<Value, Fault> + Send + Sync,
{
    fn evaluate(&self, exchange: &Exchange) -> Result<Value, Fault> {
        (self.f)(exchange)
    }
}

pub fn body() -> ExpressionRef {
    Arc::new(BodyExpression)
}

pub fn mandatory_body() -> ExpressionRef {
    Arc::new(MandatoryBodyExpression)
}

pub fn header(name: impl Into<String>) -> ExpressionRef {
    Arc::new(HeaderExpression { name: name.into() })
}

pub fn headers() -> ExpressionRef {
    Arc::new(HeadersExpression)
}

pub fn property(name: impl Into<String>) -> ExpressionRef {
    Arc::new(PropertyExpression { name: name.into() })
}

pub fn properties() -> ExpressionRef {
    Arc::new(PropertiesExpression)
}

pub fn exception() -> ExpressionRef {
    Arc::new(ExceptionExpression)
}

pub fn constant(value: impl Into<Value>) -> ExpressionRef {
    Arc::new(ConstantExpression {
        value: value.into(),
    })
}

pub fn from_fn<F>(label: impl Into<String>, f: F) -> ExpressionRef
where
    F: Fn(&Exchange) -> Result<Value, Fault> + Send + Sync + 'static,
{
    Arc::new(FnExpression {
        label: label.into(),
        f,
    })
}

/// 可插拔的表达式语言：把一段文本编译成 [`Expression`]。
pub trait Language: Send + Sync {
    fn name(&self) -> &str;

    fn create_expression(&self, text: &str) -> Result<ExpressionRef, Fault>;
}

struct ConstantLanguage;

impl Language for ConstantLanguage {
    fn name(&self) -> &str {
        "constant"
    }

    fn create_expression(&self, text: &str) -> Result<ExpressionRef, Fault> {
        Ok(constant(text))
    }
}

struct HeaderLanguage;

impl Language for HeaderLanguage {
    fn name(&self) -> &str {
        "header"
    }

    fn create_expression(&self, text: &str) -> Result<ExpressionRef, Fault> {
        Ok(header(text.trim()))
    }
}

struct PropertyLanguage;

impl Language for PropertyLanguage {
    fn name(&self) -> &str {
        "exchangeProperty"
    }

    fn create_expression(&self, text: &str) -> Result<ExpressionRef, Fault> {
        Ok(property(text.trim()))
    }
}

/// 按名称登记的语言集合。
///
/// # 契约说明（What）
/// - [`LanguageRegistry::with_defaults`] 预置 `constant`、`header`、`exchangeProperty`；
/// - 重复注册同名语言时后者覆盖前者。
#[derive(Default)]
pub struct LanguageRegistry {
    languages: RwLock<HashMap<String, Arc<dyn Language>>>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ConstantLanguage));
        registry.register(Arc::new(HeaderLanguage));
        registry.register(Arc::new(PropertyLanguage));
        registry
    }

    pub fn register(&self, language: Arc<dyn Language>) {
        self.languages
            .write()
            .insert(language.name().to_owned(), language);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Language>> {
        self.languages.read().get(name).cloned()
    }

    /// 使用指定语言编译表达式；语言未注册时失败。
    pub fn create_expression(&self, language: &str, text: &str) -> Result<ExpressionRef, Fault> {
        let resolved = self
            .resolve(language)
            .ok_or_else(|| evaluation_fault(format!("no language named `{language}` registered")))?;
        resolved.create_expression(text)
    }
}

impl fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.languages.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("LanguageRegistry")
            .field("languages", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_expressions_read_exchange() {
        let mut exchange = Exchange::with_body("payload")
            .with_in_header("id", 7)
            .with_property("tenant", "acme");
        exchange.set_exception(Fault::runtime("boom"));

        assert_eq!(body().evaluate(&exchange).unwrap(), Value::text("payload"));
        assert_eq!(header("id").evaluate(&exchange).unwrap(), Value::Int(7));
        assert_eq!(header("missing").evaluate(&exchange).unwrap(), Value::Null);
        assert_eq!(
            property("tenant").evaluate(&exchange).unwrap(),
            Value::text("acme")
        );
        assert!(matches!(
            exception().evaluate(&exchange).unwrap(),
            Value::Fault(_)
        ));
    }

    #[test]
    fn mandatory_body_rejects_null() {
        let exchange = Exchange::default();
        let fault = mandatory_body().evaluate(&exchange).unwrap_err();
        assert!(fault.is_a(&kinds::EXPRESSION_EVALUATION));
    }

    #[test]
    fn registry_compiles_by_language_name() {
        let registry = LanguageRegistry::with_defaults();
        let exchange = Exchange::default().with_in_header("k", "v");
        let expr = registry.create_expression("header", "k").unwrap();
        assert_eq!(expr.evaluate(&exchange).unwrap(), Value::text("v"));
        assert!(registry.create_expression("xpath", "/a").is_err());
    }
}
