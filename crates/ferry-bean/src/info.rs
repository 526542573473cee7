//! # info 模块说明
//!
//! ## 角色定位（Why）
//! - [`TypeDescriptor`] 是一个 Bean 类在某个参数映射策略下的内省结果：按名称组织的重载列表、
//!   若干派生索引，以及“恰好一个方法时的默认方法”；
//! - 内省只读取 [`BeanClass`] 注册的描述数据，对同一输入总是得到相同的结果。
//!
//! ## 内省流程（How）
//! 1. 先遍历类自身声明的方法，再沿父类链向上；子类中同名同参的方法遮蔽父类定义；
//! 2. 跳过非公开方法与返回 `Exchange` 的方法；
//! 3. 逐个参数决定绑定：参数注解 → 映射策略 → 第一个未绑定参数作为 body 参数；
//!    第二个无法绑定的参数使该方法被丢弃，仅记录调试日志；
//! 4. 交换模式依次取方法注解、父类同签名方法的注解、类级别注解，缺省为 `InOut`。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ferry_core::{ExchangePattern, LanguageRegistry, ValueType, expression};

use crate::cache::TypeKey;
use crate::class::{BeanClass, MethodDef, ParamAnnotation, Upcast, Visibility};
use crate::error::BeanError;
use crate::method::{MethodDescriptor, MethodKey, MethodParts};
use crate::parameter::{ParameterBinding, ParameterMappingStrategy};

type MethodRef = Arc<MethodDescriptor>;

/// 一个 Bean 类的内省结果，创建后不可变。
pub struct TypeDescriptor {
    class: Arc<BeanClass>,
    strategy_id: String,
    operations: BTreeMap<String, Vec<MethodRef>>,
    methods: Vec<MethodRef>,
    by_key: HashMap<MethodKey, MethodRef>,
    default_method: Option<MethodRef>,
    with_body: Vec<MethodRef>,
    with_custom_annotation_no_body: Vec<MethodRef>,
    with_handler_annotation: Vec<MethodRef>,
    with_no_body: Vec<MethodRef>,
}

impl TypeDescriptor {
    /// 内省 `class` 及其父类链。
    pub fn introspect(
        class: &Arc<BeanClass>,
        strategy: &dyn ParameterMappingStrategy,
        languages: &LanguageRegistry,
    ) -> Self {
        let mut chain: Vec<Arc<BeanClass>> = Vec::new();
        let mut level = Some(class.clone());
        while let Some(current) = level {
            level = current.parent().map(|link| link.class().clone());
            chain.push(current);
        }

        let mut collected: Vec<(&MethodDef, Arc<BeanClass>, Vec<Arc<dyn Upcast>>)> = Vec::new();
        let mut upcasts: Vec<Arc<dyn Upcast>> = Vec::new();
        for (depth, declaring) in chain.iter().enumerate() {
            if depth > 0
                && let Some(link) = chain[depth - 1].parent()
            {
                upcasts.push(link.upcast().clone());
            }
            for def in declaring.methods() {
                let signature = def.signature();
                if signature.visibility() == Visibility::Private {
                    tracing::trace!(class = %declaring, method = signature.name(), "skipping non-public method");
                    continue;
                }
                if *signature.return_type() == ValueType::Exchange {
                    tracing::trace!(class = %declaring, method = signature.name(), "skipping method returning Exchange");
                    continue;
                }
                if collected
                    .iter()
                    .any(|(seen, _, _)| seen.signature().same_signature(signature))
                {
                    tracing::trace!(class = %declaring, method = signature.name(), "method overridden by subclass");
                    continue;
                }
                collected.push((def, declaring.clone(), upcasts.clone()));
            }
        }

        let mut methods = Vec::with_capacity(collected.len());
        for (def, declaring, path) in collected {
            match build_method(&chain, &declaring, def, path, strategy, languages) {
                Ok(method) => {
                    tracing::trace!(method = %method.key(), "introspected bean method");
                    methods.push(Arc::new(method));
                }
                Err(error) => {
                    tracing::debug!(error = %error, code = error.code(), "dropping bean method");
                }
            }
        }
        Self::from_methods(class.clone(), strategy.id().to_owned(), methods)
    }

    fn from_methods(class: Arc<BeanClass>, strategy_id: String, methods: Vec<MethodRef>) -> Self {
        let mut operations: BTreeMap<String, Vec<MethodRef>> = BTreeMap::new();
        let mut by_key = HashMap::with_capacity(methods.len());
        let mut with_body = Vec::new();
        let mut with_custom_annotation_no_body = Vec::new();
        let mut with_handler_annotation = Vec::new();
        let mut with_no_body = Vec::new();
        for method in &methods {
            operations
                .entry(method.name().to_owned())
                .or_default()
                .push(method.clone());
            by_key.insert(method.key().clone(), method.clone());
            if method.has_handler_annotation() {
                with_handler_annotation.push(method.clone());
            }
            if method.has_body_parameter() {
                with_body.push(method.clone());
            } else {
                if method.has_custom_annotation() {
                    with_custom_annotation_no_body.push(method.clone());
                }
                with_no_body.push(method.clone());
            }
        }
        let default_method = match methods.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        Self {
            class,
            strategy_id,
            operations,
            methods,
            by_key,
            default_method,
            with_body,
            with_custom_annotation_no_body,
            with_handler_annotation,
            with_no_body,
        }
    }

    pub fn class(&self) -> &Arc<BeanClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    /// 本描述在缓存中的类型键。
    pub fn type_key(&self) -> TypeKey {
        TypeKey {
            type_id: self.class.type_id(),
            strategy: self.strategy_id.clone(),
        }
    }

    /// 全部方法，子类声明在前。
    pub fn methods(&self) -> &[MethodRef] {
        &self.methods
    }

    /// 按名称排序的方法列表，名称相同时保持内省顺序。
    pub fn methods_by_name(&self) -> Vec<MethodRef> {
        self.operations.values().flatten().cloned().collect()
    }

    /// 按名称取重载列表。
    pub fn operation(&self, name: &str) -> Option<&[MethodRef]> {
        self.operations.get(name).map(Vec::as_slice)
    }

    /// 按名称取重载列表；`shorthand` 为真时名称找不到再尝试 getter 简写（`name` → `getName`/`get_name`/`isName`/`is_name`）。
    pub fn lookup_operation(&self, name: &str, shorthand: bool) -> Option<Vec<MethodRef>> {
        if let Some(found) = self.operation(name) {
            return Some(found.to_vec());
        }
        if !shorthand || name.is_empty() {
            return None;
        }
        let capitalized = capitalize(name);
        let aliases = [
            format!("get{capitalized}"),
            format!("get_{name}"),
            format!("is{capitalized}"),
            format!("is_{name}"),
        ];
        aliases.iter().find_map(|alias| {
            let getters: Vec<MethodRef> = self
                .operation(alias)?
                .iter()
                .filter(|m| m.is_getter())
                .cloned()
                .collect();
            (!getters.is_empty()).then_some(getters)
        })
    }

    pub fn method_by_key(&self, key: &MethodKey) -> Option<&MethodRef> {
        self.by_key.get(key)
    }

    /// 按名称与参数类型精确查找。
    pub fn find_method(&self, name: &str, parameter_types: &[ValueType]) -> Option<&MethodRef> {
        self.operation(name)?
            .iter()
            .find(|m| m.parameter_types() == parameter_types)
    }

    pub fn default_method(&self) -> Option<&MethodRef> {
        self.default_method.as_ref()
    }

    pub fn with_body(&self) -> &[MethodRef] {
        &self.with_body
    }

    pub fn with_custom_annotation_no_body(&self) -> &[MethodRef] {
        &self.with_custom_annotation_no_body
    }

    pub fn with_handler_annotation(&self) -> &[MethodRef] {
        &self.with_handler_annotation
    }

    pub fn with_no_body(&self) -> &[MethodRef] {
        &self.with_no_body
    }

    pub fn has_any_handler_annotation(&self) -> bool {
        !self.with_handler_annotation.is_empty()
    }

    pub fn has_public_constructor(&self) -> bool {
        self.class.has_public_constructor()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("class", &self.class.name())
            .field("strategy", &self.strategy_id)
            .field("methods", &self.methods)
            .finish()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn build_method(
    chain: &[Arc<BeanClass>],
    declaring: &Arc<BeanClass>,
    def: &MethodDef,
    upcasts: Vec<Arc<dyn Upcast>>,
    strategy: &dyn ParameterMappingStrategy,
    languages: &LanguageRegistry,
) -> Result<MethodDescriptor, BeanError> {
    let signature = def.signature();
    let key = MethodKey::new(
        declaring.type_id(),
        declaring.name(),
        signature.name(),
        signature.param_types(),
    );
    let mut bindings = Vec::with_capacity(signature.params().len());
    let mut body_indices = Vec::new();
    let mut custom_annotation = false;
    let mut body_found = false;

    for (index, param) in signature.params().iter().enumerate() {
        let ty = param.ty().clone();
        if let Some(annotation) = param.annotations().first() {
            custom_annotation = true;
            let binding = match annotation {
                ParamAnnotation::Body => {
                    body_found = true;
                    body_indices.push(index);
                    ParameterBinding::body(index, ty)
                }
                other => {
                    let expression = annotation_expression(other, languages).map_err(|reason| {
                        BeanError::Introspection {
                            class: declaring.name().to_owned(),
                            method: key.to_string(),
                            reason,
                        }
                    })?;
                    ParameterBinding::custom(index, ty, expression)
                }
            };
            bindings.push(binding);
            continue;
        }
        if let Some(expression) = strategy.default_expression(&ty) {
            custom_annotation = true;
            bindings.push(ParameterBinding::strategy(index, ty, expression));
            continue;
        }
        if ty == ValueType::Exchange {
            if !body_found {
                body_found = true;
                body_indices.push(index);
            }
            bindings.push(ParameterBinding::exchange(index));
            continue;
        }
        if !body_found {
            body_found = true;
            body_indices.push(index);
            bindings.push(ParameterBinding::body(index, ty));
            continue;
        }
        return Err(BeanError::Introspection {
            class: declaring.name().to_owned(),
            method: key.to_string(),
            reason: format!("parameter #{index} of type {ty} has no binding"),
        });
    }

    let pattern = resolve_pattern(chain, declaring, def);
    Ok(MethodDescriptor::from_parts(MethodParts {
        key,
        bindings,
        body_indices,
        custom_annotation,
        handler_annotation: signature.has_handler_annotation(),
        pattern,
        return_type: signature.return_type().clone(),
        throws: signature.throws_list().to_vec(),
        invoker: def.invoker().clone(),
        upcasts,
    }))
}

fn annotation_expression(
    annotation: &ParamAnnotation,
    languages: &LanguageRegistry,
) -> Result<ferry_core::ExpressionRef, String> {
    let expression = match annotation {
        ParamAnnotation::Header(name) => expression::header(name.clone()),
        ParamAnnotation::Headers => expression::headers(),
        ParamAnnotation::Property(name) => expression::property(name.clone()),
        ParamAnnotation::Properties => expression::properties(),
        ParamAnnotation::ExchangeException => expression::exception(),
        ParamAnnotation::Body => expression::body(),
        ParamAnnotation::Expression(expression) => expression.clone(),
        ParamAnnotation::Language {
            language,
            expression,
        } => languages
            .create_expression(language, expression)
            .map_err(|fault| fault.to_string())?,
    };
    Ok(expression)
}

/// 方法注解 → 父类链上同签名方法的注解 → 类级别注解（自具体类向上） → `InOut`。
fn resolve_pattern(
    chain: &[Arc<BeanClass>],
    declaring: &Arc<BeanClass>,
    def: &MethodDef,
) -> ExchangePattern {
    let signature = def.signature();
    if let Some(pattern) = signature.declared_pattern() {
        return pattern;
    }
    let start = chain
        .iter()
        .position(|c| Arc::ptr_eq(c, declaring))
        .unwrap_or(0);
    let inherited = chain[start..].iter().skip(1).find_map(|ancestor| {
        ancestor
            .methods()
            .iter()
            .filter(|m| m.signature().same_signature(signature))
            .find_map(|m| m.signature().declared_pattern())
    });
    if let Some(pattern) = inherited {
        return pattern;
    }
    chain.iter().find_map(|c| c.pattern()).unwrap_or_default()
}
