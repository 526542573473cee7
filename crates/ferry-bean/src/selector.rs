//! # selector 模块说明
//!
//! ## 角色定位（Why）
//! - 给定类型描述与 Exchange，决定调用哪个方法；选择提示以 [`SelectionHints`] 显式传入，
//!   选择过程除“强制转换成功时改写入站 body”之外不修改 Exchange；
//! - 打平时返回 [`BeanError::AmbiguousMethodCall`] 并列出全部候选，调用方据此区分歧义与“无方法”。
//!
//! ## 决策顺序（How）
//! 1. 显式方法名：按名称取重载列表，单个重载直接使用，多个重载在该名称范围内继续筛选；
//! 2. 自动选择：`Handler` 注解 → 唯一 body 方法 → body 类型匹配 → 唯一自定义注解无 body 方法；
//! 3. 回落到默认方法。

use std::sync::Arc;

use ferry_core::{Exchange, TypeConverter, Value, ValueType};

use crate::error::BeanError;
use crate::info::TypeDescriptor;
use crate::method::MethodDescriptor;
use crate::parameter::MethodCall;

type MethodRef = Arc<MethodDescriptor>;

/// 方法选择的显式提示。
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionHints<'a> {
    /// 显式方法名（可带参数值）。
    pub method: Option<&'a MethodCall>,
    /// 名称找不到时尝试 getter 简写。
    pub shorthand_getters: bool,
}

impl<'a> SelectionHints<'a> {
    pub fn named(method: &'a MethodCall) -> Self {
        Self {
            method: Some(method),
            shorthand_getters: true,
        }
    }
}

/// 方法选择器。
pub struct MethodSelector<'c> {
    converter: &'c dyn TypeConverter,
}

impl<'c> MethodSelector<'c> {
    pub fn new(converter: &'c dyn TypeConverter) -> Self {
        Self { converter }
    }

    /// 选择方法；`Ok(None)` 表示没有得出结论。
    pub fn select(
        &self,
        info: &TypeDescriptor,
        exchange: &mut Exchange,
        hints: SelectionHints<'_>,
    ) -> Result<Option<MethodRef>, BeanError> {
        if let Some(call) = hints.method {
            return self.select_named(info, exchange, call, hints.shorthand_getters).map(Some);
        }
        let candidates: Vec<MethodRef> = info
            .methods()
            .iter()
            .filter(|m| !m.is_getter() && !m.is_setter())
            .cloned()
            .collect();
        if let Some(chosen) = self.choose_method(&candidates, exchange, None)? {
            tracing::trace!(method = %chosen.key(), "selected bean method");
            return Ok(Some(chosen));
        }
        let fallback = info.default_method().cloned();
        match &fallback {
            Some(method) => tracing::trace!(method = %method.key(), "falling back to default method"),
            None => tracing::debug!(class = info.class_name(), "no bean method could be chosen"),
        }
        Ok(fallback)
    }

    fn select_named(
        &self,
        info: &TypeDescriptor,
        exchange: &mut Exchange,
        call: &MethodCall,
        shorthand: bool,
    ) -> Result<MethodRef, BeanError> {
        let not_found = |qualifier: String| BeanError::MethodNotFound {
            bean: info.class_name().to_owned(),
            method: call.name().to_owned(),
            qualifier,
        };
        let overloads = info
            .lookup_operation(call.name(), shorthand)
            .ok_or_else(|| not_found(String::new()))?;

        if let [only] = overloads.as_slice() {
            if call.demands_no_parameters() && only.parameter_count() > 0 {
                return Err(not_found(" (with no parameters)".to_owned()));
            }
            return Ok(only.clone());
        }

        if let Some(values) = call.parameters() {
            let arity: Vec<MethodRef> = overloads
                .iter()
                .filter(|m| m.parameter_count() == values.len())
                .cloned()
                .collect();
            match arity.as_slice() {
                [] if values.is_empty() => {
                    return Err(not_found(" (with no parameters)".to_owned()));
                }
                [] => {
                    return Err(not_found(format!(" (with {} parameters)", values.len())));
                }
                [only] => return Ok(only.clone()),
                _ if values.is_empty() => {}
                _ => return self.match_parameter_values(&arity, call),
            }
            if let Some(chosen) = self.choose_method(&arity, exchange, Some(call))? {
                return Ok(chosen);
            }
            return Err(ambiguous(&arity));
        }

        match self.choose_method(&overloads, exchange, Some(call))? {
            Some(chosen) => Ok(chosen),
            None => Err(ambiguous(&overloads)),
        }
    }

    /// 先不经转换匹配参数值，再借助转换器匹配。
    fn match_parameter_values(
        &self,
        candidates: &[MethodRef],
        call: &MethodCall,
    ) -> Result<MethodRef, BeanError> {
        let values = call.parameters().unwrap_or_default();
        let exact: Vec<MethodRef> = candidates
            .iter()
            .filter(|m| {
                values
                    .iter()
                    .zip(m.parameter_types())
                    .all(|(value, ty)| value.matches_exactly(ty))
            })
            .cloned()
            .collect();
        if let [only] = exact.as_slice() {
            return Ok(only.clone());
        }
        let pool = if exact.is_empty() { candidates } else { exact.as_slice() };
        let converted: Vec<MethodRef> = pool
            .iter()
            .filter(|m| {
                values
                    .iter()
                    .zip(m.parameter_types())
                    .all(|(value, ty)| value.matches_with(ty, self.converter))
            })
            .cloned()
            .collect();
        match converted.as_slice() {
            [only] => Ok(only.clone()),
            [] => Err(ambiguous(pool)),
            many => Err(ambiguous(many)),
        }
    }

    fn choose_method(
        &self,
        candidates: &[MethodRef],
        exchange: &mut Exchange,
        call: Option<&MethodCall>,
    ) -> Result<Option<MethodRef>, BeanError> {
        let handlers: Vec<MethodRef> = filtered(candidates, |m| m.has_handler_annotation());
        match handlers.as_slice() {
            [] => {}
            [only] => return Ok(Some(only.clone())),
            many => return Err(ambiguous(many)),
        }

        let with_body = filtered(candidates, |m| m.has_body_parameter());
        let custom_no_body = filtered(candidates, |m| {
            !m.has_body_parameter() && m.has_custom_annotation()
        });
        if let [only] = with_body.as_slice() {
            return Ok(Some(only.clone()));
        }
        if with_body.len() > 1 {
            return self.match_body(&with_body, &custom_no_body, exchange);
        }
        if let [only] = custom_no_body.as_slice() {
            return Ok(Some(only.clone()));
        }
        if call.is_some_and(MethodCall::demands_no_parameters) {
            let no_body = filtered(candidates, |m| m.parameter_count() == 0);
            if let [only] = no_body.as_slice() {
                return Ok(Some(only.clone()));
            }
        }
        Ok(None)
    }

    /// body 类型匹配。
    ///
    /// # 教案式说明
    /// - **前置条件**：入站 body 非空；期望回复的 Exchange 不考虑返回 `Void` 的候选；
    /// - **执行 (How)**：
    ///   1. 可直接赋值的候选恰好一个即选中；Exchange 携带异常时，唯一接收 `Fault` 的可赋值候选优先；
    ///   2. 没有可赋值候选时逐个尝试转换，恰好一个成功即改写入站 body 并选中，多个成功视为歧义；
    ///   3. 多个可赋值候选时，依次以“全局唯一的自定义注解方法”“匹配集中唯一的自定义注解方法”裁决，
    ///      仍打平则报告歧义。
    fn match_body(
        &self,
        with_body: &[MethodRef],
        custom_no_body: &[MethodRef],
        exchange: &mut Exchange,
    ) -> Result<Option<MethodRef>, BeanError> {
        let body = exchange.in_message().body();
        if body.is_null() {
            return Ok(None);
        }
        let out_capable = exchange.pattern().is_out_capable();
        let candidates = filtered(with_body, |m| !(out_capable && m.is_returning_void()));
        let matched = filtered(&candidates, |m| {
            m.body_parameter_type()
                .is_some_and(|ty| *ty == ValueType::Exchange || ty.accepts(body))
        });

        if exchange.exception().is_some() {
            let with_fault = filtered(&matched, |m| m.has_fault_parameter());
            if let [only] = with_fault.as_slice() {
                return Ok(Some(only.clone()));
            }
        }

        match matched.as_slice() {
            [only] => Ok(Some(only.clone())),
            [] => self.coerce_body(&candidates, exchange),
            many => {
                if let [only] = custom_no_body {
                    return Ok(Some(only.clone()));
                }
                let annotated = filtered(many, |m| m.has_custom_annotation());
                match annotated.as_slice() {
                    [only] => Ok(Some(only.clone())),
                    _ => Err(ambiguous(many)),
                }
            }
        }
    }

    fn coerce_body(
        &self,
        candidates: &[MethodRef],
        exchange: &mut Exchange,
    ) -> Result<Option<MethodRef>, BeanError> {
        let body = exchange.in_message().body();
        let mut converted: Vec<(MethodRef, Value)> = Vec::new();
        for method in candidates {
            let Some(ty) = method.body_parameter_type() else {
                continue;
            };
            match self.converter.try_convert(body, ty) {
                Some(value) => converted.push((method.clone(), value)),
                None => tracing::trace!(method = %method.key(), "body not convertible to {ty}"),
            }
        }
        if converted.len() > 1 {
            let tied: Vec<MethodRef> = converted.into_iter().map(|(m, _)| m).collect();
            return Err(ambiguous(&tied));
        }
        Ok(converted.pop().map(|(method, value)| {
            tracing::trace!(method = %method.key(), "coerced body to match bean method");
            exchange.in_message_mut().set_body(value);
            method
        }))
    }
}

fn filtered(methods: &[MethodRef], keep: impl Fn(&MethodDescriptor) -> bool) -> Vec<MethodRef> {
    methods.iter().filter(|m| keep(m)).cloned().collect()
}

fn ambiguous(methods: &[MethodRef]) -> BeanError {
    BeanError::AmbiguousMethodCall {
        candidates: methods.iter().map(|m| m.key().clone()).collect(),
    }
}
