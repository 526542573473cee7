//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - Bean 子系统的失败分为解析失败（目标、方法、歧义）、绑定失败与代理失败；
//!   调用方需要精确区分“歧义”与一般的“找不到方法”，因此每类失败都是独立变体；
//! - 正向路径把失败写入 Exchange 的异常槽位，反向路径以 `Err(Fault)` 返回，二者都通过
//!   `From<BeanError> for Fault` 汇合，`BeanError` 本身保存在 `Fault::origin` 中供向下转型。
//!
//! ## 错误码约定（What）
//! - 采用 `<域>.<语义>`：`bean.ambiguous_method`、`bean.method_not_found` 等，便于日志聚合与告警规则复用。

use std::fmt;

use ferry_core::{Fault, ValueType, kinds};

use crate::method::MethodKey;
use crate::target::BeanScope;

/// Bean 子系统的错误。
#[derive(Debug, Clone, thiserror::Error)]
pub enum BeanError {
    /// 多个候选方法在所有裁决规则下打平。
    #[error("ambiguous method invocation possible: {}", CandidateList(.candidates))]
    AmbiguousMethodCall { candidates: Vec<MethodKey> },
    /// 显式指定的方法在 Bean 上不存在。
    #[error("method with name: {method}{qualifier} not found on bean: {bean}")]
    MethodNotFound {
        bean: String,
        method: String,
        qualifier: String,
    },
    /// 无法定位 Bean 实例。
    #[error("no bean could be found: {name}")]
    NoSuchBean { name: String },
    /// 选择流程没有得出任何方法。
    #[error("no method could be resolved for bean: {bean} with scope: {scope}")]
    NoMethodResolved { bean: String, scope: BeanScope },
    /// 参数求值或类型转换失败。
    #[error(
        "cannot bind parameter #{index} of method {method} to type {expected} from {actual}: {reason}"
    )]
    ParameterBinding {
        method: String,
        index: usize,
        expected: ValueType,
        actual: String,
        reason: String,
    },
    /// 方法名语法非法，如括号不成对。
    #[error("invalid method name `{name}`: {reason}")]
    InvalidMethodName { name: String, reason: String },
    /// 内省单个方法失败；该方法被丢弃。
    #[error("cannot introspect method {method} on {class}: {reason}")]
    Introspection {
        class: String,
        method: String,
        reason: String,
    },
    /// 代理构建或调用阶段的失败。
    #[error("proxy failure on {interface}: {reason}")]
    Proxy { interface: String, reason: String },
}

struct CandidateList<'a>(&'a [MethodKey]);

impl fmt::Display for CandidateList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, key) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("]")
    }
}

impl BeanError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BeanError::AmbiguousMethodCall { .. } => "bean.ambiguous_method",
            BeanError::MethodNotFound { .. } => "bean.method_not_found",
            BeanError::NoSuchBean { .. } => "bean.no_such_bean",
            BeanError::NoMethodResolved { .. } => "bean.no_method_resolved",
            BeanError::ParameterBinding { .. } => "bean.parameter_binding",
            BeanError::InvalidMethodName { .. } => "bean.invalid_method_name",
            BeanError::Introspection { .. } => "bean.introspection",
            BeanError::Proxy { .. } => "bean.proxy",
        }
    }

    /// 歧义错误中打平的候选方法。
    pub fn candidates(&self) -> &[MethodKey] {
        match self {
            BeanError::AmbiguousMethodCall { candidates } => candidates,
            _ => &[],
        }
    }

    fn fault_kind(&self) -> &'static ferry_core::FaultKind {
        match self {
            BeanError::NoMethodResolved { .. } => &kinds::ILLEGAL_STATE,
            BeanError::ParameterBinding { .. } | BeanError::InvalidMethodName { .. } => {
                &kinds::ILLEGAL_ARGUMENT
            }
            _ => &kinds::RUNTIME,
        }
    }
}

impl From<BeanError> for Fault {
    fn from(error: BeanError) -> Self {
        Fault::new(error.fault_kind(), error.to_string())
            .with_code(error.code())
            .with_origin(error)
    }
}
