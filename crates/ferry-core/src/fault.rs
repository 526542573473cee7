//! # fault 模块说明
//!
//! ## 角色定位（Why）
//! - Exchange 的异常槽位需要承载“业务方法抛出的原始异常”，并在反向代理路径上按接口声明的
//!   故障类型重新抛出；因此需要一个带类型层级、可区分受检/非受检、可串联 cause 链的载体。
//! - Rust 没有异常继承体系，本模块以静态 [`FaultKind`] 描述类型层级，以 [`Fault`] 描述一次具体的失败。
//!
//! ## 设计要求（What）
//! - `FaultKind` 为 `'static` 描述符，`is_a` 沿父链匹配；
//! - `Fault` 可克隆、可跨线程传递，`chain()` 由外向内遍历 cause 链；
//! - 结构化的源错误（如 `BeanError`）保存在 `origin` 中，供诊断与测试向下转型。

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// 故障类型描述符，相当于异常类层级中的一个节点。
///
/// # 教案式说明
/// - **意图 (Why)**：反向代理需要“在 cause 链中找到与声明类型最接近的故障”，必须有可比较的类型层级；
/// - **契约 (What)**：`name` 全局唯一；`parent` 指向直接父类型；`checked` 表示是否属于需显式声明的故障；
/// - **执行 (How)**：通过 `const fn` 构造，使下游 crate 可以 `pub static` 方式声明自己的故障类型。
#[derive(Debug)]
pub struct FaultKind {
    name: &'static str,
    parent: Option<&'static FaultKind>,
    checked: bool,
}

impl FaultKind {
    /// 声明受检故障类型。
    pub const fn checked(name: &'static str, parent: Option<&'static FaultKind>) -> Self {
        Self {
            name,
            parent,
            checked: true,
        }
    }

    /// 声明非受检故障类型。
    pub const fn unchecked(name: &'static str, parent: Option<&'static FaultKind>) -> Self {
        Self {
            name,
            parent,
            checked: false,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn parent(&self) -> Option<&'static FaultKind> {
        self.parent
    }

    pub const fn is_checked(&self) -> bool {
        self.checked
    }

    /// 判断 `self` 是否为 `other` 本身或其子类型。
    pub fn is_a(&self, other: &FaultKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind.name == other.name {
                return true;
            }
            current = kind.parent;
        }
        false
    }
}

impl PartialEq for FaultKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FaultKind {}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 预置的故障类型层级。
///
/// 根节点 `Exception` 为受检类型；`RuntimeException` 及其子类型均为非受检。
pub mod kinds {
    use super::FaultKind;

    pub static EXCEPTION: FaultKind = FaultKind::checked("Exception", None);
    pub static RUNTIME: FaultKind = FaultKind::unchecked("RuntimeException", Some(&EXCEPTION));
    pub static ILLEGAL_STATE: FaultKind =
        FaultKind::unchecked("IllegalStateException", Some(&RUNTIME));
    pub static ILLEGAL_ARGUMENT: FaultKind =
        FaultKind::unchecked("IllegalArgumentException", Some(&RUNTIME));
    pub static TYPE_CONVERSION: FaultKind =
        FaultKind::unchecked("TypeConversionException", Some(&RUNTIME));
    pub static EXPRESSION_EVALUATION: FaultKind =
        FaultKind::unchecked("ExpressionEvaluationException", Some(&RUNTIME));
    /// 运行时包装器：把受检故障包装成非受检故障向上传播。
    pub static RUNTIME_WRAPPER: FaultKind =
        FaultKind::unchecked("RuntimeFerryException", Some(&RUNTIME));
    /// Bean 方法执行期间发生 panic。
    pub static PANIC: FaultKind = FaultKind::unchecked("PanicException", Some(&RUNTIME));
    /// 受检的 Exchange 级故障，供各类 Exchange 相关失败继承。
    pub static EXCHANGE: FaultKind = FaultKind::checked("FerryExchangeException", Some(&EXCEPTION));
    pub static IO: FaultKind = FaultKind::checked("IoException", Some(&EXCEPTION));
}

/// 源错误的共享引用类型。
pub type FaultOrigin = Arc<dyn StdError + Send + Sync + 'static>;

/// 一次具体失败的载体，等价于被抛出的异常对象。
///
/// # 设计背景（Why）
/// - Exchange 的异常槽位、Bean 方法的返回值、代理调用的错误结果都需要统一表达；
/// - 采用“稳定错误码 + 人类可读消息 + 可选 cause”的结构，便于日志聚合。
///
/// # 契约说明（What）
/// - `kind`：故障类型，决定受检性以及代理路径上的匹配；
/// - `code`：可选稳定错误码，约定 `<域>.<语义>`；
/// - `cause`：直接原因，构成由外向内的 cause 链；
/// - `origin`：结构化源错误，不参与 `Display`，仅供诊断。
///
/// # 风险提示（Trade-offs）
/// - cause 链以 `Box` 嵌套保存，克隆会复制整条链；链通常很短，可以接受。
#[derive(Clone)]
pub struct Fault {
    kind: &'static FaultKind,
    code: Option<&'static str>,
    message: Cow<'static, str>,
    cause: Option<Box<Fault>>,
    origin: Option<FaultOrigin>,
}

impl Fault {
    pub fn new(kind: &'static FaultKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            cause: None,
            origin: None,
        }
    }

    /// 非受检运行时故障的快捷构造。
    pub fn runtime(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(&kinds::RUNTIME, message)
    }

    pub fn illegal_state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(&kinds::ILLEGAL_STATE, message)
    }

    pub fn illegal_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(&kinds::ILLEGAL_ARGUMENT, message)
    }

    /// 以运行时包装器包裹 `cause`，消息沿用 cause 的描述。
    pub fn wrap_runtime(cause: Fault) -> Self {
        let message = format!("{}: {}", cause.kind.name(), cause.message);
        Self::new(&kinds::RUNTIME_WRAPPER, message).with_cause(cause)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_cause(mut self, cause: Fault) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 附带结构化源错误。
    pub fn with_origin(mut self, origin: impl StdError + Send + Sync + 'static) -> Self {
        self.origin = Some(Arc::new(origin));
        self
    }

    pub fn kind(&self) -> &'static FaultKind {
        self.kind
    }

    pub fn code(&self) -> Option<&'static str> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Fault> {
        self.cause.as_deref()
    }

    pub fn origin(&self) -> Option<&FaultOrigin> {
        self.origin.as_ref()
    }

    /// 将源错误向下转型为具体类型。
    pub fn downcast_origin<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.origin.as_deref().and_then(|origin| origin.downcast_ref::<E>())
    }

    pub fn is_checked(&self) -> bool {
        self.kind.is_checked()
    }

    pub fn is_a(&self, kind: &FaultKind) -> bool {
        self.kind.is_a(kind)
    }

    /// 由外向内遍历 cause 链，首个元素为自身。
    pub fn chain(&self) -> FaultChain<'_> {
        FaultChain {
            next: Some(self),
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("kind", &self.kind.name())
            .field("code", &self.code)
            .field("message", &self.message)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl StdError for Fault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// [`Fault::chain`] 的迭代器。
pub struct FaultChain<'a> {
    next: Option<&'a Fault>,
}

impl<'a> Iterator for FaultChain<'a> {
    type Item = &'a Fault;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.cause();
        Some(current)
    }
}
