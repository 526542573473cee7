//! # class 模块说明
//!
//! ## 角色定位（Why）
//! - Rust 没有运行期反射，Bean 的“类”以显式注册的 [`BeanClass`] 表达：方法名、参数声明类型、
//!   参数与方法注解、声明抛出的故障类型，以及一个把 `&dyn Any` 向下转型为具体类型后调用的闭包；
//! - 内省与方法选择只读取这些描述数据，选择算法因此保持纯数据驱动。
//!
//! ## 继承（How）
//! - [`BeanClassBuilder::extends`] 以字段投影 `fn(&T) -> &P` 声明父类：子类实例内嵌父类实例，
//!   父类方法经投影链路调用；内省时子类中同名同参的方法遮蔽父类方法。
//!
//! ## 契约（What）
//! - [`Bean`] 是可被调用的对象；`bean_class` 必须对同一具体类型返回等价的描述；
//! - 调用器拿到的 [`Arguments`] 已按声明类型完成转换，闭包只需按位置取值。

use std::any::{Any, TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ferry_core::{
    BoxFuture, Exchange, ExchangePattern, ExpressionRef, Fault, FaultKind, FromValue, Processor,
    Value, ValueType,
};

/// 可被路由调用的应用对象。
pub trait Bean: Any + Send + Sync {
    /// 该对象的类描述。
    fn bean_class(&self) -> Arc<BeanClass>;

    /// 若对象原生实现了处理步骤契约，返回其适配器，引擎会直接调用它而不走方法分派。
    fn as_processor(self: Arc<Self>) -> Option<Arc<dyn Processor>> {
        None
    }
}

/// 共享 Bean 引用。
pub type BeanRef = Arc<dyn Bean>;

/// 取得 Bean 的 `&dyn Any` 视图。
pub fn bean_as_any(bean: &dyn Bean) -> &dyn Any {
    bean
}

/// 传给调用器的实参。
///
/// 每个位置的值已转换为声明类型；`Exchange` 类型的参数位置为占位 `Null`，通过
/// [`Arguments::exchange`] 取得 Exchange 本身。
pub struct Arguments<'a> {
    values: Vec<Value>,
    exchange: &'a mut Exchange,
}

impl<'a> Arguments<'a> {
    pub fn new(values: Vec<Value>, exchange: &'a mut Exchange) -> Self {
        Self { values, exchange }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 取出第 `index` 个实参并提取为 `T`；同一位置只能取一次。
    pub fn take<T: FromValue>(&mut self, index: usize) -> Result<T, Fault> {
        let value = self
            .values
            .get_mut(index)
            .map(std::mem::take)
            .ok_or_else(|| Fault::illegal_argument(format!("no argument at index {index}")))?;
        T::from_value(value)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn exchange(&mut self) -> &mut Exchange {
        self.exchange
    }
}

type SyncFn = dyn Fn(&dyn Any, Arguments<'_>) -> Result<Value, Fault> + Send + Sync;
type AsyncFn = dyn Fn(&dyn Any, Arguments<'_>) -> BoxFuture<'static, Result<Value, Fault>> + Send + Sync;

/// 类型擦除后的方法调用器。
#[derive(Clone)]
pub enum Invoker {
    /// 同步返回结果。
    Sync(Arc<SyncFn>),
    /// 返回在执行上下文中完成的 Future。
    Async(Arc<AsyncFn>),
}

impl Invoker {
    pub fn is_async(&self) -> bool {
        matches!(self, Invoker::Async(_))
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invoker::Sync(_) => f.write_str("Invoker::Sync"),
            Invoker::Async(_) => f.write_str("Invoker::Async"),
        }
    }
}

fn wrong_target<T>() -> Fault {
    Fault::illegal_state(format!(
        "bean instance is not a {}",
        type_name::<T>()
    ))
}

/// 参数注解，决定参数如何从 Exchange 取值。
#[derive(Clone, Debug)]
pub enum ParamAnnotation {
    /// 指定入站头部。
    Header(String),
    /// 全部入站头部。
    Headers,
    /// 指定 Exchange 属性。
    Property(String),
    /// 全部 Exchange 属性。
    Properties,
    /// Exchange 上的异常。
    ExchangeException,
    /// 显式标记为 body 参数。
    Body,
    /// 以已注册的语言编译表达式。
    Language { language: String, expression: String },
    /// 直接给定的表达式。
    Expression(ExpressionRef),
}

/// 参数声明。
#[derive(Clone, Debug)]
pub struct ParamDef {
    ty: ValueType,
    name: Option<String>,
    annotations: Vec<ParamAnnotation>,
}

impl ParamDef {
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            name: None,
            annotations: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn annotated(mut self, annotation: ParamAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn ty(&self) -> &ValueType {
        &self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn annotations(&self) -> &[ParamAnnotation] {
        &self.annotations
    }
}

/// 方法注解。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodAnnotation {
    /// 自动选择时优先的处理方法。
    Handler,
    /// 声明交换模式。
    Pattern(ExchangePattern),
}

/// 方法可见性；非公开方法不参与内省。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// 方法签名与元数据，不含调用器。
#[derive(Clone, Debug)]
pub struct MethodSignature {
    name: String,
    params: Vec<ParamDef>,
    return_type: ValueType,
    annotations: Vec<MethodAnnotation>,
    throws: Vec<&'static FaultKind>,
    visibility: Visibility,
}

impl MethodSignature {
    /// 新建签名，默认无参数、返回 `Void`、公开。
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: ValueType::Void,
            annotations: Vec::new(),
            throws: Vec::new(),
            visibility: Visibility::Public,
        }
    }

    pub fn param(mut self, ty: ValueType) -> Self {
        self.params.push(ParamDef::new(ty));
        self
    }

    pub fn param_def(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    /// 追加一个带注解的参数。
    pub fn annotated_param(mut self, ty: ValueType, annotation: ParamAnnotation) -> Self {
        self.params.push(ParamDef::new(ty).annotated(annotation));
        self
    }

    pub fn returns(mut self, ty: ValueType) -> Self {
        self.return_type = ty;
        self
    }

    pub fn handler(mut self) -> Self {
        self.annotations.push(MethodAnnotation::Handler);
        self
    }

    pub fn pattern(mut self, pattern: ExchangePattern) -> Self {
        self.annotations.push(MethodAnnotation::Pattern(pattern));
        self
    }

    pub fn throws(mut self, kind: &'static FaultKind) -> Self {
        self.throws.push(kind);
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    pub fn param_types(&self) -> Vec<ValueType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn return_type(&self) -> &ValueType {
        &self.return_type
    }

    pub fn annotations(&self) -> &[MethodAnnotation] {
        &self.annotations
    }

    pub fn throws_list(&self) -> &[&'static FaultKind] {
        &self.throws
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn has_handler_annotation(&self) -> bool {
        self.annotations.contains(&MethodAnnotation::Handler)
    }

    pub fn declared_pattern(&self) -> Option<ExchangePattern> {
        self.annotations.iter().find_map(|a| match a {
            MethodAnnotation::Pattern(p) => Some(*p),
            MethodAnnotation::Handler => None,
        })
    }

    /// 名称与参数类型相同即视为同一签名（子类覆盖父类）。
    pub fn same_signature(&self, other: &MethodSignature) -> bool {
        self.name == other.name
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.ty == b.ty)
    }
}

/// 一个已注册的方法：签名加调用器。
#[derive(Clone, Debug)]
pub struct MethodDef {
    signature: MethodSignature,
    invoker: Invoker,
}

impl MethodDef {
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }
}

/// 从子类实例投影到父类实例。
pub trait Upcast: Send + Sync {
    fn upcast<'a>(&self, target: &'a dyn Any) -> Option<&'a dyn Any>;
}

struct FieldUpcast<T, P> {
    project: fn(&T) -> &P,
}

impl<T: Any, P: Any> Upcast for FieldUpcast<T, P> {
    fn upcast<'a>(&self, target: &'a dyn Any) -> Option<&'a dyn Any> {
        target
            .downcast_ref::<T>()
            .map(|child| (self.project)(child) as &dyn Any)
    }
}

/// 父类链接。
#[derive(Clone)]
pub struct ParentLink {
    class: Arc<BeanClass>,
    upcast: Arc<dyn Upcast>,
}

impl ParentLink {
    pub fn class(&self) -> &Arc<BeanClass> {
        &self.class
    }

    pub fn upcast(&self) -> &Arc<dyn Upcast> {
        &self.upcast
    }
}

type Constructor = Arc<dyn Fn() -> BeanRef + Send + Sync>;

/// Bean 的类描述。
///
/// # 契约说明（What）
/// - `type_id` 标识具体 Rust 类型，缓存以它为键；
/// - `methods` 保持注册顺序，内省的遍历顺序因此确定；
/// - `constructor` 存在即视为拥有公开构造器，可由 [`crate::target::TypeBeanTarget`] 按作用域创建实例。
pub struct BeanClass {
    name: Cow<'static, str>,
    type_id: TypeId,
    methods: Vec<MethodDef>,
    parent: Option<ParentLink>,
    pattern: Option<ExchangePattern>,
    constructor: Option<Constructor>,
}

impl BeanClass {
    /// 为类型 `T` 开始注册。
    pub fn builder<T: Any + Send + Sync>(name: impl Into<Cow<'static, str>>) -> BeanClassBuilder<T> {
        BeanClassBuilder {
            class: BeanClass {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                methods: Vec::new(),
                parent: None,
                pattern: None,
                constructor: None,
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// 类级别声明的交换模式。
    pub fn pattern(&self) -> Option<ExchangePattern> {
        self.pattern
    }

    pub fn has_public_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// 调用公开构造器创建新实例。
    pub fn instantiate(&self) -> Option<BeanRef> {
        self.constructor.as_ref().map(|construct| construct())
    }
}

impl fmt::Debug for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanClass")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .field("parent", &self.parent.as_ref().map(|p| p.class.name()))
            .finish()
    }
}

impl fmt::Display for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// [`BeanClass`] 的类型化构建器。
pub struct BeanClassBuilder<T> {
    class: BeanClass,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> BeanClassBuilder<T> {
    /// 注册同步方法。
    pub fn method<F>(mut self, signature: MethodSignature, f: F) -> Self
    where
        F: Fn(&T, Arguments<'_>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        let invoker = Invoker::Sync(Arc::new(move |target: &dyn Any, args: Arguments<'_>| {
            let target = target.downcast_ref::<T>().ok_or_else(wrong_target::<T>)?;
            f(target, args)
        }));
        self.class.methods.push(MethodDef { signature, invoker });
        self
    }

    /// 注册异步方法；返回类型若未声明为 `Future`，自动包装为 `Future<返回类型>`。
    pub fn async_method<F>(mut self, signature: MethodSignature, f: F) -> Self
    where
        F: Fn(&T, Arguments<'_>) -> BoxFuture<'static, Result<Value, Fault>>
            + Send
            + Sync
            + 'static,
    {
        let signature = if signature.return_type.is_future() {
            signature
        } else {
            let inner = signature.return_type.clone();
            signature.returns(ValueType::future(inner))
        };
        let invoker = Invoker::Async(Arc::new(move |target: &dyn Any, args: Arguments<'_>| {
            match target.downcast_ref::<T>() {
                Some(target) => f(target, args),
                None => {
                    let fault = wrong_target::<T>();
                    Box::pin(async move { Err(fault) })
                }
            }
        }));
        self.class.methods.push(MethodDef { signature, invoker });
        self
    }

    /// 声明父类，`project` 从子类实例取得内嵌的父类实例。
    pub fn extends<P: Any>(mut self, parent: Arc<BeanClass>, project: fn(&T) -> &P) -> Self {
        self.class.parent = Some(ParentLink {
            class: parent,
            upcast: Arc::new(FieldUpcast { project }),
        });
        self
    }

    /// 类级别的交换模式，方法未声明时生效。
    pub fn pattern(mut self, pattern: ExchangePattern) -> Self {
        self.class.pattern = Some(pattern);
        self
    }

    /// 声明公开构造器。
    pub fn constructor<F>(mut self, construct: F) -> Self
    where
        T: Bean,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.class.constructor = Some(Arc::new(move || -> BeanRef { Arc::new(construct()) }));
        self
    }

    pub fn build(self) -> Arc<BeanClass> {
        Arc::new(self.class)
    }
}
