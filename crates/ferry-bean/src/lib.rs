#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "ferry-bean: 把应用对象作为路由处理步骤调用的 Bean 子系统。"]
#![doc = ""]
#![doc = "== 模块划分 =="]
#![doc = "1. `class`：以显式注册代替运行期反射的类描述；"]
#![doc = "2. `parameter`/`method`/`info`：参数绑定、方法元数据与类型内省；"]
#![doc = "3. `selector`/`cache`：方法选择算法与有界内省缓存；"]
#![doc = "4. `target`/`registry`/`processor`：实例来源与调用引擎；"]
#![doc = "5. `invocation`/`proxy`：延迟调用与反向代理；"]
#![doc = "6. `context`/`settings`/`error`：协作者、配置与错误模型。"]

pub mod cache;
pub mod class;
pub mod context;
pub mod error;
pub mod info;
pub mod invocation;
pub mod method;
pub mod parameter;
pub mod processor;
pub mod proxy;
pub mod registry;
pub mod selector;
pub mod settings;
pub mod target;

pub use cache::{CacheStats, DEFAULT_CAPACITY, InvocationCache, TypeKey};
pub use class::{
    Arguments, Bean, BeanClass, BeanClassBuilder, BeanRef, Invoker, MethodAnnotation,
    MethodSignature, ParamAnnotation, ParamDef, bean_as_any,
};
pub use context::{BeanContext, BeanContextBuilder};
pub use error::BeanError;
pub use info::TypeDescriptor;
pub use invocation::DeferredInvocation;
pub use method::{InvocationOutcome, MethodDescriptor, MethodKey};
pub use parameter::{
    BindingRole, DefaultParameterMappingStrategy, MethodCall, ParameterBinding,
    ParameterMappingStrategy, ParameterValue,
};
pub use processor::{BeanProcessor, BeanProcessorBuilder};
pub use proxy::{
    InterfaceMethod, InterfaceSpec, PendingReply, ProxyBuilder, ProxyHandler, ProxyReply, map_fault,
};
pub use registry::{BeanRegistry, SimpleRegistry};
pub use selector::{MethodSelector, SelectionHints};
pub use settings::{BeanSettings, ProxySettings, SettingsError};
pub use target::{
    BeanScope, BeanTarget, ConstantBeanTarget, RegistryBeanTarget, ResolvedBean, TypeBeanTarget,
};
