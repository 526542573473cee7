//! # target 模块说明
//!
//! ## 角色定位（Why）
//! - 调用引擎不关心实例从何而来：[`BeanTarget`] 每次调用解析一次，交出实例与其类型描述；
//! - 三种来源：常量实例、注册表查找（条目可被替换）、按类型与作用域创建。
//!
//! ## 关键约束（What）
//! - 注册表来源记住最近一次见到的类型描述，解析到的实例类型变化时重新取描述；
//! - 请求作用域的实例保存在 Exchange 属性中，同一 Exchange 多次解析得到同一实例。

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ferry_core::{Exchange, Value};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::class::{BeanClass, BeanRef};
use crate::context::BeanContext;
use crate::error::BeanError;
use crate::info::TypeDescriptor;
use crate::registry::BeanRegistry;
use crate::settings::BeanSettings;

/// 实例作用域。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BeanScope {
    /// 全部调用共享一个实例。
    #[default]
    Singleton,
    /// 每次调用新建实例。
    Prototype,
    /// 每个 Exchange 一个实例。
    Request,
}

impl fmt::Display for BeanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BeanScope::Singleton => "Singleton",
            BeanScope::Prototype => "Prototype",
            BeanScope::Request => "Request",
        })
    }
}

/// 一次解析的结果。
#[derive(Clone)]
pub struct ResolvedBean {
    bean: BeanRef,
    descriptor: Arc<TypeDescriptor>,
}

impl ResolvedBean {
    pub fn new(bean: BeanRef, descriptor: Arc<TypeDescriptor>) -> Self {
        Self { bean, descriptor }
    }

    pub fn bean(&self) -> &BeanRef {
        &self.bean
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn into_parts(self) -> (BeanRef, Arc<TypeDescriptor>) {
        (self.bean, self.descriptor)
    }
}

impl fmt::Debug for ResolvedBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedBean")
            .field("class", &self.descriptor.class_name())
            .finish()
    }
}

/// Bean 实例来源。
pub trait BeanTarget: Send + Sync {
    fn resolve(&self, exchange: &mut Exchange, context: &BeanContext) -> Result<ResolvedBean, BeanError>;

    fn scope(&self) -> BeanScope {
        BeanScope::Singleton
    }

    /// 诊断信息中使用的描述。
    fn describe(&self) -> String;
}

/// 固定实例。
pub struct ConstantBeanTarget {
    bean: BeanRef,
}

impl ConstantBeanTarget {
    pub fn new(bean: BeanRef) -> Self {
        Self { bean }
    }
}

impl BeanTarget for ConstantBeanTarget {
    fn resolve(&self, _exchange: &mut Exchange, context: &BeanContext) -> Result<ResolvedBean, BeanError> {
        let descriptor = context.type_descriptor(&self.bean.bean_class());
        Ok(ResolvedBean::new(self.bean.clone(), descriptor))
    }

    fn describe(&self) -> String {
        self.bean.bean_class().name().to_owned()
    }
}

/// 注册表查找；条目被替换为不同类型的实例时重新取类型描述。
pub struct RegistryBeanTarget {
    name: String,
    registry: Arc<dyn BeanRegistry>,
    last_seen: ArcSwapOption<TypeDescriptor>,
}

impl RegistryBeanTarget {
    pub fn new(name: impl Into<String>, registry: Arc<dyn BeanRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            last_seen: ArcSwapOption::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 最近一次解析所用类型描述的类名。
    pub fn last_seen_class(&self) -> Option<String> {
        self.last_seen
            .load_full()
            .map(|descriptor| descriptor.class_name().to_owned())
    }
}

impl BeanTarget for RegistryBeanTarget {
    fn resolve(&self, _exchange: &mut Exchange, context: &BeanContext) -> Result<ResolvedBean, BeanError> {
        let bean = self
            .registry
            .lookup(&self.name)
            .ok_or_else(|| BeanError::NoSuchBean {
                name: self.name.clone(),
            })?;
        let class = bean.bean_class();
        let cached = self.last_seen.load_full();
        let descriptor = match cached {
            Some(descriptor) if descriptor.class().type_id() == class.type_id() => descriptor,
            previous => {
                let descriptor = context.type_descriptor(&class);
                if let Some(previous) = previous {
                    tracing::debug!(
                        name = %self.name,
                        from = previous.class_name(),
                        to = class.name(),
                        "registry bean changed class; re-introspecting"
                    );
                }
                self.last_seen.store(Some(descriptor.clone()));
                descriptor
            }
        };
        Ok(ResolvedBean::new(bean, descriptor))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// 按类型创建实例，要求类声明了公开构造器。
pub struct TypeBeanTarget {
    class: Arc<BeanClass>,
    scope: BeanScope,
    singleton: Mutex<Option<BeanRef>>,
}

impl TypeBeanTarget {
    pub fn new(class: Arc<BeanClass>, scope: BeanScope) -> Self {
        Self {
            class,
            scope,
            singleton: Mutex::new(None),
        }
    }

    /// 作用域取自配置。
    pub fn from_settings(class: Arc<BeanClass>, settings: &BeanSettings) -> Self {
        Self::new(class, settings.scope)
    }

    fn request_key(&self) -> String {
        format!("FerryBeanInstance.{}", self.class.name())
    }

    fn instantiate(&self) -> Result<BeanRef, BeanError> {
        self.class.instantiate().ok_or_else(|| BeanError::NoSuchBean {
            name: format!("{} (no public constructor)", self.class.name()),
        })
    }

    fn instance(&self, exchange: &mut Exchange) -> Result<BeanRef, BeanError> {
        match self.scope {
            BeanScope::Singleton => {
                let mut slot = self.singleton.lock();
                if let Some(bean) = slot.as_ref() {
                    return Ok(bean.clone());
                }
                let bean = self.instantiate()?;
                *slot = Some(bean.clone());
                Ok(bean)
            }
            BeanScope::Prototype => self.instantiate(),
            BeanScope::Request => {
                let key = self.request_key();
                if let Some(bean) = exchange
                    .property(&key)
                    .and_then(|value| value.downcast_object::<BeanRef>())
                {
                    return Ok(bean.clone());
                }
                let bean = self.instantiate()?;
                exchange.set_property(key, Value::object("BeanRef", bean.clone()));
                Ok(bean)
            }
        }
    }
}

impl BeanTarget for TypeBeanTarget {
    fn resolve(&self, exchange: &mut Exchange, context: &BeanContext) -> Result<ResolvedBean, BeanError> {
        let bean = self.instance(exchange)?;
        Ok(ResolvedBean::new(bean, context.type_descriptor(&self.class)))
    }

    fn scope(&self) -> BeanScope {
        self.scope
    }

    fn describe(&self) -> String {
        self.class.name().to_owned()
    }
}
