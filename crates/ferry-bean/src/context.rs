//! # context 模块说明
//!
//! [`BeanContext`] 汇集调用引擎的协作者：类型转换器、参数映射策略、表达式语言注册表、
//! 内省缓存与配置。克隆只复制引用，多个调用引擎共享同一份缓存。

use std::fmt;
use std::sync::Arc;

use ferry_core::{DefaultTypeConverter, LanguageRegistry, TypeConverter};

use crate::cache::{InvocationCache, TypeKey};
use crate::class::BeanClass;
use crate::info::TypeDescriptor;
use crate::parameter::{DefaultParameterMappingStrategy, StrategyRef};
use crate::settings::BeanSettings;

/// 调用引擎的共享协作者。
#[derive(Clone)]
pub struct BeanContext {
    converter: Arc<dyn TypeConverter>,
    strategy: StrategyRef,
    languages: Arc<LanguageRegistry>,
    cache: Arc<InvocationCache>,
    settings: BeanSettings,
}

impl BeanContext {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BeanContextBuilder {
        BeanContextBuilder::default()
    }

    pub fn converter(&self) -> &Arc<dyn TypeConverter> {
        &self.converter
    }

    pub fn strategy(&self) -> &StrategyRef {
        &self.strategy
    }

    pub fn languages(&self) -> &Arc<LanguageRegistry> {
        &self.languages
    }

    pub fn cache(&self) -> &Arc<InvocationCache> {
        &self.cache
    }

    pub fn settings(&self) -> &BeanSettings {
        &self.settings
    }

    /// 取 `class` 在当前策略下的类型描述，经缓存。
    pub fn type_descriptor(&self, class: &Arc<BeanClass>) -> Arc<TypeDescriptor> {
        let key = TypeKey {
            type_id: class.type_id(),
            strategy: self.strategy.id().to_owned(),
        };
        self.cache.type_descriptor_or_insert_with(key, || {
            tracing::debug!(class = class.name(), strategy = self.strategy.id(), "introspecting bean class");
            TypeDescriptor::introspect(class, self.strategy.as_ref(), &self.languages)
        })
    }
}

impl Default for BeanContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BeanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanContext")
            .field("strategy", &self.strategy.id())
            .field("languages", &self.languages)
            .field("cache", &self.cache)
            .finish()
    }
}

/// [`BeanContext`] 构建器；未设置的协作者取默认实现。
#[derive(Default)]
pub struct BeanContextBuilder {
    converter: Option<Arc<dyn TypeConverter>>,
    strategy: Option<StrategyRef>,
    languages: Option<Arc<LanguageRegistry>>,
    cache: Option<Arc<InvocationCache>>,
    settings: BeanSettings,
}

impl BeanContextBuilder {
    pub fn converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn strategy(mut self, strategy: StrategyRef) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn languages(mut self, languages: Arc<LanguageRegistry>) -> Self {
        self.languages = Some(languages);
        self
    }

    /// 与其他上下文共享缓存。
    pub fn cache(mut self, cache: Arc<InvocationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(mut self, settings: BeanSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> BeanContext {
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(InvocationCache::new(
                self.settings.cache_capacity,
                self.settings.method_cache_capacity,
            ))
        });
        BeanContext {
            converter: self
                .converter
                .unwrap_or_else(|| Arc::new(DefaultTypeConverter::new())),
            strategy: self
                .strategy
                .unwrap_or_else(|| Arc::new(DefaultParameterMappingStrategy::new())),
            languages: self
                .languages
                .unwrap_or_else(|| Arc::new(LanguageRegistry::with_defaults())),
            cache,
            settings: self.settings,
        }
    }
}
