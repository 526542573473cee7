//! Bean 子系统配置。
//!
//! 以 TOML 描述，全部字段可缺省：
//!
//! ```toml
//! cache_capacity = 1000
//! method_cache_capacity = 1000
//! scope = "singleton"
//! multi_parameter_array = false
//! shorthand_getters = true
//!
//! [proxy]
//! worker_threads = 4
//! thread_name = "ferry-proxy"
//! binding = true
//! ```

use serde::Deserialize;

use crate::cache::DEFAULT_CAPACITY;
use crate::target::BeanScope;

/// 配置解析失败。
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid bean settings: {0}")]
    Parse(#[from] toml::de::Error),
}

impl SettingsError {
    pub fn code(&self) -> &'static str {
        match self {
            SettingsError::Parse(_) => "bean.settings_parse",
        }
    }
}

/// 调用引擎与缓存配置。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BeanSettings {
    /// 类型描述缓存容量。
    pub cache_capacity: usize,
    /// 方法描述缓存容量。
    pub method_cache_capacity: usize,
    /// 按类型创建实例时的作用域。
    pub scope: BeanScope,
    /// 入站 body 为列表时按位置绑定全部参数。
    pub multi_parameter_array: bool,
    /// 显式方法名找不到时尝试 getter 简写。
    pub shorthand_getters: bool,
    pub proxy: ProxySettings,
}

impl Default for BeanSettings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            method_cache_capacity: DEFAULT_CAPACITY,
            scope: BeanScope::Singleton,
            multi_parameter_array: false,
            shorthand_getters: true,
            proxy: ProxySettings::default(),
        }
    }
}

impl BeanSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }
}

/// 反向代理配置。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProxySettings {
    /// 共享执行器线程数，`0` 表示由运行时决定。
    pub worker_threads: usize,
    /// 共享执行器线程名前缀。
    pub thread_name: Option<String>,
    /// 以延迟调用对象作为 body 发送（绑定模式）。
    pub binding: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name: None,
            binding: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(BeanSettings::from_toml_str("").unwrap(), BeanSettings::default());
    }

    #[test]
    fn parses_nested_proxy_table() {
        let settings = BeanSettings::from_toml_str(
            r#"
            cache_capacity = 8
            scope = "prototype"

            [proxy]
            worker_threads = 2
            thread_name = "orders-proxy"
            binding = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.cache_capacity, 8);
        assert_eq!(settings.method_cache_capacity, DEFAULT_CAPACITY);
        assert_eq!(settings.scope, BeanScope::Prototype);
        assert_eq!(settings.proxy.worker_threads, 2);
        assert_eq!(settings.proxy.thread_name.as_deref(), Some("orders-proxy"));
        assert!(!settings.proxy.binding);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = BeanSettings::from_toml_str("cache_size = 3").unwrap_err();
        assert_eq!(error.code(), "bean.settings_parse");
    }
}
