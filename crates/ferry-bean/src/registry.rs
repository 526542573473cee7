//! 按名称查找 Bean 实例的注册表。

use std::fmt;

use dashmap::DashMap;

use crate::class::BeanRef;

/// Bean 注册表契约。
pub trait BeanRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<BeanRef>;
}

/// 基于 `DashMap` 的内存注册表，条目可在运行期替换。
#[derive(Default)]
pub struct SimpleRegistry {
    beans: DashMap<String, BeanRef>,
}

impl SimpleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定名称，返回被替换的旧实例。
    pub fn bind(&self, name: impl Into<String>, bean: BeanRef) -> Option<BeanRef> {
        self.beans.insert(name.into(), bean)
    }

    pub fn unbind(&self, name: &str) -> Option<BeanRef> {
        self.beans.remove(name).map(|(_, bean)| bean)
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }
}

impl BeanRegistry for SimpleRegistry {
    fn lookup(&self, name: &str) -> Option<BeanRef> {
        self.beans.get(name).map(|entry| entry.value().clone())
    }
}

impl fmt::Debug for SimpleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.beans.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("SimpleRegistry").field("names", &names).finish()
    }
}
