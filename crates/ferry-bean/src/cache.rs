//! # cache 模块说明
//!
//! ## 角色定位（Why）
//! - 内省成本远高于一次调用，类型描述按 `(类型, 参数映射策略)` 缓存，方法描述按
//!   `(所属类型键, MethodKey)` 缓存：同一继承方法经不同具体类内省时投影链不同，不能共用条目；
//! - 缓存只是加速手段，淘汰后重新内省得到等价结果，调用结果不依赖缓存状态。
//!
//! ## 并发语义（What）
//! - 两张表各由一把 `parking_lot::Mutex` 保护，容量固定，超出时淘汰最久未使用的条目；
//! - `resolve-or-create` 在锁外计算，写回时若已有并发写入的值则保留先写入者并返回它。

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::info::TypeDescriptor;
use crate::method::{MethodDescriptor, MethodKey};

/// 默认容量。
pub const DEFAULT_CAPACITY: usize = 1000;

/// 固定容量的 LRU 表：`entries` 存值与最近访问序号，`order` 按序号索引键。
struct LruMap<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K: Clone + Eq + Hash, V: Clone> LruMap<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (value, last) = self.entries.get_mut(key)?;
        self.order.remove(last);
        *last = tick;
        self.order.insert(tick, key.clone());
        Some(value.clone())
    }

    /// 插入新值，返回被淘汰的条目数。
    fn insert(&mut self, key: K, value: V) -> usize {
        let tick = self.next_tick();
        if let Some((_, last)) = self.entries.insert(key.clone(), (value, tick)) {
            self.order.remove(&last);
        }
        self.order.insert(tick, key);
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted += 1;
        }
        evicted
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// 类型描述缓存键。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub type_id: TypeId,
    pub strategy: String,
}

/// 缓存统计。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub types: usize,
    pub methods: usize,
}

/// 内省结果缓存。
pub struct InvocationCache {
    types: Mutex<LruMap<TypeKey, Arc<TypeDescriptor>>>,
    methods: Mutex<LruMap<(TypeKey, MethodKey), Arc<MethodDescriptor>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InvocationCache {
    pub fn new(type_capacity: usize, method_capacity: usize) -> Self {
        Self {
            types: Mutex::new(LruMap::new(type_capacity)),
            methods: Mutex::new(LruMap::new(method_capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 取缓存的类型描述，没有时在锁外调用 `create` 并写回。
    pub fn type_descriptor_or_insert_with(
        &self,
        key: TypeKey,
        create: impl FnOnce() -> TypeDescriptor,
    ) -> Arc<TypeDescriptor> {
        if let Some(found) = self.types.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let created = Arc::new(create());

        let stored = {
            let mut types = self.types.lock();
            match types.get(&key) {
                Some(existing) => existing,
                None => {
                    let evicted = types.insert(key.clone(), created.clone());
                    self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                    created
                }
            }
        };
        let mut methods = self.methods.lock();
        for method in stored.methods() {
            let evicted = methods.insert((key.clone(), method.key().clone()), method.clone());
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        stored
    }

    /// 取 `owner` 类型描述下的方法描述。
    pub fn method(&self, owner: &TypeKey, key: &MethodKey) -> Option<Arc<MethodDescriptor>> {
        let found = self.methods.lock().get(&(owner.clone(), key.clone()));
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            types: self.types.lock().len(),
            methods: self.methods.lock().len(),
        }
    }

    pub fn clear(&self) {
        self.types.lock().clear();
        self.methods.lock().clear();
    }
}

impl Default for InvocationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for InvocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationCache").field("stats", &self.stats()).finish()
    }
}
