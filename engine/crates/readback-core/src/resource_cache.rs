use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::handle::NativeResourceId;

/// 资源种类，决定走纹理回读还是 buffer 回读
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer { byte_size: usize },
}

/// 可以被回读的 GPU 资源（纹理 / compute buffer）
pub trait GpuResource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// 查询原生句柄
    ///
    /// 这个调用通常会让控制线程和渲染线程同步一次，代价很高，
    /// 所以经由 [`ResourceHandleCache`] 调用，每个资源只查一次。
    fn query_native_id(&self) -> NativeResourceId;

    /// 资源是否已经被销毁
    fn is_alive(&self) -> bool {
        true
    }
}

struct CacheEntry {
    resource: Weak<dyn GpuResource>,
    native_id: NativeResourceId,
}
impl CacheEntry {
    fn is_live(&self) -> bool {
        self.resource.upgrade().is_some_and(|resource| resource.is_alive())
    }
}

#[inline]
fn cache_key<R>(resource: &Arc<R>) -> usize {
    Arc::as_ptr(resource) as *const () as usize
}

/// 资源 -> 原生句柄 的缓存
///
/// 只持有资源的弱引用，不影响资源生命周期。资源销毁后条目失效，
/// 由 [`ResourceHandleCache::purge_dead`] 每帧清理一次。
#[derive(Default)]
pub struct ResourceHandleCache {
    entries: HashMap<usize, CacheEntry>,

    /// 实际发起的原生查询次数
    resolve_count: u64,
}
// new & init
impl ResourceHandleCache {
    pub fn new() -> Self {
        Self::default()
    }
}
// tools
impl ResourceHandleCache {
    /// 取资源的原生句柄，第一次访问时才真正查询
    pub fn resolve<R: GpuResource + 'static>(&mut self, resource: &Arc<R>) -> NativeResourceId {
        let key = cache_key(resource);

        // 同一地址可能被一个已经销毁的资源用过，所以除了 key 还要确认弱引用仍然活着
        if let Some(entry) = self.entries.get(&key)
            && entry.resource.strong_count() > 0
        {
            return entry.native_id;
        }

        let native_id = resource.query_native_id();
        self.resolve_count += 1;

        let strong: Arc<dyn GpuResource> = resource.clone();
        self.entries.insert(
            key,
            CacheEntry {
                resource: Arc::downgrade(&strong),
                native_id,
            },
        );
        native_id
    }

    /// 清理已销毁资源的条目，返回清理的数量
    pub fn purge_dead(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        let purged = before - self.entries.len();
        if purged > 0 {
            log::debug!("purged {} dead resource handles", purged);
        }
        purged
    }

    pub fn contains<R: GpuResource + 'static>(&self, resource: &Arc<R>) -> bool {
        self.entries
            .get(&cache_key(resource))
            .is_some_and(|entry| entry.resource.strong_count() > 0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve_count(&self) -> u64 {
        self.resolve_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct FakeTexture {
        id: u64,
        queries: AtomicU64,
        alive: AtomicBool,
    }
    impl FakeTexture {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                queries: AtomicU64::new(0),
                alive: AtomicBool::new(true),
            })
        }
    }
    impl GpuResource for FakeTexture {
        fn kind(&self) -> ResourceKind {
            ResourceKind::Texture
        }
        fn query_native_id(&self) -> NativeResourceId {
            self.queries.fetch_add(1, Ordering::SeqCst);
            NativeResourceId(self.id)
        }
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_resolve_queries_once() {
        let mut cache = ResourceHandleCache::new();
        let texture = FakeTexture::new(42);

        assert_eq!(cache.resolve(&texture), NativeResourceId(42));
        assert_eq!(cache.resolve(&texture), NativeResourceId(42));
        assert_eq!(cache.resolve(&texture), NativeResourceId(42));
        assert_eq!(texture.queries.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolve_count(), 1);
        assert!(cache.contains(&texture));
    }

    #[test]
    fn test_purge_dead_entries() {
        let mut cache = ResourceHandleCache::new();
        let kept = FakeTexture::new(1);
        let destroyed = FakeTexture::new(2);
        let dropped = FakeTexture::new(3);

        cache.resolve(&kept);
        cache.resolve(&destroyed);
        cache.resolve(&dropped);
        assert_eq!(cache.len(), 3);

        // 一个被显式销毁，一个所有引用都没了
        destroyed.alive.store(false, Ordering::SeqCst);
        drop(dropped);

        assert_eq!(cache.purge_dead(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&kept));
        assert_eq!(cache.purge_dead(), 0);
    }

    #[test]
    fn test_dead_entry_is_not_reused() {
        let mut cache = ResourceHandleCache::new();
        let first = FakeTexture::new(10);
        cache.resolve(&first);
        drop(first);

        // 新资源即使拿到同一个地址也会重新查询
        let second = FakeTexture::new(11);
        assert_eq!(cache.resolve(&second), NativeResourceId(11));
        assert_eq!(second.queries.load(Ordering::SeqCst), 1);
    }
}
