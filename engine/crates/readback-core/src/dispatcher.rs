use bytemuck::Pod;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::builtin::BuiltinBackend;
use crate::error::ReadbackError;
use crate::handle::{BackendKind, NativeResourceId, TaskHandle};
use crate::registry::TaskRegistry;
use crate::request::ReadbackRequest;
use crate::resource_cache::{GpuResource, ResourceHandleCache, ResourceKind};
use crate::safety::SafetyHandleManager;
use crate::storage::{ExternalDestination, ReadbackBuffer};

/// 回读入口
///
/// 平台支持异步回读时走内置后端，否则走自定义后端。选择在创建时确定一次，
/// 之后所有请求都走同一个后端。
pub struct AsyncReadback {
    builtin: Option<Arc<BuiltinBackend>>,
    registry: Arc<TaskRegistry>,
    safety: Arc<SafetyHandleManager>,
    resource_cache: Mutex<ResourceHandleCache>,
}
// new & init
impl AsyncReadback {
    /// # Arguments
    /// * `builtin` - 平台后端；为 `None` 或平台不支持时一律走自定义后端
    /// * `force_custom` - 即使平台支持也走自定义后端
    pub fn new(
        registry: Arc<TaskRegistry>,
        builtin: Option<Arc<BuiltinBackend>>,
        safety: Arc<SafetyHandleManager>,
        force_custom: bool,
    ) -> Self {
        let builtin = builtin.filter(|builtin| !force_custom && builtin.platform_supported());
        log::info!(
            "async readback uses the {:?} backend",
            if builtin.is_some() { BackendKind::Builtin } else { BackendKind::Custom }
        );
        Self {
            builtin,
            registry,
            safety,
            resource_cache: Mutex::new(ResourceHandleCache::new()),
        }
    }
}
// getters
impl AsyncReadback {
    pub fn backend_kind(&self) -> BackendKind {
        if self.builtin.is_some() { BackendKind::Builtin } else { BackendKind::Custom }
    }

    pub fn safety(&self) -> &Arc<SafetyHandleManager> {
        &self.safety
    }

    /// 缓存中的资源数
    pub fn cached_resources(&self) -> usize {
        self.cache().len()
    }

    /// 实际发起过的原生句柄查询次数
    pub fn native_queries(&self) -> u64 {
        self.cache().resolve_count()
    }
}
// Readback API
impl AsyncReadback {
    /// 创建可以作为回读目标的 buffer
    pub fn create_buffer<T: Pod>(&self, len: usize) -> Result<ReadbackBuffer<T>, ReadbackError> {
        ReadbackBuffer::new(&self.safety, len)
    }

    /// 回读纹理的第 0 级 mip，或整个 buffer
    pub fn request<R: GpuResource + 'static>(&self, resource: &Arc<R>) -> Result<ReadbackRequest, ReadbackError> {
        self.dispatch(resource, 0, None)
    }

    /// 回读纹理的指定 mip；buffer 忽略 `mip_level`
    pub fn request_mip<R: GpuResource + 'static>(
        &self,
        resource: &Arc<R>,
        mip_level: u32,
    ) -> Result<ReadbackRequest, ReadbackError> {
        self.dispatch(resource, mip_level, None)
    }

    /// 结果直接写进调用者的 buffer；结果比 buffer 大时只写入 buffer 长度
    ///
    /// buffer 在回读期间被锁定，已有回读进行中时返回 `BufferInUse`。
    pub fn request_into<T: Pod, R: GpuResource + 'static>(
        &self,
        destination: &ReadbackBuffer<T>,
        resource: &Arc<R>,
    ) -> Result<ReadbackRequest, ReadbackError> {
        self.dispatch(resource, 0, Some(destination.destination()))
    }

    pub fn request_into_mip<T: Pod, R: GpuResource + 'static>(
        &self,
        destination: &ReadbackBuffer<T>,
        resource: &Arc<R>,
        mip_level: u32,
    ) -> Result<ReadbackRequest, ReadbackError> {
        self.dispatch(resource, mip_level, Some(destination.destination()))
    }

    /// 已经拿到原生句柄的纹理；总是走自定义后端
    pub fn request_native_texture(
        &self,
        texture: NativeResourceId,
        mip_level: u32,
    ) -> Result<ReadbackRequest, ReadbackError> {
        self.issue_custom(ResourceKind::Texture, texture, mip_level, None)
    }

    /// 已经拿到原生句柄的 buffer；总是走自定义后端
    pub fn request_native_buffer(
        &self,
        buffer: NativeResourceId,
        byte_size: usize,
    ) -> Result<ReadbackRequest, ReadbackError> {
        self.issue_custom(ResourceKind::Buffer { byte_size }, buffer, 0, None)
    }

    /// 清理已销毁资源的缓存条目
    pub fn purge_dead_resources(&self) -> usize {
        self.cache().purge_dead()
    }
}
// tools
impl AsyncReadback {
    fn dispatch<R: GpuResource + 'static>(
        &self,
        resource: &Arc<R>,
        mip_level: u32,
        destination: Option<ExternalDestination>,
    ) -> Result<ReadbackRequest, ReadbackError> {
        let native_id = self.cache().resolve(resource);
        self.issue(resource.kind(), native_id, mip_level, destination)
    }

    fn issue(
        &self,
        kind: ResourceKind,
        native_id: NativeResourceId,
        mip_level: u32,
        destination: Option<ExternalDestination>,
    ) -> Result<ReadbackRequest, ReadbackError> {
        if let Some(builtin) = &self.builtin {
            let handle: TaskHandle = match kind {
                ResourceKind::Texture => builtin.create_texture_request(native_id, mip_level, destination)?,
                ResourceKind::Buffer { byte_size } => builtin.create_buffer_request(native_id, byte_size, destination)?,
            };
            return Ok(ReadbackRequest::builtin(handle, builtin.clone(), self.safety.clone()));
        }
        self.issue_custom(kind, native_id, mip_level, destination)
    }

    fn issue_custom(
        &self,
        kind: ResourceKind,
        native_id: NativeResourceId,
        mip_level: u32,
        destination: Option<ExternalDestination>,
    ) -> Result<ReadbackRequest, ReadbackError> {
        let handle = match kind {
            ResourceKind::Texture => self.registry.create_texture_task(native_id, mip_level, destination)?,
            ResourceKind::Buffer { byte_size } => self.registry.create_buffer_task(native_id, byte_size, destination)?,
        };
        Ok(ReadbackRequest::custom(handle, self.registry.clone(), self.safety.clone()))
    }

    fn cache(&self) -> MutexGuard<'_, ResourceHandleCache> {
        self.resource_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
