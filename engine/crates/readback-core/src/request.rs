use bytemuck::Pod;
use std::fmt;
use std::sync::Arc;

use crate::builtin::BuiltinBackend;
use crate::error::ReadbackError;
use crate::handle::{AllocatorKind, BackendKind, TaskHandle, TaskState};
use crate::registry::{TaskData, TaskRegistry};
use crate::safety::SafetyHandleManager;
use crate::storage::ReadbackView;

#[derive(Clone)]
enum Backend {
    Custom(Arc<TaskRegistry>),
    Builtin(Arc<BuiltinBackend>),
}

/// 一次回读请求
///
/// 只是句柄加上后端的引用，可以随意克隆。请求被回收之后：
/// - `done()` 返回 true
/// - `has_error()` 返回 true
/// - `status()` 返回 [`TaskState::Disposed`]
#[derive(Clone)]
pub struct ReadbackRequest {
    handle: TaskHandle,
    backend: Backend,
    safety: Arc<SafetyHandleManager>,
}
// new & init
impl ReadbackRequest {
    pub(crate) fn custom(handle: TaskHandle, registry: Arc<TaskRegistry>, safety: Arc<SafetyHandleManager>) -> Self {
        Self {
            handle,
            backend: Backend::Custom(registry),
            safety,
        }
    }

    pub(crate) fn builtin(handle: TaskHandle, builtin: Arc<BuiltinBackend>, safety: Arc<SafetyHandleManager>) -> Self {
        Self {
            handle,
            backend: Backend::Builtin(builtin),
            safety,
        }
    }
}
// getters
impl ReadbackRequest {
    #[inline]
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.backend {
            Backend::Custom(_) => BackendKind::Custom,
            Backend::Builtin(_) => BackendKind::Builtin,
        }
    }

    pub fn done(&self) -> bool {
        match &self.backend {
            Backend::Custom(registry) => registry.is_done(self.handle),
            Backend::Builtin(builtin) => builtin.is_done(self.handle),
        }
    }

    pub fn has_error(&self) -> bool {
        match &self.backend {
            Backend::Custom(registry) => registry.has_error(self.handle),
            Backend::Builtin(builtin) => builtin.has_error(self.handle),
        }
    }

    /// 请求是否还没被回收
    pub fn valid(&self) -> bool {
        match &self.backend {
            Backend::Custom(registry) => registry.exists(self.handle),
            Backend::Builtin(builtin) => builtin.exists(self.handle),
        }
    }

    /// 区分 "拷贝失败" 和 "已被回收"
    pub fn status(&self) -> TaskState {
        match &self.backend {
            Backend::Custom(registry) => registry.status(self.handle),
            Backend::Builtin(builtin) => builtin.status(self.handle),
        }
    }

    pub fn allocator_kind(&self) -> Option<AllocatorKind> {
        match &self.backend {
            Backend::Custom(registry) => registry.allocator_kind(self.handle),
            Backend::Builtin(builtin) => builtin.allocator_kind(self.handle),
        }
    }
}
// tools
impl ReadbackRequest {
    /// 把结果按 `T` 解释
    ///
    /// 视图的元素个数为 `byte_len / size_of::<T>()`。外部目标时视图就是调用者的 buffer。
    pub fn get_data<T: Pod>(&self) -> Result<ReadbackView<T>, ReadbackError> {
        let TaskData { bytes, byte_len, marker, .. } = match &self.backend {
            Backend::Custom(registry) => registry.get_data(self.handle)?,
            Backend::Builtin(builtin) => builtin.get_data(self.handle)?,
        };
        ReadbackView::new(bytes, byte_len, Some(marker), self.safety.clone())
    }

    /// 阻塞直到请求结束；已回收的请求立即返回
    pub fn wait_for_completion(&self) {
        match &self.backend {
            Backend::Custom(registry) => registry.wait_for_completion(self.handle),
            Backend::Builtin(builtin) => builtin.wait_for_completion(self.handle),
        }
    }

    /// 让调用者的 buffer 尽快重新可用
    ///
    /// 自定义后端在完成时已经解锁，这里什么都不做。
    pub fn release_external_hold(&self) {
        if let Backend::Builtin(builtin) = &self.backend {
            builtin.release_external_hold(self.handle);
        }
    }
}
impl fmt::Debug for ReadbackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadbackRequest")
            .field("handle", &self.handle)
            .field("backend", &self.backend_kind())
            .finish()
    }
}
