use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 回读任务句柄
///
/// 进程内唯一、单调递增，从不复用。句柄被回收之后再查询只会得到 "不存在"，
/// 不会和之后创建的新任务混淆。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);
impl TaskHandle {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}
impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

/// 两个后端共用的句柄分配器
///
/// 内置后端和自定义后端的句柄来自同一个计数器，因此不同后端的请求也不会撞号。
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}
impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
impl HandleAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    #[inline]
    pub fn allocate(&self) -> TaskHandle {
        TaskHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// GPU 资源的原生标识（GL name / native pointer）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeResourceId(pub u64);
impl fmt::Display for NativeResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// 任务状态机
///
/// 状态流转: Pending -> Done  -> Disposed
///                  \-> Error -/
///
/// Pending -> Done/Error 只发生在渲染线程，回收 (Disposed) 只发生在控制线程。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// 已创建，拷贝还在 GPU 上进行
    Pending,
    /// 拷贝完成，结果可读
    Done,
    /// 拷贝失败
    Error,
    /// 已被回收，句柄失效
    Disposed,
}
impl TaskState {
    /// Done、Error、Disposed 都算 "完成"
    #[inline]
    pub fn is_finished(self) -> bool {
        !matches!(self, TaskState::Pending)
    }

    /// Disposed 也算作出错：对消费者来说 "已回收" 和 "失败" 一样，都不能再取数据
    #[inline]
    pub fn reports_error(self) -> bool {
        matches!(self, TaskState::Error | TaskState::Disposed)
    }

    /// 状态机的合法转换
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Done)
                | (TaskState::Pending, TaskState::Error)
                | (TaskState::Done, TaskState::Disposed)
                | (TaskState::Error, TaskState::Disposed)
        )
    }
}

/// 回读的源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadbackTarget {
    Texture { resource: NativeResourceId, mip_level: u32 },
    Buffer { resource: NativeResourceId, byte_size: usize },
}
impl ReadbackTarget {
    pub fn resource(&self) -> NativeResourceId {
        match self {
            ReadbackTarget::Texture { resource, .. } | ReadbackTarget::Buffer { resource, .. } => *resource,
        }
    }
}

/// 结果内存归谁所有，决定了消费者是否需要在任务回收前把数据拷走
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// 没有结果内存（创建时请求没能交给渲染线程）
    None,
    /// 后端分配的临时内存，任务回收时释放
    Temporary,
    /// 平台持有的内存，生命周期跟随平台请求
    Persistent,
    /// 调用者提供的内存，原地写入
    CallerProvided,
}
impl AllocatorKind {
    #[inline]
    pub fn must_copy_before_dispose(self) -> bool {
        matches!(self, AllocatorKind::Temporary | AllocatorKind::Persistent)
    }
}

/// 服务请求的后端
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// 平台自带的异步回读
    Builtin,
    /// 基于 fence + staging 的自定义实现
    Custom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_monotonic() {
        let allocator = HandleAllocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        let c = allocator.allocate();
        assert!(a < b && b < c);
        assert_eq!(a.raw() + 1, b.raw());
        assert_eq!(format!("{}", a), format!("Task#{}", a.raw()));
    }

    #[test]
    fn test_state_machine_never_reverses() {
        use TaskState::*;
        let all = [Pending, Done, Error, Disposed];
        for from in all {
            for to in all {
                if from.can_transition_to(to) {
                    // 没有任何一条边能走回去
                    assert!(!to.can_transition_to(from));
                }
            }
        }
        assert!(!Done.can_transition_to(Pending));
        assert!(!Error.can_transition_to(Done));
        assert!(!Disposed.can_transition_to(Pending));
    }

    #[test]
    fn test_disposed_reports_error() {
        assert!(!TaskState::Pending.reports_error());
        assert!(!TaskState::Done.reports_error());
        assert!(TaskState::Error.reports_error());
        assert!(TaskState::Disposed.reports_error());
        assert!(TaskState::Disposed.is_finished());
    }
}
