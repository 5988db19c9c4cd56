use thiserror::Error;

use crate::handle::NativeResourceId;

/// 回读请求对外暴露的错误
///
/// 所有错误都是通过轮询状态得到的，渲染线程不会跨线程抛出错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadbackError {
    /// 任务还在 Pending 时就去取数据，属于调用方的编程错误
    #[error("the request is not done yet")]
    NotYetDone,

    /// 渲染线程报告拷贝失败
    #[error("the request has an error")]
    ReadbackFailed,

    /// 句柄已被回收，或者从来就不存在
    #[error("the request no longer exists")]
    NoLongerExists,

    /// 结果所在的内存已经被释放（调用者 dispose 了目标 buffer，或内部结果已随任务回收）
    #[error("the backing memory of the request has been deallocated")]
    UseAfterFree,

    /// 目标内存正被一个进行中的回读独占
    #[error("the buffer is locked by an in-flight readback")]
    BufferInUse,

    /// 元素类型的对齐要求超过了存储的对齐
    #[error("element alignment {align} exceeds storage alignment {max}")]
    Misaligned { align: usize, max: usize },

    #[error("too many requests in flight (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("the render thread is no longer running")]
    RenderThreadGone,
}

/// 渲染线程上拷贝失败的原因，只用于日志；对外统一表现为 [`ReadbackError::ReadbackFailed`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyFailure {
    #[error("unknown resource {0}")]
    UnknownResource(NativeResourceId),

    #[error("resource {0} has no content")]
    EmptyResource(NativeResourceId),

    /// 像素不是整字节对齐的格式，不支持回读
    #[error("unsupported texture format {format} ({bits} bits per pixel)")]
    UnsupportedFormat { format: String, bits: u32 },

    #[error("mip level {mip_level} out of range (texture has {mip_count} levels)")]
    MipOutOfRange { mip_level: u32, mip_count: u32 },

    #[error("requested {requested} bytes but the buffer only has {available}")]
    OutOfBounds { requested: usize, available: usize },

    /// fence 查询失败（上下文丢失等）
    #[error("fence lost")]
    FenceLost,
}
