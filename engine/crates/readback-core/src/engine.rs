//! 自定义后端依赖的底层 GPU 原语
//!
//! 只在渲染线程上调用。一次回读拆成三步:
//! 1. `begin_*_copy`：把资源内容拷到 staging 内存（PBO），并插入一个 fence
//! 2. `poll_fence`：每帧查询 fence 状态
//! 3. fence signaled 之后 `read_back` 把 staging 内容拷给任务，然后 `release`

use crate::error::CopyFailure;
use crate::handle::NativeResourceId;

/// 一次已提交的拷贝
#[derive(Debug, PartialEq, Eq)]
pub struct CopyTicket {
    pub id: u64,
    /// 拷贝完成后可读出的字节数
    pub byte_len: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    Unsignaled,
    Signaled,
    /// 查询失败，拷贝不会再完成
    Lost,
}

pub trait CopyEngine: Send {
    /// 发起纹理某一级 mip 的拷贝；尺寸和像素格式在这里（渲染线程上）确定
    fn begin_texture_copy(&mut self, texture: NativeResourceId, mip_level: u32) -> Result<CopyTicket, CopyFailure>;

    /// 发起 buffer 前 `byte_size` 字节的拷贝
    fn begin_buffer_copy(&mut self, buffer: NativeResourceId, byte_size: usize) -> Result<CopyTicket, CopyFailure>;

    /// 非阻塞查询
    fn poll_fence(&mut self, ticket: &CopyTicket) -> FenceStatus;

    /// 阻塞直到 fence signaled 或丢失
    fn wait_fence(&mut self, ticket: &CopyTicket) -> FenceStatus;

    /// 把 staging 内容拷到 `dst`，返回拷贝的字节数（`min(dst.len(), ticket.byte_len)`）
    fn read_back(&mut self, ticket: &CopyTicket, dst: &mut [u8]) -> usize;

    /// 释放 staging 内存和 fence
    fn release(&mut self, ticket: CopyTicket);
}
