use bytemuck::Pod;
use std::collections::VecDeque;

use crate::config::ReadbackConfig;
use crate::error::ReadbackError;
use crate::handle::TaskHandle;
use crate::request::ReadbackRequest;
use crate::storage::ReadbackView;

/// 有上限的请求队列
///
/// 请求按提交顺序排队，每帧从队头取出已经结束的请求。超过容量的请求直接被拒绝，
/// 不会合并，也不会悄悄丢弃。
pub struct RequestQueue {
    requests: VecDeque<ReadbackRequest>,
    capacity: usize,
}
// new & init
impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            requests: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn from_config(config: &ReadbackConfig) -> Self {
        Self::new(config.queue_capacity)
    }
}
// getters
impl RequestQueue {
    #[inline]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.requests.len() >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadbackRequest> {
        self.requests.iter()
    }
}
// tools
impl RequestQueue {
    /// 入队一个已经发起的请求
    pub fn push(&mut self, request: ReadbackRequest) -> Result<(), ReadbackError> {
        if self.is_full() {
            log::warn!("Too many requests. {} dropped", request.handle());
            return Err(ReadbackError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.requests.push_back(request);
        Ok(())
    }

    /// 先检查容量再发起请求，队列满时不会产生任何 GPU 工作
    pub fn try_request(
        &mut self,
        issue: impl FnOnce() -> Result<ReadbackRequest, ReadbackError>,
    ) -> Result<TaskHandle, ReadbackError> {
        if self.is_full() {
            log::warn!("Too many requests.");
            return Err(ReadbackError::QueueFull {
                capacity: self.capacity,
            });
        }
        let request = issue()?;
        let handle = request.handle();
        self.requests.push_back(request);
        Ok(handle)
    }

    /// 按顺序取出队头所有已经结束的请求
    ///
    /// 先查 `has_error` 再查 `done`：出错的请求同样是 done。遇到第一个未结束的请求就停下。
    /// 返回本次取出的请求数。
    pub fn drain_ready<T: Pod>(
        &mut self,
        mut on_ready: impl FnMut(&ReadbackRequest, Result<ReadbackView<T>, ReadbackError>),
    ) -> usize {
        let mut drained = 0;
        while let Some(front) = self.requests.front() {
            let result = if front.has_error() {
                log::error!("GPU readback error detected. ({})", front.handle());
                Err(if front.valid() { ReadbackError::ReadbackFailed } else { ReadbackError::NoLongerExists })
            } else if front.done() {
                front.get_data::<T>()
            } else {
                break;
            };

            if let Some(request) = self.requests.pop_front() {
                on_ready(&request, result);
            }
            drained += 1;
        }
        drained
    }
}
