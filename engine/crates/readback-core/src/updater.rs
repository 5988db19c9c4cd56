use std::sync::Arc;

use crate::builtin::BuiltinBackend;
use crate::dispatcher::AsyncReadback;
use crate::registry::TaskRegistry;
use crate::render_thread::RenderEventSink;

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}]", self.frame_id)
    }
}

/// 一次 update 的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStats {
    pub frame_id: u64,
    /// 本帧回收的任务数（两个后端之和）
    pub reclaimed: usize,
    pub purged_resources: usize,
}

/// 每帧驱动
///
/// 控制线程部分和渲染线程部分是两个独立的回调，`update` 依次调用两者：
/// 1. 控制线程：回收上一帧结束的任务，清理失效的资源缓存
/// 2. 渲染线程：排一个 Update 事件，让渲染线程轮询 fence
pub struct ReadbackUpdater {
    registry: Arc<TaskRegistry>,
    builtin: Option<Arc<BuiltinBackend>>,
    readback: Arc<AsyncReadback>,
    events: Arc<dyn RenderEventSink>,
    frame_counter: FrameCounter,
    purge_dead_resources: bool,
}
// new & init
impl ReadbackUpdater {
    pub fn new(
        registry: Arc<TaskRegistry>,
        builtin: Option<Arc<BuiltinBackend>>,
        readback: Arc<AsyncReadback>,
        events: Arc<dyn RenderEventSink>,
        purge_dead_resources: bool,
    ) -> Self {
        Self {
            registry,
            builtin,
            readback,
            events,
            frame_counter: FrameCounter::new(0),
            purge_dead_resources,
        }
    }
}
// update
impl ReadbackUpdater {
    pub fn update(&mut self) -> UpdateStats {
        let (reclaimed, purged_resources) = self.update_control_thread();
        self.schedule_render_thread_update();

        let stats = UpdateStats {
            frame_id: self.frame_counter.frame_id(),
            reclaimed,
            purged_resources,
        };
        self.frame_counter.next_frame();
        stats
    }

    /// 控制线程回调：回收 + 缓存清理；返回 (回收任务数, 清理资源数)
    pub fn update_control_thread(&self) -> (usize, usize) {
        let mut reclaimed = self.registry.update_control_thread();
        if let Some(builtin) = &self.builtin {
            reclaimed += builtin.update_control_thread();
        }

        let purged = if self.purge_dead_resources { self.readback.purge_dead_resources() } else { 0 };

        if reclaimed > 0 || purged > 0 {
            log::trace!(
                "{} reclaimed {} readbacks, purged {} resources",
                self.frame_counter.frame_name(),
                reclaimed,
                purged
            );
        }
        (reclaimed, purged)
    }

    /// 渲染线程回调：排一个 Update 事件
    pub fn schedule_render_thread_update(&self) {
        if let Err(err) = self.events.issue(self.registry.render_thread_update_event()) {
            log::error!("{} failed to schedule render thread update: {}", self.frame_counter.frame_name(), err);
        }
    }
}
// getters
impl ReadbackUpdater {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_counter.frame_id()
    }
}
