use anyhow::Context;
use std::sync::Arc;

use crate::builtin::{BuiltinBackend, PlatformReadback};
use crate::config::ReadbackConfig;
use crate::dispatcher::AsyncReadback;
use crate::engine::CopyEngine;
use crate::error::ReadbackError;
use crate::handle::HandleAllocator;
use crate::registry::TaskRegistry;
use crate::render_thread::{RenderEventSink, RenderQueue, RenderThread};
use crate::safety::SafetyHandleManager;
use crate::updater::{ReadbackUpdater, UpdateStats};

/// 把任务表、两个后端、渲染线程和每帧驱动组装到一起
///
/// 一帧的典型用法：
/// ```ignore
/// let request = system.readback().request(&texture)?;
/// system.update(); // 每帧一次
/// if request.done() && !request.has_error() { ... }
/// ```
pub struct ReadbackSystem {
    config: ReadbackConfig,
    safety: Arc<SafetyHandleManager>,
    registry: Arc<TaskRegistry>,
    builtin: Option<Arc<BuiltinBackend>>,
    readback: Arc<AsyncReadback>,
    updater: ReadbackUpdater,
    render_thread: Option<RenderThread>,
}
// new & init
impl ReadbackSystem {
    /// # Arguments
    /// * `engine` - 交给渲染线程独占的拷贝原语
    /// * `platform` - 平台自带的异步回读；没有时传 `None`
    pub fn init(
        config: ReadbackConfig,
        engine: Box<dyn CopyEngine>,
        platform: Option<Arc<dyn PlatformReadback>>,
    ) -> anyhow::Result<Self> {
        let handles = Arc::new(HandleAllocator::new());
        let safety = Arc::new(SafetyHandleManager::new());

        let (queue, receiver) = RenderQueue::new();
        let events: Arc<dyn RenderEventSink> = Arc::new(queue.clone());

        let registry = Arc::new(TaskRegistry::new(handles.clone(), safety.clone(), events.clone()));
        let builtin = platform.map(|platform| {
            Arc::new(BuiltinBackend::new(platform, handles.clone(), safety.clone(), events.clone()))
        });
        let readback = Arc::new(AsyncReadback::new(
            registry.clone(),
            builtin.clone(),
            safety.clone(),
            config.force_custom_backend,
        ));

        let render_thread =
            RenderThread::spawn(queue, receiver, engine, registry.clone()).context("Failed to spawn render thread")?;

        let updater = ReadbackUpdater::new(
            registry.clone(),
            builtin.clone(),
            readback.clone(),
            events,
            config.purge_dead_resources,
        );

        log::info!("readback system initialized: {:?}", config);
        Ok(Self {
            config,
            safety,
            registry,
            builtin,
            readback,
            updater,
            render_thread: Some(render_thread),
        })
    }
}
// getters
impl ReadbackSystem {
    #[inline]
    pub fn readback(&self) -> &Arc<AsyncReadback> {
        &self.readback
    }

    #[inline]
    pub fn config(&self) -> &ReadbackConfig {
        &self.config
    }

    #[inline]
    pub fn safety(&self) -> &Arc<SafetyHandleManager> {
        &self.safety
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.updater.frame_id()
    }

    /// 两个后端中仍在表里的请求数（包括已结束但尚未回收的）
    pub fn in_flight(&self) -> usize {
        self.registry.len() + self.builtin.as_ref().map_or(0, |builtin| builtin.len())
    }

    pub fn render_queue(&self) -> Option<&RenderQueue> {
        self.render_thread.as_ref().map(RenderThread::queue)
    }
}
// Frame API
impl ReadbackSystem {
    /// 每帧在控制线程调用一次
    pub fn update(&mut self) -> UpdateStats {
        self.updater.update()
    }

    /// 提交一条普通渲染命令，和回读按提交顺序执行
    pub fn submit_render<F>(&self, job: F) -> Result<(), ReadbackError>
    where
        F: FnOnce(&mut dyn CopyEngine) + Send + 'static,
    {
        self.render_queue().ok_or(ReadbackError::RenderThreadGone)?.submit(job)
    }

    /// 等待渲染线程执行完之前提交的所有命令
    pub fn sync_render_thread(&self) -> Result<(), ReadbackError> {
        self.render_queue().ok_or(ReadbackError::RenderThreadGone)?.sync()
    }
}
// destroy
impl ReadbackSystem {
    pub fn shutdown(mut self) {
        self.destroy();
    }

    fn destroy(&mut self) {
        let Some(render_thread) = self.render_thread.take() else {
            return;
        };

        if self.config.drain_on_shutdown {
            let pending = self.registry.pending_handles();
            for handle in &pending {
                self.registry.wait_for_completion(*handle);
            }
            let builtin_pending = self.builtin.as_ref().map(|builtin| {
                let pending = builtin.pending_handles();
                for handle in &pending {
                    builtin.wait_for_completion(*handle);
                }
                pending.len()
            });
            log::info!(
                "drained {} readbacks before shutdown",
                pending.len() + builtin_pending.unwrap_or(0)
            );
        }

        let disposed =
            self.registry.dispose_all() + self.builtin.as_ref().map_or(0, |builtin| builtin.dispose_all());
        render_thread.join();
        log::info!("readback system destroyed, {} requests disposed", disposed);
    }
}
impl Drop for ReadbackSystem {
    fn drop(&mut self) {
        self.destroy();
    }
}
