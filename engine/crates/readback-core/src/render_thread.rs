use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::engine::CopyEngine;
use crate::error::ReadbackError;
use crate::handle::TaskHandle;
use crate::registry::TaskRegistry;

/// 交给渲染线程执行的回读事件（对应 `GL.IssuePluginEvent` 的 event id）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    /// 发起某个任务的 GPU 拷贝
    Kickstart(TaskHandle),
    /// 轮询所有进行中任务的 fence
    Update,
    /// 阻塞地完成某个任务（`wait_for_completion` 使用）
    Complete(TaskHandle),
}

/// 在渲染线程上执行的任意渲染命令
pub type RenderJob = Box<dyn FnOnce(&mut dyn CopyEngine) + Send>;

/// "提交事件到渲染线程" 的原语
///
/// 事件和命令都和控制线程之前提交的其他渲染命令保持先后顺序。
pub trait RenderEventSink: Send + Sync {
    fn issue(&self, event: RenderEvent) -> Result<(), ReadbackError>;

    /// 提交一条普通渲染命令；失败时命令被直接 drop
    fn execute(&self, job: RenderJob) -> Result<(), ReadbackError>;
}

/// 渲染线程控制消息
pub enum RenderCommand {
    Event(RenderEvent),
    Execute(RenderJob),
    /// 执行到这里时通知发送方，用于等待之前的命令全部完成
    Sync(Sender<()>),
    /// 退出渲染线程
    Shutdown,
}

/// 渲染命令队列的发送端，可以随意克隆
#[derive(Clone)]
pub struct RenderQueue {
    sender: Sender<RenderCommand>,
}
impl RenderQueue {
    pub fn new() -> (Self, Receiver<RenderCommand>) {
        let (sender, receiver) = crossbeam_channel::unbounded::<RenderCommand>();
        (Self { sender }, receiver)
    }

    /// 提交一条渲染命令，和回读事件按提交顺序执行
    pub fn submit<F>(&self, job: F) -> Result<(), ReadbackError>
    where
        F: FnOnce(&mut dyn CopyEngine) + Send + 'static,
    {
        self.execute(Box::new(job))
    }

    /// 阻塞直到之前提交的所有命令都执行完
    pub fn sync(&self) -> Result<(), ReadbackError> {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        self.send(RenderCommand::Sync(done_tx))?;
        done_rx.recv().map_err(|_| ReadbackError::RenderThreadGone)
    }

    fn send(&self, command: RenderCommand) -> Result<(), ReadbackError> {
        self.sender.send(command).map_err(|_| ReadbackError::RenderThreadGone)
    }
}
impl RenderEventSink for RenderQueue {
    fn issue(&self, event: RenderEvent) -> Result<(), ReadbackError> {
        self.send(RenderCommand::Event(event))
    }

    fn execute(&self, job: RenderJob) -> Result<(), ReadbackError> {
        self.send(RenderCommand::Execute(job))
    }
}

/// 渲染线程句柄
///
/// 渲染线程独占 [`CopyEngine`]，所有 GPU 拷贝和 fence 查询都在这里发生。
pub struct RenderThread {
    queue: RenderQueue,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}
// new & init
impl RenderThread {
    /// 创建并启动渲染线程
    ///
    /// # Arguments
    /// * `queue` / `receiver` - 由 [`RenderQueue::new`] 创建的一对，`queue` 的克隆同时交给了任务表
    /// * `engine` - 渲染线程独占的拷贝原语
    /// * `registry` - 自定义后端的任务表
    pub fn spawn(
        queue: RenderQueue,
        receiver: Receiver<RenderCommand>,
        engine: Box<dyn CopyEngine>,
        registry: Arc<TaskRegistry>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = thread::Builder::new()
            .name("RenderThread".to_string())
            .spawn(move || {
                Self::render_thread_main(receiver, engine, registry, running_clone);
            })?;

        Ok(Self {
            queue,
            thread_handle: Some(thread_handle),
            running,
        })
    }
}
// tools
impl RenderThread {
    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    pub fn sync(&self) -> Result<(), ReadbackError> {
        self.queue.sync()
    }

    /// 检查渲染线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 请求渲染线程关闭；已经提交的命令会先执行完
    pub fn shutdown(&self) {
        if self.queue.send(RenderCommand::Shutdown).is_err() {
            log::debug!("render thread already stopped");
        }
    }

    /// 等待渲染线程结束并清理资源
    pub fn join(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            self.shutdown();
            if handle.join().is_err() {
                log::error!("Failed to join render thread");
            }
        }
    }
}
// render thread
impl RenderThread {
    /// 渲染线程主函数
    fn render_thread_main(
        receiver: Receiver<RenderCommand>,
        mut engine: Box<dyn CopyEngine>,
        registry: Arc<TaskRegistry>,
        running: Arc<AtomicBool>,
    ) {
        log::info!("Render thread started");

        while let Ok(command) = receiver.recv() {
            match command {
                RenderCommand::Event(event) => registry.execute_render_event(event, engine.as_mut()),
                RenderCommand::Execute(job) => job(engine.as_mut()),
                RenderCommand::Sync(done_tx) => {
                    let _ = done_tx.send(());
                }
                RenderCommand::Shutdown => {
                    log::info!("Render thread: received shutdown signal");
                    break;
                }
            }
        }

        // 之后不会再有人轮询 fence，剩下的任务只能判为失败，否则 wait_for_completion 会永远等下去
        let abandoned = registry.abandon_pending(engine.as_mut());
        if abandoned > 0 {
            log::warn!("Render thread: {} readback tasks abandoned", abandoned);
        }

        running.store(false, Ordering::SeqCst);
        log::info!("Render thread exited");
    }
}
impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
