use indexmap::IndexMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::engine::{CopyEngine, CopyTicket, FenceStatus};
use crate::error::{CopyFailure, ReadbackError};
use crate::handle::{AllocatorKind, HandleAllocator, NativeResourceId, ReadbackTarget, TaskHandle, TaskState};
use crate::render_thread::{RenderEvent, RenderEventSink};
use crate::safety::{SafetyHandle, SafetyHandleManager};
use crate::storage::{ExternalDestination, SharedBytes};

enum Destination {
    /// 完成时由任务自己分配
    Internal,
    External(ExternalDestination),
}

struct TaskEntry {
    target: ReadbackTarget,
    destination: Destination,
    allocator: AllocatorKind,
    state: TaskState,
    /// Kickstart 事件已经在渲染线程上执行过
    started: bool,
    ticket: Option<CopyTicket>,
    result: Option<SharedBytes>,
    result_len: usize,
    /// 内部目标：任务自己的标记；外部目标：调用者 buffer 的标记
    marker: SafetyHandle,
}

#[derive(Default)]
struct TaskTable {
    /// 按句柄递增排列
    tasks: IndexMap<TaskHandle, TaskEntry>,
    /// 上一次 update 时已经结束的任务，本次 update 回收
    pending_release: Vec<TaskHandle>,
}

/// `get_data` 成功时交给消费者的结果
#[derive(Debug, Clone)]
pub struct TaskData {
    pub bytes: SharedBytes,
    pub byte_len: usize,
    pub marker: SafetyHandle,
    pub allocator: AllocatorKind,
}

/// 自定义后端的任务表
///
/// 控制线程创建、查询、回收任务；渲染线程推进任务。两边共享同一张表，靠 `table` 这把锁保证
/// 看到的状态一致。锁顺序：任务表 -> buffer 内存 -> 安全标记。
///
/// 回收规则：某次 `update_control_thread` 时已经结束的任务，在下一次 `update_control_thread` 时被回收。
/// 所以轮询发现完成的任务在 1 次 update 后消失，阻塞等待完成的任务在 2 次 update 后消失。
pub struct TaskRegistry {
    table: Mutex<TaskTable>,
    completed: Condvar,
    handles: Arc<HandleAllocator>,
    safety: Arc<SafetyHandleManager>,
    events: Arc<dyn RenderEventSink>,
}
// new & init
impl TaskRegistry {
    pub fn new(
        handles: Arc<HandleAllocator>,
        safety: Arc<SafetyHandleManager>,
        events: Arc<dyn RenderEventSink>,
    ) -> Self {
        Self {
            table: Mutex::new(TaskTable::default()),
            completed: Condvar::new(),
            handles,
            safety,
            events,
        }
    }
}
// 控制线程：创建任务
impl TaskRegistry {
    pub fn create_texture_task(
        &self,
        texture: NativeResourceId,
        mip_level: u32,
        destination: Option<ExternalDestination>,
    ) -> Result<TaskHandle, ReadbackError> {
        self.insert_task(
            ReadbackTarget::Texture {
                resource: texture,
                mip_level,
            },
            destination,
        )
    }

    pub fn create_buffer_task(
        &self,
        buffer: NativeResourceId,
        byte_size: usize,
        destination: Option<ExternalDestination>,
    ) -> Result<TaskHandle, ReadbackError> {
        self.insert_task(
            ReadbackTarget::Buffer {
                resource: buffer,
                byte_size,
            },
            destination,
        )
    }

    /// 插入一个 Pending 任务，并在返回前把 Kickstart 事件排进渲染队列
    fn insert_task(
        &self,
        target: ReadbackTarget,
        destination: Option<ExternalDestination>,
    ) -> Result<TaskHandle, ReadbackError> {
        let (destination, allocator, marker) = match destination {
            Some(external) => {
                self.safety.acquire_for_readback(external.marker)?;
                let marker = external.marker;
                (Destination::External(external), AllocatorKind::CallerProvided, marker)
            }
            None => (
                Destination::Internal,
                AllocatorKind::Temporary,
                self.safety.create_locked("ReadbackTask"),
            ),
        };

        let handle = self.handles.allocate();
        self.lock_table().tasks.insert(
            handle,
            TaskEntry {
                target,
                destination,
                allocator,
                state: TaskState::Pending,
                started: false,
                ticket: None,
                result: None,
                result_len: 0,
                marker,
            },
        );
        log::debug!("{} created for {:?}", handle, target);

        if let Err(err) = self.events.issue(RenderEvent::Kickstart(handle)) {
            // 任务永远不会开始，直接判为失败，交给正常的回收流程
            log::error!("{}: failed to schedule kickstart: {}", handle, err);
            let mut table = self.lock_table();
            if let Some(entry) = table.tasks.get_mut(&handle) {
                self.fail_entry(entry, None);
                entry.allocator = AllocatorKind::None;
            }
            self.completed.notify_all();
        }

        Ok(handle)
    }
}
// 控制线程：查询
impl TaskRegistry {
    pub fn exists(&self, handle: TaskHandle) -> bool {
        self.lock_table().tasks.contains_key(&handle)
    }

    /// 已回收的句柄也视为 done
    pub fn is_done(&self, handle: TaskHandle) -> bool {
        self.lock_table().tasks.get(&handle).is_none_or(|entry| entry.state.is_finished())
    }

    /// 已回收的句柄也视为出错，用 [`TaskRegistry::status`] 区分两者
    pub fn has_error(&self, handle: TaskHandle) -> bool {
        self.lock_table().tasks.get(&handle).is_none_or(|entry| entry.state.reports_error())
    }

    pub fn status(&self, handle: TaskHandle) -> TaskState {
        self.lock_table()
            .tasks
            .get(&handle)
            .map_or(TaskState::Disposed, |entry| entry.state)
    }

    pub fn allocator_kind(&self, handle: TaskHandle) -> Option<AllocatorKind> {
        self.lock_table().tasks.get(&handle).map(|entry| entry.allocator)
    }

    /// 依次检查：任务存在 -> 已完成 -> 没有出错 -> 外部目标仍然存活
    pub fn get_data(&self, handle: TaskHandle) -> Result<TaskData, ReadbackError> {
        let table = self.lock_table();
        let entry = table.tasks.get(&handle).ok_or(ReadbackError::NoLongerExists)?;
        match entry.state {
            TaskState::Pending => return Err(ReadbackError::NotYetDone),
            TaskState::Error => return Err(ReadbackError::ReadbackFailed),
            TaskState::Disposed => return Err(ReadbackError::NoLongerExists),
            TaskState::Done => {}
        }
        if let Destination::External(external) = &entry.destination {
            self.safety.check_exists(external.marker)?;
        }
        let bytes = entry.result.clone().ok_or(ReadbackError::ReadbackFailed)?;

        Ok(TaskData {
            bytes,
            byte_len: entry.result_len,
            marker: entry.marker,
            allocator: entry.allocator,
        })
    }

    /// 阻塞直到任务结束
    ///
    /// 句柄不存在或任务已经结束时立即返回。不影响回收时机之外的任何状态。
    pub fn wait_for_completion(&self, handle: TaskHandle) {
        let mut table = self.lock_table();
        if table.tasks.get(&handle).is_none_or(|entry| entry.state.is_finished()) {
            return;
        }
        if let Err(err) = self.events.issue(RenderEvent::Complete(handle)) {
            log::error!("{}: failed to schedule completion: {}", handle, err);
            return;
        }
        while table.tasks.get(&handle).is_some_and(|entry| !entry.state.is_finished()) {
            table = self.completed.wait(table).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn len(&self) -> usize {
        self.lock_table().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_table().tasks.is_empty()
    }

    pub fn pending_handles(&self) -> Vec<TaskHandle> {
        self.lock_table()
            .tasks
            .iter()
            .filter(|(_, entry)| entry.state == TaskState::Pending)
            .map(|(handle, _)| *handle)
            .collect()
    }
}
// 控制线程：每帧更新与回收
impl TaskRegistry {
    /// 回收上一次 update 时已经结束的任务，再登记这一次已经结束的任务
    ///
    /// 返回本次回收的任务数
    pub fn update_control_thread(&self) -> usize {
        let mut table = self.lock_table();

        let released = std::mem::take(&mut table.pending_release);
        let mut reclaimed = 0;
        for handle in released {
            if let Some(entry) = table.tasks.shift_remove(&handle) {
                self.dispose_entry(handle, entry);
                reclaimed += 1;
            }
        }

        let TaskTable { tasks, pending_release } = &mut *table;
        pending_release.extend(
            tasks
                .iter()
                .filter(|(_, entry)| entry.state.is_finished())
                .map(|(handle, _)| *handle),
        );

        if reclaimed > 0 {
            log::debug!("reclaimed {} readback tasks, {} in flight", reclaimed, tasks.len());
        }
        reclaimed
    }

    /// 每帧交给渲染线程的事件
    #[inline]
    pub fn render_thread_update_event(&self) -> RenderEvent {
        RenderEvent::Update
    }

    /// 立即回收所有任务（关闭时使用）
    pub fn dispose_all(&self) -> usize {
        let mut table = self.lock_table();
        table.pending_release.clear();
        let tasks = std::mem::take(&mut table.tasks);
        let count = tasks.len();
        for (handle, entry) in tasks {
            if entry.state == TaskState::Pending {
                log::warn!("{} disposed while still pending", handle);
            }
            self.dispose_entry(handle, entry);
        }
        self.completed.notify_all();
        count
    }

    fn dispose_entry(&self, handle: TaskHandle, entry: TaskEntry) {
        // 外部目标的标记属于调用者的 buffer；还在进行中时解锁，让 buffer 重新可用
        match entry.destination {
            Destination::Internal => {
                self.safety.release(entry.marker);
            }
            Destination::External(_) => {
                if entry.state == TaskState::Pending {
                    self.safety.finish_readback(entry.marker);
                }
            }
        }
        log::trace!("{} disposed ({:?})", handle, entry.state);
    }
}
// 渲染线程
impl TaskRegistry {
    pub fn execute_render_event(&self, event: RenderEvent, engine: &mut dyn CopyEngine) {
        match event {
            RenderEvent::Kickstart(handle) => self.kickstart(handle, engine),
            RenderEvent::Update => self.update_render_thread(engine),
            RenderEvent::Complete(handle) => self.complete_blocking(handle, engine),
        }
    }

    fn kickstart(&self, handle: TaskHandle, engine: &mut dyn CopyEngine) {
        let mut table = self.lock_table();
        let Some(entry) = table.tasks.get_mut(&handle) else {
            log::debug!("{} disposed before kickstart", handle);
            return;
        };
        if entry.started || entry.state != TaskState::Pending {
            return;
        }
        entry.started = true;

        let result = match entry.target {
            ReadbackTarget::Texture { resource, mip_level } => engine.begin_texture_copy(resource, mip_level),
            ReadbackTarget::Buffer { resource, byte_size } => engine.begin_buffer_copy(resource, byte_size),
        };
        match result {
            Ok(ticket) => entry.ticket = Some(ticket),
            Err(failure) => {
                log::error!("{} failed to start: {}", handle, failure);
                self.fail_entry(entry, Some(&mut *engine));
                self.completed.notify_all();
            }
        }
    }

    /// 轮询所有进行中任务的 fence
    fn update_render_thread(&self, engine: &mut dyn CopyEngine) {
        let mut table = self.lock_table();
        let mut changed = false;
        for (handle, entry) in table.tasks.iter_mut() {
            if entry.state != TaskState::Pending {
                continue;
            }
            let Some(ticket) = entry.ticket.as_ref() else {
                continue;
            };
            match engine.poll_fence(ticket) {
                FenceStatus::Unsignaled => {}
                FenceStatus::Signaled => changed |= self.finish_entry(*handle, entry, engine),
                FenceStatus::Lost => {
                    log::error!("{}: {}", handle, CopyFailure::FenceLost);
                    self.fail_entry(entry, Some(&mut *engine));
                    changed = true;
                }
            }
        }
        if changed {
            self.completed.notify_all();
        }
    }

    fn complete_blocking(&self, handle: TaskHandle, engine: &mut dyn CopyEngine) {
        loop {
            let mut table = self.lock_table();
            let Some(entry) = table.tasks.get_mut(&handle) else {
                return;
            };
            if entry.state != TaskState::Pending {
                return;
            }
            let Some(ticket) = entry.ticket.as_ref() else {
                // Kickstart 总是排在 Complete 前面，走到这里说明拷贝没能发起
                self.fail_entry(entry, Some(&mut *engine));
                self.completed.notify_all();
                return;
            };
            match engine.wait_fence(ticket) {
                FenceStatus::Signaled => {
                    if self.finish_entry(handle, entry, engine) {
                        self.completed.notify_all();
                        return;
                    }
                }
                FenceStatus::Unsignaled | FenceStatus::Lost => {
                    log::error!("{}: {}", handle, CopyFailure::FenceLost);
                    self.fail_entry(entry, Some(&mut *engine));
                    self.completed.notify_all();
                    return;
                }
            }
            // 目标 buffer 正被读，放开任务表等读者结束
            drop(table);
            std::thread::yield_now();
        }
    }

    /// 渲染线程退出时调用，所有还在进行中的任务判为失败
    pub fn abandon_pending(&self, engine: &mut dyn CopyEngine) -> usize {
        let mut table = self.lock_table();
        let mut abandoned = 0;
        for (_, entry) in table.tasks.iter_mut() {
            if entry.state == TaskState::Pending {
                self.fail_entry(entry, Some(&mut *engine));
                abandoned += 1;
            }
        }
        self.completed.notify_all();
        abandoned
    }

    /// 把 staging 内容交给任务并标记为 Done
    ///
    /// 外部目标正被读者持有时返回 false，任务保持 Pending，下次再试
    fn finish_entry(&self, handle: TaskHandle, entry: &mut TaskEntry, engine: &mut dyn CopyEngine) -> bool {
        let Some(ticket) = entry.ticket.as_ref() else {
            return false;
        };
        match &entry.destination {
            Destination::Internal => {
                let bytes = SharedBytes::zeroed(ticket.byte_len);
                let copied = bytes.with_bytes_mut(|dst| engine.read_back(ticket, dst));
                entry.result_len = copied;
                entry.result = Some(bytes);
            }
            Destination::External(external) => {
                if self.safety.exists(external.marker) {
                    let Some(mut guard) = external.bytes.try_write() else {
                        return false;
                    };
                    let copied = engine.read_back(ticket, guard.as_bytes_mut());
                    if copied < ticket.byte_len {
                        log::warn!(
                            "{}: destination holds {} bytes, {} bytes truncated",
                            handle,
                            copied,
                            ticket.byte_len - copied
                        );
                    }
                } else {
                    log::warn!("{}: destination buffer was disposed before the copy finished", handle);
                }
                entry.result_len = external.bytes.len();
                entry.result = Some(external.bytes.clone());
            }
        }

        if let Some(ticket) = entry.ticket.take() {
            engine.release(ticket);
        }
        self.safety.finish_readback(entry.marker);
        entry.state = TaskState::Done;
        log::trace!("{} done", handle);
        true
    }

    fn fail_entry(&self, entry: &mut TaskEntry, engine: Option<&mut dyn CopyEngine>) {
        if let Some(ticket) = entry.ticket.take() {
            match engine {
                Some(engine) => engine.release(ticket),
                None => log::warn!("copy ticket {} leaked", ticket.id),
            }
        }
        self.safety.finish_readback(entry.marker);
        entry.result = None;
        entry.state = TaskState::Error;
    }
}
// tools
impl TaskRegistry {
    fn lock_table(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
