//! 平台自带异步回读的包装
//!
//! 平台 API 本身已经是异步的，这里只负责和自定义后端保持一致的句柄、回收时机和安全标记语义。
//! 请求在渲染线程上交给平台，所以和自定义后端一样，能看到之前提交的渲染命令的结果。

use indexmap::IndexMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::engine::CopyEngine;
use crate::error::ReadbackError;
use crate::handle::{AllocatorKind, HandleAllocator, NativeResourceId, ReadbackTarget, TaskHandle, TaskState};
use crate::registry::TaskData;
use crate::render_thread::RenderEventSink;
use crate::safety::{SafetyHandle, SafetyHandleManager};
use crate::storage::{ExternalDestination, SharedBytes};

/// 平台侧请求的标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlatformRequestId(pub u64);

/// 平台提供的异步回读能力
///
/// `request_*` 在渲染线程上调用，其余方法在控制线程上调用。
pub trait PlatformReadback: Send + Sync {
    /// 平台是否支持异步回读；只在启动时查询一次
    fn supports_async_readback(&self) -> bool;

    /// `destination` 为 `Some` 时结果直接写进调用者的内存
    fn request_texture(
        &self,
        texture: NativeResourceId,
        mip_level: u32,
        destination: Option<SharedBytes>,
    ) -> PlatformRequestId;

    fn request_buffer(
        &self,
        buffer: NativeResourceId,
        byte_size: usize,
        destination: Option<SharedBytes>,
    ) -> PlatformRequestId;

    /// 未知或已释放的请求视为 done
    fn is_done(&self, request: PlatformRequestId) -> bool;

    /// 未知或已释放的请求视为出错
    fn has_error(&self, request: PlatformRequestId) -> bool;

    /// 完成且没有出错时的结果内存；外部目标时就是传入的那块
    fn result(&self, request: PlatformRequestId) -> Option<SharedBytes>;

    fn wait_for_completion(&self, request: PlatformRequestId);

    /// 平台自身的每帧推进
    fn update(&self);

    fn dispose(&self, request: PlatformRequestId);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IssueState {
    /// 排在渲染队列里，还没交给平台
    Queued,
    Issued(PlatformRequestId),
    /// 没能交给平台（渲染线程已经退出）
    Failed,
}

struct BuiltinEntry {
    issue: IssueState,
    allocator: AllocatorKind,
    /// 外部目标：调用者 buffer 的标记；内部目标：结果内存自己的标记
    marker: SafetyHandle,
    external: bool,
    /// 请求结束后标记已经解锁
    hold_released: bool,
}

#[derive(Default)]
struct BuiltinTable {
    requests: IndexMap<TaskHandle, BuiltinEntry>,
    pending_release: Vec<TaskHandle>,
}

/// 控制线程和渲染线程共享的部分
#[derive(Default)]
struct BuiltinShared {
    table: Mutex<BuiltinTable>,
    /// 请求离开 Queued 状态时通知
    issued: Condvar,
}
impl BuiltinShared {
    fn lock_table(&self) -> MutexGuard<'_, BuiltinTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 排在渲染队列里、等待交给平台的请求
///
/// 命令没有被执行就被 drop 时（渲染线程已经退出），请求判为失败。
struct PendingIssue {
    handle: TaskHandle,
    target: ReadbackTarget,
    destination: Option<SharedBytes>,
    platform: Arc<dyn PlatformReadback>,
    shared: Arc<BuiltinShared>,
    issued: bool,
}
impl PendingIssue {
    /// 在渲染线程上执行，看到的是之前所有渲染命令执行完之后的资源内容
    fn issue(mut self) {
        self.issued = true;
        let destination = self.destination.take();
        let request = match self.target {
            ReadbackTarget::Texture { resource, mip_level } => {
                self.platform.request_texture(resource, mip_level, destination)
            }
            ReadbackTarget::Buffer { resource, byte_size } => {
                self.platform.request_buffer(resource, byte_size, destination)
            }
        };

        let mut table = self.shared.lock_table();
        let Some(entry) = table.requests.get_mut(&self.handle) else {
            drop(table);
            log::debug!("{} disposed before reaching the platform", self.handle);
            self.platform.dispose(request);
            return;
        };
        entry.issue = IssueState::Issued(request);
        drop(table);
        self.shared.issued.notify_all();
    }
}
impl Drop for PendingIssue {
    fn drop(&mut self) {
        if self.issued {
            return;
        }
        log::error!("{} never reached the platform", self.handle);
        let mut table = self.shared.lock_table();
        if let Some(entry) = table.requests.get_mut(&self.handle)
            && entry.issue == IssueState::Queued
        {
            entry.issue = IssueState::Failed;
        }
        drop(table);
        self.shared.issued.notify_all();
    }
}

/// 内置后端
///
/// 请求经渲染队列交给平台，和控制线程之前提交的渲染命令保持先后顺序。
pub struct BuiltinBackend {
    platform: Arc<dyn PlatformReadback>,
    supported: bool,
    shared: Arc<BuiltinShared>,
    handles: Arc<HandleAllocator>,
    safety: Arc<SafetyHandleManager>,
    events: Arc<dyn RenderEventSink>,
}
// new & init
impl BuiltinBackend {
    pub fn new(
        platform: Arc<dyn PlatformReadback>,
        handles: Arc<HandleAllocator>,
        safety: Arc<SafetyHandleManager>,
        events: Arc<dyn RenderEventSink>,
    ) -> Self {
        let supported = platform.supports_async_readback();
        Self {
            platform,
            supported,
            shared: Arc::new(BuiltinShared::default()),
            handles,
            safety,
            events,
        }
    }

    /// 启动时查询到的平台能力
    #[inline]
    pub fn platform_supported(&self) -> bool {
        self.supported
    }
}
// create
impl BuiltinBackend {
    pub fn create_texture_request(
        &self,
        texture: NativeResourceId,
        mip_level: u32,
        destination: Option<ExternalDestination>,
    ) -> Result<TaskHandle, ReadbackError> {
        self.insert(
            ReadbackTarget::Texture {
                resource: texture,
                mip_level,
            },
            destination,
        )
    }

    pub fn create_buffer_request(
        &self,
        buffer: NativeResourceId,
        byte_size: usize,
        destination: Option<ExternalDestination>,
    ) -> Result<TaskHandle, ReadbackError> {
        self.insert(
            ReadbackTarget::Buffer {
                resource: buffer,
                byte_size,
            },
            destination,
        )
    }

    /// 登记一个 Queued 请求，并在返回前把 "交给平台" 这条命令排进渲染队列
    fn insert(
        &self,
        target: ReadbackTarget,
        destination: Option<ExternalDestination>,
    ) -> Result<TaskHandle, ReadbackError> {
        let external = destination.is_some();
        let (marker, bytes, allocator) = match destination {
            Some(destination) => {
                self.safety.acquire_for_readback(destination.marker)?;
                (destination.marker, Some(destination.bytes), AllocatorKind::CallerProvided)
            }
            None => (self.safety.create_locked("BuiltinReadback"), None, AllocatorKind::Persistent),
        };

        let handle = self.handles.allocate();
        self.shared.lock_table().requests.insert(
            handle,
            BuiltinEntry {
                issue: IssueState::Queued,
                allocator,
                marker,
                external,
                hold_released: false,
            },
        );
        log::debug!("{} queued for the platform: {:?}", handle, target);

        let pending = PendingIssue {
            handle,
            target,
            destination: bytes,
            platform: self.platform.clone(),
            shared: self.shared.clone(),
            issued: false,
        };
        if let Err(err) = self.events.execute(Box::new(move |_: &mut dyn CopyEngine| pending.issue())) {
            // 命令已经连同 PendingIssue 一起被 drop，请求判为失败
            log::error!("{}: failed to schedule platform request: {}", handle, err);
            if let Some(entry) = self.shared.lock_table().requests.get_mut(&handle) {
                entry.allocator = AllocatorKind::None;
            }
        }
        Ok(handle)
    }
}
// 查询
impl BuiltinBackend {
    pub fn exists(&self, handle: TaskHandle) -> bool {
        self.shared.lock_table().requests.contains_key(&handle)
    }

    /// 已回收的句柄也视为 done
    pub fn is_done(&self, handle: TaskHandle) -> bool {
        self.status(handle).is_finished()
    }

    /// 已回收的句柄也视为出错，用 [`BuiltinBackend::status`] 区分两者
    pub fn has_error(&self, handle: TaskHandle) -> bool {
        self.status(handle).reports_error()
    }

    pub fn status(&self, handle: TaskHandle) -> TaskState {
        self.shared
            .lock_table()
            .requests
            .get(&handle)
            .map_or(TaskState::Disposed, |entry| self.entry_state(entry))
    }

    pub fn allocator_kind(&self, handle: TaskHandle) -> Option<AllocatorKind> {
        self.shared.lock_table().requests.get(&handle).map(|entry| entry.allocator)
    }

    /// 和自定义后端相同的检查顺序：存在 -> 完成 -> 没有出错 -> 目标存活
    pub fn get_data(&self, handle: TaskHandle) -> Result<TaskData, ReadbackError> {
        let mut table = self.shared.lock_table();
        let entry = table.requests.get_mut(&handle).ok_or(ReadbackError::NoLongerExists)?;
        match self.entry_state(entry) {
            TaskState::Pending => return Err(ReadbackError::NotYetDone),
            TaskState::Error => return Err(ReadbackError::ReadbackFailed),
            TaskState::Disposed => return Err(ReadbackError::NoLongerExists),
            TaskState::Done => {}
        }
        let IssueState::Issued(request) = entry.issue else {
            return Err(ReadbackError::ReadbackFailed);
        };
        self.release_hold(entry);
        self.safety.check_exists(entry.marker)?;
        let bytes = self.platform.result(request).ok_or(ReadbackError::ReadbackFailed)?;

        Ok(TaskData {
            byte_len: bytes.len(),
            bytes,
            marker: entry.marker,
            allocator: entry.allocator,
        })
    }

    /// 阻塞直到请求结束，结束后目标 buffer 立即可读
    ///
    /// 请求还排在渲染队列里时先等渲染线程把它交给平台。
    pub fn wait_for_completion(&self, handle: TaskHandle) {
        let request = {
            let mut table = self.shared.lock_table();
            loop {
                match table.requests.get(&handle).map(|entry| entry.issue) {
                    Some(IssueState::Queued) => {
                        table = self.shared.issued.wait(table).unwrap_or_else(PoisonError::into_inner);
                    }
                    Some(IssueState::Issued(request)) => break request,
                    Some(IssueState::Failed) | None => return,
                }
            }
        };
        self.platform.wait_for_completion(request);

        let mut table = self.shared.lock_table();
        if let Some(entry) = table.requests.get_mut(&handle) {
            self.release_hold(entry);
        }
    }

    /// 等待平台写完，然后立即解除调用者 buffer 的锁，不必等到下一次 update
    pub fn release_external_hold(&self, handle: TaskHandle) {
        self.wait_for_completion(handle);
    }

    pub fn len(&self) -> usize {
        self.shared.lock_table().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock_table().requests.is_empty()
    }

    pub fn pending_handles(&self) -> Vec<TaskHandle> {
        self.shared
            .lock_table()
            .requests
            .iter()
            .filter(|(_, entry)| !self.entry_state(entry).is_finished())
            .map(|(handle, _)| *handle)
            .collect()
    }
}
// update & dispose
impl BuiltinBackend {
    /// 推进平台，回收上一次 update 时已经结束的请求，再登记这一次结束的请求
    pub fn update_control_thread(&self) -> usize {
        self.platform.update();

        let mut table = self.shared.lock_table();
        let released = std::mem::take(&mut table.pending_release);
        let mut reclaimed = 0;
        for handle in released {
            if let Some(entry) = table.requests.shift_remove(&handle) {
                self.dispose_entry(handle, entry);
                reclaimed += 1;
            }
        }

        let BuiltinTable {
            requests,
            pending_release,
        } = &mut *table;
        for (handle, entry) in requests.iter_mut() {
            if !self.entry_state(entry).is_finished() {
                continue;
            }
            self.release_hold(entry);
            pending_release.push(*handle);
        }

        if reclaimed > 0 {
            log::debug!("reclaimed {} builtin readbacks, {} in flight", reclaimed, requests.len());
        }
        reclaimed
    }

    /// 立即释放所有请求（关闭时使用）
    pub fn dispose_all(&self) -> usize {
        let mut table = self.shared.lock_table();
        table.pending_release.clear();
        let requests = std::mem::take(&mut table.requests);
        let count = requests.len();
        for (handle, entry) in requests {
            self.dispose_entry(handle, entry);
        }
        drop(table);
        self.shared.issued.notify_all();
        count
    }

    fn dispose_entry(&self, handle: TaskHandle, entry: BuiltinEntry) {
        // 还在排队的请求由渲染线程在执行时发现并释放
        if let IssueState::Issued(request) = entry.issue {
            self.platform.dispose(request);
        }
        if entry.external {
            if !entry.hold_released {
                self.safety.finish_readback(entry.marker);
            }
        } else {
            self.safety.release(entry.marker);
        }
        log::trace!("{} disposed", handle);
    }
}
// tools
impl BuiltinBackend {
    fn entry_state(&self, entry: &BuiltinEntry) -> TaskState {
        match entry.issue {
            IssueState::Queued => TaskState::Pending,
            IssueState::Failed => TaskState::Error,
            IssueState::Issued(request) if !self.platform.is_done(request) => TaskState::Pending,
            IssueState::Issued(request) if self.platform.has_error(request) => TaskState::Error,
            IssueState::Issued(_) => TaskState::Done,
        }
    }

    /// 请求结束后调用：平台已经写完，解除标记的写锁
    fn release_hold(&self, entry: &mut BuiltinEntry) {
        if !entry.hold_released {
            self.safety.finish_readback(entry.marker);
            entry.hold_released = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CopyTicket, FenceStatus};
    use crate::error::CopyFailure;
    use crate::render_thread::{RenderEvent, RenderJob};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Job {
        destination: Option<SharedBytes>,
        result: Option<SharedBytes>,
        done: bool,
        error: bool,
    }

    /// 每次 update 完成所有请求；资源 id 为 0 时当场拒绝
    #[derive(Default)]
    struct FakePlatform {
        jobs: Mutex<HashMap<u64, Job>>,
        next: Mutex<u64>,
    }
    impl FakePlatform {
        fn issue(&self, resource: NativeResourceId, destination: Option<SharedBytes>) -> PlatformRequestId {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let rejected = resource.0 == 0;
            self.jobs.lock().unwrap().insert(
                *next,
                Job {
                    destination,
                    done: rejected,
                    error: rejected,
                    ..Default::default()
                },
            );
            PlatformRequestId(*next)
        }

        fn complete(job: &mut Job) {
            if job.done {
                return;
            }
            let bytes = job.destination.clone().unwrap_or_else(|| SharedBytes::zeroed(4));
            bytes.with_bytes_mut(|b| b.fill(0xAB));
            job.result = Some(bytes);
            job.done = true;
        }
    }
    impl PlatformReadback for FakePlatform {
        fn supports_async_readback(&self) -> bool {
            true
        }
        fn request_texture(&self, t: NativeResourceId, _mip: u32, d: Option<SharedBytes>) -> PlatformRequestId {
            self.issue(t, d)
        }
        fn request_buffer(&self, b: NativeResourceId, _size: usize, d: Option<SharedBytes>) -> PlatformRequestId {
            self.issue(b, d)
        }
        fn is_done(&self, r: PlatformRequestId) -> bool {
            self.jobs.lock().unwrap().get(&r.0).is_none_or(|job| job.done)
        }
        fn has_error(&self, r: PlatformRequestId) -> bool {
            self.jobs.lock().unwrap().get(&r.0).is_none_or(|job| job.error)
        }
        fn result(&self, r: PlatformRequestId) -> Option<SharedBytes> {
            self.jobs.lock().unwrap().get(&r.0).and_then(|job| job.result.clone())
        }
        fn wait_for_completion(&self, r: PlatformRequestId) {
            if let Some(job) = self.jobs.lock().unwrap().get_mut(&r.0) {
                Self::complete(job);
            }
        }
        fn update(&self) {
            self.jobs.lock().unwrap().values_mut().for_each(Self::complete);
        }
        fn dispose(&self, r: PlatformRequestId) {
            self.jobs.lock().unwrap().remove(&r.0);
        }
    }

    /// 不做任何事的拷贝原语，内置后端的命令用不到它
    struct NoCopy;
    impl CopyEngine for NoCopy {
        fn begin_texture_copy(&mut self, t: NativeResourceId, _mip: u32) -> Result<CopyTicket, CopyFailure> {
            Err(CopyFailure::UnknownResource(t))
        }
        fn begin_buffer_copy(&mut self, b: NativeResourceId, _size: usize) -> Result<CopyTicket, CopyFailure> {
            Err(CopyFailure::UnknownResource(b))
        }
        fn poll_fence(&mut self, _ticket: &CopyTicket) -> FenceStatus {
            FenceStatus::Lost
        }
        fn wait_fence(&mut self, _ticket: &CopyTicket) -> FenceStatus {
            FenceStatus::Lost
        }
        fn read_back(&mut self, _ticket: &CopyTicket, _dst: &mut [u8]) -> usize {
            0
        }
        fn release(&mut self, _ticket: CopyTicket) {}
    }

    /// 攒下命令，由测试手动 "执行渲染线程"
    #[derive(Default)]
    struct JobSink {
        jobs: Mutex<Vec<RenderJob>>,
    }
    impl JobSink {
        fn run(&self) {
            let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
            for job in jobs {
                job(&mut NoCopy);
            }
        }
    }
    impl RenderEventSink for JobSink {
        fn issue(&self, _event: RenderEvent) -> Result<(), ReadbackError> {
            Ok(())
        }
        fn execute(&self, job: RenderJob) -> Result<(), ReadbackError> {
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    struct ClosedSink;
    impl RenderEventSink for ClosedSink {
        fn issue(&self, _event: RenderEvent) -> Result<(), ReadbackError> {
            Err(ReadbackError::RenderThreadGone)
        }
        fn execute(&self, _job: RenderJob) -> Result<(), ReadbackError> {
            Err(ReadbackError::RenderThreadGone)
        }
    }

    fn backend_with(events: Arc<dyn RenderEventSink>) -> (BuiltinBackend, Arc<SafetyHandleManager>) {
        let safety = Arc::new(SafetyHandleManager::new());
        let backend = BuiltinBackend::new(
            Arc::new(FakePlatform::default()),
            Arc::new(HandleAllocator::new()),
            safety.clone(),
            events,
        );
        (backend, safety)
    }

    fn backend() -> (BuiltinBackend, Arc<SafetyHandleManager>, Arc<JobSink>) {
        let sink = Arc::new(JobSink::default());
        let (backend, safety) = backend_with(sink.clone());
        (backend, safety, sink)
    }

    fn external(safety: &SafetyHandleManager, len: usize) -> (ExternalDestination, SharedBytes) {
        let bytes = SharedBytes::zeroed(len);
        let destination = ExternalDestination {
            bytes: bytes.clone(),
            marker: safety.create("dest"),
        };
        (destination, bytes)
    }

    #[test]
    fn test_polled_request_lifecycle() {
        let (backend, safety, sink) = backend();
        let handle = backend.create_texture_request(NativeResourceId(5), 0, None).unwrap();
        assert_eq!(backend.status(handle), TaskState::Pending);
        assert_eq!(backend.allocator_kind(handle), Some(AllocatorKind::Persistent));

        // 渲染线程还没执行到这条命令
        backend.update_control_thread();
        assert_eq!(backend.status(handle), TaskState::Pending);
        assert_eq!(backend.get_data(handle).unwrap_err(), ReadbackError::NotYetDone);

        sink.run();
        assert_eq!(backend.status(handle), TaskState::Pending);
        backend.update_control_thread();
        assert!(backend.is_done(handle));
        let data = backend.get_data(handle).unwrap();
        assert_eq!(data.bytes.to_vec(), vec![0xAB; 4]);

        backend.update_control_thread();
        assert!(!backend.exists(handle));
        assert!(backend.has_error(handle));
        assert_eq!(backend.status(handle), TaskState::Disposed);
        assert!(safety.is_empty());
    }

    #[test]
    fn test_rejected_request_reports_error() {
        let (backend, _, sink) = backend();
        let handle = backend.create_buffer_request(NativeResourceId(0), 16, None).unwrap();
        assert_eq!(backend.status(handle), TaskState::Pending);

        sink.run();
        assert_eq!(backend.status(handle), TaskState::Error);
        assert_eq!(backend.allocator_kind(handle), Some(AllocatorKind::Persistent));
        assert_eq!(backend.get_data(handle).unwrap_err(), ReadbackError::ReadbackFailed);
    }

    #[test]
    fn test_closed_render_thread_fails_request() {
        let (backend, safety) = backend_with(Arc::new(ClosedSink));
        let (destination, _) = external(&safety, 8);
        let marker = destination.marker;
        let handle = backend.create_buffer_request(NativeResourceId(2), 8, Some(destination)).unwrap();

        assert_eq!(backend.status(handle), TaskState::Error);
        assert_eq!(backend.allocator_kind(handle), Some(AllocatorKind::None));
        // 不会卡住
        backend.wait_for_completion(handle);

        backend.update_control_thread();
        assert!(safety.check_write(marker).is_ok());
        backend.update_control_thread();
        assert!(!backend.exists(handle));
    }

    #[test]
    fn test_release_external_hold_unlocks_immediately() {
        let (backend, safety, sink) = backend();
        let (destination, bytes) = external(&safety, 8);
        let marker = destination.marker;
        let handle = backend.create_buffer_request(NativeResourceId(2), 8, Some(destination)).unwrap();
        assert_eq!(backend.allocator_kind(handle), Some(AllocatorKind::CallerProvided));
        assert_eq!(safety.check_read(marker).unwrap_err(), ReadbackError::BufferInUse);

        sink.run();
        backend.release_external_hold(handle);
        assert!(safety.check_read(marker).is_ok());
        assert_eq!(bytes.to_vec(), vec![0xAB; 8]);
        // 对应的请求仍在表里，等正常回收
        assert!(backend.exists(handle));
    }

    #[test]
    fn test_wait_from_another_thread_blocks_until_issued() {
        let (backend, safety, sink) = backend();
        let (destination, bytes) = external(&safety, 4);
        let marker = destination.marker;
        let backend = Arc::new(backend);
        let handle = backend.create_buffer_request(NativeResourceId(3), 4, Some(destination)).unwrap();

        let waiter = {
            let backend = backend.clone();
            std::thread::spawn(move || backend.wait_for_completion(handle))
        };
        sink.run();
        waiter.join().unwrap();

        assert!(backend.is_done(handle));
        assert!(safety.check_read(marker).is_ok());
        assert_eq!(bytes.to_vec(), vec![0xAB; 4]);
    }

    #[test]
    fn test_done_request_unlocks_destination_on_get_data() {
        let (backend, safety, sink) = backend();
        let (destination, bytes) = external(&safety, 4);
        let marker = destination.marker;
        let handle = backend.create_buffer_request(NativeResourceId(3), 4, Some(destination)).unwrap();
        sink.run();

        // 平台已经完成，但控制线程还没 update
        backend.platform.wait_for_completion(PlatformRequestId(1));
        assert_eq!(safety.check_read(marker).unwrap_err(), ReadbackError::BufferInUse);

        let data = backend.get_data(handle).unwrap();
        assert_eq!(data.allocator, AllocatorKind::CallerProvided);
        assert!(safety.check_read(marker).is_ok());
        assert_eq!(bytes.to_vec(), vec![0xAB; 4]);
    }

    #[test]
    fn test_dispose_before_issue_drops_platform_request() {
        let (backend, safety, sink) = backend();
        let handle = backend.create_texture_request(NativeResourceId(7), 0, None).unwrap();
        assert_eq!(backend.dispose_all(), 1);
        assert!(safety.is_empty());

        sink.run();
        assert!(!backend.exists(handle));
        assert!(backend.platform.is_done(PlatformRequestId(1)));
        assert!(backend.platform.has_error(PlatformRequestId(1)));
        assert!(backend.platform.result(PlatformRequestId(1)).is_none());
    }
}
