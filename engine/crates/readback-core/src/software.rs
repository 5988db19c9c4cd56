//! 纯软件的参考设备
//!
//! 用 CPU 内存模拟 GPU 资源，同时实现 [`CopyEngine`]（自定义后端）和 [`PlatformReadback`]（内置后端）。
//! 用于测试和 demo，也可以作为接入真实图形 API 时的对照。
//!
//! - fence 延迟：拷贝发起后，前 `fence_latency` 次 poll 返回 Unsignaled
//! - 平台延迟：请求发起后，前 `fence_latency` 次 update 不完成
//! - 拷贝在发起时对资源做快照，之后对资源的修改不影响已发起的回读

use bytemuck::Pod;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::builtin::{PlatformReadback, PlatformRequestId};
use crate::engine::{CopyEngine, CopyTicket, FenceStatus};
use crate::error::CopyFailure;
use crate::handle::NativeResourceId;
use crate::resource_cache::{GpuResource, ResourceKind};
use crate::storage::SharedBytes;

/// 纹理像素格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8,
    Rg8,
    R3G3B2,
    /// 每像素 15 位，无法按字节回读
    Rgb5,
    Rgb565,
    Rgb8,
    Rgba8,
    Rgb10A2,
    R16F,
    Rgba16F,
    R32F,
    Rgba32F,
    Depth24,
    Depth32F,
}
impl TextureFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R8 | TextureFormat::R3G3B2 => 8,
            TextureFormat::Rgb5 => 15,
            TextureFormat::Rg8 | TextureFormat::Rgb565 | TextureFormat::R16F => 16,
            TextureFormat::Rgb8 | TextureFormat::Depth24 => 24,
            TextureFormat::Rgba8 | TextureFormat::Rgb10A2 | TextureFormat::R32F | TextureFormat::Depth32F => 32,
            TextureFormat::Rgba16F => 64,
            TextureFormat::Rgba32F => 128,
        }
    }

    /// 每像素不是整字节时返回 `None`
    pub fn bytes_per_pixel(self) -> Option<usize> {
        let bits = self.bits_per_pixel();
        (bits % 8 == 0).then_some(bits as usize / 8)
    }
}
impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[inline]
fn mip_extent(extent: u32, mip_level: u32) -> u32 {
    extent.checked_shr(mip_level).unwrap_or(0).max(1)
}

struct TextureData {
    width: u32,
    height: u32,
    format: TextureFormat,
    /// 每级 mip 的像素；格式不是整字节时为空
    levels: Vec<Vec<u8>>,
}

enum ResourceData {
    Texture(TextureData),
    Buffer(Vec<u8>),
}

struct Staging {
    bytes: Vec<u8>,
    polls_left: u32,
}

struct PlatformJob {
    snapshot: Result<Vec<u8>, CopyFailure>,
    destination: Option<SharedBytes>,
    result: Option<SharedBytes>,
    frames_left: u32,
    done: bool,
    error: bool,
}

#[derive(Default)]
struct DeviceState {
    resources: HashMap<NativeResourceId, ResourceData>,
    next_resource: u64,

    staging: HashMap<u64, Staging>,
    next_ticket: u64,

    jobs: HashMap<u64, PlatformJob>,
    next_job: u64,

    fence_latency: u32,
    lose_fences: bool,
    native_queries: u64,
}
impl DeviceState {
    fn create_resource(&mut self, data: ResourceData) -> NativeResourceId {
        // 0 留给 "空句柄"
        self.next_resource += 1;
        let id = NativeResourceId(self.next_resource);
        self.resources.insert(id, data);
        id
    }

    fn snapshot_texture(&self, texture: NativeResourceId, mip_level: u32) -> Result<Vec<u8>, CopyFailure> {
        let Some(ResourceData::Texture(data)) = self.resources.get(&texture) else {
            return Err(CopyFailure::UnknownResource(texture));
        };
        let Some(bpp) = data.format.bytes_per_pixel() else {
            return Err(CopyFailure::UnsupportedFormat {
                format: data.format.to_string(),
                bits: data.format.bits_per_pixel(),
            });
        };
        let level = data.levels.get(mip_level as usize).ok_or(CopyFailure::MipOutOfRange {
            mip_level,
            mip_count: data.levels.len() as u32,
        })?;
        // 这一级的字节数由纹理尺寸决定
        let size = if data.width == 0 || data.height == 0 {
            0
        } else {
            mip_extent(data.width, mip_level) as usize * mip_extent(data.height, mip_level) as usize * bpp
        };
        if size == 0 {
            return Err(CopyFailure::EmptyResource(texture));
        }
        let pixels = level.get(..size).ok_or(CopyFailure::OutOfBounds {
            requested: size,
            available: level.len(),
        })?;
        Ok(pixels.to_vec())
    }

    fn snapshot_buffer(&self, buffer: NativeResourceId, byte_size: usize) -> Result<Vec<u8>, CopyFailure> {
        let Some(ResourceData::Buffer(bytes)) = self.resources.get(&buffer) else {
            return Err(CopyFailure::UnknownResource(buffer));
        };
        if byte_size == 0 {
            return Err(CopyFailure::EmptyResource(buffer));
        }
        let src = bytes.get(..byte_size).ok_or(CopyFailure::OutOfBounds {
            requested: byte_size,
            available: bytes.len(),
        })?;
        Ok(src.to_vec())
    }

    fn begin_copy(&mut self, snapshot: Result<Vec<u8>, CopyFailure>) -> Result<CopyTicket, CopyFailure> {
        let bytes = snapshot?;
        self.next_ticket += 1;
        let ticket = CopyTicket {
            id: self.next_ticket,
            byte_len: bytes.len(),
        };
        self.staging.insert(
            ticket.id,
            Staging {
                bytes,
                polls_left: self.fence_latency,
            },
        );
        Ok(ticket)
    }

    fn issue_job(&mut self, snapshot: Result<Vec<u8>, CopyFailure>, destination: Option<SharedBytes>) -> PlatformRequestId {
        self.next_job += 1;
        let mut job = PlatformJob {
            snapshot,
            destination,
            result: None,
            frames_left: self.fence_latency,
            done: false,
            error: false,
        };
        // 平台当场拒绝
        if let Err(failure) = &job.snapshot {
            log::error!("platform readback rejected: {}", failure);
            job.done = true;
            job.error = true;
        }
        self.jobs.insert(self.next_job, job);
        PlatformRequestId(self.next_job)
    }
}

/// 写入结果；外部目标正被读时返回 false，下次再试
fn complete_job(job: &mut PlatformJob) -> bool {
    if job.done {
        return true;
    }
    let src = match &job.snapshot {
        Ok(bytes) => bytes,
        Err(_) => {
            job.error = true;
            job.done = true;
            return true;
        }
    };
    let result = match &job.destination {
        Some(destination) => {
            let Some(mut guard) = destination.try_write() else {
                return false;
            };
            let dst = guard.as_bytes_mut();
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            destination.clone()
        }
        None => SharedBytes::from_bytes(src),
    };
    job.result = Some(result);
    job.done = true;
    true
}

/// 软件 GPU 设备，克隆后共享同一份状态
#[derive(Clone)]
pub struct SoftwareGpu {
    state: Arc<Mutex<DeviceState>>,
    supports_async_readback: bool,
}
impl Default for SoftwareGpu {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl SoftwareGpu {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::default())),
            supports_async_readback: true,
        }
    }

    /// 拷贝发起后需要多少次 poll（平台请求需要多少次 update）才完成
    pub fn with_fence_latency(self, frames: u32) -> Self {
        self.lock().fence_latency = frames;
        self
    }

    /// 平台报告不支持异步回读
    pub fn without_async_readback(mut self) -> Self {
        self.supports_async_readback = false;
        self
    }

    pub fn copy_engine(&self) -> Box<dyn CopyEngine> {
        Box::new(SoftCopyEngine {
            state: self.state.clone(),
        })
    }

    pub fn platform(&self) -> Arc<dyn PlatformReadback> {
        Arc::new(SoftPlatform {
            state: self.state.clone(),
            supported: self.supports_async_readback,
        })
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        lock_state(&self.state)
    }
}
// 资源
impl SoftwareGpu {
    pub fn create_texture(&self, width: u32, height: u32, format: TextureFormat, mip_count: u32) -> Arc<SoftTexture> {
        let mip_count = mip_count.max(1);
        let levels = (0..mip_count)
            .map(|mip| match format.bytes_per_pixel() {
                Some(bpp) => vec![0u8; mip_extent(width, mip) as usize * mip_extent(height, mip) as usize * bpp],
                None => Vec::new(),
            })
            .map(|level| if width == 0 || height == 0 { Vec::new() } else { level })
            .collect();
        let id = self.lock().create_resource(ResourceData::Texture(TextureData {
            width,
            height,
            format,
            levels,
        }));
        log::debug!("soft texture {} created: {}x{} {} x{} mips", id, width, height, format, mip_count);

        Arc::new(SoftTexture {
            gpu: self.clone(),
            id,
            width,
            height,
            format,
            mip_count,
            alive: AtomicBool::new(true),
        })
    }

    /// `count` 个元素、每个 `stride` 字节的 compute buffer
    pub fn create_buffer(&self, count: usize, stride: usize) -> Arc<SoftBuffer> {
        let byte_size = count * stride;
        let id = self.lock().create_resource(ResourceData::Buffer(vec![0u8; byte_size]));
        Arc::new(SoftBuffer {
            gpu: self.clone(),
            id,
            count,
            stride,
            alive: AtomicBool::new(true),
        })
    }

    /// 之后所有的 fence 查询都返回 Lost
    pub fn set_lose_fences(&self, lose: bool) {
        self.lock().lose_fences = lose;
    }

    /// 原生句柄查询次数
    pub fn native_queries(&self) -> u64 {
        self.lock().native_queries
    }

    /// 还没释放的 staging 数
    pub fn staging_in_use(&self) -> usize {
        self.lock().staging.len()
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    fn destroy_resource(&self, id: NativeResourceId) {
        if self.lock().resources.remove(&id).is_some() {
            log::debug!("soft resource {} destroyed", id);
        }
    }
}

fn lock_state(state: &Mutex<DeviceState>) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 软件纹理
pub struct SoftTexture {
    gpu: SoftwareGpu,
    id: NativeResourceId,
    width: u32,
    height: u32,
    format: TextureFormat,
    mip_count: u32,
    alive: AtomicBool,
}
impl SoftTexture {
    #[inline]
    pub fn id(&self) -> NativeResourceId {
        self.id
    }
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }
    #[inline]
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    /// 某级 mip 的字节数
    pub fn mip_byte_size(&self, mip_level: u32) -> usize {
        match self.format.bytes_per_pixel() {
            Some(bpp) if mip_level < self.mip_count && self.width > 0 && self.height > 0 => {
                mip_extent(self.width, mip_level) as usize * mip_extent(self.height, mip_level) as usize * bpp
            }
            _ => 0,
        }
    }

    /// 覆盖某级 mip 的像素，多余的部分被忽略
    pub fn set_pixels(&self, mip_level: u32, pixels: &[u8]) {
        let mut state = self.gpu.lock();
        if let Some(ResourceData::Texture(data)) = state.resources.get_mut(&self.id)
            && let Some(level) = data.levels.get_mut(mip_level as usize)
        {
            let n = level.len().min(pixels.len());
            level[..n].copy_from_slice(&pixels[..n]);
        }
    }

    pub fn set_pixels_pod<T: Pod>(&self, mip_level: u32, pixels: &[T]) {
        self.set_pixels(mip_level, bytemuck::cast_slice(pixels));
    }

    /// 用一个值填满某级 mip
    pub fn fill(&self, mip_level: u32, value: u8) {
        let mut state = self.gpu.lock();
        if let Some(ResourceData::Texture(data)) = state.resources.get_mut(&self.id)
            && let Some(level) = data.levels.get_mut(mip_level as usize)
        {
            level.fill(value);
        }
    }

    /// 销毁纹理；之后发起的回读会失败
    pub fn destroy(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.gpu.destroy_resource(self.id);
        }
    }
}
impl GpuResource for SoftTexture {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture
    }

    fn query_native_id(&self) -> NativeResourceId {
        self.gpu.lock().native_queries += 1;
        self.id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
impl Drop for SoftTexture {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// 软件 compute buffer
pub struct SoftBuffer {
    gpu: SoftwareGpu,
    id: NativeResourceId,
    count: usize,
    stride: usize,
    alive: AtomicBool,
}
impl SoftBuffer {
    #[inline]
    pub fn id(&self) -> NativeResourceId {
        self.id
    }
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.count * self.stride
    }

    /// 从头覆盖 buffer 内容，多余的部分被忽略
    pub fn set_data<T: Pod>(&self, data: &[T]) {
        let src: &[u8] = bytemuck::cast_slice(data);
        let mut state = self.gpu.lock();
        if let Some(ResourceData::Buffer(bytes)) = state.resources.get_mut(&self.id) {
            let n = bytes.len().min(src.len());
            bytes[..n].copy_from_slice(&src[..n]);
        }
    }

    pub fn destroy(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.gpu.destroy_resource(self.id);
        }
    }
}
impl GpuResource for SoftBuffer {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Buffer {
            byte_size: self.byte_size(),
        }
    }

    fn query_native_id(&self) -> NativeResourceId {
        self.gpu.lock().native_queries += 1;
        self.id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
impl Drop for SoftBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// 自定义后端使用的拷贝原语
pub struct SoftCopyEngine {
    state: Arc<Mutex<DeviceState>>,
}
impl SoftCopyEngine {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        lock_state(&self.state)
    }
}
impl CopyEngine for SoftCopyEngine {
    fn begin_texture_copy(&mut self, texture: NativeResourceId, mip_level: u32) -> Result<CopyTicket, CopyFailure> {
        let mut state = self.lock();
        let snapshot = state.snapshot_texture(texture, mip_level);
        state.begin_copy(snapshot)
    }

    fn begin_buffer_copy(&mut self, buffer: NativeResourceId, byte_size: usize) -> Result<CopyTicket, CopyFailure> {
        let mut state = self.lock();
        let snapshot = state.snapshot_buffer(buffer, byte_size);
        state.begin_copy(snapshot)
    }

    fn poll_fence(&mut self, ticket: &CopyTicket) -> FenceStatus {
        let mut state = self.lock();
        if state.lose_fences {
            return FenceStatus::Lost;
        }
        match state.staging.get_mut(&ticket.id) {
            None => FenceStatus::Lost,
            Some(staging) if staging.polls_left == 0 => FenceStatus::Signaled,
            Some(staging) => {
                staging.polls_left -= 1;
                FenceStatus::Unsignaled
            }
        }
    }

    fn wait_fence(&mut self, ticket: &CopyTicket) -> FenceStatus {
        let mut state = self.lock();
        if state.lose_fences {
            return FenceStatus::Lost;
        }
        match state.staging.get_mut(&ticket.id) {
            None => FenceStatus::Lost,
            Some(staging) => {
                staging.polls_left = 0;
                FenceStatus::Signaled
            }
        }
    }

    fn read_back(&mut self, ticket: &CopyTicket, dst: &mut [u8]) -> usize {
        let state = self.lock();
        let Some(staging) = state.staging.get(&ticket.id) else {
            return 0;
        };
        let n = dst.len().min(staging.bytes.len());
        dst[..n].copy_from_slice(&staging.bytes[..n]);
        n
    }

    fn release(&mut self, ticket: CopyTicket) {
        self.lock().staging.remove(&ticket.id);
    }
}

/// 内置后端使用的平台回读
struct SoftPlatform {
    state: Arc<Mutex<DeviceState>>,
    supported: bool,
}
impl SoftPlatform {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        lock_state(&self.state)
    }
}
impl PlatformReadback for SoftPlatform {
    fn supports_async_readback(&self) -> bool {
        self.supported
    }

    fn request_texture(
        &self,
        texture: NativeResourceId,
        mip_level: u32,
        destination: Option<SharedBytes>,
    ) -> PlatformRequestId {
        let mut state = self.lock();
        let snapshot = state.snapshot_texture(texture, mip_level);
        state.issue_job(snapshot, destination)
    }

    fn request_buffer(
        &self,
        buffer: NativeResourceId,
        byte_size: usize,
        destination: Option<SharedBytes>,
    ) -> PlatformRequestId {
        let mut state = self.lock();
        let snapshot = state.snapshot_buffer(buffer, byte_size);
        state.issue_job(snapshot, destination)
    }

    fn is_done(&self, request: PlatformRequestId) -> bool {
        self.lock().jobs.get(&request.0).is_none_or(|job| job.done)
    }

    fn has_error(&self, request: PlatformRequestId) -> bool {
        self.lock().jobs.get(&request.0).is_none_or(|job| job.error)
    }

    fn result(&self, request: PlatformRequestId) -> Option<SharedBytes> {
        self.lock().jobs.get(&request.0).and_then(|job| job.result.clone())
    }

    fn wait_for_completion(&self, request: PlatformRequestId) {
        loop {
            let mut state = self.lock();
            match state.jobs.get_mut(&request.0) {
                Some(job) => {
                    if complete_job(job) {
                        return;
                    }
                }
                None => return,
            }
            drop(state);
            std::thread::yield_now();
        }
    }

    fn update(&self) {
        let mut state = self.lock();
        for job in state.jobs.values_mut().filter(|job| !job.done) {
            if job.frames_left > 0 {
                job.frames_left -= 1;
            } else {
                complete_job(job);
            }
        }
    }

    fn dispose(&self, request: PlatformRequestId) {
        self.lock().jobs.remove(&request.0);
    }
}
