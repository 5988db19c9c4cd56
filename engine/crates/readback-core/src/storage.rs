use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::error::ReadbackError;
use crate::safety::{AccessState, SafetyHandle, SafetyHandleManager};

/// 存储按 u64 对齐，元素类型的对齐不能超过这个值
pub const STORAGE_ALIGN: usize = align_of::<u64>();

/// 按 8 字节对齐的定长字节块
pub struct AlignedBytes {
    words: Box<[u64]>,
    len: usize,
}
impl AlignedBytes {
    fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(STORAGE_ALIGN)].into_boxed_slice(),
            len,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..len]
    }
}
impl fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBytes").field("len", &self.len).finish()
    }
}

/// 可以在控制线程、渲染线程、平台实现之间共享的字节存储
///
/// 长度在创建时固定。克隆只增加引用计数，所有克隆指向同一块内存。
#[derive(Clone)]
pub struct SharedBytes {
    inner: Arc<RwLock<AlignedBytes>>,
    len: usize,
}
// new & init
impl SharedBytes {
    pub fn zeroed(len: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AlignedBytes::zeroed(len))),
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let shared = Self::zeroed(bytes.len());
        shared.with_bytes_mut(|dst| dst.copy_from_slice(bytes));
        shared
    }
}
// tools
impl SharedBytes {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 两个句柄是否指向同一块内存
    #[inline]
    pub fn ptr_eq(&self, other: &SharedBytes) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, AlignedBytes> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, AlignedBytes> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 非阻塞地拿写锁；有读者持有内存时返回 `None`
    ///
    /// 渲染线程持有任务表锁时只能用这个，避免和持有 buffer 读锁、又去查询任务状态的控制线程互等。
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, AlignedBytes>> {
        match self.inner.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.read().as_bytes())
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(self.write().as_bytes_mut())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.with_bytes(|bytes| bytes.to_vec())
    }
}
impl fmt::Debug for SharedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBytes").field("len", &self.len).finish()
    }
}

fn check_element<T: Pod>() -> Result<(), ReadbackError> {
    if align_of::<T>() > STORAGE_ALIGN {
        return Err(ReadbackError::Misaligned {
            align: align_of::<T>(),
            max: STORAGE_ALIGN,
        });
    }
    Ok(())
}

#[inline]
fn element_count<T>(byte_len: usize) -> usize {
    match size_of::<T>() {
        0 => 0,
        size => byte_len / size,
    }
}

/// 外部目标：任务持有的、指向调用者内存的引用
#[derive(Clone, Debug)]
pub struct ExternalDestination {
    pub(crate) bytes: SharedBytes,
    pub(crate) marker: SafetyHandle,
}
impl ExternalDestination {
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// 调用者持有的回读目标内存（类似 `NativeArray<T>`）
///
/// 回读进行中时 buffer 被锁定，`read`/`write` 返回 [`ReadbackError::BufferInUse`]。
/// buffer 被 drop（或 [`ReadbackBuffer::dispose`]）后，仍引用它的任务在取数据时
/// 会得到 [`ReadbackError::UseAfterFree`]。
pub struct ReadbackBuffer<T: Pod> {
    bytes: SharedBytes,
    marker: SafetyHandle,
    safety: Arc<SafetyHandleManager>,
    _element: PhantomData<T>,
}
// new & init
impl<T: Pod> ReadbackBuffer<T> {
    /// 创建 `len` 个元素、全零的 buffer
    pub fn new(safety: &Arc<SafetyHandleManager>, len: usize) -> Result<Self, ReadbackError> {
        check_element::<T>()?;
        Ok(Self {
            bytes: SharedBytes::zeroed(len * size_of::<T>()),
            marker: safety.create("ReadbackBuffer"),
            safety: safety.clone(),
            _element: PhantomData,
        })
    }

    pub fn from_slice(safety: &Arc<SafetyHandleManager>, data: &[T]) -> Result<Self, ReadbackError> {
        let buffer = Self::new(safety, data.len())?;
        buffer.bytes.with_bytes_mut(|dst| dst.copy_from_slice(bytemuck::cast_slice(data)));
        Ok(buffer)
    }
}
// destroy
impl<T: Pod> ReadbackBuffer<T> {
    /// 释放 buffer；仍在引用它的任务取数据时会报 `UseAfterFree`
    pub fn dispose(self) {}
}
impl<T: Pod> Drop for ReadbackBuffer<T> {
    fn drop(&mut self) {
        self.safety.release(self.marker);
    }
}
// tools
impl<T: Pod> ReadbackBuffer<T> {
    #[inline]
    pub fn len(&self) -> usize {
        element_count::<T>(self.bytes.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// 是否有回读正在写入
    pub fn is_locked(&self) -> bool {
        self.safety.access(self.marker) == Some(AccessState::WriteLocked)
    }

    pub fn read(&self) -> Result<TypedReadGuard<'_, T>, ReadbackError> {
        // 先拿内存锁再查标记：标记为可读时渲染线程不可能持有写锁
        let guard = self.bytes.read();
        self.safety.check_read(self.marker)?;
        Ok(TypedReadGuard::new(guard, self.len()))
    }

    pub fn write(&self) -> Result<TypedWriteGuard<'_, T>, ReadbackError> {
        let guard = self.bytes.write();
        self.safety.check_write(self.marker)?;
        Ok(TypedWriteGuard::new(guard, self.len()))
    }

    pub fn to_vec(&self) -> Result<Vec<T>, ReadbackError> {
        Ok(self.read()?.to_vec())
    }

    pub(crate) fn destination(&self) -> ExternalDestination {
        ExternalDestination {
            bytes: self.bytes.clone(),
            marker: self.marker,
        }
    }
}

/// 回读结果的类型化视图，由 `get_data::<T>()` 返回
///
/// - 外部目标：视图和调用者的 [`ReadbackBuffer`] 指向同一块内存，没有拷贝
/// - 内部目标：视图在任务被回收之后失效，`read` 返回 `UseAfterFree`
pub struct ReadbackView<T: Pod> {
    bytes: SharedBytes,
    byte_len: usize,
    marker: Option<SafetyHandle>,
    safety: Arc<SafetyHandleManager>,
    _element: PhantomData<T>,
}
impl<T: Pod> ReadbackView<T> {
    pub(crate) fn new(
        bytes: SharedBytes,
        byte_len: usize,
        marker: Option<SafetyHandle>,
        safety: Arc<SafetyHandleManager>,
    ) -> Result<Self, ReadbackError> {
        check_element::<T>()?;
        Ok(Self {
            byte_len: byte_len.min(bytes.len()),
            bytes,
            marker,
            safety,
            _element: PhantomData,
        })
    }

    /// `byte_len / size_of::<T>()`
    #[inline]
    pub fn len(&self) -> usize {
        element_count::<T>(self.byte_len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// 背后的内存是否还活着
    pub fn is_valid(&self) -> bool {
        self.marker.is_none_or(|marker| self.safety.exists(marker))
    }

    pub fn read(&self) -> Result<TypedReadGuard<'_, T>, ReadbackError> {
        let guard = self.bytes.read();
        if let Some(marker) = self.marker {
            self.safety.check_read(marker)?;
        }
        Ok(TypedReadGuard::new(guard, self.len()))
    }

    pub fn to_vec(&self) -> Result<Vec<T>, ReadbackError> {
        Ok(self.read()?.to_vec())
    }

    /// 视图是否直接指向调用者的 buffer
    pub fn aliases<U: Pod>(&self, buffer: &ReadbackBuffer<U>) -> bool {
        self.bytes.ptr_eq(&buffer.bytes)
    }
}

pub struct TypedReadGuard<'a, T: Pod> {
    guard: RwLockReadGuard<'a, AlignedBytes>,
    len: usize,
    _element: PhantomData<T>,
}
impl<'a, T: Pod> TypedReadGuard<'a, T> {
    fn new(guard: RwLockReadGuard<'a, AlignedBytes>, len: usize) -> Self {
        Self {
            guard,
            len,
            _element: PhantomData,
        }
    }
}
impl<T: Pod> Deref for TypedReadGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        if size_of::<T>() == 0 {
            return &[];
        }
        bytemuck::cast_slice(&self.guard.as_bytes()[..self.len * size_of::<T>()])
    }
}

pub struct TypedWriteGuard<'a, T: Pod> {
    guard: RwLockWriteGuard<'a, AlignedBytes>,
    len: usize,
    _element: PhantomData<T>,
}
impl<'a, T: Pod> TypedWriteGuard<'a, T> {
    fn new(guard: RwLockWriteGuard<'a, AlignedBytes>, len: usize) -> Self {
        Self {
            guard,
            len,
            _element: PhantomData,
        }
    }
}
impl<T: Pod> Deref for TypedWriteGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        if size_of::<T>() == 0 {
            return &[];
        }
        bytemuck::cast_slice(&self.guard.as_bytes()[..self.len * size_of::<T>()])
    }
}
impl<T: Pod> DerefMut for TypedWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        if size_of::<T>() == 0 {
            return &mut [];
        }
        let byte_len = self.len * size_of::<T>();
        bytemuck::cast_slice_mut(&mut self.guard.as_bytes_mut()[..byte_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_bytes_roundtrip() {
        let bytes = SharedBytes::from_bytes(&[1, 2, 3]);
        assert_eq!(bytes.len(), 3);
        assert_eq!(bytes.to_vec(), vec![1, 2, 3]);

        let clone = bytes.clone();
        clone.with_bytes_mut(|b| b[0] = 9);
        assert!(bytes.ptr_eq(&clone));
        assert_eq!(bytes.to_vec(), vec![9, 2, 3]);
    }

    #[test]
    fn test_buffer_is_locked_during_readback() {
        let safety = Arc::new(SafetyHandleManager::new());
        let buffer = ReadbackBuffer::<u32>::from_slice(&safety, &[7, 8]).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.byte_len(), 8);

        let destination = buffer.destination();
        safety.acquire_for_readback(destination.marker).unwrap();
        assert!(buffer.is_locked());
        assert_eq!(buffer.read().err(), Some(ReadbackError::BufferInUse));
        assert_eq!(buffer.write().err(), Some(ReadbackError::BufferInUse));

        safety.finish_readback(destination.marker);
        assert_eq!(buffer.to_vec().unwrap(), vec![7, 8]);
        buffer.write().unwrap()[1] = 80;
        assert_eq!(&*buffer.read().unwrap(), &[7, 80]);
    }

    #[test]
    fn test_dropping_buffer_releases_marker() {
        let safety = Arc::new(SafetyHandleManager::new());
        let buffer = ReadbackBuffer::<u8>::new(&safety, 4).unwrap();
        let destination = buffer.destination();
        assert_eq!(safety.len(), 1);

        buffer.dispose();
        assert!(safety.is_empty());
        assert_eq!(safety.check_exists(destination.marker), Err(ReadbackError::UseAfterFree));
        // 内存本身仍由任务那一份引用保活，不会悬垂
        assert_eq!(destination.bytes.len(), 4);
    }

    #[test]
    fn test_view_element_count_and_alias() {
        let safety = Arc::new(SafetyHandleManager::new());
        let buffer = ReadbackBuffer::<u32>::from_slice(&safety, &[1, 2, 3]).unwrap();
        let destination = buffer.destination();

        let view = ReadbackView::<u16>::new(destination.bytes.clone(), 12, Some(destination.marker), safety.clone())
            .unwrap();
        assert_eq!(view.len(), 6);
        assert!(view.aliases(&buffer));

        // 长度不是元素大小的整数倍时向下取整
        let view = ReadbackView::<u32>::new(destination.bytes, 7, None, safety).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.to_vec().unwrap(), vec![1]);
    }

    #[test]
    fn test_overaligned_element_is_rejected() {
        #[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
        #[repr(C, align(16))]
        struct Wide([u8; 16]);

        let safety = Arc::new(SafetyHandleManager::new());
        assert_eq!(
            ReadbackBuffer::<Wide>::new(&safety, 1).err(),
            Some(ReadbackError::Misaligned { align: 16, max: 8 })
        );
    }
}
