use slotmap::{SlotMap, new_key_type};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ReadbackError;

new_key_type! {
    /// 安全标记句柄
    ///
    /// slotmap 的 key 自带代数 (generation)，标记被释放后旧 key 永远查不到，
    /// 据此区分 "内存已释放" 和 "内存被占用"。
    pub struct SafetyHandle;
}

/// 标记当前允许的访问
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessState {
    /// 没有进行中的回读，可以读写
    ReadWrite,
    /// 回读进行中，渲染线程独占写入，其他人不可读写
    WriteLocked,
}

#[derive(Debug)]
struct SafetyEntry {
    access: AccessState,
    label: &'static str,
}

/// 安全标记管理器
///
/// 每一块可能被回读写入的内存（调用者提供的 [`crate::storage::ReadbackBuffer`]、
/// 自定义后端的内部结果）都对应一个标记:
/// - 任务创建时标记进入 `WriteLocked`，期间任何读写都会得到 [`ReadbackError::BufferInUse`]
/// - 渲染线程完成拷贝（成功或失败）后标记回到 `ReadWrite`
/// - 内存释放时标记被移除，之后的访问得到 [`ReadbackError::UseAfterFree`]
///
/// 加锁顺序：任务表 -> 安全标记表，反过来不允许。
#[derive(Debug, Default)]
pub struct SafetyHandleManager {
    entries: Mutex<SlotMap<SafetyHandle, SafetyEntry>>,
}
// new & init
impl SafetyHandleManager {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(SlotMap::with_key()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, SlotMap<SafetyHandle, SafetyEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
// create & release
impl SafetyHandleManager {
    /// 创建一个可读写的标记
    pub fn create(&self, label: &'static str) -> SafetyHandle {
        self.entries().insert(SafetyEntry {
            access: AccessState::ReadWrite,
            label,
        })
    }

    /// 创建一个已锁定的标记，用于尚未写入的内部结果
    pub fn create_locked(&self, label: &'static str) -> SafetyHandle {
        self.entries().insert(SafetyEntry {
            access: AccessState::WriteLocked,
            label,
        })
    }

    /// 释放标记；返回标记之前是否存在
    ///
    /// 标记还处于 `WriteLocked` 时释放说明有回读仍指向这块内存，记一条 warn。
    pub fn release(&self, handle: SafetyHandle) -> bool {
        match self.entries().remove(handle) {
            Some(entry) => {
                if entry.access == AccessState::WriteLocked {
                    log::warn!("{} released while a readback is still writing into it", entry.label);
                }
                true
            }
            None => false,
        }
    }
}
// readback 协议
impl SafetyHandleManager {
    /// 为一次回读独占目标内存
    ///
    /// 内存已释放返回 `UseAfterFree`，已有回读进行中返回 `BufferInUse`。
    pub fn acquire_for_readback(&self, handle: SafetyHandle) -> Result<(), ReadbackError> {
        let mut entries = self.entries();
        let entry = entries.get_mut(handle).ok_or(ReadbackError::UseAfterFree)?;
        if entry.access == AccessState::WriteLocked {
            return Err(ReadbackError::BufferInUse);
        }
        entry.access = AccessState::WriteLocked;
        Ok(())
    }

    /// 回读结束（成功或失败），恢复读写权限；返回标记是否仍然存在
    pub fn finish_readback(&self, handle: SafetyHandle) -> bool {
        match self.entries().get_mut(handle) {
            Some(entry) => {
                entry.access = AccessState::ReadWrite;
                true
            }
            None => false,
        }
    }
}
// checks
impl SafetyHandleManager {
    pub fn check_read(&self, handle: SafetyHandle) -> Result<(), ReadbackError> {
        self.check_access(handle)
    }

    pub fn check_write(&self, handle: SafetyHandle) -> Result<(), ReadbackError> {
        self.check_access(handle)
    }

    /// 只检查内存是否还活着，不关心是否被锁定
    pub fn check_exists(&self, handle: SafetyHandle) -> Result<(), ReadbackError> {
        if self.entries().contains_key(handle) { Ok(()) } else { Err(ReadbackError::UseAfterFree) }
    }

    fn check_access(&self, handle: SafetyHandle) -> Result<(), ReadbackError> {
        match self.entries().get(handle) {
            None => Err(ReadbackError::UseAfterFree),
            Some(entry) if entry.access == AccessState::WriteLocked => Err(ReadbackError::BufferInUse),
            Some(_) => Ok(()),
        }
    }

    pub fn access(&self, handle: SafetyHandle) -> Option<AccessState> {
        self.entries().get(handle).map(|entry| entry.access)
    }

    pub fn exists(&self, handle: SafetyHandle) -> bool {
        self.entries().contains_key(handle)
    }

    /// 当前存活的标记数量
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_cycle() {
        let manager = SafetyHandleManager::new();
        let handle = manager.create("test-buffer");
        assert_eq!(manager.check_read(handle), Ok(()));

        manager.acquire_for_readback(handle).unwrap();
        assert_eq!(manager.check_read(handle), Err(ReadbackError::BufferInUse));
        assert_eq!(manager.check_write(handle), Err(ReadbackError::BufferInUse));
        assert_eq!(manager.check_exists(handle), Ok(()));

        // 同一块内存不能同时被两个回读写入
        assert_eq!(manager.acquire_for_readback(handle), Err(ReadbackError::BufferInUse));

        assert!(manager.finish_readback(handle));
        assert_eq!(manager.access(handle), Some(AccessState::ReadWrite));
        assert_eq!(manager.check_read(handle), Ok(()));
    }

    #[test]
    fn test_released_marker_reports_use_after_free() {
        let manager = SafetyHandleManager::new();
        let handle = manager.create_locked("internal");
        assert_eq!(manager.access(handle), Some(AccessState::WriteLocked));

        assert!(manager.release(handle));
        assert!(!manager.release(handle));
        assert_eq!(manager.check_read(handle), Err(ReadbackError::UseAfterFree));
        assert_eq!(manager.acquire_for_readback(handle), Err(ReadbackError::UseAfterFree));
        assert!(!manager.finish_readback(handle));
    }

    #[test]
    fn test_stale_key_never_aliases_new_marker() {
        let manager = SafetyHandleManager::new();
        let old = manager.create("a");
        manager.release(old);
        // slot 被复用，但代数不同
        let new = manager.create("b");
        assert_ne!(old, new);
        assert!(!manager.exists(old));
        assert!(manager.exists(new));
        assert_eq!(manager.len(), 1);
    }
}
