//! 自旋锁
//!
//! [`RawSpinLock`] 只负责锁标志；[`SpinLock`] 在其之上包装数据，
//! 获取锁期间本地中断保持禁用。

use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::intr_guard::IntrGuard;

/// 带中断保护的原始自旋锁。不可重入。
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    /// 创建一个未上锁的自旋锁。
    pub const fn new() -> Self {
        RawSpinLock {
            locked: AtomicBool::new(false),
        }
    }

    /// 禁用本地中断后自旋直到获取锁。
    pub fn lock(&self) -> RawSpinLockGuard<'_> {
        let intr_guard = IntrGuard::new();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
        RawSpinLockGuard {
            lock: self,
            _intr_guard: intr_guard,
        }
    }

    /// 尝试获取锁，失败时立即恢复中断状态并返回 `None`。
    pub fn try_lock(&self) -> Option<RawSpinLockGuard<'_>> {
        let intr_guard = IntrGuard::new();
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RawSpinLockGuard {
                lock: self,
                _intr_guard: intr_guard,
            })
    }

    /// 锁是否被占用（仅用于调试）
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// [`RawSpinLock`] 的 RAII 保护器。
///
/// drop 顺序：先释放锁标志，再由 `IntrGuard` 恢复中断。
pub struct RawSpinLockGuard<'a> {
    lock: &'a RawSpinLock,
    _intr_guard: IntrGuard,
}

impl Drop for RawSpinLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// 提供对数据互斥访问的自旋锁。
///
/// 持锁期间中断被禁用，临界区应尽量短；`SpinLock` 不可重入。
#[derive(Debug)]
pub struct SpinLock<T> {
    raw_lock: RawSpinLock,
    data: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock。
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw_lock: RawSpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// 获取锁并返回数据的访问保护器。
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let raw_guard = self.raw_lock.lock();
        SpinLockGuard {
            _raw_guard: raw_guard,
            // SAFETY: 持有 raw_guard 期间只有当前保护器能访问数据
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// 尝试获取锁。
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.raw_lock.try_lock().map(|raw_guard| SpinLockGuard {
            _raw_guard: raw_guard,
            // SAFETY: 同 lock
            data: unsafe { &mut *self.data.get() },
        })
    }

    /// 通过独占引用直接访问数据，无需加锁。
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// 消费锁并取出数据。
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// 锁是否被占用（仅用于调试）
    pub fn is_locked(&self) -> bool {
        self.raw_lock.is_locked()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// [`SpinLock`] 的 RAII 保护器，离开作用域时释放锁。
pub struct SpinLockGuard<'a, T> {
    _raw_guard: RawSpinLockGuard<'a>,
    data: &'a mut T,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

// SAFETY: SpinLock 通过 RawSpinLock 保证对数据的互斥访问
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}
