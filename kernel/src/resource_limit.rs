//! 资源限额
//!
//! [`ResourceLimit`] 按资源种类记录上限值、当前值、提示值与峰值。
//! 它被多个互不串行的内核上下文共享，因此所有计数都在内部的
//! [`SpinLock`] 保护下原子地修改。预留失败时立即返回，不等待其他持有者释放。
//!
//! 限额对象本身由进程/系统层级持有，这里只提供显式的
//! [`ResourceLimit::open`] / [`ResourceLimit::close`] 引用计数。

use core::sync::atomic::{AtomicUsize, Ordering};

use sync::SpinLock;

use crate::error::{KResult, KernelError};

/// 可限额的资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LimitableResource {
    /// 物理内存字节数
    PhysicalMemoryMax = 0,
    /// 线程数
    ThreadCountMax = 1,
    /// 事件数
    EventCountMax = 2,
    /// 传输内存数
    TransferMemoryCountMax = 3,
    /// 会话数
    SessionCountMax = 4,
}

impl LimitableResource {
    /// 资源种类数
    pub const COUNT: usize = 5;
}

impl TryFrom<u32> for LimitableResource {
    type Error = KernelError;

    fn try_from(value: u32) -> KResult<Self> {
        match value {
            0 => Ok(LimitableResource::PhysicalMemoryMax),
            1 => Ok(LimitableResource::ThreadCountMax),
            2 => Ok(LimitableResource::EventCountMax),
            3 => Ok(LimitableResource::TransferMemoryCountMax),
            4 => Ok(LimitableResource::SessionCountMax),
            _ => Err(KernelError::InvalidEnumValue),
        }
    }
}

#[derive(Debug, Default)]
struct LimitValues {
    limit: [u64; LimitableResource::COUNT],
    current: [u64; LimitableResource::COUNT],
    hint: [u64; LimitableResource::COUNT],
    peak: [u64; LimitableResource::COUNT],
}

/// 资源限额
#[derive(Debug)]
pub struct ResourceLimit {
    values: SpinLock<LimitValues>,
    ref_count: AtomicUsize,
}

impl Default for ResourceLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLimit {
    /// 创建所有上限都为 0 的限额，引用计数为 1（属于创建者）
    pub fn new() -> Self {
        Self {
            values: SpinLock::new(LimitValues::default()),
            ref_count: AtomicUsize::new(1),
        }
    }

    /// 设置上限值
    ///
    /// 新上限低于当前值时返回 [`KernelError::InvalidState`]。成功时峰值重置为当前值。
    pub fn set_limit_value(&self, which: LimitableResource, value: u64) -> KResult<()> {
        let index = which as usize;
        let mut values = self.values.lock();
        if value < values.current[index] {
            return Err(KernelError::InvalidState);
        }
        values.limit[index] = value;
        values.peak[index] = values.current[index];
        Ok(())
    }

    /// 上限值
    pub fn limit_value(&self, which: LimitableResource) -> u64 {
        self.values.lock().limit[which as usize]
    }

    /// 当前值
    pub fn current_value(&self, which: LimitableResource) -> u64 {
        self.values.lock().current[which as usize]
    }

    /// 峰值
    pub fn peak_value(&self, which: LimitableResource) -> u64 {
        self.values.lock().peak[which as usize]
    }

    /// 剩余可预留的值
    pub fn free_value(&self, which: LimitableResource) -> u64 {
        let values = self.values.lock();
        values.limit[which as usize] - values.current[which as usize]
    }

    /// 预留 `value`，超出上限或溢出时返回 `false`
    pub fn reserve(&self, which: LimitableResource, value: u64) -> bool {
        let index = which as usize;
        let mut values = self.values.lock();
        debug_assert!(values.current[index] <= values.limit[index]);

        let Some(new_value) = values.current[index].checked_add(value) else {
            return false;
        };
        if new_value <= values.current[index] || new_value > values.limit[index] {
            return false;
        }
        values.current[index] = new_value;
        values.hint[index] += value;
        values.peak[index] = values.peak[index].max(new_value);
        true
    }

    /// 释放 `value`
    pub fn release(&self, which: LimitableResource, value: u64) {
        self.release_with_hint(which, value, value);
    }

    /// 释放 `value`，提示值减少 `hint`
    ///
    /// # Panics
    /// 释放量超过已预留的量时 panic。
    pub fn release_with_hint(&self, which: LimitableResource, value: u64, hint: u64) {
        let index = which as usize;
        let mut values = self.values.lock();
        assert!(
            values.current[index] >= value && values.hint[index] >= hint,
            "resource limit: releasing {} of {:?} but only {} held",
            value,
            which,
            values.current[index]
        );
        values.current[index] -= value;
        values.hint[index] -= hint;
    }

    /// 增加一个外部引用
    pub fn open(&self) {
        let previous = self.ref_count.fetch_add(1, Ordering::AcqRel);
        assert!(previous > 0, "resource limit: open after final close");
    }

    /// 减少一个外部引用，返回是否是最后一个引用
    ///
    /// # Panics
    /// 引用计数已为 0 时 panic。
    pub fn close(&self) -> bool {
        let previous = self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .unwrap_or_else(|_| {
                log::error!("resource limit: close with no references held");
                panic!("resource limit: reference count underflow")
            });
        previous == 1
    }

    /// 当前引用计数
    pub fn reference_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }
}
