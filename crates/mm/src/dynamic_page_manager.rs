//! 动态页管理器
//!
//! 在一段固定的字节区间上按页分配，为各 slab 堆提供后备页。
//!
//! 分配策略：
//! - 优先复用空闲链表中已释放的页
//! - 空闲链表为空时从尚未使用的尾部按指针递增分配
//!
//! 每一页的状态记录在位图中（0=空闲，1=已分配），用于检测重复释放。
//! 管理器本身不加锁，调用者负责互斥。

use alloc::vec::Vec;

use crate::address::{AlignOps, UsizeConvert, Vaddr};
use crate::config::PAGE_SIZE;
use crate::error::{MmError, MmResult};

/// 动态页管理器
#[derive(Debug, Default)]
pub struct DynamicPageManager {
    address: Vaddr,
    size: usize,
    /// 页状态位图
    bitmap: Vec<u64>,
    /// 已释放、等待复用的页
    free_list: Vec<Vaddr>,
    /// 尾部下一个未使用页的索引
    next_index: usize,
    used: usize,
    peak: usize,
    initialized: bool,
}

impl DynamicPageManager {
    /// 创建一个未初始化的管理器
    pub const fn new() -> Self {
        Self {
            address: Vaddr(0),
            size: 0,
            bitmap: Vec::new(),
            free_list: Vec::new(),
            next_index: 0,
            used: 0,
            peak: 0,
            initialized: false,
        }
    }

    /// 在 `[address, address + size)` 上初始化
    ///
    /// `address` 必须对齐到 `align`（页大小的 2 的幂倍），`size` 必须是非零的整页数。
    pub fn initialize(&mut self, address: Vaddr, size: usize, align: usize) -> MmResult<()> {
        if self.initialized {
            return Err(MmError::AlreadyInitialized);
        }
        if !align.is_power_of_two() || align < PAGE_SIZE || !address.is_aligned(align) {
            return Err(MmError::InvalidAddress);
        }
        if size == 0 || size % PAGE_SIZE != 0 {
            return Err(MmError::InvalidSize);
        }

        let count = size / PAGE_SIZE;
        self.address = address;
        self.size = size;
        self.bitmap = alloc::vec![0u64; count.div_ceil(64)];
        self.free_list = Vec::new();
        self.next_index = 0;
        self.used = 0;
        self.peak = 0;
        self.initialized = true;
        log::debug!(
            "dynamic page manager: {} pages at {:#x}",
            count,
            address
        );
        Ok(())
    }

    #[inline]
    fn index_of(&self, addr: Vaddr) -> usize {
        (addr - self.address) / PAGE_SIZE
    }

    #[inline]
    fn is_allocated(&self, index: usize) -> bool {
        self.bitmap[index / 64] & (1u64 << (index % 64)) != 0
    }

    fn mark_allocated(&mut self, index: usize) {
        self.bitmap[index / 64] |= 1u64 << (index % 64);
        self.used += 1;
        self.peak = self.peak.max(self.used);
    }

    fn address_of(&self, index: usize) -> Vaddr {
        self.address + index * PAGE_SIZE
    }

    /// 分配一页，页源耗尽时返回 `None`
    pub fn allocate(&mut self) -> Option<Vaddr> {
        if !self.initialized {
            return None;
        }
        let index = match self.free_list.pop() {
            Some(addr) => self.index_of(addr),
            None if self.next_index < self.count() => {
                self.next_index += 1;
                self.next_index - 1
            }
            None => return None,
        };
        debug_assert!(!self.is_allocated(index));
        self.mark_allocated(index);
        Some(self.address_of(index))
    }

    /// 从尾部分配 `num_pages` 个连续页，起始地址对齐到 `align_pages` 页
    ///
    /// 为对齐而跳过的尾部页进入空闲链表。
    pub fn allocate_contiguous(&mut self, num_pages: usize, align_pages: usize) -> Option<Vaddr> {
        if !self.initialized || num_pages == 0 || !align_pages.is_power_of_two() {
            return None;
        }
        let tail = self.address_of(self.next_index);
        let start = tail.align_up(align_pages * PAGE_SIZE);
        let start_index = self.index_of(start);
        if start_index + num_pages > self.count() {
            return None;
        }

        for index in self.next_index..start_index {
            let addr = self.address_of(index);
            self.free_list.push(addr);
        }
        for index in start_index..start_index + num_pages {
            self.mark_allocated(index);
        }
        self.next_index = start_index + num_pages;
        Some(start)
    }

    /// 归还一页
    ///
    /// # Panics
    /// 地址不在管理范围内、未按页对齐，或该页未被分配时 panic。
    pub fn free(&mut self, addr: Vaddr) {
        assert!(
            self.is_in_range(addr) && addr.is_page_aligned(),
            "dynamic page manager: free of foreign page {:#x}",
            addr
        );
        let index = self.index_of(addr);
        assert!(
            self.is_allocated(index),
            "dynamic page manager: double free of {:#x}",
            addr
        );
        self.bitmap[index / 64] &= !(1u64 << (index % 64));
        self.used -= 1;
        self.free_list.push(addr);
    }

    /// 区间起始地址
    pub fn address(&self) -> Vaddr {
        self.address
    }

    /// 区间字节数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 已分配页数
    pub fn used(&self) -> usize {
        self.used
    }

    /// 已分配页数的峰值
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// 总页数
    pub fn count(&self) -> usize {
        self.size / PAGE_SIZE
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `addr` 是否落在管理的区间内
    pub fn is_in_range(&self, addr: Vaddr) -> bool {
        self.initialized
            && addr >= self.address
            && addr.as_usize() < self.address.as_usize() + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Vaddr = Vaddr(0xffff_ffc0_8000_0000);

    fn manager(pages: usize) -> DynamicPageManager {
        let mut dpm = DynamicPageManager::new();
        dpm.initialize(BASE, pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        dpm
    }

    #[test]
    fn test_bump_then_exhaust() {
        let mut dpm = manager(4);
        for i in 0..4 {
            assert_eq!(dpm.allocate(), Some(BASE + i * PAGE_SIZE));
        }
        assert_eq!(dpm.allocate(), None);
        assert_eq!(dpm.used(), 4);
        assert_eq!(dpm.peak(), 4);
    }

    #[test]
    fn test_free_list_is_preferred() {
        let mut dpm = manager(8);
        let a = dpm.allocate().unwrap();
        let _b = dpm.allocate().unwrap();
        dpm.free(a);
        assert_eq!(dpm.used(), 1);
        assert_eq!(dpm.allocate(), Some(a));
        assert_eq!(dpm.peak(), 2);
    }

    #[test]
    fn test_contiguous_from_tail() {
        let mut dpm = manager(16);
        let first = dpm.allocate().unwrap();
        let run = dpm.allocate_contiguous(4, 4).unwrap();
        assert!(run.is_aligned(4 * PAGE_SIZE));
        assert_eq!(dpm.used(), 5);
        // 对齐跳过的页可以被单页分配复用
        let reused = dpm.allocate().unwrap();
        assert!(reused > first && reused < run);
        assert!(dpm.allocate_contiguous(16, 1).is_none());
    }

    #[test]
    fn test_initialize_rejects_bad_arguments() {
        let mut dpm = DynamicPageManager::new();
        assert_eq!(
            dpm.initialize(BASE + 1, PAGE_SIZE, PAGE_SIZE),
            Err(MmError::InvalidAddress)
        );
        assert_eq!(
            dpm.initialize(BASE, PAGE_SIZE + 1, PAGE_SIZE),
            Err(MmError::InvalidSize)
        );
        assert_eq!(dpm.initialize(BASE, 0, PAGE_SIZE), Err(MmError::InvalidSize));
        dpm.initialize(BASE, PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(
            dpm.initialize(BASE, PAGE_SIZE, PAGE_SIZE),
            Err(MmError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_uninitialized_allocates_nothing() {
        let mut dpm = DynamicPageManager::new();
        assert_eq!(dpm.allocate(), None);
        assert!(!dpm.is_in_range(BASE));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut dpm = manager(2);
        let a = dpm.allocate().unwrap();
        dpm.free(a);
        dpm.free(a);
    }
}
