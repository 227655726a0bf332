//! 页表 slab 堆与引用计数表
//!
//! 页表页可能被多个上级页表结构共享，因此每个页表页都有一个引用计数。
//! 引用计数表放在安全区域的开头，每个计数对应页管理器区间内的一页，
//! 按 `(addr - 页管理器起始地址) / PAGE_SIZE` 索引。

use alloc::vec::Vec;
use core::mem::size_of;

use crate::address::{Paddr, Vaddr};
use crate::config::PAGE_SIZE;
use crate::dynamic_page_manager::DynamicPageManager;
use crate::error::MmResult;
use crate::slab_heap::{DynamicSlabHeap, SlabObject};

/// 单页的引用计数
pub type RefCount = u16;

/// 覆盖 `size` 字节区域所需的引用计数表字节数（未按页对齐）
pub const fn calculate_reference_count_size(size: usize) -> usize {
    (size / PAGE_SIZE) * size_of::<RefCount>()
}

/// 每个页表页包含的表项数
pub const PAGE_TABLE_ENTRY_COUNT: usize = PAGE_SIZE / size_of::<u64>();

/// 一个页表页
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageTablePage {
    /// 页表项
    pub entries: [u64; PAGE_TABLE_ENTRY_COUNT],
}

impl Default for PageTablePage {
    fn default() -> Self {
        Self {
            entries: [0; PAGE_TABLE_ENTRY_COUNT],
        }
    }
}

/// 引用计数表
///
/// 以下标访问的计数数组，绑定到它所覆盖的页区间的起始地址。
#[derive(Debug, Default)]
pub struct RefCountTable {
    /// 表本身所在的物理地址
    storage: Paddr,
    /// 第 0 个计数对应的页地址
    base: Vaddr,
    counts: Vec<RefCount>,
}

impl RefCountTable {
    /// 在 `storage` 处建立 `size` 字节的表，覆盖从 `base` 开始的页
    pub fn new(storage: Paddr, base: Vaddr, size: usize) -> Self {
        Self {
            storage,
            base,
            counts: alloc::vec![0; size / size_of::<RefCount>()],
        }
    }

    fn index(&self, addr: Vaddr) -> usize {
        assert!(addr >= self.base, "ref count table: {:#x} below base", addr);
        let index = (addr - self.base) / PAGE_SIZE;
        assert!(
            index < self.counts.len(),
            "ref count table: {:#x} out of range",
            addr
        );
        index
    }

    /// 读取计数
    pub fn get(&self, addr: Vaddr) -> RefCount {
        self.counts[self.index(addr)]
    }

    /// 设置计数
    pub fn set(&mut self, addr: Vaddr, value: RefCount) {
        let index = self.index(addr);
        self.counts[index] = value;
    }

    /// 表所在的物理地址
    pub fn storage(&self) -> Paddr {
        self.storage
    }

    /// 计数个数
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// 表是否为空
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// 页表 slab 堆
#[derive(Default)]
pub struct PageTableSlabHeap {
    heap: DynamicSlabHeap<PageTablePage>,
    ref_counts: RefCountTable,
}

impl PageTableSlabHeap {
    /// 创建一个未初始化的堆
    pub fn new() -> Self {
        Self::default()
    }

    /// 初始化，绑定引用计数表
    pub fn initialize(
        &mut self,
        page_allocator: &mut DynamicPageManager,
        num_objects: usize,
        ref_counts: RefCountTable,
    ) -> MmResult<()> {
        self.heap.initialize(page_allocator, num_objects)?;
        self.ref_counts = ref_counts;
        Ok(())
    }

    /// 分配一个页表页，并把它的引用计数置 0
    pub fn allocate(
        &mut self,
        page_allocator: &mut DynamicPageManager,
    ) -> Option<SlabObject<PageTablePage>> {
        let object = self.heap.allocate(page_allocator)?;
        self.ref_counts.set(object.address(), 0);
        Some(object)
    }

    /// 归还一个页表页
    ///
    /// # Panics
    /// 页仍被引用时 panic。
    pub fn free(&mut self, object: SlabObject<PageTablePage>) {
        let count = self.ref_counts.get(object.address());
        assert!(
            count == 0,
            "page table heap: freeing {:#x} with {} references",
            object.address(),
            count
        );
        self.heap.free(object);
    }

    /// 页表页的引用计数
    pub fn ref_count(&self, addr: Vaddr) -> RefCount {
        self.ref_counts.get(addr)
    }

    /// 增加 `count` 个引用
    ///
    /// # Panics
    /// 计数溢出时 panic。
    pub fn open(&mut self, addr: Vaddr, count: usize) {
        let current = self.ref_counts.get(addr) as usize;
        let updated = current + count;
        assert!(
            updated > current && updated <= RefCount::MAX as usize,
            "page table heap: ref count overflow at {:#x}",
            addr
        );
        self.ref_counts.set(addr, updated as RefCount);
    }

    /// 减少 `count` 个引用，计数归零时返回 `true`
    ///
    /// # Panics
    /// 减少的引用数超过现有计数时 panic。
    pub fn close(&mut self, addr: Vaddr, count: usize) -> bool {
        let current = self.ref_counts.get(addr) as usize;
        assert!(
            current >= count,
            "page table heap: closing {} of {} references at {:#x}",
            count,
            current,
            addr
        );
        let updated = current - count;
        self.ref_counts.set(addr, updated as RefCount);
        updated == 0
    }

    /// `addr` 是否是本堆中的页表页
    pub fn is_in_page_table_heap(&self, addr: Vaddr) -> bool {
        self.heap.is_in_range(addr)
    }

    /// 读取页表页
    pub fn get(&self, object: &SlabObject<PageTablePage>) -> &PageTablePage {
        self.heap.get(object)
    }

    /// 修改页表页
    pub fn get_mut(&mut self, object: &SlabObject<PageTablePage>) -> &mut PageTablePage {
        self.heap.get_mut(object)
    }

    /// 引用计数表
    pub fn ref_count_table(&self) -> &RefCountTable {
        &self.ref_counts
    }

    /// 已分配页表页数
    pub fn used(&self) -> usize {
        self.heap.used()
    }

    /// 已分配页表页数的峰值
    pub fn peak(&self) -> usize {
        self.heap.peak()
    }

    /// 槽位总数
    pub fn count(&self) -> usize {
        self.heap.count()
    }
}
