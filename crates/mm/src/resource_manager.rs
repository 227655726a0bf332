//! slab 管理器
//!
//! 管理器把一个 slab 堆与它的页源配成一对，向上提供
//! `allocate` / `free` / `used`。同一区域内的所有堆共享同一个
//! [`DynamicPageManager`]，所以管理器是借用二者的视图，同一时刻只能
//! 存在一个。

use crate::address::Vaddr;
use crate::dynamic_page_manager::DynamicPageManager;
use crate::error::{MmError, MmResult};
use crate::page_table_heap::{PageTablePage, PageTableSlabHeap, RefCount};
use crate::slab_heap::{DynamicSlabHeap, SlabObject};

/// 通用 slab 管理器
pub struct DynamicResourceManager<'a, T> {
    page_allocator: &'a mut DynamicPageManager,
    slab_heap: &'a mut DynamicSlabHeap<T>,
}

impl<'a, T: Default> DynamicResourceManager<'a, T> {
    /// 由页源和堆组成管理器
    pub fn new(
        page_allocator: &'a mut DynamicPageManager,
        slab_heap: &'a mut DynamicSlabHeap<T>,
    ) -> Self {
        Self {
            page_allocator,
            slab_heap,
        }
    }

    /// 分配一个对象
    pub fn allocate(&mut self) -> MmResult<SlabObject<T>> {
        self.slab_heap
            .allocate(self.page_allocator)
            .ok_or(MmError::OutOfMemory)
    }

    /// 归还一个对象
    pub fn free(&mut self, object: SlabObject<T>) {
        self.slab_heap.free(object);
    }

    /// 读取对象
    pub fn get(&self, object: &SlabObject<T>) -> &T {
        self.slab_heap.get(object)
    }

    /// 修改对象
    pub fn get_mut(&mut self, object: &SlabObject<T>) -> &mut T {
        self.slab_heap.get_mut(object)
    }

    /// 已分配对象数
    pub fn used(&self) -> usize {
        self.slab_heap.used()
    }

    /// 已分配对象数的峰值
    pub fn peak(&self) -> usize {
        self.slab_heap.peak()
    }

    /// 槽位总数
    pub fn count(&self) -> usize {
        self.slab_heap.count()
    }
}

/// 页表管理器
pub struct PageTableManager<'a> {
    page_allocator: &'a mut DynamicPageManager,
    page_table_heap: &'a mut PageTableSlabHeap,
}

impl<'a> PageTableManager<'a> {
    /// 由页源和页表堆组成管理器
    pub fn new(
        page_allocator: &'a mut DynamicPageManager,
        page_table_heap: &'a mut PageTableSlabHeap,
    ) -> Self {
        Self {
            page_allocator,
            page_table_heap,
        }
    }

    /// 分配一个页表页，引用计数为 0
    pub fn allocate(&mut self) -> MmResult<SlabObject<PageTablePage>> {
        self.page_table_heap
            .allocate(self.page_allocator)
            .ok_or(MmError::OutOfMemory)
    }

    /// 归还一个页表页
    pub fn free(&mut self, object: SlabObject<PageTablePage>) {
        self.page_table_heap.free(object);
    }

    /// 读取页表页
    pub fn get(&self, object: &SlabObject<PageTablePage>) -> &PageTablePage {
        self.page_table_heap.get(object)
    }

    /// 修改页表页
    pub fn get_mut(&mut self, object: &SlabObject<PageTablePage>) -> &mut PageTablePage {
        self.page_table_heap.get_mut(object)
    }

    /// 引用计数
    pub fn ref_count(&self, addr: Vaddr) -> RefCount {
        self.page_table_heap.ref_count(addr)
    }

    /// 增加引用
    pub fn open(&mut self, addr: Vaddr, count: usize) {
        self.page_table_heap.open(addr, count);
    }

    /// 减少引用，归零时返回 `true`
    pub fn close(&mut self, addr: Vaddr, count: usize) -> bool {
        self.page_table_heap.close(addr, count)
    }

    /// `addr` 是否是本管理器的页表页
    pub fn is_in_page_table_heap(&self, addr: Vaddr) -> bool {
        self.page_table_heap.is_in_page_table_heap(addr)
    }

    /// 已分配页表页数
    pub fn used(&self) -> usize {
        self.page_table_heap.used()
    }

    /// 已分配页表页数的峰值
    pub fn peak(&self) -> usize {
        self.page_table_heap.peak()
    }

    /// 槽位总数
    pub fn count(&self) -> usize {
        self.page_table_heap.count()
    }
}
