//! 动态 slab 堆
//!
//! 固定类型、固定大小对象的池。堆按需从 [`DynamicPageManager`] 取页，
//! 把每页切成 `PAGE_SIZE / object_size` 个槽位。取来的页在堆的生命周期内
//! 不会归还给页管理器，空闲槽位通过空闲链表复用。
//!
//! 对象以 [`SlabObject`] 句柄的形式交给调用者：句柄只记录对象所在的地址，
//! 不可复制，释放时交还给堆，因此同一个对象不会被释放两次。

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;

use crate::address::{AlignOps, Vaddr};
use crate::config::PAGE_SIZE;
use crate::dynamic_page_manager::DynamicPageManager;
use crate::error::{MmError, MmResult};

/// slab 对象句柄
pub struct SlabObject<T> {
    addr: Vaddr,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SlabObject<T> {
    fn new(addr: Vaddr) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    /// 对象在区域内的地址
    pub fn address(&self) -> Vaddr {
        self.addr
    }
}

impl<T> fmt::Debug for SlabObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlabObject({:#x})", self.addr)
    }
}

impl<T> PartialEq for SlabObject<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for SlabObject<T> {}

/// 一页中的对象槽位
struct SlabPage<T> {
    slots: Vec<Option<T>>,
}

/// 动态 slab 堆
pub struct DynamicSlabHeap<T> {
    pages: BTreeMap<Vaddr, SlabPage<T>>,
    free_list: Vec<Vaddr>,
    used: usize,
    peak: usize,
    count: usize,
    initialized: bool,
}

impl<T> Default for DynamicSlabHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> DynamicSlabHeap<T> {
    /// 单个对象占用的字节数
    pub const OBJECT_SIZE: usize = if core::mem::size_of::<T>() == 0 {
        1
    } else {
        core::mem::size_of::<T>()
    };

    const OBJECTS_PER_PAGE: usize = PAGE_SIZE / Self::OBJECT_SIZE;

    /// 初始化，并预先准备至少 `num_objects` 个对象槽位
    pub fn initialize(
        &mut self,
        page_allocator: &mut DynamicPageManager,
        num_objects: usize,
    ) -> MmResult<()> {
        if self.initialized {
            return Err(MmError::AlreadyInitialized);
        }
        assert!(
            Self::OBJECT_SIZE <= PAGE_SIZE,
            "slab heap: object larger than a page"
        );
        self.initialized = true;
        while self.count < num_objects {
            self.grow(page_allocator)?;
        }
        Ok(())
    }

    /// 从页源取一页并切成槽位
    fn grow(&mut self, page_allocator: &mut DynamicPageManager) -> MmResult<()> {
        let page = page_allocator.allocate().ok_or(MmError::OutOfMemory)?;
        let mut slots = Vec::with_capacity(Self::OBJECTS_PER_PAGE);
        slots.resize_with(Self::OBJECTS_PER_PAGE, || None);
        self.pages.insert(page, SlabPage { slots });
        // 逆序入栈，低地址先被分配
        for i in (0..Self::OBJECTS_PER_PAGE).rev() {
            self.free_list.push(page + i * Self::OBJECT_SIZE);
        }
        self.count += Self::OBJECTS_PER_PAGE;
        Ok(())
    }

    fn locate(&self, addr: Vaddr) -> (Vaddr, usize) {
        let page = addr.align_down_to_page();
        (page, (addr - page) / Self::OBJECT_SIZE)
    }

    /// 分配一个对象，堆无法再增长时返回 `None`
    pub fn allocate(&mut self, page_allocator: &mut DynamicPageManager) -> Option<SlabObject<T>> {
        if !self.initialized {
            return None;
        }
        if self.free_list.is_empty() {
            self.grow(page_allocator).ok()?;
        }
        let addr = self.free_list.pop()?;
        let (page, index) = self.locate(addr);
        let slot = self.pages.get_mut(&page).map(|p| &mut p.slots[index])?;
        debug_assert!(slot.is_none());
        *slot = Some(T::default());
        self.used += 1;
        self.peak = self.peak.max(self.used);
        Some(SlabObject::new(addr))
    }

    /// 归还一个对象
    ///
    /// # Panics
    /// 对象不属于本堆时 panic。
    pub fn free(&mut self, object: SlabObject<T>) {
        let (page, index) = self.locate(object.addr);
        let slot = self
            .pages
            .get_mut(&page)
            .and_then(|p| p.slots.get_mut(index))
            .filter(|slot| slot.is_some())
            .unwrap_or_else(|| panic!("slab heap: free of foreign object {:#x}", object.addr));
        *slot = None;
        self.used -= 1;
        self.free_list.push(object.addr);
    }

    /// 读取对象
    pub fn get(&self, object: &SlabObject<T>) -> &T {
        let (page, index) = self.locate(object.addr);
        self.pages
            .get(&page)
            .and_then(|p| p.slots[index].as_ref())
            .unwrap_or_else(|| panic!("slab heap: foreign object {:#x}", object.addr))
    }

    /// 修改对象
    pub fn get_mut(&mut self, object: &SlabObject<T>) -> &mut T {
        let (page, index) = self.locate(object.addr);
        self.pages
            .get_mut(&page)
            .and_then(|p| p.slots[index].as_mut())
            .unwrap_or_else(|| panic!("slab heap: foreign object {:#x}", object.addr))
    }
}

impl<T> DynamicSlabHeap<T> {
    /// 创建一个未初始化的堆
    pub const fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            free_list: Vec::new(),
            used: 0,
            peak: 0,
            count: 0,
            initialized: false,
        }
    }

    /// 已分配对象数
    pub fn used(&self) -> usize {
        self.used
    }

    /// 已分配对象数的峰值
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// 槽位总数
    pub fn count(&self) -> usize {
        self.count
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `addr` 是否落在本堆取得的页内
    pub fn is_in_range(&self, addr: Vaddr) -> bool {
        self.pages.contains_key(&addr.align_down_to_page())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Record {
        tag: u64,
        len: u64,
    }

    const BASE: Vaddr = Vaddr(0xffff_ffc0_9000_0000);

    fn setup(pages: usize) -> (DynamicPageManager, DynamicSlabHeap<Record>) {
        let mut dpm = DynamicPageManager::new();
        dpm.initialize(BASE, pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mut heap = DynamicSlabHeap::new();
        heap.initialize(&mut dpm, 0).unwrap();
        (dpm, heap)
    }

    #[test]
    fn test_grows_lazily() {
        let (mut dpm, mut heap) = setup(2);
        assert_eq!(heap.count(), 0);
        assert_eq!(dpm.used(), 0);
        let obj = heap.allocate(&mut dpm).unwrap();
        assert_eq!(obj.address(), BASE);
        assert_eq!(dpm.used(), 1);
        assert_eq!(heap.count(), PAGE_SIZE / 16);
        assert!(heap.is_in_range(obj.address()));
    }

    #[test]
    fn test_capacity_and_reuse() {
        let (mut dpm, mut heap) = setup(1);
        let per_page = PAGE_SIZE / DynamicSlabHeap::<Record>::OBJECT_SIZE;
        let mut objects = Vec::new();
        for i in 0..per_page {
            objects.push(heap.allocate(&mut dpm).unwrap());
            assert_eq!(heap.used(), i + 1);
        }
        assert!(heap.allocate(&mut dpm).is_none());

        let last = objects.pop().unwrap();
        let addr = last.address();
        heap.free(last);
        assert_eq!(heap.used(), per_page - 1);
        assert_eq!(heap.allocate(&mut dpm).unwrap().address(), addr);
        assert_eq!(heap.peak(), per_page);
    }

    #[test]
    fn test_objects_start_default_and_are_writable() {
        let (mut dpm, mut heap) = setup(1);
        let obj = heap.allocate(&mut dpm).unwrap();
        assert_eq!(heap.get(&obj), &Record::default());
        heap.get_mut(&obj).tag = 7;
        assert_eq!(heap.get(&obj).tag, 7);

        // 释放后重新分配得到的是全新的默认值
        let addr = obj.address();
        heap.free(obj);
        let again = heap.allocate(&mut dpm).unwrap();
        assert_eq!(again.address(), addr);
        assert_eq!(heap.get(&again).tag, 0);
    }

    #[test]
    fn test_prepopulate() {
        let mut dpm = DynamicPageManager::new();
        dpm.initialize(BASE, 4 * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mut heap: DynamicSlabHeap<Record> = DynamicSlabHeap::new();
        heap.initialize(&mut dpm, PAGE_SIZE / 16 + 1).unwrap();
        assert_eq!(dpm.used(), 2);

        let mut small = DynamicPageManager::new();
        small.initialize(BASE, PAGE_SIZE, PAGE_SIZE).unwrap();
        let mut heap: DynamicSlabHeap<Record> = DynamicSlabHeap::new();
        assert_eq!(
            heap.initialize(&mut small, PAGE_SIZE),
            Err(MmError::OutOfMemory)
        );
    }

    #[test]
    #[should_panic(expected = "foreign object")]
    fn test_free_foreign_object_panics() {
        let (mut dpm, mut heap) = setup(2);
        let _obj = heap.allocate(&mut dpm).unwrap();
        heap.free(SlabObject::new(BASE + PAGE_SIZE));
    }
}
