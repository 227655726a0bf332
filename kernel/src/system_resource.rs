//! 安全系统资源
//!
//! 从物理内存池中划出一块隔离的安全区域，并在其上建立一整套
//! 元数据分配器，供沙箱化的执行上下文使用：
//!
//! ```text
//! address                address + rc_size                         address + size
//! |-- 引用计数表 --------|-- 动态页管理器 ----------------------------|
//!                        |  页表堆 / 内存块堆 / 块信息堆按需取页      |
//! ```
//!
//! [`SecureSystemResource::initialize`] 自顶向下建立这套结构，失败时不留下任何痕迹；
//! [`SecureSystemResource::finalize`] 在确认没有未归还的对象后自底向上拆除。
//!
//! # 互斥
//!
//! 所有变更入口都要求 `&mut self`：调用者必须独占访问。需要跨线程共享时，
//! 把整个对象放进 [`sync::Mutex`] 中。

use alloc::sync::Arc;
use core::fmt;

use mm::address::align_up;
use mm::{
    DynamicPageManager, DynamicResourceManager, DynamicSlabHeap, MemoryPool, MmResult, PAGE_SIZE,
    Paddr, PageTableManager, PageTableSlabHeap, RefCountTable, Vaddr,
    calculate_reference_count_size,
};

use crate::error::{KResult, KernelError};
use crate::guard::FailureGuard;
use crate::memory_block::{BlockInfo, MemoryBlock};
use crate::resource_limit::{LimitableResource, ResourceLimit};
use crate::scoped_reservation::ScopedResourceReservation;
use crate::system_control::SystemControl;

/// 内存块记录的 slab 管理器
pub type MemoryBlockSlabManager<'a> = DynamicResourceManager<'a, MemoryBlock>;

/// 块信息记录的 slab 管理器
pub type BlockInfoManager<'a> = DynamicResourceManager<'a, BlockInfo>;

/// 系统资源向内核其余部分暴露的能力
pub trait SystemResource {
    /// 是否是安全系统资源
    fn is_secure_resource(&self) -> bool;

    /// 内存块管理器，资源未建立时为 `None`
    fn memory_block_slab_manager(&mut self) -> Option<MemoryBlockSlabManager<'_>>;

    /// 块信息管理器，资源未建立时为 `None`
    fn block_info_manager(&mut self) -> Option<BlockInfoManager<'_>>;

    /// 页表管理器，资源未建立时为 `None`
    fn page_table_manager(&mut self) -> Option<PageTableManager<'_>>;
}

/// 安全区域内的分配器栈
struct SecureRegion {
    address: Vaddr,
    page_manager: DynamicPageManager,
    page_table_heap: PageTableSlabHeap,
    memory_block_heap: DynamicSlabHeap<MemoryBlock>,
    block_info_heap: DynamicSlabHeap<BlockInfo>,
}

impl SecureRegion {
    /// 在 `[address, address + size)` 上建立分配器栈，开头 `rc_size` 字节留给引用计数表
    fn new(address: Vaddr, size: usize, rc_size: usize, rc_paddr: Paddr) -> MmResult<Self> {
        let mut page_manager = DynamicPageManager::new();
        page_manager.initialize(address + rc_size, size - rc_size, PAGE_SIZE)?;

        let ref_counts = RefCountTable::new(rc_paddr, page_manager.address(), rc_size);
        let mut page_table_heap = PageTableSlabHeap::new();
        page_table_heap.initialize(&mut page_manager, 0, ref_counts)?;
        let mut memory_block_heap = DynamicSlabHeap::new();
        memory_block_heap.initialize(&mut page_manager, 0)?;
        let mut block_info_heap = DynamicSlabHeap::new();
        block_info_heap.initialize(&mut page_manager, 0)?;

        Ok(Self {
            address,
            page_manager,
            page_table_heap,
            memory_block_heap,
            block_info_heap,
        })
    }

    /// (页表, 内存块, 块信息) 各自未归还的对象数
    fn outstanding(&self) -> (usize, usize, usize) {
        (
            self.page_table_heap.used(),
            self.memory_block_heap.used(),
            self.block_info_heap.used(),
        )
    }
}

/// 安全系统资源
pub struct SecureSystemResource {
    system: Arc<dyn SystemControl>,
    size: usize,
    pool: MemoryPool,
    resource_limit: Option<Arc<ResourceLimit>>,
    region: Option<SecureRegion>,
}

impl fmt::Debug for SecureSystemResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSystemResource")
            .field("size", &self.size)
            .field("pool", &self.pool)
            .field("address", &self.address())
            .finish()
    }
}

impl SecureSystemResource {
    /// 创建一个未初始化的安全系统资源
    pub fn new(system: Arc<dyn SystemControl>) -> Self {
        Self {
            system,
            size: 0,
            pool: MemoryPool::Application,
            resource_limit: None,
            region: None,
        }
    }

    /// 在 `pool` 中分配 `size` 字节安全内存，并在其上建立分配器栈
    ///
    /// 失败时资源限额、平台内存都恢复原状。
    ///
    /// # Errors
    /// - [`KernelError::InvalidState`]: 已经初始化过
    /// - [`KernelError::InvalidSize`]: `size` 为 0 或不是整页
    /// - [`KernelError::LimitReached`]: 资源限额不足
    /// - [`KernelError::OutOfMemory`]: 区域放不下自身的引用计数表
    /// - 平台分配失败时原样返回其错误
    ///
    /// # Panics
    /// 平台分配成功却返回零地址时 panic。
    pub fn initialize(
        &mut self,
        size: usize,
        resource_limit: Arc<ResourceLimit>,
        pool: MemoryPool,
    ) -> KResult<()> {
        if self.region.is_some() {
            return Err(KernelError::InvalidState);
        }
        if size == 0 {
            return Err(KernelError::InvalidSize);
        }

        self.size = size;
        self.pool = pool;

        let secure_size = Self::calculate_required_secure_memory_size(&*self.system, size, pool);
        let reservation = ScopedResourceReservation::new(
            Some(&resource_limit),
            LimitableResource::PhysicalMemoryMax,
            secure_size as u64,
        );
        if !reservation.succeeded() {
            log::warn!(
                "secure resource: limit reached reserving {:#x} bytes from {:?}",
                secure_size,
                pool
            );
            return Err(KernelError::LimitReached);
        }

        let address = self.system.allocate_secure_memory(size, pool)?;
        assert!(
            !address.is_null(),
            "secure resource: platform returned a null secure region"
        );

        let system = Arc::clone(&self.system);
        let rollback = FailureGuard::new(move || {
            log::warn!("secure resource: rolling back secure memory at {:#x}", address);
            system.free_secure_memory(address, size, pool);
        });

        let rc_size = align_up(calculate_reference_count_size(size), PAGE_SIZE);
        if size <= rc_size {
            log::warn!(
                "secure resource: {:#x} bytes cannot hold a {:#x} byte ref count table",
                size,
                rc_size
            );
            return Err(KernelError::OutOfMemory);
        }

        let rc_paddr = self.system.heap_physical_address(address);
        self.region = Some(SecureRegion::new(address, size, rc_size, rc_paddr)?);

        reservation.commit();
        rollback.disarm();

        resource_limit.open();
        self.resource_limit = Some(resource_limit);

        log::debug!(
            "secure resource: {:#x} bytes at {:#x} from {:?}, {:#x} reserved",
            size,
            address,
            pool,
            secure_size
        );
        Ok(())
    }

    /// 拆除分配器栈，释放安全内存并把预留还给资源限额
    ///
    /// # Panics
    /// 资源未初始化，或任一管理器仍有未归还的对象时 panic。
    pub fn finalize(&mut self) {
        let Some(region) = self.region.take() else {
            log::error!("secure resource: finalize without initialize");
            panic!("secure resource: finalize of an uninitialized resource");
        };

        let (page_tables, memory_blocks, block_infos) = region.outstanding();
        if page_tables != 0 || memory_blocks != 0 || block_infos != 0 {
            log::error!(
                "secure resource: outstanding objects at finalize: page tables {}, memory blocks {}, block infos {}",
                page_tables,
                memory_blocks,
                block_infos
            );
            panic!("secure resource: finalize with outstanding allocations");
        }

        self.system.free_secure_memory(region.address, self.size, self.pool);

        let secure_size = self.secure_size();
        if let Some(resource_limit) = self.resource_limit.take() {
            resource_limit.release(LimitableResource::PhysicalMemoryMax, secure_size as u64);
            resource_limit.close();
        }
        log::debug!(
            "secure resource: finalized {:#x} bytes at {:#x}",
            self.size,
            region.address
        );
    }

    /// 为 `(size, pool)` 需要向资源限额预留的量
    ///
    /// 初始化与销毁都经由这里计算，结果只取决于 `(size, pool)`。
    pub fn calculate_required_secure_memory_size(
        system: &dyn SystemControl,
        size: usize,
        pool: MemoryPool,
    ) -> usize {
        system.calculate_required_secure_memory_size(size, pool)
    }

    /// 本资源预留的量
    pub fn secure_size(&self) -> usize {
        Self::calculate_required_secure_memory_size(&*self.system, self.size, self.pool)
    }

    /// 请求的字节数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 内存池
    pub fn pool(&self) -> MemoryPool {
        self.pool
    }

    /// 安全区域的起始地址
    pub fn address(&self) -> Option<Vaddr> {
        self.region.as_ref().map(|region| region.address)
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.region.is_some()
    }

    /// 所属的资源限额
    pub fn resource_limit(&self) -> Option<&Arc<ResourceLimit>> {
        self.resource_limit.as_ref()
    }

    /// 安全区域内动态页管理器已分配的页数
    pub fn used_pages(&self) -> usize {
        self.region
            .as_ref()
            .map_or(0, |region| region.page_manager.used())
    }
}

impl SystemResource for SecureSystemResource {
    fn is_secure_resource(&self) -> bool {
        true
    }

    fn memory_block_slab_manager(&mut self) -> Option<MemoryBlockSlabManager<'_>> {
        self.region.as_mut().map(|region| {
            DynamicResourceManager::new(&mut region.page_manager, &mut region.memory_block_heap)
        })
    }

    fn block_info_manager(&mut self) -> Option<BlockInfoManager<'_>> {
        self.region.as_mut().map(|region| {
            DynamicResourceManager::new(&mut region.page_manager, &mut region.block_info_heap)
        })
    }

    fn page_table_manager(&mut self) -> Option<PageTableManager<'_>> {
        self.region.as_mut().map(|region| {
            PageTableManager::new(&mut region.page_manager, &mut region.page_table_heap)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env;
    use test_support::mock::kernel::MockSystemControl;

    const MEMORY: LimitableResource = LimitableResource::PhysicalMemoryMax;
    const REGION_BASE: usize = 0xffff_ffc0_8000_0000;

    fn setup(
        limit_value: u64,
    ) -> (Arc<MockSystemControl>, Arc<ResourceLimit>, SecureSystemResource) {
        test_env::init();
        let mock = Arc::new(MockSystemControl::new(REGION_BASE));
        let limit = Arc::new(ResourceLimit::new());
        limit.set_limit_value(MEMORY, limit_value).unwrap();
        let resource = SecureSystemResource::new(mock.clone());
        (mock, limit, resource)
    }

    #[test]
    fn test_initialize_then_finalize_restores_limit() {
        let (mock, limit, mut resource) = setup(0x100_0000);
        limit.reserve(MEMORY, 0x1000);

        resource
            .initialize(0x10_0000, limit.clone(), MemoryPool::Application)
            .unwrap();
        assert!(resource.is_initialized());
        assert_eq!(resource.address(), Some(Vaddr(REGION_BASE)));
        assert_eq!(limit.current_value(MEMORY), 0x1000 + 0x10_0000);
        assert_eq!(limit.reference_count(), 2);

        resource.finalize();
        assert!(!resource.is_initialized());
        assert_eq!(limit.current_value(MEMORY), 0x1000);
        assert_eq!(limit.reference_count(), 1);
        assert_eq!(mock.outstanding_bytes(), 0);
        assert_eq!(mock.last_free_size(), 0x10_0000);
    }

    #[test]
    fn test_inflated_secure_size_is_reserved_and_released() {
        let (mock, limit, mut resource) = setup(0x100_0000);
        mock.set_extra_secure_size(0x2_0000);

        resource
            .initialize(0x10_0000, limit.clone(), MemoryPool::System)
            .unwrap();
        assert_eq!(resource.secure_size(), 0x12_0000);
        assert_eq!(limit.current_value(MEMORY), 0x12_0000);

        resource.finalize();
        // 释放的是原始大小，归还的是放大后的大小
        assert_eq!(mock.last_free_size(), 0x10_0000);
        assert_eq!(limit.current_value(MEMORY), 0);
    }

    #[test]
    fn test_too_small_for_table_rolls_back() {
        let (mock, limit, mut resource) = setup(0x100_0000);
        assert_eq!(
            resource.initialize(PAGE_SIZE, limit.clone(), MemoryPool::System),
            Err(KernelError::OutOfMemory)
        );
        assert_eq!(limit.current_value(MEMORY), 0);
        assert_eq!(mock.allocate_calls(), 1);
        assert_eq!(mock.free_calls(), 1);
        assert_eq!(mock.outstanding_bytes(), 0);
        assert!(!resource.is_initialized());
        assert_eq!(limit.reference_count(), 1);
    }

    #[test]
    fn test_limit_reached_allocates_nothing() {
        let (mock, limit, mut resource) = setup(0x10_0000);
        assert!(limit.reserve(MEMORY, 0x8_0000));
        assert_eq!(
            resource.initialize(0x10_0000, limit.clone(), MemoryPool::Application),
            Err(KernelError::LimitReached)
        );
        assert_eq!(limit.current_value(MEMORY), 0x8_0000);
        assert_eq!(mock.allocate_calls(), 0);
    }

    #[test]
    fn test_platform_failure_is_propagated() {
        let (mock, limit, mut resource) = setup(0x100_0000);
        mock.set_fail_allocation(true);
        assert_eq!(
            resource.initialize(0x10_0000, limit.clone(), MemoryPool::Application),
            Err(KernelError::OutOfMemory)
        );
        assert_eq!(limit.current_value(MEMORY), 0);
        assert_eq!(mock.free_calls(), 0);
    }

    #[test]
    fn test_unaligned_size_rolls_back() {
        let (mock, limit, mut resource) = setup(0x100_0000);
        assert_eq!(
            resource.initialize(0x10_0800, limit.clone(), MemoryPool::System),
            Err(KernelError::InvalidSize)
        );
        assert_eq!(mock.outstanding_bytes(), 0);
        assert_eq!(limit.current_value(MEMORY), 0);
    }

    #[test]
    fn test_double_initialize_and_zero_size() {
        let (_mock, limit, mut resource) = setup(0x100_0000);
        assert_eq!(
            resource.initialize(0, limit.clone(), MemoryPool::System),
            Err(KernelError::InvalidSize)
        );
        resource
            .initialize(0x10_0000, limit.clone(), MemoryPool::System)
            .unwrap();
        assert_eq!(
            resource.initialize(0x10_0000, limit.clone(), MemoryPool::System),
            Err(KernelError::InvalidState)
        );
        assert_eq!(limit.current_value(MEMORY), 0x10_0000);
        resource.finalize();
    }

    #[test]
    fn test_managers_follow_lifecycle() {
        let (_mock, limit, mut resource) = setup(0x100_0000);
        assert!(resource.is_secure_resource());
        assert!(resource.memory_block_slab_manager().is_none());

        resource
            .initialize(0x10_0000, limit.clone(), MemoryPool::System)
            .unwrap();
        let mut blocks = resource.memory_block_slab_manager().unwrap();
        let block = blocks.allocate().unwrap();
        assert_eq!(blocks.used(), 1);
        blocks.free(block);
        assert_eq!(resource.used_pages(), 1);

        resource.finalize();
        assert!(resource.page_table_manager().is_none());
    }

    #[test]
    #[should_panic(expected = "outstanding allocations")]
    fn test_finalize_with_outstanding_block_info_panics() {
        let (_mock, limit, mut resource) = setup(0x100_0000);
        resource
            .initialize(0x10_0000, limit, MemoryPool::System)
            .unwrap();
        let _info = resource.block_info_manager().unwrap().allocate().unwrap();
        resource.finalize();
    }

    #[test]
    #[should_panic(expected = "uninitialized")]
    fn test_finalize_uninitialized_panics() {
        let (_mock, _limit, mut resource) = setup(0);
        resource.finalize();
    }

    #[test]
    #[should_panic(expected = "null secure region")]
    fn test_null_platform_address_panics() {
        let (mock, limit, mut resource) = setup(0x100_0000);
        mock.set_return_zero_address(true);
        let _ = resource.initialize(0x10_0000, limit, MemoryPool::System);
    }
}
