//! 安全系统资源在模拟板上的端到端行为

mod common;

use std::sync::Arc;
use std::thread;

use common::{MEMORY, setup};
use kernel::{
    KernelError, SECURE_ALIGNMENT, SecureSystemResource, SystemControl, SystemResource,
};
use mm::{MemoryPool, PAGE_SIZE};

#[test]
fn test_initialize_finalize_leaves_limit_unchanged() {
    let (board, limit) = setup(0x400_0000);
    assert!(limit.reserve(MEMORY, 0x1_0000));

    for (pool, size) in [
        (MemoryPool::Application, 4 * SECURE_ALIGNMENT),
        (MemoryPool::System, 16 * PAGE_SIZE),
        (MemoryPool::SystemNonSecure, SECURE_ALIGNMENT),
    ] {
        let mut resource = SecureSystemResource::new(board.clone());
        resource.initialize(size, limit.clone(), pool).unwrap();
        assert_eq!(limit.current_value(MEMORY), 0x1_0000 + size as u64);
        assert_eq!(board.used_size(pool), size);

        resource.finalize();
        assert_eq!(limit.current_value(MEMORY), 0x1_0000);
        assert_eq!(board.used_size(pool), 0);
        assert_eq!(board.secure_region(), None);
    }
    assert_eq!(limit.reference_count(), 1);
}

#[test]
fn test_region_smaller_than_its_table() {
    let (board, limit) = setup(0x400_0000);
    let mut resource = SecureSystemResource::new(board.clone());
    assert_eq!(
        resource.initialize(PAGE_SIZE, limit.clone(), MemoryPool::System),
        Err(KernelError::OutOfMemory)
    );
    assert_eq!(limit.current_value(MEMORY), 0);
    assert_eq!(board.used_size(MemoryPool::System), 0);
}

#[test]
fn test_limit_reached_before_platform_allocation() {
    let (board, limit) = setup(2 * SECURE_ALIGNMENT as u64);
    assert!(limit.reserve(MEMORY, SECURE_ALIGNMENT as u64 + 1));

    let mut resource = SecureSystemResource::new(board.clone());
    assert_eq!(
        resource.initialize(SECURE_ALIGNMENT, limit.clone(), MemoryPool::Application),
        Err(KernelError::LimitReached)
    );
    assert_eq!(board.used_size(MemoryPool::Application), 0);
    assert_eq!(board.secure_region(), None);
    assert_eq!(limit.current_value(MEMORY), SECURE_ALIGNMENT as u64 + 1);
}

#[test]
fn test_platform_errors_are_propagated() {
    let (board, limit) = setup(0x400_0000);
    let mut resource = SecureSystemResource::new(board.clone());
    assert_eq!(
        resource.initialize(PAGE_SIZE * 4, limit.clone(), MemoryPool::Application),
        Err(KernelError::InvalidSize)
    );
    assert_eq!(
        resource.initialize(SECURE_ALIGNMENT, limit.clone(), MemoryPool::Applet),
        Err(KernelError::NotImplemented)
    );
    assert_eq!(limit.current_value(MEMORY), 0);
    assert!(!resource.is_initialized());
}

#[test]
fn test_secure_region_is_exclusive() {
    let (board, limit) = setup(0x400_0000);
    let mut first = SecureSystemResource::new(board.clone());
    first
        .initialize(SECURE_ALIGNMENT, limit.clone(), MemoryPool::Application)
        .unwrap();

    let mut second = SecureSystemResource::new(board.clone());
    assert_eq!(
        second.initialize(SECURE_ALIGNMENT, limit.clone(), MemoryPool::SystemNonSecure),
        Err(KernelError::OutOfMemory)
    );
    assert_eq!(limit.current_value(MEMORY), SECURE_ALIGNMENT as u64);

    // System 池不占用安全区域
    let mut system = SecureSystemResource::new(board.clone());
    system
        .initialize(8 * PAGE_SIZE, limit.clone(), MemoryPool::System)
        .unwrap();

    system.finalize();
    first.finalize();
    assert_eq!(limit.current_value(MEMORY), 0);
}

#[test]
fn test_required_size_is_stable() {
    let (board, _limit) = setup(0);
    for pool in MemoryPool::ALL {
        let a = SecureSystemResource::calculate_required_secure_memory_size(
            &*board,
            SECURE_ALIGNMENT,
            pool,
        );
        let b = board.calculate_required_secure_memory_size(SECURE_ALIGNMENT, pool);
        assert_eq!(a, b);
    }
}

/// 4 页区域：1 页引用计数表 + 3 页供各堆使用
fn small_resource() -> SecureSystemResource {
    let (board, limit) = setup(0x400_0000);
    let mut resource = SecureSystemResource::new(board);
    resource
        .initialize(4 * PAGE_SIZE, limit, MemoryPool::System)
        .unwrap();
    resource
}

#[test]
fn test_memory_block_capacity() {
    let mut resource = small_resource();
    let mut manager = resource.memory_block_slab_manager().unwrap();
    let mut objects = Vec::new();
    while let Ok(object) = manager.allocate() {
        objects.push(object);
        assert_eq!(manager.used(), objects.len());
    }
    assert_eq!(objects.len(), manager.count());
    assert_eq!(manager.allocate().err(), Some(mm::MmError::OutOfMemory));
    for object in objects {
        manager.free(object);
    }
    assert_eq!(manager.used(), 0);
    resource.finalize();
}

#[test]
fn test_block_info_capacity() {
    let mut resource = small_resource();
    let mut manager = resource.block_info_manager().unwrap();
    let mut objects = Vec::new();
    while let Ok(object) = manager.allocate() {
        objects.push(object);
        assert_eq!(manager.used(), objects.len());
    }
    assert!(!objects.is_empty());
    assert!(manager.allocate().is_err());
    for object in objects {
        manager.free(object);
    }
    assert_eq!(manager.used(), 0);
    resource.finalize();
}

#[test]
fn test_page_table_counters() {
    let mut resource = small_resource();
    let mut manager = resource.page_table_manager().unwrap();
    let tables: Vec<_> = (0..3).map(|_| manager.allocate().unwrap()).collect();
    assert!(manager.allocate().is_err());
    assert_eq!(manager.used(), 3);

    for (i, table) in tables.iter().enumerate() {
        assert!(manager.is_in_page_table_heap(table.address()));
        assert_eq!(manager.ref_count(table.address()), 0);
        manager.open(table.address(), i + 1);
    }
    // 每个页表页有自己的计数
    for (i, table) in tables.iter().enumerate() {
        assert_eq!(manager.ref_count(table.address()) as usize, i + 1);
        assert!(manager.close(table.address(), i + 1));
    }
    for table in tables {
        manager.free(table);
    }
    assert_eq!(manager.used(), 0);
    resource.finalize();
}

#[test]
#[should_panic(expected = "outstanding allocations")]
fn test_finalize_with_live_page_table() {
    let mut resource = small_resource();
    let _table = resource.page_table_manager().unwrap().allocate().unwrap();
    resource.finalize();
}

#[test]
fn test_shared_under_mutex() {
    let (board, limit) = setup(0x400_0000);
    let mut resource = SecureSystemResource::new(board.clone());
    resource
        .initialize(64 * PAGE_SIZE, limit.clone(), MemoryPool::System)
        .unwrap();
    let resource = Arc::new(sync::Mutex::new(resource));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resource = resource.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let mut guard = resource.lock();
                    let mut manager = guard.memory_block_slab_manager().unwrap();
                    let block = manager.allocate().unwrap();
                    manager.get_mut(&block).initialize(
                        0x1000,
                        1,
                        kernel::MemoryState::Normal,
                        kernel::MemoryPermission::USER_READ_WRITE,
                        kernel::MemoryAttribute::empty(),
                    );
                    manager.free(block);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut guard = resource.lock();
    assert_eq!(guard.memory_block_slab_manager().unwrap().used(), 0);
    guard.finalize();
    assert_eq!(limit.current_value(MEMORY), 0);
    assert_eq!(board.used_size(MemoryPool::System), 0);
}
