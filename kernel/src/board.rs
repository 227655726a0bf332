//! 模拟板的平台内存控制器
//!
//! 安全内存从对应内存池的帧分配器中连续、对齐地划出：
//!
//! - Applet 池的安全内存另行管理，需要预留的量为 0，分配返回 [`KernelError::NotImplemented`]
//! - System 池按页对齐，其他池按 [`BoardConfig::secure_alignment`] 对齐
//! - System 以外的池还要占用全板唯一的安全区域

use mm::address::is_aligned;
use mm::{MemoryManager, MemoryPool, PAGE_SIZE, Paddr, UsizeConvert, Vaddr};
use sync::SpinLock;

use crate::config::BoardConfig;
use crate::error::{KResult, KernelError};
use crate::system_control::SystemControl;

/// 当前生效的安全区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecureRegionInfo {
    /// 起始物理地址
    pub address: Paddr,
    /// 字节数
    pub size: usize,
}

struct BoardState {
    memory: MemoryManager,
    secure_region: Option<SecureRegionInfo>,
}

impl BoardState {
    /// 设置安全区域；`size` 为 0 表示清除。已有安全区域时设置失败。
    fn set_secure_region(&mut self, address: Paddr, size: usize) -> bool {
        if size == 0 {
            self.secure_region = None;
            return true;
        }
        if self.secure_region.is_some() {
            return false;
        }
        self.secure_region = Some(SecureRegionInfo { address, size });
        true
    }
}

/// 模拟板的平台内存控制器
pub struct BoardSystemControl {
    secure_alignment: usize,
    heap_virtual_base: Vaddr,
    state: SpinLock<BoardState>,
}

impl BoardSystemControl {
    /// 按配置建立各内存池
    pub fn new(config: BoardConfig) -> Self {
        debug_assert!(config.secure_alignment.is_power_of_two());
        Self {
            secure_alignment: config.secure_alignment,
            heap_virtual_base: config.layout.heap_virtual_base,
            state: SpinLock::new(BoardState {
                memory: MemoryManager::new(config.layout),
                secure_region: None,
            }),
        }
    }

    fn alignment(&self, pool: MemoryPool) -> usize {
        if pool == MemoryPool::System {
            PAGE_SIZE
        } else {
            self.secure_alignment
        }
    }

    /// 当前的安全区域
    pub fn secure_region(&self) -> Option<SecureRegionInfo> {
        self.state.lock().secure_region
    }

    /// 内存池的空闲字节数
    pub fn free_size(&self, pool: MemoryPool) -> usize {
        self.state.lock().memory.free_size(pool)
    }

    /// 内存池的已用字节数
    pub fn used_size(&self, pool: MemoryPool) -> usize {
        self.state.lock().memory.used_size(pool)
    }
}

impl Default for BoardSystemControl {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

impl SystemControl for BoardSystemControl {
    fn calculate_required_secure_memory_size(&self, size: usize, pool: MemoryPool) -> usize {
        if pool == MemoryPool::Applet { 0 } else { size }
    }

    fn allocate_secure_memory(&self, size: usize, pool: MemoryPool) -> KResult<Vaddr> {
        if pool == MemoryPool::Applet {
            log::warn!("board: applet secure memory is managed separately");
            return Err(KernelError::NotImplemented);
        }

        let alignment = self.alignment(pool);
        if size == 0 || !is_aligned(size, alignment) {
            return Err(KernelError::InvalidSize);
        }

        let num_pages = size / PAGE_SIZE;
        let mut state = self.state.lock();
        let paddr = state
            .memory
            .allocate_and_open_continuous(num_pages, alignment / PAGE_SIZE, pool)
            .map_err(|_| KernelError::OutOfMemory)?;

        if pool != MemoryPool::System && !state.set_secure_region(paddr, size) {
            log::warn!("board: secure region already claimed");
            state.memory.close(paddr, num_pages);
            return Err(KernelError::OutOfMemory);
        }

        let address = state.memory.heap_virtual_address(paddr);
        log::debug!(
            "board: secure memory {:#x}..{:#x} from {:?} pool",
            paddr,
            paddr + size,
            pool
        );
        Ok(address)
    }

    fn free_secure_memory(&self, address: Vaddr, size: usize, pool: MemoryPool) {
        assert!(
            pool != MemoryPool::Applet,
            "board: applet secure memory is managed separately"
        );
        assert!(
            is_aligned(size, self.alignment(pool)),
            "board: freeing misaligned secure memory size {:#x}",
            size
        );

        let paddr = self.heap_physical_address(address);
        let mut state = self.state.lock();
        if pool != MemoryPool::System {
            assert!(state.set_secure_region(Paddr::null(), 0));
        }
        state.memory.close(paddr, size / PAGE_SIZE);
    }

    fn heap_physical_address(&self, address: Vaddr) -> Paddr {
        Paddr(address.as_usize() - self.heap_virtual_base.as_usize())
    }
}
