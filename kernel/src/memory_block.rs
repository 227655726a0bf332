//! 内存块记录与块信息记录
//!
//! 这两种记录都从安全系统资源的 slab 堆中分配。
//! [`MemoryBlock`] 描述进程地址空间中一段状态一致的页，
//! [`BlockInfo`] 描述页组中的一段连续物理页。

use bitflags::bitflags;
use mm::{PAGE_SIZE, Paddr, Vaddr};

bitflags! {
    /// 内存访问权限
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemoryPermission: u8 {
        /// 用户可读
        const USER_READ = 1 << 0;
        /// 用户可写
        const USER_WRITE = 1 << 1;
        /// 用户可执行
        const USER_EXECUTE = 1 << 2;
        /// 用户不可访问
        const NOT_MAPPED = 1 << 3;
        /// 内核可读
        const KERNEL_READ = 1 << 4;
        /// 内核可写
        const KERNEL_WRITE = 1 << 5;

        /// 用户读写
        const USER_READ_WRITE = Self::USER_READ.bits() | Self::USER_WRITE.bits();
        /// 用户读执行
        const USER_READ_EXECUTE = Self::USER_READ.bits() | Self::USER_EXECUTE.bits();
    }
}

bitflags! {
    /// 内存属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemoryAttribute: u8 {
        /// 被锁定
        const LOCKED = 1 << 0;
        /// 被 IPC 锁定
        const IPC_LOCKED = 1 << 1;
        /// 与设备共享
        const DEVICE_SHARED = 1 << 2;
        /// 不可缓存
        const UNCACHED = 1 << 3;
        /// 权限被锁定
        const PERMISSION_LOCKED = 1 << 4;
    }
}

/// 内存状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryState {
    /// 未使用
    #[default]
    Free,
    /// I/O 映射
    Io,
    /// 静态映射
    Static,
    /// 代码
    Code,
    /// 代码数据
    CodeData,
    /// 普通堆
    Normal,
    /// 共享内存
    Shared,
    /// 别名
    Alias,
    /// IPC 缓冲
    Ipc,
    /// 栈
    Stack,
    /// 线程局部存储
    ThreadLocal,
    /// 传输内存
    Transferred,
    /// 不可访问
    Inaccessible,
    /// 内核专用
    Kernel,
}

/// 内存块记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBlock {
    address: usize,
    num_pages: usize,
    state: MemoryState,
    permission: MemoryPermission,
    original_permission: MemoryPermission,
    attribute: MemoryAttribute,
    ipc_lock_count: u16,
    device_use_count: u16,
}

impl MemoryBlock {
    /// 初始化记录
    pub fn initialize(
        &mut self,
        address: usize,
        num_pages: usize,
        state: MemoryState,
        permission: MemoryPermission,
        attribute: MemoryAttribute,
    ) {
        *self = Self {
            address,
            num_pages,
            state,
            permission,
            attribute,
            ..Self::default()
        };
    }

    /// 起始地址
    pub fn address(&self) -> usize {
        self.address
    }

    /// 页数
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// 字节数
    pub fn size(&self) -> usize {
        self.num_pages * PAGE_SIZE
    }

    /// 结束地址（不含）
    pub fn end_address(&self) -> usize {
        self.address + self.size()
    }

    /// `address` 是否落在块内
    pub fn contains(&self, address: usize) -> bool {
        self.address <= address && address < self.end_address()
    }

    /// 内存状态
    pub fn state(&self) -> MemoryState {
        self.state
    }

    /// 当前权限
    pub fn permission(&self) -> MemoryPermission {
        self.permission
    }

    /// 属性
    pub fn attribute(&self) -> MemoryAttribute {
        self.attribute
    }

    /// IPC 锁定次数
    pub fn ipc_lock_count(&self) -> u16 {
        self.ipc_lock_count
    }

    /// 设备使用次数
    pub fn device_use_count(&self) -> u16 {
        self.device_use_count
    }

    /// 更改状态与权限
    pub fn update(&mut self, state: MemoryState, permission: MemoryPermission) {
        self.state = state;
        self.permission = permission;
    }

    /// 与 `other` 首尾相接且状态一致时可以合并
    pub fn can_merge_with(&self, other: &MemoryBlock) -> bool {
        self.end_address() == other.address
            && self.state == other.state
            && self.permission == other.permission
            && self.original_permission == other.original_permission
            && self.attribute == other.attribute
            && self.ipc_lock_count == other.ipc_lock_count
            && self.device_use_count == other.device_use_count
    }

    /// 把 `other` 合并到本块尾部
    pub fn add(&mut self, other: &MemoryBlock) {
        debug_assert!(self.can_merge_with(other));
        self.num_pages += other.num_pages;
    }

    /// IPC 锁定，第一次锁定时把权限降为 `new_permission`
    pub fn lock_for_ipc(&mut self, new_permission: MemoryPermission) {
        assert!(
            self.ipc_lock_count < u16::MAX,
            "memory block: ipc lock count overflow"
        );
        if self.ipc_lock_count == 0 {
            self.original_permission = self.permission;
            self.permission = new_permission;
            self.attribute |= MemoryAttribute::IPC_LOCKED;
        }
        self.ipc_lock_count += 1;
    }

    /// 解除 IPC 锁定，最后一次解锁时恢复原权限
    pub fn unlock_for_ipc(&mut self) {
        assert!(
            self.ipc_lock_count > 0,
            "memory block: ipc unlock without lock"
        );
        self.ipc_lock_count -= 1;
        if self.ipc_lock_count == 0 {
            self.permission = self.original_permission;
            self.original_permission = MemoryPermission::empty();
            self.attribute.remove(MemoryAttribute::IPC_LOCKED);
        }
    }

    /// 与设备共享
    pub fn share_to_device(&mut self) {
        assert!(
            self.device_use_count < u16::MAX,
            "memory block: device use count overflow"
        );
        self.device_use_count += 1;
        self.attribute |= MemoryAttribute::DEVICE_SHARED;
    }

    /// 解除与设备的共享
    pub fn unshare_to_device(&mut self) {
        assert!(
            self.device_use_count > 0,
            "memory block: device unshare without share"
        );
        self.device_use_count -= 1;
        if self.device_use_count == 0 {
            self.attribute.remove(MemoryAttribute::DEVICE_SHARED);
        }
    }
}

/// 块信息记录：一段连续物理页
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockInfo {
    address: Paddr,
    num_pages: usize,
    next: Option<Vaddr>,
}

impl BlockInfo {
    /// 初始化记录
    pub fn initialize(&mut self, address: Paddr, num_pages: usize) {
        *self = Self {
            address,
            num_pages,
            next: None,
        };
    }

    /// 起始物理地址
    pub fn address(&self) -> Paddr {
        self.address
    }

    /// 页数
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// 字节数
    pub fn size(&self) -> usize {
        self.num_pages * PAGE_SIZE
    }

    /// 结束物理地址（不含）
    pub fn end_address(&self) -> Paddr {
        self.address + self.size()
    }

    /// 页组中下一条记录的地址
    pub fn next(&self) -> Option<Vaddr> {
        self.next
    }

    /// 设置下一条记录
    pub fn set_next(&mut self, next: Option<Vaddr>) {
        self.next = next;
    }

    /// 是否描述同一段物理页
    pub fn is_equivalent_to(&self, other: &BlockInfo) -> bool {
        self.address == other.address && self.num_pages == other.num_pages
    }

    /// 紧接在尾部时吸收 `[address, address + num_pages)`
    pub fn try_concatenate(&mut self, address: Paddr, num_pages: usize) -> bool {
        if num_pages != 0 && self.end_address() == address {
            self.num_pages += num_pages;
            true
        } else {
            false
        }
    }
}
