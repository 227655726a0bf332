//! 轮询式输入控制器
//!
//! 控制器由定时节拍驱动：每次节拍调用 [`ControllerBase::on_update`]，
//! 控制器把最新采样写入共享内存中的 [`Lifo`]。

use alloc::sync::Arc;

use sync::Mutex;

/// 输入控制器
pub trait ControllerBase {
    /// 控制器初始化时调用
    fn on_init(&mut self);

    /// 控制器释放时调用
    fn on_release(&mut self);

    /// 定时节拍，`timestamp` 为当前时间（纳秒）
    fn on_update(&mut self, timestamp: u64);

    /// 是否已激活
    fn is_activated(&self) -> bool;

    /// 设置激活状态
    fn set_activated(&mut self, activated: bool);

    /// 激活控制器，首次激活时调用 [`ControllerBase::on_init`]
    fn activate(&mut self) {
        if !self.is_activated() {
            self.set_activated(true);
            self.on_init();
        }
    }

    /// 停用控制器
    fn deactivate(&mut self) {
        if self.is_activated() {
            self.set_activated(false);
            self.on_release();
        }
    }
}

/// 共享内存中的环形后进先出缓冲
#[derive(Debug, Clone)]
pub struct Lifo<T: Copy + Default, const N: usize> {
    timestamp: u64,
    total_entry_count: u64,
    last_entry_index: usize,
    entry_count: usize,
    entries: [T; N],
}

impl<T: Copy + Default, const N: usize> Default for Lifo<T, N> {
    fn default() -> Self {
        Self {
            timestamp: 0,
            total_entry_count: N as u64,
            last_entry_index: 0,
            entry_count: 0,
            entries: [T::default(); N],
        }
    }
}

impl<T: Copy + Default, const N: usize> Lifo<T, N> {
    /// 写入一个新采样
    pub fn write(&mut self, timestamp: u64, entry: T) {
        self.timestamp = timestamp;
        self.last_entry_index = (self.last_entry_index + 1) % N;
        self.entries[self.last_entry_index] = entry;
        self.entry_count = (self.entry_count + 1).min(N - 1);
    }

    /// 最新的采样
    pub fn latest(&self) -> Option<&T> {
        (self.entry_count > 0).then(|| &self.entries[self.last_entry_index])
    }

    /// 最近一次写入的时间
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// 有效采样数
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// 环的容量
    pub fn total_entry_count(&self) -> u64 {
        self.total_entry_count
    }
}

/// 数位板采样
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitizerEntry {
    /// 采样序号
    pub sampling_number: u64,
    /// 采样时间
    pub timestamp: u64,
}

/// 数位板在共享内存中的区域
pub type DigitizerSharedMemory = Lifo<DigitizerEntry, 17>;

/// 数位板
pub struct Digitizer {
    activated: bool,
    smart_update: bool,
    sampling_number: u64,
    shared_memory: Arc<Mutex<DigitizerSharedMemory>>,
}

impl Digitizer {
    /// 绑定到共享内存区域
    pub fn new(shared_memory: Arc<Mutex<DigitizerSharedMemory>>) -> Self {
        Self {
            activated: false,
            smart_update: false,
            sampling_number: 0,
            shared_memory,
        }
    }

    /// 打开或关闭智能更新；关闭时节拍不写共享内存
    pub fn set_smart_update(&mut self, enabled: bool) {
        self.smart_update = enabled;
    }
}

impl ControllerBase for Digitizer {
    fn on_init(&mut self) {
        self.sampling_number = 0;
        *self.shared_memory.lock() = DigitizerSharedMemory::default();
    }

    fn on_release(&mut self) {}

    fn on_update(&mut self, timestamp: u64) {
        if !self.activated || !self.smart_update {
            return;
        }
        self.sampling_number += 1;
        self.shared_memory.lock().write(
            timestamp,
            DigitizerEntry {
                sampling_number: self.sampling_number,
                timestamp,
            },
        );
    }

    fn is_activated(&self) -> bool {
        self.activated
    }

    fn set_activated(&mut self, activated: bool) {
        self.activated = activated;
    }
}
