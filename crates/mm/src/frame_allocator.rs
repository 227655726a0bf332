//! 帧分配器模块
//!
//! 每个物理内存池由一个 [`FrameAllocator`] 管理，使用位图跟踪每个物理帧：
//!
//! - **bitmap**：每个 bit 表示一个物理帧（0=空闲，1=已分配）
//! - **allocated_count**：已分配帧数，用于快速统计
//!
//! 安全内存总是以“连续 + 对齐”的方式整体分配、整体释放，
//! 因此这里只提供 [`FrameAllocator::alloc_contig_frames_aligned`] 与
//! [`FrameAllocator::dealloc_contig_frames`] 两条路径。
//! 释放由调用者显式发起（平台的 `free_secure_memory`），不做 RAII 回收。

use crate::address::{Paddr, PageNum, Ppn, PpnRange, UsizeConvert};
use alloc::vec::Vec;

/// 物理帧分配器。
pub struct FrameAllocator {
    /// 管理的物理帧范围。
    range: PpnRange,
    /// 位图数据，使用 u64 以便整字跳过。
    bitmap: Vec<u64>,
    /// 已分配帧数。
    allocated_count: usize,
}

impl FrameAllocator {
    /// 创建管理 `[start, start + size)` 的帧分配器。
    ///
    /// 起始地址向上、结束地址向下取整到页。
    pub fn new(start: Paddr, size: usize) -> Self {
        let start_ppn = Ppn::from_addr_ceil(start);
        let end_ppn = Ppn::from_addr_floor(start + size);
        let range = PpnRange::new(start_ppn, end_ppn.max(start_ppn));
        let words = range.len().div_ceil(64);
        FrameAllocator {
            range,
            bitmap: alloc::vec![0u64; words],
            allocated_count: 0,
        }
    }

    #[inline]
    fn is_free(&self, frame_idx: usize) -> bool {
        (self.bitmap[frame_idx / 64] & (1u64 << (frame_idx % 64))) == 0
    }

    #[inline]
    fn mark_allocated(&mut self, frame_idx: usize) {
        self.bitmap[frame_idx / 64] |= 1u64 << (frame_idx % 64);
    }

    #[inline]
    fn mark_free(&mut self, frame_idx: usize) {
        self.bitmap[frame_idx / 64] &= !(1u64 << (frame_idx % 64));
    }

    /// 分配 `num` 个**连续**物理帧，起始帧号对齐到 `align_pages`。
    ///
    /// `align_pages` 是相对物理地址 0 的对齐，必须是 2 的幂。
    pub fn alloc_contig_frames_aligned(&mut self, num: usize, align_pages: usize) -> Option<PpnRange> {
        if num == 0 || num > self.free_frames() {
            return None;
        }
        debug_assert!(align_pages.is_power_of_two(), "alignment must be a power of 2");

        let base = self.range.start().as_usize();
        let total = self.range.len();
        let mut candidate = (base + align_pages - 1) & !(align_pages - 1);
        while candidate + num <= base + total {
            let start_idx = candidate - base;
            match (0..num).find(|i| !self.is_free(start_idx + i)) {
                Some(busy) => {
                    // 跳过占用帧后重新对齐
                    let next = candidate + busy + 1;
                    candidate = (next + align_pages - 1) & !(align_pages - 1);
                }
                None => {
                    for i in 0..num {
                        self.mark_allocated(start_idx + i);
                    }
                    self.allocated_count += num;
                    return Some(PpnRange::from_start_len(Ppn(candidate), num));
                }
            }
        }
        None
    }

    /// 回收一个连续的物理帧范围。
    ///
    /// # Panics
    /// 范围越界或其中有帧未被分配（重复释放）时 panic。
    pub fn dealloc_contig_frames(&mut self, frames: PpnRange) {
        assert!(
            self.range.contains_range(&frames),
            "dealloc_contig_frames: frame range out of pool"
        );
        let start_idx = frames.start().as_usize() - self.range.start().as_usize();
        for i in 0..frames.len() {
            assert!(
                !self.is_free(start_idx + i),
                "dealloc_contig_frames: double free detected"
            );
            self.mark_free(start_idx + i);
        }
        self.allocated_count -= frames.len();
    }

    /// 该物理页是否属于本分配器
    pub fn contains(&self, ppn: Ppn) -> bool {
        self.range.contains(ppn)
    }

    /// 管理的帧范围
    pub fn range(&self) -> PpnRange {
        self.range
    }

    /// 总帧数
    pub fn total_frames(&self) -> usize {
        self.range.len()
    }

    /// 已分配帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocated_count
    }

    /// 空闲帧数
    pub fn free_frames(&self) -> usize {
        self.range.len() - self.allocated_count
    }

    /// (总帧数, 已分配帧数, 空闲帧数)
    pub fn get_stats(&self) -> (usize, usize, usize) {
        (self.total_frames(), self.allocated_count, self.free_frames())
    }
}
