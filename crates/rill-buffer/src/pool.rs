use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use spin::Mutex;

use rill_core::{BlockPool, CoreError, PoolStats, Result};

/// `SlabBlockPool` 提供基于自由链表（Free List）的默认块池实现，
/// 专注在高频提升路径上复用 `BytesMut`，减少堆分配次数。
///
/// # 模块角色（Why）
/// - 作为 `rill-core::BlockPool` 的默认实现，为段提升与保留提供统一的
///   存储来源；
/// - 段在最终析构时调用 `reclaim` 归还存储，调用方无需关注回收细节。
///
/// # 核心机制（How）
/// - 内部维护 `spin::Mutex<Vec<BytesMut>>` 作为自由链表，租借时优先复用
///   容量足够的块，减少重新分配；
/// - `PoolMetrics` 通过原子计数跟踪 `allocated_bytes`、`available_bytes`、
///   `active_blocks` 等指标，支撑 `statistics` 快照与契约测试观察。
///
/// # 契约说明（What）
/// - **线程安全**：共享状态均以自旋锁与原子计数保护，满足
///   `Send + Sync + 'static` 约束；
/// - **后置条件**：`acquire` 返回的块为空且容量不小于请求值；
///   `reclaim` 收到的块被清空后进入自由链表等待复用。
///
/// # 设计权衡（Trade-offs）
/// - 使用自旋锁而非 `std` 互斥量，以便在 `no_std` 环境中同样可用；
/// - `shrink_to_fit` 采取“清空自由链表”的简单策略，便于在峰值过后快速
///   归还内存。
#[derive(Clone, Default)]
pub struct SlabBlockPool {
    inner: Arc<PoolInner>,
}

impl SlabBlockPool {
    /// 创建空池实例，供通道构造或测试场景直接使用。
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空自由链表，返回归还给分配器的总容量。
    pub fn shrink_to_fit(&self) -> usize {
        let mut list = self.inner.free_list.lock();
        let reclaimed: usize = list.iter().map(BytesMut::capacity).sum();
        list.clear();
        self.inner.metrics.decrease_on_shrink(reclaimed);
        reclaimed
    }
}

impl BlockPool for SlabBlockPool {
    fn acquire(&self, min_capacity: usize) -> Result<BytesMut, CoreError> {
        let reused = {
            let mut list = self.inner.free_list.lock();
            list.iter()
                .position(|block| block.capacity() >= min_capacity)
                .map(|index| list.swap_remove(index))
        };
        let mut block = match reused {
            Some(block) => {
                self.inner.metrics.decrease_available(block.capacity());
                block
            }
            None => {
                let block = BytesMut::with_capacity(min_capacity);
                self.inner
                    .metrics
                    .increase_on_new_allocation(block.capacity());
                block
            }
        };
        block.clear();
        self.inner.metrics.increase_active_blocks();
        Ok(block)
    }

    fn reclaim(&self, mut block: BytesMut) {
        self.inner.metrics.decrease_active_blocks();
        if block.capacity() == 0 {
            return;
        }
        block.clear();
        self.inner.metrics.increase_available(block.capacity());
        self.inner.free_list.lock().push(block);
    }

    fn statistics(&self) -> PoolStats {
        let free_blocks = self.inner.free_list.lock().len();
        PoolStats {
            allocated_bytes: self.inner.metrics.allocated_bytes.load(Ordering::Relaxed),
            available_bytes: self.inner.metrics.available_bytes.load(Ordering::Relaxed),
            active_blocks: self.inner.metrics.active_blocks.load(Ordering::Relaxed),
            free_blocks,
        }
    }
}

#[derive(Default)]
struct PoolInner {
    free_list: Mutex<Vec<BytesMut>>,
    metrics: PoolMetrics,
}

#[derive(Default)]
struct PoolMetrics {
    allocated_bytes: AtomicUsize,
    available_bytes: AtomicUsize,
    active_blocks: AtomicUsize,
}

impl PoolMetrics {
    fn increase_on_new_allocation(&self, capacity: usize) {
        self.allocated_bytes.fetch_add(capacity, Ordering::Relaxed);
    }

    fn increase_available(&self, capacity: usize) {
        self.available_bytes.fetch_add(capacity, Ordering::Relaxed);
    }

    fn decrease_available(&self, capacity: usize) {
        saturating_sub(&self.available_bytes, capacity);
    }

    fn decrease_on_shrink(&self, capacity: usize) {
        saturating_sub(&self.available_bytes, capacity);
        saturating_sub(&self.allocated_bytes, capacity);
    }

    fn increase_active_blocks(&self) {
        self.active_blocks.fetch_add(1, Ordering::Relaxed);
    }

    fn decrease_active_blocks(&self) {
        let _ = self
            .active_blocks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |previous| {
                Some(previous.saturating_sub(1))
            });
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// - **意图 (Why)**：归还的块应进入自由链表并在下次租借时复用，
    ///   统计随之同步。
    #[test]
    fn reclaimed_block_is_reused() {
        let pool = SlabBlockPool::new();
        let block = pool.acquire(64).expect("租借块失败");
        let capacity = block.capacity();
        pool.reclaim(block);
        let snapshot = pool.statistics();
        assert_eq!(snapshot.free_blocks, 1);
        assert!(snapshot.available_bytes >= capacity);

        let reused = pool.acquire(16).expect("复用块失败");
        assert!(reused.capacity() >= 16);
        assert_eq!(pool.statistics().free_blocks, 0, "复用后自由链表应为空");
        assert_eq!(
            pool.statistics().allocated_bytes,
            snapshot.allocated_bytes,
            "复用不应产生新分配"
        );
    }

    /// - **意图 (Why)**：`shrink_to_fit` 清空自由链表并同步回落统计。
    #[test]
    fn shrink_to_fit_drops_free_blocks() {
        let pool = SlabBlockPool::new();
        let block = pool.acquire(128).expect("租借块失败");
        pool.reclaim(block);
        let reclaimed = pool.shrink_to_fit();
        assert!(reclaimed >= 128);
        let snapshot = pool.statistics();
        assert_eq!(snapshot.free_blocks, 0);
        assert_eq!(snapshot.available_bytes, 0);
    }

    /// - **意图 (Why)**：零容量请求也应返回可用的空块，统计不被污染。
    #[test]
    fn zero_capacity_acquire_is_supported() {
        let pool = SlabBlockPool::new();
        let block = pool.acquire(0).expect("零容量租借失败");
        assert_eq!(block.len(), 0);
        pool.reclaim(block);
    }
}
