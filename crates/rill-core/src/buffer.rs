use bytes::BytesMut;

use crate::error::{CoreError, Result};

/// `BlockPool` 定义通道自有存储（Owned 段）的块分配契约。
///
/// # 设计背景（Why）
/// - 借用段在生产者释放点被提升为自有段时需要一块连续存储；提升发生在热路径，
///   反复向系统分配器申请内存会造成抖动，因此把分配策略显式抽象为可注入的池。
/// - Trait 放在核心契约层、实现放在缓冲层，使通道状态机不关心底层内存策略，
///   测试也能注入记录型探针实现。
///
/// # 契约说明（What）
/// - `acquire(min_capacity)`：返回容量不小于 `min_capacity` 的空 [`BytesMut`]；
///   无法满足时返回 `pool.exhausted` 错误，调用方据此走降级路径。
/// - `reclaim(block)`：归还一块不再使用的存储；实现可复用、可丢弃，但不得 panic，
///   因为归还发生在段的析构路径上。
/// - `statistics()`：返回当前统计快照，供监控与契约测试观察。
/// - 实现必须满足 `Send + Sync + 'static`，段与游标会跨线程持有池句柄。
///
/// # 设计取舍（Trade-offs）
/// - `acquire` 保留 `Result` 形态：默认实现虽然不会失败，但有界池、共享内存池
///   等实现需要稳定的错误出口。
pub trait BlockPool: Send + Sync + 'static {
    /// 取得一块容量不小于 `min_capacity` 的空缓冲。
    fn acquire(&self, min_capacity: usize) -> Result<BytesMut, CoreError>;

    /// 归还一块存储，实现决定复用或释放。
    fn reclaim(&self, block: BytesMut);

    /// 返回池的统计快照。
    fn statistics(&self) -> PoolStats;
}

/// 池统计快照，字段均为调用瞬间的一致性读数。
///
/// - `allocated_bytes`：池生命周期内仍由池记账的总容量；
/// - `available_bytes`：空闲链表中立即可复用的容量；
/// - `active_blocks`：已借出且尚未归还的块数；
/// - `free_blocks`：空闲链表中的块数。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated_bytes: usize,
    pub available_bytes: usize,
    pub active_blocks: usize,
    pub free_blocks: usize,
}
