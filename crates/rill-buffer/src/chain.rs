use alloc::sync::Arc;
use core::fmt;

use rill_core::{BlockPool, Result};

use crate::cursor::Cursor;
use crate::segment::Segment;

/// 单向段链：通道状态机驱动的缓冲主干。
///
/// # 角色定位（Why）
/// - 生产者的每次写入挂入一个借用段，消费者经游标观察 `[head, tail]` 上的
///   字节；链只在尾部增长、在头部修剪，天然匹配“前缀先消费”的协议。
/// - 追加与发布分离：`append_borrowed` 暂存待发布段，`flush_pending` 才把它
///   挂上链并推进写前沿——未发布的区域对消费者不可见，释放点直接丢弃。
///
/// # 并发契约（What）
/// - 本类型自身不加锁，所有方法都要求独占引用；`rill-channel` 在其状态锁内
///   驱动，锁的获取/释放顺带提供“先发布字节、再发布前沿”的内存序。
/// - 链以一个空的自有哨兵段起始，保证任意时刻都存在可用的游标锚点。
pub struct BufferChain {
    pool: Arc<dyn BlockPool>,
    head: Arc<Segment>,
    tail: Arc<Segment>,
    pending: Option<Arc<Segment>>,
}

impl BufferChain {
    /// 以注入的块池建链；初始仅含空哨兵段。
    pub fn new(pool: Arc<dyn BlockPool>) -> Self {
        let sentinel = Segment::sentinel(Arc::clone(&pool));
        Self {
            pool,
            head: Arc::clone(&sentinel),
            tail: sentinel,
            pending: None,
        }
    }

    /// 当前写前沿：已发布字节的末尾位置。
    pub fn frontier(&self) -> Cursor {
        Cursor::new(Arc::clone(&self.tail), self.tail.write_end())
    }

    /// 暂存一个覆盖 `[ptr, ptr + len)` 的借用段，等待发布。
    ///
    /// # 安全性（Safety）
    /// - 调用方必须保证该区域在本链的下一次 `release` 完成之前持续有效且
    ///   不被写入。`rill-channel` 的写帧以闭包作用域与借用检查落实此契约，
    ///   除此之外不应存在其它调用路径。
    /// - 每个写帧至多暂存一个区域；上一个暂存段发布或释放前不得再次追加。
    pub unsafe fn append_borrowed(&mut self, ptr: *const u8, len: usize) {
        debug_assert!(
            self.pending.is_none(),
            "上一写帧的暂存段尚未发布或释放"
        );
        debug_assert!(len > 0, "空区域应在上层直接忽略");
        // SAFETY: 有效性契约由调用方承接（见上），段内部的解引用各自持锁校验。
        let segment = unsafe { Segment::new_borrowed(Arc::clone(&self.pool), ptr, len) };
        self.pending = Some(segment);
    }

    /// 发布暂存段：挂上链尾并推进写前沿。
    ///
    /// 返回 `true` 表示前沿确实前移（存在暂存段）；重复刷新为幂等空操作。
    pub fn flush_pending(&mut self) -> bool {
        let Some(segment) = self.pending.take() else {
            return false;
        };
        self.tail.link_next(Arc::clone(&segment));
        self.tail = segment;
        true
    }

    /// 摘取一份释放行走快照：丢弃未发布的暂存段，记录当前链头。
    ///
    /// 快照的 [`ReleaseWalk::run`] 可以在调用方的状态锁之外执行——行走只经
    /// 段级锁推进，不再回头触碰链结构，因此消费者即便正持有字节守卫并同时
    /// 调用确认路径也不会与释放互相等待。
    pub fn release_walk(&mut self) -> ReleaseWalk {
        self.pending = None;
        ReleaseWalk {
            head: Arc::clone(&self.head),
        }
    }

    /// 生产者释放点的同步入口，等价于 `release_walk().run(consumed)`。
    pub fn release(&mut self, consumed: &Cursor) -> Result<()> {
        self.release_walk().run(consumed)
    }

    /// 按新的 consumed 游标修剪链头。
    ///
    /// - consumed 之前的段整体摘除（普通访问下界抬到段末，存储随最后一个
    ///   `Arc` 释放归还块池）；
    /// - consumed 所在段把普通访问下界抬到 consumed 偏移，使“已确认消费”
    ///   的字节对仍然在手的旧视图确定性失效。
    pub fn trim(&mut self, consumed: &Cursor) {
        let target = consumed.normalized();
        while !Arc::ptr_eq(&self.head, target.segment()) {
            self.head.raise_floor(self.head.write_end());
            let Some(next) = self.head.next() else {
                debug_assert!(false, "consumed 游标必须位于链内");
                return;
            };
            self.head = next;
        }
        self.head.raise_floor(target.offset());
    }

    /// 读端拆除：整链作废并复位为空哨兵。
    ///
    /// 既有游标与视图此后的普通访问全部以 `use_after_release` 失败；
    /// 存储在各段最后一个 `Arc` 释放时归还块池。
    pub fn retire_all(&mut self) {
        self.pending = None;
        let mut cursor = Some(Arc::clone(&self.head));
        while let Some(segment) = cursor {
            segment.raise_floor(segment.write_end());
            cursor = segment.next();
        }
        let sentinel = Segment::sentinel(Arc::clone(&self.pool));
        self.head = Arc::clone(&sentinel);
        self.tail = sentinel;
    }
}

/// 生产者释放点的行走快照，见 [`BufferChain::release_walk`]。
///
/// # 逻辑解析（How）
/// - 自快照记录的链头起遍历：借用段的存活区间 `[live_from, write_end)` 拷入
///   池存储并就地改写为自有段。`live_from` 在 consumed 所在段取 consumed
///   偏移，其余段取提升基准；存活区间为空的段被改写为空自有壳，仅为维持
///   游标的节点身份，下一次修剪会将其摘除。
///
/// # 契约说明（What）
/// - 返回后行走覆盖的段中不存在任何借用表示，即便中途池租借失败（失败的段
///   被改写为空自有壳并整体作废，首个错误上报）；
/// - 被保留（pins > 0）的段在 `preserve` 时即已提升，此处自然跳过；
/// - `consumed` 应为快照时刻或其后的消费游标——并发的确认只会让它前移，
///   多拷贝几个已消费字节无碍正确性。
#[must_use = "释放行走必须执行，否则借用段将越过生产者写帧"]
pub struct ReleaseWalk {
    head: Arc<Segment>,
}

impl ReleaseWalk {
    /// 执行释放行走。
    pub fn run(self, consumed: &Cursor) -> Result<()> {
        let mut first_err = None;
        let mut cursor = Some(self.head);
        while let Some(segment) = cursor {
            if segment.is_borrowed() {
                let live_from = if Arc::ptr_eq(&segment, consumed.segment()) {
                    consumed.offset()
                } else {
                    segment.base()
                };
                if let Err(err) = segment.seal(live_from) {
                    first_err.get_or_insert(err);
                }
            }
            cursor = segment.next();
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl fmt::Debug for BufferChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = 0usize;
        let mut cursor = Some(Arc::clone(&self.head));
        while let Some(segment) = cursor {
            segments += 1;
            cursor = segment.next();
        }
        f.debug_struct("BufferChain")
            .field("segments", &segments)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
