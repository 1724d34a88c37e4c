use alloc::sync::Arc;
use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use spin::{Mutex, RwLock, RwLockReadGuard};

use rill_core::{BlockPool, CoreError, Result, codes};

/// 段链中的一个连续字节区域。
///
/// # 角色定位（Why）
/// - 借用段（[`SegmentRepr::Borrowed`]）零拷贝地引用生产者仍然拥有的内存；
///   自有段（[`SegmentRepr::Owned`]）持有从块池租借的拷贝。
/// - 提升（Borrowed → Owned）在原节点上就地改写表示，`Arc` 身份不变，
///   因此指向该段的所有游标在提升前后保持有效。
///
/// # 结构设计（How）
/// - `write_end`：区域内字节总数，追加后不再变化；
/// - `floor`：普通访问的有效下界——consumed 游标推进或段被修剪时单调抬升，
///   低于它的区间访问以 `buffer.use_after_release` 确定性失败；
/// - `pins`：保留（Preserve）引用计数，保留路径的访问不受 `floor` 约束；
/// - `state`：表示与提升基准 `base`，读写锁保证借用内存的访问
///   与生产者释放互斥；`next` 单独用自旋锁保护，使挂链（flush）不会被
///   持有中的只读守卫阻塞。
///
/// # 契约说明（What）
/// - 借用段的裸指针仅在生产者写帧存续期间被解引用；释放点会在写锁下
///   将所有借用表示改写为自有表示，此后链上不再存在指向外部内存的指针。
/// - 自有存储在段的最终析构时归还块池（延迟回收，见 `Drop` 实现）。
pub(crate) struct Segment {
    pool: Arc<dyn BlockPool>,
    write_end: usize,
    floor: AtomicUsize,
    pins: AtomicUsize,
    state: RwLock<SegmentState>,
    next: Mutex<Option<Arc<Segment>>>,
}

pub(crate) struct SegmentState {
    repr: SegmentRepr,
    /// 提升基准：自有存储对应区域 `[base, write_end)`，低于 `base` 的字节
    /// 已随释放点丢弃，访问必须失败。
    base: usize,
}

enum SegmentRepr {
    Borrowed(RawRegion),
    Owned(BytesMut),
}

/// 指向生产者内存区域的裸指针句柄，长度由所属段的 `write_end` 给出。
struct RawRegion {
    ptr: *const u8,
}

// SAFETY: `RawRegion` 只是地址的搬运工，解引用只发生在两处：
// 1. `ByteSpan::deref`，持有段状态的读锁；
// 2. 提升拷贝，持有段状态的写锁。
// 生产者释放点在归还控制权之前同样以写锁改写表示，因此任何线程都不可能在
// 区域失效后仍通过本句柄读到它；跨线程传递仅传递地址本身。
unsafe impl Send for RawRegion {}
unsafe impl Sync for RawRegion {}

/// 数据访问路径的权限档位。
///
/// - `Plain`：普通读取视图，受 `floor` 下界约束；
/// - `Pinned`：经由 [`crate::PreservedBuffer`] 的访问，保留期内不受
///   consumed 推进影响（这正是保留语义的意义）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AccessMode {
    Plain,
    Pinned,
}

impl Segment {
    /// 以借用表示建立新段。
    ///
    /// # 安全性（Safety）
    /// - 调用方必须保证 `[ptr, ptr + len)` 在本段被 `seal` 之前持续有效
    ///   且不被写入；该前置条件由 `rill-channel` 的写帧作用域保证。
    pub(crate) unsafe fn new_borrowed(
        pool: Arc<dyn BlockPool>,
        ptr: *const u8,
        len: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            write_end: len,
            floor: AtomicUsize::new(0),
            pins: AtomicUsize::new(0),
            state: RwLock::new(SegmentState {
                repr: SegmentRepr::Borrowed(RawRegion { ptr }),
                base: 0,
            }),
            next: Mutex::new(None),
        })
    }

    /// 建立空的自有哨兵段，用作链的初始节点。
    pub(crate) fn sentinel(pool: Arc<dyn BlockPool>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            write_end: 0,
            floor: AtomicUsize::new(0),
            pins: AtomicUsize::new(0),
            state: RwLock::new(SegmentState {
                repr: SegmentRepr::Owned(BytesMut::new()),
                base: 0,
            }),
            next: Mutex::new(None),
        })
    }

    pub(crate) fn write_end(&self) -> usize {
        self.write_end
    }

    pub(crate) fn base(&self) -> usize {
        self.state.read().base
    }

    pub(crate) fn floor(&self) -> usize {
        self.floor.load(Ordering::Acquire)
    }

    /// 单调抬升普通访问下界。
    pub(crate) fn raise_floor(&self, to: usize) {
        self.floor.fetch_max(to, Ordering::AcqRel);
    }

    pub(crate) fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) {
        let prev = self.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin 次数不应超过 pin 次数");
    }

    pub(crate) fn pins(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }

    pub(crate) fn next(&self) -> Option<Arc<Segment>> {
        self.next.lock().clone()
    }

    /// 将后继段挂入链中；每个段至多挂链一次。
    pub(crate) fn link_next(&self, next: Arc<Segment>) {
        let mut slot = self.next.lock();
        debug_assert!(slot.is_none(), "段的后继只能设置一次");
        *slot = Some(next);
    }

    pub(crate) fn is_borrowed(&self) -> bool {
        matches!(self.state.read().repr, SegmentRepr::Borrowed(_))
    }

    /// 保留路径的就地提升：把 `[base, write_end)` 的存活字节拷入池存储。
    ///
    /// 失败时段保持借用表示不变——保留发生在生产者写帧内部，区域仍然有效，
    /// 调用方可以把错误原样上抛。
    pub(crate) fn promote_live(&self) -> Result<()> {
        let mut state = self.state.write();
        let from = state.base;
        Self::promote_locked(&self.pool, self.write_end, &mut state, from)
    }

    /// 释放点的就地提升：拷贝 `[live_from, write_end)` 并把 `base` 抬到
    /// `live_from`。
    ///
    /// # 契约说明（What）
    /// - 无论成败，返回后表示必为自有：池租借失败时改写为空自有段并把
    ///   `floor` 抬到末尾（数据作废但访问保持确定性失败），错误照常上报。
    ///   借用指针绝不允许在释放点之后残留。
    pub(crate) fn seal(&self, live_from: usize) -> Result<()> {
        let mut state = self.state.write();
        debug_assert_eq!(
            self.pins(),
            0,
            "被保留的段应在 preserve 时即已提升为自有段"
        );
        match Self::promote_locked(&self.pool, self.write_end, &mut state, live_from) {
            Ok(()) => Ok(()),
            Err(err) => {
                if matches!(state.repr, SegmentRepr::Borrowed(_)) {
                    state.base = self.write_end;
                    state.repr = SegmentRepr::Owned(BytesMut::new());
                }
                drop(state);
                self.raise_floor(self.write_end);
                Err(err)
            }
        }
    }

    fn promote_locked(
        pool: &Arc<dyn BlockPool>,
        write_end: usize,
        state: &mut SegmentState,
        live_from: usize,
    ) -> Result<()> {
        let SegmentRepr::Borrowed(region) = &state.repr else {
            return Ok(());
        };
        debug_assert!(live_from >= state.base && live_from <= write_end);
        let len = write_end - live_from;
        let mut storage = if len == 0 {
            BytesMut::new()
        } else {
            pool.acquire(len)?
        };
        if len > 0 {
            // SAFETY: 持有写锁，生产者释放点尚未越过本段，区域仍然有效；
            // 区间 [live_from, write_end) 落在追加时登记的长度之内。
            let src = unsafe { core::slice::from_raw_parts(region.ptr.add(live_from), len) };
            storage.extend_from_slice(src);
        }
        state.base = live_from;
        state.repr = SegmentRepr::Owned(storage);
        Ok(())
    }

    /// 取得 `[from, to)` 区间的只读守卫。
    ///
    /// # 契约说明（What）
    /// - 空区间恒可取得（无需任何校验）；
    /// - `Plain` 档位要求 `from` 不低于 `floor`，否则视为访问已失效数据；
    /// - 任何档位都要求 `from` 不低于 `base`——低于提升基准的字节已随
    ///   释放点丢弃；
    /// - 守卫存续期间持有段状态读锁，生产者释放与提升会等待其归还，
    ///   因此借用内存的读取绝不与区域失效竞争。调用方不应跨挂起点持有守卫。
    pub(crate) fn span(&self, from: usize, to: usize, mode: AccessMode) -> Result<ByteSpan<'_>> {
        debug_assert!(from <= to && to <= self.write_end);
        if from == to {
            return Ok(ByteSpan {
                guard: None,
                from,
                to,
            });
        }
        if mode == AccessMode::Plain && from < self.floor() {
            return Err(CoreError::new(
                codes::USE_AFTER_RELEASE,
                "view reaches below the consumed cursor",
            ));
        }
        let guard = self.state.read();
        if from < guard.base {
            return Err(CoreError::new(
                codes::USE_AFTER_RELEASE,
                "view reaches into bytes dropped at producer release",
            ));
        }
        Ok(ByteSpan {
            guard: Some(guard),
            from,
            to,
        })
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // 自有存储走延迟回收：最后一个 Arc（游标、视图或保留句柄）释放时
        // 才归还块池，避免修剪路径与持有中的只读守卫争抢写锁。
        let state = self.state.get_mut();
        if let SegmentRepr::Owned(storage) = &mut state.repr {
            let block = core::mem::take(storage);
            if block.capacity() > 0 {
                self.pool.reclaim(block);
            }
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("write_end", &self.write_end)
            .field("floor", &self.floor())
            .field("pins", &self.pins())
            .field("borrowed", &self.is_borrowed())
            .finish()
    }
}

/// 区间只读守卫：解引用为 `[u8]`，存续期间阻止所属段被提升或释放。
///
/// - 对自有段返回池存储中的切片；对借用段在锁保护下解引用生产者内存；
/// - 守卫应在当前处理步骤内用完即弃，不要跨 `await` 持有，否则会延迟
///   生产者的释放点。
pub struct ByteSpan<'a> {
    guard: Option<RwLockReadGuard<'a, SegmentState>>,
    from: usize,
    to: usize,
}

impl ByteSpan<'_> {
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

impl Deref for ByteSpan<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        let Some(guard) = &self.guard else {
            return &[];
        };
        match &guard.repr {
            SegmentRepr::Owned(storage) => &storage[self.from - guard.base..self.to - guard.base],
            SegmentRepr::Borrowed(region) => {
                // SAFETY: 读锁在手，释放点的写锁改写必然排在本守卫归还之后，
                // 区域在此期间保持有效；区间已在构造时校验。
                unsafe {
                    core::slice::from_raw_parts(region.ptr.add(self.from), self.to - self.from)
                }
            }
        }
    }
}

impl AsRef<[u8]> for ByteSpan<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for ByteSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSpan")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}
