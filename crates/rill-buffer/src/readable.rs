use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::iter::FusedIterator;

use rill_core::Result;

use crate::cursor::Cursor;
use crate::preserved::PreservedBuffer;
use crate::segment::{AccessMode, ByteSpan, Segment};

/// 跨越段链 `[start, end)` 的只读视图，读取结果的载体。
///
/// # 设计背景（Why）
/// - 对标 Tokio `bytes::Buf`、.NET `ReadOnlySequence` 等多段缓冲模型：消费者
///   以“观察-切片-确认”的节奏处理数据，视图自身绝不复制字节。
/// - 视图是值对象：克隆、切片共享同一批底层段；字节的有效性由段上的
///   下界水位与提升基准在访问时校验，而非由视图生命周期静态保证——
///   这正是“确定性失效”语义的来源。
///
/// # 契约说明（What）
/// - `is_empty ≡ start == end`（按规范化位置比较）；
/// - `first`/`segments` 的产出均为非空连续块（空缓冲的 `first` 除外）；
/// - `slice` 系列不复制数据，仅缩窄游标范围；
/// - `to_vec` 为一次性扁平化，失效区间会返回 `buffer.use_after_release`。
#[derive(Clone)]
pub struct ReadableBuffer {
    start: Cursor,
    end: Cursor,
    pinned: bool,
}

impl ReadableBuffer {
    /// 以一对游标建立普通视图。
    ///
    /// # 契约说明（What）
    /// - `start` 必须不晚于 `end` 且位于同一条链上；违反时返回
    ///   `cursor.out_of_range`，而不是静默构造一个长度为零的视图——
    ///   失效与误用都必须以确定性错误暴露。
    pub fn new(start: Cursor, end: Cursor) -> Result<Self> {
        start.distance_to(&end)?;
        Ok(Self {
            start,
            end,
            pinned: false,
        })
    }

    pub(crate) fn new_pinned(start: Cursor, end: Cursor) -> Self {
        Self {
            start,
            end,
            pinned: true,
        }
    }

    fn mode(&self) -> AccessMode {
        if self.pinned {
            AccessMode::Pinned
        } else {
            AccessMode::Plain
        }
    }

    /// 视图起点。
    pub fn start(&self) -> &Cursor {
        &self.start
    }

    /// 视图终点（不含）。
    pub fn end(&self) -> &Cursor {
        &self.end
    }

    /// 视图是否为空。
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 视图覆盖的字节数。
    pub fn len(&self) -> usize {
        // 构造与切片路径均已校验 start ≤ end 且同链，距离必然可求。
        self.start.distance_to(&self.end).unwrap_or(0)
    }

    /// 起始段上的首个连续块：至段末或视图终点（取先到者）。
    pub fn first(&self) -> SegmentView {
        let start = self.start.normalized();
        let to = if self.is_empty() {
            start.offset()
        } else if Arc::ptr_eq(start.segment(), self.end.segment()) {
            self.end.offset()
        } else {
            start.segment().write_end()
        };
        SegmentView {
            segment: Arc::clone(start.segment()),
            from: start.offset(),
            to,
            mode: self.mode(),
        }
    }

    /// 以两枚游标切出子视图，底层段原样共享。
    ///
    /// `from`/`to` 必须满足 `start ≤ from ≤ to ≤ end`，否则返回
    /// `cursor.out_of_range`。
    pub fn slice(&self, from: &Cursor, to: &Cursor) -> Result<ReadableBuffer> {
        self.start.distance_to(from)?;
        from.distance_to(to)?;
        to.distance_to(&self.end)?;
        Ok(Self {
            start: from.clone(),
            end: to.clone(),
            pinned: self.pinned,
        })
    }

    /// 自 `from` 起切出定长子视图。
    pub fn slice_len(&self, from: &Cursor, len: usize) -> Result<ReadableBuffer> {
        let to = from.seek(len)?;
        self.slice(from, &to)
    }

    /// 按链序迭代视图覆盖的连续块。
    pub fn segments(&self) -> SegmentIter {
        SegmentIter {
            cursor: self.start.clone(),
            end: self.end.clone(),
            mode: self.mode(),
        }
    }

    /// 一次性扁平化为 `Vec<u8>`。
    ///
    /// 跨安全边界或需要连续内存时使用；热路径应优先走 `first`/`segments`
    /// 的零拷贝访问。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len());
        for view in self.segments() {
            out.extend_from_slice(&view.bytes()?);
        }
        Ok(out)
    }

    /// 保留视图覆盖的范围，使其存活期越过生产者的写帧。
    ///
    /// # 逻辑解析（How）
    /// - 对范围触及的每个段：若仍为借用表示，先就地提升（存活字节拷入池
    ///   存储，链节点身份不变），随后保留计数加一；
    /// - 中途失败（如池耗尽）时回退已取得的保留计数，整体原子性以
    ///   “全有或全无”的保留结果呈现。
    ///
    /// # 契约说明（What）
    /// - 返回的 [`PreservedBuffer`] 基于可能已被替换表示的同一批段，
    ///   其视图在释放前始终产出保留时刻覆盖的字节；
    /// - 释放是强制义务，`Drop` 会兜底执行（幂等）。
    pub fn preserve(&self) -> Result<PreservedBuffer> {
        let mut pinned: Vec<Arc<Segment>> = Vec::new();
        for view in self.segments() {
            if let Err(err) = view.segment.promote_live() {
                for segment in &pinned {
                    segment.unpin();
                }
                return Err(err);
            }
            view.segment.pin();
            pinned.push(Arc::clone(&view.segment));
        }
        Ok(PreservedBuffer::new(
            ReadableBuffer::new_pinned(self.start.clone(), self.end.clone()),
            pinned,
        ))
    }
}

impl fmt::Debug for ReadableBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableBuffer")
            .field("len", &self.len())
            .field("pinned", &self.pinned)
            .finish()
    }
}

impl<'a> IntoIterator for &'a ReadableBuffer {
    type Item = SegmentView;
    type IntoIter = SegmentIter;

    fn into_iter(self) -> SegmentIter {
        self.segments()
    }
}

/// 单个段上的连续块视图。
///
/// - 字节访问经 [`SegmentView::bytes`] 返回短生命周期守卫，访问时校验
///   有效性；视图本身可以任意存放，失效后访问以确定性错误返回。
#[derive(Clone)]
pub struct SegmentView {
    pub(crate) segment: Arc<Segment>,
    from: usize,
    to: usize,
    mode: AccessMode,
}

impl SegmentView {
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// 取得字节守卫；区间已失效时返回 `buffer.use_after_release`。
    pub fn bytes(&self) -> Result<ByteSpan<'_>> {
        self.segment.span(self.from, self.to, self.mode)
    }

    /// 复制出视图覆盖的字节。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.bytes()?.to_vec())
    }
}

impl fmt::Debug for SegmentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentView")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("mode", &self.mode)
            .finish()
    }
}

/// [`ReadableBuffer::segments`] 的迭代器：按链序产出非空连续块。
pub struct SegmentIter {
    cursor: Cursor,
    end: Cursor,
    mode: AccessMode,
}

impl Iterator for SegmentIter {
    type Item = SegmentView;

    fn next(&mut self) -> Option<SegmentView> {
        if self.cursor == self.end {
            return None;
        }
        let cursor = self.cursor.normalized();
        let segment = Arc::clone(cursor.segment());
        let to = if Arc::ptr_eq(&segment, self.end.segment()) {
            self.end.offset()
        } else {
            segment.write_end()
        };
        debug_assert!(to > cursor.offset(), "规范化后块不应为空");
        let view = SegmentView {
            segment: Arc::clone(&segment),
            from: cursor.offset(),
            to,
            mode: self.mode,
        };
        self.cursor = Cursor::new(segment, to);
        Some(view)
    }
}

impl FusedIterator for SegmentIter {}
