use alloc::sync::Arc;
use core::cmp::Ordering;
use core::fmt;

use rill_core::{CoreError, Result, codes};

use crate::segment::Segment;

/// 段链内的不透明位置：`(段引用, 段内偏移)`。
///
/// # 设计背景（Why）
/// - 读取确认协议（consumed/examined）与缓冲切片都以位置为货币，位置必须在
///   段被就地提升后继续有效，因此以 `Arc` 持有链节点本身而非索引。
/// - 段边界上同一逻辑位置存在两种写法：`(段, write_end)` 与 `(后继段, 入口)`。
///   相等性与距离计算前先做规范化，调用方无需关心自己拿到的是哪一种。
///
/// # 契约说明（What）
/// - `offset` 始终落在所属段的 `[base, write_end]` 闭区间内；
/// - `seek` 只进不退，越过当前已写入末尾时以 `cursor.out_of_range` 失败；
/// - 相等性为结构相等（规范化后段指针相同且偏移相同）；
/// - 顺序关系仅在同一条链内有定义，跨链比较返回 `None`。
///
/// # 设计取舍（Trade-offs）
/// - 距离与顺序通过沿 `next` 链行走求得：链在每次确认后被修剪，长度与
///   未确认的数据量同阶，线性行走在此规模下优于维护全局序号。
#[derive(Clone)]
pub struct Cursor {
    segment: Arc<Segment>,
    offset: usize,
}

impl Cursor {
    pub(crate) fn new(segment: Arc<Segment>, offset: usize) -> Self {
        debug_assert!(offset <= segment.write_end());
        Self { segment, offset }
    }

    pub(crate) fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// 返回规范化副本：位置落在段末且存在后继时，折算到后继段的入口。
    ///
    /// 规范化不改变逻辑位置，只统一表示，便于相等性判断与链头修剪。
    pub fn normalized(&self) -> Cursor {
        let mut segment = Arc::clone(&self.segment);
        let mut offset = self.offset;
        while offset == segment.write_end() {
            let Some(next) = segment.next() else {
                break;
            };
            offset = next.base();
            segment = next;
        }
        Cursor { segment, offset }
    }

    /// 前移 `delta` 字节，可跨段边界。
    ///
    /// # 契约说明（What）
    /// - 返回新的游标，原游标不变；
    /// - 前移越过链上已写入的末尾时返回 `cursor.out_of_range`。
    pub fn seek(&self, delta: usize) -> Result<Cursor> {
        let mut segment = Arc::clone(&self.segment);
        let mut offset = self.offset;
        let mut remaining = delta;
        loop {
            let in_segment = segment.write_end() - offset;
            if remaining <= in_segment {
                return Ok(Cursor {
                    offset: offset + remaining,
                    segment,
                });
            }
            remaining -= in_segment;
            let Some(next) = segment.next() else {
                return Err(CoreError::new(
                    codes::CURSOR_OUT_OF_RANGE,
                    "seek moved past the written end of the chain",
                ));
            };
            offset = next.base();
            segment = next;
        }
    }

    /// 求本游标到 `other` 的前向距离（字节数）。
    ///
    /// `other` 位于本游标之前或属于另一条链时返回 `cursor.out_of_range`。
    pub fn distance_to(&self, other: &Cursor) -> Result<usize> {
        let mut segment = Arc::clone(&self.segment);
        let mut offset = self.offset;
        let mut travelled = 0usize;
        loop {
            if Arc::ptr_eq(&segment, &other.segment) {
                return if other.offset >= offset {
                    Ok(travelled + (other.offset - offset))
                } else {
                    Err(CoreError::new(
                        codes::CURSOR_OUT_OF_RANGE,
                        "target cursor precedes this cursor",
                    ))
                };
            }
            travelled += segment.write_end() - offset;
            let Some(next) = segment.next() else {
                return Err(CoreError::new(
                    codes::CURSOR_OUT_OF_RANGE,
                    "cursors do not share a chain, or the target lies behind",
                ));
            };
            offset = next.base();
            segment = next;
        }
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.normalized();
        let rhs = other.normalized();
        Arc::ptr_eq(&lhs.segment, &rhs.segment) && lhs.offset == rhs.offset
    }
}

impl Eq for Cursor {}

impl PartialOrd for Cursor {
    /// 同链内的全序：沿链可达即为 `Less`/`Greater`；跨链返回 `None`。
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.distance_to(other).is_ok() {
            return Some(Ordering::Less);
        }
        if other.distance_to(self).is_ok() {
            return Some(Ordering::Greater);
        }
        None
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("segment", &Arc::as_ptr(&self.segment))
            .field("offset", &self.offset)
            .finish()
    }
}
