use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use rill_core::{CoreError, Result, codes};

use crate::readable::ReadableBuffer;
use crate::segment::Segment;

/// 保留句柄：把一段缓冲范围的存活期延长到生产者写帧之外。
///
/// # 设计背景（Why）
/// - 借用段的内存只在生产者写帧内有效；消费者若需要让数据活得更久，
///   唯一合法途径就是保留——创建时相关段已提升为自有表示并取得保留计数，
///   之后无论生产者如何复用原内存，句柄读到的都是保留时刻的字节。
///
/// # 契约说明（What）
/// - `buffer()` 在释放后返回 `buffer.use_after_release`，释放前返回的视图
///   始终产出保留时刻覆盖的字节；
/// - 释放是强制义务：显式调用 [`release`](Self::release) 或依赖 `Drop` 兜底，
///   两者幂等；泄漏句柄只会泄漏对应存储，不会破坏通道本身；
/// - 同一段可被多个句柄保留，存储在最后一份保留归还后才可回收。
pub struct PreservedBuffer {
    buffer: ReadableBuffer,
    pinned: Vec<Arc<Segment>>,
    released: bool,
}

impl PreservedBuffer {
    pub(crate) fn new(buffer: ReadableBuffer, pinned: Vec<Arc<Segment>>) -> Self {
        Self {
            buffer,
            pinned,
            released: false,
        }
    }

    /// 取得保留范围的视图；句柄已释放时返回 `buffer.use_after_release`。
    pub fn buffer(&self) -> Result<&ReadableBuffer> {
        if self.released {
            return Err(CoreError::new(
                codes::USE_AFTER_RELEASE,
                "preserved buffer accessed after release",
            ));
        }
        Ok(&self.buffer)
    }

    /// 归还全部保留计数；幂等。
    ///
    /// 释放后 [`buffer`](Self::buffer) 以 `buffer.use_after_release` 失败；
    /// 未显式调用时 `Drop` 兜底执行，保证所有退出路径都完成归还。
    pub fn release(&mut self) {
        self.release_in_place();
    }

    fn release_in_place(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for segment in self.pinned.drain(..) {
            segment.unpin();
        }
    }
}

impl Drop for PreservedBuffer {
    fn drop(&mut self) {
        self.release_in_place();
    }
}

impl fmt::Debug for PreservedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreservedBuffer")
            .field("released", &self.released)
            .field("segments", &self.pinned.len())
            .finish()
    }
}
