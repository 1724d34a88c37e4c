use alloc::sync::Arc;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use rill_buffer::{Cursor, ReadableBuffer};
use rill_core::{CoreError, Result};

use crate::channel::Shared;
use crate::state::ChannelPhase;

/// 通道的消费者半部。
///
/// # 协议概要（What）
/// - [`read`](Self::read) 返回的 Future 在以下任一条件满足时恢复：
///   写前沿越过上一次的 examined 游标、写端已完成、或取消信号待处理；
/// - 每次成功（或取消）交付的读取都必须经 [`advance`](Self::advance) /
///   [`advance_to`](Self::advance_to) 确认后才能发起下一次读取，
///   违者以 `channel.read_without_advance` 失败；
/// - 半部不可克隆：单消费者纪律由所有权体系保证。
///
/// # 检视游标的意义（Why）
/// - 只确认 `consumed` 而把 `examined` 推到缓冲末尾，意味着“字节都看过了
///   但还不能消费”（例如还在等分隔符）：下一次读取只会在**更多**数据到来
///   时恢复，而不是在每次中间刷新上空转。
pub struct ChannelReader {
    shared: Arc<Shared>,
}

impl ChannelReader {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// 发起一次异步读取。
    ///
    /// 取消信号在进入时与挂起点各检查一次；取消交付恰好恢复一次，
    /// 其缓冲反映当前在途内容，且同样需要确认。
    pub fn read(&mut self) -> Read<'_> {
        Read {
            reader: self,
            done: false,
        }
    }

    /// 确认读取：`examined` 一并推进到 `consumed`。
    pub fn advance(&mut self, consumed: Cursor) -> Result<()> {
        let examined = consumed.clone();
        self.shared.advance(consumed, examined)
    }

    /// 以独立的 examined 游标确认读取。
    ///
    /// 要求 `consumed ≤ examined ≤ 本次缓冲末尾`，且 `consumed` 相对上次
    /// 单调不减；违反约束返回 `channel.invalid_advance`。
    pub fn advance_to(&mut self, consumed: Cursor, examined: Cursor) -> Result<()> {
        self.shared.advance(consumed, examined)
    }

    /// 拆除读端；之后写端的写入与刷新以 `channel.reader_completed` 失败，
    /// 携带的错误会作为该失败的底层原因呈现给生产者。
    pub fn complete(self, error: Option<CoreError>) {
        self.shared.complete_reader(error);
    }

    /// 当前协议相位，主要服务于诊断与契约测试。
    pub fn phase(&self) -> ChannelPhase {
        self.shared.phase()
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        self.shared.complete_reader(None);
    }
}

impl fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReader")
            .field("phase", &self.phase())
            .finish()
    }
}

/// 一次读取的交付结果。
#[derive(Debug)]
pub struct ReadResult {
    buffer: ReadableBuffer,
    is_completed: bool,
    is_cancelled: bool,
}

impl ReadResult {
    pub(crate) fn new(buffer: ReadableBuffer, is_completed: bool, is_cancelled: bool) -> Self {
        Self {
            buffer,
            is_completed,
            is_cancelled,
        }
    }

    /// 自 consumed 游标至写前沿的未确认字节视图。
    pub fn buffer(&self) -> &ReadableBuffer {
        &self.buffer
    }

    /// 消耗结果并取出缓冲视图。
    pub fn into_buffer(self) -> ReadableBuffer {
        self.buffer
    }

    /// 写端是否已完成。
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    /// 本次恢复是否由取消信号触发。
    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled
    }
}

/// [`ChannelReader::read`] 返回的读取 Future。
///
/// 手写 `poll` 而非依赖组合子：通道是单等待者模型，完成信号来自生产者
/// 刷新、写端完成或取消三者之一，由共享状态内的单个 waker 槽驱动。
pub struct Read<'a> {
    reader: &'a mut ChannelReader,
    done: bool,
}

impl Future for Read<'_> {
    type Output = Result<ReadResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        debug_assert!(!this.done, "读取 Future 完成后不应再被轮询");
        if this.done {
            return Poll::Pending;
        }
        let poll = this.reader.shared.poll_read(cx);
        if poll.is_ready() {
            this.done = true;
        }
        poll
    }
}

impl fmt::Debug for Read<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Read").field("done", &self.done).finish()
    }
}
