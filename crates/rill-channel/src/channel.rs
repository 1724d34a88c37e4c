use alloc::borrow::ToOwned;
use alloc::sync::Arc;
use core::task::{Context, Poll, Waker};

use spin::Mutex;

use rill_buffer::{BufferChain, Cursor, ReadableBuffer, SlabBlockPool};
use rill_core::{BlockPool, Cancellation, CoreError, Result, codes};

use crate::reader::{ChannelReader, ReadResult};
use crate::state::ChannelPhase;
use crate::writer::UnownedWriter;

/// ReadWithoutAdvance 的对外消息，属于稳定契约的一部分。
const READ_WITHOUT_ADVANCE_MESSAGE: &str =
    "Cannot Read until the previous read has been acknowledged by calling Advance";

/// 读写两端共享的通道本体。
///
/// # 并发模型（Why/How）
/// - 单生产者、单消费者：两个半部各自非 `Clone`，并发纪律由所有权体系
///   静态保证；生产者与消费者可运行在不同线程的异步任务上。
/// - 全部协议状态置于一把自旋互斥锁之下；锁的获取/释放即是
///   “先发布字节、再发布写前沿”所需的 release/acquire 内存序。
/// - 读端是唯一的等待者：挂起时在状态槽与取消令牌上各登记一次 waker，
///   刷新、完成与取消三类事件都能将其唤醒，无需等待队列。
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) cancellation: Cancellation,
}

pub(crate) struct State {
    pub(crate) chain: BufferChain,
    pub(crate) phase: ChannelPhase,
    /// 消费游标：此前的字节承诺不再读取，内存可以回收。
    pub(crate) consumed: Cursor,
    /// 检视游标：读端已经看过的位置，决定下一次读取何时重新武装。
    pub(crate) examined: Cursor,
    /// 最近一次交付的缓冲末尾，`advance` 据此校验游标上界。
    pub(crate) pending_read_end: Option<Cursor>,
    pub(crate) reader_waker: Option<Waker>,
    pub(crate) fault: Option<Arc<CoreError>>,
    pub(crate) reader_fault: Option<Arc<CoreError>>,
    pub(crate) writer_done: bool,
    pub(crate) reader_done: bool,
}

impl State {
    fn new(pool: Arc<dyn BlockPool>) -> Self {
        let chain = BufferChain::new(pool);
        let origin = chain.frontier();
        Self {
            chain,
            phase: ChannelPhase::Idle,
            consumed: origin.clone(),
            examined: origin,
            pending_read_end: None,
            reader_waker: None,
            fault: None,
            reader_fault: None,
            writer_done: false,
            reader_done: false,
        }
    }

    pub(crate) fn take_waker(&mut self) -> Option<Waker> {
        self.reader_waker.take()
    }

    /// 写入前置校验：两端任一完成即拒绝，错误码区分责任方。
    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.reader_done {
            let mut err = CoreError::new(
                codes::READER_COMPLETED,
                "reader side has been completed",
            );
            if let Some(cause) = &self.reader_fault {
                err = err.with_cause(Arc::clone(cause));
            }
            return Err(err);
        }
        if self.writer_done {
            return Err(CoreError::new(
                codes::WRITER_COMPLETED,
                "writer side has been completed",
            ));
        }
        Ok(())
    }

    /// 交付一次读取结果：缓冲范围始终是 `[consumed, frontier)`。
    ///
    /// 先构造视图、后改写协议状态：若游标校验意外失败，通道不会停留在
    /// 无人确认的 `WaitingForAdvance` 相位上。
    fn deliver(&mut self, cancelled: bool) -> Result<ReadResult> {
        let start = self.consumed.normalized();
        let end = self.chain.frontier();
        let buffer = ReadableBuffer::new(start, end.clone())?;
        self.pending_read_end = Some(end);
        self.reader_waker = None;
        self.phase = ChannelPhase::WaitingForAdvance;
        Ok(ReadResult::new(buffer, self.writer_done, cancelled))
    }
}

impl Shared {
    /// 读取武装规则（examined 规则）的唯一实现点。
    ///
    /// 恢复条件依次为：协议违规（未确认的上一次读取）、取消信号、
    /// 故障（缓冲排空后）、越过 examined 的新字节、写端完成；
    /// 均不满足时登记 waker 挂起。取消在登记 waker 之后复查一次，
    /// 封死 register 与 cancel 之间的窗口。
    pub(crate) fn poll_read(&self, cx: &mut Context<'_>) -> Poll<Result<ReadResult>> {
        let mut st = self.state.lock();
        if st.reader_done {
            return Poll::Ready(Err(CoreError::new(
                codes::READER_COMPLETED,
                "read after the reader completed",
            )));
        }
        if matches!(st.phase, ChannelPhase::WaitingForAdvance) {
            return Poll::Ready(Err(CoreError::new(
                codes::READ_WITHOUT_ADVANCE,
                READ_WITHOUT_ADVANCE_MESSAGE,
            )));
        }
        if self.cancellation.consume() {
            return Poll::Ready(st.deliver(true));
        }
        let frontier = st.chain.frontier();
        let has_unread = st.consumed != frontier;
        if let Some(fault) = &st.fault {
            if !has_unread {
                let err = surface_fault(fault);
                st.phase = ChannelPhase::Faulted;
                return Poll::Ready(Err(err));
            }
        }
        let has_new = st.examined != frontier;
        if has_new || st.writer_done {
            return Poll::Ready(st.deliver(false));
        }
        match &st.reader_waker {
            Some(existing) if existing.will_wake(cx.waker()) => {}
            _ => st.reader_waker = Some(cx.waker().clone()),
        }
        self.cancellation.register(cx.waker());
        st.phase = ChannelPhase::Reading;
        if self.cancellation.consume() {
            st.reader_waker = None;
            return Poll::Ready(st.deliver(true));
        }
        Poll::Pending
    }

    /// 确认一次读取：校验游标次序，修剪链头并重新武装。
    pub(crate) fn advance(&self, consumed: Cursor, examined: Cursor) -> Result<()> {
        let mut st = self.state.lock();
        if st.reader_done {
            return Err(CoreError::new(
                codes::READER_COMPLETED,
                "advance after the reader completed",
            ));
        }
        if !matches!(st.phase, ChannelPhase::WaitingForAdvance) {
            return Err(CoreError::new(
                codes::INVALID_ADVANCE,
                "no outstanding read to acknowledge",
            ));
        }
        let Some(end) = st.pending_read_end.clone() else {
            return Err(CoreError::new(
                codes::INVALID_ADVANCE,
                "no outstanding read to acknowledge",
            ));
        };
        st.consumed.distance_to(&consumed).map_err(|err| {
            CoreError::new(
                codes::INVALID_ADVANCE,
                "consumed cursor moved backwards or off this chain",
            )
            .with_cause(err)
        })?;
        consumed.distance_to(&examined).map_err(|err| {
            CoreError::new(
                codes::INVALID_ADVANCE,
                "examined cursor precedes the consumed cursor",
            )
            .with_cause(err)
        })?;
        examined.distance_to(&end).map_err(|err| {
            CoreError::new(
                codes::INVALID_ADVANCE,
                "examined cursor lies beyond the delivered buffer",
            )
            .with_cause(err)
        })?;

        let consumed = consumed.normalized();
        st.chain.trim(&consumed);
        st.consumed = consumed;
        st.examined = examined.normalized();
        st.pending_read_end = None;

        let frontier = st.chain.frontier();
        let drained = st.consumed == frontier;
        st.phase = if st.fault.is_some() {
            if drained {
                ChannelPhase::Faulted
            } else {
                ChannelPhase::Readable
            }
        } else if st.writer_done && drained {
            ChannelPhase::Completed
        } else if st.examined != frontier {
            ChannelPhase::Readable
        } else {
            ChannelPhase::Idle
        };
        Ok(())
    }

    /// 生产者释放点：消除链上的借用表示。
    ///
    /// 行走在状态锁之外执行：段级写锁可能需要等待消费者归还字节守卫，
    /// 若此时仍持有状态锁，消费者的确认路径将与释放互相等待。
    pub(crate) fn release_now(&self) -> Result<()> {
        let (walk, consumed) = {
            let mut st = self.state.lock();
            (st.chain.release_walk(), st.consumed.clone())
        };
        walk.run(&consumed)
    }

    /// 写端完成（可携带错误）；幂等。
    pub(crate) fn complete_writer(&self, error: Option<CoreError>) {
        let waker = {
            let mut st = self.state.lock();
            if st.writer_done || st.reader_done {
                return;
            }
            st.writer_done = true;
            if let Some(err) = error {
                st.fault = Some(Arc::new(err));
                // 未确认的交付仍可被 advance：终态在排空后由读取/确认路径落定。
                if !matches!(st.phase, ChannelPhase::WaitingForAdvance) {
                    st.phase = ChannelPhase::Faulted;
                }
            }
            st.take_waker()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// 读端拆除；幂等。之后的写入以 `channel.reader_completed` 失败，
    /// 读端自身的后续调用同样如此。
    pub(crate) fn complete_reader(&self, error: Option<CoreError>) {
        let mut st = self.state.lock();
        if st.reader_done {
            return;
        }
        st.reader_done = true;
        st.reader_fault = error.map(Arc::new);
        st.reader_waker = None;
        st.pending_read_end = None;
        st.chain.retire_all();
    }

    pub(crate) fn phase(&self) -> ChannelPhase {
        self.state.lock().phase
    }
}

/// 把存储的写端故障包装为对外的 `channel.producer_fault` 错误。
fn surface_fault(fault: &Arc<CoreError>) -> CoreError {
    CoreError::new(codes::PRODUCER_FAULT, fault.message().to_owned())
        .with_cause(Arc::clone(fault))
}

/// 通道构造器：注入块池与取消令牌，未指定时使用默认实现。
///
/// # 使用方式（How）
/// ```rust
/// use rill_channel::ChannelBuilder;
/// use rill_core::Cancellation;
///
/// let token = Cancellation::new();
/// let (writer, reader) = ChannelBuilder::new()
///     .cancellation(token.child())
///     .build();
/// # let _ = (writer, reader, token);
/// ```
#[derive(Default)]
pub struct ChannelBuilder {
    pool: Option<Arc<dyn BlockPool>>,
    cancellation: Option<Cancellation>,
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入自有段存储所用的块池。
    pub fn pool(mut self, pool: Arc<dyn BlockPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// 注入取消令牌；读端的挂起点会响应其 `cancel`。
    pub fn cancellation(mut self, token: Cancellation) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// 建立通道，返回（写端，读端）。
    pub fn build(self) -> (UnownedWriter, ChannelReader) {
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(SlabBlockPool::new()) as Arc<dyn BlockPool>);
        let cancellation = self.cancellation.unwrap_or_default();
        let shared = Arc::new(Shared {
            state: Mutex::new(State::new(pool)),
            cancellation,
        });
        (
            UnownedWriter::new(Arc::clone(&shared)),
            ChannelReader::new(shared),
        )
    }
}

/// 以全默认配置建立通道。
pub fn unowned_channel() -> (UnownedWriter, ChannelReader) {
    ChannelBuilder::new().build()
}
