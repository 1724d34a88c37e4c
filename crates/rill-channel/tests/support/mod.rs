//! 契约测试的最小轮询工具。
//!
//! # 设计背景（Why）
//! - 单线程场景下，读取 Future 的挂起/唤醒时序本身就是被测契约的一部分，
//!   交给运行时调度反而无法断言“何时被唤醒、唤醒了几次”；
//! - 因此提供手动轮询原语：`block_on` 用于同步完成的路径，`poll_once`
//!   搭配 [`WakeProbe`] 观察挂起与唤醒次数。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Wake, Waker};

/// 记录唤醒次数的探针 waker。
pub struct WakeProbe {
    wakes: AtomicUsize,
}

impl WakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            wakes: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    pub fn waker(self: &Arc<Self>) -> Waker {
        Waker::from(Arc::clone(self))
    }
}

impl Wake for WakeProbe {
    fn wake(self: Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }
}

/// 以给定 waker 轮询一次 `Unpin` Future。
pub fn poll_once<F>(future: &mut F, waker: &Waker) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(waker);
    Pin::new(future).poll(&mut cx)
}

/// 迷你 `block_on`：以空操作 waker 忙轮询直到完成。
///
/// 仅适用于依靠通道内部状态即可完成的 Future；若 Future 等待外部唤醒，
/// 调用方应改用 [`poll_once`] 显式驱动，否则这里会空转。
pub fn block_on<F: Future>(future: F) -> F::Output {
    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    let waker = Waker::from(Arc::new(NoopWaker));
    let mut cx = Context::from_waker(&waker);
    let mut future = Box::pin(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => break output,
            Poll::Pending => continue,
        }
    }
}
