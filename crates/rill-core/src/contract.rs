use alloc::sync::Arc;
use core::task::Waker;

use spin::Mutex;

//
// 教案级说明：为了让 Loom 在模型检查阶段能够捕获原子操作的所有调度交错，
// 当启用 `--cfg loom` 时切换到它提供的原子类型；`Arc` 保持标准实现以维持
// `Clone` 语义与 API 契约不变。
#[cfg(not(any(loom, rill_loom)))]
use core::sync::atomic::{AtomicBool, Ordering};
#[cfg(any(loom, rill_loom))]
use loom::sync::atomic::{AtomicBool, Ordering};

/// 取消原语，统一表达通道的可中断性契约。
///
/// # 设计背景（Why）
/// - 读端唯一的挂起点是异步读取；外部若要打断一次长时间等待，需要一个既能
///   标记状态、又能唤醒挂起任务的轻量令牌。
/// - 传统 Future 取消机制在 `no_std` 环境下缺乏统一接口，因此以原子位加单一
///   waker 槽位提供最小可行解：本通道的读端只有一个等待者，无需唤醒队列。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享；
/// - `cancel` 在置位后唤醒已登记的读端 waker，首次成功置位时返回 `true`；
/// - `consume` 以 `swap(false)` 一次性取走取消信号——读取路径交付
///   `is_cancelled` 结果后令牌即回到未取消状态，需再次 `cancel` 才会重新触发；
/// - `child` 生成共享同一原子位的派生实例，便于在生产者与消费者之间传播。
///
/// # 契约说明（What）
/// - **前置条件**：构造时无需额外参数，默认处于“未取消”状态；
/// - **后置条件**：`cancel` 返回后，置位结果全局可见，且至多唤醒一个等待者；
/// - 同一时刻只支持一个登记的 waker，后登记者覆盖先登记者。
///
/// # 设计取舍（Trade-offs）
/// - 未提供多播回调注册接口，避免在 `no_std` 下引入调度复杂度；
/// - 消费式语义（触发一次即回落）是读取协议的要求，与常驻型取消令牌不同，
///   调用方若需要“取消后永久拒绝”，应在自身状态中记录。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    flag: AtomicBool,
    waiter: Mutex<Option<Waker>>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                flag: AtomicBool::new(false),
                waiter: Mutex::new(None),
            }),
        }
    }

    /// 查询当前是否存在未被消费的取消信号。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将令牌标记为取消，并唤醒已登记的等待者。
    ///
    /// 返回 `true` 表示本次调用首次触发取消；返回 `false` 表示此前已处于取消
    /// 状态（信号尚未被消费）。
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if let Some(waker) = self.inner.waiter.lock().take() {
            waker.wake();
        }
        first
    }

    /// 一次性取走取消信号。
    ///
    /// # 契约说明（What）
    /// - 返回 `true` 时信号被本次调用消费，令牌回到未取消状态；
    /// - 读取路径在交付 `is_cancelled` 结果前调用本方法，保证“取消恰好触发
    ///   一次读取恢复”的协议语义。
    pub fn consume(&self) -> bool {
        self.inner.flag.swap(false, Ordering::AcqRel)
    }

    /// 登记待唤醒的 waker；同一 waker 重复登记时跳过克隆。
    pub fn register(&self, waker: &Waker) {
        let mut slot = self.inner.waiter.lock();
        if slot
            .as_ref()
            .is_some_and(|existing| existing.will_wake(waker))
        {
            return;
        }
        *slot = Some(waker.clone());
    }

    /// 派生共享同一原子位的子令牌，用于跨模块传播取消语义。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::task::Wake;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWaker {
        wakes: AtomicUsize,
    }

    impl CountingWaker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                wakes: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.wakes.load(Ordering::SeqCst)
        }
    }

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.wakes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// - **意图 (Why)**：验证首次取消返回 `true`，重复取消在信号未消费前返回 `false`。
    #[test]
    fn cancel_reports_first_transition() {
        let token = Cancellation::new();
        assert!(token.cancel(), "首次取消应返回 true");
        assert!(!token.cancel(), "信号未消费前的重复取消应返回 false");
        assert!(token.is_cancelled());
    }

    /// - **意图 (Why)**：消费式语义是读取协议的核心——触发一次后令牌必须回落，
    ///   再次取消才会重新生效。
    #[test]
    fn consume_rearms_the_token() {
        let token = Cancellation::new();
        token.cancel();
        assert!(token.consume(), "应消费到第一次取消");
        assert!(!token.is_cancelled(), "消费后令牌应回到未取消状态");
        assert!(!token.consume(), "信号已被取走，再次消费应为空");
        assert!(token.cancel(), "重新取消应再次视为首次触发");
    }

    /// - **意图 (Why)**：`cancel` 必须唤醒已登记的等待者，且每次置位至多唤醒一次。
    /// - **实现说明 (How)**：通过 `alloc::task::Wake` 构造计数 waker，绕开
    ///   `RawWaker` 所需的 unsafe。
    #[test]
    fn cancel_wakes_registered_waiter_once() {
        let token = Cancellation::new();
        let probe = CountingWaker::new();
        token.register(&Waker::from(Arc::clone(&probe)));
        token.cancel();
        assert_eq!(probe.count(), 1, "置位后应唤醒登记的等待者一次");
        token.cancel();
        assert_eq!(probe.count(), 1, "waker 已被取走，重复取消不应再唤醒");
    }

    /// - **意图 (Why)**：子令牌与父令牌共享同一原子位，任一侧取消全局可见。
    #[test]
    fn child_shares_the_same_flag() {
        let token = Cancellation::new();
        let child = token.child();
        child.cancel();
        assert!(token.is_cancelled());
        assert!(token.consume());
        assert!(!child.is_cancelled());
    }
}
