use alloc::sync::Arc;
use core::fmt;

use rill_core::{CoreError, Result, codes};

use crate::channel::Shared;

/// 通道的生产者半部：以“出借”的方式发布自有内存区域。
///
/// # 设计背景（Why）
/// - 无主缓冲协议的核心是零拷贝出借：生产者把自己拥有的内存区域临时交给
///   通道，消费者直接读取，通道仅在必要时（释放点仍有存活字节、或消费者
///   显式保留）才拷贝一次。
/// - 出借的生命周期用闭包作用域表达：`lend` 持有区域的共享借用贯穿整个
///   调用，借用检查器因此保证生产者在写帧结束前无法改写该内存；而释放点
///   在 `lend` 自身的函数体内执行（而非某个可被 `mem::forget` 绕开的守卫
///   析构），健全性不依赖调用方的任何配合。
///
/// # 使用方式（How）
/// ```rust
/// use rill_channel::unowned_channel;
///
/// let (mut writer, reader) = unowned_channel();
/// let mut scratch = *b"Hello ";
/// writer.lend(&scratch, |frame| frame.flush())??;
/// // lend 返回后区域即被收回：未消费的字节已提升进通道自有存储。
/// scratch.copy_from_slice(b"World!");
/// # drop(reader);
/// # Ok::<(), rill_core::CoreError>(())
/// ```
pub struct UnownedWriter {
    shared: Arc<Shared>,
}

impl UnownedWriter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// 出借一个内存区域，写帧在闭包内展开。
    ///
    /// # 逻辑解析（How）
    /// 1. 区域被登记为借用段（空区域直接忽略），消费者在闭包调用
    ///    [`WriteFrame::flush`] 之后即可零拷贝地观察它；
    /// 2. 闭包返回（或展开）后执行*生产者释放点*：链上每个借用段的存活
    ///    字节被提升进池存储，未发布的区域被丢弃——自此生产者可以任意
    ///    复用该内存；
    /// 3. 释放点的池租借失败会把受影响的段作废并上报首个错误，借用指针
    ///    在任何路径下都不会越过本次调用的边界。
    ///
    /// # 契约说明（What）
    /// - 每个写帧出借一个区域；闭包返回值原样透传；
    /// - 两端任一已完成时立即失败（`channel.writer_completed` /
    ///   `channel.reader_completed`）。
    pub fn lend<R>(
        &mut self,
        region: &[u8],
        body: impl FnOnce(&mut WriteFrame<'_>) -> R,
    ) -> Result<R> {
        {
            let mut st = self.shared.state.lock();
            st.check_writable()?;
            if !region.is_empty() {
                // SAFETY: `region` 的共享借用贯穿整个 `lend` 调用；下方的
                // 释放点（含 panic 展开路径上的 ReleaseGuard）在返回前清除
                // 链上所有借用表示，此后不存在任何指向该区域的指针。
                #[allow(unsafe_code)]
                unsafe {
                    st.chain.append_borrowed(region.as_ptr(), region.len())
                };
            }
            st.phase = st.phase.on_write();
        }
        let mut guard = ReleaseGuard {
            shared: &self.shared,
            armed: true,
        };
        let mut frame = WriteFrame {
            shared: &self.shared,
        };
        let output = body(&mut frame);
        guard.armed = false;
        self.shared.release_now()?;
        Ok(output)
    }

    /// 合并的写入+刷新便捷方法：出借区域并立即发布。
    pub fn write(&mut self, region: &[u8]) -> Result<()> {
        self.lend(region, |frame| frame.flush())?
    }

    /// 写端完成。`Some(error)` 使通道进入 Faulted 终态：读端在排空已缓冲
    /// 字节后持续收到 `channel.producer_fault`。
    pub fn complete(self, error: Option<CoreError>) {
        self.shared.complete_writer(error);
    }
}

impl Drop for UnownedWriter {
    fn drop(&mut self) {
        // 与主流通道实现一致：写端被丢弃等价于正常完成，避免读端永久挂起。
        self.shared.complete_writer(None);
    }
}

impl fmt::Debug for UnownedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnownedWriter").finish()
    }
}

/// 写帧句柄：在 [`UnownedWriter::lend`] 的闭包内驱动发布。
pub struct WriteFrame<'a> {
    shared: &'a Shared,
}

impl WriteFrame<'_> {
    /// 发布本帧出借的区域：段挂上链尾、写前沿推进、唤醒挂起的读端。
    ///
    /// 幂等：重复刷新是空操作。未刷新的区域在写帧结束时被整体丢弃。
    pub fn flush(&mut self) -> Result<()> {
        let waker = {
            let mut st = self.shared.state.lock();
            if st.reader_done {
                let mut err = CoreError::new(
                    codes::READER_COMPLETED,
                    "flush after the reader completed",
                );
                if let Some(cause) = &st.reader_fault {
                    err = err.with_cause(Arc::clone(cause));
                }
                return Err(err);
            }
            let moved = st.chain.flush_pending();
            st.phase = st.phase.on_flush();
            if moved { st.take_waker() } else { None }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }
}

impl fmt::Debug for WriteFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteFrame").finish()
    }
}

/// 展开保护：闭包 panic 时仍然执行释放点，绝不让借用指针活过写帧。
struct ReleaseGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // 展开路径无处上报错误；release 保证无论成败都清除借用表示。
            let _ = self.shared.release_now();
        }
    }
}
