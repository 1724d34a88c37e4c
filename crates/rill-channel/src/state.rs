/// 通道读写协议的状态机相位。
///
/// # 状态语义（What）
/// - `Idle`：无在途写入，examined 已追平写前沿，读端若到来将挂起；
/// - `WriteInProgress`：生产者已追加借用段、尚未刷新发布；
/// - `Readable`：存在越过 examined 的已发布字节，读取可立即交付;
/// - `Reading`：读 Future 已挂起等待唤醒；
/// - `WaitingForAdvance`：一次读取已交付、尚未经 `advance` 确认，
///   在此期间再次读取是协议违规；
/// - `Completed`：写端正常完成且数据全部确认消费；
/// - `Faulted`：写端以错误完成，终态，后续读取持续上报存储的错误。
///
/// # 转换来源（How）
/// - 写路径经 [`on_write`](Self::on_write) / [`on_flush`](Self::on_flush)
///   推进；读交付与确认在通道状态锁内直接赋值；
/// - 生产者释放点与相位正交：它只改写段表示，不参与相位转换。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelPhase {
    Idle,
    WriteInProgress,
    Readable,
    Reading,
    WaitingForAdvance,
    Completed,
    Faulted,
}

impl ChannelPhase {
    pub(crate) fn on_write(self) -> Self {
        match self {
            ChannelPhase::Idle | ChannelPhase::Readable => ChannelPhase::WriteInProgress,
            other => other,
        }
    }

    pub(crate) fn on_flush(self) -> Self {
        match self {
            ChannelPhase::WriteInProgress => ChannelPhase::Readable,
            other => other,
        }
    }

    /// 终态判定：`Faulted` 不再离开。
    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelPhase::Faulted)
    }
}
