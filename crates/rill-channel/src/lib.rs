#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

//! `rill-channel`：无主缓冲可读通道（Unowned-Buffer Readable Channel）。
//!
//! # 模块定位（Why）
//! - 单生产者、单消费者的异步字节管道：生产者以“出借”的方式发布自己拥有的
//!   内存区域，消费者零拷贝地读取；只有在生产者释放点仍有存活字节、或消费者
//!   显式保留（Preserve）时才发生一次拷贝。
//! - 读取确认采用 examined/consumed 双游标协议：`consumed` 决定哪些内存可以
//!   回收，`examined` 决定下一次读取何时重新武装——看过但未消费的字节不会在
//!   每次中间刷新上反复唤醒读端。
//!
//! # 读写节奏（How）
//! - 写端：[`UnownedWriter::lend`] 展开一个写帧，[`WriteFrame::flush`] 发布
//!   区域；写帧结束即生产者释放点，链上的借用表示被整体消除；
//! - 读端：[`ChannelReader::read`] 挂起直到出现越过 examined 的新字节、写端
//!   完成或取消信号；交付的 [`ReadResult`] 必须经 `advance` 确认；
//! - 任何对已失效数据的访问（生产者释放、consumed 推进、保留句柄释放）都以
//!   稳定错误码 `buffer.use_after_release` 确定性失败。
//!
//! # 错误与取消（What）
//! - 协议违规与故障经 [`rill_core::CoreError`] 的稳定错误码上报；
//! - 取消令牌在构造时注入，触发时恰好恢复一次读取（`is_cancelled` 置位），
//!   信号随交付被消费，需再次触发才会重新生效。

extern crate alloc;

mod channel;
mod reader;
mod state;
mod writer;

pub use channel::{ChannelBuilder, unowned_channel};
pub use reader::{ChannelReader, Read, ReadResult};
pub use state::ChannelPhase;
pub use writer::{UnownedWriter, WriteFrame};

pub use rill_buffer::{
    ByteSpan, Cursor, PreservedBuffer, ReadableBuffer, SegmentIter, SegmentView, SlabBlockPool,
};
pub use rill_core::{BlockPool, Cancellation, CoreError, PoolStats, Result, codes};
