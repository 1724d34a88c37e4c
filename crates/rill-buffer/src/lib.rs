#![cfg_attr(not(feature = "std"), no_std)]

//! `rill-buffer` 提供无主缓冲通道的段链缓冲机制。
//!
//! # 模块定位（Why）
//! - 为 `rill-channel` 的状态机提供底层数据结构：单向段链、跨段游标、
//!   零拷贝只读视图与保留（Preserve）句柄。
//! - 借用段（Borrowed）直接引用生产者拥有的内存区域，不发生复制；
//!   在生产者释放点之前，要么被提升为自有段（Owned，拷贝进池存储），
//!   要么因数据已消费而作废。提升在原节点上就地完成，链节点身份不变，
//!   既有游标全部继续有效。
//!
//! # 设计概要（How）
//! - `segment` 模块实现带标签的段表示与就地提升；数据访问统一经过
//!   [`ByteSpan`] 守卫，借用段的访问与生产者释放以段级读写锁串行化；
//! - `chain` 模块负责追加、发布（flush 时挂链）、释放点处理与按
//!   consumed 游标的修剪；
//! - `pool` 模块提供基于自由链表的默认块池 [`SlabBlockPool`]，
//!   自有段存储从池中租借、在段的最终析构时归还。
//!
//! # 命名约定（Consistency）
//! - 沿用 `rill-core` 的错误码体系（`buffer.use_after_release` 等），
//!   所有失效访问均以确定性错误返回，绝不暴露悬垂内存。

extern crate alloc;

mod chain;
mod cursor;
mod pool;
mod preserved;
mod readable;
mod segment;

pub use chain::{BufferChain, ReleaseWalk};
pub use cursor::Cursor;
pub use pool::SlabBlockPool;
pub use preserved::PreservedBuffer;
pub use readable::{ReadableBuffer, SegmentIter, SegmentView};
pub use segment::ByteSpan;
