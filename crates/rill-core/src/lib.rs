#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![allow(private_bounds)]
#![doc = "rill-core: 无主缓冲可读通道（Unowned-Buffer Readable Channel）的核心契约层。"]
#![doc = ""]
#![doc = "本 crate 只承载跨 crate 共享的最小契约：稳定错误域、取消原语与缓冲块池接口。"]
#![doc = "具体的段链、游标与通道状态机分别位于 `rill-buffer` 与 `rill-channel`。"]
#![doc = "`rill-core` 定位于 `no_std + alloc` 场景：契约依赖 [`alloc`] 中的 `Box`、`Arc`、`Vec`"]
#![doc = "以支撑错误链路、取消令牌共享与池统计快照；纯 `no_std`（无分配器）环境不在支持范围内。"]

extern crate alloc;

mod sealed;

pub mod buffer;
pub mod contract;
pub mod error;

pub use buffer::{BlockPool, PoolStats};
pub use contract::Cancellation;
pub use error::{CoreError, ErrorCause, Result, codes};

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

/// `rill-core` 中所有错误必须实现的 `no_std` 基础 Trait。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 环境中不可用，需要一个对象安全、与平台无关的
///   错误抽象来串联底层错误链。
/// - 该 Trait 作为错误类型的最小公共接口，在 `alloc` 场景下完成跨 crate 错误传递。
///
/// # 逻辑解析（How）
/// - 约束实现者提供 `Debug` 与 `Display`，便于日志与排障输出。
/// - `source` 递归返回链路上的上游错误，语义与 `std::error::Error::source` 对齐。
///
/// # 契约说明（What）
/// - **前置条件**：实现类型需为 `'static` 生命周期，若要装入 [`ErrorCause`] 还需
///   `Send + Sync`。
/// - **后置条件**：`source` 返回的引用生命周期受限于 `self`，防止悬垂引用。
pub trait Error: fmt::Debug + fmt::Display + crate::sealed::Sealed {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}

impl<E> Error for Arc<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}
