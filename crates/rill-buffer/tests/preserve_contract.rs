//! `preserve_contract` 集成测试：聚焦保留句柄的生命周期契约。
//!
//! # 测试总览（Why）
//! - 保留必须让字节活过生产者释放点，且读到的内容恒等于保留时刻的快照；
//! - 释放是强制且幂等的义务，释放后的句柄访问确定性失败；
//! - 存储的回收经由块池完成，统计可观察。

use std::sync::Arc;

use rill_buffer::{BufferChain, ReadableBuffer, SlabBlockPool};
use rill_core::{BlockPool, codes};

fn new_chain() -> BufferChain {
    BufferChain::new(Arc::new(SlabBlockPool::new()))
}

unsafe fn publish(chain: &mut BufferChain, region: &[u8]) {
    unsafe { chain.append_borrowed(region.as_ptr(), region.len()) };
    chain.flush_pending();
}

/// - **意图 (Why)**：保留的核心承诺——生产者收回内存之后，句柄读到的仍是
///   保留时刻覆盖的字节。
/// - **实现说明 (How)**：区域声明在内层作用域，释放点执行后才离开作用域，
///   模拟生产者写帧结束并复用内存。
#[test]
fn preserved_bytes_outlive_the_producer_frame() {
    let mut chain = new_chain();
    let origin = chain.frontier();
    let preserved = {
        let region = *b"Hello ";
        unsafe { publish(&mut chain, &region) };
        let buffer = ReadableBuffer::new(origin.clone(), chain.frontier())
            .expect("游标同链且有序，构造不应失败");
        let preserved = buffer.preserve().expect("保留不应失败");
        chain.release(&origin).expect("生产者释放点不应失败");
        preserved
    };
    assert_eq!(
        preserved
            .buffer()
            .expect("释放前句柄应可用")
            .to_vec()
            .expect("保留范围应可读"),
        b"Hello "
    );
}

/// - **意图 (Why)**：consumed 推进使普通视图失效，但保留路径在句柄释放前
///   不受影响——这正是“保留”与“消费确认”解耦的意义。
#[test]
fn preservation_survives_trim_while_plain_views_fail() {
    let region = *b"data";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };
    let buffer = ReadableBuffer::new(origin.clone(), chain.frontier())
        .expect("游标同链且有序，构造不应失败");
    let preserved = buffer.preserve().expect("保留不应失败");
    chain.release(&origin).expect("释放不应失败");

    let end = chain.frontier();
    chain.trim(&end);

    let err = buffer.first().bytes().expect_err("普通视图应随修剪失效");
    assert_eq!(err.code(), codes::USE_AFTER_RELEASE);
    assert_eq!(
        preserved
            .buffer()
            .expect("保留句柄应仍可用")
            .to_vec()
            .expect("保留范围应可读"),
        b"data"
    );
}

/// - **意图 (Why)**：释放后的句柄访问以 `use_after_release` 失败，且重复
///   释放是无害的空操作。
#[test]
fn release_is_mandatory_and_idempotent() {
    let region = *b"gone";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };
    let buffer = ReadableBuffer::new(origin.clone(), chain.frontier())
        .expect("游标同链且有序，构造不应失败");
    let mut preserved = buffer.preserve().expect("保留不应失败");
    chain.release(&origin).expect("释放不应失败");

    preserved.release();
    let err = preserved.buffer().expect_err("释放后的访问应失败");
    assert_eq!(err.code(), codes::USE_AFTER_RELEASE);
    preserved.release();
    assert!(
        preserved.buffer().is_err(),
        "重复释放后访问仍应确定性失败"
    );
}

/// - **意图 (Why)**：提升租借的存储应在最后一个持有者（链、视图、保留
///   句柄、游标）消失后归还块池，统计可见。
#[test]
fn storage_returns_to_the_pool_after_the_last_holder() {
    let pool = SlabBlockPool::new();
    let region = *b"pooled bytes";
    let mut chain = BufferChain::new(Arc::new(pool.clone()) as Arc<dyn BlockPool>);
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };
    let buffer = ReadableBuffer::new(origin.clone(), chain.frontier())
        .expect("游标同链且有序，构造不应失败");
    let mut preserved = buffer.preserve().expect("保留触发提升，不应失败");
    assert_eq!(pool.statistics().active_blocks, 1, "提升应租借一个块");

    preserved.release();
    drop(preserved);
    drop(buffer);
    drop(origin);
    drop(chain);

    let snapshot = pool.statistics();
    assert_eq!(snapshot.active_blocks, 0, "所有持有者消失后块应归还");
    assert_eq!(snapshot.free_blocks, 1);
    assert!(snapshot.available_bytes >= region.len());
}

/// - **意图 (Why)**：空视图的保留是平凡操作，不触达任何段、不租借存储。
#[test]
fn preserving_an_empty_buffer_is_trivial() {
    let pool = SlabBlockPool::new();
    let chain = BufferChain::new(Arc::new(pool.clone()) as Arc<dyn BlockPool>);
    let origin = chain.frontier();
    let buffer = ReadableBuffer::new(origin.clone(), origin)
        .expect("游标同链且有序，构造不应失败");
    let preserved = buffer.preserve().expect("空保留不应失败");
    assert!(
        preserved
            .buffer()
            .expect("句柄应可用")
            .is_empty()
    );
    assert_eq!(pool.statistics().active_blocks, 0, "空保留不应租借存储");
}
