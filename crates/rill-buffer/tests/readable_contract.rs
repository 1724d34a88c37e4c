//! `readable_contract` 集成测试：聚焦跨段视图与游标的读取契约。
//!
//! # 测试总览（Why）
//! - 校验视图迭代、切片与首块访问是否保持零拷贝与链序；
//! - 覆盖段边界上的游标规范化、距离与顺序关系；
//! - 以越界 seek、跨链比较等错误路径验证 `CoreError` 码值稳定。

use std::sync::Arc;

use rill_buffer::{BufferChain, Cursor, ReadableBuffer, SlabBlockPool};
use rill_core::codes;

fn new_chain() -> BufferChain {
    BufferChain::new(Arc::new(SlabBlockPool::new()))
}

/// 将区域发布进链。调用方必须保证 `region` 在链的下一次 `release` 或
/// 整链析构之前持续有效（本文件的测试都把区域声明在链之前）。
unsafe fn publish(chain: &mut BufferChain, region: &[u8]) {
    unsafe { chain.append_borrowed(region.as_ptr(), region.len()) };
    chain.flush_pending();
}

/// - **意图 (Why)**：多段缓冲的迭代必须按链序产出非空连续块，扁平化结果
///   与发布顺序一致。
#[test]
fn segments_iterate_in_chain_order() {
    let first = *b"Hello ";
    let second = *b"World";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &first) };
    unsafe { publish(&mut chain, &second) };

    let buffer = ReadableBuffer::new(origin, chain.frontier())
        .expect("游标同链且有序，构造不应失败");
    assert_eq!(buffer.len(), 11);
    let chunks: Vec<Vec<u8>> = buffer
        .segments()
        .map(|view| view.to_vec().expect("发布中的段应可读"))
        .collect();
    assert_eq!(chunks, vec![b"Hello ".to_vec(), b"World".to_vec()]);
    assert_eq!(buffer.to_vec().expect("扁平化不应失败"), b"Hello World");
}

/// - **意图 (Why)**：`first` 只覆盖起始段上的前缀，到段末或视图终点为止。
#[test]
fn first_is_bounded_by_the_start_segment() {
    let first = *b"abc";
    let second = *b"def";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &first) };
    unsafe { publish(&mut chain, &second) };

    let buffer = ReadableBuffer::new(origin.clone(), chain.frontier())
        .expect("游标同链且有序，构造不应失败");
    assert_eq!(&*buffer.first().bytes().expect("首块应可读"), b"abc");

    let shorter = buffer
        .slice_len(&origin, 2)
        .expect("前缀切片不应失败");
    assert_eq!(&*shorter.first().bytes().expect("首块应可读"), b"ab");
}

/// - **意图 (Why)**：切片共享底层段、不复制字节——视图读到的地址必须落在
///   原始区域内部。
#[test]
fn slice_is_zero_copy() {
    let region = *b"Hello World";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };

    let buffer = ReadableBuffer::new(origin.clone(), chain.frontier())
        .expect("游标同链且有序，构造不应失败");
    let from = origin.seek(3).expect("seek 应落在已写入范围内");
    let slice = buffer.slice_len(&from, 5).expect("切片不应失败");
    assert_eq!(slice.to_vec().expect("切片应可读"), b"lo Wo");

    let first = slice.first();
    let span = first.bytes().expect("切片首块应可读");
    assert_eq!(
        span.as_ref().as_ptr(),
        region[3..].as_ptr(),
        "零拷贝切片应直接指向原始区域"
    );
}

/// - **意图 (Why)**：段末位置与后继段入口是同一逻辑位置，规范化前后
///   相等且距离一致。
#[test]
fn boundary_cursors_compare_equal() {
    let first = *b"abcdef";
    let second = *b"ghi";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &first) };
    unsafe { publish(&mut chain, &second) };

    let boundary = origin.seek(6).expect("seek 到段末不应失败");
    assert_eq!(boundary, boundary.normalized());
    assert_eq!(
        boundary
            .distance_to(&chain.frontier())
            .expect("边界到前沿的距离可求"),
        3
    );
    assert_eq!(
        boundary.normalized().seek(1).expect("跨界 seek 不应失败"),
        origin.seek(7).expect("直接 seek 不应失败")
    );
}

/// - **意图 (Why)**：顺序关系只在同一条链内有定义；链内按前后排序，
///   跨链比较返回 `None`。
#[test]
fn ordering_is_defined_within_a_single_chain() {
    let region = *b"abcd";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };

    let early = origin.seek(1).expect("seek 不应失败");
    let late = origin.seek(3).expect("seek 不应失败");
    assert!(early < late);
    assert!(late > early);
    assert_eq!(early.partial_cmp(&early), Some(std::cmp::Ordering::Equal));

    let foreign = new_chain().frontier();
    assert_eq!(early.partial_cmp(&foreign), None, "跨链比较没有定义");
}

/// - **意图 (Why)**：越过当前已写入末尾的 seek 属于未定义区域，必须以
///   `cursor.out_of_range` 确定性失败。
#[test]
fn seek_past_the_written_end_fails() {
    let region = *b"abc";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };

    let err = origin.seek(4).expect_err("越界 seek 应失败");
    assert_eq!(err.code(), codes::CURSOR_OUT_OF_RANGE);
    assert!(origin.seek(3).is_ok(), "恰好到末尾的 seek 合法");
}

/// - **意图 (Why)**：构造视图时即校验游标次序与同链约束——乱序或跨链的
///   游标对以 `cursor.out_of_range` 确定性失败，而不是静默得到空视图。
#[test]
fn constructing_a_backwards_or_foreign_buffer_fails() {
    let region = *b"abcd";
    let mut chain = new_chain();
    let origin = chain.frontier();
    unsafe { publish(&mut chain, &region) };

    let late = origin.seek(3).expect("seek 不应失败");
    let err = ReadableBuffer::new(late, origin.clone()).expect_err("乱序游标对应被拒绝");
    assert_eq!(err.code(), codes::CURSOR_OUT_OF_RANGE);

    let foreign = new_chain().frontier();
    let err = ReadableBuffer::new(origin, foreign).expect_err("跨链游标对应被拒绝");
    assert_eq!(err.code(), codes::CURSOR_OUT_OF_RANGE);
}

/// - **意图 (Why)**：空视图是协议的常客（完成通知、取消交付），其迭代、
///   首块与扁平化都应平凡成立。
#[test]
fn empty_buffer_behaves_trivially() {
    let chain = new_chain();
    let origin = chain.frontier();
    let buffer = ReadableBuffer::new(origin.clone(), origin.clone())
        .expect("游标同链且有序，构造不应失败");
    assert!(buffer.is_empty());
    assert_eq!(buffer.len(), 0);
    assert!(buffer.first().is_empty());
    assert_eq!(buffer.segments().count(), 0);
    assert_eq!(buffer.to_vec().expect("空视图扁平化不应失败"), Vec::<u8>::new());

    let same: Cursor = origin.clone();
    assert_eq!(origin, same);
}
