//! Integration tests for the `size_class_pool` package.
//!
//! These tests exercise `PoolAllocator` and `Allocation` through the public API only, covering
//! size routing, pool growth, block recycling, shared handles and failure reporting.

use std::collections::HashSet;

use size_class_pool::{BlockTag, ChainLayout, Error, PoolAllocator, SizeClass};

fn allocator_with(classes: &[(usize, usize)]) -> PoolAllocator {
    let chain = ChainLayout::from_table(
        classes
            .iter()
            .map(|&(block_size, capacity)| SizeClass::from_parts(block_size, capacity)),
    )
    .unwrap();

    PoolAllocator::builder().chain(chain).build()
}

fn pool_count(allocator: &PoolAllocator, class_index: usize) -> usize {
    allocator
        .debug_snapshot(false)
        .iter()
        .find(|occupancy| occupancy.class_index() == class_index)
        .unwrap()
        .pool_count()
}

#[test]
fn two_blocks_share_a_pool_and_return_to_it() {
    let allocator = allocator_with(&[(1024, 8), (4096, 4)]);

    {
        let first = allocator.allocate(1024, BlockTag::Other).unwrap();
        let second = allocator.allocate(1024, BlockTag::Other).unwrap();

        assert_eq!(first.class_index(), 0);
        assert_eq!(second.class_index(), 0);
        assert_eq!(first.pool_index(), second.pool_index());
        assert_ne!(first.block_index(), second.block_index());
        assert_eq!(
            second.ptr().as_ptr().addr() - first.ptr().as_ptr().addr(),
            1024
        );
        assert_eq!(allocator.len(), 2);
    }

    let occupancy = allocator.debug_snapshot(true).iter().next().unwrap();
    assert_eq!(occupancy.pool_count(), 1);
    assert_eq!(occupancy.active_blocks(), 0);
    assert!(allocator.is_empty());
}

#[test]
fn exhausting_a_pool_grows_the_class() {
    const CAPACITY: usize = 16;

    let allocator = allocator_with(&[(64, CAPACITY), (256, 4)]);

    let mut allocations = (0..CAPACITY)
        .map(|_| allocator.allocate(64, BlockTag::Other).unwrap())
        .collect::<Vec<_>>();

    assert!(allocations.iter().all(|allocation| allocation.pool_index() == 0));
    assert_eq!(pool_count(&allocator, 0), 1);

    let overflow = allocator.allocate(64, BlockTag::Other).unwrap();
    assert_eq!(overflow.pool_index(), 1);
    assert_eq!(overflow.block_index(), 0);
    assert_eq!(pool_count(&allocator, 0), 2);
    assert_eq!(pool_count(&allocator, 1), 0);

    allocations.push(overflow);

    let distinct = allocations
        .iter()
        .map(|allocation| allocation.ptr())
        .collect::<HashSet<_>>();
    assert_eq!(distinct.len(), CAPACITY + 1);
}

#[test]
fn one_byte_over_largest_class_is_rejected() {
    let allocator = allocator_with(&[(128, 4), (2048, 2)]);

    let result = allocator.allocate(2049, BlockTag::Array);

    match result {
        Err(Error::RequestTooLarge { requested, largest }) => {
            assert_eq!(requested, 2049);
            assert_eq!(largest, 2048);
        }
        other => panic!("expected RequestTooLarge, got {other:?}"),
    }

    assert_eq!(allocator.reserved_bytes(), 0);
    assert_eq!(allocator.debug_snapshot(true).iter().count(), 0);
    assert!(allocator.is_empty());
}

#[test]
fn released_block_is_reused_first_once_pool_is_full() {
    const CAPACITY: usize = 4;

    let allocator = allocator_with(&[(32, CAPACITY)]);

    let mut allocations = (0..CAPACITY)
        .map(|_| allocator.allocate(32, BlockTag::Other).unwrap())
        .collect::<Vec<_>>();

    let released = allocations.remove(2);
    let released_index = released.block_index();
    let released_ptr = released.ptr();
    drop(released);

    let reused = allocator.allocate(20, BlockTag::Other).unwrap();
    assert_eq!(reused.block_index(), released_index);
    assert_eq!(reused.ptr(), released_ptr);
    assert_eq!(pool_count(&allocator, 0), 1);
}

#[test]
fn single_block_pool_reuses_same_block() {
    let allocator = allocator_with(&[(512, 1)]);

    let first = allocator.allocate(512, BlockTag::Other).unwrap();
    let first_index = first.block_index();
    let first_ptr = first.ptr();
    drop(first);

    let second = allocator.allocate(512, BlockTag::Other).unwrap();
    assert_eq!(second.block_index(), first_index);
    assert_eq!(second.ptr(), first_ptr);
    assert_eq!(pool_count(&allocator, 0), 1);
}

#[test]
fn reuse_follows_release_order() {
    const CAPACITY: usize = 3;

    let allocator = allocator_with(&[(16, CAPACITY)]);

    let mut allocations = (0..CAPACITY)
        .map(|_| Some(allocator.allocate(16, BlockTag::Other).unwrap()))
        .collect::<Vec<_>>();

    let release_order = [1, 2, 0];

    for index in release_order {
        drop(allocations[index].take());
    }

    let reuse_order = (0..CAPACITY)
        .map(|_| allocator.allocate(16, BlockTag::Other).unwrap())
        .collect::<Vec<_>>();

    let reused_indexes = reuse_order
        .iter()
        .map(|allocation| allocation.block_index())
        .collect::<Vec<_>>();

    assert_eq!(reused_indexes, release_order);
}

#[test]
fn shared_handle_releases_on_last_drop() {
    let allocator = allocator_with(&[(64, 1)]);

    let original = allocator.allocate(64, BlockTag::Object).unwrap();
    let duplicate = original.clone();

    drop(original);

    // The block is still held by the duplicate, so the pool is still full.
    assert_eq!(allocator.len(), 1);
    let while_held = allocator.allocate(64, BlockTag::Object).unwrap();
    assert_eq!(while_held.pool_index(), 1);
    assert_ne!(while_held.ptr(), duplicate.ptr());

    let held_ptr = duplicate.ptr();
    drop(duplicate);
    assert_eq!(allocator.len(), 1);

    let after_release = allocator.allocate(64, BlockTag::Object).unwrap();
    assert_eq!(after_release.pool_index(), 0);
    assert_eq!(after_release.ptr(), held_ptr);
}

#[test]
fn routing_picks_smallest_fitting_class() {
    let allocator = allocator_with(&[(16, 8), (64, 8), (256, 8), (1024, 8)]);

    let cases = [
        (0, 16),
        (1, 16),
        (16, 16),
        (17, 64),
        (64, 64),
        (65, 256),
        (1000, 1024),
        (1024, 1024),
    ];

    for (size, expected_block_size) in cases {
        let allocation = allocator.allocate(size, BlockTag::Other).unwrap();
        assert_eq!(
            allocation.block_size(),
            expected_block_size,
            "request of {size} bytes"
        );
        assert!(allocation.block_size() >= allocation.requested_size());
    }
}

#[test]
fn pool_counts_never_decrease() {
    let allocator = allocator_with(&[(32, 2), (128, 2)]);

    let mut previous = vec![0; 2];

    for round in 0..10_usize {
        let held = (0..=round % 5)
            .map(|_| allocator.allocate(32 + round % 2 * 64, BlockTag::Other).unwrap())
            .collect::<Vec<_>>();

        let current = allocator
            .debug_snapshot(false)
            .iter()
            .map(|occupancy| occupancy.pool_count())
            .collect::<Vec<_>>();

        for (now, before) in current.iter().zip(&previous) {
            assert!(now >= before);
        }

        previous = current;
        drop(held);
    }

    assert!(allocator.is_empty());
}

#[test]
fn snapshot_is_stable_between_allocations() {
    let allocator = allocator_with(&[(32, 2), (128, 2)]);

    let _a = allocator.allocate(10, BlockTag::Other).unwrap();
    let _b = allocator.allocate(100, BlockTag::Other).unwrap();
    let _c = allocator.allocate(10, BlockTag::Other).unwrap();

    let reference = allocator.debug_snapshot(false).iter().collect::<Vec<_>>();

    for only_non_empty in [false, true, false, true] {
        let snapshot = allocator.debug_snapshot(only_non_empty);
        _ = snapshot.to_string();
        _ = format!("{snapshot:?}");
    }

    let again = allocator.debug_snapshot(false).iter().collect::<Vec<_>>();
    assert_eq!(reference, again);
    assert_eq!(allocator.len(), 3);
}

#[test]
fn live_blocks_never_overlap() {
    let allocator = allocator_with(&[(24, 3), (96, 2)]);

    let mut live = Vec::new();

    // A deterministic interleaving of allocations and releases across both classes.
    for step in 0..200_usize {
        if step % 3 == 2 && !live.is_empty() {
            live.swap_remove(step % live.len());
        } else {
            let size = if step % 2 == 0 { 20 } else { 90 };
            live.push(allocator.allocate(size, BlockTag::Other).unwrap());
        }

        let mut ranges = live
            .iter()
            .map(|allocation: &size_class_pool::Allocation| {
                let start = allocation.ptr().as_ptr().addr();
                (start, start + allocation.block_size())
            })
            .collect::<Vec<_>>();
        ranges.sort_unstable();

        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "live blocks overlap at step {step}");
        }

        assert_eq!(allocator.len(), live.len());
    }
}
