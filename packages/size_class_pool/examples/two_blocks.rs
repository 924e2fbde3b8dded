//! Allocates two 1024-byte blocks from the default size class chain and prints the allocator
//! diagnostics while the blocks are held and after they are released.
//!
//! Trace-level logging is enabled, so pool growth and every block handed out and returned is
//! also reported.

use size_class_pool::{BlockTag, PoolAllocator};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let allocator = PoolAllocator::new();

    let first = allocator
        .allocate(1024, BlockTag::Object)
        .expect("the default chain has a 1024-byte size class");
    let second = allocator
        .allocate(1024, BlockTag::Object)
        .expect("the first pool of the class has room for a second block");

    println!(
        "Allocated two blocks of {} bytes at {:p} and {:p}",
        first.block_size(),
        first.ptr(),
        second.ptr()
    );

    println!("{}", allocator.debug_snapshot(true));

    drop(first);
    drop(second);

    println!("After release, live allocations: {}", allocator.len());
    println!("{}", allocator.debug_snapshot(true));
}
