use std::{
    alloc::{GlobalAlloc, Layout, System},
    ptr,
    time,
};

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use tlsf::TlsfAllocator;

static TLSF_ALLOCATOR: TlsfAllocator = TlsfAllocator::new();

static SYSTEM: System = System;

//  Fragmented Allocation.
//
//  This benchmark allocates blocks of varying sizes from a heap whose free lists are populated across many classes.
//
//  Only the allocation is timed; its latency should not depend on the number of free blocks.
fn fragmented_allocation(c: &mut Criterion) {
    fn bencher<A: GlobalAlloc>(name: &str, allocator: &'static A, c: &mut Criterion) {
        let _holes = Fragments::new(allocator, 4096);

        c.bench_function(name, |b| b.iter_custom(|iterations| {
            let mut duration = time::Duration::default();

            for i in 0..iterations {
                let layout = layout(size_for(i as usize), 8);

                let start = time::Instant::now();

                let pointer = unsafe { allocator.alloc(black_box(layout)) };

                duration += start.elapsed();

                unsafe { allocator.dealloc(pointer, layout) };
            }

            duration
        }));
    }

    TLSF_ALLOCATOR.warm_up().expect("Warmed up");

    bencher("Fragmented Allocation - sys", &SYSTEM, c);

    bencher("Fragmented Allocation - tlsf", &TLSF_ALLOCATOR, c);
}

//  Fragmented Round-Trip.
//
//  This benchmark allocates then deallocates blocks of varying sizes, from a fragmented heap.
//
//  Each deallocation coalesces with the free neighbours of the block, if any.
fn fragmented_round_trip(c: &mut Criterion) {
    fn bencher<A: GlobalAlloc>(name: &str, allocator: &'static A, c: &mut Criterion) {
        let _holes = Fragments::new(allocator, 4096);
        let mut index = 0;

        c.bench_function(name, |b| b.iter(|| {
            let layout = layout(size_for(index), 8);
            index += 1;

            unsafe {
                let pointer = allocator.alloc(black_box(layout));
                allocator.dealloc(black_box(pointer), layout);
            }
        }));
    }

    TLSF_ALLOCATOR.warm_up().expect("Warmed up");

    bencher("Fragmented Round-trip - sys", &SYSTEM, c);

    bencher("Fragmented Round-trip - tlsf", &TLSF_ALLOCATOR, c);
}

criterion_group!(
    fragmented,
    fragmented_allocation,
    fragmented_round_trip
);

//  Aligned Round-Trip.
//
//  This benchmark allocates then deallocates over-aligned blocks.
//
//  The leading gap of the block is split off, then coalesced back on deallocation.
fn aligned_round_trip(c: &mut Criterion) {
    fn bencher<A: GlobalAlloc>(name: &str, allocator: &'static A, alignment: usize, c: &mut Criterion) {
        let layout = layout(64, alignment);

        c.bench_function(name, |b| b.iter(|| {
            unsafe {
                let pointer = allocator.alloc(black_box(layout));
                allocator.dealloc(black_box(pointer), layout);
            }
        }));
    }

    TLSF_ALLOCATOR.warm_up().expect("Warmed up");

    for &alignment in &[64, 4096] {
        bencher(&format!("Aligned {} Round-trip - sys", alignment), &SYSTEM, alignment, c);

        bencher(&format!("Aligned {} Round-trip - tlsf", alignment), &TLSF_ALLOCATOR, alignment, c);
    }
}

criterion_group!(
    aligned,
    aligned_round_trip
);

//  Reallocation.
//
//  This benchmark grows a block from 256 to 1024 bytes.
//
//  In place, the block absorbs its free successor; otherwise, its successor is used and the block is moved.
fn reallocation(c: &mut Criterion) {
    fn bencher<A: GlobalAlloc>(name: &str, allocator: &'static A, pinned: bool, c: &mut Criterion) {
        c.bench_function(name, |b| b.iter_batched(
            || Grown::new(allocator, pinned),
            |mut grown| {
                grown.grow(black_box(1024));
                grown
            },
            BatchSize::SmallInput
        ));
    }

    TLSF_ALLOCATOR.warm_up().expect("Warmed up");

    bencher("Reallocation In-place - sys", &SYSTEM, false, c);

    bencher("Reallocation In-place - tlsf", &TLSF_ALLOCATOR, false, c);

    bencher("Reallocation Moving - sys", &SYSTEM, true, c);

    bencher("Reallocation Moving - tlsf", &TLSF_ALLOCATOR, true, c);
}

criterion_group!(
    reallocate,
    reallocation
);

criterion_main!(
    fragmented,
    aligned,
    reallocate
);

//
//  Implementation Details
//

//  Sizes spread over many classes, up to 8 KB.
fn size_for(index: usize) -> usize { 16 + index * 53 % 8192 }

fn layout(size: usize, alignment: usize) -> Layout {
    Layout::from_size_align(size, alignment).expect("Valid Layout")
}

//  A heap riddled with holes: every other block of a batch is deallocated, the others are kept until drop.
struct Fragments<A: GlobalAlloc + 'static> {
    allocator: &'static A,
    blocks: Vec<(*mut u8, Layout)>,
}

impl<A: GlobalAlloc + 'static> Fragments<A> {
    fn new(allocator: &'static A, number: usize) -> Self {
        let mut blocks = Vec::with_capacity(number / 2);

        for i in 0..number {
            let layout = layout(size_for(i), 8);
            let pointer = unsafe { allocator.alloc(layout) };
            assert!(!pointer.is_null());

            blocks.push((pointer, layout));
        }

        let (holes, kept): (Vec<_>, Vec<_>) = blocks.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);

        for (_, (pointer, layout)) in holes {
            unsafe { allocator.dealloc(pointer, layout) };
        }

        Self { allocator, blocks: kept.into_iter().map(|(_, block)| block).collect() }
    }
}

impl<A: GlobalAlloc + 'static> Drop for Fragments<A> {
    fn drop(&mut self) {
        for &(pointer, layout) in &self.blocks {
            unsafe { self.allocator.dealloc(pointer, layout) };
        }
    }
}

//  A block of 256 bytes, optionally followed by a used successor.
struct Grown<A: GlobalAlloc + 'static> {
    allocator: &'static A,
    block: *mut u8,
    layout: Layout,
    successor: *mut u8,
}

impl<A: GlobalAlloc + 'static> Grown<A> {
    fn new(allocator: &'static A, pinned: bool) -> Self {
        let layout = layout(256, 8);

        let block = unsafe { allocator.alloc(layout) };
        assert!(!block.is_null());

        let successor = if pinned { unsafe { allocator.alloc(layout) } } else { ptr::null_mut() };

        Self { allocator, block, layout, successor }
    }

    fn grow(&mut self, size: usize) {
        let block = unsafe { self.allocator.realloc(self.block, self.layout, size) };
        assert!(!block.is_null());

        self.block = block;
        self.layout = layout(size, self.layout.align());
    }
}

impl<A: GlobalAlloc + 'static> Drop for Grown<A> {
    fn drop(&mut self) {
        unsafe {
            self.allocator.dealloc(self.block, self.layout);

            if !self.successor.is_null() {
                self.allocator.dealloc(self.successor, layout(256, 8));
            }
        }
    }
}
