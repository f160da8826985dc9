use std::{
    alloc::Layout,
    cmp,
    ptr::{self, NonNull},
    slice,
    sync::{atomic::{AtomicBool, Ordering}, mpsc, Barrier},
    thread,
};

use serial_test::serial;

use tlsf::TlsfAllocator;

static TLSF_ALLOCATOR: TlsfAllocator = TlsfAllocator::new();

//
//  Tests
//

#[serial]
#[test]
fn concurrent_allocate_deallocate() {
    //  Blocks allocated concurrently, with mixed sizes and alignments, never overlap.

    let number_threads = number_threads();

    for _ in 0..number_iterations() {
        let barrier = Barrier::new(number_threads);

        let mut blocks: Vec<Block> = thread::scope(|scope| {
            let handles: Vec<_> = (0..number_threads)
                .map(|index| {
                    let barrier = &barrier;

                    scope.spawn(move || {
                        barrier.wait();

                        (1..64).map(|i| Block::allocate(i * 16, alignment_of(i), tag(index, i))).collect::<Vec<_>>()
                    })
                })
                .collect();

            handles.into_iter().flat_map(|handle| handle.join().expect("No panic")).collect()
        });

        blocks.sort_by_key(Block::address);

        for pair in blocks.windows(2) {
            assert!(pair[0].address() + pair[0].layout.size() <= pair[1].address(),
                "{:x} overlaps {:x}", pair[0].address(), pair[1].address());
        }

        for block in blocks {
            block.verify();
            block.deallocate();
        }

        assert_eq!(0, TLSF_ALLOCATOR.check());
    }
}

#[serial]
#[test]
fn cross_thread_reallocate_deallocate() {
    //  Each thread hands its blocks over to the next, which grows or shrinks them, then releases them.

    let number_threads = number_threads();
    let number_blocks = 128;

    for iteration in 0..number_iterations() {
        let (mut senders, receivers): (Vec<_>, Vec<_>) = (0..number_threads).map(|_| mpsc::channel::<Block>()).unzip();

        //  Thread `i` sends to the receiver of thread `i + 1`.
        senders.rotate_left(1);

        thread::scope(|scope| {
            for (index, (sender, receiver)) in senders.into_iter().zip(receivers).enumerate() {
                scope.spawn(move || {
                    for i in 0..number_blocks {
                        let size = 8 + (i * 37 + index * 11) % 2048;
                        let block = Block::allocate(size, alignment_of(i + index), tag(index, i));

                        sender.send(block).expect("Receiver alive");
                    }

                    drop(sender);

                    for (i, block) in receiver.iter().enumerate() {
                        block.verify();

                        let size = block.layout.size();
                        let size = if i % 2 == 0 { size * 3 } else { size / 2 + 1 };

                        block.reallocate(size).deallocate();
                    }
                });
            }
        });

        assert_eq!(0, TLSF_ALLOCATOR.check(), "iteration {}", iteration);
    }
}

#[serial]
#[test]
fn concurrent_trim() {
    //  Pools are mapped and trimmed while other threads allocate.

    const MEGABYTE: usize = 1024 * 1024;

    let number_threads = number_threads();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let trimmer = scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                TLSF_ALLOCATOR.trim();
                thread::yield_now();
            }
        });

        let workers: Vec<_> = (0..number_threads)
            .map(|index| {
                scope.spawn(move || {
                    for i in 0..16 {
                        let size = 5 * MEGABYTE + (index * 16 + i) * 4096;
                        let block = Block::allocate(size, 4096 << (i % 3), tag(index, i));

                        block.verify();
                        block.deallocate();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().expect("No panic");
        }

        done.store(true, Ordering::Release);

        trimmer.join().expect("No panic");
    });

    assert_eq!(0, TLSF_ALLOCATOR.check());

    TLSF_ALLOCATOR.trim();
    assert_eq!(0, TLSF_ALLOCATOR.number_pools());
}

//
//  Implementation Details
//

//  A live allocation, filled with `tag`.
struct Block {
    pointer: NonNull<u8>,
    layout: Layout,
    tag: u8,
}

impl Block {
    fn allocate(size: usize, alignment: usize, tag: u8) -> Self {
        let layout = layout(size, alignment);
        let pointer = TLSF_ALLOCATOR.allocate(layout).expect("Allocated");

        let block = Block { pointer, layout, tag };
        assert_eq!(0, block.address() % alignment, "{:x} not aligned on {}", block.address(), alignment);

        block.fill();
        block
    }

    fn address(&self) -> usize { self.pointer.as_ptr() as usize }

    fn fill(&self) {
        unsafe { ptr::write_bytes(self.pointer.as_ptr(), self.tag, self.layout.size()) };
    }

    fn verify(&self) { self.verify_prefix(self.layout.size()) }

    fn verify_prefix(&self, length: usize) {
        let bytes = unsafe { slice::from_raw_parts(self.pointer.as_ptr(), length) };

        assert!(bytes.iter().all(|byte| *byte == self.tag),
            "block {:x} of {} bytes overwritten", self.address(), self.layout.size());
    }

    fn reallocate(self, size: usize) -> Self {
        let pointer = unsafe { TLSF_ALLOCATOR.reallocate(self.pointer, self.layout, size) }.expect("Reallocated");

        let block = Block { pointer, layout: layout(size, self.layout.align()), tag: self.tag };

        assert_eq!(0, block.address() % self.layout.align());
        block.verify_prefix(cmp::min(self.layout.size(), size));

        block.fill();
        block
    }

    fn deallocate(self) {
        unsafe { TLSF_ALLOCATOR.deallocate(self.pointer) };
    }
}

//  Safety:
//  -   The block is exclusively owned, and the heap is shared across threads.
unsafe impl Send for Block {}

fn alignment_of(i: usize) -> usize { 8 << (i % 5) }

fn tag(thread: usize, i: usize) -> u8 { (thread * 31 + i) as u8 }

fn layout(size: usize, alignment: usize) -> Layout {
    Layout::from_size_align(size, alignment).expect("Valid Layout")
}

fn number_iterations() -> usize { from_environment("TLSF_MULTI_NUMBER_ITERATIONS", 10) }

fn number_threads() -> usize { from_environment("TLSF_MULTI_NUMBER_THREADS", 4) }

fn from_environment(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|value| value.parse().ok()).unwrap_or(default)
}
