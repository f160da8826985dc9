//! Integrity checks.
//!
//! Walks the free lists and every block of every pool, reporting each broken invariant found.
//!
//! The walks are linear in the number of blocks, and are meant for diagnostics and tests only.

#[cfg(feature = "tracing")]
use tracing::warn;

use crate::Violation;
use crate::api::configuration::BLOCK_SIZE_MIN;

use super::{
    block::Block,
    free_lists::FreeLists,
    pool::{Pool, PoolChain},
    size_class::SizeClass,
};

/// Checks the free lists, then each pool, calling `fun` for each violation.
///
/// Returns the number of violations.
pub(crate) fn check<F>(lists: &FreeLists<'_>, pools: &PoolChain, fun: F) -> usize
    where
        F: FnMut(Violation),
{
    let mut reporter = Reporter { fun, count: 0 };

    //  Safety:
    //  -   Walks stop at the first inconsistency, rather than following corrupted links or sizes.
    unsafe {
        check_lists(lists, &mut reporter);

        for pool in pools.iter() {
            check_pool(lists, pool, &mut reporter);
        }
    }

    reporter.count
}

//
//  Implementation Details
//

struct Reporter<F> {
    fun: F,
    count: usize,
}

impl<F> Reporter<F>
    where
        F: FnMut(Violation),
{
    fn report(&mut self, violation: Violation) {
        #[cfg(feature = "tracing")]
        warn!(%violation, "invariant violated");

        self.count += 1;
        (self.fun)(violation);
    }
}

enum Walk {
    Complete,
    UsedBlock(Block),
    Broken,
}

//  Walks the list of `class`, stopping at the first used block or inconsistent link.
//
//  A block's predecessor must link to it: this guarantees the walk terminates, even if the list is corrupted.
unsafe fn walk_list<F>(lists: &FreeLists<'_>, class: SizeClass, mut fun: F) -> Walk
    where
        F: FnMut(Block),
{
    let null = lists.null();

    let mut prev = null;
    let mut block = lists.head(class);

    while block != null {
        if !block.is_free() {
            return Walk::UsedBlock(block);
        }

        let free = block.as_free();

        if free.prev_in_list() != prev {
            return Walk::Broken;
        }

        fun(block);

        prev = block;
        block = free.next_in_list();
    }

    Walk::Complete
}

unsafe fn is_listed(lists: &FreeLists<'_>, target: Block) -> bool {
    let class = lists.geometry().class_for_insert(target.size());

    if !lists.geometry().is_valid(class) {
        return false;
    }

    let mut found = false;
    walk_list(lists, class, |block| found |= block == target);

    found
}

unsafe fn check_lists<F>(lists: &FreeLists<'_>, reporter: &mut Reporter<F>)
    where
        F: FnMut(Violation),
{
    let geometry = lists.geometry();
    let bitmap = lists.bitmap();

    for fl in 0..geometry.first_level_count() {
        let flagged = bitmap.first_level() & (1 << fl) != 0;

        if flagged && bitmap.second_level(fl) == 0 {
            reporter.report(Violation::EmptyFirstLevelRow { fl });
        }

        for sl in 0..geometry.second_level_count() {
            let class = SizeClass::new(fl, sl);
            let indexed = bitmap.is_set(class);

            if indexed && !flagged {
                reporter.report(Violation::OrphanSecondLevelBit { fl, sl });
            }

            match (indexed, lists.head(class) == lists.null()) {
                (false, false) => reporter.report(Violation::UnindexedFreeList { fl, sl }),
                (true, true) => reporter.report(Violation::EmptyIndexedFreeList { fl, sl }),
                _ => (),
            }

            let walk = walk_list(lists, class, |block| {
                if geometry.class_for_insert(block.size()) != class {
                    reporter.report(Violation::MisindexedBlock { address: block.address(), size: block.size(), fl, sl });
                }
            });

            match walk {
                Walk::Complete => (),
                Walk::UsedBlock(block) => reporter.report(Violation::UsedBlockInFreeList { address: block.address() }),
                Walk::Broken => reporter.report(Violation::BrokenFreeList { fl, sl }),
            }
        }
    }
}

unsafe fn check_pool<F>(lists: &FreeLists<'_>, pool: Pool, reporter: &mut Reporter<F>)
    where
        F: FnMut(Violation),
{
    let corrupted = Violation::CorruptedPool { address: pool.address() };

    let start = pool.start_sentinel();

    if !start.is_last() || start.is_free() {
        reporter.report(corrupted);
        return;
    }

    let mut prev: Option<Block> = None;

    let complete = pool.for_each_block(|block| {
        check_neighbours(prev, block, reporter);

        if block.is_free() {
            if block.size() < BLOCK_SIZE_MIN {
                reporter.report(Violation::UndersizedBlock { address: block.address(), size: block.size() });
            }

            if prev.map_or(false, |p| p.is_free()) {
                reporter.report(Violation::UncoalescedBlock { address: block.address() });
            }

            if !is_listed(lists, block) {
                reporter.report(Violation::UnlistedFreeBlock { address: block.address() });
            }
        }

        prev = Some(block);
    });

    let end = pool.end_sentinel();

    if !complete || !end.is_last() || end.is_free() {
        reporter.report(corrupted);
        return;
    }

    check_neighbours(prev, end, reporter);
}

//  Checks that the previous-free bit of `block`, and the boundary tag preceding it, match `prev`.
unsafe fn check_neighbours<F>(prev: Option<Block>, block: Block, reporter: &mut Reporter<F>)
    where
        F: FnMut(Violation),
{
    let prev_free = prev.map_or(false, |p| p.is_free());

    if block.is_prev_free() != prev_free {
        reporter.report(Violation::PreviousStatusMismatch { address: block.address() });
        return;
    }

    if let Some(prev) = prev.filter(|_| prev_free) {
        if block.prev() != prev {
            reporter.report(Violation::CorruptedBoundaryTag { address: prev.address() });
        }
    }
}

// mod tests
