//! Two-way merge of sorted row sequences by merge-path partitioning.
//!
//! The output rank space `[0, left_len + right_len)` is cut into fixed-size slices. For the
//! first rank `d` of a slice, a binary search along the cross diagonal `i + j = d` finds how
//! many left rows (`i`) precede it; each slice is then merged sequentially from its own split
//! point. Splits are consistent, so slices are independent and write disjoint output.
//!
//! Ties go to the left input: a left row is emitted before a right row unless the right row is
//! strictly less.

use crate::comparator::TaggedIndex;
use crate::error::MergeResult;
use crate::memory::try_vec_with_capacity;
use crate::parallel::ParallelConfig;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;

/// Number of left rows among the first `diag` merged rows.
fn diagonal_split<F>(diag: usize, left_len: usize, right_len: usize, less: &F) -> usize
where
    F: Fn(TaggedIndex, TaggedIndex) -> bool,
{
    let mut lo = diag.saturating_sub(right_len);
    let mut hi = diag.min(left_len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        // Taking `mid + 1` left rows is valid iff left[mid] does not follow right[diag - 1 - mid].
        if less(TaggedIndex::right(diag - 1 - mid), TaggedIndex::left(mid)) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

fn merge_slice<F>(
    out: &mut [TaggedIndex],
    (mut i, mut j): (usize, usize),
    (left_end, right_end): (usize, usize),
    less: &F,
) where
    F: Fn(TaggedIndex, TaggedIndex) -> bool,
{
    for slot in out.iter_mut() {
        let take_left = i < left_end
            && (j >= right_end || !less(TaggedIndex::right(j), TaggedIndex::left(i)));
        *slot = if take_left {
            i += 1;
            TaggedIndex::left(i - 1)
        } else {
            j += 1;
            TaggedIndex::right(j - 1)
        };
    }
}

fn merge_rank_range<F>(
    out: &mut [TaggedIndex],
    start: usize,
    left_len: usize,
    right_len: usize,
    less: &F,
) where
    F: Fn(TaggedIndex, TaggedIndex) -> bool,
{
    let end = start + out.len();
    let i0 = diagonal_split(start, left_len, right_len, less);
    let i1 = diagonal_split(end, left_len, right_len, less);
    merge_slice(out, (i0, start - i0), (i1, end - i1), less);
}

/// Merge rows `0..left_len` of the left input with rows `0..right_len` of the right input.
///
/// `less` must be a strict weak order under which both inputs are already sorted.
pub fn merge_path<F>(
    left_len: usize,
    right_len: usize,
    less: &F,
    config: &ParallelConfig,
) -> MergeResult<Vec<TaggedIndex>>
where
    F: Fn(TaggedIndex, TaggedIndex) -> bool + Sync,
{
    let total = left_len + right_len;
    let mut out = try_vec_with_capacity(total)?;
    out.resize(total, TaggedIndex::left(0));

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if let Some(pool) = config.pool_for(total) {
            let slice_rows = config.slice_rows();
            log::trace!(
                "merge path: {left_len} + {right_len} rows in {} parallel slices",
                total.div_ceil(slice_rows)
            );
            pool.install(|| {
                out.par_chunks_mut(slice_rows)
                    .enumerate()
                    .for_each(|(slice, chunk)| {
                        merge_rank_range(chunk, slice * slice_rows, left_len, right_len, less)
                    });
            });
            return Ok(out);
        }
    }

    let _ = config;
    merge_rank_range(&mut out, 0, left_len, right_len, less);
    Ok(out)
}
