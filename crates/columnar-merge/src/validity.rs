//! Validity (null mask) merge.
//!
//! Destination rows are grouped into 64-row lanes; each group votes "is my source row valid?"
//! and the votes are packed into one `u64` word, so every word is written exactly once and no
//! bit-level synchronisation is needed.

use crate::bitmap::{Bitmap, WORD_BITS};
use crate::column::Column;
use crate::comparator::{Side, TaggedIndex};
use crate::error::{MergeError, MergeResult};
use crate::parallel::ParallelConfig;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;

/// Pack the validity votes of up to 64 lanes into one word, lane `k` at bit `k`.
fn ballot<F>(lanes: &[TaggedIndex], valid: &F) -> u64
where
    F: Fn(TaggedIndex) -> bool,
{
    lanes
        .iter()
        .enumerate()
        .fold(0u64, |word, (lane, &idx)| word | (u64::from(valid(idx)) << lane))
}

fn fill_words<F>(dest: &mut Bitmap, merged: &[TaggedIndex], valid: F, config: &ParallelConfig)
where
    F: Fn(TaggedIndex) -> bool + Sync,
{
    debug_assert_eq!(dest.len(), merged.len());
    dest.overwrite_words(|words| {
        #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
        {
            if let Some(pool) = config.pool_for(merged.len()) {
                let slice_rows = config.word_aligned_slice_rows();
                let slice_words = slice_rows / WORD_BITS;
                pool.install(|| {
                    words
                        .par_chunks_mut(slice_words)
                        .zip(merged.par_chunks(slice_rows))
                        .for_each(|(words, rows)| {
                            for (word, lanes) in words.iter_mut().zip(rows.chunks(WORD_BITS)) {
                                *word = ballot(lanes, &valid);
                            }
                        });
                });
                return;
            }
        }

        let _ = config;
        for (word, lanes) in words.iter_mut().zip(merged.chunks(WORD_BITS)) {
            *word = ballot(lanes, &valid);
        }
    });
}

/// Overwrite `dest` with the validity of the source rows named by `merged`.
///
/// A side without a mask counts as all valid. Calling this when neither side has a mask is a
/// caller bug: the merge would not have allocated a destination mask at all.
pub fn merge_validity_into(
    dest: &mut Bitmap,
    merged: &[TaggedIndex],
    left: Option<&Bitmap>,
    right: Option<&Bitmap>,
    config: &ParallelConfig,
) -> MergeResult<()> {
    match (left, right) {
        (Some(l), Some(r)) => {
            log::trace!("validity merge: both sides masked");
            fill_words(
                dest,
                merged,
                |idx| match idx.side {
                    Side::Left => l.get(idx.row),
                    Side::Right => r.get(idx.row),
                },
                config,
            );
        }
        (Some(l), None) => {
            log::trace!("validity merge: left side masked");
            fill_words(
                dest,
                merged,
                |idx| idx.side == Side::Right || l.get(idx.row),
                config,
            );
        }
        (None, Some(r)) => {
            log::trace!("validity merge: right side masked");
            fill_words(
                dest,
                merged,
                |idx| idx.side == Side::Left || r.get(idx.row),
                config,
            );
        }
        (None, None) => return Err(MergeError::MissingValidity),
    }
    Ok(())
}

/// Destination mask for merging `left` and `right` in `merged` order.
///
/// The mask is allocated when either side carries one and starts out all valid; the word
/// kernel only runs when a side actually has nulls.
pub(crate) fn merged_validity(
    left: &Column,
    right: &Column,
    merged: &[TaggedIndex],
    config: &ParallelConfig,
) -> MergeResult<Option<Bitmap>> {
    if !left.is_nullable() && !right.is_nullable() {
        return Ok(None);
    }
    let mut mask = Bitmap::with_len_all_true(merged.len());
    if left.has_nulls() || right.has_nulls() {
        merge_validity_into(&mut mask, merged, left.validity(), right.validity(), config)?;
    }
    Ok(Some(mask))
}
