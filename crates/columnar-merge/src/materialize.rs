//! Column materialisation: copy rows of two source columns into a new column following a
//! merged tagged-index order.
//!
//! One handler per encoding. Struct columns reuse the same merged order for every child.

use crate::column::{with_primitive_pair, Column, ColumnData, PrimitiveType, PrimitiveValues};
use crate::comparator::{Side, TaggedIndex};
use crate::error::{MergeError, MergeResult};
use crate::memory::try_vec_with_capacity;
use crate::parallel::ParallelConfig;
use crate::validity::merged_validity;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
use std::sync::Arc;

#[inline]
fn pick<'v, T>(left: &'v [T], right: &'v [T], idx: TaggedIndex) -> &'v T {
    match idx.side {
        Side::Left => &left[idx.row],
        Side::Right => &right[idx.row],
    }
}

fn gather_fixed<T: Copy + Send + Sync>(
    left: &[T],
    right: &[T],
    merged: &[TaggedIndex],
    config: &ParallelConfig,
) -> MergeResult<Vec<T>> {
    let mut out = try_vec_with_capacity(merged.len())?;

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if let Some(pool) = config.pool_for(merged.len()) {
            pool.install(|| {
                merged
                    .par_iter()
                    .with_min_len(config.slice_rows())
                    .map(|&idx| *pick(left, right, idx))
                    .collect_into_vec(&mut out)
            });
            return Ok(out);
        }
    }

    let _ = config;
    out.extend(merged.iter().map(|&idx| *pick(left, right, idx)));
    Ok(out)
}

fn merge_primitive<T: PrimitiveType>(
    left: &[T],
    right: &[T],
    merged: &[TaggedIndex],
    config: &ParallelConfig,
) -> MergeResult<PrimitiveValues> {
    Ok(T::into_values(gather_fixed(left, right, merged, config)?))
}

struct Utf8Source<'a> {
    offsets: &'a [usize],
    bytes: &'a [u8],
}

impl<'a> Utf8Source<'a> {
    fn row(&self, row: usize) -> &'a [u8] {
        Column::utf8_bytes(self.offsets, self.bytes, row)
    }
}

fn copy_string_rows(
    dest: &mut [u8],
    base: usize,
    rows: std::ops::Range<usize>,
    offsets: &[usize],
    merged: &[TaggedIndex],
    sources: [&Utf8Source<'_>; 2],
) {
    for row in rows {
        let idx = merged[row];
        let src = match idx.side {
            Side::Left => sources[0].row(idx.row),
            Side::Right => sources[1].row(idx.row),
        };
        dest[offsets[row] - base..offsets[row + 1] - base].copy_from_slice(src);
    }
}

/// Two passes: destination offsets from source string lengths, then a byte copy per row.
fn merge_utf8(
    left: &Utf8Source<'_>,
    right: &Utf8Source<'_>,
    merged: &[TaggedIndex],
    config: &ParallelConfig,
) -> MergeResult<ColumnData> {
    let len_of = |idx: TaggedIndex| match idx.side {
        Side::Left => left.row(idx.row).len(),
        Side::Right => right.row(idx.row).len(),
    };

    let mut offsets = try_vec_with_capacity(merged.len() + 1)?;
    offsets.push(0usize);
    let mut total = 0usize;
    for &idx in merged {
        total += len_of(idx);
        offsets.push(total);
    }

    let mut bytes = try_vec_with_capacity(total)?;
    bytes.resize(total, 0u8);

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if let Some(pool) = config.pool_for(merged.len()) {
            let slice_rows = config.slice_rows();
            let mut pieces = Vec::with_capacity(merged.len().div_ceil(slice_rows));
            let mut rest: &mut [u8] = &mut bytes;
            for start in (0..merged.len()).step_by(slice_rows) {
                let end = (start + slice_rows).min(merged.len());
                let (head, tail) =
                    std::mem::take(&mut rest).split_at_mut(offsets[end] - offsets[start]);
                pieces.push((start..end, head));
                rest = tail;
            }
            let dest_offsets = &offsets;
            pool.install(|| {
                pieces.into_par_iter().for_each(|(rows, dest)| {
                    let base = dest_offsets[rows.start];
                    copy_string_rows(dest, base, rows, dest_offsets, merged, [left, right]);
                })
            });
            return Ok(ColumnData::Utf8 { offsets, bytes });
        }
    }

    let _ = config;
    copy_string_rows(&mut bytes, 0, 0..merged.len(), &offsets, merged, [left, right]);
    Ok(ColumnData::Utf8 { offsets, bytes })
}

/// Merge column `column` of the left and right tables in `merged` order.
///
/// Dictionary columns must already share their key column (see
/// [`crate::dictionary::unify_dictionaries`]). List columns have no merge strategy.
pub fn merge_column(
    column: usize,
    left: &Column,
    right: &Column,
    merged: &[TaggedIndex],
    config: &ParallelConfig,
) -> MergeResult<Column> {
    if left.data_type() != right.data_type() {
        return Err(MergeError::ColumnTypeMismatch {
            table: 1,
            column,
            expected: left.data_type().clone(),
            actual: right.data_type().clone(),
        });
    }
    let unsupported = || MergeError::UnsupportedColumnType {
        column,
        data_type: left.data_type().clone(),
    };

    let data = match (left.data(), right.data()) {
        (ColumnData::Primitive(l), ColumnData::Primitive(r)) => {
            ColumnData::Primitive(with_primitive_pair!(
                l, r,
                (l, r) => merge_primitive(l, r, merged, config)?,
                _ => return Err(unsupported())
            ))
        }
        (
            ColumnData::Utf8 {
                offsets: lo,
                bytes: lb,
            },
            ColumnData::Utf8 {
                offsets: ro,
                bytes: rb,
            },
        ) => merge_utf8(
            &Utf8Source {
                offsets: lo,
                bytes: lb,
            },
            &Utf8Source {
                offsets: ro,
                bytes: rb,
            },
            merged,
            config,
        )?,
        (
            ColumnData::Dictionary {
                indices: li,
                keys: lk,
            },
            ColumnData::Dictionary {
                indices: ri,
                keys: rk,
            },
        ) => {
            if !Arc::ptr_eq(lk, rk) && lk != rk {
                return Err(MergeError::DictionaryKeysMismatch { column });
            }
            ColumnData::Dictionary {
                indices: gather_fixed(li, ri, merged, config)?,
                keys: Arc::clone(lk),
            }
        }
        (ColumnData::Struct { children: lc }, ColumnData::Struct { children: rc }) => {
            let children = lc
                .iter()
                .zip(rc)
                .map(|(l, r)| merge_column(column, l, r, merged, config))
                .collect::<MergeResult<Vec<_>>>()?;
            ColumnData::Struct { children }
        }
        // Lists have no merge strategy.
        _ => return Err(unsupported()),
    };

    let validity = merged_validity(left, right, merged, config)?;
    Ok(Column::from_parts(
        left.data_type().clone(),
        merged.len(),
        data,
        validity,
    ))
}
